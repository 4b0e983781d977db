use std::collections::HashMap;
use worldsync_common::PointerAllocator;

/// Builds a fresh, default-valued instance with newly allocated pointers.
pub type Constructor<T> = fn(&mut PointerAllocator) -> Box<T>;

/// Maps type tags to constructors for one family of polymorphic objects.
pub struct TypeRegistry<T: ?Sized> {
    constructors: HashMap<String, Constructor<T>>,
}

impl<T: ?Sized> TypeRegistry<T> {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a constructor. A later registration under the same tag wins.
    pub fn register(&mut self, tag: impl Into<String>, constructor: Constructor<T>) {
        let tag = tag.into();
        if self.constructors.insert(tag.clone(), constructor).is_some() {
            tracing::debug!(%tag, "replaced registered constructor");
        }
    }

    pub fn create(&self, tag: &str, allocator: &mut PointerAllocator) -> Option<Box<T>> {
        self.constructors.get(tag).map(|build| build(allocator))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

impl<T: ?Sized> Default for TypeRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
