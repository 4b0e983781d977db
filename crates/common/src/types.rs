use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of low bits holding the per-peer counter. The high 16 bits hold the
/// peer (user) index so every peer allocates from a disjoint range.
const COUNTER_BITS: u32 = 48;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;

/// Stable, world-scoped identity of a syncable object.
///
/// Assigned once when the object is created and never reused within a world.
/// The zero pointer is the null pointer and never refers to an object.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NetPointer(pub u64);

impl NetPointer {
    pub const NULL: NetPointer = NetPointer(0);

    /// Build a pointer from a peer index and a counter value.
    pub fn new(user: u16, counter: u64) -> Self {
        Self(((user as u64) << COUNTER_BITS) | (counter & COUNTER_MASK))
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Peer index that allocated this pointer.
    pub fn user(self) -> u16 {
        (self.0 >> COUNTER_BITS) as u16
    }

    pub fn counter(self) -> u64 {
        self.0 & COUNTER_MASK
    }
}

impl fmt::Display for NetPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:012x}", self.user(), self.counter())
    }
}

/// Hands out pointers for one world. Counters start at 1 so no allocation
/// ever yields the null pointer.
#[derive(Debug, Clone)]
pub struct PointerAllocator {
    user: u16,
    next: u64,
}

impl PointerAllocator {
    pub fn new(user: u16) -> Self {
        Self { user, next: 1 }
    }

    pub fn user(&self) -> u16 {
        self.user
    }

    /// Allocate the next unused pointer.
    pub fn allocate(&mut self) -> NetPointer {
        let pointer = NetPointer::new(self.user, self.next);
        self.next += 1;
        pointer
    }

    /// Make sure a pointer adopted from elsewhere can never be handed out again.
    pub fn reserve(&mut self, pointer: NetPointer) {
        if pointer.user() == self.user && pointer.counter() >= self.next {
            self.next = pointer.counter() + 1;
        }
    }
}

impl Default for PointerAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Spatial transform: position, rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_pointers_are_unique_and_non_null() {
        let mut alloc = PointerAllocator::new(3);
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_ne!(a, b);
        assert!(!a.is_null());
        assert_eq!(a.user(), 3);
        assert_eq!(b.counter(), a.counter() + 1);
    }

    #[test]
    fn reserve_skips_adopted_pointers() {
        let mut alloc = PointerAllocator::new(1);
        alloc.reserve(NetPointer::new(1, 40));
        assert_eq!(alloc.allocate(), NetPointer::new(1, 41));
    }

    #[test]
    fn reserve_ignores_other_peers() {
        let mut alloc = PointerAllocator::new(1);
        alloc.reserve(NetPointer::new(2, 40));
        assert_eq!(alloc.allocate(), NetPointer::new(1, 1));
    }

    #[test]
    fn transform_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
    }
}
