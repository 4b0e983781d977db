//! The node tree: leaves holding one typed value, ordered groups, and lists.

use glam::{Quat, Vec3};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use worldsync_common::NetPointer;

/// A single typed value. Each variant is one concrete leaf type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(#[serde(with = "crate::float")] f32),
    F64(#[serde(with = "crate::float")] f64),
    Char(char),
    String(String),
    Bytes(Vec<u8>),
    Pointer(NetPointer),
    Vec3(#[serde(with = "crate::float::array")] [f32; 3]),
    Quat(#[serde(with = "crate::float::array")] [f32; 4]),
}

impl LeafValue {
    /// Wrap a typed value.
    pub fn new<T: LeafType>(value: T) -> Self {
        value.into_leaf()
    }

    /// The zero value of `T`.
    pub fn zero<T: LeafType>() -> Self {
        T::default().into_leaf()
    }

    /// Read the value as `T`, or `None` if the leaf holds another type.
    pub fn get<T: LeafType>(&self) -> Option<T> {
        T::from_leaf(self)
    }

    /// Name of the concrete leaf type, as used in the wire format.
    pub fn kind(&self) -> &'static str {
        match self {
            LeafValue::Bool(_) => "bool",
            LeafValue::I8(_) => "i8",
            LeafValue::U8(_) => "u8",
            LeafValue::I16(_) => "i16",
            LeafValue::U16(_) => "u16",
            LeafValue::I32(_) => "i32",
            LeafValue::U32(_) => "u32",
            LeafValue::I64(_) => "i64",
            LeafValue::U64(_) => "u64",
            LeafValue::F32(_) => "f32",
            LeafValue::F64(_) => "f64",
            LeafValue::Char(_) => "char",
            LeafValue::String(_) => "string",
            LeafValue::Bytes(_) => "bytes",
            LeafValue::Pointer(_) => "pointer",
            LeafValue::Vec3(_) => "vec3",
            LeafValue::Quat(_) => "quat",
        }
    }
}

/// Rust types that can live in a leaf.
pub trait LeafType: Sized + Default {
    fn into_leaf(self) -> LeafValue;
    fn from_leaf(leaf: &LeafValue) -> Option<Self>;
}

macro_rules! leaf_type {
    ($ty:ty, $variant:ident) => {
        impl LeafType for $ty {
            fn into_leaf(self) -> LeafValue {
                LeafValue::$variant(self)
            }

            fn from_leaf(leaf: &LeafValue) -> Option<Self> {
                match leaf {
                    LeafValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for LeafValue {
            fn from(value: $ty) -> Self {
                LeafValue::$variant(value)
            }
        }
    };
}

leaf_type!(bool, Bool);
leaf_type!(i8, I8);
leaf_type!(u8, U8);
leaf_type!(i16, I16);
leaf_type!(u16, U16);
leaf_type!(i32, I32);
leaf_type!(u32, U32);
leaf_type!(i64, I64);
leaf_type!(u64, U64);
leaf_type!(f32, F32);
leaf_type!(f64, F64);
leaf_type!(char, Char);
leaf_type!(String, String);
leaf_type!(Vec<u8>, Bytes);
leaf_type!(NetPointer, Pointer);

impl LeafType for Vec3 {
    fn into_leaf(self) -> LeafValue {
        LeafValue::Vec3(self.to_array())
    }

    fn from_leaf(leaf: &LeafValue) -> Option<Self> {
        match leaf {
            LeafValue::Vec3(v) => Some(Vec3::from_array(*v)),
            _ => None,
        }
    }
}

impl LeafType for Quat {
    fn into_leaf(self) -> LeafValue {
        LeafValue::Quat(self.to_array())
    }

    fn from_leaf(leaf: &LeafValue) -> Option<Self> {
        match leaf {
            LeafValue::Quat(v) => Some(Quat::from_array(*v)),
            _ => None,
        }
    }
}

impl From<&str> for LeafValue {
    fn from(value: &str) -> Self {
        LeafValue::String(value.to_owned())
    }
}

/// Any node of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataNode {
    Leaf(LeafValue),
    Group(DataNodeGroup),
    List(DataNodeList),
}

impl DataNode {
    /// The leaf value, if this node is a leaf.
    pub fn as_leaf(&self) -> Option<&LeafValue> {
        match self {
            DataNode::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// The group, if this node is a group.
    pub fn as_group(&self) -> Option<&DataNodeGroup> {
        match self {
            DataNode::Group(group) => Some(group),
            _ => None,
        }
    }

    /// The list, if this node is a list.
    pub fn as_list(&self) -> Option<&DataNodeList> {
        match self {
            DataNode::List(list) => Some(list),
            _ => None,
        }
    }

    /// Variant name: `leaf`, `group` or `list`.
    pub fn kind(&self) -> &'static str {
        match self {
            DataNode::Leaf(_) => "leaf",
            DataNode::Group(_) => "group",
            DataNode::List(_) => "list",
        }
    }
}

impl From<LeafValue> for DataNode {
    fn from(leaf: LeafValue) -> Self {
        DataNode::Leaf(leaf)
    }
}

impl From<DataNodeGroup> for DataNode {
    fn from(group: DataNodeGroup) -> Self {
        DataNode::Group(group)
    }
}

impl From<DataNodeList> for DataNode {
    fn from(list: DataNodeList) -> Self {
        DataNode::List(list)
    }
}

/// Ordered string-keyed mapping. Keys are unique; insertion order is
/// serialization order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataNodeGroup {
    entries: Vec<(String, DataNode)>,
}

impl DataNodeGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn set(&mut self, key: impl Into<String>, node: impl Into<DataNode>) {
        let key = key.into();
        let node = node.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = node,
            None => self.entries.push((key, node)),
        }
    }

    /// Child under `key`.
    pub fn get(&self, key: &str) -> Option<&DataNode> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Mutable child under `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut DataNode> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Child under `key` if it is a leaf.
    pub fn leaf(&self, key: &str) -> Option<&LeafValue> {
        self.get(key).and_then(DataNode::as_leaf)
    }

    /// Child under `key` if it is a group.
    pub fn group(&self, key: &str) -> Option<&DataNodeGroup> {
        self.get(key).and_then(DataNode::as_group)
    }

    /// Child under `key` if it is a list.
    pub fn list(&self, key: &str) -> Option<&DataNodeList> {
        self.get(key).and_then(DataNode::as_list)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove a child. Later keys keep their relative order.
    pub fn remove(&mut self, key: &str) -> Option<DataNode> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for DataNodeGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, node) in &self.entries {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DataNodeGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GroupVisitor;

        impl<'de> Visitor<'de> for GroupVisitor {
            type Value = DataNodeGroup;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of unique string keys to nodes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut group = DataNodeGroup::new();
                while let Some((key, node)) = access.next_entry::<String, DataNode>()? {
                    if group.contains_key(&key) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate group key `{key}`"
                        )));
                    }
                    group.entries.push((key, node));
                }
                Ok(group)
            }
        }

        deserializer.deserialize_map(GroupVisitor)
    }
}

/// Ordered sequence of nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataNodeList {
    items: Vec<DataNode>,
}

impl DataNodeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node at the end.
    pub fn push(&mut self, node: impl Into<DataNode>) {
        self.items.push(node.into());
    }

    /// Node at `index`.
    pub fn get(&self, index: usize) -> Option<&DataNode> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataNode> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a DataNodeList {
    type Item = &'a DataNode;
    type IntoIter = std::slice::Iter<'a, DataNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
