//! Binary (CBOR) and JSON encodings of the node tree.

use crate::node::{DataNode, DataNodeGroup, DataNodeList, LeafValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors from encoding or decoding node trees.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("leaf type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("expected a group at the root, got a {0}")]
    NotAGroup(&'static str),
}

pub(crate) fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CodecError::CborEncode(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn cbor_deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    ciborium::from_reader(data).map_err(|e| CodecError::CborDecode(e.to_string()))
}

/// Encode a whole tree.
pub fn to_bytes(node: &DataNode) -> Result<Vec<u8>, CodecError> {
    cbor_serialize(node)
}

/// Decode a whole tree.
pub fn from_bytes(bytes: &[u8]) -> Result<DataNode, CodecError> {
    cbor_deserialize(bytes)
}

/// Convert an encoded tree into human-readable JSON text.
pub fn bytes_to_json(bytes: &[u8]) -> Result<String, CodecError> {
    let node = from_bytes(bytes)?;
    Ok(serde_json::to_string_pretty(&node)?)
}

/// Convert JSON text produced by [`bytes_to_json`] back into the binary encoding.
pub fn json_to_bytes(json: &str) -> Result<Vec<u8>, CodecError> {
    let node: DataNode = serde_json::from_str(json)?;
    to_bytes(&node)
}

impl LeafValue {
    /// Self-contained binary encoding of this value.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        cbor_serialize(self)
    }

    /// Replace this value with the one encoded in `bytes`.
    ///
    /// The encoded value must be of the same leaf type; on any error the leaf
    /// is left untouched.
    pub fn from_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let decoded: LeafValue = cbor_deserialize(bytes)?;
        if std::mem::discriminant(&decoded) != std::mem::discriminant(self) {
            return Err(CodecError::TypeMismatch {
                expected: self.kind(),
                actual: decoded.kind(),
            });
        }
        *self = decoded;
        Ok(())
    }

    /// Compact JSON text of this value alone.
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a value written by [`LeafValue::to_json`].
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl DataNodeList {
    /// Pretty-printed JSON text of the list.
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a list written by [`DataNodeList::to_json`].
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl DataNode {
    /// Binary (CBOR) encoding of the tree rooted here.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        to_bytes(self)
    }

    /// Decode a tree written by [`DataNode::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        from_bytes(bytes)
    }

    /// Pretty-printed JSON text, keeping group key order.
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a tree written by [`DataNode::to_json`].
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl DataNodeGroup {
    /// Encode this group as the root of a tree.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        cbor_serialize(&GroupRef::Group(self))
    }

    /// Decode a tree whose root must be a group.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        root_group(from_bytes(bytes)?)
    }

    /// JSON text of this group as the root of a tree.
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(&GroupRef::Group(self))?)
    }

    /// Parse a tree whose root must be a group.
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        root_group(DataNode::from_json(json)?)
    }
}

/// Borrowed root wrapper so a group encodes exactly like `DataNode::Group`
/// without cloning it.
#[derive(Serialize)]
#[serde(rename = "DataNode", rename_all = "lowercase")]
enum GroupRef<'a> {
    Group(&'a DataNodeGroup),
}

fn root_group(node: DataNode) -> Result<DataNodeGroup, CodecError> {
    match node {
        DataNode::Group(group) => Ok(group),
        other => Err(CodecError::NotAGroup(other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};
    use proptest::prelude::*;
    use worldsync_common::NetPointer;

    fn roundtrip(value: LeafValue) -> LeafValue {
        let bytes = value.to_bytes().unwrap();
        let mut decoded = match &value {
            LeafValue::Bool(_) => LeafValue::zero::<bool>(),
            LeafValue::I8(_) => LeafValue::zero::<i8>(),
            LeafValue::U8(_) => LeafValue::zero::<u8>(),
            LeafValue::I16(_) => LeafValue::zero::<i16>(),
            LeafValue::U16(_) => LeafValue::zero::<u16>(),
            LeafValue::I32(_) => LeafValue::zero::<i32>(),
            LeafValue::U32(_) => LeafValue::zero::<u32>(),
            LeafValue::I64(_) => LeafValue::zero::<i64>(),
            LeafValue::U64(_) => LeafValue::zero::<u64>(),
            LeafValue::F32(_) => LeafValue::zero::<f32>(),
            LeafValue::F64(_) => LeafValue::zero::<f64>(),
            LeafValue::Char(_) => LeafValue::zero::<char>(),
            LeafValue::String(_) => LeafValue::zero::<String>(),
            LeafValue::Bytes(_) => LeafValue::zero::<Vec<u8>>(),
            LeafValue::Pointer(_) => LeafValue::zero::<NetPointer>(),
            LeafValue::Vec3(_) => LeafValue::zero::<Vec3>(),
            LeafValue::Quat(_) => LeafValue::zero::<Quat>(),
        };
        decoded.from_bytes(&bytes).unwrap();
        decoded
    }

    fn leaf_strategy() -> impl Strategy<Value = LeafValue> {
        let finite32 = -1.0e6f32..1.0e6f32;
        prop_oneof![
            any::<bool>().prop_map(LeafValue::Bool),
            any::<i8>().prop_map(LeafValue::I8),
            any::<u8>().prop_map(LeafValue::U8),
            any::<i16>().prop_map(LeafValue::I16),
            any::<u16>().prop_map(LeafValue::U16),
            any::<i32>().prop_map(LeafValue::I32),
            any::<u32>().prop_map(LeafValue::U32),
            any::<i64>().prop_map(LeafValue::I64),
            any::<u64>().prop_map(LeafValue::U64),
            any::<f32>()
                .prop_filter("not NaN", |f| !f.is_nan())
                .prop_map(LeafValue::F32),
            any::<f64>()
                .prop_filter("not NaN", |f| !f.is_nan())
                .prop_map(LeafValue::F64),
            any::<char>().prop_map(LeafValue::Char),
            ".*".prop_map(LeafValue::String),
            proptest::collection::vec(any::<u8>(), 0..64).prop_map(LeafValue::Bytes),
            any::<u64>().prop_map(|p| LeafValue::Pointer(NetPointer(p))),
            [finite32.clone(), finite32.clone(), finite32.clone()].prop_map(LeafValue::Vec3),
            [finite32.clone(), finite32.clone(), finite32.clone(), finite32]
                .prop_map(LeafValue::Quat),
        ]
    }

    proptest! {
        #[test]
        fn leaf_bytes_roundtrip(value in leaf_strategy()) {
            prop_assert_eq!(roundtrip(value.clone()), value);
        }
    }

    #[test]
    fn from_bytes_rejects_other_type_and_keeps_value() {
        let bytes = LeafValue::from("hello").to_bytes().unwrap();
        let mut leaf = LeafValue::new(5i32);
        let err = leaf.from_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            CodecError::TypeMismatch {
                expected: "i32",
                actual: "string"
            }
        ));
        assert_eq!(leaf, LeafValue::I32(5));
    }

    #[test]
    fn pointer_and_int_group_roundtrip() {
        let mut group = DataNodeGroup::new();
        group.set("pointer", LeafValue::new(NetPointer::new(2, 17)));
        group.set("value", LeafValue::new(-42i32));

        let bytes = group.to_bytes().unwrap();
        let decoded = DataNodeGroup::from_bytes(&bytes).unwrap();

        assert_eq!(
            decoded.leaf("pointer").and_then(LeafValue::get::<NetPointer>),
            Some(NetPointer::new(2, 17))
        );
        assert_eq!(decoded.leaf("value").and_then(LeafValue::get::<i32>), Some(-42));
    }

    #[test]
    fn deep_nesting_roundtrip() {
        let mut node = DataNode::from(LeafValue::new(1u32));
        for depth in 0..32 {
            if depth % 2 == 0 {
                let mut group = DataNodeGroup::new();
                group.set("child", node);
                node = group.into();
            } else {
                let mut list = DataNodeList::new();
                list.push(node);
                node = list.into();
            }
        }
        let bytes = node.to_bytes().unwrap();
        assert_eq!(DataNode::from_bytes(&bytes).unwrap(), node);
    }

    #[test]
    fn json_preserves_key_order() {
        let mut group = DataNodeGroup::new();
        group.set("zeta", LeafValue::new(1i64));
        group.set("alpha", LeafValue::from("a"));
        group.set("mid", DataNodeList::new());

        let json = bytes_to_json(&group.to_bytes().unwrap()).unwrap();
        let zeta = json.find("zeta").unwrap();
        let alpha = json.find("alpha").unwrap();
        assert!(zeta < alpha);

        let back = DataNodeGroup::from_bytes(&json_to_bytes(&json).unwrap()).unwrap();
        assert_eq!(back, group);
    }

    #[test]
    fn group_json_matches_node_json() {
        let mut group = DataNodeGroup::new();
        group.set("k", LeafValue::new(true));
        let via_node = DataNode::Group(group.clone()).to_json().unwrap();
        assert_eq!(group.to_json().unwrap(), via_node);
        assert_eq!(DataNodeGroup::from_json(&via_node).unwrap(), group);
    }

    #[test]
    fn root_must_be_group() {
        let bytes = DataNode::from(LeafValue::new(1u8)).to_bytes().unwrap();
        assert!(matches!(
            DataNodeGroup::from_bytes(&bytes),
            Err(CodecError::NotAGroup("leaf"))
        ));
    }

    #[test]
    fn leaf_and_list_json() {
        let leaf = LeafValue::new(NetPointer::new(1, 9));
        assert_eq!(LeafValue::from_json(&leaf.to_json().unwrap()).unwrap(), leaf);

        let mut list = DataNodeList::new();
        list.push(LeafValue::new(3u8));
        list.push(DataNodeGroup::new());
        assert_eq!(DataNodeList::from_json(&list.to_json().unwrap()).unwrap(), list);
    }

    #[test]
    fn non_finite_floats_survive_json() {
        let mut group = DataNodeGroup::new();
        group.set("inf", LeafValue::new(f32::INFINITY));
        group.set("neg", LeafValue::new(f64::NEG_INFINITY));
        group.set("scale", LeafValue::new(Vec3::new(1.5, f32::INFINITY, -2.0)));
        group.set("nan", LeafValue::new(f64::NAN));

        let json = group.to_json().unwrap();
        assert!(json.contains(r#""f32": "inf""#));
        assert!(!json.contains("null"));

        let back = DataNodeGroup::from_json(&json).unwrap();
        assert_eq!(back.leaf("inf"), Some(&LeafValue::F32(f32::INFINITY)));
        assert_eq!(back.leaf("neg"), Some(&LeafValue::F64(f64::NEG_INFINITY)));
        assert_eq!(
            back.leaf("scale"),
            Some(&LeafValue::Vec3([1.5, f32::INFINITY, -2.0]))
        );
        assert!(matches!(back.leaf("nan"), Some(LeafValue::F64(f)) if f.is_nan()));

        let binary = DataNodeGroup::from_bytes(&json_to_bytes(&json).unwrap()).unwrap();
        assert_eq!(binary.leaf("inf"), Some(&LeafValue::F32(f32::INFINITY)));
    }

    #[test]
    fn unknown_float_text_is_rejected() {
        assert!(LeafValue::from_json(r#"{"f32":"infinity"}"#).is_err());
    }

    #[test]
    fn duplicate_keys_rejected_in_json() {
        let json = r#"{"group":{"a":{"leaf":{"u8":1}},"a":{"leaf":{"u8":2}}}}"#;
        assert!(DataNodeGroup::from_json(json).is_err());
    }
}
