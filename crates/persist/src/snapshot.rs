use crate::codec::{CodecError, cbor_deserialize, cbor_serialize};
use crate::node::DataNodeGroup;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A content-addressed capture of a persisted world tree.
///
/// The hash covers the encoded payload, so corruption is detected on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Display name of the world the tree was taken from.
    pub label: String,
    /// World tick at capture time.
    pub tick: u64,
    /// CBOR-encoded root group.
    pub payload: Vec<u8>,
    /// Hex SHA-256 of `payload`.
    pub hash: String,
}

impl Snapshot {
    /// Encode a world tree into a snapshot.
    pub fn capture(label: impl Into<String>, tick: u64, tree: &DataNodeGroup) -> Result<Self, CodecError> {
        let payload = tree.to_bytes()?;
        let hash = sha256_hex(&payload);
        Ok(Self {
            label: label.into(),
            tick,
            payload,
            hash,
        })
    }

    /// Verify the snapshot integrity by recomputing the hash.
    pub fn verify(&self) -> bool {
        sha256_hex(&self.payload) == self.hash
    }

    /// Decode the captured tree.
    pub fn restore(&self) -> Result<DataNodeGroup, CodecError> {
        DataNodeGroup::from_bytes(&self.payload)
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, CodecError> {
        cbor_serialize(self)
    }

    pub(crate) fn decode(data: &[u8]) -> Result<Self, CodecError> {
        cbor_deserialize(data)
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
