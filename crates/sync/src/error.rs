/// Errors from structural serialization and deserialization.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A field of a worker failed; carries the owning type, field and field type.
    #[error("failed on {owner}, field {field}, field type {field_type}: {source}")]
    Field {
        owner: &'static str,
        field: &'static str,
        field_type: &'static str,
        source: Box<SyncError>,
    },
    #[error("expected a {expected} node, got a {actual}")]
    UnexpectedNode {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("missing key `{0}`")]
    MissingKey(&'static str),
    #[error("cannot read {type_name} from a {actual} leaf")]
    ValueType {
        type_name: &'static str,
        actual: &'static str,
    },
    #[error("unknown ordinal {ordinal} for enum {type_name}")]
    UnknownOrdinal { type_name: &'static str, ordinal: i32 },
    #[error("no type registered under tag `{0}`")]
    UnknownType(String),
    #[error("no type registry available for {0}")]
    MissingRegistry(&'static str),
}
