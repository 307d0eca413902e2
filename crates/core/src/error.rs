use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid selection at `{path}`: {reason}")]
    InvalidSelection { path: String, reason: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("cannot compute id for {type_name}: missing key field `{field}`")]
    MissingKeyField { type_name: String, field: String },

    #[error("cannot compute id for {type_name} from {value}")]
    InvalidIdValue { type_name: String, value: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
