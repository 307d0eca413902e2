pub mod config;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod key;
pub mod operations;
pub mod selection;

pub use config::CacheConfig;
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use selection::{FieldKind, ObjectField, Selection, SelectionField};

/// Runtime variables of an operation, as sent alongside a GraphQL document.
pub type Variables = serde_json::Map<String, serde_json::Value>;
