use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Identity of the singleton record holding top-level query fields.
pub const ROOT_ID: &str = "_ROOT_";

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.0.to_string()[..8])
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(SubscriptionId);

/// Identity string of a cached record: `Type:id`, the root sentinel, or a
/// path-derived id for embedded objects.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// `Type:key` for a type and an already-joined key value.
    pub fn entity(type_name: &str, key: &str) -> Self {
        Self(format!("{type_name}:{key}"))
    }

    /// Id of an object with no identity fields, nested under `parent.key`.
    pub fn embedded(parent: &RecordId, key: &str) -> Self {
        Self(format!("{}.{}", parent.0, key))
    }

    /// Id of the `index`th identity-less element of the list at `parent.key`.
    pub fn embedded_item(parent: &RecordId, key: &str, index: usize) -> Self {
        Self(format!("{}.{}[{}]", parent.0, key, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for RecordId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Back-reference from a record to a connection scope listing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionRef {
    pub name: String,
    pub parent_id: RecordId,
}

impl ConnectionRef {
    pub fn new(name: impl Into<String>, parent_id: RecordId) -> Self {
        Self {
            name: name.into(),
            parent_id,
        }
    }
}
