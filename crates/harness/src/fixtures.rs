//! Selections and payloads shared by the integration suites.

use normcache_core::{CoreError, Selection, Variables};
use serde_json::{json, Value};

pub fn selection(descriptor: Value) -> Result<Selection, CoreError> {
    Selection::from_json(&descriptor)
}

pub fn vars(value: Value) -> Variables {
    match value {
        Value::Object(map) => map,
        _ => Variables::new(),
    }
}

fn user_fields() -> Value {
    json!({
        "id": {"type": "ID", "keyRaw": "id"},
        "firstName": {"type": "String", "keyRaw": "firstName"}
    })
}

/// `{ viewer { id firstName } }`
pub fn viewer_query() -> Result<Selection, CoreError> {
    selection(json!({
        "viewer": {"type": "User", "keyRaw": "viewer", "fields": user_fields()}
    }))
}

/// `{ viewer { id firstName friends { id firstName } } }`
pub fn viewer_friends_query() -> Result<Selection, CoreError> {
    let mut fields = user_fields();
    fields["friends"] = json!({"type": "User", "keyRaw": "friends", "fields": user_fields()});
    selection(json!({
        "viewer": {"type": "User", "keyRaw": "viewer", "fields": fields}
    }))
}

/// `{ users(foo: "bar") @connection(name: "All_Users") { id firstName } }`
pub fn all_users_query() -> Result<Selection, CoreError> {
    selection(json!({
        "users": {
            "type": "User",
            "keyRaw": r#"users(foo: "bar")"#,
            "connection": "All_Users",
            "filters": {"foo": {"kind": "String", "value": "bar"}},
            "fields": user_fields()
        }
    }))
}

/// The selection a list mutation writes for each inserted user.
pub fn user_selection() -> Result<Selection, CoreError> {
    selection(user_fields())
}

pub fn user(id: &str, first_name: &str) -> Value {
    json!({"id": id, "firstName": first_name})
}
