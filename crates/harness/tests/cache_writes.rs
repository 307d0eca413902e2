use normcache_core::{CacheConfig, FieldValue, RecordId};
use normcache_engine::EngineError;
use normcache_harness::{
    fixtures::{selection, user, vars, viewer_friends_query, viewer_query},
    TestCache,
};
use serde_json::json;

// ============================================================================
// Identity
// ============================================================================

#[test]
fn same_identity_merges_into_one_record() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = selection(json!({
        "viewer": {
            "type": "User",
            "keyRaw": "viewer",
            "fields": {
                "id": {"type": "ID", "keyRaw": "id"},
                "firstName": {"type": "String", "keyRaw": "firstName"},
                "lastName": {"type": "String", "keyRaw": "lastName"}
            }
        }
    }))?;

    cache.write(&query, json!({"viewer": {"id": "1", "firstName": "bob", "lastName": "smith"}}))?;
    cache.write(&query, json!({"viewer": {"id": "1", "firstName": "bob"}}))?;
    cache.write(&query, json!({"viewer": {"id": "1", "firstName": "jane"}}))?;

    // root + User:1
    assert_eq!(cache.cache.store().len(), 2);
    assert_eq!(cache.field("User:1", "firstName"), Some(FieldValue::Text("jane".into())));
    assert_eq!(cache.field("User:1", "lastName"), Some(FieldValue::Text("smith".into())));
    Ok(())
}

#[test]
fn objects_without_identity_are_embedded() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = selection(json!({
        "viewer": {
            "type": "User",
            "keyRaw": "viewer",
            "fields": {
                "id": {"type": "ID", "keyRaw": "id"},
                "address": {
                    "type": "Address",
                    "keyRaw": "address",
                    "fields": {"city": {"type": "String", "keyRaw": "city"}}
                },
                "tags": {
                    "type": "Tag",
                    "keyRaw": "tags",
                    "fields": {"label": {"type": "String", "keyRaw": "label"}}
                }
            }
        }
    }))?;

    cache.write(
        &query,
        json!({"viewer": {
            "id": "1",
            "address": {"city": "Lisbon"},
            "tags": [{"label": "a"}, {"label": "b"}]
        }}),
    )?;

    assert_eq!(cache.field("User:1.address", "city"), Some(FieldValue::Text("Lisbon".into())));
    assert_eq!(cache.list_ids("User:1", "tags"), vec!["User:1.tags[0]", "User:1.tags[1]"]);
    Ok(())
}

#[test]
fn abstract_fields_use_typename() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = selection(json!({
        "node": {
            "type": "Node",
            "keyRaw": "node(id: $id)",
            "abstract": true,
            "fields": {
                "__typename": {"type": "String", "keyRaw": "__typename"},
                "id": {"type": "ID", "keyRaw": "id"}
            }
        }
    }))?;

    cache.write_with(
        &query,
        json!({"node": {"__typename": "Ghost", "id": "5"}}),
        &vars(json!({"id": "5"})),
    )?;

    assert!(cache.has_record("Ghost:5"));
    assert!(!cache.has_record("Node:5"));
    let root = cache.cache.record(&cache.cache.root_id()).ok_or("root missing")?;
    assert_eq!(
        root.linked_record_id(r#"node(id: "5")"#),
        Some(&RecordId::entity("Ghost", "5"))
    );
    Ok(())
}

#[test]
fn type_keys_come_from_config() -> Result<(), Box<dyn std::error::Error>> {
    let config = CacheConfig::from_toml_str(
        r#"
        [types.Repository]
        keys = ["owner", "name"]
        "#,
    )?;
    let mut cache = TestCache::with_config(config)?;
    let query = selection(json!({
        "repository": {
            "type": "Repository",
            "keyRaw": "repository",
            "fields": {
                "owner": {"type": "String", "keyRaw": "owner"},
                "name": {"type": "String", "keyRaw": "name"},
                "stars": {"type": "Int", "keyRaw": "stars"}
            }
        }
    }))?;

    cache.write(&query, json!({"repository": {"owner": "alice", "name": "cache", "stars": 3}}))?;
    assert_eq!(cache.field("Repository:alice__cache", "stars"), Some(FieldValue::Integer(3)));
    assert_eq!(
        cache.cache.id("Repository", &json!({"owner": "alice", "name": "cache"}))?,
        RecordId::entity("Repository", "alice__cache")
    );
    Ok(())
}

// ============================================================================
// Keys and values
// ============================================================================

#[test]
fn variables_resolve_storage_keys() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = selection(json!({
        "greeting": {"type": "String", "keyRaw": "greeting(lang: $lang, loud: $loud)"}
    }))?;

    cache.write_with(&query, json!({"greeting": "hola"}), &vars(json!({"lang": "es", "loud": false})))?;
    cache.write_with(&query, json!({"greeting": "hello"}), &vars(json!({"lang": "en"})))?;

    assert_eq!(
        cache.field("_ROOT_", r#"greeting(lang: "es", loud: false)"#),
        Some(FieldValue::Text("hola".into()))
    );
    assert_eq!(
        cache.field("_ROOT_", r#"greeting(lang: "en", loud: undefined)"#),
        Some(FieldValue::Text("hello".into()))
    );
    Ok(())
}

#[test]
fn scalar_lists_and_custom_scalars_are_stored_whole() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = selection(json!({
        "tags": {"type": "String", "keyRaw": "tags"},
        "settings": {"type": "JSON", "keyRaw": "settings"}
    }))?;

    cache.write(&query, json!({"tags": ["a", "b"], "settings": {"theme": "dark"}}))?;
    assert_eq!(
        cache.cache.read(&query, &vars(json!({})), None),
        json!({"tags": ["a", "b"], "settings": {"theme": "dark"}})
    );
    Ok(())
}

#[test]
fn null_clears_a_link() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = viewer_query()?;
    cache.write(&query, json!({"viewer": user("1", "bob")}))?;
    let (_, recorder) = cache.subscribe(&query)?;

    cache.write(&query, json!({"viewer": null}))?;
    assert_eq!(recorder.last(), Some(json!({"viewer": null})));
    assert!(cache.has_record("User:1"));

    // writing null again changes nothing
    cache.write(&query, json!({"viewer": null}))?;
    assert_eq!(recorder.count(), 1);
    Ok(())
}

// ============================================================================
// Shape errors
// ============================================================================

#[test]
fn unknown_payload_field_fails_before_mutation() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = viewer_friends_query()?;

    let result = cache.write(
        &query,
        json!({"viewer": {
            "id": "1",
            "firstName": "bob",
            "friends": [{"id": "2", "firstName": "jane", "nickname": "jj"}]
        }}),
    );

    match result {
        Err(EngineError::UnknownField { path, field }) => {
            assert_eq!(field, "nickname");
            assert_eq!(path, "viewer.friends[0]");
        }
        other => panic!("expected UnknownField, got {other:?}"),
    }
    assert!(!cache.has_record("User:1"));
    assert!(!cache.has_record("User:2"));
    Ok(())
}

#[test]
fn scalar_in_object_field_is_a_shape_mismatch() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = viewer_query()?;
    let result = cache.write(&query, json!({"viewer": "User:1"}));
    assert!(matches!(result, Err(EngineError::ShapeMismatch { .. })));

    let result = cache.cache.write(&query, &json!(["not", "an", "object"]), &vars(json!({})), None);
    assert!(matches!(result, Err(EngineError::ShapeMismatch { .. })));
    Ok(())
}

#[test]
fn writes_under_an_explicit_root() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let fragment = selection(json!({
        "firstName": {"type": "String", "keyRaw": "firstName"}
    }))?;
    let user_id = RecordId::entity("User", "7");

    cache
        .cache
        .write(&fragment, &json!({"firstName": "ann"}), &vars(json!({})), Some(&user_id))?;
    assert_eq!(cache.field("User:7", "firstName"), Some(FieldValue::Text("ann".into())));
    Ok(())
}
