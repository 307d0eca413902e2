use normcache_core::RecordId;
use normcache_harness::{
    fixtures::{selection, user, vars, viewer_friends_query, viewer_query},
    TestCache,
};
use serde_json::{json, Value};

fn viewer_with_friends(friends: &[(&str, &str)]) -> Value {
    let friends: Vec<Value> = friends.iter().map(|(id, name)| user(id, name)).collect();
    json!({"viewer": {"id": "1", "firstName": "bob", "friends": friends}})
}

// ============================================================================
// Notification
// ============================================================================

#[test]
fn notified_once_per_write_with_new_projection() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = viewer_friends_query()?;
    cache.write(&query, viewer_with_friends(&[("2", "jane")]))?;
    let (_, recorder) = cache.subscribe(&query)?;

    // identical write
    cache.write(&query, viewer_with_friends(&[("2", "jane")]))?;
    assert!(recorder.is_empty());

    // two fields on two records change in one write
    cache.write(
        &query,
        json!({"viewer": {"id": "1", "firstName": "robert", "friends": [user("2", "janet")]}}),
    )?;
    assert_eq!(recorder.count(), 1);
    assert_eq!(
        recorder.last(),
        Some(json!({"viewer": {
            "id": "1",
            "firstName": "robert",
            "friends": [{"id": "2", "firstName": "janet"}]
        }}))
    );
    Ok(())
}

#[test]
fn writes_through_other_queries_reach_subscribers() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let friends_query = viewer_friends_query()?;
    cache.write(&friends_query, viewer_with_friends(&[("2", "jane")]))?;
    let (_, recorder) = cache.subscribe(&friends_query)?;

    // a different query that only knows about User:2 directly
    let user_query = selection(json!({
        "user": {
            "type": "User",
            "keyRaw": "user(id: $id)",
            "fields": {
                "id": {"type": "ID", "keyRaw": "id"},
                "firstName": {"type": "String", "keyRaw": "firstName"}
            }
        }
    }))?;
    cache.write_with(&user_query, json!({"user": user("2", "janet")}), &vars(json!({"id": "2"})))?;

    assert_eq!(
        recorder.last(),
        Some(json!({"viewer": {
            "id": "1",
            "firstName": "bob",
            "friends": [{"id": "2", "firstName": "janet"}]
        }}))
    );
    Ok(())
}

#[test]
fn unsubscribe_stops_notifications() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = viewer_query()?;
    cache.write(&query, json!({"viewer": user("1", "bob")}))?;
    let (id, recorder) = cache.subscribe(&query)?;
    assert_eq!(cache.subscriber_count("User:1", "firstName", id), 1);
    let on_viewer = cache.cache.subscribers(&RecordId::root(), "viewer");
    assert_eq!(on_viewer.len(), 1);
    assert_eq!(on_viewer[0].id, id);

    cache.cache.unsubscribe(id)?;
    assert_eq!(cache.subscriber_count("User:1", "firstName", id), 0);
    assert_eq!(cache.subscriber_count("_ROOT_", "viewer", id), 0);
    assert_eq!(cache.cache.subscription_count(), 0);
    assert!(cache.cache.subscribers(&RecordId::root(), "viewer").is_empty());

    cache.write(&query, json!({"viewer": user("1", "jane")}))?;
    assert!(recorder.is_empty());
    Ok(())
}

#[test]
fn fragment_views_are_rooted_at_their_parent() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = viewer_query()?;
    cache.write(&query, json!({"viewer": user("1", "bob")}))?;

    let fragment = selection(json!({
        "firstName": {"type": "String", "keyRaw": "firstName"}
    }))?;
    let (_, recorder) =
        cache.subscribe_with(&fragment, vars(json!({})), Some(RecordId::entity("User", "1")))?;

    cache.write(&query, json!({"viewer": user("1", "jane")}))?;
    assert_eq!(recorder.last(), Some(json!({"firstName": "jane"})));
    Ok(())
}

// ============================================================================
// Links and lists
// ============================================================================

#[test]
fn switching_a_link_moves_the_subscription() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = viewer_query()?;
    cache.write(&query, json!({"viewer": user("1", "bob")}))?;
    let (id, recorder) = cache.subscribe(&query)?;

    cache.write(&query, json!({"viewer": user("2", "jane")}))?;
    assert_eq!(recorder.last(), Some(json!({"viewer": {"id": "2", "firstName": "jane"}})));
    assert_eq!(cache.subscriber_count("User:1", "firstName", id), 0);
    assert_eq!(cache.subscriber_count("User:2", "firstName", id), 1);

    // the old target no longer drives this view
    let fragment = selection(json!({"firstName": {"type": "String", "keyRaw": "firstName"}}))?;
    cache.cache.write(
        &fragment,
        &json!({"firstName": "robert"}),
        &vars(json!({})),
        Some(&RecordId::entity("User", "1")),
    )?;
    assert_eq!(recorder.count(), 1);
    Ok(())
}

#[test]
fn reordering_a_list_keeps_records_and_notifies() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = viewer_friends_query()?;
    cache.write(&query, viewer_with_friends(&[("2", "jane"), ("3", "ann")]))?;
    let (id, recorder) = cache.subscribe(&query)?;

    cache.write(&query, viewer_with_friends(&[("3", "ann"), ("2", "jane")]))?;
    assert_eq!(cache.list_ids("User:1", "friends"), vec!["User:3", "User:2"]);
    assert!(cache.has_record("User:2"));
    assert!(cache.has_record("User:3"));
    assert_eq!(
        recorder.last(),
        Some(json!({"viewer": {
            "id": "1",
            "firstName": "bob",
            "friends": [{"id": "3", "firstName": "ann"}, {"id": "2", "firstName": "jane"}]
        }}))
    );

    cache.write(&query, viewer_with_friends(&[("2", "jane")]))?;
    assert_eq!(cache.subscriber_count("User:3", "firstName", id), 0);
    assert_eq!(cache.subscriber_count("User:2", "firstName", id), 1);
    assert!(cache.has_record("User:3"));
    assert_eq!(recorder.count(), 2);
    Ok(())
}

#[test]
fn record_reached_twice_keeps_its_subscriber() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let user_fields = json!({
        "id": {"type": "ID", "keyRaw": "id"},
        "firstName": {"type": "String", "keyRaw": "firstName"}
    });
    let query = selection(json!({
        "viewer": {"type": "User", "keyRaw": "viewer", "fields": user_fields},
        "friends": {"type": "User", "keyRaw": "friends", "fields": user_fields}
    }))?;

    cache.write(
        &query,
        json!({"viewer": user("1", "bob"), "friends": [user("1", "bob"), user("2", "jane")]}),
    )?;
    let (id, recorder) = cache.subscribe(&query)?;
    assert_eq!(cache.subscriber_count("User:1", "firstName", id), 2);

    // drop the list path, the direct path remains
    cache.write(&query, json!({"friends": [user("2", "jane")]}))?;
    assert_eq!(cache.subscriber_count("User:1", "firstName", id), 1);

    recorder.clear();
    cache.write(&query, json!({"viewer": user("1", "robert")}))?;
    assert_eq!(recorder.count(), 1);

    cache.cache.unsubscribe(id)?;
    assert_eq!(cache.subscriber_count("User:1", "firstName", id), 0);
    Ok(())
}

// ============================================================================
// Variables
// ============================================================================

#[test]
fn resubscribing_with_new_variables_moves_the_key() -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = TestCache::new();
    let query = selection(json!({
        "friends": {
            "type": "User",
            "keyRaw": "friends(filter: $filter)",
            "fields": {
                "id": {"type": "ID", "keyRaw": "id"},
                "firstName": {"type": "String", "keyRaw": "firstName"}
            }
        }
    }))?;
    let foo_key = r#"friends(filter: "foo")"#;
    let not_foo_key = r#"friends(filter: "not-foo")"#;

    cache.write_with(&query, json!({"friends": [user("2", "jane")]}), &vars(json!({"filter": "foo"})))?;
    cache.write_with(
        &query,
        json!({"friends": [user("3", "ann")]}),
        &vars(json!({"filter": "not-foo"})),
    )?;

    let (id, recorder) = cache.subscribe_with(&query, vars(json!({"filter": "foo"})), None)?;
    assert_eq!(cache.subscriber_count("_ROOT_", foo_key, id), 1);
    assert_eq!(cache.subscriber_count("User:2", "firstName", id), 1);

    cache.cache.resubscribe(id, vars(json!({"filter": "not-foo"})))?;
    assert_eq!(cache.subscriber_count("_ROOT_", foo_key, id), 0);
    assert_eq!(cache.subscriber_count("_ROOT_", not_foo_key, id), 1);
    assert_eq!(cache.subscriber_count("User:2", "firstName", id), 0);
    assert_eq!(cache.subscriber_count("User:3", "firstName", id), 1);

    // writes under the old key no longer reach the view
    cache.write_with(&query, json!({"friends": [user("2", "janet")]}), &vars(json!({"filter": "foo"})))?;
    assert!(recorder.is_empty());

    cache.write_with(
        &query,
        json!({"friends": [user("3", "annie")]}),
        &vars(json!({"filter": "not-foo"})),
    )?;
    assert_eq!(recorder.last(), Some(json!({"friends": [{"id": "3", "firstName": "annie"}]})));
    Ok(())
}
