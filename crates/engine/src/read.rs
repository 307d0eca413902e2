use normcache_core::{key::evaluate_key, FieldKind, FieldValue, RecordId, Selection, Variables};
use normcache_storage::RecordStore;
use serde_json::{Map, Value};

/// Assemble the plain value `selection` describes, starting at `record_id`.
/// Missing records and fields read as `null`.
pub(crate) fn project(
    store: &RecordStore,
    record_id: &RecordId,
    selection: &Selection,
    variables: &Variables,
) -> Value {
    let Some(record) = store.get(record_id) else {
        return Value::Null;
    };

    let mut out = Map::new();
    for (name, field) in selection.iter() {
        let key = evaluate_key(&field.key_raw, variables);
        let stored = || record.field(&key).map_or(Value::Null, FieldValue::to_json);

        let value = match &field.kind {
            FieldKind::Scalar => stored(),
            FieldKind::Object(object) => {
                if let Some(linked) = store.linked_record(record_id, &key) {
                    project(store, linked.id(), &object.selection, variables)
                } else if record.has_list_link(&key) {
                    Value::Array(
                        store
                            .linked_list(record_id, &key)
                            .into_iter()
                            .map(|item| project(store, item.id(), &object.selection, variables))
                            .collect(),
                    )
                } else {
                    stored()
                }
            }
        };
        out.insert(name.to_string(), value);
    }
    Value::Object(out)
}
