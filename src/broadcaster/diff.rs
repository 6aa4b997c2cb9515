// Field-level diff between two server snapshots (top-level JSON fields).

use serde_json::{Map, Value};

/// Changed top-level fields of `next` relative to `prev`, always including `id`.
/// `None` when nothing changed. Without a previous snapshot the whole object is returned.
pub fn changed_fields(prev: Option<&Map<String, Value>>, next: &Map<String, Value>) -> Option<Value> {
    let Some(prev) = prev else {
        return Some(Value::Object(next.clone()));
    };

    let mut changes = Map::new();
    for (key, value) in next {
        if prev.get(key) != Some(value) {
            changes.insert(key.clone(), value.clone());
        }
    }
    for key in prev.keys() {
        if !next.contains_key(key) {
            changes.insert(key.clone(), Value::Null);
        }
    }
    if changes.is_empty() {
        return None;
    }
    if let Some(id) = next.get("id") {
        changes.insert("id".into(), id.clone());
    }
    Some(Value::Object(changes))
}
