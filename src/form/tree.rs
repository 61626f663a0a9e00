use serde_json::{Map, Value};

use crate::domain::{FieldPath, Segment};

pub(crate) fn value_at_path<'a>(value: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.segments() {
        current = match (current, segment) {
            (Value::Object(map), Segment::Key(key)) => map.get(key)?,
            (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string())?,
            (Value::Array(items), Segment::Index(index)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

pub(crate) fn value_at_path_mut<'a>(value: &'a mut Value, path: &FieldPath) -> Option<&'a mut Value> {
    let mut current = value;
    for segment in path.segments() {
        current = match (current, segment) {
            (Value::Object(map), Segment::Key(key)) => map.get_mut(key)?,
            (Value::Object(map), Segment::Index(index)) => map.get_mut(&index.to_string())?,
            (Value::Array(items), Segment::Index(index)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects (for key
/// segments) and arrays (for index segments) as needed. Arrays are padded
/// with `null` up to the addressed index.
pub(crate) fn insert_path(root: &mut Value, path: &[Segment], value: Value) {
    let Some((head, tail)) = path.split_first() else {
        *root = value;
        return;
    };

    match head {
        Segment::Key(key) => {
            if !root.is_object() {
                *root = Value::Object(Map::new());
            }
            if let Value::Object(obj) = root {
                let entry = obj.entry(key.clone()).or_insert(Value::Null);
                insert_path(entry, tail, value);
            }
        }
        Segment::Index(index) => {
            if let Value::Object(obj) = root {
                let entry = obj.entry(index.to_string()).or_insert(Value::Null);
                insert_path(entry, tail, value);
                return;
            }
            if !root.is_array() {
                *root = Value::Array(Vec::new());
            }
            if let Value::Array(items) = root {
                if items.len() <= *index {
                    items.resize(index + 1, Value::Null);
                }
                insert_path(&mut items[*index], tail, value);
            }
        }
    }
}

pub(crate) fn remove_path(root: &mut Value, path: &FieldPath) -> Option<Value> {
    let parent = path.parent()?;
    let last = path.segments().last()?;
    match (value_at_path_mut(root, &parent)?, last) {
        (Value::Object(map), Segment::Key(key)) => map.shift_remove(key),
        (Value::Object(map), Segment::Index(index)) => map.shift_remove(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) if *index < items.len() => {
            Some(items.remove(*index))
        }
        _ => None,
    }
}
