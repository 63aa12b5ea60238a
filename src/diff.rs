use serde_json::{Map, Value};

/// Collect leaf-level differences between two JSON documents as
/// `(path, old, new)` triples. Object keys join with `.`, array elements with `[i]`.
/// A key or element that disappeared is reported with `new = null`.
pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None => added(curr_val, &path, changes),
                }
            }
            for (key, prev_val) in prev_map {
                if !curr_map.contains_key(key) {
                    let path = if path_prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{path_prefix}.{key}")
                    };
                    changes.push((path, prev_val.clone(), Value::Null));
                }
            }
        }
        (Value::Array(prev_items), Value::Array(curr_items)) => {
            for (i, curr_val) in curr_items.iter().enumerate() {
                let path = format!("{path_prefix}[{i}]");
                match prev_items.get(i) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None => added(curr_val, &path, changes),
                }
            }
            for (i, prev_val) in prev_items.iter().enumerate().skip(curr_items.len()) {
                changes.push((format!("{path_prefix}[{i}]"), prev_val.clone(), Value::Null));
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

fn added(value: &Value, path: &str, changes: &mut Vec<(String, Value, Value)>) {
    match value {
        Value::Object(_) => diff_json(&Value::Object(Map::new()), value, path, changes),
        Value::Array(_) => diff_json(&Value::Array(Vec::new()), value, path, changes),
        _ => changes.push((path.to_string(), Value::Null, value.clone())),
    }
}
