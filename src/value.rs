//! Value helpers shared by the resolver, dereference and bundle passes.

use serde_json::{Map, Value};

const JSON_TYPES: &[&str] = &[
    "object", "array", "string", "number", "boolean", "integer", "null",
];

/// Merge `patch` into `value`.
///
/// Objects are unioned recursively (patch wins on scalar conflicts),
/// arrays are concatenated, anything else is replaced by `patch`.
pub fn merge_values(value: Value, patch: Value) -> Value {
    match (value, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            // merge in place; remove + insert would reorder keys
            for (key, patch_value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => {
                        let current = std::mem::take(existing);
                        *existing = merge_values(current, patch_value);
                    }
                    None => {
                        base.insert(key, patch_value);
                    }
                }
            }
            Value::Object(base)
        }
        (Value::Array(mut base), Value::Array(patch)) => {
            base.extend(patch);
            Value::Array(base)
        }
        (Value::Array(base), _) => Value::Array(base),
        (_, patch) => patch,
    }
}

/// Merge `sibling` content into `value` when both are present.
pub fn merge_sibling(value: Value, sibling: Option<&Map<String, Value>>) -> Value {
    match sibling {
        Some(sibling) if value.is_object() => merge_values(value, Value::Object(sibling.clone())),
        _ => value,
    }
}

/// An object whose `type` is a JSON type name, or that has a combinator array.
pub fn is_json_schema(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    let typed = map
        .get("type")
        .and_then(Value::as_str)
        .map(|t| JSON_TYPES.contains(&t))
        .unwrap_or(false);

    typed
        || ["anyOf", "oneOf", "allOf"]
            .iter()
            .any(|k| map.get(*k).map(Value::is_array).unwrap_or(false))
}

/// Looser check used for format detection of a whole document.
pub fn looks_like_schema(value: &Value) -> bool {
    if is_json_schema(value) {
        return true;
    }
    value
        .as_object()
        .map(|map| {
            ["properties", "definitions", "$defs", "items", "$schema"]
                .iter()
                .any(|k| map.contains_key(*k))
        })
        .unwrap_or(false)
}

/// Target of a `$ref` node: a string, or the offending non-string value.
pub type RefTarget<'v> = Result<&'v str, &'v Value>;

/// Split a `$ref` object into its target and sibling keys.
///
/// Returns `None` for values without a `$ref` key.
pub fn split_ref(value: &Value) -> Option<(RefTarget<'_>, Map<String, Value>)> {
    let map = value.as_object()?;
    let target = map.get("$ref")?;
    let sibling = map
        .iter()
        .filter(|(k, _)| k.as_str() != "$ref")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Some((target.as_str().ok_or(target), sibling))
}

/// Build a `{ "$ref": target, ...sibling }` object.
pub fn ref_node(target: impl Into<String>, sibling: Option<&Map<String, Value>>) -> Value {
    let mut map = Map::new();
    map.insert("$ref".to_string(), Value::String(target.into()));
    if let Some(sibling) = sibling {
        for (k, v) in sibling {
            map.insert(k.clone(), v.clone());
        }
    }
    Value::Object(map)
}

/// True for objects and arrays.
pub fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}
