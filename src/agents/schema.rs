//! JSON Schema helpers for structured output
//!
//! Covers the subset structured replies need: `type`, `properties`,
//! `required`, `enum` and array `items`. Anything else in a schema is
//! accepted without checks.

use serde_json::{Map, Value};

/// Validate `value` against `schema`, returning the first violation
pub fn validate(value: &Value, schema: &Value) -> Result<(), String> {
    validate_at("$", value, schema)
}

fn validate_at(path: &str, value: &Value, schema: &Value) -> Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        let matches = match expected {
            Value::String(t) => type_matches(t, value),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(t, value)),
            _ => true,
        };
        if !matches {
            return Err(format!(
                "{}: expected type {}, got {}",
                path,
                expected,
                type_name(value)
            ));
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            return Err(format!("{}: {} is not one of {}", path, value, Value::Array(allowed.clone())));
        }
    }

    if let Value::Object(fields) = value {
        if let Some(Value::Array(required)) = schema.get("required") {
            for name in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(name) {
                    return Err(format!("{}: missing required property '{}'", path, name));
                }
            }
        }
        if let Some(Value::Object(properties)) = schema.get("properties") {
            for (name, property_schema) in properties {
                if let Some(field) = fields.get(name) {
                    validate_at(&format!("{}.{}", path, name), field, property_schema)?;
                }
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (idx, item) in items.iter().enumerate() {
            validate_at(&format!("{}[{}]", path, idx), item, item_schema)?;
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Merge the properties and required list of `extra` into an object schema
pub fn extend_object_schema(base: &Value, extra: &Value) -> Value {
    let mut merged = base.as_object().cloned().unwrap_or_default();

    let mut properties = merged
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new);
    if let Some(extra_properties) = extra.get("properties").and_then(Value::as_object) {
        for (name, schema) in extra_properties {
            properties.insert(name.clone(), schema.clone());
        }
    }
    merged.insert("properties".to_string(), Value::Object(properties));

    let mut required: Vec<Value> = merged
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if let Some(extra_required) = extra.get("required").and_then(Value::as_array) {
        for name in extra_required {
            if !required.contains(name) {
                required.push(name.clone());
            }
        }
    }
    merged.insert("required".to_string(), Value::Array(required));
    merged.insert("type".to_string(), Value::String("object".to_string()));

    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "integer"},
                "mood": {"type": "string", "enum": ["happy", "sad"]},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["name", "age"]
        })
    }

    #[test]
    fn test_valid_object() {
        let value = json!({"name": "Ada", "age": 36, "mood": "happy", "tags": ["x"]});
        assert!(validate(&value, &person_schema()).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate(&json!({"name": "Ada"}), &person_schema()).unwrap_err();
        assert!(err.contains("age"));
    }

    #[test]
    fn test_wrong_types() {
        assert!(validate(&json!({"name": "Ada", "age": "old"}), &person_schema()).is_err());
        assert!(validate(&json!({"name": "Ada", "age": 1.5}), &person_schema()).is_err());
        assert!(validate(&json!({"name": "Ada", "age": 1, "tags": [1]}), &person_schema()).is_err());
    }

    #[test]
    fn test_enum() {
        let err = validate(&json!({"name": "Ada", "age": 1, "mood": "meh"}), &person_schema())
            .unwrap_err();
        assert!(err.starts_with("$.mood"));
    }

    #[test]
    fn test_extend_object_schema() {
        let base = json!({
            "type": "object",
            "properties": {"response": {"type": "string"}},
            "required": ["response"]
        });
        let merged = extend_object_schema(&base, &person_schema());
        assert_eq!(merged["properties"].as_object().unwrap().len(), 5);
        assert_eq!(merged["required"], json!(["response", "name", "age"]));
    }
}
