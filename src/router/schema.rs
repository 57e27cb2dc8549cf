use serde_json::Value;

/// A small, non-recursive-reference subset of JSON Schema: `type`,
/// `required`, `properties`, `enum`, and `items`. Enough to validate the
/// discriminated-union envelopes this router composes; not a general
/// JSON Schema implementation (no `$ref`, `allOf`/`anyOf`, formats, etc).
pub fn validate(value: &Value, schema: &Value) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema_obj.get("enum").and_then(Value::as_array) {
        if !expected.iter().any(|candidate| candidate == value) {
            return Err(format!("{value} is not one of the allowed values {expected:?}"));
        }
    }

    if let Some(expected_type) = schema_obj.get("type").and_then(Value::as_str) {
        if !matches_type(value, expected_type) {
            return Err(format!("expected type '{expected_type}', got {}", describe(value)));
        }
    }

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        let Some(object) = value.as_object() else {
            return Err("required fields declared on a non-object schema".to_string());
        };
        for field in required {
            let Some(field_name) = field.as_str() else { continue };
            if !object.contains_key(field_name) {
                return Err(format!("missing required field '{field_name}'"));
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) {
        if let Some(object) = value.as_object() {
            for (key, sub_schema) in properties {
                if let Some(sub_value) = object.get(key) {
                    validate(sub_value, sub_schema).map_err(|reason| format!("'{key}': {reason}"))?;
                }
            }
        }
    }

    if let Some(items_schema) = schema_obj.get("items") {
        if let Some(array) = value.as_array() {
            for (index, item) in array.iter().enumerate() {
                validate(item, items_schema).map_err(|reason| format!("item {index}: {reason}"))?;
            }
        }
    }

    Ok(())
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
