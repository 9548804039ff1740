//! Minimal JSON-schema subset validation.
//!
//! The service validates three documents against schemas: the service
//! configuration file (against the operator-supplied `--schema` file) and
//! the camera/scene bus payloads (against the embedded message schemas).
//! The subset implemented here covers what those schemas use:
//!
//! - `type` (string or array of strings): `object`, `array`, `string`,
//!   `number`, `integer`, `boolean`, `null`
//! - `properties` + `required` + boolean `additionalProperties`
//! - `items` for arrays, with `minItems` / `maxItems`
//! - `enum` over strings
//! - `minimum` / `maximum` for numbers
//!
//! Unknown keywords are ignored, matching standard validator behaviour.

use serde_json::Value;

use scene_tracker_core::TrackerError;

/// A parsed schema document.
///
/// Construction checks only that the root is an object; keyword errors
/// surface as validation failures at use time.
#[derive(Debug, Clone)]
pub struct Schema {
    root: Value,
}

impl Schema {
    /// Wrap a schema document.
    pub fn new(root: Value) -> Result<Self, TrackerError> {
        if !root.is_object() {
            return Err(TrackerError::config("schema root must be a JSON object"));
        }
        Ok(Self { root })
    }

    /// Parse a schema from JSON text.
    pub fn from_str(text: &str) -> Result<Self, TrackerError> {
        let root: Value = serde_json::from_str(text)
            .map_err(|e| TrackerError::config(format!("invalid schema JSON: {e}")))?;
        Self::new(root)
    }

    /// Validate `document` against this schema.
    ///
    /// Returns the first violation found, as a
    /// [`TrackerError::SchemaValidation`] carrying the document path.
    pub fn validate(&self, document: &Value) -> Result<(), TrackerError> {
        validate_node(&self.root, document, "")
    }
}

fn validate_node(schema: &Value, value: &Value, path: &str) -> Result<(), TrackerError> {
    let Some(schema) = schema.as_object() else {
        // Non-object subschema: nothing to check.
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        check_type(expected, value, path)?;
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.iter().any(|candidate| candidate == value) {
            return Err(TrackerError::schema(
                path_or_root(path),
                format!("value not in enum: {value}"),
            ));
        }
    }

    if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
        if let Some(number) = value.as_f64() {
            if number < minimum {
                return Err(TrackerError::schema(
                    path_or_root(path),
                    format!("{number} is below minimum {minimum}"),
                ));
            }
        }
    }
    if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64) {
        if let Some(number) = value.as_f64() {
            if number > maximum {
                return Err(TrackerError::schema(
                    path_or_root(path),
                    format!("{number} is above maximum {maximum}"),
                ));
            }
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(name) {
                    return Err(TrackerError::schema(
                        path_or_root(path),
                        format!("missing required property '{name}'"),
                    ));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        if let Some(properties) = properties {
            for (name, subschema) in properties {
                if let Some(child) = object.get(name) {
                    validate_node(subschema, child, &format!("{path}/{name}"))?;
                }
            }
        }

        if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
            for name in object.keys() {
                let declared = properties.map(|p| p.contains_key(name)).unwrap_or(false);
                if !declared {
                    return Err(TrackerError::schema(
                        path_or_root(path),
                        format!("unexpected property '{name}'"),
                    ));
                }
            }
        }
    }

    if let Some(array) = value.as_array() {
        if let Some(min_items) = schema.get("minItems").and_then(Value::as_u64) {
            if (array.len() as u64) < min_items {
                return Err(TrackerError::schema(
                    path_or_root(path),
                    format!("expected at least {min_items} items, got {}", array.len()),
                ));
            }
        }
        if let Some(max_items) = schema.get("maxItems").and_then(Value::as_u64) {
            if (array.len() as u64) > max_items {
                return Err(TrackerError::schema(
                    path_or_root(path),
                    format!("expected at most {max_items} items, got {}", array.len()),
                ));
            }
        }
        if let Some(items) = schema.get("items") {
            for (index, element) in array.iter().enumerate() {
                validate_node(items, element, &format!("{path}/{index}"))?;
            }
        }
    }

    Ok(())
}

fn check_type(expected: &Value, value: &Value, path: &str) -> Result<(), TrackerError> {
    let matches = |name: &str| -> bool {
        match name {
            "object" => value.is_object(),
            "array" => value.is_array(),
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
            "boolean" => value.is_boolean(),
            "null" => value.is_null(),
            _ => false,
        }
    };

    let ok = match expected {
        Value::String(name) => matches(name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(matches),
        _ => true,
    };

    if ok {
        Ok(())
    } else {
        Err(TrackerError::schema(
            path_or_root(path),
            format!("expected type {expected}, got {}", type_name(value)),
        ))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn path_or_root(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}
