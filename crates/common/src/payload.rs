//! Typed access to free-form event payloads.
//!
//! Missing and `null` fields read as absent. A field that is present with the
//! wrong type is a [`AppError::MalformedPayload`]: orchestrators fail fast
//! rather than fan out to the wrong people.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::AppError;

/// Optional integer field. Numeric strings are accepted.
pub fn opt_i64(payload: &Value, key: &str) -> Result<Option<i64>, AppError> {
    match payload.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .map(Some)
            .ok_or_else(|| {
                AppError::MalformedPayload(format!("field '{}' must be an integer, got {}", key, value))
            }),
    }
}

/// Required integer field.
pub fn req_i64(payload: &Value, key: &str) -> Result<i64, AppError> {
    opt_i64(payload, key)?
        .ok_or_else(|| AppError::MalformedPayload(format!("missing required field '{}'", key)))
}

/// Optional string field. Non-string values read as absent.
pub fn opt_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(|v| v.as_str())
}

/// Scalar field rendered as text, for template substitution.
pub fn text(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Object field flattened to string properties.
pub fn string_map(payload: &Value, key: &str) -> Result<BTreeMap<String, String>, AppError> {
    match payload.get(key) {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .filter_map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    Value::Null => return None,
                    other => other.to_string(),
                };
                Some((k.clone(), rendered))
            })
            .collect()),
        Some(other) => Err(AppError::MalformedPayload(format!(
            "field '{}' must be an object, got {}",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_fields_accept_numeric_strings() {
        let payload = json!({"restaurantId": 4, "customerId": "17", "note": null});
        assert_eq!(opt_i64(&payload, "restaurantId").unwrap(), Some(4));
        assert_eq!(opt_i64(&payload, "customerId").unwrap(), Some(17));
        assert_eq!(opt_i64(&payload, "note").unwrap(), None);
        assert_eq!(opt_i64(&payload, "absent").unwrap(), None);
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let payload = json!({"conversationId": {"id": 3}, "senderId": "bob"});
        assert!(matches!(
            opt_i64(&payload, "conversationId"),
            Err(AppError::MalformedPayload(_))
        ));
        assert!(matches!(
            req_i64(&payload, "senderId"),
            Err(AppError::MalformedPayload(_))
        ));
        assert!(matches!(
            req_i64(&payload, "missing"),
            Err(AppError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_string_map_flattens_scalars() {
        let payload = json!({"properties": {"table": 12, "vip": true, "note": "window", "gone": null}});
        let props = string_map(&payload, "properties").unwrap();
        assert_eq!(props.get("table").map(String::as_str), Some("12"));
        assert_eq!(props.get("vip").map(String::as_str), Some("true"));
        assert_eq!(props.get("note").map(String::as_str), Some("window"));
        assert!(!props.contains_key("gone"));

        let bad = json!({"properties": [1, 2]});
        assert!(string_map(&bad, "properties").is_err());
    }
}
