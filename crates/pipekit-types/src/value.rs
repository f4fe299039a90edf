//! Argument values passed to tools.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A resolved argument value.
///
/// Command-line arguments arrive as strings; tools that declare a typed
/// parameter get the coerced form (`Int`, `Float`, `Bool`). `Json` carries
/// structured data for embedders that build arguments programmatically.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Structured JSON data (arrays, objects, nested structures).
    Json(serde_json::Value),
}

impl Value {
    /// Coerce a raw argument string according to a schema type hint.
    ///
    /// Unknown hints and failed coercions keep the string form so the tool
    /// can report a precise error during configuration.
    pub fn coerce(raw: &str, param_type: &str) -> Self {
        match param_type {
            "int" => raw
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            "float" => raw
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            "bool" => match raw {
                "true" | "yes" | "1" => Value::Bool(true),
                "false" | "no" | "0" => Value::Bool(false),
                _ => Value::String(raw.to_string()),
            },
            _ => Value::String(raw.to_string()),
        }
    }

    /// Render the value as plain text (what `echo` would print).
    pub fn as_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Json(json) => json.to_string(),
        }
    }

    /// Interpret the value as an integer, parsing strings.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret the value as a float, parsing strings.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        value_to_json(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(json_to_value(json))
    }
}

/// Convert a JSON value into a `Value`, keeping arrays and objects as `Json`.
pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::String(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Json(json),
    }
}

/// Convert a `Value` to JSON. NaN and infinite floats become `null`.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Json(json) => json.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("5", "int", Value::Int(5))]
    #[case("five", "int", Value::String("five".into()))]
    #[case("1.5", "float", Value::Float(1.5))]
    #[case("yes", "bool", Value::Bool(true))]
    #[case("0", "bool", Value::Bool(false))]
    #[case("42", "string", Value::String("42".into()))]
    fn test_coerce(#[case] raw: &str, #[case] ty: &str, #[case] expected: Value) {
        assert_eq!(Value::coerce(raw, ty), expected);
    }

    #[test]
    fn test_as_int_parses_strings() {
        assert_eq!(Value::from(" 12 ").as_int(), Some(12));
        assert_eq!(Value::Float(3.0).as_int(), Some(3));
        assert_eq!(Value::Float(3.5).as_int(), None);
        assert_eq!(Value::Null.as_int(), None);
    }

    #[test]
    fn test_json_conversion_keeps_structure() {
        let json: serde_json::Value = serde_json::json!({"a": [1, 2]});
        let value = json_to_value(json.clone());
        assert_eq!(value, Value::Json(json.clone()));
        assert_eq!(value_to_json(&value), json);
    }

    #[test]
    fn test_nan_serializes_as_null() {
        let out = serde_json::to_string(&Value::Float(f64::NAN)).unwrap();
        assert_eq!(out, "null");
    }
}
