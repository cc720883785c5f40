//! Language-neutral result value (spec §4.A): "a value tree (scalar |
//! list | mapping | nil | boolean)". Both script runtime flavors
//! (`LuaRuntime`, `NativeRuntime` in `re-rules`) produce this type, and
//! the Output Dispatcher consumes it without caring which flavor ran.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Mapping(BTreeMap<String, Value>),
}

impl Value {
    /// spec §4.A result interpretation: `result == nil`.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// spec §4.A result interpretation: `result == false` (strict boolean).
    pub fn is_strict_false(&self) -> bool {
        matches!(self, Value::Bool(false))
    }

    /// Whether this result should invoke the configured outputs.
    pub fn triggers_outputs(&self) -> bool {
        !self.is_nil() && !self.is_strict_false()
    }

    /// Convert to `serde_json::Value` for serialization into an output
    /// (ChannelPublish body, SenML payload, template context, ...).
    pub fn to_json(&self) -> Json {
        match self {
            Value::Nil => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Text(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Mapping(map) => {
                Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }

    /// Build a `Value` tree from a decoded JSON payload (spec §4.A
    /// "Message projection"): numbers as 64-bit floats, arrays, objects.
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Nil,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            Json::String(s) => Value::Text(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Wrap a scalar into a single-element list (spec §4.B SenMLSave:
    /// "wrap a scalar into a single-element list").
    pub fn wrapped_in_list(self) -> Vec<Value> {
        match self {
            Value::List(items) => items,
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_does_not_trigger_outputs() {
        assert!(!Value::Nil.triggers_outputs());
    }

    #[test]
    fn strict_false_does_not_trigger_outputs() {
        assert!(!Value::Bool(false).triggers_outputs());
    }

    #[test]
    fn zero_number_does_trigger_outputs() {
        assert!(Value::Number(0.0).triggers_outputs());
    }

    #[test]
    fn json_roundtrip_mapping() {
        let json: Json = serde_json::json!({"level": "high", "count": 3});
        let value = Value::from_json(&json);
        let back = value.to_json();
        assert_eq!(back, json);
    }

    #[test]
    fn scalar_wraps_into_single_element_list() {
        let wrapped = Value::Number(3.0).wrapped_in_list();
        assert_eq!(wrapped, vec![Value::Number(3.0)]);
    }

    #[test]
    fn list_stays_a_list_when_wrapped() {
        let original = vec![Value::Number(1.0), Value::Number(2.0)];
        let wrapped = Value::List(original.clone()).wrapped_in_list();
        assert_eq!(wrapped, original);
    }
}
