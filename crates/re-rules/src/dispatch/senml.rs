//! SenMLSave output: wrap the result into a list, verify it decodes as
//! SenML, and serialize to JSON for the writers topic (spec §4.B.2).

use re_core::value::Value;

/// A record's field set is `{baseName, name, unit, value, stringValue,
/// boolValue, sum, time}` (GLOSSARY). At least one of the four value
/// fields must be present for a record to be meaningful.
fn record_has_a_value(record: &serde_json::Value) -> bool {
    let obj = match record.as_object() {
        Some(o) => o,
        None => return false,
    };
    ["value", "stringValue", "boolValue", "sum"]
        .iter()
        .any(|key| obj.get(*key).is_some_and(|v| !v.is_null()))
}

/// Wrap a scalar into a single-element list, verify every element decodes
/// as a SenML record, and serialize the whole array to JSON bytes.
pub fn validate_and_encode(result: &Value) -> Result<Vec<u8>, String> {
    let items = result.clone().wrapped_in_list();
    if items.is_empty() {
        return Err("senml result is empty".to_string());
    }

    let json_items: Vec<serde_json::Value> = items.iter().map(Value::to_json).collect();
    for (i, item) in json_items.iter().enumerate() {
        if !record_has_a_value(item) {
            return Err(format!(
                "senml record at index {i} has none of value/stringValue/boolValue/sum"
            ));
        }
    }

    serde_json::to_vec(&json_items).map_err(|e| format!("senml encode failed: {e}"))
}
