//! Required-field validation for request data

use std::collections::HashMap;
use std::fmt;

use metaapi_db::Context;
use serde_json::Value;

/// Request fields that were absent or null, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingFields(pub Vec<String>);

impl fmt::Display for MissingFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data missing from these fields: {}", self.0.join(", "))
    }
}

impl std::error::Error for MissingFields {}

/// Map request parameters onto context keys: `(param, key)` pairs.
/// Absent parameters become `null`.
pub fn form_context(form: &HashMap<String, String>, fields: &[(&str, &str)]) -> Context {
    fields
        .iter()
        .map(|(param, key)| {
            let value = form
                .get(*param)
                .map(|v| Value::String(v.clone()))
                .unwrap_or(Value::Null);
            (key.to_string(), value)
        })
        .collect()
}

/// Every required key must be present and non-null
pub fn validate_required(data: &Context, required: &[&str]) -> Result<(), MissingFields> {
    let missing: Vec<String> = required
        .iter()
        .filter(|field| data.get(**field).map_or(true, Value::is_null))
        .map(|field| field.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(MissingFields(missing))
    }
}
