use crate::error::PayloadError;
use crate::ReadingKind;
use serde_json::{Map, Value};

/// Decoded device publish: a flat JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryMessage {
    fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Absent,
    Number(f64),
    Invalid(String),
}

impl TelemetryMessage {
    pub fn from_slice(payload: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(payload)?;
        match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => Ok(TelemetryMessage { fields }),
            Value::Array(_) => Err(PayloadError::NotAnObject("array")),
            Value::String(_) => Err(PayloadError::NotAnObject("string")),
            Value::Number(_) => Err(PayloadError::NotAnObject("number")),
            Value::Bool(_) => Err(PayloadError::NotAnObject("bool")),
            Value::Null => Err(PayloadError::NotAnObject("null")),
        }
    }

    /// `null` counts as absent; numeric strings are accepted.
    pub fn value(&self, kind: ReadingKind) -> FieldValue {
        match self.fields.get(kind.payload_key()) {
            None | Some(Value::Null) => FieldValue::Absent,
            Some(Value::Number(n)) => match n.as_f64() {
                Some(v) => FieldValue::Number(v),
                None => FieldValue::Invalid(n.to_string()),
            },
            Some(Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => FieldValue::Number(v),
                _ => FieldValue::Invalid(s.clone()),
            },
            Some(other) => FieldValue::Invalid(other.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
