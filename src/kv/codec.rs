//! Field encoding for hash-map records.
//!
//! Fields serialize to a string encoding that is reversible without an
//! external schema:
//!
//! - timestamps → ISO-8601 strings (their serde form)
//! - exact decimals → canonical string form
//! - mappings and sequences → canonical JSON text
//! - enumerated values → their underlying scalar
//! - absent/null → the literal marker `"None"`
//! - everything else → its string form
//!
//! Decoding inverts the rules heuristically and therefore cannot
//! distinguish a digit-only string from a true number, nor round-trip a
//! string that happens to equal `"None"`. That is a documented limitation
//! of the encoding, not a bug to silently fix.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use std::str::FromStr;

use crate::error::{CrudError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Encoding
// ═══════════════════════════════════════════════════════════════════════════════

/// Marker for absent values.
pub const NONE_MARKER: &str = "None";

/// Encode one record field into its hash-map string form.
///
/// Operates on the field's serde projection: timestamps, decimals, and
/// enums have already collapsed to their scalar serde forms by the time
/// they arrive here.
pub fn encode_field(value: &Value) -> String {
    match value {
        Value::Null => NONE_MARKER.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        // Value's Display renders canonical JSON.
        Value::Object(_) | Value::Array(_) => value.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decoding
// ═══════════════════════════════════════════════════════════════════════════════

/// A decoded hash-map field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Parsed JSON mapping or sequence.
    Structured(Value),
    /// Digit-only content, parsed exactly.
    Number(Decimal),
    /// The `"None"` marker.
    None,
    /// Opaque string content.
    Text(String),
}

impl FieldValue {
    /// Project into a JSON value for record reconstruction.
    ///
    /// Decimals that exceed `i64`/`u64` fall back to their float
    /// approximation; the exact value stays available on the
    /// [`FieldValue::Number`] variant itself.
    pub fn into_json(self) -> Value {
        match self {
            Self::Structured(v) => v,
            Self::None => Value::Null,
            Self::Text(s) => Value::String(s),
            Self::Number(d) => {
                if let Some(n) = d.to_u64().map(Number::from) {
                    Value::Number(n)
                } else if let Some(n) = d.to_i64().map(Number::from) {
                    Value::Number(n)
                } else {
                    d.to_f64()
                        .and_then(Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or_else(|| Value::String(d.to_string()))
                }
            }
        }
    }
}

/// Decode one raw hash-map field.
///
/// 1. Content starting with `{` or `[` parses as JSON.
/// 2. Digit-only content parses as an exact decimal.
/// 3. The literal `"None"` yields null.
/// 4. Anything else is an opaque string.
pub fn decode_field(raw: &[u8]) -> Result<FieldValue> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| CrudError::Validation(format!("field is not valid UTF-8: {e}")))?;

    if text.starts_with('{') || text.starts_with('[') {
        return Ok(FieldValue::Structured(serde_json::from_str(text)?));
    }
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        let number = Decimal::from_str(text)
            .map_err(|e| CrudError::Validation(format!("invalid numeric field: {e}")))?;
        return Ok(FieldValue::Number(number));
    }
    if text == NONE_MARKER {
        return Ok(FieldValue::None);
    }
    Ok(FieldValue::Text(text.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
