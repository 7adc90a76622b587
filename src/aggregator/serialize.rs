//! Infallible JSON encoding for field values

use serde::Serialize;
use serde_json::value::RawValue;
use tracing::warn;

/// Used when even the error payload cannot be encoded
const FALLBACK_ERROR_JSON: &str = "{\"Error\":\"There was an error encoding the json message, additionally there was an error encoding that error message.\"}";

#[derive(Serialize)]
struct ErrorPayload<'a> {
    #[serde(rename = "Error")]
    error: &'a str,
}

/// Encode `value` as JSON, never failing.
///
/// If the value cannot be encoded the result is `{"Error":"<message>"}`, so
/// whatever a producer hands in, the aggregated document stays valid JSON.
pub fn force_serialize<V>(value: &V) -> Box<RawValue>
where
    V: Serialize + ?Sized,
{
    match serde_json::value::to_raw_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Field value could not be encoded as JSON: {}", e);
            let message = e.to_string();
            serde_json::value::to_raw_value(&ErrorPayload { error: &message })
                .unwrap_or_else(|_| fallback_error())
        }
    }
}

fn fallback_error() -> Box<RawValue> {
    RawValue::from_string(FALLBACK_ERROR_JSON.to_owned())
        .expect("BUG: fallback error payload must be valid JSON")
}
