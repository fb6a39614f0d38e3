// JSON codec for everything written to the store

use crate::errors::CodecError;
use crate::models::JobPayload;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize a value to its transport text.
pub fn encode<T>(value: &T) -> Result<String, CodecError>
where
    T: Serialize + ?Sized,
{
    serde_json::to_string(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decode an optional raw value. Absent or empty input yields `Ok(None)`;
/// present but unreadable input is an error the caller must not swallow.
pub fn decode<T>(raw: Option<&str>) -> Result<Option<T>, CodecError>
where
    T: DeserializeOwned,
{
    match raw {
        None => Ok(None),
        Some(text) if text.is_empty() => Ok(None),
        Some(text) => serde_json::from_str(text).map(Some).map_err(CodecError::from),
    }
}

/// Decode a value that must be present, such as a list element.
///
/// Empty text is malformed here: a list position never means "nothing".
pub fn decode_element<T>(text: &str) -> Result<T, CodecError>
where
    T: DeserializeOwned,
{
    if text.is_empty() {
        return Err(CodecError::Malformed("empty list element".to_string()));
    }
    serde_json::from_str(text).map_err(CodecError::from)
}

/// Decode a job payload and check the fields serde cannot.
pub fn decode_payload(raw: Option<&str>) -> Result<Option<JobPayload>, CodecError> {
    let payload: Option<JobPayload> = decode(raw)?;
    if let Some(payload) = &payload {
        if payload.class.trim().is_empty() {
            return Err(CodecError::ShapeMismatch(
                "job payload has an empty class".to_string(),
            ));
        }
    }
    Ok(payload)
}

pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| CodecError::InvalidTimestamp {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}
