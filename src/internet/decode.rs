//! Decode the JSON payload returned by the IP lookup service.
use super::InternetInfo;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Implement errors specific to payload decoding
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Bad json data")]
    BadJSONData(#[from] serde_json::error::Error),
    #[error("Expected a json object, got {0}")]
    NotAnObject(&'static str),
}

/// Raw payload. Key names are fixed by the lookup service API.
#[derive(Deserialize, Debug)]
struct LookupPayload {
    #[serde(rename = "YourFuckingIPAddress")]
    ip_address: Option<String>,
    #[serde(rename = "YourFuckingLocation")]
    location: Option<String>,
    #[serde(rename = "YourFuckingISP")]
    isp: Option<String>,
    #[serde(rename = "YourFuckingCity")]
    city: Option<String>,
    #[serde(rename = "YourFuckingCountry")]
    country: Option<String>,
    #[serde(rename = "YourFuckingVPN")]
    vpn: Option<bool>,
    #[serde(rename = "YourFuckingTorExit")]
    tor_exit: Option<bool>,
}

fn non_empty_trimmed(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_owned())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl From<LookupPayload> for InternetInfo {
    fn from(payload: LookupPayload) -> Self {
        let location = non_empty_trimmed(payload.location).or_else(|| {
            let parts: Vec<String> = [payload.city, payload.country]
                .into_iter()
                .filter_map(non_empty_trimmed)
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        });
        InternetInfo {
            ip_address: non_empty_trimmed(payload.ip_address),
            isp: non_empty_trimmed(payload.isp),
            location,
            vpn: payload.vpn,
            tor_exit: payload.tor_exit,
        }
    }
}

impl InternetInfo {
    /// Decode a lookup service payload.
    ///
    /// Fails when `bytes` is not a json object or when a known key holds a
    /// value of the wrong type. Unknown keys are ignored.
    pub fn from_json(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject(json_kind(&value)));
        }
        let payload: LookupPayload = serde_json::from_value(value)?;
        Ok(payload.into())
    }
}

/// Decode a lookup service payload, `None` meaning there is nothing to show.
pub fn decode(bytes: &[u8]) -> Option<InternetInfo> {
    match InternetInfo::from_json(bytes) {
        Ok(info) => Some(info),
        Err(e) => {
            debug!("Unable to decode internet info: {:#}", anyhow::Error::from(e));
            None
        }
    }
}
