//! Classification of failed API responses.
//!
//! The API reports failures with a JSON envelope:
//!
//! ```json
//! { "error": { "type": "invalidInstance", "errorCode": 1, "readable": "...", "details": { "apiUrl": "..." } } }
//! ```
//!
//! [`classify`] turns any non-2xx response into an [`ApiError`]. It never fails:
//! a missing or malformed body yields [`ApiErrorKind::Unknown`] with empty details.

use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};

/// The closed set of failure kinds the client knows how to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// The client is pointed at the wrong API instance.
    InvalidInstance,
    /// The access token is invalid or expired.
    InvalidToken,
    /// Any other failure.
    Unknown,
}

impl ApiErrorKind {
    /// The wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorKind::InvalidInstance => "invalidInstance",
            ApiErrorKind::InvalidToken => "invalidToken",
            ApiErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific details decoded from `error.details`.
///
/// Every variant keeps the decoded `details` object, empty if the body had none.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDetails {
    /// The server wants the client to talk to another instance.
    InvalidInstance {
        /// Base URL of the instance to use, when the server provided a usable one.
        api_url: Option<String>,
        /// The full `details` object.
        fields: Map<String, Value>,
    },
    /// The access token was rejected.
    InvalidToken(Map<String, Value>),
    /// Unrecognized failure.
    Unknown(Map<String, Value>),
}

impl ErrorDetails {
    /// The kind these details belong to.
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            ErrorDetails::InvalidInstance { .. } => ApiErrorKind::InvalidInstance,
            ErrorDetails::InvalidToken(_) => ApiErrorKind::InvalidToken,
            ErrorDetails::Unknown(_) => ApiErrorKind::Unknown,
        }
    }

    /// The decoded `details` object.
    pub fn fields(&self) -> &Map<String, Value> {
        match self {
            ErrorDetails::InvalidInstance { fields, .. }
            | ErrorDetails::InvalidToken(fields)
            | ErrorDetails::Unknown(fields) => fields,
        }
    }

    /// A single field of the `details` object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields().get(key)
    }
}

/// A classified API failure.
///
/// Produced once per failed response and never mutated afterwards.
#[derive(thiserror::Error, Debug, Clone)]
#[error(
    "API error {kind} (status {status}): {message}",
    kind = ErrorDetails::kind(.details),
    message = display_message(.readable, .raw_response)
)]
pub struct ApiError {
    /// The HTTP status code of the failed response.
    pub status: StatusCode,
    /// The numeric `errorCode` reported by the server.
    pub error_code: Option<i64>,
    /// The human readable message reported by the server.
    pub readable: Option<String>,
    /// Kind-specific details.
    pub details: ErrorDetails,
    /// The raw response body.
    pub raw_response: String,
    /// The response headers.
    pub headers: HeaderMap,
}

impl ApiError {
    /// The classified kind.
    pub fn kind(&self) -> ApiErrorKind {
        self.details.kind()
    }

    /// The redirect target of an `invalidInstance` error.
    pub fn api_url(&self) -> Option<&str> {
        match &self.details {
            ErrorDetails::InvalidInstance { api_url, .. } => api_url.as_deref(),
            _ => None,
        }
    }
}

fn display_message<'a>(readable: &'a Option<String>, raw_response: &'a str) -> &'a str {
    readable.as_deref().unwrap_or(raw_response)
}

#[derive(Debug, Deserialize)]
struct Envelope {
    error: Option<WireError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireError {
    #[serde(default, rename = "type")]
    kind: Option<Value>,
    #[serde(default)]
    error_code: Option<Value>,
    #[serde(default)]
    readable: Option<Value>,
    #[serde(default)]
    details: Option<Value>,
}

/// Classifies a non-2xx response.
///
/// # Examples
///
/// ```
/// use aeroclient::classify::{classify, ApiErrorKind};
/// use http::{HeaderMap, StatusCode};
///
/// let body = r#"{"error":{"type":"invalidInstance","details":{"apiUrl":"https://eu.aerodb.net"}}}"#;
/// let error = classify(StatusCode::BAD_REQUEST, HeaderMap::new(), body.to_string());
///
/// assert_eq!(error.kind(), ApiErrorKind::InvalidInstance);
/// assert_eq!(error.api_url(), Some("https://eu.aerodb.net"));
/// ```
pub fn classify(status: StatusCode, headers: HeaderMap, raw_response: String) -> ApiError {
    let wire = serde_json::from_str::<Envelope>(&raw_response)
        .ok()
        .and_then(|envelope| envelope.error)
        .unwrap_or_default();

    let details = decode_details(wire.kind.as_ref().and_then(Value::as_str), wire.details);

    ApiError {
        status,
        error_code: wire.error_code.as_ref().and_then(Value::as_i64),
        readable: wire
            .readable
            .as_ref()
            .and_then(Value::as_str)
            .map(str::to_string),
        details,
        raw_response,
        headers,
    }
}

fn decode_details(kind: Option<&str>, details: Option<Value>) -> ErrorDetails {
    let object = match details {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    match kind {
        Some("invalidInstance") => ErrorDetails::InvalidInstance {
            api_url: object
                .get("apiUrl")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            fields: object,
        },
        Some("invalidToken") => ErrorDetails::InvalidToken(object),
        _ => ErrorDetails::Unknown(object),
    }
}
