//! Error types for AeroDB API calls.
//!
//! Failed responses reach the caller as classified [`ApiError`]s, either as
//! [`Error::Api`] when no recovery applied or recovery itself gave up, or as
//! [`Error::RetryExhausted`] when the failure hit a request that was already a
//! recovery retry. Transport, decoding and configuration problems have their own
//! variants.

use crate::classify::{ApiError, ApiErrorKind};
use crate::store::StoreError;
use http::StatusCode;

/// The main error type for AeroDB API calls.
///
/// # Examples
///
/// ```no_run
/// use aeroclient::{ApiErrorKind, Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::new("my-api-key")?;
///
/// match client.airports().get::<serde_json::Value>("EGLL").await {
///     Ok(response) => println!("Airport: {:?}", response.data),
///     Err(Error::Api(e)) if e.kind() == ApiErrorKind::InvalidToken => {
///         eprintln!("Logged out: {}", e);
///     }
///     Err(Error::DeserializationFailed { raw_response, serde_error, .. }) => {
///         eprintln!("Failed to deserialize. Raw response: {}", raw_response);
///         eprintln!("Serde error: {}", serde_error);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection failed, DNS lookup failed, etc.).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// Failed to deserialize a successful response body into the expected type.
    ///
    /// # Fields
    ///
    /// * `raw_response` - The raw response body as a string
    /// * `serde_error` - The error message from serde
    /// * `status` - The HTTP status code of the response
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The server returned a non-2xx response that was not recovered.
    ///
    /// After a failed token renewal this is still the original `invalidToken`
    /// error; the logout is only observable as a side effect.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// A recovery retry failed too. The request is not retried again.
    #[error("Retry failed: {0}")]
    RetryExhausted(ApiError),

    /// Invalid configuration was provided.
    ///
    /// This indicates a problem with how the client or request was configured,
    /// such as a missing API key or invalid header values.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the request body or query parameters.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The token store failed.
    #[error("Token store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Returns the classified API error, if this error carries one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) | Error::RetryExhausted(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the classified kind for failed responses.
    ///
    /// # Examples
    ///
    /// ```
    /// use aeroclient::{classify::classify, ApiErrorKind, Error};
    /// use http::{HeaderMap, StatusCode};
    ///
    /// let body = r#"{"error":{"type":"invalidToken"}}"#.to_string();
    /// let err = Error::Api(classify(StatusCode::UNAUTHORIZED, HeaderMap::new(), body));
    ///
    /// assert_eq!(err.kind(), Some(ApiErrorKind::InvalidToken));
    /// assert!(!err.is_retry_exhausted());
    /// ```
    pub fn kind(&self) -> Option<ApiErrorKind> {
        self.api_error().map(ApiError::kind)
    }

    /// Returns `true` if the failure hit a request that was already a retry.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Error::RetryExhausted(_))
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Api(e) | Error::RetryExhausted(e) => Some(e.status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Api(e) | Error::RetryExhausted(e) => Some(&e.raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for AeroDB API calls.
///
/// This is a convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
