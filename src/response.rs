//! Successful responses with their transport metadata.

use crate::metadata::RecoveryAction;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A deserialized API response.
///
/// Besides the typed `data`, a response records how it was obtained: the raw
/// body, status and headers, the total latency, and whether the request had to
/// be recovered (redirected or re-authenticated) before it succeeded.
///
/// # Examples
///
/// ```no_run
/// use aeroclient::{Client, RecoveryAction};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Airport {
///     icao: String,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), aeroclient::Error> {
/// let client = Client::new("my-api-key")?;
///
/// let response = client.airports().get::<Airport>("LFPG").await?;
///
/// println!("Airport: {}", response.data.name);
/// println!("Request took {:?}", response.latency);
/// if let Some(RecoveryAction::Redirected { api_url }) = &response.recovery {
///     println!("Served by {}", api_url);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The deserialized response data.
    pub data: T,

    /// The raw response body.
    pub raw_body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// Time from the first send until the successful response, including a
    /// recovery round trip.
    pub latency: Duration,

    /// `1` when the first attempt succeeded, `2` after a recovery.
    pub attempts: usize,

    /// How the request was recovered, if it was.
    pub recovery: Option<RecoveryAction>,
}

impl<T> Response<T> {
    /// Creates a new `Response` for a request that was not recovered.
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
            recovery: None,
        }
    }

    pub(crate) fn with_recovery(mut self, recovery: Option<RecoveryAction>) -> Self {
        self.recovery = recovery;
        self
    }

    /// Maps the response data, keeping the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use aeroclient::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     vec!["EGLL", "LFPG"],
    ///     r#"["EGLL","LFPG"]"#.to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(40),
    ///     1,
    /// );
    ///
    /// let count = response.map(|codes| codes.len());
    /// assert_eq!(count.data, 2);
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
            recovery: self.recovery,
        }
    }

    /// Returns `true` if the request was reissued after a recovery.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
