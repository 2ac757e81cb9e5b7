//! Request descriptors and URL resolution.

use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

/// What the client did to recover a failed request before reissuing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// The request was reissued against the instance named by the server.
    Redirected {
        /// The new base URL.
        api_url: Url,
    },
    /// The request was reissued with a renewed access token.
    Renewed,
}

/// The full description of a single request.
///
/// A descriptor is what gets reissued when a failure is recovered. Recovery works
/// on a copy: it may pin [`base_url`](Self::base_url), replace the
/// `Authorization` header, and marks the copy with the [`RecoveryAction`] that
/// produced it.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The request path, relative to the base URL.
    pub path: String,

    /// Base URL override. When `None` the session's current base URL is used.
    pub base_url: Option<Url>,

    /// Headers for this request. They take precedence over the session defaults.
    pub headers: HeaderMap,

    /// Query parameters for this request.
    pub query_params: HashMap<String, String>,

    /// JSON body, if any.
    pub body: Option<Value>,

    retry: Option<RecoveryAction>,
}

impl RequestDescriptor {
    /// Creates a new `RequestDescriptor` with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            base_url: None,
            headers: HeaderMap::new(),
            query_params: HashMap::new(),
            body: None,
            retry: None,
        }
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a query parameter to the request.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Adds multiple query parameters to the request.
    pub fn with_query_params(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query_params.extend(params);
        self
    }

    /// Sets the JSON body of the request.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns `true` if this descriptor is itself a recovery retry.
    pub fn is_retry(&self) -> bool {
        self.retry.is_some()
    }

    /// The recovery that produced this descriptor, if it is a retry.
    pub fn recovery(&self) -> Option<&RecoveryAction> {
        self.retry.as_ref()
    }

    pub(crate) fn into_retry(mut self, action: RecoveryAction) -> Self {
        self.retry = Some(action);
        self
    }

    /// Resolves the absolute URL of the request against `default_base`.
    pub(crate) fn url(&self, default_base: &Url) -> Result<Url> {
        let base = self.base_url.as_ref().unwrap_or(default_base);
        let mut url = join_path(base, &self.path)?;

        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

impl Default for RequestDescriptor {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}

/// Joins `path` onto `base`, keeping any path prefix the base URL carries.
///
/// `https://x/api` joined with `/airports` yields `https://x/api/airports`.
pub(crate) fn join_path(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let prefixed = format!("{}/", base.path());
        base.set_path(&prefixed);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}
