//! AeroDB API client with transparent instance redirection and token renewal.
//!
//! The [`Client`] type is the main entry point for making requests.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::{
    auth::{HttpTokenRenewer, SessionInvalidator, StoreInvalidator, TokenRenewer, DEFAULT_RENEWAL_PATH},
    classify::classify,
    metadata::{RecoveryAction, RequestDescriptor},
    recovery::{clear_retry_flag, Orchestrator, Outcome, RecoveryContext, RetryGuard},
    resources::Resource,
    session::{Session, SessionEvent, API_KEY_HEADER},
    store::{usable_token, MemoryTokenStore, StoreKey, TokenStore},
    Error, Response, Result,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use url::Url;

/// Base URL used when none is configured.
pub const DEFAULT_API_URL: &str = "https://api.aerodb.net";

const SESSION_ENDPOINT: &str = "auth/me";

/// A client for the AeroDB API.
///
/// The client is designed to be reused across multiple requests. Clones share
/// the same session, token store and connection pool.
///
/// Every request goes through the same recovery pipeline: an `invalidInstance`
/// failure moves the session to the instance the server names and reissues the
/// request there; an `invalidToken` failure renews the access token with the
/// stored refresh token and reissues the request. Each request is reissued at
/// most once.
///
/// # Examples
///
/// ```no_run
/// use aeroclient::{Client, QueryParameters, SortOrder};
/// use serde::Deserialize;
/// use std::time::Duration;
///
/// #[derive(Deserialize)]
/// struct Airport {
///     icao: String,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), aeroclient::Error> {
/// let client = Client::builder()
///     .api_key("my-api-key")
///     .timeout(Duration::from_secs(30))
///     .build()?;
///
/// let airport = client.airports().get::<Airport>("EGLL").await?;
/// println!("Airport: {}", airport.data.name);
///
/// let params = QueryParameters::new().limit(10).sort_by("name", SortOrder::Ascending);
/// let airports = client.airports().list::<Vec<Airport>>(&params).await?;
/// println!("Fetched {} airports in {:?}", airports.data.len(), airports.latency);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    session: Session,
    store: Arc<dyn TokenStore>,
    orchestrator: Orchestrator,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.session.base_url().as_str())
            .field("authenticated", &self.inner.session.is_authenticated())
            .field("retry_guard", &self.inner.orchestrator.guard)
            .finish()
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client for the default AeroDB instance.
    ///
    /// # Examples
    ///
    /// ```
    /// use aeroclient::Client;
    ///
    /// # fn example() -> Result<(), aeroclient::Error> {
    /// let client = Client::new("my-api-key")?;
    /// assert_eq!(client.base_url().as_str(), "https://api.aerodb.net/");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        ClientBuilder::new().api_key(api_key).build()
    }

    /// Airports, identified by ICAO code.
    pub fn airports(&self) -> Resource<'_> {
        Resource::new(self, "airports")
    }

    /// Airlines.
    pub fn airlines(&self) -> Resource<'_> {
        Resource::new(self, "airlines")
    }

    /// NOTAMs.
    pub fn notams(&self) -> Resource<'_> {
        Resource::new(self, "notams")
    }

    /// Countries.
    pub fn countries(&self) -> Resource<'_> {
        Resource::new(self, "countries")
    }

    /// Returns the current session as reported by the API.
    pub async fn current_session<Res>(&self) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.get(SESSION_ENDPOINT).await
    }

    /// The base URL currently in use. Changes when the API redirects the client.
    pub fn base_url(&self) -> Url {
        self.inner.session.base_url()
    }

    /// The client session.
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// The token store backing the session.
    pub fn token_store(&self) -> &dyn TokenStore {
        self.inner.store.as_ref()
    }

    /// Subscribes to session events (instance changes, renewals, logouts).
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.session.subscribe()
    }

    /// Stores a token pair obtained by logging in and authenticates subsequent requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the store fails.
    pub fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        self.inner.session.set_bearer_token(access_token)?;
        self.inner.store.set(StoreKey::AccessToken, access_token)?;
        self.inner.store.set(StoreKey::RefreshToken, refresh_token)?;
        Ok(())
    }

    /// Ends the session: clears stored tokens and emits [`SessionEvent::LoggedOut`].
    ///
    /// Logging out twice is a no-op.
    pub fn logout(&self) -> Result<()> {
        self.inner
            .orchestrator
            .invalidator
            .invalidate(&self.inner.session, self.inner.store.as_ref())?;
        Ok(())
    }

    /// Makes a typed request.
    ///
    /// This is the main method for making requests. It handles serialization,
    /// recovery, logging, and deserialization.
    ///
    /// # Type Parameters
    ///
    /// * `Req` - The request body type (must implement `Serialize`)
    /// * `Res` - The response body type (must implement `DeserializeOwned`)
    ///
    /// # Arguments
    ///
    /// * `request` - Request descriptor (method, path, headers, etc.)
    /// * `body` - Optional request body
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use aeroclient::{Client, metadata::RequestDescriptor};
    /// use http::Method;
    ///
    /// # async fn example() -> Result<(), aeroclient::Error> {
    /// let client = Client::new("my-api-key")?;
    ///
    /// let request = RequestDescriptor::new(Method::GET, "airports")
    ///     .with_query_param("limit", "5");
    ///
    /// let response = client.call::<(), serde_json::Value>(request, None).await?;
    /// println!("{}", response.raw_body);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call<Req, Res>(
        &self,
        request: RequestDescriptor,
        body: Option<&Req>,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let mut request = request;
        if let Some(body) = body {
            let json = serde_json::to_value(body)
                .map_err(|e| Error::SerializationFailed(e.to_string()))?;
            request.body = Some(json);
        }

        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.dispatch(&request, attempt).await {
                Ok(response) => {
                    clear_retry_flag(self.inner.store.as_ref());
                    let latency = start_time.elapsed();
                    return self
                        .parse_response::<Res>(response, latency, attempt)
                        .await
                        .map(|r| r.with_recovery(request.recovery().cloned()));
                }
                Err(Error::Api(error)) => {
                    tracing::warn!(
                        kind = %error.kind(),
                        status = error.status.as_u16(),
                        attempt = attempt,
                        method = %request.method,
                        path = %request.path,
                        "Request failed"
                    );

                    let is_retry = request.is_retry();
                    let ctx = RecoveryContext {
                        session: &self.inner.session,
                        store: self.inner.store.as_ref(),
                        http_client: &self.inner.http_client,
                        timeout: self.inner.timeout,
                    };

                    match self.inner.orchestrator.recover(&ctx, request, error).await {
                        Outcome::Reissue(next) => {
                            log_reissue(&next);
                            request = next;
                        }
                        Outcome::Reject(e) => {
                            if is_retry {
                                clear_retry_flag(self.inner.store.as_ref());
                            }
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        method = %request.method,
                        path = %request.path,
                        "Request failed"
                    );
                    if request.is_retry() {
                        clear_retry_flag(self.inner.store.as_ref());
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Sends a single request. Non-2xx responses come back classified as [`Error::Api`].
    async fn dispatch(
        &self,
        request: &RequestDescriptor,
        attempt: usize,
    ) -> Result<reqwest::Response> {
        let url = request.url(&self.inner.session.base_url())?;

        tracing::debug!(
            method = %request.method,
            url = %url,
            attempt = attempt,
            retry = request.is_retry(),
            "Executing HTTP request"
        );

        let mut builder = self.inner.http_client.request(request.method.clone(), url);

        // Request headers override the session defaults.
        let mut headers = self.inner.session.default_headers();
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }
        builder = builder.headers(headers);

        if let Some(timeout) = self.inner.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout
            } else {
                Error::Network(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let raw_response = response.text().await.unwrap_or_default();

        if status.is_client_error() {
            tracing::info!(status = status.as_u16(), "Client error (4xx)");
        } else if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), response = %raw_response, "Server error (5xx)");
        }

        Err(Error::Api(classify(status, headers, raw_response)))
    }

    /// Parses a successful response and returns a typed `Response`.
    async fn parse_response<Res>(
        &self,
        response: reqwest::Response,
        latency: Duration,
        attempts: usize,
    ) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let status = response.status();
        let headers = response.headers().clone();

        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            attempts = attempts,
            "Received HTTP response"
        );

        let raw_body = response.text().await?;

        match serde_json::from_str::<Res>(&raw_body) {
            Ok(data) => Ok(Response::new(
                data, raw_body, status, headers, latency, attempts,
            )),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    raw_response = %raw_body,
                    "Failed to deserialize response"
                );

                Err(Error::DeserializationFailed {
                    raw_response: raw_body,
                    serde_error: e.to_string(),
                    status,
                })
            }
        }
    }

    /// Makes a GET request to the specified path.
    pub async fn get<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let request = RequestDescriptor::new(Method::GET, path);
        self.call::<(), Res>(request, None).await
    }

    /// Makes a POST request to the specified path with a JSON body.
    pub async fn post<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let request = RequestDescriptor::new(Method::POST, path);
        self.call(request, Some(body)).await
    }

    /// Makes a PUT request to the specified path with a JSON body.
    pub async fn put<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let request = RequestDescriptor::new(Method::PUT, path);
        self.call(request, Some(body)).await
    }

    /// Makes a DELETE request to the specified path.
    pub async fn delete<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let request = RequestDescriptor::new(Method::DELETE, path);
        self.call::<(), Res>(request, None).await
    }

    /// Makes a PATCH request to the specified path with a JSON body.
    pub async fn patch<Req, Res>(
        &self,
        path: impl Into<String>,
        body: &Req,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let request = RequestDescriptor::new(Method::PATCH, path);
        self.call(request, Some(body)).await
    }
}

fn log_reissue(request: &RequestDescriptor) {
    match request.recovery() {
        Some(RecoveryAction::Redirected { api_url }) => {
            tracing::info!(api_url = %api_url, path = %request.path, "Reissuing request on new instance");
        }
        Some(RecoveryAction::Renewed) => {
            tracing::info!(path = %request.path, "Reissuing request with renewed token");
        }
        None => {}
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use aeroclient::{ClientBuilder, RetryGuard, store::FileTokenStore};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), aeroclient::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.aerodb.net")?
///     .api_key("my-api-key")
///     .timeout(Duration::from_secs(30))
///     .token_store(Arc::new(FileTokenStore::new("/tmp/aerodb-tokens.json")))
///     .retry_guard(RetryGuard::PerRequest)
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    api_key: Option<String>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    token_store: Option<Arc<dyn TokenStore>>,
    token_renewer: Option<Box<dyn TokenRenewer>>,
    session_invalidator: Option<Box<dyn SessionInvalidator>>,
    retry_guard: RetryGuard,
    renewal_path: String,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            default_headers: HeaderMap::new(),
            timeout: None,
            token_store: None,
            token_renewer: None,
            session_invalidator: None,
            retry_guard: RetryGuard::default(),
            renewal_path: DEFAULT_RENEWAL_PATH.to_string(),
        }
    }

    /// Sets the base URL. Defaults to [`DEFAULT_API_URL`].
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the API key sent as `x-api-key` with every request. Required.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the token store. Defaults to a fresh [`MemoryTokenStore`].
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Sets the token renewer. Defaults to [`HttpTokenRenewer`].
    pub fn token_renewer(mut self, renewer: Box<dyn TokenRenewer>) -> Self {
        self.token_renewer = Some(renewer);
        self
    }

    /// Sets the session invalidator. Defaults to [`StoreInvalidator`].
    pub fn session_invalidator(mut self, invalidator: Box<dyn SessionInvalidator>) -> Self {
        self.session_invalidator = Some(invalidator);
        self
    }

    /// Sets the retry guard policy. Defaults to [`RetryGuard::PerRequest`].
    pub fn retry_guard(mut self, guard: RetryGuard) -> Self {
        self.retry_guard = guard;
        self
    }

    /// Sets the renewal endpoint path used by the default [`HttpTokenRenewer`].
    pub fn renewal_path(mut self, path: impl Into<String>) -> Self {
        self.renewal_path = path.into();
        self
    }

    /// Builds the configured `Client`.
    ///
    /// Clears a retry flag left behind by a previous process and authenticates
    /// the session with a stored access token, if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key was provided, the token store fails, or
    /// the HTTP client cannot be created.
    pub fn build(self) -> Result<Client> {
        let api_key = self
            .api_key
            .ok_or_else(|| Error::ConfigurationError("API key is required".to_string()))?;
        let base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_API_URL)?,
        };

        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        let store = self
            .token_store
            .unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        if store.contains(StoreKey::RetryFlag)? {
            tracing::debug!("Clearing stale retry flag");
            store.remove(StoreKey::RetryFlag)?;
        }

        let mut default_headers = self.default_headers;
        let api_key = HeaderValue::try_from(api_key)
            .map_err(|e| Error::ConfigurationError(format!("Invalid API key: {}", e)))?;
        default_headers.insert(HeaderName::from_static(API_KEY_HEADER), api_key);

        let session = Session::new(base_url, default_headers);
        if let Some(token) = usable_token(store.get(StoreKey::AccessToken)?) {
            session.set_bearer_token(&token)?;
        }

        let orchestrator = Orchestrator {
            guard: self.retry_guard,
            renewer: self
                .token_renewer
                .unwrap_or_else(|| Box::new(HttpTokenRenewer::new(self.renewal_path))),
            invalidator: self
                .session_invalidator
                .unwrap_or_else(|| Box::new(StoreInvalidator)),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                session,
                store,
                orchestrator,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
