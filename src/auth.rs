//! Token renewal and session invalidation.
//!
//! Both collaborators are traits so applications can plug in their own
//! authentication flows; [`HttpTokenRenewer`] and [`StoreInvalidator`] are the
//! defaults installed by [`ClientBuilder`](crate::ClientBuilder).

use crate::metadata::join_path;
use crate::session::{Session, SessionEvent, API_KEY_HEADER};
use crate::store::{StoreError, StoreKey, TokenStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default path of the renewal endpoint, relative to the base URL.
pub const DEFAULT_RENEWAL_PATH: &str = "auth/refresh";

/// Tokens returned by a successful renewal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewedToken {
    /// The new access token.
    pub token: String,
    /// A rotated refresh token, if the server issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl RenewedToken {
    /// Creates a renewal result carrying only an access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            refresh_token: None,
        }
    }
}

/// Everything a renewal needs to reach the API.
pub struct RenewalContext<'a> {
    /// The refresh token to exchange.
    pub refresh_token: &'a str,
    /// The client session (base URL and default headers).
    pub session: &'a Session,
    /// The underlying HTTP client. Requests sent through it bypass recovery.
    pub http_client: &'a reqwest::Client,
    /// The request timeout configured on the client, if any.
    pub timeout: Option<Duration>,
}

/// Exchanges a refresh token for a new access token.
///
/// Implementations perform exactly one renewal call and do not retry. They do
/// not touch the token store; the client persists whatever they return.
///
/// # Examples
///
/// ```
/// use aeroclient::auth::{RenewalContext, RenewedToken, TokenRenewer};
///
/// struct StaticRenewer;
///
/// #[async_trait::async_trait]
/// impl TokenRenewer for StaticRenewer {
///     async fn renew(&self, _ctx: RenewalContext<'_>) -> Option<RenewedToken> {
///         Some(RenewedToken::new("fixed-token"))
///     }
/// }
/// ```
#[async_trait]
pub trait TokenRenewer: Send + Sync {
    /// Returns the renewed token, or `None` if renewal failed.
    async fn renew(&self, ctx: RenewalContext<'_>) -> Option<RenewedToken>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenewalRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenewalResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Renews tokens by posting the refresh token to the API.
///
/// Sends `POST <base>/auth/refresh` with `{"refreshToken": "..."}` and expects
/// `{"token": "...", "refreshToken": "..."}` back. Any failure, including a
/// missing or empty `token`, is reported as `None`.
#[derive(Debug, Clone)]
pub struct HttpTokenRenewer {
    path: String,
}

impl HttpTokenRenewer {
    /// Creates a renewer posting to `path`, relative to the session base URL.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for HttpTokenRenewer {
    fn default() -> Self {
        Self::new(DEFAULT_RENEWAL_PATH)
    }
}

#[async_trait]
impl TokenRenewer for HttpTokenRenewer {
    async fn renew(&self, ctx: RenewalContext<'_>) -> Option<RenewedToken> {
        let url = match join_path(&ctx.session.base_url(), &self.path) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path, "Invalid renewal URL");
                return None;
            }
        };

        let mut request = ctx.http_client.post(url.clone());
        if let Some(timeout) = ctx.timeout {
            request = request.timeout(timeout);
        }
        if let Some(api_key) = ctx.session.default_headers().get(API_KEY_HEADER) {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = match request
            .json(&RenewalRequest {
                refresh_token: ctx.refresh_token,
            })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "Token renewal request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), url = %url, "Token renewal rejected");
            return None;
        }

        match response.json::<RenewalResponse>().await {
            Ok(RenewalResponse {
                token: Some(token),
                refresh_token,
            }) if !token.is_empty() => Some(RenewedToken {
                token,
                refresh_token: refresh_token.filter(|t| !t.is_empty()),
            }),
            Ok(_) => {
                tracing::warn!(url = %url, "Token renewal returned no token");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "Failed to decode token renewal response");
                None
            }
        }
    }
}

/// Ends a session after its tokens became unusable.
///
/// Implementations must be idempotent: invalidating a session that is already
/// logged out is a no-op.
pub trait SessionInvalidator: Send + Sync {
    /// Clears the session's tokens and signals the logout.
    fn invalidate(&self, session: &Session, store: &dyn TokenStore) -> Result<(), StoreError>;
}

/// Removes both tokens from the store, drops the bearer header and emits
/// [`SessionEvent::LoggedOut`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreInvalidator;

impl SessionInvalidator for StoreInvalidator {
    fn invalidate(&self, session: &Session, store: &dyn TokenStore) -> Result<(), StoreError> {
        let had_tokens =
            store.contains(StoreKey::AccessToken)? || store.contains(StoreKey::RefreshToken)?;
        let had_header = session.clear_authorization();

        if !had_tokens && !had_header {
            tracing::debug!("Session already logged out");
            return Ok(());
        }

        store.remove(StoreKey::AccessToken)?;
        store.remove(StoreKey::RefreshToken)?;

        tracing::info!("Session invalidated");
        session.emit(SessionEvent::LoggedOut);
        Ok(())
    }
}
