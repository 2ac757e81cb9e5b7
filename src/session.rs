//! Mutable client session state.
//!
//! The [`Session`] owns the current base URL and the default headers sent with
//! every request. Recovery mutates it in place: a redirect replaces the base URL
//! and a renewal replaces the `Authorization` header.

use crate::{Error, Result};
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use url::Url;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

const EVENT_CAPACITY: usize = 16;

/// Notifications emitted when the session changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The base URL was switched to another API instance.
    InstanceChanged {
        /// The new base URL.
        api_url: Url,
    },
    /// A new access token was obtained with the refresh token.
    TokenRenewed,
    /// The session's tokens were discarded.
    LoggedOut,
}

/// Base URL, default headers and event channel shared by all requests of a client.
#[derive(Debug)]
pub struct Session {
    base_url: RwLock<Url>,
    default_headers: RwLock<HeaderMap>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub(crate) fn new(base_url: Url, default_headers: HeaderMap) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            base_url: RwLock::new(base_url),
            default_headers: RwLock::new(default_headers),
            events,
        }
    }

    /// The base URL currently in use.
    pub fn base_url(&self) -> Url {
        self.base_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_base_url(&self, url: Url) {
        *self.base_url.write().unwrap_or_else(PoisonError::into_inner) = url;
    }

    /// A snapshot of the default headers.
    pub fn default_headers(&self) -> HeaderMap {
        self.default_headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `true` if requests currently carry a bearer token.
    pub fn is_authenticated(&self) -> bool {
        self.default_headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(AUTHORIZATION)
    }

    pub(crate) fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.default_headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
    }

    pub(crate) fn set_bearer_token(&self, token: &str) -> Result<()> {
        self.insert_header(AUTHORIZATION, bearer(token)?);
        Ok(())
    }

    /// Removes the `Authorization` header. Returns `true` if one was present.
    pub(crate) fn clear_authorization(&self) -> bool {
        self.default_headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(AUTHORIZATION)
            .is_some()
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

/// Builds an `Authorization: Bearer <token>` header value.
pub(crate) fn bearer(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::try_from(format!("Bearer {}", token))
        .map_err(|e| Error::ConfigurationError(format!("Invalid bearer token: {}", e)))?;
    value.set_sensitive(true);
    Ok(value)
}
