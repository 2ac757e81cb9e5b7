//! Recovery of failed requests.
//!
//! Every non-2xx response passes through [`Orchestrator::recover`] before it
//! reaches the caller. Two server-driven conditions are recoverable:
//!
//! - `invalidInstance`: the session is switched to the base URL named in
//!   `details.apiUrl` and the request is reissued there.
//! - `invalidToken`: the stored refresh token is exchanged for a new access token
//!   and the request is reissued with it. If renewal fails the session is
//!   invalidated and the original error is returned.
//!
//! A request is retried at most once. The reissued descriptor carries a retry
//! marker and any failure it hits is rejected as
//! [`Error::RetryExhausted`](crate::Error::RetryExhausted).

use crate::auth::{RenewalContext, SessionInvalidator, TokenRenewer};
use crate::classify::{ApiError, ApiErrorKind};
use crate::metadata::{RecoveryAction, RequestDescriptor};
use crate::session::{bearer, Session, SessionEvent};
use crate::store::{usable_token, StoreError, StoreKey, TokenStore};
use crate::{Error, Result};
use http::header::AUTHORIZATION;
use std::time::Duration;
use url::Url;

/// Value written to the retry flag slot while a retry is outstanding.
const RETRY_FLAG_VALUE: &str = "1";

/// Decides when a failure must be rejected without attempting recovery.
///
/// # Examples
///
/// ```
/// use aeroclient::{Client, RetryGuard};
///
/// # fn example() -> Result<(), aeroclient::Error> {
/// let client = Client::builder()
///     .api_key("my-key")
///     .retry_guard(RetryGuard::ProcessWide)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryGuard {
    /// Reject only failures of a request that is itself a recovery retry.
    ///
    /// Concurrent requests recover independently of each other.
    #[default]
    PerRequest,

    /// Additionally reject every failure while the store's retry flag is set.
    ///
    /// This serializes recovery across the whole process: a request failing
    /// while another request's retry is in flight is rejected immediately.
    ProcessWide,
}

impl RetryGuard {
    /// Returns `true` if the failure of `request` must be rejected outright.
    pub(crate) fn blocks(
        &self,
        request: &RequestDescriptor,
        store: &dyn TokenStore,
    ) -> std::result::Result<bool, StoreError> {
        if request.is_retry() {
            return Ok(true);
        }
        match self {
            RetryGuard::PerRequest => Ok(false),
            RetryGuard::ProcessWide => store.contains(StoreKey::RetryFlag),
        }
    }
}

/// The result of running a failure through the orchestrator.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// Send this descriptor again.
    Reissue(RequestDescriptor),
    /// Give up and return this error to the caller.
    Reject(Error),
}

/// The response-path recovery state machine.
pub(crate) struct Orchestrator {
    pub(crate) guard: RetryGuard,
    pub(crate) renewer: Box<dyn TokenRenewer>,
    pub(crate) invalidator: Box<dyn SessionInvalidator>,
}

/// Shared client state the orchestrator reads and mutates.
pub(crate) struct RecoveryContext<'a> {
    pub(crate) session: &'a Session,
    pub(crate) store: &'a dyn TokenStore,
    pub(crate) http_client: &'a reqwest::Client,
    pub(crate) timeout: Option<Duration>,
}

impl Orchestrator {
    /// Decides what to do with a classified failure of `request`.
    pub(crate) async fn recover(
        &self,
        ctx: &RecoveryContext<'_>,
        request: RequestDescriptor,
        error: ApiError,
    ) -> Outcome {
        match self.try_recover(ctx, request, error).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Reject(e),
        }
    }

    async fn try_recover(
        &self,
        ctx: &RecoveryContext<'_>,
        request: RequestDescriptor,
        error: ApiError,
    ) -> Result<Outcome> {
        if self.guard.blocks(&request, ctx.store)? {
            tracing::warn!(
                kind = %error.kind(),
                status = error.status.as_u16(),
                path = %request.path,
                "Failure during an outstanding retry, not recovering"
            );
            return Ok(Outcome::Reject(Error::RetryExhausted(error)));
        }

        match error.kind() {
            ApiErrorKind::InvalidInstance => self.redirect(ctx, request, error),
            ApiErrorKind::InvalidToken => self.renew(ctx, request, error).await,
            ApiErrorKind::Unknown => Ok(Outcome::Reject(Error::Api(error))),
        }
    }

    fn redirect(
        &self,
        ctx: &RecoveryContext<'_>,
        mut request: RequestDescriptor,
        error: ApiError,
    ) -> Result<Outcome> {
        let api_url = match error.api_url().map(Url::parse) {
            Some(Ok(url)) => url,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Ignoring unparsable instance URL");
                return Ok(Outcome::Reject(Error::Api(error)));
            }
            None => {
                tracing::warn!("Invalid instance reported without an instance URL");
                return Ok(Outcome::Reject(Error::Api(error)));
            }
        };

        tracing::info!(api_url = %api_url, path = %request.path, "Switching API instance");

        ctx.session.set_base_url(api_url.clone());
        ctx.session.emit(SessionEvent::InstanceChanged {
            api_url: api_url.clone(),
        });
        ctx.store.set(StoreKey::RetryFlag, RETRY_FLAG_VALUE)?;

        request.base_url = Some(api_url.clone());
        Ok(Outcome::Reissue(
            request.into_retry(RecoveryAction::Redirected { api_url }),
        ))
    }

    async fn renew(
        &self,
        ctx: &RecoveryContext<'_>,
        request: RequestDescriptor,
        error: ApiError,
    ) -> Result<Outcome> {
        let Some(refresh_token) = usable_token(ctx.store.get(StoreKey::RefreshToken)?) else {
            tracing::warn!("Access token rejected and no usable refresh token is stored");
            return Ok(Outcome::Reject(Error::Api(error)));
        };

        ctx.store.set(StoreKey::RetryFlag, RETRY_FLAG_VALUE)?;

        let outcome = self.renew_with(ctx, request, error, &refresh_token).await;
        if !matches!(outcome, Ok(Outcome::Reissue(_))) {
            clear_retry_flag(ctx.store);
        }
        outcome
    }

    async fn renew_with(
        &self,
        ctx: &RecoveryContext<'_>,
        mut request: RequestDescriptor,
        error: ApiError,
        refresh_token: &str,
    ) -> Result<Outcome> {
        let renewed = self
            .renewer
            .renew(RenewalContext {
                refresh_token,
                session: ctx.session,
                http_client: ctx.http_client,
                timeout: ctx.timeout,
            })
            .await;

        let renewed = renewed
            .filter(|r| !r.token.is_empty())
            .and_then(|r| match bearer(&r.token) {
                Ok(header) => Some((r, header)),
                Err(e) => {
                    tracing::warn!(error = %e, "Renewed token is not a valid header value");
                    None
                }
            });
        let Some((renewed, header)) = renewed else {
            tracing::warn!("Token renewal failed, invalidating session");
            self.invalidator.invalidate(ctx.session, ctx.store)?;
            return Ok(Outcome::Reject(Error::Api(error)));
        };

        ctx.store.set(StoreKey::AccessToken, &renewed.token)?;
        if let Some(rotated) = &renewed.refresh_token {
            ctx.store.set(StoreKey::RefreshToken, rotated)?;
        }
        ctx.session.insert_header(AUTHORIZATION, header.clone());
        ctx.session.emit(SessionEvent::TokenRenewed);

        tracing::info!(path = %request.path, "Access token renewed");

        request.headers.insert(AUTHORIZATION, header);
        Ok(Outcome::Reissue(request.into_retry(RecoveryAction::Renewed)))
    }
}

/// Clears the retry flag, logging instead of failing on store errors.
pub(crate) fn clear_retry_flag(store: &dyn TokenStore) {
    if let Err(e) = store.remove(StoreKey::RetryFlag) {
        tracing::warn!(error = %e, "Failed to clear retry flag");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{RenewedToken, StoreInvalidator};
    use crate::classify::classify;
    use crate::store::MemoryTokenStore;
    use async_trait::async_trait;
    use http::{HeaderMap, Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedRenewer {
        token: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TokenRenewer for FixedRenewer {
        async fn renew(&self, _ctx: RenewalContext<'_>) -> Option<RenewedToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.token.map(RenewedToken::new)
        }
    }

    struct Fixture {
        session: Session,
        store: MemoryTokenStore,
        http_client: reqwest::Client,
        renewals: Arc<AtomicUsize>,
        orchestrator: Orchestrator,
    }

    impl Fixture {
        fn new(guard: RetryGuard, token: Option<&'static str>) -> Self {
            let renewals = Arc::new(AtomicUsize::new(0));
            Self {
                session: Session::new(Url::parse("https://old.example").unwrap(), HeaderMap::new()),
                store: MemoryTokenStore::new(),
                http_client: reqwest::Client::new(),
                renewals: renewals.clone(),
                orchestrator: Orchestrator {
                    guard,
                    renewer: Box::new(FixedRenewer {
                        token,
                        calls: renewals,
                    }),
                    invalidator: Box::new(StoreInvalidator),
                },
            }
        }

        async fn recover(&self, request: RequestDescriptor, body: &str) -> Outcome {
            let ctx = RecoveryContext {
                session: &self.session,
                store: &self.store,
                http_client: &self.http_client,
                timeout: None,
            };
            let error = classify(StatusCode::UNAUTHORIZED, HeaderMap::new(), body.to_string());
            self.orchestrator.recover(&ctx, request, error).await
        }
    }

    const INVALID_TOKEN: &str = r#"{"error":{"type":"invalidToken"}}"#;

    fn request() -> RequestDescriptor {
        RequestDescriptor::new(Method::GET, "airports")
    }

    #[tokio::test]
    async fn test_unknown_is_rejected_untouched() {
        let fixture = Fixture::new(RetryGuard::PerRequest, Some("new"));
        let outcome = fixture.recover(request(), "Internal error").await;

        assert!(matches!(outcome, Outcome::Reject(Error::Api(ref e)) if e.kind() == ApiErrorKind::Unknown));
        assert_eq!(fixture.session.base_url().as_str(), "https://old.example/");
        assert!(!fixture.store.contains(StoreKey::RetryFlag).unwrap());
        assert_eq!(fixture.renewals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_redirect_sets_base_url_and_flag() {
        let fixture = Fixture::new(RetryGuard::PerRequest, None);
        let outcome = fixture
            .recover(
                request(),
                r#"{"error":{"type":"invalidInstance","details":{"apiUrl":"https://x/api"}}}"#,
            )
            .await;

        let retry = match outcome {
            Outcome::Reissue(retry) => retry,
            other => panic!("Expected a reissue, got {:?}", other),
        };
        assert_eq!(fixture.session.base_url().as_str(), "https://x/api");
        assert_eq!(retry.base_url.as_ref().map(Url::as_str), Some("https://x/api"));
        assert!(retry.is_retry());
        assert!(fixture.store.contains(StoreKey::RetryFlag).unwrap());
    }

    #[tokio::test]
    async fn test_redirect_without_url_is_rejected() {
        let fixture = Fixture::new(RetryGuard::PerRequest, None);
        for body in [
            r#"{"error":{"type":"invalidInstance"}}"#,
            r#"{"error":{"type":"invalidInstance","details":{"apiUrl":"not a url"}}}"#,
        ] {
            let outcome = fixture.recover(request(), body).await;
            assert!(matches!(outcome, Outcome::Reject(Error::Api(_))), "body: {body}");
        }
        assert_eq!(fixture.session.base_url().as_str(), "https://old.example/");
        assert!(!fixture.store.contains(StoreKey::RetryFlag).unwrap());
    }

    #[tokio::test]
    async fn test_unusable_refresh_token_skips_renewal() {
        for stored in [None, Some("null"), Some("\"null\""), Some("")] {
            let fixture = Fixture::new(RetryGuard::PerRequest, Some("new"));
            if let Some(value) = stored {
                fixture.store.set(StoreKey::RefreshToken, value).unwrap();
            }

            let outcome = fixture.recover(request(), INVALID_TOKEN).await;

            assert!(matches!(outcome, Outcome::Reject(Error::Api(_))));
            assert_eq!(fixture.renewals.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_renewal_success_reissues_with_bearer() {
        let fixture = Fixture::new(RetryGuard::PerRequest, Some("new123"));
        fixture.store.set(StoreKey::RefreshToken, "abc").unwrap();

        let Outcome::Reissue(retry) = fixture.recover(request(), INVALID_TOKEN).await else {
            panic!("Expected a reissue");
        };

        assert_eq!(retry.headers[AUTHORIZATION], "Bearer new123");
        assert_eq!(retry.recovery(), Some(&RecoveryAction::Renewed));
        assert_eq!(
            fixture.store.get(StoreKey::AccessToken).unwrap().as_deref(),
            Some("new123")
        );
        assert_eq!(fixture.session.default_headers()[AUTHORIZATION], "Bearer new123");
        assert_eq!(fixture.renewals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_renewal_failure_invalidates_and_returns_original() {
        let fixture = Fixture::new(RetryGuard::PerRequest, None);
        fixture.store.set(StoreKey::AccessToken, "old").unwrap();
        fixture.store.set(StoreKey::RefreshToken, "abc").unwrap();
        let mut events = fixture.session.subscribe();

        let outcome = fixture.recover(request(), INVALID_TOKEN).await;

        match outcome {
            Outcome::Reject(Error::Api(e)) => assert_eq!(e.kind(), ApiErrorKind::InvalidToken),
            other => panic!("Expected the original invalidToken error, got {:?}", other),
        }
        assert_eq!(fixture.store.get(StoreKey::RefreshToken).unwrap(), None);
        assert!(!fixture.store.contains(StoreKey::RetryFlag).unwrap());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
    }

    #[tokio::test]
    async fn test_unusable_renewed_token_invalidates_and_returns_original() {
        let fixture = Fixture::new(RetryGuard::PerRequest, Some("bad\ntoken"));
        fixture.store.set(StoreKey::AccessToken, "old").unwrap();
        fixture.store.set(StoreKey::RefreshToken, "abc").unwrap();
        let mut events = fixture.session.subscribe();

        let outcome = fixture.recover(request(), INVALID_TOKEN).await;

        match outcome {
            Outcome::Reject(Error::Api(e)) => assert_eq!(e.kind(), ApiErrorKind::InvalidToken),
            other => panic!("Expected the original invalidToken error, got {:?}", other),
        }
        assert_eq!(fixture.store.get(StoreKey::AccessToken).unwrap(), None);
        assert_eq!(fixture.store.get(StoreKey::RefreshToken).unwrap(), None);
        assert!(!fixture.store.contains(StoreKey::RetryFlag).unwrap());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
        assert_eq!(fixture.renewals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_is_never_recovered_again() {
        let fixture = Fixture::new(RetryGuard::PerRequest, Some("new"));
        fixture.store.set(StoreKey::RefreshToken, "abc").unwrap();
        let retry = request().into_retry(RecoveryAction::Renewed);

        let outcome = fixture.recover(retry, INVALID_TOKEN).await;

        assert!(matches!(outcome, Outcome::Reject(Error::RetryExhausted(_))));
        assert_eq!(fixture.renewals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_process_wide_guard_honors_flag() {
        let fixture = Fixture::new(RetryGuard::ProcessWide, Some("new"));
        fixture.store.set(StoreKey::RefreshToken, "abc").unwrap();
        fixture.store.set(StoreKey::RetryFlag, "1").unwrap();

        let outcome = fixture.recover(request(), INVALID_TOKEN).await;

        assert!(matches!(outcome, Outcome::Reject(Error::RetryExhausted(_))));
        assert_eq!(fixture.renewals.load(Ordering::SeqCst), 0);
        assert!(fixture.store.contains(StoreKey::RetryFlag).unwrap());
    }

    #[tokio::test]
    async fn test_per_request_guard_ignores_foreign_flag() {
        let fixture = Fixture::new(RetryGuard::PerRequest, Some("new"));
        fixture.store.set(StoreKey::RefreshToken, "abc").unwrap();
        fixture.store.set(StoreKey::RetryFlag, "1").unwrap();

        let outcome = fixture.recover(request(), INVALID_TOKEN).await;

        assert!(matches!(outcome, Outcome::Reissue(_)));
        assert_eq!(fixture.renewals.load(Ordering::SeqCst), 1);
    }
}
