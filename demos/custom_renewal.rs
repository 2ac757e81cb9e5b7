//! Example demonstrating custom renewal and invalidation collaborators.
//!
//! This example shows how to:
//! - Plug in a custom token renewer
//! - Hook the logout performed when renewal fails
//! - Persist tokens on disk across runs
//! - Serialize recovery across the whole process
//!
//! Run with: `AERODB_API_KEY=... cargo run --example custom_renewal`

use aeroclient::auth::{
    HttpTokenRenewer, RenewalContext, RenewedToken, SessionInvalidator, StoreInvalidator,
    TokenRenewer,
};
use aeroclient::store::{FileTokenStore, StoreError, TokenStore};
use aeroclient::{Client, Error, RetryGuard, Session};
use async_trait::async_trait;
use std::sync::Arc;

/// Renewer that logs each attempt before delegating to the HTTP endpoint.
struct LoggingRenewer {
    inner: HttpTokenRenewer,
}

#[async_trait]
impl TokenRenewer for LoggingRenewer {
    async fn renew(&self, ctx: RenewalContext<'_>) -> Option<RenewedToken> {
        println!("Renewing access token against {}", ctx.session.base_url());
        let renewed = self.inner.renew(ctx).await;
        println!("Renewal {}", if renewed.is_some() { "succeeded" } else { "failed" });
        renewed
    }
}

/// Invalidator that tells the user before clearing the session.
struct NotifyingInvalidator;

impl SessionInvalidator for NotifyingInvalidator {
    fn invalidate(&self, session: &Session, store: &dyn TokenStore) -> Result<(), StoreError> {
        println!("Session expired, signing out");
        StoreInvalidator.invalidate(session, store)
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("aeroclient=info,custom_renewal=info")
        .init();

    let api_key = std::env::var("AERODB_API_KEY").unwrap_or_default();
    let token_path = std::env::temp_dir().join("aeroclient-demo-tokens.json");

    let client = Client::builder()
        .api_key(api_key)
        .token_store(Arc::new(FileTokenStore::new(&token_path)))
        .token_renewer(Box::new(LoggingRenewer {
            inner: HttpTokenRenewer::default(),
        }))
        .session_invalidator(Box::new(NotifyingInvalidator))
        .retry_guard(RetryGuard::ProcessWide)
        .build()?;

    println!("Tokens persisted at {}", token_path.display());
    println!("Authenticated: {}", client.session().is_authenticated());

    match client.notams().get::<serde_json::Value>("A1234/24").await {
        Ok(response) => println!("NOTAM: {}", response.data),
        Err(e) => println!("Failed: {}", e),
    }

    Ok(())
}
