//! Example demonstrating error handling and session events.
//!
//! This example shows how to:
//! - Tell classified API errors apart by kind
//! - Detect a request that failed again after recovery
//! - React to logouts and instance changes through session events
//!
//! Run with: `AERODB_API_KEY=... cargo run --example error_handling`

use aeroclient::{ApiErrorKind, Client, Error, ErrorDetails, SessionEvent};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Country {
    code: String,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("aeroclient=info")
        .init();

    let api_key = std::env::var("AERODB_API_KEY").unwrap_or_default();
    let client = Client::new(api_key)?;

    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::LoggedOut => println!("[event] logged out, please sign in again"),
                SessionEvent::InstanceChanged { api_url } => {
                    println!("[event] now talking to {}", api_url)
                }
                SessionEvent::TokenRenewed => println!("[event] access token renewed"),
            }
        }
    });

    // Tokens obtained from a previous login
    client.set_tokens("expired-access-token", "refresh-token")?;

    println!("=== Handling API Errors ===");
    match client.countries().get::<Country>("FR").await {
        Ok(response) => println!("Success: {:?}", response.data),
        Err(Error::Api(e)) => {
            println!("API Error!");
            println!("  Kind: {}", e.kind());
            println!("  Status: {}", e.status);
            println!("  Error code: {:?}", e.error_code);
            println!("  Message: {:?}", e.readable);
            match &e.details {
                ErrorDetails::InvalidInstance { api_url: None, .. } => {
                    println!("  Server reported a wrong instance without naming one")
                }
                ErrorDetails::InvalidToken(_) => println!("  Renewal failed, session ended"),
                ErrorDetails::Unknown(details) => println!("  Details: {:?}", details),
                ErrorDetails::InvalidInstance {
                    api_url: Some(url), ..
                } => {
                    println!("  Unusable instance URL: {}", url)
                }
            }
        }
        Err(Error::RetryExhausted(e)) => {
            println!("Recovered once but failed again ({})", e.kind());
        }
        Err(Error::DeserializationFailed {
            raw_response,
            serde_error,
            ..
        }) => {
            println!("Unexpected payload: {}", serde_error);
            println!("  Raw response: {}", raw_response);
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Checking Kinds Generically ===");
    let result = client.current_session::<serde_json::Value>().await;
    if let Err(e) = &result {
        println!("Status: {:?}", e.status());
        println!("Kind: {:?}", e.kind());
        println!("Token problem: {}", e.kind() == Some(ApiErrorKind::InvalidToken));
    }

    Ok(())
}
