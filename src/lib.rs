//! # aeroclient - AeroDB aviation data API client
//!
//! Typed read access to the AeroDB API (airports, airlines, NOTAMs, countries)
//! built on top of `reqwest`, with bearer-token session handling and transparent
//! recovery from the two conditions the API signals explicitly:
//!
//! - **Instance redirection** - the server answers `invalidInstance` with the
//!   base URL the client should use instead. The client switches its session to
//!   that URL and reissues the request.
//! - **Token expiry** - the server answers `invalidToken`. The client exchanges
//!   the stored refresh token for a new access token and reissues the request.
//!   If renewal fails the session is logged out and the original error returned.
//!
//! Each request is reissued at most once.
//!
//! ## Quick Start
//!
//! ```no_run
//! use aeroclient::{Client, QueryParameters, SortOrder};
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Deserialize)]
//! struct Airport {
//!     icao: String,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), aeroclient::Error> {
//!     let client = Client::new("my-api-key")?;
//!
//!     // Authenticate with tokens obtained at login
//!     client.set_tokens("access-token", "refresh-token")?;
//!
//!     let airport = client.airports().get::<Airport>("LFPG").await?;
//!     println!("{}: {}", airport.data.icao, airport.data.name);
//!
//!     let params = QueryParameters::new()
//!         .limit(25)
//!         .sort_by("name", SortOrder::Ascending)
//!         .filter(json!({ "country": "FR" }));
//!     let airports = client.airports().list::<Vec<Airport>>(&params).await?;
//!     println!("{} airports, recovered: {:?}", airports.data.len(), airports.recovery);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Failed responses are classified into an [`ApiError`] with a closed
//! [`ApiErrorKind`] and typed details:
//!
//! ```no_run
//! use aeroclient::{ApiErrorKind, Client, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::new("my-api-key")?;
//! match client.countries().get::<serde_json::Value>("FR").await {
//!     Ok(response) => println!("Success: {:?}", response.data),
//!     Err(Error::Api(e)) if e.kind() == ApiErrorKind::InvalidToken => {
//!         eprintln!("Session expired and could not be renewed");
//!     }
//!     Err(Error::RetryExhausted(e)) => {
//!         eprintln!("Recovered once, failed again: {}", e);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Session Storage
//!
//! Tokens live in a [`TokenStore`](store::TokenStore). The default is in-memory;
//! [`FileTokenStore`](store::FileTokenStore) keeps them across restarts:
//!
//! ```no_run
//! use aeroclient::{Client, store::FileTokenStore};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), aeroclient::Error> {
//! let client = Client::builder()
//!     .api_key("my-api-key")
//!     .token_store(Arc::new(FileTokenStore::new("tokens.json")))
//!     .build()?;
//!
//! let mut events = client.subscribe();
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod classify;
mod client;
mod error;
pub mod metadata;
mod recovery;
mod resources;
mod response;
mod session;
pub mod store;

pub use classify::{ApiError, ApiErrorKind, ErrorDetails};
pub use client::{Client, ClientBuilder, DEFAULT_API_URL};
pub use error::{Error, Result};
pub use metadata::RecoveryAction;
pub use recovery::RetryGuard;
pub use resources::{QueryParameters, Resource, SortOrder};
pub use response::Response;
pub use session::{Session, SessionEvent};
