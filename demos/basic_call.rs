//! Basic example demonstrating resource lookups.
//!
//! This example shows how to:
//! - Create a client with an API key
//! - Fetch a single airport by ICAO code
//! - List airlines with pagination, sorting and a filter
//! - Access response data and metadata
//!
//! Run with: `AERODB_API_KEY=... cargo run --example basic_call`

use aeroclient::{Client, Error, QueryParameters, SortOrder};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Airport {
    icao: String,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("aeroclient=debug,basic_call=info")
        .init();

    let api_key = std::env::var("AERODB_API_KEY").unwrap_or_default();
    let client = Client::new(api_key)?;

    println!("=== Airport Lookup ===");
    let response = client.airports().get::<Airport>("EGLL").await?;

    println!("ICAO: {}", response.data.icao);
    println!("Name: {}", response.data.name);
    println!("Request latency: {:?}", response.latency);
    println!("Status code: {}", response.status);
    println!();

    println!("=== Airline Listing ===");
    let params = QueryParameters::new()
        .limit(5)
        .sort_by("name", SortOrder::Ascending)
        .filter(json!({ "country": "FR" }));
    let response = client
        .airlines()
        .list::<Vec<serde_json::Value>>(&params)
        .await?;

    println!("Fetched {} airlines", response.data.len());
    println!();

    println!("=== Accessing Response Metadata ===");
    println!("Raw response length: {} bytes", response.raw_body.len());
    println!("Content-Type: {:?}", response.header("content-type"));
    println!("Was retried: {}", response.was_retried());
    println!("Recovery: {:?}", response.recovery);
    println!("Base URL now: {}", client.base_url());

    Ok(())
}
