//! Resource handles and list query parameters.
//!
//! Each AeroDB resource exposes `list` and `get`. Neither does any error
//! handling of its own: failures come back from the client's recovery pipeline
//! untouched.

use crate::metadata::RequestDescriptor;
use crate::{Client, Error, Response, Result};
use http::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Sort direction for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first (`1`).
    Ascending,
    /// Largest first (`-1`).
    Descending,
}

impl SortOrder {
    fn as_i64(self) -> i64 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// Query parameters accepted by `list` endpoints.
///
/// `sort` and `filter` are sent as JSON encoded strings.
///
/// # Examples
///
/// ```
/// use aeroclient::{QueryParameters, SortOrder};
/// use serde_json::json;
///
/// let params = QueryParameters::new()
///     .limit(20)
///     .sort_by("icao", SortOrder::Ascending)
///     .filter(json!({ "country": "FR" }));
///
/// let pairs = params.to_query_pairs().unwrap();
/// assert!(pairs.contains(&("limit".to_string(), "20".to_string())));
/// assert!(pairs.contains(&("sort".to_string(), r#"{"icao":1}"#.to_string())));
/// assert!(pairs.contains(&("filter".to_string(), r#"{"country":"FR"}"#.to_string())));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParameters {
    /// Maximum number of results.
    pub limit: Option<u64>,
    /// Number of results to skip.
    pub offset: Option<u64>,
    /// Page number, for paginated endpoints.
    pub page: Option<u64>,
    /// Sort fields, in priority order.
    pub sort: Vec<(String, SortOrder)>,
    /// Filter expression.
    pub filter: Option<Value>,
}

impl QueryParameters {
    /// Creates empty parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Selects a result page.
    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    /// Adds a sort field.
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    /// Sets the filter expression.
    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Serializes the parameters into query string pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if the filter cannot be encoded.
    pub fn to_query_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();

        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }

        if !self.sort.is_empty() {
            let sort: Map<String, Value> = self
                .sort
                .iter()
                .map(|(field, order)| (field.clone(), Value::from(order.as_i64())))
                .collect();
            let encoded = serde_json::to_string(&sort)
                .map_err(|e| Error::SerializationFailed(format!("Failed to encode sort: {}", e)))?;
            pairs.push(("sort".to_string(), encoded));
        }

        if let Some(filter) = &self.filter {
            let encoded = serde_json::to_string(filter).map_err(|e| {
                Error::SerializationFailed(format!("Failed to encode filter: {}", e))
            })?;
            pairs.push(("filter".to_string(), encoded));
        }

        Ok(pairs)
    }
}

/// A handle to one AeroDB resource collection.
///
/// Obtained from [`Client::airports`], [`Client::airlines`], [`Client::notams`]
/// or [`Client::countries`].
#[derive(Debug, Clone, Copy)]
pub struct Resource<'a> {
    client: &'a Client,
    path: &'static str,
}

impl<'a> Resource<'a> {
    pub(crate) fn new(client: &'a Client, path: &'static str) -> Self {
        Self { client, path }
    }

    /// The collection path, relative to the base URL.
    pub fn path(&self) -> &'static str {
        self.path
    }

    /// Lists the collection.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use aeroclient::{Client, QueryParameters};
    ///
    /// # async fn example() -> Result<(), aeroclient::Error> {
    /// let client = Client::new("my-api-key")?;
    /// let airlines = client
    ///     .airlines()
    ///     .list::<Vec<serde_json::Value>>(&QueryParameters::new().limit(10))
    ///     .await?;
    /// println!("{} airlines", airlines.data.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn list<T>(&self, params: &QueryParameters) -> Result<Response<T>>
    where
        T: DeserializeOwned,
    {
        let request =
            RequestDescriptor::new(Method::GET, self.path).with_query_params(params.to_query_pairs()?);
        self.client.call::<(), T>(request, None).await
    }

    /// Fetches a single entry by identifier (an ICAO code for airports).
    pub async fn get<T>(&self, id: &str) -> Result<Response<T>>
    where
        T: DeserializeOwned,
    {
        let path = format!("{}/{}", self.path, urlencode_segment(id));
        self.client.get(path).await
    }
}

fn urlencode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
