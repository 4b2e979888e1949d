//! Wire models and the transport seam of the occurrence search service.
//!
//! The service is a black box behind five endpoints (three POST search
//! variants, autocomplete, single-record fetch). Everything above this
//! module talks to it through the [`SearchTransport`] trait so the execution
//! layer can be exercised against an in-memory transport in tests, and so
//! cancellation is carried by an explicit token rather than a
//! transport-specific mechanism.

mod http;
pub use http::HttpTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors produced by the transport and execution layers.
///
/// `Cancelled` is an expected outcome of descriptor supersession and must be
/// swallowed, never shown to the user. `NotFound` is a distinct, expected
/// outcome of single-record fetches (a dangling link renders a "not found"
/// view, not an error view). The remaining variants surface as a uniform
/// "search failed" condition carrying diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("server responded with status {status}: {body}")]
    Server { status: u16, body: String },
    #[error("record not found")]
    NotFound,
    #[error("request cancelled")]
    Cancelled,
    #[error("response decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether this error is a silent supersession rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Transport boundary to the remote search service.
///
/// Implementations must honor the cancellation token: once it fires, the
/// call returns [`ApiError::Cancelled`] promptly and any underlying request
/// is abandoned.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// POST a JSON body to `path` (relative to the service base URL).
    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        cancel: &CancellationToken,
    ) -> ApiResult<Value>;

    /// GET `path` with query parameters.
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> ApiResult<Value>;
}

/// One specimen record as returned by the service.
///
/// Only the fields the client reasons about are typed; the remainder of the
/// record travels in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Occurrence {
    #[serde(rename = "occurrenceID")]
    pub occurrence_id: String,
    pub scientific_name: Option<String>,
    pub floritaly_name: Option<String>,
    pub country: Option<String>,
    pub locality: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u8>,
    pub institution_code: Option<String>,
    pub decimal_latitude: Option<f64>,
    pub decimal_longitude: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of gallery/table results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OccurrencePage {
    pub occurrences: Vec<Occurrence>,
    /// Total matches across all pages.
    pub count: u64,
}

/// A georeferenced record of the map variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapPoint {
    pub decimal_latitude: f64,
    pub decimal_longitude: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Map-variant response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOccurrences {
    pub occurrences: Vec<MapPoint>,
}

/// One aggregate bucket of the graph variant.
///
/// The grouping key arrives under the name of the `groupBy` dimension
/// (e.g. `{"year": 1950, "count": 12}`), so it is kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphBucket {
    pub count: u64,
    #[serde(flatten)]
    pub group: Map<String, Value>,
}

impl GraphBucket {
    /// The bucket's key for a given grouping dimension.
    #[must_use]
    pub fn key(&self, group_by: &str) -> Option<&Value> {
        self.group.get(group_by)
    }
}

/// Graph-variant response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphResult {
    pub occurrences: Vec<GraphBucket>,
}

/// Autocomplete response page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestPage {
    pub data: Vec<String>,
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
}
