//! Integration tests for the erbario faceted search client
//!
//! These tests run against the full public API: the filter store, query
//! derivation and the execution layer, wired through an in-memory transport
//! so that request payloads and call counts can be asserted exactly.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use erbario::{
    ApiError, ClientConfig, ErbarioClient, FilterField, FilterStore, SearchTransport, SlotState,
    StoreOptions, Suggest,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// In-memory transport recording every request.
struct RecordingTransport {
    delay: Duration,
    fallback: Value,
    script: Mutex<VecDeque<Result<Value, ApiError>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingTransport {
    fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fallback: json!({"occurrences": [], "count": 0}),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn push_response(&self, response: Result<Value, ApiError>) {
        self.script.lock().unwrap().push_back(response);
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    async fn answer(
        &self,
        path: &str,
        recorded: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push((path.to_owned(), recorded));
        if !self.delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => return Err(ApiError::Cancelled),
                () = tokio::time::sleep(self.delay) => {}
            }
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[async_trait]
impl SearchTransport for RecordingTransport {
    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ApiError> {
        self.answer(path, body.clone(), cancel).await
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<Value, ApiError> {
        let query: Value = query
            .iter()
            .map(|(k, v)| ((*k).to_owned(), json!(v)))
            .collect::<serde_json::Map<_, _>>()
            .into();
        self.answer(path, query, cancel).await
    }
}

fn test_client(transport: Arc<RecordingTransport>) -> ErbarioClient {
    // A pinned year baseline keeps the default-range comparison stable.
    let store = Arc::new(FilterStore::new(StoreOptions {
        min_year: 1700,
        current_year: 2025,
    }));
    ErbarioClient::builder()
        .config(ClientConfig::new("https://api.example.org"))
        .transport(transport as Arc<dyn SearchTransport>)
        .store(store)
        .build()
        .expect("client should build")
}

#[tokio::test]
async fn test_data_payload_end_to_end() {
    let transport = Arc::new(RecordingTransport::new());
    let client = test_client(Arc::clone(&transport));

    let store = client.store();
    store.set_scientific_name(vec!["Olea europaea".into()]);
    store.set_year_range(1950, 1950);

    client
        .search_data(None, &CancellationToken::new())
        .await
        .unwrap();

    let (path, body) = transport.calls().remove(0);
    assert_eq!(path, "occurrences/search");
    assert_eq!(
        body["filters"],
        json!({
            "scientificName": ["Olea europaea"],
            "floritalyName": [],
            "country": [],
            "locality": [],
            "month": [],
            "year": [1950, 1950],
            "hasCoordinates": false,
        })
    );
    assert_eq!(body["skip"], json!(0));
    assert_eq!(body["sort"], json!({"scientificName": "asc"}));
}

#[test]
fn test_month_canonicalization_end_to_end() {
    let store = FilterStore::new(StoreOptions {
        min_year: 1700,
        current_year: 2025,
    });

    store.set_month(vec![6]);
    store.set_month(vec![3, 6]);
    store.set_month(vec![6, 3]);

    let state = store.snapshot();
    assert_eq!(state.month, vec![3, 6]);
    assert_eq!(state.active_filter_count(), 2);
}

#[tokio::test]
async fn test_cache_reuse_and_pagination_reset() {
    let transport = Arc::new(RecordingTransport::new());
    let client = test_client(Arc::clone(&transport));
    let cancel = CancellationToken::new();

    // Equal filter states share one request and one cached result.
    client.search_data(None, &cancel).await.unwrap();
    client.search_data(None, &cancel).await.unwrap();
    assert_eq!(transport.call_count(), 1);

    // Moving to page two is a new descriptor.
    client.store().set_skip(24);
    client.search_data(None, &cancel).await.unwrap();
    assert_eq!(transport.call_count(), 2);
    assert_eq!(transport.calls()[1].1["skip"], json!(24));

    // Changing a filter silently resets pagination.
    client.store().set_country(vec!["IT".into()]);
    client.search_data(None, &cancel).await.unwrap();
    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].1["skip"], json!(0));
    assert_eq!(calls[2].1["filters"]["country"], json!(["IT"]));

    // Returning to the original state is served from cache.
    client.store().set_country(vec![]);
    client.search_data(None, &cancel).await.unwrap();
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn test_map_and_graph_variants() {
    let transport = Arc::new(RecordingTransport::new());
    let client = test_client(Arc::clone(&transport));
    let cancel = CancellationToken::new();

    // hasCoordinates is forced on for the map even when unset in the store.
    assert!(!client.store().snapshot().has_coordinates);
    client.search_map(&cancel).await.unwrap();
    client.search_graph("country", &cancel).await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls[0].0, "occurrences/map/search");
    assert_eq!(calls[0].1["filters"]["hasCoordinates"], json!(true));
    assert_eq!(calls[0].1["filters"]["zoom"], json!(6.0));

    assert_eq!(calls[1].0, "occurrences/graph/search");
    assert_eq!(calls[1].1["filters"]["groupBy"], json!("country"));
    // Graph bodies are filter-only.
    assert_eq!(calls[1].1.get("limit"), None);
}

#[tokio::test(start_paused = true)]
async fn test_slot_applies_only_latest_descriptor() {
    let transport = Arc::new(RecordingTransport::new().with_delay(Duration::from_millis(100)));
    transport.push_response(Ok(json!({"occurrences": [], "count": 1})));
    let client = test_client(Arc::clone(&transport));

    let slot = client.data_slot();
    let mut changed = slot.changed();

    slot.set_descriptor(client.data_descriptor(None));
    tokio::task::yield_now().await;

    client.store().set_scientific_name(vec!["Quercus ilex".into()]);
    slot.set_descriptor(client.data_descriptor(None));

    loop {
        changed.changed().await.unwrap();
        match slot.state() {
            SlotState::Ready(result) => {
                // The superseded request never consumed its scripted
                // response; the surviving one did.
                assert_eq!(result.count, 1);
                break;
            }
            SlotState::Failed(error) => panic!("unexpected failure: {error}"),
            _ => {}
        }
    }
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_suggest_flow() {
    let transport = Arc::new(RecordingTransport::new());
    transport.push_response(Ok(
        json!({"data": ["Firenze", "Fiesole"], "total": 2, "skip": 0, "limit": 10}),
    ));
    let client = test_client(Arc::clone(&transport));
    let cancel = CancellationToken::new();

    // Below the minimum length nothing reaches the network.
    let outcome = client
        .suggest(FilterField::Locality, "F", &cancel)
        .await
        .unwrap();
    assert_eq!(outcome, Suggest::TooShort { min_len: 2 });
    assert_eq!(transport.call_count(), 0);

    let outcome = client
        .suggest(FilterField::Locality, "Fi", &cancel)
        .await
        .unwrap();
    match outcome {
        Suggest::Values(values) => {
            assert_eq!(*values, vec!["Firenze".to_owned(), "Fiesole".to_owned()]);
        }
        Suggest::TooShort { .. } => panic!("lookup should have run"),
    }
    let calls = transport.calls();
    assert_eq!(calls[0].0, "autocomplete");
    assert_eq!(calls[0].1, json!({"field": "locality", "value": "Fi"}));

    // Repeating the settled input is served from cache.
    client
        .suggest(FilterField::Locality, "Fi", &cancel)
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_locked_institution_shapes_queries_but_not_badge() {
    let transport = Arc::new(RecordingTransport::new());
    let client = test_client(Arc::clone(&transport));
    let cancel = CancellationToken::new();

    let store = client.store();
    store.lock_institution_code(vec!["FI".into()]);
    store.set_country(vec!["IT".into()]);
    assert_eq!(store.snapshot().active_filter_count(), 1);

    store.reset();
    client.search_data(None, &cancel).await.unwrap();

    // The pinned institution survived the reset and reached the wire.
    let (_, body) = transport.calls().remove(0);
    assert_eq!(body["filters"]["institutionCode"], json!(["FI"]));
    assert_eq!(body["filters"]["country"], json!([]));
}
