//! The main client facade tying store, derivation and execution together.
//!
//! An [`ErbarioClient`] owns the filter store, one executor per query
//! variant and the autocomplete cache, all behind a single injected
//! transport. Views derive their descriptors through it (so the configured
//! page size applies), execute them against the shared caches, and open
//! [`QuerySlot`]s for the reactive render loop.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    api::{
        ApiError, GraphResult, HttpTransport, MapOccurrences, Occurrence, OccurrencePage,
        SearchTransport,
    },
    autocomplete::{AutocompleteClient, Suggest, SuggestSession},
    config::ClientConfig,
    debounce::{CallbackDebouncer, ValueDebouncer},
    error::{ErbarioError, Result},
    executor::{QueryExecutor, QuerySlot},
    filters::{FilterField, FilterStore, StoreOptions},
    query::{QueryDescriptor, QueryOverrides, QueryVariant, derive_query},
};

/// Faceted search client for one occurrence service.
///
/// Create it once at application start and share it; every view reads and
/// mutates the same [`FilterStore`] and reuses the same result caches.
///
/// # Examples
///
/// ```no_run
/// # async fn demo() -> Result<(), erbario::ErbarioError> {
/// use erbario::{ClientConfig, ErbarioClient};
/// use tokio_util::sync::CancellationToken;
///
/// let client = ErbarioClient::new(ClientConfig::new("https://api.example.org"));
/// client.store().set_country(vec!["IT".into()]);
///
/// let page = client.search_data(None, &CancellationToken::new()).await?;
/// println!("{} matching specimens", page.count);
/// # Ok(())
/// # }
/// ```
pub struct ErbarioClient {
    config: ClientConfig,
    store: Arc<FilterStore>,
    transport: Arc<dyn SearchTransport>,
    data: QueryExecutor<OccurrencePage>,
    map: QueryExecutor<MapOccurrences>,
    graph: QueryExecutor<GraphResult>,
    autocomplete: Arc<AutocompleteClient>,
}

impl ErbarioClient {
    /// Create a client speaking HTTP to the configured service.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.base_url.as_str()));
        Self::with_transport(config, transport)
    }

    /// Create a client over a custom transport (tests, instrumentation).
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn SearchTransport>) -> Self {
        Self::with_store(config, transport, Arc::new(FilterStore::new(StoreOptions::default())))
    }

    /// Create a client around an existing store (e.g. one with pinned
    /// institution codes or a fixed year baseline).
    #[must_use]
    pub fn with_store(
        config: ClientConfig,
        transport: Arc<dyn SearchTransport>,
        store: Arc<FilterStore>,
    ) -> Self {
        info!(base_url = %config.base_url, "creating erbario client");
        let data = QueryExecutor::with_ttl(Arc::clone(&transport), config.cache_ttl);
        let map = QueryExecutor::with_ttl(Arc::clone(&transport), config.cache_ttl);
        let graph = QueryExecutor::with_ttl(Arc::clone(&transport), config.cache_ttl);
        let autocomplete = Arc::new(AutocompleteClient::new(Arc::clone(&transport), &config));

        Self {
            config,
            store,
            transport,
            data,
            map,
            graph,
            autocomplete,
        }
    }

    #[must_use]
    pub fn builder() -> ErbarioClientBuilder {
        ErbarioClientBuilder::new()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The shared filter store.
    #[must_use]
    pub fn store(&self) -> &Arc<FilterStore> {
        &self.store
    }

    /// Derive the data-variant descriptor for the current filter state,
    /// applying the configured page size unless overridden.
    #[must_use]
    pub fn data_descriptor(&self, overrides: Option<&QueryOverrides>) -> QueryDescriptor {
        let mut overrides = overrides.cloned().unwrap_or_default();
        overrides.limit.get_or_insert(self.config.page_size);
        derive_query(&self.store.snapshot(), QueryVariant::Data, Some(&overrides))
    }

    /// Derive the map-variant descriptor for the current filter state.
    #[must_use]
    pub fn map_descriptor(&self) -> QueryDescriptor {
        derive_query(&self.store.snapshot(), QueryVariant::Map, None)
    }

    /// Derive the graph-variant descriptor aggregating by `group_by`.
    #[must_use]
    pub fn graph_descriptor(&self, group_by: &str) -> QueryDescriptor {
        let overrides = QueryOverrides::group_by(group_by);
        derive_query(&self.store.snapshot(), QueryVariant::Graph, Some(&overrides))
    }

    /// Fetch the current page of gallery/table results.
    pub async fn search_data(
        &self,
        overrides: Option<&QueryOverrides>,
        cancel: &CancellationToken,
    ) -> Result<Arc<OccurrencePage>> {
        let descriptor = self.data_descriptor(overrides);
        Ok(self.data.execute(&descriptor, cancel).await?)
    }

    /// Fetch the georeferenced records for the current state and viewport.
    pub async fn search_map(&self, cancel: &CancellationToken) -> Result<Arc<MapOccurrences>> {
        let descriptor = self.map_descriptor();
        Ok(self.map.execute(&descriptor, cancel).await?)
    }

    /// Fetch aggregate counts grouped by one dimension (`"year"`,
    /// `"country"`, `"scientificName"`, ...).
    pub async fn search_graph(
        &self,
        group_by: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<GraphResult>> {
        let descriptor = self.graph_descriptor(group_by);
        Ok(self.graph.execute(&descriptor, cancel).await?)
    }

    /// Fetch one specimen record by its occurrence id.
    ///
    /// A missing record surfaces as [`ApiError::NotFound`], distinct from
    /// transport or server failures, so the caller can render a "not found"
    /// view rather than an error view.
    pub async fn occurrence(
        &self,
        occurrence_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Occurrence> {
        let path = format!("occurrences/{occurrence_id}");
        let value = self.transport.get_json(&path, &[], cancel).await?;
        let occurrence = serde_json::from_value(value).map_err(ApiError::from)?;
        Ok(occurrence)
    }

    /// Look up typeahead suggestions for one filter field.
    pub async fn suggest(
        &self,
        field: FilterField,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Suggest> {
        Ok(self.autocomplete.suggest(field, text, cancel).await?)
    }

    /// The shared autocomplete cache.
    #[must_use]
    pub fn autocomplete(&self) -> &Arc<AutocompleteClient> {
        &self.autocomplete
    }

    /// Open a debounced typeahead session for one field.
    #[must_use]
    pub fn suggest_session(&self, field: FilterField) -> SuggestSession {
        SuggestSession::new(
            Arc::clone(&self.autocomplete),
            field,
            self.config.text_debounce,
        )
    }

    /// A view handle onto the data executor.
    #[must_use]
    pub fn data_slot(&self) -> QuerySlot<OccurrencePage> {
        QuerySlot::new(self.data.clone())
    }

    /// A view handle onto the map executor.
    #[must_use]
    pub fn map_slot(&self) -> QuerySlot<MapOccurrences> {
        QuerySlot::new(self.map.clone())
    }

    /// A view handle onto the graph executor.
    #[must_use]
    pub fn graph_slot(&self) -> QuerySlot<GraphResult> {
        QuerySlot::new(self.graph.clone())
    }

    /// A text debouncer preconfigured with this client's settle delay.
    #[must_use]
    pub fn text_debouncer(&self, initial: String) -> ValueDebouncer<String> {
        ValueDebouncer::new(initial, self.config.text_debounce)
    }

    /// A range-commit debouncer that writes settled year bounds into the
    /// store.
    #[must_use]
    pub fn year_range_debouncer(&self) -> CallbackDebouncer<(i32, i32)> {
        let store = Arc::clone(&self.store);
        CallbackDebouncer::new(self.config.range_debounce, move |(min, max)| {
            store.set_year_range(min, max);
        })
    }

    /// Drop every cached result (all variants and autocomplete).
    pub fn clear_caches(&self) {
        self.data.clear();
        self.map.clear();
        self.graph.clear();
        self.autocomplete.clear();
    }
}

/// Builder for [`ErbarioClient`] with custom wiring.
#[derive(Default)]
pub struct ErbarioClientBuilder {
    config: Option<ClientConfig>,
    transport: Option<Arc<dyn SearchTransport>>,
    store: Option<Arc<FilterStore>>,
}

impl ErbarioClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a custom transport instead of the default HTTP one.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn SearchTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use an existing store instead of a fresh one.
    #[must_use]
    pub fn store(mut self, store: Arc<FilterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ErbarioClient> {
        let config = self
            .config
            .ok_or_else(|| ErbarioError::ConfigError("a ClientConfig is required".to_owned()))?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new(config.base_url.as_str())));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FilterStore::new(StoreOptions::default())));
        Ok(ErbarioClient::with_store(config, transport, store))
    }
}
