//! Typeahead suggestion lookups feeding filter selection.
//!
//! Suggestions come from the service's `autocomplete` endpoint. The helper
//! here keeps the endpoint quiet: input below a per-field minimum length
//! never touches the network (the control shows "type more to search"
//! instead of an empty result list), settled lookups are cached with the
//! same long freshness policy as search results, and a new keystroke cancels
//! the lookup it supersedes.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use ahash::AHashMap as HashMap;
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    api::{ApiError, ApiResult, SearchTransport, SuggestPage},
    config::ClientConfig,
    debounce::ValueDebouncer,
    filters::FilterField,
};

/// Outcome of a single suggestion lookup.
///
/// "Too short" and "no results" (`Values` with an empty list) are distinct,
/// mutually exclusive states; lookup failures arrive as `Err` from
/// [`AutocompleteClient::suggest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggest {
    /// The input is shorter than the field's minimum; nothing was queried.
    TooShort { min_len: usize },
    /// Up to the service's limit of matching values.
    Values(Arc<Vec<String>>),
}

struct CachedValues {
    values: Arc<Vec<String>>,
    fetched_at: Instant,
}

/// Read-through suggestion cache over the autocomplete endpoint.
pub struct AutocompleteClient {
    transport: Arc<dyn SearchTransport>,
    ttl: Duration,
    min_len: HashMap<FilterField, usize>,
    fallback_min_len: usize,
    cache: Mutex<HashMap<(FilterField, String), CachedValues>>,
}

impl AutocompleteClient {
    #[must_use]
    pub fn new(transport: Arc<dyn SearchTransport>, config: &ClientConfig) -> Self {
        let fields = [
            FilterField::ScientificName,
            FilterField::FloritalyName,
            FilterField::Country,
            FilterField::Locality,
            FilterField::InstitutionCode,
        ];
        let min_len = fields
            .into_iter()
            .map(|field| (field, config.suggest_min_len(field)))
            .collect();

        Self {
            transport,
            ttl: config.cache_ttl,
            min_len,
            fallback_min_len: 2,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Minimum input length for a field before lookups are issued.
    #[must_use]
    pub fn min_len(&self, field: FilterField) -> usize {
        self.min_len
            .get(&field)
            .copied()
            .unwrap_or(self.fallback_min_len)
    }

    /// Look up suggestions for a partial input.
    ///
    /// Below-minimum input resolves to [`Suggest::TooShort`] without a
    /// network call. Results are cached per `(field, text)` pair.
    #[instrument(level = "debug", skip(self, cancel), fields(field = field.wire_name()))]
    pub async fn suggest(
        &self,
        field: FilterField,
        text: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<Suggest> {
        let text = text.trim();
        let min_len = self.min_len(field);
        if text.chars().count() < min_len {
            return Ok(Suggest::TooShort { min_len });
        }

        let cache_key = (field, text.to_owned());
        if let Some(hit) = self.lookup(&cache_key) {
            debug!("serving cached suggestions");
            return Ok(Suggest::Values(hit));
        }

        let value = self
            .transport
            .get_json(
                "autocomplete",
                &[("field", field.wire_name()), ("value", text)],
                cancel,
            )
            .await?;
        let page: SuggestPage = serde_json::from_value(value)?;
        let values = Arc::new(page.data);

        self.lock_cache().insert(
            cache_key,
            CachedValues {
                values: Arc::clone(&values),
                fetched_at: Instant::now(),
            },
        );
        Ok(Suggest::Values(values))
    }

    /// Drop the cached values for one `(field, text)` pair.
    ///
    /// Used when a suggestion is selected: clearing the control's input must
    /// not bring back the stale "no query" entry on reopen.
    pub fn invalidate(&self, field: FilterField, text: &str) {
        self.lock_cache().remove(&(field, text.trim().to_owned()));
    }

    /// Drop every cached suggestion list.
    pub fn clear(&self) {
        self.lock_cache().clear();
    }

    fn lookup(&self, key: &(FilterField, String)) -> Option<Arc<Vec<String>>> {
        let mut cache = self.lock_cache();
        if let Some(entry) = cache.get(key) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Some(Arc::clone(&entry.values));
            }
            cache.remove(key);
        }
        None
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<(FilterField, String), CachedValues>> {
        self.cache.lock().expect("autocomplete cache lock poisoned")
    }
}

/// What an autocomplete control should currently render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestView {
    /// "Type more to search."
    TooShort { min_len: usize },
    /// A lookup for the settled input is in flight.
    Loading,
    /// Matching values; may be empty ("no results").
    Results(Arc<Vec<String>>),
    /// The lookup failed. Cancellations never land here.
    Failed(ApiError),
}

/// A debounced typeahead session for one field.
///
/// Raw keystrokes go in through [`input`](Self::input); the settled text is
/// looked up (cancelling the lookup it supersedes) and the resulting view
/// state is published through a watch channel. Dropping the session tears
/// everything down; no lookup outcome is delivered afterwards.
pub struct SuggestSession {
    client: Arc<AutocompleteClient>,
    field: FilterField,
    debouncer: ValueDebouncer<String>,
    view: watch::Receiver<SuggestView>,
    worker: JoinHandle<()>,
}

impl SuggestSession {
    /// Must be created inside a tokio runtime.
    #[must_use]
    pub fn new(client: Arc<AutocompleteClient>, field: FilterField, delay: Duration) -> Self {
        let debouncer = ValueDebouncer::new(String::new(), delay);
        let initial = SuggestView::TooShort {
            min_len: client.min_len(field),
        };
        let (view_tx, view) = watch::channel(initial);

        let worker = {
            let client = Arc::clone(&client);
            let mut settled = debouncer.settled();
            tokio::spawn(async move {
                'session: while settled.changed().await.is_ok() {
                    'lookup: loop {
                        let text = settled.borrow_and_update().clone();
                        let min_len = client.min_len(field);
                        if text.trim().chars().count() < min_len {
                            let _ = view_tx.send(SuggestView::TooShort { min_len });
                            break 'lookup;
                        }

                        let _ = view_tx.send(SuggestView::Loading);
                        let cancel = CancellationToken::new();
                        tokio::select! {
                            changed = settled.changed() => {
                                // Newer settled input supersedes this lookup.
                                cancel.cancel();
                                if changed.is_err() {
                                    break 'session;
                                }
                            }
                            result = client.suggest(field, &text, &cancel) => {
                                match result {
                                    Ok(Suggest::Values(values)) => {
                                        let _ = view_tx.send(SuggestView::Results(values));
                                    }
                                    Ok(Suggest::TooShort { min_len }) => {
                                        let _ = view_tx.send(SuggestView::TooShort { min_len });
                                    }
                                    Err(error) if error.is_cancelled() => {}
                                    Err(error) => {
                                        let _ = view_tx.send(SuggestView::Failed(error));
                                    }
                                }
                                break 'lookup;
                            }
                        }
                    }
                }
            })
        };

        Self {
            client,
            field,
            debouncer,
            view,
            worker,
        }
    }

    /// Feed one keystroke's worth of input.
    pub fn input(&self, text: impl Into<String>) {
        self.debouncer.push(text.into());
    }

    /// Record that the user picked a suggestion: clears the input and drops
    /// the empty-string cache entry so reopening the control starts clean.
    pub fn select(&self) {
        self.client.invalidate(self.field, "");
        self.debouncer.push(String::new());
    }

    /// The current view state.
    #[must_use]
    pub fn view(&self) -> SuggestView {
        self.view.borrow().clone()
    }

    /// A receiver observing every view-state publication.
    #[must_use]
    pub fn changed(&self) -> watch::Receiver<SuggestView> {
        self.view.clone()
    }
}

impl Drop for SuggestSession {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
