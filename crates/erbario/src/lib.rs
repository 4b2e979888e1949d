//! Erbario - Faceted Search Client for Herbarium Occurrence Data
//!
//! Erbario is the filter-state and query-derivation layer of a herbarium
//! occurrence browser. Users narrow a large remote specimen dataset through
//! simultaneous filter dimensions (taxon, country, locality, collecting
//! year/month, institution, georeferencing) and look at the matches as a
//! paginated gallery, a table, aggregate charts or a density map. All four
//! views are driven from one [`FilterStore`], project it into their request
//! shape with [`derive_query`], and resolve results through a caching,
//! deduplicating, cancellable execution layer.
//!
//! # Quick Start
//!
//! ```no_run
//! # async fn demo() -> Result<(), erbario::ErbarioError> {
//! use erbario::{ClientConfig, ErbarioClient, FilterField};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = ErbarioClient::new(ClientConfig::new("https://api.example.org"));
//!
//! // Narrow the dataset. Every mutation resets pagination and notifies
//! // subscribed views synchronously.
//! let store = client.store();
//! store.set_scientific_name(vec!["Olea europaea".into()]);
//! store.set_year_range(1950, 1980);
//!
//! // Resolve the current page; equal filter states share one request and
//! // one cached result.
//! let page = client.search_data(None, &CancellationToken::new()).await?;
//! println!("{} specimens match", page.count);
//!
//! // Typeahead for filter values.
//! let suggestions = client
//!     .suggest(FilterField::Locality, "Firen", &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **[`FilterStore`]**: single source of truth for the active selections;
//!   canonicalizes values on write, recomputes the active-filter count and
//!   resets pagination on every mutation.
//! - **[`derive_query`]**: pure projection of a state snapshot into one of
//!   three request variants (data, map, graph). Deterministic output backs
//!   descriptor-keyed caching.
//! - **[`QueryExecutor`] / [`QuerySlot`]**: at most one in-flight request
//!   per distinct descriptor, day-scale result caching, explicit
//!   cancellation on descriptor supersession, last-descriptor-wins delivery.
//! - **[`ValueDebouncer`] / [`CallbackDebouncer`]**: trailing-edge settling
//!   for typed text and slider drags.
//! - **[`AutocompleteClient`] / [`SuggestSession`]**: cached, debounced,
//!   cancellable typeahead with explicit "type more to search" handling.
//!
//! Requests are issued through the [`SearchTransport`] trait; the default
//! [`HttpTransport`] speaks JSON over HTTP, and tests drop in an in-memory
//! implementation.

use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod api;
mod autocomplete;
mod config;
mod core;
mod debounce;
pub mod error;
mod executor;
mod filters;
mod query;
#[cfg(test)]
mod test_support;

pub use api::{
    ApiError, GraphBucket, GraphResult, HttpTransport, MapOccurrences, MapPoint, Occurrence,
    OccurrencePage, SearchTransport, SuggestPage,
};
pub use autocomplete::{AutocompleteClient, Suggest, SuggestSession, SuggestView};
pub use config::{
    ClientConfig, ClientConfigBuilder, DEFAULT_CACHE_TTL, DEFAULT_PAGE_SIZE,
    DEFAULT_RANGE_DEBOUNCE, DEFAULT_TEXT_DEBOUNCE,
};
pub use self::core::{ErbarioClient, ErbarioClientBuilder};
pub use debounce::{CallbackDebouncer, ValueDebouncer};
pub use error::{ErbarioError, Result};
pub use executor::{QueryExecutor, QuerySlot, SlotState};
pub use filters::{
    DEFAULT_MIN_YEAR, FilterField, FilterState, FilterStore, MapViewport, StoreOptions,
    SubscriptionId,
};
pub use query::{QueryDescriptor, QueryOverrides, QueryVariant, SortOrder, derive_query};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the Erbario library.
///
/// This sets up structured logging with configurable levels and filtering.
/// Call this once at the start of your application to enable detailed
/// logging output from Erbario operations.
///
/// # Arguments
///
/// * `level` - The minimum log level to display
///
/// # Examples
///
/// ```rust
/// use erbario::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), erbario::ErbarioError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static ()> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?
            .add_directive("hyper_util=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_env() {
        let _ = init_logging(tracing::Level::WARN);
    }

    #[test]
    fn test_store_creation() {
        setup_test_env();

        let store = FilterStore::new(StoreOptions::default());
        let state = store.snapshot();
        assert!(state.is_default_year_range());
        assert_eq!(state.active_filter_count(), 0);
    }

    #[test]
    fn test_derivation_round_trip() {
        setup_test_env();

        let store = FilterStore::new(StoreOptions {
            min_year: 1700,
            current_year: 2025,
        });
        store.set_month(vec![6, 3]);

        let descriptor = derive_query(&store.snapshot(), QueryVariant::Data, None);
        assert_eq!(
            descriptor.filters["month"],
            serde_json::json!([3, 6]),
            "canonical month order reaches the wire"
        );
    }
}
