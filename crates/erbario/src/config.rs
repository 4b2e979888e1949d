use std::{collections::BTreeMap, time::Duration};

use crate::{error::ErbarioError, filters::FilterField};

/// Default number of records fetched per gallery/table page.
pub const DEFAULT_PAGE_SIZE: u64 = 24;

/// Default freshness window for cached search results.
///
/// Occurrence datasets change on curation timescales, not user-session
/// timescales, so results stay reusable for a day.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default settle delay for typed search text.
pub const DEFAULT_TEXT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Default settle delay for numeric range commits (slider drags).
pub const DEFAULT_RANGE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Configuration for an [`ErbarioClient`](crate::ErbarioClient).
///
/// Use [`ClientConfig::builder`] for an ergonomic way to create
/// configurations with sensible defaults.
///
/// # Examples
///
/// ```rust
/// use erbario::ClientConfig;
///
/// let config = ClientConfig::builder("https://api.example.org")
///     .page_size(48)
///     .build()?;
/// assert_eq!(config.page_size, 48);
/// # Ok::<(), erbario::ErbarioError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the occurrence search service, without a trailing slash.
    pub base_url: String,
    /// Records per data page; becomes the `limit` of data-variant queries.
    pub page_size: u64,
    /// Freshness window for cached query and autocomplete results.
    pub cache_ttl: Duration,
    /// Settle delay applied to typed search text before it triggers lookups.
    pub text_debounce: Duration,
    /// Settle delay applied to range-slider commits before they mutate state.
    pub range_debounce: Duration,
    suggest_min_len: BTreeMap<FilterField, usize>,
}

impl ClientConfig {
    /// Create a configuration with defaults for the given service URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut suggest_min_len = BTreeMap::new();
        suggest_min_len.insert(FilterField::ScientificName, 3);
        suggest_min_len.insert(FilterField::FloritalyName, 3);
        suggest_min_len.insert(FilterField::Locality, 2);
        suggest_min_len.insert(FilterField::Country, 1);
        suggest_min_len.insert(FilterField::InstitutionCode, 1);

        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            page_size: DEFAULT_PAGE_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
            text_debounce: DEFAULT_TEXT_DEBOUNCE,
            range_debounce: DEFAULT_RANGE_DEBOUNCE,
            suggest_min_len,
        }
    }

    /// Start building a configuration for the given service URL.
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::new(base_url),
        }
    }

    /// Minimum typed length before autocomplete lookups hit the network.
    ///
    /// Fields without an explicit entry fall back to 2 characters.
    #[must_use]
    pub fn suggest_min_len(&self, field: FilterField) -> usize {
        self.suggest_min_len.get(&field).copied().unwrap_or(2)
    }
}

/// Builder for [`ClientConfig`] with ergonomic defaults.
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the number of records per data page.
    #[must_use]
    pub fn page_size(mut self, page_size: u64) -> Self {
        self.config.page_size = page_size;
        self
    }

    /// Set the freshness window for cached results.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    /// Set the settle delay for typed search text.
    #[must_use]
    pub fn text_debounce(mut self, delay: Duration) -> Self {
        self.config.text_debounce = delay;
        self
    }

    /// Set the settle delay for range commits.
    #[must_use]
    pub fn range_debounce(mut self, delay: Duration) -> Self {
        self.config.range_debounce = delay;
        self
    }

    /// Set the minimum typed length for one autocomplete field.
    #[must_use]
    pub fn suggest_min_len(mut self, field: FilterField, min_len: usize) -> Self {
        self.config.suggest_min_len.insert(field, min_len);
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> Result<ClientConfig, ErbarioError> {
        if self.config.base_url.is_empty() {
            return Err(ErbarioError::ConfigError(
                "base_url must not be empty".to_owned(),
            ));
        }
        if self.config.page_size == 0 {
            return Err(ErbarioError::ConfigError(
                "page_size must be at least 1".to_owned(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::new("https://api.example.org/");
        assert_eq!(config.base_url, "https://api.example.org");
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.cache_ttl, DEFAULT_CACHE_TTL);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::builder("https://api.example.org")
            .page_size(100)
            .cache_ttl(Duration::from_secs(60))
            .text_debounce(Duration::from_millis(150))
            .suggest_min_len(FilterField::Locality, 4)
            .build()
            .unwrap();

        assert_eq!(config.page_size, 100);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.text_debounce, Duration::from_millis(150));
        assert_eq!(config.suggest_min_len(FilterField::Locality), 4);
    }

    #[test]
    fn test_min_len_fallback() {
        let config = ClientConfig::new("https://api.example.org");
        assert_eq!(config.suggest_min_len(FilterField::ScientificName), 3);
        // Month has no autocomplete entry and falls back to the default.
        assert_eq!(config.suggest_min_len(FilterField::Month), 2);
    }

    #[test]
    fn test_builder_validation() {
        assert!(ClientConfig::builder("").build().is_err());
        assert!(
            ClientConfig::builder("https://api.example.org")
                .page_size(0)
                .build()
                .is_err()
        );
    }
}
