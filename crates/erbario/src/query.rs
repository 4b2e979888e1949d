//! Projection of filter state into per-view query descriptors.
//!
//! [`derive_query`] is the single place where a [`FilterState`] becomes a
//! request payload. It is a pure function: the same `(state, variant,
//! overrides)` input always produces a byte-identical descriptor, because
//! filter values are canonically ordered on write and the payload maps are
//! BTree-backed. The execution layer keys its cache on the serialized
//! descriptor, so this determinism is load-bearing.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::{config::DEFAULT_PAGE_SIZE, filters::FilterState};

/// The three shapes a filter state can be projected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryVariant {
    /// Paginated gallery/table search.
    Data,
    /// Geospatial density map.
    Map,
    /// Aggregate counts for charts.
    Graph,
}

impl QueryVariant {
    /// Request path of this variant, relative to the service base URL.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Data => "occurrences/search",
            Self::Map => "occurrences/map/search",
            Self::Graph => "occurrences/graph/search",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Caller-supplied adjustments merged over a derived query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOverrides {
    /// Replaces the data variant's default sort.
    pub sort: Option<BTreeMap<String, SortOrder>>,
    /// Replaces the data variant's default page size.
    pub limit: Option<u64>,
    /// Dimension to aggregate by; merged into the graph variant's filters.
    pub group_by: Option<String>,
    /// Extra filter entries merged over the derived ones. Caller keys win.
    pub filters: Map<String, Value>,
}

impl QueryOverrides {
    /// Overrides carrying only an aggregation dimension.
    #[must_use]
    pub fn group_by(dimension: impl Into<String>) -> Self {
        Self {
            group_by: Some(dimension.into()),
            ..Self::default()
        }
    }

    /// Overrides carrying only a sort on one field.
    #[must_use]
    pub fn sorted_by(field: impl Into<String>, order: SortOrder) -> Self {
        let mut sort = BTreeMap::new();
        sort.insert(field.into(), order);
        Self {
            sort: Some(sort),
            ..Self::default()
        }
    }
}

/// Canonical representation of one query's parameters.
///
/// Ephemeral: re-derived from the store snapshot whenever a view needs it,
/// and used by the execution layer as cache/dedup key via
/// [`cache_key`](Self::cache_key). Two descriptors are equivalent exactly
/// when they are structurally equal, which (thanks to canonical value
/// ordering) coincides with byte equality of their serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDescriptor {
    pub endpoint: QueryVariant,
    pub filters: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sort: BTreeMap<String, SortOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl QueryDescriptor {
    /// Request path, relative to the service base URL.
    #[must_use]
    pub fn path(&self) -> &'static str {
        self.endpoint.path()
    }

    /// The JSON request body for this descriptor.
    ///
    /// Data queries carry pagination and sorting; map and graph queries are
    /// filter-only (their extra parameters live inside `filters`).
    #[must_use]
    pub fn body(&self) -> Value {
        match self.endpoint {
            QueryVariant::Data => json!({
                "filters": self.filters,
                "sort": self.sort,
                "skip": self.skip.unwrap_or(0),
                "limit": self.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            }),
            QueryVariant::Map | QueryVariant::Graph => json!({
                "filters": self.filters,
            }),
        }
    }

    /// Canonical serialization, used as cache and dedup key.
    #[must_use]
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).expect("descriptor is plain JSON data")
    }
}

/// Project a filter snapshot into the request shape of one query variant.
///
/// Every filter field is copied into the output except:
/// - the year range is omitted while it equals the captured default: the
///   server treats an absent year filter as "all years", which is assumed
///   to be indistinguishable from passing the full default range;
/// - institution codes are omitted while empty, matching the upstream wire
///   shape.
///
/// The map variant forces `hasCoordinates` on regardless of the state and
/// adds the viewport parameters; the graph variant merges the `group_by`
/// override into its filters; the data variant carries pagination and a
/// `scientificName: asc` sort unless overridden.
#[must_use]
pub fn derive_query(
    state: &FilterState,
    variant: QueryVariant,
    overrides: Option<&QueryOverrides>,
) -> QueryDescriptor {
    let mut filters = Map::new();
    filters.insert("scientificName".to_owned(), json!(state.scientific_name));
    filters.insert("floritalyName".to_owned(), json!(state.floritaly_name));
    filters.insert("country".to_owned(), json!(state.country));
    filters.insert("locality".to_owned(), json!(state.locality));
    filters.insert("month".to_owned(), json!(state.month));

    let has_coordinates = variant == QueryVariant::Map || state.has_coordinates;
    filters.insert("hasCoordinates".to_owned(), json!(has_coordinates));

    if !state.institution_code.is_empty() {
        filters.insert("institutionCode".to_owned(), json!(state.institution_code));
    }
    if !state.is_default_year_range() {
        let (min, max) = state.year_range;
        filters.insert("year".to_owned(), json!([min, max]));
    }

    if variant == QueryVariant::Map {
        filters.insert("zoom".to_owned(), json!(state.map_viewport.zoom));
        filters.insert("bbox".to_owned(), json!(state.map_viewport.bbox));
    }

    if variant == QueryVariant::Graph
        && let Some(group_by) = overrides.and_then(|o| o.group_by.as_deref())
    {
        filters.insert("groupBy".to_owned(), json!(group_by));
    }

    if let Some(overrides) = overrides {
        for (key, value) in &overrides.filters {
            filters.insert(key.clone(), value.clone());
        }
    }

    let sort = match variant {
        QueryVariant::Data => overrides
            .and_then(|o| o.sort.clone())
            .unwrap_or_else(default_sort),
        QueryVariant::Map | QueryVariant::Graph => BTreeMap::new(),
    };

    let (skip, limit) = match variant {
        QueryVariant::Data => {
            let limit = overrides
                .and_then(|o| o.limit)
                .unwrap_or(DEFAULT_PAGE_SIZE);
            (Some(state.skip), Some(limit))
        }
        QueryVariant::Map | QueryVariant::Graph => (None, None),
    };

    QueryDescriptor {
        endpoint: variant,
        filters,
        sort,
        skip,
        limit,
    }
}

fn default_sort() -> BTreeMap<String, SortOrder> {
    let mut sort = BTreeMap::new();
    sort.insert("scientificName".to_owned(), SortOrder::Asc);
    sort
}
