//! Filter state for faceted occurrence search.
//!
//! This module defines the shared filter model: which taxa, places, dates and
//! institutions are currently selected, plus the pagination offset the data
//! view is on. The state lives in a [`FilterStore`], the single source of
//! truth every result view derives its queries from, and is handed out as
//! cloned [`FilterState`] snapshots.
//!
//! Multi-select fields are kept in a canonical order (strings
//! lexicographically, months numerically, duplicates removed) so that two
//! selections of the same values always serialize identically. Derived query
//! cache keys depend on this.

mod store;
pub use store::{FilterStore, StoreOptions, SubscriptionId};

use std::collections::BTreeSet;

use itertools::Itertools;
use serde::Serialize;

/// Default lower bound of the collecting-year range.
///
/// The oldest specimens in the targeted herbaria date to the early 18th
/// century; anything below this is a transcription artifact.
pub const DEFAULT_MIN_YEAR: i32 = 1700;

/// One independently selectable filter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FilterField {
    ScientificName,
    FloritalyName,
    Country,
    Locality,
    YearRange,
    Month,
    InstitutionCode,
    HasCoordinates,
}

impl FilterField {
    /// The field name used on the wire (filters object keys, autocomplete
    /// `field` parameter).
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::ScientificName => "scientificName",
            Self::FloritalyName => "floritalyName",
            Self::Country => "country",
            Self::Locality => "locality",
            Self::YearRange => "year",
            Self::Month => "month",
            Self::InstitutionCode => "institutionCode",
            Self::HasCoordinates => "hasCoordinates",
        }
    }
}

/// Map viewport parameters, relevant only to the map query variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapViewport {
    pub zoom: f64,
    /// `[west, south, east, north]` in decimal degrees.
    pub bbox: [f64; 4],
}

impl Default for MapViewport {
    fn default() -> Self {
        // Italian peninsula, the extent the herbaria collections cover.
        Self {
            zoom: 6.0,
            bbox: [6.6, 35.2, 18.8, 47.2],
        }
    }
}

/// A snapshot of every active filter selection.
///
/// Snapshots are plain values: cloning one and mutating it does not affect
/// the store it came from. All mutation goes through [`FilterStore`], which
/// re-canonicalizes, recomputes the active count and resets pagination after
/// every change.
///
/// The default year range is captured when the owning store is created
/// (current calendar year as upper bound) and travels with the snapshot so
/// query derivation can recognize an untouched range without consulting a
/// clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterState {
    /// Selected taxon names, canonical order.
    pub scientific_name: Vec<String>,
    /// Selected FlorItaly checklist names, canonical order.
    pub floritaly_name: Vec<String>,
    /// Selected ISO country codes, canonical order.
    pub country: Vec<String>,
    /// Selected locality strings, canonical order.
    pub locality: Vec<String>,
    /// Inclusive collecting-year bounds. Always ordered `min <= max`.
    pub year_range: (i32, i32),
    /// Selected collecting months (1–12), canonical order.
    pub month: Vec<u8>,
    /// Selected institution codes, canonical order. May be locked by the
    /// surrounding context (a single herbarium's page pins it).
    pub institution_code: Vec<String>,
    /// Restrict results to georeferenced records.
    pub has_coordinates: bool,
    /// Current map viewport; parameterizes map queries only.
    pub map_viewport: MapViewport,
    /// Pagination offset of the data view. Kept a multiple of the page size
    /// by the caller; every filter mutation resets it to 0.
    pub skip: u64,

    default_year_range: (i32, i32),
    active_filter_count: usize,
}

impl FilterState {
    /// An empty selection whose default year range spans
    /// `min_year..=current_year`.
    #[must_use]
    pub fn new(min_year: i32, current_year: i32) -> Self {
        debug_assert!(min_year <= current_year);
        Self {
            scientific_name: Vec::new(),
            floritaly_name: Vec::new(),
            country: Vec::new(),
            locality: Vec::new(),
            year_range: (min_year, current_year),
            month: Vec::new(),
            institution_code: Vec::new(),
            has_coordinates: false,
            map_viewport: MapViewport::default(),
            skip: 0,
            default_year_range: (min_year, current_year),
            active_filter_count: 0,
        }
    }

    /// The full year range that counts as "no year filter".
    #[must_use]
    pub fn default_year_range(&self) -> (i32, i32) {
        self.default_year_range
    }

    /// Whether the year range is untouched. Query derivation omits the year
    /// filter entirely in that case.
    #[must_use]
    pub fn is_default_year_range(&self) -> bool {
        self.year_range == self.default_year_range
    }

    /// Number of active (non-default, unlocked) filter selections.
    ///
    /// Each selected element of a multi-select field counts one, each
    /// altered year bound counts one, an enabled coordinate restriction
    /// counts one. Recomputed by the store on every mutation; never set
    /// directly.
    #[must_use]
    pub fn active_filter_count(&self) -> usize {
        self.active_filter_count
    }

    /// Restore the canonical representation after arbitrary edits.
    ///
    /// Sorts and deduplicates the multi-select fields, reorders an inverted
    /// year pair and drops out-of-range months. Out-of-contract input traps
    /// in debug builds; release builds normalize silently rather than let a
    /// malformed selection reach derived queries.
    pub(crate) fn canonicalize(&mut self) {
        for values in [
            &mut self.scientific_name,
            &mut self.floritaly_name,
            &mut self.country,
            &mut self.locality,
            &mut self.institution_code,
        ] {
            *values = std::mem::take(values).into_iter().sorted().dedup().collect();
        }

        debug_assert!(
            self.month.iter().all(|m| (1..=12).contains(m)),
            "months must be within 1..=12"
        );
        self.month.retain(|m| (1..=12).contains(m));
        self.month = std::mem::take(&mut self.month)
            .into_iter()
            .sorted()
            .dedup()
            .collect();

        debug_assert!(
            self.year_range.0 <= self.year_range.1,
            "year range must be ordered"
        );
        if self.year_range.0 > self.year_range.1 {
            self.year_range = (self.year_range.1, self.year_range.0);
        }
    }

    /// Recompute the active-filter count. Locked fields still filter results
    /// but are pinned by the page, so they stay out of the user-facing badge.
    pub(crate) fn recount(&mut self, locked: &BTreeSet<FilterField>) {
        let mut count = 0;
        for (field, values) in [
            (FilterField::ScientificName, &self.scientific_name),
            (FilterField::FloritalyName, &self.floritaly_name),
            (FilterField::Country, &self.country),
            (FilterField::Locality, &self.locality),
            (FilterField::InstitutionCode, &self.institution_code),
        ] {
            if !locked.contains(&field) {
                count += values.len();
            }
        }
        if !locked.contains(&FilterField::Month) {
            count += self.month.len();
        }

        let (default_min, default_max) = self.default_year_range;
        count += usize::from(self.year_range.0 != default_min);
        count += usize::from(self.year_range.1 != default_max);
        count += usize::from(self.has_coordinates);

        self.active_filter_count = count;
    }

    /// Reset one field to its default. The viewport is not a filter and is
    /// left alone by resets.
    pub(crate) fn reset_field(&mut self, field: FilterField) {
        match field {
            FilterField::ScientificName => self.scientific_name.clear(),
            FilterField::FloritalyName => self.floritaly_name.clear(),
            FilterField::Country => self.country.clear(),
            FilterField::Locality => self.locality.clear(),
            FilterField::YearRange => self.year_range = self.default_year_range,
            FilterField::Month => self.month.clear(),
            FilterField::InstitutionCode => self.institution_code.clear(),
            FilterField::HasCoordinates => self.has_coordinates = false,
        }
    }
}
