//! The shared, subscribable filter store.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
};

use chrono::Datelike;
use tracing::debug;

use super::{DEFAULT_MIN_YEAR, FilterField, FilterState, MapViewport};

/// Options for creating a [`FilterStore`].
///
/// `current_year` is captured once here and becomes the upper bound of the
/// default year range for the store's whole lifetime; it is never re-read
/// from the clock afterwards, so derived queries stay byte-stable across a
/// session that straddles midnight on New Year's Eve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub min_year: i32,
    pub current_year: i32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            min_year: DEFAULT_MIN_YEAR,
            current_year: chrono::Utc::now().year(),
        }
    }
}

/// Identifies one registered subscriber.
pub type SubscriptionId = u64;

type Subscriber = Arc<dyn Fn(&FilterState) + Send + Sync>;

struct Inner {
    state: FilterState,
    locked: BTreeSet<FilterField>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: SubscriptionId,
}

/// Single source of truth for the active filter selections.
///
/// One store is created at application start and injected into every view
/// that reads or mutates filters; tests create their own isolated instances.
/// Mutation is synchronous: a setter canonicalizes the new value, recomputes
/// the active count, resets pagination and then notifies every subscriber
/// with a snapshot, all before it returns. Subscribers run outside the state
/// lock, so they may call back into the store.
///
/// # Examples
///
/// ```rust
/// use erbario::{FilterStore, StoreOptions};
///
/// let store = FilterStore::new(StoreOptions {
///     min_year: 1700,
///     current_year: 2025,
/// });
///
/// store.set_country(vec!["IT".into(), "FR".into()]);
/// store.set_skip(48);
/// store.set_month(vec![6, 3]);
///
/// let state = store.snapshot();
/// assert_eq!(state.month, vec![3, 6]);
/// // The month mutation reset pagination.
/// assert_eq!(state.skip, 0);
/// assert_eq!(state.active_filter_count(), 4);
/// ```
pub struct FilterStore {
    inner: Mutex<Inner>,
}

impl FilterStore {
    #[must_use]
    pub fn new(options: StoreOptions) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: FilterState::new(options.min_year, options.current_year),
                locked: BTreeSet::new(),
                subscribers: Vec::new(),
                next_subscription: 0,
            }),
        }
    }

    /// A clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> FilterState {
        self.lock().state.clone()
    }

    /// Register a callback invoked with a snapshot after every published
    /// mutation.
    pub fn subscribe(
        &self,
        callback: impl Fn(&FilterState) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut inner = self.lock();
        let id = inner.next_subscription;
        inner.next_subscription += 1;
        inner.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Remove a previously registered callback. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().subscribers.retain(|(sub_id, _)| *sub_id != id);
    }

    /// Apply an arbitrary edit to the filter selections.
    ///
    /// This is the functional-update form backing every concrete setter:
    /// after `edit` runs, the store canonicalizes the multi-select fields,
    /// recomputes the active count, resets `skip` to 0 and publishes. Edits
    /// to locked fields are overwritten with the pinned value.
    pub fn update(&self, edit: impl FnOnce(&mut FilterState)) {
        let snapshot = {
            let mut inner = self.lock();
            let pinned_institutions = inner
                .locked
                .contains(&FilterField::InstitutionCode)
                .then(|| inner.state.institution_code.clone());

            edit(&mut inner.state);

            if let Some(pinned) = pinned_institutions {
                inner.state.institution_code = pinned;
            }
            inner.finish_mutation()
        };
        self.notify(&snapshot);
    }

    pub fn set_scientific_name(&self, names: Vec<String>) {
        self.update(|state| state.scientific_name = names);
    }

    pub fn set_floritaly_name(&self, names: Vec<String>) {
        self.update(|state| state.floritaly_name = names);
    }

    pub fn set_country(&self, codes: Vec<String>) {
        self.update(|state| state.country = codes);
    }

    pub fn set_locality(&self, localities: Vec<String>) {
        self.update(|state| state.locality = localities);
    }

    /// Set the inclusive collecting-year bounds.
    ///
    /// Callers must pass `min <= max`; an inverted pair traps in debug
    /// builds and is reordered in release builds.
    pub fn set_year_range(&self, min: i32, max: i32) {
        self.update(|state| state.year_range = (min, max));
    }

    /// Set the selected months. Values must be within 1–12; out-of-range
    /// entries trap in debug builds and are dropped in release builds.
    pub fn set_month(&self, months: Vec<u8>) {
        self.update(|state| state.month = months);
    }

    /// Set the selected institution codes. Ignored while the field is
    /// locked by the surrounding context.
    pub fn set_institution_code(&self, codes: Vec<String>) {
        if self.lock().locked.contains(&FilterField::InstitutionCode) {
            debug!("ignoring institution_code mutation: field is locked");
            return;
        }
        self.update(|state| state.institution_code = codes);
    }

    pub fn set_has_coordinates(&self, has_coordinates: bool) {
        self.update(|state| state.has_coordinates = has_coordinates);
    }

    /// Update the map viewport.
    ///
    /// The viewport parameterizes the map projection but narrows no result
    /// set, so it neither resets pagination nor contributes to the active
    /// count.
    pub fn set_map_viewport(&self, viewport: MapViewport) {
        let snapshot = {
            let mut inner = self.lock();
            inner.state.map_viewport = viewport;
            inner.state.clone()
        };
        self.notify(&snapshot);
    }

    /// Set the pagination offset. The one mutation that does not reset
    /// itself and leaves the active count untouched.
    pub fn set_skip(&self, skip: u64) {
        let snapshot = {
            let mut inner = self.lock();
            inner.state.skip = skip;
            inner.state.clone()
        };
        self.notify(&snapshot);
    }

    /// Pin the institution codes, e.g. on a single herbarium's page.
    ///
    /// The pinned value still participates in query derivation but is
    /// excluded from [`reset`](Self::reset) and from the active-count badge.
    pub fn lock_institution_code(&self, codes: Vec<String>) {
        let snapshot = {
            let mut inner = self.lock();
            inner.state.institution_code = codes;
            inner.locked.insert(FilterField::InstitutionCode);
            inner.finish_mutation()
        };
        self.notify(&snapshot);
    }

    /// Release a pinned institution selection, keeping its current value.
    ///
    /// The value does not change, so pagination stays put; only the active
    /// count is refreshed (the field re-enters the badge).
    pub fn unlock_institution_code(&self) {
        let snapshot = {
            let mut inner = self.lock();
            inner.locked.remove(&FilterField::InstitutionCode);
            let locked = inner.locked.clone();
            inner.state.recount(&locked);
            inner.state.clone()
        };
        self.notify(&snapshot);
    }

    /// Whether a field is currently locked.
    #[must_use]
    pub fn is_locked(&self, field: FilterField) -> bool {
        self.lock().locked.contains(&field)
    }

    /// Restore every unlocked filter field to its default and reset
    /// pagination.
    pub fn reset(&self) {
        self.reset_except(&[]);
    }

    /// Like [`reset`](Self::reset), but additionally keeps the listed
    /// fields untouched.
    pub fn reset_except(&self, keep: &[FilterField]) {
        let snapshot = {
            let mut inner = self.lock();
            let locked = inner.locked.clone();
            for field in [
                FilterField::ScientificName,
                FilterField::FloritalyName,
                FilterField::Country,
                FilterField::Locality,
                FilterField::YearRange,
                FilterField::Month,
                FilterField::InstitutionCode,
                FilterField::HasCoordinates,
            ] {
                if !locked.contains(&field) && !keep.contains(&field) {
                    inner.state.reset_field(field);
                }
            }
            inner.finish_mutation()
        };
        self.notify(&snapshot);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("filter store lock poisoned")
    }

    fn notify(&self, snapshot: &FilterState) {
        let subscribers: Vec<Subscriber> = {
            let inner = self.lock();
            inner
                .subscribers
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect()
        };
        for callback in subscribers {
            callback(snapshot);
        }
    }
}

impl Inner {
    /// Canonicalize, recount, reset pagination; returns the published
    /// snapshot.
    fn finish_mutation(&mut self) -> FilterState {
        self.state.canonicalize();
        let locked = self.locked.clone();
        self.state.recount(&locked);
        self.state.skip = 0;
        debug!(
            active_filters = self.state.active_filter_count(),
            "filter state updated"
        );
        self.state.clone()
    }
}

impl std::fmt::Debug for FilterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("FilterStore")
            .field("state", &inner.state)
            .field("locked", &inner.locked)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn test_store() -> FilterStore {
        FilterStore::new(StoreOptions {
            min_year: 1700,
            current_year: 2025,
        })
    }

    #[test]
    fn test_setters_reset_pagination() {
        let store = test_store();
        store.set_skip(72);
        assert_eq!(store.snapshot().skip, 72);

        store.set_country(vec!["IT".into()]);
        assert_eq!(store.snapshot().skip, 0);

        store.set_skip(24);
        store.set_year_range(1950, 1960);
        assert_eq!(store.snapshot().skip, 0);

        store.set_skip(24);
        store.set_has_coordinates(true);
        assert_eq!(store.snapshot().skip, 0);
    }

    #[test]
    fn test_skip_and_viewport_do_not_reset() {
        let store = test_store();
        store.set_skip(48);
        store.set_map_viewport(MapViewport {
            zoom: 9.0,
            bbox: [9.0, 44.0, 10.0, 45.0],
        });
        assert_eq!(store.snapshot().skip, 48);
        assert_eq!(store.snapshot().active_filter_count(), 0);
    }

    #[test]
    fn test_canonical_order_is_permutation_independent() {
        let store = test_store();
        store.set_country(vec!["IT".into(), "FR".into()]);
        let first = store.snapshot().country;

        store.set_country(vec!["FR".into(), "IT".into()]);
        let second = store.snapshot().country;

        assert_eq!(first, second);
        assert_eq!(first, vec!["FR".to_owned(), "IT".to_owned()]);
    }

    #[test]
    fn test_active_count_tracks_elements() {
        let store = test_store();
        store.set_month(vec![6]);
        assert_eq!(store.snapshot().active_filter_count(), 1);

        store.set_month(vec![3, 6]);
        assert_eq!(store.snapshot().active_filter_count(), 2);

        // Re-adding an already-present element is a no-op on the count.
        store.set_month(vec![6, 3, 6]);
        assert_eq!(store.snapshot().active_filter_count(), 2);

        store.set_month(vec![6]);
        assert_eq!(store.snapshot().active_filter_count(), 1);
    }

    #[test]
    fn test_subscribers_see_synchronous_snapshots() {
        let store = Arc::new(test_store());
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = Arc::clone(&seen);
        let id = store.subscribe(move |state| {
            seen_clone.store(state.active_filter_count(), Ordering::SeqCst);
        });

        store.set_locality(vec!["Firenze".into(), "Pisa".into()]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        store.unsubscribe(id);
        store.set_locality(vec![]);
        // The unsubscribed callback no longer runs.
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_locked_institution_survives_reset() {
        let store = test_store();
        store.lock_institution_code(vec!["FI".into()]);
        store.set_country(vec!["IT".into()]);

        // Locked field stays out of the badge but keeps its value.
        assert_eq!(store.snapshot().active_filter_count(), 1);
        store.set_institution_code(vec!["PAD".into()]);
        assert_eq!(store.snapshot().institution_code, vec!["FI".to_owned()]);

        store.reset();
        let state = store.snapshot();
        assert_eq!(state.institution_code, vec!["FI".to_owned()]);
        assert!(state.country.is_empty());

        store.unlock_institution_code();
        assert_eq!(store.snapshot().active_filter_count(), 1);
        store.reset();
        assert!(store.snapshot().institution_code.is_empty());
    }

    #[test]
    fn test_reset_except_keeps_listed_fields() {
        let store = test_store();
        store.set_country(vec!["IT".into()]);
        store.set_month(vec![6]);

        store.reset_except(&[FilterField::Month]);
        let state = store.snapshot();
        assert!(state.country.is_empty());
        assert_eq!(state.month, vec![6]);
    }

    #[test]
    fn test_update_applies_invariants() {
        let store = test_store();
        store.set_skip(24);
        store.update(|state| {
            state.scientific_name = vec!["Quercus ilex".into(), "Olea europaea".into()];
            state.has_coordinates = true;
        });

        let state = store.snapshot();
        assert_eq!(
            state.scientific_name,
            vec!["Olea europaea".to_owned(), "Quercus ilex".to_owned()]
        );
        assert_eq!(state.skip, 0);
        assert_eq!(state.active_filter_count(), 3);
    }
}
