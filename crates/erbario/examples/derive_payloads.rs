//! Deriving request payloads from filter state
//!
//! This example demonstrates the heart of the client without touching the
//! network:
//! - Mutating the shared filter store (canonicalization, pagination reset)
//! - Projecting one state into the three query variants
//! - How the default year range disappears from the wire

use erbario::{
    FilterStore, QueryOverrides, QueryVariant, SortOrder, StoreOptions, derive_query,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = FilterStore::new(StoreOptions::default());

    // Narrow the dataset. Arrays are stored in canonical order, and every
    // mutation resets pagination.
    store.set_scientific_name(vec!["Olea europaea".into(), "Quercus ilex".into()]);
    store.set_country(vec!["IT".into(), "FR".into()]);
    store.set_month(vec![6, 3]);
    store.set_year_range(1950, 1980);

    let state = store.snapshot();
    println!("{} active filters", state.active_filter_count());
    println!("months (canonical): {:?}", state.month);

    // Gallery/table request: pagination, sorting, full filter set.
    let data = derive_query(&state, QueryVariant::Data, None);
    println!("\nPOST {}", data.path());
    println!("{}", serde_json::to_string_pretty(&data.body())?);

    // Map request: coordinates forced on, viewport parameters added.
    let map = derive_query(&state, QueryVariant::Map, None);
    println!("\nPOST {}", map.path());
    println!("{}", serde_json::to_string_pretty(&map.body())?);

    // Aggregate request grouped by collecting year, with a custom sort on
    // the data variant for comparison.
    let overrides = QueryOverrides::group_by("year");
    let graph = derive_query(&state, QueryVariant::Graph, Some(&overrides));
    println!("\nPOST {}", graph.path());
    println!("{}", serde_json::to_string_pretty(&graph.body())?);

    let sorted = derive_query(
        &state,
        QueryVariant::Data,
        Some(&QueryOverrides::sorted_by("year", SortOrder::Desc)),
    );
    println!("\ncustom sort: {}", serde_json::to_string(&sorted.body()["sort"])?);

    // An untouched year range is omitted entirely: the server treats "no
    // year filter" as "all years".
    store.set_year_range(erbario::DEFAULT_MIN_YEAR, store.snapshot().default_year_range().1);
    let unfiltered = derive_query(&store.snapshot(), QueryVariant::Data, None);
    println!(
        "\nyear filter present after reset to full range: {}",
        unfiltered.filters.contains_key("year")
    );

    Ok(())
}
