//! # Forecast Planner
//!
//! A library for turning per-SKU quantity forecasts into monetary planning
//! series: filtered, currency-converted and rolled up into monthly,
//! quarterly or yearly buckets, with version-over-version comparison.
//!
//! ## Core Concepts
//!
//! - **Forecast Record**: one SKU's quantity plan for a (month, year) under a version,
//!   with an optional recorded actual
//! - **Version**: a named forecast snapshot; later versions revise earlier ones
//! - **Valuation**: `quantity x native SKU price`, converted to a display currency
//!   via a direct-pair rate table (no transitive inference)
//! - **Bucketing**: monthly and quarterly rollups surface an actual as soon as one
//!   record has one; a yearly rollup only when the year is fully actualized
//! - **Engine**: memoizes aggregation per query against a data revision, with
//!   last-write-wins supersession for overlapping passes
//!
//! ## Example
//!
//! ```rust,ignore
//! use forecast_planner::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = engine_with_sample_data()?;
//!
//!     let query = AggregationQuery {
//!         criteria: FilterCriteria {
//!             category_id: None,
//!             customer_id: None,
//!             year: 2024,
//!             version_id: "v1".to_string(),
//!         },
//!         time_view: TimeView::Monthly,
//!         display_currency: Currency::Thb,
//!     };
//!
//!     for point in engine.aggregate(&query).await? {
//!         println!("{}: {}", point.label, format_currency(point.forecast_value, Currency::Thb));
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod currency;
pub mod engine;
pub mod error;
pub mod filter;
pub mod format;
pub mod overview;
pub mod sample;
pub mod schema;
pub mod store;
pub mod value;

pub use aggregate::{monthly_buckets, quarterly_buckets, yearly_bucket, yearly_overview_buckets};
pub use currency::RateTable;
pub use engine::{ForecastEngine, OverviewComparison, VersionComparison};
pub use error::{ForecastError, Result};
pub use filter::{filter_by_criteria, filter_records};
pub use format::format_currency;
pub use overview::sku_overview;
pub use sample::sample_dataset;
pub use schema::*;
pub use store::{ForecastStore, MemoryStore};
pub use value::ValueCalculator;

use std::sync::Arc;

/// An engine over an in-memory store seeded with the demo dataset and the
/// built-in rate table. Handy for tests and demos.
pub fn engine_with_sample_data() -> Result<ForecastEngine> {
    let store = MemoryStore::from_dataset(sample_dataset())?;
    Ok(ForecastEngine::new(Arc::new(store), RateTable::builtin()))
}
