use crate::error::Result;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[schemars(description = "United States dollar")]
    Usd,
    #[schemars(description = "Euro")]
    Eur,
    #[schemars(description = "Thai baht")]
    Thb,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Eur, Currency::Thb];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Thb => "THB",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Customer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Sku {
    pub id: String,
    pub name: String,
    pub category_id: String,
    pub customer_id: String,
    #[schemars(description = "Unit price denominated in `currency`")]
    pub price: f64,
    #[schemars(description = "Native currency the price is quoted in")]
    pub currency: Currency,
}

/// A named, timestamped snapshot partitioning forecast records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Version {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The atomic fact: one SKU-month of forecast (and possibly actual) quantity,
/// scoped to a version. `actual_qty` stays `None` until actuals are recorded
/// for that month. At most one record exists per
/// `(sku_id, month, year, version_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastRecord {
    pub id: String,
    pub sku_id: String,
    #[schemars(description = "Calendar month, 1-12")]
    pub month: u32,
    pub year: i32,
    pub forecast_qty: f64,
    pub actual_qty: Option<f64>,
    pub version_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExchangeRate {
    pub from: Currency,
    pub to: Currency,
    pub rate: f64,
}

/// Selects the time-bucket grouping strategy for aggregation queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TimeView {
    Monthly,
    Quarterly,
    Yearly,
}

/// Dimensional criteria for the record filter. `None` on category/customer
/// means the dimension is unconstrained, not "match null".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub category_id: Option<String>,
    pub customer_id: Option<String>,
    pub year: i32,
    pub version_id: String,
}

/// A full aggregation request. Also serves as the memoization key: two
/// queries with equal fields produce the same output for the same data
/// revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationQuery {
    pub criteria: FilterCriteria,
    pub time_view: TimeView,
    pub display_currency: Currency,
}

/// One time bucket of the aggregation output. `actual_value` is `None` when
/// the bucket is not yet actualized, which is distinct from an actual of zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPoint {
    pub label: String,
    pub forecast_value: f64,
    pub actual_value: Option<f64>,
}

/// Per-SKU rollup row for the overview report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuSummary {
    pub sku_id: String,
    pub name: String,
    pub category: String,
    pub customer: String,
    pub forecast_total: f64,
    pub actual_total: Option<f64>,
    /// Percentage deviation of actual from forecast; positive means actual
    /// exceeded forecast. `None` when no actuals exist or forecast_total is
    /// not positive.
    pub variance_pct: Option<f64>,
}

/// Partial update for a forecast record. The outer `Option` on `actual_qty`
/// distinguishes "leave unchanged" from "clear back to not-yet-actualized".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_qty: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_explicit_null"
    )]
    pub actual_qty: Option<Option<f64>>,
}

// Maps a present-but-null JSON field to `Some(None)` so it stays
// distinguishable from an absent field.
fn deserialize_explicit_null<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<f64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(Some)
}

/// JSON interchange container for a complete planning dataset. Used to seed
/// the in-memory store and to exchange data with external tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Dataset {
    pub categories: Vec<Category>,
    pub customers: Vec<Customer>,
    pub skus: Vec<Sku>,
    pub versions: Vec<Version>,
    pub records: Vec<ForecastRecord>,
}

impl Dataset {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a dataset from a pretty-printed JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Writes the dataset as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Dataset)
    }

    pub fn schema_as_json() -> Result<String> {
        Ok(serde_json::to_string_pretty(&Self::generate_json_schema())?)
    }
}
