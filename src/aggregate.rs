use crate::error::{ForecastError, Result};
use crate::schema::{AggregatedPoint, ForecastRecord};
use crate::value::ValueCalculator;
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::BTreeMap;

/// Converted forecast/actual values for one record, or `None` when the
/// record cannot contribute (deleted SKU, missing conversion rate). A
/// failure on one record never aborts the rest of the pass; partial results
/// beat a failed aggregation.
async fn record_values(
    calc: &mut ValueCalculator<'_>,
    record: &ForecastRecord,
) -> Result<Option<(f64, Option<f64>)>> {
    let forecast = match calc.value(record.forecast_qty, &record.sku_id).await {
        Ok(value) => value,
        Err(ForecastError::UnknownSku(sku_id)) => {
            debug!("record {} references deleted SKU {sku_id}, contributes zero", record.id);
            return Ok(None);
        }
        Err(err @ ForecastError::MissingRate { .. }) => {
            warn!("skipping record {}: {err}", record.id);
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    let actual = match record.actual_qty {
        Some(qty) => match calc.value(qty, &record.sku_id).await {
            Ok(value) => Some(value),
            // The forecast conversion above already succeeded for this SKU
            // and pair, so this only fires on store errors.
            Err(err) => return Err(err),
        },
        None => None,
    };

    Ok(Some((forecast, actual)))
}

#[derive(Debug, Default)]
struct Bucket {
    forecast: f64,
    /// `None` until the first contributing record with an actual arrives: a
    /// bucket with zero actuals reported is "not yet actualized", which is
    /// not the same as an actual of zero.
    actual: Option<f64>,
}

impl Bucket {
    fn add(&mut self, forecast: f64, actual: Option<f64>) {
        self.forecast += forecast;
        if let Some(value) = actual {
            self.actual = Some(self.actual.unwrap_or(0.0) + value);
        }
    }
}

/// One bucket per distinct month present in the input, labeled `Jan`..`Dec`,
/// in chronological order regardless of record order.
pub async fn monthly_buckets(
    calc: &mut ValueCalculator<'_>,
    records: &[ForecastRecord],
) -> Result<Vec<AggregatedPoint>> {
    let mut buckets: BTreeMap<u32, Bucket> = BTreeMap::new();

    for record in records {
        if let Some((forecast, actual)) = record_values(calc, record).await? {
            buckets.entry(record.month).or_default().add(forecast, actual);
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(month, bucket)| AggregatedPoint {
            label: month_label(month),
            forecast_value: bucket.forecast,
            actual_value: bucket.actual,
        })
        .collect())
}

/// Buckets by quarter (`ceil(month / 3)`), emitted in Q1..Q4 order. Shares
/// the monthly null rule: an actual shows as soon as one contributing record
/// has one.
pub async fn quarterly_buckets(
    calc: &mut ValueCalculator<'_>,
    records: &[ForecastRecord],
) -> Result<Vec<AggregatedPoint>> {
    let mut buckets: BTreeMap<u32, Bucket> = BTreeMap::new();

    for record in records {
        if let Some((forecast, actual)) = record_values(calc, record).await? {
            let quarter = record.month.div_ceil(3);
            buckets.entry(quarter).or_default().add(forecast, actual);
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(quarter, bucket)| AggregatedPoint {
            label: format!("Q{quarter}"),
            forecast_value: bucket.forecast,
            actual_value: bucket.actual,
        })
        .collect())
}

/// Single full-year rollup of an already year-filtered record set. Stricter
/// completeness rule than monthly/quarterly: the actual is `None` unless
/// *every* contributing record has one, so a yearly actual only ever shows
/// for a fully actualized year. Empty input yields an empty sequence, not a
/// zero bucket.
pub async fn yearly_bucket(
    calc: &mut ValueCalculator<'_>,
    records: &[ForecastRecord],
) -> Result<Vec<AggregatedPoint>> {
    let mut contributed = 0usize;
    let mut year = None;
    let mut forecast_total = 0.0;
    let mut actual_total = 0.0;
    let mut fully_actualized = true;

    for record in records {
        if let Some((forecast, actual)) = record_values(calc, record).await? {
            contributed += 1;
            year.get_or_insert(record.year);
            forecast_total += forecast;
            match actual {
                Some(value) => actual_total += value,
                None => fully_actualized = false,
            }
        }
    }

    if contributed == 0 {
        return Ok(Vec::new());
    }

    Ok(vec![AggregatedPoint {
        label: year.unwrap_or_default().to_string(),
        forecast_value: forecast_total,
        actual_value: if fully_actualized {
            Some(actual_total)
        } else {
            None
        },
    }])
}

/// Multi-year overview: one full-year bucket per distinct year present in a
/// year-unconstrained record set, in chronological order. Each year's subset
/// is derived and rolled up independently with the same completeness rule as
/// `yearly_bucket`.
pub async fn yearly_overview_buckets(
    calc: &mut ValueCalculator<'_>,
    records: &[ForecastRecord],
) -> Result<Vec<AggregatedPoint>> {
    let mut by_year: BTreeMap<i32, Vec<ForecastRecord>> = BTreeMap::new();
    for record in records {
        by_year.entry(record.year).or_default().push(record.clone());
    }

    let mut points = Vec::with_capacity(by_year.len());
    for (_, subset) in by_year {
        points.extend(yearly_bucket(calc, &subset).await?);
    }
    Ok(points)
}

fn month_label(month: u32) -> String {
    NaiveDate::from_ymd_opt(2000, month, 1)
        .map(|d| d.format("%b").to_string())
        .unwrap_or_else(|| format!("M{month}"))
}
