use crate::error::{ForecastError, Result};
use crate::schema::{ForecastRecord, SkuSummary};
use crate::store::ForecastStore;
use crate::value::ValueCalculator;
use log::{debug, warn};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct SkuTotals {
    forecast: f64,
    actual: Option<f64>,
}

/// Rolls a filtered record set up per SKU: monetary forecast and actual
/// totals plus a variance percentage, sorted by SKU name.
///
/// The actual total appears once any record for the SKU carries an actual.
/// Variance is `(actual - forecast) / forecast * 100`, reported only when an
/// actual total exists and the forecast total is positive; a zero or negative
/// forecast base makes the ratio meaningless. Records whose SKU no longer
/// resolves are dropped, and a SKU whose category or customer was deleted
/// still appears, labeled `Unknown` for the missing dimension.
pub async fn sku_overview(
    calc: &mut ValueCalculator<'_>,
    store: &dyn ForecastStore,
    records: &[ForecastRecord],
) -> Result<Vec<SkuSummary>> {
    let mut totals: BTreeMap<String, SkuTotals> = BTreeMap::new();

    for record in records {
        let forecast = match calc.value(record.forecast_qty, &record.sku_id).await {
            Ok(value) => value,
            Err(ForecastError::UnknownSku(sku_id)) => {
                debug!("overview drops record {} for deleted SKU {sku_id}", record.id);
                continue;
            }
            Err(err @ ForecastError::MissingRate { .. }) => {
                warn!("overview skips record {}: {err}", record.id);
                continue;
            }
            Err(err) => return Err(err),
        };

        let entry = totals.entry(record.sku_id.clone()).or_default();
        entry.forecast += forecast;
        if let Some(qty) = record.actual_qty {
            let actual = calc.value(qty, &record.sku_id).await?;
            entry.actual = Some(entry.actual.unwrap_or(0.0) + actual);
        }
    }

    let mut summaries = Vec::with_capacity(totals.len());
    for (sku_id, tally) in totals {
        // The conversion above succeeded, so the SKU is in the pass cache.
        let Some(sku) = calc.resolve_sku(&sku_id).await? else {
            continue;
        };

        let category = store
            .get_category(&sku.category_id)
            .await?
            .map(|c| c.name)
            .unwrap_or_else(|| "Unknown".to_string());
        let customer = store
            .get_customer(&sku.customer_id)
            .await?
            .map(|c| c.name)
            .unwrap_or_else(|| "Unknown".to_string());

        let variance_pct = match tally.actual {
            Some(actual) if tally.forecast > 0.0 => {
                Some((actual - tally.forecast) / tally.forecast * 100.0)
            }
            _ => None,
        };

        summaries.push(SkuSummary {
            sku_id,
            name: sku.name,
            category,
            customer,
            forecast_total: tally.forecast,
            actual_total: tally.actual,
            variance_pct,
        });
    }

    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(summaries)
}
