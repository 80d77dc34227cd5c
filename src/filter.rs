use crate::error::Result;
use crate::schema::{FilterCriteria, ForecastRecord};
use crate::store::ForecastStore;
use log::debug;
use std::collections::HashSet;

/// Selects the forecast records matching the dimensional criteria.
///
/// Category and customer membership is resolved through the record's SKU;
/// `None` leaves that dimension unconstrained. Records whose SKU no longer
/// exists cannot satisfy any constraint and cannot be labeled for display, so
/// they are dropped even when both dimensions are unconstrained. `year: None`
/// spans all years (used by the multi-year overview).
pub async fn filter_records(
    store: &dyn ForecastStore,
    category_id: Option<&str>,
    customer_id: Option<&str>,
    year: Option<i32>,
    version_id: &str,
) -> Result<Vec<ForecastRecord>> {
    let eligible: HashSet<String> = store
        .list_skus()
        .await?
        .into_iter()
        .filter(|sku| category_id.map_or(true, |c| sku.category_id == c))
        .filter(|sku| customer_id.map_or(true, |c| sku.customer_id == c))
        .map(|sku| sku.id)
        .collect();

    let candidates = store.records_for(version_id, year).await?;
    let total = candidates.len();
    let records: Vec<ForecastRecord> = candidates
        .into_iter()
        .filter(|r| eligible.contains(&r.sku_id))
        .collect();

    if records.len() < total {
        debug!(
            "filter dropped {} of {} records (orphaned or outside constraints)",
            total - records.len(),
            total
        );
    }

    Ok(records)
}

/// Convenience wrapper taking the query criteria struct.
pub async fn filter_by_criteria(
    store: &dyn ForecastStore,
    criteria: &FilterCriteria,
) -> Result<Vec<ForecastRecord>> {
    filter_records(
        store,
        criteria.category_id.as_deref(),
        criteria.customer_id.as_deref(),
        Some(criteria.year),
        &criteria.version_id,
    )
    .await
}
