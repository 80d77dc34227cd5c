use crate::aggregate::{
    monthly_buckets, quarterly_buckets, yearly_bucket, yearly_overview_buckets,
};
use crate::currency::RateTable;
use crate::error::{ForecastError, Result};
use crate::filter::{filter_by_criteria, filter_records};
use crate::overview::sku_overview;
use crate::schema::{
    AggregatedPoint, AggregationQuery, Currency, FilterCriteria, ForecastRecord, RecordUpdate,
    SkuSummary, TimeView, Version,
};
use crate::store::ForecastStore;
use crate::value::ValueCalculator;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A primary series next to an optional comparison series for another
/// version over the same criteria.
#[derive(Debug, Clone, Serialize)]
pub struct VersionComparison {
    pub primary: Vec<AggregatedPoint>,
    pub compare: Option<Vec<AggregatedPoint>>,
}

/// Per-SKU rollups for a primary version and an optional comparison version.
#[derive(Debug, Clone, Serialize)]
pub struct OverviewComparison {
    pub primary: Vec<SkuSummary>,
    pub compare: Option<Vec<SkuSummary>>,
}

#[derive(Debug)]
struct CachedResult {
    revision: u64,
    points: Vec<AggregatedPoint>,
}

#[derive(Debug)]
struct CacheSlot {
    /// Sequence number of the most recently started pass for this query.
    /// A finishing pass installs its result only while it still holds this
    /// number, so of two overlapping passes the later one wins.
    started: u64,
    completed: Option<CachedResult>,
}

/// Orchestrates filtering, conversion and bucketing over an injected store.
///
/// Aggregation results are memoized per query and tied to a data revision:
/// repeating a query against unchanged data returns the cached series
/// without touching the store, and any mutation through the engine (or an
/// explicit [`invalidate`](ForecastEngine::invalidate)) makes every cached
/// series stale at once. Overlapping passes for the same query resolve
/// last-write-wins; a superseded pass still returns its own result to its
/// caller but never overwrites the cache.
pub struct ForecastEngine {
    store: Arc<dyn ForecastStore>,
    rates: RateTable,
    cache: Mutex<HashMap<AggregationQuery, CacheSlot>>,
    revision: AtomicU64,
    sequence: AtomicU64,
}

impl ForecastEngine {
    pub fn new(store: Arc<dyn ForecastStore>, rates: RateTable) -> Self {
        Self {
            store,
            rates,
            cache: Mutex::new(HashMap::new()),
            revision: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn ForecastStore> {
        &self.store
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    /// Marks every memoized series stale. Called automatically by engine
    /// mutations; call it directly after mutating the store out of band.
    pub fn invalidate(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Filters, converts and buckets one query, through the memo cache.
    pub async fn aggregate(&self, query: &AggregationQuery) -> Result<Vec<AggregatedPoint>> {
        let revision = self.revision.load(Ordering::Acquire);

        let seq = {
            let mut cache = self.cache.lock().unwrap();
            if let Some(done) = cache.get(query).and_then(|slot| slot.completed.as_ref()) {
                if done.revision == revision {
                    debug!("aggregation cache hit for {query:?}");
                    return Ok(done.points.clone());
                }
            }
            let seq = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
            cache
                .entry(query.clone())
                .and_modify(|slot| slot.started = seq)
                .or_insert(CacheSlot {
                    started: seq,
                    completed: None,
                });
            seq
        };

        let points = self.compute(query).await?;

        let mut cache = self.cache.lock().unwrap();
        let still_current = self.revision.load(Ordering::Acquire) == revision;
        match cache.get_mut(query) {
            Some(slot) if slot.started == seq && still_current => {
                slot.completed = Some(CachedResult {
                    revision,
                    points: points.clone(),
                });
            }
            _ => debug!("aggregation pass {seq} superseded, result not cached"),
        }
        Ok(points)
    }

    async fn compute(&self, query: &AggregationQuery) -> Result<Vec<AggregatedPoint>> {
        let records = filter_by_criteria(self.store.as_ref(), &query.criteria).await?;
        let mut calc =
            ValueCalculator::new(self.store.as_ref(), &self.rates, query.display_currency);
        match query.time_view {
            TimeView::Monthly => monthly_buckets(&mut calc, &records).await,
            TimeView::Quarterly => quarterly_buckets(&mut calc, &records).await,
            TimeView::Yearly => yearly_bucket(&mut calc, &records).await,
        }
    }

    /// One full-year bucket per year in which the version has matching
    /// records, across all years. Not memoized; the multi-year view is
    /// requested far less often than the per-year series.
    pub async fn yearly_overview(
        &self,
        category_id: Option<&str>,
        customer_id: Option<&str>,
        version_id: &str,
        display_currency: Currency,
    ) -> Result<Vec<AggregatedPoint>> {
        let records = filter_records(
            self.store.as_ref(),
            category_id,
            customer_id,
            None,
            version_id,
        )
        .await?;
        let mut calc = ValueCalculator::new(self.store.as_ref(), &self.rates, display_currency);
        yearly_overview_buckets(&mut calc, &records).await
    }

    /// Per-SKU monetary rollup of the criteria's record set.
    pub async fn sku_overview(
        &self,
        criteria: &FilterCriteria,
        display_currency: Currency,
    ) -> Result<Vec<SkuSummary>> {
        let records = filter_by_criteria(self.store.as_ref(), criteria).await?;
        let mut calc = ValueCalculator::new(self.store.as_ref(), &self.rates, display_currency);
        sku_overview(&mut calc, self.store.as_ref(), &records).await
    }

    /// The version created immediately before the given one, the natural
    /// default for comparison. The chronologically first version has nothing
    /// to compare against.
    pub async fn default_compare_version(&self, version_id: &str) -> Result<Option<Version>> {
        let versions = self.store.list_versions().await?;
        let index = versions
            .iter()
            .position(|v| v.id == version_id)
            .ok_or_else(|| ForecastError::UnknownVersion(version_id.to_string()))?;
        Ok(if index > 0 {
            Some(versions[index - 1].clone())
        } else {
            None
        })
    }

    /// Aggregates the query for its own version and, when given, the same
    /// criteria against a comparison version.
    pub async fn compare_versions(
        &self,
        query: &AggregationQuery,
        compare_version_id: Option<&str>,
    ) -> Result<VersionComparison> {
        let primary = self.aggregate(query).await?;
        let compare = match compare_version_id {
            Some(version_id) => {
                let mut shadow = query.clone();
                shadow.criteria.version_id = version_id.to_string();
                Some(self.aggregate(&shadow).await?)
            }
            None => None,
        };
        Ok(VersionComparison { primary, compare })
    }

    /// SKU rollups for a primary version and optionally a comparison
    /// version over the same criteria.
    pub async fn compare_overview(
        &self,
        criteria: &FilterCriteria,
        display_currency: Currency,
        compare_version_id: Option<&str>,
    ) -> Result<OverviewComparison> {
        let primary = self.sku_overview(criteria, display_currency).await?;
        let compare = match compare_version_id {
            Some(version_id) => {
                let mut shadow = criteria.clone();
                shadow.version_id = version_id.to_string();
                Some(self.sku_overview(&shadow, display_currency).await?)
            }
            None => None,
        };
        Ok(OverviewComparison { primary, compare })
    }

    /// Applies a partial update to one record and invalidates every cached
    /// series, so the next aggregation reflects the edit.
    pub async fn update_record(&self, id: &str, update: RecordUpdate) -> Result<ForecastRecord> {
        let record = self.store.update_record(id, update).await?;
        self.invalidate();
        Ok(record)
    }

    /// Inserts a record through the engine, keeping the cache coherent.
    pub async fn insert_record(&self, record: ForecastRecord) -> Result<()> {
        self.store.insert_record(record).await?;
        self.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Category, Currency, Customer, Sku};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::sync::Notify;

    fn sku(id: &str, price: f64) -> Sku {
        Sku {
            id: id.to_string(),
            name: format!("SKU {id}"),
            category_id: "cat1".to_string(),
            customer_id: "cust1".to_string(),
            price,
            currency: Currency::Usd,
        }
    }

    fn record(id: &str, sku_id: &str, month: u32, qty: f64, version_id: &str) -> ForecastRecord {
        ForecastRecord {
            id: id.to_string(),
            sku_id: sku_id.to_string(),
            month,
            year: 2024,
            forecast_qty: qty,
            actual_qty: None,
            version_id: version_id.to_string(),
        }
    }

    fn version(id: &str, name: &str, day: u32) -> Version {
        Version {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            notes: None,
        }
    }

    fn query(version_id: &str) -> AggregationQuery {
        AggregationQuery {
            criteria: FilterCriteria {
                category_id: None,
                customer_id: None,
                year: 2024,
                version_id: version_id.to_string(),
            },
            time_view: TimeView::Monthly,
            display_currency: Currency::Usd,
        }
    }

    async fn fixture() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.upsert_sku(sku("sku1", 10.0)).await.unwrap();
        store.upsert_version(version("v1", "Initial", 1)).await.unwrap();
        store.upsert_version(version("v2", "Revision", 15)).await.unwrap();
        store
            .insert_record(record("r1", "sku1", 1, 100.0, "v1"))
            .await
            .unwrap();
        store
            .insert_record(record("r2", "sku1", 2, 50.0, "v1"))
            .await
            .unwrap();
        store
            .insert_record(record("r3", "sku1", 1, 80.0, "v2"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_aggregate_monthly() {
        let store = fixture().await;
        let engine = ForecastEngine::new(store, RateTable::builtin());

        let points = engine.aggregate(&query("v1")).await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].label, "Jan");
        assert_eq!(points[0].forecast_value, 1000.0);
    }

    #[tokio::test]
    async fn test_cached_result_served_while_data_unchanged() {
        let store = fixture().await;
        let engine = ForecastEngine::new(store.clone(), RateTable::builtin());

        let first = engine.aggregate(&query("v1")).await.unwrap();
        // Mutate the store behind the engine's back: the cache has no way to
        // know, so the stale series is still served.
        store
            .insert_record(record("r9", "sku1", 3, 999.0, "v1"))
            .await
            .unwrap();
        let second = engine.aggregate(&query("v1")).await.unwrap();
        assert_eq!(first.len(), second.len());

        // An explicit invalidation picks the new record up.
        engine.invalidate();
        let third = engine.aggregate(&query("v1")).await.unwrap();
        assert_eq!(third.len(), 3);
    }

    #[tokio::test]
    async fn test_update_record_invalidates_cache() {
        let store = fixture().await;
        let engine = ForecastEngine::new(store, RateTable::builtin());

        let before = engine.aggregate(&query("v1")).await.unwrap();
        assert_eq!(before[0].forecast_value, 1000.0);

        engine
            .update_record(
                "r1",
                RecordUpdate {
                    forecast_qty: Some(200.0),
                    actual_qty: None,
                },
            )
            .await
            .unwrap();

        let after = engine.aggregate(&query("v1")).await.unwrap();
        assert_eq!(after[0].forecast_value, 2000.0);
    }

    #[tokio::test]
    async fn test_update_record_sets_and_clears_actual() {
        let store = fixture().await;
        let engine = ForecastEngine::new(store, RateTable::builtin());

        engine
            .update_record(
                "r1",
                RecordUpdate {
                    forecast_qty: None,
                    actual_qty: Some(Some(90.0)),
                },
            )
            .await
            .unwrap();
        let points = engine.aggregate(&query("v1")).await.unwrap();
        assert_eq!(points[0].actual_value, Some(900.0));

        engine
            .update_record(
                "r1",
                RecordUpdate {
                    forecast_qty: None,
                    actual_qty: Some(None),
                },
            )
            .await
            .unwrap();
        let points = engine.aggregate(&query("v1")).await.unwrap();
        assert_eq!(points[0].actual_value, None);
    }

    #[tokio::test]
    async fn test_default_compare_version() {
        let store = fixture().await;
        let engine = ForecastEngine::new(store, RateTable::builtin());

        let prior = engine.default_compare_version("v2").await.unwrap();
        assert_eq!(prior.unwrap().id, "v1");

        // The earliest version has no predecessor.
        assert!(engine.default_compare_version("v1").await.unwrap().is_none());

        let err = engine.default_compare_version("v9").await.unwrap_err();
        assert!(matches!(err, ForecastError::UnknownVersion(_)));
    }

    #[tokio::test]
    async fn test_compare_versions_runs_same_criteria_twice() {
        let store = fixture().await;
        let engine = ForecastEngine::new(store, RateTable::builtin());

        let comparison = engine
            .compare_versions(&query("v2"), Some("v1"))
            .await
            .unwrap();
        assert_eq!(comparison.primary.len(), 1);
        assert_eq!(comparison.primary[0].forecast_value, 800.0);
        let compare = comparison.compare.unwrap();
        assert_eq!(compare.len(), 2);
        assert_eq!(compare[0].forecast_value, 1000.0);

        let solo = engine.compare_versions(&query("v1"), None).await.unwrap();
        assert!(solo.compare.is_none());
    }

    #[tokio::test]
    async fn test_yearly_overview_spans_years() {
        let store = fixture().await;
        store
            .insert_record(ForecastRecord {
                id: "r2025".to_string(),
                sku_id: "sku1".to_string(),
                month: 1,
                year: 2025,
                forecast_qty: 10.0,
                actual_qty: None,
                version_id: "v1".to_string(),
            })
            .await
            .unwrap();
        let engine = ForecastEngine::new(store, RateTable::builtin());

        let points = engine
            .yearly_overview(None, None, "v1", Currency::Usd)
            .await
            .unwrap();
        let labels: Vec<_> = points.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["2024", "2025"]);
    }

    #[tokio::test]
    async fn test_sku_overview_through_engine() {
        let store = fixture().await;
        let engine = ForecastEngine::new(store, RateTable::builtin());

        let summaries = engine
            .sku_overview(&query("v1").criteria, Currency::Usd)
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].forecast_total, 1500.0);
    }

    #[tokio::test]
    async fn test_unknown_version_aggregates_empty() {
        let store = fixture().await;
        let engine = ForecastEngine::new(store, RateTable::builtin());

        let points = engine.aggregate(&query("ghost")).await.unwrap();
        assert!(points.is_empty());
    }

    /// Store wrapper that can park one record read until released, so tests
    /// can hold an aggregation pass mid-flight while another runs to
    /// completion.
    struct GatedStore {
        inner: MemoryStore,
        entered: Notify,
        release: Notify,
        hold_next: AtomicBool,
        record_reads: AtomicUsize,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                entered: Notify::new(),
                release: Notify::new(),
                hold_next: AtomicBool::new(false),
                record_reads: AtomicUsize::new(0),
            }
        }

        fn hold_next_read(&self) {
            self.hold_next.store(true, Ordering::SeqCst);
        }

        fn record_reads(&self) -> usize {
            self.record_reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ForecastStore for GatedStore {
        async fn list_categories(&self) -> Result<Vec<Category>> {
            self.inner.list_categories().await
        }
        async fn get_category(&self, id: &str) -> Result<Option<Category>> {
            self.inner.get_category(id).await
        }
        async fn upsert_category(&self, category: Category) -> Result<()> {
            self.inner.upsert_category(category).await
        }
        async fn delete_category(&self, id: &str) -> Result<()> {
            self.inner.delete_category(id).await
        }
        async fn list_customers(&self) -> Result<Vec<Customer>> {
            self.inner.list_customers().await
        }
        async fn get_customer(&self, id: &str) -> Result<Option<Customer>> {
            self.inner.get_customer(id).await
        }
        async fn upsert_customer(&self, customer: Customer) -> Result<()> {
            self.inner.upsert_customer(customer).await
        }
        async fn delete_customer(&self, id: &str) -> Result<()> {
            self.inner.delete_customer(id).await
        }
        async fn list_skus(&self) -> Result<Vec<Sku>> {
            self.inner.list_skus().await
        }
        async fn get_sku(&self, id: &str) -> Result<Option<Sku>> {
            self.inner.get_sku(id).await
        }
        async fn upsert_sku(&self, sku: Sku) -> Result<()> {
            self.inner.upsert_sku(sku).await
        }
        async fn delete_sku(&self, id: &str) -> Result<()> {
            self.inner.delete_sku(id).await
        }
        async fn list_versions(&self) -> Result<Vec<Version>> {
            self.inner.list_versions().await
        }
        async fn upsert_version(&self, version: Version) -> Result<()> {
            self.inner.upsert_version(version).await
        }
        async fn list_records(&self) -> Result<Vec<ForecastRecord>> {
            self.inner.list_records().await
        }
        async fn records_for(
            &self,
            version_id: &str,
            year: Option<i32>,
        ) -> Result<Vec<ForecastRecord>> {
            self.record_reads.fetch_add(1, Ordering::SeqCst);
            if self.hold_next.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.records_for(version_id, year).await
        }
        async fn get_record(&self, id: &str) -> Result<Option<ForecastRecord>> {
            self.inner.get_record(id).await
        }
        async fn insert_record(&self, record: ForecastRecord) -> Result<()> {
            self.inner.insert_record(record).await
        }
        async fn update_record(&self, id: &str, update: RecordUpdate) -> Result<ForecastRecord> {
            self.inner.update_record(id, update).await
        }
    }

    #[tokio::test]
    async fn test_later_overlapping_pass_wins_cache() {
        let store = Arc::new(GatedStore::new());
        store.upsert_sku(sku("sku1", 10.0)).await.unwrap();
        store
            .insert_record(record("r1", "sku1", 1, 100.0, "v1"))
            .await
            .unwrap();
        let engine = Arc::new(ForecastEngine::new(store.clone(), RateTable::builtin()));

        // First pass parks inside the store read.
        store.hold_next_read();
        let first = tokio::spawn({
            let engine = engine.clone();
            let q = query("v1");
            async move { engine.aggregate(&q).await }
        });
        store.entered.notified().await;

        // A second pass for the same query starts later and completes first.
        let second = engine.aggregate(&query("v1")).await.unwrap();
        assert_eq!(second.len(), 1);

        // The data shifts before the parked pass resumes.
        store
            .insert_record(record("r2", "sku1", 2, 50.0, "v1"))
            .await
            .unwrap();
        store.release.notify_one();
        let first = first.await.unwrap().unwrap();
        // The overtaken pass still answers its own caller with what it read.
        assert_eq!(first.len(), 2);

        // But the cache holds the later-started pass's series: a repeat query
        // serves it without another store read.
        let reads = store.record_reads();
        let served = engine.aggregate(&query("v1")).await.unwrap();
        assert_eq!(served, second);
        assert_eq!(store.record_reads(), reads);
    }

    #[tokio::test]
    async fn test_invalidation_mid_pass_skips_cache_install() {
        let store = Arc::new(GatedStore::new());
        store.upsert_sku(sku("sku1", 10.0)).await.unwrap();
        store
            .insert_record(record("r1", "sku1", 1, 100.0, "v1"))
            .await
            .unwrap();
        let engine = Arc::new(ForecastEngine::new(store.clone(), RateTable::builtin()));

        store.hold_next_read();
        let pass = tokio::spawn({
            let engine = engine.clone();
            let q = query("v1");
            async move { engine.aggregate(&q).await }
        });
        store.entered.notified().await;

        // The data revision moves while the pass is in flight.
        engine.invalidate();
        store.release.notify_one();
        pass.await.unwrap().unwrap();

        // The stale pass must not have been installed: the next aggregation
        // goes back to the store.
        let reads = store.record_reads();
        engine.aggregate(&query("v1")).await.unwrap();
        assert_eq!(store.record_reads(), reads + 1);

        // And that fresh pass is cached as usual.
        engine.aggregate(&query("v1")).await.unwrap();
        assert_eq!(store.record_reads(), reads + 1);
    }
}
