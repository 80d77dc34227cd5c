use crate::error::{ForecastError, Result};
use crate::schema::{
    Category, Customer, Dataset, ForecastRecord, RecordUpdate, Sku, Version,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Repository seam between the aggregation engine and whatever actually
/// holds the data. The engine only ever talks to this trait, so a remote
/// store can be substituted without touching aggregation logic. Every method
/// is async because SKU and record lookups may suspend on a remote backend.
#[async_trait]
pub trait ForecastStore: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn get_category(&self, id: &str) -> Result<Option<Category>>;
    async fn upsert_category(&self, category: Category) -> Result<()>;
    /// Fails with `EntityInUse` while any SKU still references the category.
    async fn delete_category(&self, id: &str) -> Result<()>;

    async fn list_customers(&self) -> Result<Vec<Customer>>;
    async fn get_customer(&self, id: &str) -> Result<Option<Customer>>;
    async fn upsert_customer(&self, customer: Customer) -> Result<()>;
    /// Fails with `EntityInUse` while any SKU still references the customer.
    async fn delete_customer(&self, id: &str) -> Result<()>;

    async fn list_skus(&self) -> Result<Vec<Sku>>;
    async fn get_sku(&self, id: &str) -> Result<Option<Sku>>;
    async fn upsert_sku(&self, sku: Sku) -> Result<()>;
    async fn delete_sku(&self, id: &str) -> Result<()>;

    /// Versions in chronological (`created_at`) order.
    async fn list_versions(&self) -> Result<Vec<Version>>;
    async fn upsert_version(&self, version: Version) -> Result<()>;

    async fn list_records(&self) -> Result<Vec<ForecastRecord>>;
    /// Records for one version, optionally narrowed to a single year.
    async fn records_for(
        &self,
        version_id: &str,
        year: Option<i32>,
    ) -> Result<Vec<ForecastRecord>>;
    async fn get_record(&self, id: &str) -> Result<Option<ForecastRecord>>;
    async fn insert_record(&self, record: ForecastRecord) -> Result<()>;
    /// Applies a partial quantity update atomically: readers observe either
    /// the full prior record or the full updated one.
    async fn update_record(&self, id: &str, update: RecordUpdate) -> Result<ForecastRecord>;
}

/// In-memory `ForecastStore` backed by `RwLock`-guarded maps. The reference
/// implementation for tests and for running against a seeded sample dataset.
#[derive(Debug, Default)]
pub struct MemoryStore {
    categories: RwLock<BTreeMap<String, Category>>,
    customers: RwLock<BTreeMap<String, Customer>>,
    skus: RwLock<BTreeMap<String, Sku>>,
    versions: RwLock<BTreeMap<String, Version>>,
    records: RwLock<BTreeMap<String, ForecastRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(dataset: Dataset) -> Result<Self> {
        let store = Self::new();
        {
            let mut categories = store.categories.write().unwrap();
            for category in dataset.categories {
                categories.insert(category.id.clone(), category);
            }
            let mut customers = store.customers.write().unwrap();
            for customer in dataset.customers {
                customers.insert(customer.id.clone(), customer);
            }
            let mut skus = store.skus.write().unwrap();
            for sku in dataset.skus {
                skus.insert(sku.id.clone(), sku);
            }
            let mut versions = store.versions.write().unwrap();
            for version in dataset.versions {
                versions.insert(version.id.clone(), version);
            }
            let mut records = store.records.write().unwrap();
            for record in dataset.records {
                Self::check_record(&records, &record)?;
                records.insert(record.id.clone(), record);
            }
        }
        Ok(store)
    }

    pub fn to_dataset(&self) -> Dataset {
        Dataset {
            categories: self.categories.read().unwrap().values().cloned().collect(),
            customers: self.customers.read().unwrap().values().cloned().collect(),
            skus: self.skus.read().unwrap().values().cloned().collect(),
            versions: self.versions.read().unwrap().values().cloned().collect(),
            records: self.records.read().unwrap().values().cloned().collect(),
        }
    }

    fn check_record(
        records: &BTreeMap<String, ForecastRecord>,
        record: &ForecastRecord,
    ) -> Result<()> {
        if !(1..=12).contains(&record.month) {
            return Err(ForecastError::InvalidMonth(record.month));
        }
        let duplicate = records.values().any(|r| {
            r.id != record.id
                && r.sku_id == record.sku_id
                && r.month == record.month
                && r.year == record.year
                && r.version_id == record.version_id
        });
        if duplicate {
            return Err(ForecastError::DuplicateRecord {
                sku_id: record.sku_id.clone(),
                month: record.month,
                year: record.year,
                version_id: record.version_id.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ForecastStore for MemoryStore {
    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories: Vec<Category> =
            self.categories.read().unwrap().values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&self, id: &str) -> Result<Option<Category>> {
        Ok(self.categories.read().unwrap().get(id).cloned())
    }

    async fn upsert_category(&self, category: Category) -> Result<()> {
        self.categories
            .write()
            .unwrap()
            .insert(category.id.clone(), category);
        Ok(())
    }

    async fn delete_category(&self, id: &str) -> Result<()> {
        let in_use = self
            .skus
            .read()
            .unwrap()
            .values()
            .any(|s| s.category_id == id);
        if in_use {
            return Err(ForecastError::EntityInUse {
                kind: "category",
                id: id.to_string(),
            });
        }
        match self.categories.write().unwrap().remove(id) {
            Some(_) => Ok(()),
            None => Err(ForecastError::EntityNotFound {
                kind: "category",
                id: id.to_string(),
            }),
        }
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let mut customers: Vec<Customer> =
            self.customers.read().unwrap().values().cloned().collect();
        customers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(customers)
    }

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>> {
        Ok(self.customers.read().unwrap().get(id).cloned())
    }

    async fn upsert_customer(&self, customer: Customer) -> Result<()> {
        self.customers
            .write()
            .unwrap()
            .insert(customer.id.clone(), customer);
        Ok(())
    }

    async fn delete_customer(&self, id: &str) -> Result<()> {
        let in_use = self
            .skus
            .read()
            .unwrap()
            .values()
            .any(|s| s.customer_id == id);
        if in_use {
            return Err(ForecastError::EntityInUse {
                kind: "customer",
                id: id.to_string(),
            });
        }
        match self.customers.write().unwrap().remove(id) {
            Some(_) => Ok(()),
            None => Err(ForecastError::EntityNotFound {
                kind: "customer",
                id: id.to_string(),
            }),
        }
    }

    async fn list_skus(&self) -> Result<Vec<Sku>> {
        let mut skus: Vec<Sku> = self.skus.read().unwrap().values().cloned().collect();
        skus.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(skus)
    }

    async fn get_sku(&self, id: &str) -> Result<Option<Sku>> {
        Ok(self.skus.read().unwrap().get(id).cloned())
    }

    async fn upsert_sku(&self, sku: Sku) -> Result<()> {
        self.skus.write().unwrap().insert(sku.id.clone(), sku);
        Ok(())
    }

    async fn delete_sku(&self, id: &str) -> Result<()> {
        match self.skus.write().unwrap().remove(id) {
            Some(_) => {
                // Cascade the SKU's forecast records. An external store may
                // leave them behind, so the filter layer drops orphans too.
                self.records
                    .write()
                    .unwrap()
                    .retain(|_, r| r.sku_id != id);
                Ok(())
            }
            None => Err(ForecastError::EntityNotFound {
                kind: "SKU",
                id: id.to_string(),
            }),
        }
    }

    async fn list_versions(&self) -> Result<Vec<Version>> {
        let mut versions: Vec<Version> =
            self.versions.read().unwrap().values().cloned().collect();
        versions.sort_by_key(|v| v.created_at);
        Ok(versions)
    }

    async fn upsert_version(&self, version: Version) -> Result<()> {
        self.versions
            .write()
            .unwrap()
            .insert(version.id.clone(), version);
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<ForecastRecord>> {
        Ok(self.records.read().unwrap().values().cloned().collect())
    }

    async fn records_for(
        &self,
        version_id: &str,
        year: Option<i32>,
    ) -> Result<Vec<ForecastRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| r.version_id == version_id && year.map_or(true, |y| r.year == y))
            .cloned()
            .collect())
    }

    async fn get_record(&self, id: &str) -> Result<Option<ForecastRecord>> {
        Ok(self.records.read().unwrap().get(id).cloned())
    }

    async fn insert_record(&self, record: ForecastRecord) -> Result<()> {
        let mut records = self.records.write().unwrap();
        Self::check_record(&records, &record)?;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_record(&self, id: &str, update: RecordUpdate) -> Result<ForecastRecord> {
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(id)
            .ok_or_else(|| ForecastError::RecordNotFound(id.to_string()))?;
        if let Some(forecast_qty) = update.forecast_qty {
            record.forecast_qty = forecast_qty;
        }
        if let Some(actual_qty) = update.actual_qty {
            record.actual_qty = actual_qty;
        }
        Ok(record.clone())
    }
}
