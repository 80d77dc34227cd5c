use crate::currency::RateTable;
use crate::error::{ForecastError, Result};
use crate::schema::{Currency, Sku};
use crate::store::ForecastStore;
use std::collections::HashMap;

/// Converts (quantity, SKU) pairs into monetary amounts in a target display
/// currency: `qty x native price`, then one direct-pair conversion. No
/// rounding happens here; that is a presentation concern.
///
/// One calculator lives for the duration of a single aggregation pass. SKU
/// lookups may suspend on a remote store, so resolved SKUs (including
/// negative lookups) are cached so each SKU is fetched at most once per pass.
pub struct ValueCalculator<'a> {
    store: &'a dyn ForecastStore,
    rates: &'a RateTable,
    target: Currency,
    resolved: HashMap<String, Option<Sku>>,
}

impl<'a> ValueCalculator<'a> {
    pub fn new(store: &'a dyn ForecastStore, rates: &'a RateTable, target: Currency) -> Self {
        Self {
            store,
            rates,
            target,
            resolved: HashMap::new(),
        }
    }

    pub fn target(&self) -> Currency {
        self.target
    }

    /// Resolves a SKU through the per-pass cache.
    pub async fn resolve_sku(&mut self, sku_id: &str) -> Result<Option<Sku>> {
        if let Some(cached) = self.resolved.get(sku_id) {
            return Ok(cached.clone());
        }
        let sku = self.store.get_sku(sku_id).await?;
        self.resolved.insert(sku_id.to_string(), sku.clone());
        Ok(sku)
    }

    /// `qty x price_native x rate(native, target)`. Fails with `UnknownSku`
    /// when the SKU does not resolve (callers treat that as contributing
    /// zero) and with `MissingRate` when the conversion pair is absent.
    /// Quantities may be fractional or negative (corrections).
    pub async fn value(&mut self, qty: f64, sku_id: &str) -> Result<f64> {
        let sku = self
            .resolve_sku(sku_id)
            .await?
            .ok_or_else(|| ForecastError::UnknownSku(sku_id.to_string()))?;
        let native_value = qty * sku.price;
        self.rates.convert(native_value, sku.currency, self.target)
    }
}
