use crate::schema::{
    Category, Currency, Customer, Dataset, ForecastRecord, Sku, Version,
};
use chrono::{TimeZone, Utc};
use rand::Rng;

const SAMPLE_YEARS: [i32; 2] = [2024, 2025];
const ACTUALS_THROUGH_MONTH: u32 = 6;

/// Builds the demo planning dataset: three categories, three customers, five
/// SKUs priced in mixed currencies and three forecast versions. Version v1
/// covers 2024-2025 for every SKU; v2 and v3 revise 2024 from the previous
/// version. Actuals exist only for the first half of 2024. Quantities are
/// randomized per call.
pub fn sample_dataset() -> Dataset {
    let mut rng = rand::thread_rng();

    let categories = vec![
        category("cat1", "Automotive Parts"),
        category("cat2", "Electronics"),
        category("cat3", "Home Appliances"),
    ];

    let customers = vec![
        customer("cust1", "Tesla Inc."),
        customer("cust2", "General Motors"),
        customer("cust3", "Samsung Electronics"),
    ];

    let skus = vec![
        sku("sku1", "Engine Control Unit A1", "cat1", "cust1", 250.0, Currency::Usd),
        sku("sku2", "Transmission Assembly B2", "cat1", "cust2", 1200.0, Currency::Usd),
        sku("sku3", "LED Display Panel C3", "cat2", "cust3", 550.0, Currency::Eur),
        sku("sku4", "Battery Module D4", "cat2", "cust1", 320.0, Currency::Usd),
        sku("sku5", "Refrigeration Compressor E5", "cat3", "cust3", 28500.0, Currency::Thb),
    ];

    let versions = vec![
        Version {
            id: "v1".to_string(),
            name: "Initial Forecast".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            notes: None,
        },
        Version {
            id: "v2".to_string(),
            name: "Q1 Revision".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap(),
            notes: None,
        },
        Version {
            id: "v3".to_string(),
            name: "Mid-Year Update".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 30, 9, 45, 0).unwrap(),
            notes: None,
        },
    ];

    let mut records = Vec::new();

    for sku in &skus {
        for year in SAMPLE_YEARS {
            for month in 1..=12 {
                let base_qty = rng.gen_range(20..120) as f64;
                let actual_qty = if year == 2024 && month <= ACTUALS_THROUGH_MONTH {
                    Some(base_qty + rng.gen_range(-10.0..10.0))
                } else {
                    None
                };
                records.push(ForecastRecord {
                    id: format!("{}-{}-{}-v1", sku.id, year, month),
                    sku_id: sku.id.clone(),
                    month,
                    year,
                    forecast_qty: base_qty,
                    actual_qty,
                    version_id: "v1".to_string(),
                });
            }
        }

        // v2 revises the 2024 initial forecast, v3 revises v2. Actuals carry
        // over unchanged since they describe what happened, not a plan.
        for (version_id, prior_id, spread) in [("v2", "v1", 0.3), ("v3", "v2", 0.4)] {
            for month in 1..=12 {
                let prior = records
                    .iter()
                    .find(|r| {
                        r.sku_id == sku.id
                            && r.month == month
                            && r.year == 2024
                            && r.version_id == prior_id
                    })
                    .cloned();
                if let Some(prior) = prior {
                    let drift = rng.gen_range(-spread / 3.0..spread * 2.0 / 3.0);
                    records.push(ForecastRecord {
                        id: format!("{}-2024-{}-{}", sku.id, month, version_id),
                        sku_id: sku.id.clone(),
                        month,
                        year: 2024,
                        forecast_qty: prior.forecast_qty * (1.0 + drift),
                        actual_qty: prior.actual_qty,
                        version_id: version_id.to_string(),
                    });
                }
            }
        }
    }

    Dataset {
        categories,
        customers,
        skus,
        versions,
        records,
    }
}

fn category(id: &str, name: &str) -> Category {
    Category {
        id: id.to_string(),
        name: name.to_string(),
    }
}

fn customer(id: &str, name: &str) -> Customer {
    Customer {
        id: id.to_string(),
        name: name.to_string(),
    }
}

fn sku(id: &str, name: &str, category_id: &str, customer_id: &str, price: f64, currency: Currency) -> Sku {
    Sku {
        id: id.to_string(),
        name: name.to_string(),
        category_id: category_id.to_string(),
        customer_id: customer_id.to_string(),
        price,
        currency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_dataset_shape() {
        let dataset = sample_dataset();
        assert_eq!(dataset.categories.len(), 3);
        assert_eq!(dataset.customers.len(), 3);
        assert_eq!(dataset.skus.len(), 5);
        assert_eq!(dataset.versions.len(), 3);
        // v1: 5 SKUs x 2 years x 12 months; v2/v3: 5 SKUs x 12 months each.
        assert_eq!(dataset.records.len(), 5 * 2 * 12 + 2 * 5 * 12);
    }

    #[test]
    fn test_actuals_only_first_half_of_2024() {
        let dataset = sample_dataset();
        for record in &dataset.records {
            if record.actual_qty.is_some() {
                assert_eq!(record.year, 2024);
                assert!(record.month <= ACTUALS_THROUGH_MONTH);
            }
        }
    }

    #[test]
    fn test_record_keys_unique() {
        let dataset = sample_dataset();
        let mut keys: Vec<_> = dataset
            .records
            .iter()
            .map(|r| (r.sku_id.clone(), r.month, r.year, r.version_id.clone()))
            .collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_revisions_preserve_actuals() {
        let dataset = sample_dataset();
        for version_id in ["v2", "v3"] {
            for record in dataset.records.iter().filter(|r| r.version_id == version_id) {
                let v1 = dataset
                    .records
                    .iter()
                    .find(|r| {
                        r.version_id == "v1"
                            && r.sku_id == record.sku_id
                            && r.month == record.month
                            && r.year == record.year
                    })
                    .unwrap();
                assert_eq!(record.actual_qty.is_some(), v1.actual_qty.is_some());
            }
        }
    }
}
