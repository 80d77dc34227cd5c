use crate::schema::Currency;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("No exchange rate for {from} -> {to}")]
    MissingRate { from: Currency, to: Currency },

    #[error("Unknown SKU: {0}")]
    UnknownSku(String),

    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    #[error("Forecast record not found: {0}")]
    RecordNotFound(String),

    #[error("{kind} {id} not found")]
    EntityNotFound { kind: &'static str, id: String },

    #[error("{kind} {id} is still referenced by existing SKUs and cannot be deleted")]
    EntityInUse { kind: &'static str, id: String },

    #[error("Duplicate forecast record for SKU {sku_id}, {year}-{month:02}, version {version_id}")]
    DuplicateRecord {
        sku_id: String,
        month: u32,
        year: i32,
        version_id: String,
    },

    #[error("Invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ForecastError>;
