use crate::error::{ForecastError, Result};
use crate::schema::{Currency, ExchangeRate};
use std::collections::HashMap;

/// Static table of multiplicative exchange rates keyed by ordered currency
/// pair. Lookups are direct only: no inverse or transitive inference. If a
/// pair is absent the lookup fails, it never defaults to 1:1.
#[derive(Debug, Clone)]
pub struct RateTable {
    rates: HashMap<(Currency, Currency), f64>,
}

impl RateTable {
    pub fn new(entries: &[ExchangeRate]) -> Self {
        let rates = entries
            .iter()
            .map(|e| ((e.from, e.to), e.rate))
            .collect();
        Self { rates }
    }

    /// The rate matrix the planning dashboard ships with.
    pub fn builtin() -> Self {
        use Currency::*;
        Self::new(&[
            ExchangeRate { from: Usd, to: Usd, rate: 1.0 },
            ExchangeRate { from: Eur, to: Usd, rate: 1.08 },
            ExchangeRate { from: Thb, to: Usd, rate: 0.028 },
            ExchangeRate { from: Usd, to: Eur, rate: 0.93 },
            ExchangeRate { from: Eur, to: Eur, rate: 1.0 },
            ExchangeRate { from: Thb, to: Eur, rate: 0.026 },
            ExchangeRate { from: Usd, to: Thb, rate: 35.7 },
            ExchangeRate { from: Eur, to: Thb, rate: 38.5 },
            ExchangeRate { from: Thb, to: Thb, rate: 1.0 },
        ])
    }

    pub fn rate(&self, from: Currency, to: Currency) -> Result<f64> {
        self.rates
            .get(&(from, to))
            .copied()
            .ok_or(ForecastError::MissingRate { from, to })
    }

    /// `amount * rate(from, to)`. Identity pairs carry a stored rate of
    /// exactly 1.0, so same-currency conversion preserves the amount
    /// bit-exactly.
    pub fn convert(&self, amount: f64, from: Currency, to: Currency) -> Result<f64> {
        Ok(amount * self.rate(from, to)?)
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::builtin()
    }
}
