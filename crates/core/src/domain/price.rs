use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One observed price. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub timestamp: NaiveDateTime,
    pub product_id: String,
    pub price: Decimal,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedProduct {
    pub product_id: String,
    pub source_url: String,
}

impl TrackedProduct {
    pub fn new(product_id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            source_url: source_url.into(),
        }
    }

    pub fn observe(&self, price: Decimal, timestamp: NaiveDateTime) -> PriceRecord {
        PriceRecord {
            timestamp,
            product_id: self.product_id.clone(),
            price,
            source_url: self.source_url.clone(),
        }
    }
}

/// A price drop past the configured threshold. Lives for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub product_id: String,
    pub previous_price: Decimal,
    pub current_price: Decimal,
    /// Signed relative change, negative when the price fell.
    pub drop_fraction: Decimal,
    pub source_url: String,
}

impl AlertEvent {
    pub fn drop_amount(&self) -> Decimal {
        (self.previous_price - self.current_price).abs()
    }

    pub fn drop_percent(&self) -> Decimal {
        (self.drop_fraction * Decimal::ONE_HUNDRED).abs()
    }
}
