//! Price configuration models

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::ledger::MONEY_SCALE;

pub const UNIT_PER_COLLECTION: &str = "per collection";
pub const UNIT_PER_KG: &str = "per kg";

/// Organization that prices, and gets paid for, a task
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Scope {
    Municipality(Uuid),
    Recycler(Uuid),
}

impl Scope {
    /// Unit used when a price is configured without one
    pub fn default_unit(&self) -> &'static str {
        match self {
            Scope::Municipality(_) => UNIT_PER_COLLECTION,
            Scope::Recycler(_) => UNIT_PER_KG,
        }
    }

    pub fn municipality_id(&self) -> Option<Uuid> {
        match self {
            Scope::Municipality(id) => Some(*id),
            Scope::Recycler(_) => None,
        }
    }

    pub fn recycler_id(&self) -> Option<Uuid> {
        match self {
            Scope::Recycler(id) => Some(*id),
            Scope::Municipality(_) => None,
        }
    }

    /// Build a scope from the two exclusive columns used in storage
    pub fn from_columns(municipality_id: Option<Uuid>, recycler_id: Option<Uuid>) -> Option<Self> {
        match (municipality_id, recycler_id) {
            (Some(id), None) => Some(Scope::Municipality(id)),
            (None, Some(id)) => Some(Scope::Recycler(id)),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Municipality(id) => write!(f, "municipality:{}", id),
            Scope::Recycler(id) => write!(f, "recycler:{}", id),
        }
    }
}

/// Waste categories
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "waste_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WasteType {
    /// Mixed household waste picked up from a bin
    General,
    Plastic,
    Paper,
    Metal,
    Glass,
    Electronics,
    Other,
}

impl WasteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WasteType::General => "general",
            WasteType::Plastic => "plastic",
            WasteType::Paper => "paper",
            WasteType::Metal => "metal",
            WasteType::Glass => "glass",
            WasteType::Electronics => "electronics",
            WasteType::Other => "other",
        }
    }
}

impl fmt::Display for WasteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WasteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "general" => Ok(WasteType::General),
            "plastic" => Ok(WasteType::Plastic),
            "paper" => Ok(WasteType::Paper),
            "metal" | "tins" => Ok(WasteType::Metal),
            "glass" => Ok(WasteType::Glass),
            "electronics" => Ok(WasteType::Electronics),
            "other" => Ok(WasteType::Other),
            other => Err(format!("unknown waste type '{}'", other)),
        }
    }
}

/// Configured price for one waste type within a scope
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PriceConfiguration {
    pub id: Uuid,
    pub scope: Scope,
    pub waste_type: WasteType,
    pub price: Decimal,
    pub unit: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a quoted price came from
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Configured,
    Default,
}

/// Resolved price for a scope and waste type
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Quote {
    pub scope: Scope,
    pub waste_type: WasteType,
    pub price: Decimal,
    pub unit: String,
    pub source: QuoteSource,
}

/// Prices used when a scope has no configuration for a waste type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingDefaults {
    /// Flat fee per municipal collection
    pub collection_fee: Decimal,
    /// Rate per kg for recyclers
    pub recycling_rate: Decimal,
}

impl Default for PricingDefaults {
    fn default() -> Self {
        Self {
            collection_fee: Decimal::new(5000, 2),
            recycling_rate: Decimal::new(1000, 2),
        }
    }
}

/// `quantity × rate`, rounded half away from zero to two decimal places
pub fn recycling_total(quantity_kg: Decimal, price_per_kg: Decimal) -> Decimal {
    let mut total = (quantity_kg * price_per_kg)
        .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    total.rescale(MONEY_SCALE);
    total
}

/// Request DTO for setting a price within the caller's own scope
#[derive(Debug, Deserialize, Validate)]
pub struct SetPriceRequest {
    pub waste_type: WasteType,
    pub price: Decimal,
    #[validate(length(min = 1, max = 20))]
    pub unit: Option<String>,
}

/// Query parameters for quotes and price listings
#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    pub municipality_id: Option<Uuid>,
    pub recycler_id: Option<Uuid>,
    pub waste_type: Option<WasteType>,
}
