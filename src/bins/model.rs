//! Smart bin models and fill-level status derivation

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use super::BinError;

const BIN_ID_PREFIX: &str = "BIN";
const BIN_ID_SUFFIX_LEN: usize = 8;
const BIN_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Bin status derived from the fill percentage
#[derive(
    Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, PartialOrd, Ord,
)]
#[sqlx(type_name = "bin_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BinStatus {
    Empty,
    Partial,
    Full,
    Overflow,
}

impl BinStatus {
    /// `<25` empty, `<75` partial, `<90` full, otherwise overflow
    pub fn from_fill(level: FillLevel) -> Self {
        match level.percent() {
            0..=24 => BinStatus::Empty,
            25..=74 => BinStatus::Partial,
            75..=89 => BinStatus::Full,
            _ => BinStatus::Overflow,
        }
    }

    /// Full and overflowing bins need a pickup
    pub fn needs_collection(&self) -> bool {
        *self >= BinStatus::Full
    }
}

/// Validated sensor reading in `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillLevel(u8);

impl FillLevel {
    pub fn new(reading: i64) -> Result<Self, BinError> {
        u8::try_from(reading)
            .ok()
            .filter(|percent| *percent <= 100)
            .map(FillLevel)
            .ok_or(BinError::InvalidReading(reading))
    }

    pub fn percent(&self) -> u8 {
        self.0
    }
}

/// IoT smart waste bin
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct SmartBin {
    pub id: Uuid,
    pub bin_id: String,
    pub customer_id: Option<Uuid>,
    pub municipality_id: Uuid,
    pub location: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub status: BinStatus,
    pub fill_percentage: i32,
    pub last_collection_date: Option<DateTime<Utc>>,
    pub next_collection_date: Option<DateTime<Utc>>,
    pub is_linked: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SmartBin {
    /// Freshly provisioned bin: empty, unlinked, active
    pub fn provisioned(
        bin_id: String,
        municipality_id: Uuid,
        location: String,
        latitude: Option<Decimal>,
        longitude: Option<Decimal>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            bin_id,
            customer_id: None,
            municipality_id,
            location,
            latitude,
            longitude,
            status: BinStatus::Empty,
            fill_percentage: 0,
            last_collection_date: None,
            next_collection_date: None,
            is_linked: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a reading. Returns the crossing event when the reading escalates
    /// the bin into `full` or `overflow`.
    pub fn record_fill(&mut self, level: FillLevel) -> Option<ThresholdCrossed> {
        let previous = self.status;
        self.fill_percentage = i32::from(level.percent());
        self.status = BinStatus::from_fill(level);
        self.updated_at = Utc::now();

        if self.status.needs_collection() && self.status > previous {
            Some(ThresholdCrossed {
                bin_id: self.bin_id.clone(),
                municipality_id: self.municipality_id,
                customer_id: self.customer_id,
                location: self.location.clone(),
                fill_percentage: level.percent(),
                previous_status: previous,
                status: self.status,
            })
        } else {
            None
        }
    }

    /// Claim an unlinked bin for a customer
    pub fn link_to(&mut self, customer_id: Uuid) -> Result<(), BinError> {
        if self.customer_id.is_some() {
            return Err(BinError::AlreadyLinked(self.bin_id.clone()));
        }
        self.customer_id = Some(customer_id);
        self.is_linked = true;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn snapshot(&self) -> BinSnapshot {
        BinSnapshot {
            bin_id: self.bin_id.clone(),
            status: self.status,
            fill_percentage: self.fill_percentage,
            location: self.location.clone(),
            last_collection: self.last_collection_date,
            next_collection: self.next_collection_date,
        }
    }
}

/// Read-side view of a bin served to devices and dashboards
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BinSnapshot {
    pub bin_id: String,
    pub status: BinStatus,
    pub fill_percentage: i32,
    pub location: String,
    pub last_collection: Option<DateTime<Utc>>,
    pub next_collection: Option<DateTime<Utc>>,
}

/// A reading escalated the bin into a status that needs collection
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ThresholdCrossed {
    pub bin_id: String,
    pub municipality_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub location: String,
    pub fill_percentage: u8,
    pub previous_status: BinStatus,
    pub status: BinStatus,
}

/// Result of an ingested reading
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub snapshot: BinSnapshot,
    pub threshold_crossed: Option<ThresholdCrossed>,
}

/// `BIN` followed by eight upper-case alphanumerics
pub fn generate_bin_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..BIN_ID_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..BIN_ID_ALPHABET.len());
            char::from(BIN_ID_ALPHABET[idx])
        })
        .collect();
    format!("{}{}", BIN_ID_PREFIX, suffix)
}

/// Request DTO for an IoT reading
#[derive(Debug, Deserialize)]
pub struct FillReadingRequest {
    pub bin_id: Option<String>,
    pub fill_percentage: Option<i64>,
}

/// Response DTO for an accepted reading
#[derive(Debug, Serialize)]
pub struct FillReadingResponse {
    pub success: bool,
    pub bin_id: String,
    pub status: BinStatus,
    pub fill_percentage: i32,
}

/// Request DTO for provisioning a bin
#[derive(Debug, Deserialize, Validate)]
pub struct ProvisionBinRequest {
    /// Assigned by IoT provisioning; generated when absent
    #[validate(length(min = 1, max = 50))]
    pub bin_id: Option<String>,
    /// Required when an admin provisions on a municipality's behalf
    pub municipality_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub location: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
}
