use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::fleet::{Period, Platform};

/// Earnings of one driver on one platform for an import period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningRecord {
    pub platform: Platform,
    /// Platform-side driver identifier (Uber UUID, Bolt id) when exported.
    pub driver_ref: Option<String>,
    pub driver_name: Option<String>,
    pub period: Period,
    pub gross: f64,
    pub tips: f64,
    pub platform_fee: f64,
    pub net: f64,
    pub trips: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TollRecord {
    pub plate_or_obu: String,
    pub entry: Option<String>,
    pub exit: Option<String>,
    pub occurred_at: NaiveDateTime,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelRecord {
    pub card: String,
    pub plate: Option<String>,
    pub occurred_at: NaiveDateTime,
    pub station: Option<String>,
    pub litres: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingRecord {
    pub card: String,
    pub occurred_at: NaiveDateTime,
    pub station: Option<String>,
    pub kwh: f64,
    pub amount: f64,
}

/// Parser output plus the rows dropped for lacking an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

/// Records of whichever category a platform exports.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBatch {
    Earnings(Vec<EarningRecord>),
    Tolls(Vec<TollRecord>),
    Fuel(Vec<FuelRecord>),
    Charging(Vec<ChargingRecord>),
}

impl ParsedBatch {
    pub fn len(&self) -> usize {
        match self {
            Self::Earnings(records) => records.len(),
            Self::Tolls(records) => records.len(),
            Self::Fuel(records) => records.len(),
            Self::Charging(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
