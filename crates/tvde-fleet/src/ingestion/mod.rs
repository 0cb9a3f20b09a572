//! Third-party data ingestion: CSV exports, the Bolt fleet API and the ledger
//! the statements are computed from.

pub mod bolt_api;
mod columns;
pub mod ledger;
mod normalizer;
pub mod parser;
pub mod records;
pub mod router;
pub mod service;
mod values;

pub use bolt_api::{BoltApiError, BoltEndpoints, BoltFleetClient};
pub use ledger::{LedgerEntry, LedgerItem, LedgerStore, VehicleCharges};
pub use parser::{
    parse_bolt_earnings, parse_charging, parse_for_platform, parse_fuel, parse_uber_earnings,
    parse_via_verde,
};
pub use records::{
    ChargingRecord, EarningRecord, FuelRecord, ParseOutcome, ParsedBatch, TollRecord,
};
pub use router::ingestion_router;
pub use service::{ImportService, ImportServiceError, ImportSummary};
pub use values::parse_date;

/// Reasons an export file cannot be read.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("the file is empty")]
    Empty,
    #[error("required column '{0}' not found")]
    MissingColumn(&'static str),
    #[error("invalid value '{value}' in column '{column}' at line {line}")]
    InvalidValue {
        line: usize,
        column: &'static str,
        value: String,
    },
    #[error("invalid date '{value}' at line {line}")]
    InvalidDate { line: usize, value: String },
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
}
