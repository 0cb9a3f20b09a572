use serde::Serialize;

use super::ledger::{LedgerEntry, LedgerItem, LedgerStore};
use super::normalizer::normalize_name;
use super::parser::parse_for_platform;
use super::records::{EarningRecord, FuelRecord, ParsedBatch};
use super::ImportError;
use crate::fleet::{
    normalize_plate, Driver, FleetStores, IntegrationMode, Partner, Period, Platform, SyncLog,
    Vehicle,
};
use crate::storage::StorageRouter;
use crate::store::{new_id, RepositoryError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub unmatched: usize,
    pub skipped: usize,
    pub sync_log_id: String,
    /// Identifiers that matched no driver or vehicle, for manual follow-up.
    pub unmatched_refs: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportServiceError {
    #[error(transparent)]
    Parse(#[from] ImportError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("partner {0} not found")]
    PartnerNotFound(String),
}

/// Turns parsed exports into ledger entries for one partner.
#[derive(Clone)]
pub struct ImportService {
    stores: FleetStores,
    ledger: LedgerStore,
    storage: StorageRouter,
}

impl ImportService {
    pub fn new(stores: FleetStores, ledger: LedgerStore, storage: StorageRouter) -> Self {
        Self {
            stores,
            ledger,
            storage,
        }
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    /// Parses and stores a CSV export, then archives the original file.
    pub async fn import(
        &self,
        partner_id: &str,
        platform: Platform,
        period: Period,
        csv: &str,
    ) -> Result<ImportSummary, ImportServiceError> {
        let partner = self.partner(partner_id)?;
        let mut log = self.open_log(partner_id, platform, IntegrationMode::Csv, period)?;

        let (batch, skipped) = match parse_for_platform(platform, csv, period) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(partner_id, platform = platform.slug(), error = %err, "import rejected");
                self.fail_log(&mut log, err.to_string())?;
                return Err(err.into());
            }
        };

        let summary =
            match self.import_records(partner_id, platform, period, batch, skipped, &mut log) {
                Ok(summary) => summary,
                Err(err) => {
                    tracing::error!(
                        partner_id,
                        platform = platform.slug(),
                        error = %err,
                        "import could not be stored"
                    );
                    self.fail_log(&mut log, err.to_string())?;
                    return Err(err);
                }
            };
        self.archive(&partner, platform, period, csv).await;
        Ok(summary)
    }

    /// Records the start of an import or synchronisation.
    pub fn open_log(
        &self,
        partner_id: &str,
        platform: Platform,
        mode: IntegrationMode,
        period: Period,
    ) -> Result<SyncLog, RepositoryError> {
        self.stores
            .sync_logs
            .insert(SyncLog::start(partner_id, platform, mode, period))
    }

    pub fn fail_log(
        &self,
        log: &mut SyncLog,
        message: impl Into<String>,
    ) -> Result<(), RepositoryError> {
        log.fail(message);
        self.stores.sync_logs.update(log.clone())
    }

    pub fn update_log(&self, log: &SyncLog) -> Result<(), RepositoryError> {
        self.stores.sync_logs.update(log.clone())
    }

    /// Resolves already parsed records against the fleet and completes `log`.
    pub fn import_records(
        &self,
        partner_id: &str,
        platform: Platform,
        period: Period,
        batch: ParsedBatch,
        skipped: usize,
        log: &mut SyncLog,
    ) -> Result<ImportSummary, ImportServiceError> {
        let index = FleetIndex {
            drivers: self.stores.drivers.list(partner_id)?,
            vehicles: self.stores.vehicles.list(partner_id)?,
        };

        let mut entries = Vec::new();
        let mut unmatched_refs = Vec::new();
        let mut push = |driver_id: Option<String>,
                        vehicle_id: Option<String>,
                        occurred_on,
                        item: LedgerItem| {
            entries.push(LedgerEntry {
                id: new_id(),
                partner_id: partner_id.to_string(),
                platform,
                period,
                sync_log_id: log.id.clone(),
                driver_id,
                vehicle_id,
                occurred_on,
                item,
            });
        };

        match batch {
            ParsedBatch::Earnings(records) => {
                for record in records {
                    match index.driver_for(platform, &record) {
                        Some(driver) => push(
                            Some(driver.id.clone()),
                            driver.vehicle_id.clone(),
                            period.start,
                            LedgerItem::Earning(record),
                        ),
                        None => unmatched_refs.push(earning_label(&record)),
                    }
                }
            }
            ParsedBatch::Tolls(records) => {
                for record in records {
                    match index.vehicle_for_tag(&record.plate_or_obu) {
                        Some(vehicle) => push(
                            vehicle.driver_id.clone(),
                            Some(vehicle.id.clone()),
                            record.occurred_at.date(),
                            LedgerItem::Toll(record),
                        ),
                        None => unmatched_refs.push(record.plate_or_obu),
                    }
                }
            }
            ParsedBatch::Fuel(records) => {
                for record in records {
                    match index.vehicle_for_fuel(&record) {
                        Some(vehicle) => push(
                            vehicle.driver_id.clone(),
                            Some(vehicle.id.clone()),
                            record.occurred_at.date(),
                            LedgerItem::Fuel(record),
                        ),
                        None => unmatched_refs.push(record.card),
                    }
                }
            }
            ParsedBatch::Charging(records) => {
                for record in records {
                    match index.vehicle_for_charging(&record.card) {
                        Some(vehicle) => push(
                            vehicle.driver_id.clone(),
                            Some(vehicle.id.clone()),
                            record.occurred_at.date(),
                            LedgerItem::Charging(record),
                        ),
                        None => unmatched_refs.push(record.card),
                    }
                }
            }
        }

        let imported = self
            .ledger
            .replace_import(partner_id, platform, period, entries)?;
        let unmatched = unmatched_refs.len();
        log.succeed(imported, unmatched);
        self.stores.sync_logs.update(log.clone())?;

        tracing::info!(
            partner_id,
            platform = platform.slug(),
            imported,
            unmatched,
            skipped,
            "import stored"
        );

        Ok(ImportSummary {
            imported,
            unmatched,
            skipped,
            sync_log_id: log.id.clone(),
            unmatched_refs,
        })
    }

    pub fn sync_logs(&self, partner_id: &str) -> Result<Vec<SyncLog>, RepositoryError> {
        let mut logs = self.stores.sync_logs.list(partner_id)?;
        logs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(logs)
    }

    fn partner(&self, partner_id: &str) -> Result<Partner, ImportServiceError> {
        self.stores
            .partners
            .get(partner_id)?
            .ok_or_else(|| ImportServiceError::PartnerNotFound(partner_id.to_string()))
    }

    async fn archive(&self, partner: &Partner, platform: Platform, period: Period, csv: &str) {
        let path = format!("importacoes/{}/{}.csv", platform.slug(), period.slug());
        let result = match self.storage.for_partner(partner) {
            Ok(storage) => storage.upload(&path, csv.as_bytes().to_vec(), "text/csv").await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            tracing::warn!(partner_id = %partner.id, %path, error = %err, "could not archive import");
        }
    }
}

fn earning_label(record: &EarningRecord) -> String {
    record
        .driver_ref
        .clone()
        .or_else(|| record.driver_name.clone())
        .unwrap_or_default()
}

fn same_identifier(left: &str, right: &str) -> bool {
    let compact = |value: &str| -> String {
        value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    };
    let left = compact(left);
    !left.is_empty() && left == compact(right)
}

struct FleetIndex {
    drivers: Vec<Driver>,
    vehicles: Vec<Vehicle>,
}

impl FleetIndex {
    fn driver_for(&self, platform: Platform, record: &EarningRecord) -> Option<&Driver> {
        if let Some(reference) = record.driver_ref.as_deref() {
            let by_id = self.drivers.iter().find(|driver| {
                let platform_id = match platform {
                    Platform::Uber => driver.uber_uuid.as_deref(),
                    Platform::Bolt => driver.bolt_id.as_deref(),
                    _ => None,
                };
                platform_id.is_some_and(|id| id.trim().eq_ignore_ascii_case(reference.trim()))
            });
            if by_id.is_some() {
                return by_id;
            }
        }

        let name = normalize_name(record.driver_name.as_deref()?);
        self.drivers
            .iter()
            .find(|driver| normalize_name(&driver.name) == name)
    }

    fn vehicle_for_tag(&self, tag: &str) -> Option<&Vehicle> {
        let plate = normalize_plate(tag);
        self.vehicles.iter().find(|vehicle| {
            plate.as_deref() == Some(vehicle.plate.as_str())
                || vehicle
                    .via_verde_obu
                    .as_deref()
                    .is_some_and(|obu| same_identifier(obu, tag))
        })
    }

    fn vehicle_for_fuel(&self, record: &FuelRecord) -> Option<&Vehicle> {
        self.vehicles
            .iter()
            .find(|vehicle| {
                vehicle
                    .fuel_card
                    .as_deref()
                    .is_some_and(|card| same_identifier(card, &record.card))
            })
            .or_else(|| {
                let plate = normalize_plate(record.plate.as_deref()?)?;
                self.vehicles.iter().find(|vehicle| vehicle.plate == plate)
            })
    }

    fn vehicle_for_charging(&self, card: &str) -> Option<&Vehicle> {
        self.vehicles.iter().find(|vehicle| {
            vehicle
                .charging_card
                .as_deref()
                .is_some_and(|own| same_identifier(own, card))
        })
    }
}
