use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::records::{ChargingRecord, EarningRecord, FuelRecord, TollRecord};
use crate::fleet::{Period, Platform};
use crate::store::{Collection, MemoryCollection, Record, RepositoryError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tipo", content = "dados", rename_all = "snake_case")]
pub enum LedgerItem {
    Earning(EarningRecord),
    Toll(TollRecord),
    Fuel(FuelRecord),
    Charging(ChargingRecord),
}

/// One imported record resolved against the partner's fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub partner_id: String,
    pub platform: Platform,
    /// Import period the entry arrived with.
    pub period: Period,
    pub sync_log_id: String,
    pub driver_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub occurred_on: NaiveDate,
    pub item: LedgerItem,
}

impl Record for LedgerEntry {
    fn id(&self) -> &str {
        &self.id
    }

    fn partner_id(&self) -> &str {
        &self.partner_id
    }
}

/// Vehicle running costs over a date range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VehicleCharges {
    pub tolls: f64,
    pub fuel: f64,
    pub charging: f64,
}

/// Query layer over the imported ledger entries.
#[derive(Clone)]
pub struct LedgerStore {
    entries: Arc<dyn Collection<LedgerEntry>>,
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new(MemoryCollection::shared())
    }
}

impl LedgerStore {
    pub fn new(entries: Arc<dyn Collection<LedgerEntry>>) -> Self {
        Self { entries }
    }

    /// Stores an import, dropping earlier entries of the same platform and period
    /// so re-importing an export does not double count.
    pub fn replace_import(
        &self,
        partner_id: &str,
        platform: Platform,
        period: Period,
        entries: Vec<LedgerEntry>,
    ) -> Result<usize, RepositoryError> {
        for stale in self.entries.list(partner_id)? {
            if stale.platform == platform && stale.period == period {
                self.entries.delete(&stale.id)?;
            }
        }
        let count = entries.len();
        for entry in entries {
            self.entries.insert(entry)?;
        }
        Ok(count)
    }

    pub fn list(&self, partner_id: &str) -> Result<Vec<LedgerEntry>, RepositoryError> {
        self.entries.list(partner_id)
    }

    pub fn earnings(
        &self,
        partner_id: &str,
        driver_id: &str,
        period: &Period,
    ) -> Result<Vec<EarningRecord>, RepositoryError> {
        Ok(self
            .entries
            .list(partner_id)?
            .into_iter()
            .filter(|entry| {
                entry.driver_id.as_deref() == Some(driver_id) && period.contains(entry.occurred_on)
            })
            .filter_map(|entry| match entry.item {
                LedgerItem::Earning(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    pub fn gross_for(
        &self,
        partner_id: &str,
        driver_id: &str,
        period: &Period,
    ) -> Result<f64, RepositoryError> {
        Ok(self
            .earnings(partner_id, driver_id, period)?
            .iter()
            .map(|record| record.gross)
            .sum())
    }

    pub fn vehicle_charges(
        &self,
        partner_id: &str,
        vehicle_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<VehicleCharges, RepositoryError> {
        let mut charges = VehicleCharges::default();
        for entry in self.entries.list(partner_id)? {
            if entry.vehicle_id.as_deref() != Some(vehicle_id)
                || entry.occurred_on < from
                || entry.occurred_on > to
            {
                continue;
            }
            match &entry.item {
                LedgerItem::Toll(record) => charges.tolls += record.amount,
                LedgerItem::Fuel(record) => charges.fuel += record.amount,
                LedgerItem::Charging(record) => charges.charging += record.amount,
                LedgerItem::Earning(_) => {}
            }
        }
        Ok(charges)
    }
}
