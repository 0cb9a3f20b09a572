use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::classification::{
    ClassificationError, ClassificationPolicy, ClassificationPolicyDraft, PartnerPolicy,
};
use super::round_cents;
use crate::fleet::{Contract, ContractKind, FleetError, FleetService, Period};
use crate::ingestion::{LedgerStore, VehicleCharges};
use crate::store::{new_id, Collection, MemoryCollection, Record, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    Rascunho,
    Aprovado,
    Pago,
}

impl StatementStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rascunho => "Rascunho",
            Self::Aprovado => "Aprovado",
            Self::Pago => "Pago",
        }
    }
}

/// One driver's week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub driver_id: String,
    pub driver_name: String,
    pub contract_ids: Vec<String>,
    pub classification: String,
    /// Commission applied when a commission contract was in force.
    pub commission_pct: Option<f64>,
    pub trips: u32,
    pub gross: f64,
    pub tips: f64,
    pub platform_fees: f64,
    pub net: f64,
    pub partner_share: f64,
    pub tolls: f64,
    pub fuel: f64,
    pub charging: f64,
    /// Amount owed to the driver; negative when the driver owes the partner.
    pub balance: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementTotals {
    pub gross: f64,
    pub net: f64,
    pub partner_share: f64,
    pub tolls: f64,
    pub fuel: f64,
    pub charging: f64,
    pub balance: f64,
    /// Sum of the positive balances, i.e. what the partner transfers.
    pub payable: f64,
}

impl StatementTotals {
    fn from_lines(lines: &[StatementLine]) -> Self {
        let mut totals = Self::default();
        for line in lines {
            totals.gross += line.gross;
            totals.net += line.net;
            totals.partner_share += line.partner_share;
            totals.tolls += line.tolls;
            totals.fuel += line.fuel;
            totals.charging += line.charging;
            totals.balance += line.balance;
            totals.payable += line.balance.max(0.0);
        }
        Self {
            gross: round_cents(totals.gross),
            net: round_cents(totals.net),
            partner_share: round_cents(totals.partner_share),
            tolls: round_cents(totals.tolls),
            fuel: round_cents(totals.fuel),
            charging: round_cents(totals.charging),
            balance: round_cents(totals.balance),
            payable: round_cents(totals.payable),
        }
    }
}

/// Relatório semanal for one partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyStatement {
    pub id: String,
    pub partner_id: String,
    pub period: Period,
    pub status: StatementStatus,
    pub lines: Vec<StatementLine>,
    pub totals: StatementTotals,
    pub generated_at: DateTime<Utc>,
    /// Payment request raised for this statement.
    pub request_id: Option<String>,
}

impl Record for WeeklyStatement {
    fn id(&self) -> &str {
        &self.id
    }

    fn partner_id(&self) -> &str {
        &self.partner_id
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatementError {
    #[error("statement {0} is already approved and cannot be regenerated")]
    AlreadyApproved(String),
    #[error("statement {0} has a payment request in progress and cannot be regenerated")]
    PaymentPending(String),
    #[error("statement {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Fleet(#[from] FleetError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Weekly statements and the partner's classification policy.
#[derive(Clone)]
pub struct StatementService {
    fleet: FleetService,
    ledger: LedgerStore,
    statements: Arc<dyn Collection<WeeklyStatement>>,
    policies: Arc<dyn Collection<PartnerPolicy>>,
}

impl StatementService {
    pub fn new(
        fleet: FleetService,
        ledger: LedgerStore,
        statements: Arc<dyn Collection<WeeklyStatement>>,
        policies: Arc<dyn Collection<PartnerPolicy>>,
    ) -> Self {
        Self {
            fleet,
            ledger,
            statements,
            policies,
        }
    }

    pub fn in_memory(fleet: FleetService, ledger: LedgerStore) -> Self {
        Self::new(
            fleet,
            ledger,
            MemoryCollection::shared(),
            MemoryCollection::shared(),
        )
    }

    pub fn policy(&self, partner_id: &str) -> Result<ClassificationPolicy, StatementError> {
        Ok(self
            .policies
            .get(partner_id)?
            .map(|stored| stored.policy)
            .unwrap_or_default())
    }

    pub fn set_policy(
        &self,
        partner_id: &str,
        draft: ClassificationPolicyDraft,
    ) -> Result<ClassificationPolicy, StatementError> {
        self.fleet.get_partner(partner_id)?;
        let policy = draft.validate()?;
        let stored = PartnerPolicy {
            partner_id: partner_id.to_string(),
            policy: policy.clone(),
        };
        if self.policies.get(partner_id)?.is_some() {
            self.policies.update(stored)?;
        } else {
            self.policies.insert(stored)?;
        }
        tracing::info!(partner_id, levels = policy.levels().len(), "classification policy saved");
        Ok(policy)
    }

    /// Computes the Monday–Sunday statement containing `week_start`.
    ///
    /// A draft for the same week is replaced; approved or paid statements are final,
    /// and so is a draft whose payment request is still open.
    pub fn generate(
        &self,
        partner_id: &str,
        week_start: NaiveDate,
    ) -> Result<WeeklyStatement, StatementError> {
        self.fleet.get_partner(partner_id)?;
        let period = Period::week_of(week_start);

        let existing = self.find_for_period(partner_id, period)?;
        if let Some(existing) = &existing {
            if existing.status != StatementStatus::Rascunho {
                return Err(StatementError::AlreadyApproved(existing.id.clone()));
            }
            if existing.request_id.is_some() {
                return Err(StatementError::PaymentPending(existing.id.clone()));
            }
        }

        let policy = self.policy(partner_id)?;
        let mut by_driver: BTreeMap<String, Vec<Contract>> = BTreeMap::new();
        for contract in self.fleet.list_contracts(partner_id, None)? {
            if contract.active_days_in(&period) > 0 {
                by_driver
                    .entry(contract.driver_id.clone())
                    .or_default()
                    .push(contract);
            }
        }

        let mut lines = Vec::with_capacity(by_driver.len());
        for (driver_id, contracts) in by_driver {
            lines.push(self.driver_line(partner_id, &driver_id, &contracts, period, &policy)?);
        }
        lines.sort_by(|a, b| a.driver_name.cmp(&b.driver_name));

        // Nothing is written until every line is computed.
        if let Some(existing) = existing {
            self.statements.delete(&existing.id)?;
        }
        let statement = self.statements.insert(WeeklyStatement {
            id: new_id(),
            partner_id: partner_id.to_string(),
            period,
            status: StatementStatus::Rascunho,
            totals: StatementTotals::from_lines(&lines),
            lines,
            generated_at: Utc::now(),
            request_id: None,
        })?;
        for line in &statement.lines {
            self.fleet
                .set_classification(partner_id, &line.driver_id, &line.classification)?;
        }
        tracing::info!(
            partner_id,
            statement_id = %statement.id,
            week = %period.slug(),
            drivers = statement.lines.len(),
            "weekly statement generated"
        );
        Ok(statement)
    }

    fn driver_line(
        &self,
        partner_id: &str,
        driver_id: &str,
        contracts: &[Contract],
        period: Period,
        policy: &ClassificationPolicy,
    ) -> Result<StatementLine, StatementError> {
        let driver = self.fleet.get_driver(partner_id, driver_id)?;

        let mut trips: u32 = 0;
        let (mut gross, mut tips, mut platform_fees, mut net) = (0.0, 0.0, 0.0, 0.0);
        for record in self.ledger.earnings(partner_id, driver_id, &period)? {
            trips = trips.saturating_add(record.trips);
            gross += record.gross;
            tips += record.tips;
            platform_fees += record.platform_fee;
            net += record.net;
        }

        let mut history = Vec::with_capacity(policy.lookback_weeks());
        for weeks_back in (0..policy.lookback_weeks()).rev() {
            let week = Period::week_of(period.start - Duration::weeks(weeks_back as i64));
            history.push(self.ledger.gross_for(partner_id, driver_id, &week)?);
        }
        let level = policy.classify(&history);

        // Earnings are weekly totals, so commission is split by the share of
        // contracted days each commission contract covered.
        let contracted_days: u32 = contracts
            .iter()
            .map(|contract| contract.active_days_in(&period))
            .sum::<u32>()
            .max(1);
        let mut partner_share = 0.0;
        let mut commission_pct = None;
        let mut charges = VehicleCharges::default();
        for contract in contracts {
            let days = contract.active_days_in(&period);
            let fraction = f64::from(days) / 7.0;
            partner_share += match &contract.kind {
                ContractKind::Comissao { percentage } => {
                    let pct = percentage.unwrap_or(level.commission_pct);
                    commission_pct = Some(pct);
                    gross * pct / 100.0 * f64::from(days) / f64::from(contracted_days)
                }
                ContractKind::Aluguer { weekly_rent } => weekly_rent * fraction,
                ContractKind::Slot { weekly_fee } => weekly_fee * fraction,
            };

            if let Some(vehicle_id) = contract.vehicle_id.as_deref() {
                let from = contract.start.max(period.start);
                let to = contract.end.map_or(period.end, |end| end.min(period.end));
                let vehicle = self
                    .ledger
                    .vehicle_charges(partner_id, vehicle_id, from, to)?;
                charges.tolls += vehicle.tolls;
                charges.fuel += vehicle.fuel;
                charges.charging += vehicle.charging;
            }
        }

        let partner_share = round_cents(partner_share);
        let balance = round_cents(net - partner_share - charges.tolls - charges.fuel - charges.charging);

        Ok(StatementLine {
            driver_id: driver_id.to_string(),
            driver_name: driver.name,
            contract_ids: contracts.iter().map(|contract| contract.id.clone()).collect(),
            classification: level.name.clone(),
            commission_pct,
            trips,
            gross: round_cents(gross),
            tips: round_cents(tips),
            platform_fees: round_cents(platform_fees),
            net: round_cents(net),
            partner_share,
            tolls: round_cents(charges.tolls),
            fuel: round_cents(charges.fuel),
            charging: round_cents(charges.charging),
            balance,
        })
    }

    pub fn list(
        &self,
        partner_id: &str,
        status: Option<StatementStatus>,
    ) -> Result<Vec<WeeklyStatement>, StatementError> {
        let mut statements: Vec<WeeklyStatement> = self
            .statements
            .list(partner_id)?
            .into_iter()
            .filter(|statement| status.map_or(true, |wanted| statement.status == wanted))
            .collect();
        statements.sort_by(|a, b| b.period.start.cmp(&a.period.start));
        Ok(statements)
    }

    pub fn get(&self, partner_id: &str, statement_id: &str) -> Result<WeeklyStatement, StatementError> {
        self.statements
            .get_for(partner_id, statement_id)?
            .ok_or_else(|| StatementError::NotFound(statement_id.to_string()))
    }

    pub fn link_request(
        &self,
        partner_id: &str,
        statement_id: &str,
        request_id: Option<String>,
    ) -> Result<WeeklyStatement, StatementError> {
        let mut statement = self.get(partner_id, statement_id)?;
        statement.request_id = request_id;
        self.statements.update(statement.clone())?;
        Ok(statement)
    }

    pub fn set_status(
        &self,
        partner_id: &str,
        statement_id: &str,
        status: StatementStatus,
    ) -> Result<WeeklyStatement, StatementError> {
        let mut statement = self.get(partner_id, statement_id)?;
        statement.status = status;
        self.statements.update(statement.clone())?;
        tracing::info!(partner_id, statement_id, status = status.label(), "statement status changed");
        Ok(statement)
    }

    fn find_for_period(
        &self,
        partner_id: &str,
        period: Period,
    ) -> Result<Option<WeeklyStatement>, StatementError> {
        Ok(self
            .statements
            .list(partner_id)?
            .into_iter()
            .find(|statement| statement.period == period))
    }
}
