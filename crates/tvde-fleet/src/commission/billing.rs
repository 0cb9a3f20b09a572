use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::round_cents;
use crate::fleet::Partner;

/// Subscription plan a partner pays for the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    #[default]
    Essencial,
    Profissional,
    Empresarial,
}

impl PlanTier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Essencial => "Essencial",
            Self::Profissional => "Profissional",
            Self::Empresarial => "Empresarial",
        }
    }

    pub const fn monthly_base(self) -> f64 {
        match self {
            Self::Essencial => 29.0,
            Self::Profissional => 59.0,
            Self::Empresarial => 99.0,
        }
    }

    pub const fn per_vehicle(self) -> f64 {
        match self {
            Self::Essencial => 4.0,
            Self::Profissional => 3.0,
            Self::Empresarial => 2.0,
        }
    }

    pub fn monthly_price(self, vehicles: u32) -> f64 {
        round_cents(self.monthly_base() + self.per_vehicle() * f64::from(vehicles))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyInvoice {
    pub partner_id: String,
    pub plan: PlanTier,
    /// First day of the billed month.
    pub month: NaiveDate,
    pub vehicles: u32,
    pub lines: Vec<InvoiceLine>,
    pub total: f64,
}

pub fn monthly_invoice(partner: &Partner, vehicles: u32, month: NaiveDate) -> MonthlyInvoice {
    let plan = partner.plan;
    let lines = vec![
        InvoiceLine {
            description: format!("Plano {}", plan.label()),
            quantity: 1,
            unit_price: plan.monthly_base(),
            total: plan.monthly_base(),
        },
        InvoiceLine {
            description: "Viaturas ativas".to_string(),
            quantity: vehicles,
            unit_price: plan.per_vehicle(),
            total: round_cents(plan.per_vehicle() * f64::from(vehicles)),
        },
    ];
    let total = round_cents(lines.iter().map(|line| line.total).sum());

    MonthlyInvoice {
        partner_id: partner.id.clone(),
        plan,
        month: first_of_month(month),
        vehicles,
        lines,
        total,
    }
}

/// Pro-rata adjustment when a partner switches plan mid-month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanChangeCharge {
    pub from: PlanTier,
    pub to: PlanTier,
    pub change_date: NaiveDate,
    pub remaining_days: u32,
    pub days_in_month: u32,
    /// Positive amounts are charged, negative amounts credited.
    pub amount: f64,
}

pub fn plan_change_charge(
    from: PlanTier,
    to: PlanTier,
    vehicles: u32,
    change_date: NaiveDate,
) -> PlanChangeCharge {
    let days_in_month = days_in_month(change_date);
    let remaining_days = days_in_month - change_date.day() + 1;
    let difference = to.monthly_price(vehicles) - from.monthly_price(vehicles);
    let amount = round_cents(difference * f64::from(remaining_days) / f64::from(days_in_month));

    PlanChangeCharge {
        from,
        to,
        change_date,
        remaining_days,
        days_in_month,
        amount,
    }
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

fn days_in_month(day: NaiveDate) -> u32 {
    let (year, month) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|next| (next - first_of_month(day)).num_days() as u32)
        .unwrap_or(30)
}
