//! Driver classification, weekly statements and partner plan billing.

pub mod billing;
pub mod classification;
pub mod router;
pub mod statement;

pub use billing::{monthly_invoice, plan_change_charge, MonthlyInvoice, PlanChangeCharge, PlanTier};
pub use classification::{
    ClassificationError, ClassificationLevel, ClassificationPolicy, ClassificationPolicyDraft,
    PartnerPolicy,
};
pub use router::commission_router;
pub use statement::{
    StatementError, StatementLine, StatementService, StatementStatus, StatementTotals,
    WeeklyStatement,
};

pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
