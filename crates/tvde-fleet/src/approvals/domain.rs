use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Despesa,
    Adiantamento,
    Reembolso,
    Reparacao,
    /// Weekly driver payouts, raised from a statement.
    PagamentoSemanal,
}

impl RequestKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Despesa => "Despesa",
            Self::Adiantamento => "Adiantamento",
            Self::Reembolso => "Reembolso",
            Self::Reparacao => "Reparação",
            Self::PagamentoSemanal => "Pagamento semanal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pendente,
    Aprovado,
    Rejeitado,
    Pago,
    Cancelado,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pendente => "pendente",
            Self::Aprovado => "aprovado",
            Self::Rejeitado => "rejeitado",
            Self::Pago => "pago",
            Self::Cancelado => "cancelado",
        }
    }

    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pendente | Self::Aprovado)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Submeter,
    Aprovar,
    Rejeitar,
    Pagar,
    Cancelar,
}

impl ApprovalAction {
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Submeter => "submit",
            Self::Aprovar => "approve",
            Self::Rejeitar => "reject",
            Self::Pagar => "pay",
            Self::Cancelar => "cancel",
        }
    }

    /// State the request must be in for the action to apply.
    pub const fn required_status(self) -> Option<RequestStatus> {
        match self {
            Self::Submeter => None,
            Self::Aprovar | Self::Rejeitar | Self::Cancelar => Some(RequestStatus::Pendente),
            Self::Pagar => Some(RequestStatus::Aprovado),
        }
    }

    pub const fn resulting_status(self) -> RequestStatus {
        match self {
            Self::Submeter => RequestStatus::Pendente,
            Self::Aprovar => RequestStatus::Aprovado,
            Self::Rejeitar => RequestStatus::Rejeitado,
            Self::Pagar => RequestStatus::Pago,
            Self::Cancelar => RequestStatus::Cancelado,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub action: ApprovalAction,
    pub note: Option<String>,
}

/// Pedido financeiro.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialRequest {
    pub id: String,
    pub partner_id: String,
    pub kind: RequestKind,
    pub amount: f64,
    pub description: String,
    pub requester_id: String,
    pub driver_id: Option<String>,
    pub statement_id: Option<String>,
    pub status: RequestStatus,
    pub history: Vec<ApprovalEvent>,
    pub created_at: DateTime<Utc>,
}

impl FinancialRequest {
    pub(crate) fn record(&mut self, actor: &str, action: ApprovalAction, note: Option<String>) {
        self.status = action.resulting_status();
        self.history.push(ApprovalEvent {
            at: Utc::now(),
            actor: actor.to_string(),
            action,
            note,
        });
    }
}

impl Record for FinancialRequest {
    fn id(&self) -> &str {
        &self.id
    }

    fn partner_id(&self) -> &str {
        &self.partner_id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub kind: RequestKind,
    pub amount: f64,
    pub description: String,
    #[serde(default)]
    pub driver_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub driver_id: Option<String>,
}
