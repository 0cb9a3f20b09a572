use std::sync::Arc;

use chrono::Utc;

use super::domain::{
    ApprovalAction, FinancialRequest, NewRequest, RequestFilter, RequestKind, RequestStatus,
};
use crate::auth::{AuthUser, Permission};
use crate::commission::{StatementError, StatementService, StatementStatus, WeeklyStatement};
use crate::fleet::{FleetError, FleetService};
use crate::store::{new_id, Collection, MemoryCollection, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("cannot {} a request that is {}", .action.verb(), .from.label())]
    InvalidTransition {
        from: RequestStatus,
        action: ApprovalAction,
    },
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("description is required")]
    MissingDescription,
    #[error("a reason is required to reject a request")]
    MissingReason,
    #[error("weekly payments are raised from a statement")]
    StatementOnly,
    #[error("{0}")]
    NotPermitted(String),
    #[error("requesters cannot approve their own requests")]
    SelfApproval,
    #[error("amount {amount:.2} exceeds the approval limit of {limit:.2}")]
    AboveLimit { amount: f64, limit: f64 },
    #[error("request {0} not found")]
    NotFound(String),
    #[error("statement {0} is not a draft")]
    StatementNotDraft(String),
    #[error("statement {0} already has an open payment request")]
    StatementAlreadySubmitted(String),
    #[error("statement {0} has nothing to pay")]
    NothingToPay(String),
    #[error("statement {0} is no longer linked to this request")]
    StatementDetached(String),
    #[error("statement {id} is {} and cannot follow this request", .status.label())]
    StatementState { id: String, status: StatementStatus },
    #[error(transparent)]
    Statement(#[from] StatementError),
    #[error(transparent)]
    Fleet(#[from] FleetError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Financial request workflow (pedidos).
#[derive(Clone)]
pub struct ApprovalService {
    requests: Arc<dyn Collection<FinancialRequest>>,
    fleet: FleetService,
    statements: StatementService,
}

impl ApprovalService {
    pub fn new(
        requests: Arc<dyn Collection<FinancialRequest>>,
        fleet: FleetService,
        statements: StatementService,
    ) -> Self {
        Self {
            requests,
            fleet,
            statements,
        }
    }

    pub fn in_memory(fleet: FleetService, statements: StatementService) -> Self {
        Self::new(MemoryCollection::shared(), fleet, statements)
    }

    pub fn submit(
        &self,
        partner_id: &str,
        requester: &AuthUser,
        request: NewRequest,
    ) -> Result<FinancialRequest, ApprovalError> {
        ensure(requester, Permission::RequestFinancial)?;
        if request.kind == RequestKind::PagamentoSemanal {
            return Err(ApprovalError::StatementOnly);
        }
        if request.amount.is_nan() || request.amount <= 0.0 {
            return Err(ApprovalError::InvalidAmount);
        }
        let description = request.description.trim();
        if description.is_empty() {
            return Err(ApprovalError::MissingDescription);
        }

        let driver_id = if requester.is_driver() {
            requester.driver_id.clone()
        } else {
            request.driver_id.filter(|id| !id.trim().is_empty())
        };
        if let Some(driver_id) = driver_id.as_deref() {
            self.fleet.get_driver(partner_id, driver_id)?;
        }

        let mut created = FinancialRequest {
            id: new_id(),
            partner_id: partner_id.to_string(),
            kind: request.kind,
            amount: request.amount,
            description: description.to_string(),
            requester_id: requester.user_id.clone(),
            driver_id,
            statement_id: None,
            status: RequestStatus::Pendente,
            history: Vec::new(),
            created_at: Utc::now(),
        };
        created.record(&requester.user_id, ApprovalAction::Submeter, None);
        let created = self.requests.insert(created)?;
        tracing::info!(
            partner_id,
            request_id = %created.id,
            kind = created.kind.label(),
            amount = created.amount,
            "financial request submitted"
        );
        Ok(created)
    }

    /// Raises the payment request for a draft weekly statement.
    pub fn submit_statement(
        &self,
        partner_id: &str,
        statement_id: &str,
        requester_id: &str,
    ) -> Result<FinancialRequest, ApprovalError> {
        let statement = self.statements.get(partner_id, statement_id)?;
        if statement.status != StatementStatus::Rascunho {
            return Err(ApprovalError::StatementNotDraft(statement.id));
        }
        if let Some(existing) = statement.request_id.as_deref() {
            if let Some(open) = self.requests.get_for(partner_id, existing)? {
                if open.status.is_open() {
                    return Err(ApprovalError::StatementAlreadySubmitted(statement.id));
                }
            }
        }
        if statement.totals.payable <= 0.0 {
            return Err(ApprovalError::NothingToPay(statement.id));
        }

        let mut created = FinancialRequest {
            id: new_id(),
            partner_id: partner_id.to_string(),
            kind: RequestKind::PagamentoSemanal,
            amount: statement.totals.payable,
            description: format!("Pagamento semanal {}", statement.period.slug()),
            requester_id: requester_id.to_string(),
            driver_id: None,
            statement_id: Some(statement.id.clone()),
            status: RequestStatus::Pendente,
            history: Vec::new(),
            created_at: Utc::now(),
        };
        created.record(requester_id, ApprovalAction::Submeter, None);
        let created = self.requests.insert(created)?;
        self.statements
            .link_request(partner_id, statement_id, Some(created.id.clone()))?;
        tracing::info!(partner_id, statement_id, request_id = %created.id, "statement submitted for payment");
        Ok(created)
    }

    pub fn approve(
        &self,
        partner_id: &str,
        request_id: &str,
        actor: &AuthUser,
        note: Option<String>,
    ) -> Result<FinancialRequest, ApprovalError> {
        ensure(actor, Permission::ApproveFinancial)?;
        let mut request = self.get(partner_id, request_id)?;
        transition_allowed(&request, ApprovalAction::Aprovar)?;
        if request.requester_id == actor.user_id {
            return Err(ApprovalError::SelfApproval);
        }
        let limit = self.fleet.get_partner(partner_id)?.approval_limit;
        if request.amount > limit && !actor.role.approves_above_limit() {
            return Err(ApprovalError::AboveLimit {
                amount: request.amount,
                limit,
            });
        }

        // The statement is settled first so it cannot be regenerated under the request.
        if let Some(statement) = self.linked_statement(&request, StatementStatus::Rascunho)? {
            self.statements
                .set_status(partner_id, &statement.id, StatementStatus::Aprovado)?;
        }
        request.record(&actor.user_id, ApprovalAction::Aprovar, note);
        self.requests.update(request.clone())?;
        tracing::info!(partner_id, request_id, "financial request approved");
        Ok(request)
    }

    pub fn reject(
        &self,
        partner_id: &str,
        request_id: &str,
        actor: &AuthUser,
        reason: Option<String>,
    ) -> Result<FinancialRequest, ApprovalError> {
        ensure(actor, Permission::ApproveFinancial)?;
        let mut request = self.get(partner_id, request_id)?;
        transition_allowed(&request, ApprovalAction::Rejeitar)?;
        if request.requester_id == actor.user_id {
            return Err(ApprovalError::SelfApproval);
        }
        let reason = reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty())
            .ok_or(ApprovalError::MissingReason)?;

        self.unlink_statement(&request)?;
        request.record(&actor.user_id, ApprovalAction::Rejeitar, Some(reason));
        self.requests.update(request.clone())?;
        tracing::info!(partner_id, request_id, "financial request rejected");
        Ok(request)
    }

    pub fn pay(
        &self,
        partner_id: &str,
        request_id: &str,
        actor: &AuthUser,
        note: Option<String>,
    ) -> Result<FinancialRequest, ApprovalError> {
        ensure(actor, Permission::PayFinancial)?;
        let mut request = self.get(partner_id, request_id)?;
        transition_allowed(&request, ApprovalAction::Pagar)?;

        if let Some(statement) = self.linked_statement(&request, StatementStatus::Aprovado)? {
            self.statements
                .set_status(partner_id, &statement.id, StatementStatus::Pago)?;
        }
        request.record(&actor.user_id, ApprovalAction::Pagar, note);
        self.requests.update(request.clone())?;
        tracing::info!(partner_id, request_id, amount = request.amount, "financial request paid");
        Ok(request)
    }

    /// Only the requester may withdraw a pending request.
    pub fn cancel(
        &self,
        partner_id: &str,
        request_id: &str,
        actor: &AuthUser,
    ) -> Result<FinancialRequest, ApprovalError> {
        let mut request = self.get(partner_id, request_id)?;
        if request.requester_id != actor.user_id {
            return Err(ApprovalError::NotPermitted(
                "only the requester may cancel a request".to_string(),
            ));
        }
        transition_allowed(&request, ApprovalAction::Cancelar)?;

        self.unlink_statement(&request)?;
        request.record(&actor.user_id, ApprovalAction::Cancelar, None);
        self.requests.update(request.clone())?;
        Ok(request)
    }

    pub fn get(&self, partner_id: &str, request_id: &str) -> Result<FinancialRequest, ApprovalError> {
        self.requests
            .get_for(partner_id, request_id)?
            .ok_or_else(|| ApprovalError::NotFound(request_id.to_string()))
    }

    /// Newest first; drivers only see requests they raised or that concern them.
    pub fn list(
        &self,
        partner_id: &str,
        viewer: &AuthUser,
        filter: &RequestFilter,
    ) -> Result<Vec<FinancialRequest>, ApprovalError> {
        let mut requests: Vec<FinancialRequest> = self
            .requests
            .list(partner_id)?
            .into_iter()
            .filter(|request| filter.status.map_or(true, |status| request.status == status))
            .filter(|request| {
                filter
                    .driver_id
                    .as_deref()
                    .map_or(true, |driver| request.driver_id.as_deref() == Some(driver))
            })
            .filter(|request| {
                !viewer.is_driver()
                    || request.requester_id == viewer.user_id
                    || (viewer.driver_id.is_some() && request.driver_id == viewer.driver_id)
            })
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    /// The statement behind a weekly payment, checked to still belong to `request`.
    fn linked_statement(
        &self,
        request: &FinancialRequest,
        expected: StatementStatus,
    ) -> Result<Option<WeeklyStatement>, ApprovalError> {
        let Some(statement_id) = request.statement_id.as_deref() else {
            return Ok(None);
        };
        let statement = self.statements.get(&request.partner_id, statement_id)?;
        if statement.request_id.as_deref() != Some(request.id.as_str()) {
            return Err(ApprovalError::StatementDetached(statement.id));
        }
        if statement.status != expected {
            return Err(ApprovalError::StatementState {
                id: statement.id,
                status: statement.status,
            });
        }
        Ok(Some(statement))
    }

    fn unlink_statement(&self, request: &FinancialRequest) -> Result<(), ApprovalError> {
        if let Some(statement_id) = request.statement_id.as_deref() {
            let statement = self.statements.get(&request.partner_id, statement_id)?;
            if statement.request_id.as_deref() == Some(request.id.as_str()) {
                self.statements
                    .link_request(&request.partner_id, statement_id, None)?;
            }
        }
        Ok(())
    }
}

fn ensure(user: &AuthUser, permission: Permission) -> Result<(), ApprovalError> {
    if user.role.allows(permission) {
        Ok(())
    } else {
        Err(ApprovalError::NotPermitted(format!(
            "{} may not {}",
            user.role.label(),
            permission.label()
        )))
    }
}

fn transition_allowed(
    request: &FinancialRequest,
    action: ApprovalAction,
) -> Result<(), ApprovalError> {
    match action.required_status() {
        Some(required) if request.status != required => Err(ApprovalError::InvalidTransition {
            from: request.status,
            action,
        }),
        _ => Ok(()),
    }
}
