//! Financial requests and their approval workflow.

pub mod domain;
pub mod router;
pub mod service;

pub use domain::{
    ApprovalAction, ApprovalEvent, FinancialRequest, NewRequest, RequestFilter, RequestKind,
    RequestStatus,
};
pub use router::approvals_router;
pub use service::{ApprovalError, ApprovalService};
