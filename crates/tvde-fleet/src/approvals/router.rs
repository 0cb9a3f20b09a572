use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::domain::{NewRequest, RequestFilter, RequestStatus};
use crate::auth::{AuthUser, TenantQuery};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    parceiro_id: Option<String>,
    estado: Option<RequestStatus>,
    motorista_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DecisionRequest {
    #[serde(default, alias = "motivo")]
    nota: Option<String>,
}

/// Financial request endpoints.
pub fn approvals_router() -> Router<AppState> {
    Router::new()
        .route("/api/pedidos", get(list_requests).post(submit_request))
        .route("/api/pedidos/:id/aprovar", post(approve_request))
        .route("/api/pedidos/:id/rejeitar", post(reject_request))
        .route("/api/pedidos/:id/pagar", post(pay_request))
        .route("/api/pedidos/:id/cancelar", post(cancel_request))
}

fn note(body: Option<Json<DecisionRequest>>) -> Option<String> {
    body.and_then(|Json(decision)| decision.nota)
}

async fn list_requests(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let filter = RequestFilter {
        status: query.estado,
        driver_id: query.motorista_id,
    };
    let requests = state.approvals.list(&partner_id, &user, &filter)?;
    Ok(Json(json!({ "sucesso": true, "pedidos": requests })))
}

async fn submit_request(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
    Json(request): Json<NewRequest>,
) -> Result<Response, AppError> {
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let created = state.approvals.submit(&partner_id, &user, request)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "sucesso": true, "pedido": created })),
    )
        .into_response())
}

async fn approve_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Json<Value>, AppError> {
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let request = state.approvals.approve(&partner_id, &id, &user, note(body))?;
    Ok(Json(json!({ "sucesso": true, "pedido": request })))
}

async fn reject_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Json<Value>, AppError> {
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let request = state.approvals.reject(&partner_id, &id, &user, note(body))?;
    Ok(Json(json!({ "sucesso": true, "pedido": request })))
}

async fn pay_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Json<Value>, AppError> {
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let request = state.approvals.pay(&partner_id, &id, &user, note(body))?;
    Ok(Json(json!({ "sucesso": true, "pedido": request })))
}

async fn cancel_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let request = state.approvals.cancel(&partner_id, &id, &user)?;
    Ok(Json(json!({ "sucesso": true, "pedido": request })))
}
