use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::billing::monthly_invoice;
use super::classification::ClassificationPolicyDraft;
use super::statement::StatementStatus;
use crate::auth::{AuthUser, Permission, TenantQuery};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateRequest {
    semana: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatementQuery {
    parceiro_id: Option<String>,
    estado: Option<StatementStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InvoiceQuery {
    parceiro_id: Option<String>,
    mes: Option<NaiveDate>,
}

/// Weekly statements, classification policy and plan invoice endpoints.
pub fn commission_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/relatorios/semanais",
            get(list_statements).post(generate_statement),
        )
        .route(
            "/api/relatorios/semanais/:id/submeter",
            post(submit_statement),
        )
        .route("/api/classificacao", get(get_policy).put(put_policy))
        .route("/api/faturacao", get(invoice))
}

async fn generate_statement(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response, AppError> {
    user.require(Permission::ViewReports)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let statement = state.statements.generate(&partner_id, request.semana)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "sucesso": true, "relatorio": statement })),
    )
        .into_response())
}

async fn list_statements(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<StatementQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ViewReports)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let statements = state.statements.list(&partner_id, query.estado)?;
    Ok(Json(json!({ "sucesso": true, "relatorios": statements })))
}

async fn submit_statement(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Response, AppError> {
    user.require(Permission::RequestFinancial)?;
    user.require(Permission::ViewReports)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let request = state
        .approvals
        .submit_statement(&partner_id, &id, &user.user_id)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "sucesso": true, "pedido": request })),
    )
        .into_response())
}

async fn get_policy(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ViewReports)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let policy = state.statements.policy(&partner_id)?;
    Ok(Json(json!({ "sucesso": true, "classificacao": policy })))
}

async fn put_policy(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
    Json(draft): Json<ClassificationPolicyDraft>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageDrivers)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let policy = state.statements.set_policy(&partner_id, draft)?;
    Ok(Json(json!({ "sucesso": true, "classificacao": policy })))
}

async fn invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ViewReports)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let partner = state.fleet.get_partner(&partner_id)?;
    let vehicles = state.fleet.billable_vehicles(&partner_id)?;
    let month = query.mes.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(json!({
        "sucesso": true,
        "fatura": monthly_invoice(&partner, vehicles, month),
    })))
}
