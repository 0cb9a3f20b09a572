use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::automations::AutomationInput;
use crate::auth::{AuthUser, Permission, TenantQuery};
use crate::error::AppError;
use crate::fleet::router::parse_platform;
use crate::fleet::Period;
use crate::ingestion::parse_date;
use crate::ingestion::router::PeriodQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct ExecuteQuery {
    parceiro_id: Option<String>,
    inicio: Option<String>,
    fim: Option<String>,
}

impl ExecuteQuery {
    fn period(&self) -> Result<Option<Period>, AppError> {
        match (self.inicio.as_deref(), self.fim.as_deref()) {
            (None, None) => Ok(None),
            (Some(inicio), Some(fim)) => PeriodQuery {
                parceiro_id: None,
                inicio: inicio.to_string(),
                fim: fim.to_string(),
            }
            .period()
            .map(Some),
            (Some(day), None) | (None, Some(day)) => {
                let day = parse_date(day)
                    .ok_or_else(|| AppError::Validation(format!("invalid date '{day}'")))?;
                Ok(Some(Period::week_of(day)))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TwoFactorBody {
    codigo: String,
}

/// Automation CRUD, executions and platform synchronisation.
pub fn rpa_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/automacoes",
            get(list_automations).post(create_automation),
        )
        .route(
            "/api/automacoes/:id",
            put(update_automation).delete(delete_automation),
        )
        .route("/api/automacoes/:id/executar", post(execute_automation))
        .route("/api/execucoes/:id", get(get_execution))
        .route("/api/execucoes/:id/2fa", post(submit_two_factor))
        .route("/api/sincronizacoes/:plataforma", post(start_sync))
}

async fn list_automations(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageAutomations)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let automations = state.automations.list(&partner_id)?;
    Ok(Json(json!({ "sucesso": true, "automacoes": automations })))
}

async fn create_automation(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
    Json(input): Json<AutomationInput>,
) -> Result<Response, AppError> {
    user.require(Permission::ManageAutomations)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let automation = state.automations.create(&partner_id, input)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "sucesso": true, "automacao": automation })),
    )
        .into_response())
}

async fn update_automation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    Json(input): Json<AutomationInput>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageAutomations)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let automation = state.automations.update(&partner_id, &id, input)?;
    Ok(Json(json!({ "sucesso": true, "automacao": automation })))
}

async fn delete_automation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageAutomations)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    state.automations.delete(&partner_id, &id)?;
    Ok(Json(json!({ "sucesso": true })))
}

async fn execute_automation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<ExecuteQuery>,
) -> Result<Response, AppError> {
    user.require(Permission::ManageAutomations)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let period = query.period()?;

    let pending = state.automations.start(&partner_id, &id, period)?;
    let execution_id = pending.execution_id.clone();
    let automations = state.automations.clone();
    tokio::spawn(async move {
        automations.run(pending).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "sucesso": true, "execucao_id": execution_id })),
    )
        .into_response())
}

async fn get_execution(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ImportData)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let execution = state.automations.execution(&partner_id, &id)?;
    Ok(Json(json!({ "sucesso": true, "execucao": execution })))
}

async fn submit_two_factor(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    Json(body): Json<TwoFactorBody>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ImportData)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    if body.codigo.trim().is_empty() {
        return Err(AppError::Validation("codigo is required".to_string()));
    }
    let delivered = state
        .automations
        .submit_two_factor(&partner_id, &id, &body.codigo)?;
    Ok(Json(json!({ "sucesso": true, "entregue": delivered })))
}

async fn start_sync(
    State(state): State<AppState>,
    user: AuthUser,
    Path(platform): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<Response, AppError> {
    user.require(Permission::ImportData)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let platform = parse_platform(&platform)?;
    let period = query.period()?;

    let prepared = state.sync.prepare(&partner_id, platform, period)?;
    let sync_log_id = prepared.log().id.clone();
    let execution_id = prepared.execution_id().map(str::to_string);
    let sync = state.sync.clone();
    tokio::spawn(async move {
        sync.run(prepared).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "sucesso": true,
            "sincronizacao_id": sync_log_id,
            "execucao_id": execution_id,
        })),
    )
        .into_response())
}
