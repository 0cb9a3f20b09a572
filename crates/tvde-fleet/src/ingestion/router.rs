use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::values::parse_date;
use crate::auth::{AuthUser, Permission, TenantQuery};
use crate::error::AppError;
use crate::fleet::router::parse_platform;
use crate::fleet::Period;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct PeriodQuery {
    pub(crate) parceiro_id: Option<String>,
    pub(crate) inicio: String,
    pub(crate) fim: String,
}

impl PeriodQuery {
    pub(crate) fn period(&self) -> Result<Period, AppError> {
        let start = parse_date(&self.inicio)
            .ok_or_else(|| AppError::Validation(format!("invalid inicio '{}'", self.inicio)))?;
        let end = parse_date(&self.fim)
            .ok_or_else(|| AppError::Validation(format!("invalid fim '{}'", self.fim)))?;
        Period::new(start, end)
            .ok_or_else(|| AppError::Validation("inicio must not be after fim".to_string()))
    }
}

/// CSV upload and synchronisation history endpoints.
pub fn ingestion_router() -> Router<AppState> {
    Router::new()
        .route("/api/importacoes/:plataforma", post(import_csv))
        .route("/api/sincronizacoes", get(list_sync_logs))
}

async fn import_csv(
    State(state): State<AppState>,
    user: AuthUser,
    Path(platform): Path<String>,
    Query(query): Query<PeriodQuery>,
    body: String,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ImportData)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let platform = parse_platform(&platform)?;
    let period = query.period()?;

    let summary = state
        .imports
        .import(&partner_id, platform, period, &body)
        .await?;
    Ok(Json(json!({ "sucesso": true, "resumo": summary })))
}

async fn list_sync_logs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ImportData)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let logs = state.imports.sync_logs(&partner_id)?;
    Ok(Json(json!({ "sucesso": true, "sincronizacoes": logs })))
}
