use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::domain::{ContractKind, VehicleStatus};
use super::platforms::Platform;
use super::service::{
    Assignment, CredentialsInput, DocumentUpload, DriverUpdate, NewDriver, NewPartner, NewVehicle,
};
use crate::auth::{AuthUser, Permission, Role, TenantQuery};
use crate::commission::billing::PlanTier;
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::StorageSettings;

#[derive(Debug, Deserialize)]
pub(crate) struct PlanRequest {
    plano: PlanTier,
    #[serde(default)]
    data: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScopedQuery {
    parceiro_id: Option<String>,
    motorista_id: Option<String>,
    dias: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DateRequest {
    #[serde(default)]
    data: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusRequest {
    estado: VehicleStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnVehicleContract {
    driver_id: String,
    kind: ContractKind,
    start: NaiveDate,
}

/// Partner, driver, vehicle, contract and credential endpoints.
pub fn fleet_router() -> Router<AppState> {
    Router::new()
        .route("/api/parceiros", get(list_partners).post(create_partner))
        .route("/api/parceiros/:id", get(get_partner))
        .route("/api/parceiros/:id/armazenamento", put(update_storage))
        .route("/api/parceiros/:id/plano", post(change_plan))
        .route("/api/motoristas", get(list_drivers).post(register_driver))
        .route("/api/motoristas/:id", get(get_driver).put(update_driver))
        .route("/api/motoristas/:id/documentos", post(attach_document))
        .route("/api/motoristas/:id/ativar", post(activate_driver))
        .route("/api/motoristas/:id/desativar", post(deactivate_driver))
        .route("/api/veiculos", get(list_vehicles).post(register_vehicle))
        .route("/api/veiculos/:id/estado", put(update_vehicle_status))
        .route("/api/veiculos/:id/atribuir", post(assign_vehicle))
        .route("/api/veiculos/:id/libertar", post(release_vehicle))
        .route("/api/alertas/validades", get(expiry_alerts))
        .route("/api/contratos", get(list_contracts).post(own_vehicle_contract))
        .route("/api/plataformas", get(list_platforms))
        .route("/api/credenciais", get(list_credentials))
        .route("/api/credenciais/:plataforma", put(save_credentials))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) fn parse_platform(raw: &str) -> Result<Platform, AppError> {
    Platform::from_slug(raw).ok_or_else(|| AppError::NotFound(format!("unknown platform {raw}")))
}

fn created(payload: Value) -> Response {
    (StatusCode::CREATED, Json(payload)).into_response()
}

async fn list_partners(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let partners = if user.role == Role::Admin {
        state.fleet.list_partners()?
    } else {
        vec![state.fleet.get_partner(&user.tenant(None)?)?]
    };
    Ok(Json(json!({ "sucesso": true, "parceiros": partners })))
}

async fn create_partner(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<NewPartner>,
) -> Result<Response, AppError> {
    user.require(Permission::ManagePartners)?;
    let partner = state.fleet.create_partner(input)?;
    Ok(created(json!({ "sucesso": true, "parceiro": partner })))
}

async fn get_partner(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let partner_id = user.tenant(Some(&id))?;
    let partner = state.fleet.get_partner(&partner_id)?;
    Ok(Json(json!({ "sucesso": true, "parceiro": partner })))
}

async fn update_storage(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(settings): Json<StorageSettings>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageFleet)?;
    let partner_id = user.tenant(Some(&id))?;
    let partner = state.fleet.update_storage_settings(&partner_id, settings)?;
    Ok(Json(json!({ "sucesso": true, "armazenamento": partner.storage })))
}

async fn change_plan(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<Value>, AppError> {
    if !matches!(user.role, Role::Admin | Role::Parceiro) {
        return Err(AppError::Forbidden(
            "only the partner owner may change the plan".to_string(),
        ));
    }
    let partner_id = user.tenant(Some(&id))?;
    let charge = state
        .fleet
        .change_plan(&partner_id, request.plano, request.data.unwrap_or_else(today))?;
    Ok(Json(json!({ "sucesso": true, "ajuste": charge })))
}

async fn list_drivers(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageDrivers)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let drivers = state.fleet.list_drivers(&partner_id)?;
    Ok(Json(json!({ "sucesso": true, "motoristas": drivers })))
}

async fn register_driver(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
    Json(input): Json<NewDriver>,
) -> Result<Response, AppError> {
    user.require(Permission::ManageDrivers)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let driver = state.fleet.register_driver(&partner_id, input)?;
    Ok(created(json!({ "sucesso": true, "motorista": driver })))
}

/// Drivers may read their own record.
async fn get_driver(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    if user.is_driver() {
        if user.driver_id.as_deref() != Some(id.as_str()) {
            return Err(AppError::Forbidden(
                "drivers may only see their own record".to_string(),
            ));
        }
    } else {
        user.require(Permission::ManageDrivers)?;
    }
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let driver = state.fleet.get_driver(&partner_id, &id)?;
    Ok(Json(json!({ "sucesso": true, "motorista": driver })))
}

async fn update_driver(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    Json(update): Json<DriverUpdate>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageDrivers)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let driver = state.fleet.update_driver(&partner_id, &id, update)?;
    Ok(Json(json!({ "sucesso": true, "motorista": driver })))
}

async fn attach_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    Json(upload): Json<DocumentUpload>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageDrivers)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let driver = state.fleet.attach_document(&partner_id, &id, upload)?;
    Ok(Json(json!({
        "sucesso": true,
        "documentos_em_falta": driver.missing_documents(today()),
        "motorista": driver,
    })))
}

async fn activate_driver(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageDrivers)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let driver = state.fleet.activate_driver(&partner_id, &id, today())?;
    Ok(Json(json!({ "sucesso": true, "motorista": driver })))
}

async fn deactivate_driver(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageDrivers)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let driver = state.fleet.deactivate_driver(&partner_id, &id, today())?;
    Ok(Json(json!({ "sucesso": true, "motorista": driver })))
}

async fn list_vehicles(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageFleet)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let vehicles = state.fleet.list_vehicles(&partner_id)?;
    Ok(Json(json!({ "sucesso": true, "veiculos": vehicles })))
}

async fn register_vehicle(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
    Json(input): Json<NewVehicle>,
) -> Result<Response, AppError> {
    user.require(Permission::ManageFleet)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let vehicle = state.fleet.register_vehicle(&partner_id, input)?;
    Ok(created(json!({ "sucesso": true, "veiculo": vehicle })))
}

async fn update_vehicle_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageFleet)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let vehicle = state
        .fleet
        .update_vehicle_status(&partner_id, &id, request.estado)?;
    Ok(Json(json!({ "sucesso": true, "veiculo": vehicle })))
}

async fn assign_vehicle(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    Json(assignment): Json<Assignment>,
) -> Result<Response, AppError> {
    user.require(Permission::ManageFleet)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let contract = state.fleet.assign_vehicle(&partner_id, &id, assignment)?;
    Ok(created(json!({ "sucesso": true, "contrato": contract })))
}

async fn release_vehicle(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
    request: Option<Json<DateRequest>>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageFleet)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let end = request
        .and_then(|Json(request)| request.data)
        .unwrap_or_else(today);
    let contract = state.fleet.release_vehicle(&partner_id, &id, end)?;
    Ok(Json(json!({ "sucesso": true, "contrato": contract })))
}

async fn expiry_alerts(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ScopedQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageFleet)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let horizon = query.dias.unwrap_or(30);
    if horizon < 0 {
        return Err(AppError::Validation("dias cannot be negative".to_string()));
    }
    let alerts = state.fleet.expiry_alerts(&partner_id, today(), horizon)?;
    Ok(Json(json!({ "sucesso": true, "alertas": alerts })))
}

async fn list_contracts(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ScopedQuery>,
) -> Result<Json<Value>, AppError> {
    let driver_filter = if user.is_driver() {
        user.driver_id.clone()
    } else {
        user.require(Permission::ManageFleet)?;
        query.motorista_id
    };
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let contracts = state
        .fleet
        .list_contracts(&partner_id, driver_filter.as_deref())?;
    Ok(Json(json!({ "sucesso": true, "contratos": contracts })))
}

async fn own_vehicle_contract(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
    Json(request): Json<OwnVehicleContract>,
) -> Result<Response, AppError> {
    user.require(Permission::ManageFleet)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let contract = state.fleet.own_vehicle_contract(
        &partner_id,
        &request.driver_id,
        request.kind,
        request.start,
    )?;
    Ok(created(json!({ "sucesso": true, "contrato": contract })))
}

async fn list_platforms(_user: AuthUser) -> Json<Value> {
    let platforms: Vec<_> = Platform::all().into_iter().map(Platform::info).collect();
    Json(json!({ "sucesso": true, "plataformas": platforms }))
}

async fn list_credentials(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageAutomations)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let credentials = state.fleet.credentials_view(&partner_id)?;
    Ok(Json(json!({ "sucesso": true, "credenciais": credentials })))
}

async fn save_credentials(
    State(state): State<AppState>,
    user: AuthUser,
    Path(platform): Path<String>,
    Query(query): Query<TenantQuery>,
    Json(input): Json<CredentialsInput>,
) -> Result<Json<Value>, AppError> {
    user.require(Permission::ManageAutomations)?;
    let partner_id = user.tenant(query.parceiro_id.as_deref())?;
    let platform = parse_platform(&platform)?;
    let view = state.fleet.save_credentials(&partner_id, platform, input)?;
    Ok(Json(json!({ "sucesso": true, "credenciais": view })))
}
