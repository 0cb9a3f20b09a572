use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::extractor::AuthUser;
use super::roles::Role;
use super::service::NewAccount;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    email: String,
    password: String,
}

/// Login, account creation and identity endpoints.
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/utilizadores", post(register_handler))
        .route("/api/auth/me", get(me_handler))
}

pub(crate) async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let issued = state
        .auth
        .login(&request.email, &request.password)
        .map_err(|err| AppError::Unauthorized(err.to_string()))?;
    Ok(Json(json!({
        "sucesso": true,
        "token": issued.token,
        "expira_em": issued.expires_at,
        "role": issued.role,
    }))
    .into_response())
}

/// Admins create any account; partner owners only inside their own partner and
/// never another admin.
pub(crate) async fn register_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Json(mut account): Json<NewAccount>,
) -> Result<Response, AppError> {
    match user.role {
        Role::Admin => {}
        Role::Parceiro => {
            if account.role == Role::Admin {
                return Err(AppError::Forbidden(
                    "only administrators may create administrators".to_string(),
                ));
            }
            account.partner_id = Some(user.tenant(account.partner_id.as_deref())?);
        }
        _ => {
            return Err(AppError::Forbidden(format!(
                "{} may not create accounts",
                user.role.label()
            )))
        }
    }

    let created = state.auth.register(account)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "sucesso": true, "utilizador": created })),
    )
        .into_response())
}

pub(crate) async fn me_handler(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let account = state
        .auth
        .get(&user.user_id)?
        .ok_or_else(|| AppError::NotFound("account not found".to_string()))?;
    Ok(Json(json!({ "sucesso": true, "utilizador": account })))
}
