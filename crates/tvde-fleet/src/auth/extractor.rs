use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

use super::roles::{Permission, Role};
use super::service::AuthService;
use crate::error::AppError;

/// Caller identity decoded from the bearer token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub user_id: String,
    pub role: Role,
    pub partner_id: Option<String>,
    pub driver_id: Option<String>,
}

impl AuthUser {
    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.allows(permission) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{} may not {}",
                self.role.label(),
                permission.label()
            )))
        }
    }

    /// Resolves the partner a request acts on.
    ///
    /// Administrators must name the partner; everybody else is pinned to their own
    /// and may not ask for another.
    pub fn tenant(&self, requested: Option<&str>) -> Result<String, AppError> {
        let requested = requested.map(str::trim).filter(|id| !id.is_empty());
        if self.role == Role::Admin {
            return requested
                .map(str::to_string)
                .ok_or_else(|| AppError::Validation("parceiro_id is required".to_string()));
        }

        let own = self
            .partner_id
            .as_deref()
            .ok_or_else(|| AppError::Forbidden("account has no partner".to_string()))?;
        match requested {
            Some(other) if other != own => Err(AppError::Forbidden(
                "access to another partner is not allowed".to_string(),
            )),
            _ => Ok(own.to_string()),
        }
    }

    pub fn is_driver(&self) -> bool {
        self.role == Role::Motorista
    }
}

/// `?parceiro_id=` accepted by every tenant-scoped route.
#[derive(Debug, Default, Deserialize)]
pub struct TenantQuery {
    pub parceiro_id: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        let service = Arc::<AuthService>::from_ref(state);
        service
            .verify(token)
            .map_err(|err| AppError::Unauthorized(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::service::NewAccount;
    use crate::config::AuthConfig;
    use axum::http::Request;

    fn user(role: Role, partner: Option<&str>) -> AuthUser {
        AuthUser {
            user_id: "u1".to_string(),
            role,
            partner_id: partner.map(str::to_string),
            driver_id: None,
        }
    }

    #[test]
    fn admins_must_name_the_partner() {
        let admin = user(Role::Admin, None);
        assert!(matches!(admin.tenant(None), Err(AppError::Validation(_))));
        assert_eq!(admin.tenant(Some("p9")).expect("scoped"), "p9");
    }

    #[test]
    fn partner_users_are_pinned_to_their_partner() {
        let manager = user(Role::Gestor, Some("p1"));
        assert_eq!(manager.tenant(None).expect("own"), "p1");
        assert_eq!(manager.tenant(Some("p1")).expect("own"), "p1");
        assert!(matches!(
            manager.tenant(Some("p2")),
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn extractor_reads_bearer_header() {
        let service = Arc::new(AuthService::in_memory(&AuthConfig {
            jwt_secret: "secret".to_string(),
            token_ttl_hours: 1,
            bootstrap_admin: None,
        }));
        let account = service
            .register(NewAccount {
                email: "gestor@frota.pt".to_string(),
                password: "palavra-passe".to_string(),
                role: Role::Gestor,
                partner_id: Some("p1".to_string()),
                driver_id: None,
            })
            .expect("registers");
        let issued = service.issue(&account).expect("token");

        let request = Request::builder()
            .header("Authorization", format!("Bearer {}", issued.token))
            .body(axum::body::Body::empty())
            .expect("request");
        let mut parts = request.into_parts().0;
        let user = AuthUser::from_request_parts(&mut parts, &service)
            .await
            .expect("authenticated");
        assert_eq!(user.user_id, account.id);

        let request = Request::builder()
            .body(axum::body::Body::empty())
            .expect("request");
        let mut parts = request.into_parts().0;
        let rejected = AuthUser::from_request_parts(&mut parts, &service).await;
        assert!(matches!(rejected, Err(AppError::Unauthorized(_))));
    }
}
