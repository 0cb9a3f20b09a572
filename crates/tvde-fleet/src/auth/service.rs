use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::extractor::AuthUser;
use super::roles::Role;
use crate::config::{AuthConfig, BootstrapAdmin};
use crate::fleet::is_plausible_email;
use crate::store::{new_id, Collection, MemoryCollection, Record, RepositoryError};

const MIN_PASSWORD_LENGTH: usize = 8;

/// Login account (utilizador).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub partner_id: Option<String>,
    pub driver_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Record for UserAccount {
    fn id(&self) -> &str {
        &self.id
    }

    /// Administrators belong to no partner.
    fn partner_id(&self) -> &str {
        self.partner_id.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default, rename = "parceiro_id")]
    pub partner_id: Option<String>,
    #[serde(default, rename = "motorista_id")]
    pub driver_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) role: Role,
    #[serde(default)]
    pub(crate) parceiro: Option<String>,
    #[serde(default)]
    pub(crate) motorista: Option<String>,
    pub(crate) exp: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must have at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,
    #[error("email already registered")]
    EmailTaken,
    #[error("{0} accounts must belong to a partner")]
    MissingPartner(&'static str),
    #[error("driver accounts must reference a driver")]
    MissingDriver,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is inactive")]
    Inactive,
    #[error("missing or invalid token")]
    InvalidToken,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Accounts, password hashing and token signing.
pub struct AuthService {
    users: Arc<dyn Collection<UserAccount>>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(users: Arc<dyn Collection<UserAccount>>, config: &AuthConfig) -> Self {
        Self {
            users,
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl: Duration::hours(config.token_ttl_hours as i64),
        }
    }

    pub fn in_memory(config: &AuthConfig) -> Self {
        Self::new(MemoryCollection::shared(), config)
    }

    pub fn register(&self, account: NewAccount) -> Result<UserAccount, AuthError> {
        let email = account.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if account.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }
        let partner_id = account.partner_id.filter(|id| !id.trim().is_empty());
        if account.role != Role::Admin && partner_id.is_none() {
            return Err(AuthError::MissingPartner(account.role.label()));
        }
        let driver_id = account.driver_id.filter(|id| !id.trim().is_empty());
        if account.role == Role::Motorista && driver_id.is_none() {
            return Err(AuthError::MissingDriver);
        }
        if self.find_by_email(&email)?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(account.password.as_bytes(), &salt)
            .map_err(|err| AuthError::Hashing(err.to_string()))?
            .to_string();

        let user = self.users.insert(UserAccount {
            id: new_id(),
            email,
            password_hash,
            role: account.role,
            partner_id: if account.role == Role::Admin {
                None
            } else {
                partner_id
            },
            driver_id,
            active: true,
            created_at: Utc::now(),
        })?;
        tracing::info!(user_id = %user.id, role = ?user.role, "account registered");
        Ok(user)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let user = self
            .find_by_email(&email.trim().to_lowercase())?
            .ok_or(AuthError::InvalidCredentials)?;
        let parsed = PasswordHash::new(&user.password_hash)
            .map_err(|err| AuthError::Hashing(err.to_string()))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            tracing::warn!(user_id = %user.id, "rejected login");
            return Err(AuthError::InvalidCredentials);
        }
        if !user.active {
            return Err(AuthError::Inactive);
        }
        self.issue(&user)
    }

    pub fn issue(&self, user: &UserAccount) -> Result<IssuedToken, AuthError> {
        let expires_at = Utc::now() + self.token_ttl;
        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            parceiro: user.partner_id.clone(),
            motorista: user.driver_id.clone(),
            exp: expires_at.timestamp().max(0) as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(IssuedToken {
            token,
            expires_at,
            role: user.role,
        })
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let decoded = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AuthError::InvalidToken)?;
        let claims = decoded.claims;
        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
            partner_id: claims.parceiro,
            driver_id: claims.motorista,
        })
    }

    pub fn get(&self, user_id: &str) -> Result<Option<UserAccount>, AuthError> {
        Ok(self.users.get(user_id)?)
    }

    /// Creates the configured administrator unless an admin account already exists.
    pub fn ensure_admin(&self, admin: &BootstrapAdmin) -> Result<Option<UserAccount>, AuthError> {
        if self.users.all()?.iter().any(|user| user.role == Role::Admin) {
            return Ok(None);
        }
        let created = self.register(NewAccount {
            email: admin.email.clone(),
            password: admin.password.clone(),
            role: Role::Admin,
            partner_id: None,
            driver_id: None,
        })?;
        tracing::info!(email = %created.email, "bootstrap administrator created");
        Ok(Some(created))
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, AuthError> {
        Ok(self
            .users
            .all()?
            .into_iter()
            .find(|user| user.email.eq_ignore_ascii_case(email)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::in_memory(&AuthConfig {
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 1,
            bootstrap_admin: None,
        })
    }

    fn account(email: &str, role: Role) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password: "palavra-passe".to_string(),
            role,
            partner_id: Some("p1".to_string()),
            driver_id: None,
        }
    }

    #[test]
    fn login_round_trips_claims_into_auth_user() {
        let service = service();
        service
            .register(account("Gestor@Frota.pt", Role::Gestor))
            .expect("registers");

        let issued = service
            .login("gestor@frota.pt", "palavra-passe")
            .expect("logs in");
        let user = service.verify(&issued.token).expect("token verifies");
        assert_eq!(user.role, Role::Gestor);
        assert_eq!(user.partner_id.as_deref(), Some("p1"));
    }

    #[test]
    fn duplicate_email_is_case_insensitive() {
        let service = service();
        service
            .register(account("a@frota.pt", Role::Parceiro))
            .expect("registers");
        let error = service
            .register(account("A@FROTA.PT", Role::Parceiro))
            .expect_err("duplicate");
        assert!(matches!(error, AuthError::EmailTaken));
    }

    #[test]
    fn registration_rules_are_enforced() {
        let service = service();
        let mut short = account("b@frota.pt", Role::Gestor);
        short.password = "curta".to_string();
        assert!(matches!(service.register(short), Err(AuthError::WeakPassword)));

        let mut orphan = account("c@frota.pt", Role::Gestor);
        orphan.partner_id = None;
        assert!(matches!(
            service.register(orphan),
            Err(AuthError::MissingPartner(_))
        ));

        let driver = account("d@frota.pt", Role::Motorista);
        assert!(matches!(
            service.register(driver),
            Err(AuthError::MissingDriver)
        ));
    }

    #[test]
    fn wrong_password_and_tampered_token_are_rejected() {
        let service = service();
        service
            .register(account("e@frota.pt", Role::Contabilidade))
            .expect("registers");
        assert!(matches!(
            service.login("e@frota.pt", "errada-123"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            service.verify("not-a-token"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn bootstrap_admin_is_created_once() {
        let service = service();
        let admin = BootstrapAdmin {
            email: "admin@frota.pt".to_string(),
            password: "palavra-passe".to_string(),
        };
        let created = service.ensure_admin(&admin).expect("bootstrap");
        assert_eq!(created.map(|user| user.role), Some(Role::Admin));
        assert!(service.ensure_admin(&admin).expect("second call").is_none());
        service
            .login("admin@frota.pt", "palavra-passe")
            .expect("admin can log in");
    }
}
