use crate::approvals::ApprovalError;
use crate::auth::AuthError;
use crate::commission::{ClassificationError, StatementError};
use crate::config::ConfigError;
use crate::fleet::FleetError;
use crate::ingestion::{BoltApiError, ImportError, ImportServiceError};
use crate::rpa::{AutomationError, StepValidationError, SyncError};
use crate::storage::StorageError;
use crate::store::RepositoryError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Validation(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Upstream(String),
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Validation(message)
            | AppError::Unauthorized(message)
            | AppError::Forbidden(message)
            | AppError::NotFound(message)
            | AppError::Conflict(message)
            | AppError::Unprocessable(message)
            | AppError::Upstream(message)
            | AppError::Internal(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({ "sucesso": false, "erro": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => Self::Conflict(value.to_string()),
            RepositoryError::NotFound => Self::NotFound(value.to_string()),
            RepositoryError::Unavailable(_) => Self::Internal(value.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials | AuthError::Inactive | AuthError::InvalidToken => {
                Self::Unauthorized(value.to_string())
            }
            AuthError::EmailTaken => Self::Conflict(value.to_string()),
            AuthError::Hashing(_) => Self::Internal(value.to_string()),
            AuthError::Repository(err) => err.into(),
            AuthError::InvalidEmail
            | AuthError::WeakPassword
            | AuthError::MissingPartner(_)
            | AuthError::MissingDriver => Self::Validation(value.to_string()),
        }
    }
}

impl From<FleetError> for AppError {
    fn from(value: FleetError) -> Self {
        match value {
            FleetError::NotFound { .. } => Self::NotFound(value.to_string()),
            FleetError::DuplicatePlate(_)
            | FleetError::DuplicateDriver(_)
            | FleetError::DriverNotActive(_)
            | FleetError::VehicleUnavailable { .. }
            | FleetError::VehicleNotAssigned(_) => Self::Conflict(value.to_string()),
            FleetError::Repository(err) => err.into(),
            FleetError::Validation(_)
            | FleetError::InvalidNif(_)
            | FleetError::InvalidEmail(_)
            | FleetError::InvalidPlate(_)
            | FleetError::MissingDocuments(_)
            | FleetError::LicenceExpired(_)
            | FleetError::UnsupportedMode { .. } => Self::Validation(value.to_string()),
        }
    }
}

impl From<ImportError> for AppError {
    fn from(value: ImportError) -> Self {
        Self::Unprocessable(value.to_string())
    }
}

impl From<ImportServiceError> for AppError {
    fn from(value: ImportServiceError) -> Self {
        match value {
            ImportServiceError::Parse(err) => err.into(),
            ImportServiceError::Repository(err) => err.into(),
            ImportServiceError::PartnerNotFound(_) => Self::NotFound(value.to_string()),
        }
    }
}

impl From<BoltApiError> for AppError {
    fn from(value: BoltApiError) -> Self {
        Self::Upstream(value.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::InvalidPath(_) | StorageError::NotConfigured(_) => {
                Self::Validation(value.to_string())
            }
            StorageError::Io(_) => Self::Internal(value.to_string()),
            StorageError::Http(_) | StorageError::Remote { .. } | StorageError::Drive(_) => {
                Self::Upstream(value.to_string())
            }
        }
    }
}

impl From<ClassificationError> for AppError {
    fn from(value: ClassificationError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<StatementError> for AppError {
    fn from(value: StatementError) -> Self {
        match value {
            StatementError::AlreadyApproved(_) | StatementError::PaymentPending(_) => {
                Self::Conflict(value.to_string())
            }
            StatementError::NotFound(_) => Self::NotFound(value.to_string()),
            StatementError::Classification(err) => err.into(),
            StatementError::Fleet(err) => err.into(),
            StatementError::Repository(err) => err.into(),
        }
    }
}

impl From<ApprovalError> for AppError {
    fn from(value: ApprovalError) -> Self {
        match value {
            ApprovalError::InvalidTransition { .. }
            | ApprovalError::StatementNotDraft(_)
            | ApprovalError::StatementAlreadySubmitted(_)
            | ApprovalError::StatementDetached(_)
            | ApprovalError::StatementState { .. } => Self::Conflict(value.to_string()),
            ApprovalError::NotPermitted(_)
            | ApprovalError::SelfApproval
            | ApprovalError::AboveLimit { .. } => Self::Forbidden(value.to_string()),
            ApprovalError::NotFound(_) => Self::NotFound(value.to_string()),
            ApprovalError::Statement(err) => err.into(),
            ApprovalError::Fleet(err) => err.into(),
            ApprovalError::Repository(err) => err.into(),
            ApprovalError::InvalidAmount
            | ApprovalError::MissingDescription
            | ApprovalError::MissingReason
            | ApprovalError::StatementOnly
            | ApprovalError::NothingToPay(_) => Self::Validation(value.to_string()),
        }
    }
}

impl From<StepValidationError> for AppError {
    fn from(value: StepValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<AutomationError> for AppError {
    fn from(value: AutomationError) -> Self {
        match value {
            AutomationError::MissingName => Self::Validation(value.to_string()),
            AutomationError::InvalidSteps(err) => err.into(),
            AutomationError::NotFound(_) | AutomationError::ExecutionNotFound(_) => {
                Self::NotFound(value.to_string())
            }
            AutomationError::Inactive(_) | AutomationError::ExecutionFinished(_) => {
                Self::Conflict(value.to_string())
            }
            AutomationError::Fleet(err) => err.into(),
            AutomationError::Repository(err) => err.into(),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(value: SyncError) -> Self {
        match value {
            SyncError::MissingCredentials(_) | SyncError::Unsupported(_) => {
                Self::Validation(value.to_string())
            }
            SyncError::Fleet(err) => err.into(),
            SyncError::Repository(err) => err.into(),
        }
    }
}
