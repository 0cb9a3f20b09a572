use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::execution::AutomationExecution;
use super::executor::{AutomationExecutor, ExecutionOutcome, ExecutionRequest};
use super::steps::{validate_steps, AutomationStep, StepValidationError};
use super::two_factor::Delivery;
use super::variables::Variables;
use crate::fleet::{FleetError, FleetService, Period, Platform};
use crate::storage::StorageRouter;
use crate::store::{new_id, Collection, MemoryCollection, Record, RepositoryError};

/// Partner-authored script stored for a platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationDefinition {
    pub id: String,
    pub partner_id: String,
    pub platform: Platform,
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<AutomationStep>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationDefinition {
    pub fn validate(&self) -> Result<(), AutomationError> {
        if self.name.trim().is_empty() {
            return Err(AutomationError::MissingName);
        }
        validate_steps(&self.steps)?;
        Ok(())
    }
}

impl Record for AutomationDefinition {
    fn id(&self) -> &str {
        &self.id
    }

    fn partner_id(&self) -> &str {
        &self.partner_id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomationInput {
    pub name: String,
    pub platform: Platform,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<AutomationStep>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("automation name is required")]
    MissingName,
    #[error(transparent)]
    InvalidSteps(#[from] StepValidationError),
    #[error("automation {0} not found")]
    NotFound(String),
    #[error("execution {0} not found")]
    ExecutionNotFound(String),
    #[error("automation {0} is inactive")]
    Inactive(String),
    #[error("execution {0} has already finished")]
    ExecutionFinished(String),
    #[error(transparent)]
    Fleet(#[from] FleetError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Stored run waiting to be driven by [`AutomationService::run`].
pub struct PendingRun {
    pub execution_id: String,
    request: ExecutionRequest,
}

#[derive(Clone)]
pub struct AutomationService {
    definitions: Arc<dyn Collection<AutomationDefinition>>,
    executor: AutomationExecutor,
    fleet: FleetService,
    storage: StorageRouter,
}

impl AutomationService {
    pub fn new(
        definitions: Arc<dyn Collection<AutomationDefinition>>,
        executor: AutomationExecutor,
        fleet: FleetService,
        storage: StorageRouter,
    ) -> Self {
        Self {
            definitions,
            executor,
            fleet,
            storage,
        }
    }

    pub fn in_memory(executor: AutomationExecutor, fleet: FleetService, storage: StorageRouter) -> Self {
        Self::new(MemoryCollection::shared(), executor, fleet, storage)
    }

    pub fn create(
        &self,
        partner_id: &str,
        input: AutomationInput,
    ) -> Result<AutomationDefinition, AutomationError> {
        self.fleet.get_partner(partner_id)?;
        let now = Utc::now();
        let definition = AutomationDefinition {
            id: new_id(),
            partner_id: partner_id.to_string(),
            platform: input.platform,
            name: input.name.trim().to_string(),
            description: input.description.filter(|text| !text.trim().is_empty()),
            steps: input.steps,
            active: input.active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        definition.validate()?;
        let created = self.definitions.insert(definition)?;
        tracing::info!(partner_id, automation_id = %created.id, steps = created.steps.len(), "automation created");
        Ok(created)
    }

    pub fn list(&self, partner_id: &str) -> Result<Vec<AutomationDefinition>, AutomationError> {
        let mut definitions = self.definitions.list(partner_id)?;
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(definitions)
    }

    pub fn get(&self, partner_id: &str, id: &str) -> Result<AutomationDefinition, AutomationError> {
        self.definitions
            .get_for(partner_id, id)?
            .ok_or_else(|| AutomationError::NotFound(id.to_string()))
    }

    pub fn update(
        &self,
        partner_id: &str,
        id: &str,
        input: AutomationInput,
    ) -> Result<AutomationDefinition, AutomationError> {
        let mut definition = self.get(partner_id, id)?;
        definition.platform = input.platform;
        definition.name = input.name.trim().to_string();
        definition.description = input.description.filter(|text| !text.trim().is_empty());
        definition.steps = input.steps;
        definition.active = input.active.unwrap_or(definition.active);
        definition.updated_at = Utc::now();
        definition.validate()?;
        self.definitions.update(definition.clone())?;
        Ok(definition)
    }

    pub fn delete(&self, partner_id: &str, id: &str) -> Result<(), AutomationError> {
        let definition = self.get(partner_id, id)?;
        self.definitions.delete(&definition.id)?;
        tracing::info!(partner_id, automation_id = id, "automation deleted");
        Ok(())
    }

    /// Stores a `pendente` execution for a definition; the caller drives it with [`Self::run`].
    pub fn start(
        &self,
        partner_id: &str,
        id: &str,
        period: Option<Period>,
    ) -> Result<PendingRun, AutomationError> {
        let definition = self.get(partner_id, id)?;
        if !definition.active {
            return Err(AutomationError::Inactive(definition.id));
        }
        let partner = self.fleet.get_partner(partner_id)?;
        let credentials = self.fleet.credentials(partner_id, definition.platform)?;
        let storage = match self.storage.for_partner(&partner) {
            Ok(storage) => Some(storage),
            Err(err) => {
                tracing::warn!(partner_id, error = %err, "rpa artifacts will not be archived");
                None
            }
        };

        let execution = self.executor.register(
            AutomationExecution::pending(partner_id, definition.platform)
                .for_automation(&definition.id),
        )?;
        Ok(PendingRun {
            execution_id: execution.id.clone(),
            request: ExecutionRequest {
                execution,
                steps: definition.steps,
                variables: Variables::for_run(credentials.as_ref(), period),
                static_code: credentials.and_then(|creds| creds.two_factor_code),
                storage,
            },
        })
    }

    pub async fn run(&self, pending: PendingRun) -> ExecutionOutcome {
        self.executor.run(pending.request).await
    }

    pub fn execution(
        &self,
        partner_id: &str,
        execution_id: &str,
    ) -> Result<AutomationExecution, AutomationError> {
        self.executor
            .executions()
            .get_for(partner_id, execution_id)?
            .ok_or_else(|| AutomationError::ExecutionNotFound(execution_id.to_string()))
    }

    /// Passes a verification code to a running execution; `true` when a step was waiting.
    pub fn submit_two_factor(
        &self,
        partner_id: &str,
        execution_id: &str,
        code: &str,
    ) -> Result<bool, AutomationError> {
        let execution = self.execution(partner_id, execution_id)?;
        if execution.status.is_finished() {
            return Err(AutomationError::ExecutionFinished(execution.id));
        }
        match self.executor.inbox().submit(&execution.id, code) {
            Delivery::Delivered => Ok(true),
            Delivery::Queued => Ok(false),
            Delivery::Closed => Err(AutomationError::ExecutionFinished(execution.id)),
        }
    }
}
