//! Automatic platform synchronisation: Bolt over its API, Uber and Via Verde via RPA.

use std::sync::Arc;

use serde::Serialize;

use super::execution::AutomationExecution;
use super::executor::{AutomationExecutor, ExecutionRequest};
use super::scripts::VendorScript;
use super::variables::Variables;
use crate::fleet::{
    FleetError, FleetService, IntegrationMode, Period, Platform, PlatformCredentials, SyncLog,
};
use crate::ingestion::{BoltEndpoints, BoltFleetClient, ImportService, ImportSummary, ParsedBatch};
use crate::storage::{CloudStorage, StorageRouter};
use crate::store::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no active {0} credentials configured")]
    MissingCredentials(&'static str),
    #[error("{0} cannot be synchronised automatically")]
    Unsupported(&'static str),
    #[error(transparent)]
    Fleet(#[from] FleetError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

enum Plan {
    Api,
    Rpa {
        script: VendorScript,
        execution: AutomationExecution,
        storage: Option<Arc<dyn CloudStorage>>,
    },
}

/// A synchronisation whose log (and execution, for RPA) already exist.
pub struct PreparedSync {
    log: SyncLog,
    credentials: PlatformCredentials,
    plan: Plan,
}

impl PreparedSync {
    pub fn log(&self) -> &SyncLog {
        &self.log
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.log.execution_id.as_deref()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub sync_log: SyncLog,
    pub summary: Option<ImportSummary>,
}

#[derive(Clone)]
pub struct SyncService {
    fleet: FleetService,
    imports: ImportService,
    executor: AutomationExecutor,
    storage: StorageRouter,
    http: reqwest::Client,
    bolt: BoltEndpoints,
}

impl SyncService {
    pub fn new(
        fleet: FleetService,
        imports: ImportService,
        executor: AutomationExecutor,
        storage: StorageRouter,
    ) -> Self {
        Self {
            fleet,
            imports,
            executor,
            storage,
            http: reqwest::Client::new(),
            bolt: BoltEndpoints::default(),
        }
    }

    pub fn with_bolt_endpoints(mut self, bolt: BoltEndpoints) -> Self {
        self.bolt = bolt;
        self
    }

    /// Checks credentials, picks the mode and opens the sync log.
    pub fn prepare(
        &self,
        partner_id: &str,
        platform: Platform,
        period: Period,
    ) -> Result<PreparedSync, SyncError> {
        let partner = self.fleet.get_partner(partner_id)?;
        let credentials = self
            .fleet
            .credentials(partner_id, platform)?
            .filter(|credentials| credentials.active)
            .ok_or(SyncError::MissingCredentials(platform.label()))?;

        let plan = if platform.supports(IntegrationMode::Api) && credentials.has_api_access() {
            Plan::Api
        } else if let Some(script) = VendorScript::for_platform(platform) {
            let execution = self.executor.register(
                AutomationExecution::pending(partner_id, platform).for_script(script.name()),
            )?;
            let storage = match self.storage.for_partner(&partner) {
                Ok(storage) => Some(storage),
                Err(err) => {
                    tracing::warn!(partner_id, error = %err, "rpa artifacts will not be archived");
                    None
                }
            };
            Plan::Rpa {
                script,
                execution,
                storage,
            }
        } else {
            return Err(SyncError::Unsupported(platform.label()));
        };

        let mode = match plan {
            Plan::Api => IntegrationMode::Api,
            Plan::Rpa { .. } => IntegrationMode::Rpa,
        };
        let mut log = self.imports.open_log(partner_id, platform, mode, period)?;
        if let Plan::Rpa { execution, .. } = &plan {
            log.execution_id = Some(execution.id.clone());
            self.imports.update_log(&log)?;
        }
        tracing::info!(partner_id, platform = platform.slug(), mode = ?mode, sync_log_id = %log.id, "sync prepared");

        Ok(PreparedSync {
            log,
            credentials,
            plan,
        })
    }

    /// Runs a prepared sync to completion; failures are written to the log.
    pub async fn run(&self, prepared: PreparedSync) -> SyncOutcome {
        let PreparedSync {
            mut log,
            credentials,
            plan,
        } = prepared;

        let result = match plan {
            Plan::Api => self.via_api(&credentials, &mut log).await,
            Plan::Rpa {
                script,
                execution,
                storage,
            } => {
                self.via_rpa(&credentials, script, execution, storage, &mut log)
                    .await
            }
        };

        match result {
            Ok(summary) => {
                if let Err(err) = self.fleet.mark_synced(&log.partner_id, log.platform) {
                    tracing::warn!(sync_log_id = %log.id, error = %err, "last sync time not saved");
                }
                SyncOutcome {
                    sync_log: log,
                    summary: Some(summary),
                }
            }
            Err(message) => {
                tracing::warn!(
                    partner_id = %log.partner_id,
                    platform = log.platform.slug(),
                    error = %message,
                    "sync failed"
                );
                if let Err(err) = self.imports.fail_log(&mut log, message) {
                    tracing::error!(sync_log_id = %log.id, error = %err, "sync log not updated");
                }
                SyncOutcome {
                    sync_log: log,
                    summary: None,
                }
            }
        }
    }

    pub async fn sync(
        &self,
        partner_id: &str,
        platform: Platform,
        period: Period,
    ) -> Result<SyncOutcome, SyncError> {
        let prepared = self.prepare(partner_id, platform, period)?;
        Ok(self.run(prepared).await)
    }

    async fn via_api(
        &self,
        credentials: &PlatformCredentials,
        log: &mut SyncLog,
    ) -> Result<ImportSummary, String> {
        let client = BoltFleetClient::new(
            self.http.clone(),
            self.bolt.clone(),
            credentials.api_client_id.clone().unwrap_or_default(),
            credentials.api_client_secret.clone().unwrap_or_default(),
        );
        let records = client
            .earnings(log.period)
            .await
            .map_err(|err| err.to_string())?;
        let (partner_id, platform, period) = (log.partner_id.clone(), log.platform, log.period);
        self.imports
            .import_records(
                &partner_id,
                platform,
                period,
                ParsedBatch::Earnings(records),
                0,
                log,
            )
            .map_err(|err| err.to_string())
    }

    async fn via_rpa(
        &self,
        credentials: &PlatformCredentials,
        script: VendorScript,
        execution: AutomationExecution,
        storage: Option<Arc<dyn CloudStorage>>,
        log: &mut SyncLog,
    ) -> Result<ImportSummary, String> {
        let period = log.period;
        let outcome = self
            .executor
            .run(ExecutionRequest {
                execution,
                steps: script.steps(),
                variables: Variables::for_run(Some(credentials), Some(period)),
                storage,
                static_code: credentials.two_factor_code.clone(),
            })
            .await;
        if let Some(error) = outcome.execution.error.clone() {
            return Err(error);
        }

        let file = outcome
            .last_download()
            .ok_or_else(|| format!("{} finished without downloading a file", script.name()))?;
        let (batch, skipped) = script
            .parse(file, period)
            .map_err(|err| format!("{}: {err}", file.file_name))?;
        let (partner_id, platform) = (log.partner_id.clone(), log.platform);
        self.imports
            .import_records(&partner_id, platform, period, batch, skipped, log)
            .map_err(|err| err.to_string())
    }
}
