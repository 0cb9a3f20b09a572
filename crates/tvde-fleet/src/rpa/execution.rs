use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fleet::Platform;
use crate::store::{new_id, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pendente,
    EmExecucao,
    Sucesso,
    Erro,
}

impl ExecutionStatus {
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Sucesso | Self::Erro)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Ok,
    Falhou,
    Ignorado,
}

/// Outcome of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    /// 1-based position; branch steps read `3.entao.1`.
    pub indice: String,
    pub tipo: String,
    pub descricao: String,
    pub estado: StepState,
    pub inicio: DateTime<Utc>,
    pub duracao_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mensagem: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Screenshot,
    Download,
}

/// Screenshot or file produced by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub name: String,
    pub size: u64,
    /// Location in the partner's storage; `None` when archiving failed.
    pub path: Option<String>,
}

/// Persisted record of one automation run (execução).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationExecution {
    pub id: String,
    pub partner_id: String,
    pub platform: Platform,
    /// Stored definition that was run, if any.
    pub automation_id: Option<String>,
    /// Built-in vendor script that was run, if any.
    pub script: Option<String>,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub awaiting_two_factor: bool,
    pub logs: Vec<StepLog>,
    pub artifacts: Vec<Artifact>,
    pub variables: BTreeMap<String, String>,
    pub error: Option<String>,
}

impl AutomationExecution {
    pub fn pending(partner_id: &str, platform: Platform) -> Self {
        Self {
            id: new_id(),
            partner_id: partner_id.to_string(),
            platform,
            automation_id: None,
            script: None,
            status: ExecutionStatus::Pendente,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            awaiting_two_factor: false,
            logs: Vec::new(),
            artifacts: Vec::new(),
            variables: BTreeMap::new(),
            error: None,
        }
    }

    pub fn for_automation(mut self, automation_id: &str) -> Self {
        self.automation_id = Some(automation_id.to_string());
        self
    }

    pub fn for_script(mut self, script: &str) -> Self {
        self.script = Some(script.to_string());
        self
    }

    /// Archive folder for this run's artifacts.
    pub fn folder(&self) -> String {
        format!("rpa/{}/{}", self.platform.slug(), self.id)
    }

    pub(crate) fn start(&mut self) {
        self.status = ExecutionStatus::EmExecucao;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self, error: Option<String>) {
        self.status = if error.is_some() {
            ExecutionStatus::Erro
        } else {
            ExecutionStatus::Sucesso
        };
        self.error = error;
        self.awaiting_two_factor = false;
        self.finished_at = Some(Utc::now());
    }
}

impl Record for AutomationExecution {
    fn id(&self) -> &str {
        &self.id
    }

    fn partner_id(&self) -> &str {
        &self.partner_id
    }
}
