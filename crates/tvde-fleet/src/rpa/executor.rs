//! Runs a step list against one browser session and records what happened.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::browser::{BrowserError, BrowserLauncher, BrowserSession, DownloadedFile};
use super::execution::{Artifact, ArtifactKind, AutomationExecution, StepLog, StepState};
use super::steps::{AutomationStep, Condition, StepAction};
use super::two_factor::{TwoFactorError, TwoFactorInbox};
use super::variables::{VariableError, Variables};
use crate::config::RpaConfig;
use crate::storage::{content_type_for, CloudStorage};
use crate::store::{Collection, RepositoryError};

#[derive(Debug, thiserror::Error)]
enum StepError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Variable(#[from] VariableError),
    #[error(transparent)]
    TwoFactor(#[from] TwoFactorError),
    #[error("conditionals cannot be nested")]
    NestedConditional,
}

/// Everything one run needs; the execution record is persisted as it progresses.
pub struct ExecutionRequest {
    pub execution: AutomationExecution,
    pub steps: Vec<AutomationStep>,
    pub variables: Variables,
    /// Partner storage for screenshots and downloads.
    pub storage: Option<Arc<dyn CloudStorage>>,
    /// Fixed verification code from the platform credentials.
    pub static_code: Option<String>,
}

#[derive(Debug)]
pub struct ExecutionOutcome {
    pub execution: AutomationExecution,
    pub downloads: Vec<DownloadedFile>,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.execution.error.is_none()
    }

    pub fn last_download(&self) -> Option<&DownloadedFile> {
        self.downloads.last()
    }
}

#[derive(Clone)]
pub struct AutomationExecutor {
    launcher: Arc<dyn BrowserLauncher>,
    inbox: Arc<TwoFactorInbox>,
    executions: Arc<dyn Collection<AutomationExecution>>,
    step_timeout: Duration,
    two_factor_timeout: Duration,
}

impl AutomationExecutor {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        inbox: Arc<TwoFactorInbox>,
        executions: Arc<dyn Collection<AutomationExecution>>,
        config: &RpaConfig,
    ) -> Self {
        Self {
            launcher,
            inbox,
            executions,
            step_timeout: config.step_timeout,
            two_factor_timeout: config.two_factor_timeout,
        }
    }

    pub fn inbox(&self) -> &Arc<TwoFactorInbox> {
        &self.inbox
    }

    pub fn executions(&self) -> &Arc<dyn Collection<AutomationExecution>> {
        &self.executions
    }

    /// Stores a freshly created execution before it is handed to [`Self::run`].
    pub fn register(
        &self,
        execution: AutomationExecution,
    ) -> Result<AutomationExecution, RepositoryError> {
        let execution = self.executions.insert(execution)?;
        self.inbox.open(&execution.id);
        Ok(execution)
    }

    /// Runs every step in order. Never fails: errors end up on the execution record.
    pub async fn run(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let ExecutionRequest {
            mut execution,
            steps,
            variables,
            storage,
            static_code,
        } = request;

        execution.start();
        self.persist(&execution);
        tracing::info!(
            execution_id = %execution.id,
            partner_id = %execution.partner_id,
            platform = execution.platform.slug(),
            steps = steps.len(),
            "rpa execution started"
        );

        let session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(execution_id = %execution.id, error = %err, "browser launch failed");
                execution.finish(Some(format!("browser launch failed: {err}")));
                self.persist(&execution);
                return ExecutionOutcome {
                    execution,
                    downloads: Vec::new(),
                };
            }
        };

        let mut run = Run {
            executor: self,
            session,
            folder: execution.folder(),
            execution,
            variables,
            storage,
            static_code,
            downloads: Vec::new(),
        };

        let mut failure = None;
        for (index, step) in steps.iter().enumerate() {
            if let Err(message) = run.step(step, &(index + 1).to_string()).await {
                failure = Some(message);
                break;
            }
        }

        if let Err(err) = run.session.close().await {
            tracing::warn!(execution_id = %run.execution.id, error = %err, "browser session did not close cleanly");
        }

        let Run {
            mut execution,
            variables,
            downloads,
            ..
        } = run;
        execution.variables = variables.public();
        execution.finish(failure);
        self.persist(&execution);
        self.inbox.forget(&execution.id);

        tracing::info!(
            execution_id = %execution.id,
            status = ?execution.status,
            downloads = downloads.len(),
            "rpa execution finished"
        );
        ExecutionOutcome {
            execution,
            downloads,
        }
    }

    fn persist(&self, execution: &AutomationExecution) {
        let result = match self.executions.update(execution.clone()) {
            Err(RepositoryError::NotFound) => self.executions.insert(execution.clone()).map(drop),
            other => other,
        };
        if let Err(err) = result {
            tracing::warn!(execution_id = %execution.id, error = %err, "execution record not saved");
        }
    }
}

struct Run<'a> {
    executor: &'a AutomationExecutor,
    session: Box<dyn BrowserSession>,
    folder: String,
    execution: AutomationExecution,
    variables: Variables,
    storage: Option<Arc<dyn CloudStorage>>,
    static_code: Option<String>,
    downloads: Vec<DownloadedFile>,
}

impl Run<'_> {
    /// `Err` carries the message that aborts the run.
    async fn step(&mut self, step: &AutomationStep, path: &str) -> Result<(), String> {
        let StepAction::Condicional {
            condicao,
            entao,
            senao,
        } = &step.acao
        else {
            return self.leaf(step, path).await;
        };

        let started_at = Utc::now();
        let clock = Instant::now();
        let branch = match self.holds(condicao, self.timeout_of(step)).await {
            Ok(true) => ("entao", entao),
            Ok(false) => ("senao", senao),
            Err(err) => return self.fail(step, path, started_at, clock, err).await,
        };
        self.log(
            step,
            path,
            StepState::Ok,
            started_at,
            clock,
            Some(format!("condition {}", if branch.0 == "entao" { "met" } else { "not met" })),
        );

        for (index, inner) in branch.1.iter().enumerate() {
            self.leaf(inner, &format!("{path}.{}.{}", branch.0, index + 1))
                .await?;
        }
        Ok(())
    }

    async fn leaf(&mut self, step: &AutomationStep, path: &str) -> Result<(), String> {
        let started_at = Utc::now();
        let clock = Instant::now();
        match self.perform(step).await {
            Ok(message) => {
                self.log(step, path, StepState::Ok, started_at, clock, message);
                Ok(())
            }
            Err(err) => self.fail(step, path, started_at, clock, err).await,
        }
    }

    async fn fail(
        &mut self,
        step: &AutomationStep,
        path: &str,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
        err: StepError,
    ) -> Result<(), String> {
        let message = self.variables.redact(&err.to_string());
        self.recovery_screenshot(path).await;

        if step.opcional {
            self.log(step, path, StepState::Ignorado, started_at, clock, Some(message));
            return Ok(());
        }
        self.log(
            step,
            path,
            StepState::Falhou,
            started_at,
            clock,
            Some(message.clone()),
        );
        Err(format!("step {path} ({}) failed: {message}", step.acao.tipo()))
    }

    fn log(
        &mut self,
        step: &AutomationStep,
        path: &str,
        estado: StepState,
        inicio: chrono::DateTime<Utc>,
        clock: Instant,
        mensagem: Option<String>,
    ) {
        let duracao_ms = clock.elapsed().as_millis() as u64;
        tracing::info!(
            execution_id = %self.execution.id,
            step = path,
            tipo = step.acao.tipo(),
            estado = ?estado,
            duracao_ms,
            "rpa step finished"
        );
        self.execution.logs.push(StepLog {
            indice: path.to_string(),
            tipo: step.acao.tipo().to_string(),
            descricao: step.label().to_string(),
            estado,
            inicio,
            duracao_ms,
            mensagem: mensagem.map(|text| self.variables.redact(&text)),
        });
        self.executor.persist(&self.execution);
    }

    fn timeout_of(&self, step: &AutomationStep) -> Duration {
        step.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.executor.step_timeout)
    }

    async fn perform(&mut self, step: &AutomationStep) -> Result<Option<String>, StepError> {
        let timeout = self.timeout_of(step);

        match &step.acao {
            StepAction::Navegar { url } => {
                let target = self.variables.substitute(url)?;
                self.session.goto(&target).await?;
                Ok((!self.variables.references_secret(url)).then(|| format!("opened {target}")))
            }
            StepAction::Clicar { seletor } => {
                let selector = self.variables.substitute(seletor)?;
                self.session.click(&selector, timeout).await?;
                Ok(None)
            }
            StepAction::Preencher {
                seletor,
                valor,
                secreto,
            } => {
                let selector = self.variables.substitute(seletor)?;
                let value = self.variables.substitute(valor)?;
                self.session.fill(&selector, &value, timeout).await?;
                let hidden = *secreto || self.variables.references_secret(valor);
                Ok(hidden.then(|| "value hidden".to_string()))
            }
            StepAction::Selecionar { seletor, valor } => {
                let selector = self.variables.substitute(seletor)?;
                let value = self.variables.substitute(valor)?;
                self.session.select(&selector, &value, timeout).await?;
                Ok(Some(format!("selected '{value}'")))
            }
            StepAction::PressionarTecla { seletor, tecla } => {
                let selector = self.variables.substitute(seletor)?;
                self.session.press_key(&selector, *tecla, timeout).await?;
                Ok(Some(format!("pressed {tecla:?}")))
            }
            StepAction::Aguardar { milissegundos } => {
                tokio::time::sleep(Duration::from_millis(*milissegundos)).await;
                Ok(None)
            }
            StepAction::AguardarElemento { seletor } => {
                let selector = self.variables.substitute(seletor)?;
                self.session.wait_for(&selector, timeout).await?;
                Ok(None)
            }
            StepAction::Screenshot { nome } => {
                let name = png_name(&self.variables.substitute(nome)?);
                let bytes = self.session.screenshot().await?;
                let stored = self.archive(ArtifactKind::Screenshot, &name, bytes).await;
                Ok(Some(stored.unwrap_or(name)))
            }
            StepAction::Download {
                seletor,
                nome_ficheiro,
            } => {
                let selector = self.variables.substitute(seletor)?;
                let name = self.variables.substitute(nome_ficheiro)?;
                let file = self.session.download(&selector, timeout).await?;
                if file.bytes.is_empty() {
                    let message = format!("{} is empty", file.file_name);
                    return Err(BrowserError::Download(message).into());
                }
                let size = file.bytes.len();
                self.archive(ArtifactKind::Download, &name, file.bytes.clone())
                    .await;
                self.downloads.push(DownloadedFile {
                    file_name: name.clone(),
                    bytes: file.bytes,
                });
                Ok(Some(format!("downloaded {name} ({size} bytes)")))
            }
            StepAction::ExtrairTexto { seletor, variavel } => {
                let selector = self.variables.substitute(seletor)?;
                let text = self.session.text(&selector, timeout).await?;
                self.variables.insert(variavel.clone(), text);
                Ok(Some(format!("stored '{variavel}'")))
            }
            StepAction::ExtrairTabela { seletor, variavel } => {
                let selector = self.variables.substitute(seletor)?;
                let rows = self.session.table(&selector, timeout).await?;
                let count = rows.len();
                let encoded = serde_json::to_string(&rows)
                    .map_err(|err| BrowserError::Protocol(err.to_string()))?;
                self.variables.insert(variavel.clone(), encoded);
                Ok(Some(format!("stored {count} rows in '{variavel}'")))
            }
            StepAction::Codigo2fa { seletor, .. } => {
                let selector = self.variables.substitute(seletor)?;
                let code = self.verification_code().await?;
                self.variables.insert_secret("codigo_2fa", code.clone());
                self.session.fill(&selector, &code, timeout).await?;
                Ok(Some("verification code entered".to_string()))
            }
            StepAction::Condicional { .. } => Err(StepError::NestedConditional),
        }
    }

    async fn holds(&mut self, condition: &Condition, timeout: Duration) -> Result<bool, StepError> {
        Ok(match condition {
            Condition::ElementoExiste { seletor } => {
                let selector = self.variables.substitute(seletor)?;
                self.session.exists(&selector).await?
            }
            Condition::ElementoAusente { seletor } => {
                let selector = self.variables.substitute(seletor)?;
                !self.session.exists(&selector).await?
            }
            Condition::UrlContem { valor } => {
                let wanted = self.variables.substitute(valor)?;
                self.session.current_url().await?.contains(&wanted)
            }
            Condition::TextoContem { seletor, valor } => {
                let selector = self.variables.substitute(seletor)?;
                let wanted = self.variables.substitute(valor)?;
                self.session.exists(&selector).await?
                    && self
                        .session
                        .text(&selector, timeout)
                        .await?
                        .contains(&wanted)
            }
            Condition::VariavelIgual { variavel, valor } => {
                let wanted = self.variables.substitute(valor)?;
                self.variables.get(variavel) == Some(wanted.as_str())
            }
        })
    }

    async fn verification_code(&mut self) -> Result<String, StepError> {
        if let Some(code) = self.static_code.clone().filter(|code| !code.trim().is_empty()) {
            return Ok(code);
        }
        self.execution.awaiting_two_factor = true;
        self.executor.persist(&self.execution);
        tracing::info!(execution_id = %self.execution.id, "waiting for verification code");

        let code = self
            .executor
            .inbox
            .wait(&self.execution.id, self.executor.two_factor_timeout)
            .await;

        self.execution.awaiting_two_factor = false;
        self.executor.persist(&self.execution);
        Ok(code?)
    }

    async fn recovery_screenshot(&mut self, path: &str) {
        let name = format!("erro_passo_{}.png", path.replace('.', "_"));
        match self.session.screenshot().await {
            Ok(bytes) => {
                self.archive(ArtifactKind::Screenshot, &name, bytes).await;
            }
            Err(err) => {
                tracing::debug!(execution_id = %self.execution.id, error = %err, "recovery screenshot unavailable");
            }
        }
    }

    /// Uploads to partner storage and records the artifact; returns the stored path.
    async fn archive(&mut self, kind: ArtifactKind, name: &str, bytes: Vec<u8>) -> Option<String> {
        let size = bytes.len() as u64;
        let path = match &self.storage {
            Some(storage) => {
                let target = format!("{}/{name}", self.folder);
                match storage.upload(&target, bytes, content_type_for(name)).await {
                    Ok(stored) => Some(stored.path),
                    Err(err) => {
                        tracing::warn!(execution_id = %self.execution.id, artifact = name, error = %err, "artifact not archived");
                        None
                    }
                }
            }
            None => None,
        };
        self.execution.artifacts.push(Artifact {
            kind,
            name: name.to_string(),
            size,
            path: path.clone(),
        });
        path
    }
}

fn png_name(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(".png") {
        name.to_string()
    } else {
        format!("{name}.png")
    }
}
