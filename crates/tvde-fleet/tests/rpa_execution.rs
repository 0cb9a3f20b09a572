use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tvde_fleet::commission::PlanTier;
use tvde_fleet::config::RpaConfig;
use tvde_fleet::fleet::{
    CredentialsInput, FleetService, FleetStores, IntegrationMode, NewDriver, NewPartner, Period,
    Platform, SyncStatus,
};
use tvde_fleet::ingestion::{ImportService, LedgerStore};
use tvde_fleet::rpa::{
    AutomationError, AutomationExecution, AutomationExecutor, AutomationInput, AutomationService,
    AutomationStep, BrowserError, BrowserLauncher, BrowserSession, Condition, Delivery,
    DownloadedFile, ExecutionRequest, ExecutionStatus, Key, StepAction, StepState, SyncService,
    TwoFactorInbox, Variables,
};
use tvde_fleet::storage::{CloudStorage, LocalStorage, StorageRouter};
use tvde_fleet::store::MemoryCollection;

#[derive(Default)]
struct BrowserScript {
    /// Selectors that never resolve.
    missing: HashSet<String>,
    /// Selectors reported by `exists`.
    present: HashSet<String>,
    downloads: HashMap<String, Vec<u8>>,
    fail_launch: bool,
}

#[derive(Default)]
struct BrowserLog {
    actions: Vec<String>,
    /// Timeouts handed to `text`, per selector.
    text_waits: Vec<(String, Duration)>,
    url: String,
    closed: bool,
}

#[derive(Clone, Default)]
struct FakeBrowser {
    script: Arc<Mutex<BrowserScript>>,
    log: Arc<Mutex<BrowserLog>>,
}

impl FakeBrowser {
    fn with(script: BrowserScript) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            log: Arc::default(),
        }
    }

    fn actions(&self) -> Vec<String> {
        self.log.lock().expect("log lock").actions.clone()
    }

    fn closed(&self) -> bool {
        self.log.lock().expect("log lock").closed
    }

    fn record(&self, action: String) {
        self.log.lock().expect("log lock").actions.push(action);
    }

    fn resolve(&self, selector: &str) -> Result<(), BrowserError> {
        if self.script.lock().expect("script lock").missing.contains(selector) {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        if self.script.lock().expect("script lock").fail_launch {
            return Err(BrowserError::Protocol("chromedriver unreachable".to_string()));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        self.log.lock().expect("log lock").url = url.to_string();
        self.record(format!("goto {url}"));
        Ok(())
    }

    async fn click(&mut self, selector: &str, _timeout: Duration) -> Result<(), BrowserError> {
        self.resolve(selector)?;
        self.record(format!("click {selector}"));
        Ok(())
    }

    async fn fill(
        &mut self,
        selector: &str,
        value: &str,
        _timeout: Duration,
    ) -> Result<(), BrowserError> {
        self.resolve(selector)?;
        self.record(format!("fill {selector}={value}"));
        Ok(())
    }

    async fn select(
        &mut self,
        selector: &str,
        value: &str,
        _timeout: Duration,
    ) -> Result<(), BrowserError> {
        self.resolve(selector)?;
        self.record(format!("select {selector}={value}"));
        Ok(())
    }

    async fn press_key(
        &mut self,
        selector: &str,
        key: Key,
        _timeout: Duration,
    ) -> Result<(), BrowserError> {
        self.resolve(selector)?;
        self.record(format!("key {selector} {key:?}"));
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.resolve(selector).map_err(|_| BrowserError::Timeout {
            what: selector.to_string(),
            after_ms: timeout.as_millis() as u64,
        })
    }

    async fn exists(&mut self, selector: &str) -> Result<bool, BrowserError> {
        Ok(self.script.lock().expect("script lock").present.contains(selector))
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self.log.lock().expect("log lock").url.clone())
    }

    async fn text(&mut self, selector: &str, timeout: Duration) -> Result<String, BrowserError> {
        self.log
            .lock()
            .expect("log lock")
            .text_waits
            .push((selector.to_string(), timeout));
        self.resolve(selector)?;
        Ok(format!("texto de {selector}"))
    }

    async fn table(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<Vec<Vec<String>>, BrowserError> {
        self.resolve(selector)?;
        Ok(vec![
            vec!["Data".to_string(), "Valor".to_string()],
            vec!["2025-03-10".to_string(), "12,50".to_string()],
        ])
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn download(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<DownloadedFile, BrowserError> {
        self.resolve(selector)?;
        self.record(format!("download {selector}"));
        let bytes = self
            .script
            .lock()
            .expect("script lock")
            .downloads
            .get(selector)
            .cloned()
            .ok_or_else(|| BrowserError::Download(format!("nothing behind {selector}")))?;
        Ok(DownloadedFile {
            file_name: "export.csv".to_string(),
            bytes,
        })
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.log.lock().expect("log lock").closed = true;
        Ok(())
    }
}

fn rpa_config() -> RpaConfig {
    RpaConfig {
        webdriver_url: "http://127.0.0.1:9515".to_string(),
        headless: true,
        step_timeout: Duration::from_millis(200),
        two_factor_timeout: Duration::from_secs(5),
    }
}

fn executor(browser: &FakeBrowser) -> AutomationExecutor {
    AutomationExecutor::new(
        Arc::new(browser.clone()),
        Arc::new(TwoFactorInbox::new()),
        MemoryCollection::shared(),
        &rpa_config(),
    )
}

fn step(descricao: &str, acao: StepAction) -> AutomationStep {
    AutomationStep::new(descricao, acao)
}

#[tokio::test]
async fn text_conditions_wait_as_long_as_their_step_allows() {
    let browser = FakeBrowser::with(BrowserScript {
        present: HashSet::from(["#saldo".to_string()]),
        ..BrowserScript::default()
    });
    let executor = executor(&browser);
    let execution = executor
        .register(AutomationExecution::pending("p1", Platform::Bolt))
        .expect("registered");

    let branch = |seletor: &str| {
        vec![step(
            "Marcar",
            StepAction::Clicar {
                seletor: seletor.to_string(),
            },
        )]
    };
    let outcome = executor
        .run(ExecutionRequest {
            execution,
            steps: vec![step(
                "Saldo",
                StepAction::Condicional {
                    condicao: Condition::TextoContem {
                        seletor: "#saldo".to_string(),
                        valor: "texto".to_string(),
                    },
                    entao: branch("#sim"),
                    senao: branch("#nao"),
                },
            )
            .with_timeout(1500)],
            variables: Variables::new(),
            storage: None,
            static_code: None,
        })
        .await;

    assert!(outcome.succeeded(), "{:?}", outcome.execution.error);
    assert_eq!(browser.actions(), ["click #sim"]);
    let waits = browser.log.lock().expect("log lock").text_waits.clone();
    assert_eq!(waits, [("#saldo".to_string(), Duration::from_millis(1500))]);
}

fn login_variables() -> Variables {
    let mut variables = Variables::new();
    variables.insert("username", "frota@example.pt");
    variables.insert_secret("password", "s3gredo-forte");
    variables.insert("periodo_inicio", "2025-03-10");
    variables
}

#[tokio::test]
async fn runs_steps_in_order_and_archives_artifacts() {
    let browser = FakeBrowser::with(BrowserScript {
        present: HashSet::from(["#cookies".to_string()]),
        downloads: HashMap::from([("#exportar".to_string(), b"a;b\n1;2\n".to_vec())]),
        ..Default::default()
    });
    let executor = executor(&browser);
    let folder = tempfile::tempdir().expect("tempdir");
    let storage: Arc<dyn CloudStorage> = Arc::new(LocalStorage::new(folder.path()));

    let execution = executor
        .register(AutomationExecution::pending("p1", Platform::Uber))
        .expect("registered");
    let execution_id = execution.id.clone();
    let steps = vec![
        step(
            "Abrir portal",
            StepAction::Navegar {
                url: "https://portal.example/relatorios?inicio={{periodo_inicio}}".to_string(),
            },
        ),
        step(
            "Email",
            StepAction::Preencher {
                seletor: "#email".to_string(),
                valor: "{{username}}".to_string(),
                secreto: false,
            },
        ),
        step(
            "Password",
            StepAction::Preencher {
                seletor: "#password".to_string(),
                valor: "{{password}}".to_string(),
                secreto: false,
            },
        ),
        step(
            "Cookies",
            StepAction::Condicional {
                condicao: Condition::ElementoExiste {
                    seletor: "#cookies".to_string(),
                },
                entao: vec![step(
                    "Aceitar",
                    StepAction::Clicar {
                        seletor: "#cookies".to_string(),
                    },
                )],
                senao: Vec::new(),
            },
        ),
        step(
            "Tabela",
            StepAction::ExtrairTabela {
                seletor: "table.pagamentos".to_string(),
                variavel: "pagamentos".to_string(),
            },
        ),
        step(
            "Painel",
            StepAction::Screenshot {
                nome: "painel".to_string(),
            },
        ),
        step(
            "Exportar",
            StepAction::Download {
                seletor: "#exportar".to_string(),
                nome_ficheiro: "extrato_{{periodo_inicio}}.csv".to_string(),
            },
        ),
    ];

    let outcome = executor
        .run(ExecutionRequest {
            execution,
            steps,
            variables: login_variables(),
            storage: Some(storage),
            static_code: None,
        })
        .await;

    assert!(outcome.succeeded(), "{:?}", outcome.execution.error);
    let execution = &outcome.execution;
    assert_eq!(execution.status, ExecutionStatus::Sucesso);
    assert!(execution.started_at.is_some() && execution.finished_at.is_some());
    let indices: Vec<&str> = execution.logs.iter().map(|log| log.indice.as_str()).collect();
    assert_eq!(indices, ["1", "2", "3", "4", "4.entao.1", "5", "6", "7"]);
    assert!(execution.logs.iter().all(|log| log.estado == StepState::Ok));

    assert_eq!(
        browser.actions(),
        [
            "goto https://portal.example/relatorios?inicio=2025-03-10",
            "fill #email=frota@example.pt",
            "fill #password=s3gredo-forte",
            "click #cookies",
            "download #exportar",
        ]
    );
    assert!(browser.closed());

    let serialized = serde_json::to_string(execution).expect("serializes");
    assert!(!serialized.contains("s3gredo-forte"));
    assert!(!execution.variables.contains_key("password"));
    assert_eq!(
        execution.variables.get("pagamentos").map(String::as_str),
        Some(r#"[["Data","Valor"],["2025-03-10","12,50"]]"#)
    );

    assert_eq!(execution.artifacts.len(), 2);
    let download_path = format!("rpa/uber/{execution_id}/extrato_2025-03-10.csv");
    assert_eq!(execution.artifacts[1].path.as_deref(), Some(download_path.as_str()));
    let stored = std::fs::read(folder.path().join(&download_path)).expect("download archived");
    assert_eq!(stored, b"a;b\n1;2\n");
    assert!(folder
        .path()
        .join(format!("rpa/uber/{execution_id}/painel.png"))
        .exists());

    let download = outcome.last_download().expect("download kept");
    assert_eq!(download.file_name, "extrato_2025-03-10.csv");

    let persisted = executor
        .executions()
        .get(&execution_id)
        .expect("store readable")
        .expect("persisted");
    assert_eq!(persisted.status, ExecutionStatus::Sucesso);
    assert_eq!(persisted.logs.len(), 8);
}

#[tokio::test]
async fn empty_downloads_fail_the_step() {
    let browser = FakeBrowser::with(BrowserScript {
        downloads: HashMap::from([("#exportar".to_string(), Vec::new())]),
        ..Default::default()
    });
    let executor = executor(&browser);
    let execution = executor
        .register(AutomationExecution::pending("p1", Platform::Uber))
        .expect("registered");

    let outcome = executor
        .run(ExecutionRequest {
            execution,
            steps: vec![step(
                "Exportar",
                StepAction::Download {
                    seletor: "#exportar".to_string(),
                    nome_ficheiro: "extrato.csv".to_string(),
                },
            )],
            variables: Variables::new(),
            storage: None,
            static_code: None,
        })
        .await;

    assert!(!outcome.succeeded());
    assert!(outcome.downloads.is_empty());
    assert!(outcome
        .execution
        .error
        .as_deref()
        .is_some_and(|error| error.contains("is empty")));
}

#[tokio::test]
async fn optional_failures_are_skipped_and_required_failures_abort() {
    let browser = FakeBrowser::with(BrowserScript {
        missing: HashSet::from(["#banner".to_string(), "#entrar".to_string()]),
        ..Default::default()
    });
    let executor = executor(&browser);
    let execution = executor
        .register(AutomationExecution::pending("p1", Platform::ViaVerde))
        .expect("registered");

    let outcome = executor
        .run(ExecutionRequest {
            execution,
            steps: vec![
                step(
                    "Fechar banner",
                    StepAction::Clicar {
                        seletor: "#banner".to_string(),
                    },
                )
                .optional(),
                step(
                    "Entrar",
                    StepAction::Clicar {
                        seletor: "#entrar".to_string(),
                    },
                ),
                step(
                    "Nunca chega aqui",
                    StepAction::Navegar {
                        url: "https://portal.example/fim".to_string(),
                    },
                ),
            ],
            variables: Variables::new(),
            storage: None,
            static_code: None,
        })
        .await;

    let execution = &outcome.execution;
    assert_eq!(execution.status, ExecutionStatus::Erro);
    assert_eq!(execution.logs.len(), 2);
    assert_eq!(execution.logs[0].estado, StepState::Ignorado);
    assert_eq!(execution.logs[1].estado, StepState::Falhou);
    let error = execution.error.as_deref().expect("error recorded");
    assert!(error.contains("step 2"), "{error}");
    assert!(error.contains("#entrar"), "{error}");

    let names: Vec<&str> = execution.artifacts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["erro_passo_1.png", "erro_passo_2.png"]);
    assert!(execution.artifacts.iter().all(|a| a.path.is_none()));
    assert!(browser.actions().is_empty());
    assert!(browser.closed());
}

#[tokio::test]
async fn unknown_variables_fail_the_step() {
    let browser = FakeBrowser::default();
    let executor = executor(&browser);
    let execution = executor
        .register(AutomationExecution::pending("p1", Platform::Uber))
        .expect("registered");

    let outcome = executor
        .run(ExecutionRequest {
            execution,
            steps: vec![step(
                "Abrir",
                StepAction::Navegar {
                    url: "https://portal.example/{{conta}}".to_string(),
                },
            )],
            variables: Variables::new(),
            storage: None,
            static_code: None,
        })
        .await;

    assert!(!outcome.succeeded());
    assert!(outcome
        .execution
        .error
        .as_deref()
        .is_some_and(|error| error.contains("conta")));
}

#[tokio::test]
async fn verification_code_is_awaited_from_the_inbox() {
    let browser = FakeBrowser::default();
    let executor = executor(&browser);
    let execution = executor
        .register(AutomationExecution::pending("p1", Platform::Uber))
        .expect("registered");
    let execution_id = execution.id.clone();

    let running = executor.clone();
    let handle = tokio::spawn(async move {
        running
            .run(ExecutionRequest {
                execution,
                steps: vec![step(
                    "Código",
                    StepAction::Codigo2fa {
                        seletor: "#otp".to_string(),
                        canal: Default::default(),
                    },
                )],
                variables: Variables::new(),
                storage: None,
                static_code: None,
            })
            .await
    });

    let mut waited = 0;
    while !executor.inbox().is_waiting(&execution_id) {
        assert!(waited < 200, "execution never asked for a code");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
    let waiting = executor
        .executions()
        .get(&execution_id)
        .expect("store readable")
        .expect("persisted");
    assert!(waiting.awaiting_two_factor);
    assert_eq!(waiting.status, ExecutionStatus::EmExecucao);

    assert_eq!(
        executor.inbox().submit(&execution_id, " 482913 "),
        Delivery::Delivered
    );
    let outcome = handle.await.expect("run completes");
    assert_eq!(
        executor.inbox().submit(&execution_id, "111111"),
        Delivery::Closed
    );

    assert!(outcome.succeeded(), "{:?}", outcome.execution.error);
    assert!(!outcome.execution.awaiting_two_factor);
    assert_eq!(browser.actions(), ["fill #otp=482913"]);
    let serialized = serde_json::to_string(&outcome.execution).expect("serializes");
    assert!(!serialized.contains("482913"));
}

#[tokio::test]
async fn stored_verification_code_skips_the_inbox() {
    let browser = FakeBrowser::default();
    let executor = executor(&browser);
    let execution = executor
        .register(AutomationExecution::pending("p1", Platform::Uber))
        .expect("registered");

    let outcome = executor
        .run(ExecutionRequest {
            execution,
            steps: vec![step(
                "Código",
                StepAction::Codigo2fa {
                    seletor: "#otp".to_string(),
                    canal: Default::default(),
                },
            )],
            variables: Variables::new(),
            storage: None,
            static_code: Some("111222".to_string()),
        })
        .await;

    assert!(outcome.succeeded());
    assert_eq!(browser.actions(), ["fill #otp=111222"]);
}

#[tokio::test]
async fn launch_failure_marks_the_execution_as_failed() {
    let browser = FakeBrowser::with(BrowserScript {
        fail_launch: true,
        ..Default::default()
    });
    let executor = executor(&browser);
    let execution = executor
        .register(AutomationExecution::pending("p1", Platform::Uber))
        .expect("registered");

    let outcome = executor
        .run(ExecutionRequest {
            execution,
            steps: vec![step(
                "Abrir",
                StepAction::Navegar {
                    url: "https://portal.example".to_string(),
                },
            )],
            variables: Variables::new(),
            storage: None,
            static_code: None,
        })
        .await;

    assert_eq!(outcome.execution.status, ExecutionStatus::Erro);
    assert!(outcome.execution.logs.is_empty());
    assert!(outcome
        .execution
        .error
        .as_deref()
        .is_some_and(|error| error.starts_with("browser launch failed")));
}

fn partner(fleet: &FleetService) -> String {
    fleet
        .create_partner(NewPartner {
            name: "Frota Lisboa".to_string(),
            nif: "501442600".to_string(),
            email: "geral@frotalisboa.pt".to_string(),
            phone: None,
            plan: PlanTier::Profissional,
            approval_limit: None,
        })
        .expect("partner")
        .id
}

fn uber_credentials(fleet: &FleetService, partner_id: &str) {
    fleet
        .save_credentials(
            partner_id,
            Platform::Uber,
            CredentialsInput {
                username: "frota@example.pt".to_string(),
                password: Some("s3gredo-forte".to_string()),
                api_client_id: None,
                api_client_secret: None,
                two_factor_code: Some("654321".to_string()),
                preferred_mode: Some(IntegrationMode::Rpa),
                active: None,
            },
        )
        .expect("credentials");
}

#[tokio::test]
async fn automation_definitions_run_with_partner_credentials() {
    let browser = FakeBrowser::default();
    let fleet = FleetService::new(FleetStores::in_memory());
    let partner_id = partner(&fleet);
    uber_credentials(&fleet, &partner_id);
    let storage_root = tempfile::tempdir().expect("tempdir");
    let storage = StorageRouter::new(&tvde_fleet::config::StorageConfig {
        local_root: storage_root.path().to_path_buf(),
    });
    let automations = AutomationService::in_memory(executor(&browser), fleet, storage);

    let definition = automations
        .create(
            &partner_id,
            AutomationInput {
                name: "  Login Uber ".to_string(),
                platform: Platform::Uber,
                description: Some(" ".to_string()),
                steps: vec![
                    step(
                        "Relatório",
                        StepAction::Navegar {
                            url: "https://supplier.example/?de={{periodo_inicio_pt}}".to_string(),
                        },
                    ),
                    step(
                        "Email",
                        StepAction::Preencher {
                            seletor: "#email".to_string(),
                            valor: "{{username}}".to_string(),
                            secreto: false,
                        },
                    ),
                    step(
                        "Código",
                        StepAction::Codigo2fa {
                            seletor: "#otp".to_string(),
                            canal: Default::default(),
                        },
                    ),
                ],
                active: None,
            },
        )
        .expect("created");
    assert_eq!(definition.name, "Login Uber");
    assert!(definition.description.is_none());
    assert!(definition.active);

    let period = Period::week_of(NaiveDate::from_ymd_opt(2025, 3, 12).expect("date"));
    let pending = automations
        .start(&partner_id, &definition.id, Some(period))
        .expect("started");
    let execution_id = pending.execution_id.clone();
    assert_eq!(
        automations
            .execution(&partner_id, &execution_id)
            .expect("pending visible")
            .status,
        ExecutionStatus::Pendente
    );

    let outcome = automations.run(pending).await;
    assert!(outcome.succeeded(), "{:?}", outcome.execution.error);
    assert_eq!(
        browser.actions(),
        [
            "goto https://supplier.example/?de=10-03-2025",
            "fill #email=frota@example.pt",
            "fill #otp=654321",
        ]
    );

    let stored = automations
        .execution(&partner_id, &execution_id)
        .expect("stored");
    assert_eq!(stored.automation_id.as_deref(), Some(definition.id.as_str()));
    assert!(matches!(
        automations.submit_two_factor(&partner_id, &execution_id, "000000"),
        Err(AutomationError::ExecutionFinished(_))
    ));
    assert!(matches!(
        automations.execution("another-partner", &execution_id),
        Err(AutomationError::ExecutionNotFound(_))
    ));
}

#[tokio::test]
async fn inactive_and_invalid_automations_are_rejected() {
    let browser = FakeBrowser::default();
    let fleet = FleetService::new(FleetStores::in_memory());
    let partner_id = partner(&fleet);
    let storage = StorageRouter::new(&tvde_fleet::config::StorageConfig {
        local_root: std::env::temp_dir(),
    });
    let automations = AutomationService::in_memory(executor(&browser), fleet, storage);

    let empty = automations.create(
        &partner_id,
        AutomationInput {
            name: "Vazia".to_string(),
            platform: Platform::Uber,
            description: None,
            steps: Vec::new(),
            active: None,
        },
    );
    assert!(matches!(empty, Err(AutomationError::InvalidSteps(_))));

    let paused = automations
        .create(
            &partner_id,
            AutomationInput {
                name: "Pausada".to_string(),
                platform: Platform::ViaVerde,
                description: None,
                steps: vec![step(
                    "Abrir",
                    StepAction::Navegar {
                        url: "https://www.viaverde.pt".to_string(),
                    },
                )],
                active: Some(false),
            },
        )
        .expect("created");
    assert!(matches!(
        automations.start(&partner_id, &paused.id, None),
        Err(AutomationError::Inactive(_))
    ));
    assert!(matches!(
        automations.get("another-partner", &paused.id),
        Err(AutomationError::NotFound(_))
    ));

    automations.delete(&partner_id, &paused.id).expect("deleted");
    assert!(automations.list(&partner_id).expect("list").is_empty());
}

#[tokio::test]
async fn uber_sync_downloads_parses_and_imports_the_report() {
    let uber_csv = "UUID do motorista;Nome próprio do motorista;Apelido do motorista;Pago a si : Os seus ganhos;Taxa de serviço;Viagens\n\
                    uuid-ana;Ana;Costa;600,00;-150,00;30\n\
                    uuid-rui;Rui;Sousa;120,00;-30,00;8\n";
    let browser = FakeBrowser::with(BrowserScript {
        downloads: HashMap::from([(
            "[data-testid='download-report']".to_string(),
            uber_csv.as_bytes().to_vec(),
        )]),
        ..Default::default()
    });

    let stores = FleetStores::in_memory();
    let fleet = FleetService::new(stores.clone());
    let partner_id = partner(&fleet);
    uber_credentials(&fleet, &partner_id);
    fleet
        .register_driver(
            &partner_id,
            NewDriver {
                name: "Ana Costa".to_string(),
                nif: "123456789".to_string(),
                email: "ana@example.pt".to_string(),
                phone: None,
                licence_number: "P-1".to_string(),
                licence_expiry: NaiveDate::from_ymd_opt(2030, 1, 1).expect("date"),
                tvde_certificate_expiry: None,
                iban: None,
                uber_uuid: Some("uuid-ana".to_string()),
                bolt_id: None,
            },
        )
        .expect("driver");

    let storage_root = tempfile::tempdir().expect("tempdir");
    let storage = StorageRouter::new(&tvde_fleet::config::StorageConfig {
        local_root: storage_root.path().to_path_buf(),
    });
    let ledger = LedgerStore::default();
    let imports = ImportService::new(stores, ledger.clone(), storage.clone());
    let sync = SyncService::new(fleet.clone(), imports.clone(), executor(&browser), storage);

    let period = Period::week_of(NaiveDate::from_ymd_opt(2025, 3, 10).expect("date"));
    let prepared = sync
        .prepare(&partner_id, Platform::Uber, period)
        .expect("prepared");
    assert!(prepared.execution_id().is_some());
    assert_eq!(prepared.log().mode, IntegrationMode::Rpa);

    let outcome = sync.run(prepared).await;
    let summary = outcome.summary.expect("imported");
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.unmatched, 1);
    assert_eq!(outcome.sync_log.status, SyncStatus::Sucesso);
    assert_eq!(ledger.list(&partner_id).expect("ledger").len(), 1);

    let actions = browser.actions();
    assert!(actions.contains(&"fill #PHONE_NUMBER_or_EMAIL_ADDRESS=frota@example.pt".to_string()));
    assert!(actions.iter().any(|action| action
        .starts_with("goto https://supplier.uber.com/orgs/reports?type=payments_driver&start=2025-03-10&end=2025-03-16")));

    let credentials = fleet
        .credentials(&partner_id, Platform::Uber)
        .expect("credentials")
        .expect("stored");
    assert!(credentials.last_sync_at.is_some());
}

#[tokio::test]
async fn failed_rpa_sync_marks_the_log_as_error() {
    let browser = FakeBrowser::with(BrowserScript {
        missing: HashSet::from(["#forward-button".to_string()]),
        ..Default::default()
    });
    let stores = FleetStores::in_memory();
    let fleet = FleetService::new(stores.clone());
    let partner_id = partner(&fleet);
    uber_credentials(&fleet, &partner_id);
    let storage = StorageRouter::new(&tvde_fleet::config::StorageConfig {
        local_root: std::env::temp_dir().join("tvde-fleet-sync-failure"),
    });
    let imports = ImportService::new(stores, LedgerStore::default(), storage.clone());
    let sync = SyncService::new(fleet, imports.clone(), executor(&browser), storage);

    let period = Period::week_of(NaiveDate::from_ymd_opt(2025, 3, 10).expect("date"));
    let outcome = sync
        .sync(&partner_id, Platform::Uber, period)
        .await
        .expect("sync ran");

    assert!(outcome.summary.is_none());
    assert_eq!(outcome.sync_log.status, SyncStatus::Erro);
    let logs = imports.sync_logs(&partner_id).expect("logs");
    assert_eq!(logs[0].status, SyncStatus::Erro);
    assert!(logs[0]
        .message
        .as_deref()
        .is_some_and(|error| error.contains("#forward-button")));
}
