use std::sync::Arc;

use axum::extract::FromRef;

use crate::approvals::ApprovalService;
use crate::auth::AuthService;
use crate::commission::StatementService;
use crate::config::AppConfig;
use crate::fleet::{FleetService, FleetStores};
use crate::ingestion::{ImportService, LedgerStore};
use crate::rpa::{AutomationExecutor, AutomationService, BrowserLauncher, SyncService, TwoFactorInbox};
use crate::storage::StorageRouter;
use crate::store::MemoryCollection;

/// Services shared by every route.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub fleet: FleetService,
    pub imports: ImportService,
    pub statements: StatementService,
    pub approvals: ApprovalService,
    pub automations: AutomationService,
    pub sync: SyncService,
}

impl AppState {
    /// Wires every service over in-memory collections.
    pub fn in_memory(config: &AppConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let stores = FleetStores::in_memory();
        let storage = StorageRouter::new(&config.storage);
        let ledger = LedgerStore::new(MemoryCollection::shared());

        let fleet = FleetService::new(stores.clone());
        let imports = ImportService::new(stores, ledger.clone(), storage.clone());
        let statements = StatementService::in_memory(fleet.clone(), ledger);
        let approvals = ApprovalService::in_memory(fleet.clone(), statements.clone());

        let executor = AutomationExecutor::new(
            launcher,
            Arc::new(TwoFactorInbox::new()),
            MemoryCollection::shared(),
            &config.rpa,
        );
        let automations =
            AutomationService::in_memory(executor.clone(), fleet.clone(), storage.clone());
        let sync = SyncService::new(fleet.clone(), imports.clone(), executor, storage);

        Self {
            auth: Arc::new(AuthService::in_memory(&config.auth)),
            fleet,
            imports,
            statements,
            approvals,
            automations,
            sync,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
