//! Browser automation (RPA): step scripts, their executor and platform sync.
//!
//! A run owns exactly one [`BrowserSession`] obtained from a [`BrowserLauncher`].
//! Steps execute in order; each one leaves a [`StepLog`] on the persisted
//! [`AutomationExecution`]. Screenshots and downloads are archived in the
//! partner's storage under `rpa/<platform>/<execution_id>/`.

pub mod automations;
pub mod browser;
pub mod execution;
pub mod executor;
pub mod router;
pub mod scripts;
pub mod steps;
pub mod sync;
pub mod two_factor;
pub mod variables;
pub mod webdriver;

pub use automations::{
    AutomationDefinition, AutomationError, AutomationInput, AutomationService, PendingRun,
};
pub use browser::{BrowserError, BrowserLauncher, BrowserSession, DownloadedFile};
pub use execution::{
    Artifact, ArtifactKind, AutomationExecution, ExecutionStatus, StepLog, StepState,
};
pub use executor::{AutomationExecutor, ExecutionOutcome, ExecutionRequest};
pub use router::rpa_router;
pub use scripts::VendorScript;
pub use steps::{
    validate_steps, AutomationStep, Condition, Key, StepAction, StepValidationError,
    TwoFactorChannel,
};
pub use sync::{PreparedSync, SyncError, SyncOutcome, SyncService};
pub use two_factor::{Delivery, TwoFactorError, TwoFactorInbox};
pub use variables::{VariableError, Variables};
pub use webdriver::{WebDriverLauncher, WebDriverSession};
