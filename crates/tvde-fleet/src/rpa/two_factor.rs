use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TwoFactorError {
    #[error("no verification code received within {0} ms")]
    Timeout(u64),
    #[error("verification code wait was abandoned")]
    Abandoned,
}

/// What happened to a submitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A step was waiting and received it.
    Delivered,
    /// Kept until the execution asks for it.
    Queued,
    /// The execution is finished or unknown; the code was dropped.
    Closed,
}

#[derive(Default)]
struct Slots {
    /// Executions that may still ask for a code.
    open: HashSet<String>,
    waiting: HashMap<String, oneshot::Sender<String>>,
    /// Codes submitted before the step asked for them.
    early: HashMap<String, String>,
}

/// Hands verification codes submitted through the API to the execution waiting for them.
#[derive(Default)]
pub struct TwoFactorInbox {
    slots: Mutex<Slots>,
}

impl TwoFactorInbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        // A poisoned inbox only holds short-lived codes; keep serving it.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Accepts codes for `execution_id` until [`Self::forget`] is called.
    pub fn open(&self, execution_id: &str) {
        self.slots().open.insert(execution_id.to_string());
    }

    pub async fn wait(&self, execution_id: &str, timeout: Duration) -> Result<String, TwoFactorError> {
        let receiver = {
            let mut slots = self.slots();
            slots.open.insert(execution_id.to_string());
            if let Some(code) = slots.early.remove(execution_id) {
                return Ok(code);
            }
            let (sender, receiver) = oneshot::channel();
            slots.waiting.insert(execution_id.to_string(), sender);
            receiver
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(_)) => Err(TwoFactorError::Abandoned),
            Err(_) => {
                self.slots().waiting.remove(execution_id);
                Err(TwoFactorError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Delivery check and storage happen under one lock, so a code can never be
    /// queued for an execution that [`Self::forget`] already closed.
    pub fn submit(&self, execution_id: &str, code: &str) -> Delivery {
        let code = code.trim().to_string();
        let mut slots = self.slots();
        if !slots.open.contains(execution_id) {
            return Delivery::Closed;
        }
        let code = match slots.waiting.remove(execution_id) {
            Some(sender) => match sender.send(code) {
                Ok(()) => return Delivery::Delivered,
                Err(code) => code,
            },
            None => code,
        };
        slots.early.insert(execution_id.to_string(), code);
        Delivery::Queued
    }

    pub fn is_waiting(&self, execution_id: &str) -> bool {
        self.slots().waiting.contains_key(execution_id)
    }

    /// Closes a finished execution and drops anything left for it.
    pub fn forget(&self, execution_id: &str) {
        let mut slots = self.slots();
        slots.open.remove(execution_id);
        slots.waiting.remove(execution_id);
        slots.early.remove(execution_id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn delivers_a_code_to_the_waiting_execution() {
        let inbox = Arc::new(TwoFactorInbox::new());
        let waiter = {
            let inbox = inbox.clone();
            tokio::spawn(async move { inbox.wait("exec-1", Duration::from_secs(5)).await })
        };
        while !inbox.is_waiting("exec-1") {
            tokio::task::yield_now().await;
        }
        assert_eq!(inbox.submit("exec-1", " 123456 "), Delivery::Delivered);
        let code = waiter.await.expect("join").expect("code");
        assert_eq!(code, "123456");
    }

    #[tokio::test]
    async fn early_codes_are_kept_until_asked_for() {
        let inbox = TwoFactorInbox::new();
        inbox.open("exec-2");
        assert_eq!(inbox.submit("exec-2", "654321"), Delivery::Queued);
        let code = inbox
            .wait("exec-2", Duration::from_millis(10))
            .await
            .expect("code");
        assert_eq!(code, "654321");
    }

    #[tokio::test]
    async fn waiting_times_out() {
        let inbox = TwoFactorInbox::new();
        let result = inbox.wait("exec-3", Duration::from_millis(20)).await;
        assert_eq!(result, Err(TwoFactorError::Timeout(20)));
        assert!(!inbox.is_waiting("exec-3"));
    }

    #[tokio::test]
    async fn codes_for_closed_executions_are_dropped() {
        let inbox = TwoFactorInbox::new();
        assert_eq!(inbox.submit("unknown", "111111"), Delivery::Closed);

        inbox.open("exec-4");
        inbox.forget("exec-4");
        assert_eq!(inbox.submit("exec-4", "222222"), Delivery::Closed);
        assert!(inbox.slots().early.is_empty());
        assert!(inbox.slots().open.is_empty());
    }
}
