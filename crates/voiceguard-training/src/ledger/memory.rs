use super::{LedgerClient, LedgerSubmitError};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<String>,
    attempts: u32,
    rejections_left: u32,
}

/// Ledger kept in memory; optionally rejects a number of submissions first.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rejecting_first(rejections: u32) -> Self {
        Self { state: Mutex::new(LedgerState { rejections_left: rejections, ..LedgerState::default() }) }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accepted messages, in submission order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.state().entries.clone()
    }

    /// Every submission seen, accepted or not.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.state().attempts
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn store_metadata(&self, message: &str) -> Result<(), LedgerSubmitError> {
        let mut state = self.state();
        state.attempts += 1;
        if state.rejections_left > 0 {
            state.rejections_left -= 1;
            return Err(LedgerSubmitError::Rejected(format!("attempt {} refused", state.attempts)));
        }
        state.entries.push(message.to_string());
        Ok(())
    }
}
