use super::{LedgerClient, LedgerMessage};
use crate::config::RetrySettings;
use crate::error::TrainingError;
use crate::publisher::PublicationReference;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fixed-interval retry. Unbounded unless `max_attempts` is set; always
/// preemptible through the cancellation token passed to `announce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(12);

    #[must_use]
    pub fn unbounded(interval: Duration) -> Self {
        Self { interval, max_attempts: None }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Self::DEFAULT_INTERVAL)
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self { interval: settings.interval(), max_attempts: settings.max_attempts }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceReceipt {
    pub message: LedgerMessage,
    pub attempts: u32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnnounceError {
    #[error("announcement cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("announcement gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl From<AnnounceError> for TrainingError {
    fn from(err: AnnounceError) -> Self {
        match err {
            AnnounceError::Cancelled { .. } => Self::Cancelled,
            AnnounceError::Exhausted { attempts, last_error } => Self::LedgerExhausted { attempts, last_error },
        }
    }
}

pub struct LedgerAnnouncer {
    client: Arc<dyn LedgerClient>,
    policy: RetryPolicy,
}

impl LedgerAnnouncer {
    #[must_use]
    pub fn new(client: Arc<dyn LedgerClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Submit `reference` until the ledger accepts it.
    ///
    /// Submission failures are logged and retried after `policy.interval`.
    /// Returns only on acceptance, on cancellation, or when a bounded policy
    /// runs out of attempts. Each call submits afresh: announcing the same
    /// reference twice produces two ledger entries.
    pub async fn announce(
        &self,
        reference: &PublicationReference,
        cancel: &CancellationToken,
    ) -> Result<AnnounceReceipt, AnnounceError> {
        let message = LedgerMessage::encode(reference);
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AnnounceError::Cancelled { attempts });
            }
            attempts += 1;

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AnnounceError::Cancelled { attempts }),
                result = self.client.store_metadata(message.as_str()) => result,
            };

            match result {
                Ok(()) => {
                    info!(message = %message, attempts, "Stored model reference on the ledger");
                    return Ok(AnnounceReceipt { message, attempts });
                }
                Err(e) => {
                    warn!(
                        message = %message,
                        attempt = attempts,
                        retry_in = ?self.policy.interval,
                        error = %e,
                        "Ledger submission failed"
                    );
                    if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                        return Err(AnnounceError::Exhausted { attempts, last_error: e.to_string() });
                    }
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AnnounceError::Cancelled { attempts }),
                () = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    fn reference() -> PublicationReference {
        PublicationReference { repository_id: "myrepo/model".to_string(), revision: "abc123".to_string() }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::unbounded(Duration::from_millis(1))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(12));
        assert_eq!(policy.max_attempts, None);
        assert_eq!(RetryPolicy::from(&RetrySettings::default()), policy);
    }

    #[tokio::test]
    async fn test_accepts_on_first_try() {
        let ledger = Arc::new(MemoryLedger::new());
        let announcer = LedgerAnnouncer::new(ledger.clone(), fast());

        let receipt = announcer.announce(&reference(), &CancellationToken::new()).await.unwrap();
        assert_eq!(receipt.attempts, 1);
        assert_eq!(receipt.message.as_str(), "myrepo/model abc123");
        assert_eq!(ledger.entries(), vec!["myrepo/model abc123".to_string()]);
        assert_eq!(ledger.attempts(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_accepted() {
        let ledger = Arc::new(MemoryLedger::rejecting_first(4));
        let announcer = LedgerAnnouncer::new(ledger.clone(), fast());

        let receipt = announcer.announce(&reference(), &CancellationToken::new()).await.unwrap();
        assert_eq!(receipt.attempts, 5);
        assert_eq!(ledger.entries().len(), 1);
        assert_eq!(ledger.attempts(), 5);
    }

    #[tokio::test]
    async fn test_bounded_policy_exhausts() {
        let ledger = Arc::new(MemoryLedger::rejecting_first(10));
        let policy = RetryPolicy { interval: Duration::from_millis(1), max_attempts: Some(3) };
        let announcer = LedgerAnnouncer::new(ledger.clone(), policy);

        let err = announcer.announce(&reference(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AnnounceError::Exhausted { attempts: 3, .. }));
        assert!(ledger.entries().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_preempts_backoff() {
        let ledger = Arc::new(MemoryLedger::rejecting_first(u32::MAX));
        let announcer = LedgerAnnouncer::new(ledger.clone(), RetryPolicy::default());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = announcer.announce(&reference(), &cancel).await.unwrap_err();
        assert_eq!(err, AnnounceError::Cancelled { attempts: 1 });
        assert!(started.elapsed() < Duration::from_secs(12));
        assert!(ledger.entries().is_empty());
    }

    #[tokio::test]
    async fn test_already_cancelled_submits_nothing() {
        let ledger = Arc::new(MemoryLedger::new());
        let announcer = LedgerAnnouncer::new(ledger.clone(), fast());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = announcer.announce(&reference(), &cancel).await.unwrap_err();
        assert_eq!(err, AnnounceError::Cancelled { attempts: 0 });
        assert_eq!(ledger.attempts(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_announcements_are_not_deduplicated() {
        let ledger = Arc::new(MemoryLedger::new());
        let announcer = LedgerAnnouncer::new(ledger.clone(), fast());
        let cancel = CancellationToken::new();

        announcer.announce(&reference(), &cancel).await.unwrap();
        announcer.announce(&reference(), &cancel).await.unwrap();
        assert_eq!(ledger.entries().len(), 2);
    }

    #[test]
    fn test_announce_error_maps_to_training_error() {
        assert!(matches!(TrainingError::from(AnnounceError::Cancelled { attempts: 2 }), TrainingError::Cancelled));
        assert!(matches!(
            TrainingError::from(AnnounceError::Exhausted { attempts: 3, last_error: "x".to_string() }),
            TrainingError::LedgerExhausted { attempts: 3, .. }
        ));
    }
}
