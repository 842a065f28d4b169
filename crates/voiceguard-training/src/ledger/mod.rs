//! Announcing published checkpoints on the ledger.

pub mod announcer;
pub mod memory;
pub mod rpc;

use crate::publisher::PublicationReference;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub use announcer::{AnnounceError, AnnounceReceipt, LedgerAnnouncer, RetryPolicy};
pub use memory::MemoryLedger;
pub use rpc::RpcLedgerClient;

/// Why a single submission did not land. Retried by the announcer, never surfaced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerSubmitError {
    #[error("ledger rejected submission: {0}")]
    Rejected(String),

    #[error("ledger unreachable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn store_metadata(&self, message: &str) -> Result<(), LedgerSubmitError>;
}

/// The exact string written to the ledger: `"<repository_id> <revision>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerMessage(String);

impl LedgerMessage {
    pub const DELIMITER: char = ' ';

    #[must_use]
    pub fn encode(reference: &PublicationReference) -> Self {
        Self(format!("{}{}{}", reference.repository_id, Self::DELIMITER, reference.revision))
    }

    /// Split a message back into its reference; `None` if it is not two fields.
    #[must_use]
    pub fn decode(message: &str) -> Option<PublicationReference> {
        let (repository_id, revision) = message.split_once(Self::DELIMITER)?;
        if repository_id.is_empty() || revision.is_empty() || revision.contains(Self::DELIMITER) {
            return None;
        }
        Some(PublicationReference { repository_id: repository_id.to_string(), revision: revision.to_string() })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_joins_with_space() {
        let reference = PublicationReference {
            repository_id: "myrepo/model".to_string(),
            revision: "abc123".to_string(),
        };
        let message = LedgerMessage::encode(&reference);
        assert_eq!(message.as_str(), "myrepo/model abc123");
        assert_eq!(LedgerMessage::decode(message.as_str()), Some(reference));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(LedgerMessage::decode("no-delimiter"), None);
        assert_eq!(LedgerMessage::decode(" abc"), None);
        assert_eq!(LedgerMessage::decode("a/b abc def"), None);
    }
}
