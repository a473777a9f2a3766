//! Outbound mail seam.
//!
//! Raw token secrets leave the process only through a `Mailer`. The
//! in-memory outbox keeps messages for development and tests.

use std::sync::Mutex;

use async_trait::async_trait;
use folio_core::{FolioResult, StorageError, TokenPurpose};
use secrecy::{ExposeSecret, SecretString};

/// One message carrying a single-use token.
pub struct TokenMessage {
    pub to: String,
    pub purpose: TokenPurpose,
    pub secret: SecretString,
}

impl std::fmt::Debug for TokenMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenMessage")
            .field("purpose", &self.purpose)
            .field("secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_token(&self, message: TokenMessage) -> FolioResult<()>;
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<TokenMessage>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Secret of the most recent message of `purpose` sent to `to`.
    pub fn latest_secret(&self, to: &str, purpose: TokenPurpose) -> Option<String> {
        let sent = self.sent.lock().ok()?;
        sent.iter()
            .rev()
            .find(|m| m.to == to && m.purpose == purpose)
            .map(|m| m.secret.expose_secret().to_string())
    }

    /// Number of messages sent to `to`.
    pub fn count_for(&self, to: &str) -> usize {
        self.sent
            .lock()
            .map(|sent| sent.iter().filter(|m| m.to == to).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send_token(&self, message: TokenMessage) -> FolioResult<()> {
        tracing::debug!(purpose = %message.purpose, "Queued token message");
        self.sent
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outbox_keeps_latest_secret() {
        let outbox = OutboxMailer::new();
        for secret in ["first", "second"] {
            outbox
                .send_token(TokenMessage {
                    to: "a@example.com".to_string(),
                    purpose: TokenPurpose::ResetPassword,
                    secret: SecretString::from(secret.to_string()),
                })
                .await
                .unwrap();
        }
        assert_eq!(outbox.len(), 2);
        assert_eq!(
            outbox.latest_secret("a@example.com", TokenPurpose::ResetPassword),
            Some("second".to_string())
        );
        assert!(outbox
            .latest_secret("a@example.com", TokenPurpose::VerifyEmail)
            .is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let message = TokenMessage {
            to: "a@example.com".to_string(),
            purpose: TokenPurpose::VerifyEmail,
            secret: SecretString::from("hunter2".to_string()),
        };
        assert!(!format!("{:?}", message).contains("hunter2"));
    }
}
