//! Delivery of verification codes.
//!
//! The core only needs "send this code to this identifier". Concrete SMS and email
//! providers implement [`NotificationGateway`]; two development gateways are
//! provided here.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{error::DeliveryError, identifier::Identifier};

#[async_trait]
pub trait NotificationGateway: Send + Sync + 'static {
    /// Deliver `code` to `identifier` over the identifier's channel.
    async fn send(&self, identifier: &Identifier, code: &str) -> Result<(), DeliveryError>;
}

/// Writes codes to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingGateway;

#[async_trait]
impl NotificationGateway for TracingGateway {
    async fn send(&self, identifier: &Identifier, code: &str) -> Result<(), DeliveryError> {
        tracing::info!(
            channel = %identifier.channel(),
            identifier = identifier.value(),
            code = code,
            "Verification code (not delivered)"
        );
        Ok(())
    }
}

/// A message captured by [`OutboxGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub identifier: Identifier,
    pub code: String,
}

/// Keeps every message in memory so tooling can read it back.
#[derive(Debug, Default)]
pub struct OutboxGateway {
    sent: Mutex<Vec<SentMessage>>,
}

impl OutboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The most recent code sent to `identifier`, if any.
    pub fn last_code_for(&self, identifier: &Identifier) -> Option<String> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|m| &m.identifier == identifier)
            .map(|m| m.code.clone())
    }
}

#[async_trait]
impl NotificationGateway for OutboxGateway {
    async fn send(&self, identifier: &Identifier, code: &str) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                identifier: identifier.clone(),
                code: code.to_string(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outbox_records_messages() {
        let outbox = OutboxGateway::new();
        let phone = Identifier::phone("+15550001").unwrap();
        let email = Identifier::email("user@example.com").unwrap();

        outbox.send(&phone, "111111").await.unwrap();
        outbox.send(&email, "222222").await.unwrap();
        outbox.send(&phone, "333333").await.unwrap();

        assert_eq!(outbox.sent().len(), 3);
        assert_eq!(outbox.last_code_for(&phone), Some("333333".to_string()));
        assert_eq!(outbox.last_code_for(&email), Some("222222".to_string()));
    }

    #[tokio::test]
    async fn test_tracing_gateway_never_fails() {
        let phone = Identifier::phone("+15550001").unwrap();
        assert!(TracingGateway.send(&phone, "123456").await.is_ok());
    }
}
