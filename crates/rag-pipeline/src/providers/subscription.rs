//! Pull subscription traits

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

/// A pulled message awaiting ack or nack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Handle used to ack/nack this delivery
    pub ack_id: String,
    pub message_id: String,
    /// Base64 payload exactly as delivered
    pub data: Option<String>,
    pub attributes: HashMap<String, String>,
}

/// Opens pull connections
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// Acquire a subscription handle; fails when credentials or the
    /// subscription are unavailable
    async fn connect(&self) -> Result<Box<dyn Subscription>>;

    fn name(&self) -> &str;
}

/// An open pull connection, owned by one worker task
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Next message, or `None` when nothing is pending
    async fn receive(&self) -> Result<Option<ReceivedMessage>>;

    async fn ack(&self, ack_id: &str) -> Result<()>;

    /// Make the message immediately available for redelivery
    async fn nack(&self, ack_id: &str) -> Result<()>;

    /// Release the connection
    async fn close(&self);
}
