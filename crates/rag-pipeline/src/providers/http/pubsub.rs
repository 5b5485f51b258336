//! Pub/Sub REST pull subscription

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::client::{require, HttpClient};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::providers::subscription::{ReceivedMessage, Subscription, SubscriptionSource};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<PulledMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PulledMessage {
    ack_id: String,
    #[serde(default)]
    message: PulledPayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PulledPayload {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: u32,
}

/// Connects to `projects/<p>/subscriptions/<s>` through the REST API
pub struct PubSubSource {
    http: HttpClient,
    base_url: String,
    subscription: Option<String>,
}

impl PubSubSource {
    pub fn new(http: HttpClient, config: &PipelineConfig) -> Self {
        Self {
            http,
            base_url: config.endpoints.pubsub_base_url.trim_end_matches('/').to_string(),
            subscription: config.subscription.subscription.clone(),
        }
    }
}

#[async_trait]
impl SubscriptionSource for PubSubSource {
    async fn connect(&self) -> Result<Box<dyn Subscription>> {
        let subscription = require(&self.subscription, "PUBSUB_SUBSCRIPTION")?;
        let url = format!("{}/v1/{}", self.base_url, subscription);

        // Fails fast on bad credentials or an unknown subscription
        self.http.send("pubsub", self.http.get(&url)).await?;
        tracing::info!("Connected to subscription {}", subscription);

        Ok(Box::new(PubSubSubscription {
            http: self.http.clone(),
            url,
            closed: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &str {
        "pubsub"
    }
}

/// An open pull connection
pub struct PubSubSubscription {
    http: HttpClient,
    url: String,
    closed: AtomicBool,
}

impl PubSubSubscription {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::internal("subscription is closed"));
        }
        Ok(())
    }

    async fn modify(&self, method: &str, body: serde_json::Value) -> Result<()> {
        self.ensure_open()?;
        let url = format!("{}:{}", self.url, method);
        self.http
            .send_json("pubsub", self.http.post(&url).json(&body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Subscription for PubSubSubscription {
    async fn receive(&self) -> Result<Option<ReceivedMessage>> {
        self.ensure_open()?;
        let url = format!("{}:pull", self.url);
        let body = self
            .http
            .send_json(
                "pubsub",
                self.http.post(&url).json(&PullRequest { max_messages: 1 }),
            )
            .await?;

        let pulled: PullResponse = serde_json::from_value(body)
            .map_err(|e| Error::malformed("pubsub", format!("unexpected pull response: {}", e)))?;

        Ok(pulled
            .received_messages
            .into_iter()
            .next()
            .map(|m| ReceivedMessage {
                ack_id: m.ack_id,
                message_id: m.message.message_id,
                data: m.message.data,
                attributes: m.message.attributes,
            }))
    }

    async fn ack(&self, ack_id: &str) -> Result<()> {
        self.modify("acknowledge", json!({ "ackIds": [ack_id] }))
            .await
    }

    async fn nack(&self, ack_id: &str) -> Result<()> {
        self.modify(
            "modifyAckDeadline",
            json!({ "ackIds": [ack_id], "ackDeadlineSeconds": 0 }),
        )
        .await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Closed subscription {}", self.url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_response_shapes() {
        let empty: PullResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.received_messages.is_empty());

        let one: PullResponse = serde_json::from_str(
            r#"{"receivedMessages":[{"ackId":"a1","message":{"data":"e30=","messageId":"m1","publishTime":"2024-01-01T00:00:00Z"}}]}"#,
        )
        .unwrap();
        assert_eq!(one.received_messages[0].ack_id, "a1");
        assert_eq!(one.received_messages[0].message.message_id, "m1");
    }

    #[tokio::test]
    async fn test_connect_requires_subscription() {
        let config = PipelineConfig::default();
        let source = PubSubSource::new(HttpClient::new(&config.endpoints).unwrap(), &config);
        match source.connect().await {
            Err(err) => assert!(err.to_string().contains("PUBSUB_SUBSCRIPTION")),
            Ok(_) => panic!("connect should fail without a subscription"),
        }
    }
}
