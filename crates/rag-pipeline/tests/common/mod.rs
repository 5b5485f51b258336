//! Stub collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rag_pipeline::config::PipelineConfig;
use rag_pipeline::error::{Error, Result};
use rag_pipeline::pipeline::{IngestionPipeline, QueryPipeline};
use rag_pipeline::processing::{InMemoryJobStore, JobStore, WorkerSettings};
use rag_pipeline::providers::{
    AnswerCache, ChunkInput, Chunker, DownloadedObject, Embedder, Generator, Neighbor,
    ObjectFetcher, ReceivedMessage, StoreAck, Subscription, SubscriptionSource, VectorIndex,
};
use rag_pipeline::retry::RetryPolicy;
use rag_pipeline::server::state::{AppState, Collaborators};

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

pub fn fast_worker_settings() -> WorkerSettings {
    WorkerSettings {
        join_timeout: Duration::from_millis(500),
        idle_poll: Duration::from_millis(5),
        retry: fast_retry(),
    }
}

/// How a stub call should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Retryable remote failure
    Transient,
    /// Non-retryable bad input
    Rejected,
}

impl Fault {
    fn error(self, service: &str) -> Error {
        match self {
            Fault::Transient => Error::remote(service, "service unavailable"),
            Fault::Rejected => Error::invalid_input(format!("{} rejected the request", service)),
        }
    }
}

fn check(fault: &Mutex<Option<Fault>>, service: &str) -> Result<()> {
    match *fault.lock() {
        Some(f) => Err(f.error(service)),
        None => Ok(()),
    }
}

// ============================================================================
// Pipeline collaborators
// ============================================================================

#[derive(Default)]
pub struct StubFetcher {
    pub calls: AtomicUsize,
    pub fault: Mutex<Option<Fault>>,
}

#[async_trait]
impl ObjectFetcher for StubFetcher {
    async fn fetch(&self, _bucket: &str, name: &str) -> Result<DownloadedObject> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        check(&self.fault, "storage")?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("object");
        std::fs::write(&path, "downloaded contents")?;
        Ok(DownloadedObject::temporary(dir, path, name))
    }

    fn name(&self) -> &str {
        "stub-storage"
    }
}

pub struct StubChunker {
    pub calls: AtomicUsize,
    pub fault: Mutex<Option<Fault>>,
    /// Fixed chunks; `None` splits text inputs on whitespace
    pub chunks: Mutex<Option<Vec<String>>>,
    pub seen_files: Mutex<Vec<String>>,
    /// Sleep this long before answering
    pub delay: Mutex<Option<Duration>>,
}

impl Default for StubChunker {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fault: Mutex::new(None),
            chunks: Mutex::new(None),
            seen_files: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Chunker for StubChunker {
    async fn chunk(&self, input: ChunkInput<'_>) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        check(&self.fault, "chunk")?;
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(chunks) = self.chunks.lock().clone() {
            return Ok(chunks);
        }
        Ok(match input {
            ChunkInput::Text(text) => vec![text.to_string()],
            ChunkInput::File { filename, .. } => {
                self.seen_files.lock().push(filename.to_string());
                vec![format!("contents of {}", filename)]
            }
        })
    }

    fn name(&self) -> &str {
        "stub-chunker"
    }
}

#[derive(Default)]
pub struct StubEmbedder {
    pub calls: AtomicUsize,
    pub fault: Mutex<Option<Fault>>,
    /// Fail this many calls with a transient error before succeeding
    pub flaky: AtomicUsize,
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        check(&self.fault, "embedding")?;
        if self
            .flaky
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Fault::Transient.error("embedding"));
        }
        Ok(chunks
            .iter()
            .map(|c| vec![c.len() as f32, 1.0, 0.5])
            .collect())
    }

    fn name(&self) -> &str {
        "stub-embedder"
    }
}

#[derive(Default)]
pub struct StubIndex {
    pub store_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub store_fault: Mutex<Option<Fault>>,
    pub search_fault: Mutex<Option<Fault>>,
    pub neighbors: Mutex<Vec<String>>,
}

#[async_trait]
impl VectorIndex for StubIndex {
    async fn store(&self, vectors: &[Vec<f32>]) -> Result<StoreAck> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        check(&self.store_fault, "vector_store")?;
        Ok(StoreAck {
            stored: vectors.len(),
            response: json!({}),
        })
    }

    async fn search(&self, _vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        check(&self.search_fault, "vector_search")?;
        Ok(self
            .neighbors
            .lock()
            .iter()
            .take(k)
            .enumerate()
            .map(|(i, text)| Neighbor {
                id: Some(format!("dp-{}", i)),
                distance: Some(0.1 * i as f64),
                raw: json!({ "datapoint": { "text": text } }),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "stub-index"
    }
}

#[derive(Default)]
pub struct StubGenerator {
    pub calls: AtomicUsize,
    pub fault: Mutex<Option<Fault>>,
    pub seen_contexts: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, question: &str, contexts: &[String]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        check(&self.fault, "llm")?;
        self.seen_contexts.lock().push(contexts.to_vec());
        Ok(format!("answer to {} from {} contexts", question, contexts.len()))
    }

    fn name(&self) -> &str {
        "stub-llm"
    }
}

#[derive(Default)]
pub struct StubCache {
    pub entries: Mutex<HashMap<String, String>>,
    pub fault: Mutex<Option<Fault>>,
}

#[async_trait]
impl AnswerCache for StubCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        check(&self.fault, "cache")?;
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _ttl: Duration) -> Result<()> {
        check(&self.fault, "cache")?;
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        check(&self.fault, "cache")
    }

    fn name(&self) -> &str {
        "stub-cache"
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Shared record of what the worker did with each message
#[derive(Default)]
pub struct Broker {
    pub queue: Mutex<VecDeque<ReceivedMessage>>,
    pub acked: Mutex<Vec<String>>,
    pub nacked: Mutex<Vec<String>>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub connect_fault: Mutex<Option<Fault>>,
    pub receive_fault: Mutex<Option<Fault>>,
    /// Panic on the next receive
    pub panic_next: AtomicBool,
}

impl Broker {
    pub fn publish(&self, ack_id: &str, data: Option<String>) {
        self.queue.lock().push_back(ReceivedMessage {
            ack_id: ack_id.to_string(),
            message_id: format!("msg-{}", ack_id),
            data,
            attributes: HashMap::new(),
        });
    }

    pub fn publish_json(&self, ack_id: &str, payload: serde_json::Value) {
        self.publish(ack_id, Some(STANDARD.encode(payload.to_string())));
    }

    pub fn settled(&self) -> usize {
        self.acked.lock().len() + self.nacked.lock().len()
    }
}

pub struct StubSource {
    pub broker: Arc<Broker>,
}

#[async_trait]
impl SubscriptionSource for StubSource {
    async fn connect(&self) -> Result<Box<dyn Subscription>> {
        self.broker.connects.fetch_add(1, Ordering::SeqCst);
        check(&self.broker.connect_fault, "pubsub")?;
        Ok(Box::new(StubSubscription {
            broker: Arc::clone(&self.broker),
        }))
    }

    fn name(&self) -> &str {
        "stub-subscription"
    }
}

struct StubSubscription {
    broker: Arc<Broker>,
}

#[async_trait]
impl Subscription for StubSubscription {
    async fn receive(&self) -> Result<Option<ReceivedMessage>> {
        if self.broker.panic_next.swap(false, Ordering::SeqCst) {
            panic!("subscription stream corrupted");
        }
        check(&self.broker.receive_fault, "pubsub")?;
        Ok(self.broker.queue.lock().pop_front())
    }

    async fn ack(&self, ack_id: &str) -> Result<()> {
        self.broker.acked.lock().push(ack_id.to_string());
        Ok(())
    }

    async fn nack(&self, ack_id: &str) -> Result<()> {
        self.broker.nacked.lock().push(ack_id.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.broker.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// Every stub, kept around so tests can inspect and configure them
#[derive(Clone)]
pub struct Stubs {
    pub fetcher: Arc<StubFetcher>,
    pub chunker: Arc<StubChunker>,
    pub embedder: Arc<StubEmbedder>,
    pub index: Arc<StubIndex>,
    pub generator: Arc<StubGenerator>,
    pub cache: Arc<StubCache>,
    pub broker: Arc<Broker>,
    pub job_store: Arc<InMemoryJobStore>,
}

impl Stubs {
    pub fn new() -> Self {
        Self {
            fetcher: Arc::default(),
            chunker: Arc::default(),
            embedder: Arc::default(),
            index: Arc::default(),
            generator: Arc::default(),
            cache: Arc::default(),
            broker: Arc::default(),
            job_store: Arc::new(InMemoryJobStore::new()),
        }
    }

    pub fn ingestion(&self) -> Arc<IngestionPipeline> {
        Arc::new(IngestionPipeline::new(
            self.fetcher.clone(),
            self.chunker.clone(),
            self.embedder.clone(),
            self.index.clone(),
            fast_retry(),
        ))
    }

    pub fn query(&self) -> QueryPipeline {
        QueryPipeline::new(
            self.chunker.clone(),
            self.embedder.clone(),
            self.index.clone(),
            self.generator.clone(),
            fast_retry(),
        )
    }

    pub fn source(&self) -> Arc<dyn SubscriptionSource> {
        Arc::new(StubSource {
            broker: Arc::clone(&self.broker),
        })
    }

    pub fn collaborators(&self) -> Collaborators {
        let job_store: Arc<dyn JobStore> = self.job_store.clone();
        Collaborators {
            fetcher: self.fetcher.clone(),
            chunker: self.chunker.clone(),
            embedder: self.embedder.clone(),
            index: self.index.clone(),
            generator: self.generator.clone(),
            cache: Some(self.cache.clone()),
            subscription: Some(self.source()),
            job_store,
        }
    }

    pub fn app_state(&self) -> AppState {
        let mut config = PipelineConfig::default();
        config.retry.base_delay_ms = 1;
        config.subscription.join_timeout_ms = 500;
        config.subscription.idle_poll_ms = 5;
        AppState::from_parts(config, self.collaborators())
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
