//! Configuration for the pipeline service
//!
//! Values come from (lowest to highest precedence) the built-in defaults, an
//! optional TOML file named by `RAG_PIPELINE_CONFIG`, and the deployment
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming a TOML config file
pub const CONFIG_PATH_ENV: &str = "RAG_PIPELINE_CONFIG";

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Retry policy for every remote call
    pub retry: RetryConfig,
    /// Collaborator endpoints and credentials
    pub endpoints: EndpointConfig,
    /// LLM generation parameters
    pub llm: LlmConfig,
    /// Query pipeline settings
    pub query: QueryConfig,
    /// Answer cache settings
    pub cache: CacheConfig,
    /// Subscription worker settings
    pub subscription: SubscriptionConfig,
    /// Downloaded object handling
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per remote call, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each later attempt
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

/// Collaborator endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL of the chunk service (`/chunk` is appended)
    pub chunk_url: Option<String>,
    /// Full URL of the embedding `predict` endpoint
    pub embedding_endpoint: Option<String>,
    /// Full URL of the vector index `findNeighbors` endpoint
    pub vector_search_endpoint: Option<String>,
    /// Full URL of the vector index `upsertDatapoints` endpoint
    pub vector_store_endpoint: Option<String>,
    /// Deployed index identifier sent with neighbor searches
    pub deployed_index_id: Option<String>,
    /// Full URL of the LLM endpoint; derived from project/region/model when absent
    pub llm_endpoint: Option<String>,
    /// Object storage API base URL
    pub storage_base_url: String,
    /// Pub/Sub API base URL
    pub pubsub_base_url: String,
    /// Cloud project identifier
    pub project_id: Option<String>,
    /// Cloud region
    pub region: String,
    /// Bearer token attached to collaborator requests
    pub access_token: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            chunk_url: None,
            embedding_endpoint: None,
            vector_search_endpoint: None,
            vector_store_endpoint: None,
            deployed_index_id: None,
            llm_endpoint: None,
            storage_base_url: "https://storage.googleapis.com".to_string(),
            pubsub_base_url: "https://pubsub.googleapis.com".to_string(),
            project_id: None,
            region: "us-central1".to_string(),
            access_token: None,
            request_timeout_secs: 30,
        }
    }
}

impl EndpointConfig {
    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier used to derive the endpoint
    pub model_id: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum output tokens
    pub max_output_tokens: u32,
    /// Nucleus sampling
    pub top_p: f32,
    /// Use the streaming endpoint and collect the whole answer
    pub stream: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model_id: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            max_output_tokens: 2048,
            top_p: 0.9,
            stream: false,
        }
    }
}

/// Query pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of neighbors requested and used as context
    pub neighbor_count: usize,
    /// Chunk size sent to the chunk service
    pub chunk_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            neighbor_count: 10,
            chunk_size: 500,
        }
    }
}

/// Answer cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the answer cache
    pub enabled: bool,
    /// Entry time-to-live in seconds (0 disables expiry)
    pub ttl_secs: u64,
    /// Maximum number of cached answers (in-process cache)
    pub max_entries: usize,
    /// Redis host; when set, answers are cached in Redis instead of in-process
    pub redis_host: Option<String>,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub redis_db: i64,
    /// Redis connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl CacheConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_entries: 1000,
            redis_host: None,
            redis_port: 6379,
            redis_password: None,
            redis_db: 0,
            connect_timeout_ms: 5000,
        }
    }
}

/// Subscription worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Full subscription path, `projects/<p>/subscriptions/<s>`
    pub subscription: Option<String>,
    /// Start the worker when the server boots
    pub auto_start: bool,
    /// Upper bound on waiting for the worker task during stop
    pub join_timeout_ms: u64,
    /// Pause between empty pulls
    pub idle_poll_ms: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            subscription: None,
            auto_start: false,
            join_timeout_ms: 5000,
            idle_poll_ms: 500,
        }
    }
}

/// Downloaded object handling
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Parent directory for download temp dirs (system temp when unset)
    pub download_dir: Option<PathBuf>,
    /// Read objects from `<local_root>/<bucket>/<name>` instead of object storage
    pub local_root: Option<PathBuf>,
}

impl PipelineConfig {
    /// Load from the file named by `RAG_PIPELINE_CONFIG` (if any), then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// Parse a TOML config file
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path, e)))?;
        Self::from_toml(&raw)
    }

    /// Parse TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::config(format!("invalid config: {}", e)))
    }

    /// Apply the deployment environment variables on top of this config
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (used with the process environment)
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CHUNK_URL") {
            self.endpoints.chunk_url = Some(v);
        }
        if let Some(v) = get("EMBEDDING_ENDPOINT") {
            self.endpoints.embedding_endpoint = Some(v);
        }
        if let Some(v) = get("VECTOR_DB_ENDPOINT") {
            self.endpoints.vector_search_endpoint = Some(v);
        }
        if let Some(v) = get("VECTOR_STORE_ENDPOINT") {
            self.endpoints.vector_store_endpoint = Some(v);
        }
        if let Some(v) = get("DEPLOYED_INDEX_ID") {
            self.endpoints.deployed_index_id = Some(v);
        }
        if let Some(v) = get("LLM_ENDPOINT") {
            self.endpoints.llm_endpoint = Some(v);
        }
        if let Some(v) = get("PROJECT_ID") {
            self.endpoints.project_id = Some(v);
        }
        if let Some(v) = get("REGION") {
            self.endpoints.region = v;
        }
        if let Some(v) = get("ACCESS_TOKEN") {
            self.endpoints.access_token = Some(v);
        }
        if let Some(v) = get("REQUEST_TIMEOUT").and_then(|v| parse_seconds(&v)) {
            self.endpoints.request_timeout_secs = v.as_secs().max(1);
        }

        if let Some(v) = get("LLM_MODEL_ID") {
            self.llm.model_id = v;
        }
        if let Some(v) = get("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.llm.temperature = v;
        }
        if let Some(v) = get("LLM_MAX_OUTPUT_TOKENS").and_then(|v| v.parse().ok()) {
            self.llm.max_output_tokens = v;
        }
        if let Some(v) = get("LLM_TOP_P").and_then(|v| v.parse().ok()) {
            self.llm.top_p = v;
        }
        if let Some(v) = get("LLM_STREAM") {
            self.llm.stream = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Some(v) = get("VECTOR_NEIGHBOR_COUNT").and_then(|v| v.parse().ok()) {
            self.query.neighbor_count = v;
        }
        if let Some(v) = get("MAX_RETRIES").and_then(|v| v.parse::<u32>().ok()) {
            self.retry.max_attempts = v.max(1);
        }
        // BACKOFF_BASE is expressed in seconds, e.g. "0.2"
        if let Some(v) = get("BACKOFF_BASE").and_then(|v| parse_seconds(&v)) {
            self.retry.base_delay_ms = (v.as_millis() as u64).max(1);
        }
        if let Some(v) = get("REDIS_TTL").and_then(|v| v.parse().ok()) {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = get("MEMORY_STORE_HOST") {
            self.cache.redis_host = Some(v);
        }
        if let Some(v) = get("MEMORY_STORE_PORT").and_then(|v| v.parse().ok()) {
            self.cache.redis_port = v;
        }
        if let Some(v) = get("MEMORY_STORE_PASSWORD") {
            self.cache.redis_password = Some(v);
        }
        if let Some(v) = get("REDIS_DB").and_then(|v| v.parse().ok()) {
            self.cache.redis_db = v;
        }
        if let Some(v) = get("REDIS_CONNECT_TIMEOUT").and_then(|v| parse_seconds(&v)) {
            self.cache.connect_timeout_ms = (v.as_millis() as u64).max(1);
        }
        if let Some(v) = get("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = v;
        }
        if let Some(v) = get("PUBSUB_SUBSCRIPTION") {
            self.subscription.subscription = Some(v);
        }

        self
    }

    /// LLM endpoint, derived from project, region and model when not set explicitly
    pub fn llm_endpoint(&self) -> Option<String> {
        if let Some(endpoint) = &self.endpoints.llm_endpoint {
            return Some(endpoint.clone());
        }
        let project = self.endpoints.project_id.as_ref()?;
        let region = &self.endpoints.region;
        let method = if self.llm.stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        Some(format!(
            "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/google/models/{}:{method}",
            self.llm.model_id
        ))
    }

    /// Human-readable list of missing settings, reported by the health route
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let ep = &self.endpoints;
        if ep.chunk_url.is_none() {
            problems.push("CHUNK_URL not configured".to_string());
        }
        if ep.embedding_endpoint.is_none() {
            problems.push("EMBEDDING_ENDPOINT not configured".to_string());
        }
        if ep.vector_search_endpoint.is_none() {
            problems.push("VECTOR_DB_ENDPOINT not configured".to_string());
        }
        if ep.vector_store_endpoint.is_none() {
            problems.push("VECTOR_STORE_ENDPOINT not configured".to_string());
        }
        if self.llm_endpoint().is_none() {
            problems.push("LLM_ENDPOINT or PROJECT_ID not configured".to_string());
        }
        if self.subscription.auto_start && self.subscription.subscription.is_none() {
            problems.push("PUBSUB_SUBSCRIPTION not configured".to_string());
        }
        problems
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}
