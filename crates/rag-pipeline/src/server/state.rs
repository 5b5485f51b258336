//! Application state for the pipeline server

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{MemoryAnswerCache, RedisAnswerCache};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::{IngestionPipeline, QueryPipeline};
use crate::processing::{InMemoryJobStore, JobRunner, JobStore, SubscriptionWorker, WorkerSettings};
use crate::providers::http::{
    GcsObjectFetcher, GeminiGenerator, HttpChunker, HttpClient, PubSubSource, VertexEmbedder,
    VertexVectorIndex,
};
use crate::providers::local::LocalObjectFetcher;
use crate::providers::{
    AnswerCache, Chunker, Embedder, Generator, ObjectFetcher, SubscriptionSource, VectorIndex,
};
use crate::retry::RetryPolicy;

/// Collaborators the pipelines are assembled from
pub struct Collaborators {
    pub fetcher: Arc<dyn ObjectFetcher>,
    pub chunker: Arc<dyn Chunker>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub generator: Arc<dyn Generator>,
    pub cache: Option<Arc<dyn AnswerCache>>,
    pub subscription: Option<Arc<dyn SubscriptionSource>>,
    pub job_store: Arc<dyn JobStore>,
}

impl Collaborators {
    /// REST collaborators built from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let http = HttpClient::new(&config.endpoints)?;

        let fetcher: Arc<dyn ObjectFetcher> = match &config.storage.local_root {
            Some(root) => {
                tracing::info!("Reading objects from local directory {}", root.display());
                Arc::new(LocalObjectFetcher::new(root.clone()))
            }
            None => Arc::new(GcsObjectFetcher::new(http.clone(), config)),
        };

        let cache: Option<Arc<dyn AnswerCache>> = match &config.cache {
            c if !c.enabled => None,
            c if c.redis_host.is_some() => {
                let redis = RedisAnswerCache::new(c)?;
                tracing::info!("Caching answers in Redis at {}", redis.address());
                Some(Arc::new(redis))
            }
            c => Some(Arc::new(MemoryAnswerCache::new(c.max_entries))),
        };

        Ok(Self {
            fetcher,
            chunker: Arc::new(HttpChunker::new(http.clone(), config)),
            embedder: Arc::new(VertexEmbedder::new(http.clone(), config)),
            index: Arc::new(VertexVectorIndex::new(http.clone(), config)),
            generator: Arc::new(GeminiGenerator::new(http.clone(), config)),
            cache,
            subscription: Some(Arc::new(PubSubSource::new(http, config))),
            job_store: Arc::new(InMemoryJobStore::new()),
        })
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: PipelineConfig,
    /// Job records for asynchronous submissions
    job_store: Arc<dyn JobStore>,
    /// Background job submission
    runner: JobRunner,
    /// Synchronous ingestion (push route)
    ingestion: Arc<IngestionPipeline>,
    /// Question answering
    query: Arc<QueryPipeline>,
    /// Answer cache, pinged by the health route
    cache: Option<Arc<dyn AnswerCache>>,
    /// Pull subscription worker, when a subscription source is configured
    worker: Option<SubscriptionWorker>,
}

impl AppState {
    /// Build state with REST collaborators
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::from_parts(config, collaborators))
    }

    /// Build state from explicit collaborators
    pub fn from_parts(config: PipelineConfig, parts: Collaborators) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);

        let ingestion = Arc::new(IngestionPipeline::new(
            parts.fetcher,
            Arc::clone(&parts.chunker),
            Arc::clone(&parts.embedder),
            Arc::clone(&parts.index),
            retry,
        ));

        let mut query = QueryPipeline::new(
            parts.chunker,
            parts.embedder,
            parts.index,
            parts.generator,
            retry,
        )
        .with_neighbor_count(config.query.neighbor_count);
        if let Some(cache) = &parts.cache {
            query = query.with_cache(Arc::clone(cache), Duration::from_secs(config.cache.ttl_secs));
        }

        let runner = JobRunner::new(Arc::clone(&parts.job_store), Arc::clone(&ingestion));
        let worker = parts.subscription.map(|source| {
            SubscriptionWorker::new(
                source,
                Arc::clone(&ingestion),
                WorkerSettings::from_config(&config),
            )
        });

        Self {
            inner: Arc::new(AppStateInner {
                config,
                job_store: parts.job_store,
                runner,
                ingestion,
                query: Arc::new(query),
                cache: parts.cache,
                worker,
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn job_store(&self) -> &Arc<dyn JobStore> {
        &self.inner.job_store
    }

    pub fn runner(&self) -> &JobRunner {
        &self.inner.runner
    }

    pub fn ingestion(&self) -> &IngestionPipeline {
        &self.inner.ingestion
    }

    pub fn query(&self) -> &QueryPipeline {
        &self.inner.query
    }

    pub fn worker(&self) -> Option<&SubscriptionWorker> {
        self.inner.worker.as_ref()
    }

    /// Problems reported by the health route
    pub async fn problems(&self) -> Vec<String> {
        let mut problems = self.inner.config.problems();
        if let Some(cache) = &self.inner.cache {
            if let Err(e) = cache.ping().await {
                tracing::warn!("Answer cache {} unreachable: {}", cache.name(), e);
                problems.push(format!("{} cache error: {}", cache.name(), e.root()));
            }
        }
        if let Some(worker) = self.worker() {
            if !worker.is_running() {
                if let Some(reason) = worker.last_crash() {
                    problems.push(format!("subscription worker stopped: {}", reason));
                }
            }
        }
        problems
    }
}
