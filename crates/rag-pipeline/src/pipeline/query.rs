//! Question answering: cache first, then Chunk -> Embed -> VectorSearch -> Generate

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::PipelineFailure;
use crate::cache::{cache_key, normalize_text};
use crate::decode::neighbor_text;
use crate::error::Error;
use crate::providers::{AnswerCache, Chunker, ChunkInput, Embedder, Generator, VectorIndex};
use crate::retry::RetryPolicy;
use crate::types::query::QueryAnswer;
use crate::types::stage::{Stage, StageError};

/// Cache-first question answering with best-effort ranking
pub struct QueryPipeline {
    cache: Option<Arc<dyn AnswerCache>>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    retry: RetryPolicy,
    neighbor_count: usize,
    cache_ttl: Duration,
}

impl QueryPipeline {
    pub fn new(
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache: None,
            chunker,
            embedder,
            index,
            generator,
            retry,
            neighbor_count: 10,
            cache_ttl: Duration::from_secs(3600),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn AnswerCache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    pub fn with_neighbor_count(mut self, neighbor_count: usize) -> Self {
        self.neighbor_count = neighbor_count.max(1);
        self
    }

    /// Answer one question
    ///
    /// Cache lookup, vector search and cache write are best-effort: their
    /// failures are reported in `errors` and the run continues. Chunk, embed
    /// and generate failures end the run.
    pub async fn ask(&self, question: &str) -> Result<QueryAnswer, PipelineFailure> {
        let question = normalize_text(question);
        if question.is_empty() {
            let err = Error::invalid_input("question must not be empty");
            return Err(PipelineFailure::new(StageError::decode(&err), Vec::new()));
        }

        let mut errors = Vec::new();
        let key = cache_key(&question);

        if let Some(cache) = &self.cache {
            match self.retry.run("cache_lookup", || cache.get(&key)).await {
                Ok(Some(cached)) => {
                    tracing::info!("Answer served from cache ({})", cache.name());
                    return Ok(QueryAnswer {
                        found: true,
                        question,
                        answer: cached_answer(&cached),
                        contexts_count: 0,
                        errors,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Cache lookup failed, continuing: {}", e);
                    errors.push(StageError::query(Stage::CacheLookup, &e));
                }
            }
        }

        let chunks = match self
            .retry
            .run("chunk", || self.chunker.chunk(ChunkInput::Text(&question)))
            .await
        {
            Ok(chunks) if !chunks.is_empty() => chunks,
            Ok(_) => {
                let e = Error::malformed("chunk", "Chunk service returned empty");
                return Err(fatal(Stage::Chunk, &e, errors));
            }
            Err(e) => return Err(fatal(Stage::Chunk, &e, errors)),
        };

        let embeddings = match self.retry.run("embed", || self.embedder.embed(&chunks)).await {
            Ok(vectors) => vectors,
            Err(e) => return Err(fatal(Stage::Embed, &e, errors)),
        };
        let search_vector = match embeddings.first() {
            Some(v) if !v.is_empty() => v,
            _ => {
                let e = Error::malformed("embedding", "No embeddings returned");
                return Err(fatal(Stage::Embed, &e, errors));
            }
        };

        let contexts: Vec<String> = match self
            .retry
            .run("vector_search", || {
                self.index.search(search_vector, self.neighbor_count)
            })
            .await
        {
            Ok(neighbors) => neighbors
                .iter()
                .take(self.neighbor_count)
                .map(|n| neighbor_text(&n.raw))
                .collect(),
            Err(e) => {
                tracing::warn!("Vector search failed, generating without context: {}", e);
                errors.push(StageError::query(Stage::VectorSearch, &e));
                Vec::new()
            }
        };
        tracing::info!("Assembled {} contexts", contexts.len());

        let answer = match self
            .retry
            .run("generate", || self.generator.generate(&question, &contexts))
            .await
        {
            Ok(answer) => answer,
            Err(e) => return Err(fatal(Stage::Generate, &e, errors)),
        };

        if let Some(cache) = &self.cache {
            let write = match serde_json::to_string(&answer) {
                Ok(serialized) => {
                    self.retry
                        .run("cache_write", || cache.set(&key, &serialized, self.cache_ttl))
                        .await
                }
                Err(e) => Err(e.into()),
            };
            if let Err(e) = write {
                tracing::warn!("Cache write failed: {}", e);
                errors.push(StageError::query(Stage::CacheWrite, &e));
            }
        }

        Ok(QueryAnswer {
            found: false,
            question,
            answer,
            contexts_count: contexts.len(),
            errors,
        })
    }
}

/// Cached values are JSON-encoded answers; anything else is returned verbatim
fn cached_answer(cached: &str) -> String {
    match serde_json::from_str::<Value>(cached) {
        Ok(Value::String(answer)) => answer,
        Ok(other) => other.to_string(),
        Err(_) => cached.to_string(),
    }
}

fn fatal(stage: Stage, error: &Error, errors: Vec<StageError>) -> PipelineFailure {
    tracing::error!("{} stage failed: {}", stage, error);
    PipelineFailure::new(StageError::query(stage, error), errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_answer_decoding() {
        assert_eq!(cached_answer("\"hello\""), "hello");
        assert_eq!(cached_answer("not json"), "not json");
        assert_eq!(cached_answer("{\"a\":1}"), "{\"a\":1}");
    }
}
