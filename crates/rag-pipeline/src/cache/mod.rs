//! Answer cache keys, the in-process cache and the Redis cache

mod key;
mod memory;
mod redis_store;

pub use key::{cache_key, normalize_text};
pub use memory::{CacheStats, MemoryAnswerCache};
pub use redis_store::RedisAnswerCache;
