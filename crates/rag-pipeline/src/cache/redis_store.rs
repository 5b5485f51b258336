//! Redis (Memorystore) answer cache

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::providers::AnswerCache;

/// Answer cache shared across instances through Redis
///
/// The connection is opened on first use, so an unreachable server at boot
/// only degrades health instead of failing startup.
pub struct RedisAnswerCache {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    connect_timeout: Duration,
    address: String,
}

impl RedisAnswerCache {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let host = config
            .redis_host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::config("MEMORY_STORE_HOST not configured"))?;
        let address = format!("{}:{}/{}", host, config.redis_port, config.redis_db);

        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, config.redis_port),
            redis: RedisConnectionInfo {
                db: config.redis_db,
                password: config.redis_password.clone(),
                ..Default::default()
            },
        };
        let client = Client::open(info)
            .map_err(|e| Error::config(format!("invalid Redis settings: {}", e)))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            connect_timeout: config.connect_timeout(),
            address,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let manager = timeout(self.connect_timeout, self.client.get_connection_manager())
                    .await
                    .map_err(|_| {
                        Error::remote(
                            "redis",
                            format!("connect to {} timed out after {:?}", self.address, self.connect_timeout),
                        )
                    })?
                    .map_err(redis_error)?;
                tracing::info!("Connected to Redis at {}", self.address);
                Ok::<_, Error>(manager)
            })
            .await?;
        Ok(connection.clone())
    }
}

fn redis_error(e: redis::RedisError) -> Error {
    Error::remote("redis", e.to_string())
}

#[async_trait]
impl AnswerCache for RedisAnswerCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await.map_err(redis_error)?;
        Ok(value)
    }

    /// `SETEX` with the TTL in seconds; a zero TTL stores without expiry
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let seconds = ttl.as_secs();
        if seconds > 0 {
            let _: () = conn.set_ex(key, value, seconds).await.map_err(redis_error)?;
        } else {
            let _: () = conn.set(key, value).await.map_err(redis_error)?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}
