//! Autoscaler signal channel
//!
//! One-way signals to the external autoscaler process over a shared
//! Redis instance: resource requests are published fire-and-forget on a
//! pub/sub channel, and the autoscaler's status/error blobs are read
//! back from plain keys. The transport is a trait so tests and offline
//! commands can use the in-memory variant.

use crate::error::{DroverError, DroverResult};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

/// Channel the autoscaler subscribes to for resource requests
pub const RESOURCE_REQUEST_CHANNEL: &str = "drover:autoscaler:resource_request";

/// Key the autoscaler publishes its status blob under
pub const DEBUG_STATUS_KEY: &str = "drover:autoscaler:status";

/// Key the autoscaler publishes its last error under
pub const DEBUG_ERROR_KEY: &str = "drover:autoscaler:error";

/// Placeholder when the autoscaler has published no status yet
const NO_STATUS: &str = "No cluster status.";

/// Env var naming the shared Redis instance
pub const REDIS_URL_ENV: &str = "DROVER_REDIS_URL";

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Publish/read access to the shared signal store
#[async_trait]
pub trait SignalTransport: Send + Sync {
    /// Publish a message on a pub/sub channel
    async fn publish(&self, channel: &str, message: &str) -> DroverResult<()>;

    /// Read a key, None when absent
    async fn get(&self, key: &str) -> DroverResult<Option<String>>;
}

/// Redis-backed transport with a lazily-opened multiplexed connection
pub struct RedisTransport {
    url: String,
    connection: tokio::sync::Mutex<Option<redis::aio::MultiplexedConnection>>,
}

impl RedisTransport {
    /// Transport against an explicit Redis URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection: tokio::sync::Mutex::new(None),
        }
    }

    /// Transport against `DROVER_REDIS_URL`, or the local default
    pub fn from_env() -> Self {
        let url =
            std::env::var(REDIS_URL_ENV).unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        Self::new(url)
    }

    async fn connection(&self) -> DroverResult<redis::aio::MultiplexedConnection> {
        let mut slot = self.connection.lock().await;
        if let Some(ref conn) = *slot {
            return Ok(conn.clone());
        }

        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| DroverError::Signal(format!("invalid redis url {}: {}", self.url, e)))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| DroverError::Signal(format!("connecting to {}: {}", self.url, e)))?;

        debug!("Connected to signal store at {}", self.url);
        *slot = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl SignalTransport for RedisTransport {
    async fn publish(&self, channel: &str, message: &str) -> DroverResult<()> {
        let mut conn = self.connection().await?;
        conn.publish::<_, _, ()>(channel, message)
            .await
            .map_err(|e| DroverError::Signal(format!("publishing to {}: {}", channel, e)))
    }

    async fn get(&self, key: &str) -> DroverResult<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get(key)
            .await
            .map_err(|e| DroverError::Signal(format!("reading {}: {}", key, e)))
    }
}

/// In-memory transport for tests and offline use
#[derive(Default)]
pub struct MemoryTransport {
    published: Mutex<Vec<(String, String)>>,
    keys: Mutex<HashMap<String, String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every (channel, message) pair published so far
    pub fn published(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Seed a key for get() to return
    pub fn set_key(&self, key: &str, value: &str) {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl SignalTransport for MemoryTransport {
    async fn publish(&self, channel: &str, message: &str) -> DroverResult<()> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((channel.to_string(), message.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> DroverResult<Option<String>> {
        Ok(self
            .keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }
}

/// Facade over the transport for the two autoscaler operations
pub struct AutoscalerSignal {
    transport: Arc<dyn SignalTransport>,
}

impl AutoscalerSignal {
    pub fn new(transport: Arc<dyn SignalTransport>) -> Self {
        Self { transport }
    }

    /// Request resources from the autoscaler, fire-and-forget.
    ///
    /// A positive CPU count publishes a single `{"CPU": n}` request; a
    /// non-empty bundle list is published as-is. Both may be sent in one
    /// call.
    pub async fn request_resources(
        &self,
        num_cpus: Option<u64>,
        bundles: &[serde_json::Value],
    ) -> DroverResult<()> {
        if let Some(cpus) = num_cpus {
            if cpus > 0 {
                let message = serde_json::to_string(&serde_json::json!({ "CPU": cpus }))?;
                self.transport
                    .publish(RESOURCE_REQUEST_CHANNEL, &message)
                    .await?;
            }
        }
        if !bundles.is_empty() {
            let message = serde_json::to_string(bundles)?;
            self.transport
                .publish(RESOURCE_REQUEST_CHANNEL, &message)
                .await?;
        }
        Ok(())
    }

    /// The autoscaler's status blob, with its last error appended when
    /// one is present
    pub async fn debug_status(&self) -> DroverResult<String> {
        let mut status = self
            .transport
            .get(DEBUG_STATUS_KEY)
            .await?
            .unwrap_or_else(|| NO_STATUS.to_string());

        if let Some(error) = self.transport.get(DEBUG_ERROR_KEY).await? {
            status.push('\n');
            status.push_str(&error);
        }
        Ok(status)
    }
}

/// Process-wide signal facade over the Redis transport
///
/// Opened lazily on first use; read/publish-only, so there is no
/// teardown obligation.
pub fn autoscaler() -> &'static AutoscalerSignal {
    static SIGNAL: OnceLock<AutoscalerSignal> = OnceLock::new();
    SIGNAL.get_or_init(|| AutoscalerSignal::new(Arc::new(RedisTransport::from_env())))
}
