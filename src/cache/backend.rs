//! Remote key/value backend behind the L2 tier.
//!
//! The cache never surfaces backend failures; callers see misses and the
//! stats report a degraded backend. `RedisBackend` is the production
//! implementation; `MemoryBackend` implements the same contract in-process
//! for tests and single-node deployments without Redis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Failure talking to the backend. Always logged, never propagated past the
/// cache boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("backend connection failed: {0}")]
    Connection(String),
    #[error("backend i/o failed: {0}")]
    Io(String),
}

/// Snapshot of backend health for the stats report.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BackendInfo {
    pub connected: bool,
    pub keys: u64,
    pub memory_used: Option<String>,
}

/// Minimal key/value contract the L2 tier needs: get, set-with-ttl, delete,
/// glob key enumeration, and an info probe.
#[async_trait]
pub trait KvBackend: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError>;
    async fn delete(&self, key: &str) -> Result<(), BackendError>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError>;
    async fn info(&self) -> Result<BackendInfo, BackendError>;
}

/// Redis-backed L2 using a shared connection manager, which reconnects on
/// its own after transient drops.
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connect to `url` (`redis://` or `rediss://`). A password configured
    /// outside the URL is spliced into it.
    pub async fn connect(url: &str, password: Option<&str>) -> Result<Self, BackendError> {
        let url = match password {
            Some(password) if !url.contains('@') => {
                let (scheme, rest) = url
                    .split_once("://")
                    .ok_or_else(|| BackendError::Connection("malformed redis url".into()))?;
                format!("{scheme}://:{password}@{rest}")
            }
            _ => url.to_string(),
        };
        let client = redis::Client::open(url.as_str())
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut con = self.manager.clone();
        con.get(key).await.map_err(|e| BackendError::Io(e.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError> {
        let mut con = self.manager.clone();
        con.set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| BackendError::Io(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let mut con = self.manager.clone();
        con.del(key).await.map_err(|e| BackendError::Io(e.to_string()))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        let mut con = self.manager.clone();
        con.keys(pattern).await.map_err(|e| BackendError::Io(e.to_string()))
    }

    async fn info(&self) -> Result<BackendInfo, BackendError> {
        let mut con = self.manager.clone();
        let keys: u64 = redis::cmd("DBSIZE")
            .query_async(&mut con)
            .await
            .map_err(|e| BackendError::Io(e.to_string()))?;
        let raw: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut con)
            .await
            .map_err(|e| BackendError::Io(e.to_string()))?;
        let memory_used = raw
            .lines()
            .find_map(|line| line.strip_prefix("used_memory_human:"))
            .map(|v| v.trim().to_string());
        Ok(BackendInfo { connected: true, keys, memory_used })
    }
}

struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// In-process backend implementing the same contract as Redis, including
/// TTL expiry and glob key matching. Tests can flip it into a failing state
/// to exercise degradation paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, StoredValue>>>,
    failing: Arc<AtomicBool>,
}

impl std::fmt::Debug for StoredValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredValue").field("len", &self.bytes.len()).finish()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, simulating an unreachable
    /// backend.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BackendError::Connection("backend marked unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.check_available()?;
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match entries.get(key) {
            Some(stored) if stored.expires_at > Instant::now() => Ok(Some(stored.bytes.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError> {
        self.check_available()?;
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            key.to_string(),
            StoredValue { bytes: value.to_vec(), expires_at: Instant::now() + ttl },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.check_available()?;
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        self.check_available()?;
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        let mut matched: Vec<String> = entries
            .iter()
            .filter(|(key, stored)| stored.expires_at > now && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        matched.sort();
        Ok(matched)
    }

    async fn info(&self) -> Result<BackendInfo, BackendError> {
        self.check_available()?;
        Ok(BackendInfo { connected: true, keys: self.len() as u64, memory_used: None })
    }
}

/// Match a glob pattern where `*` spans any run of characters. This is the
/// only wildcard the cache emits.
pub fn glob_match(pattern: &str, input: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == input;
    }

    let mut rest = input;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(segment) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}
