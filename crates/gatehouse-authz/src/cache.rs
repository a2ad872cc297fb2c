//! Concurrent caches used on the authorization hot path
//!
//! - [`DecisionCache`]: RBAC outcomes keyed by a request fingerprint, with an
//!   absolute expiry. Expired entries are evicted lazily on lookup; there is
//!   no sweeper task, so the map grows with the number of distinct keys seen
//!   inside one TTL window.
//! - [`ResourceInfoCache`]: per-method resource descriptors, kept for the
//!   life of the process.
//! - [`SessionCache`]: streams that already passed authorization.

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::rbac::ResourceInfo;

/// Content hash identifying one RBAC question
///
/// Covers domain, method, token and every bound resource's permission and
/// path. The token goes in raw and never leaves the hash.
pub fn fingerprint(domain: &str, method: &str, token: &str, resources: &[ResourceInfo]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(b"|");
    hasher.update(method.as_bytes());
    hasher.update(b"|");
    hasher.update(token.as_bytes());
    for resource in resources {
        hasher.update(b"|");
        hasher.update(resource.permission.as_bytes());
        hasher.update(b"|");
        hasher.update(resource.path.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy)]
struct DecisionEntry {
    has_access: bool,
    expires_at: Instant,
}

/// Longest lifetime a cached decision may have
pub const MAX_DECISION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Time-boxed cache of RBAC decisions
#[derive(Debug)]
pub struct DecisionCache {
    entries: DashMap<String, DecisionEntry>,
    ttl: Duration,
}

impl DecisionCache {
    /// Create a cache whose entries live for `ttl`, capped at
    /// [`MAX_DECISION_TTL`]
    pub fn new(ttl: Duration) -> Self {
        if ttl > MAX_DECISION_TTL {
            warn!(
                requested_secs = ttl.as_secs(),
                max_secs = MAX_DECISION_TTL.as_secs(),
                "decision TTL too large, capping"
            );
        }
        Self {
            entries: DashMap::new(),
            ttl: ttl.min(MAX_DECISION_TTL),
        }
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached decision for `key`, if present and not expired
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<bool> {
        let entry = self.entries.get(key).map(|e| *e)?;
        let now = Instant::now();
        if now < entry.expires_at {
            return Some(entry.has_access);
        }

        // A concurrent put may have refreshed the entry in the meantime
        self.entries.remove_if(key, |_, e| now >= e.expires_at);
        trace!(key = %key, "decision cache entry expired");
        None
    }

    /// Store `has_access` for `key` with a fresh expiry
    pub fn put(&self, key: impl Into<String>, has_access: bool) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(self.ttl)
            .unwrap_or_else(|| now + MAX_DECISION_TTL);
        self.entries.insert(
            key.into(),
            DecisionEntry {
                has_access,
                expires_at,
            },
        );
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Memoized resource descriptors per method
#[derive(Debug, Default)]
pub struct ResourceInfoCache {
    entries: DashMap<String, Arc<[ResourceInfo]>>,
}

impl ResourceInfoCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptors for `method`, if already resolved
    pub fn get(&self, method: &str) -> Option<Arc<[ResourceInfo]>> {
        self.entries.get(method).map(|e| Arc::clone(e.value()))
    }

    /// Memoize the descriptors of `method`; the first writer wins
    pub fn insert(&self, method: &str, infos: Vec<ResourceInfo>) -> Arc<[ResourceInfo]> {
        let entry = self
            .entries
            .entry(method.to_string())
            .or_insert_with(|| Arc::from(infos));
        Arc::clone(entry.value())
    }

    /// Number of memoized methods
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been memoized yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Streams whose first message was authorized
#[derive(Debug, Default)]
pub struct SessionCache {
    sessions: DashSet<Uuid>,
}

impl SessionCache {
    /// Create an empty session cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a granted stream
    pub fn grant(&self, session: Uuid) {
        self.sessions.insert(session);
    }

    /// Whether `session` was granted and is still open
    pub fn is_granted(&self, session: &Uuid) -> bool {
        self.sessions.contains(session)
    }

    /// Forget `session`; called when the stream ends
    pub fn revoke(&self, session: &Uuid) {
        self.sessions.remove(session);
    }

    /// Number of open granted streams
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no stream is currently granted
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
