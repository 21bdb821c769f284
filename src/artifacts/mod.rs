//! Short-term artifact storage
//!
//! Artifacts are named binary blobs handed from one tool call to the next
//! within an agent turn. Saving a name again replaces it with a new version;
//! only the latest version is kept.
//!
//! Artifacts are scoped per agent session. A session is created by its first
//! save, expires after a period without use, and the least recently used
//! session is evicted once the session cap is reached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::debug;

/// Artifact store errors
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact name: {0:?}")]
    InvalidName(String),
}

/// A stored artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
    pub version: u64,
}

/// Name-addressed artifact storage
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Save a new version of `name`, returning its version number
    async fn save(&self, name: &str, data: Bytes, mime_type: &str) -> Result<u64, ArtifactError>;

    /// Load the latest version of `name`
    async fn load(&self, name: &str) -> Result<Artifact, ArtifactError>;
}

/// In-memory artifact store holding the latest version of each name
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<String, Artifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save(&self, name: &str, data: Bytes, mime_type: &str) -> Result<u64, ArtifactError> {
        if name.trim().is_empty() {
            return Err(ArtifactError::InvalidName(name.to_string()));
        }

        let mut artifacts = self.artifacts.write();
        let version = artifacts.get(name).map_or(0, |a| a.version + 1);
        debug!("Saving artifact {} v{} ({} bytes)", name, version, data.len());
        artifacts.insert(
            name.to_string(),
            Artifact {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                data,
                version,
            },
        );
        Ok(version)
    }

    async fn load(&self, name: &str) -> Result<Artifact, ArtifactError> {
        self.artifacts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))
    }
}

struct Session {
    store: Arc<InMemoryArtifactStore>,
    last_used: Instant,
}

/// Per-session artifact stores with idle expiry and an LRU cap
pub struct ArtifactSessions {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
    max_sessions: usize,
}

impl ArtifactSessions {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
    pub const DEFAULT_MAX_SESSIONS: usize = 1024;

    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Artifact store view of one session
    ///
    /// Saves create the session on demand; loads never do.
    pub fn handle(self: &Arc<Self>, session_id: &str) -> Arc<dyn ArtifactStore> {
        Arc::new(SessionArtifacts {
            sessions: self.clone(),
            session_id: session_id.to_string(),
        })
    }

    /// Get or create the store for a session
    pub fn open(&self, session_id: &str) -> Arc<InMemoryArtifactStore> {
        self.open_at(session_id, Instant::now())
    }

    /// Store of an existing, unexpired session
    pub fn find(&self, session_id: &str) -> Option<Arc<InMemoryArtifactStore>> {
        self.find_at(session_id, Instant::now())
    }

    fn open_at(&self, session_id: &str, now: Instant) -> Arc<InMemoryArtifactStore> {
        let mut sessions = self.sessions.lock();
        self.evict_expired(&mut sessions, now);

        if let Some(session) = sessions.get_mut(session_id) {
            session.last_used = now;
            return session.store.clone();
        }

        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_used)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                debug!("Evicting artifact session {} (session cap reached)", id);
                sessions.remove(&id);
            }
        }

        let store = Arc::new(InMemoryArtifactStore::new());
        sessions.insert(
            session_id.to_string(),
            Session {
                store: store.clone(),
                last_used: now,
            },
        );
        store
    }

    fn find_at(&self, session_id: &str, now: Instant) -> Option<Arc<InMemoryArtifactStore>> {
        let mut sessions = self.sessions.lock();
        self.evict_expired(&mut sessions, now);

        sessions.get_mut(session_id).map(|session| {
            session.last_used = now;
            session.store.clone()
        })
    }

    fn evict_expired(&self, sessions: &mut HashMap<String, Session>, now: Instant) {
        let ttl = self.ttl;
        sessions.retain(|id, session| {
            let live = now.saturating_duration_since(session.last_used) < ttl;
            if !live {
                debug!("Expiring artifact session {}", id);
            }
            live
        });
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl Default for ArtifactSessions {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL, Self::DEFAULT_MAX_SESSIONS)
    }
}

/// One session's artifacts, resolved on each call
struct SessionArtifacts {
    sessions: Arc<ArtifactSessions>,
    session_id: String,
}

#[async_trait]
impl ArtifactStore for SessionArtifacts {
    async fn save(&self, name: &str, data: Bytes, mime_type: &str) -> Result<u64, ArtifactError> {
        let store = self.sessions.open(&self.session_id);
        store.save(name, data, mime_type).await
    }

    async fn load(&self, name: &str) -> Result<Artifact, ArtifactError> {
        match self.sessions.find(&self.session_id) {
            Some(store) => store.load(name).await,
            None => Err(ArtifactError::NotFound(name.to_string())),
        }
    }
}
