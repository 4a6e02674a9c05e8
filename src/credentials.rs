//! Resolve a teacher's Canvas credential from the profile store, with an
//! explicit short-lived cache in front of it.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::model::{Credential, ErrorKind};

/// Profile columns as stored; either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredProfile {
    pub canvas_base_url: Option<String>,
    pub canvas_access_token: Option<String>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_profile(&self, user_id: &str) -> anyhow::Result<Option<StoredProfile>>;
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no Canvas credentials configured for user {user_id}")]
    MissingCredential { user_id: String },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::MissingCredential { .. } => ErrorKind::MissingCredential,
            ResolveError::Store(_) => ErrorKind::Transient,
        }
    }
}

struct CachedCredential {
    credential: Credential,
    inserted_at: Instant,
}

/// Per-user credential cache with a fixed TTL. Entries leave on expiry or
/// explicit invalidation only.
pub struct SessionCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedCredential>>,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, user_id: &str) -> Option<Credential> {
        {
            let entries = self.entries.read().await;
            match entries.get(user_id) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Some(entry.credential.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }
        // expired; it may have been refreshed since the read lock was released
        let mut entries = self.entries.write().await;
        if entries.get(user_id).is_some_and(|e| e.inserted_at.elapsed() >= self.ttl) {
            entries.remove(user_id);
        }
        None
    }

    pub async fn insert(&self, user_id: &str, credential: Credential) {
        self.entries.write().await.insert(
            user_id.to_string(),
            CachedCredential {
                credential,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn invalidate(&self, user_id: &str) -> bool {
        self.entries.write().await.remove(user_id).is_some()
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        before - entries.len()
    }
}

pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    cache: Arc<SessionCache>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn CredentialStore>, cache: Arc<SessionCache>) -> Self {
        Self { store, cache }
    }

    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn resolve(&self, user_id: &str) -> Result<Credential, ResolveError> {
        if let Some(credential) = self.cache.get(user_id).await {
            debug!("credential served from session cache");
            return Ok(credential);
        }

        let purged = self.cache.purge_expired().await;
        if purged > 0 {
            debug!(purged, "expired session cache entries dropped");
        }

        let missing = || ResolveError::MissingCredential {
            user_id: user_id.to_string(),
        };
        let profile = self.store.load_profile(user_id).await?.ok_or_else(missing)?;
        let base_url = profile
            .canvas_base_url
            .as_deref()
            .and_then(normalize_base_url)
            .ok_or_else(missing)?;
        let access_token = profile
            .canvas_access_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(missing)?;

        let credential = Credential {
            base_url,
            access_token,
        };
        self.cache.insert(user_id, credential.clone()).await;
        Ok(credential)
    }

    /// Forget the cached credential, e.g. after Canvas rejected its token.
    pub async fn invalidate(&self, user_id: &str) {
        if self.cache.invalidate(user_id).await {
            debug!(user_id, "session cache entry invalidated");
        }
    }
}

/// Trim, default the scheme to https and drop trailing slashes.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains("://") {
        Some(trimmed.to_string())
    } else {
        Some(format!("https://{}", trimmed))
    }
}
