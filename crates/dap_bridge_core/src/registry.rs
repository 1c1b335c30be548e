use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::RwLock;
use tracing::debug;

use crate::{session::SessionId, DapError, Result, Session};

#[derive(Debug, Default)]
struct RegistryInner {
    sessions: BTreeMap<SessionId, Arc<Session>>,
    most_recent: Option<SessionId>,
}

/// Live sessions by id, plus the most recently added one for calls that do
/// not name a session.
///
/// Removing an entry does not close the session; callers close explicitly.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    last_id: AtomicU64,
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next session id. Ids start at 1 and are never reused.
    pub fn allocate_id(&self) -> SessionId {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn add(&self, session: Arc<Session>) {
        let id = session.id();
        let mut inner = self.inner.write().await;
        inner.sessions.insert(id, session);
        inner.most_recent = Some(id);
        debug!(session = id, total = inner.sessions.len(), "Session registered");
    }

    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.inner.read().await.sessions.get(&id).cloned()
    }

    /// Exact lookup when `id` is given; otherwise the most recent session,
    /// falling back to the newest still-registered one.
    pub async fn resolve(&self, id: Option<SessionId>) -> Result<Arc<Session>> {
        let inner = self.inner.read().await;
        match id {
            Some(id) => inner
                .sessions
                .get(&id)
                .cloned()
                .ok_or(DapError::NoSuchSession(id)),
            None => inner
                .most_recent
                .and_then(|id| inner.sessions.get(&id))
                .or_else(|| inner.sessions.values().next_back())
                .cloned()
                .ok_or(DapError::NoSession),
        }
    }

    /// Drop the entry. The most-recent pointer is cleared, not reassigned.
    pub async fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut inner = self.inner.write().await;
        let removed = inner.sessions.remove(&id);
        if inner.most_recent == Some(id) {
            inner.most_recent = None;
        }
        removed
    }

    pub async fn most_recent(&self) -> Option<SessionId> {
        self.inner.read().await.most_recent
    }

    pub async fn list(&self) -> Vec<Arc<Session>> {
        self.inner.read().await.sessions.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }

    /// Close and unregister every session.
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut inner = self.inner.write().await;
            inner.most_recent = None;
            std::mem::take(&mut inner.sessions).into_values().collect()
        };
        for session in sessions {
            session.close().await;
        }
    }
}
