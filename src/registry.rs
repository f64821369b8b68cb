use crate::session::Session;
use crate::SessionId;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Keyed collection of live sessions. The lock here guards only the map; it
/// is released before any call back into a session, so registry and session
/// locks never nest.
pub struct SessionRegistry {
    entries: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Atomic per key: the first caller inserts, every concurrent and later
    /// caller for the same key gets the same instance back.
    pub async fn get_or_create(&self, app: &str, name: &str, output_dir: PathBuf) -> Arc<Session> {
        let id = crate::session_id(app, name);
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&id) {
            return Arc::clone(existing);
        }
        let session = Session::new(app, name, output_dir);
        entries.insert(id.clone(), Arc::clone(&session));
        log::info!("Created session: {}", id);
        session
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.entries.read().await.get(id).cloned()
    }

    /// Snapshot of the current sessions; safe to iterate without the lock.
    pub async fn list(&self) -> Vec<Arc<Session>> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Takes the entry out first, then stops it with the map lock released.
    /// Nothing keeps running and nothing stays listed; no-op when absent.
    pub async fn remove(&self, id: &str) -> bool {
        let session = self.entries.write().await.remove(id);
        match session {
            Some(session) => {
                session.stop().await;
                log::info!("Removed session: {}", id);
                true
            }
            None => false,
        }
    }

    /// Process-wide teardown: stop everything concurrently, bounded by the
    /// global timeout. Sessions that miss the deadline are abandoned.
    pub async fn shutdown(&self, timeout: Duration) {
        let sessions = self.list().await;
        if sessions.is_empty() {
            return;
        }
        log::info!("Stopping {} session(s)...", sessions.len());

        let stops = sessions.iter().map(|session| session.stop());
        match tokio::time::timeout(timeout, futures::future::join_all(stops)).await {
            Ok(_) => log::info!("All sessions stopped"),
            Err(_) => log::warn!(
                "Shutdown timeout ({:?}) reached, abandoning remaining sessions",
                timeout
            ),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
