//! Session registry with per-key creation deduplication.
//!
//! The map lock is held only for insert-if-absent of a per-key cell. The cell
//! itself serializes creation, so concurrent requests for the same info hash
//! wait on one engine call instead of starting duplicate downloads. Sessions
//! are never evicted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::engine::{DownloadEngine, InfoHash};
use crate::error::{GatewayError, GatewayResult};
use crate::session::Session;

type SessionCell = Arc<OnceCell<Arc<Session>>>;

/// Result of a non-creating registry lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Never requested.
    Missing,
    /// Creation is in flight.
    Pending,
    /// Session exists.
    Active(Arc<Session>),
}

/// Authoritative mapping from info hash to session.
pub struct SessionRegistry {
    engine: Arc<dyn DownloadEngine>,
    sessions: Mutex<HashMap<InfoHash, SessionCell>>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<dyn DownloadEngine>) -> Self {
        Self {
            engine,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session for `info_hash`, creating it on first request.
    ///
    /// # Errors
    /// - `GatewayError::SessionCreationFailed` - Engine rejected the identifier
    pub async fn resolve(&self, info_hash: InfoHash) -> GatewayResult<Arc<Session>> {
        let cell = {
            let mut sessions = self.sessions.lock();
            sessions.entry(info_hash).or_default().clone()
        };

        let result = cell
            .get_or_try_init(|| async {
                let handle = self.engine.add(info_hash).await.map_err(|source| {
                    warn!("Engine rejected {}: {}", info_hash, source);
                    GatewayError::SessionCreationFailed { info_hash, source }
                })?;
                info!("Created session for {}", info_hash);
                Ok::<_, GatewayError>(Arc::new(Session::new(handle)))
            })
            .await
            .cloned();

        if result.is_err() {
            self.forget_failed(info_hash, &cell);
        }
        result
    }

    /// Drops the entry for a failed creation unless another request is still
    /// waiting on the same cell.
    fn forget_failed(&self, info_hash: InfoHash, cell: &SessionCell) {
        let mut sessions = self.sessions.lock();
        let stale = sessions.get(&info_hash).is_some_and(|current| {
            Arc::ptr_eq(current, cell) && !cell.initialized() && Arc::strong_count(cell) <= 2
        });
        if stale {
            sessions.remove(&info_hash);
        }
    }

    /// Looks up a session without creating one.
    pub fn get(&self, info_hash: InfoHash) -> Lookup {
        let sessions = self.sessions.lock();
        match sessions.get(&info_hash) {
            None => Lookup::Missing,
            Some(cell) => match cell.get() {
                Some(session) => Lookup::Active(session.clone()),
                // Only the map holds it: the last attempt failed
                None if Arc::strong_count(cell) == 1 => Lookup::Missing,
                None => Lookup::Pending,
            },
        }
    }

    /// Number of sessions with a live engine handle.
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
