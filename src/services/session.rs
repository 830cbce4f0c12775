use crate::error::SessionError;
use crate::models::{GenerationSession, Progress};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// In-memory sessions keyed by id. Nothing survives a restart.
///
/// Locks are held only for map operations, never across an await point.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<Uuid, GenerationSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, GenerationSession>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, session: GenerationSession) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().insert(id, session);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<GenerationSession> {
        self.lock().get(id).cloned()
    }

    /// Stores `session` only if the stored outline is still at `base_revision`,
    /// the revision the caller started from.
    pub fn commit(
        &self,
        id: &Uuid,
        base_revision: u64,
        session: GenerationSession,
    ) -> Result<(), SessionError> {
        let mut sessions = self.lock();
        let slot = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        if slot.outline_revision != base_revision {
            return Err(SessionError::Stale);
        }
        *slot = session;
        Ok(())
    }

    /// Progress from a run against an older outline is ignored.
    pub fn set_progress(&self, id: &Uuid, revision: u64, progress: Progress) {
        if let Some(session) = self.lock().get_mut(id) {
            if session.outline_revision == revision {
                session.progress = progress;
            }
        }
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}
