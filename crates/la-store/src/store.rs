use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use la_core::core::{Selection, SessionId, Timestamp, TranscriptError, Turn};

use crate::backend::DocumentStore;
use crate::models::{FeedbackEntry, PostSurvey, PreSurvey, RatingEntry, SessionDocument};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("session key {0:?} is not storable")]
    InvalidSessionKey(String),
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
    #[error("feedback references response {response_id} but the dialogue has {dialogue_len} turns")]
    OrphanFeedback {
        response_id: usize,
        dialogue_len: usize,
    },
    #[error("rating references response {response_id} but the dialogue has {dialogue_len} turns")]
    OrphanRating {
        response_id: usize,
        dialogue_len: usize,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// How feedback and ratings treat a `response_id` with no matching turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseIdPolicy {
    /// Accept any id, as the experiment always has.
    #[default]
    Lenient,
    /// Reject ids outside `1..=dialogue.len()`.
    Strict,
}

// ---------------------------------------------------------------------------
// SessionStore — serialized read-modify-write over whole documents
// ---------------------------------------------------------------------------

/// Owns every mutation of session documents.
///
/// Each operation holds the session's lock across read, change and write, so
/// two requests for one session never interleave; different sessions proceed
/// independently. A failed change writes nothing.
pub struct SessionStore {
    backend: Box<dyn DocumentStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    policy: ResponseIdPolicy,
}

impl SessionStore {
    pub fn new(backend: Box<dyn DocumentStore>, policy: ResponseIdPolicy) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> ResponseIdPolicy {
        self.policy
    }

    pub fn load(&self, id: &SessionId) -> Result<SessionDocument, StoreError> {
        self.backend
            .read(id)?
            .ok_or_else(|| StoreError::SessionNotFound(id.key()))
    }

    pub fn create_if_absent(
        &self,
        id: &SessionId,
        initial: SessionDocument,
    ) -> Result<SessionDocument, StoreError> {
        self.locked(id, || {
            if let Some(existing) = self.backend.read(id)? {
                return Ok(existing);
            }
            self.backend.write(id, &initial)?;
            tracing::info!(session = %id, "created session document");
            Ok(initial)
        })
    }

    /// Append turns in order; returns the new dialogue length.
    pub fn append_turns(&self, id: &SessionId, turns: Vec<Turn>) -> Result<usize, StoreError> {
        self.mutate(id, |doc| {
            let mut len = doc.dialogue.len();
            for turn in turns {
                len = doc.dialogue.append(turn);
            }
            Ok(len)
        })
    }

    pub fn append_turn(&self, id: &SessionId, turn: Turn) -> Result<usize, StoreError> {
        self.append_turns(id, vec![turn])
    }

    pub fn overwrite_last_assistant_content(
        &self,
        id: &SessionId,
        selected: &str,
    ) -> Result<Selection, StoreError> {
        self.mutate(id, |doc| Ok(doc.dialogue.select(selected)?))
    }

    pub fn append_feedback(
        &self,
        id: &SessionId,
        response_id: usize,
        feedback: String,
        time: Timestamp,
    ) -> Result<(), StoreError> {
        let policy = self.policy;
        self.mutate(id, |doc| {
            if policy == ResponseIdPolicy::Strict && !doc.dialogue.has_response(response_id) {
                return Err(StoreError::OrphanFeedback {
                    response_id,
                    dialogue_len: doc.dialogue.len(),
                });
            }
            doc.feedback.push(FeedbackEntry {
                response_id,
                feedback,
                time,
            });
            Ok(())
        })
    }

    pub fn append_rating(
        &self,
        id: &SessionId,
        response_id: usize,
        rating: i64,
        time: Timestamp,
    ) -> Result<(), StoreError> {
        let policy = self.policy;
        self.mutate(id, |doc| {
            if policy == ResponseIdPolicy::Strict && !doc.dialogue.has_response(response_id) {
                return Err(StoreError::OrphanRating {
                    response_id,
                    dialogue_len: doc.dialogue.len(),
                });
            }
            doc.ratings.push(RatingEntry {
                response_id,
                rating,
                time,
            });
            Ok(())
        })
    }

    pub fn set_presurvey(&self, id: &SessionId, survey: PreSurvey) -> Result<(), StoreError> {
        self.mutate(id, |doc| {
            doc.presurvey = Some(survey);
            Ok(())
        })
    }

    /// Last write wins.
    pub fn set_post_survey(&self, id: &SessionId, survey: PostSurvey) -> Result<(), StoreError> {
        self.mutate(id, |doc| {
            doc.post_survey = Some(survey);
            Ok(())
        })
    }

    pub fn list_documents(&self) -> Result<Vec<SessionDocument>, StoreError> {
        self.backend.list()
    }

    fn mutate<T>(
        &self,
        id: &SessionId,
        change: impl FnOnce(&mut SessionDocument) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.locked(id, || {
            let mut doc = self
                .backend
                .read(id)?
                .ok_or_else(|| StoreError::SessionNotFound(id.key()))?;
            let out = change(&mut doc)?;
            self.backend.write(id, &doc)?;
            Ok(out)
        })
    }

    /// Run `op` holding the session's lock, then drop the lock entry if no
    /// other caller is waiting on it.
    fn locked<T>(
        &self,
        id: &SessionId,
        op: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let key = id.key();
        let lock = {
            let mut locks = self.locks.lock().expect("lock table poisoned");
            Arc::clone(locks.entry(key.clone()).or_default())
        };

        let out = {
            let _guard = lock.lock().expect("session mutex poisoned");
            op()
        };

        // Clones are only taken under the table lock, so a count of two
        // (table plus ours) means nobody else wants this session.
        let mut locks = self.locks.lock().expect("lock table poisoned");
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }
        out
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.locks.lock().expect("lock table poisoned").len()
    }
}
