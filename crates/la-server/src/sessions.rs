use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use la_core::core::{SessionId, UserMode};
use tokio::sync::{OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// Cookie lifetime when the config does not set one.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// The logged-in participant behind a session cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticipantSession {
    pub id: SessionId,
    pub user_mode: UserMode,
}

struct IssuedSession {
    session: ParticipantSession,
    issued_at: Instant,
}

type TurnLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

// ---------------------------------------------------------------------------
// SessionRegistry — cookie tokens and per-session turn ordering
// ---------------------------------------------------------------------------

/// Server-side login state keyed by an opaque cookie token.
///
/// Tokens expire `ttl` after login. Also hands out one async lock per session
/// so whole chat turns (load, generate, append) run in arrival order for that
/// session.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, IssuedSession>>,
    turn_locks: TurnLocks,
    ttl: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            turn_locks: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Register a participant and return the new cookie token.
    ///
    /// Expired tokens are swept on the way in.
    pub async fn open(&self, session: ParticipantSession) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, issued| issued.issued_at.elapsed() < self.ttl);
        sessions.insert(
            token.clone(),
            IssuedSession {
                session,
                issued_at: Instant::now(),
            },
        );
        token
    }

    pub async fn get(&self, token: &str) -> Option<ParticipantSession> {
        {
            let sessions = self.sessions.read().await;
            let issued = sessions.get(token)?;
            if issued.issued_at.elapsed() < self.ttl {
                return Some(issued.session.clone());
            }
        }
        if let Some(expired) = self.sessions.write().await.remove(token) {
            tracing::info!(session = %expired.session.id, "session cookie expired");
        }
        None
    }

    pub async fn close(&self, token: &str) -> Option<ParticipantSession> {
        self.sessions
            .write()
            .await
            .remove(token)
            .map(|issued| issued.session)
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Wait for this session's turn; the lock is held until the guard drops.
    pub async fn lock_turn(&self, id: &SessionId) -> TurnGuard<'_> {
        let key = id.key();
        let lock = {
            let mut locks = self.turn_locks.lock().expect("turn lock table poisoned");
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        TurnGuard {
            table: &self.turn_locks,
            key,
            lock: Some(lock),
            guard: Some(guard),
        }
    }

    pub fn turn_lock_count(&self) -> usize {
        self.turn_locks
            .lock()
            .expect("turn lock table poisoned")
            .len()
    }
}

/// Holds a session's turn lock; on drop the table entry is removed when no
/// other request is queued behind it.
pub struct TurnGuard<'a> {
    table: &'a TurnLocks,
    key: String,
    lock: Option<Arc<tokio::sync::Mutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let Some(lock) = self.lock.take() else {
            return;
        };
        let mut locks = self.table.lock().expect("turn lock table poisoned");
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

// ---------------------------------------------------------------------------
// Cookie helpers
// ---------------------------------------------------------------------------

pub fn token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, token)| token.to_owned())
        .filter(|token| !token.is_empty())
}

pub fn session_cookie(cookie_name: &str, token: &str) -> String {
    format!("{cookie_name}={token}; Path=/; HttpOnly; SameSite=Lax")
}

pub fn expired_cookie(cookie_name: &str) -> String {
    format!("{cookie_name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
