use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use la_core::core::SessionId;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::models::SessionDocument;
use crate::store::StoreError;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_key TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    start_time TEXT NOT NULL,
    document TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_username ON sessions(username);
"#;

/// Whole-document persistence. Each `write` replaces the stored document
/// atomically: readers see either the previous or the new version.
pub trait DocumentStore: Send + Sync {
    fn read(&self, id: &SessionId) -> Result<Option<SessionDocument>, StoreError>;
    fn write(&self, id: &SessionId, doc: &SessionDocument) -> Result<(), StoreError>;
    fn list(&self) -> Result<Vec<SessionDocument>, StoreError>;
}

// ---------------------------------------------------------------------------
// JsonDirDocumentStore — one pretty-printed JSON file per session
// ---------------------------------------------------------------------------

pub struct JsonDirDocumentStore {
    dir: PathBuf,
}

impl JsonDirDocumentStore {
    pub fn new(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, id: &SessionId) -> Result<PathBuf, StoreError> {
        let key = id.key();
        if !is_safe_file_stem(&key) {
            return Err(StoreError::InvalidSessionKey(key));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl DocumentStore for JsonDirDocumentStore {
    fn read(&self, id: &SessionId) -> Result<Option<SessionDocument>, StoreError> {
        let path = self.path_for(id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, id: &SessionId, doc: &SessionDocument) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = to_pretty_json(doc)?;

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<SessionDocument>, StoreError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs::read(&path)?;
            match serde_json::from_slice::<SessionDocument>(&bytes) {
                Ok(doc) => docs.push(doc),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "skipping unreadable session document"
                    );
                }
            }
        }
        Ok(docs)
    }
}

fn is_safe_file_stem(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && !key.contains("..")
        && !key.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

/// Serialize with four-space indentation, the layout analysts already read.
fn to_pretty_json(doc: &SessionDocument) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut ser)?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// SqliteDocumentStore — documents as rows keyed by session
// ---------------------------------------------------------------------------

pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StoreError> {
        let conn = self.lock_conn();
        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        conn.execute_batch(SCHEMA_SQL)?;
        if version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite mutex poisoned")
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn read(&self, id: &SessionId) -> Result<Option<SessionDocument>, StoreError> {
        let conn = self.lock_conn();
        let raw: Option<String> = conn
            .query_row(
                "SELECT document FROM sessions WHERE session_key = ?1",
                params![id.key()],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn write(&self, id: &SessionId, doc: &SessionDocument) -> Result<(), StoreError> {
        let document = serde_json::to_string(doc)?;
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO sessions (session_key, username, start_time, document, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(session_key) DO UPDATE SET
                 document = excluded.document,
                 updated_at = excluded.updated_at",
            params![
                id.key(),
                id.user().as_str(),
                id.start_time().as_str(),
                document,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<SessionDocument>, StoreError> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare("SELECT document FROM sessions ORDER BY session_key ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut docs = Vec::new();
        for raw in rows {
            docs.push(serde_json::from_str(&raw?)?);
        }
        Ok(docs)
    }
}
