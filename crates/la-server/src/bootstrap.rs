use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context};
use la_core::core::{
    is_safe_username, LanguageNames, ParticipantDirectory, Password, ReplyParser, UserId,
};
use la_store::{
    JsonDirDocumentStore, ResponseIdPolicy, SessionStore, SqliteDocumentStore,
};

use crate::config::{AppConfig, MemberConfig, ResponseIdPolicyConfig, StoreBackendConfig};
use crate::generation::GenerationPolicy;
use crate::outbound::ModelNames;

// ---------------------------------------------------------------------------
// StoreBackend — where session documents live
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    JsonDir(PathBuf),
    Sqlite(PathBuf),
}

impl StoreBackend {
    pub fn open(&self, policy: ResponseIdPolicy) -> Result<SessionStore, anyhow::Error> {
        let store = match self {
            StoreBackend::JsonDir(dir) => {
                let backend = JsonDirDocumentStore::new(dir)
                    .with_context(|| format!("opening session directory {}", dir.display()))?;
                SessionStore::new(Box::new(backend), policy)
            }
            StoreBackend::Sqlite(path) => {
                let backend = SqliteDocumentStore::new(path)
                    .with_context(|| format!("opening session database {}", path.display()))?;
                SessionStore::new(Box::new(backend), policy)
            }
        };
        Ok(store)
    }
}

// ---------------------------------------------------------------------------
// RuntimeConfig — fully validated runtime configuration
// ---------------------------------------------------------------------------

pub struct RuntimeConfig {
    pub listen_addr: String,
    pub cookie_name: String,
    pub session_ttl: Duration,
    pub log_level: String,
    pub log_format: String,
    pub inference_base_url: String,
    pub inference_api_key: Option<String>,
    pub models: ModelNames,
    pub generation: GenerationPolicy,
    pub reply_parser: ReplyParser,
    pub language: LanguageNames,
    pub store_backend: StoreBackend,
    pub response_ids: ResponseIdPolicy,
    pub participants: ParticipantDirectory,
}

impl RuntimeConfig {
    pub fn open_store(&self) -> Result<SessionStore, anyhow::Error> {
        self.store_backend.open(self.response_ids)
    }
}

// ---------------------------------------------------------------------------
// into_runtime — converts raw AppConfig into validated RuntimeConfig
// ---------------------------------------------------------------------------

pub fn into_runtime(config: AppConfig) -> Result<RuntimeConfig, anyhow::Error> {
    let inference = config.inference;
    ensure!(
        !inference.base_url.trim().is_empty(),
        "inference.base_url must not be empty"
    );
    ensure!(
        !inference.base_model.trim().is_empty(),
        "inference.base_model must not be empty"
    );
    ensure!(
        !inference.sft_adapter.trim().is_empty() && !inference.dpo_adapter.trim().is_empty(),
        "inference adapters must not be empty"
    );
    ensure!(
        inference.sft_adapter != inference.dpo_adapter,
        "sft_adapter and dpo_adapter must differ"
    );
    ensure!(inference.max_attempts >= 1, "max_attempts must be at least 1");
    ensure!(inference.timeout_ms > 0, "timeout_ms must be positive");
    ensure!(
        inference.top_p > 0.0 && inference.top_p <= 1.0,
        "top_p must be in (0, 1]"
    );
    ensure!(inference.max_tokens > 0, "max_tokens must be positive");
    ensure!(
        !inference.reply_delimiter.is_empty(),
        "reply_delimiter must not be empty"
    );

    ensure!(
        !config.server.cookie_name.is_empty()
            && config
                .server
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
        "cookie_name must be a non-empty token"
    );
    ensure!(
        config.server.session_ttl_secs > 0,
        "session_ttl_secs must be positive"
    );
    ensure!(
        !config.participants.anonymous_password.is_empty(),
        "anonymous_password must not be empty"
    );

    // Inline members first, then the users file
    let mut members = config.participants.members;
    if let Some(path) = config.participants.users_file.as_deref() {
        members.extend(load_users_file(path)?);
    }

    let mut seen_members = HashSet::with_capacity(members.len());
    for member in &members {
        ensure!(
            seen_members.insert(member.username.as_str()),
            "duplicate member username: {}",
            member.username
        );
        ensure!(
            is_safe_username(&member.username),
            "member username {:?} cannot name a session document",
            member.username
        );
    }

    let participants = ParticipantDirectory::new(
        members
            .into_iter()
            .map(|m| (UserId::new(m.username), Password::new(m.password)))
            .collect(),
        Password::new(config.participants.anonymous_password),
    );

    ensure!(
        !config.store.path.as_os_str().is_empty(),
        "store.path must not be empty"
    );
    let store_backend = match config.store.backend {
        StoreBackendConfig::JsonDir => StoreBackend::JsonDir(config.store.path),
        StoreBackendConfig::Sqlite => StoreBackend::Sqlite(config.store.path),
    };
    let response_ids = match config.store.response_ids {
        ResponseIdPolicyConfig::Lenient => ResponseIdPolicy::Lenient,
        ResponseIdPolicyConfig::Strict => ResponseIdPolicy::Strict,
    };

    Ok(RuntimeConfig {
        listen_addr: config.server.listen,
        cookie_name: config.server.cookie_name,
        session_ttl: Duration::from_secs(config.server.session_ttl_secs),
        log_level: config.logging.level,
        log_format: config.logging.format,
        inference_base_url: inference.base_url,
        inference_api_key: inference.api_key,
        models: ModelNames {
            base: inference.base_model,
            sft: inference.sft_adapter,
            dpo: inference.dpo_adapter,
        },
        generation: GenerationPolicy {
            max_tokens: inference.max_tokens,
            temperature: inference.temperature,
            top_p: inference.top_p,
            top_k: inference.top_k,
            max_attempts: inference.max_attempts,
            timeout: Duration::from_millis(inference.timeout_ms),
        },
        reply_parser: ReplyParser::new(inference.reply_delimiter),
        language: LanguageNames {
            canonical: config.language.canonical_name,
            foreign: config.language.foreign_name,
        },
        store_backend,
        response_ids,
        participants,
    })
}

fn load_users_file(path: &Path) -> Result<Vec<MemberConfig>, anyhow::Error> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading users file {}", path.display()))?;
    let users: BTreeMap<String, String> = serde_json::from_str(&content)
        .with_context(|| format!("parsing users file {}", path.display()))?;
    Ok(users
        .into_iter()
        .map(|(username, password)| MemberConfig { username, password })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
