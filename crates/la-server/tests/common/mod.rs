#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Json;

use la_server::config::{
    AppConfig, InferenceConfig, LanguageConfig, LoggingConfig, MemberConfig, ParticipantsConfig,
    ResponseIdPolicyConfig, ServerConfig, StoreBackendConfig, StoreConfig,
};
use la_server::handler::AppState;

// ---------------------------------------------------------------------------
// MockInferenceServer — scripted OpenAI-compatible completions endpoint
// ---------------------------------------------------------------------------

pub const BASE_MODEL: &str = "base-model";
pub const SFT_MODEL: &str = "listener-sft";
pub const DPO_MODEL: &str = "listener-dpo";

pub const SFT_REPLY: &str = "听起来你真的很难受。";
pub const DPO_REPLY: &str = "我在这里陪着你。";
pub const TRANSLATED_INPUT: &str = "你好，我感到焦虑";
pub const SFT_REPLY_EN: &str = "It sounds like you are really struggling.";
pub const DPO_REPLY_EN: &str = "I am here with you.";

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    /// Well-formed listener replies and translations.
    Healthy,
    /// Adapter outputs never contain the reply delimiter.
    NoDelimiter,
    /// Every request fails with HTTP 500.
    ServerError,
}

struct MockState {
    mode: MockMode,
    requests: AtomicUsize,
}

pub struct MockInferenceServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockInferenceServer {
    pub async fn start(mode: MockMode) -> Self {
        let state = Arc::new(MockState {
            mode,
            requests: AtomicUsize::new(0),
        });

        let app = axum::Router::new()
            .route("/v1/completions", post(mock_completion_handler))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockInferenceServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

async fn mock_completion_handler(
    State(state): State<Arc<MockState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);

    if state.mode == MockMode::ServerError {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
    }

    let model = body["model"].as_str().unwrap_or_default();
    let prompt = body["prompt"].as_str().unwrap_or_default();
    let text = match model {
        BASE_MODEL if prompt.contains("翻译成中文") => TRANSLATED_INPUT.to_owned(),
        BASE_MODEL if prompt.contains(SFT_REPLY) => SFT_REPLY_EN.to_owned(),
        BASE_MODEL => DPO_REPLY_EN.to_owned(),
        _ if state.mode == MockMode::NoDelimiter => "just thinking out loud".to_owned(),
        SFT_MODEL => format!("【倾听者思维链】：共情\n【倾听者回复】：{SFT_REPLY}"),
        DPO_MODEL => format!("【倾听者回复】：{DPO_REPLY}\n"),
        other => {
            return (StatusCode::NOT_FOUND, format!("unknown model {other}")).into_response();
        }
    };

    Json(serde_json::json!({
        "id": "cmpl-test",
        "object": "text_completion",
        "created": 1700000000,
        "model": model,
        "choices": [{"index": 0, "text": text, "finish_reason": "stop"}]
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// TestApp — a real la server against the mock inference server
// ---------------------------------------------------------------------------

pub const MEMBER: &str = "alice";
pub const MEMBER_PASSWORD: &str = "wonderland";
pub const ANONYMOUS_PASSWORD: &str = "test_mode";
pub const COOKIE_NAME: &str = "la_session";

pub struct TestApp {
    pub addr: SocketAddr,
    pub data_dir: tempfile::TempDir,
    pub client: reqwest::Client,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn start(inference_url: &str) -> Self {
        Self::start_with_policy(inference_url, ResponseIdPolicyConfig::Lenient).await
    }

    pub async fn start_with_policy(inference_url: &str, policy: ResponseIdPolicyConfig) -> Self {
        let data_dir = tempfile::tempdir().expect("tempdir");

        let config = AppConfig {
            server: ServerConfig {
                listen: "127.0.0.1:0".to_owned(),
                cookie_name: COOKIE_NAME.to_owned(),
                session_ttl_secs: 3600,
            },
            logging: LoggingConfig::default(),
            inference: InferenceConfig {
                base_url: inference_url.to_owned(),
                api_key: None,
                base_model: BASE_MODEL.to_owned(),
                sft_adapter: SFT_MODEL.to_owned(),
                dpo_adapter: DPO_MODEL.to_owned(),
                max_tokens: 512,
                temperature: 0.9,
                top_p: 0.9,
                top_k: 50,
                reply_delimiter: "【倾听者回复】：".to_owned(),
                max_attempts: 2,
                timeout_ms: 5_000,
            },
            language: LanguageConfig::default(),
            store: StoreConfig {
                backend: StoreBackendConfig::JsonDir,
                path: data_dir.path().to_path_buf(),
                response_ids: policy,
            },
            participants: ParticipantsConfig {
                anonymous_password: ANONYMOUS_PASSWORD.to_owned(),
                users_file: None,
                members: vec![MemberConfig {
                    username: MEMBER.to_owned(),
                    password: MEMBER_PASSWORD.to_owned(),
                }],
            },
        };

        let runtime =
            la_server::bootstrap::into_runtime(config).expect("test config should be valid");
        let state = Arc::new(
            AppState::from_runtime(runtime, reqwest::Client::new()).expect("app state"),
        );
        let app = la_server::handler::router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind app");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            addr,
            data_dir,
            client: reqwest::Client::new(),
            _handle: handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Log in and return the `Cookie` header value for later requests.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let resp = self
            .client
            .post(self.url("/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .expect("login request");
        assert_eq!(resp.status(), 200, "login should succeed");

        let set_cookie = resp
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("set-cookie header")
            .to_owned();
        set_cookie
            .split(';')
            .next()
            .expect("cookie pair")
            .to_owned()
    }

    pub async fn post_form(&self, cookie: &str, path: &str, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header(reqwest::header::COOKIE, cookie)
            .form(form)
            .send()
            .await
            .expect("form request")
    }

    pub async fn post_json(
        &self,
        cookie: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header(reqwest::header::COOKIE, cookie)
            .json(body)
            .send()
            .await
            .expect("json request")
    }

    pub async fn chat(&self, cookie: &str, message: &str) -> serde_json::Value {
        let resp = self.post_form(cookie, "/chat", &[("message", message)]).await;
        assert_eq!(resp.status(), 200, "chat should succeed");
        resp.json().await.expect("chat json")
    }

    /// The stored documents, sorted by file name.
    pub fn document_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(self.data_dir.path())
            .expect("read data dir")
            .map(|entry| entry.expect("dir entry").path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        paths
    }

    pub fn only_document(&self) -> serde_json::Value {
        let paths = self.document_paths();
        assert_eq!(paths.len(), 1, "expected exactly one session document");
        let text = std::fs::read_to_string(&paths[0]).expect("read document");
        serde_json::from_str(&text).expect("document json")
    }

    pub fn only_document_bytes(&self) -> Vec<u8> {
        let paths = self.document_paths();
        assert_eq!(paths.len(), 1, "expected exactly one session document");
        std::fs::read(&paths[0]).expect("read document")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
