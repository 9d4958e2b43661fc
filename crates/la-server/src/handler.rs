use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use la_core::core::{
    ArenaError, GenerationError, ListenerPromptBuilder, LoginError,
    ParticipantDirectory, Password, ReplyOptions, SessionId, Timestamp, UserId, UserMode,
};
use la_store::{PostSurvey, PreSurvey, SessionDocument, SessionStore, StoreError};

use crate::arbiter::{shuffle_for_display, ResponseArbiter};
use crate::bootstrap::RuntimeConfig;
use crate::generation::Generator;
use crate::normalizer::LanguageNormalizer;
use crate::outbound::OpenAiCompletionsBackend;
use crate::sessions::{
    expired_cookie, session_cookie, token_from_headers, ParticipantSession, SessionRegistry,
};

/// Wall-clock layout of every stored `time` and `start_time` value.
pub const TIME_FORMAT: &str = "%y-%m-%d-%H-%M-%S";

// ---------------------------------------------------------------------------
// AppState — shared state for all handlers
// ---------------------------------------------------------------------------

pub struct AppState {
    pub arbiter: ResponseArbiter,
    pub store: Arc<SessionStore>,
    pub participants: ParticipantDirectory,
    pub sessions: SessionRegistry,
    pub cookie_name: String,
}

impl AppState {
    pub fn from_runtime(
        runtime: RuntimeConfig,
        http_client: reqwest::Client,
    ) -> Result<Self, anyhow::Error> {
        let store = runtime.open_store()?;
        let backend = Arc::new(OpenAiCompletionsBackend::new(
            http_client,
            runtime.inference_base_url,
            runtime.inference_api_key,
            runtime.models,
        ));
        let generator = Generator::new(backend, runtime.reply_parser, runtime.generation);
        let arbiter = ResponseArbiter::new(
            generator.clone(),
            LanguageNormalizer::new(generator, runtime.language),
            Arc::new(ListenerPromptBuilder),
        );

        Ok(Self {
            arbiter,
            store: Arc::new(store),
            participants: runtime.participants,
            sessions: SessionRegistry::new(runtime.session_ttl),
            cookie_name: runtime.cookie_name,
        })
    }

    async fn current_session(
        &self,
        headers: &HeaderMap,
    ) -> Result<(String, ParticipantSession), ApiError> {
        let token =
            token_from_headers(headers, &self.cookie_name).ok_or(ApiError::Unauthenticated)?;
        let session = self
            .sessions
            .get(&token)
            .await
            .ok_or(ApiError::Unauthenticated)?;
        Ok((token, session))
    }

    /// Run a store operation on the blocking pool.
    async fn with_store<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&SessionStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|err| ApiError::Internal(format!("failed to join store task: {err}")))?
            .map_err(ApiError::Store)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/submit-pre-questions", post(submit_pre_questions))
        .route("/chat", post(chat))
        .route("/selected_response", post(selected_response))
        .route("/feedback", post(feedback))
        .route("/rating", post(rating))
        .route("/overall_feedback", post(overall_feedback))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageForm {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackForm {
    pub response_id: usize,
    pub feedback: String,
}

#[derive(Debug, Deserialize)]
pub struct RatingForm {
    pub response_id: usize,
    pub rating: i64,
}

#[derive(Debug, Serialize)]
struct LoginResponse<'a> {
    success: bool,
    username: &'a str,
    user_mode: UserMode,
    message: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub response_id: usize,
    pub reply: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let user_mode = state
        .participants
        .authenticate(&form.username, &Password::new(form.password))
        .map_err(|err| {
            tracing::info!(username = %form.username, error = %err, "login rejected");
            ApiError::from(ArenaError::from(err))
        })?;

    let id = SessionId::new(UserId::new(form.username.as_str()), now_timestamp());
    let initial = SessionDocument::new(&id, user_mode);
    {
        let id = id.clone();
        state
            .with_store(move |store| store.create_if_absent(&id, initial))
            .await?;
    }

    let token = state
        .sessions
        .open(ParticipantSession {
            id: id.clone(),
            user_mode,
        })
        .await;
    tracing::info!(session = %id, %user_mode, "participant logged in");

    let body = LoginResponse {
        success: true,
        username: &form.username,
        user_mode,
        message: "登录成功",
    };
    Ok((
        [(header::SET_COOKIE, session_cookie(&state.cookie_name, &token))],
        Json(body),
    )
        .into_response())
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = token_from_headers(&headers, &state.cookie_name) {
        if let Some(session) = state.sessions.close(&token).await {
            tracing::info!(session = %session.id, "participant logged out");
        }
    }
    (
        [(header::SET_COOKIE, expired_cookie(&state.cookie_name))],
        Json(json!({ "success": true })),
    )
        .into_response()
}

pub async fn submit_pre_questions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(survey): Json<PreSurvey>,
) -> Result<Response, ApiError> {
    let (_, session) = state.current_session(&headers).await?;
    if survey.keywords.is_empty() {
        return Err(ApiError::BadRequest("keywords must not be empty".to_owned()));
    }

    let id = session.id.clone();
    let initial = SessionDocument::new(&session.id, session.user_mode);
    state
        .with_store(move |store| {
            store.create_if_absent(&id, initial)?;
            store.set_presurvey(&id, survey)
        })
        .await?;

    Ok(Json(json!({ "success": true })).into_response())
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<MessageForm>,
) -> Result<Json<ReplyOptions>, ApiError> {
    let (_, session) = state.current_session(&headers).await?;
    if form.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_owned()));
    }

    let _turn = state.sessions.lock_turn(&session.id).await;

    let doc = {
        let id = session.id.clone();
        state.with_store(move |store| store.load(&id)).await?
    };

    let outcome = state
        .arbiter
        .respond(&doc.dialogue, &form.message, now_timestamp())
        .await
        .map_err(|err| {
            tracing::warn!(session = %session.id, error = %err, "candidate generation failed");
            ApiError::from(ArenaError::from(err))
        })?;
    let pair = outcome.candidates();

    let response_id = {
        let id = session.id.clone();
        let turns = outcome.into_turns();
        state
            .with_store(move |store| store.append_turns(&id, turns))
            .await?
    };
    tracing::info!(session = %session.id, response_id, "appended turn pair");

    Ok(Json(ReplyOptions {
        response_id,
        reply_options: shuffle_for_display(&pair),
    }))
}

pub async fn selected_response(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<MessageForm>,
) -> Result<Json<SelectionResponse>, ApiError> {
    let (_, session) = state.current_session(&headers).await?;

    let _turn = state.sessions.lock_turn(&session.id).await;

    let result = {
        let id = session.id.clone();
        let selected = form.message.clone();
        state
            .with_store(move |store| {
                let selection = store.overwrite_last_assistant_content(&id, &selected)?;
                let len = store.load(&id)?.dialogue.len();
                Ok((selection, len))
            })
            .await
    };

    let response_id = match result {
        Ok((selection, len)) => {
            tracing::info!(
                session = %session.id,
                variant = %selection.variant(),
                response_id = len,
                "selection recorded"
            );
            len
        }
        Err(err) => {
            tracing::warn!(session = %session.id, error = %err, "selection not recorded");
            let id = session.id.clone();
            state
                .with_store(move |store| Ok(store.load(&id)?.dialogue.len()))
                .await
                .unwrap_or(0)
        }
    };

    Ok(Json(SelectionResponse {
        response_id,
        reply: form.message,
    }))
}

pub async fn feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<FeedbackForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, session) = state.current_session(&headers).await?;

    let id = session.id.clone();
    let result = state
        .with_store(move |store| {
            store.append_feedback(&id, form.response_id, form.feedback, now_timestamp())
        })
        .await;

    Ok(Json(analytics_ack(&session.id, "feedback", result)))
}

pub async fn rating(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<RatingForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, session) = state.current_session(&headers).await?;

    let id = session.id.clone();
    let result = state
        .with_store(move |store| {
            store.append_rating(&id, form.response_id, form.rating, now_timestamp())
        })
        .await;

    Ok(Json(analytics_ack(&session.id, "rating", result)))
}

pub async fn overall_feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(survey): Json<PostSurvey>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, session) = state.current_session(&headers).await?;

    let id = session.id.clone();
    state
        .with_store(move |store| store.set_post_survey(&id, survey))
        .await?;
    state.sessions.close(&token).await;
    tracing::info!(session = %session.id, "post-survey recorded, session closed");

    Ok(Json(json!({
        "message": "感谢您的反馈！",
        "success": true,
    })))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn now_timestamp() -> Timestamp {
    Timestamp::new(chrono::Local::now().format(TIME_FORMAT).to_string())
}

/// Feedback and ratings never fail the request; a rejected write is logged.
fn analytics_ack(
    session: &SessionId,
    kind: &str,
    result: Result<(), ApiError>,
) -> serde_json::Value {
    let recorded = match result {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(%session, kind, error = %err, "analytics entry not recorded");
            false
        }
    };
    json!({ "success": true, "recorded": recorded })
}

// ---------------------------------------------------------------------------
// ApiError — everything a handler can fail with
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated,
    Arena(ArenaError),
    Store(StoreError),
    BadRequest(String),
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthenticated => f.write_str("no active session; please log in"),
            ApiError::Arena(err) => write!(f, "{err}"),
            ApiError::Store(err) => write!(f, "{err}"),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => f.write_str(msg),
        }
    }
}

impl From<ArenaError> for ApiError {
    fn from(err: ArenaError) -> Self {
        ApiError::Arena(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_to_response(self)
    }
}

pub fn error_to_response(err: ApiError) -> Response {
    let (status, error_type, retryable) = match &err {
        ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "authentication_error", false),
        ApiError::Arena(ArenaError::Login(LoginError::InvalidCredentials)) => {
            (StatusCode::UNAUTHORIZED, "authentication_error", false)
        }
        ApiError::Arena(ArenaError::Login(LoginError::UnsafeUsername(_))) => {
            (StatusCode::BAD_REQUEST, "invalid_request_error", false)
        }
        ApiError::Arena(ArenaError::Generation(failure @ GenerationError::Backend(_))) => {
            (StatusCode::BAD_GATEWAY, "backend_error", failure.is_retryable())
        }
        ApiError::Arena(ArenaError::Generation(failure)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "generation_error",
            failure.is_retryable(),
        ),
        ApiError::Arena(ArenaError::Transcript(_)) | ApiError::Store(StoreError::Transcript(_)) => {
            (StatusCode::CONFLICT, "stale_selection", false)
        }
        ApiError::Store(StoreError::SessionNotFound(_)) => {
            (StatusCode::NOT_FOUND, "not_found_error", false)
        }
        ApiError::Store(StoreError::OrphanFeedback { .. } | StoreError::OrphanRating { .. }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_request_error",
            false,
        ),
        ApiError::Store(StoreError::InvalidSessionKey(_)) | ApiError::BadRequest(_) => {
            (StatusCode::BAD_REQUEST, "invalid_request_error", false)
        }
        ApiError::Store(_) | ApiError::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "server_error", false)
        }
    };

    if status.is_server_error() {
        tracing::error!(error = %err, status = status.as_u16(), "request failed");
    }

    let message = err.to_string();
    let mut body = json!({
        "error": {
            "message": message,
            "type": error_type,
            "code": status.as_u16(),
            "retryable": retryable,
        }
    });
    // The login page reads the flat `success`/`message` pair.
    if matches!(err, ApiError::Arena(ArenaError::Login(_))) {
        body["success"] = json!(false);
        body["message"] = json!(message);
    }

    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use la_core::core::{BackendError, ModelSelector, TranscriptError, Variant};

    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn test_generation_exhausted_is_retryable_503() {
        let err = ApiError::from(ArenaError::from(GenerationError::Exhausted {
            selector: ModelSelector::Adapter(Variant::Sft),
            attempts: 5,
        }));
        let resp = error_to_response(err);
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(resp).await;
        assert!(body.get("success").is_none());
        assert_eq!(body["error"]["type"], "generation_error");
        assert_eq!(body["error"]["retryable"], true);
        assert_eq!(body["error"]["code"], 503);
    }

    #[tokio::test]
    async fn test_timeout_is_retryable_503() {
        let err = ApiError::from(ArenaError::from(GenerationError::Timeout {
            selector: ModelSelector::Base,
            timeout_ms: 10,
        }));
        let resp = error_to_response(err);
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_backend_error_is_502() {
        let err = ApiError::from(ArenaError::from(GenerationError::from(
            BackendError::HttpStatus {
                status: 400,
                body: "bad".to_owned(),
            },
        )));
        let resp = error_to_response(err);
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["retryable"], false);
    }

    #[tokio::test]
    async fn test_backend_retryable_flag_matches_generation_error() {
        let cases = [
            BackendError::Connection("refused".to_owned()),
            BackendError::HttpStatus {
                status: 503,
                body: "overloaded".to_owned(),
            },
            BackendError::MalformedResponse("no choices".to_owned()),
        ];
        for backend in cases {
            let err = GenerationError::from(backend);
            let expected = err.is_retryable();
            let resp = error_to_response(ApiError::from(ArenaError::from(err)));
            assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
            let body = body_json(resp).await;
            assert_eq!(body["error"]["retryable"], expected);
        }
    }

    #[tokio::test]
    async fn test_login_error_is_401_with_bilingual_message() {
        let err = ApiError::from(ArenaError::from(LoginError::InvalidCredentials));
        let resp = error_to_response(err);
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(resp).await;
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("用户名或密码无效"));
        assert!(message.contains("Invalid username or password"));
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], body["error"]["message"]);
    }

    #[tokio::test]
    async fn test_store_error_mapping() {
        let cases = [
            (
                StoreError::SessionNotFound("alice_x".to_owned()),
                StatusCode::NOT_FOUND,
            ),
            (
                StoreError::Transcript(TranscriptError::UnknownCandidate),
                StatusCode::CONFLICT,
            ),
            (
                StoreError::OrphanRating {
                    response_id: 9,
                    dialogue_len: 2,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                StoreError::Io(std::io::Error::other("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(error_to_response(ApiError::from(err)).status(), status);
        }
    }

    #[test]
    fn test_now_timestamp_layout() {
        let ts = now_timestamp();
        let parts: Vec<_> = ts.as_str().split('-').collect();
        assert_eq!(parts.len(), 6);
        assert!(parts.iter().all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_digit())));
    }
}
