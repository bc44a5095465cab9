use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, Query, Request, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::{get, post},
};
use futures::StreamExt;
use sambung_ai::{
    AppError, ChatClient, ChatMessage, CompletionResult, ErrorKind, FileCredentialStore, ModelInfo,
    ModelValidation, ProviderConfig, ProviderKind,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Header carrying the caller's opaque session user id.
pub const USER_ID_HEADER: &str = "x-user-id";

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub client: ChatClient,
}

impl AppState {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    /// Environment defaults plus per-user keys from a credentials file.
    pub fn with_credentials(path: PathBuf) -> Self {
        let store = FileCredentialStore::new(path);
        Self::new(ChatClient::builder().with_credential_store(Arc::new(store)).build())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ai/complete", post(complete))
        .route("/ai/stream", post(stream))
        .route("/ai/models", get(list_models))
        .route("/ai/models/validate", post(validate_model))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(host: &str, port: u16, credentials: PathBuf) -> anyhow::Result<()> {
    tracing::info!(path = %credentials.display(), "using credentials file");
    let state = Arc::new(AppState::with_credentials(credentials));
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("AI gateway listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Errors and extractors
// ---------------------------------------------------------------------------

/// Renders as `{"error": AppError}` with the kind's status code.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.0 }))).into_response()
    }
}

pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| {
                ApiError(AppError::new(
                    ErrorKind::AuthenticationFailed,
                    format!("Missing {USER_ID_HEADER} header"),
                ))
            })
    }
}

/// JSON body whose failures render as [`ApiError`] like every other error.
///
/// Unknown provider names are `Configuration` errors; any other malformed
/// body is `InvalidParameter`.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<serde_json::Value>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError(AppError::new(ErrorKind::InvalidParameter, rejection.body_text())))?;
        serde_json::from_value(value).map(ApiJson).map_err(|e| ApiError(body_error(e)))
    }
}

fn body_error(err: serde_json::Error) -> AppError {
    let message = err.to_string();
    if message.starts_with("Unsupported provider") {
        AppError::configuration(message)
    } else {
        AppError::new(ErrorKind::InvalidParameter, format!("Invalid request body: {message}"))
    }
}

// ---------------------------------------------------------------------------
// POST /ai/complete, POST /ai/stream
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatBody {
    config: ProviderConfig,
    messages: Vec<ChatMessage>,
}

async fn complete(
    State(state): State<Arc<AppState>>,
    UserId(user): UserId,
    ApiJson(body): ApiJson<ChatBody>,
) -> Result<Json<CompletionResult>, ApiError> {
    let result = state.client.complete(&user, &body.config, body.messages).await?;
    Ok(Json(result))
}

/// Setup failures answer with a plain error response; anything after the
/// first byte arrives as an `error` event.
async fn stream(
    State(state): State<Arc<AppState>>,
    UserId(user): UserId,
    ApiJson(body): ApiJson<ChatBody>,
) -> Result<Response, ApiError> {
    let events = state.client.stream(&user, &body.config, body.messages).await?;
    let sse = events.map(|event| Event::default().event(event.name()).json_data(&event));
    Ok(Sse::new(sse).into_response())
}

// ---------------------------------------------------------------------------
// GET /ai/models, POST /ai/models/validate
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ModelsQuery {
    provider: Option<String>,
}

async fn list_models(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModelsQuery>,
) -> Result<Json<Vec<ModelInfo>>, ApiError> {
    let provider = query
        .provider
        .as_deref()
        .map(str::parse::<ProviderKind>)
        .transpose()?;
    Ok(Json(state.client.list_models(provider)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateBody {
    provider: ProviderKind,
    model_id: String,
}

async fn validate_model(
    State(state): State<Arc<AppState>>,
    UserId(user): UserId,
    ApiJson(body): ApiJson<ValidateBody>,
) -> Result<Json<ModelValidation>, ApiError> {
    let validation = state
        .client
        .validate_model(&user, body.provider, &body.model_id)
        .await?;
    Ok(Json(validation))
}
