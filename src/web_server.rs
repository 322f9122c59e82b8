use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    serve, Json, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use std::{
    future::Future,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::assistant::NutritionAssistant;
use crate::config::Config;
use crate::constants::TITLE_HEADER;
use crate::error::{ApiError, NicError};
use crate::models::{parse_chat_request, ChatMessage, ChatReply};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    // One pooled client shared by every request
    http: reqwest::Client,
    templates: Arc<AutoReloader>,
}

impl AppState {
    pub fn new(config: Config, templates_dir: impl AsRef<Path>) -> Self {
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
            templates: Arc::new(create_minijinja_env(templates_dir.as_ref().to_path_buf())),
        }
    }

    fn assistant(&self) -> Result<NutritionAssistant, ApiError> {
        NutritionAssistant::from_config(&self.config, self.http.clone()).map_err(|e| self.fail(e))
    }

    fn fail(&self, error: NicError) -> ApiError {
        ApiError {
            error,
            expose_details: self.config.expose_error_details,
        }
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    // Use AutoReloader for development convenience
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(templates_dir.clone()));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, Html<String>)> {
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => "NIC",
                    version => env!("CARGO_PKG_VERSION"),
                };
                tmpl.render(context)
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "nic",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn parse_body(state: &AppState, body: &Bytes) -> Result<Vec<ChatMessage>, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| state.fail(NicError::validation(format!("request body is not valid JSON: {}", e))))?;
    parse_chat_request(&value).map_err(|e| state.fail(e))
}

// POST /api/chat: full reply as JSON
async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Result<Json<ChatReply>, ApiError> {
    let assistant = state.assistant()?;
    let messages = parse_body(&state, &body)?;
    info!(messages = messages.len(), "Chat request received");

    let reply = assistant.reply(&messages).await.map_err(|e| state.fail(e))?;
    debug!(title = ?reply.title, "Chat reply ready");
    Ok(Json(reply))
}

// POST /api/chat/stream: tokens relayed as a plain-text body
async fn chat_stream_handler(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let assistant = state.assistant()?;
    let messages = parse_body(&state, &body)?;
    info!(messages = messages.len(), "Streaming chat request received");

    let reply = assistant
        .reply_stream(&messages)
        .await
        .map_err(|e| state.fail(e))?;

    let mut response = Response::new(Body::from_stream(reply.tokens));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if let Some(title) = reply.title {
        // Percent-encoded so non-ASCII titles survive as a header value
        let encoded = urlencoding::encode(&title);
        match HeaderValue::from_str(&encoded) {
            Ok(value) => {
                response.headers_mut().insert(TITLE_HEADER, value);
            }
            Err(_) => warn!(%title, "Title is not a valid header value, dropping it"),
        }
    }
    Ok(response)
}

// GET /api/test: connectivity check against the completion provider
async fn diagnostic_handler(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = match NutritionAssistant::from_config(&state.config, state.http.clone()) {
        Ok(assistant) => assistant.diagnose().await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(response) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "response": response })),
        ),
        Err(e) => {
            error!("Diagnostic completion failed: {}", e.details());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}

/// Builds the application router; separate from `start_web_server` so tests can drive it in-process.
pub fn create_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    // Serve static files, answering misses with a plain 404
    let static_files_service = ServeDir::new(static_dir.as_ref()).not_found_service(tower::service_fn(|_req: axum::extract::Request| async {
        Ok::<_, std::convert::Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
    }));

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/test", get(diagnostic_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub struct ServerOptions {
    pub port: u16,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
}

pub async fn start_web_server<F>(config: Config, options: ServerOptions, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let missing = config.missing_credentials();
    if !missing.is_empty() {
        // Requests will be answered with a configuration error until these are set
        warn!(?missing, "Credentials missing; chat requests will fail");
    }

    let state = AppState::new(config, &options.templates_dir);
    let app = create_router(state, &options.static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], options.port));
    info!("Web server listening on http://{}", addr);

    // Bind using tokio::net::TcpListener
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("Web server failed")?;

    Ok(())
}
