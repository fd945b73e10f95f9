use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use minijinja::{context, Environment};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use chatdrop_shared::constants::APP_NAME;
use chatdrop_shared::{MessageRecord, ServerEvent};
use chatdrop_store::MessageStore;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::gateway;
use crate::hub::ClientHub;
use crate::responder::AiResponder;
use crate::uploads::UploadStore;

const INDEX_TEMPLATE: &str = "index.html";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MessageStore>,
    pub uploads: Arc<UploadStore>,
    pub responder: Arc<AiResponder>,
    pub hub: ClientHub,
    pub templates: Arc<Environment<'static>>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Open the message log, create the upload directory and load templates.
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let store = MessageStore::open(config.messages_file.clone(), config.max_history).await?;
        let uploads = UploadStore::new(config.upload_dir.clone(), config.max_upload_size).await?;
        let responder = AiResponder::from_config(&config);

        let mut templates = Environment::new();
        templates.add_template(INDEX_TEMPLATE, include_str!("../templates/index.html"))?;

        info!(
            uploads = %uploads.base_path().display(),
            messages = %store.path().display(),
            ai_enabled = responder.is_enabled(),
            "Application state ready"
        );

        Ok(Self {
            store: Arc::new(store),
            uploads: Arc::new(uploads),
            responder: Arc::new(responder),
            hub: ClientHub::new(),
            templates: Arc::new(templates),
            config: Arc::new(config),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/ws", get(gateway::ws_handler))
        .route("/upload", post(upload))
        .route("/download/:filename", get(download))
        .layer(DefaultBodyLimit::max(state.config.max_upload_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connections: usize,
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    message: &'static str,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connections: state.hub.client_count().await,
    })
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, ServerError> {
    let messages = state.store.load().await;
    let page = state
        .templates
        .get_template(INDEX_TEMPLATE)
        .and_then(|tmpl| {
            tmpl.render(context! {
                app_name => APP_NAME,
                messages => messages,
            })
        })
        .map_err(|e| ServerError::Internal(format!("Failed to render page: {e}")))?;
    Ok(Html(page))
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let max = state.uploads.max_size();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let raw_name = field.file_name().unwrap_or("").to_string();
        if raw_name.trim().is_empty() {
            return Err(ServerError::MissingFile);
        }

        let data = field.bytes().await.map_err(|e| multipart_error(e, max))?;
        let stored = state.uploads.store_upload(&raw_name, &data).await?;

        let record = MessageRecord::file(stored.kind, stored.attachment());
        if let Err(e) = state.store.append(record.clone()).await {
            state.uploads.discard(&stored).await;
            return Err(e.into());
        }

        info!(
            filename = %stored.filename,
            kind = record.body.type_name(),
            size = data.len(),
            "File uploaded"
        );

        state.hub.broadcast(&ServerEvent::ReceiveFile(record)).await;

        return Ok(Json(UploadResponse {
            success: true,
            message: "File uploaded",
        }));
    }

    Err(ServerError::MissingFile)
}

fn multipart_error(e: MultipartError, max: usize) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::BodyTooLarge { max }
    } else {
        ServerError::BadRequest(format!("Multipart error: {}", e.body_text()))
    }
}

async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ServerError> {
    let path = state.uploads.download_path(&filename)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to open {}: {}", filename, e)))?;

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (header::CONTENT_DISPOSITION, attachment_header(&filename)?),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// `attachment` disposition with an ASCII fallback name plus the exact
/// UTF-8 name in RFC 5987 form.
fn attachment_header(filename: &str) -> Result<HeaderValue, ServerError> {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len() * 3);
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    HeaderValue::from_str(&format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}"
    ))
    .map_err(|e| ServerError::Internal(format!("Bad Content-Disposition: {e}")))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
