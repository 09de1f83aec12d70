use crate::export::export;
use crate::models::{
    CreateSessionResponse, ExportFormat, SearchResponse, SessionMeta, StreamSearchResponse,
};
use crate::session::SessionStore;
use crate::stream::{StreamService, StreamStatus, StreamingConfig};
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use log_parser::{filter_records, get_sources, FilterSpec, ParseError, ParserRegistry};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub registry: Arc<ParserRegistry>,
    pub stream: StreamService,
}

impl AppState {
    pub fn new(stream: StreamService) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new()),
            registry: Arc::new(ParserRegistry::new()),
            stream,
        }
    }
}

type ApiError = (StatusCode, String);

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/:id/meta", get(get_meta))
        .route("/sessions/:id/search", post(search_session))
        .route("/sessions/:id/export.json", get(export_json))
        .route("/sessions/:id/export.csv", get(export_csv))
        .route("/sessions/:id/export.arrow", get(export_arrow))
        .route("/sessions/:id", delete(delete_session))
        .route("/stream/start", post(start_stream))
        .route("/stream/stop", post(stop_stream))
        .route("/stream/status", get(stream_status))
        .route("/stream/search", post(search_stream))
        .route("/stream/clear", post(clear_stream))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[instrument(skip(state, multipart))]
async fn create_session(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    info!("Received file upload request");

    let mut file_data = None;
    let mut filename = String::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error!("Multipart error: {}", e);
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("unknown").to_string();
            info!("Receiving file: {}", filename);

            let data = field.bytes().await.map_err(|e| {
                error!("Failed to read file data: {}", e);
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?;
            info!("File data received: {} bytes", data.len());
            file_data = Some(data);
        }
    }

    let Some(data) = file_data else {
        error!("No file data provided in request");
        return Err((StatusCode::BAD_REQUEST, "No file provided".to_string()));
    };

    let content = String::from_utf8(data.to_vec()).map_err(|e| {
        warn!("Upload '{}' is not valid UTF-8: {}", filename, e);
        (
            StatusCode::BAD_REQUEST,
            format!("File '{}' is not UTF-8 text", filename),
        )
    })?;

    let registry = Arc::clone(&state.registry);
    let hint = filename.clone();
    let parsed = tokio::task::spawn_blocking(move || {
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        registry.parse_upload(content, &hint)
    })
    .await
    .map_err(|e| {
        error!("Parse task failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Parse task failed: {}", e))
    })?;

    let records = parsed.map_err(|e| match e {
        ParseError::NoRecords { .. } => {
            warn!("{}", e);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("No log records could be read from '{}'", filename),
            )
        }
        other => {
            error!("Parse error for file '{}': {}", filename, other);
            (StatusCode::BAD_REQUEST, format!("Parse error: {}", other))
        }
    })?;

    let session = state.sessions.create_session(&filename, records);
    Ok(Json(CreateSessionResponse {
        session_id: session.id.clone(),
        filename: session.filename.clone(),
        total: session.records.len(),
    }))
}

fn not_found(session_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        format!("Session not found: {}", session_id),
    )
}

async fn get_meta(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionMeta>, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| not_found(&session_id))?;
    Ok(Json(session.meta()))
}

#[instrument(skip(state, spec), fields(session_id = %session_id))]
async fn search_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(spec): Json<FilterSpec>,
) -> Result<Json<SearchResponse>, ApiError> {
    debug!("Search filter: {:?}", spec);
    let session = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| not_found(&session_id))?;

    let matched = filter_records(&session.records, &spec);
    info!("Search matched {} of {} records", matched.len(), session.records.len());
    Ok(Json(SearchResponse::from(matched)))
}

async fn export_json(state: State<AppState>, path: Path<String>) -> Result<Response, ApiError> {
    export_session(state, path, ExportFormat::Json).await
}

async fn export_csv(state: State<AppState>, path: Path<String>) -> Result<Response, ApiError> {
    export_session(state, path, ExportFormat::Csv).await
}

async fn export_arrow(state: State<AppState>, path: Path<String>) -> Result<Response, ApiError> {
    export_session(state, path, ExportFormat::Arrow).await
}

#[instrument(skip(state))]
async fn export_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    format: ExportFormat,
) -> Result<Response, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| not_found(&session_id))?;

    let records = Arc::clone(&session.records);
    let body = tokio::task::spawn_blocking(move || export(&records, format))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Export task failed: {}", e)))?
        .map_err(|e| {
            error!("Export failed for session {}: {}", session_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    info!("Exported {} records as {}", session.records.len(), format.extension());
    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        attachment_filename(&session.filename),
        format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Makes an uploaded file name safe inside a quoted `Content-Disposition`.
fn attachment_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.delete_session(&session_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&session_id))
    }
}

#[instrument(skip(state, config), fields(endpoint = %config.endpoint))]
async fn start_stream(
    State(state): State<AppState>,
    Json(config): Json<StreamingConfig>,
) -> Result<Json<StreamStatus>, ApiError> {
    config.validate().map_err(|e| {
        warn!("Rejected stream config: {}", e);
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;

    state.stream.start_stream(config).await.map_err(|e| {
        error!("Stream failed to start: {}", e);
        (StatusCode::BAD_GATEWAY, e.to_string())
    })?;

    Ok(Json(state.stream.status()))
}

async fn stop_stream(State(state): State<AppState>) -> Json<StreamStatus> {
    state.stream.stop_stream();
    Json(state.stream.status())
}

async fn stream_status(State(state): State<AppState>) -> Json<StreamStatus> {
    Json(state.stream.status())
}

#[instrument(skip(state, spec))]
async fn search_stream(
    State(state): State<AppState>,
    Json(spec): Json<FilterSpec>,
) -> Json<StreamSearchResponse> {
    let window = state.stream.snapshot();
    let matched = filter_records(&window, &spec);
    debug!("Live search matched {} of {} records", matched.len(), window.len());

    Json(StreamSearchResponse {
        result: SearchResponse::from(matched),
        sources: get_sources(&window),
        status: state.stream.status(),
    })
}

async fn clear_stream(State(state): State<AppState>) -> StatusCode {
    state.stream.clear();
    StatusCode::NO_CONTENT
}
