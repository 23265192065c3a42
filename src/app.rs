use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::admin;
use crate::cell::Row;
use crate::config::Config;
use crate::downloader::{self, ExportFormat};
use crate::error::{AppError, AppResult};
use crate::insights::{self, GeminiClient, InsightRequest, RetryPolicy, TextGenerator};
use crate::loader::{self, UploadPolicy};
use crate::login::{self, CurrentUser, SessionStore};
use crate::rate_limit::RateLimiter;
use crate::statistics::{self, ColumnStatistics};
use crate::store::{Analysis, FileRecord, Store};

/// Request bodies may exceed the upload ceiling so oversized files get a proper
/// rejection message instead of a bare 413
const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Shared state of the HTTP server
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub sessions: SessionStore,
    pub limiter: RateLimiter,
    /// `None` when no API key is configured
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub retry: RetryPolicy,
    pub upload_policy: UploadPolicy,
}

impl AppState {
    pub fn new(config: Config, store: Store, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self {
            sessions: SessionStore::new(config.session_ttl),
            config,
            store,
            limiter: RateLimiter::default(),
            generator,
            retry: RetryPolicy::default(),
            upload_policy: UploadPolicy::default(),
        }
    }
}

#[derive(Deserialize)]
struct FileQuery {
    #[serde(default)]
    filename: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    data: Vec<Row>,
    columns: Vec<String>,
    row_count: usize,
    statistics: Vec<ColumnStatistics>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisInput {
    chart_type: String,
    #[serde(default)]
    x_axis: Option<String>,
    #[serde(default)]
    y_axis: Option<String>,
}

#[derive(Deserialize)]
struct TrackRequest {
    #[serde(default)]
    filename: String,
    analysis: AnalysisInput,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportRequest {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    format: ExportFormat,
    #[serde(default)]
    include_stats: bool,
}

/// Build the router over `state`
///
/// Excel and settings routes require a session; admin routes additionally require
/// the admin role.
pub fn router(state: Arc<AppState>) -> Router {
    let auth = || middleware::from_fn_with_state(state.clone(), login::require_auth);

    let public = Router::new()
        .route("/", get(serve_root))
        .route("/api/users/register", post(login::handle_register))
        .route("/api/users/login", post(login::handle_login))
        .route("/api/users/logout", post(login::handle_logout))
        .route("/api/users/create-admin", post(login::handle_create_admin));

    let authenticated = Router::new()
        .route(
            "/api/users/settings",
            get(login::get_settings).post(login::update_settings),
        )
        .route(
            "/api/excel/upload",
            post(upload_file).layer(DefaultBodyLimit::max(BODY_LIMIT)),
        )
        .route("/api/excel/files", get(list_files))
        .route("/api/excel/analyze", post(analyze_file))
        .route("/api/excel/stats", get(dashboard_stats))
        .route("/api/excel/track-analysis", post(track_analysis))
        .route("/api/excel/generate-insights", post(generate_insights))
        .route("/api/excel/export", post(export_file))
        .route_layer(auth());

    let admin_routes = Router::new()
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/stats", get(admin::stats))
        .route(
            "/api/admin/users/:id/status",
            patch(admin::update_user_status),
        )
        .route_layer(middleware::from_fn(login::require_admin))
        .route_layer(auth());

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(admin_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
///
/// Opens the store, sets up the AI client when an API key is configured, and
/// serves until the process is stopped.
///
/// # Errors
/// * Returns an error if the store cannot be opened or the address cannot be bound
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(&config.data_dir)?;

    let generator: Option<Arc<dyn TextGenerator>> = match GeminiClient::from_config(&config)? {
        Some(client) => {
            log::info!("AI insights enabled with model {}", config.gemini_model);
            Some(Arc::new(client))
        }
        None => {
            log::warn!("GEMINI_API_KEY not set, AI insights are disabled");
            None
        }
    };

    let addr = config.bind_addr();
    let app = router(Arc::new(AppState::new(config, store, generator)));

    let listener = TcpListener::bind(&addr).await?;
    log::info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_root() -> &'static str {
    "Excel Analytics API is running"
}

/// Load and parse a stored file owned by `user`
fn load_table(
    state: &AppState,
    user: &CurrentUser,
    filename: &str,
) -> AppResult<(FileRecord, loader::Table)> {
    if filename.trim().is_empty() {
        return Err(AppError::InvalidInput("Filename is required".to_string()));
    }

    let record = state
        .store
        .find_file(&user.id, filename)?
        .ok_or_else(|| AppError::NotFound("File not found or unauthorized".to_string()))?;
    let bytes = state.store.read_upload(&record.filename)?;
    let table = loader::parse_workbook(&bytes)?;

    Ok((record, table))
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload.xlsx").to_string();
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Invalid upload: {}", e)))?;
        upload = Some((original_name, mime, bytes));
        break;
    }

    let Some((original_name, mime, bytes)) = upload else {
        return Err(AppError::InvalidInput("Please upload a file".to_string()));
    };

    let staged = loader::stage_upload(
        &state.upload_policy,
        &state.store.uploads_dir(),
        &bytes,
        &mime,
    )?;

    let filename = loader::persist_upload(
        staged,
        &state.store.uploads_dir(),
        &original_name,
        Utc::now(),
    )?;

    let record = state.store.insert_file(FileRecord::new(
        filename,
        original_name,
        user.id.clone(),
        bytes.len() as u64,
    ))?;

    log::info!(
        "User '{}' uploaded {} ({} bytes)",
        user.username,
        record.filename,
        record.size
    );

    Ok(Json(serde_json::json!({
        "message": "File uploaded successfully",
        "filename": record.filename,
    })))
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<serde_json::Value>> {
    let files = state.store.files_for_user(&user.id)?;
    Ok(Json(serde_json::json!({ "files": files })))
}

async fn analyze_file(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(query): Json<FileQuery>,
) -> AppResult<Json<AnalyzeResponse>> {
    let (record, table) = load_table(&state, &user, &query.filename)?;
    let statistics = statistics::summarize(&table.rows, &table.columns);

    state
        .store
        .update_file(&user.id, &record.filename, |file| {
            file.last_accessed = Utc::now()
        })?;

    log::info!(
        "Analyzed {}: {} rows, {} numeric columns",
        record.filename,
        table.row_count(),
        statistics.len()
    );

    Ok(Json(AnalyzeResponse {
        row_count: table.row_count(),
        columns: table.columns,
        data: table.rows,
        statistics,
    }))
}

async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<admin::DashboardStats>> {
    let files = state.store.files_for_user(&user.id)?;
    Ok(Json(admin::dashboard_stats(&files)))
}

async fn track_analysis(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<TrackRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if request.filename.trim().is_empty() {
        return Err(AppError::InvalidInput("Filename is required".to_string()));
    }

    let analysis = Analysis {
        chart_type: request.analysis.chart_type.parse()?,
        x_axis: request.analysis.x_axis,
        y_axis: request.analysis.y_axis,
        created_at: Utc::now(),
    };

    let record = state
        .store
        .update_file(&user.id, &request.filename, |file| {
            file.analyses.push(analysis)
        })?;

    Ok(Json(serde_json::json!({
        "message": "Analysis tracked successfully",
        "analysesCount": record.analyses.len(),
    })))
}

async fn generate_insights(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<InsightRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let Some(generator) = state.generator.as_ref() else {
        return Err(AppError::upstream(
            "AI service is not configured. Please set GEMINI_API_KEY.",
        ));
    };

    if !state.limiter.allow(&user.id) {
        return Err(AppError::RateLimited);
    }

    log::info!(
        "Generating insights for '{}' over {} columns",
        user.username,
        request.columns.len()
    );
    let insights = insights::generate_insights(&**generator, &request, &state.retry).await?;

    Ok(Json(serde_json::json!({ "insights": insights })))
}

async fn export_file(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<ExportRequest>,
) -> AppResult<Response> {
    let (record, table) = load_table(&state, &user, &request.filename)?;
    let columns = downloader::select_columns(&table, &request.columns)?;

    let bytes = match request.format {
        ExportFormat::Xlsx => downloader::to_xlsx(&table, &columns, request.include_stats)?,
        ExportFormat::Csv => downloader::to_csv(&table, &columns).into_bytes(),
    };

    let stem = record
        .original_name
        .rsplit_once('.')
        .map_or(record.original_name.as_str(), |(stem, _)| stem);
    let download_name = format!("{}_export.{}", stem, request.format.extension());
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback(&download_name),
        urlencoding::encode(&download_name)
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, request.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// Plain `filename=` value for clients that ignore `filename*`
fn ascii_fallback(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}
