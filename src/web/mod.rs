// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Web UI: upload form, result page, and history

mod error;
mod flash;
mod templates;

pub use error::WebError;
pub use flash::Flash;
pub use templates::Templates;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use minijinja::context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::db::{AnalysisRecord, Database};
use crate::pipeline::{UploadError, UploadForm, UploadOutcome, UploadPipeline, UploadedFile};

const HISTORY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub pipeline: UploadPipeline,
    pub templates: Templates,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database, pipeline: UploadPipeline) -> crate::Result<Self> {
        Ok(Self {
            config,
            db,
            pipeline,
            templates: Templates::new()?,
        })
    }
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.web.max_upload_bytes;
    let images = ServeDir::new(state.pipeline.images().dir());

    Router::new()
        // Pages
        .route("/", get(index_page).post(upload_image))
        .route("/results", get(results_page))
        .route("/history", get(history_page))
        // API endpoints
        .route("/api/analyses", get(api_get_analyses))
        // Stored images
        .nest_service(state.config.uploads.public_path.trim_end_matches('/'), images)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Page Handlers ===

async fn index_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let flash = flash::take(&headers);
    let allowed = state.pipeline.allowed_extensions();
    let accept: Vec<String> = allowed.iter().map(|e| format!(".{}", e)).collect();

    let html = state.templates.render(
        "index.html",
        context! {
            flash => flash.map(|f| f.message(allowed)),
            allowed_extensions => allowed.iter().map(|e| e.to_uppercase()).collect::<Vec<_>>(),
            accept => accept.join(","),
        },
    )?;

    let mut response = Html(html).into_response();
    if flash.is_some() {
        response.headers_mut().append(header::SET_COOKIE, flash::clear_cookie());
    }
    Ok(response)
}

async fn upload_image(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, WebError> {
    // A body that is not multipart carries no file part at all
    let form = match multipart {
        Ok(multipart) => read_upload_form(multipart).await?,
        Err(rejection) => {
            debug!("Upload without a multipart body: {}", rejection);
            UploadForm::default()
        }
    };
    let had_file_part = form.file.is_some();

    match state.pipeline.process(form).await {
        Ok(outcome) => {
            let location = results_location(&outcome)?;
            Ok(Redirect::to(&location).into_response())
        }
        Err(UploadError::MissingFile) if !had_file_part => {
            Ok(flash::redirect("/", Flash::NoFilePart))
        }
        Err(UploadError::MissingFile) => Ok(flash::redirect("/", Flash::NoSelectedFile)),
        Err(UploadError::UnsupportedFileType(name)) => {
            debug!("Rejected upload with unsupported type: {:?}", name);
            Ok(flash::redirect("/", Flash::InvalidFileType))
        }
        Err(UploadError::StorageUnavailable(e)) => Err(WebError::StorageUnavailable(e)),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ResultsQuery {
    filename: Option<String>,
    result: Option<String>,
}

async fn results_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResultsQuery>,
) -> Result<Html<String>, WebError> {
    let image_url = query
        .filename
        .as_deref()
        .filter(|f| !f.is_empty())
        .map(|f| state.config.image_url(f));

    let html = state.templates.render(
        "result.html",
        context! {
            image_url => image_url,
            emotion => query.result,
        },
    )?;
    Ok(Html(html))
}

#[derive(Serialize)]
struct HistoryRow {
    user_name: String,
    image_filename: String,
    image_url: String,
    analysis_result: String,
    timestamp: String,
}

async fn history_page(State(state): State<Arc<AppState>>) -> Result<Html<String>, WebError> {
    let records = state.db.list_analyses()?;

    let rows: Vec<HistoryRow> = records
        .into_iter()
        .map(|r| HistoryRow {
            image_url: state.config.image_url(&r.image_filename),
            timestamp: r.timestamp.format(HISTORY_TIMESTAMP_FORMAT).to_string(),
            user_name: r.user_name,
            image_filename: r.image_filename,
            analysis_result: r.analysis_result,
        })
        .collect();

    let html = state.templates.render("history.html", context! { records => rows })?;
    Ok(Html(html))
}

// === API Handlers ===

async fn api_get_analyses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AnalysisRecord>>, WebError> {
    Ok(Json(state.db.list_analyses()?))
}

// === Helpers ===

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, WebError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" if form.file.is_none() => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let data = field.bytes().await?;
                form.file = Some(UploadedFile { file_name, data });
            }
            "name" => {
                form.name = Some(field.text().await?);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    Ok(form)
}

fn results_location(outcome: &UploadOutcome) -> Result<String, WebError> {
    let query = ResultsQuery {
        filename: Some(outcome.filename.clone()),
        result: Some(outcome.result.clone()),
    };
    let query = serde_qs::to_string(&query)
        .map_err(|e| WebError::Internal(format!("Failed to encode result query: {}", e)))?;
    Ok(format!("/results?{}", query))
}

/// Start the web server with the assembled state
pub async fn start_server(state: AppState) -> crate::Result<()> {
    let addr = format!("{}:{}", state.config.web.host, state.config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Web UI available at http://{}", addr);

    let router = create_router(Arc::new(state));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{EmotionAnalyzer, EmotionOutcome};
    use crate::store::ImageStore;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::path::Path;
    use tower::ServiceExt as _;

    const BOUNDARY: &str = "emotiscope-test-boundary";

    struct FixedAnalyzer(EmotionOutcome);

    #[async_trait]
    impl EmotionAnalyzer for FixedAnalyzer {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn analyze(&self, _path: &Path) -> crate::Result<EmotionOutcome> {
            Ok(self.0.clone())
        }
    }

    fn make_state(dir: &tempfile::TempDir, outcome: EmotionOutcome) -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.uploads.dir = dir.path().join("uploads").to_string_lossy().to_string();

        let db = Database::in_memory().unwrap();
        let images = ImageStore::new(&config.uploads.dir).unwrap();
        let pipeline = UploadPipeline::new(
            images,
            db.clone(),
            Arc::new(FixedAnalyzer(outcome)),
            &config.uploads.allowed_extensions,
        );
        Arc::new(AppState::new(config, db, pipeline).unwrap())
    }

    /// Hand-built multipart body: `(field name, optional filename, content)`
    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_form(state: Arc<AppState>, parts: &[(&str, Option<&str>, &[u8])]) -> Response {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        create_router(state).oneshot(req).await.unwrap()
    }

    async fn get(state: Arc<AppState>, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        create_router(state)
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response) -> String {
        response.headers()[header::LOCATION].to_str().unwrap().to_string()
    }

    fn set_cookie(response: &Response) -> String {
        response.headers()[header::SET_COOKIE].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_index_renders_form() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::NoFace);

        let response = get(state, "/", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = body_text(response).await;
        assert!(body.contains("enctype=\"multipart/form-data\""));
        assert!(body.contains(".png,.jpg,.jpeg"));
    }

    #[tokio::test]
    async fn test_upload_redirects_to_results() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::Emotion("happy".to_string()));

        let response = post_form(
            state.clone(),
            &[("name", None, b"Alice"), ("file", Some("smile.jpg"), b"jpeg bytes")],
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let records = state.db.list_analyses().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.user_name, "Alice");
        assert_eq!(record.analysis_result, "Happy");
        assert!(record.image_filename.ends_with("_smile.jpg"));
        assert_eq!(record.image_filename.len(), "YYYYmmddHHMMSS_smile.jpg".len());

        let location = location(&response);
        let (path, query) = location.split_once('?').unwrap();
        assert_eq!(path, "/results");
        let query: ResultsQuery = serde_qs::from_str(query).unwrap();
        assert_eq!(query.filename.as_deref(), Some(record.image_filename.as_str()));
        assert_eq!(query.result.as_deref(), Some("Happy"));

        assert!(state.pipeline.images().path(&record.image_filename).exists());
    }

    #[tokio::test]
    async fn test_upload_without_name_is_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::NoFace);

        let response = post_form(state.clone(), &[("file", Some("blank.png"), b"png bytes")]).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let record = &state.db.list_analyses().unwrap()[0];
        assert_eq!(record.user_name, "Anonymous");
        assert_eq!(record.analysis_result, "No face detected");
    }

    #[tokio::test]
    async fn test_invalid_type_flashes_and_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::NoFace);

        let response = post_form(state.clone(), &[("file", Some("notes.txt"), b"hello")]).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        assert!(set_cookie(&response).starts_with("flash=invalid_file_type"));

        assert_eq!(state.db.get_analysis_count().unwrap(), 0);
        assert_eq!(std::fs::read_dir(state.pipeline.images().dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_part_flashes() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::NoFace);

        let response = post_form(state.clone(), &[("name", None, b"Alice")]).await;
        assert_eq!(location(&response), "/");
        assert!(set_cookie(&response).starts_with("flash=no_file_part"));
        assert_eq!(state.db.get_analysis_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_multipart_post_flashes_no_file_part() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::NoFace);

        let urlencoded = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=Alice"))
            .unwrap();
        let empty = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::empty())
            .unwrap();

        for req in [urlencoded, empty] {
            let response = create_router(state.clone()).oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/");
            assert!(set_cookie(&response).starts_with("flash=no_file_part"));
        }
        assert_eq!(state.db.get_analysis_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_store_failure_returns_500() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::Emotion("happy".to_string()));
        state.db.lock_conn().unwrap().execute_batch("DROP TABLE analyses").unwrap();

        let response = post_form(state, &[("file", Some("smile.jpg"), b"jpeg bytes")]).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::LOCATION).is_none());
        assert_eq!(body_text(response).await, "Internal Server Error");
    }

    #[tokio::test]
    async fn test_empty_selection_flashes() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::NoFace);

        let response = post_form(state.clone(), &[("file", Some(""), b"")]).await;
        assert_eq!(location(&response), "/");
        assert!(set_cookie(&response).starts_with("flash=no_selected_file"));
        assert_eq!(state.db.get_analysis_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flash_is_shown_once_and_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::NoFace);

        let response = get(state, "/", Some("flash=invalid_file_type")).await;
        assert!(set_cookie(&response).contains("Max-Age=0"));
        let body = body_text(response).await;
        assert!(body.contains("Invalid file type. Only PNG, JPG, JPEG are allowed."));
    }

    #[tokio::test]
    async fn test_results_page_shows_image_and_label() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::NoFace);

        let response = get(
            state,
            "/results?filename=20240517143000_smile.jpg&result=No%20face%20detected",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        // minijinja escapes '/' in attribute values
        assert!(body.contains("&#x2f;static&#x2f;uploads&#x2f;20240517143000_smile.jpg"));
        assert!(body.contains("No face detected"));
    }

    #[tokio::test]
    async fn test_results_page_without_filename_has_no_image() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::NoFace);

        let body = body_text(get(state, "/results?result=Sad", None).await).await;
        assert!(body.contains("Sad"));
        assert!(!body.contains("<img"));
    }

    #[tokio::test]
    async fn test_history_lists_newest_first_and_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::NoFace);
        state.db.insert_analysis("First", "1_a.jpg", "Happy").unwrap();
        state.db.insert_analysis("<b>Second</b>", "2_b.jpg", "Sad").unwrap();

        let response = get(state, "/history", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;

        let second = body.find("&lt;b&gt;Second").unwrap();
        let first = body.find("First").unwrap();
        assert!(second < first);
        assert!(!body.contains("<b>Second</b>"));
        assert!(body.contains("uploads&#x2f;1_a.jpg"));
    }

    #[tokio::test]
    async fn test_api_analyses_returns_json() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::NoFace);
        state.db.insert_analysis("Alice", "1_a.jpg", "Happy").unwrap();
        state.db.insert_analysis("Bob", "2_b.jpg", "Sad").unwrap();

        let response = get(state, "/api/analyses", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let records: Vec<AnalysisRecord> = serde_json::from_str(&body_text(response).await).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.user_name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Alice"]);
    }

    #[tokio::test]
    async fn test_uploaded_image_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir, EmotionOutcome::Emotion("neutral".to_string()));

        post_form(state.clone(), &[("file", Some("face.png"), b"png payload")]).await;
        let filename = state.db.list_analyses().unwrap()[0].image_filename.clone();

        let response = get(state, &format!("/static/uploads/{filename}"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "png payload");
    }
}
