use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{FromRequest, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use aspirin_core::{toggle, tracker::validate_sha, CommitSnapshot, Toggle};
use aspirin_store::SnapshotStore;

mod error;
mod view;

pub use error::{ApiError, ApiResult};
pub use view::{is_excluded, CommitView, ReportView};

const REPORT_TEMPLATE: &str = "report";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// ── Config ──

pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
}

// ── App State ──

/// Everything the handlers need. The store is injected so tests can run
/// against [`aspirin_store::MemoryStore`].
pub struct AppState {
    store: Arc<dyn SnapshotStore>,
    templates: Handlebars<'static>,
    repo: String,
    exclude_folders: Vec<String>,
    static_dir: PathBuf,
    /// Held across load → toggle → save so concurrent requests cannot
    /// overwrite each other's changes.
    write_lock: tokio::sync::Mutex<()>,
}

impl AppState {
    pub fn new(store: Arc<dyn SnapshotStore>, repo: impl Into<String>) -> anyhow::Result<Self> {
        let mut templates = Handlebars::new();
        templates
            .register_template_string(REPORT_TEMPLATE, include_str!("../templates/report.hbs"))
            .map_err(|e| anyhow::anyhow!("invalid report template: {e}"))?;
        Ok(Self {
            store,
            templates,
            repo: repo.into(),
            exclude_folders: Vec::new(),
            static_dir: PathBuf::from("static"),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_exclude_folders(mut self, folders: Vec<String>) -> Self {
        self.exclude_folders = folders;
        self
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }

    /// Current snapshot; an absent one renders as empty.
    async fn load(&self) -> ApiResult<CommitSnapshot> {
        let store = Arc::clone(&self.store);
        let snapshot = tokio::task::spawn_blocking(move || store.load()).await??;
        Ok(snapshot.unwrap_or_default())
    }

    /// Load, flip `sha`, save. Nothing is written unless the toggle applied.
    async fn toggle_and_save(&self, sha: String) -> ApiResult<Toggle> {
        let _guard = self.write_lock.lock().await;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || -> ApiResult<Toggle> {
            let mut snapshot = store.load()?.unwrap_or_default();
            let outcome = toggle(&mut snapshot, &sha)?;
            store.save(&snapshot)?;
            Ok(outcome)
        })
        .await?
    }
}

// ── Entrypoint ──

pub async fn serve(state: AppState, config: ServeConfig) -> anyhow::Result<()> {
    let app = router(Arc::new(state));
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("serving report at http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("report server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Build the router (for testing without binding to a port).
pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.static_dir);
    Router::new()
        .route("/", get(get_report))
        .route("/resolve", post(post_resolve))
        .route("/api/health", get(health))
        .route("/api/snapshot", get(get_snapshot))
        .nest_service("/static", static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

// ── GET / ──

async fn get_report(State(state): State<Arc<AppState>>) -> ApiResult<Html<String>> {
    let snapshot = state.load().await?;
    let view = ReportView::build(&snapshot, &state.repo, &state.exclude_folders);
    let html = state.templates.render(REPORT_TEMPLATE, &view)?;
    Ok(Html(html))
}

// ── GET /api/snapshot ──

#[derive(Serialize)]
struct SnapshotResponse<'a> {
    #[serde(flatten)]
    snapshot: &'a CommitSnapshot,
    completed_count: usize,
    all_completed: bool,
}

async fn get_snapshot(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let snapshot = state.load().await?;
    let body = SnapshotResponse {
        snapshot: &snapshot,
        completed_count: snapshot.completed_count(),
        all_completed: snapshot.all_completed(),
    };
    Ok(Json(body).into_response())
}

// ── POST /resolve ──

#[derive(Deserialize)]
struct ResolveBody {
    #[serde(default)]
    commit: String,
}

#[derive(Serialize)]
struct ResolveResponse {
    commit: String,
    completed: bool,
}

/// Accepts `{"commit": "<sha>"}` or the form field `commit`. Form posts come
/// from the report page and are redirected back to it.
async fn post_resolve(State(state): State<Arc<AppState>>, req: Request) -> ApiResult<Response> {
    let is_form = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_form_content_type);

    let body = if is_form {
        let Form(body) = Form::<ResolveBody>::from_request(req, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        body
    } else {
        let Json(body) = Json::<ResolveBody>::from_request(req, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        body
    };
    let sha = validate_sha(&body.commit)?.to_string();

    let outcome = state.toggle_and_save(sha.clone()).await?;
    tracing::info!(%sha, completed = outcome.is_completed(), "toggled commit");

    if is_form {
        return Ok(Redirect::to("/").into_response());
    }
    Ok(Json(ResolveResponse {
        commit: sha,
        completed: outcome.is_completed(),
    })
    .into_response())
}

/// Media type match ignoring case and parameters such as `charset`.
fn is_form_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use aspirin_core::CommitRecord;
    use aspirin_store::{MemoryStore, YamlFileStore};
    use time::macros::datetime;

    fn record(sha: &str, message: &str) -> CommitRecord {
        CommitRecord {
            sha: sha.to_string(),
            author_name: "Ada".to_string(),
            author_date: datetime!(2024-03-05 14:07 UTC),
            message: message.to_string(),
            files: vec![],
        }
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let mut snap = CommitSnapshot::default();
        snap.push_commit(record("a1", "First change"));
        snap.push_commit(record("a2", "Second change"));
        snap.push_commit(record("a3", "Third change"));
        Arc::new(MemoryStore::with_snapshot(snap))
    }

    fn app(store: Arc<MemoryStore>) -> Router {
        let state = AppState::new(store, "acme/widgets").unwrap();
        router(Arc::new(state))
    }

    fn json_resolve(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/resolve")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        serde_json::from_str(&body_string(resp).await).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let resp = app(seeded_store())
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["ok"], true);
    }

    #[tokio::test]
    async fn report_lists_commits_with_completion_state() {
        let store = seeded_store();
        let mut snap = store.snapshot().unwrap();
        snap.completed.insert("a2".into());
        store.save(&snap).unwrap();

        let resp = app(store)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_string(resp).await;
        assert!(html.contains("acme/widgets"));
        assert!(html.contains("1 of 3 commits reviewed"));
        assert!(html.contains("First change"));
        assert!(html.contains(r#"<li class="commit completed" id="commit-a2">"#));
        assert!(html.contains(r#"<li class="commit" id="commit-a1">"#));
        assert!(html.contains("03/05/2024 14:07"));
        assert!(!html.contains("All commits reviewed."));
    }

    #[tokio::test]
    async fn report_escapes_commit_text() {
        let mut snap = CommitSnapshot::default();
        snap.push_commit(record("b1", "<script>alert(1)</script>"));
        let resp = app(Arc::new(MemoryStore::with_snapshot(snap)))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let html = body_string(resp).await;
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn report_without_snapshot_is_empty() {
        let resp = app(Arc::new(MemoryStore::new()))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_string(resp).await;
        assert!(html.contains("No commits fetched yet."));
        assert!(html.contains("0 of 0 commits reviewed"));
    }

    #[tokio::test]
    async fn report_fails_on_corrupt_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("commits.yaml");
        std::fs::write(&path, "commits: [oops").unwrap();
        let state = AppState::new(Arc::new(YamlFileStore::new(&path)), "acme/widgets").unwrap();

        let resp = router(Arc::new(state))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["code"], "STORAGE_ERROR");
    }

    #[tokio::test]
    async fn resolve_on_corrupt_snapshot_leaves_file_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("commits.yaml");
        std::fs::write(&path, "commits: [oops").unwrap();
        let state = AppState::new(Arc::new(YamlFileStore::new(&path)), "acme/widgets").unwrap();

        let resp = router(Arc::new(state))
            .oneshot(json_resolve(serde_json::json!({"commit": "a1"})))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["code"], "STORAGE_ERROR");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "commits: [oops");
    }

    #[tokio::test]
    async fn resolve_json_toggles_and_persists() {
        let store = seeded_store();
        let app = app(store.clone());

        let resp = app
            .clone()
            .oneshot(json_resolve(serde_json::json!({"commit": "a2"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["commit"], "a2");
        assert_eq!(json["completed"], true);
        assert!(store.snapshot().unwrap().is_completed("a2"));

        let resp = app
            .oneshot(json_resolve(serde_json::json!({"commit": "a2"})))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["completed"], false);
        assert!(store.snapshot().unwrap().completed.is_empty());
    }

    #[tokio::test]
    async fn resolve_form_redirects_to_report() {
        let store = seeded_store();
        let resp = app(store.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/resolve")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("commit=a1"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");
        assert!(store.snapshot().unwrap().is_completed("a1"));
    }

    #[tokio::test]
    async fn resolve_form_content_type_is_case_insensitive() {
        let store = seeded_store();
        let resp = app(store.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/resolve")
                    .header("content-type", "Application/X-WWW-Form-Urlencoded; charset=UTF-8")
                    .body(Body::from("commit=a3"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(store.snapshot().unwrap().is_completed("a3"));
    }

    #[test]
    fn form_content_type_matching() {
        assert!(is_form_content_type("application/x-www-form-urlencoded"));
        assert!(is_form_content_type("APPLICATION/X-WWW-FORM-URLENCODED;charset=utf-8"));
        assert!(!is_form_content_type("application/json"));
        assert!(!is_form_content_type("application/x-www-form-urlencoded-extra"));
    }

    #[tokio::test]
    async fn resolve_rejects_missing_or_empty_commit() {
        let store = seeded_store();
        let app = app(store.clone());

        for body in [
            serde_json::json!({"commit": ""}),
            serde_json::json!({"commit": "   "}),
            serde_json::json!({}),
        ] {
            let resp = app.clone().oneshot(json_resolve(body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/resolve")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "BAD_REQUEST");

        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn resolve_reports_failure_when_save_fails() {
        let store = seeded_store();
        let before = store.snapshot().unwrap();
        store.set_fail_saves(true);

        let resp = app(store.clone())
            .oneshot(json_resolve(serde_json::json!({"commit": "a1"})))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["code"], "STORAGE_ERROR");
        assert!(json.get("completed").is_none());
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn concurrent_toggles_are_not_lost() {
        let store = seeded_store();
        let app = app(store.clone());

        let shas: Vec<String> = (0..16).map(|i| format!("c{i}")).collect();
        let requests = shas.iter().map(|sha| {
            app.clone()
                .oneshot(json_resolve(serde_json::json!({ "commit": sha })))
        });
        for resp in futures_join_all(requests).await {
            assert_eq!(resp.unwrap().status(), StatusCode::OK);
        }

        let snap = store.snapshot().unwrap();
        for sha in &shas {
            assert!(snap.is_completed(sha), "{sha} missing");
        }
    }

    /// Drive all futures on spawned tasks and collect their results.
    async fn futures_join_all<F>(futures: impl Iterator<Item = F>) -> Vec<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handles: Vec<_> = futures.map(tokio::spawn).collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn snapshot_endpoint_returns_json() {
        let store = seeded_store();
        let mut snap = store.snapshot().unwrap();
        for sha in ["a1", "a2", "a3"] {
            snap.completed.insert(sha.into());
        }
        store.save(&snap).unwrap();

        let resp = app(store)
            .oneshot(
                Request::builder()
                    .uri("/api/snapshot")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["commits"].as_array().unwrap().len(), 3);
        assert_eq!(json["commits"][0]["sha"], "a1");
        assert_eq!(json["completed"].as_array().unwrap().len(), 3);
        assert_eq!(json["completed_count"], 3);
        assert_eq!(json["all_completed"], true);
    }

    #[tokio::test]
    async fn static_files_are_served() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("report.css"), "body { color: red; }").unwrap();
        let state = AppState::new(seeded_store(), "acme/widgets")
            .unwrap()
            .with_static_dir(tmp.path());

        let resp = router(Arc::new(state))
            .oneshot(
                Request::builder()
                    .uri("/static/report.css")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "body { color: red; }");
    }

    #[tokio::test]
    async fn excluded_folders_are_hidden_from_report() {
        let mut snap = CommitSnapshot::default();
        let mut commit = record("d1", "Touch files");
        commit.files = vec!["src/app.rs".into(), "vendor/dep.rs".into()];
        snap.push_commit(commit);
        let state = AppState::new(Arc::new(MemoryStore::with_snapshot(snap)), "acme/widgets")
            .unwrap()
            .with_exclude_folders(vec!["vendor".into()]);

        let resp = router(Arc::new(state))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let html = body_string(resp).await;
        assert!(html.contains("src/app.rs"));
        assert!(!html.contains("vendor/dep.rs"));
    }
}
