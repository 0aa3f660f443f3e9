//! HTTP surface checks: routing, status mapping, and run lifecycle wiring.
//! No test here ever launches a browser; runs are created but not dispatched.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use runflow_cli::config::Settings;
use runflow_cli::server::{build_router, AppState};
use runflow_plan_dsl::{PlanDraft, PlanValidator, RawStep};

fn test_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        artifacts_dir: dir.path().to_path_buf(),
        ..Settings::default()
    };
    (AppState::from_settings(settings), dir)
}

fn json_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_answers() {
    let (state, _dir) = test_state();
    let response = build_router(state)
        .oneshot(get("/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn brandkit_indexing_accepts_docs() {
    let (state, _dir) = test_state();
    let router = build_router(state.clone());
    let response = router
        .oneshot(json_post(
            "/brandkit/index",
            r#"{"docs": [{"title": "Voice", "content": "friendly and concise"}]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.index.len(), 1);
}

#[tokio::test]
async fn task_creation_persists_a_run() {
    let (state, _dir) = test_state();
    let router = build_router(state);
    let response = router
        .oneshot(json_post(
            "/task",
            r#"{"task": "take a look at the landing page"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn run_lifecycle_routes_resolve() {
    let (state, _dir) = test_state();

    // Create a run through the engine; the routes are exercised over HTTP.
    let plan = PlanValidator::default()
        .validate(&PlanDraft {
            starting_url: None,
            steps: vec![RawStep::ui("WAIT_MS: 1")],
        })
        .unwrap();
    let run_id = state
        .engine
        .create_run("demo", plan, "https://the-internet.herokuapp.com/")
        .await
        .unwrap();

    let router = build_router(state);
    let response = router
        .clone()
        .oneshot(get(&format!("/runs/{run_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(json_post(&format!("/runs/{run_id}/approve"), "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(json_post(&format!("/runs/{run_id}/close-session"), "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_resources_map_to_not_found() {
    let (state, _dir) = test_state();
    let router = build_router(state);

    let response = router
        .clone()
        .oneshot(get("/runs/no-such-run"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .clone()
        .oneshot(json_post("/runs/no-such-run/execute-next-step", "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(get("/artifacts/r/s/missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
