mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use visual_sentinel::artifacts::FsArtifactStore;
use visual_sentinel::routes::settings::PASSWORD_MASK;
use visual_sentinel::server::build_router;
use visual_sentinel::state::{AppState, SharedState};
use visual_sentinel::store::SentinelDb;

use common::{test_config, FakeCapture};

struct App {
    _dir: TempDir,
    state: SharedState,
    router: Router,
}

fn app() -> App {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path().to_path_buf());
    let db = Arc::new(SentinelDb::open(&config.database_path()).unwrap());
    let artifacts = Arc::new(FsArtifactStore::new(config.artifacts_dir()).unwrap());
    let state: SharedState = Arc::new(AppState::new(
        config,
        db,
        Arc::new(FakeCapture::new()),
        artifacts,
        reqwest::Client::new(),
    ));
    let router = build_router(state.clone());
    App {
        _dir: dir,
        state,
        router,
    }
}

async fn send(app: &App, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_group(app: &App) -> String {
    let (status, group) = send(app, "POST", "/groups", Some(json!({"name": "Marketing site"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    group["id"].as_str().unwrap().to_string()
}

async fn create_target(app: &App, group_id: &str, address: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        &format!("/groups/{}/targets", group_id),
        Some(json!({"name": "home", "address": address})),
    )
    .await
}

#[tokio::test]
async fn test_health_reports_capture_ready() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["capture_ready"], true);
    assert_eq!(body["active_schedules"], 0);
}

#[tokio::test]
async fn test_group_validation() {
    let app = app();

    let (status, body) = send(&app, "POST", "/groups", Some(json!({"name": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("name"));

    let (status, _) = send(
        &app,
        "POST",
        "/groups",
        Some(json!({"name": "Docs", "default_threshold": 1.5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/groups/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_target_validation() {
    let app = app();
    let group_id = create_group(&app).await;

    let (status, _) = create_target(&app, &group_id, "ftp://example.com").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = create_target(&app, "missing", "https://example.com").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, target) = create_target(&app, &group_id, "https://example.com/").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(target["position"], 0);

    let (_, detail) = send(&app, "GET", &format!("/groups/{}", group_id), None).await;
    assert_eq!(detail["name"], "Marketing site");
    assert_eq!(detail["targets"].as_array().unwrap().len(), 1);
    assert!(detail["schedule"].is_null());
}

#[tokio::test]
async fn test_start_run_and_fetch_report() {
    let app = app();
    let group_id = create_group(&app).await;

    let (status, _) = send(&app, "POST", &format!("/groups/{}/runs", group_id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "no active targets yet");

    let (status, _) = send(&app, "POST", "/groups/missing/runs", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    create_target(&app, &group_id, "https://example.com/").await;
    let (status, body) = send(&app, "POST", &format!("/groups/{}/runs", group_id), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let mut report = Value::Null;
    for _ in 0..200 {
        let (status, body) = send(&app, "GET", &format!("/runs/{}", run_id), None).await;
        assert_eq!(status, StatusCode::OK);
        if body["run"]["status"] == "completed" {
            report = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(report["run"]["status"], "completed");
    assert_eq!(report["group_name"], "Marketing site");
    assert_eq!(report["outcomes"][0]["status"], "passed");
    assert_eq!(report["outcomes"][0]["target_name"], "home");

    let (_, runs) = send(&app, "GET", &format!("/groups/{}/runs", group_id), None).await;
    assert_eq!(runs.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/runs/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_schedule_lifecycle() {
    let app = app();
    let group_id = create_group(&app).await;
    let uri = format!("/groups/{}/schedule", group_id);

    let (status, _) = send(&app, "PUT", &uri, Some(json!({"expression": "every day"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &app,
        "PUT",
        &uri,
        Some(json!({"expression": "0 3 * * *", "timezone": "Mars/Olympus"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, schedule) = send(
        &app,
        "PUT",
        &uri,
        Some(json!({"expression": "0 3 * * *", "timezone": "America/New_York"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(schedule["next_fire_at"].is_string());
    let schedule_id = schedule["id"].as_str().unwrap().to_string();

    let (_, active) = send(&app, "GET", "/schedules/active", None).await;
    assert_eq!(active[0]["schedule_id"], schedule_id.as_str());

    // Replacing keeps the same schedule and timer.
    let (_, replaced) = send(&app, "PUT", &uri, Some(json!({"expression": "0 4 * * *"}))).await;
    assert_eq!(replaced["id"], schedule_id.as_str());
    assert_eq!(replaced["timezone"], "UTC");
    assert_eq!(app.state.scheduler.list_active().len(), 1);

    let (_, disabled) = send(
        &app,
        "PUT",
        &uri,
        Some(json!({"expression": "0 4 * * *", "enabled": false})),
    )
    .await;
    assert_eq!(disabled["enabled"], false);
    assert!(disabled["next_fire_at"].is_null());
    assert!(app.state.scheduler.list_active().is_empty());

    let (status, runs) = send(&app, "GET", &format!("/schedules/{}/runs", schedule_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(runs.as_array().unwrap().is_empty());

    let (status, _) = send(&app, "DELETE", &format!("/schedules/{}", schedule_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", &format!("/schedules/{}", schedule_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "POST", "/schedules/missing/trigger", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_notification_settings_mask_password() {
    let app = app();
    let settings = json!({
        "enabled": true,
        "email": {
            "host": "smtp.example.com",
            "username": "alerts",
            "password": "hunter2",
            "from": "sentinel@example.com",
            "to": "ops@example.com"
        }
    });

    let (status, body) = send(&app, "PUT", "/settings/notifications", Some(settings.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"]["password"], PASSWORD_MASK);

    let (_, body) = send(&app, "GET", "/settings/notifications", None).await;
    assert_eq!(body["email"]["password"], PASSWORD_MASK);
    assert_eq!(body["email"]["port"], 587);

    // Echoing the mask back keeps the stored secret.
    let mut echoed = body.clone();
    echoed["email"]["host"] = json!("smtp2.example.com");
    send(&app, "PUT", "/settings/notifications", Some(echoed)).await;
    let stored = app.state.settings.read().await.clone();
    let email = stored.email.unwrap();
    assert_eq!(email.host, "smtp2.example.com");
    assert_eq!(email.password.as_deref(), Some("hunter2"));

    let (status, _) = send(
        &app,
        "PUT",
        "/settings/notifications",
        Some(json!({"enabled": true, "webhook_url": "not a url"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notification_test_requires_channel() {
    let app = app();
    let (status, body) = send(&app, "POST", "/settings/notifications/test", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("channel"));
}

fn count_files(dir: &std::path::Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

async fn run_to_completion(app: &App, group_id: &str) {
    let (status, body) = send(app, "POST", &format!("/groups/{}/runs", group_id), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().unwrap().to_string();
    for _ in 0..200 {
        let (_, body) = send(app, "GET", &format!("/runs/{}", run_id), None).await;
        if body["run"]["status"] == "completed" {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} did not complete", run_id);
}

#[tokio::test]
async fn test_delete_group_cascades() {
    let app = app();
    let captures_dir = app.state.config.artifacts_dir().join("captures");
    let group_id = create_group(&app).await;
    create_target(&app, &group_id, "https://example.com/").await;
    create_target(&app, &group_id, "https://example.com/pricing").await;
    send(
        &app,
        "PUT",
        &format!("/groups/{}/schedule", group_id),
        Some(json!({"expression": "0 3 * * *"})),
    )
    .await;
    assert_eq!(app.state.scheduler.list_active().len(), 1);

    run_to_completion(&app, &group_id).await;
    assert_eq!(count_files(&captures_dir), 2);

    let (status, body) = send(&app, "DELETE", &format!("/groups/{}", group_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(app.state.scheduler.list_active().is_empty());
    assert_eq!(count_files(&captures_dir), 0);

    let (status, _) = send(&app, "GET", &format!("/groups/{}/targets", group_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_target_removes_its_captures() {
    let app = app();
    let captures_dir = app.state.config.artifacts_dir().join("captures");
    let group_id = create_group(&app).await;
    let (_, kept) = create_target(&app, &group_id, "https://example.com/").await;
    let (_, dropped) = create_target(&app, &group_id, "https://example.com/pricing").await;
    let dropped_id = dropped["id"].as_str().unwrap();

    run_to_completion(&app, &group_id).await;
    assert_eq!(count_files(&captures_dir), 2);

    let (status, _) = send(&app, "DELETE", &format!("/targets/{}", dropped_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(count_files(&captures_dir.join(dropped_id)), 0);
    assert_eq!(
        count_files(&captures_dir.join(kept["id"].as_str().unwrap())),
        1
    );

    let (status, _) = send(&app, "DELETE", &format!("/targets/{}", dropped_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_log_history_filters_by_source() {
    let app = app();
    let group_id = create_group(&app).await;
    create_target(&app, &group_id, "https://example.com/").await;
    run_to_completion(&app, &group_id).await;

    let (status, body) = send(&app, "GET", "/logs/history?source=api", None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e["source"] == "api"));
    assert_eq!(body["total"], entries.len());

    let (_, all) = send(&app, "GET", "/logs/history", None).await;
    assert!(all["total"].as_u64().unwrap() > body["total"].as_u64().unwrap());
    assert!(all["source"].is_null());

    let (status, _) = send(&app, "GET", "/logs/history?source=kernel", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
