use std::sync::Arc;

use ad_lifecycle::api::{self, AppState};
use ad_lifecycle::lifecycle::CampaignAdmin;
use ad_lifecycle::notify::{
    BrowserChannel, DirectoryUser, InMemoryMessageCenter, NotificationCenterChannel,
    NotificationDispatcher, StaticDirectory,
};
use ad_lifecycle::store::{CampaignStore, MemoryBackend};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    backend: Arc<MemoryBackend>,
    center: Arc<InMemoryMessageCenter>,
}

async fn test_app() -> TestApp {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(CampaignStore::open(backend.clone(), 16).await.unwrap());
    let center = Arc::new(InMemoryMessageCenter::new());
    let directory = Arc::new(StaticDirectory::new(vec![
        DirectoryUser { id: "a".into(), name: "Ada".into(), email: Some("ada@shop.example".into()) },
        DirectoryUser { id: "b".into(), name: "Bo".into(), email: None },
    ]));
    let (browser_tx, _) = broadcast::channel(16);
    let dispatcher = Arc::new(
        NotificationDispatcher::new(directory.clone())
            .with_channel(Arc::new(NotificationCenterChannel::new(center.clone())))
            .with_channel(Arc::new(BrowserChannel::new(browser_tx.clone()))),
    );
    let state = Arc::new(AppState {
        admin: Arc::new(CampaignAdmin::new(store, dispatcher)),
        directory,
        browser_tx,
        runtime_logger: None,
    });
    TestApp {
        router: api::router(state),
        backend,
        center,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn lists_every_placement_with_defaults() {
    let app = test_app().await;
    let (status, body) = send(&app.router, "GET", "/placements", None).await;
    assert_eq!(status, StatusCode::OK);
    let placements = body.as_object().unwrap();
    assert_eq!(placements.len(), 4);
    assert_eq!(placements["footer"]["runtime"], "1 week");
    assert_eq!(placements["messenger"]["active"], false);

    let (status, body) = send(&app.router, "GET", "/placements/sidebar", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("sidebar"));
}

#[tokio::test]
async fn activation_returns_the_start_notice_outcome() {
    let app = test_app().await;
    let patch = json!({
        "active": true,
        "runtime": {"days": 1, "hours": 2, "minutes": 0},
        "expirationEvents": ["notify", "deactivate"],
        "notificationMethods": ["notification_center", "browser"],
        "notificationUsers": ["a", "b", "zed"],
    });
    let (status, body) = send(&app.router, "PATCH", "/placements/favorites-page", Some(patch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["placement"]["active"], true);
    assert_eq!(body["placement"]["runtime"], "custom_1d_2h_0m");
    assert!(body["placement"]["expirationDate"].is_string());

    let notice = &body["startNotice"];
    assert_eq!(notice["succeeded"].as_array().unwrap().len(), 2);
    let failed = notice["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().any(|f| f["error"]["error"] == "unknown_recipient"));
    assert!(failed.iter().any(|f| f["error"]["error"] == "no_browser_client"));
    assert_eq!(app.center.count_for("a"), 1);

    let (status, body) = send(&app.router, "GET", "/placements/favorites_page/countdown", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["countdown"]["expired"], false);
    assert_eq!(body["countdown"]["days"], 1);
}

#[tokio::test]
async fn rejects_invalid_edits_with_422() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        "PATCH",
        "/placements/footer",
        Some(json!({"active": true, "runtime": "custom_0d_0h_0m"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("invalid duration"));

    let (status, body) = send(
        &app.router,
        "PATCH",
        "/placements/footer",
        Some(json!({"expirationEvents": ["deactivate", "reset"]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("mutually exclusive"));

    // 调度字段不对外开放
    let (status, body) = send(
        &app.router,
        "PATCH",
        "/placements/footer",
        Some(json!({"handled": true})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("handled"));

    let (_, body) = send(&app.router, "GET", "/placements/footer", None).await;
    assert_eq!(body["active"], false);
}

#[tokio::test]
async fn malformed_patch_body_is_a_json_400() {
    let app = test_app().await;
    let request = Request::builder()
        .method("PATCH")
        .uri("/placements/footer")
        .header("content-type", "application/json")
        .body(Body::from("{\"active\": tru"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn event_toggles_and_clicks() {
    let app = test_app().await;
    let (status, _) = send(&app.router, "PUT", "/placements/footer/expiration-events/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app.router, "PUT", "/placements/footer/expiration-events/deactivate", None).await;
    assert_eq!(body["expirationEvents"], json!(["deactivate"]));
    let (_, body) = send(&app.router, "DELETE", "/placements/footer/expiration-events/deactivate", None).await;
    assert_eq!(body["expirationEvents"], json!([]));
    let (status, _) = send(&app.router, "PUT", "/placements/footer/expiration-events/explode", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app.router, "POST", "/placements/footer/clicks", None).await;
    let (_, body) = send(&app.router, "POST", "/placements/footer/clicks", None).await;
    assert_eq!(body["clicks"], 2);

    let (status, body) = send(&app.router, "DELETE", "/placements/footer", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clicks"], 0);
}

#[tokio::test]
async fn storage_failures_surface_as_500() {
    let app = test_app().await;
    app.backend.fail_writes(true);
    let (status, body) = send(&app.router, "POST", "/placements/messenger/clicks", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal Server Error");

    app.backend.fail_writes(false);
    let (status, body) = send(&app.router, "POST", "/placements/messenger/clicks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clicks"], 1);
}

#[tokio::test]
async fn lists_recipients_from_the_directory() {
    let app = test_app().await;
    let (status, body) = send(&app.router, "GET", "/recipients", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Ada");
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn image_upload_without_uploader_is_unavailable() {
    let app = test_app().await;
    let boundary = "X-BOUNDARY";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"logo.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method("PUT")
        .uri("/placements/footer/image")
        .header("content-type", format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
