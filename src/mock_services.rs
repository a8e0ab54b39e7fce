// src/mock_services.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{serve, Json, Router};
use rand::Rng;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::info;

use crate::notify::channels::{CenterMessage, InMemoryMessageCenter, MessageCenter};
use crate::notify::directory::DirectoryUser;

/// 本地 mock 的用户目录、消息中心与上传服务
pub struct MockState {
    pub users: Vec<DirectoryUser>,
    pub center: Arc<InMemoryMessageCenter>,
    base_url: String,
    uploads: AtomicU64,
}

impl MockState {
    pub fn new(base_url: &str, users: Vec<DirectoryUser>) -> Self {
        Self {
            users,
            center: Arc::new(InMemoryMessageCenter::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            uploads: AtomicU64::new(0),
        }
    }
}

pub fn demo_users() -> Vec<DirectoryUser> {
    [
        ("1", "Alice Admin", "alice@shop.example"),
        ("2", "Bob Sales", "bob@shop.example"),
        ("3", "Carol Ops", "carol@shop.example"),
    ]
    .into_iter()
    .map(|(id, name, email)| DirectoryUser {
        id: id.to_string(),
        name: name.to_string(),
        email: Some(email.to_string()),
    })
    .collect()
}

/// 模拟上游处理延迟（10 ~ 50 毫秒）
async fn jitter() {
    let delay_ms = rand::thread_rng().gen_range(10..50);
    sleep(Duration::from_millis(delay_ms)).await;
}

async fn handle_users(State(state): State<Arc<MockState>>) -> Json<Vec<DirectoryUser>> {
    jitter().await;
    Json(state.users.clone())
}

async fn handle_post_message(
    State(state): State<Arc<MockState>>,
    Json(message): Json<CenterMessage>,
) -> StatusCode {
    jitter().await;
    info!(recipient = %message.recipient, title = %message.title, "Mock message center received message");
    match state.center.post(message).await {
        Ok(()) => StatusCode::CREATED,
        Err(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

async fn handle_list_messages(State(state): State<Arc<MockState>>) -> Json<Vec<CenterMessage>> {
    Json(state.center.records())
}

/// multipart 表单：`file` + `section`，返回 `{"url": ...}`
async fn handle_upload(
    State(state): State<Arc<MockState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    let mut section = "misc".to_string();
    let mut file: Option<(String, usize)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("section") => {
                section = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
            }
            Some("file") => {
                let name = field.file_name().unwrap_or("upload.bin").to_string();
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                file = Some((name, bytes.len()));
            }
            _ => {}
        }
    }
    let (name, size) = file.ok_or(StatusCode::BAD_REQUEST)?;
    let n = state.uploads.fetch_add(1, Ordering::SeqCst) + 1;
    info!(section = %section, file = %name, size, "Mock upload stored asset");
    Ok(Json(json!({
        "url": format!("{}/assets/{}/{}-{}", state.base_url, section, n, name),
    })))
}

pub fn mock_router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/users", get(handle_users))
        .route("/messages", post(handle_post_message).get(handle_list_messages))
        .route("/upload", post(handle_upload))
        .with_state(state)
}

/// 启动 mock 上游服务，收到 shutdown 信号后退出
pub async fn start_mock_services(
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let state = Arc::new(MockState::new(&format!("http://{}", addr), demo_users()));
    let app = mock_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("Mock upstream services running at http://{}", addr);
    serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}
