// src/api/handlers.rs

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::time::{interval, Duration};
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::model::countdown::Countdown;
use crate::model::patch::AdminPatch;
use crate::model::placements::{AdPlacement, ExpirationEvent, PlacementType};
use crate::notify::directory::DirectoryUser;
use crate::notify::dispatcher::DispatchReport;

fn placement_type(raw: &str) -> Result<PlacementType, ApiError> {
    raw.parse().map_err(|_| ApiError::UnknownPlacement(raw.to_string()))
}

/// PATCH 的返回：新的广告位，以及本次激活触发的开始通知结果
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResponse {
    pub placement: AdPlacement,
    pub start_notice: Option<DispatchReport>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownView {
    pub placement: PlacementType,
    pub active: bool,
    pub expiration_date: Option<DateTime<Utc>>,
    pub countdown: Option<Countdown>,
}

impl CountdownView {
    fn new(placement: PlacementType, value: &AdPlacement, now: DateTime<Utc>) -> Self {
        Self {
            placement,
            active: value.active,
            expiration_date: value.expiration_date,
            countdown: Countdown::for_placement(value, now),
        }
    }
}

/// **所有广告位**
pub async fn list_placements(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<PlacementType, AdPlacement>> {
    Json(state.admin.store().snapshot().await)
}

pub async fn get_placement(
    State(state): State<Arc<AppState>>,
    Path(placement): Path<String>,
) -> Result<Json<AdPlacement>, ApiError> {
    let placement = placement_type(&placement)?;
    Ok(Json(state.admin.store().get(placement).await))
}

/// **管理员编辑广告位**
///
/// 激活时等待开始通知发送完成，把投递结果一起返回给管理后台。
pub async fn patch_placement(
    State(state): State<Arc<AppState>>,
    Path(placement): Path<String>,
    body: Result<Json<AdminPatch>, JsonRejection>,
) -> Result<Json<PatchResponse>, ApiError> {
    let placement = placement_type(&placement)?;
    let Json(patch) = body?;
    let applied = match state.admin.apply(placement, patch, Utc::now()).await {
        Ok(applied) => applied,
        Err(e) => {
            state
                .audit("WARN", &format!("placement {} update rejected: {}", placement, e))
                .await;
            return Err(e.into());
        }
    };

    let start_notice = match applied.start_notice {
        Some(handle) => handle.await.ok(),
        None => None,
    };
    if let Some(report) = &start_notice {
        state
            .audit(
                "INFO",
                &format!(
                    "placement {} activated, start notice delivered {} / failed {}",
                    placement,
                    report.succeeded.len(),
                    report.failed.len()
                ),
            )
            .await;
    }
    Ok(Json(PatchResponse {
        placement: applied.value,
        start_notice,
    }))
}

pub async fn clear_placement(
    State(state): State<Arc<AppState>>,
    Path(placement): Path<String>,
) -> Result<Json<AdPlacement>, ApiError> {
    let placement = placement_type(&placement)?;
    let value = state.admin.clear(placement).await?;
    state.audit("INFO", &format!("placement {} cleared", placement)).await;
    Ok(Json(value))
}

fn event_path(placement: &str, event: &str) -> Result<(PlacementType, ExpirationEvent), ApiError> {
    let placement = placement_type(placement)?;
    let event = event
        .parse()
        .map_err(|_| ApiError::UnknownEvent(event.to_string()))?;
    Ok((placement, event))
}

pub async fn select_event(
    State(state): State<Arc<AppState>>,
    Path((placement, event)): Path<(String, String)>,
) -> Result<Json<AdPlacement>, ApiError> {
    let (placement, event) = event_path(&placement, &event)?;
    Ok(Json(state.admin.select_event(placement, event).await?))
}

pub async fn deselect_event(
    State(state): State<Arc<AppState>>,
    Path((placement, event)): Path<(String, String)>,
) -> Result<Json<AdPlacement>, ApiError> {
    let (placement, event) = event_path(&placement, &event)?;
    Ok(Json(state.admin.deselect_event(placement, event).await?))
}

pub async fn record_click(
    State(state): State<Arc<AppState>>,
    Path(placement): Path<String>,
) -> Result<Json<AdPlacement>, ApiError> {
    let placement = placement_type(&placement)?;
    Ok(Json(state.admin.record_click(placement).await?))
}

/// **上传图片**：读取 multipart 中的 `file` 字段并转发到上传服务
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path(placement): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<AdPlacement>, ApiError> {
    let placement = placement_type(&placement)?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.bin").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let value = state
            .admin
            .attach_image(placement, bytes.to_vec(), &file_name)
            .await?;
        return Ok(Json(value));
    }
    Err(ApiError::BadRequest("missing `file` field".to_string()))
}

pub async fn countdown(
    State(state): State<Arc<AppState>>,
    Path(placement): Path<String>,
) -> Result<Json<CountdownView>, ApiError> {
    let placement = placement_type(&placement)?;
    let value = state.admin.store().get(placement).await;
    Ok(Json(CountdownView::new(placement, &value, Utc::now())))
}

/// **倒计时推送**：每秒重新计算一次
pub async fn countdown_stream(
    State(state): State<Arc<AppState>>,
    Path(placement): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let placement = placement_type(&placement)?;
    let ticks = IntervalStream::new(interval(Duration::from_secs(1)));
    let stream = ticks.then(move |_| {
        let state = Arc::clone(&state);
        async move {
            let value = state.admin.store().get(placement).await;
            Event::default()
                .event("countdown")
                .json_data(CountdownView::new(placement, &value, Utc::now()))
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// **变更推送**：广告位变更与浏览器通知合并在一个 SSE 流里
pub async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let changes = BroadcastStream::new(state.admin.store().subscribe()).filter_map(|msg| {
        future::ready(
            msg.ok()
                .and_then(|event| Event::default().event("placement").json_data(&event).ok())
                .map(Ok::<_, Infallible>),
        )
    });
    let pushes = BroadcastStream::new(state.browser_tx.subscribe()).filter_map(|msg| {
        future::ready(
            msg.ok()
                .and_then(|push| Event::default().event("browser_notification").json_data(&push).ok())
                .map(Ok::<_, Infallible>),
        )
    });
    Sse::new(stream::select(changes, pushes)).keep_alive(KeepAlive::default())
}

/// **可选收件人**
pub async fn list_recipients(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DirectoryUser>>, ApiError> {
    Ok(Json(state.directory.list_users().await?))
}
