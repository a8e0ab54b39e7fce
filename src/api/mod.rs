// src/api/mod.rs

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::sync::broadcast;

use crate::lifecycle::CampaignAdmin;
use crate::logging::RuntimeLogger;
use crate::notify::{BrowserPush, UserDirectory};

pub use error::ApiError;

pub struct AppState {
    pub admin: Arc<CampaignAdmin>,
    pub directory: Arc<dyn UserDirectory>,
    pub browser_tx: broadcast::Sender<BrowserPush>,
    pub runtime_logger: Option<Arc<RuntimeLogger>>,
}

impl AppState {
    /// 管理操作写入运行日志
    pub async fn audit(&self, level: &str, message: &str) {
        if let Some(logger) = &self.runtime_logger {
            logger.log(level, message).await;
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/placements", get(handlers::list_placements))
        .route(
            "/placements/{placement}",
            get(handlers::get_placement)
                .patch(handlers::patch_placement)
                .delete(handlers::clear_placement),
        )
        .route(
            "/placements/{placement}/expiration-events/{event}",
            put(handlers::select_event).delete(handlers::deselect_event),
        )
        .route("/placements/{placement}/clicks", post(handlers::record_click))
        .route("/placements/{placement}/image", put(handlers::upload_image))
        .route("/placements/{placement}/countdown", get(handlers::countdown))
        .route(
            "/placements/{placement}/countdown/stream",
            get(handlers::countdown_stream),
        )
        .route("/events", get(handlers::events))
        .route("/recipients", get(handlers::list_recipients))
        .with_state(state)
}
