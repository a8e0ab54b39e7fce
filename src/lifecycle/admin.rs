// src/lifecycle/admin.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::model::patch::{AdminPatch, PlacementPatch};
use crate::model::placements::{AdPlacement, DeactivationReason, ExpirationEvent, PlacementType};
use crate::model::runtime;
use crate::notify::dispatcher::{DispatchReport, NotificationDispatcher};
use crate::notify::message::Notice;
use crate::store::{CampaignStore, StoreError};
use crate::upload::{AssetUploader, UploadError};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("image upload endpoint is not configured")]
    UploaderNotConfigured,
}

/// 一次管理员编辑的结果
#[derive(Debug)]
pub struct Applied {
    pub value: AdPlacement,
    /// 本次编辑开启了新周期时的开始通知
    pub start_notice: Option<JoinHandle<DispatchReport>>,
}

/// **管理后台入口**
///
/// 所有管理员编辑都在一次 `CampaignStore::update` 中完成：
/// - 对未激活或已过期的广告位设置 `active: true` 会重新排期并开启新周期，写入成功后发送一次开始通知
/// - 对激活中的广告位设置 `active: false` 是手动停用，不触发任何过期动作
pub struct CampaignAdmin {
    store: Arc<CampaignStore>,
    dispatcher: Arc<NotificationDispatcher>,
    uploader: Option<Arc<dyn AssetUploader>>,
}

impl CampaignAdmin {
    pub fn new(store: Arc<CampaignStore>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            uploader: None,
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn AssetUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn store(&self) -> &Arc<CampaignStore> {
        &self.store
    }

    pub async fn apply(
        &self,
        placement: PlacementType,
        patch: AdminPatch,
        now: DateTime<Utc>,
    ) -> Result<Applied, AdminError> {
        let mut activated = false;
        let mut scheduled_before = false;
        let value = self
            .store
            .update(placement, |current| {
                let wants_active = patch.active;
                let mut next = PlacementPatch::from(patch);
                match wants_active {
                    Some(true) if !current.active || current.is_expired(now) => {
                        let token = next.runtime.as_deref().unwrap_or(&current.runtime);
                        let until = runtime::parse(token, now)?;
                        next = next.schedule(now, until);
                        activated = true;
                        scheduled_before =
                            current.cycle_id.is_some() || current.expiration_date.is_some();
                    }
                    // 仍在投放中，不重新排期
                    Some(true) => next.active = None,
                    Some(false) if current.active => {
                        next = next.deactivate(now, DeactivationReason::Manual);
                    }
                    _ => {}
                }
                Ok(next)
            })
            .await?;

        let start_notice = if activated {
            info!(
                placement = %placement,
                cycle = ?value.cycle_id,
                expiration = ?value.expiration_date,
                "placement activated"
            );
            // 重新激活时告知新窗口的结束时间
            let notice = match value.expiration_date {
                Some(until) if scheduled_before => Notice::renewed(placement, until),
                _ => Notice::started(placement),
            };
            self.dispatcher.spawn_gated(value.clone(), notice)
        } else {
            None
        };
        Ok(Applied { value, start_notice })
    }

    /// 选中过期事件；Deactivate 与 Reset 互斥
    pub async fn select_event(
        &self,
        placement: PlacementType,
        event: ExpirationEvent,
    ) -> Result<AdPlacement, AdminError> {
        Ok(self
            .store
            .update(placement, |current| {
                let mut events = current.expiration_events.clone();
                events.select(event);
                Ok(PlacementPatch {
                    expiration_events: Some(events),
                    ..Default::default()
                })
            })
            .await?)
    }

    pub async fn deselect_event(
        &self,
        placement: PlacementType,
        event: ExpirationEvent,
    ) -> Result<AdPlacement, AdminError> {
        Ok(self
            .store
            .update(placement, |current| {
                let mut events = current.expiration_events.clone();
                events.deselect(event);
                Ok(PlacementPatch {
                    expiration_events: Some(events),
                    ..Default::default()
                })
            })
            .await?)
    }

    pub async fn record_click(&self, placement: PlacementType) -> Result<AdPlacement, AdminError> {
        Ok(self
            .store
            .update(placement, |current| {
                Ok(PlacementPatch {
                    clicks: Some(current.clicks.saturating_add(1)),
                    ..Default::default()
                })
            })
            .await?)
    }

    pub async fn clear(&self, placement: PlacementType) -> Result<AdPlacement, AdminError> {
        info!(placement = %placement, "placement cleared");
        Ok(self.store.clear(placement).await?)
    }

    /// 上传图片并把返回的 URL 写到广告位上
    pub async fn attach_image(
        &self,
        placement: PlacementType,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<AdPlacement, AdminError> {
        let uploader = self.uploader.as_ref().ok_or(AdminError::UploaderNotConfigured)?;
        let url = uploader.upload(placement, file_name, bytes).await?;
        let patch = PlacementPatch {
            image: Some(Some(url)),
            ..Default::default()
        };
        Ok(self.store.upsert(placement, patch).await?)
    }
}
