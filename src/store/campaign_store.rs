// src/store/campaign_store.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::model::placements::{AdPlacement, ConflictingEvents, PlacementType};
use crate::model::patch::PlacementPatch;
use crate::model::runtime::{self, DurationError};
use crate::store::backend::{StorageBackend, StorageError};

/// 整个广告配置文档存放的固定 key
pub const CAMPAIGNS_KEY: &str = "ad_campaigns";

/// 写入被拒绝或持久化失败
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidDuration(#[from] DurationError),
    #[error(transparent)]
    ConflictingEvents(#[from] ConflictingEvents),
    #[error("placement {0} cannot be active without a valid start and expiration date")]
    MissingSchedule(PlacementType),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StoreError {
    /// 配置错误（可以直接反馈给管理员），而非存储故障
    pub fn is_validation(&self) -> bool {
        !matches!(self, StoreError::Storage(_))
    }
}

/// 每次成功写入后广播的变更事件
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreEvent {
    pub placement: PlacementType,
    pub value: AdPlacement,
    pub revision: u64,
}

struct StoreState {
    placements: BTreeMap<PlacementType, AdPlacement>,
    revision: u64,
}

/// **广告配置存储**
///
/// - `get` 永远返回完整的默认值填充结构
/// - 所有写操作在同一把异步锁下串行执行：读取 → 合并 → 校验 → 持久化 → 提交 → 广播
/// - 持久化失败时内存状态保持不变，也不会广播
pub struct CampaignStore {
    backend: Arc<dyn StorageBackend>,
    state: Mutex<StoreState>,
    tx: broadcast::Sender<StoreEvent>,
}

impl CampaignStore {
    /// 从存储后端加载现有文档；文档不存在时从空配置开始
    pub async fn open(
        backend: Arc<dyn StorageBackend>,
        channel_capacity: usize,
    ) -> Result<Self, StoreError> {
        let placements = match backend.load(CAMPAIGNS_KEY).await? {
            Some(document) => serde_json::from_str(&document).map_err(StorageError::from)?,
            None => BTreeMap::new(),
        };
        let (tx, _rx) = broadcast::channel(channel_capacity.max(1));
        Ok(Self {
            backend,
            state: Mutex::new(StoreState {
                placements,
                revision: 0,
            }),
            tx,
        })
    }

    pub async fn get(&self, placement: PlacementType) -> AdPlacement {
        let state = self.state.lock().await;
        state.placements.get(&placement).cloned().unwrap_or_default()
    }

    /// 所有广告位的当前值（包括从未配置过的默认值）
    pub async fn snapshot(&self) -> BTreeMap<PlacementType, AdPlacement> {
        let state = self.state.lock().await;
        PlacementType::ALL
            .into_iter()
            .map(|p| (p, state.placements.get(&p).cloned().unwrap_or_default()))
            .collect()
    }

    pub async fn revision(&self) -> u64 {
        self.state.lock().await.revision
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// 合并补丁并持久化，成功后广播恰好一次变更事件
    pub async fn upsert(
        &self,
        placement: PlacementType,
        patch: PlacementPatch,
    ) -> Result<AdPlacement, StoreError> {
        self.update(placement, move |_| Ok(patch)).await
    }

    /// **读-改-写**
    ///
    /// `plan` 在写锁内根据当前值生成补丁，整个过程是一次原子的补丁应用。
    /// 返回空补丁时不写入、不广播，直接返回当前值。
    pub async fn update<F>(&self, placement: PlacementType, plan: F) -> Result<AdPlacement, StoreError>
    where
        F: FnOnce(&AdPlacement) -> Result<PlacementPatch, StoreError>,
    {
        let mut state = self.state.lock().await;
        let current = state.placements.get(&placement).cloned().unwrap_or_default();

        let patch = plan(&current)?;
        if patch.is_empty() {
            return Ok(current);
        }
        let runtime_changed = patch.runtime.is_some();
        let mut next = current;
        patch.apply_to(&mut next);
        validate(placement, &next, runtime_changed)?;

        self.commit(&mut state, placement, next).await
    }

    /// 管理员显式清除：恢复为默认值
    pub async fn clear(&self, placement: PlacementType) -> Result<AdPlacement, StoreError> {
        let mut state = self.state.lock().await;
        self.commit(&mut state, placement, AdPlacement::default()).await
    }

    async fn commit(
        &self,
        state: &mut StoreState,
        placement: PlacementType,
        next: AdPlacement,
    ) -> Result<AdPlacement, StoreError> {
        let mut placements = state.placements.clone();
        placements.insert(placement, next.clone());

        let document = serde_json::to_string(&placements).map_err(StorageError::from)?;
        if let Err(e) = self.backend.save(CAMPAIGNS_KEY, &document).await {
            warn!(placement = %placement, error = %e, "campaign store write failed");
            return Err(e.into());
        }

        state.placements = placements;
        state.revision += 1;
        let event = StoreEvent {
            placement,
            value: next.clone(),
            revision: state.revision,
        };
        debug!(placement = %placement, revision = state.revision, "campaign store updated");
        // 没有订阅者时发送失败是正常情况
        let _ = self.tx.send(event);
        Ok(next)
    }
}

/// 激活中的广告位必须有合法的排期；runtime 变更时必须能解析
fn validate(
    placement: PlacementType,
    value: &AdPlacement,
    runtime_changed: bool,
) -> Result<(), StoreError> {
    if runtime_changed {
        let start = value.start_date.unwrap_or_else(chrono::Utc::now);
        runtime::parse(&value.runtime, start)?;
    }
    if value.active {
        match (value.start_date, value.expiration_date) {
            (Some(start), Some(exp)) if exp > start => {}
            _ => return Err(StoreError::MissingSchedule(placement)),
        }
    }
    Ok(())
}
