// src/notify/gate.rs

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::placements::{AdPlacement, PlacementType};
use crate::notify::message::NoticeKind;

/// 投放周期标识；缺少 `cycleId` 的旧文档退回到当前窗口的过期时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleKey {
    Cycle(Uuid),
    Window(Option<DateTime<Utc>>),
}

impl CycleKey {
    pub fn of(placement: &AdPlacement) -> Self {
        match placement.cycle_id {
            Some(cycle) => CycleKey::Cycle(cycle),
            None => CycleKey::Window(placement.expiration_date),
        }
    }
}

/// 通知去重闸门
///
/// 同一广告位同一投放周期内，开始通知（Started / Renewed）与过期通知各最多放行一次，
/// 无论请求来自管理员激活还是调度器重置。每个广告位只保留最近一个周期。
#[derive(Default)]
pub struct NoticeGate {
    admitted: Mutex<HashMap<(PlacementType, bool), CycleKey>>,
}

impl NoticeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 第一次遇到该 (广告位, 周期, 类别) 时返回 `true`
    pub fn admit(&self, placement: PlacementType, cycle: CycleKey, kind: &NoticeKind) -> bool {
        let key = (placement, kind.is_start());
        let mut admitted = self.admitted.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if admitted.get(&key) == Some(&cycle) {
            return false;
        }
        admitted.insert(key, cycle);
        true
    }
}
