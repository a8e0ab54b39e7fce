// src/lifecycle/scheduler.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::logging::{LifecycleLog, RuntimeLogger};
use crate::model::patch::PlacementPatch;
use crate::model::placements::{AdPlacement, DeactivationReason, ExpirationEvent, PlacementType};
use crate::model::runtime;
use crate::notify::dispatcher::{DispatchReport, NotificationDispatcher};
use crate::notify::message::Notice;
use crate::store::{CampaignStore, StoreError};

/// 一次过期处理的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    /// 没有配置 Deactivate / Reset，只标记 handled
    Handled,
    Deactivated,
    Reset { until: DateTime<Utc> },
    /// 需要重置但 runtime 无法解析，改为停用
    InvalidRuntime,
}

impl Transition {
    pub fn label(&self) -> &'static str {
        match self {
            Transition::Handled => "handled",
            Transition::Deactivated => "deactivated",
            Transition::Reset { .. } => "reset",
            Transition::InvalidRuntime => "deactivated_invalid_runtime",
        }
    }
}

#[derive(Default)]
pub struct TickReport {
    pub transitions: Vec<(PlacementType, Transition)>,
    pub errors: Vec<(PlacementType, StoreError)>,
    /// 本轮触发的通知任务，调度循环不等待它们
    pub deliveries: Vec<JoinHandle<DispatchReport>>,
}

impl TickReport {
    pub fn transition(&self, placement: PlacementType) -> Option<Transition> {
        self.transitions
            .iter()
            .find(|(p, _)| *p == placement)
            .map(|(_, t)| *t)
    }

    /// 等待本轮所有通知投递完成
    pub async fn join_deliveries(&mut self) -> Vec<DispatchReport> {
        let handles = std::mem::take(&mut self.deliveries);
        futures::future::join_all(handles)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }
}

/// **过期调度器**
///
/// 每次 tick 检查所有激活中的广告位，只在第一次越过过期时间且 `handled == false` 时执行过期动作。
/// 通知在写入之前以后台任务发出；状态写入（包含 handled）是该广告位本轮最后一个可观察的效果。
pub struct ExpirationScheduler {
    store: Arc<CampaignStore>,
    dispatcher: Arc<NotificationDispatcher>,
    audit: Option<Arc<RuntimeLogger>>,
}

impl ExpirationScheduler {
    pub fn new(store: Arc<CampaignStore>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<RuntimeLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        for (placement, value) in self.store.snapshot().await {
            if !value.is_expired(now) || value.handled {
                continue;
            }
            self.expire(placement, value, now, &mut report).await;
        }
        report
    }

    async fn expire(
        &self,
        placement: PlacementType,
        value: AdPlacement,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let events = &value.expiration_events;
        let resets = events.contains(ExpirationEvent::Reset);
        let cycle = value.cycle_id;

        // 重置时改发续期通知（新周期写入之后）
        if events.contains(ExpirationEvent::Notify) && !resets {
            let at = value.expiration_date.unwrap_or(now);
            if let Some(handle) = self
                .dispatcher
                .spawn_gated(value.clone(), Notice::expired(placement, at))
            {
                report.deliveries.push(handle);
            }
        }

        let mut planned = None;
        let result = self
            .store
            .update(placement, |current| {
                if current.cycle_id != cycle || !current.is_expired(now) || current.handled {
                    return Ok(PlacementPatch::default());
                }
                let (transition, patch) = plan(current, now);
                planned = Some(transition);
                Ok(patch)
            })
            .await;

        let updated = match result {
            Ok(updated) => updated,
            Err(e) => {
                error!(placement = %placement, error = %e, "expiration handling failed");
                report.errors.push((placement, e));
                return;
            }
        };
        let Some(transition) = planned else {
            // 并发的管理员编辑已经改变了这个周期
            return;
        };

        info!(
            placement = %placement,
            transition = transition.label(),
            cycle = ?cycle,
            "placement expired"
        );
        if let Transition::Reset { until } = transition {
            if let Some(handle) = self
                .dispatcher
                .spawn_gated(updated.clone(), Notice::renewed(placement, until))
            {
                report.deliveries.push(handle);
            }
        }
        self.write_audit(placement, cycle, transition, &updated).await;
        report.transitions.push((placement, transition));
    }

    async fn write_audit(
        &self,
        placement: PlacementType,
        cycle: Option<Uuid>,
        transition: Transition,
        updated: &AdPlacement,
    ) {
        if let Some(audit) = &self.audit {
            let mut log = LifecycleLog::new("placement_expired", placement).with_cycle(cycle);
            log.set_transition(transition.label(), updated.expiration_date);
            audit.log_record("INFO", &log).await;
        }
    }

    /// **周期执行 tick**，收到 shutdown 信号后退出
    pub async fn run(self: Arc<Self>, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = every.as_millis() as u64, "expiration scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick(Utc::now()).await;
                    if !report.errors.is_empty() {
                        warn!(failed = report.errors.len(), "some placements will be retried next tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("expiration scheduler stopped");
    }
}

/// 根据过期事件生成补丁
fn plan(current: &AdPlacement, now: DateTime<Utc>) -> (Transition, PlacementPatch) {
    let events = &current.expiration_events;
    if events.contains(ExpirationEvent::Deactivate) {
        let patch = PlacementPatch {
            handled: Some(true),
            ..Default::default()
        }
        .deactivate(now, DeactivationReason::Expired);
        return (Transition::Deactivated, patch);
    }
    if events.contains(ExpirationEvent::Reset) {
        return match runtime::parse(&current.runtime, now) {
            Ok(until) => (
                Transition::Reset { until },
                PlacementPatch::default().schedule(now, until),
            ),
            Err(e) => {
                warn!(runtime = %current.runtime, error = %e, "cannot reset placement");
                let patch = PlacementPatch {
                    handled: Some(true),
                    ..Default::default()
                }
                .deactivate(now, DeactivationReason::InvalidRuntime);
                (Transition::InvalidRuntime, patch)
            }
        };
    }
    let patch = PlacementPatch {
        handled: Some(true),
        ..Default::default()
    };
    (Transition::Handled, patch)
}
