// src/notify/dispatcher.rs

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::logging::{LifecycleLog, RuntimeLogger};
use crate::model::placements::{AdPlacement, NotificationMethod, PlacementType};
use crate::notify::channels::{NotificationChannel, NotificationError};
use crate::notify::directory::UserDirectory;
use crate::notify::gate::{CycleKey, NoticeGate};
use crate::notify::message::{Notice, NoticeKind};

/// 浏览器推送没有具体收件人，统一使用这个目标名
pub const BROWSER_TARGET: &str = "browser";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub method: NotificationMethod,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDelivery {
    pub method: NotificationMethod,
    pub target: String,
    pub error: NotificationError,
}

/// 一次分发的结果：成功与失败分别收集，互不影响
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub placement: PlacementType,
    pub kind: NoticeKind,
    pub succeeded: Vec<Delivery>,
    pub failed: Vec<FailedDelivery>,
}

impl DispatchReport {
    fn new(placement: PlacementType, kind: NoticeKind) -> Self {
        Self {
            placement,
            kind,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn fail(&mut self, method: NotificationMethod, target: &str, error: NotificationError) {
        self.failed.push(FailedDelivery {
            method,
            target: target.to_string(),
            error,
        });
    }

    /// 成功投递到 `method` 的目标
    pub fn delivered(&self, method: NotificationMethod) -> Vec<&str> {
        self.succeeded
            .iter()
            .filter(|d| d.method == method)
            .map(|d| d.target.as_str())
            .collect()
    }
}

/// **通知分发器**
///
/// 把一条通知按 (收件人, 渠道) 拆成独立任务并发投递，等待全部完成后汇总结果。
/// 单个投递失败只记录在报告里，不会影响其他投递。
pub struct NotificationDispatcher {
    channels: HashMap<NotificationMethod, Arc<dyn NotificationChannel>>,
    directory: Arc<dyn UserDirectory>,
    gate: NoticeGate,
    audit: Option<Arc<RuntimeLogger>>,
}

impl NotificationDispatcher {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            channels: HashMap::new(),
            directory,
            gate: NoticeGate::new(),
            audit: None,
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.insert(channel.method(), channel);
        self
    }

    /// 每次分发都写一条生命周期日志
    pub fn with_audit(mut self, audit: Arc<RuntimeLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// 按广告位配置的渠道与收件人分发通知
    pub async fn dispatch(&self, placement: &AdPlacement, notice: &Notice) -> DispatchReport {
        let mut report = DispatchReport::new(notice.placement, notice.kind);
        let notice = Arc::new(notice.clone());

        let mut jobs: Vec<(NotificationMethod, String)> = Vec::new();
        for method in placement.notification_methods.iter().copied() {
            let targets = match method {
                NotificationMethod::NotificationCenter => {
                    self.resolve_users(placement, &mut report).await
                }
                NotificationMethod::Email => placement.email_list(),
                NotificationMethod::Browser => vec![BROWSER_TARGET.to_string()],
            };
            if self.channels.contains_key(&method) {
                jobs.extend(targets.into_iter().map(|t| (method, t)));
            } else {
                for target in targets {
                    report.fail(method, &target, NotificationError::ChannelUnavailable(method));
                }
            }
        }

        let tasks: Vec<_> = jobs
            .into_iter()
            .filter_map(|(method, target)| {
                let channel = Arc::clone(self.channels.get(&method)?);
                let notice = Arc::clone(&notice);
                Some(tokio::spawn(async move {
                    let outcome = channel.deliver(&notice, &target).await;
                    (method, target, outcome)
                }))
            })
            .collect();

        for result in join_all(tasks).await {
            match result {
                Ok((method, target, Ok(()))) => report.succeeded.push(Delivery { method, target }),
                Ok((method, target, Err(error))) => report.fail(method, &target, error),
                Err(e) => warn!(error = %e, "notification task aborted"),
            }
        }

        info!(
            placement = %report.placement,
            kind = report.kind.label(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "notification dispatched"
        );
        self.write_audit(placement, &report).await;
        report
    }

    /// 在后台分发，立即返回
    pub fn spawn(self: &Arc<Self>, placement: AdPlacement, notice: Notice) -> JoinHandle<DispatchReport> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.dispatch(&placement, &notice).await })
    }

    /// 经过去重闸门后再分发；同一周期已经发过同类通知时返回 `None`
    pub fn spawn_gated(
        self: &Arc<Self>,
        placement: AdPlacement,
        notice: Notice,
    ) -> Option<JoinHandle<DispatchReport>> {
        let cycle = CycleKey::of(&placement);
        if !self.gate.admit(notice.placement, cycle, &notice.kind) {
            debug!(
                placement = %notice.placement,
                cycle = ?cycle,
                kind = notice.kind.label(),
                "notice already sent for this cycle"
            );
            return None;
        }
        Some(self.spawn(placement, notice))
    }

    /// 通知中心收件人需要在用户目录中存在；目录不可用时按原 ID 直接投递
    async fn resolve_users(&self, placement: &AdPlacement, report: &mut DispatchReport) -> Vec<String> {
        let ids = placement.recipients();
        if ids.is_empty() {
            return ids;
        }
        let users = match self.directory.list_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "user directory unavailable, delivering to unresolved ids");
                return ids;
            }
        };
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            match users.iter().find(|u| u.id == id) {
                Some(user) => {
                    debug!(id = %id, name = %user.name, "recipient resolved");
                    resolved.push(id);
                }
                None => report.fail(
                    NotificationMethod::NotificationCenter,
                    &id,
                    NotificationError::UnknownRecipient(id.clone()),
                ),
            }
        }
        resolved
    }

    async fn write_audit(&self, placement: &AdPlacement, report: &DispatchReport) {
        let Some(audit) = &self.audit else {
            return;
        };
        let mut log = LifecycleLog::new(&format!("notice_{}", report.kind.label()), report.placement)
            .with_cycle(placement.cycle_id);
        for delivery in &report.succeeded {
            log.add_delivery_log(delivery.method, &delivery.target, "success");
        }
        for failure in &report.failed {
            log.add_delivery_log(failure.method, &failure.target, &failure.error.to_string());
        }
        audit.log_record("INFO", &log).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::channels::{InMemoryMessageCenter, NotificationCenterChannel};
    use crate::notify::directory::{DirectoryError, DirectoryUser, StaticDirectory};
    use crate::notify::email::{EmailChannel, OutboxMailer};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    struct DownDirectory;

    #[async_trait]
    impl UserDirectory for DownDirectory {
        async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError> {
            Err(DirectoryError::Status(503))
        }
    }

    fn users() -> Arc<StaticDirectory> {
        Arc::new(StaticDirectory::new(vec![
            DirectoryUser { id: "a".into(), name: "Ada".into(), email: None },
            DirectoryUser { id: "b".into(), name: "Bo".into(), email: None },
        ]))
    }

    fn placement(methods: &[NotificationMethod]) -> AdPlacement {
        AdPlacement {
            notification_methods: methods.iter().copied().collect::<BTreeSet<_>>(),
            notification_users: vec!["a".into(), "b".into(), "ghost".into()],
            notification_emails: Some("ops@shop.example, broken".into()),
            cycle_id: Some(Uuid::new_v4()),
            ..AdPlacement::default()
        }
    }

    #[tokio::test]
    async fn fans_out_and_collects_partial_failures() {
        let center = Arc::new(InMemoryMessageCenter::new());
        center.fail_for("b");
        let outbox = Arc::new(OutboxMailer::new());
        let dispatcher = NotificationDispatcher::new(users())
            .with_channel(Arc::new(NotificationCenterChannel::new(center.clone())))
            .with_channel(Arc::new(EmailChannel::new(outbox.clone())));

        let p = placement(&[NotificationMethod::NotificationCenter, NotificationMethod::Email]);
        let report = dispatcher.dispatch(&p, &Notice::started(PlacementType::Footer)).await;

        assert_eq!(report.delivered(NotificationMethod::NotificationCenter), vec!["a"]);
        assert_eq!(report.delivered(NotificationMethod::Email), vec!["ops@shop.example"]);
        assert_eq!(report.failed.len(), 3);
        assert!(report
            .failed
            .iter()
            .any(|f| f.error == NotificationError::UnknownRecipient("ghost".into())));
        assert!(report
            .failed
            .iter()
            .any(|f| f.error == NotificationError::InvalidAddress("broken".into())));
        assert_eq!(center.count_for("a"), 1);
        assert_eq!(outbox.sent().len(), 1);
    }

    #[tokio::test]
    async fn directory_outage_does_not_abort_delivery() {
        let center = Arc::new(InMemoryMessageCenter::new());
        let dispatcher = NotificationDispatcher::new(Arc::new(DownDirectory))
            .with_channel(Arc::new(NotificationCenterChannel::new(center.clone())));

        let p = placement(&[NotificationMethod::NotificationCenter]);
        let report = dispatcher.dispatch(&p, &Notice::started(PlacementType::Footer)).await;

        assert_eq!(report.succeeded.len(), 3);
        assert_eq!(center.count_for("ghost"), 1);
    }

    #[tokio::test]
    async fn missing_channel_is_reported_per_target() {
        let dispatcher = NotificationDispatcher::new(users());
        let p = placement(&[NotificationMethod::Browser]);
        let report = dispatcher.dispatch(&p, &Notice::started(PlacementType::Footer)).await;
        assert_eq!(
            report.failed[0].error,
            NotificationError::ChannelUnavailable(NotificationMethod::Browser)
        );
    }

    #[tokio::test]
    async fn gated_start_notice_is_sent_once_per_cycle() {
        let center = Arc::new(InMemoryMessageCenter::new());
        let dispatcher = Arc::new(
            NotificationDispatcher::new(users())
                .with_channel(Arc::new(NotificationCenterChannel::new(center.clone()))),
        );
        let p = placement(&[NotificationMethod::NotificationCenter]);

        let first = dispatcher.spawn_gated(p.clone(), Notice::started(PlacementType::Footer));
        let second = dispatcher.spawn_gated(p, Notice::started(PlacementType::Footer));
        assert!(second.is_none());
        first.unwrap().await.unwrap();
        assert_eq!(center.count_for("a"), 1);
        assert_eq!(center.count_for("b"), 1);
    }
}
