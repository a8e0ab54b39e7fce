use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::placements::{NotificationMethod, PlacementType};

/// **广告位生命周期日志**
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LifecycleLog {
    pub timestamp: String,             // 记录时间
    pub log_type: String,              // 日志类型，如 "placement_expired"
    pub placement: PlacementType,      // 广告位
    pub cycle_id: Option<String>,      // 投放周期
    pub transition: Option<String>,    // 状态迁移，如 "deactivated"
    pub expiration_date: Option<DateTime<Utc>>,
    pub deliveries: usize,             // 投递次数
    pub status: String,                // "success" / "partial" / "failure"
    pub delivery_log: Vec<DeliveryLog>, // 逐条投递日志
}

/// **单次通知投递日志**
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeliveryLog {
    pub method: NotificationMethod, // 通知渠道
    pub target: String,             // 用户 ID / 邮箱 / browser
    pub status: String,             // "success" 或失败原因
}

impl LifecycleLog {
    /// **创建生命周期日志**
    pub fn new(log_type: &str, placement: PlacementType) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            log_type: log_type.to_string(),
            placement,
            cycle_id: None,
            transition: None,
            expiration_date: None,
            deliveries: 0,
            status: "success".to_string(),
            delivery_log: Vec::new(),
        }
    }

    pub fn with_cycle(mut self, cycle_id: Option<uuid::Uuid>) -> Self {
        self.cycle_id = cycle_id.map(|id| id.to_string());
        self
    }

    /// **记录状态迁移**
    pub fn set_transition(&mut self, transition: &str, expiration_date: Option<DateTime<Utc>>) {
        self.transition = Some(transition.to_string());
        self.expiration_date = expiration_date;
    }

    /// **添加投递日志**，任意一条失败即把整体状态降级
    pub fn add_delivery_log(&mut self, method: NotificationMethod, target: &str, status: &str) {
        self.delivery_log.push(DeliveryLog {
            method,
            target: target.to_string(),
            status: status.to_string(),
        });
        self.deliveries += 1;
        let failed = self.delivery_log.iter().filter(|d| d.status != "success").count();
        self.status = match failed {
            0 => "success",
            n if n == self.deliveries => "failure",
            _ => "partial",
        }
        .to_string();
    }
}
