// src/notify/message.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::placements::PlacementType;

pub const START_TITLE: &str = "Advertisement Started";
pub const EXPIRED_TITLE: &str = "Advertisement Expired";

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoticeKind {
    /// 管理员激活
    Started,
    /// 调度器重置后进入新窗口
    Renewed { until: DateTime<Utc> },
    /// 窗口结束
    Expired { at: DateTime<Utc> },
}

impl NoticeKind {
    pub fn is_start(&self) -> bool {
        matches!(self, NoticeKind::Started | NoticeKind::Renewed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            NoticeKind::Started => "started",
            NoticeKind::Renewed { .. } => "renewed",
            NoticeKind::Expired { .. } => "expired",
        }
    }
}

/// 发给收件人的一条通知
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub placement: PlacementType,
    pub kind: NoticeKind,
    pub title: String,
    pub body: String,
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

impl Notice {
    pub fn started(placement: PlacementType) -> Self {
        Self {
            placement,
            kind: NoticeKind::Started,
            title: START_TITLE.to_string(),
            body: format!(
                "Your advertisement on the {} is now running.",
                placement.page_location()
            ),
        }
    }

    pub fn renewed(placement: PlacementType, until: DateTime<Utc>) -> Self {
        Self {
            placement,
            kind: NoticeKind::Renewed { until },
            title: START_TITLE.to_string(),
            body: format!(
                "Your advertisement on the {} is now running until {}.",
                placement.page_location(),
                format_date(until)
            ),
        }
    }

    pub fn expired(placement: PlacementType, at: DateTime<Utc>) -> Self {
        Self {
            placement,
            kind: NoticeKind::Expired { at },
            title: EXPIRED_TITLE.to_string(),
            body: format!(
                "Your advertisement on the {} expired at {}.",
                placement.page_location(),
                format_date(at)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn start_bodies_name_location_and_window() {
        let started = Notice::started(PlacementType::BrowsePage);
        assert_eq!(started.title, START_TITLE);
        assert_eq!(started.body, "Your advertisement on the browse page is now running.");

        let until = Utc.with_ymd_and_hms(2026, 7, 1, 9, 30, 0).unwrap();
        let renewed = Notice::renewed(PlacementType::Footer, until);
        assert_eq!(renewed.title, START_TITLE);
        assert_eq!(
            renewed.body,
            "Your advertisement on the footer is now running until 2026-07-01 09:30 UTC."
        );
        assert!(renewed.kind.is_start());
        assert!(!Notice::expired(PlacementType::Footer, until).kind.is_start());
    }
}
