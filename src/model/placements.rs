// src/model/placements.rs

use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// 新广告位的默认投放时长
pub const DEFAULT_RUNTIME: &str = "1 week";

/// 广告位类型
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PlacementType {
    BrowsePage,
    FavoritesPage,
    Messenger,
    Footer,
}

impl PlacementType {
    pub const ALL: [PlacementType; 4] = [
        PlacementType::BrowsePage,
        PlacementType::FavoritesPage,
        PlacementType::Messenger,
        PlacementType::Footer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementType::BrowsePage => "browse_page",
            PlacementType::FavoritesPage => "favorites_page",
            PlacementType::Messenger => "messenger",
            PlacementType::Footer => "footer",
        }
    }

    /// 通知文案中使用的页面位置
    pub fn page_location(&self) -> &'static str {
        match self {
            PlacementType::BrowsePage => "browse page",
            PlacementType::FavoritesPage => "favorites page",
            PlacementType::Messenger => "messenger",
            PlacementType::Footer => "footer",
        }
    }
}

impl fmt::Display for PlacementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlacementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        PlacementType::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| format!("Invalid value for PlacementType: {}", s))
    }
}

/// 过期事件
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationEvent {
    Notify,
    Deactivate,
    Reset,
}

impl ExpirationEvent {
    /// 与之互斥的事件（Deactivate <-> Reset）
    pub fn counterpart(&self) -> Option<ExpirationEvent> {
        match self {
            ExpirationEvent::Notify => None,
            ExpirationEvent::Deactivate => Some(ExpirationEvent::Reset),
            ExpirationEvent::Reset => Some(ExpirationEvent::Deactivate),
        }
    }
}

impl FromStr for ExpirationEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notify" => Ok(ExpirationEvent::Notify),
            "deactivate" => Ok(ExpirationEvent::Deactivate),
            "reset" => Ok(ExpirationEvent::Reset),
            _ => Err(format!("Invalid value for ExpirationEvent: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expiration events Deactivate and Reset are mutually exclusive")]
pub struct ConflictingEvents;

/// 过期事件集合，Deactivate 与 Reset 永远不会同时存在
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(try_from = "Vec<ExpirationEvent>", into = "Vec<ExpirationEvent>")]
pub struct ExpirationEvents(BTreeSet<ExpirationEvent>);

impl ExpirationEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: ExpirationEvent) -> bool {
        self.0.contains(&event)
    }

    /// 选中一个事件；选中 Deactivate 会清掉 Reset，反之亦然
    pub fn select(&mut self, event: ExpirationEvent) {
        if let Some(other) = event.counterpart() {
            self.0.remove(&other);
        }
        self.0.insert(event);
    }

    pub fn deselect(&mut self, event: ExpirationEvent) {
        self.0.remove(&event);
    }

    pub fn iter(&self) -> impl Iterator<Item = ExpirationEvent> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<ExpirationEvent>> for ExpirationEvents {
    type Error = ConflictingEvents;

    fn try_from(events: Vec<ExpirationEvent>) -> Result<Self, Self::Error> {
        let set: BTreeSet<_> = events.into_iter().collect();
        if set.contains(&ExpirationEvent::Deactivate) && set.contains(&ExpirationEvent::Reset) {
            return Err(ConflictingEvents);
        }
        Ok(Self(set))
    }
}

impl From<ExpirationEvents> for Vec<ExpirationEvent> {
    fn from(events: ExpirationEvents) -> Self {
        events.0.into_iter().collect()
    }
}

/// 通知渠道
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMethod {
    NotificationCenter,
    Email,
    Browser,
}

impl fmt::Display for NotificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotificationMethod::NotificationCenter => "notification_center",
            NotificationMethod::Email => "email",
            NotificationMethod::Browser => "browser",
        })
    }
}

/// 停用原因
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationReason {
    /// 调度器在窗口结束时停用
    Expired,
    /// 管理员手动停用
    Manual,
    /// 重置时 runtime 无法解析
    InvalidRuntime,
}

/// 广告位配置
///
/// 反序列化时缺失的字段全部取默认值，读取方永远拿到完整的结构。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AdPlacement {
    pub active: bool,
    pub image: Option<String>,
    pub description: String,
    pub runtime: String,
    pub start_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub expiration_events: ExpirationEvents,
    pub notification_methods: BTreeSet<NotificationMethod>,
    pub notification_users: Vec<String>,
    pub notification_emails: Option<String>,
    pub clicks: u64,
    pub url: Option<String>,
    /// 当前窗口的过期动作已执行
    pub handled: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub deactivation_reason: Option<DeactivationReason>,
    /// 当前投放周期的标识，每次激活或重置都会换新
    pub cycle_id: Option<Uuid>,
}

impl Default for AdPlacement {
    fn default() -> Self {
        Self {
            active: false,
            image: None,
            description: String::new(),
            runtime: DEFAULT_RUNTIME.to_string(),
            start_date: None,
            expiration_date: None,
            expiration_events: ExpirationEvents::default(),
            notification_methods: BTreeSet::new(),
            notification_users: Vec::new(),
            notification_emails: None,
            clicks: 0,
            url: None,
            handled: false,
            deactivated_at: None,
            deactivation_reason: None,
            cycle_id: None,
        }
    }
}

impl AdPlacement {
    /// 处于激活状态且已越过过期时间
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expiration_date.is_some_and(|exp| now >= exp)
    }

    /// 解析逗号分隔的邮箱列表（去空、去重，保持顺序）
    pub fn email_list(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.notification_emails
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .filter(|addr| seen.insert(addr.to_ascii_lowercase()))
            .map(String::from)
            .collect()
    }

    /// 去重后的通知用户
    pub fn recipients(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.notification_users
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && seen.insert(id.to_string()))
            .map(String::from)
            .collect()
    }
}
