// src/notify/channels.rs

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Duration;

use crate::model::placements::{NotificationMethod, PlacementType};
use crate::notify::message::Notice;

/// 单个 (收件人, 渠道) 的投递失败原因
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", content = "detail", rename_all = "snake_case")]
pub enum NotificationError {
    #[error("unknown recipient {0}")]
    UnknownRecipient(String),
    #[error("invalid email address {0}")]
    InvalidAddress(String),
    #[error("no channel configured for {0}")]
    ChannelUnavailable(NotificationMethod),
    #[error("no connected browser client")]
    NoBrowserClient,
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// 通知渠道
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn method(&self) -> NotificationMethod;

    /// 向单个目标投递，`target` 对通知中心是用户 ID，对邮件是邮箱地址
    async fn deliver(&self, notice: &Notice, target: &str) -> Result<(), NotificationError>;
}

// ---------------------------------------------------------------------------
// 通知中心
// ---------------------------------------------------------------------------

/// 写入消息中心的一条记录
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CenterMessage {
    pub recipient: String,
    pub title: String,
    pub body: String,
}

/// 外部消息中心
#[async_trait]
pub trait MessageCenter: Send + Sync {
    async fn post(&self, message: CenterMessage) -> Result<(), NotificationError>;
}

pub struct HttpMessageCenter {
    client: Client,
    endpoint: String,
}

impl HttpMessageCenter {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl MessageCenter for HttpMessageCenter {
    async fn post(&self, message: CenterMessage) -> Result<(), NotificationError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(NotificationError::Delivery(format!(
                "message center returned status {}",
                resp.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// 内存消息中心，mock 服务与测试共用
#[derive(Default)]
pub struct InMemoryMessageCenter {
    records: Mutex<Vec<CenterMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryMessageCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后发给 `recipient` 的消息全部失败
    pub fn fail_for(&self, recipient: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(recipient.to_string());
    }

    pub fn records(&self) -> Vec<CenterMessage> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count_for(&self, recipient: &str) -> usize {
        self.records()
            .iter()
            .filter(|m| m.recipient == recipient)
            .count()
    }
}

#[async_trait]
impl MessageCenter for InMemoryMessageCenter {
    async fn post(&self, message: CenterMessage) -> Result<(), NotificationError> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&message.recipient);
        if failing {
            return Err(NotificationError::Delivery(format!(
                "message center rejected {}",
                message.recipient
            )));
        }
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
        Ok(())
    }
}

pub struct NotificationCenterChannel {
    center: Arc<dyn MessageCenter>,
}

impl NotificationCenterChannel {
    pub fn new(center: Arc<dyn MessageCenter>) -> Self {
        Self { center }
    }
}

#[async_trait]
impl NotificationChannel for NotificationCenterChannel {
    fn method(&self) -> NotificationMethod {
        NotificationMethod::NotificationCenter
    }

    async fn deliver(&self, notice: &Notice, target: &str) -> Result<(), NotificationError> {
        self.center
            .post(CenterMessage {
                recipient: target.to_string(),
                title: notice.title.clone(),
                body: notice.body.clone(),
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// 浏览器推送
// ---------------------------------------------------------------------------

/// 推送给已连接浏览器的消息，经由 `/events` SSE 下发
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrowserPush {
    pub placement: PlacementType,
    pub title: String,
    pub body: String,
}

/// 尽力而为：没有订阅者时记一次失败，不影响其他渠道
pub struct BrowserChannel {
    tx: broadcast::Sender<BrowserPush>,
}

impl BrowserChannel {
    pub fn new(tx: broadcast::Sender<BrowserPush>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl NotificationChannel for BrowserChannel {
    fn method(&self) -> NotificationMethod {
        NotificationMethod::Browser
    }

    async fn deliver(&self, notice: &Notice, _target: &str) -> Result<(), NotificationError> {
        let push = BrowserPush {
            placement: notice.placement,
            title: notice.title.clone(),
            body: notice.body.clone(),
        };
        self.tx
            .send(push)
            .map(|_| ())
            .map_err(|_| NotificationError::NoBrowserClient)
    }
}
