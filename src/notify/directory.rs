// src/notify/directory.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::time::Duration;

/// 用户目录中的一个可选收件人
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// 目录服务返回的 id 可能是数字
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    })
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("user directory returned status {0}")]
    Status(u16),
}

/// 外部用户目录
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError>;
}

/// 通过 HTTP GET 拉取用户目录
pub struct HttpUserDirectory {
    client: Client,
    endpoint: String,
}

impl HttpUserDirectory {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError> {
        let resp = self.client.get(&self.endpoint).send().await?;
        if !resp.status().is_success() {
            return Err(DirectoryError::Status(resp.status().as_u16()));
        }
        Ok(resp.json::<Vec<DirectoryUser>>().await?)
    }
}

/// 固定的用户列表，用于 mock 服务与测试
#[derive(Default, Clone)]
pub struct StaticDirectory {
    pub users: Vec<DirectoryUser>,
}

impl StaticDirectory {
    pub fn new(users: Vec<DirectoryUser>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError> {
        Ok(self.users.clone())
    }
}
