// src/upload.rs

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Duration;

use crate::model::placements::PlacementType;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload endpoint returned status {0}")]
    Status(u16),
    #[error("upload endpoint returned no url")]
    EmptyResponse,
}

/// 图片 / Logo 上传服务，返回可直接存到广告位上的 URL
#[async_trait]
pub trait AssetUploader: Send + Sync {
    async fn upload(
        &self,
        section: PlacementType,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError>;
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

/// multipart 表单：`file` 为文件内容，`section` 为广告位
pub struct HttpAssetUploader {
    client: Client,
    endpoint: String,
}

impl HttpAssetUploader {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl AssetUploader for HttpAssetUploader {
    async fn upload(
        &self,
        section: PlacementType,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()))
            .text("section", section.as_str());
        let resp = self.client.post(&self.endpoint).multipart(form).send().await?;
        if !resp.status().is_success() {
            return Err(UploadError::Status(resp.status().as_u16()));
        }
        let body = resp.text().await?;
        parse_upload_body(&body)
    }
}

/// 上传接口可能返回 `{"url": ...}`，也可能直接返回 URL 文本
fn parse_upload_body(body: &str) -> Result<String, UploadError> {
    let url = match serde_json::from_str::<UploadResponse>(body) {
        Ok(parsed) => parsed.url,
        Err(_) => body.trim().trim_matches('"').to_string(),
    };
    if url.trim().is_empty() {
        return Err(UploadError::EmptyResponse);
    }
    Ok(url.trim().to_string())
}
