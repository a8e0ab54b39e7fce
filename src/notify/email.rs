// src/notify/email.rs

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::model::placements::NotificationMethod;
use crate::notify::channels::{NotificationChannel, NotificationError};
use crate::notify::message::Notice;

/// SMTP 连接参数
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub from: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// false 时使用明文连接（本地调试用的 SMTP 服务）
    pub starttls: bool,
}

/// 发信服务
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: Address, notice: &Notice) -> Result<(), NotificationError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotificationError> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|_| NotificationError::InvalidAddress(settings.from.clone()))?;

        let mut builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| NotificationError::Delivery(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        };
        builder = builder.port(settings.port);
        if let (Some(user), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: Address, notice: &Notice) -> Result<(), NotificationError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(None, to))
            .subject(notice.title.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(notice.body.clone())
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;
        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| NotificationError::Delivery(e.to_string()))
    }
}

/// 不发信，只记录收件人与标题；未配置 SMTP 时使用
#[derive(Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// (收件人, 标题)
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, to: Address, notice: &Notice) -> Result<(), NotificationError> {
        tracing::info!(to = %to, title = %notice.title, "email queued in outbox");
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((to.to_string(), notice.title.clone()));
        Ok(())
    }
}

pub struct EmailChannel {
    mailer: Arc<dyn Mailer>,
}

impl EmailChannel {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn method(&self) -> NotificationMethod {
        NotificationMethod::Email
    }

    async fn deliver(&self, notice: &Notice, target: &str) -> Result<(), NotificationError> {
        let address: Address = target
            .parse()
            .map_err(|_| NotificationError::InvalidAddress(target.to_string()))?;
        self.mailer.send(address, notice).await
    }
}
