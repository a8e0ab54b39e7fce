// src/config/config_manager.rs

use std::path::PathBuf;

use chrono::FixedOffset;
use clap::Parser;
use thiserror::Error;
use tokio::time::Duration;

use crate::notify::email::SmtpSettings;

/// 命令行参数，未指定时读取同名环境变量
#[derive(Parser, Debug, Clone)]
#[command(author = "whiteCcinn", version = "1.0", about = "Ad placement lifecycle & expiration service")]
pub struct CliArgs {
    #[arg(short, long, env = "AD_LIFECYCLE_PORT", default_value_t = 8080)]
    pub port: u16,
    #[arg(long, env = "AD_LIFECYCLE_LOG_DIR", default_value = "logs")]
    pub log_dir: String,
    /// 运行日志时间戳使用的时区（小时）
    #[arg(long, default_value_t = 8, allow_negative_numbers = true)]
    pub log_utc_offset_hours: i32,
    #[arg(long, env = "AD_LIFECYCLE_STORE_DIR", default_value = "data")]
    pub store_dir: PathBuf,
    /// 配置文档的最大字节数，不设置则不限制
    #[arg(long)]
    pub store_quota_bytes: Option<usize>,
    #[arg(long, default_value_t = 1000)]
    pub tick_interval_ms: u64,
    #[arg(long, default_value_t = 3000)]
    pub upstream_timeout_ms: u64,
    #[arg(long, env = "AD_LIFECYCLE_DIRECTORY_URL", default_value = "http://127.0.0.1:9001/users")]
    pub directory_url: String,
    #[arg(long, env = "AD_LIFECYCLE_MESSAGE_CENTER_URL", default_value = "http://127.0.0.1:9001/messages")]
    pub message_center_url: String,
    #[arg(long, env = "AD_LIFECYCLE_UPLOAD_URL", default_value = "http://127.0.0.1:9001/upload")]
    pub upload_url: String,
    #[arg(long, env = "AD_LIFECYCLE_SMTP_HOST")]
    pub smtp_host: Option<String>,
    #[arg(long, default_value_t = 587)]
    pub smtp_port: u16,
    #[arg(long, env = "AD_LIFECYCLE_SMTP_FROM", default_value = "ads@localhost")]
    pub smtp_from: String,
    #[arg(long, env = "AD_LIFECYCLE_SMTP_USER")]
    pub smtp_user: Option<String>,
    #[arg(long, env = "AD_LIFECYCLE_SMTP_PASSWORD")]
    pub smtp_password: Option<String>,
    /// 关闭 STARTTLS（本地调试 SMTP）
    #[arg(long)]
    pub smtp_plaintext: bool,
    /// 在本进程内启动用户目录 / 消息中心 / 上传 mock 服务
    #[arg(long)]
    pub mock_services: bool,
    #[arg(long, default_value_t = 9001)]
    pub mock_port: u16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid utc offset: {0} hours")]
    InvalidOffset(i32),
    #[error("tick interval must be positive")]
    ZeroTickInterval,
}

/// 服务运行配置
#[derive(Clone, Debug)]
pub struct ConfigManager {
    pub port: u16,
    pub log_dir: String,
    pub log_offset: FixedOffset,
    pub store_dir: PathBuf,
    pub store_quota_bytes: Option<usize>,
    pub tick_interval: Duration,
    pub upstream_timeout: Duration,
    pub directory_url: String,
    pub message_center_url: String,
    pub upload_url: String,
    /// 未配置 SMTP 时邮件只写入 outbox
    pub smtp: Option<SmtpSettings>,
    pub mock_services: bool,
    pub mock_port: u16,
}

impl ConfigManager {
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let log_offset = args
            .log_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidOffset(args.log_utc_offset_hours))?;
        if args.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        let smtp = args.smtp_host.as_ref().map(|host| SmtpSettings {
            host: host.clone(),
            port: args.smtp_port,
            from: args.smtp_from.clone(),
            username: args.smtp_user.clone(),
            password: args.smtp_password.clone(),
            starttls: !args.smtp_plaintext,
        });

        Ok(ConfigManager {
            port: args.port,
            log_dir: args.log_dir.clone(),
            log_offset,
            store_dir: args.store_dir.clone(),
            store_quota_bytes: args.store_quota_bytes,
            tick_interval: Duration::from_millis(args.tick_interval_ms),
            upstream_timeout: Duration::from_millis(args.upstream_timeout_ms),
            directory_url: args.directory_url.clone(),
            message_center_url: args.message_center_url.clone(),
            upload_url: args.upload_url.clone(),
            smtp,
            mock_services: args.mock_services,
            mock_port: args.mock_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_mock_services() {
        let args = CliArgs::try_parse_from(["ad-lifecycle"]).unwrap();
        let config = ConfigManager::from_args(&args).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_offset, FixedOffset::east_opt(8 * 3600).unwrap());
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.directory_url, "http://127.0.0.1:9001/users");
        assert!(config.smtp.is_none());
    }

    #[test]
    fn smtp_and_offset_flags() {
        let args = CliArgs::try_parse_from([
            "ad-lifecycle",
            "--smtp-host",
            "mail.example",
            "--smtp-plaintext",
            "--log-utc-offset-hours",
            "-5",
        ])
        .unwrap();
        let config = ConfigManager::from_args(&args).unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.host, "mail.example");
        assert!(!smtp.starttls);
        assert_eq!(config.log_offset, FixedOffset::west_opt(5 * 3600).unwrap());
    }

    #[test]
    fn rejects_bad_values() {
        let args = CliArgs::try_parse_from(["ad-lifecycle", "--log-utc-offset-hours", "30"]).unwrap();
        assert_eq!(ConfigManager::from_args(&args).unwrap_err(), ConfigError::InvalidOffset(30));
        let args = CliArgs::try_parse_from(["ad-lifecycle", "--tick-interval-ms", "0"]).unwrap();
        assert_eq!(ConfigManager::from_args(&args).unwrap_err(), ConfigError::ZeroTickInterval);
    }
}
