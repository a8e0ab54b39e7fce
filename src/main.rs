// src/main.rs

use std::sync::Arc;

use anyhow::Context;
use axum::serve;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use ad_lifecycle::api::{self, AppState};
use ad_lifecycle::config::{CliArgs, ConfigManager};
use ad_lifecycle::lifecycle::{CampaignAdmin, ExpirationScheduler};
use ad_lifecycle::logging::{self, RuntimeLogger};
use ad_lifecycle::mock_services;
use ad_lifecycle::notify::{
    BrowserChannel, EmailChannel, HttpMessageCenter, HttpUserDirectory, Mailer,
    NotificationCenterChannel, NotificationDispatcher, OutboxMailer, SmtpMailer, UserDirectory,
};
use ad_lifecycle::store::{CampaignStore, FileBackend};
use ad_lifecycle::upload::HttpAssetUploader;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = ConfigManager::from_args(&args)?;

    // 初始化全局 tracing 日志
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("cannot create log dir {}", config.log_dir))?;
    let _guard = logging::init_tracing(&config.log_dir)?;
    info!("Ad lifecycle service starting on port {}", config.port);

    // 初始化运行日志记录器（服务状态、管理操作、广告位生命周期审计）
    let runtime_logger =
        RuntimeLogger::new(&config.log_dir, "runtime", 1000, 100, 1000, config.log_offset);
    runtime_logger.log("INFO", "Ad lifecycle service is starting...").await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 启动 Mock 上游服务（用户目录 / 消息中心 / 上传）
    let mock_server = config.mock_services.then(|| {
        tokio::spawn(mock_services::start_mock_services(
            config.mock_port,
            shutdown_rx.clone(),
        ))
    });

    let backend = Arc::new(
        FileBackend::new(config.store_dir.clone()).with_quota(config.store_quota_bytes),
    );
    let store = Arc::new(
        CampaignStore::open(backend, 256)
            .await
            .context("cannot load campaign store")?,
    );

    let directory: Arc<dyn UserDirectory> = Arc::new(HttpUserDirectory::new(
        &config.directory_url,
        config.upstream_timeout,
    )?);
    let center = Arc::new(HttpMessageCenter::new(
        &config.message_center_url,
        config.upstream_timeout,
    )?);
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(settings) => Arc::new(SmtpMailer::new(settings)?),
        None => {
            warn!("SMTP not configured, emails are kept in the outbox");
            Arc::new(OutboxMailer::new())
        }
    };
    let (browser_tx, _) = broadcast::channel(256);

    let dispatcher = Arc::new(
        NotificationDispatcher::new(directory.clone())
            .with_channel(Arc::new(NotificationCenterChannel::new(center)))
            .with_channel(Arc::new(EmailChannel::new(mailer)))
            .with_channel(Arc::new(BrowserChannel::new(browser_tx.clone())))
            .with_audit(runtime_logger.clone()),
    );
    let uploader = Arc::new(HttpAssetUploader::new(
        &config.upload_url,
        config.upstream_timeout,
    )?);
    let admin = Arc::new(
        CampaignAdmin::new(store.clone(), dispatcher.clone()).with_uploader(uploader),
    );

    let scheduler = Arc::new(
        ExpirationScheduler::new(store.clone(), dispatcher).with_audit(runtime_logger.clone()),
    );
    let scheduler_task = tokio::spawn(scheduler.run(config.tick_interval, shutdown_rx.clone()));

    let state = Arc::new(AppState {
        admin,
        directory,
        browser_tx,
        runtime_logger: Some(runtime_logger.clone()),
    });
    let app = api::router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    runtime_logger
        .log("INFO", &format!("Ad lifecycle service running at http://{}", addr))
        .await;

    let server = tokio::spawn({
        let mut shutdown = shutdown_rx.clone();
        async move {
            serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.wait_for(|stop| *stop).await;
                })
                .await
        }
    });

    signal::ctrl_c().await?;
    runtime_logger.log("INFO", "Shutting down gracefully...").await;
    shutdown_tx.send(true)?;

    scheduler_task.await?;
    // SSE 连接不会自己结束，最多等 5 秒
    match timeout(Duration::from_secs(5), server).await {
        Ok(joined) => joined??,
        Err(_) => warn!("HTTP server did not drain in time"),
    }
    if let Some(mock_server) = mock_server {
        mock_server.await??;
    }

    runtime_logger.log("INFO", "Ad lifecycle service shut down.").await;
    runtime_logger.shutdown().await;
    Ok(())
}
