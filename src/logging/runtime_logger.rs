// src/logging/runtime_logger.rs

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use serde_json::json;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Mutex;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Duration};
use tracing_appender::rolling;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::MakeWriter;

/// 日志文件保留时长（小时）
const RETENTION_HOURS: u64 = 72;

const LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// 单条日志消息
pub struct LogEntry {
    pub level: String,
    pub content: String,
}

/// 运行日志管理器（RuntimeLogger）
/// 将运行时日志按日志级别分流到不同的日志文件中，广告位生命周期审计记录也写在这里。
pub struct RuntimeLogger {
    sender: Mutex<Option<Sender<LogEntry>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    cleaner: JoinHandle<()>,
    offset: FixedOffset,
}

impl RuntimeLogger {
    /// 创建一个新的 RuntimeLogger
    ///
    /// - `log_dir`: 日志文件存放目录
    /// - `file_prefix`: 文件前缀，例如 "runtime"（最终文件名形如 runtime_info.json 等）
    /// - `buffer_size`: mpsc 通道缓冲区大小
    /// - `batch_size`: 每个日志级别批量写入的日志条数
    /// - `flush_interval`: 定时刷新日志的时间间隔（毫秒）
    /// - `offset`: 日志时间戳使用的时区
    pub fn new(
        log_dir: &str,
        file_prefix: &str,
        buffer_size: usize,
        batch_size: usize,
        flush_interval: u64,
        offset: FixedOffset,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let mut log_files = HashMap::new();
        for level in LEVELS {
            let file_name = format!("{}_{}.json", file_prefix, level.to_lowercase());
            let appender = rolling::hourly(log_dir, &file_name);
            log_files.insert(level.to_string(), Arc::new(appender));
        }
        let writer = tokio::spawn(Self::background_log_writer(
            log_files,
            receiver,
            batch_size.max(1),
            flush_interval.max(1),
        ));
        // 后台任务定期清理过期日志文件
        let cleaner = {
            let log_dir = log_dir.to_string();
            tokio::spawn(async move {
                let cleanup_interval = Duration::from_secs(3600);
                loop {
                    Self::cleanup_old_logs(&log_dir, RETENTION_HOURS).await;
                    time::sleep(cleanup_interval).await;
                }
            })
        };
        Arc::new(Self {
            sender: Mutex::new(Some(sender)),
            writer: Mutex::new(Some(writer)),
            cleaner,
            offset,
        })
    }

    /// 记录运行日志，接受两个参数：level 和 message
    pub async fn log(&self, level: &str, message: &str) {
        let timestamp = Utc::now().with_timezone(&self.offset).to_rfc3339();
        let content = json!({
            "timestamp": timestamp,
            "level": level,
            "message": message,
        })
        .to_string();
        self.send(level, content).await;
    }

    /// 记录一条结构化日志，`record` 原样作为 JSON 写入
    pub async fn log_record<T: serde::Serialize>(&self, level: &str, record: &T) {
        match serde_json::to_string(record) {
            Ok(content) => self.send(level, content).await,
            Err(e) => eprintln!("Failed to serialize runtime log record: {}", e),
        }
    }

    async fn send(&self, level: &str, content: String) {
        let entry = LogEntry {
            level: level.to_ascii_uppercase(),
            content,
        };
        let sender = self.sender.lock().await.clone();
        match sender {
            Some(sender) => {
                if let Err(e) = sender.send(entry).await {
                    eprintln!("Failed to send runtime log message: {}", e);
                }
            }
            None => eprintln!("Runtime logger already shut down, dropping entry"),
        }
    }

    /// 后台日志写入任务，通道关闭后刷盘并退出
    async fn background_log_writer(
        log_files: HashMap<String, Arc<RollingFileAppender>>,
        mut receiver: Receiver<LogEntry>,
        batch_size: usize,
        flush_interval: u64,
    ) {
        // 每个日志级别独立的缓冲区
        let mut buffers: HashMap<String, Vec<String>> = HashMap::new();
        let mut interval = time::interval(Duration::from_millis(flush_interval));
        loop {
            tokio::select! {
                entry = receiver.recv() => {
                    let Some(entry) = entry else { break };
                    let level = if log_files.contains_key(&entry.level) { entry.level } else { "INFO".to_string() };
                    let buffer = buffers.entry(level.clone()).or_default();
                    buffer.push(entry.content);
                    if buffer.len() >= batch_size {
                        if let Some(appender) = log_files.get(&level) {
                            Self::write_logs_to_disk(appender.clone(), std::mem::take(buffer)).await;
                        }
                    }
                },
                _ = interval.tick() => {
                    Self::flush_all(&log_files, &mut buffers).await;
                }
            }
        }
        Self::flush_all(&log_files, &mut buffers).await;
    }

    async fn flush_all(
        log_files: &HashMap<String, Arc<RollingFileAppender>>,
        buffers: &mut HashMap<String, Vec<String>>,
    ) {
        for (level, buffer) in buffers.iter_mut() {
            if buffer.is_empty() {
                continue;
            }
            if let Some(appender) = log_files.get(level) {
                Self::write_logs_to_disk(appender.clone(), std::mem::take(buffer)).await;
            }
        }
    }

    async fn write_logs_to_disk(file: Arc<RollingFileAppender>, buffer: Vec<String>) {
        let content = buffer.join("\n") + "\n";
        let result = task::spawn_blocking(move || {
            let mut writer = file.make_writer();
            writer.write_all(content.as_bytes())
        })
        .await;
        match result {
            Ok(Err(e)) => eprintln!("Failed to write runtime logs: {}", e),
            Err(e) => eprintln!("Runtime log writer task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    async fn cleanup_old_logs(log_dir: &str, retention_hours: u64) {
        use std::time::{Duration as StdDuration, SystemTime};
        let retention_duration = StdDuration::from_secs(retention_hours * 3600);
        let now = SystemTime::now();
        let mut dir = match tokio::fs::read_dir(log_dir).await {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Failed to read log directory {}: {}", log_dir, e);
                return;
            }
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            let Ok(metadata) = entry.metadata().await else { continue };
            let Ok(modified) = metadata.modified() else { continue };
            if now.duration_since(modified).unwrap_or_default() > retention_duration {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    eprintln!("Failed to delete old log file {:?}: {}", path, e);
                }
            }
        }
    }

    /// 关闭发送端，等待后台任务把剩余日志写盘
    pub async fn shutdown(&self) {
        self.sender.lock().await.take();
        if let Some(writer) = self.writer.lock().await.take() {
            let _ = writer.await;
        }
        self.cleaner.abort();
    }
}
