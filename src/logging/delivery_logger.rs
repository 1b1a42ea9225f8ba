// src/logging/delivery_logger.rs

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration as StdDuration, SystemTime};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task;
use tokio::time::{self, Duration};
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::MakeWriter;
use chrono::Utc;
use serde_json::json;

use crate::logging::serve_log::ServeLog;

struct LogEntry {
    level: String,
    content: String,
}

/// 投放日志管理器（DeliveryLogger）
/// 按日志级别分流到不同的小时滚动文件，后台批量落盘。
/// 广告位裁决日志（ServeLog）走 INFO 通道，以结构化 JSON 落盘。
/// 滚动文件保留 72 小时，后台任务每小时清理一次过期文件。
pub struct DeliveryLogger {
    sender: Sender<LogEntry>,
}

const RETENTION_HOURS: u64 = 72;

impl DeliveryLogger {
    /// - `log_dir`: 日志目录
    /// - `file_prefix`: 文件前缀，例如 "delivery"（文件名形如 delivery_info.json）
    /// - `buffer_size`: mpsc 通道缓冲区大小
    /// - `batch_size`: 每个级别攒够多少条触发落盘
    /// - `flush_interval`: 定时刷盘间隔（毫秒）
    pub fn new(
        log_dir: &str,
        file_prefix: &str,
        buffer_size: usize,
        batch_size: usize,
        flush_interval: u64,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let mut appenders = HashMap::new();
        for level in ["INFO", "WARN", "ERROR"] {
            let file_name = format!("{}_{}.json", file_prefix, level.to_lowercase());
            appenders.insert(level.to_string(), Arc::new(rolling::hourly(log_dir, &file_name)));
        }
        tokio::spawn(Self::background_writer(appenders, receiver, batch_size, flush_interval));
        // 后台任务定期清理过期的滚动日志文件
        {
            let log_dir = log_dir.to_string();
            tokio::spawn(async move {
                let retention = StdDuration::from_secs(RETENTION_HOURS * 3600);
                loop {
                    Self::cleanup_old_logs(&log_dir, retention).await;
                    time::sleep(Duration::from_secs(3600)).await;
                }
            });
        }
        Arc::new(Self { sender })
    }

    /// 删除 `log_dir` 下修改时间早于保留窗口的文件
    async fn cleanup_old_logs(log_dir: &str, retention: StdDuration) {
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
            if let Ok(metadata) = entry.metadata().await {
                if let Ok(modified) = metadata.modified() {
                    if now.duration_since(modified).unwrap_or_default() > retention {
                        if let Err(e) = tokio::fs::remove_file(&path).await {
                            eprintln!("Failed to delete old log file {:?}: {}", path, e);
                        }
                    }
                }
            }
        }
    }

    /// 记录一条普通运行日志
    pub async fn log(&self, level: &str, message: &str) {
        let entry = LogEntry {
            level: level.to_string(),
            content: json!({
                "timestamp": Utc::now().to_rfc3339(),
                "level": level,
                "message": message,
            })
            .to_string(),
        };
        if let Err(e) = self.sender.send(entry).await {
            eprintln!("Failed to send delivery log message: {}", e);
        }
    }

    /// 记录一条广告位裁决日志
    pub async fn log_serve(&self, serve: &ServeLog) {
        let content = match serde_json::to_string(serve) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Failed to serialize serve log: {}", e);
                return;
            }
        };
        let entry = LogEntry {
            level: "INFO".to_string(),
            content,
        };
        if let Err(e) = self.sender.send(entry).await {
            eprintln!("Failed to send serve log: {}", e);
        }
    }

    async fn background_writer(
        appenders: HashMap<String, Arc<RollingFileAppender>>,
        mut receiver: Receiver<LogEntry>,
        batch_size: usize,
        flush_interval: u64,
    ) {
        let mut buffers: HashMap<String, Vec<String>> =
            appenders.keys().map(|k| (k.clone(), Vec::new())).collect();
        let mut interval = time::interval(Duration::from_millis(flush_interval));
        loop {
            tokio::select! {
                entry = receiver.recv() => {
                    let Some(entry) = entry else { break };
                    // 未知级别归入 ERROR，避免丢日志
                    let level = if buffers.contains_key(&entry.level) {
                        entry.level.clone()
                    } else {
                        "ERROR".to_string()
                    };
                    let buffer = buffers.entry(level.clone()).or_default();
                    buffer.push(entry.content);
                    if buffer.len() >= batch_size {
                        if let Some(appender) = appenders.get(&level) {
                            Self::flush(appender.clone(), std::mem::take(buffer)).await;
                        }
                    }
                },
                _ = interval.tick() => {
                    for (level, buffer) in buffers.iter_mut() {
                        if !buffer.is_empty() {
                            if let Some(appender) = appenders.get(level) {
                                Self::flush(appender.clone(), std::mem::take(buffer)).await;
                            }
                        }
                    }
                }
            }
        }
        // 通道关闭后把残留日志写完
        for (level, buffer) in buffers {
            if !buffer.is_empty() {
                if let Some(appender) = appenders.get(&level) {
                    Self::flush(appender.clone(), buffer).await;
                }
            }
        }
    }

    async fn flush(appender: Arc<RollingFileAppender>, buffer: Vec<String>) {
        let content = buffer.join("\n") + "\n";
        let result = task::spawn_blocking(move || {
            let mut writer = appender.make_writer();
            writer.write_all(content.as_bytes())
        })
        .await;
        match result {
            Ok(Err(e)) => eprintln!("Failed to write delivery logs: {}", e),
            Err(e) => eprintln!("Delivery log writer task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    /// 停止日志系统，给后台任务留出刷盘时间
    pub async fn shutdown(&self) {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
