// src/config/config_manager.rs

/// 引擎运行配置（来自 CLI 参数）
#[derive(Clone, Debug)]
pub struct ConfigManager {
    /// 广告管理服务基地址
    pub upstream_url: String,
    /// 本地缓存文件路径
    pub cache_path: String,
    /// 日志目录
    pub log_dir: String,
    /// 统计时间序列的尾部窗口天数
    pub analytics_window_days: usize,
}

impl ConfigManager {
    pub fn new(
        upstream_url: &str,
        cache_path: &str,
        log_dir: &str,
        analytics_window_days: usize,
    ) -> Self {
        ConfigManager {
            upstream_url: upstream_url.to_string(),
            cache_path: cache_path.to_string(),
            log_dir: log_dir.to_string(),
            analytics_window_days,
        }
    }
}
