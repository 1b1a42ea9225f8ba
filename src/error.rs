// src/error.rs

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// 引擎错误类型
/// 仅 refresh / update / delete 的上游网络调用会返回错误，
/// 纯查询函数（状态解析、定向匹配、排序、统计）永远不会报错。
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("upstream response decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("ad not found: {0}")]
    AdNotFound(String),
}
