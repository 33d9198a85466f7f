//! 评估引擎错误类型
//!
//! 评估过程本身不会返回错误：配置错误以 `ERROR(MALFORMED_FLAG)` 原因的形式体现。
//! 这里的错误只出现在加载、校验和存储操作中。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlagError {
    #[error("开关解析失败: {0}")]
    ParseError(String),

    #[error("开关定义无效: {key} - {message}")]
    InvalidFlag { key: String, message: String },

    #[error("开关未找到: {0}")]
    FlagNotFound(String),

    #[error("前置开关存在循环依赖: {}", path.join(" -> "))]
    PrerequisiteCycle { path: Vec<String> },

    #[error("前置开关嵌套过深: {key} 超过最大深度 {max_depth}")]
    PrerequisiteDepthExceeded { key: String, max_depth: usize },

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl FlagError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFlag {
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlagError>;
