//! 评估器配置
//!
//! 配置结构定义在共享库中，应用配置的 `evaluation` 段直接反序列化为 [`EvaluatorConfig`]。

pub use flag_shared::config::{DEFAULT_MAX_PREREQUISITE_DEPTH, EvaluatorConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EvaluatorConfig::default();
        assert_eq!(config.max_prerequisite_depth, DEFAULT_MAX_PREREQUISITE_DEPTH);
    }
}
