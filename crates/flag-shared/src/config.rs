//! 配置管理模块
//!
//! 支持配置文件分层加载和环境变量覆盖。

use crate::observability::ObservabilityConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 默认的前置开关最大嵌套深度
pub const DEFAULT_MAX_PREREQUISITE_DEPTH: usize = 100;

/// 评估器配置，对应应用配置的 `evaluation` 段
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorConfig {
    /// 前置开关链的最大深度，超过后整次评估返回 `MALFORMED_FLAG`
    #[serde(default = "default_max_prerequisite_depth")]
    pub max_prerequisite_depth: usize,
}

fn default_max_prerequisite_depth() -> usize {
    DEFAULT_MAX_PREREQUISITE_DEPTH
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_prerequisite_depth: default_max_prerequisite_depth(),
        }
    }
}

impl EvaluatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_prerequisite_depth(mut self, depth: usize) -> Self {
        self.max_prerequisite_depth = depth.max(1);
        self
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub evaluation: EvaluatorConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. 环境变量（FLAGS_ 前缀，层级用双下划线分隔，
    ///    如 FLAGS_EVALUATION__MAX_PREREQUISITE_DEPTH -> evaluation.max_prerequisite_depth）
    ///
    /// 环境名取自 FLAGS_ENV，配置目录取自 CONFIG_DIR。
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("FLAGS_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(Path::new(&config_dir), &env, service_name)
    }

    /// 从指定目录加载配置
    pub fn load_from(config_dir: &Path, env: &str, service_name: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                Environment::with_prefix("FLAGS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
