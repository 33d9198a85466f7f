//! 共享库
//!
//! 包含开关评估相关工具共用的配置加载和日志初始化代码。

pub mod config;
pub mod observability;
