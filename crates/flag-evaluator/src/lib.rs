//! 功能开关评估引擎
//!
//! 提供功能开关的本地评估能力，支持：
//! - JSON 开关定义解析和加载校验
//! - 前置开关递归评估，带循环和深度保护
//! - 定向名单、定向规则和按比例分配
//! - 前置开关评估事件收集
//! - 线程安全的开关存储

pub mod bucketing;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod matcher;
pub mod models;
pub mod operators;
pub mod prerequisites;
pub mod reason;
pub mod reason_cache;
pub mod rollout;
pub mod store;
pub mod validator;

pub use config::EvaluatorConfig;
pub use context::EvaluationContext;
pub use error::{FlagError, Result};
pub use evaluator::{EvalResult, Evaluator, FlagResolver};
pub use events::{EvaluationEvent, EventRecorder};
pub use matcher::{ClauseMatcher, OperatorMatcher};
pub use models::{
    Clause, Flag, FlagRule, Prerequisite, Rollout, RolloutKind, Target, VariationOrRollout,
    WeightedVariation,
};
pub use operators::Operator;
pub use reason::{ErrorKind, EvaluationDetail, EvaluationReason};
pub use reason_cache::ReasonCache;
pub use store::FlagStore;
pub use validator::FlagValidator;
