//! 开关评估器
//!
//! 评估流水线：关闭检查 → 前置开关 → 定向名单 → 定向规则 → 默认分配。
//! 任何一步做出决定后立即返回。配置错误以 `ERROR(MALFORMED_FLAG)` 原因返回，
//! 值和变体索引为空，且不产生该次评估的事件。

use crate::config::EvaluatorConfig;
use crate::context::EvaluationContext;
use crate::error::Result;
use crate::events::{EvaluationEvent, EventRecorder};
use crate::matcher::{ClauseMatcher, OperatorMatcher};
use crate::models::{Flag, VariationOrRollout};
use crate::prerequisites::{PrerequisiteOutcome, PrerequisiteResolver};
use crate::reason::{ErrorKind, EvaluationDetail, EvaluationReason};
use crate::rollout::select_variation;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// 开关查询能力，由调用方提供
///
/// 评估过程中会被重入调用。
#[cfg_attr(test, mockall::automock)]
pub trait FlagResolver {
    fn lookup_flag(&self, key: &str) -> Option<Arc<Flag>>;
}

impl FlagResolver for HashMap<String, Arc<Flag>> {
    fn lookup_flag(&self, key: &str) -> Option<Arc<Flag>> {
        self.get(key).cloned()
    }
}

/// 一次顶层评估的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalResult {
    pub detail: EvaluationDetail,
    /// 前置开关评估事件，按后序排列；未评估任何前置开关时为空
    pub events: Vec<EvaluationEvent>,
}

/// 开关评估器
pub struct Evaluator {
    config: EvaluatorConfig,
    matcher: Box<dyn ClauseMatcher>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_config(EvaluatorConfig::default())
    }

    pub fn with_config(config: EvaluatorConfig) -> Self {
        Self {
            config,
            matcher: Box::new(OperatorMatcher),
        }
    }

    /// 替换子句匹配器
    pub fn with_clause_matcher(mut self, matcher: impl ClauseMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// 评估开关
    ///
    /// 前置开关出现循环或嵌套超过上限时，整次评估返回 `MALFORMED_FLAG` 且不带事件。
    #[instrument(level = "debug", skip_all, fields(flag_key = %flag.key))]
    pub fn evaluate<R>(&self, flag: &Flag, context: &EvaluationContext, resolver: &R) -> EvalResult
    where
        R: FlagResolver + ?Sized,
    {
        let mut recorder = EventRecorder::new();
        let mut stack = Vec::new();

        match self.evaluate_internal(flag, context, resolver, &mut recorder, &mut stack) {
            Ok(detail) => EvalResult {
                detail,
                events: recorder.into_events(),
            },
            Err(e) => {
                warn!(flag_key = %flag.key, error = %e, "开关评估中止");
                EvalResult {
                    detail: EvaluationDetail::error(ErrorKind::MalformedFlag),
                    events: Vec::new(),
                }
            }
        }
    }

    /// 递归评估入口，前置开关解析会回调这里
    ///
    /// 只有循环和深度超限以 `Err` 返回；其余配置错误体现在返回的结果中。
    pub(crate) fn evaluate_internal<R>(
        &self,
        flag: &Flag,
        context: &EvaluationContext,
        resolver: &R,
        recorder: &mut EventRecorder,
        stack: &mut Vec<String>,
    ) -> Result<EvaluationDetail>
    where
        R: FlagResolver + ?Sized,
    {
        if !flag.on {
            return Ok(self.off_detail(flag, Arc::new(EvaluationReason::Off)));
        }

        let checkpoint = recorder.checkpoint();

        let prerequisites = PrerequisiteResolver {
            evaluator: self,
            resolver,
            context,
        };
        stack.push(flag.key.clone());
        let outcome = prerequisites.resolve(flag, recorder, stack);
        stack.pop();

        let detail = match outcome? {
            PrerequisiteOutcome::Failed(prerequisite_key) => {
                let reason = flag.reason_cache().prerequisite_failed(&prerequisite_key);
                self.off_detail(flag, reason)
            }
            PrerequisiteOutcome::Passed => self.match_flag(flag, context),
        };

        if detail.is_error() {
            recorder.rollback(checkpoint);
        }

        Ok(detail)
    }

    /// 定向名单 → 定向规则 → 默认分配
    fn match_flag(&self, flag: &Flag, context: &EvaluationContext) -> EvaluationDetail {
        if let Some(key) = context.key() {
            if let Some(target) = flag.targets.iter().find(|t| t.values.contains(key)) {
                debug!(flag_key = %flag.key, "命中定向名单");
                return self.variation_detail(
                    flag,
                    target.variation,
                    Arc::new(EvaluationReason::TargetMatch),
                );
            }
        }

        for (index, rule) in flag.rules.iter().enumerate() {
            if rule
                .clauses
                .iter()
                .all(|clause| self.matcher.matches(clause, context))
            {
                debug!(flag_key = %flag.key, rule_index = index, rule_id = %rule.id, "命中定向规则");
                return self.outcome_detail(flag, &rule.outcome, context, |in_experiment| {
                    EvaluationReason::rule_match(index, rule.id.clone(), in_experiment)
                });
            }
        }

        self.outcome_detail(
            flag,
            &flag.fallthrough,
            context,
            EvaluationReason::fallthrough,
        )
    }

    /// 关闭或前置开关失败时的结果：返回 off 变体，未设置时为空
    fn off_detail(&self, flag: &Flag, reason: Arc<EvaluationReason>) -> EvaluationDetail {
        match flag.off_variation {
            Some(index) => self.variation_detail(flag, index, reason),
            None => EvaluationDetail::with_shared_reason(None, None, reason),
        }
    }

    /// 固定变体或百分比分配的结果
    fn outcome_detail<F>(
        &self,
        flag: &Flag,
        outcome: &VariationOrRollout,
        context: &EvaluationContext,
        make_reason: F,
    ) -> EvaluationDetail
    where
        F: FnOnce(bool) -> EvaluationReason,
    {
        match outcome {
            VariationOrRollout::Variation(index) => {
                self.variation_detail(flag, *index, Arc::new(make_reason(false)))
            }
            VariationOrRollout::Rollout(rollout) => {
                match select_variation(rollout, context, &flag.key, &flag.salt) {
                    Some(selection) => self.variation_detail(
                        flag,
                        selection.variation,
                        Arc::new(make_reason(selection.in_experiment)),
                    ),
                    None => malformed(flag, "百分比分配没有任何变体"),
                }
            }
            VariationOrRollout::Malformed => malformed(flag, "既没有固定变体也没有百分比分配"),
        }
    }

    /// 按索引取变体，越界时返回配置错误
    fn variation_detail(
        &self,
        flag: &Flag,
        index: i64,
        reason: Arc<EvaluationReason>,
    ) -> EvaluationDetail {
        match flag.variation(index) {
            Some((index, value)) => {
                EvaluationDetail::with_shared_reason(Some(value.clone()), Some(index), reason)
            }
            None => malformed(flag, &format!("变体索引 {} 越界", index)),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn malformed(flag: &Flag, message: &str) -> EvaluationDetail {
    warn!(flag_key = %flag.key, "开关配置错误: {}", message);
    EvaluationDetail::error(ErrorKind::MalformedFlag)
}
