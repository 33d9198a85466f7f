//! 前置开关解析
//!
//! 按列表顺序递归评估前置开关，为每个实际评估的前置开关生成一条事件。
//! 事件按后序追加：被依赖开关自身的嵌套事件在它的事件之前。

use crate::error::{FlagError, Result};
use crate::evaluator::{Evaluator, FlagResolver};
use crate::context::EvaluationContext;
use crate::events::{EvaluationEvent, EventRecorder};
use crate::models::Flag;
use tracing::debug;

/// 前置开关检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrerequisiteOutcome {
    Passed,
    /// 第一个未满足的前置开关 key
    Failed(String),
}

/// 前置开关解析器
///
/// `stack` 是当前正在评估的开关 key 链，用于检测循环和限制嵌套深度。
pub(crate) struct PrerequisiteResolver<'a, R: FlagResolver + ?Sized> {
    pub evaluator: &'a Evaluator,
    pub resolver: &'a R,
    pub context: &'a EvaluationContext,
}

impl<R: FlagResolver + ?Sized> PrerequisiteResolver<'_, R> {
    pub fn resolve(
        &self,
        flag: &Flag,
        recorder: &mut EventRecorder,
        stack: &mut Vec<String>,
    ) -> Result<PrerequisiteOutcome> {
        for prerequisite in &flag.prerequisites {
            if stack.iter().any(|key| key == &prerequisite.key) {
                let mut path = stack.clone();
                path.push(prerequisite.key.clone());
                return Err(FlagError::PrerequisiteCycle { path });
            }

            let max_depth = self.evaluator.config().max_prerequisite_depth;
            if stack.len() > max_depth {
                return Err(FlagError::PrerequisiteDepthExceeded {
                    key: prerequisite.key.clone(),
                    max_depth,
                });
            }

            let Some(referenced) = self
                .resolver
                .lookup_flag(&prerequisite.key)
                .filter(|f| !f.deleted)
            else {
                debug!(
                    flag_key = %flag.key,
                    prerequisite_key = %prerequisite.key,
                    "前置开关不存在"
                );
                return Ok(PrerequisiteOutcome::Failed(prerequisite.key.clone()));
            };

            let nested = self.evaluator.evaluate_internal(
                &referenced,
                self.context,
                self.resolver,
                recorder,
                stack,
            )?;

            recorder.record(EvaluationEvent::prerequisite(
                &referenced,
                self.context,
                &nested,
                &flag.key,
            ));

            // 关闭状态的前置开关即使返回了要求的变体也不算满足
            let satisfied = referenced.on
                && nested
                    .variation_index
                    .is_some_and(|index| i64::try_from(index) == Ok(prerequisite.variation));

            if !satisfied {
                debug!(
                    flag_key = %flag.key,
                    prerequisite_key = %prerequisite.key,
                    variation = ?nested.variation_index,
                    required = prerequisite.variation,
                    "前置开关未满足"
                );
                return Ok(PrerequisiteOutcome::Failed(prerequisite.key.clone()));
            }
        }

        Ok(PrerequisiteOutcome::Passed)
    }
}
