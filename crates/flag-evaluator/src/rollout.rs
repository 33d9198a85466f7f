//! 百分比分配选择器

use crate::bucketing::bucket_context;
use crate::context::EvaluationContext;
use crate::models::{Rollout, TOTAL_WEIGHT, WeightedVariation};

/// 分配结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloutSelection {
    pub variation: i64,
    pub in_experiment: bool,
}

/// 为上下文选择变体
///
/// 空变体列表返回 None，由调用方判定为配置错误。
pub fn select_variation(
    rollout: &Rollout,
    context: &EvaluationContext,
    flag_key: &str,
    salt: &str,
) -> Option<RolloutSelection> {
    let bucket = bucket_context(
        context,
        flag_key,
        salt,
        rollout.bucket_by.as_deref(),
        rollout.seed,
    );

    let selected = select_by_bucket(&rollout.variations, bucket)?;

    Some(RolloutSelection {
        variation: selected.variation,
        in_experiment: rollout.is_experiment() && !selected.untracked,
    })
}

/// 按累计权重选择第一个超过桶值的条目
///
/// 浮点累加误差导致桶值落在最后一个累计值之外时，选择最后一个条目。
pub fn select_by_bucket(variations: &[WeightedVariation], bucket: f64) -> Option<&WeightedVariation> {
    let mut sum = 0.0;
    for weighted in variations {
        sum += f64::from(weighted.weight) / f64::from(TOTAL_WEIGHT);
        if bucket < sum {
            return Some(weighted);
        }
    }

    variations.last()
}
