//! 开关领域模型

use crate::operators::Operator;
use crate::reason_cache::ReasonCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// 百分比权重的总量，权重 100000 表示 100%
pub const TOTAL_WEIGHT: u32 = 100_000;

/// 开关定义
///
/// 加载后不可变；唯一的可变部分是内部的原因缓存。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub key: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub on: bool,
    #[serde(default)]
    pub off_variation: Option<i64>,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub rules: Vec<FlagRule>,
    #[serde(default)]
    pub fallthrough: VariationOrRollout,
    #[serde(default)]
    pub variations: Vec<Value>,
    #[serde(default)]
    pub salt: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(skip)]
    reason_cache: ReasonCache,
}

impl Flag {
    pub fn new(key: impl Into<String>, variations: Vec<Value>) -> Self {
        Self {
            key: key.into(),
            version: 1,
            on: false,
            off_variation: None,
            prerequisites: Vec::new(),
            targets: Vec::new(),
            rules: Vec::new(),
            fallthrough: VariationOrRollout::Malformed,
            variations,
            salt: String::new(),
            deleted: false,
            reason_cache: ReasonCache::new(),
        }
    }

    /// 从 JSON 字符串解析
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// 删除标记（墓碑），只保留 key 和版本号
    pub fn tombstone(key: impl Into<String>, version: u64) -> Self {
        Self {
            version,
            deleted: true,
            ..Self::new(key, Vec::new())
        }
    }

    /// 按索引取变体值，越界（包括负数）返回 None
    pub fn variation(&self, index: i64) -> Option<(usize, &Value)> {
        let index = usize::try_from(index).ok()?;
        self.variations.get(index).map(|value| (index, value))
    }

    pub fn reason_cache(&self) -> &ReasonCache {
        &self.reason_cache
    }

    /// 所有前置开关 key
    pub fn prerequisite_keys(&self) -> impl Iterator<Item = &str> {
        self.prerequisites.iter().map(|p| p.key.as_str())
    }
}

/// 前置开关：要求另一个开关返回指定变体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prerequisite {
    pub key: String,
    pub variation: i64,
}

impl Prerequisite {
    pub fn new(key: impl Into<String>, variation: i64) -> Self {
        Self {
            key: key.into(),
            variation,
        }
    }
}

/// 定向名单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub values: HashSet<String>,
    pub variation: i64,
}

/// 定向规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub clauses: Vec<Clause>,
    #[serde(flatten)]
    pub outcome: VariationOrRollout,
}

/// 规则子句
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub attribute: String,
    pub op: Operator,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub negate: bool,
}

impl Clause {
    pub fn new(attribute: impl Into<String>, op: Operator, values: Vec<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            op,
            values,
            negate: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }
}

/// 固定变体或百分比分配
///
/// 两者都缺失时为 `Malformed`，评估时产生 `MALFORMED_FLAG` 错误。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "VariationOrRolloutRepr", into = "VariationOrRolloutRepr")]
pub enum VariationOrRollout {
    Variation(i64),
    Rollout(Rollout),
    #[default]
    Malformed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VariationOrRolloutRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rollout: Option<Rollout>,
}

impl From<VariationOrRolloutRepr> for VariationOrRollout {
    fn from(repr: VariationOrRolloutRepr) -> Self {
        match (repr.variation, repr.rollout) {
            (Some(variation), _) => Self::Variation(variation),
            (None, Some(rollout)) => Self::Rollout(rollout),
            (None, None) => Self::Malformed,
        }
    }
}

impl From<VariationOrRollout> for VariationOrRolloutRepr {
    fn from(value: VariationOrRollout) -> Self {
        match value {
            VariationOrRollout::Variation(variation) => Self {
                variation: Some(variation),
                rollout: None,
            },
            VariationOrRollout::Rollout(rollout) => Self {
                variation: None,
                rollout: Some(rollout),
            },
            VariationOrRollout::Malformed => Self::default(),
        }
    }
}

/// 分配类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloutKind {
    #[default]
    Rollout,
    Experiment,
}

/// 百分比分配
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollout {
    #[serde(default)]
    pub kind: RolloutKind,
    #[serde(default)]
    pub variations: Vec<WeightedVariation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl Rollout {
    pub fn new(kind: RolloutKind, variations: Vec<WeightedVariation>) -> Self {
        Self {
            kind,
            variations,
            bucket_by: None,
            seed: None,
        }
    }

    pub fn with_bucket_by(mut self, attribute: impl Into<String>) -> Self {
        self.bucket_by = Some(attribute.into());
        self
    }

    pub fn is_experiment(&self) -> bool {
        self.kind == RolloutKind::Experiment
    }
}

/// 带权重的变体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedVariation {
    pub variation: i64,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub untracked: bool,
}

impl WeightedVariation {
    pub fn new(variation: i64, weight: u32) -> Self {
        Self {
            variation,
            weight,
            untracked: false,
        }
    }
}
