//! 评估原因与评估结果

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 评估原因
///
/// 序列化形式为 `{"kind": "RULE_MATCH", "ruleIndex": 0, ...}`。
/// `inExperiment` 只有为 true 时才会出现在序列化结果中。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum EvaluationReason {
    Off,
    Fallthrough {
        #[serde(default, skip_serializing_if = "is_false")]
        in_experiment: bool,
    },
    TargetMatch,
    RuleMatch {
        rule_index: usize,
        #[serde(default)]
        rule_id: String,
        #[serde(default, skip_serializing_if = "is_false")]
        in_experiment: bool,
    },
    PrerequisiteFailed {
        prerequisite_key: String,
    },
    Error {
        error_kind: ErrorKind,
    },
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl EvaluationReason {
    pub fn fallthrough(in_experiment: bool) -> Self {
        Self::Fallthrough { in_experiment }
    }

    pub fn rule_match(rule_index: usize, rule_id: impl Into<String>, in_experiment: bool) -> Self {
        Self::RuleMatch {
            rule_index,
            rule_id: rule_id.into(),
            in_experiment,
        }
    }

    pub fn prerequisite_failed(prerequisite_key: impl Into<String>) -> Self {
        Self::PrerequisiteFailed {
            prerequisite_key: prerequisite_key.into(),
        }
    }

    pub fn error(error_kind: ErrorKind) -> Self {
        Self::Error { error_kind }
    }

    /// 结果是否属于实验流量
    pub fn in_experiment(&self) -> bool {
        match self {
            Self::Fallthrough { in_experiment } | Self::RuleMatch { in_experiment, .. } => {
                *in_experiment
            }
            _ => false,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl fmt::Display for EvaluationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "OFF"),
            Self::Fallthrough { .. } => write!(f, "FALLTHROUGH"),
            Self::TargetMatch => write!(f, "TARGET_MATCH"),
            Self::RuleMatch { rule_index, .. } => write!(f, "RULE_MATCH({})", rule_index),
            Self::PrerequisiteFailed { prerequisite_key } => {
                write!(f, "PREREQUISITE_FAILED({})", prerequisite_key)
            }
            Self::Error { error_kind } => write!(f, "ERROR({})", error_kind),
        }
    }
}

/// 错误原因类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ClientNotReady,
    FlagNotFound,
    MalformedFlag,
    UserNotSpecified,
    WrongType,
    Exception,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClientNotReady => "CLIENT_NOT_READY",
            Self::FlagNotFound => "FLAG_NOT_FOUND",
            Self::MalformedFlag => "MALFORMED_FLAG",
            Self::UserNotSpecified => "USER_NOT_SPECIFIED",
            Self::WrongType => "WRONG_TYPE",
            Self::Exception => "EXCEPTION",
        };
        write!(f, "{}", s)
    }
}

/// 单次评估的对外结果
///
/// `variation_index` 非空时 `value` 一定是对应的变体值；为空时 `value` 也为空。
/// `reason` 以 `Arc` 持有，缓存命中时多次评估共享同一个原因实例。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetail {
    pub value: Option<Value>,
    pub variation_index: Option<usize>,
    pub reason: Arc<EvaluationReason>,
}

impl EvaluationDetail {
    pub fn new(value: Option<Value>, variation_index: Option<usize>, reason: EvaluationReason) -> Self {
        Self::with_shared_reason(value, variation_index, Arc::new(reason))
    }

    pub fn with_shared_reason(
        value: Option<Value>,
        variation_index: Option<usize>,
        reason: Arc<EvaluationReason>,
    ) -> Self {
        Self {
            value,
            variation_index,
            reason,
        }
    }

    /// 错误结果：值和变体索引都为空
    pub fn error(kind: ErrorKind) -> Self {
        Self::new(None, None, EvaluationReason::error(kind))
    }

    pub fn is_error(&self) -> bool {
        self.reason.is_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fallthrough_omits_in_experiment_when_false() {
        let json = serde_json::to_value(EvaluationReason::fallthrough(false)).unwrap();
        assert_eq!(json, json!({"kind": "FALLTHROUGH"}));
    }

    #[test]
    fn test_fallthrough_in_experiment_serialization() {
        let json = serde_json::to_string(&EvaluationReason::fallthrough(true)).unwrap();
        assert!(json.contains(r#""inExperiment":true"#));
    }

    #[test]
    fn test_rule_match_serialization() {
        let json = serde_json::to_value(EvaluationReason::rule_match(2, "rule-abc", false)).unwrap();
        assert_eq!(
            json,
            json!({"kind": "RULE_MATCH", "ruleIndex": 2, "ruleId": "rule-abc"})
        );
    }

    #[test]
    fn test_prerequisite_failed_serialization() {
        let json = serde_json::to_value(EvaluationReason::prerequisite_failed("feature1")).unwrap();
        assert_eq!(
            json,
            json!({"kind": "PREREQUISITE_FAILED", "prerequisiteKey": "feature1"})
        );
    }

    #[test]
    fn test_error_serialization() {
        let json = serde_json::to_value(EvaluationReason::error(ErrorKind::MalformedFlag)).unwrap();
        assert_eq!(json, json!({"kind": "ERROR", "errorKind": "MALFORMED_FLAG"}));
    }

    #[test]
    fn test_reason_deserialization() {
        let reason: EvaluationReason =
            serde_json::from_str(r#"{"kind": "FALLTHROUGH", "inExperiment": true}"#).unwrap();
        assert!(reason.in_experiment());

        let reason: EvaluationReason = serde_json::from_str(r#"{"kind": "OFF"}"#).unwrap();
        assert_eq!(reason, EvaluationReason::Off);
        assert!(!reason.in_experiment());
    }

    #[test]
    fn test_detail_serialization() {
        let detail = EvaluationDetail::new(Some(json!("b")), Some(1), EvaluationReason::Off);
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(
            json,
            json!({"value": "b", "variationIndex": 1, "reason": {"kind": "OFF"}})
        );
    }

    #[test]
    fn test_error_detail_has_no_value() {
        let detail = EvaluationDetail::error(ErrorKind::MalformedFlag);
        assert_eq!(detail.value, None);
        assert_eq!(detail.variation_index, None);
        assert!(detail.is_error());
    }
}
