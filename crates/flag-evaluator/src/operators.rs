//! 子句操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 子句操作符
///
/// `segmentMatch` 和语义化版本比较可以被反序列化，但默认匹配器不实现它们。
/// 无法识别的操作符反序列化为 `Unknown`，永远不匹配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    // 相等
    In,

    // 字符串操作
    StartsWith,
    EndsWith,
    Contains,
    Matches,

    // 数值比较
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // 时间操作
    Before,
    After,

    // 语义化版本
    SemVerEqual,
    SemVerLessThan,
    SemVerGreaterThan,

    // 分群
    SegmentMatch,

    #[serde(other)]
    Unknown,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::In => "in",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Contains => "contains",
            Self::Matches => "matches",
            Self::LessThan => "lessThan",
            Self::LessThanOrEqual => "lessThanOrEqual",
            Self::GreaterThan => "greaterThan",
            Self::GreaterThanOrEqual => "greaterThanOrEqual",
            Self::Before => "before",
            Self::After => "after",
            Self::SemVerEqual => "semVerEqual",
            Self::SemVerLessThan => "semVerLessThan",
            Self::SemVerGreaterThan => "semVerGreaterThan",
            Self::SegmentMatch => "segmentMatch",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_deserialization() {
        let op: Operator = serde_json::from_str(r#""greaterThanOrEqual""#).unwrap();
        assert_eq!(op, Operator::GreaterThanOrEqual);

        let op: Operator = serde_json::from_str(r#""semVerEqual""#).unwrap();
        assert_eq!(op, Operator::SemVerEqual);
    }

    #[test]
    fn test_unknown_operator() {
        let op: Operator = serde_json::from_str(r#""someFutureOperator""#).unwrap();
        assert_eq!(op, Operator::Unknown);
    }

    #[test]
    fn test_display_matches_wire_name() {
        for op in [Operator::In, Operator::EndsWith, Operator::LessThanOrEqual, Operator::After] {
            let wire = serde_json::to_string(&op).unwrap();
            assert_eq!(wire, format!("\"{}\"", op));
        }
    }
}
