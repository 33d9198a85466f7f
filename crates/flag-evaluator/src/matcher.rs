//! 子句匹配器
//!
//! 规则子句的匹配语义通过 [`ClauseMatcher`] 注入评估器，默认实现为 [`OperatorMatcher`]。

use crate::context::EvaluationContext;
use crate::models::Clause;
use crate::operators::Operator;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

/// 子句匹配能力
pub trait ClauseMatcher: Send + Sync {
    fn matches(&self, clause: &Clause, context: &EvaluationContext) -> bool;
}

/// 基于操作符的默认子句匹配器
///
/// - 属性缺失时不匹配（`negate` 不生效）
/// - 属性为数组时，任意元素匹配即视为匹配
/// - 否则属性值与任意一个子句值匹配即视为匹配
#[derive(Debug, Clone, Copy, Default)]
pub struct OperatorMatcher;

impl ClauseMatcher for OperatorMatcher {
    fn matches(&self, clause: &Clause, context: &EvaluationContext) -> bool {
        let Some(attribute_value) = context.get_attribute(&clause.attribute) else {
            return false;
        };

        let matched = match attribute_value {
            Value::Array(items) => items
                .iter()
                .filter(|item| !item.is_array() && !item.is_object())
                .any(|item| Self::match_any(item, clause)),
            Value::Object(_) => false,
            scalar => Self::match_any(scalar, clause),
        };

        matched != clause.negate
    }
}

impl OperatorMatcher {
    pub fn new() -> Self {
        Self
    }

    fn match_any(attribute_value: &Value, clause: &Clause) -> bool {
        clause
            .values
            .iter()
            .any(|expected| Self::evaluate(attribute_value, clause.op, expected))
    }

    /// 评估单个操作符
    pub fn evaluate(field: &Value, operator: Operator, expected: &Value) -> bool {
        match operator {
            Operator::In => Self::eq(field, expected),
            Operator::StartsWith => Self::string_op(field, expected, |s, p| s.starts_with(p)),
            Operator::EndsWith => Self::string_op(field, expected, |s, p| s.ends_with(p)),
            Operator::Contains => Self::string_op(field, expected, |s, p| s.contains(p)),
            Operator::Matches => Self::regex_match(field, expected),
            Operator::LessThan => Self::compare(field, expected, |a, b| a < b),
            Operator::LessThanOrEqual => Self::compare(field, expected, |a, b| a <= b),
            Operator::GreaterThan => Self::compare(field, expected, |a, b| a > b),
            Operator::GreaterThanOrEqual => Self::compare(field, expected, |a, b| a >= b),
            Operator::Before => Self::time_compare(field, expected, |a, b| a < b),
            Operator::After => Self::time_compare(field, expected, |a, b| a > b),
            Operator::SemVerEqual
            | Operator::SemVerLessThan
            | Operator::SemVerGreaterThan
            | Operator::SegmentMatch
            | Operator::Unknown => false,
        }
    }

    /// 相等比较，数值统一按浮点比较（100 == 100.0）
    fn eq(field: &Value, expected: &Value) -> bool {
        if let (Some(a), Some(b)) = (field.as_f64(), expected.as_f64()) {
            return a == b;
        }
        field == expected
    }

    /// 字符串操作，两侧都必须是字符串
    fn string_op<F>(field: &Value, expected: &Value, op: F) -> bool
    where
        F: Fn(&str, &str) -> bool,
    {
        match (field.as_str(), expected.as_str()) {
            (Some(s), Some(p)) => op(s, p),
            _ => false,
        }
    }

    /// 数值比较，两侧都必须是数字
    fn compare<F>(field: &Value, expected: &Value, cmp: F) -> bool
    where
        F: Fn(f64, f64) -> bool,
    {
        match (field.as_f64(), expected.as_f64()) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    }

    /// 正则表达式匹配，无效的正则视为不匹配
    fn regex_match(field: &Value, expected: &Value) -> bool {
        let (Some(s), Some(pattern)) = (field.as_str(), expected.as_str()) else {
            return false;
        };

        Regex::new(pattern).map(|re| re.is_match(s)).unwrap_or(false)
    }

    /// 时间比较
    fn time_compare<F>(field: &Value, expected: &Value, cmp: F) -> bool
    where
        F: Fn(DateTime<Utc>, DateTime<Utc>) -> bool,
    {
        match (Self::parse_datetime(field), Self::parse_datetime(expected)) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    }

    /// 解析时间：数字为 Unix 毫秒时间戳，字符串为 RFC 3339
    fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::Number(n) => {
                let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
                DateTime::from_timestamp_millis(millis)
            }
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }
}
