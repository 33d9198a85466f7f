//! 开关加载校验
//!
//! 开关在加载时校验一次，评估时只做变体索引的范围检查。
//! 索引越界、缺少分配方式等问题不在这里拒绝，而是在评估时以 `MALFORMED_FLAG` 原因体现。

use crate::error::{FlagError, Result};
use crate::models::{Flag, FlagRule, Rollout, TOTAL_WEIGHT, VariationOrRollout};
use crate::operators::Operator;
use std::collections::{HashMap, HashSet};

/// 开关校验器
pub struct FlagValidator;

impl FlagValidator {
    /// 校验开关结构，并预热前置开关失败原因缓存
    pub fn prepare(flag: &Flag) -> Result<()> {
        Self::validate(flag)?;
        flag.reason_cache().warm(flag.prerequisite_keys());
        Ok(())
    }

    /// 校验开关结构
    pub fn validate(flag: &Flag) -> Result<()> {
        if flag.key.is_empty() {
            return Err(FlagError::invalid("", "开关 key 不能为空"));
        }

        if flag.deleted {
            return Ok(());
        }

        for (i, prerequisite) in flag.prerequisites.iter().enumerate() {
            if prerequisite.key.is_empty() {
                return Err(FlagError::invalid(
                    &flag.key,
                    format!("prerequisites[{}] 的 key 不能为空", i),
                ));
            }
        }

        for (i, rule) in flag.rules.iter().enumerate() {
            Self::validate_rule(flag, rule, i)?;
        }

        if let VariationOrRollout::Rollout(rollout) = &flag.fallthrough {
            Self::validate_rollout(flag, rollout, "fallthrough")?;
        }

        Ok(())
    }

    fn validate_rule(flag: &Flag, rule: &FlagRule, index: usize) -> Result<()> {
        let path = format!("rules[{}]", index);

        for (i, clause) in rule.clauses.iter().enumerate() {
            if clause.attribute.is_empty() {
                return Err(FlagError::invalid(
                    &flag.key,
                    format!("{}.clauses[{}] 的属性名不能为空", path, i),
                ));
            }

            // 预验证正则表达式
            if clause.op == Operator::Matches {
                for value in &clause.values {
                    if let Some(pattern) = value.as_str() {
                        regex::Regex::new(pattern).map_err(|e| {
                            FlagError::invalid(
                                &flag.key,
                                format!("{}.clauses[{}] 的正则表达式无效: {}", path, i, e),
                            )
                        })?;
                    }
                }
            }
        }

        if let VariationOrRollout::Rollout(rollout) = &rule.outcome {
            Self::validate_rollout(flag, rollout, &path)?;
        }

        Ok(())
    }

    /// 只限制单个权重；权重总和不足或超出 100000 由分配选择时的累计规则处理
    fn validate_rollout(flag: &Flag, rollout: &Rollout, path: &str) -> Result<()> {
        for (i, weighted) in rollout.variations.iter().enumerate() {
            if weighted.weight > TOTAL_WEIGHT {
                return Err(FlagError::invalid(
                    &flag.key,
                    format!(
                        "{}.rollout.variations[{}] 的权重 {} 超过 {}",
                        path, i, weighted.weight, TOTAL_WEIGHT
                    ),
                ));
            }
        }

        Ok(())
    }

    /// 检测前置开关循环依赖
    ///
    /// 返回发现的第一条循环路径，路径首尾为同一个 key。
    pub fn find_prerequisite_cycle(flags: &HashMap<String, &Flag>) -> Option<Vec<String>> {
        let mut done = HashSet::new();
        let mut keys: Vec<&String> = flags.keys().collect();
        keys.sort();

        for key in keys {
            let mut path = Vec::new();
            if let Some(cycle) = Self::visit(key, flags, &mut path, &mut done) {
                return Some(cycle);
            }
        }

        None
    }

    fn visit(
        key: &str,
        flags: &HashMap<String, &Flag>,
        path: &mut Vec<String>,
        done: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        if let Some(start) = path.iter().position(|k| k == key) {
            let mut cycle = path[start..].to_vec();
            cycle.push(key.to_string());
            return Some(cycle);
        }

        if done.contains(key) {
            return None;
        }

        let flag = flags.get(key)?;

        path.push(key.to_string());
        for prerequisite_key in flag.prerequisite_keys() {
            if let Some(cycle) = Self::visit(prerequisite_key, flags, path, done) {
                return Some(cycle);
            }
        }
        path.pop();

        done.insert(key.to_string());
        None
    }
}
