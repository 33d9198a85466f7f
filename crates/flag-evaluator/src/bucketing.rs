//! 分桶哈希
//!
//! 将 `(开关 key, salt, 分桶属性值)` 稳定地映射到 `[0, 1)` 区间。
//! 相同输入永远得到相同的桶值，保证同一实体的分配结果一致。

use crate::context::EvaluationContext;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

/// 15 位十六进制数的最大值
const LONG_SCALE: f64 = 0xFFF_FFFF_FFFF_FFFF_u64 as f64;

/// 默认的分桶属性
pub const DEFAULT_BUCKET_BY: &str = "key";

/// 计算上下文的桶值
///
/// `seed` 存在时替代 `flag_key.salt` 作为哈希前缀。
/// 分桶属性缺失或类型不支持（仅支持字符串和整数）时返回 0.0。
pub fn bucket_context(
    context: &EvaluationContext,
    flag_key: &str,
    salt: &str,
    bucket_by: Option<&str>,
    seed: Option<i64>,
) -> f64 {
    let attribute = bucket_by.unwrap_or(DEFAULT_BUCKET_BY);

    let Some(mut bucket_value) = context.get_attribute(attribute).and_then(bucketable_string) else {
        debug!(flag_key, attribute, "分桶属性缺失或类型不支持，桶值为 0.0");
        return 0.0;
    };

    if let Some(secondary) = context.secondary() {
        bucket_value.push('.');
        bucket_value.push_str(secondary);
    }

    let input = match seed {
        Some(seed) => format!("{}.{}", seed, bucket_value),
        None => format!("{}.{}.{}", flag_key, salt, bucket_value),
    };

    hash_to_unit(&input)
}

/// 将哈希输入映射到 `[0, 1)`
///
/// 取 SHA-256 摘要的前 15 位十六进制数，除以 15 位十六进制数的最大值。
pub fn hash_to_unit(input: &str) -> f64 {
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    // 十六进制编码只包含 [0-9a-f]，前 15 位必然可解析
    let prefix = u64::from_str_radix(&digest[..15], 16).unwrap_or(0);

    let bucket = prefix as f64 / LONG_SCALE;
    // 15 位全为 f 时结果为 1.0，收回到区间内
    if bucket >= 1.0 { 1.0 - f64::EPSILON } else { bucket }
}

/// 可用于分桶的属性值：字符串原样使用，整数转为十进制字符串
fn bucketable_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n
            .as_i64()
            .map(|i| i.to_string())
            .or_else(|| n.as_u64().map(|u| u.to_string())),
        _ => None,
    }
}
