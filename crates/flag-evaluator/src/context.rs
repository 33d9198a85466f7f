//! 评估上下文

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 顶层内置属性，其余属性从 `custom` 对象中读取
const BUILT_IN_ATTRIBUTES: &[&str] = &[
    "key",
    "secondary",
    "ip",
    "country",
    "email",
    "firstName",
    "lastName",
    "avatar",
    "name",
    "anonymous",
];

/// 评估上下文 - 被评估的用户或实体
///
/// 底层是一个 JSON 对象，例如：
///
/// ```json
/// {"key": "user-123", "email": "a@example.com", "custom": {"plan": "pro"}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationContext {
    data: Value,
}

impl EvaluationContext {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    /// 仅包含标识 key 的上下文
    pub fn with_key(key: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("key".to_string(), Value::String(key.into()));
        Self {
            data: Value::Object(map),
        }
    }

    /// 从 JSON 对象创建
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let data: Value = serde_json::from_str(json)?;
        Ok(Self { data })
    }

    /// 标识 key
    ///
    /// 没有字符串 key 的上下文按默认属性分桶时桶值恒为 0.0，总是落在百分比分配的第一个条目。
    pub fn key(&self) -> Option<&str> {
        self.data.get("key").and_then(Value::as_str)
    }

    /// 辅助分桶 key
    pub fn secondary(&self) -> Option<&str> {
        self.data.get("secondary").and_then(Value::as_str)
    }

    /// 获取属性值
    ///
    /// 内置属性从顶层读取，其余属性从 `custom` 对象读取。
    pub fn get_attribute(&self, name: &str) -> Option<&Value> {
        if BUILT_IN_ATTRIBUTES.contains(&name) {
            return self.data.get(name).filter(|v| !v.is_null());
        }

        self.data
            .get("custom")
            .and_then(|custom| custom.get(name))
            .filter(|v| !v.is_null())
    }

    /// 获取底层数据
    pub fn data(&self) -> &Value {
        &self.data
    }
}
