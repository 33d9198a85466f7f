//! 原因对象缓存
//!
//! 每个开关持有一份缓存，按前置开关 key 复用 `PREREQUISITE_FAILED` 原因实例。
//! 缓存只影响实例复用，不影响结果的值语义。

use crate::reason::EvaluationReason;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 前置开关失败原因缓存
///
/// 克隆出的缓存与原缓存共享同一份存储。
#[derive(Clone, Default)]
pub struct ReasonCache {
    prerequisite_failed: Arc<RwLock<HashMap<String, Arc<EvaluationReason>>>>,
}

impl ReasonCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或创建原因实例
    ///
    /// 已存在时返回同一个实例；并发首次创建时只有一个实例会被保存，
    /// 之后所有调用都拿到该实例。
    pub fn get_or_create<F>(&self, prerequisite_key: &str, create: F) -> Arc<EvaluationReason>
    where
        F: FnOnce() -> EvaluationReason,
    {
        if let Some(reason) = self.prerequisite_failed.read().get(prerequisite_key) {
            return Arc::clone(reason);
        }

        let mut cache = self.prerequisite_failed.write();
        Arc::clone(
            cache
                .entry(prerequisite_key.to_string())
                .or_insert_with(|| Arc::new(create())),
        )
    }

    /// 前置开关失败原因
    pub fn prerequisite_failed(&self, prerequisite_key: &str) -> Arc<EvaluationReason> {
        self.get_or_create(prerequisite_key, || {
            EvaluationReason::prerequisite_failed(prerequisite_key)
        })
    }

    /// 预热：为给定的前置开关 key 提前创建原因实例
    pub fn warm<'a>(&self, prerequisite_keys: impl IntoIterator<Item = &'a str>) {
        for key in prerequisite_keys {
            self.prerequisite_failed(key);
        }
    }

    pub fn get(&self, prerequisite_key: &str) -> Option<Arc<EvaluationReason>> {
        self.prerequisite_failed.read().get(prerequisite_key).cloned()
    }

    pub fn len(&self) -> usize {
        self.prerequisite_failed.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.prerequisite_failed.read().is_empty()
    }
}

impl fmt::Debug for ReasonCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReasonCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_same_instance() {
        let cache = ReasonCache::new();
        let first = cache.prerequisite_failed("feature1");
        let second = cache.prerequisite_failed("feature1");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, EvaluationReason::prerequisite_failed("feature1"));
    }

    #[test]
    fn test_distinct_keys() {
        let cache = ReasonCache::new();
        let a = cache.prerequisite_failed("a");
        let b = cache.prerequisite_failed("b");

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_create_called_once_when_warm() {
        let cache = ReasonCache::new();
        cache.warm(["feature1"]);

        let mut called = false;
        let reason = cache.get_or_create("feature1", || {
            called = true;
            EvaluationReason::Off
        });

        assert!(!called);
        assert_eq!(*reason, EvaluationReason::prerequisite_failed("feature1"));
    }

    #[test]
    fn test_clone_shares_storage() {
        let cache = ReasonCache::new();
        let clone = cache.clone();
        let reason = clone.prerequisite_failed("x");

        assert!(Arc::ptr_eq(&reason, &cache.get("x").unwrap()));
    }

    #[test]
    fn test_concurrent_population() {
        use std::thread;

        let cache = ReasonCache::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.prerequisite_failed("shared"))
            })
            .collect();

        let reasons: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let stored = cache.get("shared").unwrap();

        for reason in &reasons {
            assert!(Arc::ptr_eq(reason, &stored));
        }
        assert_eq!(cache.len(), 1);
    }
}
