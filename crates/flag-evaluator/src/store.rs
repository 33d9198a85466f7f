//! 内存开关存储
//!
//! 使用 DashMap 提供线程安全的开关存储，支持加载、按版本更新、删除（墓碑）和批量操作，
//! 并作为评估器的 [`FlagResolver`] 使用。

use crate::error::{FlagError, Result};
use crate::evaluator::FlagResolver;
use crate::models::Flag;
use crate::validator::FlagValidator;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 开关存储
#[derive(Clone, Default)]
pub struct FlagStore {
    flags: Arc<DashMap<String, Arc<Flag>>>,
}

/// 批量加载的 JSON 格式：开关数组，或 `{"flags": {"key": {...}}}`
#[derive(Deserialize)]
#[serde(untagged)]
enum FlagBundle {
    List(Vec<Flag>),
    Map { flags: HashMap<String, Flag> },
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取当前可见的开关数量（不含墓碑）
    pub fn len(&self) -> usize {
        self.flags.iter().filter(|f| !f.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 加载开关，直接覆盖同名开关
    #[instrument(skip(self, flag), fields(flag_key = %flag.key, version = flag.version))]
    pub fn load(&self, flag: Flag) -> Result<()> {
        FlagValidator::prepare(&flag)?;

        let key = flag.key.clone();
        self.flags.insert(key.clone(), Arc::new(flag));

        info!("开关已加载: {}", key);
        Ok(())
    }

    /// 加载开关（从 JSON 字符串）
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<String> {
        let flag = Flag::from_json(json)?;
        let key = flag.key.clone();
        self.load(flag)?;
        Ok(key)
    }

    /// 按版本更新：只有版本号更高时才替换已有开关（包括墓碑）
    ///
    /// 版本比较和写入在同一个 entry 锁内完成。返回是否发生了替换。
    #[instrument(skip(self, flag), fields(flag_key = %flag.key, version = flag.version))]
    pub fn upsert(&self, flag: Flag) -> Result<bool> {
        FlagValidator::prepare(&flag)?;

        let key = flag.key.clone();
        let replaced = self.replace_if_newer(flag);
        if replaced {
            info!("开关已更新: {}", key);
        }
        Ok(replaced)
    }

    /// 删除开关，写入墓碑防止旧版本被重新写入
    ///
    /// 开关不存在时同样写入墓碑，先到的删除也能拦住之后到达的旧版本。
    /// 返回是否写入了墓碑。
    #[instrument(skip(self))]
    pub fn delete(&self, key: &str, version: u64) -> bool {
        let deleted = self.replace_if_newer(Flag::tombstone(key, version));
        if deleted {
            info!("开关已删除: {}", key);
        }
        deleted
    }

    fn replace_if_newer(&self, flag: Flag) -> bool {
        match self.flags.entry(flag.key.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get().version;
                if existing >= flag.version {
                    debug!(
                        existing_version = existing,
                        "忽略旧版本: {} (version {})", flag.key, flag.version
                    );
                    return false;
                }
                entry.insert(Arc::new(flag));
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(flag));
                true
            }
        }
    }

    /// 获取开关，墓碑视为不存在
    pub fn get(&self, key: &str) -> Option<Arc<Flag>> {
        self.flags
            .get(key)
            .filter(|f| !f.deleted)
            .map(|f| Arc::clone(f.value()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 获取所有开关 key
    pub fn list_keys(&self) -> Vec<String> {
        self.flags
            .iter()
            .filter(|f| !f.deleted)
            .map(|f| f.key().clone())
            .collect()
    }

    /// 批量加载开关
    ///
    /// 单个开关校验失败不影响其余开关。加载完成后检查前置开关循环依赖，只记录警告。
    #[instrument(skip(self, flags))]
    pub fn load_batch(&self, flags: Vec<Flag>) -> Result<Vec<String>> {
        let mut loaded_keys = Vec::with_capacity(flags.len());
        let mut errors = Vec::new();

        for flag in flags {
            let key = flag.key.clone();
            match self.load(flag) {
                Ok(()) => loaded_keys.push(key),
                Err(e) => errors.push((key, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        if let Err(e) = self.check_prerequisite_cycles() {
            warn!(error = %e, "开关集合存在前置开关循环依赖");
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded_keys.len(), errors.len());
        Ok(loaded_keys)
    }

    /// 批量加载 JSON 格式的开关集合
    pub fn load_bundle_from_json(&self, json: &str) -> Result<Vec<String>> {
        let flags = match serde_json::from_str::<FlagBundle>(json) {
            Ok(FlagBundle::List(flags)) => flags,
            Ok(FlagBundle::Map { flags }) => flags.into_values().collect(),
            Err(e) => {
                return Err(FlagError::ParseError(format!(
                    "需要开关数组或 {{\"flags\": {{...}}}} 对象: {}",
                    e
                )));
            }
        };

        self.load_batch(flags)
    }

    /// 检查当前开关集合中的前置开关循环依赖
    pub fn check_prerequisite_cycles(&self) -> Result<()> {
        let snapshot: Vec<Arc<Flag>> = self
            .flags
            .iter()
            .filter(|f| !f.deleted)
            .map(|f| Arc::clone(f.value()))
            .collect();
        let flags: HashMap<String, &Flag> = snapshot
            .iter()
            .map(|f| (f.key.clone(), f.as_ref()))
            .collect();

        match FlagValidator::find_prerequisite_cycle(&flags) {
            Some(path) => Err(FlagError::PrerequisiteCycle { path }),
            None => Ok(()),
        }
    }

    /// 清空所有开关
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.flags.len();
        self.flags.clear();
        info!("已清空 {} 个开关", count);
    }
}

impl FlagResolver for FlagStore {
    fn lookup_flag(&self, key: &str) -> Option<Arc<Flag>> {
        self.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_flag(key: &str, version: u64) -> Flag {
        serde_json::from_value(json!({
            "key": key,
            "version": version,
            "on": true,
            "fallthrough": {"variation": 0},
            "variations": [true, false]
        }))
        .unwrap()
    }

    #[test]
    fn test_load_flag() {
        let store = FlagStore::new();
        store.load(sample_flag("flag-001", 1)).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.contains("flag-001"));
    }

    #[test]
    fn test_load_from_json() {
        let store = FlagStore::new();
        let key = store
            .load_from_json(r#"{"key": "flag-001", "on": true, "variations": [1, 2]}"#)
            .unwrap();

        assert_eq!(key, "flag-001");
        assert!(store.contains("flag-001"));
    }

    #[test]
    fn test_load_invalid_json() {
        let store = FlagStore::new();
        let result = store.load_from_json(r#"{"on": true}"#);
        assert!(matches!(result, Err(FlagError::JsonError(_))));
    }

    #[test]
    fn test_load_warms_reason_cache() {
        let store = FlagStore::new();
        store
            .load_from_json(
                r#"{"key": "f", "prerequisites": [{"key": "p", "variation": 0}], "variations": [1]}"#,
            )
            .unwrap();

        let flag = store.get("f").unwrap();
        assert!(flag.reason_cache().get("p").is_some());
    }

    #[test]
    fn test_get_nonexistent_flag() {
        let store = FlagStore::new();
        assert!(store.get("nonexistent").is_none());
        assert!(store.lookup_flag("nonexistent").is_none());
    }

    #[test]
    fn test_upsert_only_newer_versions() {
        let store = FlagStore::new();
        assert!(store.upsert(sample_flag("f", 2)).unwrap());
        assert!(!store.upsert(sample_flag("f", 1)).unwrap());
        assert!(!store.upsert(sample_flag("f", 2)).unwrap());
        assert!(store.upsert(sample_flag("f", 3)).unwrap());

        assert_eq!(store.get("f").unwrap().version, 3);
    }

    #[test]
    fn test_delete_leaves_tombstone() {
        let store = FlagStore::new();
        store.load(sample_flag("f", 1)).unwrap();

        assert!(store.delete("f", 2));
        assert!(!store.contains("f"));
        assert_eq!(store.len(), 0);

        // 旧版本不能复活已删除的开关
        assert!(!store.upsert(sample_flag("f", 2)).unwrap());
        assert!(store.upsert(sample_flag("f", 3)).unwrap());
        assert!(store.contains("f"));
    }

    #[test]
    fn test_delete_with_old_version_is_ignored() {
        let store = FlagStore::new();
        store.load(sample_flag("f", 5)).unwrap();

        assert!(!store.delete("f", 4));
        assert!(store.contains("f"));
    }

    #[test]
    fn test_delete_before_put_blocks_older_versions() {
        let store = FlagStore::new();

        assert!(store.delete("f", 5));
        assert!(!store.contains("f"));

        assert!(!store.upsert(sample_flag("f", 3)).unwrap());
        assert!(store.lookup_flag("f").is_none());

        assert!(store.upsert(sample_flag("f", 6)).unwrap());
        assert_eq!(store.get("f").unwrap().version, 6);
    }

    #[test]
    fn test_newer_delete_advances_tombstone() {
        let store = FlagStore::new();
        store.load(sample_flag("f", 1)).unwrap();

        assert!(store.delete("f", 2));
        assert!(store.delete("f", 4));
        assert!(!store.delete("f", 3));

        assert!(!store.upsert(sample_flag("f", 3)).unwrap());
        assert!(!store.contains("f"));
    }

    #[test]
    fn test_list_keys() {
        let store = FlagStore::new();
        store.load(sample_flag("flag-001", 1)).unwrap();
        store.load(sample_flag("flag-002", 1)).unwrap();

        let keys = store.list_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"flag-001".to_string()));
        assert!(keys.contains(&"flag-002".to_string()));
    }

    #[test]
    fn test_load_batch_skips_invalid() {
        let store = FlagStore::new();
        let flags = vec![
            sample_flag("flag-001", 1),
            sample_flag("", 1),
            sample_flag("flag-003", 1),
        ];

        let loaded = store.load_batch(flags).unwrap();

        assert_eq!(loaded, vec!["flag-001", "flag-003"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_load_bundle_formats() {
        let store = FlagStore::new();
        let loaded = store
            .load_bundle_from_json(r#"[{"key": "a", "variations": [1]}]"#)
            .unwrap();
        assert_eq!(loaded, vec!["a"]);

        let loaded = store
            .load_bundle_from_json(r#"{"flags": {"b": {"key": "b", "variations": [1]}}}"#)
            .unwrap();
        assert_eq!(loaded, vec!["b"]);

        assert!(matches!(
            store.load_bundle_from_json(r#""not flags""#),
            Err(FlagError::ParseError(_))
        ));
    }

    #[test]
    fn test_check_prerequisite_cycles() {
        let store = FlagStore::new();
        store
            .load_from_json(r#"{"key": "a", "prerequisites": [{"key": "b", "variation": 0}]}"#)
            .unwrap();
        assert!(store.check_prerequisite_cycles().is_ok());

        store
            .load_from_json(r#"{"key": "b", "prerequisites": [{"key": "a", "variation": 0}]}"#)
            .unwrap();
        assert!(matches!(
            store.check_prerequisite_cycles(),
            Err(FlagError::PrerequisiteCycle { .. })
        ));
    }

    #[test]
    fn test_clear() {
        let store = FlagStore::new();
        store.load(sample_flag("flag-001", 1)).unwrap();
        store.load(sample_flag("flag-002", 1)).unwrap();

        store.clear();

        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let store = FlagStore::new();
        let store_clone = store.clone();

        let handle = thread::spawn(move || {
            for i in 0..100 {
                store_clone.load(sample_flag(&format!("flag-{}", i), 1)).unwrap();
            }
        });

        for i in 100..200 {
            store.load(sample_flag(&format!("flag-{}", i), 1)).unwrap();
        }

        handle.join().unwrap();

        assert_eq!(store.len(), 200);
    }

    #[test]
    fn test_concurrent_upsert_keeps_newest_version() {
        use std::sync::Barrier;
        use std::thread;

        for _ in 0..200 {
            let store = FlagStore::new();
            store.load(sample_flag("f", 1)).unwrap();
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = [3, 2]
                .into_iter()
                .map(|version| {
                    let store = store.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        store.upsert(sample_flag("f", version)).unwrap()
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(store.get("f").unwrap().version, 3);
        }
    }
}
