//! 评估事件
//!
//! 评估器只生成事件记录，不负责发送。

use crate::context::EvaluationContext;
use crate::models::Flag;
use crate::reason::EvaluationDetail;
use serde::Serialize;
use serde_json::Value;

/// 前置开关评估事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEvent {
    pub kind: &'static str,
    pub key: String,
    pub context: EvaluationContext,
    pub value: Option<Value>,
    pub default: Option<Value>,
    pub variation: Option<usize>,
    pub version: u64,
    pub prereq_of: String,
}

impl EvaluationEvent {
    pub const FEATURE_KIND: &'static str = "feature";

    /// 为一次前置开关评估创建事件
    pub fn prerequisite(
        prerequisite: &Flag,
        context: &EvaluationContext,
        detail: &EvaluationDetail,
        parent_key: &str,
    ) -> Self {
        Self {
            kind: Self::FEATURE_KIND,
            key: prerequisite.key.clone(),
            context: context.clone(),
            value: detail.value.clone(),
            default: None,
            variation: detail.variation_index,
            version: prerequisite.version,
            prereq_of: parent_key.to_string(),
        }
    }
}

/// 事件记录器
///
/// 一次顶层评估内按顺序追加事件，嵌套评估共享同一个记录器。
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Vec<EvaluationEvent>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: EvaluationEvent) {
        self.events.push(event);
    }

    /// 当前位置，配合 [`EventRecorder::rollback`] 丢弃某次评估产生的事件
    pub fn checkpoint(&self) -> usize {
        self.events.len()
    }

    pub fn rollback(&mut self, checkpoint: usize) {
        self.events.truncate(checkpoint);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<EvaluationEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reason::EvaluationReason;
    use serde_json::json;

    fn sample_event(key: &str) -> EvaluationEvent {
        let mut flag = Flag::new(key, vec![json!("d"), json!("e")]);
        flag.version = 2;
        let detail = EvaluationDetail::new(Some(json!("e")), Some(1), EvaluationReason::fallthrough(false));
        EvaluationEvent::prerequisite(&flag, &EvaluationContext::with_key("x"), &detail, "feature0")
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(sample_event("feature1")).unwrap();
        assert_eq!(
            json,
            json!({
                "kind": "feature",
                "key": "feature1",
                "context": {"key": "x"},
                "value": "e",
                "default": null,
                "variation": 1,
                "version": 2,
                "prereqOf": "feature0"
            })
        );
    }

    #[test]
    fn test_recorder_keeps_order() {
        let mut recorder = EventRecorder::new();
        recorder.record(sample_event("a"));
        recorder.record(sample_event("b"));

        let keys: Vec<_> = recorder.into_events().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_rollback() {
        let mut recorder = EventRecorder::new();
        recorder.record(sample_event("a"));
        let checkpoint = recorder.checkpoint();
        recorder.record(sample_event("b"));
        recorder.record(sample_event("c"));

        recorder.rollback(checkpoint);
        assert_eq!(recorder.len(), 1);
    }
}
