//! Per-agent bounded-window context buffer.
//!
//! Every formatted event delivered to an agent, and every output the agent
//! produces, lands here with a timestamp. Entries older than the retention
//! window are purged on every mutation. The scheduler reads (never clears)
//! this buffer when assembling decision context.

use contracts::{AgentQueueSnapshot, QueueLine};
use serde_json::Value;

/// Default retention window.
pub const QUEUE_WINDOW_MS: u64 = 90_000;

#[derive(Debug, Clone)]
pub struct AgentEventQueue {
    window_ms: u64,
    entries: Vec<QueueLine>,
    self_outputs: Vec<QueueLine>,
}

impl Default for AgentEventQueue {
    fn default() -> Self {
        Self::new(QUEUE_WINDOW_MS)
    }
}

impl AgentEventQueue {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms: window_ms.max(1),
            entries: Vec::new(),
            self_outputs: Vec::new(),
        }
    }

    /// Append a formatted event line, then purge both lists.
    pub fn push_event(&mut self, now_ms: u64, text: impl Into<String>) {
        self.entries.push(QueueLine {
            at_ms: now_ms,
            text: text.into(),
        });
        self.purge(now_ms);
    }

    /// Append one of the agent's own outputs, then purge both lists.
    pub fn push_self_output(&mut self, now_ms: u64, text: impl Into<String>) {
        self.self_outputs.push(QueueLine {
            at_ms: now_ms,
            text: text.into(),
        });
        self.purge(now_ms);
    }

    /// Drop entries older than the window from both lists.
    pub fn purge(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        self.entries.retain(|line| line.at_ms >= cutoff);
        self.self_outputs.retain(|line| line.at_ms >= cutoff);
    }

    pub fn recent_events(&self) -> Vec<String> {
        self.entries.iter().map(|line| line.text.clone()).collect()
    }

    pub fn recent_outputs(&self) -> Vec<String> {
        self.self_outputs
            .iter()
            .map(|line| line.text.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // --- persistence codec ---

    pub fn snapshot(&self) -> AgentQueueSnapshot {
        AgentQueueSnapshot {
            entries: self.entries.clone(),
            self_outputs: self.self_outputs.clone(),
        }
    }

    /// Restore from a persisted snapshot, dropping anything outside the
    /// window as of `now_ms`.
    pub fn restore(window_ms: u64, snapshot: AgentQueueSnapshot, now_ms: u64) -> Self {
        let mut queue = Self::new(window_ms);
        queue.entries = snapshot.entries;
        queue.self_outputs = snapshot.self_outputs;
        queue.purge(now_ms);
        queue
    }
}

/// Decode a persisted queue blob, filtering out malformed entries rather
/// than failing. A blob that is not an object at all decodes as an empty
/// snapshot: a corrupt agent memory degrades behavior, it does not crash
/// the process.
pub fn decode_snapshot(blob: &Value) -> AgentQueueSnapshot {
    fn decode_lines(value: Option<&Value>) -> Vec<QueueLine> {
        value
            .and_then(Value::as_array)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|line| serde_json::from_value::<QueueLine>(line.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    AgentQueueSnapshot {
        entries: decode_lines(blob.get("entries")),
        self_outputs: decode_lines(blob.get("self_outputs")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_within_window_are_kept() {
        let mut queue = AgentEventQueue::new(90_000);
        queue.push_event(1_000, "Alice says, \"hello\"");
        queue.push_event(50_000, "Alice leaves east.");
        assert_eq!(queue.recent_events().len(), 2);
    }

    #[test]
    fn old_entries_are_purged_on_mutation() {
        let mut queue = AgentEventQueue::new(90_000);
        queue.push_event(1_000, "ancient line");
        queue.push_event(95_000, "fresh line");
        assert_eq!(queue.recent_events(), vec!["fresh line".to_string()]);
    }

    #[test]
    fn self_outputs_share_the_window() {
        let mut queue = AgentEventQueue::new(90_000);
        queue.push_self_output(1_000, "say greetings");
        queue.push_event(100_000, "Bob arrives.");
        assert!(queue.recent_outputs().is_empty());
        assert_eq!(queue.recent_events().len(), 1);
    }

    #[test]
    fn reading_does_not_clear() {
        let mut queue = AgentEventQueue::new(90_000);
        queue.push_event(1_000, "line");
        let _ = queue.recent_events();
        let _ = queue.recent_events();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn snapshot_restore_round_trips_windowed_entries() {
        let mut queue = AgentEventQueue::new(90_000);
        queue.push_event(10_000, "first");
        queue.push_event(20_000, "second");
        queue.push_self_output(20_000, "say hi");

        let snapshot = queue.snapshot();
        let restored = AgentEventQueue::restore(90_000, snapshot, 25_000);
        assert_eq!(restored.recent_events(), vec!["first", "second"]);
        assert_eq!(restored.recent_outputs(), vec!["say hi"]);
    }

    #[test]
    fn restore_drops_entries_outside_window() {
        let snapshot = AgentQueueSnapshot {
            entries: vec![
                QueueLine {
                    at_ms: 1_000,
                    text: "stale".to_string(),
                },
                QueueLine {
                    at_ms: 120_000,
                    text: "fresh".to_string(),
                },
            ],
            self_outputs: Vec::new(),
        };
        let restored = AgentEventQueue::restore(90_000, snapshot, 150_000);
        assert_eq!(restored.recent_events(), vec!["fresh"]);
    }

    #[test]
    fn decode_filters_malformed_entries() {
        let blob = json!({
            "entries": [
                { "at_ms": 5, "text": "valid" },
                { "at_ms": "not a number", "text": "bad timestamp" },
                "not an object",
                { "text": "missing timestamp" },
                { "at_ms": 7, "text": "also valid" },
            ],
            "self_outputs": [ 42 ],
        });
        let snapshot = decode_snapshot(&blob);
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.entries[0].text, "valid");
        assert_eq!(snapshot.entries[1].text, "also valid");
        assert!(snapshot.self_outputs.is_empty());
    }

    #[test]
    fn decode_tolerates_garbage_blob() {
        assert_eq!(decode_snapshot(&json!("garbage")), AgentQueueSnapshot::default());
        assert_eq!(decode_snapshot(&json!(null)), AgentQueueSnapshot::default());
        assert_eq!(decode_snapshot(&json!([1, 2, 3])), AgentQueueSnapshot::default());
    }
}
