//! Append-only broadcast transcript.
//!
//! Write-only from the orchestration core's perspective; UIs read
//! snapshots. Bounded so a long-running show cannot grow without limit.

use crate::context::BroadcastState;
use chrono::Local;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Hard cap on retained entries; oldest are discarded past this.
pub const TRANSCRIPT_MAX: usize = 2000;

/// One spoken or played item on the air.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub speaker: String,
    pub text: String,
    pub phase: BroadcastState,
    /// Show-clock offset in seconds when the item went on air.
    pub elapsed_secs: f64,
    /// Wall-clock stamp (HH:MM:SS) for operator-facing views.
    pub logged_at: String,
}

impl TranscriptEntry {
    pub fn new(speaker: &str, text: &str, phase: BroadcastState, elapsed_secs: f64) -> Self {
        TranscriptEntry {
            speaker: speaker.to_string(),
            text: text.to_string(),
            phase,
            elapsed_secs,
            logged_at: Local::now().format("%H:%M:%S").to_string(),
        }
    }
}

/// Bounded in-memory transcript. Safe to share across threads.
pub struct TranscriptLog {
    entries: Mutex<VecDeque<TranscriptEntry>>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        TranscriptLog {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, entry: TranscriptEntry) {
        let mut entries = self.entries.lock().unwrap();
        entries.push_back(entry);
        while entries.len() > TRANSCRIPT_MAX {
            entries.pop_front();
        }
    }

    /// Entries from `since_index` onward (index into the retained window).
    pub fn get(&self, since_index: usize) -> Vec<TranscriptEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .skip(since_index)
            .cloned()
            .collect()
    }

    /// Full copy of the retained transcript.
    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl Default for TranscriptLog {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::sources::TranscriptSink for TranscriptLog {
    fn append(&self, entry: TranscriptEntry) {
        self.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> TranscriptEntry {
        TranscriptEntry::new("host", text, BroadcastState::Conversation, 1.0)
    }

    #[test]
    fn push_and_snapshot() {
        let log = TranscriptLog::new();
        assert!(log.is_empty());
        log.push(entry("hello"));
        log.push(entry("world"));
        let all = log.snapshot();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text, "hello");
        assert_eq!(all[1].text, "world");
    }

    #[test]
    fn get_since_index() {
        let log = TranscriptLog::new();
        for i in 0..5 {
            log.push(entry(&format!("line {}", i)));
        }
        let tail = log.get(3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].text, "line 3");
    }

    #[test]
    fn cap_discards_oldest() {
        let log = TranscriptLog::new();
        for i in 0..(TRANSCRIPT_MAX + 10) {
            log.push(entry(&format!("line {}", i)));
        }
        assert_eq!(log.len(), TRANSCRIPT_MAX);
        assert_eq!(log.snapshot()[0].text, "line 10");
    }

    #[test]
    fn entry_carries_phase_and_stamp() {
        let e = entry("on air");
        assert_eq!(e.phase, BroadcastState::Conversation);
        assert_eq!(e.logged_at.len(), 8); // HH:MM:SS
    }

    #[test]
    fn clear_empties_log() {
        let log = TranscriptLog::new();
        log.push(entry("x"));
        log.clear();
        assert!(log.is_empty());
    }
}
