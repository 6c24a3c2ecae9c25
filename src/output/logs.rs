use std::collections::VecDeque;

use parking_lot::RwLock;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const LOG_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub at: String,
    pub level: ActivityLevel,
    pub message: String,
}

/// Bounded, human-readable record of what the responders served. Purely
/// diagnostic: nothing reads it back to make a decision.
pub struct ActivityLog {
    buffer: RwLock<VecDeque<ActivityEntry>>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            buffer: RwLock::new(VecDeque::with_capacity(LOG_CAPACITY)),
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(ActivityLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(ActivityLevel::Warn, message.into());
    }

    fn push(&self, level: ActivityLevel, message: String) {
        let at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let mut buffer = self.buffer.write();
        if buffer.len() >= LOG_CAPACITY {
            buffer.pop_front();
        }
        buffer.push_back(ActivityEntry { at, level, message });
    }

    pub fn snapshot(&self) -> Vec<ActivityEntry> {
        self.buffer.read().iter().cloned().collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.buffer
            .read()
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
