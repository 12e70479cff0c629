use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

/// Counters accumulated by the runtime loop.
#[derive(Debug, Default, Clone)]
pub struct RuntimeMetrics {
    events: u64,
    frames: u64,
    skipped_frames: u64,
    patch_bytes: u64,
    resizes: u64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self) {
        self.events = self.events.saturating_add(1);
    }

    pub fn record_frame(&mut self, patch_bytes: usize) {
        self.frames = self.frames.saturating_add(1);
        self.patch_bytes = self.patch_bytes.saturating_add(patch_bytes as u64);
    }

    /// A tick whose rendered frame hashed identical to the previous
    /// one, so no diff or write happened.
    pub fn record_skipped_frame(&mut self) {
        self.skipped_frames = self.skipped_frames.saturating_add(1);
    }

    pub fn record_resize(&mut self) {
        self.resizes = self.resizes.saturating_add(1);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            events: self.events,
            frames: self.frames,
            skipped_frames: self.skipped_frames,
            patch_bytes: self.patch_bytes,
            resizes: self.resizes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub events: u64,
    pub frames: u64,
    pub skipped_frames: u64,
    pub patch_bytes: u64,
    pub resizes: u64,
}

impl MetricSnapshot {
    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("events".to_string(), json!(self.events));
        map.insert("frames".to_string(), json!(self.frames));
        map.insert("skipped_frames".to_string(), json!(self.skipped_frames));
        map.insert("patch_bytes".to_string(), json!(self.patch_bytes));
        map.insert("resizes".to_string(), json!(self.resizes));
        map
    }

    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "runtime_metrics", self.as_fields())
    }
}
