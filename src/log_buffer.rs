//! Bounded in-memory log sink for display front ends.

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of lines kept.
pub const DEFAULT_CAPACITY: usize = 50;

/// Keeps the most recent log lines, formatted as `HH:MM:SS: message`.
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone)]
pub struct RollingLog {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
    level: LevelFilter,
}

impl RollingLog {
    pub fn new(capacity: usize, level: LevelFilter) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
            level,
        }
    }

    /// Install a buffer of [`DEFAULT_CAPACITY`] lines as the process logger.
    pub fn install(level: LevelFilter) -> Result<Self, SetLoggerError> {
        let sink = Self::new(DEFAULT_CAPACITY, level);
        log::set_boxed_logger(Box::new(sink.clone()))?;
        log::set_max_level(level);
        Ok(sink)
    }

    /// Buffered lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Buffered lines joined with newlines.
    pub fn text(&self) -> String {
        self.lines().join("\n")
    }

    fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock();
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }
}

impl Log for RollingLog {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.push(format!("{}: {}", Local::now().format("%H:%M:%S"), record.args()));
    }

    fn flush(&self) {}
}
