//! Elapsed-time helpers for log lines

use std::time::{Duration, Instant};

/// Measures elapsed wall time since creation
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time formatted with [`format_duration`]
    pub fn elapsed_display(&self) -> String {
        format_duration(self.elapsed())
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::start()
    }
}

/// `850ms` below one second, `1.25s` from there on
pub fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}
