//! Stage timing.

use std::time::{Duration, Instant};

use tracing::info;

/// Measures one pipeline stage and reports it on completion.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// Print and log the elapsed time, returning it.
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        info!(stage = %self.name, secs = elapsed.as_secs_f64(), "stage finished");
        println!("  [{}] {}", format_elapsed(elapsed), self.name);
        elapsed
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 3600.0 {
        format!("{:.1}h", secs / 3600.0)
    } else if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}s", secs)
    }
}
