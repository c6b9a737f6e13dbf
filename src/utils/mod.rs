use std::time::{Duration, Instant};
use tracing::info;

/// Logs how long a pipeline step took when it goes out of scope.
pub struct Timer {
    step: String,
    start: Instant,
}

impl Timer {
    pub fn start(step: impl Into<String>) -> Self {
        let step = step.into();
        info!("=== {} ===", step);
        Self {
            step,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("{} done in {:.2?}", self.step, self.elapsed());
    }
}

/// Round to `decimals` places, ties to even.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Format a count with thousands separators.
pub fn fmt_number(n: usize) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (i, ch) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
