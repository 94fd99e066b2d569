use std::collections::VecDeque;
use std::time::Instant;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Number of instantaneous rates averaged by [`SpeedCalculator`].
pub const SPEED_WINDOW: usize = 5;

/// Smoothed transfer-rate estimator.
///
/// Each [`update`](Self::update) turns the byte delta since the previous call
/// into an instantaneous rate, pushes it into a small FIFO window and returns
/// the window mean. Owned by a single upload; not meant to be shared.
#[derive(Debug, Clone)]
pub struct SpeedCalculator {
    last: Option<(Instant, u64)>,
    window: VecDeque<f64>,
}

impl SpeedCalculator {
    pub fn new() -> Self {
        Self {
            last: None,
            window: VecDeque::with_capacity(SPEED_WINDOW),
        }
    }

    /// Records the running byte total and returns the smoothed rate.
    ///
    /// The first call after construction or [`reset`](Self::reset) only sets
    /// the baseline and returns 0.
    pub fn update(&mut self, bytes_so_far: u64) -> f64 {
        let now = Instant::now();
        let Some((last_at, last_bytes)) = self.last else {
            self.last = Some((now, bytes_so_far));
            return 0.0;
        };

        let elapsed = now.duration_since(last_at).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }

        let rate = bytes_so_far.saturating_sub(last_bytes) as f64 / elapsed;
        if self.window.len() == SPEED_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(rate);
        self.last = Some((now, bytes_so_far));

        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable byte count (`B`, `KB`, `MB`, `GB`, powers of 1024).
pub fn format_size(bytes: u64) -> String {
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < MIB {
        format!("{:.1} KB", b / KIB)
    } else if b < GIB {
        format!("{:.2} MB", b / MIB)
    } else {
        format!("{:.2} GB", b / GIB)
    }
}

/// Human-readable transfer rate.
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec < KIB {
        format!("{bytes_per_sec:.0} B/s")
    } else if bytes_per_sec < MIB {
        format!("{:.1} KB/s", bytes_per_sec / KIB)
    } else {
        format!("{:.2} MB/s", bytes_per_sec / MIB)
    }
}

/// Estimated time to transfer `remaining` bytes at `bytes_per_sec`.
pub fn format_eta(remaining: u64, bytes_per_sec: f64) -> String {
    if bytes_per_sec <= 0.0 {
        return "calculating...".to_string();
    }

    let secs = (remaining as f64 / bytes_per_sec) as u64;
    if secs < 60 {
        format!("~{secs}s")
    } else if secs < 3600 {
        format!("~{}m {}s", secs / 60, secs % 60)
    } else {
        format!("~{}h {}m", secs / 3600, (secs / 60) % 60)
    }
}

/// Whole-percent completion, clamped to 0..=100. A zero total yields 0.
pub fn percentage(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (done as u128 * 100) / total as u128;
    pct.min(100) as u8
}
