//! Playback statistics for one loaded clip

use std::time::{Duration, Instant};

/// Frames handed to the renderer, checked against the mailbox's drop count
pub struct VideoStats {
    pub(super) frames_presented: u64,
    /// From the negotiated caps, once prerolled
    pub(super) detected_fps: Option<f64>,
    last_stats_log: Instant,
}

impl VideoStats {
    pub fn new() -> Self {
        Self {
            frames_presented: 0,
            detected_fps: None,
            last_stats_log: Instant::now(),
        }
    }

    pub fn increment_presented(&mut self) {
        self.frames_presented += 1;
    }

    /// Share of decoded frames that never reached the renderer, in percent
    pub fn drop_rate(&self, dropped: u64) -> f64 {
        let total = self.frames_presented + dropped;
        if total == 0 {
            0.0
        } else {
            (dropped as f64 / total as f64) * 100.0
        }
    }

    pub fn maybe_log_stats(&mut self, label: &str, dropped: u64, interval: Duration) {
        if self.last_stats_log.elapsed() < interval {
            return;
        }

        self.log_stats(label, dropped);
        self.last_stats_log = Instant::now();
    }

    pub fn log_stats(&self, label: &str, dropped: u64) {
        log::info!(
            "{} stats ({:.2} fps): {} presented, {} dropped ({:.1}% drop rate)",
            label,
            self.detected_fps.unwrap_or(0.0),
            self.frames_presented,
            dropped,
            self.drop_rate(dropped)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_rate() {
        let mut stats = VideoStats::new();
        assert_eq!(stats.drop_rate(0), 0.0);

        for _ in 0..3 {
            stats.increment_presented();
        }
        assert_eq!(stats.drop_rate(1), 25.0);
    }
}
