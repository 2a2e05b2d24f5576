//! Frame timing utilities

use std::time::{Duration, Instant};

/// Tracks per-frame timing and accumulates statistics for periodic logging
pub struct FrameTimer {
    last_frame: Instant,
    accumulated: Duration,
    frames: u32,
    report_interval: Duration,
}

impl FrameTimer {
    /// Create a timer that reports averaged statistics every `report_interval`
    pub fn new(report_interval: Duration) -> Self {
        Self {
            last_frame: Instant::now(),
            accumulated: Duration::ZERO,
            frames: 0,
            report_interval,
        }
    }

    /// Mark the end of a frame; returns averaged stats when a reporting
    /// interval has elapsed
    pub fn tick(&mut self) -> Option<FrameStats> {
        let now = Instant::now();
        self.accumulated += now - self.last_frame;
        self.last_frame = now;
        self.frames += 1;

        if self.accumulated >= self.report_interval && self.frames > 0 {
            let stats = FrameStats {
                frames: self.frames,
                average_frame_time: self.accumulated / self.frames,
            };
            self.accumulated = Duration::ZERO;
            self.frames = 0;
            Some(stats)
        } else {
            None
        }
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// Averaged frame statistics over a reporting interval
#[derive(Debug, Clone, Copy)]
pub struct FrameStats {
    /// Number of frames in the interval
    pub frames: u32,
    /// Mean CPU frame time
    pub average_frame_time: Duration,
}

impl FrameStats {
    /// Frames per second over the interval
    pub fn fps(&self) -> f64 {
        if self.average_frame_time.is_zero() {
            0.0
        } else {
            1.0 / self.average_frame_time.as_secs_f64()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_reports_after_interval() {
        let mut timer = FrameTimer::new(Duration::ZERO);
        // Zero interval: every tick reports.
        let stats = timer.tick().expect("expected stats");
        assert_eq!(stats.frames, 1);
    }

    #[test]
    fn test_timer_accumulates_below_interval() {
        let mut timer = FrameTimer::new(Duration::from_secs(3600));
        assert!(timer.tick().is_none());
        assert!(timer.tick().is_none());
    }
}
