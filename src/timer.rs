// Monotonic Stopwatches
//
// Recovery measures two durations: total replay time and the interval
// since the last mid-recovery snapshot. Both are simple monotonic
// stopwatches over std::time::Instant that accumulate across start/stop.

use std::time::{Duration, Instant};

/// A restartable monotonic stopwatch
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    started_at: Option<Instant>,
    accumulated: Duration,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start measuring. No-op if already running.
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Stop measuring, folding the current span into the accumulated total.
    pub fn stop(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            self.accumulated += started_at.elapsed();
        }
    }

    /// Discard accumulated time and start measuring from now.
    pub fn restart(&mut self) {
        self.accumulated = Duration::ZERO;
        self.started_at = Some(Instant::now());
    }

    /// Discard accumulated time and stop.
    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.started_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Time measured so far, including the in-progress span
    pub fn elapsed(&self) -> Duration {
        let running = self
            .started_at
            .map(|started_at| started_at.elapsed())
            .unwrap_or(Duration::ZERO);
        self.accumulated + running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_starts_stopped() {
        let watch = Stopwatch::new();
        assert!(!watch.is_running());
        assert_eq!(watch.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_start_stop_accumulates() {
        let mut watch = Stopwatch::new();
        watch.start();
        assert!(watch.is_running());
        thread::sleep(Duration::from_millis(5));
        watch.stop();

        let first = watch.elapsed();
        assert!(first >= Duration::from_millis(5));

        watch.start();
        thread::sleep(Duration::from_millis(5));
        watch.stop();
        assert!(watch.elapsed() >= first + Duration::from_millis(5));
    }

    #[test]
    fn test_start_while_running_is_noop() {
        let mut watch = Stopwatch::new();
        watch.start();
        thread::sleep(Duration::from_millis(5));
        watch.start();
        assert!(watch.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_restart_discards_accumulated_time() {
        let mut watch = Stopwatch::new();
        watch.start();
        thread::sleep(Duration::from_millis(10));
        watch.restart();
        assert!(watch.is_running());
        assert!(watch.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn test_reset() {
        let mut watch = Stopwatch::new();
        watch.start();
        thread::sleep(Duration::from_millis(2));
        watch.reset();
        assert!(!watch.is_running());
        assert_eq!(watch.elapsed(), Duration::ZERO);
    }
}
