//! Software-side liveness watchdog.
//!
//! The telemetry loop advances the heartbeat once per iteration; the control
//! loop checks staleness each tick and forces a zero velocity command while
//! the heartbeat is stale. This is liveness of the process's own telemetry
//! loop, not freshness of upstream commands. The controller firmware carries
//! an independent device-side watchdog on top of this.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Heartbeat age past which liveness is considered lost.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct LivenessWatchdog {
    last_beat: Mutex<Instant>,
    timeout: Duration,
}

impl LivenessWatchdog {
    pub fn new() -> Self {
        Self::with_timeout(LIVENESS_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            last_beat: Mutex::new(Instant::now()),
            timeout,
        }
    }

    /// Advances the heartbeat. Called once per telemetry-loop iteration.
    pub fn beat(&self) {
        *self.last_beat.lock().unwrap() = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.last_beat.lock().unwrap().elapsed()
    }

    /// True once the heartbeat is older than the liveness timeout.
    pub fn stale(&self) -> bool {
        self.elapsed() > self.timeout
    }
}

impl Default for LivenessWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_watchdog_is_live() {
        let watchdog = LivenessWatchdog::new();
        assert!(!watchdog.stale());
    }

    #[test]
    fn test_stale_after_timeout_without_beats() {
        let watchdog = LivenessWatchdog::with_timeout(Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(25));
        assert!(watchdog.stale());
    }

    #[test]
    fn test_beat_restores_liveness() {
        let watchdog = LivenessWatchdog::with_timeout(Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(25));
        assert!(watchdog.stale());

        watchdog.beat();
        assert!(!watchdog.stale());
    }
}
