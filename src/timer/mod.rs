//! Elapsed-time counter for the recording UI
//!
//! Counts whole seconds while running. Pausing freezes the count, it is only
//! zeroed by `start` and `reset`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub struct SessionTimer {
    seconds: Arc<AtomicU64>,
    ticker: Option<JoinHandle<()>>,
}

impl SessionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the counter and start counting
    pub fn start(&mut self) {
        self.stop_ticker();
        self.seconds.store(0, Ordering::SeqCst);
        self.spawn_ticker();
        debug!("Timer started");
    }

    /// Freeze the counter
    pub fn pause(&mut self) {
        if self.stop_ticker() {
            debug!("Timer paused at {}s", self.elapsed_secs());
        }
    }

    /// Continue counting from the frozen value
    pub fn resume(&mut self) {
        if self.ticker.is_none() {
            self.spawn_ticker();
            debug!("Timer resumed at {}s", self.elapsed_secs());
        }
    }

    /// Zero the counter and stop
    pub fn reset(&mut self) {
        self.stop_ticker();
        self.seconds.store(0, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.seconds.load(Ordering::SeqCst)
    }

    /// `MM:SS`, or `HH:MM:SS` from one hour on
    pub fn formatted_time(&self) -> String {
        format_elapsed(self.elapsed_secs())
    }

    fn spawn_ticker(&mut self) {
        let seconds = Arc::clone(&self.seconds);
        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + TICK, TICK);
            // Late ticks are delivered in a burst so the count never skips
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                ticker.tick().await;
                seconds.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    fn stop_ticker(&mut self) -> bool {
        match self.ticker.take() {
            Some(ticker) => {
                ticker.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

pub fn format_elapsed(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_minutes_and_seconds() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(59), "00:59");
        assert_eq!(format_elapsed(65), "01:05");
        assert_eq!(format_elapsed(3599), "59:59");
    }

    #[test]
    fn test_format_switches_to_hours() {
        assert_eq!(format_elapsed(3600), "01:00:00");
        assert_eq!(format_elapsed(3661), "01:01:01");
        assert_eq!(format_elapsed(36_000 + 59), "10:00:59");
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_whole_seconds() {
        let mut timer = SessionTimer::new();
        timer.start();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(timer.elapsed_secs(), 2);
        assert!(timer.is_running());
    }
}
