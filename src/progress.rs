//! Query progress reporting.
//!
//! Human-facing status lines for long-running inference calls. Progress is
//! emitted on **stderr** so stdout stays parseable for scripts. Two throttles
//! shape the cadence: a waiting ticker for single-shot requests (updates slow
//! down as the request drags on) and a streaming throttle that reports on the
//! first token and then at a bounded rate.

use std::io::Write;
use std::time::{Duration, Instant};

/// Receives human-readable status lines during an inference call.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, message: &str);
}

/// Progress on stderr, one line per update.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, message: &str) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", message);
        let _ = err.flush();
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _message: &str) {}
}

/// Cadence control for the single-shot waiting message.
///
/// Starts at one update every 3 seconds, backs off to 5 seconds after half a
/// minute and to 10 seconds after a full minute, so a slow model does not
/// spam the operator.
pub struct WaitTicker {
    started: Instant,
    last_update: Instant,
    interval: Duration,
}

impl WaitTicker {
    pub fn new(now: Instant) -> Self {
        Self {
            started: now,
            last_update: now,
            interval: Duration::from_secs(3),
        }
    }

    /// Status line to emit at `now`, if the cadence allows one.
    pub fn tick(&mut self, now: Instant) -> Option<String> {
        let elapsed = now.duration_since(self.started).as_secs();
        if elapsed > 60 && self.interval < Duration::from_secs(10) {
            self.interval = Duration::from_secs(10);
        } else if elapsed > 30 && self.interval < Duration::from_secs(5) {
            self.interval = Duration::from_secs(5);
        }
        if now.duration_since(self.last_update) >= self.interval {
            self.last_update = now;
            Some(format!("Waiting for Ollama response... ({elapsed}s)"))
        } else {
            None
        }
    }
}

/// Cadence control for streaming token progress.
///
/// The first token always produces an update; afterwards updates fire when
/// 1.5 seconds have passed or more than 20 new tokens arrived. Throughput is
/// re-estimated every 10 tokens.
pub struct StreamThrottle {
    started: Instant,
    last_update: Instant,
    started_reporting: bool,
    token_count: u64,
    tokens_at_last_update: u64,
    rate_window_start: Instant,
    rate_window_tokens: u64,
    tokens_per_second: u64,
}

impl StreamThrottle {
    pub fn new(now: Instant) -> Self {
        Self {
            started: now,
            last_update: now,
            started_reporting: false,
            token_count: 0,
            tokens_at_last_update: 0,
            rate_window_start: now,
            rate_window_tokens: 0,
            tokens_per_second: 0,
        }
    }

    /// Record a delta of `new_tokens` received at `now` and return the status
    /// line to emit, if any.
    pub fn record(&mut self, new_tokens: u64, now: Instant) -> Option<String> {
        self.token_count += new_tokens;
        self.rate_window_tokens += new_tokens;

        if self.rate_window_tokens >= 10 {
            let window = now.duration_since(self.rate_window_start).as_secs_f64();
            if window > 0.0 {
                self.tokens_per_second = (self.rate_window_tokens as f64 / window).round() as u64;
                self.rate_window_start = now;
                self.rate_window_tokens = 0;
            }
        }

        let token_delta = self.token_count - self.tokens_at_last_update;
        let due = !self.started_reporting
            || now.duration_since(self.last_update) > Duration::from_millis(1500)
            || token_delta > 20;
        if !due {
            return None;
        }

        self.last_update = now;
        self.tokens_at_last_update = self.token_count;
        if !self.started_reporting {
            self.started_reporting = true;
            return Some("First tokens received, generating response...".to_string());
        }

        let elapsed = now.duration_since(self.started).as_secs();
        let rate = if self.tokens_per_second > 0 {
            format!(" at ~{} tokens/sec", self.tokens_per_second)
        } else {
            String::new()
        };
        Some(format!(
            "Generating response... ({} tokens, {elapsed}s{rate})",
            self.token_count
        ))
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_ticker_backs_off_over_time() {
        let start = Instant::now();
        let mut ticker = WaitTicker::new(start);

        assert!(ticker.tick(start + Duration::from_secs(1)).is_none());
        let first = ticker.tick(start + Duration::from_secs(3));
        assert_eq!(first.as_deref(), Some("Waiting for Ollama response... (3s)"));

        // After 30s the interval widens to 5s.
        assert!(ticker.tick(start + Duration::from_secs(31)).is_some());
        assert!(ticker.tick(start + Duration::from_secs(34)).is_none());
        assert!(ticker.tick(start + Duration::from_secs(36)).is_some());

        // After 60s it widens to 10s.
        assert!(ticker.tick(start + Duration::from_secs(61)).is_some());
        assert!(ticker.tick(start + Duration::from_secs(69)).is_none());
        assert!(ticker.tick(start + Duration::from_secs(71)).is_some());
    }

    #[test]
    fn stream_throttle_reports_first_token_immediately() {
        let start = Instant::now();
        let mut throttle = StreamThrottle::new(start);
        let first = throttle.record(1, start);
        assert_eq!(
            first.as_deref(),
            Some("First tokens received, generating response...")
        );
        // Immediately after, small deltas stay quiet.
        assert!(throttle.record(1, start + Duration::from_millis(100)).is_none());
    }

    #[test]
    fn stream_throttle_fires_on_token_burst_or_elapsed_time() {
        let start = Instant::now();
        let mut throttle = StreamThrottle::new(start);
        throttle.record(1, start);

        // 25 new tokens exceed the 20-token delta.
        let burst = throttle.record(25, start + Duration::from_millis(200));
        assert!(burst.is_some_and(|m| m.starts_with("Generating response... (26 tokens")));

        // Quiet until the 1.5s window passes.
        assert!(throttle.record(1, start + Duration::from_millis(700)).is_none());
        assert!(throttle
            .record(1, start + Duration::from_millis(2000))
            .is_some());
    }

    #[test]
    fn stream_throttle_estimates_rate_per_window() {
        let start = Instant::now();
        let mut throttle = StreamThrottle::new(start);
        throttle.record(1, start);
        let update = throttle.record(30, start + Duration::from_secs(2));
        assert!(update.is_some_and(|m| m.contains("tokens/sec")));
    }
}
