//! Per-request timing: end-to-end, prefill and decode phases.

use std::time::{Duration, Instant};

/// A single elapsed-time measurement. Starts running immediately; `stop`
/// freezes it, `elapsed` reads the running or frozen value.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
    stopped_at: Option<Instant>,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            stopped_at: None,
        }
    }

    pub fn stop(&mut self) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(Instant::now());
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self.stopped_at {
            Some(stopped) => stopped.duration_since(self.start),
            None => self.start.elapsed(),
        }
    }
}

/// The three stopwatches tracked per in-flight request. `prefill` and
/// `decode` are started explicitly as the request crosses those phases;
/// `end_to_end` runs from request acceptance until the final token.
pub struct RequestTimers {
    pub end_to_end: Stopwatch,
    pub prefill: Option<Stopwatch>,
    pub decode: Option<Stopwatch>,
    pub first_token_at: Option<Duration>,
    prompt_tokens: usize,
    generated_tokens: usize,
}

impl RequestTimers {
    pub fn new(prompt_tokens: usize) -> Self {
        Self {
            end_to_end: Stopwatch::start(),
            prefill: Some(Stopwatch::start()),
            decode: None,
            first_token_at: None,
            prompt_tokens,
            generated_tokens: 0,
        }
    }

    /// Call once, when prefill finishes and decode begins.
    pub fn begin_decode(&mut self) {
        if let Some(prefill) = self.prefill.as_mut() {
            prefill.stop();
        }
        self.decode = Some(Stopwatch::start());
    }

    /// Call on every generated token; records TTFT on the first call.
    pub fn record_token(&mut self) {
        if self.first_token_at.is_none() {
            self.first_token_at = Some(self.end_to_end.elapsed());
        }
        self.generated_tokens += 1;
    }

    pub fn finish(&mut self) {
        if let Some(decode) = self.decode.as_mut() {
            decode.stop();
        }
        self.end_to_end.stop();
    }

    pub fn ttft(&self) -> Option<Duration> {
        self.first_token_at
    }

    pub fn prefill_tokens_per_sec(&self) -> Option<f64> {
        let elapsed = self.prefill?.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some(self.prompt_tokens as f64 / elapsed)
    }

    pub fn decode_tokens_per_sec(&self) -> Option<f64> {
        let elapsed = self.decode?.elapsed().as_secs_f64();
        if elapsed <= 0.0 || self.generated_tokens == 0 {
            return None;
        }
        Some(self.generated_tokens as f64 / elapsed)
    }

    pub fn per_token_latency_ms(&self) -> Option<f64> {
        let elapsed_ms = self.decode?.elapsed().as_secs_f64() * 1000.0;
        if self.generated_tokens == 0 {
            return None;
        }
        Some(elapsed_ms / self.generated_tokens as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn stopwatch_freezes_on_stop() {
        let mut sw = Stopwatch::start();
        sleep(Duration::from_millis(5));
        sw.stop();
        let frozen = sw.elapsed();
        sleep(Duration::from_millis(5));
        assert_eq!(sw.elapsed(), frozen);
    }

    #[test]
    fn ttft_is_recorded_on_first_token_only() {
        let mut timers = RequestTimers::new(4);
        timers.begin_decode();
        sleep(Duration::from_millis(2));
        timers.record_token();
        let first = timers.ttft().unwrap();
        sleep(Duration::from_millis(2));
        timers.record_token();
        assert_eq!(timers.ttft().unwrap(), first);
    }

    #[test]
    fn decode_throughput_needs_at_least_one_token() {
        let mut timers = RequestTimers::new(4);
        timers.begin_decode();
        assert!(timers.decode_tokens_per_sec().is_none());
        timers.record_token();
        timers.finish();
        assert!(timers.decode_tokens_per_sec().unwrap() > 0.0);
    }
}
