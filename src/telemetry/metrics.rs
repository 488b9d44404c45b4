//! Ties stopwatches, allocation sampling and CPU utilization into one
//! per-request snapshot, and aggregates snapshots across requests into
//! rolling percentiles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::telemetry::allocation::{AllocationDelta, AllocationObserver, NullAllocationObserver};
use crate::telemetry::percentiles::PercentileAggregator;
use crate::telemetry::stopwatch::RequestTimers;

/// Process CPU time in seconds, read on a best-effort basis. Returns `None`
/// when the platform doesn't expose `/proc/self/stat` or it can't be parsed
/// — callers must treat that as "unknown", never as a fatal error.
#[cfg(target_os = "linux")]
fn process_cpu_time_secs() -> Option<f64> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    // Fields are space-separated; the process name field (2nd) may itself
    // contain spaces inside parentheses, so split after the closing paren.
    let after_comm = stat.rsplit_once(')')?.1;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // utime is field 14, stime is field 15 counting from field 1 = pid;
    // after stripping "pid (comm)" the first field here is state (field 3),
    // so utime/stime are at indices 11 and 12.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    let ticks_per_sec = 100.0; // USER_HZ is 100 on virtually all Linux targets
    Some((utime + stime) as f64 / ticks_per_sec)
}

#[cfg(not(target_os = "linux"))]
fn process_cpu_time_secs() -> Option<f64> {
    None
}

/// `(cpu_time_end - cpu_time_start) / (wall_time * logical_core_count)`,
/// clamped to `[0, 1]`. Returns `None` if CPU time couldn't be sampled on
/// this platform — never fatal.
pub fn cpu_utilization(cpu_start: Option<f64>, wall: Duration) -> Option<f64> {
    let cpu_end = process_cpu_time_secs()?;
    let cpu_start = cpu_start?;
    let wall_secs = wall.as_secs_f64();
    if wall_secs <= 0.0 {
        return None;
    }
    let cores = num_cpus::get().max(1) as f64;
    let fraction = (cpu_end - cpu_start) / (wall_secs * cores);
    Some(fraction.clamp(0.0, 1.0))
}

/// One request's complete telemetry snapshot.
#[derive(Debug, Clone)]
pub struct RequestTelemetry {
    pub ttft: Option<Duration>,
    pub prefill_tokens_per_sec: Option<f64>,
    pub decode_tokens_per_sec: Option<f64>,
    pub per_token_latency_ms: Option<f64>,
    pub end_to_end: Duration,
    pub allocation: AllocationDelta,
    pub cpu_utilization: Option<f64>,
}

/// Tracks one in-flight request's timers and allocation baseline, and
/// finalizes into a [`RequestTelemetry`] snapshot.
pub struct RequestTracker {
    timers: RequestTimers,
    allocation_observer: Arc<dyn AllocationObserver>,
    allocation_start: crate::telemetry::allocation::AllocationSample,
    cpu_start: Option<f64>,
    wall_start: Instant,
}

impl RequestTracker {
    pub fn new(prompt_tokens: usize, allocation_observer: Arc<dyn AllocationObserver>) -> Self {
        let allocation_start = allocation_observer.sample();
        Self {
            timers: RequestTimers::new(prompt_tokens),
            allocation_observer,
            allocation_start,
            cpu_start: process_cpu_time_secs(),
            wall_start: Instant::now(),
        }
    }

    pub fn with_default_observer(prompt_tokens: usize) -> Self {
        Self::new(prompt_tokens, Arc::new(NullAllocationObserver))
    }

    pub fn begin_decode(&mut self) {
        self.timers.begin_decode();
    }

    pub fn record_token(&mut self) {
        self.timers.record_token();
    }

    pub fn finish(mut self) -> RequestTelemetry {
        self.timers.finish();
        let allocation_end = self.allocation_observer.sample();
        let wall = self.wall_start.elapsed();
        RequestTelemetry {
            ttft: self.timers.ttft(),
            prefill_tokens_per_sec: self.timers.prefill_tokens_per_sec(),
            decode_tokens_per_sec: self.timers.decode_tokens_per_sec(),
            per_token_latency_ms: self.timers.per_token_latency_ms(),
            end_to_end: self.timers.end_to_end.elapsed(),
            allocation: AllocationDelta::between(self.allocation_start, allocation_end),
            cpu_utilization: cpu_utilization(self.cpu_start, wall),
        }
    }
}

/// Rolling percentile view over decode-latency samples across many
/// requests, guarded by a single lock per collector.
pub struct TelemetryCollector {
    decode_latency_ms: Mutex<PercentileAggregator>,
    end_to_end_ms: Mutex<PercentileAggregator>,
}

impl TelemetryCollector {
    pub fn new(window: usize) -> Self {
        Self {
            decode_latency_ms: Mutex::new(PercentileAggregator::new(window)),
            end_to_end_ms: Mutex::new(PercentileAggregator::new(window)),
        }
    }

    pub fn record(&self, telemetry: &RequestTelemetry) {
        if let Some(latency) = telemetry.per_token_latency_ms {
            self.decode_latency_ms.lock().record(latency);
        }
        self.end_to_end_ms
            .lock()
            .record(telemetry.end_to_end.as_secs_f64() * 1000.0);
    }

    pub fn decode_latency_percentile(&self, p: f64) -> Option<f64> {
        self.decode_latency_ms.lock().percentile(p)
    }

    pub fn end_to_end_percentile(&self, p: f64) -> Option<f64> {
        self.end_to_end_ms.lock().percentile(p)
    }
}
