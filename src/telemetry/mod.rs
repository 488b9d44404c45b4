//! Request-level timing, throughput, allocation and CPU-utilization
//! telemetry, with a rolling percentile view across requests.

pub mod allocation;
pub mod metrics;
pub mod percentiles;
pub mod stopwatch;

pub use allocation::{AllocationDelta, AllocationObserver, AllocationSample, NullAllocationObserver};
pub use metrics::{cpu_utilization, RequestTelemetry, RequestTracker, TelemetryCollector};
pub use percentiles::PercentileAggregator;
pub use stopwatch::{RequestTimers, Stopwatch};
