//! Concrete acceptance scenarios exercising the engine end to end, one test
//! per named scenario.

use std::time::Duration;

use quinfer::config::SchedulerConfig;
use quinfer::error::EngineError;
use quinfer::inference::constraints::{JsonConstraint, OutputConstraint};
use quinfer::inference::request::{CancellationSignal, GenerationOptions, InferenceRequest};
use quinfer::inference::scheduler::spawn_scheduler;
use quinfer::kernels::fused_matmul::{mat_mul, scalar_matmul_reference};
use quinfer::quant::{QuantScheme, QuantTensor};
use quinfer::tensor_pool::TensorPool;
use quinfer::telemetry::PercentileAggregator;
use quinfer::xgf::import_xgf;

/// S1 — Q8 round-trip: matrix [64 x 1], x_i = sin(0.1 * i).
#[test]
fn s1_q8_round_trip() {
    let data: Vec<f32> = (0..64).map(|i| (0.1 * i as f32).sin()).collect();
    let tensor = QuantTensor::quantize(QuantScheme::Q8_0, &data, 64, 1).unwrap();
    let back = tensor.dequantize();
    for (orig, got) in data.iter().zip(back.iter()) {
        assert!((orig - got).abs() <= orig.abs() * 0.03 + 1e-6, "{orig} vs {got}");
    }
}

/// S2 — Fused Q4 matmul: A [1x128] of 0.5, B [128x4] of 1.0, block=64.
/// Expected output [1x4], each element approximately 64.0.
#[test]
fn s2_fused_q4_matmul() {
    let pool = TensorPool::new();
    let k = 128;
    let n = 4;
    let weights = QuantTensor::quantize(QuantScheme::Q4_0, &vec![1.0f32; k * n], k, n).unwrap();
    let activations = vec![0.5f32; k];
    let mut out = vec![0.0f32; n];
    mat_mul(&pool, &activations, &weights, &mut out, 1, k, n).unwrap();

    for v in &out {
        assert!((v - 64.0).abs() / 64.0 < 0.1, "{v} too far from 64.0");
    }

    let dequantized = weights.dequantize();
    let reference = scalar_matmul_reference(&activations, &dequantized, 1, k, n);
    for (a, b) in out.iter().zip(reference.iter()) {
        assert!((a - b).abs() <= b.abs().max(1.0) * 1e-4);
    }
}

/// S3 — XGF import rejection: one importable tensor, one unsupported
/// tensor. Import fails once, naming only the unsupported tensor.
#[test]
fn s3_xgf_import_rejects_unsupported_tensor_only() {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"XGF0");
    buf.extend_from_slice(&2u32.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes()); // no metadata

    buf.extend_from_slice(&2u32.to_le_bytes()); // 2 tensors

    // Tensor "good": F32, 1x2, importable.
    let name = "good";
    buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.push(0); // F32
    buf.push(2); // rank
    buf.extend_from_slice(&1u64.to_le_bytes());
    buf.extend_from_slice(&2u64.to_le_bytes());
    let payload: Vec<u8> = [1.0f32, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(&payload);

    // Tensor "bad": Q3_K (code 8), not importable.
    let name = "bad";
    buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.push(8); // Q3_K
    buf.push(1); // rank
    buf.extend_from_slice(&4u64.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes()); // zero-length payload

    let err = import_xgf(&buf).unwrap_err();
    match err {
        EngineError::UnsupportedQuantScheme(names) => {
            assert_eq!(names.len(), 1);
            assert!(names[0].contains("bad"));
            assert!(names[0].contains("Q3_K"));
        }
        other => panic!("expected UnsupportedQuantScheme, got {other:?}"),
    }
}

/// S4 — JSON enforcer prefix admissibility and completion.
#[test]
fn s4_json_enforcer() {
    let c = JsonConstraint;
    let prefix = r#"{"a": [1, 2"#;
    assert!(c.token_allowed(prefix, "]"));
    assert!(c.token_allowed(prefix, "}"));
    assert!(c.token_allowed(prefix, "\""));
    assert!(c.complete(r#"{"a": [1, 2]}"#));
    assert!(!c.complete(r#"{"a": [1, 2)"#));
}

fn make_request(model_id: &str) -> InferenceRequest {
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let (completion_tx, _completion_rx) = tokio::sync::oneshot::channel();
    InferenceRequest {
        model_id: model_id.to_string(),
        prompt_tokens: vec![1, 2],
        options: GenerationOptions::default(),
        cancellation: CancellationSignal::new(),
        events: tx,
        completion: Some(completion_tx),
    }
}

/// S5 — Scheduler backpressure: capacity=2, a third enqueue without a drain
/// raises ResourceExhausted; after a batch is pulled, a fourth enqueue
/// succeeds.
#[tokio::test]
async fn s5_scheduler_backpressure() {
    let (handle, mut rx) = spawn_scheduler(SchedulerConfig {
        max_batch_size: 8,
        max_total_queued: 2,
        max_batch_wait_ms: 20,
        deterministic: false,
    });

    handle.submit(make_request("m")).unwrap();
    handle.submit(make_request("m")).unwrap();
    let err = handle.submit(make_request("m")).unwrap_err();
    assert!(matches!(err, EngineError::ResourceExhausted { .. }));

    let batch = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.requests.len(), 2);

    handle.submit(make_request("m")).unwrap();
}

/// S6 — Percentiles over {10, 20, ..., 100}: P50=55, P95=95.5, P99=99.1.
#[test]
fn s6_percentiles() {
    let mut agg = PercentileAggregator::new(50);
    for v in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0] {
        agg.record(v);
    }
    assert!((agg.percentile(50.0).unwrap() - 55.0).abs() < 1e-9);
    assert!((agg.percentile(95.0).unwrap() - 95.5).abs() < 1e-9);
    assert!((agg.percentile(99.0).unwrap() - 99.1).abs() < 1e-9);
}
