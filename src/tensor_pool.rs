//! Scratch-buffer pool for temporary FP32 arrays (attention scores,
//! softmax workspaces, fused-kernel dequantization scratch).
//!
//! Grounded on the GPU memory pool's bucket-by-size strategy elsewhere in
//! this codebase, re-expressed for CPU per the re-architecture guidance on
//! object pools: an explicitly owned pool, scoped acquisition, guaranteed
//! release via `Drop` rather than a process-wide singleton.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// Bucketed by the next power-of-two >= requested length. Each bucket has
/// its own lock, so acquiring a small buffer never contends with a
/// concurrent acquire/release of a different size.
pub struct TensorPool {
    buckets: DashMap<usize, Mutex<Vec<Vec<f32>>>>,
}

impl Default for TensorPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorPool {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Borrow a zeroed buffer of at least `len` elements. Returned to the
    /// matching bucket (zeroed again) when the guard is dropped.
    pub fn acquire(&self, len: usize) -> PooledBuffer<'_> {
        let bucket_key = len.next_power_of_two().max(1);
        let mut buf = {
            let bucket = self.buckets.entry(bucket_key).or_default();
            bucket.lock().pop().unwrap_or_default()
        };
        buf.clear();
        buf.resize(len, 0.0);
        PooledBuffer {
            pool: self,
            bucket_key,
            buf: Some(buf),
            zero_on_return: true,
        }
    }

    fn release(&self, bucket_key: usize, mut buf: Vec<f32>, zero: bool) {
        if zero {
            buf.iter_mut().for_each(|x| *x = 0.0);
        }
        let bucket = self.buckets.entry(bucket_key).or_default();
        bucket.lock().push(buf);
    }

    /// True if any bucket ever created is keyed at or above `len` — used by
    /// tests to confirm a caller never materialized a buffer that large.
    pub fn has_bucket_at_least(&self, len: usize) -> bool {
        self.buckets.iter().any(|entry| *entry.key() >= len)
    }
}

/// RAII guard over a borrowed scratch buffer. Derefs to `[f32]`.
pub struct PooledBuffer<'a> {
    pool: &'a TensorPool,
    bucket_key: usize,
    buf: Option<Vec<f32>>,
    zero_on_return: bool,
}

impl PooledBuffer<'_> {
    /// Opt out of zeroing when the buffer is returned — safe only when the
    /// caller knows the contents are sensitive to reuse cost, not correctness
    /// (the next `acquire` always re-zeroes on resize() up to `len`, but not
    /// bytes beyond it).
    pub fn skip_zero_on_return(&mut self) {
        self.zero_on_return = false;
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = [f32];
    fn deref(&self) -> &[f32] {
        self.buf.as_deref().expect("buffer taken")
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [f32] {
        self.buf.as_deref_mut().expect("buffer taken")
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(self.bucket_key, buf, self.zero_on_return);
        }
    }
}
