//! Key-value cache for decode-time attention.
//!
//! Stores K and V in preallocated, per-layer flat buffers shaped
//! `[max_seq, heads, head_dim]`: one contiguous allocation per layer per
//! tensor, indexed by `pos * heads * head_dim + head * head_dim + d`.

use crate::error::{EngineError, EngineResult};

/// Parameters for KV cache initialization.
#[derive(Debug, Clone, Copy)]
pub struct KVCacheConfig {
    pub num_layers: usize,
    pub max_seq_len: usize,
    pub num_heads: usize,
    pub head_dim: usize,
}

impl KVCacheConfig {
    fn slot_size(&self) -> usize {
        self.num_heads * self.head_dim
    }
}

/// KV cache for a single session. All layers share one `current_len` cursor:
/// a decode step appends the same number of new tokens to every layer in
/// lock-step, so there is never a reason for them to disagree.
#[derive(Debug, Clone)]
pub struct KVCache {
    config: KVCacheConfig,
    /// Per layer: flat `[max_seq * heads * head_dim]` buffer.
    keys: Vec<Vec<f32>>,
    values: Vec<Vec<f32>>,
    current_len: usize,
}

impl KVCache {
    pub fn new(config: KVCacheConfig) -> Self {
        let slots = config.max_seq_len * config.slot_size();
        Self {
            config,
            keys: (0..config.num_layers).map(|_| vec![0.0; slots]).collect(),
            values: (0..config.num_layers).map(|_| vec![0.0; slots]).collect(),
            current_len: 0,
        }
    }

    pub fn current_len(&self) -> usize {
        self.current_len
    }

    pub fn max_seq_len(&self) -> usize {
        self.config.max_seq_len
    }

    /// Appends `new_tokens` worth of K/V rows for `layer` at
    /// `current_len..current_len + new_tokens`. `keys`/`values` must each be
    /// `new_tokens * heads * head_dim` long, row-major by token then head.
    ///
    /// Does not itself advance `current_len` — callers append the same
    /// `new_tokens` to every layer, then call [`KVCache::update_seq_len`]
    /// once.
    pub fn append(
        &mut self,
        layer: usize,
        keys: &[f32],
        values: &[f32],
        new_tokens: usize,
    ) -> EngineResult<()> {
        if layer >= self.config.num_layers {
            return Err(EngineError::InvalidInput(format!(
                "KV cache layer {layer} out of bounds ({} layers)",
                self.config.num_layers
            )));
        }
        let slot_size = self.config.slot_size();
        if keys.len() != new_tokens * slot_size || values.len() != new_tokens * slot_size {
            return Err(EngineError::DimensionMismatch {
                context: "KVCache::append".to_string(),
                expected: new_tokens * slot_size,
                actual: keys.len(),
            });
        }
        if self.current_len + new_tokens > self.config.max_seq_len {
            return Err(EngineError::CapacityExceeded {
                max: self.config.max_seq_len,
                requested: self.current_len + new_tokens,
            });
        }

        let start = self.current_len * slot_size;
        let end = start + new_tokens * slot_size;
        self.keys[layer][start..end].copy_from_slice(keys);
        self.values[layer][start..end].copy_from_slice(values);
        Ok(())
    }

    /// Reads the K/V rows for `layer` across `0..current_len`.
    pub fn view(&self, layer: usize) -> EngineResult<(&[f32], &[f32])> {
        if layer >= self.config.num_layers {
            return Err(EngineError::InvalidInput(format!(
                "KV cache layer {layer} out of bounds ({} layers)",
                self.config.num_layers
            )));
        }
        let len = self.current_len * self.config.slot_size();
        Ok((&self.keys[layer][..len], &self.values[layer][..len]))
    }

    /// Moves the shared cursor forward by `n`. Callers call this once after
    /// `append`-ing the same `n` new tokens to every layer.
    pub fn update_seq_len(&mut self, n: usize) -> EngineResult<()> {
        if self.current_len + n > self.config.max_seq_len {
            return Err(EngineError::CapacityExceeded {
                max: self.config.max_seq_len,
                requested: self.current_len + n,
            });
        }
        self.current_len += n;
        Ok(())
    }

    /// Resets the cursor to zero. Buffers are left as-is; the next `append`
    /// overwrites them, so there's no need to zero eagerly.
    pub fn clear(&mut self) {
        self.current_len = 0;
    }

    /// Equivalent to [`KVCache::clear`] — all layers share one cursor, so
    /// there is nothing layer-specific left to reset.
    pub fn reset(&mut self) {
        self.clear();
    }
}
