//! Per-session execution state: a KV cache and a monotonic position. Not
//! thread-safe — each session owns exactly one.

use crate::error::EngineResult;
use crate::inference::kv_cache::{KVCache, KVCacheConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Prefill,
    Decode,
}

pub struct ExecutionContext {
    cache: KVCache,
    position: usize,
    has_run_prefill: bool,
}

impl ExecutionContext {
    pub fn new(config: KVCacheConfig) -> Self {
        Self {
            cache: KVCache::new(config),
            position: 0,
            has_run_prefill: false,
        }
    }

    pub fn cache(&self) -> &KVCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut KVCache {
        &mut self.cache
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Prefill until the cache has taken its first tokens, decode thereafter.
    pub fn mode(&self) -> DecodeMode {
        if self.has_run_prefill {
            DecodeMode::Decode
        } else {
            DecodeMode::Prefill
        }
    }

    /// Advances the position by `n` tokens, marking prefill as having run.
    pub fn advance(&mut self, n: usize) -> EngineResult<()> {
        self.cache.update_seq_len(n)?;
        self.position += n;
        self.has_run_prefill = true;
        Ok(())
    }

    /// Resets the cache and position but preserves whatever options and
    /// telemetry the caller tracks alongside this context.
    pub fn reset(&mut self) {
        self.cache.reset();
        self.position = 0;
        self.has_run_prefill = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KVCacheConfig {
        KVCacheConfig {
            num_layers: 1,
            max_seq_len: 8,
            num_heads: 1,
            head_dim: 4,
        }
    }

    #[test]
    fn starts_in_prefill_mode() {
        let ctx = ExecutionContext::new(config());
        assert_eq!(ctx.mode(), DecodeMode::Prefill);
        assert_eq!(ctx.position(), 0);
    }

    #[test]
    fn advance_switches_to_decode_mode() {
        let mut ctx = ExecutionContext::new(config());
        ctx.advance(3).unwrap();
        assert_eq!(ctx.mode(), DecodeMode::Decode);
        assert_eq!(ctx.position(), 3);
    }

    #[test]
    fn reset_returns_to_prefill_mode() {
        let mut ctx = ExecutionContext::new(config());
        ctx.advance(2).unwrap();
        ctx.reset();
        assert_eq!(ctx.mode(), DecodeMode::Prefill);
        assert_eq!(ctx.position(), 0);
    }
}
