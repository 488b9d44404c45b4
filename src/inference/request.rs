//! Request and token-event types passed between a session, the scheduler,
//! and the kernels that actually run a decode step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::EngineResult;

/// How the sampler should pick the next token. Distinct from
/// [`crate::inference::execution_context::DecodeMode`], which tracks
/// prefill-vs-decode *execution* phase rather than sampling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    Sampling,
    Greedy,
    Deterministic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Json,
    Regex,
    Sql,
    Xml,
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub max_new_tokens: usize,
    pub temperature: f32,
    pub top_k: Option<usize>,
    pub top_p: Option<f32>,
    pub seed: Option<u64>,
    pub mode: SamplingMode,
    pub constraint: Option<ConstraintKind>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 1.0,
            top_k: None,
            top_p: None,
            seed: None,
            mode: SamplingMode::Sampling,
            constraint: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenEvent {
    pub token_id: u32,
    pub text: String,
    pub position: usize,
    pub logprob: f32,
    pub is_final: bool,
}

/// A cooperative cancellation flag shared between a request's submitter and
/// the scheduler/execution loop consuming it.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct InferenceRequest {
    pub model_id: String,
    pub prompt_tokens: Vec<u32>,
    pub options: GenerationOptions,
    pub cancellation: CancellationSignal,
    pub events: tokio::sync::mpsc::UnboundedSender<TokenEvent>,
    pub completion: Option<tokio::sync::oneshot::Sender<EngineResult<crate::error::StopReason>>>,
}

impl InferenceRequest {
    /// Two requests may share a batch if they target the same model and use
    /// the same sampling mode and constraint kind. `max_new_tokens` is
    /// deliberately not compared — see the Open Question note on this
    /// predicate in the scheduler's doc comment.
    pub fn is_batch_compatible_with(&self, other: &InferenceRequest) -> bool {
        if self.model_id != other.model_id {
            return false;
        }
        if self.options.mode != other.options.mode {
            return false;
        }
        self.options.constraint == other.options.constraint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model_id: &str, mode: SamplingMode, max_new_tokens: usize) -> InferenceRequest {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        InferenceRequest {
            model_id: model_id.to_string(),
            prompt_tokens: vec![1, 2, 3],
            options: GenerationOptions {
                max_new_tokens,
                mode,
                ..Default::default()
            },
            cancellation: CancellationSignal::new(),
            events: tx,
            completion: None,
        }
    }

    #[test]
    fn compatible_requests_match_model_mode_and_constraint() {
        let a = request("m1", SamplingMode::Greedy, 100);
        let b = request("m1", SamplingMode::Greedy, 120);
        assert!(a.is_batch_compatible_with(&b));
    }

    #[test]
    fn different_models_are_incompatible() {
        let a = request("m1", SamplingMode::Greedy, 100);
        let b = request("m2", SamplingMode::Greedy, 100);
        assert!(!a.is_batch_compatible_with(&b));
    }

    #[test]
    fn differing_token_budgets_are_ignored_by_compatibility() {
        let a = request("m1", SamplingMode::Greedy, 10);
        let b = request("m1", SamplingMode::Greedy, 1000);
        assert!(a.is_batch_compatible_with(&b));
    }

    #[test]
    fn cancellation_signal_is_observable_after_clone() {
        let sig = CancellationSignal::new();
        let clone = sig.clone();
        assert!(!clone.is_cancelled());
        sig.cancel();
        assert!(clone.is_cancelled());
    }
}
