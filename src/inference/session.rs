//! A chat session: an append-only turn log over one execution context, so a
//! conversation's KV cache is reused across turns instead of recomputing the
//! whole history on every call.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult, StopReason};
use crate::inference::constraints::OutputConstraint;
use crate::inference::execution_context::ExecutionContext;
use crate::inference::kv_cache::KVCacheConfig;
use crate::inference::request::{CancellationSignal, GenerationOptions, SamplingMode, TokenEvent};
use crate::sampler;
use crate::telemetry::{RequestTracker, TelemetryCollector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub token_range: (usize, usize),
    pub created_at: DateTime<Utc>,
}

pub struct ChatSession {
    turns: Vec<Turn>,
    context: ExecutionContext,
    in_progress: Option<usize>,
    telemetry: TelemetryCollector,
}

impl ChatSession {
    pub fn new(cache_config: KVCacheConfig) -> Self {
        Self {
            turns: Vec::new(),
            context: ExecutionContext::new(cache_config),
            in_progress: None,
            telemetry: TelemetryCollector::new(50),
        }
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.context
    }

    /// Appends a new turn with an as-yet-unknown generated token range and
    /// marks it as the turn in progress.
    pub fn begin_turn(&mut self, role: Role, content: String) -> Uuid {
        let id = Uuid::new_v4();
        let start = self.context.position();
        self.turns.push(Turn {
            id,
            role,
            content,
            token_range: (start, start),
            created_at: Utc::now(),
        });
        self.in_progress = Some(self.turns.len() - 1);
        id
    }

    /// Records one produced token against the in-progress turn, extending
    /// its token range and appending `event.text` to its content.
    pub fn record_token(&mut self, event: &TokenEvent) -> EngineResult<()> {
        let idx = self
            .in_progress
            .ok_or_else(|| EngineError::Internal("record_token called with no turn in progress".to_string()))?;
        let turn = &mut self.turns[idx];
        turn.token_range.1 = event.position + 1;
        turn.content.push_str(&event.text);
        Ok(())
    }

    /// Cancellation truncates the in-progress turn where it stands — partial
    /// output is kept, not discarded, but no more tokens will be appended to
    /// it once this is called.
    pub fn cancel_in_progress_turn(&mut self) {
        self.in_progress = None;
    }

    pub fn finish_turn(&mut self) {
        self.in_progress = None;
    }

    /// Appends `msg` as a user turn, then runs generation against this
    /// session's execution context: `next_logits` is called once with the
    /// full prompt (prefill) and once per decode step thereafter with just
    /// the last produced token, writing K/V into the context's cache and
    /// returning a vocabulary-sized logit vector for the token after it.
    /// Producing those logits from actual model weights is a caller
    /// concern — this method owns only the loop around it: sampling,
    /// constraint enforcement, cancellation, turn bookkeeping and
    /// telemetry.
    ///
    /// The assistant's streamed tokens are appended as a new turn, emitted
    /// one at a time on `events`, and the call resolves with the
    /// [`StopReason`] that ended generation.
    #[allow(clippy::too_many_arguments)]
    pub fn send(
        &mut self,
        msg: String,
        options: GenerationOptions,
        prompt_tokens: &[u32],
        mut next_logits: impl FnMut(&mut ExecutionContext, &[u32]) -> EngineResult<Vec<f32>>,
        token_text: impl Fn(u32) -> String,
        constraint: Option<&dyn OutputConstraint>,
        cancellation: &CancellationSignal,
        events: &UnboundedSender<TokenEvent>,
    ) -> EngineResult<StopReason> {
        self.turns.push(Turn {
            id: Uuid::new_v4(),
            role: Role::User,
            content: msg,
            token_range: (self.context.position(), self.context.position()),
            created_at: Utc::now(),
        });
        self.begin_turn(Role::Assistant, String::new());

        let mut rng = sampler::rng_from_seed(options.seed.unwrap_or(0));
        let mut tracker = RequestTracker::with_default_observer(prompt_tokens.len());
        let greedy_mode = matches!(options.mode, SamplingMode::Greedy | SamplingMode::Deterministic);
        let effective_temperature = if greedy_mode { 0.0 } else { options.temperature };

        let mut current_logits = next_logits(&mut self.context, prompt_tokens)?;
        self.context.advance(prompt_tokens.len())?;
        tracker.begin_decode();

        let mut generated = 0usize;
        let stop_reason = loop {
            if cancellation.is_cancelled() {
                break StopReason::CancelledByCaller;
            }
            if generated >= options.max_new_tokens {
                break StopReason::MaxTokens;
            }

            let (token_id, logprob) = match constraint {
                Some(c) => {
                    let generated_so_far = self.turns[self.in_progress.expect("turn in progress")].content.clone();
                    sampler::sample_with_constraint(
                        &current_logits,
                        effective_temperature,
                        options.top_k,
                        options.top_p,
                        &mut rng,
                        c,
                        &generated_so_far,
                        &token_text,
                    )?
                }
                None if greedy_mode => {
                    let id = sampler::greedy(&current_logits)?;
                    let probs = sampler::softmax(&current_logits);
                    (id, probs[id as usize].ln())
                }
                None => sampler::sample(&current_logits, options.temperature, options.top_k, options.top_p, &mut rng)?,
            };

            let text = token_text(token_id);
            let position = self.context.position();
            let event = TokenEvent {
                token_id,
                text,
                position,
                logprob,
                is_final: false,
            };
            self.record_token(&event)?;
            let _ = events.send(event);
            tracker.record_token();
            generated += 1;

            // Compute and store this token's own K/V before it can be fed
            // forward again, so a following turn can continue the cache
            // without recomputing anything already generated.
            current_logits = next_logits(&mut self.context, std::slice::from_ref(&token_id))?;
            self.context.advance(1)?;

            let generated_so_far = self.turns[self.in_progress.expect("turn in progress")].content.clone();
            if let Some(c) = constraint {
                if c.complete(&generated_so_far) {
                    break StopReason::Completed;
                }
            }
            if generated >= options.max_new_tokens {
                break StopReason::MaxTokens;
            }
        };

        match &stop_reason {
            StopReason::CancelledByCaller => self.cancel_in_progress_turn(),
            _ => self.finish_turn(),
        }
        self.telemetry.record(&tracker.finish());
        Ok(stop_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_config() -> KVCacheConfig {
        KVCacheConfig {
            num_layers: 1,
            max_seq_len: 16,
            num_heads: 1,
            head_dim: 4,
        }
    }

    #[test]
    fn records_tokens_into_in_progress_turn() {
        let mut session = ChatSession::new(cache_config());
        session.begin_turn(Role::Assistant, String::new());
        session
            .record_token(&TokenEvent {
                token_id: 1,
                text: "hi".to_string(),
                position: 0,
                logprob: -0.1,
                is_final: false,
            })
            .unwrap();
        assert_eq!(session.turns()[0].content, "hi");
        assert_eq!(session.turns()[0].token_range, (0, 1));
    }

    #[test]
    fn record_token_without_turn_fails() {
        let mut session = ChatSession::new(cache_config());
        let err = session
            .record_token(&TokenEvent {
                token_id: 1,
                text: "x".to_string(),
                position: 0,
                logprob: 0.0,
                is_final: false,
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
    }

    #[test]
    fn cancel_stops_further_token_recording() {
        let mut session = ChatSession::new(cache_config());
        session.begin_turn(Role::Assistant, String::new());
        session.cancel_in_progress_turn();
        assert!(session
            .record_token(&TokenEvent {
                token_id: 1,
                text: "x".to_string(),
                position: 0,
                logprob: 0.0,
                is_final: false,
            })
            .is_err());
    }

    #[test]
    fn send_generates_greedily_until_max_tokens() {
        let mut session = ChatSession::new(cache_config());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let options = GenerationOptions {
            max_new_tokens: 3,
            mode: SamplingMode::Greedy,
            ..Default::default()
        };
        let stop = session
            .send(
                "hi".to_string(),
                options,
                &[7, 8],
                |_ctx, _tokens| Ok(vec![0.1, 5.0, 1.0]),
                |id| id.to_string(),
                None,
                &CancellationSignal::new(),
                &tx,
            )
            .unwrap();
        assert!(matches!(stop, StopReason::MaxTokens));
        assert_eq!(session.turns()[0].role, Role::User);
        assert_eq!(session.turns()[1].content, "111");
        drop(rx);
    }

    #[test]
    fn send_honors_pre_cancelled_signal() {
        let mut session = ChatSession::new(cache_config());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let cancellation = CancellationSignal::new();
        cancellation.cancel();
        let stop = session
            .send(
                "hi".to_string(),
                GenerationOptions::default(),
                &[1],
                |_ctx, _tokens| Ok(vec![0.0, 0.0]),
                |id| id.to_string(),
                None,
                &cancellation,
                &tx,
            )
            .unwrap();
        assert!(matches!(stop, StopReason::CancelledByCaller));
        assert_eq!(session.turns()[1].content, "");
        drop(rx);
    }
}
