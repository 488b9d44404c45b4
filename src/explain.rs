//! Per-token explainability capture: selected-token probability, top-k
//! alternatives, entropy, and per-step elapsed time, rolled up into
//! aggregate confidence statistics.
//!
//! Follows the usual shape for this kind of recorder: accumulate samples as
//! generation proceeds, then build a snapshot/summary type from them.

use std::time::{Duration, Instant};

use crate::sampler::softmax;

pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 50;
pub const DEFAULT_MAX_STEPS: usize = 256;
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.15;

#[derive(Debug, Clone, PartialEq)]
pub enum ExplainWarning {
    LowConfidence { min_probability: f32 },
    MaxStepsExceeded { captured: usize },
}

/// An alternative token considered at a generation step, in descending
/// probability order.
#[derive(Debug, Clone)]
pub struct TokenAlternative {
    pub token_id: u32,
    pub probability: f32,
}

/// What was recorded for one decoded token.
#[derive(Debug, Clone)]
pub struct StepExplanation {
    pub selected_token_id: u32,
    pub selected_probability: f32,
    pub alternatives: Vec<TokenAlternative>,
    pub entropy: f32,
    pub elapsed: Duration,
}

/// Text redaction applied to token text and alternatives before they leave
/// the recorder. A failing redactor substitutes the literal string
/// `"[REDACTED]"` rather than aborting generation.
pub trait Redactor: Send + Sync {
    fn redact(&self, text: &str) -> Option<String>;
}

pub fn apply_redaction(redactor: Option<&dyn Redactor>, text: &str) -> String {
    match redactor {
        None => text.to_string(),
        Some(r) => r.redact(text).unwrap_or_else(|| "[REDACTED]".to_string()),
    }
}

fn shannon_entropy(probs: &[f32]) -> f32 {
    probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum()
}

/// Accumulates per-step explanations up to a capped number of steps,
/// emitting a single `MaxStepsExceeded` warning once the cap is hit.
pub struct ExplainRecorder {
    max_steps: usize,
    top_k: usize,
    steps: Vec<StepExplanation>,
    max_steps_warned: bool,
    last_instant: Option<Instant>,
}

impl ExplainRecorder {
    pub fn new(top_k: usize, max_steps: usize) -> Self {
        Self {
            max_steps,
            top_k: top_k.min(MAX_TOP_K).max(1),
            steps: Vec::new(),
            max_steps_warned: false,
            last_instant: None,
        }
    }

    /// Records one decode step from raw logits and the id that was actually
    /// selected (which need not be the argmax, e.g. under sampling).
    pub fn record_step(&mut self, logits: &[f32], selected_token_id: u32) -> Option<ExplainWarning> {
        let now = Instant::now();
        let elapsed = self
            .last_instant
            .map(|prev| now.duration_since(prev))
            .unwrap_or_default();
        self.last_instant = Some(now);

        if self.steps.len() >= self.max_steps {
            if !self.max_steps_warned {
                self.max_steps_warned = true;
                return Some(ExplainWarning::MaxStepsExceeded {
                    captured: self.steps.len(),
                });
            }
            return None;
        }

        let probs = softmax(logits);
        let entropy = shannon_entropy(&probs);

        let mut ranked: Vec<TokenAlternative> = probs
            .iter()
            .enumerate()
            .map(|(idx, &p)| TokenAlternative {
                token_id: idx as u32,
                probability: p,
            })
            .collect();
        ranked.sort_by(|a, b| b.probability.partial_cmp(&a.probability).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.top_k);

        let selected_probability = probs.get(selected_token_id as usize).copied().unwrap_or(0.0);

        self.steps.push(StepExplanation {
            selected_token_id,
            selected_probability,
            alternatives: ranked,
            entropy,
            elapsed,
        });
        None
    }

    pub fn steps(&self) -> &[StepExplanation] {
        &self.steps
    }

    pub fn summary(&self) -> Option<GenerationSummary> {
        if self.steps.is_empty() {
            return None;
        }
        let probs: Vec<f32> = self.steps.iter().map(|s| s.selected_probability).collect();
        let avg = probs.iter().sum::<f32>() / probs.len() as f32;
        let min = probs.iter().copied().fold(f32::INFINITY, f32::min);

        let mean_neg_log_p: f32 = probs
            .iter()
            .map(|&p| if p > 0.0 { -p.ln() } else { f32::INFINITY })
            .sum::<f32>()
            / probs.len() as f32;
        let perplexity = mean_neg_log_p.exp();

        let warning = if min < LOW_CONFIDENCE_THRESHOLD {
            Some(ExplainWarning::LowConfidence { min_probability: min })
        } else {
            None
        };

        Some(GenerationSummary {
            average_probability: avg,
            minimum_probability: min,
            perplexity,
            warning,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub average_probability: f32,
    pub minimum_probability: f32,
    pub perplexity: f32,
    pub warning: Option<ExplainWarning>,
}
