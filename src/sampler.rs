//! Token sampling: greedy argmax and temperature/top-k/top-p draws, with
//! constraint-aware resampling and deterministic replay.
//!
//! Extends a scalar `softmax`/`argmax` pair to the full generation contract:
//! temperature, nucleus filtering, an active output constraint, and a
//! seeded RNG for deterministic replay.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{EngineError, EngineResult};
use crate::inference::constraints::OutputConstraint;

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_val = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut probs: Vec<f32> = logits.iter().map(|&l| (l - max_val).exp()).collect();
    let sum_exp: f32 = probs.iter().sum();
    if sum_exp > 0.0 {
        for p in &mut probs {
            *p /= sum_exp;
        }
    }
    probs
}

pub fn argmax(logits: &[f32]) -> Option<usize> {
    logits
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
}

pub fn greedy(logits: &[f32]) -> EngineResult<u32> {
    argmax(logits)
        .map(|idx| idx as u32)
        .ok_or_else(|| EngineError::InvalidInput("empty logits".to_string()))
}

/// One candidate surviving temperature/top-k/top-p filtering, in
/// descending-probability order with ties broken by ascending token id.
struct Candidate {
    token_id: u32,
    prob: f32,
}

fn ranked_candidates(logits: &[f32], temperature: f32, top_k: Option<usize>, top_p: Option<f32>) -> Vec<Candidate> {
    let scaled: Vec<f32> = if temperature > 0.0 {
        logits.iter().map(|&l| l / temperature).collect()
    } else {
        logits.to_vec()
    };
    let probs = softmax(&scaled);

    let mut ranked: Vec<Candidate> = probs
        .into_iter()
        .enumerate()
        .map(|(idx, prob)| Candidate {
            token_id: idx as u32,
            prob,
        })
        .collect();
    ranked.sort_by(|a, b| match b.prob.partial_cmp(&a.prob).unwrap_or(std::cmp::Ordering::Equal) {
        std::cmp::Ordering::Equal => a.token_id.cmp(&b.token_id),
        other => other,
    });

    if let Some(k) = top_k {
        ranked.truncate(k.max(1));
    }

    if let Some(p) = top_p {
        let mut cumulative = 0.0;
        let mut cutoff = ranked.len();
        for (idx, candidate) in ranked.iter().enumerate() {
            cumulative += candidate.prob;
            if cumulative >= p {
                cutoff = idx + 1;
                break;
            }
        }
        ranked.truncate(cutoff.max(1));
    }

    renormalize(&mut ranked);
    ranked
}

fn renormalize(candidates: &mut [Candidate]) {
    let sum: f32 = candidates.iter().map(|c| c.prob).sum();
    if sum > 0.0 {
        for c in candidates.iter_mut() {
            c.prob /= sum;
        }
    }
}

/// Draws one token under temperature/top-k/top-p filtering. `temperature
/// <= 0` degenerates to greedy. Returns `(token_id, logprob)`.
pub fn sample(
    logits: &[f32],
    temperature: f32,
    top_k: Option<usize>,
    top_p: Option<f32>,
    rng: &mut StdRng,
) -> EngineResult<(u32, f32)> {
    if logits.is_empty() {
        return Err(EngineError::InvalidInput("empty logits".to_string()));
    }
    if temperature <= 0.0 {
        let token_id = greedy(logits)?;
        let probs = softmax(logits);
        return Ok((token_id, probs[token_id as usize].ln()));
    }

    let ranked = ranked_candidates(logits, temperature, top_k, top_p);
    draw_from(&ranked, rng)
}

fn draw_from(ranked: &[Candidate], rng: &mut StdRng) -> EngineResult<(u32, f32)> {
    if ranked.is_empty() {
        return Err(EngineError::InvalidInput("no sampling candidates".to_string()));
    }
    let draw: f32 = rng.gen();
    let mut cumulative = 0.0;
    for candidate in ranked {
        cumulative += candidate.prob;
        if draw <= cumulative {
            return Ok((candidate.token_id, candidate.prob.ln()));
        }
    }
    let last = ranked.last().unwrap();
    Ok((last.token_id, last.prob.ln()))
}

/// Builds a seeded RNG for deterministic replay. Two calls with the same
/// seed always produce the same draw sequence.
pub fn rng_from_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Like [`sample`], but resamples among tokens the constraint still admits,
/// in descending-probability order. Fails with `ConstraintViolation` if no
/// candidate is admissible.
pub fn sample_with_constraint(
    logits: &[f32],
    temperature: f32,
    top_k: Option<usize>,
    top_p: Option<f32>,
    rng: &mut StdRng,
    constraint: &dyn OutputConstraint,
    generated_so_far: &str,
    token_text: impl Fn(u32) -> String,
) -> EngineResult<(u32, f32)> {
    if logits.is_empty() {
        return Err(EngineError::InvalidInput("empty logits".to_string()));
    }
    let mut ranked = if temperature > 0.0 {
        ranked_candidates(logits, temperature, top_k, top_p)
    } else {
        let probs = softmax(logits);
        let mut all: Vec<Candidate> = probs
            .into_iter()
            .enumerate()
            .map(|(idx, prob)| Candidate {
                token_id: idx as u32,
                prob,
            })
            .collect();
        all.sort_by(|a, b| match b.prob.partial_cmp(&a.prob).unwrap_or(std::cmp::Ordering::Equal) {
            std::cmp::Ordering::Equal => a.token_id.cmp(&b.token_id),
            other => other,
        });
        all
    };

    ranked.retain(|c| constraint.token_allowed(generated_so_far, &token_text(c.token_id)));
    if ranked.is_empty() {
        return Err(EngineError::ConstraintViolation(
            "no admissible token under the active output constraint".to_string(),
        ));
    }
    renormalize(&mut ranked);

    if temperature <= 0.0 {
        let best = &ranked[0];
        return Ok((best.token_id, best.prob.ln()));
    }
    draw_from(&ranked, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::constraints::JsonConstraint;

    #[test]
    fn greedy_picks_the_highest_logit() {
        assert_eq!(greedy(&[0.1, 5.0, 2.0]).unwrap(), 1);
    }

    #[test]
    fn zero_temperature_degenerates_to_greedy() {
        let mut rng = rng_from_seed(1);
        let (token_id, _) = sample(&[0.1, 5.0, 2.0], 0.0, None, None, &mut rng).unwrap();
        assert_eq!(token_id, 1);
    }

    #[test]
    fn same_seed_reproduces_same_draw() {
        let logits = [1.0, 2.0, 0.5, 3.0];
        let mut rng_a = rng_from_seed(42);
        let mut rng_b = rng_from_seed(42);
        let a = sample(&logits, 1.0, Some(4), None, &mut rng_a).unwrap();
        let b = sample(&logits, 1.0, Some(4), None, &mut rng_b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn top_k_restricts_to_highest_logits() {
        let ranked = ranked_candidates(&[0.1, 5.0, 2.0, -1.0], 1.0, Some(2), None);
        let ids: Vec<u32> = ranked.iter().map(|c| c.token_id).collect();
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn constraint_resample_rejects_when_nothing_admissible() {
        let constraint = JsonConstraint;
        let mut rng = rng_from_seed(7);
        let err = sample_with_constraint(
            &[1.0, 1.0],
            1.0,
            None,
            None,
            &mut rng,
            &constraint,
            "}",
            |id| if id == 0 { "x".to_string() } else { "y".to_string() },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));
    }
}
