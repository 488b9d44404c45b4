//! Regex-backed constraint: prefix admissibility is permissive (anything can
//! still become a match), completion requires a full match of the compiled
//! pattern within a 1 second timeout.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use regex::Regex;

use crate::error::{EngineError, EngineResult};
use crate::inference::constraints::OutputConstraint;

const MATCH_TIMEOUT: Duration = Duration::from_secs(1);

fn pattern_cache() -> &'static DashMap<String, Arc<Regex>> {
    static CACHE: OnceLock<DashMap<String, Arc<Regex>>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

pub struct RegexConstraint {
    pattern: Arc<Regex>,
}

impl RegexConstraint {
    /// Compiles `pattern`, reusing an already-compiled instance if another
    /// constraint (or an earlier request) already used it.
    pub fn new(pattern: &str) -> EngineResult<Self> {
        if let Some(existing) = pattern_cache().get(pattern) {
            return Ok(Self { pattern: existing.clone() });
        }
        let compiled = Regex::new(pattern)
            .map_err(|e| EngineError::InvalidInput(format!("invalid regex '{pattern}': {e}")))?;
        let compiled = Arc::new(compiled);
        pattern_cache().insert(pattern.to_string(), compiled.clone());
        Ok(Self { pattern: compiled })
    }

    fn full_match_with_timeout(&self, text: &str) -> bool {
        let pattern = self.pattern.clone();
        let text = text.to_string();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let is_match = pattern.find(&text).map(|m| m.start() == 0 && m.end() == text.len());
            let _ = tx.send(is_match.unwrap_or(false));
        });
        rx.recv_timeout(MATCH_TIMEOUT).unwrap_or(false)
    }
}

impl OutputConstraint for RegexConstraint {
    fn token_allowed(&self, _generated_so_far: &str, _candidate_text: &str) -> bool {
        true
    }

    fn complete(&self, generated_so_far: &str) -> bool {
        self.full_match_with_timeout(generated_so_far)
    }
}
