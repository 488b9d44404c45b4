//! The first non-whitespace token must be a recognized statement keyword;
//! parenthesis depth may never go negative; completion requires balance.

use crate::inference::constraints::OutputConstraint;

const ALLOWED_KEYWORDS: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "CREATE"];

fn leading_keyword(text: &str) -> Option<String> {
    text.trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .filter(|w| !w.is_empty())
        .map(|w| w.to_uppercase())
}

fn paren_depth(text: &str) -> i32 {
    let mut depth = 0;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return depth;
        }
    }
    depth
}

pub struct SqlConstraint;

impl OutputConstraint for SqlConstraint {
    fn token_allowed(&self, generated_so_far: &str, candidate_text: &str) -> bool {
        let combined = format!("{generated_so_far}{candidate_text}");
        if combined.trim_start().split_whitespace().next().is_some() {
            if let Some(keyword) = leading_keyword(&combined) {
                if !ALLOWED_KEYWORDS.iter().any(|k| k.starts_with(&keyword) || keyword.starts_with(k)) {
                    return false;
                }
            }
        }
        paren_depth(&combined) >= 0
    }

    fn complete(&self, generated_so_far: &str) -> bool {
        let keyword_ok = leading_keyword(generated_so_far)
            .map(|k| ALLOWED_KEYWORDS.contains(&k.as_str()))
            .unwrap_or(false);
        keyword_ok && paren_depth(generated_so_far) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_balanced_select() {
        let c = SqlConstraint;
        assert!(c.complete("SELECT * FROM t WHERE (a = 1)"));
    }

    #[test]
    fn rejects_unrecognized_leading_keyword() {
        let c = SqlConstraint;
        assert!(!c.complete("DROP TABLE t"));
    }

    #[test]
    fn rejects_unbalanced_parens() {
        let c = SqlConstraint;
        assert!(!c.complete("SELECT * FROM t WHERE (a = 1"));
    }

    #[test]
    fn negative_paren_depth_is_denied() {
        let c = SqlConstraint;
        assert!(!c.token_allowed("SELECT 1)", ""));
    }
}
