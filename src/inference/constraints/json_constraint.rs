//! Tracks brace depth, bracket depth, in-string state and escape state over
//! the concatenation of generated text; negative depth denies immediately.

use crate::inference::constraints::OutputConstraint;

#[derive(Debug, Default, Clone, Copy)]
struct ScanState {
    brace_depth: i32,
    bracket_depth: i32,
    in_string: bool,
    escaped: bool,
    started: bool,
    valid: bool,
}

fn scan(text: &str) -> ScanState {
    let mut state = ScanState { valid: true, ..Default::default() };
    for c in text.chars() {
        if !state.valid {
            break;
        }
        if state.in_string {
            if state.escaped {
                state.escaped = false;
            } else if c == '\\' {
                state.escaped = true;
            } else if c == '"' {
                state.in_string = false;
            }
            continue;
        }

        match c {
            '"' => state.in_string = true,
            '{' => {
                state.brace_depth += 1;
                state.started = true;
            }
            '}' => {
                state.brace_depth -= 1;
                if state.brace_depth < 0 {
                    state.valid = false;
                }
            }
            '[' => {
                state.bracket_depth += 1;
                state.started = true;
            }
            ']' => {
                state.bracket_depth -= 1;
                if state.bracket_depth < 0 {
                    state.valid = false;
                }
            }
            c if !state.started && !c.is_whitespace() => {
                // First non-whitespace char must open an object or array.
                state.valid = false;
            }
            _ => {}
        }
    }
    state
}

pub struct JsonConstraint;

impl OutputConstraint for JsonConstraint {
    fn token_allowed(&self, generated_so_far: &str, candidate_text: &str) -> bool {
        let combined = format!("{generated_so_far}{candidate_text}");
        scan(&combined).valid
    }

    fn complete(&self, generated_so_far: &str) -> bool {
        let state = scan(generated_so_far);
        state.valid && state.started && state.brace_depth == 0 && state.bracket_depth == 0 && !state.in_string
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_balanced_object() {
        let c = JsonConstraint;
        assert!(c.complete(r#"{"a": 1}"#));
    }

    #[test]
    fn rejects_closing_brace_with_no_opener() {
        let c = JsonConstraint;
        assert!(!c.token_allowed("", "}"));
    }

    #[test]
    fn incomplete_object_is_not_complete() {
        let c = JsonConstraint;
        assert!(!c.complete(r#"{"a": 1"#));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let c = JsonConstraint;
        assert!(c.complete(r#"{"a": "}{"}"#));
    }

    #[test]
    fn first_char_must_open_object_or_array() {
        let c = JsonConstraint;
        assert!(!c.token_allowed("", "x"));
    }
}
