//! Output-constraint enforcers: each checks whether generated text so far
//! could still lead to a valid document of its kind, and whether it already
//! is one.

pub mod json_constraint;
pub mod regex_constraint;
pub mod sql_constraint;
pub mod xml_constraint;

pub use json_constraint::JsonConstraint;
pub use regex_constraint::RegexConstraint;
pub use sql_constraint::SqlConstraint;
pub use xml_constraint::XmlConstraint;

/// Common contract all four enforcers implement.
pub trait OutputConstraint {
    /// Prefix admissibility: could `generated_so_far + candidate_text` still
    /// lead to a valid document?
    fn token_allowed(&self, generated_so_far: &str, candidate_text: &str) -> bool;

    /// Terminal validity: is `generated_so_far` itself a complete, valid
    /// document?
    fn complete(&self, generated_so_far: &str) -> bool;
}
