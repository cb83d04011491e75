//! Syntax pre-validation
//!
//! Cheap textual checks that reject submissions which cannot possibly
//! compile or run, before a workspace is allocated. Anything subtler is
//! left to the compiler so its diagnostic reaches the caller.

use codegrade_common::types::{Language, SyntaxReport};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref C_MAIN: Regex = Regex::new(r"\bmain\s*\(").expect("valid regex");
    static ref JAVA_CLASS: Regex = Regex::new(r"\bclass\s+[A-Za-z_$]").expect("valid regex");
}

pub fn validate(code: &str, language: Language, max_source_bytes: usize) -> SyntaxReport {
    let mut errors = Vec::new();

    if code.trim().is_empty() {
        errors.push("source code is empty".to_string());
        return SyntaxReport::from_errors(errors);
    }

    if code.len() > max_source_bytes {
        errors.push(format!(
            "source code is {} bytes, limit is {} bytes",
            code.len(),
            max_source_bytes
        ));
    }

    match language {
        Language::C | Language::Cpp => {
            if !C_MAIN.is_match(code) {
                errors.push("missing main function".to_string());
            }
        }
        Language::Java => {
            if !JAVA_CLASS.is_match(code) {
                errors.push("missing class declaration".to_string());
            }
        }
        Language::Python => {}
    }

    SyntaxReport::from_errors(errors)
}
