//! Rule well-formedness checks (spec §3 "validation"): required fields,
//! schedule invariants, output field checks and template syntax, and
//! topic wildcard syntax. Returns a [`ValidationResult`] with errors
//! (block save) and warnings (advisory) — the same shape a caller gets
//! back from `AddRule`/`UpdateRule`.

mod output_checks;
mod schedule_checks;
mod topic_checks;

use serde::{Deserialize, Serialize};

use re_core::rule::Rule;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate a rule before it is persisted (spec §3). Errors block the
/// save; warnings are advisory only.
pub fn validate_rule(rule: &Rule) -> ValidationResult {
    let mut result = ValidationResult::new();
    output_checks::validate(rule, &mut result);
    schedule_checks::validate(rule, &mut result);
    topic_checks::validate(rule, &mut result);
    result
}
