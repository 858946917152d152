use regex::Regex;

use elevara_core::{AppError, AppResult, UserId};

/// Validates caller-supplied justifications against a configured pattern.
#[derive(Debug, Clone)]
pub struct RegexJustificationPolicy {
    pattern: Regex,
    hint: String,
}

impl RegexJustificationPolicy {
    /// Creates a policy from a regular expression and a human-readable hint
    /// shown to callers, e.g. "provide a ticket number".
    pub fn new(pattern: &str, hint: impl Into<String>) -> AppResult<Self> {
        let pattern = Regex::new(pattern).map_err(|error| {
            AppError::InvalidArgument(format!("invalid justification pattern: {error}"))
        })?;

        Ok(Self {
            pattern,
            hint: hint.into(),
        })
    }

    /// Checks a justification for a user.
    pub fn check(&self, justification: &str, user: &UserId) -> AppResult<()> {
        if justification.trim().is_empty() || !self.pattern.is_match(justification) {
            return Err(AppError::InvalidArgument(format!(
                "justification of '{user}' does not meet criteria: {}",
                self.hint
            )));
        }

        Ok(())
    }

    /// Returns the hint describing an acceptable justification.
    #[must_use]
    pub fn hint(&self) -> &str {
        &self.hint
    }
}
