//! Sentinel IAM condition classification.
//!
//! Eligibility markers are pseudo-expressions that the platform always
//! evaluates as CONDITIONAL; they are matched byte-for-byte after trimming,
//! never parsed. Activated grants carry a reserved title and a closed
//! timestamp window.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use elevara_core::{AppError, AppResult};

use crate::ActivationType;

/// Marker expression for a JIT-eligible binding.
pub const JIT_MARKER_EXPRESSION: &str = "has({}.jitAccessConstraint)";

/// Marker expression for an MPA-eligible binding.
pub const MPA_MARKER_EXPRESSION: &str = "has({}.multiPartyApprovalConstraint)";

/// Reserved title distinguishing activated temporary grants.
pub const ACTIVATED_CONDITION_TITLE: &str = "JIT access activation";

static TEMPORARY_WINDOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\(request\.time >= timestamp\("([^"]+)"\) && request\.time < timestamp\("([^"]+)"\)\)$"#,
    )
    .unwrap_or_else(|_| unreachable!())
});

/// An IAM condition attached to a binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IamCondition {
    /// Condition title; `JIT access activation` marks a temporary grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Free-form description recorded at activation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// CEL expression text.
    pub expression: String,
}

impl IamCondition {
    /// Creates a bare condition from an expression.
    #[must_use]
    pub fn from_expression(expression: impl Into<String>) -> Self {
        Self {
            title: None,
            description: None,
            expression: expression.into(),
        }
    }
}

fn matches_marker(condition: Option<&IamCondition>, marker: &str) -> bool {
    // Exact textual match after trim; any extra conjunct disqualifies.
    condition.is_some_and(|condition| condition.expression.trim() == marker)
}

/// Returns whether the condition marks a binding as JIT-eligible.
#[must_use]
pub fn is_jit_marker(condition: Option<&IamCondition>) -> bool {
    matches_marker(condition, JIT_MARKER_EXPRESSION)
}

/// Returns whether the condition marks a binding as MPA-eligible.
#[must_use]
pub fn is_mpa_marker(condition: Option<&IamCondition>) -> bool {
    matches_marker(condition, MPA_MARKER_EXPRESSION)
}

/// Returns whether the condition marks eligibility for the given type.
#[must_use]
pub fn is_approval_marker(condition: Option<&IamCondition>, activation_type: ActivationType) -> bool {
    match activation_type {
        ActivationType::Jit => is_jit_marker(condition),
        ActivationType::Mpa => is_mpa_marker(condition),
    }
}

/// Returns whether the condition denotes an activated temporary grant.
///
/// The reserved title alone is authoritative; the expression is validated
/// separately when the grant's current validity matters.
#[must_use]
pub fn is_activated(condition: Option<&IamCondition>) -> bool {
    condition.is_some_and(|condition| {
        condition
            .title
            .as_deref()
            .is_some_and(|title| title.eq_ignore_ascii_case(ACTIVATED_CONDITION_TITLE))
    })
}

/// Produces the condition for a temporary grant covering `[start, start + duration)`.
///
/// Timestamps are UTC ISO-8601, truncated to seconds.
#[must_use]
pub fn temporary_condition(start: DateTime<Utc>, duration: Duration) -> IamCondition {
    let end = start + duration;
    IamCondition {
        title: Some(ACTIVATED_CONDITION_TITLE.to_owned()),
        description: None,
        expression: format!(
            "(request.time >= timestamp(\"{}\") && request.time < timestamp(\"{}\"))",
            format_timestamp(start),
            format_timestamp(end)
        ),
    }
}

/// Evaluates a temporary-grant expression at the given instant.
///
/// Returns `start <= now < end`; fails when the expression does not have the
/// exact shape produced by [`temporary_condition`].
pub fn evaluate_temporary_condition(expression: &str, now: DateTime<Utc>) -> AppResult<bool> {
    let captures = TEMPORARY_WINDOW
        .captures(expression.trim())
        .ok_or_else(|| {
            AppError::InvalidArgument(format!(
                "'{expression}' is not a temporary access condition"
            ))
        })?;

    let start = parse_timestamp(&captures[1])?;
    let end = parse_timestamp(&captures[2])?;

    Ok(start <= now && now < end)
}

fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(text: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|error| {
            AppError::InvalidArgument(format!("invalid condition timestamp '{text}': {error}"))
        })
}
