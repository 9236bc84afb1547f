//! # Error Taxonomy
//!
//! Every failure the reconciliation engine can hit, grouped by how it is handled:
//!
//! * [`TemplateError`]: the target is skipped for this pass and retried on the next one.
//! * [`InclusionEvaluationError`]: the target is conservatively treated as **excluded**.
//! * [`MutationError`]: retried with backoff, then surfaced on the target.
//! * [`ConfigValidationError`]: fatal, the process must not start with an invalid policy.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("malformed template '{template}' at byte {position}: {reason}")]
    Malformed {
        template: String,
        position: usize,
        reason: String,
    },

    #[error("template '{template}' references undefined field '.{field}'")]
    UndefinedField { template: String, field: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InclusionEvaluationError {
    #[error("marker '{key}' on {scope} has non-boolean value '{value}'")]
    InvalidValue {
        scope: String,
        key: String,
        value: String,
    },

    #[error("markers on {scope} contradict each other (enabled={enabled}, ignore={ignore})")]
    Contradictory {
        scope: String,
        enabled: bool,
        ignore: bool,
    },
}

/// Failure reported by the cluster client collaborator for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Network hiccup, throttling, leader change... worth another attempt.
    #[error("transient cluster error: {0}")]
    Transient(String),

    #[error("scan job '{0}' already exists")]
    Conflict(String),

    #[error("scan job '{0}' not found")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    List,
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb: &str = match self {
            MutationKind::List => "list",
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        };
        f.write_str(verb)
    }
}

/// A cluster call that still failed after the bounded retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("{kind} of '{job}' failed after {attempts} attempt(s): {source}")]
    Failed {
        kind: MutationKind,
        job: String,
        attempts: u32,
        #[source]
        source: ClientError,
    },

    #[error("{kind} of '{job}' timed out after {attempts} attempt(s) of {timeout:?}")]
    TimedOut {
        kind: MutationKind,
        job: String,
        attempts: u32,
        timeout: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationProblem {
    pub field: String,
    pub reason: String,
}

impl ValidationProblem {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("failed to read policy file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy document: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("invalid policy: {}", join_problems(.0))]
    Invalid(Vec<ValidationProblem>),
}

impl ConfigValidationError {
    /// Individual violations, empty for I/O and parse failures.
    pub fn problems(&self) -> &[ValidationProblem] {
        match self {
            ConfigValidationError::Invalid(problems) => problems,
            _ => &[],
        }
    }
}

fn join_problems(problems: &[ValidationProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<String>>()
        .join("; ")
}
