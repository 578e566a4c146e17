use crate::node::SetId;
use thiserror::Error;

/// Errors surfaced by node construction, rules and both planning engines.
#[derive(Debug, Clone, Error)]
pub enum PlannerError {
    #[error("no implementable plan satisfies traits {traits}")]
    NoPlan { traits: String },

    #[error("rule '{rule}' produced row type {actual}, expected {expected}")]
    RowTypeMismatch {
        rule: String,
        expected: String,
        actual: String,
    },

    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    #[error("invalid program: {0}")]
    InvalidProgram(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("unknown table {0}")]
    UnknownTable(String),

    #[error("winner cycle while extracting set {0}")]
    CyclicPlan(SetId),

    #[error("rule '{rule}' failed: {reason}")]
    RuleFailed { rule: String, reason: String },
}

pub type Result<T> = std::result::Result<T, PlannerError>;
