//! # Relational Metadata
//!
//! Rules and the cost model ask questions about nodes they did not build:
//! how many rows an input produces, whether a column set is a key. Answers
//! depend on where the node lives. A standalone tree is answered by recursing
//! into concrete inputs; inside the equivalence-set engine an input is a set
//! reference and the answer comes from the set.
//!
//! `MetadataQuery` is that seam. Each engine supplies its own implementation;
//! the estimation formulas below are shared.
//!
//! ## Selectivity Estimation
//!
//! - **Equality**: 0.1 (no column statistics are tracked).
//! - **Inequality**: 0.9.
//! - **Range**: fixed 1/3 heuristic.
//! - **AND**: product of conjunct selectivities (independence).
//! - **OR**: inclusion-exclusion over the disjuncts.

use crate::cost::CostModel;
use crate::expr::{BinaryOp, Expr, ScalarValue, UnaryOp};
use crate::node::{Operator, RelNode};
use std::collections::BTreeSet;

/// Metadata questions asked by rules and the cost model.
pub trait MetadataQuery {
    /// Estimated output cardinality.
    fn row_count(&self, node: &RelNode) -> f64;

    /// `Some(true)` if the output columns form a unique key, `Some(false)` if
    /// known not to, `None` when unknown.
    fn are_columns_unique(&self, node: &RelNode, columns: &[usize]) -> Option<bool>;
}

/// Metadata over standalone trees: every input is a concrete node.
pub struct TreeMetadata<'a> {
    model: &'a dyn CostModel,
}

impl<'a> TreeMetadata<'a> {
    pub fn new(model: &'a dyn CostModel) -> Self {
        Self { model }
    }
}

impl MetadataQuery for TreeMetadata<'_> {
    fn row_count(&self, node: &RelNode) -> f64 {
        self.model.row_count(node, self)
    }

    fn are_columns_unique(&self, node: &RelNode, columns: &[usize]) -> Option<bool> {
        unique_columns(node, columns, self)
    }
}

/// Key derivation shared by all metadata providers. Inputs are asked through
/// `mq`, so set references resolve the way the caller's engine wants.
pub fn unique_columns(node: &RelNode, columns: &[usize], mq: &dyn MetadataQuery) -> Option<bool> {
    match node.op() {
        Operator::Aggregate { group_set, .. } => {
            // Output columns 0..group_set.len() are the grouping keys.
            let wanted: BTreeSet<usize> = columns.iter().copied().collect();
            Some((0..group_set.len()).all(|k| wanted.contains(&k)))
        }
        Operator::Filter { .. } | Operator::Sort { .. } | Operator::Converter { .. } => {
            mq.are_columns_unique(node.inputs().first()?, columns)
        }
        Operator::Project { exprs, .. } => {
            let mut mapped = Vec::with_capacity(columns.len());
            for c in columns {
                match exprs.get(*c)? {
                    Expr::InputRef(i) => mapped.push(*i),
                    _ => return None,
                }
            }
            mq.are_columns_unique(node.inputs().first()?, &mapped)
        }
        Operator::Union { all: false } | Operator::Intersect { all: false } => {
            let arity = node.row_type().arity();
            let wanted: BTreeSet<usize> = columns.iter().copied().collect();
            if (0..arity).all(|k| wanted.contains(&k)) {
                Some(true)
            } else {
                None
            }
        }
        _ => None,
    }
}

pub const DEFAULT_FILTER_SELECTIVITY: f64 = 0.1;
pub const EQUALITY_SELECTIVITY: f64 = 0.1;
pub const RANGE_SELECTIVITY: f64 = 0.33;

/// Estimated fraction of rows satisfying `predicate`.
pub fn selectivity(predicate: &Expr) -> f64 {
    let sel = match predicate {
        Expr::Literal(ScalarValue::Bool(true)) => 1.0,
        Expr::Literal(ScalarValue::Bool(false)) | Expr::Literal(ScalarValue::Null) => 0.0,
        Expr::BinaryOp { op, .. } => match op {
            BinaryOp::Eq => EQUALITY_SELECTIVITY,
            BinaryOp::NotEq => 1.0 - EQUALITY_SELECTIVITY,
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => RANGE_SELECTIVITY,
            _ => DEFAULT_FILTER_SELECTIVITY,
        },
        Expr::UnaryOp {
            op: UnaryOp::Not,
            operand,
        } => 1.0 - selectivity(operand),
        Expr::UnaryOp {
            op: UnaryOp::IsNotNull,
            ..
        } => 1.0 - DEFAULT_FILTER_SELECTIVITY,
        Expr::And(conjuncts) => conjuncts.iter().map(selectivity).product(),
        Expr::Or(disjuncts) => disjuncts
            .iter()
            .map(selectivity)
            .fold(0.0, |acc, s| acc + s - acc * s),
        _ => DEFAULT_FILTER_SELECTIVITY,
    };
    sel.clamp(0.0, 1.0)
}
