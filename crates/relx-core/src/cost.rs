//! # Cost Model
//!
//! This module defines the cost abstraction and the default cost oracle used by
//! both planning engines.
//!
//! ## Multi-Dimensional Cost
//!
//! A `Cost` tracks three components: the number of rows produced, CPU work and
//! I/O work. Components stay separate so that arithmetic (`plus`, `minus`,
//! `multiply_by`, `divide_by`) is meaningful per dimension. Comparison collapses
//! them into a single scalar, the component sum:
//!
//! ```text
//! value = rows + cpu + io
//! ```
//!
//! An infinite cost is a distinct marker rather than a large number: it is
//! greater than every finite cost, only equal to another infinite cost, and
//! absorbs addition. Plans that are not implementable (anything still in the
//! `NONE` convention) cost infinite, which keeps them from ever winning.
//!
//! ## Cost Accumulation
//!
//! Costs are additive: the cumulative cost of a plan is the operator's self
//! cost (from the `CostModel`) plus the best cumulative costs of its inputs.
//! The equivalence-set engine accumulates bottom-up as alternatives appear.
//!
//! ## Pluggable Design
//!
//! `CostFactory` builds the distinguished costs (zero, tiny, huge, infinite)
//! and `CostModel` answers row count and self cost for a node. Both are traits
//! so deployments can swap in their own estimates.

use crate::metadata::{selectivity, MetadataQuery};
use crate::node::{Operator, RelNode};
use crate::traits::{Convention, TraitDef};
use crate::expr::JoinType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Relative tolerance used for cost equality.
pub const COST_EPSILON: f64 = 1.0e-5;

/// Estimated expense of a plan or operator. Lower is better.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost {
    pub rows: f64,
    pub cpu: f64,
    pub io: f64,
    #[serde(default)]
    pub infinite: bool,
}

impl Cost {
    pub fn new(rows: f64, cpu: f64, io: f64) -> Self {
        Self {
            rows,
            cpu,
            io,
            infinite: false,
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Smallest positive cost, used to make otherwise free operators
    /// strictly more expensive than doing nothing.
    pub fn tiny() -> Self {
        Self::new(1.0, 1.0, 0.0)
    }

    pub fn huge() -> Self {
        Self::new(1.0e100, 1.0e100, 1.0e100)
    }

    pub fn infinite() -> Self {
        Self {
            rows: f64::INFINITY,
            cpu: f64::INFINITY,
            io: f64::INFINITY,
            infinite: true,
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite
    }

    /// Scalar used for ordering.
    pub fn value(&self) -> f64 {
        if self.infinite {
            f64::INFINITY
        } else {
            self.rows + self.cpu + self.io
        }
    }

    pub fn plus(&self, other: &Cost) -> Cost {
        if self.infinite || other.infinite {
            return Cost::infinite();
        }
        Cost::new(
            self.rows + other.rows,
            self.cpu + other.cpu,
            self.io + other.io,
        )
    }

    pub fn minus(&self, other: &Cost) -> Cost {
        if self.infinite {
            return *self;
        }
        Cost::new(
            self.rows - other.rows,
            self.cpu - other.cpu,
            self.io - other.io,
        )
    }

    pub fn multiply_by(&self, factor: f64) -> Cost {
        if self.infinite {
            return *self;
        }
        Cost::new(self.rows * factor, self.cpu * factor, self.io * factor)
    }

    /// Geometric mean of the per-component ratios, skipping components that
    /// are zero or infinite on either side. Returns 1.0 when nothing is
    /// comparable.
    pub fn divide_by(&self, other: &Cost) -> f64 {
        let mut product = 1.0;
        let mut n = 0u32;
        for (a, b) in [
            (self.rows, other.rows),
            (self.cpu, other.cpu),
            (self.io, other.io),
        ] {
            if a != 0.0 && a.is_finite() && b != 0.0 && b.is_finite() {
                product *= a / b;
                n += 1;
            }
        }
        if n == 0 {
            return 1.0;
        }
        product.powf(1.0 / f64::from(n))
    }

    /// Equality on the ordering scalar, within a relative tolerance. Costs
    /// that differ only in how the sum is split across components are equal.
    pub fn is_eq_with_epsilon(&self, other: &Cost) -> bool {
        if self.infinite || other.infinite {
            return self.infinite && other.infinite;
        }
        close(self.value(), other.value())
    }

    pub fn is_le(&self, other: &Cost) -> bool {
        if self.infinite {
            return other.infinite;
        }
        other.infinite || self.value() <= other.value() || self.is_eq_with_epsilon(other)
    }

    pub fn is_lt(&self, other: &Cost) -> bool {
        self.is_le(other) && !self.is_eq_with_epsilon(other)
    }
}

fn close(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= COST_EPSILON * scale
}

/// Epsilon-based equality to handle floating-point imprecision in cost comparisons.
impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        self.is_eq_with_epsilon(other)
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.is_eq_with_epsilon(other) {
            Some(Ordering::Equal)
        } else if self.is_lt(other) {
            Some(Ordering::Less)
        } else {
            Some(Ordering::Greater)
        }
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.infinite {
            return f.write_str("{inf}");
        }
        write!(
            f,
            "{{{} rows, {} cpu, {} io}}",
            self.rows, self.cpu, self.io
        )
    }
}

/// Builds the distinguished cost values.
pub trait CostFactory: Send + Sync {
    fn make_cost(&self, rows: f64, cpu: f64, io: f64) -> Cost {
        Cost::new(rows, cpu, io)
    }
    fn make_zero_cost(&self) -> Cost;
    fn make_tiny_cost(&self) -> Cost;
    fn make_huge_cost(&self) -> Cost;
    fn make_infinite_cost(&self) -> Cost;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCostFactory;

impl CostFactory for DefaultCostFactory {
    fn make_zero_cost(&self) -> Cost {
        Cost::zero()
    }

    fn make_tiny_cost(&self) -> Cost {
        Cost::tiny()
    }

    fn make_huge_cost(&self) -> Cost {
        Cost::huge()
    }

    fn make_infinite_cost(&self) -> Cost {
        Cost::infinite()
    }
}

/// Trait for pluggable cost models.
///
/// `row_count` and `self_cost` are asked of one node at a time; input
/// estimates come from the `MetadataQuery`, which knows whether the inputs are
/// concrete nodes or equivalence-set references.
pub trait CostModel: Send + Sync {
    fn factory(&self) -> &dyn CostFactory;

    /// Estimated output cardinality of `node`.
    fn row_count(&self, node: &RelNode, mq: &dyn MetadataQuery) -> f64;

    /// Cost of `node` alone, excluding its inputs.
    fn self_cost(&self, node: &RelNode, mq: &dyn MetadataQuery) -> Cost;
}

/// Default cost model.
///
/// Each operator's self cost is derived from the row counts it reads and
/// produces, scaled by per-dimension weights:
/// - **CPU**: rows processed, comparisons for sorts, per-expression work.
/// - **I/O**: rows read from storage by scans.
/// - **Network**: rows moved by distribution converters, charged as I/O.
///
/// The network weight defaults to 10x the others, reflecting that data
/// shuffling dominates cost in distributed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultCostModel {
    pub cpu_weight: f64,
    pub io_weight: f64,
    pub network_weight: f64,
    #[serde(skip)]
    factory: DefaultCostFactory,
}

impl Default for DefaultCostModel {
    fn default() -> Self {
        Self {
            cpu_weight: 1.0,
            io_weight: 1.0,
            network_weight: 10.0,
            factory: DefaultCostFactory,
        }
    }
}

fn input_rows(node: &RelNode, mq: &dyn MetadataQuery, i: usize) -> f64 {
    node.inputs().get(i).map(|n| mq.row_count(n)).unwrap_or(1.0)
}

fn n_log_n(rows: f64) -> f64 {
    if rows > 1.0 {
        rows * rows.log2()
    } else {
        1.0
    }
}

impl CostModel for DefaultCostModel {
    fn factory(&self) -> &dyn CostFactory {
        &self.factory
    }

    fn row_count(&self, node: &RelNode, mq: &dyn MetadataQuery) -> f64 {
        let rows = match node.op() {
            Operator::Scan { rows, .. } => *rows,
            Operator::Filter { condition } => input_rows(node, mq, 0) * selectivity(condition),
            Operator::Project { .. } | Operator::Converter { .. } => input_rows(node, mq, 0),
            Operator::Aggregate { group_set, .. } => {
                let input = input_rows(node, mq, 0);
                if group_set.is_empty() {
                    1.0
                } else {
                    (input / 10.0).max(1.0).min(input)
                }
            }
            Operator::Join {
                join_type,
                condition,
            } => {
                let left = input_rows(node, mq, 0);
                let right = input_rows(node, mq, 1);
                let sel = selectivity(condition);
                let inner = left * right * sel;
                match join_type {
                    JoinType::Inner => inner,
                    JoinType::Left => inner.max(left),
                    JoinType::Right => inner.max(right),
                    JoinType::Full => inner.max(left + right),
                    JoinType::Semi => left * sel,
                    JoinType::Anti => left * (1.0 - sel),
                }
            }
            Operator::Sort { offset, fetch, .. } => {
                let input = input_rows(node, mq, 0);
                let after_offset = (input - *offset as f64).max(0.0);
                match fetch {
                    Some(n) => after_offset.min(*n as f64),
                    None => after_offset,
                }
            }
            Operator::Union { all } => {
                let sum: f64 = node.inputs().iter().map(|i| mq.row_count(i)).sum();
                if *all {
                    sum
                } else {
                    sum * 0.5
                }
            }
            Operator::Intersect { .. } => node
                .inputs()
                .iter()
                .map(|i| mq.row_count(i))
                .fold(f64::INFINITY, f64::min),
            // Sets are answered by the metadata query itself.
            Operator::Subset { .. } => 1.0,
        };
        if rows.is_finite() {
            rows.max(0.0)
        } else {
            1.0
        }
    }

    fn self_cost(&self, node: &RelNode, mq: &dyn MetadataQuery) -> Cost {
        if node.traits().convention() == Convention::None {
            return self.factory.make_infinite_cost();
        }
        let rows = mq.row_count(node);
        match node.op() {
            Operator::Scan { .. } => Cost::new(rows, rows * self.cpu_weight, rows * self.io_weight),
            Operator::Filter { .. } => {
                Cost::new(rows, input_rows(node, mq, 0) * self.cpu_weight, 0.0)
            }
            Operator::Project { exprs, .. } => {
                let work = input_rows(node, mq, 0) * exprs.len().max(1) as f64;
                Cost::new(rows, work * self.cpu_weight, 0.0)
            }
            Operator::Join { .. } => {
                let work = input_rows(node, mq, 0) + input_rows(node, mq, 1);
                Cost::new(rows, work * self.cpu_weight, 0.0)
            }
            Operator::Aggregate { calls, .. } => {
                let work = input_rows(node, mq, 0) * (1 + calls.len()) as f64;
                Cost::new(rows, work * self.cpu_weight, 0.0)
            }
            Operator::Sort { .. } => {
                Cost::new(rows, n_log_n(input_rows(node, mq, 0)) * self.cpu_weight, 0.0)
            }
            Operator::Union { .. } => Cost::new(rows, 0.0, 0.0),
            Operator::Intersect { .. } => {
                let work: f64 = node.inputs().iter().map(|i| mq.row_count(i)).sum();
                Cost::new(rows, work * self.cpu_weight, 0.0)
            }
            Operator::Converter { trait_def } => {
                let input_convention = node
                    .inputs()
                    .first()
                    .map(|i| i.traits().convention())
                    .unwrap_or(Convention::None);
                if input_convention == Convention::None {
                    return self.factory.make_infinite_cost();
                }
                let base = match trait_def {
                    TraitDef::Collation => Cost::new(rows, n_log_n(rows) * self.cpu_weight, 0.0),
                    TraitDef::Distribution => Cost::new(rows, 0.0, rows * self.network_weight),
                    TraitDef::Convention => Cost::new(rows, rows * self.cpu_weight, 0.0),
                };
                base.plus(&self.factory.make_tiny_cost())
            }
            Operator::Subset { .. } => self.factory.make_zero_cost(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{DataType, Expr, Field, RowType, TableRef};
    use crate::metadata::TreeMetadata;
    use crate::node::RelNode;
    use crate::traits::{Collation, FieldCollation, RelTrait, TraitInterner, TraitSet};
    use std::sync::Arc;

    fn scan(interner: &Arc<TraitInterner>, convention: Convention, rows: f64) -> crate::node::RelRef {
        let traits = TraitSet::standard(interner).replace(RelTrait::Convention(convention));
        let row_type = RowType::new(vec![Field::new("a", DataType::Int64)]);
        RelNode::scan(TableRef::new("s", "t"), row_type, rows, traits)
    }

    #[test]
    fn test_infinite_absorbs_and_dominates() {
        let inf = Cost::infinite();
        let big = Cost::huge();
        assert!(inf.plus(&Cost::tiny()).is_infinite());
        assert!(big.is_lt(&inf));
        assert!(!inf.is_le(&big));
        assert!(inf.is_eq_with_epsilon(&Cost::infinite()));
        assert!(!inf.is_eq_with_epsilon(&big));
    }

    #[test]
    fn test_equal_sums_tie_regardless_of_split() {
        let a = Cost::new(1.0, 0.0, 0.0);
        let b = Cost::new(0.0, 1.0, 0.0);
        assert!(a.is_eq_with_epsilon(&b));
        assert!(!a.is_lt(&b));
        assert!(!b.is_lt(&a));
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Equal));
        assert_eq!(b.partial_cmp(&a), Some(Ordering::Equal));
    }

    #[test]
    fn test_divide_by_is_geometric_mean() {
        let a = Cost::new(10.0, 40.0, 0.0);
        let b = Cost::new(5.0, 10.0, 0.0);
        // sqrt(2 * 4)
        assert!((a.divide_by(&b) - 8f64.sqrt()).abs() < 1e-9);
        assert_eq!(Cost::zero().divide_by(&b), 1.0);
    }

    #[test]
    fn test_none_convention_is_infinite() {
        let interner = TraitInterner::new();
        let model = DefaultCostModel::default();
        let mq = TreeMetadata::new(&model);
        let logical = scan(&interner, Convention::None, 100.0);
        let physical = scan(&interner, Convention::Physical, 100.0);
        assert!(model.self_cost(&logical, &mq).is_infinite());
        assert!(!model.self_cost(&physical, &mq).is_infinite());
    }

    #[test]
    fn test_filter_row_count_uses_selectivity() {
        let interner = TraitInterner::new();
        let model = DefaultCostModel::default();
        let mq = TreeMetadata::new(&model);
        let input = scan(&interner, Convention::Physical, 1000.0);
        let filter = RelNode::filter(input, Expr::eq(Expr::col(0), Expr::int(1))).unwrap();
        assert!((model.row_count(&filter, &mq) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_sort_converter_costs_more_than_tiny() {
        let interner = TraitInterner::new();
        let model = DefaultCostModel::default();
        let mq = TreeMetadata::new(&model);
        let input = scan(&interner, Convention::Physical, 1000.0);
        let sorted = RelNode::converter(
            input,
            RelTrait::Collation(Collation::of(vec![FieldCollation::asc(0)])),
        )
        .unwrap();
        let cost = model.self_cost(&sorted, &mq);
        assert!(Cost::tiny().is_lt(&cost));
    }
}
