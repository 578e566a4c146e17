//! # Filter-Aggregate Transpose Rule
//!
//! Pushes filter conjuncts below an aggregate when they only read grouping
//! keys. Filtering before aggregation shrinks the aggregate's input without
//! changing which groups survive.
//!
//! ```text
//! Before: Filter($0 = 'x' AND $1 > 10, Aggregate(group={2}, SUM($3), Input))
//! After:  Filter($1 > 10, Aggregate(group={2}, SUM($3), Filter($2 = 'x', Input)))
//! ```
//!
//! ## Column Mapping
//!
//! Aggregate output column `k` (for `k` below the group-key count) is input
//! column `group_set[k]`; pushed conjuncts are rewritten through that mapping.
//! Conjuncts reading any aggregate output stay above. When nothing can be
//! pushed the rule does not fire.

use relx_core::error::Result;
use relx_core::expr::Expr;
use relx_core::node::{OpClass, OpKind, Operator, RelNode};
use relx_core::operand::RuleOperand;
use relx_core::rule::{Rule, RuleCall};
use tracing::trace;

/// Filter(Aggregate) -> Filter?(Aggregate(Filter)).
pub struct FilterAggregateTransposeRule;

impl Rule for FilterAggregateTransposeRule {
    fn name(&self) -> &str {
        "FilterAggregateTransposeRule"
    }

    fn operand(&self) -> RuleOperand {
        RuleOperand::some(
            OpClass::Kind(OpKind::Filter),
            vec![RuleOperand::any(OpClass::Kind(OpKind::Aggregate))],
        )
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()> {
        let filter = call.rel(0).clone();
        let aggregate = call.rel(1).clone();
        let Operator::Filter { condition } = filter.op() else {
            return Ok(());
        };
        let Operator::Aggregate { group_set, .. } = aggregate.op() else {
            return Ok(());
        };

        let key_count = group_set.len();
        let (pushable, remaining): (Vec<&Expr>, Vec<&Expr>) = condition
            .conjuncts()
            .into_iter()
            .partition(|c| c.input_refs().iter().all(|i| *i < key_count));
        if pushable.is_empty() {
            return Ok(());
        }

        let pushed: Vec<Expr> = pushable
            .into_iter()
            .map(|c| c.map_inputs(&|i| group_set.get(i).copied().unwrap_or(i)))
            .collect();
        let Some(pushed) = Expr::and_all(pushed) else {
            return Ok(());
        };
        trace!("Pushing {} below {}", pushed, aggregate.op());

        let below = RelNode::filter(aggregate.input(0).clone(), pushed)?;
        let mut result = aggregate.copy(aggregate.traits().clone(), vec![below]);
        if let Some(rest) = Expr::and_all(remaining.into_iter().cloned().collect()) {
            result = RelNode::filter(result, rest)?;
        }
        call.transform_to(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{apply, emp};
    use relx_core::expr::{AggCall, AggFunc};

    fn sum_by_dept() -> relx_core::node::RelRef {
        // (deptno, total)
        RelNode::aggregate(emp(), vec![0], vec![AggCall::new(AggFunc::Sum, vec![1], "total")]).unwrap()
    }

    #[test]
    fn test_key_only_filter_moves_below() {
        let plan = RelNode::filter(sum_by_dept(), Expr::eq(Expr::col(0), Expr::int(10))).unwrap();
        let out = apply(&FilterAggregateTransposeRule, &plan);
        assert_eq!(out.len(), 1);
        let result = &out[0];
        assert_eq!(result.kind(), OpKind::Aggregate);
        assert_eq!(result.row_type(), plan.row_type());
        match result.input(0).op() {
            Operator::Filter { condition } => {
                assert_eq!(condition, &Expr::eq(Expr::col(0), Expr::int(10)))
            }
            other => panic!("expected a filter below, got {other}"),
        }
    }

    #[test]
    fn test_mixed_filter_is_split() {
        let condition = Expr::And(vec![
            Expr::eq(Expr::col(0), Expr::int(10)),
            Expr::gt(Expr::col(1), Expr::int(500)),
        ]);
        let plan = RelNode::filter(sum_by_dept(), condition).unwrap();
        let out = apply(&FilterAggregateTransposeRule, &plan);
        let result = &out[0];
        match result.op() {
            Operator::Filter { condition } => {
                assert_eq!(condition, &Expr::gt(Expr::col(1), Expr::int(500)))
            }
            other => panic!("expected the remaining filter on top, got {other}"),
        }
        assert_eq!(result.input(0).kind(), OpKind::Aggregate);
        assert_eq!(result.input(0).input(0).kind(), OpKind::Filter);
    }

    #[test]
    fn test_group_keys_are_remapped() {
        // group by sal: output $0 is input $1
        let agg = RelNode::aggregate(emp(), vec![1], vec![AggCall::count_star("c")]).unwrap();
        let plan = RelNode::filter(agg, Expr::gt(Expr::col(0), Expr::int(100))).unwrap();
        let out = apply(&FilterAggregateTransposeRule, &plan);
        match out[0].input(0).op() {
            Operator::Filter { condition } => {
                assert_eq!(condition, &Expr::gt(Expr::col(1), Expr::int(100)))
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_aggregate_only_filter_does_not_fire() {
        let plan = RelNode::filter(sum_by_dept(), Expr::gt(Expr::col(1), Expr::int(500))).unwrap();
        assert!(apply(&FilterAggregateTransposeRule, &plan).is_empty());
    }
}
