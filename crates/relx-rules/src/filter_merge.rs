//! # Filter Merge Rule
//!
//! Collapses two stacked filters into one whose condition is the conjunction
//! of both, lower condition first.
//!
//! ```text
//! Before: Filter(b, Filter(a, Input))
//! After:  Filter(a AND b, Input)
//! ```

use relx_core::error::Result;
use relx_core::expr::Expr;
use relx_core::node::{OpClass, OpKind, Operator, RelNode};
use relx_core::operand::RuleOperand;
use relx_core::rule::{Rule, RuleCall};

pub struct FilterMergeRule;

impl Rule for FilterMergeRule {
    fn name(&self) -> &str {
        "FilterMergeRule"
    }

    fn operand(&self) -> RuleOperand {
        RuleOperand::some(
            OpClass::Kind(OpKind::Filter),
            vec![RuleOperand::any(OpClass::Kind(OpKind::Filter))],
        )
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()> {
        let top = call.rel(0).clone();
        let bottom = call.rel(1).clone();
        let (Operator::Filter { condition: upper }, Operator::Filter { condition: lower }) =
            (top.op(), bottom.op())
        else {
            return Ok(());
        };
        let Some(merged) = Expr::and_all(vec![lower.clone(), upper.clone()]) else {
            return Ok(());
        };
        call.transform_to(RelNode::filter(bottom.input(0).clone(), merged)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{apply, emp};

    #[test]
    fn test_merges_lower_condition_first() {
        let lower = Expr::gt(Expr::col(1), Expr::int(100));
        let upper = Expr::eq(Expr::col(0), Expr::int(10));
        let plan = RelNode::filter(RelNode::filter(emp(), lower.clone()).unwrap(), upper.clone()).unwrap();
        let out = apply(&FilterMergeRule, &plan);
        assert_eq!(out.len(), 1);
        match out[0].op() {
            Operator::Filter { condition } => {
                assert_eq!(condition.conjuncts(), vec![&lower, &upper]);
            }
            other => panic!("unexpected {other}"),
        }
        assert_eq!(out[0].input(0).kind(), OpKind::Scan);
    }

    #[test]
    fn test_single_filter_does_not_match() {
        let plan = RelNode::filter(emp(), Expr::boolean(true)).unwrap();
        assert!(apply(&FilterMergeRule, &plan).is_empty());
    }
}
