//! # Filter Into Join Rule
//!
//! Merges a filter sitting on an inner join into the join condition.
//!
//! ```text
//! Before: Filter(pred, Join(A, B, cond))
//! After:  Join(A, B, cond AND pred)
//! ```
//!
//! For an inner join the two forms produce the same rows; the merged form lets
//! the join evaluate the predicate while matching instead of in a separate
//! pass. Outer, semi and anti joins are left alone: moving a predicate into
//! their condition changes which rows are null-extended or kept.
//!
//! A `TRUE` join condition is dropped rather than conjoined, so a cross join
//! under a filter becomes a plain inner join on the filter's predicate.

use relx_core::error::Result;
use relx_core::expr::{Expr, JoinType};
use relx_core::node::{OpClass, OpKind, Operator, RelNode};
use relx_core::operand::RuleOperand;
use relx_core::rule::{Rule, RuleCall};

/// Filter(Join) -> Join with the filter predicate merged into its condition.
pub struct FilterIntoJoinRule;

impl Rule for FilterIntoJoinRule {
    fn name(&self) -> &str {
        "FilterIntoJoinRule"
    }

    fn operand(&self) -> RuleOperand {
        RuleOperand::some(
            OpClass::Kind(OpKind::Filter),
            vec![RuleOperand::any(OpClass::Kind(OpKind::Join)).with_predicate(|n| {
                matches!(
                    n.op(),
                    Operator::Join {
                        join_type: JoinType::Inner,
                        ..
                    }
                )
            })],
        )
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()> {
        let filter = call.rel(0).clone();
        let join = call.rel(1).clone();
        let Operator::Filter { condition: predicate } = filter.op() else {
            return Ok(());
        };
        let Operator::Join { condition, .. } = join.op() else {
            return Ok(());
        };

        let mut parts = Vec::with_capacity(2);
        if !condition.is_true_literal() {
            parts.push(condition.clone());
        }
        parts.push(predicate.clone());
        let Some(merged) = Expr::and_all(parts) else {
            return Ok(());
        };

        let pushed = RelNode::join(
            join.input(0).clone(),
            join.input(1).clone(),
            JoinType::Inner,
            merged,
        )?;
        call.transform_to(pushed)
    }
}
