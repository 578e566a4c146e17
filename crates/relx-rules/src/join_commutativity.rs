//! # Join Commute Rule
//!
//! Implements `A JOIN B = B JOIN A` for inner joins.
//!
//! ## Why Commutativity Matters
//!
//! Input order decides which side a hash join builds on and which side a
//! nested loop scans repeatedly. Registering both orientations lets the cost
//! model pick the cheaper one.
//!
//! ## Column Order
//!
//! The swapped join emits `B`'s columns first. The condition is remapped to
//! the new positions and a projection on top restores the original column
//! order and names, so the alternative has the same row type as the join it
//! replaces.
//!
//! ```text
//! Before: Join(A, B, $0 = $3)            -- A has 3 columns, B has 2
//! After:  Project($2, $3, $4, $0, $1, Join(B, A, $2 = $0))
//! ```
//!
//! Outer, semi and anti joins have fixed left/right semantics and are not
//! commuted.

use relx_core::error::Result;
use relx_core::expr::{Expr, JoinType};
use relx_core::node::{OpClass, OpKind, Operator, RelNode};
use relx_core::operand::RuleOperand;
use relx_core::rule::{Rule, RuleCall};

/// Inner join commutativity: A JOIN B -> Project(B JOIN A).
pub struct JoinCommuteRule;

/// Rewrite a condition over `left ++ right` to read `right ++ left`.
fn swap_condition_sides(condition: &Expr, left_arity: usize, right_arity: usize) -> Expr {
    condition.map_inputs(&|i| {
        if i < left_arity {
            i + right_arity
        } else {
            i - left_arity
        }
    })
}

impl Rule for JoinCommuteRule {
    fn name(&self) -> &str {
        "JoinCommuteRule"
    }

    fn operand(&self) -> RuleOperand {
        RuleOperand::any(OpClass::Kind(OpKind::Join)).with_predicate(|n| {
            matches!(
                n.op(),
                Operator::Join {
                    join_type: JoinType::Inner,
                    ..
                }
            )
        })
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()> {
        let join = call.rel(0).clone();
        let Operator::Join { condition, .. } = join.op() else {
            return Ok(());
        };
        let left = join.input(0).clone();
        let right = join.input(1).clone();
        let left_arity = left.row_type().arity();
        let right_arity = right.row_type().arity();

        let swapped = RelNode::join(
            right,
            left,
            JoinType::Inner,
            swap_condition_sides(condition, left_arity, right_arity),
        )?;

        let exprs = (0..left_arity)
            .map(|i| Expr::col(right_arity + i))
            .chain((0..right_arity).map(Expr::col))
            .collect();
        let names = join.row_type().fields.iter().map(|f| f.name.clone()).collect();
        call.transform_to(RelNode::project(swapped, exprs, names)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{apply, dept, emp};

    #[test]
    fn test_swap_condition() {
        // emp has 3 columns, dept has 2
        let condition = Expr::eq(Expr::col(0), Expr::col(3));
        assert_eq!(
            swap_condition_sides(&condition, 3, 2),
            Expr::eq(Expr::col(2), Expr::col(0))
        );
    }

    #[test]
    fn test_commuted_join_keeps_row_type() {
        let plan = RelNode::join(emp(), dept(), JoinType::Inner, Expr::eq(Expr::col(0), Expr::col(3))).unwrap();
        let out = apply(&JoinCommuteRule, &plan);
        assert_eq!(out.len(), 1);
        let project = &out[0];
        assert_eq!(project.kind(), OpKind::Project);
        assert_eq!(project.row_type(), plan.row_type());
        let join = project.input(0);
        assert_eq!(join.input(0).digest(), dept().digest());
        assert_eq!(join.input(1).digest(), emp().digest());
    }

    #[test]
    fn test_left_join_is_not_commuted() {
        let plan = RelNode::join(emp(), dept(), JoinType::Left, Expr::eq(Expr::col(0), Expr::col(3))).unwrap();
        assert!(apply(&JoinCommuteRule, &plan).is_empty());
    }
}
