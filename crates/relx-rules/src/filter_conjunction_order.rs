//! # Filter Conjunction Sort Rule
//!
//! Reorders the conjuncts of a filter condition by the highest column each
//! one reads. Conjuncts reading no columns come first; ties keep their
//! original relative order. Fires only when the order actually changes, so
//! running it to a fixpoint terminates after one application per filter.
//!
//! Mostly useful as a canonicalizing step: two filters that differ only in
//! conjunct order end up with the same digest afterwards.

use relx_core::error::Result;
use relx_core::expr::Expr;
use relx_core::node::{OpClass, OpKind, Operator, RelNode};
use relx_core::operand::RuleOperand;
use relx_core::rule::{Rule, RuleCall};

pub struct FilterConjunctionSortRule;

fn sort_key(conjunct: &Expr) -> Option<usize> {
    conjunct.max_input_ref()
}

fn sorted(condition: &Expr) -> Vec<Expr> {
    let mut conjuncts: Vec<&Expr> = condition.conjuncts();
    // stable: equal keys keep their order
    conjuncts.sort_by_key(|c| sort_key(c));
    conjuncts.into_iter().cloned().collect()
}

fn is_sorted(condition: &Expr) -> bool {
    condition
        .conjuncts()
        .windows(2)
        .all(|w| sort_key(w[0]) <= sort_key(w[1]))
}

impl Rule for FilterConjunctionSortRule {
    fn name(&self) -> &str {
        "FilterConjunctionSortRule"
    }

    fn operand(&self) -> RuleOperand {
        RuleOperand::any(OpClass::Kind(OpKind::Filter)).with_predicate(|n| match n.op() {
            Operator::Filter { condition } => !is_sorted(condition),
            _ => false,
        })
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()> {
        let filter = call.rel(0).clone();
        let Operator::Filter { condition } = filter.op() else {
            return Ok(());
        };
        let Some(reordered) = Expr::and_all(sorted(condition)) else {
            return Ok(());
        };
        call.transform_to(RelNode::filter(filter.input(0).clone(), reordered)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{apply, emp};

    #[test]
    fn test_orders_by_highest_column() {
        let on_name = Expr::eq(Expr::col(2), Expr::string("KING"));
        let on_dept = Expr::eq(Expr::col(0), Expr::int(10));
        let constant = Expr::boolean(true);
        let plan = RelNode::filter(
            emp(),
            Expr::And(vec![on_name.clone(), on_dept.clone(), constant.clone()]),
        )
        .unwrap();
        let out = apply(&FilterConjunctionSortRule, &plan);
        match out[0].op() {
            Operator::Filter { condition } => {
                assert_eq!(condition.conjuncts(), vec![&constant, &on_dept, &on_name]);
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_sorted_condition_does_not_fire() {
        let plan = RelNode::filter(
            emp(),
            Expr::And(vec![
                Expr::eq(Expr::col(0), Expr::int(10)),
                Expr::gt(Expr::col(1), Expr::int(5)),
            ]),
        )
        .unwrap();
        assert!(apply(&FilterConjunctionSortRule, &plan).is_empty());
    }

    #[test]
    fn test_ties_keep_original_order() {
        let a = Expr::gt(Expr::col(1), Expr::int(5));
        let b = Expr::lt(Expr::col(1), Expr::int(50));
        let c = Expr::eq(Expr::col(0), Expr::int(10));
        let condition = Expr::And(vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(sorted(&condition), vec![c, a, b]);
    }
}
