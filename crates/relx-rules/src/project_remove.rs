//! # Project Remove Rule
//!
//! Removes a projection that returns its input unchanged: every expression
//! is `$i` at position `i`, and the output names match the input's. Commuted
//! joins and pushed-down rewrites often leave such projections behind.

use relx_core::error::Result;
use relx_core::expr::Expr;
use relx_core::node::{OpClass, OpKind, Operator, RelNode};
use relx_core::operand::RuleOperand;
use relx_core::rule::{Rule, RuleCall};

pub struct ProjectRemoveRule;

/// Whether `node` is a projection equivalent to its input.
pub fn is_trivial(node: &RelNode) -> bool {
    let Operator::Project { exprs, .. } = node.op() else {
        return false;
    };
    let Some(input) = node.inputs().first() else {
        return false;
    };
    exprs.len() == input.row_type().arity()
        && exprs
            .iter()
            .enumerate()
            .all(|(i, e)| matches!(e, Expr::InputRef(r) if *r == i))
        && node.row_type() == input.row_type()
}

impl Rule for ProjectRemoveRule {
    fn name(&self) -> &str {
        "ProjectRemoveRule"
    }

    fn operand(&self) -> RuleOperand {
        RuleOperand::any(OpClass::Kind(OpKind::Project)).with_predicate(is_trivial)
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()> {
        let input = call.rel(0).input(0).clone();
        call.transform_to(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{apply, emp};

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identity_projection_is_removed() {
        let plan = RelNode::project(
            emp(),
            vec![Expr::col(0), Expr::col(1), Expr::col(2)],
            names(&["deptno", "sal", "name"]),
        )
        .unwrap();
        let out = apply(&ProjectRemoveRule, &plan);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), OpKind::Scan);
    }

    #[test]
    fn test_renaming_projection_stays() {
        let plan = RelNode::project(
            emp(),
            vec![Expr::col(0), Expr::col(1), Expr::col(2)],
            names(&["d", "sal", "name"]),
        )
        .unwrap();
        assert!(apply(&ProjectRemoveRule, &plan).is_empty());
    }

    #[test]
    fn test_permuting_projection_stays() {
        let plan = RelNode::project(emp(), vec![Expr::col(1), Expr::col(0)], names(&["sal", "deptno"])).unwrap();
        assert!(!is_trivial(&plan));
    }
}
