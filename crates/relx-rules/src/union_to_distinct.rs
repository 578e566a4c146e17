//! # Union To Distinct Rule
//!
//! Rewrites a distinct `UNION` as an aggregate grouping on every column over
//! a `UNION ALL`. Only the `UNION ALL` form has a physical implementation, so
//! without this rule a distinct union cannot be planned.
//!
//! ```text
//! Before: Union(distinct, A, B)
//! After:  Aggregate(group={0..n}, Union(all, A, B))
//! ```

use relx_core::error::Result;
use relx_core::node::{OpClass, OpKind, Operator, RelNode};
use relx_core::operand::RuleOperand;
use relx_core::rule::{Rule, RuleCall};

pub struct UnionToDistinctRule;

impl Rule for UnionToDistinctRule {
    fn name(&self) -> &str {
        "UnionToDistinctRule"
    }

    fn operand(&self) -> RuleOperand {
        RuleOperand::any(OpClass::Kind(OpKind::Union))
            .with_predicate(|n| matches!(n.op(), Operator::Union { all: false }))
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()> {
        let union = call.rel(0).clone();
        let all = RelNode::union(union.inputs().to_vec(), true)?;
        let keys = (0..union.row_type().arity()).collect();
        call.transform_to(RelNode::aggregate(all, keys, vec![])?)
    }
}
