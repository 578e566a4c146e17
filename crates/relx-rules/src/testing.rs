//! Shared fixtures for rule unit tests.

use relx_core::convert::ConversionGraph;
use relx_core::cost::DefaultCostModel;
use relx_core::expr::{DataType, Field, RowType, TableRef};
use relx_core::hep::TreeContext;
use relx_core::node::{RelNode, RelRef};
use relx_core::operand::{bind_first, TreeSource};
use relx_core::rule::{fire, Rule};
use relx_core::traits::{TraitInterner, TraitSet};

/// emp(deptno, sal, name)
pub fn emp() -> RelRef {
    let interner = TraitInterner::new();
    RelNode::scan(
        TableRef::new("hr", "emp"),
        RowType::new(vec![
            Field::new("deptno", DataType::Int64),
            Field::new("sal", DataType::Int64),
            Field::new("name", DataType::Utf8),
        ]),
        14.0,
        TraitSet::standard(&interner),
    )
}

/// dept(deptno, dname)
pub fn dept() -> RelRef {
    let interner = TraitInterner::new();
    RelNode::scan(
        TableRef::new("hr", "dept"),
        RowType::new(vec![
            Field::new("deptno", DataType::Int64),
            Field::new("dname", DataType::Utf8),
        ]),
        4.0,
        TraitSet::standard(&interner),
    )
}

/// Alternatives `rule` proposes for its first binding rooted at `node`.
pub fn apply(rule: &dyn Rule, node: &RelRef) -> Vec<RelRef> {
    let model = DefaultCostModel::default();
    let graph = ConversionGraph::new();
    let ctx = TreeContext::new(&model, &graph);
    match bind_first(&rule.operand(), node, &TreeSource) {
        Some(binding) => fire(rule, binding, &ctx).unwrap(),
        None => Vec::new(),
    }
}
