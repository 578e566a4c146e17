//! # Rule Operands
//!
//! Each rule declares a tree of `RuleOperand`s describing the shape of plan
//! fragments it can rewrite. An operand matches one node: its operator class,
//! an optional required trait and an optional predicate. Its `ChildPolicy`
//! says how the node's inputs are matched:
//!
//! - `Any`: inputs are not inspected.
//! - `Leaf`: the node must have no inputs.
//! - `Some`: one child operand per input, matched in order; the input count
//!   must equal the child operand count.
//! - `Unordered`: a single child operand that may match any one input.
//!
//! ## Bindings
//!
//! A successful match produces a binding: the matched nodes in pre-order of
//! the operand tree (the root first). Binding is generic over `MatchSource`,
//! which yields the candidate nodes for an input position. Over a plain tree
//! that is the input itself; over the equivalence-set engine it is every
//! member of the referenced set that delivers the subset's traits, so one
//! operand tree may bind several ways.

use crate::error::{PlannerError, Result};
use crate::node::{OpClass, RelNode, RelRef};
use crate::traits::RelTrait;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildPolicy {
    Any,
    Leaf,
    Some,
    Unordered,
}

pub type NodePredicate = Arc<dyn Fn(&RelNode) -> bool + Send + Sync>;

/// Node pattern within a rule.
#[derive(Clone)]
pub struct RuleOperand {
    class: OpClass,
    required_trait: Option<RelTrait>,
    predicate: Option<NodePredicate>,
    policy: ChildPolicy,
    children: Vec<RuleOperand>,
}

impl RuleOperand {
    /// Validating constructor: `Some` needs at least one child, `Unordered`
    /// exactly one, `Any` and `Leaf` none.
    pub fn new(class: OpClass, policy: ChildPolicy, children: Vec<RuleOperand>) -> Result<Self> {
        let ok = match policy {
            ChildPolicy::Any | ChildPolicy::Leaf => children.is_empty(),
            ChildPolicy::Some => !children.is_empty(),
            ChildPolicy::Unordered => children.len() == 1,
        };
        if !ok {
            return Err(PlannerError::InvalidOperand(format!(
                "{policy:?} policy cannot take {} child operands",
                children.len()
            )));
        }
        Ok(Self {
            class,
            required_trait: None,
            predicate: None,
            policy,
            children,
        })
    }

    pub fn any(class: OpClass) -> Self {
        Self {
            class,
            required_trait: None,
            predicate: None,
            policy: ChildPolicy::Any,
            children: vec![],
        }
    }

    pub fn leaf(class: OpClass) -> Self {
        Self {
            policy: ChildPolicy::Leaf,
            ..Self::any(class)
        }
    }

    /// Panics on an empty child list; use `new` for untrusted input.
    pub fn some(class: OpClass, children: Vec<RuleOperand>) -> Self {
        assert!(!children.is_empty(), "SOME operand needs child operands");
        Self {
            policy: ChildPolicy::Some,
            children,
            ..Self::any(class)
        }
    }

    pub fn unordered(class: OpClass, child: RuleOperand) -> Self {
        Self {
            policy: ChildPolicy::Unordered,
            children: vec![child],
            ..Self::any(class)
        }
    }

    pub fn with_trait(mut self, required: RelTrait) -> Self {
        self.required_trait = Some(required);
        self
    }

    pub fn with_predicate(mut self, predicate: impl Fn(&RelNode) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn class(&self) -> OpClass {
        self.class
    }

    pub fn policy(&self) -> ChildPolicy {
        self.policy
    }

    pub fn children(&self) -> &[RuleOperand] {
        &self.children
    }

    /// Number of operands in this tree, which is also the binding length.
    pub fn operand_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.operand_count()).sum::<usize>()
    }

    /// Whether `node` itself matches, ignoring inputs.
    pub fn matches(&self, node: &RelNode) -> bool {
        self.class.matches(node.kind())
            && self.required_trait.as_ref().map_or(true, |t| {
                node.traits()
                    .get(t.def())
                    .map_or(false, |mine| mine.satisfies(t))
            })
            && self.predicate.as_ref().map_or(true, |p| p(node))
    }
}

impl fmt::Debug for RuleOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleOperand")
            .field("class", &self.class)
            .field("trait", &self.required_trait)
            .field("predicate", &self.predicate.is_some())
            .field("policy", &self.policy)
            .field("children", &self.children)
            .finish()
    }
}

/// Supplies candidate nodes for input `ordinal` of `parent`.
pub trait MatchSource {
    fn candidates(&self, parent: &RelRef, ordinal: usize) -> Vec<RelRef>;
}

/// Candidates are the parent's actual inputs.
pub struct TreeSource;

impl MatchSource for TreeSource {
    fn candidates(&self, parent: &RelRef, ordinal: usize) -> Vec<RelRef> {
        parent.inputs().get(ordinal).cloned().into_iter().collect()
    }
}

/// Every binding of `operand` rooted at `node`, each in operand pre-order.
pub fn bind_all(operand: &RuleOperand, node: &RelRef, source: &dyn MatchSource) -> Vec<Vec<RelRef>> {
    if !operand.matches(node) {
        return vec![];
    }
    match operand.policy {
        ChildPolicy::Any => vec![vec![node.clone()]],
        ChildPolicy::Leaf => {
            if node.inputs().is_empty() {
                vec![vec![node.clone()]]
            } else {
                vec![]
            }
        }
        ChildPolicy::Some => {
            if node.inputs().len() != operand.children.len() {
                return vec![];
            }
            let mut partial = vec![vec![node.clone()]];
            for (ordinal, child) in operand.children.iter().enumerate() {
                let child_bindings: Vec<Vec<RelRef>> = source
                    .candidates(node, ordinal)
                    .iter()
                    .flat_map(|c| bind_all(child, c, source))
                    .collect();
                if child_bindings.is_empty() {
                    return vec![];
                }
                partial = partial
                    .into_iter()
                    .flat_map(|prefix| {
                        child_bindings.iter().map(move |cb| {
                            let mut b = prefix.clone();
                            b.extend(cb.iter().cloned());
                            b
                        })
                    })
                    .collect();
            }
            partial
        }
        ChildPolicy::Unordered => {
            let child = &operand.children[0];
            let mut out = Vec::new();
            for ordinal in 0..node.inputs().len() {
                for candidate in source.candidates(node, ordinal) {
                    for cb in bind_all(child, &candidate, source) {
                        let mut b = vec![node.clone()];
                        b.extend(cb);
                        out.push(b);
                    }
                }
            }
            out
        }
    }
}

/// First binding in enumeration order: lowest input ordinals first.
pub fn bind_first(operand: &RuleOperand, node: &RelRef, source: &dyn MatchSource) -> Option<Vec<RelRef>> {
    bind_all(operand, node, source).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{DataType, Expr, Field, JoinType, RowType, TableRef};
    use crate::node::OpKind;
    use crate::traits::{Convention, TraitInterner, TraitSet};

    fn scan(name: &str) -> RelRef {
        let interner = TraitInterner::new();
        RelNode::scan(
            TableRef::new("s", name),
            RowType::new(vec![Field::new("a", DataType::Int64)]),
            10.0,
            TraitSet::standard(&interner),
        )
    }

    fn kind(k: OpKind) -> OpClass {
        OpClass::Kind(k)
    }

    #[test]
    fn test_some_policy_binds_in_preorder() {
        let filter = RelNode::filter(scan("t"), Expr::gt(Expr::col(0), Expr::int(1))).unwrap();
        let operand = RuleOperand::some(kind(OpKind::Filter), vec![RuleOperand::leaf(kind(OpKind::Scan))]);
        let binding = bind_first(&operand, &filter, &TreeSource).unwrap();
        assert_eq!(binding.len(), operand.operand_count());
        assert_eq!(binding[0].kind(), OpKind::Filter);
        assert_eq!(binding[1].kind(), OpKind::Scan);
    }

    #[test]
    fn test_some_policy_requires_exact_input_count() {
        let join = RelNode::join(scan("a"), scan("b"), JoinType::Inner, Expr::boolean(true)).unwrap();
        let operand = RuleOperand::some(kind(OpKind::Join), vec![RuleOperand::any(OpClass::Any)]);
        assert!(bind_first(&operand, &join, &TreeSource).is_none());
    }

    #[test]
    fn test_unordered_tries_every_input() {
        let filtered = RelNode::filter(scan("b"), Expr::boolean(true)).unwrap();
        let join = RelNode::join(scan("a"), filtered, JoinType::Inner, Expr::boolean(true)).unwrap();
        let operand = RuleOperand::unordered(kind(OpKind::Join), RuleOperand::any(kind(OpKind::Filter)));
        let bindings = bind_all(&operand, &join, &TreeSource);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0][1].kind(), OpKind::Filter);

        let scans = RuleOperand::unordered(kind(OpKind::Join), RuleOperand::leaf(kind(OpKind::Scan)));
        assert_eq!(bind_all(&scans, &join, &TreeSource).len(), 1);
    }

    #[test]
    fn test_leaf_rejects_nodes_with_inputs() {
        let filter = RelNode::filter(scan("t"), Expr::boolean(true)).unwrap();
        assert!(bind_first(&RuleOperand::leaf(OpClass::Any), &filter, &TreeSource).is_none());
    }

    #[test]
    fn test_trait_and_predicate_restrict_matches() {
        let node = scan("t");
        let physical = RuleOperand::any(OpClass::Any).with_trait(RelTrait::Convention(Convention::Physical));
        assert!(!physical.matches(&node));
        let named = RuleOperand::any(OpClass::Any).with_predicate(|n| n.digest().contains("s.t"));
        assert!(named.matches(&node));
    }

    #[test]
    fn test_new_validates_policy_arity() {
        assert!(RuleOperand::new(OpClass::Any, ChildPolicy::Some, vec![]).is_err());
        assert!(RuleOperand::new(OpClass::Any, ChildPolicy::Leaf, vec![RuleOperand::any(OpClass::Any)]).is_err());
        assert!(RuleOperand::new(
            OpClass::Any,
            ChildPolicy::Unordered,
            vec![RuleOperand::any(OpClass::Any), RuleOperand::any(OpClass::Any)]
        )
        .is_err());
    }
}
