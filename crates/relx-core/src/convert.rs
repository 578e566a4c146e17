//! # Trait Conversion
//!
//! A node that does not deliver a required trait can sometimes be made to:
//! sort it to get a collation, exchange it to get a distribution, or rewrite
//! it into another calling convention. This module answers "can `from` become
//! `to`" and builds the converting node.
//!
//! ## Conventions
//!
//! Convention changes follow a `ConversionGraph` whose edges come from
//! registered `ConverterRule`s and from explicit bridges. A conversion walks a
//! shortest path through the graph, applying one converter per hop.
//!
//! ## Collation and Distribution
//!
//! These are always convertible: a `Converter` node over the input re-sorts or
//! redistributes it. A composite target asks for several orders at once,
//! which a single converter cannot deliver, so it is not convertible.
//!
//! A conversion that could only be realized at infinite cost is refused unless
//! the caller explicitly allows it.

use crate::error::Result;
use crate::node::{OpClass, RelNode, RelRef};
use crate::operand::{NodePredicate, RuleOperand};
use crate::rule::{PlannerContext, Rule, RuleCall, RuleType};
use crate::traits::{Convention, RelTrait, TraitDef};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::trace;

/// Rule converting nodes of one class from one convention to another.
///
/// The converted node is a copy with the target convention whose inputs are
/// requested in the target convention as well.
#[derive(Clone)]
pub struct ConverterRule {
    name: String,
    class: OpClass,
    from: Convention,
    to: Convention,
    predicate: Option<NodePredicate>,
}

impl ConverterRule {
    pub fn new(name: impl Into<String>, class: OpClass, from: Convention, to: Convention) -> Self {
        Self {
            name: name.into(),
            class,
            from,
            to,
            predicate: None,
        }
    }

    pub fn with_predicate(mut self, predicate: impl Fn(&RelNode) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn from_convention(&self) -> Convention {
        self.from
    }

    pub fn to_convention(&self) -> Convention {
        self.to
    }

    pub fn accepts(&self, rel: &RelNode) -> bool {
        self.class.matches(rel.kind())
            && rel.convention() == self.from
            && self.predicate.as_ref().map_or(true, |p| p(rel))
    }

    /// Converted copy of `rel`, or `None` if this rule does not apply to it.
    pub fn convert(&self, rel: &RelRef, ctx: &dyn PlannerContext) -> Option<RelRef> {
        if !self.accepts(rel) {
            return None;
        }
        let target = RelTrait::Convention(self.to);
        let inputs = rel
            .inputs()
            .iter()
            .map(|input| ctx.change_traits(input, &input.traits().replace(target.clone())))
            .collect();
        Some(rel.copy(rel.traits().replace(target), inputs))
    }
}

impl Rule for ConverterRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Converter
    }

    fn operand(&self) -> RuleOperand {
        let operand = RuleOperand::any(self.class).with_trait(RelTrait::Convention(self.from));
        match &self.predicate {
            Some(p) => {
                let p = p.clone();
                operand.with_predicate(move |n| p(n))
            }
            None => operand,
        }
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()> {
        if let Some(converted) = self.convert(call.rel(0), call.context()) {
            call.transform_to(converted)?;
        }
        Ok(())
    }

    fn as_converter(&self) -> Option<&ConverterRule> {
        Some(self)
    }
}

/// One directed edge between conventions.
#[derive(Clone, Default)]
pub struct ConversionEdge {
    pub rules: Vec<Arc<ConverterRule>>,
    /// Any node can cross this edge through a generic `Converter` node.
    pub bridge: bool,
}

/// Directed graph of possible convention conversions.
#[derive(Clone, Default)]
pub struct ConversionGraph {
    edges: BTreeMap<(Convention, Convention), ConversionEdge>,
}

impl ConversionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: Arc<ConverterRule>) {
        let key = (rule.from, rule.to);
        let edge = self.edges.entry(key).or_default();
        if !edge.rules.iter().any(|r| r.name == rule.name) {
            edge.rules.push(rule);
        }
    }

    pub fn add_bridge(&mut self, from: Convention, to: Convention) {
        self.edges.entry((from, to)).or_default().bridge = true;
    }

    pub fn edge(&self, from: Convention, to: Convention) -> Option<&ConversionEdge> {
        self.edges.get(&(from, to))
    }

    /// Shortest chain of conventions from `from` to `to`, both included.
    pub fn path(&self, from: Convention, to: Convention) -> Option<Vec<Convention>> {
        if from == to {
            return Some(vec![from]);
        }
        let mut previous: BTreeMap<Convention, Convention> = BTreeMap::new();
        let mut visited: BTreeSet<Convention> = BTreeSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            for (&(a, b), _) in self.edges.range((current, Convention::None)..) {
                if a != current {
                    break;
                }
                if !visited.insert(b) {
                    continue;
                }
                previous.insert(b, a);
                if b == to {
                    let mut path = vec![to];
                    let mut cursor = to;
                    while let Some(&p) = previous.get(&cursor) {
                        path.push(p);
                        cursor = p;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(b);
            }
        }
        None
    }

    pub fn can_convert(&self, from: Convention, to: Convention) -> bool {
        self.path(from, to).is_some()
    }
}

impl TraitDef {
    /// Whether a node delivering `from` could be converted to deliver `to`.
    pub fn can_convert(&self, graph: &ConversionGraph, from: &RelTrait, to: &RelTrait) -> bool {
        match (self, from, to) {
            (TraitDef::Convention, RelTrait::Convention(a), RelTrait::Convention(b)) => {
                graph.can_convert(*a, *b)
            }
            (TraitDef::Collation, _, RelTrait::Collation(_)) => true,
            (TraitDef::Distribution, _, RelTrait::Distribution(_)) => true,
            _ => false,
        }
    }

    /// Node equivalent to `rel` delivering `to` in this category.
    ///
    /// Returns `rel` itself when it already satisfies `to`, and `None` when no
    /// conversion exists or the result would cost infinite while
    /// `allow_infinite` is false.
    pub fn convert(
        &self,
        ctx: &dyn PlannerContext,
        rel: &RelRef,
        to: &RelTrait,
        allow_infinite: bool,
    ) -> Option<RelRef> {
        if rel.traits().get(*self).map_or(false, |t| t.satisfies(to)) {
            return Some(rel.clone());
        }
        let converted = match self {
            TraitDef::Convention => convert_convention(ctx, rel, to)?,
            TraitDef::Collation | TraitDef::Distribution => {
                if matches!(to, RelTrait::Composite(..)) {
                    return None;
                }
                let input = ctx.change_traits(rel, rel.traits());
                RelNode::converter(input, to.clone()).ok()?
            }
        };
        if !allow_infinite && ctx.self_cost(&converted).is_infinite() {
            trace!(digest = converted.digest(), "conversion refused at infinite cost");
            return None;
        }
        Some(converted)
    }
}

fn convert_convention(ctx: &dyn PlannerContext, rel: &RelRef, to: &RelTrait) -> Option<RelRef> {
    let RelTrait::Convention(target) = to else {
        return None;
    };
    let graph = ctx.conversions();
    let path = graph.path(rel.convention(), *target)?;
    let mut current = rel.clone();
    for hop in path.windows(2) {
        let edge = graph.edge(hop[0], hop[1])?;
        let by_rule = edge.rules.iter().find_map(|r| r.convert(&current, ctx));
        current = match by_rule {
            Some(next) => next,
            None if edge.bridge => {
                let input = ctx.change_traits(&current, current.traits());
                RelNode::converter(input, RelTrait::Convention(hop[1])).ok()?
            }
            None => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{Cost, CostModel, DefaultCostModel};
    use crate::expr::{DataType, Field, RowType, TableRef};
    use crate::metadata::{MetadataQuery, TreeMetadata};
    use crate::node::OpKind;
    use crate::traits::{Collation, FieldCollation, TraitInterner, TraitSet};

    struct TestContext {
        model: DefaultCostModel,
        graph: ConversionGraph,
    }

    impl PlannerContext for TestContext {
        fn change_traits(&self, rel: &RelRef, _traits: &TraitSet) -> RelRef {
            rel.clone()
        }

        fn metadata(&self) -> &dyn MetadataQuery {
            unimplemented!("not needed by conversions")
        }

        fn self_cost(&self, rel: &RelNode) -> Cost {
            self.model.self_cost(rel, &TreeMetadata::new(&self.model))
        }

        fn conversions(&self) -> &ConversionGraph {
            &self.graph
        }
    }

    fn scan(convention: Convention) -> RelRef {
        let interner = TraitInterner::new();
        RelNode::scan(
            TableRef::new("s", "t"),
            RowType::new(vec![Field::new("a", DataType::Int64)]),
            100.0,
            TraitSet::standard(&interner).replace(RelTrait::Convention(convention)),
        )
    }

    #[test]
    fn test_path_is_shortest() {
        let mut graph = ConversionGraph::new();
        graph.add_bridge(Convention::None, Convention::Logical);
        graph.add_bridge(Convention::Logical, Convention::Physical);
        assert_eq!(
            graph.path(Convention::None, Convention::Physical),
            Some(vec![Convention::None, Convention::Logical, Convention::Physical])
        );
        graph.add_bridge(Convention::None, Convention::Physical);
        assert_eq!(
            graph.path(Convention::None, Convention::Physical),
            Some(vec![Convention::None, Convention::Physical])
        );
        assert!(graph.path(Convention::Physical, Convention::None).is_none());
    }

    #[test]
    fn test_convention_conversion_uses_rules() {
        let mut graph = ConversionGraph::new();
        graph.add_rule(Arc::new(ConverterRule::new(
            "ScanToPhysical",
            OpClass::Kind(OpKind::Scan),
            Convention::None,
            Convention::Physical,
        )));
        let ctx = TestContext {
            model: DefaultCostModel::default(),
            graph,
        };
        let converted = TraitDef::Convention
            .convert(&ctx, &scan(Convention::None), &RelTrait::Convention(Convention::Physical), false)
            .unwrap();
        assert_eq!(converted.kind(), OpKind::Scan);
        assert_eq!(converted.convention(), Convention::Physical);
    }

    #[test]
    fn test_collation_conversion_refuses_infinite_cost() {
        let ctx = TestContext {
            model: DefaultCostModel::default(),
            graph: ConversionGraph::new(),
        };
        let sorted = RelTrait::Collation(Collation::of(vec![FieldCollation::asc(0)]));
        assert!(TraitDef::Collation
            .convert(&ctx, &scan(Convention::None), &sorted, false)
            .is_none());
        let forced = TraitDef::Collation
            .convert(&ctx, &scan(Convention::None), &sorted, true)
            .unwrap();
        assert_eq!(forced.kind(), OpKind::Converter);
        let physical = TraitDef::Collation
            .convert(&ctx, &scan(Convention::Physical), &sorted, false)
            .unwrap();
        assert!(physical.traits().get(TraitDef::Collation).unwrap().satisfies(&sorted));
    }

    #[test]
    fn test_can_convert() {
        let graph = ConversionGraph::new();
        let none = RelTrait::Convention(Convention::None);
        let physical = RelTrait::Convention(Convention::Physical);
        assert!(!TraitDef::Convention.can_convert(&graph, &none, &physical));
        assert!(TraitDef::Collation.can_convert(
            &graph,
            &RelTrait::Collation(Collation::empty()),
            &RelTrait::Collation(Collation::of(vec![FieldCollation::asc(0)]))
        ));
    }

    #[test]
    fn test_composite_collation_is_not_convertible() {
        let ctx = TestContext {
            model: DefaultCostModel::default(),
            graph: ConversionGraph::new(),
        };
        let both = RelTrait::composite(
            TraitDef::Collation,
            vec![
                RelTrait::Collation(Collation::of(vec![FieldCollation::asc(0)])),
                RelTrait::Collation(Collation::of(vec![FieldCollation::asc(1)])),
            ],
        );
        assert!(!TraitDef::Collation.can_convert(&ctx.graph, &RelTrait::Collation(Collation::empty()), &both));
        assert!(TraitDef::Collation
            .convert(&ctx, &scan(Convention::Physical), &both, true)
            .is_none());
    }
}
