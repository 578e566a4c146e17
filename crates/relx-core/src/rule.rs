//! # Rule System
//!
//! This module defines the rule trait, the call object rules receive, and the
//! registry both engines draw rules from.
//!
//! ## Rule Types
//!
//! - **Transformation rules** (`RuleType::Transformation`): rewrite a plan
//!   fragment into an equivalent one (filter pushdown, join commutativity).
//! - **Converter rules** (`RuleType::Converter`): move a node from one calling
//!   convention to another. They also feed the conversion graph used to
//!   enforce a required convention; see `convert`.
//!
//! ## Firing
//!
//! When a rule's operand tree binds, the engine builds a `RuleCall` holding the
//! bound nodes in operand pre-order, asks `matches` for a final veto, then runs
//! `on_match`. The rule reports equivalent alternatives for the bound root via
//! `transform_to`; the engine decides what to do with them. The Volcano engine
//! registers every alternative, the HEP engine applies the first.
//!
//! ## Planner Context
//!
//! Rules see the engine only through `PlannerContext`: a way to change the
//! traits of an input, metadata for the bound nodes, the self cost of a node
//! and the conversion graph. A rule therefore runs unchanged in both engines.
//!
//! ## Rule Registry
//!
//! The `RuleRegistry` collects rules, de-duplicated by name, and looks them up
//! by name, implementing type or rule type.

use crate::convert::{ConversionGraph, ConverterRule};
use crate::cost::Cost;
use crate::error::{PlannerError, Result};
use crate::metadata::MetadataQuery;
use crate::node::{RelNode, RelRef};
use crate::operand::RuleOperand;
use crate::traits::TraitSet;
use std::sync::Arc;
use tracing::trace;

/// Classification of optimization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    /// Equivalence-preserving rewrite within a convention.
    Transformation,
    /// Moves a node between calling conventions.
    Converter,
}

/// Engine services available to a firing rule.
pub trait PlannerContext {
    /// `rel` as seen with `traits`. The Volcano engine answers with a set
    /// reference; over plain trees the node itself is returned.
    fn change_traits(&self, rel: &RelRef, traits: &TraitSet) -> RelRef;

    fn metadata(&self) -> &dyn MetadataQuery;

    fn self_cost(&self, rel: &RelNode) -> Cost;

    fn conversions(&self) -> &ConversionGraph;
}

/// One firing of a rule against a binding.
pub struct RuleCall<'a> {
    rule: &'a str,
    rels: Vec<RelRef>,
    ctx: &'a dyn PlannerContext,
    results: Vec<RelRef>,
}

impl<'a> RuleCall<'a> {
    pub fn new(rule: &'a str, rels: Vec<RelRef>, ctx: &'a dyn PlannerContext) -> Self {
        Self {
            rule,
            rels,
            ctx,
            results: Vec::new(),
        }
    }

    pub fn rule_name(&self) -> &str {
        self.rule
    }

    /// Bound node at operand pre-order position `i`. Position 0 is the root.
    pub fn rel(&self, i: usize) -> &RelRef {
        &self.rels[i]
    }

    pub fn rels(&self) -> &[RelRef] {
        &self.rels
    }

    pub fn context(&self) -> &'a dyn PlannerContext {
        self.ctx
    }

    pub fn metadata(&self) -> &dyn MetadataQuery {
        self.ctx.metadata()
    }

    pub fn change_traits(&self, rel: &RelRef, traits: &TraitSet) -> RelRef {
        self.ctx.change_traits(rel, traits)
    }

    /// Report `rel` as equivalent to the bound root.
    ///
    /// Row types must match exactly; a mismatch is a rule bug and is rejected
    /// without recording the alternative.
    pub fn transform_to(&mut self, rel: RelRef) -> Result<()> {
        let root = &self.rels[0];
        if rel.row_type() != root.row_type() {
            return Err(PlannerError::RowTypeMismatch {
                rule: self.rule.to_string(),
                expected: root.row_type().to_string(),
                actual: rel.row_type().to_string(),
            });
        }
        trace!(rule = self.rule, digest = rel.digest(), "alternative produced");
        self.results.push(rel);
        Ok(())
    }

    pub fn results(&self) -> &[RelRef] {
        &self.results
    }

    pub fn into_results(self) -> Vec<RelRef> {
        self.results
    }
}

/// A rule transforms or converts plan fragments.
pub trait Rule: Send + Sync {
    /// Unique name of this rule.
    fn name(&self) -> &str;

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    /// Operand tree this rule matches against. Built fresh on each call.
    fn operand(&self) -> RuleOperand;

    /// Final veto after the operand tree has bound.
    fn matches(&self, _call: &RuleCall<'_>) -> bool {
        true
    }

    /// Report alternatives through `call.transform_to`.
    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()>;

    /// Implementing type, used to select rules by class in programs.
    fn class_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn as_converter(&self) -> Option<&ConverterRule> {
        None
    }
}

/// Run `rule` against `binding`, returning the alternatives it proposed.
pub fn fire(rule: &dyn Rule, binding: Vec<RelRef>, ctx: &dyn PlannerContext) -> Result<Vec<RelRef>> {
    let name = rule.name().to_string();
    let mut call = RuleCall::new(&name, binding, ctx);
    if !rule.matches(&call) {
        return Ok(Vec::new());
    }
    rule.on_match(&mut call).map_err(|e| match e {
        failed @ PlannerError::RuleFailed { .. } => failed,
        other => PlannerError::RuleFailed {
            rule: name.clone(),
            reason: other.to_string(),
        },
    })?;
    Ok(call.into_results())
}

/// A named set of rules.
#[derive(Clone)]
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<Arc<dyn Rule>>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>, rules: Vec<Arc<dyn Rule>>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }
}

/// Registry of optimization rules, unique by name.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a rule with the same name is already present.
    pub fn add_rule(&mut self, rule: Arc<dyn Rule>) -> bool {
        if self.get(rule.name()).is_some() {
            return false;
        }
        self.rules.push(rule);
        true
    }

    pub fn add_rule_set(&mut self, set: RuleSet) -> usize {
        set.rules
            .into_iter()
            .filter(|r| self.add_rule(r.clone()))
            .count()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Rule>> {
        self.rules.iter().find(|r| r.name() == name).cloned()
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn by_class(&self, class_name: &str) -> Vec<Arc<dyn Rule>> {
        self.rules
            .iter()
            .filter(|r| r.class_name() == class_name)
            .cloned()
            .collect()
    }

    pub fn by_type(&self, rule_type: RuleType) -> Vec<Arc<dyn Rule>> {
        self.rules
            .iter()
            .filter(|r| r.rule_type() == rule_type)
            .cloned()
            .collect()
    }
}
