//! # Volcano Search
//!
//! This module drives the exhaustive, cost-based search over the memo.
//!
//! ## How It Works
//!
//! The caller registers a plan tree and the traits it requires of the result.
//! The search then repeats sweeps until nothing changes:
//!
//! 1. **Enforce**: for every set viewed with a required trait set that some
//!    member does not deliver, build converters (sorts, exchanges, convention
//!    changes) from that member and register them into the set.
//! 2. **Fire rules**: bind every rule's operand tree at every live member,
//!    in every way the member's input sets allow. Each (rule, binding) pair
//!    fires at most once. Alternatives a rule reports are registered into the
//!    bound root's set, which may create sets or merge existing ones.
//! 3. **Propagate costs**: recompute cumulative costs for new or affected
//!    members and record strictly cheaper winners per view.
//!
//! A sweep that registers nothing and merges nothing is a fixpoint.
//!
//! ## Termination
//!
//! Caps on sets, rule firings and sweeps stop the search early. Hitting one
//! is not an error: the cheapest plan found so far is returned and the stats
//! record that the result is best effort. Members whose finite cost exceeds
//! the cost cap are not used as rule roots.
//!
//! ## Failure Isolation
//!
//! A rule returning an error, or an alternative that cannot be registered,
//! is logged and skipped; the search continues with the remaining rules.

use crate::convert::ConversionGraph;
use crate::cost::{Cost, CostModel};
use crate::error::Result;
use crate::memo::{Memo, MemoMetadata};
use crate::metadata::MetadataQuery;
use crate::node::{NodeId, RelNode, RelRef, SetId};
use crate::operand::{bind_all, RuleOperand};
use crate::rule::{fire, PlannerContext, Rule};
use crate::traits::{Convention, TraitSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Configuration knobs for the Volcano search.
///
/// These limits prevent runaway optimization for pathologically large plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Upper bound on the number of live equivalence sets.
    pub max_sets: usize,
    /// Upper bound on the total number of rule firings.
    pub max_iterations: usize,
    /// Upper bound on enforce/fire/propagate sweeps.
    pub max_sweeps: usize,
    /// Members costlier than this are not expanded further. Defaults to the
    /// cost factory's huge cost.
    pub cost_cap: Option<Cost>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_sets: 100_000,
            max_iterations: 1_000_000,
            max_sweeps: 1_000,
            cost_cap: None,
        }
    }
}

impl SearchConfig {
    pub fn with_max_sets(mut self, max_sets: usize) -> Self {
        self.max_sets = max_sets;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_sweeps(mut self, max_sweeps: usize) -> Self {
        self.max_sweeps = max_sweeps;
        self
    }

    pub fn with_cost_cap(mut self, cost_cap: Cost) -> Self {
        self.cost_cap = Some(cost_cap);
        self
    }
}

/// Counters from the last `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub sweeps: usize,
    pub firings: usize,
    pub failed_firings: usize,
    pub registered: usize,
    pub merges: usize,
    /// A cap stopped the search before a fixpoint.
    pub best_effort: bool,
}

/// `PlannerContext` for rules firing against memo members.
pub struct MemoContext<'a> {
    memo: &'a Memo,
    metadata: MemoMetadata<'a>,
    model: &'a dyn CostModel,
    graph: &'a ConversionGraph,
}

impl<'a> MemoContext<'a> {
    pub fn new(memo: &'a Memo, model: &'a dyn CostModel, graph: &'a ConversionGraph) -> Self {
        Self {
            memo,
            metadata: MemoMetadata::new(memo, model),
            model,
            graph,
        }
    }
}

impl PlannerContext for MemoContext<'_> {
    fn change_traits(&self, rel: &RelRef, traits: &TraitSet) -> RelRef {
        match self.memo.set_of(rel) {
            Some(set) => RelNode::subset(set, traits.clone(), rel.row_type().clone()),
            None => rel.clone(),
        }
    }

    fn metadata(&self) -> &dyn MetadataQuery {
        &self.metadata
    }

    fn self_cost(&self, rel: &RelNode) -> Cost {
        self.model.self_cost(rel, &self.metadata)
    }

    fn conversions(&self) -> &ConversionGraph {
        self.graph
    }
}

/// The Volcano search engine.
///
/// Owns the memo and the registered rules. The search is stateful: rule
/// firings are remembered across calls, so optimizing the same plan twice
/// does no new work.
pub struct VolcanoSearch {
    memo: Memo,
    rules: Vec<(Arc<dyn Rule>, RuleOperand)>,
    cost_model: Arc<dyn CostModel>,
    conversions: ConversionGraph,
    config: SearchConfig,
    fired: HashSet<(usize, Vec<NodeId>)>,
    iterations: usize,
    root: Option<SetId>,
    last_stats: SearchStats,
}

impl VolcanoSearch {
    pub fn new(cost_model: Arc<dyn CostModel>) -> Self {
        Self::with_config(cost_model, SearchConfig::default())
    }

    pub fn with_config(cost_model: Arc<dyn CostModel>, config: SearchConfig) -> Self {
        Self {
            memo: Memo::new(),
            rules: Vec::new(),
            cost_model,
            conversions: ConversionGraph::new(),
            config,
            fired: HashSet::new(),
            iterations: 0,
            root: None,
            last_stats: SearchStats::default(),
        }
    }

    /// Register a rule. Converter rules also become conversion-graph edges.
    /// Returns false if a rule with the same name is already registered.
    pub fn add_rule(&mut self, rule: Arc<dyn Rule>) -> bool {
        if self.rules.iter().any(|(r, _)| r.name() == rule.name()) {
            return false;
        }
        if let Some(converter) = rule.as_converter() {
            self.conversions.add_rule(Arc::new(converter.clone()));
        }
        let operand = rule.operand();
        self.rules.push((rule, operand));
        true
    }

    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = Arc<dyn Rule>>) -> usize {
        rules.into_iter().filter(|r| self.add_rule(r.clone())).count()
    }

    /// Allow any node to cross from `from` to `to` through a generic converter.
    pub fn add_bridge(&mut self, from: Convention, to: Convention) {
        self.conversions.add_bridge(from, to);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|(r, _)| r.name()).collect()
    }

    pub fn memo(&self) -> &Memo {
        &self.memo
    }

    pub fn conversions(&self) -> &ConversionGraph {
        &self.conversions
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn root(&self) -> Option<SetId> {
        self.root.map(|s| self.memo.find(s))
    }

    pub fn last_stats(&self) -> SearchStats {
        self.last_stats
    }

    pub fn best_cost(&self, set: SetId, traits: &TraitSet) -> Option<Cost> {
        self.memo.best(set, traits).map(|w| w.cost)
    }

    /// Register `root` and require `required` of its set.
    pub fn set_root(&mut self, root: &RelRef, required: &TraitSet) -> Result<SetId> {
        let set = self.memo.register(root, None, self.cost_model.as_ref())?;
        self.memo.require(set, required);
        self.root = Some(set);
        Ok(set)
    }

    /// Cheapest plan for `root` delivering `required`.
    pub fn optimize(&mut self, root: &RelRef, required: &TraitSet) -> Result<RelRef> {
        let set = self.set_root(root, required)?;
        debug!(
            "Starting Volcano optimization: root_set={}, sets={}, members={}",
            set,
            self.memo.num_sets(),
            self.memo.num_members()
        );
        let stats = self.run();
        let plan = self.memo.extract(set, required);
        match (&plan, self.memo.best(set, required)) {
            (Ok(_), Some(w)) => debug!(
                "Optimization complete: cost={}, sweeps={}, firings={}, best_effort={}",
                w.cost, stats.sweeps, stats.firings, stats.best_effort
            ),
            _ => debug!("Optimization failed: no plan delivers {}", required),
        }
        plan
    }

    /// Sweep until fixpoint or a cap.
    pub fn run(&mut self) -> SearchStats {
        let mut stats = SearchStats::default();
        let registered_before = self.memo.registrations();
        let merges_before = self.memo.merges();
        let model = self.cost_model.clone();
        loop {
            if stats.sweeps >= self.config.max_sweeps {
                debug!("Hit sweep limit, returning best effort");
                stats.best_effort = true;
                break;
            }
            stats.sweeps += 1;
            let before = (self.memo.registrations(), self.memo.merges());

            self.enforce_required_traits(model.as_ref());
            let exhausted = self.fire_rules(model.as_ref(), &mut stats);
            self.memo.propagate_costs(model.as_ref());

            if exhausted {
                debug!("Hit iteration limit, returning best effort");
                stats.best_effort = true;
                break;
            }
            if self.memo.num_sets() > self.config.max_sets {
                debug!("Hit set limit ({}), returning best effort", self.config.max_sets);
                stats.best_effort = true;
                break;
            }
            if (self.memo.registrations(), self.memo.merges()) == before {
                debug!("Fixpoint after {} sweeps", stats.sweeps);
                break;
            }
        }
        stats.registered = self.memo.registrations() - registered_before;
        stats.merges = self.memo.merges() - merges_before;
        self.last_stats = stats;
        stats
    }

    /// Returns true when the firing budget ran out.
    fn fire_rules(&mut self, model: &dyn CostModel, stats: &mut SearchStats) -> bool {
        let rules = self.rules.clone();
        let cap = self
            .config
            .cost_cap
            .unwrap_or_else(|| model.factory().make_huge_cost());
        for set in self.memo.set_ids() {
            let members: Vec<RelRef> = self.memo.set(set).members().to_vec();
            for member in members {
                if self.memo.is_retired(&member) {
                    continue;
                }
                if let Some(cost) = self.memo.member_cost(&member) {
                    if !cost.is_infinite() && cap.is_lt(&cost) {
                        trace!("Skipping {} above cost cap", member.digest());
                        continue;
                    }
                }
                for (index, (rule, operand)) in rules.iter().enumerate() {
                    for binding in bind_all(operand, &member, &self.memo) {
                        let key = (index, binding.iter().map(|n| n.id()).collect::<Vec<_>>());
                        if !self.fired.insert(key) {
                            continue;
                        }
                        if self.iterations >= self.config.max_iterations {
                            return true;
                        }
                        self.iterations += 1;
                        stats.firings += 1;
                        trace!("Applying rule '{}' to {}", rule.name(), member.digest());
                        let produced = {
                            let ctx = MemoContext::new(&self.memo, model, &self.conversions);
                            fire(rule.as_ref(), binding, &ctx)
                        };
                        let alternatives = match produced {
                            Ok(alternatives) => alternatives,
                            Err(e) => {
                                warn!("Skipping firing: {}", e);
                                stats.failed_firings += 1;
                                continue;
                            }
                        };
                        for alternative in alternatives {
                            let Some(target) = self.memo.set_of(&member) else {
                                break;
                            };
                            if let Err(e) = self.memo.register(&alternative, Some(target), model) {
                                warn!("Rule '{}' produced an unusable node: {}", rule.name(), e);
                                stats.failed_firings += 1;
                            }
                        }
                    }
                }
            }
        }
        false
    }

    fn enforce_required_traits(&mut self, model: &dyn CostModel) {
        for set in self.memo.set_ids() {
            let set = self.memo.find(set);
            let required = self.memo.set(set).required().to_vec();
            let members = self.memo.set(set).members().to_vec();
            for view in &required {
                for member in &members {
                    if self.memo.is_retired(member) || member.traits().satisfies(view) {
                        continue;
                    }
                    self.enforce(set, member, view, model);
                }
            }
        }
    }

    /// Chain converters from `member` toward `view`, one category at a time,
    /// registering each step into `set`.
    fn enforce(&mut self, set: SetId, member: &RelRef, view: &TraitSet, model: &dyn CostModel) {
        let mut current = member.clone();
        for wanted in member.traits().unsatisfied(view) {
            let def = wanted.def();
            let from = current
                .traits()
                .get(def)
                .cloned()
                .unwrap_or_else(|| def.default_trait());
            if !def.can_convert(&self.conversions, &from, &wanted) {
                trace!("No conversion from {} to {}", from, wanted);
                return;
            }
            let converted = {
                let ctx = MemoContext::new(&self.memo, model, &self.conversions);
                def.convert(&ctx, &current, &wanted, false)
            };
            let Some(next) = converted else {
                return;
            };
            if next.id() == current.id() {
                continue;
            }
            let target = self.memo.find(set);
            if let Err(e) = self.memo.register(&next, Some(target), model) {
                warn!("Enforcer for {} could not be registered: {}", wanted, e);
                return;
            }
            current = next;
        }
    }
}
