//! # HEP: Heuristic Program-Driven Rewriter
//!
//! The second engine. Instead of exploring every alternative, it runs an
//! ordered program of instructions against a single plan tree and applies
//! the first alternative each matching rule proposes. No costs are compared.
//!
//! ## Programs
//!
//! A `HepProgram` is built with `HepProgramBuilder`:
//!
//! ```text
//! HepProgramBuilder::new()
//!     .add_match_order(HepMatchOrder::BottomUp)
//!     .add_rule_by_description("FilterMergeRule")
//!     .add_group_begin()
//!     .add_rule_instance(a)
//!     .add_rule_instance(b)
//!     .add_group_end()
//!     .build()?
//! ```
//!
//! Rule instructions select rules by implementing type, by name, by instance,
//! as an explicit collection, or as "every converter rule". Match order and
//! match limit instructions change how all following rule instructions
//! traverse the tree. A group fires its rules together until none matches.
//! A subprogram runs with fresh settings, repeatedly, until it stops
//! changing the tree; its settings never leak back to the caller.
//!
//! ## Traversal
//!
//! - `Arbitrary`: pre-order; after a change, continue inside the new node's
//!   subtree, then sweep again.
//! - `BottomUp`: post-order; restart from the root after every change.
//! - `TopDown`: pre-order; restart from the root after every change.
//! - `DepthFirst`: pre-order; after a change, continue with the new node's
//!   inputs and then the remaining queue, never retrying the new node itself
//!   in the same sweep.
//!
//! ## Termination
//!
//! Every root digest produced during one `execute` is remembered. A rewrite
//! that would recreate an earlier tree is rejected, which bounds rule pairs
//! that undo each other. `HepConfig::max_applications` caps the total work.

use crate::convert::ConversionGraph;
use crate::cost::{Cost, CostModel};
use crate::error::{PlannerError, Result};
use crate::metadata::{MetadataQuery, TreeMetadata};
use crate::node::{RelNode, RelRef};
use crate::operand::{bind_first, RuleOperand, TreeSource};
use crate::rule::{fire, PlannerContext, Rule, RuleRegistry, RuleSet, RuleType};
use crate::traits::TraitSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Match limit meaning "until nothing matches".
pub const MATCH_UNTIL_FIXPOINT: usize = usize::MAX;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HepMatchOrder {
    #[default]
    Arbitrary,
    BottomUp,
    TopDown,
    DepthFirst,
}

/// One step of a `HepProgram`.
#[derive(Clone)]
pub enum HepInstruction {
    /// Registered rules whose implementing type has this name. Either the
    /// full path or the bare type name is accepted.
    RuleClass(String),
    RuleCollection(Vec<Arc<dyn Rule>>),
    RuleInstance(Arc<dyn Rule>),
    /// The registered rule with this name.
    RuleByName(String),
    /// Every registered converter rule.
    Converters,
    MatchOrder(HepMatchOrder),
    MatchLimit(usize),
    Group(Vec<HepInstruction>),
    Subprogram(Arc<HepProgram>),
}

impl HepInstruction {
    fn is_rule(&self) -> bool {
        matches!(
            self,
            HepInstruction::RuleClass(_)
                | HepInstruction::RuleCollection(_)
                | HepInstruction::RuleInstance(_)
                | HepInstruction::RuleByName(_)
                | HepInstruction::Converters
        )
    }
}

impl fmt::Debug for HepInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HepInstruction::RuleClass(name) => write!(f, "RuleClass({name})"),
            HepInstruction::RuleCollection(rules) => {
                let names: Vec<&str> = rules.iter().map(|r| r.name()).collect();
                write!(f, "RuleCollection({names:?})")
            }
            HepInstruction::RuleInstance(rule) => write!(f, "RuleInstance({})", rule.name()),
            HepInstruction::RuleByName(name) => write!(f, "RuleByName({name})"),
            HepInstruction::Converters => write!(f, "Converters"),
            HepInstruction::MatchOrder(order) => write!(f, "MatchOrder({order:?})"),
            HepInstruction::MatchLimit(limit) if *limit == MATCH_UNTIL_FIXPOINT => {
                write!(f, "MatchLimit(fixpoint)")
            }
            HepInstruction::MatchLimit(limit) => write!(f, "MatchLimit({limit})"),
            HepInstruction::Group(members) => f.debug_tuple("Group").field(members).finish(),
            HepInstruction::Subprogram(program) => {
                f.debug_tuple("Subprogram").field(&program.instructions).finish()
            }
        }
    }
}

/// An immutable, reusable instruction list.
#[derive(Debug, Clone, Default)]
pub struct HepProgram {
    instructions: Vec<HepInstruction>,
}

impl HepProgram {
    pub fn builder() -> HepProgramBuilder {
        HepProgramBuilder::new()
    }

    pub fn instructions(&self) -> &[HepInstruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Builds a `HepProgram`. Structural mistakes are reported by `build`.
#[derive(Default)]
pub struct HepProgramBuilder {
    instructions: Vec<HepInstruction>,
    group: Option<Vec<HepInstruction>>,
    error: Option<String>,
}

impl HepProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule_class(self, class_name: impl Into<String>) -> Self {
        self.push(HepInstruction::RuleClass(class_name.into()))
    }

    /// Registered rules implemented by `R`.
    pub fn add_rule_class_of<R: Rule + ?Sized>(self) -> Self {
        self.add_rule_class(std::any::type_name::<R>())
    }

    pub fn add_rule_collection(self, rules: Vec<Arc<dyn Rule>>) -> Self {
        self.push(HepInstruction::RuleCollection(rules))
    }

    pub fn add_rule_instance(self, rule: Arc<dyn Rule>) -> Self {
        self.push(HepInstruction::RuleInstance(rule))
    }

    pub fn add_rule_by_description(self, name: impl Into<String>) -> Self {
        self.push(HepInstruction::RuleByName(name.into()))
    }

    pub fn add_converters(self) -> Self {
        self.push(HepInstruction::Converters)
    }

    pub fn add_match_order(self, order: HepMatchOrder) -> Self {
        self.push(HepInstruction::MatchOrder(order))
    }

    pub fn add_match_limit(self, limit: usize) -> Self {
        self.push(HepInstruction::MatchLimit(limit))
    }

    pub fn add_subprogram(self, program: HepProgram) -> Self {
        self.push(HepInstruction::Subprogram(Arc::new(program)))
    }

    pub fn add_group_begin(mut self) -> Self {
        if self.group.is_some() {
            self.fail("groups cannot be nested");
        } else {
            self.group = Some(Vec::new());
        }
        self
    }

    pub fn add_group_end(mut self) -> Self {
        match self.group.take() {
            Some(members) => self.instructions.push(HepInstruction::Group(members)),
            None => self.fail("group end without a matching begin"),
        }
        self
    }

    pub fn build(self) -> Result<HepProgram> {
        if let Some(error) = self.error {
            return Err(PlannerError::InvalidProgram(error));
        }
        if self.group.is_some() {
            return Err(PlannerError::InvalidProgram("group was never closed".into()));
        }
        Ok(HepProgram {
            instructions: self.instructions,
        })
    }

    fn push(mut self, instruction: HepInstruction) -> Self {
        if self.group.is_some() && !instruction.is_rule() {
            let message = format!("{instruction:?} is not allowed inside a group");
            self.fail(&message);
            return self;
        }
        match self.group.as_mut() {
            Some(members) => members.push(instruction),
            None => self.instructions.push(instruction),
        }
        self
    }

    fn fail(&mut self, message: &str) {
        if self.error.is_none() {
            self.error = Some(message.to_string());
        }
    }
}

/// Configuration for the HEP planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HepConfig {
    /// Re-run the whole program until the tree stops changing.
    pub run_to_fixpoint: bool,
    /// Cap on whole-program re-runs when `run_to_fixpoint` is set.
    pub max_passes: usize,
    /// Cap on applied rewrites for one `execute`.
    pub max_applications: usize,
}

impl Default for HepConfig {
    fn default() -> Self {
        Self {
            run_to_fixpoint: false,
            max_passes: 100,
            max_applications: 1_000_000,
        }
    }
}

impl HepConfig {
    pub fn with_run_to_fixpoint(mut self, run_to_fixpoint: bool) -> Self {
        self.run_to_fixpoint = run_to_fixpoint;
        self
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    pub fn with_max_applications(mut self, max_applications: usize) -> Self {
        self.max_applications = max_applications;
        self
    }
}

/// Counters from the last `execute`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HepStats {
    pub passes: usize,
    pub attempts: usize,
    pub applications: usize,
    pub failed_firings: usize,
    pub rejected_cycles: usize,
}

/// `PlannerContext` over a standalone tree.
pub struct TreeContext<'a> {
    metadata: TreeMetadata<'a>,
    model: &'a dyn CostModel,
    graph: &'a ConversionGraph,
}

impl<'a> TreeContext<'a> {
    pub fn new(model: &'a dyn CostModel, graph: &'a ConversionGraph) -> Self {
        Self {
            metadata: TreeMetadata::new(model),
            model,
            graph,
        }
    }
}

impl PlannerContext for TreeContext<'_> {
    fn change_traits(&self, rel: &RelRef, _traits: &TraitSet) -> RelRef {
        rel.clone()
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

#[derive(Clone, Copy)]
struct ProgramState {
    order: HepMatchOrder,
    limit: usize,
}

impl Default for ProgramState {
    fn default() -> Self {
        Self {
            order: HepMatchOrder::Arbitrary,
            limit: MATCH_UNTIL_FIXPOINT,
        }
    }
}

/// Input positions from the root to a node.
type Path = Vec<usize>;

/// The program-driven rewriter.
pub struct HepPlanner {
    registry: RuleRegistry,
    conversions: ConversionGraph,
    cost_model: Arc<dyn CostModel>,
    config: HepConfig,
    stats: HepStats,
}

impl HepPlanner {
    pub fn new(cost_model: Arc<dyn CostModel>) -> Self {
        Self::with_config(cost_model, HepConfig::default())
    }

    pub fn with_config(cost_model: Arc<dyn CostModel>, config: HepConfig) -> Self {
        Self {
            registry: RuleRegistry::new(),
            conversions: ConversionGraph::new(),
            cost_model,
            config,
            stats: HepStats::default(),
        }
    }

    /// Make a rule available to by-name, by-class and converter instructions.
    pub fn add_rule(&mut self, rule: Arc<dyn Rule>) -> bool {
        if let Some(converter) = rule.as_converter() {
            self.conversions.add_rule(Arc::new(converter.clone()));
        }
        self.registry.add_rule(rule)
    }

    pub fn add_rule_set(&mut self, set: RuleSet) -> usize {
        set.rules.into_iter().filter(|r| self.add_rule(r.clone())).count()
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn config(&self) -> &HepConfig {
        &self.config
    }

    pub fn stats(&self) -> HepStats {
        self.stats
    }

    /// Run `program` against `root` and return the rewritten tree.
    pub fn execute(&mut self, program: &HepProgram, root: &RelRef) -> Result<RelRef> {
        self.stats = HepStats::default();
        debug!(
            "Starting HEP program: {} instructions, root={}",
            program.len(),
            root.digest()
        );
        let mut seen: HashSet<String> = HashSet::from([root.digest().to_string()]);
        let mut current = root.clone();
        loop {
            self.stats.passes += 1;
            let before = current.digest().to_string();
            current = self.run_program(program, current, &mut seen)?;
            if !self.config.run_to_fixpoint || current.digest() == before {
                break;
            }
            if self.stats.passes >= self.config.max_passes {
                debug!("Hit pass limit ({})", self.config.max_passes);
                break;
            }
        }
        debug!(
            "HEP program complete: passes={}, applications={}, rejected_cycles={}",
            self.stats.passes, self.stats.applications, self.stats.rejected_cycles
        );
        Ok(current)
    }

    fn run_program(&mut self, program: &HepProgram, root: RelRef, seen: &mut HashSet<String>) -> Result<RelRef> {
        let mut state = ProgramState::default();
        let mut current = root;
        for instruction in program.instructions() {
            trace!("Executing instruction {:?}", instruction);
            match instruction {
                HepInstruction::MatchOrder(order) => state.order = *order,
                HepInstruction::MatchLimit(limit) => state.limit = *limit,
                HepInstruction::Group(members) => {
                    let mut rules = Vec::new();
                    for member in members {
                        rules.extend(self.resolve(member)?);
                    }
                    current = self.apply_rules(&rules, current, HepMatchOrder::Arbitrary, MATCH_UNTIL_FIXPOINT, seen);
                }
                HepInstruction::Subprogram(subprogram) => loop {
                    let before = current.digest().to_string();
                    current = self.run_program(subprogram, current, seen)?;
                    if current.digest() == before || self.exhausted() {
                        break;
                    }
                },
                rule_instruction => {
                    let rules = self.resolve(rule_instruction)?;
                    current = self.apply_rules(&rules, current, state.order, state.limit, seen);
                }
            }
        }
        Ok(current)
    }

    fn resolve(&self, instruction: &HepInstruction) -> Result<Vec<Arc<dyn Rule>>> {
        Ok(match instruction {
            HepInstruction::RuleClass(class_name) => self
                .registry
                .rules()
                .iter()
                .filter(|r| {
                    let full = r.class_name();
                    full == class_name || full.rsplit("::").next() == Some(class_name.as_str())
                })
                .cloned()
                .collect(),
            HepInstruction::RuleCollection(rules) => rules.clone(),
            HepInstruction::RuleInstance(rule) => vec![rule.clone()],
            HepInstruction::RuleByName(name) => vec![self
                .registry
                .get(name)
                .ok_or_else(|| PlannerError::InvalidProgram(format!("unknown rule '{name}'")))?],
            HepInstruction::Converters => self.registry.by_type(RuleType::Converter),
            other => {
                return Err(PlannerError::InvalidProgram(format!(
                    "{other:?} does not select rules"
                )))
            }
        })
    }

    fn exhausted(&self) -> bool {
        self.stats.applications >= self.config.max_applications
    }

    fn apply_rules(
        &mut self,
        rules: &[Arc<dyn Rule>],
        root: RelRef,
        order: HepMatchOrder,
        limit: usize,
        seen: &mut HashSet<String>,
    ) -> RelRef {
        let mut names = HashSet::new();
        let rules: Vec<(Arc<dyn Rule>, RuleOperand)> = rules
            .iter()
            .filter(|r| names.insert(r.name().to_string()))
            .map(|r| (r.clone(), r.operand()))
            .collect();
        if rules.is_empty() {
            return root;
        }

        let postorder = order == HepMatchOrder::BottomUp;
        let restart_from_root = matches!(order, HepMatchOrder::BottomUp | HepMatchOrder::TopDown);
        let mut current = root;
        let mut applied = 0usize;
        loop {
            let mut fixed_point = true;
            let mut queue: VecDeque<Path> = subtree_paths(&current, Vec::new(), postorder).into();
            while let Some(path) = queue.pop_front() {
                if self.exhausted() {
                    debug!("Hit application limit ({})", self.config.max_applications);
                    return current;
                }
                let Some(node) = node_at(&current, &path) else {
                    continue;
                };
                let Some((new_root, new_node)) = self.apply_first(&rules, &current, &path, &node, seen) else {
                    continue;
                };
                current = new_root;
                applied += 1;
                if applied >= limit {
                    trace!("Match limit {} reached", limit);
                    return current;
                }
                fixed_point = false;
                queue = match order {
                    HepMatchOrder::BottomUp | HepMatchOrder::TopDown => {
                        subtree_paths(&current, Vec::new(), postorder).into()
                    }
                    HepMatchOrder::Arbitrary => subtree_paths(&new_node, path, false).into(),
                    HepMatchOrder::DepthFirst => {
                        let mut next: VecDeque<Path> = VecDeque::new();
                        for (i, input) in new_node.inputs().iter().enumerate() {
                            let mut child = path.clone();
                            child.push(i);
                            next.extend(subtree_paths(input, child, false));
                        }
                        next.extend(queue.into_iter().filter(|p| !p.starts_with(&path)));
                        next
                    }
                };
            }
            // A restart from the root after the last change already covered
            // the whole tree.
            if fixed_point || restart_from_root {
                return current;
            }
        }
    }

    /// Try each rule at `node` in order; the first that changes the tree wins.
    fn apply_first(
        &mut self,
        rules: &[(Arc<dyn Rule>, RuleOperand)],
        root: &RelRef,
        path: &[usize],
        node: &RelRef,
        seen: &mut HashSet<String>,
    ) -> Option<(RelRef, RelRef)> {
        for (rule, operand) in rules {
            let Some(binding) = bind_first(operand, node, &TreeSource) else {
                continue;
            };
            self.stats.attempts += 1;
            let produced = {
                let ctx = TreeContext::new(self.cost_model.as_ref(), &self.conversions);
                fire(rule.as_ref(), binding, &ctx)
            };
            let replacement = match produced {
                Ok(results) => match results.into_iter().next() {
                    Some(replacement) => replacement,
                    None => continue,
                },
                Err(e) => {
                    warn!("Skipping firing: {}", e);
                    self.stats.failed_firings += 1;
                    continue;
                }
            };
            if replacement.digest() == node.digest() {
                continue;
            }
            let new_root = replace_at(root, path, replacement.clone());
            if !seen.insert(new_root.digest().to_string()) {
                trace!("Rule '{}' would recreate an earlier plan, skipping", rule.name());
                self.stats.rejected_cycles += 1;
                continue;
            }
            self.stats.applications += 1;
            trace!("Applied rule '{}' at {:?}: {}", rule.name(), path, replacement.digest());
            return Some((new_root, replacement));
        }
        None
    }
}

/// Paths of every node under `node`, prefixed with `prefix`.
fn subtree_paths(node: &RelRef, prefix: Path, postorder: bool) -> Vec<Path> {
    let mut out = Vec::new();
    collect_paths(node, prefix, postorder, &mut out);
    out
}

fn collect_paths(node: &RelRef, path: Path, postorder: bool, out: &mut Vec<Path>) {
    if !postorder {
        out.push(path.clone());
    }
    for (i, input) in node.inputs().iter().enumerate() {
        let mut child = path.clone();
        child.push(i);
        collect_paths(input, child, postorder, out);
    }
    if postorder {
        out.push(path);
    }
}

fn node_at(root: &RelRef, path: &[usize]) -> Option<RelRef> {
    let mut node = root;
    for &i in path {
        node = node.inputs().get(i)?;
    }
    Some(node.clone())
}

/// Rebuild the ancestors of `path` around `replacement`.
fn replace_at(node: &RelRef, path: &[usize], replacement: RelRef) -> RelRef {
    let Some((&i, rest)) = path.split_first() else {
        return replacement;
    };
    let mut inputs = node.inputs().to_vec();
    match inputs.get_mut(i) {
        Some(slot) => *slot = replace_at(slot, rest, replacement),
        None => return node.clone(),
    }
    node.copy(node.traits().clone(), inputs)
}
