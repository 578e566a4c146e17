//! # Memo: Equivalence Sets
//!
//! The memo is the data structure at the heart of the Volcano search. It stores
//! every alternative plan fragment found so far, grouped into equivalence sets
//! of nodes that produce the same rows.
//!
//! ## Sets and Members
//!
//! Each `EquivalenceSet` holds member nodes whose inputs are `Subset` nodes:
//! references to another set viewed with particular traits. Sharing inputs
//! through sets is what keeps the search polynomial instead of enumerating
//! whole trees.
//!
//! ## De-duplication
//!
//! Members are indexed by a canonical digest in which every input reads
//! `Subset#<representative>.<traits>`. Registering a node whose canonical
//! digest already exists returns the existing set. When a rule proves a
//! node of set A equivalent to set B, the two sets are merged through a
//! union-find; parents of the absorbed set are re-keyed and any duplicates
//! this exposes trigger further merges.
//!
//! ## Costing
//!
//! Each set keeps, per trait-set view, the cheapest member delivering it.
//! New members and merges mark nodes dirty; `propagate_costs` drains that
//! worklist, recording strictly cheaper winners and pushing the set's parents
//! back onto the queue. Only finite costs are recorded, so a view with no
//! winner has no implementable plan yet. On an exact cost tie the member
//! registered first keeps the win.

use crate::cost::{Cost, CostModel};
use crate::error::{PlannerError, Result};
use crate::expr::RowType;
use crate::metadata::{unique_columns, MetadataQuery};
use crate::node::{NodeId, Operator, RelNode, RelRef, SetId};
use crate::operand::MatchSource;
use crate::traits::TraitSet;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, trace};

/// Cheapest known member for one trait-set view.
#[derive(Debug, Clone)]
pub struct Winner {
    pub node: RelRef,
    pub cost: Cost,
}

/// A group of logically equivalent nodes.
#[derive(Debug, Default)]
pub struct EquivalenceSet {
    id: SetId,
    row_type: Arc<RowType>,
    row_count: f64,
    members: Vec<RelRef>,
    parents: Vec<RelRef>,
    views: Vec<TraitSet>,
    required: Vec<TraitSet>,
    best: HashMap<TraitSet, Winner>,
}

impl EquivalenceSet {
    pub fn id(&self) -> SetId {
        self.id
    }

    pub fn row_type(&self) -> &Arc<RowType> {
        &self.row_type
    }

    pub fn row_count(&self) -> f64 {
        self.row_count
    }

    pub fn members(&self) -> &[RelRef] {
        &self.members
    }

    /// Members of other sets (or this one) that read this set.
    pub fn parents(&self) -> &[RelRef] {
        &self.parents
    }

    /// Every trait set this set is known to be viewed with.
    pub fn views(&self) -> &[TraitSet] {
        &self.views
    }

    /// Views requested by parents or by the caller.
    pub fn required(&self) -> &[TraitSet] {
        &self.required
    }

    pub fn best(&self, traits: &TraitSet) -> Option<&Winner> {
        self.best.get(traits)
    }

    fn add_view(&mut self, traits: &TraitSet) -> bool {
        if self.views.contains(traits) {
            return false;
        }
        self.views.push(traits.clone());
        true
    }
}

/// Disjoint-set forest over set ids, with union by rank and path compression.
#[derive(Debug, Default)]
pub struct UnionFind {
    parent: Vec<SetId>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn make_set(&mut self) -> SetId {
        let id = self.parent.len();
        self.parent.push(id);
        self.rank.push(0);
        id
    }

    pub fn find(&self, mut x: SetId) -> SetId {
        while self.parent[x] != x {
            x = self.parent[x];
        }
        x
    }

    pub fn find_mut(&mut self, x: SetId) -> SetId {
        let root = self.find(x);
        let mut cursor = x;
        while self.parent[cursor] != root {
            let next = self.parent[cursor];
            self.parent[cursor] = root;
            cursor = next;
        }
        root
    }

    /// Join the classes of `a` and `b`, returning `(survivor, absorbed)`.
    /// On equal rank `a` survives.
    pub fn union(&mut self, a: SetId, b: SetId) -> (SetId, SetId) {
        let (a, b) = (self.find_mut(a), self.find_mut(b));
        if a == b {
            return (a, a);
        }
        if self.rank[a] < self.rank[b] {
            self.parent[a] = b;
            (b, a)
        } else {
            if self.rank[a] == self.rank[b] {
                self.rank[a] += 1;
            }
            self.parent[b] = a;
            (a, b)
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

#[derive(Default)]
pub struct Memo {
    sets: Vec<EquivalenceSet>,
    uf: UnionFind,
    index: HashMap<String, RelRef>,
    keys: HashMap<NodeId, String>,
    owner: HashMap<NodeId, SetId>,
    seq: HashMap<NodeId, usize>,
    retired: HashSet<NodeId>,
    self_costs: HashMap<NodeId, Cost>,
    member_costs: HashMap<NodeId, Cost>,
    dirty: Vec<RelRef>,
    registrations: usize,
    merges: usize,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current representative of `set`.
    pub fn find(&self, set: SetId) -> SetId {
        self.uf.find(set)
    }

    pub fn set(&self, set: SetId) -> &EquivalenceSet {
        &self.sets[self.uf.find(set)]
    }

    /// Representatives of all live sets, ascending.
    pub fn set_ids(&self) -> Vec<SetId> {
        (0..self.sets.len()).filter(|&i| self.uf.find(i) == i).collect()
    }

    pub fn num_sets(&self) -> usize {
        self.set_ids().len()
    }

    pub fn num_members(&self) -> usize {
        self.set_ids().iter().map(|&s| self.sets[s].members.len()).sum()
    }

    /// Members registered so far, including later-retired duplicates.
    pub fn registrations(&self) -> usize {
        self.registrations
    }

    pub fn merges(&self) -> usize {
        self.merges
    }

    /// Set a registered member or set reference belongs to.
    pub fn set_of(&self, node: &RelNode) -> Option<SetId> {
        match node.op() {
            Operator::Subset { set } => Some(self.uf.find(*set)),
            _ => self.owner.get(&node.id()).map(|s| self.uf.find(*s)),
        }
    }

    pub fn is_retired(&self, node: &RelNode) -> bool {
        self.retired.contains(&node.id())
    }

    /// Last computed cumulative cost of a member.
    pub fn member_cost(&self, node: &RelNode) -> Option<Cost> {
        self.member_costs.get(&node.id()).copied()
    }

    pub fn best(&self, set: SetId, traits: &TraitSet) -> Option<&Winner> {
        self.set(set).best(traits)
    }

    /// Digest with inputs keyed by their sets' current representatives.
    pub fn canonical_key(&self, node: &RelNode) -> String {
        node.digest_with(&|input| match input.op() {
            Operator::Subset { set } => format!("Subset#{}.{}", self.uf.find(*set), input.traits()),
            _ => input.digest().to_string(),
        })
    }

    /// Register `node` and, recursively, its inputs.
    ///
    /// With a `target`, the node is declared equivalent to that set: it joins
    /// it, or the two sets merge when the node already lives elsewhere.
    /// Returns the representative of the node's set.
    pub fn register(&mut self, node: &RelRef, target: Option<SetId>, model: &dyn CostModel) -> Result<SetId> {
        if let Some(t) = target {
            let expected = self.set(t).row_type.clone();
            if *expected != **node.row_type() {
                return Err(PlannerError::InvalidPlan(format!(
                    "cannot register {} into set {} of type {expected}",
                    node.row_type(),
                    self.find(t)
                )));
            }
        }

        if let Operator::Subset { set } = node.op() {
            let set = self.uf.find_mut(*set);
            self.require(set, node.traits());
            return Ok(match target {
                Some(t) => self.merge(t, set),
                None => set,
            });
        }

        let mut inputs = Vec::with_capacity(node.inputs().len());
        let mut rebuilt = false;
        for input in node.inputs() {
            let input_set = self.register(input, None, model)?;
            if matches!(input.op(), Operator::Subset { .. }) {
                inputs.push(input.clone());
            } else {
                let row_type = self.sets[input_set].row_type.clone();
                self.require(input_set, input.traits());
                inputs.push(RelNode::subset(input_set, input.traits().clone(), row_type));
                rebuilt = true;
            }
        }
        let member = if rebuilt {
            node.copy(node.traits().clone(), inputs)
        } else {
            node.clone()
        };

        let key = self.canonical_key(&member);
        if let Some(existing) = self.index.get(&key).cloned() {
            let existing_set = self.set_of(&existing).ok_or_else(|| {
                PlannerError::InvalidPlan(format!("indexed node {key} has no set"))
            })?;
            trace!(digest = %key, set = existing_set, "duplicate registration");
            return Ok(match target {
                Some(t) => self.merge(t, existing_set),
                None => existing_set,
            });
        }

        let set = match target {
            Some(t) => self.uf.find_mut(t),
            None => {
                let rows = model.row_count(&member, &MemoMetadata::new(self, model));
                self.new_set(member.row_type().clone(), rows)
            }
        };
        self.add_member(set, member, key);
        Ok(set)
    }

    fn new_set(&mut self, row_type: Arc<RowType>, row_count: f64) -> SetId {
        let id = self.uf.make_set();
        self.sets.push(EquivalenceSet {
            id,
            row_type,
            row_count,
            ..Default::default()
        });
        trace!(set = id, rows = row_count, "new equivalence set");
        id
    }

    fn add_member(&mut self, set: SetId, member: RelRef, key: String) {
        self.index.insert(key.clone(), member.clone());
        self.keys.insert(member.id(), key);
        self.owner.insert(member.id(), set);
        self.seq.insert(member.id(), self.registrations);
        self.registrations += 1;
        for input in member.inputs() {
            if let Operator::Subset { set: input_set } = input.op() {
                let input_set = self.uf.find(*input_set);
                self.sets[input_set].parents.push(member.clone());
            }
        }
        let target = &mut self.sets[set];
        target.add_view(member.traits());
        target.members.push(member.clone());
        trace!(set, digest = member.digest(), "registered member");
        self.dirty.push(member);
    }

    /// Record that `set` is requested with `traits`.
    pub fn require(&mut self, set: SetId, traits: &TraitSet) {
        let set = self.uf.find_mut(set);
        let entry = &mut self.sets[set];
        if !entry.required.contains(traits) {
            entry.required.push(traits.clone());
        }
        if entry.add_view(traits) {
            self.dirty.extend(entry.members.iter().cloned());
        }
    }

    /// Merge two sets, returning the survivor.
    pub fn merge(&mut self, a: SetId, b: SetId) -> SetId {
        let (a, b) = (self.uf.find_mut(a), self.uf.find_mut(b));
        if a == b {
            return a;
        }
        let (root, gone) = self.uf.union(a, b);
        self.merges += 1;
        debug!(survivor = root, absorbed = gone, "merging equivalence sets");

        let absorbed = std::mem::take(&mut self.sets[gone]);
        let survivor = &mut self.sets[root];
        survivor.members.extend(absorbed.members);
        survivor.parents.extend(absorbed.parents);
        for view in absorbed.views {
            survivor.add_view(&view);
        }
        for view in absorbed.required {
            if !survivor.required.contains(&view) {
                survivor.required.push(view);
            }
        }
        for (view, winner) in absorbed.best {
            let keep = survivor
                .best
                .get(&view)
                .map_or(false, |w| w.cost.is_le(&winner.cost));
            if !keep {
                survivor.best.insert(view, winner);
            }
        }
        self.dirty.extend(self.sets[root].members.iter().cloned());

        let mut cascade = Vec::new();
        let parents = self.sets[root].parents.clone();
        for parent in parents {
            if self.retired.contains(&parent.id()) {
                continue;
            }
            let new_key = self.canonical_key(&parent);
            let old_key = self.keys.get(&parent.id()).cloned();
            if old_key.as_deref() == Some(new_key.as_str()) {
                continue;
            }
            if let Some(old) = old_key {
                if self.index.get(&old).map_or(false, |n| n.id() == parent.id()) {
                    self.index.remove(&old);
                }
            }
            match self.index.get(&new_key).cloned() {
                Some(other) if other.id() != parent.id() => {
                    let (Some(ps), Some(os)) = (self.set_of(&parent), self.set_of(&other)) else {
                        continue;
                    };
                    self.retire(&parent, &other);
                    if ps != os {
                        cascade.push((os, ps));
                    }
                }
                _ => {
                    self.index.insert(new_key.clone(), parent.clone());
                    self.keys.insert(parent.id(), new_key);
                }
            }
        }
        for (x, y) in cascade {
            self.merge(x, y);
        }
        self.uf.find(root)
    }

    /// Drop `dup` in favor of the identical `keep`.
    fn retire(&mut self, dup: &RelRef, keep: &RelRef) {
        trace!(digest = dup.digest(), "retiring duplicate member");
        self.retired.insert(dup.id());
        self.keys.remove(&dup.id());
        if let Some(set) = self.set_of(dup) {
            let entry = &mut self.sets[set];
            entry.members.retain(|m| m.id() != dup.id());
            for winner in entry.best.values_mut() {
                if winner.node.id() == dup.id() {
                    winner.node = keep.clone();
                }
            }
        }
        for input in dup.inputs() {
            if let Operator::Subset { set } = input.op() {
                let set = self.uf.find(*set);
                self.sets[set].parents.retain(|p| p.id() != dup.id());
            }
        }
        self.dirty.push(keep.clone());
    }

    fn compute_cost(&mut self, member: &RelRef, model: &dyn CostModel) -> Cost {
        let own = match self.self_costs.get(&member.id()) {
            Some(c) => *c,
            None => {
                let c = model.self_cost(member, &MemoMetadata::new(self, model));
                self.self_costs.insert(member.id(), c);
                c
            }
        };
        if own.is_infinite() {
            return own;
        }
        let mut total = own;
        for input in member.inputs() {
            let Operator::Subset { set } = input.op() else {
                return Cost::infinite();
            };
            match self.best(*set, input.traits()) {
                Some(w) => total = total.plus(&w.cost),
                None => return Cost::infinite(),
            }
        }
        total
    }

    /// Drain the dirty worklist, updating winners. Returns the number of
    /// members that improved at least one view.
    pub fn propagate_costs(&mut self, model: &dyn CostModel) -> usize {
        let mut queue: VecDeque<RelRef> = std::mem::take(&mut self.dirty).into();
        let mut improved = 0;
        while let Some(member) = queue.pop_front() {
            if self.retired.contains(&member.id()) {
                continue;
            }
            let Some(set) = self.set_of(&member) else {
                continue;
            };
            let cost = self.compute_cost(&member, model);
            self.member_costs.insert(member.id(), cost);
            if cost.is_infinite() {
                continue;
            }
            let seq = self.seq.get(&member.id()).copied().unwrap_or(usize::MAX);
            let views: Vec<TraitSet> = self.sets[set]
                .views
                .iter()
                .filter(|v| member.traits().satisfies(v))
                .cloned()
                .collect();
            let mut changed = false;
            for view in views {
                let better = match self.sets[set].best.get(&view) {
                    None => true,
                    Some(w) => {
                        let incumbent = self.seq.get(&w.node.id()).copied().unwrap_or(usize::MAX);
                        cost.is_lt(&w.cost)
                            || (w.node.id() != member.id()
                                && cost.is_eq_with_epsilon(&w.cost)
                                && seq < incumbent)
                    }
                };
                if better {
                    trace!(set, view = %view, cost = %cost, digest = member.digest(), "new winner");
                    self.sets[set].best.insert(
                        view,
                        Winner {
                            node: member.clone(),
                            cost,
                        },
                    );
                    changed = true;
                }
            }
            if changed {
                improved += 1;
                queue.extend(self.sets[set].parents.iter().cloned());
            }
        }
        improved
    }

    /// Cheapest tree for `set` viewed with `traits`.
    pub fn extract(&self, set: SetId, traits: &TraitSet) -> Result<RelRef> {
        let mut visiting = HashSet::new();
        self.extract_inner(set, traits, &mut visiting)
    }

    fn extract_inner(
        &self,
        set: SetId,
        traits: &TraitSet,
        visiting: &mut HashSet<(SetId, TraitSet)>,
    ) -> Result<RelRef> {
        let set = self.find(set);
        let winner = self.sets[set].best.get(traits).ok_or_else(|| PlannerError::NoPlan {
            traits: traits.to_string(),
        })?;
        if !visiting.insert((set, traits.clone())) {
            return Err(PlannerError::CyclicPlan(set));
        }
        let mut inputs = Vec::with_capacity(winner.node.inputs().len());
        for input in winner.node.inputs() {
            match input.op() {
                Operator::Subset { set: child } => {
                    inputs.push(self.extract_inner(*child, input.traits(), visiting)?)
                }
                _ => inputs.push(input.clone()),
            }
        }
        visiting.remove(&(set, traits.clone()));
        Ok(winner.node.copy(winner.node.traits().clone(), inputs))
    }

    /// Human-readable listing of every live set.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for id in self.set_ids() {
            let set = &self.sets[id];
            let _ = writeln!(out, "Set#{id} rows={} {}", set.row_count, set.row_type);
            for member in &set.members {
                let cost = self
                    .member_cost(member)
                    .map_or_else(|| "-".to_string(), |c| c.to_string());
                let _ = writeln!(out, "  {} cost={cost}", self.canonical_key(member));
            }
            let mut views: Vec<&TraitSet> = set.best.keys().collect();
            views.sort_by_key(|v| v.to_string());
            for view in views {
                if let Some(w) = set.best.get(view) {
                    let _ = writeln!(out, "  best {view}: {} {}", w.node.op(), w.cost);
                }
            }
        }
        out
    }
}

impl MatchSource for Memo {
    fn candidates(&self, parent: &RelRef, ordinal: usize) -> Vec<RelRef> {
        let Some(input) = parent.inputs().get(ordinal) else {
            return vec![];
        };
        match input.op() {
            Operator::Subset { set } => self
                .set(*set)
                .members
                .iter()
                .filter(|m| m.traits().satisfies(input.traits()))
                .cloned()
                .collect(),
            _ => vec![input.clone()],
        }
    }
}

/// Metadata over memo members: set references answer from their set.
///
/// Uniqueness answers are cached per `(set, columns)` for the lifetime of
/// the query object. A set reached again while it is still being expanded
/// answers `None`, which keeps self-referential sets finite.
pub struct MemoMetadata<'a> {
    memo: &'a Memo,
    model: &'a dyn CostModel,
    unique: RefCell<HashMap<(SetId, Vec<usize>), Option<bool>>>,
    expanded: Cell<usize>,
}

impl<'a> MemoMetadata<'a> {
    pub fn new(memo: &'a Memo, model: &'a dyn CostModel) -> Self {
        Self {
            memo,
            model,
            unique: RefCell::new(HashMap::new()),
            expanded: Cell::new(0),
        }
    }

    /// Number of sets whose members were walked for a uniqueness answer.
    pub fn sets_expanded(&self) -> usize {
        self.expanded.get()
    }
}

impl MetadataQuery for MemoMetadata<'_> {
    fn row_count(&self, node: &RelNode) -> f64 {
        match node.op() {
            Operator::Subset { set } => self.memo.set(*set).row_count,
            _ => self.model.row_count(node, self),
        }
    }

    fn are_columns_unique(&self, node: &RelNode, columns: &[usize]) -> Option<bool> {
        let Operator::Subset { set } = node.op() else {
            return unique_columns(node, columns, self);
        };
        let key = (self.memo.find(*set), columns.to_vec());
        let cached = self.unique.borrow().get(&key).copied();
        if let Some(known) = cached {
            return known;
        }
        self.unique.borrow_mut().insert(key.clone(), None);
        self.expanded.set(self.expanded.get() + 1);
        let proven = self
            .memo
            .set(key.0)
            .members
            .iter()
            .any(|m| unique_columns(m, columns, self) == Some(true));
        let answer = proven.then_some(true);
        self.unique.borrow_mut().insert(key, answer);
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::DefaultCostModel;
    use crate::expr::{DataType, Expr, Field, TableRef};
    use crate::traits::{Convention, RelTrait, TraitInterner};

    fn physical_scan(interner: &Arc<TraitInterner>, name: &str, rows: f64) -> RelRef {
        RelNode::scan(
            TableRef::new("s", name),
            RowType::new(vec![Field::new("a", DataType::Int64)]),
            rows,
            TraitSet::standard(interner).replace(RelTrait::Convention(Convention::Physical)),
        )
    }

    #[test]
    fn test_union_find_compresses_paths() {
        let mut uf = UnionFind::default();
        let ids: Vec<SetId> = (0..4).map(|_| uf.make_set()).collect();
        uf.union(ids[0], ids[1]);
        uf.union(ids[2], ids[3]);
        let (root, _) = uf.union(ids[1], ids[3]);
        for id in ids {
            assert_eq!(uf.find_mut(id), root);
        }
    }

    #[test]
    fn test_register_dedups_structurally_equal_trees() {
        let interner = TraitInterner::new();
        let model = DefaultCostModel::default();
        let mut memo = Memo::new();
        let a = RelNode::filter(physical_scan(&interner, "t", 100.0), Expr::gt(Expr::col(0), Expr::int(1))).unwrap();
        let b = RelNode::filter(physical_scan(&interner, "t", 100.0), Expr::gt(Expr::col(0), Expr::int(1))).unwrap();
        let sa = memo.register(&a, None, &model).unwrap();
        let sb = memo.register(&b, None, &model).unwrap();
        assert_eq!(sa, sb);
        assert_eq!(memo.num_sets(), 2);
        assert_eq!(memo.num_members(), 2);
    }

    #[test]
    fn test_merge_moves_members_and_exposes_duplicates() {
        let interner = TraitInterner::new();
        let model = DefaultCostModel::default();
        let mut memo = Memo::new();
        let cond = Expr::gt(Expr::col(0), Expr::int(1));
        let over_t = RelNode::filter(physical_scan(&interner, "t", 100.0), cond.clone()).unwrap();
        let over_u = RelNode::filter(physical_scan(&interner, "u", 100.0), cond).unwrap();
        let st = memo.register(&over_t, None, &model).unwrap();
        let su = memo.register(&over_u, None, &model).unwrap();
        assert_ne!(st, su);
        // Declaring the scans equivalent makes both filters identical.
        let scan_t = memo.set_of(&memo.set(st).members()[0].inputs()[0]).unwrap();
        let scan_u = memo.set_of(&memo.set(su).members()[0].inputs()[0]).unwrap();
        memo.merge(scan_t, scan_u);
        assert_eq!(memo.find(st), memo.find(su));
        assert_eq!(memo.set(st).members().len(), 1);
        assert_eq!(memo.merges(), 2);
    }

    #[test]
    fn test_costs_propagate_and_extract() {
        let interner = TraitInterner::new();
        let model = DefaultCostModel::default();
        let mut memo = Memo::new();
        let plan = RelNode::filter(physical_scan(&interner, "t", 100.0), Expr::gt(Expr::col(0), Expr::int(1))).unwrap();
        let set = memo.register(&plan, None, &model).unwrap();
        memo.require(set, plan.traits());
        assert!(memo.propagate_costs(&model) > 0);
        let best = memo.extract(set, plan.traits()).unwrap();
        assert_eq!(best.digest(), plan.digest());
        let none = TraitSet::standard(&interner);
        assert!(matches!(memo.extract(set, &none), Err(PlannerError::NoPlan { .. })));
    }

    #[test]
    fn test_equal_cost_tie_prefers_first_registered() {
        let interner = TraitInterner::new();
        let model = DefaultCostModel::default();
        let mut memo = Memo::new();
        let first = physical_scan(&interner, "t", 100.0);
        let second = physical_scan(&interner, "u", 100.0);
        let set = memo.register(&first, None, &model).unwrap();
        memo.register(&second, Some(set), &model).unwrap();
        memo.propagate_costs(&model);
        let winner = memo.best(set, first.traits()).unwrap();
        assert_eq!(winner.node.digest(), first.digest());
    }

    #[test]
    fn test_uniqueness_walks_self_referential_sets_once() {
        let interner = TraitInterner::new();
        let model = DefaultCostModel::default();
        let mut memo = Memo::new();
        let scan = physical_scan(&interner, "t", 100.0);
        let agg = RelNode::aggregate(scan.clone(), vec![0], vec![]).unwrap();
        let scan_set = memo.register(&scan, None, &model).unwrap();
        let agg_set = memo.register(&agg, None, &model).unwrap();
        // Filters over their own set, as merges produce.
        for set in [scan_set, agg_set] {
            let row_type = memo.set(set).row_type().clone();
            for bound in 0..12 {
                let own = RelNode::subset(set, scan.traits().clone(), row_type.clone());
                let filter = RelNode::filter(own, Expr::gt(Expr::col(0), Expr::int(bound))).unwrap();
                memo.register(&filter, Some(set), &model).unwrap();
            }
        }

        let mq = MemoMetadata::new(&memo, &model);
        let scan_ref = RelNode::subset(scan_set, scan.traits().clone(), memo.set(scan_set).row_type().clone());
        assert_eq!(mq.are_columns_unique(&scan_ref, &[0]), None);
        assert_eq!(mq.sets_expanded(), 1);

        let agg_ref = RelNode::subset(agg_set, scan.traits().clone(), memo.set(agg_set).row_type().clone());
        assert_eq!(mq.are_columns_unique(&agg_ref, &[0]), Some(true));
        assert_eq!(mq.are_columns_unique(&agg_ref, &[0]), Some(true));
        assert_eq!(mq.sets_expanded(), 2);
    }
}
