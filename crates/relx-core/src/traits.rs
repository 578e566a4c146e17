//! # Physical Traits and Trait Sets
//!
//! Traits describe physical characteristics of an operator's output. They are
//! how the optimizer reasons about "interesting orders", data placement and
//! whether a node is implementable at all.
//!
//! ## Trait Definitions
//!
//! Each trait belongs to exactly one `TraitDef` (a category):
//! - **Convention**: the calling convention. `NONE` marks purely logical nodes
//!   that cannot be executed; converter rules move nodes to an executable one.
//! - **Collation**: output sort order, satisfied by any longer sort sharing the
//!   same prefix. This is the only category allowing multiple values at once.
//! - **Distribution**: how rows are spread across workers. Everything satisfies
//!   `ANY`.
//!
//! ## Satisfaction
//!
//! `satisfies` is a partial order: reflexive, transitive and antisymmetric for
//! non-composite traits. A composite trait (several collations at once)
//! satisfies a requirement when any member does.
//!
//! ## Interning
//!
//! Traits and trait sets are canonicalized through a `TraitInterner`, so that
//! equal sets share one representative and can usually be compared by pointer.
//! The interner holds weak references: representatives nobody uses are dropped
//! and can be rebuilt later.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// A category of physical trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitDef {
    Convention,
    Collation,
    Distribution,
}

impl TraitDef {
    pub const ALL: [TraitDef; 3] = [
        TraitDef::Convention,
        TraitDef::Collation,
        TraitDef::Distribution,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TraitDef::Convention => "convention",
            TraitDef::Collation => "collation",
            TraitDef::Distribution => "distribution",
        }
    }

    /// Whether a node may carry several values of this category at once.
    pub fn multiple(&self) -> bool {
        matches!(self, TraitDef::Collation)
    }

    /// The weakest trait of this category.
    pub fn default_trait(&self) -> RelTrait {
        match self {
            TraitDef::Convention => RelTrait::Convention(Convention::None),
            TraitDef::Collation => RelTrait::Collation(Collation::empty()),
            TraitDef::Distribution => RelTrait::Distribution(Distribution::Any),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Convention {
    /// Logical, not implementable.
    None,
    Logical,
    Physical,
}

impl Convention {
    pub fn name(&self) -> &'static str {
        match self {
            Convention::None => "NONE",
            Convention::Logical => "LOGICAL",
            Convention::Physical => "PHYSICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldCollation {
    pub field: usize,
    pub direction: Direction,
}

impl FieldCollation {
    pub fn asc(field: usize) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: usize) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }
}

/// Sort order over output fields. Empty means unordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Collation(pub Vec<FieldCollation>);

impl Collation {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn of(fields: Vec<FieldCollation>) -> Self {
        Self(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[FieldCollation] {
        &self.0
    }

    /// Output sorted by `self` is also sorted by any prefix of it.
    pub fn satisfies(&self, required: &Collation) -> bool {
        self.0.starts_with(&required.0)
    }
}

impl fmt::Display for Collation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, fc) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", fc.field)?;
            if fc.direction == Direction::Desc {
                f.write_str(" DESC")?;
            }
        }
        f.write_str("]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    Any,
    Single,
    Broadcast,
    Hash(Vec<usize>),
    RoundRobin,
}

impl Distribution {
    pub fn satisfies(&self, required: &Distribution) -> bool {
        *required == Distribution::Any || self == required
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Any => f.write_str("any"),
            Distribution::Single => f.write_str("single"),
            Distribution::Broadcast => f.write_str("broadcast"),
            Distribution::RoundRobin => f.write_str("round_robin"),
            Distribution::Hash(keys) => {
                f.write_str("hash[")?;
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A physical trait value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelTrait {
    Convention(Convention),
    Collation(Collation),
    Distribution(Distribution),
    /// Several values of a multi-valued category, sorted and de-duplicated.
    Composite(TraitDef, Vec<RelTrait>),
}

impl RelTrait {
    pub fn def(&self) -> TraitDef {
        match self {
            RelTrait::Convention(_) => TraitDef::Convention,
            RelTrait::Collation(_) => TraitDef::Collation,
            RelTrait::Distribution(_) => TraitDef::Distribution,
            RelTrait::Composite(def, _) => *def,
        }
    }

    /// Build a canonical composite. Nested composites are flattened and
    /// members implied by another member are dropped; a single member
    /// collapses to that member and no members to the default trait.
    pub fn composite(def: TraitDef, members: Vec<RelTrait>) -> RelTrait {
        let mut flat: Vec<RelTrait> = Vec::with_capacity(members.len());
        for m in members {
            match m {
                RelTrait::Composite(_, inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        flat.sort();
        flat.dedup();
        let implied: Vec<bool> = flat
            .iter()
            .map(|m| flat.iter().any(|other| other != m && other.satisfies(m)))
            .collect();
        let mut implied = implied.into_iter();
        flat.retain(|_| !implied.next().unwrap_or(false));
        match flat.len() {
            0 => def.default_trait(),
            1 => flat.remove(0),
            _ if !def.multiple() => flat.remove(0),
            _ => RelTrait::Composite(def, flat),
        }
    }

    pub fn satisfies(&self, required: &RelTrait) -> bool {
        match (self, required) {
            (_, RelTrait::Composite(_, wanted)) => wanted.iter().all(|w| self.satisfies(w)),
            (RelTrait::Composite(_, members), _) => members.iter().any(|m| m.satisfies(required)),
            (RelTrait::Convention(a), RelTrait::Convention(b)) => a == b,
            (RelTrait::Collation(a), RelTrait::Collation(b)) => a.satisfies(b),
            (RelTrait::Distribution(a), RelTrait::Distribution(b)) => a.satisfies(b),
            _ => false,
        }
    }

    /// Whether this trait is, or contains, `member`.
    pub fn contains(&self, member: &RelTrait) -> bool {
        match self {
            RelTrait::Composite(_, members) => members.iter().any(|m| m == member),
            other => other == member,
        }
    }
}

impl fmt::Display for RelTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelTrait::Convention(c) => f.write_str(c.name()),
            RelTrait::Collation(c) => write!(f, "{c}"),
            RelTrait::Distribution(d) => write!(f, "{d}"),
            RelTrait::Composite(_, members) => {
                f.write_str("[")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{m}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Canonicalizing cache over weak references.
///
/// `intern` is atomic per key: the map entry stays locked while a fresh
/// representative is created, so two live representatives of one value never
/// coexist.
pub struct Interner<T: Eq + Hash> {
    map: DashMap<T, Weak<T>>,
}

impl<T: Eq + Hash + Clone> Interner<T> {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    pub fn intern(&self, value: T) -> Arc<T> {
        match self.map.entry(value) {
            Entry::Occupied(mut entry) => {
                if let Some(live) = entry.get().upgrade() {
                    return live;
                }
                let fresh = Arc::new(entry.key().clone());
                entry.insert(Arc::downgrade(&fresh));
                fresh
            }
            Entry::Vacant(entry) => {
                let fresh = Arc::new(entry.key().clone());
                entry.insert(Arc::downgrade(&fresh));
                fresh
            }
        }
    }

    /// Drop entries whose representative is no longer referenced.
    pub fn purge(&self) {
        self.map.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Number of live representatives.
    pub fn len(&self) -> usize {
        self.map
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Eq + Hash + Clone> Default for Interner<T> {
    fn default() -> Self {
        Self::new()
    }
}

type Slots = Vec<Arc<RelTrait>>;

/// Canonical store for traits and trait sets, shared by every node of a plan.
#[derive(Default)]
pub struct TraitInterner {
    traits: Interner<RelTrait>,
    sets: Interner<Slots>,
}

impl TraitInterner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn canonize(&self, t: RelTrait) -> Arc<RelTrait> {
        self.traits.intern(t)
    }

    fn canonize_slots(&self, slots: Slots) -> Arc<Slots> {
        self.sets.intern(slots)
    }

    pub fn purge(&self) {
        self.traits.purge();
        self.sets.purge();
    }

    pub fn live_traits(&self) -> usize {
        self.traits.len()
    }

    pub fn live_sets(&self) -> usize {
        self.sets.len()
    }
}

/// One trait per category, in a fixed category order.
///
/// Trait sets are immutable; every "modification" returns the canonical set
/// for the new contents.
#[derive(Clone)]
pub struct TraitSet {
    slots: Arc<Slots>,
    interner: Arc<TraitInterner>,
}

impl TraitSet {
    /// Default traits for the given categories.
    pub fn new(interner: &Arc<TraitInterner>, defs: &[TraitDef]) -> TraitSet {
        let traits = defs.iter().map(|d| d.default_trait()).collect();
        Self::of(interner, traits)
    }

    /// Default traits for all three categories.
    pub fn standard(interner: &Arc<TraitInterner>) -> TraitSet {
        Self::new(interner, &TraitDef::ALL)
    }

    /// Trait set holding exactly `traits`. A later trait of an already
    /// present category replaces the earlier one.
    pub fn of(interner: &Arc<TraitInterner>, traits: Vec<RelTrait>) -> TraitSet {
        let mut slots: Slots = Vec::with_capacity(traits.len());
        for t in traits {
            let canon = interner.canonize(t);
            match slots.iter_mut().find(|s| s.def() == canon.def()) {
                Some(slot) => *slot = canon,
                None => slots.push(canon),
            }
        }
        TraitSet {
            slots: interner.canonize_slots(slots),
            interner: interner.clone(),
        }
    }

    fn with_slots(&self, slots: Slots) -> TraitSet {
        TraitSet {
            slots: self.interner.canonize_slots(slots),
            interner: self.interner.clone(),
        }
    }

    pub fn interner(&self) -> &Arc<TraitInterner> {
        &self.interner
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelTrait> {
        self.slots.iter().map(|t| t.as_ref())
    }

    pub fn defs(&self) -> Vec<TraitDef> {
        self.slots.iter().map(|t| t.def()).collect()
    }

    pub fn get(&self, def: TraitDef) -> Option<&RelTrait> {
        self.slots.iter().find(|t| t.def() == def).map(|t| t.as_ref())
    }

    /// Convention slot, `NONE` when the set has no convention.
    pub fn convention(&self) -> Convention {
        match self.get(TraitDef::Convention) {
            Some(RelTrait::Convention(c)) => *c,
            _ => Convention::None,
        }
    }

    /// Replace the slot of `t`'s category, or append one.
    pub fn replace(&self, t: RelTrait) -> TraitSet {
        let canon = self.interner.canonize(t);
        let mut slots: Slots = self.slots.as_ref().clone();
        match slots.iter_mut().find(|s| s.def() == canon.def()) {
            Some(slot) => {
                if **slot == *canon {
                    return self.clone();
                }
                *slot = canon;
            }
            None => slots.push(canon),
        }
        self.with_slots(slots)
    }

    /// Replace a multi-valued category with all of `traits` at once.
    pub fn replace_all(&self, def: TraitDef, traits: Vec<RelTrait>) -> TraitSet {
        self.replace(RelTrait::composite(def, traits))
    }

    /// Every slot of `other` replaces this set's slot of the same category.
    pub fn plus(&self, other: &TraitSet) -> TraitSet {
        other.iter().fold(self.clone(), |acc, t| acc.replace(t.clone()))
    }

    /// Reset every category except `keep` to its default trait.
    pub fn reset_except(&self, keep: TraitDef) -> TraitSet {
        let slots = self
            .slots
            .iter()
            .map(|t| {
                if t.def() == keep {
                    t.clone()
                } else {
                    self.interner.canonize(t.def().default_trait())
                }
            })
            .collect();
        self.with_slots(slots)
    }

    /// Each slot of `required` is satisfied by this set's slot of the same
    /// category. A missing category only satisfies its default trait.
    pub fn satisfies(&self, required: &TraitSet) -> bool {
        if Arc::ptr_eq(&self.slots, &required.slots) {
            return true;
        }
        required.slots.iter().all(|r| match self.get(r.def()) {
            Some(mine) => mine.satisfies(r),
            None => r.def().default_trait().satisfies(r),
        })
    }

    /// Whether a slot is, or contains, `t`.
    pub fn contains(&self, t: &RelTrait) -> bool {
        self.get(t.def()).map_or(false, |slot| slot.contains(t))
    }

    /// Slots of `required` that this set does not satisfy, in category order.
    pub fn unsatisfied(&self, required: &TraitSet) -> Vec<RelTrait> {
        required
            .iter()
            .filter(|r| match self.get(r.def()) {
                Some(mine) => !mine.satisfies(r),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Pointer identity of the canonical representative.
    pub fn is_same(&self, other: &TraitSet) -> bool {
        Arc::ptr_eq(&self.slots, &other.slots)
    }
}

impl PartialEq for TraitSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slots, &other.slots) || self.slots == other.slots
    }
}

impl Eq for TraitSet {}

impl Hash for TraitSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slots.hash(state);
    }
}

impl fmt::Display for TraitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.slots.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{t}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TraitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraitSet({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(fields: &[usize]) -> RelTrait {
        RelTrait::Collation(Collation::of(
            fields.iter().map(|f| FieldCollation::asc(*f)).collect(),
        ))
    }

    #[test]
    fn test_collation_prefix_satisfaction() {
        assert!(sorted(&[0, 1]).satisfies(&sorted(&[0])));
        assert!(sorted(&[0]).satisfies(&sorted(&[])));
        assert!(!sorted(&[0]).satisfies(&sorted(&[0, 1])));
        assert!(!sorted(&[1, 0]).satisfies(&sorted(&[0])));
    }

    #[test]
    fn test_everything_satisfies_any_distribution() {
        let any = RelTrait::Distribution(Distribution::Any);
        for d in [
            Distribution::Single,
            Distribution::Broadcast,
            Distribution::Hash(vec![1]),
            Distribution::RoundRobin,
        ] {
            assert!(RelTrait::Distribution(d.clone()).satisfies(&any));
            assert!(!any.satisfies(&RelTrait::Distribution(d)));
        }
    }

    #[test]
    fn test_composite_satisfies_if_any_member_does() {
        let both = RelTrait::composite(TraitDef::Collation, vec![sorted(&[0]), sorted(&[1])]);
        assert!(both.satisfies(&sorted(&[1])));
        assert!(!both.satisfies(&sorted(&[2])));
        assert!(both.contains(&sorted(&[0])));
        let single = RelTrait::composite(TraitDef::Collation, vec![sorted(&[0]), sorted(&[0])]);
        assert_eq!(single, sorted(&[0]));
    }

    #[test]
    fn test_composite_drops_implied_members() {
        let prefix_and_longer = RelTrait::composite(TraitDef::Collation, vec![sorted(&[0]), sorted(&[0, 1])]);
        assert_eq!(prefix_and_longer, sorted(&[0, 1]));
        let single = sorted(&[0, 1]);
        assert!(prefix_and_longer.satisfies(&single) && single.satisfies(&prefix_and_longer));
        let kept = RelTrait::composite(TraitDef::Collation, vec![sorted(&[1]), sorted(&[0, 1])]);
        assert!(matches!(kept, RelTrait::Composite(_, ref members) if members.len() == 2));
    }

    #[test]
    fn test_equal_sets_share_one_representative() {
        let interner = TraitInterner::new();
        let a = TraitSet::standard(&interner).replace(RelTrait::Convention(Convention::Physical));
        let b = TraitSet::new(&interner, &TraitDef::ALL)
            .replace(RelTrait::Convention(Convention::Physical));
        assert!(a.is_same(&b));
        assert_eq!(a.to_string(), "PHYSICAL.[].any");
    }

    #[test]
    fn test_replace_and_reset() {
        let interner = TraitInterner::new();
        let base = TraitSet::standard(&interner);
        let sorted_set = base
            .replace(sorted(&[2]))
            .replace(RelTrait::Convention(Convention::Logical));
        assert_eq!(sorted_set.convention(), Convention::Logical);
        assert!(sorted_set.satisfies(&base.replace(RelTrait::Convention(Convention::Logical))));
        let reset = sorted_set.reset_except(TraitDef::Convention);
        assert_eq!(reset.get(TraitDef::Collation), Some(&sorted(&[])));
        assert_eq!(reset.convention(), Convention::Logical);
        assert_eq!(
            base.unsatisfied(&sorted_set),
            vec![RelTrait::Convention(Convention::Logical), sorted(&[2])]
        );
    }

    #[test]
    fn test_interner_drops_unused_representatives() {
        let interner = TraitInterner::new();
        {
            let _held = TraitSet::standard(&interner).replace(sorted(&[7]));
            assert!(interner.live_sets() >= 1);
        }
        interner.purge();
        let before = interner.live_sets();
        let again = TraitSet::standard(&interner).replace(sorted(&[7]));
        assert_eq!(again.get(TraitDef::Collation), Some(&sorted(&[7])));
        assert!(interner.live_sets() > before);
    }
}
