//! # Operator Nodes
//!
//! A `RelNode` is one relational operator: an `Operator` payload, a trait set,
//! an ordered list of inputs and a row type. Nodes are immutable and shared
//! through `Arc`; rewriting a plan builds new nodes and reuses untouched
//! subtrees.
//!
//! ## Digest
//!
//! The digest is a canonical string identifying a node's semantics: operator
//! parameters, trait set and input digests. It is computed lazily once and
//! never changes. Two nodes with equal digests are interchangeable, which is
//! what both engines de-duplicate on.
//!
//! ## Set References
//!
//! Inside the equivalence-set engine a node's inputs are `Subset` nodes: a
//! reference to "any member of set N delivering these traits". A subset's
//! digest is `Subset#N.<traits>`, so parents of merged sets can be re-keyed by
//! rewriting only that prefix.

use crate::catalog::Catalog;
use crate::error::{PlannerError, Result};
use crate::expr::{AggCall, Expr, Field, JoinType, RowType, TableRef};
use crate::traits::{Collation, Convention, RelTrait, TraitDef, TraitSet};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Identifier of an equivalence set.
pub type SetId = usize;

pub type RelRef = Arc<RelNode>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identity. Used for registration order and binding
/// de-duplication, never for semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Operator kinds, used by rule operands to match without inspecting payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Scan,
    Filter,
    Project,
    Join,
    Aggregate,
    Sort,
    Union,
    Intersect,
    Converter,
    Subset,
}

/// Operator class an operand matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpClass {
    /// Every operator except set references.
    Any,
    /// Union or Intersect.
    SetOp,
    Kind(OpKind),
}

impl OpClass {
    pub fn matches(&self, kind: OpKind) -> bool {
        match self {
            OpClass::Any => kind != OpKind::Subset,
            OpClass::SetOp => matches!(kind, OpKind::Union | OpKind::Intersect),
            OpClass::Kind(k) => *k == kind,
        }
    }
}

/// Relational operator payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operator {
    Scan {
        table: TableRef,
        rows: f64,
    },
    Filter {
        condition: Expr,
    },
    Project {
        exprs: Vec<Expr>,
        names: Vec<String>,
    },
    Join {
        join_type: JoinType,
        condition: Expr,
    },
    Aggregate {
        group_set: Vec<usize>,
        calls: Vec<AggCall>,
    },
    Sort {
        collation: Collation,
        offset: usize,
        fetch: Option<usize>,
    },
    Union {
        all: bool,
    },
    Intersect {
        all: bool,
    },
    /// Changes exactly one trait category of its single input.
    Converter {
        trait_def: TraitDef,
    },
    /// Reference to an equivalence set, viewed with the node's traits.
    Subset {
        set: SetId,
    },
}

impl Operator {
    pub fn kind(&self) -> OpKind {
        match self {
            Operator::Scan { .. } => OpKind::Scan,
            Operator::Filter { .. } => OpKind::Filter,
            Operator::Project { .. } => OpKind::Project,
            Operator::Join { .. } => OpKind::Join,
            Operator::Aggregate { .. } => OpKind::Aggregate,
            Operator::Sort { .. } => OpKind::Sort,
            Operator::Union { .. } => OpKind::Union,
            Operator::Intersect { .. } => OpKind::Intersect,
            Operator::Converter { .. } => OpKind::Converter,
            Operator::Subset { .. } => OpKind::Subset,
        }
    }
}

// Scan row estimates are compared bitwise through OrderedFloat so operators
// can key hash maps.
impl PartialEq for Operator {
    fn eq(&self, other: &Self) -> bool {
        use Operator::*;
        match (self, other) {
            (Scan { table: t1, rows: r1 }, Scan { table: t2, rows: r2 }) => {
                t1 == t2 && OrderedFloat(*r1) == OrderedFloat(*r2)
            }
            (Filter { condition: a }, Filter { condition: b }) => a == b,
            (
                Project {
                    exprs: e1,
                    names: n1,
                },
                Project {
                    exprs: e2,
                    names: n2,
                },
            ) => e1 == e2 && n1 == n2,
            (
                Join {
                    join_type: j1,
                    condition: c1,
                },
                Join {
                    join_type: j2,
                    condition: c2,
                },
            ) => j1 == j2 && c1 == c2,
            (
                Aggregate {
                    group_set: g1,
                    calls: c1,
                },
                Aggregate {
                    group_set: g2,
                    calls: c2,
                },
            ) => g1 == g2 && c1 == c2,
            (
                Sort {
                    collation: c1,
                    offset: o1,
                    fetch: f1,
                },
                Sort {
                    collation: c2,
                    offset: o2,
                    fetch: f2,
                },
            ) => c1 == c2 && o1 == o2 && f1 == f2,
            (Union { all: a }, Union { all: b }) => a == b,
            (Intersect { all: a }, Intersect { all: b }) => a == b,
            (Converter { trait_def: a }, Converter { trait_def: b }) => a == b,
            (Subset { set: a }, Subset { set: b }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Operator {}

impl Hash for Operator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Scan { table, .. } => write!(f, "Scan(table=[{table}])"),
            Operator::Filter { condition } => write!(f, "Filter(condition=[{condition}])"),
            Operator::Project { exprs, names } => {
                f.write_str("Project(")?;
                for (i, (e, n)) in exprs.iter().zip(names.iter()).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{n}=[{e}]")?;
                }
                f.write_str(")")
            }
            Operator::Join {
                join_type,
                condition,
            } => write!(
                f,
                "Join(condition=[{condition}], joinType=[{}])",
                format!("{join_type:?}").to_lowercase()
            ),
            Operator::Aggregate { group_set, calls } => {
                f.write_str("Aggregate(group=[{")?;
                for (i, g) in group_set.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{g}")?;
                }
                f.write_str("}]")?;
                for call in calls {
                    write!(f, ", {}=[{call}]", call.name)?;
                }
                f.write_str(")")
            }
            Operator::Sort {
                collation,
                offset,
                fetch,
            } => {
                write!(f, "Sort(sort={collation}")?;
                if *offset > 0 {
                    write!(f, ", offset=[{offset}]")?;
                }
                if let Some(n) = fetch {
                    write!(f, ", fetch=[{n}]")?;
                }
                f.write_str(")")
            }
            Operator::Union { all } => write!(f, "Union(all=[{all}])"),
            Operator::Intersect { all } => write!(f, "Intersect(all=[{all}])"),
            Operator::Converter { trait_def } => write!(f, "Converter({})", trait_def.name()),
            Operator::Subset { set } => write!(f, "Subset#{set}"),
        }
    }
}

/// An immutable relational operator node.
#[derive(Debug)]
pub struct RelNode {
    id: NodeId,
    op: Operator,
    traits: TraitSet,
    inputs: Vec<RelRef>,
    row_type: Arc<RowType>,
    digest: OnceLock<String>,
}

fn check_refs(expr: &Expr, arity: usize, what: &str) -> Result<()> {
    match expr.max_input_ref() {
        Some(max) if max >= arity => Err(PlannerError::InvalidPlan(format!(
            "{what} references ${max} but the input has {arity} fields"
        ))),
        _ => Ok(()),
    }
}

impl RelNode {
    /// Assemble a node without validation. Constructors below check their
    /// arguments first; engines use this for set references and copies.
    pub fn from_parts(
        op: Operator,
        traits: TraitSet,
        inputs: Vec<RelRef>,
        row_type: Arc<RowType>,
    ) -> RelRef {
        Arc::new(RelNode {
            id: NodeId::next(),
            op,
            traits,
            inputs,
            row_type,
            digest: OnceLock::new(),
        })
    }

    pub fn scan(table: TableRef, row_type: RowType, rows: f64, traits: TraitSet) -> RelRef {
        Self::from_parts(Operator::Scan { table, rows }, traits, vec![], Arc::new(row_type))
    }

    /// Scan a catalog table, taking its columns and row count from the catalog.
    pub fn scan_table(catalog: &dyn Catalog, table: &TableRef, traits: TraitSet) -> Result<RelRef> {
        let columns = catalog
            .get_table_columns(table)
            .ok_or_else(|| PlannerError::UnknownTable(table.to_string()))?;
        let rows = catalog
            .get_table_stats(table)
            .map(|s| s.row_count)
            .unwrap_or(1000.0);
        Ok(Self::scan(table.clone(), columns, rows, traits))
    }

    /// Filter keeps its input's traits: filtering preserves order and placement.
    pub fn filter(input: RelRef, condition: Expr) -> Result<RelRef> {
        check_refs(&condition, input.row_type.arity(), "filter condition")?;
        let traits = input.traits.clone();
        let row_type = input.row_type.clone();
        Ok(Self::from_parts(
            Operator::Filter { condition },
            traits,
            vec![input],
            row_type,
        ))
    }

    pub fn project(input: RelRef, exprs: Vec<Expr>, names: Vec<String>) -> Result<RelRef> {
        if exprs.len() != names.len() {
            return Err(PlannerError::InvalidPlan(format!(
                "project has {} expressions but {} names",
                exprs.len(),
                names.len()
            )));
        }
        for e in &exprs {
            check_refs(e, input.row_type.arity(), "project expression")?;
        }
        let fields = exprs
            .iter()
            .zip(names.iter())
            .map(|(e, n)| Field::new(n.clone(), e.data_type(&input.row_type)))
            .collect();
        let traits = input.traits.reset_except(TraitDef::Convention);
        Ok(Self::from_parts(
            Operator::Project { exprs, names },
            traits,
            vec![input],
            Arc::new(RowType::new(fields)),
        ))
    }

    pub fn join(left: RelRef, right: RelRef, join_type: JoinType, condition: Expr) -> Result<RelRef> {
        let combined = left.row_type.concat(&right.row_type);
        check_refs(&condition, combined.arity(), "join condition")?;
        let row_type = if join_type.projects_right() {
            combined
        } else {
            left.row_type.as_ref().clone()
        };
        let traits = left.traits.reset_except(TraitDef::Convention);
        Ok(Self::from_parts(
            Operator::Join {
                join_type,
                condition,
            },
            traits,
            vec![left, right],
            Arc::new(row_type),
        ))
    }

    /// `group_set` must be strictly increasing input ordinals.
    pub fn aggregate(input: RelRef, group_set: Vec<usize>, calls: Vec<AggCall>) -> Result<RelRef> {
        let arity = input.row_type.arity();
        if group_set.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PlannerError::InvalidPlan(
                "aggregate group set must be sorted and distinct".to_string(),
            ));
        }
        if let Some(bad) = group_set
            .iter()
            .chain(calls.iter().flat_map(|c| c.args.iter()))
            .find(|i| **i >= arity)
        {
            return Err(PlannerError::InvalidPlan(format!(
                "aggregate references ${bad} but the input has {arity} fields"
            )));
        }
        let mut fields: Vec<Field> = group_set
            .iter()
            .filter_map(|g| input.row_type.field(*g).cloned())
            .collect();
        fields.extend(
            calls
                .iter()
                .map(|c| Field::new(c.name.clone(), c.data_type(&input.row_type))),
        );
        let traits = input.traits.reset_except(TraitDef::Convention);
        Ok(Self::from_parts(
            Operator::Aggregate { group_set, calls },
            traits,
            vec![input],
            Arc::new(RowType::new(fields)),
        ))
    }

    pub fn sort(input: RelRef, collation: Collation, offset: usize, fetch: Option<usize>) -> Result<RelRef> {
        let arity = input.row_type.arity();
        if let Some(fc) = collation.fields().iter().find(|fc| fc.field >= arity) {
            return Err(PlannerError::InvalidPlan(format!(
                "sort key ${} out of range for {arity} fields",
                fc.field
            )));
        }
        let traits = input.traits.replace(RelTrait::Collation(collation.clone()));
        let row_type = input.row_type.clone();
        Ok(Self::from_parts(
            Operator::Sort {
                collation,
                offset,
                fetch,
            },
            traits,
            vec![input],
            row_type,
        ))
    }

    pub fn union(inputs: Vec<RelRef>, all: bool) -> Result<RelRef> {
        Self::set_op(Operator::Union { all }, inputs)
    }

    pub fn intersect(inputs: Vec<RelRef>, all: bool) -> Result<RelRef> {
        Self::set_op(Operator::Intersect { all }, inputs)
    }

    fn set_op(op: Operator, inputs: Vec<RelRef>) -> Result<RelRef> {
        let first = inputs
            .first()
            .ok_or_else(|| PlannerError::InvalidPlan(format!("{:?} needs inputs", op.kind())))?;
        if let Some(bad) = inputs
            .iter()
            .find(|i| !i.row_type.is_union_compatible(&first.row_type))
        {
            return Err(PlannerError::InvalidPlan(format!(
                "set operator input {} is not compatible with {}",
                bad.row_type, first.row_type
            )));
        }
        let traits = first.traits.reset_except(TraitDef::Convention);
        let row_type = first.row_type.clone();
        Ok(Self::from_parts(op, traits, inputs, row_type))
    }

    /// Node delivering its input with one trait changed to `to`.
    pub fn converter(input: RelRef, to: RelTrait) -> Result<RelRef> {
        let trait_def = to.def();
        if input.traits.get(trait_def) == Some(&to) {
            return Err(PlannerError::InvalidPlan(format!(
                "converter to {to} does not change any trait"
            )));
        }
        let traits = input.traits.replace(to);
        let row_type = input.row_type.clone();
        Ok(Self::from_parts(
            Operator::Converter { trait_def },
            traits,
            vec![input],
            row_type,
        ))
    }

    pub fn subset(set: SetId, traits: TraitSet, row_type: Arc<RowType>) -> RelRef {
        Self::from_parts(Operator::Subset { set }, traits, vec![], row_type)
    }

    /// Same operator and row type with new traits and inputs.
    pub fn copy(&self, traits: TraitSet, inputs: Vec<RelRef>) -> RelRef {
        debug_assert_eq!(inputs.len(), self.inputs.len());
        Self::from_parts(self.op.clone(), traits, inputs, self.row_type.clone())
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn op(&self) -> &Operator {
        &self.op
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    pub fn traits(&self) -> &TraitSet {
        &self.traits
    }

    pub fn convention(&self) -> Convention {
        self.traits.convention()
    }

    pub fn inputs(&self) -> &[RelRef] {
        &self.inputs
    }

    /// Input at ordinal `i`. Panics when out of range, like slice indexing.
    pub fn input(&self, i: usize) -> &RelRef {
        &self.inputs[i]
    }

    pub fn row_type(&self) -> &Arc<RowType> {
        &self.row_type
    }

    /// Canonical identity string, computed once.
    pub fn digest(&self) -> &str {
        self.digest
            .get_or_init(|| self.digest_with(&|input| input.digest().to_string()))
    }

    /// Digest with input digests supplied by `input_key`. The memo uses this
    /// to key nodes by the current representative of each input set.
    pub fn digest_with(&self, input_key: &dyn Fn(&RelNode) -> String) -> String {
        let mut out = format!("{}.{}", self.op, self.traits);
        if !self.inputs.is_empty() {
            out.push('[');
            for (i, input) in self.inputs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&input_key(input));
            }
            out.push(']');
        }
        out
    }

    /// Indented multi-line rendering of the tree, one node per line.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&format!("{} {}\n", self.op, self.traits));
        for input in &self.inputs {
            input.explain_into(out, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::DataType;
    use crate::traits::{FieldCollation, TraitInterner};

    fn scan() -> RelRef {
        let interner = TraitInterner::new();
        let row_type = RowType::new(vec![
            Field::new("a", DataType::Int64),
            Field::new("b", DataType::Utf8),
        ]);
        RelNode::scan(TableRef::new("s", "t"), row_type, 100.0, TraitSet::standard(&interner))
    }

    #[test]
    fn test_digest_is_structural() {
        let input = scan();
        let cond = Expr::eq(Expr::col(1), Expr::string("x"));
        let a = RelNode::filter(input.clone(), cond.clone()).unwrap();
        let b = RelNode::filter(input, cond).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.digest(), b.digest());
        assert_eq!(
            a.digest(),
            "Filter(condition=[=($1, 'x')]).NONE.[].any[Scan(table=[s.t]).NONE.[].any]"
        );
    }

    #[test]
    fn test_digest_distinguishes_traits() {
        let input = scan();
        let physical = input.copy(
            input.traits().replace(RelTrait::Convention(Convention::Physical)),
            vec![],
        );
        assert_ne!(input.digest(), physical.digest());
    }

    #[test]
    fn test_constructors_validate_references() {
        let input = scan();
        assert!(RelNode::filter(input.clone(), Expr::col(2)).is_err());
        assert!(RelNode::project(input.clone(), vec![Expr::col(0)], vec![]).is_err());
        assert!(RelNode::aggregate(input.clone(), vec![1, 0], vec![]).is_err());
        assert!(RelNode::sort(input.clone(), Collation::of(vec![FieldCollation::asc(5)]), 0, None).is_err());
        assert!(RelNode::union(vec![], true).is_err());
        let converted = RelNode::converter(input.clone(), RelTrait::Convention(Convention::None));
        assert!(converted.is_err());
    }

    #[test]
    fn test_aggregate_row_type() {
        let agg = RelNode::aggregate(scan(), vec![1], vec![AggCall::count_star("c")]).unwrap();
        let names: Vec<&str> = agg.row_type().fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        let types: Vec<DataType> = agg.row_type().fields.iter().map(|f| f.data_type).collect();
        assert_eq!(types, vec![DataType::Utf8, DataType::Int64]);
    }

    #[test]
    fn test_sort_sets_collation_trait() {
        let collation = Collation::of(vec![FieldCollation::desc(0)]);
        let sorted = RelNode::sort(scan(), collation.clone(), 0, Some(10)).unwrap();
        assert_eq!(
            sorted.traits().get(TraitDef::Collation),
            Some(&RelTrait::Collation(collation))
        );
        assert!(sorted.explain().starts_with("Sort(sort=[0 DESC], fetch=[10])"));
    }
}
