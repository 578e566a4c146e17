//! # JSON Wire Protocol
//!
//! Request and response bodies for the optimizer endpoints.
//!
//! Plans arrive as a tree of `PlanSpec` nodes tagged by `"op"`. Scans name a
//! catalog table; everything else carries the same payload as the matching
//! operator constructor. Expressions use the `Expr` serde encoding, e.g.
//!
//! ```json
//! {"op": "filter",
//!  "condition": {"binary_op": {"op": "eq", "left": {"input_ref": 0},
//!                              "right": {"literal": {"Int64": 10}}}},
//!  "input": {"op": "scan", "schema": "hr", "table": "emp"}}
//! ```
//!
//! Rewriter programs are instruction lists tagged by `"instruction"`.

use relx_core::catalog::Catalog;
use relx_core::cost::Cost;
use relx_core::error::{PlannerError, Result};
use relx_core::expr::{AggCall, Expr, JoinType, TableRef};
use relx_core::hep::{HepMatchOrder, HepProgram, HepProgramBuilder, HepStats};
use relx_core::node::{RelNode, RelRef};
use relx_core::search::SearchStats;
use relx_core::traits::{Collation, Convention, Distribution, RelTrait, TraitInterner, TraitSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A logical plan tree as sent by clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanSpec {
    Scan {
        schema: String,
        table: String,
    },
    Filter {
        condition: Expr,
        input: Box<PlanSpec>,
    },
    Project {
        exprs: Vec<Expr>,
        names: Vec<String>,
        input: Box<PlanSpec>,
    },
    Join {
        #[serde(default = "default_join_type")]
        join_type: JoinType,
        condition: Expr,
        left: Box<PlanSpec>,
        right: Box<PlanSpec>,
    },
    Aggregate {
        group_set: Vec<usize>,
        #[serde(default)]
        calls: Vec<AggCall>,
        input: Box<PlanSpec>,
    },
    Sort {
        collation: Collation,
        #[serde(default)]
        offset: usize,
        fetch: Option<usize>,
        input: Box<PlanSpec>,
    },
    Union {
        #[serde(default)]
        all: bool,
        inputs: Vec<PlanSpec>,
    },
    Intersect {
        #[serde(default)]
        all: bool,
        inputs: Vec<PlanSpec>,
    },
}

fn default_join_type() -> JoinType {
    JoinType::Inner
}

impl PlanSpec {
    /// Build the operator tree. Scans start in the `NONE` convention with the
    /// catalog's columns and row count.
    pub fn build(&self, catalog: &dyn Catalog, interner: &Arc<TraitInterner>) -> Result<RelRef> {
        let build_all = |inputs: &[PlanSpec]| -> Result<Vec<RelRef>> {
            inputs.iter().map(|i| i.build(catalog, interner)).collect()
        };
        match self {
            PlanSpec::Scan { schema, table } => RelNode::scan_table(
                catalog,
                &TableRef::new(schema.clone(), table.clone()),
                TraitSet::standard(interner),
            ),
            PlanSpec::Filter { condition, input } => {
                RelNode::filter(input.build(catalog, interner)?, condition.clone())
            }
            PlanSpec::Project {
                exprs,
                names,
                input,
            } => RelNode::project(input.build(catalog, interner)?, exprs.clone(), names.clone()),
            PlanSpec::Join {
                join_type,
                condition,
                left,
                right,
            } => RelNode::join(
                left.build(catalog, interner)?,
                right.build(catalog, interner)?,
                *join_type,
                condition.clone(),
            ),
            PlanSpec::Aggregate {
                group_set,
                calls,
                input,
            } => RelNode::aggregate(input.build(catalog, interner)?, group_set.clone(), calls.clone()),
            PlanSpec::Sort {
                collation,
                offset,
                fetch,
                input,
            } => RelNode::sort(input.build(catalog, interner)?, collation.clone(), *offset, *fetch),
            PlanSpec::Union { all, inputs } => RelNode::union(build_all(inputs)?, *all),
            PlanSpec::Intersect { all, inputs } => RelNode::intersect(build_all(inputs)?, *all),
        }
    }
}

/// Traits the optimized root must deliver.
#[derive(Debug, Clone, Deserialize)]
pub struct RequiredTraits {
    #[serde(default = "default_convention")]
    pub convention: Convention,
    #[serde(default)]
    pub collation: Option<Collation>,
    #[serde(default)]
    pub distribution: Option<Distribution>,
}

fn default_convention() -> Convention {
    Convention::Physical
}

impl Default for RequiredTraits {
    fn default() -> Self {
        Self {
            convention: default_convention(),
            collation: None,
            distribution: None,
        }
    }
}

impl RequiredTraits {
    pub fn to_trait_set(&self, interner: &Arc<TraitInterner>) -> TraitSet {
        let mut traits = TraitSet::standard(interner).replace(RelTrait::Convention(self.convention));
        if let Some(collation) = &self.collation {
            traits = traits.replace(RelTrait::Collation(collation.clone()));
        }
        if let Some(distribution) = &self.distribution {
            traits = traits.replace(RelTrait::Distribution(distribution.clone()));
        }
        traits
    }
}

/// Body of `POST /optimize`.
#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub plan: PlanSpec,
    #[serde(default)]
    pub required: RequiredTraits,
}

/// One rewriter program instruction.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "instruction", rename_all = "snake_case")]
pub enum InstructionSpec {
    /// A registered rule, by name.
    Rule { name: String },
    /// Every registered rule of a Rust type, by full or short type name.
    RuleClass { class: String },
    Converters,
    MatchOrder { order: HepMatchOrder },
    MatchLimit { limit: usize },
    /// Rules applied together to a fixpoint.
    Group { rules: Vec<String> },
    Subprogram { instructions: Vec<InstructionSpec> },
}

/// Assemble a program from instructions. Errors surface from `build`.
pub fn build_program(instructions: &[InstructionSpec]) -> Result<HepProgram> {
    let mut builder = HepProgramBuilder::new();
    for instruction in instructions {
        builder = match instruction {
            InstructionSpec::Rule { name } => builder.add_rule_by_description(name.clone()),
            InstructionSpec::RuleClass { class } => builder.add_rule_class(class.clone()),
            InstructionSpec::Converters => builder.add_converters(),
            InstructionSpec::MatchOrder { order } => builder.add_match_order(*order),
            InstructionSpec::MatchLimit { limit } => builder.add_match_limit(*limit),
            InstructionSpec::Group { rules } => {
                if rules.is_empty() {
                    return Err(PlannerError::InvalidProgram("empty group".to_string()));
                }
                let grouped = rules
                    .iter()
                    .fold(builder.add_group_begin(), |b, name| b.add_rule_by_description(name.clone()));
                grouped.add_group_end()
            }
            InstructionSpec::Subprogram { instructions } => {
                builder.add_subprogram(build_program(instructions)?)
            }
        };
    }
    builder.build()
}

/// Body of `POST /rewrite`.
#[derive(Debug, Deserialize)]
pub struct RewriteRequest {
    pub plan: PlanSpec,
    pub program: Vec<InstructionSpec>,
}

/// Optimized plan as returned to clients.
#[derive(Debug, Serialize)]
pub struct PlanResponse<S: Serialize> {
    pub explain: String,
    pub digest: String,
    pub cost: Cost,
    pub stats: S,
}

pub type OptimizeResponse = PlanResponse<SearchStats>;
pub type RewriteResponse = PlanResponse<HepStats>;
