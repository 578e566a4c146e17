//! # Standard Converter Rules
//!
//! Two converter sets move plans across the built-in conventions:
//!
//! - **`NONE -> LOGICAL`**: one rule per operator kind. Plans arrive in
//!   `NONE`, which has infinite cost, so nothing is extractable until these
//!   have fired.
//! - **`LOGICAL -> PHYSICAL`**: one rule per operator kind, except that the
//!   union converter only accepts `UNION ALL`. Distinct unions reach the
//!   physical convention through `UnionToDistinctRule` instead.
//!
//! Registering either set with an engine also records the convention edge in
//! its conversion graph, which is what lets a required convention be
//! enforced on a set.

use relx_core::convert::ConverterRule;
use relx_core::node::{OpClass, OpKind, Operator};
use relx_core::rule::{Rule, RuleSet};
use relx_core::traits::Convention;
use std::sync::Arc;

/// Operator kinds that plans are built from. `Converter` and `Subset` are
/// produced by the engines and never need converting.
pub const CONVERTIBLE_KINDS: [OpKind; 8] = [
    OpKind::Scan,
    OpKind::Filter,
    OpKind::Project,
    OpKind::Join,
    OpKind::Aggregate,
    OpKind::Sort,
    OpKind::Union,
    OpKind::Intersect,
];

fn kind_name(kind: OpKind) -> String {
    format!("{kind:?}")
}

/// `NONE -> LOGICAL` for every plan operator kind.
pub fn logical_converters() -> Vec<Arc<ConverterRule>> {
    CONVERTIBLE_KINDS
        .iter()
        .map(|kind| {
            Arc::new(ConverterRule::new(
                format!("{}NoneToLogical", kind_name(*kind)),
                OpClass::Kind(*kind),
                Convention::None,
                Convention::Logical,
            ))
        })
        .collect()
}

/// `LOGICAL -> PHYSICAL` for every plan operator kind; unions must be `ALL`.
pub fn physical_converters() -> Vec<Arc<ConverterRule>> {
    CONVERTIBLE_KINDS
        .iter()
        .map(|kind| {
            let rule = ConverterRule::new(
                format!("{}LogicalToPhysical", kind_name(*kind)),
                OpClass::Kind(*kind),
                Convention::Logical,
                Convention::Physical,
            );
            let rule = match kind {
                OpKind::Union => rule.with_predicate(|n| matches!(n.op(), Operator::Union { all: true })),
                _ => rule,
            };
            Arc::new(rule)
        })
        .collect()
}

fn as_rules(converters: Vec<Arc<ConverterRule>>) -> Vec<Arc<dyn Rule>> {
    converters
        .into_iter()
        .map(|c| c as Arc<dyn Rule>)
        .collect()
}

pub fn logical_rule_set() -> RuleSet {
    RuleSet::new("none-to-logical", as_rules(logical_converters()))
}

pub fn physical_rule_set() -> RuleSet {
    RuleSet::new("logical-to-physical", as_rules(physical_converters()))
}
