//! # Built-in Optimization Rules
//!
//! This crate provides the default rules for both relx engines. Rules are
//! divided into two categories:
//!
//! ## Transformation Rules
//!
//! These rules produce equivalent alternatives in the same convention:
//!
//! - **`FilterAggregateTransposeRule`**: pushes conjuncts on grouping keys
//!   below an aggregate.
//! - **`AggregateFilterTransposeRule`**: pushes an aggregate below a filter,
//!   widening its group set and rolling up on top when needed.
//! - **`FilterMergeRule`**: merges stacked filters.
//! - **`FilterConjunctionSortRule`**: puts conjuncts into a canonical order.
//! - **`FilterIntoJoinRule`**: merges a filter into an inner join condition.
//! - **`JoinCommuteRule`**: swaps inner join inputs, restoring column order
//!   with a projection.
//! - **`ProjectRemoveRule`**: drops identity projections.
//! - **`UnionToDistinctRule`**: turns a distinct union into an aggregate over
//!   `UNION ALL`.
//!
//! ## Converter Rules
//!
//! `converters` holds one rule per operator kind for `NONE -> LOGICAL` and
//! `LOGICAL -> PHYSICAL`. See that module for the union restriction.
//!
//! With the HEP rewriter, transformation rules are usually applied through a
//! program that names them. With the Volcano search, registering
//! `default_rule_set()` is enough to produce physical plans.

pub mod aggregate_filter_transpose;
pub mod converters;
pub mod filter_aggregate_transpose;
pub mod filter_conjunction_order;
pub mod filter_merge;
pub mod join_commutativity;
pub mod predicate_pushdown;
pub mod project_remove;
pub mod union_to_distinct;

#[cfg(test)]
mod testing;

pub use aggregate_filter_transpose::AggregateFilterTransposeRule;
pub use filter_aggregate_transpose::FilterAggregateTransposeRule;
pub use filter_conjunction_order::FilterConjunctionSortRule;
pub use filter_merge::FilterMergeRule;
pub use join_commutativity::JoinCommuteRule;
pub use predicate_pushdown::FilterIntoJoinRule;
pub use project_remove::ProjectRemoveRule;
pub use union_to_distinct::UnionToDistinctRule;

use relx_core::rule::{Rule, RuleRegistry, RuleSet};
use std::sync::Arc;

/// Transformation rules only, in a stable order.
pub fn transformation_rule_set() -> RuleSet {
    let rules: Vec<Arc<dyn Rule>> = vec![
        Arc::new(FilterAggregateTransposeRule),
        Arc::new(AggregateFilterTransposeRule),
        Arc::new(FilterMergeRule),
        Arc::new(FilterConjunctionSortRule),
        Arc::new(FilterIntoJoinRule),
        Arc::new(JoinCommuteRule),
        Arc::new(ProjectRemoveRule),
        Arc::new(UnionToDistinctRule),
    ];
    RuleSet::new("transformations", rules)
}

/// Every built-in rule: transformations first, then both converter sets.
pub fn default_rule_set() -> RuleSet {
    let mut rules = transformation_rule_set().rules;
    rules.extend(converters::logical_rule_set().rules);
    rules.extend(converters::physical_rule_set().rules);
    RuleSet::new("default", rules)
}

/// Create a registry holding every built-in rule, looked up by name.
///
/// This is what the rewriter resolves `add_rule_by_description` against and
/// what the server lists. Callers can add their own rules to the result.
pub fn default_rule_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();
    registry.add_rule_set(default_rule_set());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use relx_core::rule::RuleType;

    #[test]
    fn test_registry_has_every_rule_once() {
        let registry = default_rule_registry();
        assert_eq!(registry.len(), default_rule_set().rules.len());
        assert!(registry.get("FilterAggregateTransposeRule").is_some());
        assert!(registry.get("UnionLogicalToPhysical").is_some());
        assert_eq!(
            registry.by_type(RuleType::Transformation).len(),
            transformation_rule_set().rules.len()
        );
    }

    #[test]
    fn test_rules_are_selectable_by_class() {
        let registry = default_rule_registry();
        let class = std::any::type_name::<FilterMergeRule>();
        assert_eq!(registry.by_class(class).len(), 1);
        assert!(registry.by_class("FilterMergeRule").is_empty());
    }
}
