//! # Aggregate-Filter Transpose Rule
//!
//! Moves an aggregate below the filter it sits on. The new aggregate groups
//! by its old keys plus every column the filter reads, so the filter can still
//! be evaluated above it.
//!
//! ```text
//! Before: Aggregate(group={0}, SUM($2), Filter($1 > 5, Input))
//! After:  Aggregate(group={0}, SUM($2),
//!             Filter($1 > 5, Aggregate(group={0, 1}, SUM($2), Input)))
//! ```
//!
//! When the filter only reads existing keys, the extra top aggregate is not
//! needed and the result is just `Filter(Aggregate(Input))`.
//!
//! ## Rollup
//!
//! The top aggregate re-aggregates the lower one's outputs: SUM, MIN and MAX
//! roll up as themselves, COUNT rolls up as `$SUM0` so that a group with no
//! surviving rows still counts 0 rather than NULL. AVG and DISTINCT calls cannot
//! be rolled up, so the rule does not fire for them.
//!
//! ## Termination
//!
//! If the filter input is already unique on the widened key, aggregating it
//! again gains nothing. Without this check the rule would re-fire on its own
//! output forever.

use relx_core::error::Result;
use relx_core::expr::{AggCall, AggFunc};
use relx_core::node::{OpClass, OpKind, Operator, RelNode};
use relx_core::operand::RuleOperand;
use relx_core::rule::{Rule, RuleCall};
use std::collections::BTreeSet;

/// Aggregate(Filter) -> [Aggregate](Filter(Aggregate)).
pub struct AggregateFilterTransposeRule;

fn rollup(func: AggFunc) -> Option<AggFunc> {
    match func {
        AggFunc::Count | AggFunc::Sum0 => Some(AggFunc::Sum0),
        AggFunc::Sum => Some(AggFunc::Sum),
        AggFunc::Min => Some(AggFunc::Min),
        AggFunc::Max => Some(AggFunc::Max),
        AggFunc::Avg => None,
    }
}

impl Rule for AggregateFilterTransposeRule {
    fn name(&self) -> &str {
        "AggregateFilterTransposeRule"
    }

    fn operand(&self) -> RuleOperand {
        RuleOperand::some(
            OpClass::Kind(OpKind::Aggregate),
            vec![RuleOperand::any(OpClass::Kind(OpKind::Filter))],
        )
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()> {
        let aggregate = call.rel(0).clone();
        let filter = call.rel(1).clone();
        let Operator::Aggregate { group_set, calls } = aggregate.op() else {
            return Ok(());
        };
        let Operator::Filter { condition } = filter.op() else {
            return Ok(());
        };

        let filter_columns = condition.input_refs();
        let widened: Vec<usize> = group_set
            .iter()
            .copied()
            .chain(filter_columns.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let input = filter.input(0).clone();
        if call.metadata().are_columns_unique(&input, &widened) == Some(true) {
            return Ok(());
        }

        let lower = RelNode::aggregate(input, widened.clone(), calls.clone())?;
        let position = |column: usize| widened.binary_search(&column).unwrap_or(column);
        let moved = RelNode::filter(lower, condition.map_inputs(&position))?;

        let all_keys = filter_columns.iter().all(|c| group_set.contains(c));
        if all_keys {
            return call.transform_to(moved);
        }

        let top_group: Vec<usize> = group_set.iter().map(|c| position(*c)).collect();
        let mut top_calls = Vec::with_capacity(calls.len());
        for (offset, agg_call) in calls.iter().enumerate() {
            let Some(func) = rollup(agg_call.func) else {
                return Ok(());
            };
            if agg_call.distinct {
                return Ok(());
            }
            top_calls.push(AggCall::new(func, vec![widened.len() + offset], agg_call.name.clone()));
        }
        let top = RelNode::aggregate(moved, top_group, top_calls)?;
        call.transform_to(top)
    }
}
