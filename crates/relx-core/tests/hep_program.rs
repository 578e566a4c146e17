//! End-to-end tests for HEP programs.
//!
//! Trees are stacks of filters over a scan; the rules used here remove or
//! reorder filters so that traversal order and termination are observable
//! from the final tree alone.

use relx_core::convert::ConverterRule;
use relx_core::cost::DefaultCostModel;
use relx_core::error::Result;
use relx_core::expr::{DataType, Expr, Field, RowType, TableRef};
use relx_core::hep::{HepConfig, HepMatchOrder, HepPlanner, HepProgramBuilder, MATCH_UNTIL_FIXPOINT};
use relx_core::node::{OpClass, OpKind, Operator, RelNode, RelRef};
use relx_core::operand::RuleOperand;
use relx_core::rule::{Rule, RuleCall};
use relx_core::traits::{Convention, TraitInterner, TraitSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn scan() -> RelRef {
    let interner = TraitInterner::new();
    RelNode::scan(
        TableRef::new("sales", "orders"),
        RowType::new(vec![
            Field::new("id", DataType::Int64),
            Field::new("amount", DataType::Int64),
        ]),
        1000.0,
        TraitSet::standard(&interner),
    )
}

/// Filters applied bottom to top.
fn filters(conditions: Vec<Expr>) -> RelRef {
    conditions
        .into_iter()
        .fold(scan(), |input, c| RelNode::filter(input, c).unwrap())
}

fn condition_of(node: &RelRef) -> Option<&Expr> {
    match node.op() {
        Operator::Filter { condition } => Some(condition),
        _ => None,
    }
}

fn planner() -> HepPlanner {
    let mut planner = HepPlanner::new(Arc::new(DefaultCostModel::default()));
    planner.add_rule(Arc::new(RemoveFilter));
    planner
}

/// Any filter over X becomes X. Not semantics-preserving, but row types
/// match and the effect of each application is visible.
struct RemoveFilter;

impl Rule for RemoveFilter {
    fn name(&self) -> &str {
        "RemoveFilter"
    }

    fn operand(&self) -> RuleOperand {
        RuleOperand::any(OpClass::Kind(OpKind::Filter))
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()> {
        let input = call.rel(0).input(0).clone();
        call.transform_to(input)
    }
}

/// Swaps a two-way conjunction when its first conjunct's digest sorts
/// before (or after) the second. Two instances with opposite settings undo
/// each other forever.
struct SwapConjuncts {
    name: &'static str,
    when_ascending: bool,
}

impl Rule for SwapConjuncts {
    fn name(&self) -> &str {
        self.name
    }

    fn operand(&self) -> RuleOperand {
        let ascending = self.when_ascending;
        RuleOperand::any(OpClass::Kind(OpKind::Filter)).with_predicate(move |n| match n.op() {
            Operator::Filter {
                condition: Expr::And(c),
            } if c.len() == 2 => (c[0].to_string() < c[1].to_string()) == ascending,
            _ => false,
        })
    }

    fn on_match(&self, call: &mut RuleCall<'_>) -> Result<()> {
        let filter = call.rel(0).clone();
        let Some(Expr::And(conjuncts)) = condition_of(&filter) else {
            return Ok(());
        };
        let swapped = Expr::And(conjuncts.iter().rev().cloned().collect());
        call.transform_to(RelNode::filter(filter.input(0).clone(), swapped)?)
    }
}

/// Counts invocations and never transforms.
#[derive(Default)]
struct CountingRule {
    calls: AtomicUsize,
}

impl Rule for CountingRule {
    fn name(&self) -> &str {
        "CountingRule"
    }

    fn operand(&self) -> RuleOperand {
        RuleOperand::any(OpClass::Kind(OpKind::Filter))
    }

    fn on_match(&self, _call: &mut RuleCall<'_>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn outer() -> Expr {
    Expr::gt(Expr::col(0), Expr::int(1))
}

fn inner() -> Expr {
    Expr::lt(Expr::col(1), Expr::int(10))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_program_without_matches_returns_same_tree() {
    let tree = filters(vec![inner(), outer()]);
    let program = HepProgramBuilder::new()
        .add_rule_instance(Arc::new(SwapConjuncts {
            name: "Swap",
            when_ascending: true,
        }))
        .build()
        .unwrap();
    let mut planner = planner();
    let result = planner.execute(&program, &tree).unwrap();
    assert_eq!(result.digest(), tree.digest());
    assert_eq!(planner.stats().applications, 0);
}

#[test]
fn test_match_limit_caps_applications() {
    let tree = filters(vec![inner(), outer(), Expr::boolean(true)]);
    let program = HepProgramBuilder::new()
        .add_match_limit(1)
        .add_rule_by_description("RemoveFilter")
        .build()
        .unwrap();
    let mut planner = planner();
    let result = planner.execute(&program, &tree).unwrap();
    assert_eq!(planner.stats().applications, 1);
    assert_eq!(condition_of(&result), Some(&outer()));
}

#[test]
fn test_top_down_and_bottom_up_pick_different_first_matches() {
    let tree = filters(vec![inner(), outer()]);

    let top_down = HepProgramBuilder::new()
        .add_match_order(HepMatchOrder::TopDown)
        .add_match_limit(1)
        .add_rule_by_description("RemoveFilter")
        .build()
        .unwrap();
    let result = planner().execute(&top_down, &tree).unwrap();
    assert_eq!(condition_of(&result), Some(&inner()));

    let bottom_up = HepProgramBuilder::new()
        .add_match_order(HepMatchOrder::BottomUp)
        .add_match_limit(1)
        .add_rule_by_description("RemoveFilter")
        .build()
        .unwrap();
    let result = planner().execute(&bottom_up, &tree).unwrap();
    assert_eq!(condition_of(&result), Some(&outer()));
    assert_eq!(result.input(0).kind(), OpKind::Scan);
}

#[test]
fn test_every_match_order_reaches_the_fixpoint() {
    for order in [
        HepMatchOrder::Arbitrary,
        HepMatchOrder::BottomUp,
        HepMatchOrder::TopDown,
        HepMatchOrder::DepthFirst,
    ] {
        let tree = filters(vec![inner(), outer(), Expr::boolean(true)]);
        let program = HepProgramBuilder::new()
            .add_match_order(order)
            .add_match_limit(MATCH_UNTIL_FIXPOINT)
            .add_rule_by_description("RemoveFilter")
            .build()
            .unwrap();
        let mut planner = planner();
        let result = planner.execute(&program, &tree).unwrap();
        assert_eq!(result.kind(), OpKind::Scan, "{order:?}");
        assert_eq!(planner.stats().applications, 3, "{order:?}");
    }
}

#[test]
fn test_group_runs_rules_together_to_fixpoint() {
    let tree = filters(vec![Expr::And(vec![outer(), inner()]), Expr::boolean(true)]);
    let program = HepProgramBuilder::new()
        .add_group_begin()
        .add_rule_by_description("RemoveFilter")
        .add_rule_instance(Arc::new(CountingRule::default()))
        .add_group_end()
        .build()
        .unwrap();
    let result = planner().execute(&program, &tree).unwrap();
    assert_eq!(result.kind(), OpKind::Scan);
}

#[test]
fn test_subprogram_settings_do_not_leak() {
    let tree = filters(vec![inner(), outer(), Expr::boolean(true)]);
    let limited = HepProgramBuilder::new()
        .add_match_limit(1)
        .add_match_order(HepMatchOrder::BottomUp)
        .build()
        .unwrap();
    let program = HepProgramBuilder::new()
        .add_subprogram(limited)
        .add_rule_by_description("RemoveFilter")
        .build()
        .unwrap();
    let mut planner = planner();
    let result = planner.execute(&program, &tree).unwrap();
    assert_eq!(result.kind(), OpKind::Scan);
    assert_eq!(planner.stats().applications, 3);
}

#[test]
fn test_subprogram_repeats_until_stable() {
    let tree = filters(vec![inner(), outer(), Expr::boolean(true)]);
    let one_at_a_time = HepProgramBuilder::new()
        .add_match_limit(1)
        .add_rule_by_description("RemoveFilter")
        .build()
        .unwrap();
    let program = HepProgramBuilder::new()
        .add_subprogram(one_at_a_time)
        .build()
        .unwrap();
    let result = planner().execute(&program, &tree).unwrap();
    assert_eq!(result.kind(), OpKind::Scan);
}

#[test]
fn test_duplicate_rules_fire_once_per_match() {
    let counting = Arc::new(CountingRule::default());
    let rule: Arc<dyn Rule> = counting.clone();
    let program = HepProgramBuilder::new()
        .add_rule_collection(vec![rule.clone(), rule])
        .build()
        .unwrap();
    let tree = filters(vec![outer()]);
    planner().execute(&program, &tree).unwrap();
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_oscillating_rules_terminate() {
    let tree = filters(vec![Expr::And(vec![outer(), inner()])]);
    let program = HepProgramBuilder::new()
        .add_match_limit(MATCH_UNTIL_FIXPOINT)
        .add_rule_instance(Arc::new(SwapConjuncts {
            name: "SwapAscending",
            when_ascending: true,
        }))
        .add_rule_instance(Arc::new(SwapConjuncts {
            name: "SwapDescending",
            when_ascending: false,
        }))
        .build()
        .unwrap();
    let mut planner = HepPlanner::with_config(
        Arc::new(DefaultCostModel::default()),
        HepConfig::default().with_run_to_fixpoint(true).with_max_passes(10),
    );
    let result = planner.execute(&program, &tree).unwrap();
    let stats = planner.stats();
    assert_eq!(stats.applications, 1);
    assert!(stats.rejected_cycles >= 1);
    assert!(stats.passes <= 10);
    assert_ne!(result.digest(), tree.digest());
}

#[test]
fn test_converters_instruction_converts_whole_tree() {
    let mut planner = planner();
    planner.add_rule(Arc::new(ConverterRule::new(
        "AnyToPhysical",
        OpClass::Any,
        Convention::None,
        Convention::Physical,
    )));
    let program = HepProgramBuilder::new().add_converters().build().unwrap();
    let tree = filters(vec![inner(), outer()]);
    let result = planner.execute(&program, &tree).unwrap();

    let mut node = Some(&result);
    while let Some(n) = node {
        assert_eq!(n.convention(), Convention::Physical, "{}", n.digest());
        node = n.inputs().first();
    }
    assert_eq!(planner.stats().applications, 3);
}
