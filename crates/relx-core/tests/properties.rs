//! Property tests for the algebraic laws the engines rely on: cost
//! arithmetic, the trait `satisfies` order and structural digests.

use proptest::prelude::*;
use relx_core::cost::Cost;
use relx_core::expr::{DataType, Expr, Field, RowType, TableRef};
use relx_core::node::RelNode;
use relx_core::traits::{Collation, Direction, Distribution, FieldCollation, RelTrait, TraitDef, TraitInterner, TraitSet};

fn finite_cost() -> impl Strategy<Value = Cost> {
    (0.0..1e6f64, 0.0..1e6f64, 0.0..1e6f64).prop_map(|(r, c, i)| Cost::new(r, c, i))
}

fn nonzero_cost() -> impl Strategy<Value = Cost> {
    (1.0..1e6f64, 1.0..1e6f64, 1.0..1e6f64).prop_map(|(r, c, i)| Cost::new(r, c, i))
}

fn collation() -> impl Strategy<Value = Collation> {
    prop::collection::vec((0usize..4, any::<bool>()), 0..4).prop_map(|fields| {
        Collation::of(
            fields
                .into_iter()
                .map(|(field, desc)| FieldCollation {
                    field,
                    direction: if desc { Direction::Desc } else { Direction::Asc },
                })
                .collect(),
        )
    })
}

fn distribution() -> impl Strategy<Value = Distribution> {
    prop_oneof![
        Just(Distribution::Any),
        Just(Distribution::Single),
        Just(Distribution::Broadcast),
        Just(Distribution::RoundRobin),
        prop::collection::vec(0usize..3, 1..3).prop_map(Distribution::Hash),
    ]
}

fn rel_trait() -> impl Strategy<Value = RelTrait> {
    prop_oneof![
        collation().prop_map(RelTrait::Collation),
        distribution().prop_map(RelTrait::Distribution),
        prop::collection::vec(collation(), 2..4).prop_map(|members| {
            RelTrait::composite(TraitDef::Collation, members.into_iter().map(RelTrait::Collation).collect())
        }),
    ]
}

fn scan_named(name: &str) -> std::sync::Arc<RelNode> {
    let interner = TraitInterner::new();
    RelNode::scan(
        TableRef::new("s", name),
        RowType::new(vec![Field::new("a", DataType::Int64)]),
        100.0,
        TraitSet::standard(&interner),
    )
}

proptest! {
    #[test]
    fn plus_then_minus_round_trips(a in finite_cost(), b in finite_cost()) {
        prop_assert!(a.plus(&b).minus(&b).is_eq_with_epsilon(&a));
    }

    #[test]
    fn multiply_then_divide_recovers_factor(a in nonzero_cost(), f in 0.001..1000.0f64) {
        let ratio = a.multiply_by(f).divide_by(&a);
        prop_assert!((ratio - f).abs() <= 1e-6 * f.max(1.0));
    }

    #[test]
    fn zero_is_neutral_and_infinite_dominates(a in finite_cost()) {
        prop_assert!(a.plus(&Cost::zero()).is_eq_with_epsilon(&a));
        prop_assert!(a.is_lt(&Cost::infinite()));
        prop_assert!(a.plus(&Cost::infinite()).is_infinite());
        prop_assert!(a.is_le(&a));
    }

    #[test]
    fn cost_order_is_total(a in finite_cost(), b in finite_cost()) {
        prop_assert!(a.is_le(&b) || b.is_le(&a));
    }

    #[test]
    fn cost_lt_is_asymmetric(a in finite_cost(), b in finite_cost()) {
        prop_assert!(!(a.is_lt(&b) && b.is_lt(&a)));
    }

    #[test]
    fn equal_sums_compare_equal(r in 0.0..1e6f64, c in 0.0..1e6f64, i in 0.0..1e6f64) {
        let a = Cost::new(r, c, i);
        let b = Cost::new(c, i, r);
        prop_assert!(a.is_eq_with_epsilon(&b));
        prop_assert!(!a.is_lt(&b) && !b.is_lt(&a));
        prop_assert_eq!(a.partial_cmp(&b), Some(std::cmp::Ordering::Equal));
    }

    #[test]
    fn satisfies_is_reflexive(t in rel_trait()) {
        prop_assert!(t.satisfies(&t));
    }

    #[test]
    fn satisfies_is_antisymmetric(a in rel_trait(), b in rel_trait()) {
        if a.satisfies(&b) && b.satisfies(&a) {
            let interner = TraitInterner::new();
            prop_assert!(std::sync::Arc::ptr_eq(&interner.canonize(a), &interner.canonize(b)));
        }
    }

    #[test]
    fn satisfies_is_transitive(a in collation(), b in collation(), c in collation()) {
        if a.satisfies(&b) && b.satisfies(&c) {
            prop_assert!(a.satisfies(&c));
        }
    }

    #[test]
    fn composite_satisfies_when_any_member_does(members in prop::collection::vec(collation(), 1..4), wanted in collation()) {
        let composite = RelTrait::composite(
            TraitDef::Collation,
            members.iter().cloned().map(RelTrait::Collation).collect(),
        );
        let any_member = members.iter().any(|m| m.satisfies(&wanted));
        prop_assert_eq!(composite.satisfies(&RelTrait::Collation(wanted)), any_member);
    }

    #[test]
    fn digest_depends_only_on_structure(left in "[a-c]", right in "[a-c]", bound in 0i64..3) {
        let condition = Expr::gt(Expr::col(0), Expr::int(bound));
        let a = RelNode::filter(scan_named(&left), condition.clone()).unwrap();
        let b = RelNode::filter(scan_named(&right), condition).unwrap();
        prop_assert_eq!(a.digest() == b.digest(), a.input(0).digest() == b.input(0).digest());
    }
}
