//! # relx-core: Relational Optimizer Core
//!
//! This crate implements the core data structures and algorithms of a
//! rule-based relational optimizer with two engines sharing one rule model:
//! an exhaustive, cost-based Volcano search over equivalence sets and a
//! greedy, program-driven heuristic rewriter.
//!
//! ## Module Overview
//!
//! - **`traits`**: Physical properties (convention, collation, distribution),
//!   their `satisfies` order and the concurrent weak interner.
//! - **`cost`**: Cost values, the cost factory and the pluggable cost model.
//! - **`expr`**: Scalar expressions, row types and aggregate calls.
//! - **`node`**: Immutable operator nodes with structural digests.
//! - **`metadata`**: Row count and uniqueness queries used by rules and costing.
//! - **`operand`**: Rule operand trees and binding against nodes or sets.
//! - **`rule`**: The `Rule` trait, `RuleCall` and the rule registry.
//! - **`convert`**: Converter rules, the conversion graph and trait conversion.
//! - **`memo`**: Equivalence sets with union-find merging and costing.
//! - **`search`**: The Volcano fixpoint search.
//! - **`hep`**: Programs and the heuristic rewriter.
//! - **`catalog`**: Table metadata used when building scans.
//! - **`error`**: `PlannerError` and the crate `Result`.

pub mod catalog;
pub mod convert;
pub mod cost;
pub mod error;
pub mod expr;
pub mod hep;
pub mod memo;
pub mod metadata;
pub mod node;
pub mod operand;
pub mod rule;
pub mod search;
pub mod traits;

pub use error::{PlannerError, Result};
