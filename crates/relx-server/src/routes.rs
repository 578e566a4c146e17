//! # HTTP Route Handlers
//!
//! This module defines the Axum router and handlers for the optimizer service.
//!
//! ## Endpoints
//!
//! - `GET  /health`   - Health check
//! - `GET  /rules`    - List registered rules
//! - `POST /optimize` - Cost-based search for a plan delivering the required traits
//! - `POST /rewrite`  - Apply a rewriter program to a plan
//!
//! Both plan endpoints build the request's plan against the catalog, run a
//! fresh engine and answer with the plan's explain text, digest and cost.
//!
//! ## Error Handling
//!
//! - 400 Bad Request: malformed plans or programs, unknown tables
//! - 422 Unprocessable Entity: no plan delivers the required traits
//! - 500 Internal Server Error: anything else
//!
//! Malformed JSON bodies are rejected by the `Json` extractor before reaching
//! the handlers.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use relx_core::cost::{Cost, CostModel};
use relx_core::error::PlannerError;
use relx_core::metadata::TreeMetadata;
use relx_core::node::RelNode;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::ApiError;
use crate::plan::{build_program, OptimizeRequest, OptimizeResponse, RewriteRequest, RewriteResponse};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rules", get(list_rules))
        .route("/optimize", post(optimize))
        .route("/rewrite", post(rewrite))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /rules
pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<RulesResponse> {
    let rules = state
        .rule_registry
        .rules()
        .iter()
        .map(|r| RuleInfo {
            name: r.name().to_string(),
            rule_type: format!("{:?}", r.rule_type()),
        })
        .collect();
    Json(RulesResponse { rules })
}

#[derive(Serialize)]
pub struct RulesResponse {
    pub rules: Vec<RuleInfo>,
}

#[derive(Serialize)]
pub struct RuleInfo {
    pub name: String,
    pub rule_type: String,
}

/// POST /optimize
pub async fn optimize(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, ApiError> {
    let plan = req.plan.build(state.catalog.as_ref(), &state.interner)?;
    let required = req.required.to_trait_set(&state.interner);
    debug!("Optimizing {} for {}", plan.digest(), required);

    let mut search = state.volcano();
    let best = search.optimize(&plan, &required)?;
    let cost = search
        .root()
        .and_then(|set| search.best_cost(set, &required))
        .ok_or_else(|| PlannerError::NoPlan {
            traits: required.to_string(),
        })?;

    Ok(Json(OptimizeResponse {
        explain: best.explain(),
        digest: best.digest().to_string(),
        cost,
        stats: search.last_stats(),
    }))
}

/// POST /rewrite
pub async fn rewrite(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RewriteRequest>,
) -> Result<Json<RewriteResponse>, ApiError> {
    let plan = req.plan.build(state.catalog.as_ref(), &state.interner)?;
    let program = build_program(&req.program)?;
    debug!("Rewriting {} with {} instructions", plan.digest(), program.len());

    let mut planner = state.hep();
    let result = planner.execute(&program, &plan)?;

    Ok(Json(RewriteResponse {
        explain: result.explain(),
        digest: result.digest().to_string(),
        cost: tree_cost(&result, state.cost_model.as_ref()),
        stats: planner.stats(),
    }))
}

/// Cumulative cost of a standalone tree.
fn tree_cost(node: &RelNode, model: &dyn CostModel) -> Cost {
    let mq = TreeMetadata::new(model);
    node.inputs()
        .iter()
        .fold(model.self_cost(node, &mq), |acc, input| acc.plus(&tree_cost(input, model)))
}
