//! # Application State
//!
//! Shared state available to all HTTP request handlers. It is created once at
//! server startup and shared via `Arc` across concurrent requests.
//!
//! ## Components
//!
//! - **Rule Registry**: every built-in rule, by name. Rules are stateless, so
//!   each request's engine gets `Arc` clones rather than copies.
//! - **Cost Model**: shared for the same reason.
//! - **Catalog**: table columns and row counts used to build scans. Loaded from
//!   `RELX_CATALOG` when set, empty otherwise.
//! - **Engine Config**: limits for both engines, from `RELX_CONFIG`.
//!
//! Each request builds its own engine and memo; nothing is memoized across
//! requests.

use relx_core::catalog::InMemoryCatalog;
use relx_core::cost::{CostModel, DefaultCostModel};
use relx_core::hep::{HepConfig, HepPlanner};
use relx_core::rule::RuleRegistry;
use relx_core::search::{SearchConfig, VolcanoSearch};
use relx_core::traits::TraitInterner;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address '{0}'")]
    Addr(String),
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Limits for both engines, as read from `RELX_CONFIG`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub search: SearchConfig,
    pub hep: HepConfig,
}

/// Server settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub catalog: InMemoryCatalog,
    pub engine: EngineConfig,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}

impl ServerConfig {
    /// Read `RELX_ADDR`, `RELX_CATALOG` and `RELX_CONFIG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = std::env::var("RELX_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let addr = addr.parse().map_err(|_| ConfigError::Addr(addr.clone()))?;
        let catalog = match std::env::var_os("RELX_CATALOG") {
            Some(path) => read_json(Path::new(&path))?,
            None => InMemoryCatalog::new(),
        };
        let engine = match std::env::var_os("RELX_CONFIG") {
            Some(path) => read_json(Path::new(&path))?,
            None => EngineConfig::default(),
        };
        Ok(Self {
            addr,
            catalog,
            engine,
        })
    }
}

/// Shared application state, accessible by all request handlers via Axum's
/// State extractor.
pub struct AppState {
    pub rule_registry: Arc<RuleRegistry>,
    pub cost_model: Arc<dyn CostModel>,
    pub catalog: Arc<InMemoryCatalog>,
    pub engine: EngineConfig,
    pub interner: Arc<TraitInterner>,
}

impl AppState {
    pub fn new(catalog: InMemoryCatalog, engine: EngineConfig) -> Self {
        Self {
            rule_registry: Arc::new(relx_rules::default_rule_registry()),
            cost_model: Arc::new(DefaultCostModel::default()),
            catalog: Arc::new(catalog),
            engine,
            interner: TraitInterner::new(),
        }
    }

    /// A fresh Volcano search with every registered rule.
    pub fn volcano(&self) -> VolcanoSearch {
        let mut search = VolcanoSearch::with_config(self.cost_model.clone(), self.engine.search.clone());
        search.add_rules(self.rule_registry.rules().to_vec());
        search
    }

    /// A fresh HEP planner that resolves rule names against the registry.
    pub fn hep(&self) -> HepPlanner {
        let mut planner = HepPlanner::with_config(self.cost_model.clone(), self.engine.hep.clone());
        for rule in self.rule_registry.rules() {
            planner.add_rule(rule.clone());
        }
        planner
    }
}
