use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::pool::PoolCoordinator;

/// Shared application state: one coordinator serves every request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub coordinator: Arc<PoolCoordinator>,
}

impl AppState {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            coordinator: Arc::new(PoolCoordinator::new(config)),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

fn default_worker() -> String {
    "default".to_string()
}

/* ---------- Pool API Models ---------- */

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    pub address: String,
    #[serde(default = "default_worker")]
    pub worker_name: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkQuery {
    pub miner_address: String,
    #[serde(default = "default_worker")]
    pub worker_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl ToString) -> Self {
        Self {
            detail: detail.to_string(),
        }
    }
}
