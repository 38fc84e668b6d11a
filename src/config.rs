use serde::{Deserialize, Serialize};
use std::env;

/// Tuning knobs of the colony search.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolverConfig {
    pub ants: usize,
    pub iterations: usize,
    pub evaporation_rate: f64,
    pub deposit_strength: f64,
    pub hard_penalty: u64,
    /// Base seed; a seeded run is reproducible regardless of thread count.
    pub seed: Option<u64>,
    /// Size of the trial pool. `None` uses rayon's global pool.
    pub worker_threads: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            ants: 20,
            iterations: 150,
            evaporation_rate: 0.1,
            deposit_strength: 1.0,
            hard_penalty: 1000,
            seed: None,
            worker_threads: None,
        }
    }
}

pub const ADDR_VAR: &str = "TIMETABLE_ADDR";
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind_addr = env::var(ADDR_VAR)
            .ok()
            .filter(|addr| !addr.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        Self { bind_addr }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
        }
    }
}
