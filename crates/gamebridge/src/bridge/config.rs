//! Configuration for the bridge runtime.

use serde::{Deserialize, Serialize};

/// Configuration for the WASM engine and per-session limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Maximum linear memory a module may grow to, in bytes
    pub max_memory: usize,

    /// Fuel budget per session; a runaway `draw` traps once it is spent
    pub fuel_limit: Option<u64>,

    /// Cranelift optimization level (0 = none, 1+ = speed)
    pub optimization_level: u8,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_memory: 64 * 1024 * 1024, // 64 MB, far above any small game module
            fuel_limit: None,
            optimization_level: 2,
        }
    }
}

impl BridgeConfig {
    /// Create a config for development: no optimization, faster engine setup.
    pub fn development() -> Self {
        Self {
            optimization_level: 0,
            ..Default::default()
        }
    }

    /// Builder: set max memory
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Builder: set fuel limit
    pub fn fuel_limit(mut self, fuel: u64) -> Self {
        self.fuel_limit = Some(fuel);
        self
    }

    /// Builder: set optimization level
    pub fn optimize(mut self, level: u8) -> Self {
        self.optimization_level = level.min(3);
        self
    }
}
