use crate::errors::{EngineError, EngineResult};
use crate::models::AmericanModel;

/// Lattice depth used when a caller does not override it per call.
pub const DEFAULT_STEPS: usize = 1000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Lattice steps for American valuation and Greeks.
    pub steps: usize,
    /// Pricing workers. 0 means one per logical CPU.
    pub threads: usize,
    pub american_model: AmericanModel,
    /// Newton iteration budget for the early-exercise boundary solve.
    pub baw_max_iterations: usize,
    pub pricing_interval_ms: u64,
    pub tick_channel_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS,
            threads: 0,
            american_model: AmericanModel::Baw,
            baw_max_iterations: 100,
            pricing_interval_ms: 1000,
            tick_channel_capacity: 1024,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let steps = env_var_or("PRICER_STEPS", "1000")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("PRICER_STEPS: {e}")))?;

        let threads = env_var_or("PRICER_THREADS", "0")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("PRICER_THREADS: {e}")))?;

        let american_model = env_var_or("PRICER_AMERICAN_MODEL", "baw")
            .parse::<AmericanModel>()
            .map_err(|e| EngineError::Config(format!("PRICER_AMERICAN_MODEL: {e}")))?;

        let baw_max_iterations = env_var_or("BAW_MAX_ITERATIONS", "100")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("BAW_MAX_ITERATIONS: {e}")))?;

        let pricing_interval_ms = env_var_or("PRICING_INTERVAL_MS", "1000")
            .parse::<u64>()
            .map_err(|e| EngineError::Config(format!("PRICING_INTERVAL_MS: {e}")))?;

        let tick_channel_capacity = env_var_or("TICK_CHANNEL_CAPACITY", "1024")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("TICK_CHANNEL_CAPACITY: {e}")))?;

        let cfg = Self {
            steps,
            threads,
            american_model,
            baw_max_iterations,
            pricing_interval_ms,
            tick_channel_capacity,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.steps == 0 {
            return Err(EngineError::Config("PRICER_STEPS must be >= 1".into()));
        }
        if self.baw_max_iterations == 0 {
            return Err(EngineError::Config("BAW_MAX_ITERATIONS must be >= 1".into()));
        }
        if self.pricing_interval_ms == 0 {
            return Err(EngineError::Config("PRICING_INTERVAL_MS must be >= 1".into()));
        }
        if self.tick_channel_capacity == 0 {
            return Err(EngineError::Config("TICK_CHANNEL_CAPACITY must be >= 1".into()));
        }
        Ok(())
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
