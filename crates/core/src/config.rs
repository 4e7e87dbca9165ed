use serde::Deserialize;

use crate::error::{RecError, RecResult};

/// Root application configuration. Loaded from environment variables
/// with the prefix `BIZREC__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Interactions older than this are excluded from training.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_recency_decay_days")]
    pub recency_decay_days: f64,
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Append tracked interactions to the interaction log.
    #[serde(default)]
    pub persist_interactions: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default = "default_viewed_capacity")]
    pub viewed_capacity: usize,
    #[serde(default = "default_purchased_capacity")]
    pub purchased_capacity: usize,
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_budget_ceiling")]
    pub budget_ceiling: f64,
    #[serde(default = "default_moderate_ceiling")]
    pub moderate_ceiling: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_eval_k")]
    pub eval_k: usize,
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
    #[serde(default = "default_model_version")]
    pub model_version: String,
}

// Default functions
fn default_retention_days() -> i64 {
    90
}
fn default_recency_decay_days() -> f64 {
    30.0
}
fn default_max_features() -> usize {
    1000
}
fn default_neighbors() -> usize {
    5
}
fn default_limit() -> usize {
    10
}
fn default_viewed_capacity() -> usize {
    20
}
fn default_purchased_capacity() -> usize {
    10
}
fn default_idle_ttl_secs() -> u64 {
    86_400
}
fn default_budget_ceiling() -> f64 {
    1000.0
}
fn default_moderate_ceiling() -> f64 {
    5000.0
}
fn default_eval_k() -> usize {
    10
}
fn default_schedule_interval_secs() -> u64 {
    3600
}
fn default_model_version() -> String {
    "1.0.0".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            recency_decay_days: default_recency_decay_days(),
            max_features: default_max_features(),
            neighbors: default_neighbors(),
            default_limit: default_limit(),
            persist_interactions: false,
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            viewed_capacity: default_viewed_capacity(),
            purchased_capacity: default_purchased_capacity(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            budget_ceiling: default_budget_ceiling(),
            moderate_ceiling: default_moderate_ceiling(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            eval_k: default_eval_k(),
            schedule_interval_secs: default_schedule_interval_secs(),
            model_version: default_model_version(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            behavior: BehaviorConfig::default(),
            pricing: PricingConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("BIZREC")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> RecResult<()> {
        if self.engine.retention_days <= 0 {
            return Err(RecError::Config(
                "engine.retention_days must be positive".to_string(),
            ));
        }
        if self.engine.recency_decay_days <= 0.0 {
            return Err(RecError::Config(
                "engine.recency_decay_days must be positive".to_string(),
            ));
        }
        if self.engine.max_features == 0 {
            return Err(RecError::Config(
                "engine.max_features must be at least 1".to_string(),
            ));
        }
        if self.behavior.viewed_capacity == 0 || self.behavior.purchased_capacity == 0 {
            return Err(RecError::Config(
                "behavior capacities must be at least 1".to_string(),
            ));
        }
        if self.pricing.budget_ceiling > self.pricing.moderate_ceiling {
            return Err(RecError::Config(format!(
                "pricing.budget_ceiling ({}) exceeds pricing.moderate_ceiling ({})",
                self.pricing.budget_ceiling, self.pricing.moderate_ceiling
            )));
        }
        Ok(())
    }
}
