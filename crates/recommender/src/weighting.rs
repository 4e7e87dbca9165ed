//! Interaction weighting: action kind and event age to a training weight.

use bizrec_core::config::EngineConfig;
use bizrec_core::types::{ActionKind, InteractionEvent};
use chrono::{DateTime, Duration, Utc};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy)]
pub struct FeatureWeighting {
    retention: Duration,
    decay_days: f64,
}

impl FeatureWeighting {
    pub fn new(retention_days: i64, decay_days: f64) -> Self {
        Self {
            retention: Duration::days(retention_days),
            decay_days,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.retention_days, config.recency_decay_days)
    }

    /// Events at or before this instant fall outside the retention window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.retention
    }

    /// `1 / (1 + age_days / decay_days)`. Future timestamps count as age zero.
    pub fn recency_multiplier(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_days = ((now - timestamp).num_milliseconds() as f64 / MILLIS_PER_DAY).max(0.0);
        1.0 / (1.0 + age_days / self.decay_days)
    }

    /// Weight of a single action, or `None` when it is outside the window.
    pub fn weight(
        &self,
        action: ActionKind,
        timestamp: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        match timestamp {
            None => Some(action.base_weight()),
            Some(ts) if ts <= self.cutoff(now) => None,
            Some(ts) => Some(action.base_weight() * self.recency_multiplier(ts, now)),
        }
    }

    pub fn weigh_event(&self, event: &InteractionEvent, now: DateTime<Utc>) -> Option<f64> {
        self.weight(event.action, event.timestamp, now)
    }
}

impl Default for FeatureWeighting {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
