//! Recommendation service: the entry point used by the API layer. Wires the
//! catalog and interaction log to the trainer, preference filter and
//! behaviour tracker, and applies the popularity fallback.

use bizrec_core::config::AppConfig;
use bizrec_core::error::RecResult;
use bizrec_core::source::{CatalogSource, InteractionLog};
use bizrec_core::types::{
    ActionKind, BusinessRecord, InteractionEvent, RecommendationResult, RecommendationSource,
    UserId, UserPreferences,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::behavior::BehaviorTracker;
use crate::popularity::most_popular;
use crate::preferences::{FilterStage, PreferenceFilter};
use crate::trainer::{ModelSnapshot, ModelTrainer, TrainingMetrics};

/// Confidence multiplier for results that only matched in the relaxed stage.
const RELAXED_CONFIDENCE_FACTOR: f64 = 0.5;

pub struct RecommendationService {
    config: AppConfig,
    catalog: Arc<dyn CatalogSource>,
    interactions: Arc<dyn InteractionLog>,
    trainer: ModelTrainer,
    filter: PreferenceFilter,
    tracker: BehaviorTracker,
}

impl RecommendationService {
    pub fn new(
        config: AppConfig,
        catalog: Arc<dyn CatalogSource>,
        interactions: Arc<dyn InteractionLog>,
    ) -> Self {
        Self {
            trainer: ModelTrainer::new(config.engine.clone(), config.training.clone()),
            filter: PreferenceFilter::new(config.pricing.clone()),
            tracker: BehaviorTracker::from_config(&config.behavior),
            config,
            catalog,
            interactions,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tracker(&self) -> &BehaviorTracker {
        &self.tracker
    }

    /// The snapshot currently serving hybrid queries.
    pub fn snapshot(&self) -> Arc<ModelSnapshot> {
        self.trainer.current()
    }

    /// Rebuild every model from the full catalog and the windowed log. On a
    /// collaborator error the previous snapshot stays live.
    pub fn train(&self) -> RecResult<TrainingMetrics> {
        let now = Utc::now();
        let businesses = self.catalog.businesses()?;
        let events = self
            .interactions
            .events_since(self.trainer.weighting().cutoff(now))?;

        if businesses.is_empty() {
            warn!("Catalog is empty, content model will be untrained");
        }
        if events.is_empty() {
            warn!("Interaction log is empty, collaborative model will be untrained");
        }

        Ok(self.trainer.train_and_evaluate_at(&businesses, &events, now))
    }

    pub fn recommend_by_preferences(
        &self,
        preferences: &UserPreferences,
        limit: usize,
    ) -> RecResult<RecommendationResult> {
        let catalog = self.catalog.businesses()?;
        let matched = self.filter.filter(&catalog, preferences);

        if matched.businesses.is_empty() {
            return Ok(self.popularity_fallback(&catalog, limit, "preferences"));
        }

        let businesses: Vec<BusinessRecord> = matched.businesses.into_iter().take(limit).collect();
        let result = RecommendationResult::new(businesses, RecommendationSource::Content, limit);
        let result = match matched.stage {
            FilterStage::Strict => result,
            FilterStage::Relaxed => result.discounted(RELAXED_CONFIDENCE_FACTOR),
        };

        self.observe("preferences", &result);
        Ok(result)
    }

    pub fn recommend_by_behavior(
        &self,
        user_id: Option<UserId>,
        limit: usize,
    ) -> RecResult<RecommendationResult> {
        let catalog = self.catalog.businesses()?;
        let result = self.tracker.recommend_from_behavior(user_id, &catalog, limit);
        self.observe("behavior", &result);
        Ok(result)
    }

    /// Blend content and collaborative candidates from the current snapshot,
    /// falling back to popularity when both come back empty.
    pub fn recommend_hybrid(
        &self,
        user_id: Option<UserId>,
        interests: &[String],
        limit: usize,
    ) -> RecResult<RecommendationResult> {
        let snapshot = self.trainer.current();
        let ids = snapshot.recommender.recommend(user_id, interests, limit);
        let businesses = snapshot.resolve(&ids);

        if businesses.is_empty() {
            let catalog = self.catalog.businesses()?;
            return Ok(self.popularity_fallback(&catalog, limit, "hybrid"));
        }

        let result = RecommendationResult::new(businesses, RecommendationSource::Hybrid, limit);
        self.observe("hybrid", &result);
        Ok(result)
    }

    pub fn popular(&self, limit: usize) -> RecResult<RecommendationResult> {
        let catalog = self.catalog.businesses()?;
        Ok(RecommendationResult::new(
            most_popular(&catalog, limit),
            RecommendationSource::PopularityFallback,
            limit,
        ))
    }

    /// Track an interaction for behaviour-based recommendations and, when
    /// enabled, append it to the interaction log for the next retrain.
    pub fn record_interaction(
        &self,
        user_id: Option<UserId>,
        business_id: &str,
        action: ActionKind,
    ) -> RecResult<()> {
        self.tracker.record(user_id, business_id, action);
        metrics::counter!("interactions.recorded", "action" => action.as_str()).increment(1);

        if self.config.engine.persist_interactions {
            let event = InteractionEvent::new(user_id, business_id, action, Some(Utc::now()));
            self.interactions.append(event)?;
        }
        Ok(())
    }

    /// Drop behaviour state for users idle longer than the configured TTL.
    pub fn maintenance(&self) -> usize {
        let evicted = self
            .tracker
            .evict_idle(Duration::from_secs(self.config.behavior.idle_ttl_secs));
        if evicted > 0 {
            debug!(evicted, "Idle behaviour state evicted");
        }
        evicted
    }

    fn popularity_fallback(
        &self,
        catalog: &[BusinessRecord],
        limit: usize,
        strategy: &'static str,
    ) -> RecommendationResult {
        info!(strategy, limit, "No personalised candidates, using popularity ranking");
        metrics::counter!("recommendations.fallback", "strategy" => strategy).increment(1);
        let result = RecommendationResult::new(
            most_popular(catalog, limit),
            RecommendationSource::PopularityFallback,
            limit,
        );
        self.observe(strategy, &result);
        result
    }

    fn observe(&self, strategy: &'static str, result: &RecommendationResult) {
        metrics::counter!(
            "recommendations.served",
            "strategy" => strategy,
            "source" => result.source.as_str()
        )
        .increment(1);
        debug!(
            strategy,
            source = %result.source,
            count = result.businesses.len(),
            confidence = result.confidence,
            "Recommendations served"
        );
    }
}
