//! Model training: builds a complete snapshot off to the side, evaluates it
//! and publishes it with a single pointer swap.

use bizrec_core::config::{EngineConfig, TrainingConfig};
use bizrec_core::types::{BusinessRecord, InteractionEvent};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborative::CollaborativeEngine;
use crate::content::ContentIndex;
use crate::evaluator::{evaluate_runs, holdout_split, EvaluationReport};
use crate::hybrid::HybridRecommender;
use crate::matrix::InteractionMatrix;
use crate::weighting::FeatureWeighting;

/// Everything one training pass produced. Immutable once published.
#[derive(Debug)]
pub struct ModelSnapshot {
    pub id: Uuid,
    pub trained_at: Option<DateTime<Utc>>,
    pub model_version: String,
    pub recommender: HybridRecommender,
    /// Active businesses the snapshot was trained on, keyed by id.
    catalog: HashMap<String, BusinessRecord>,
}

impl ModelSnapshot {
    fn untrained(neighbors: usize, model_version: String) -> Self {
        Self {
            id: Uuid::nil(),
            trained_at: None,
            model_version,
            recommender: HybridRecommender::untrained(neighbors),
            catalog: HashMap::new(),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.recommender.is_trained()
    }

    pub fn business(&self, id: &str) -> Option<&BusinessRecord> {
        self.catalog.get(id)
    }

    /// Resolve ranked ids to records, dropping ids no longer in the snapshot.
    pub fn resolve(&self, ids: &[String]) -> Vec<BusinessRecord> {
        ids.iter()
            .filter_map(|id| self.catalog.get(id).cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub snapshot_id: Uuid,
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub businesses_indexed: usize,
    pub vocabulary_size: usize,
    pub users: usize,
    pub interacted_businesses: usize,
    pub events_used: usize,
    pub content_trained: bool,
    pub collaborative_trained: bool,
    pub evaluation: EvaluationReport,
}

pub struct ModelTrainer {
    engine: EngineConfig,
    training: TrainingConfig,
    weighting: FeatureWeighting,
    current: RwLock<Arc<ModelSnapshot>>,
    /// Serialises training passes; queries never take it.
    train_lock: Mutex<()>,
}

impl ModelTrainer {
    pub fn new(engine: EngineConfig, training: TrainingConfig) -> Self {
        let weighting = FeatureWeighting::from_config(&engine);
        let initial = ModelSnapshot::untrained(engine.neighbors, training.model_version.clone());
        Self {
            engine,
            training,
            weighting,
            current: RwLock::new(Arc::new(initial)),
            train_lock: Mutex::new(()),
        }
    }

    pub fn weighting(&self) -> &FeatureWeighting {
        &self.weighting
    }

    /// The snapshot currently serving queries.
    pub fn current(&self) -> Arc<ModelSnapshot> {
        self.current.read().clone()
    }

    pub fn train_and_evaluate(
        &self,
        businesses: &[BusinessRecord],
        interactions: &[InteractionEvent],
    ) -> TrainingMetrics {
        self.train_and_evaluate_at(businesses, interactions, Utc::now())
    }

    /// Train against a fixed clock. Identical inputs and `now` give
    /// bit-identical matrices.
    pub fn train_and_evaluate_at(
        &self,
        businesses: &[BusinessRecord],
        interactions: &[InteractionEvent],
        now: DateTime<Utc>,
    ) -> TrainingMetrics {
        let _guard = self.train_lock.lock();
        let start = std::time::Instant::now();

        let (snapshot, mut outcome) = self.build_snapshot(businesses, interactions, now);
        outcome.evaluation = self.evaluate(businesses, interactions, now);

        let snapshot = Arc::new(snapshot);
        *self.current.write() = snapshot;

        outcome.duration_ms = start.elapsed().as_millis() as u64;
        metrics::histogram!("training.duration_ms").record(outcome.duration_ms as f64);
        metrics::counter!("training.runs").increment(1);

        info!(
            snapshot_id = %outcome.snapshot_id,
            businesses = outcome.businesses_indexed,
            users = outcome.users,
            precision = outcome.evaluation.precision,
            recall = outcome.evaluation.recall,
            coverage = outcome.evaluation.coverage,
            duration_ms = outcome.duration_ms,
            "Model training completed"
        );
        outcome
    }

    /// Build a complete snapshot without touching the published one.
    pub fn build_snapshot(
        &self,
        businesses: &[BusinessRecord],
        interactions: &[InteractionEvent],
        now: DateTime<Utc>,
    ) -> (ModelSnapshot, TrainingMetrics) {
        let active: Vec<&BusinessRecord> = businesses.iter().filter(|b| b.is_active).collect();
        let known: HashSet<&str> = active.iter().map(|b| b.id.as_str()).collect();

        let content = match ContentIndex::fit(businesses, self.engine.max_features) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Content index left untrained");
                ContentIndex::untrained()
            }
        };

        let matrix = InteractionMatrix::build(interactions, &known, &self.weighting, now);
        let users = matrix.n_users();
        let interacted_businesses = matrix.n_businesses();
        let events_used = matrix.events_used();

        let mut collaborative = CollaborativeEngine::new(self.engine.neighbors);
        if let Err(e) = collaborative.train(matrix) {
            warn!(error = %e, "Collaborative model left untrained");
        }

        let snapshot_id = Uuid::new_v4();
        let metrics = TrainingMetrics {
            snapshot_id,
            model_version: self.training.model_version.clone(),
            trained_at: now,
            duration_ms: 0,
            businesses_indexed: content.business_ids().len(),
            vocabulary_size: content.vocabulary_size(),
            users,
            interacted_businesses,
            events_used,
            content_trained: content.is_trained(),
            collaborative_trained: collaborative.is_trained(),
            evaluation: EvaluationReport::default(),
        };

        let snapshot = ModelSnapshot {
            id: snapshot_id,
            trained_at: Some(now),
            model_version: self.training.model_version.clone(),
            recommender: HybridRecommender::from_trained(content, collaborative),
            catalog: active.into_iter().map(|b| (b.id.clone(), b.clone())).collect(),
        };
        (snapshot, metrics)
    }

    /// Leave-last-out evaluation of the collaborative model.
    fn evaluate(
        &self,
        businesses: &[BusinessRecord],
        interactions: &[InteractionEvent],
        now: DateTime<Utc>,
    ) -> EvaluationReport {
        let k = self.training.eval_k;
        let known: HashSet<&str> = businesses
            .iter()
            .filter(|b| b.is_active)
            .map(|b| b.id.as_str())
            .collect();
        let cutoff = self.weighting.cutoff(now);
        let windowed: Vec<InteractionEvent> = interactions
            .iter()
            .filter(|e| known.contains(e.business_id.as_str()))
            .filter(|e| e.timestamp.map_or(true, |ts| ts > cutoff))
            .cloned()
            .collect();

        let (training, truth) = holdout_split(&windowed);
        if truth.is_empty() {
            return EvaluationReport {
                k,
                ..Default::default()
            };
        }

        let mut scorer = CollaborativeEngine::new(self.engine.neighbors);
        let matrix = InteractionMatrix::build(&training, &known, &self.weighting, now);
        if scorer.train(matrix).is_err() {
            return EvaluationReport {
                k,
                ..Default::default()
            };
        }

        let runs: Vec<(HashSet<String>, Vec<String>)> = truth
            .into_iter()
            .map(|(user, held_out)| (held_out, scorer.recommend(user, k)))
            .collect();
        evaluate_runs(&runs, known.len(), k)
    }
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self::new(EngineConfig::default(), TrainingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizrec_core::types::ActionKind;
    use chrono::Duration;

    fn catalog() -> Vec<BusinessRecord> {
        vec![
            BusinessRecord::new("a", "Nairobi Coffee Shop").with_categories(["FOOD"]),
            BusinessRecord::new("b", "Premium Tech Store").with_categories(["TECH"]),
            BusinessRecord::new("c", "Budget Tech Solutions").with_categories(["TECH"]),
            BusinessRecord::new("d", "Closed Bakery").inactive(),
        ]
    }

    fn events(now: DateTime<Utc>) -> Vec<InteractionEvent> {
        vec![
            InteractionEvent::new(Some(1), "a", ActionKind::Purchase, Some(now - Duration::days(5))),
            InteractionEvent::new(Some(1), "b", ActionKind::View, Some(now - Duration::days(2))),
            InteractionEvent::new(Some(2), "a", ActionKind::Click, Some(now - Duration::days(4))),
            InteractionEvent::new(Some(2), "b", ActionKind::Share, Some(now - Duration::days(3))),
            InteractionEvent::new(Some(2), "c", ActionKind::Purchase, Some(now - Duration::days(1))),
            InteractionEvent::new(Some(3), "d", ActionKind::Purchase, Some(now)),
        ]
    }

    #[test]
    fn test_initial_snapshot_untrained() {
        let trainer = ModelTrainer::default();
        let snapshot = trainer.current();
        assert!(!snapshot.is_trained());
        assert!(snapshot.trained_at.is_none());
    }

    #[test]
    fn test_train_publishes_snapshot() {
        let trainer = ModelTrainer::default();
        let now = Utc::now();
        let before = trainer.current();
        let metrics = trainer.train_and_evaluate_at(&catalog(), &events(now), now);

        let after = trainer.current();
        assert!(after.is_trained());
        assert_eq!(after.id, metrics.snapshot_id);
        assert_ne!(before.id, after.id);
        assert!(!before.is_trained());

        assert_eq!(metrics.businesses_indexed, 3);
        assert_eq!(metrics.users, 2);
        assert!(metrics.content_trained && metrics.collaborative_trained);
        assert!(after.business("d").is_none());
        assert_eq!(metrics.model_version, "1.0.0");
    }

    #[test]
    fn test_evaluation_runs_on_holdout() {
        let trainer = ModelTrainer::default();
        let now = Utc::now();
        let metrics = trainer.train_and_evaluate_at(&catalog(), &events(now), now);
        assert_eq!(metrics.evaluation.k, 10);
        assert_eq!(metrics.evaluation.evaluated_users, 2);
        assert!((0.0..=1.0).contains(&metrics.evaluation.precision));
        assert!((0.0..=1.0).contains(&metrics.evaluation.coverage));
    }

    #[test]
    fn test_empty_inputs_leave_sub_engines_untrained() {
        let trainer = ModelTrainer::default();
        let metrics = trainer.train_and_evaluate(&[], &[]);
        assert!(!metrics.content_trained);
        assert!(!metrics.collaborative_trained);
        let snapshot = trainer.current();
        assert!(snapshot.is_trained());
        assert!(snapshot.recommender.collaborative().recommend(1, 5).is_empty());
    }

    #[test]
    fn test_retraining_is_bit_identical() {
        let trainer = ModelTrainer::default();
        let now = Utc::now();
        trainer.train_and_evaluate_at(&catalog(), &events(now), now);
        let first = trainer.current();
        trainer.train_and_evaluate_at(&catalog(), &events(now), now);
        let second = trainer.current();

        assert_ne!(first.id, second.id);
        assert_eq!(
            first.recommender.content().vectors(),
            second.recommender.content().vectors()
        );
        assert_eq!(
            first.recommender.collaborative().similarity_matrix(),
            second.recommender.collaborative().similarity_matrix()
        );
    }

    #[test]
    fn test_readers_keep_old_snapshot_during_swap() {
        let trainer = ModelTrainer::default();
        let now = Utc::now();
        let held = trainer.current();
        trainer.train_and_evaluate_at(&catalog(), &events(now), now);
        // A reader holding the old Arc still sees a consistent, untrained view.
        assert!(!held.is_trained());
        assert!(held
            .recommender
            .recommend(Some(1), &["coffee".to_string()], 5)
            .is_empty());
    }
}
