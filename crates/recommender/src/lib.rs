//! Hybrid business recommender: TF-IDF content index, user-user
//! collaborative filtering, rule-based preference filtering and per-user
//! behaviour tracking, served from atomically swapped model snapshots.

pub mod behavior;
pub mod collaborative;
pub mod content;
pub mod evaluator;
pub mod hybrid;
pub mod matrix;
pub mod popularity;
pub mod preferences;
pub mod service;
pub mod trainer;
pub mod weighting;

pub use behavior::{BehaviorSnapshot, BehaviorTracker};
pub use collaborative::CollaborativeEngine;
pub use content::ContentIndex;
pub use evaluator::EvaluationReport;
pub use hybrid::HybridRecommender;
pub use matrix::InteractionMatrix;
pub use preferences::{FilterStage, PreferenceFilter, PreferenceMatch};
pub use service::RecommendationService;
pub use trainer::{ModelSnapshot, ModelTrainer, TrainingMetrics};
pub use weighting::FeatureWeighting;
