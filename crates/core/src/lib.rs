pub mod config;
pub mod error;
pub mod source;
pub mod types;

pub use config::AppConfig;
pub use error::{RecError, RecResult};
pub use source::{CatalogSource, InMemoryCatalog, InMemoryInteractionLog, InteractionLog};
pub use types::{
    ActionKind, BusinessRecord, InteractionEvent, PriceRange, RecommendationResult,
    RecommendationSource, UserId, UserPreferences,
};
