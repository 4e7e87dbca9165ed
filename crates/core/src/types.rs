use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::config::PricingConfig;
use crate::error::RecError;

pub type UserId = i64;

/// A business as served by the external catalog. The engine only ever holds
/// read-only snapshots of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form "City, Country" style location.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl BusinessRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            categories: Vec::new(),
            tags: Vec::new(),
            location: None,
            price: None,
            rating: 0.0,
            review_count: 0,
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_rating(mut self, rating: f64, review_count: u32) -> Self {
        self.rating = rating;
        self.review_count = review_count;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Text indexed for content similarity: name, description, categories, tags.
    pub fn content_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.name,
            self.description,
            self.categories.join(" "),
            self.tags.join(" ")
        )
    }

    /// Lowercased name + description + categories, used for keyword matching.
    pub fn searchable_text(&self) -> String {
        let mut text = format!(
            "{} {}",
            self.name.to_lowercase(),
            self.description.to_lowercase()
        );
        for category in &self.categories {
            text.push(' ');
            text.push_str(&category.to_lowercase());
        }
        text
    }

    pub fn shares_category_with(&self, other: &BusinessRecord) -> bool {
        self.categories
            .iter()
            .any(|category| other.categories.contains(category))
    }
}

/// Raw catalog row as delivered by the data layer. Every field is optional so
/// that incomplete rows can be detected and skipped instead of failing a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessRow {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub categories: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub location: Option<String>,
    pub price: Option<f64>,
    pub rating: Option<f64>,
    pub review_count: Option<i64>,
    pub is_active: Option<bool>,
}

impl TryFrom<BusinessRow> for BusinessRecord {
    type Error = RecError;

    fn try_from(row: BusinessRow) -> Result<Self, Self::Error> {
        let id = row
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RecError::MalformedRecord("business row without id".to_string()))?;
        let name = row
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| RecError::MalformedRecord(format!("business {id} has no name")))?;

        let rating = row.rating.unwrap_or(0.0);
        if !(0.0..=5.0).contains(&rating) {
            return Err(RecError::MalformedRecord(format!(
                "business {id} has rating {rating} outside 0-5"
            )));
        }
        let review_count = match row.review_count.unwrap_or(0) {
            count if count < 0 => {
                return Err(RecError::MalformedRecord(format!(
                    "business {id} has negative review count {count}"
                )))
            }
            count => u32::try_from(count).unwrap_or(u32::MAX),
        };
        if let Some(price) = row.price {
            if !price.is_finite() || price < 0.0 {
                return Err(RecError::MalformedRecord(format!(
                    "business {id} has invalid price {price}"
                )));
            }
        }

        Ok(BusinessRecord {
            id,
            name,
            description: row.description.unwrap_or_default().trim().to_string(),
            categories: row.categories.unwrap_or_default(),
            tags: row.tags.unwrap_or_default(),
            location: row.location.filter(|l| !l.trim().is_empty()),
            price: row.price,
            rating,
            review_count,
            is_active: row.is_active.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    View,
    Click,
    Share,
    Purchase,
}

impl ActionKind {
    /// Base training weight before recency decay.
    pub fn base_weight(self) -> f64 {
        match self {
            ActionKind::View | ActionKind::Click => 1.0,
            ActionKind::Share => 2.0,
            ActionKind::Purchase => 3.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::View => "view",
            ActionKind::Click => "click",
            ActionKind::Share => "share",
            ActionKind::Purchase => "purchase",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = RecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(ActionKind::View),
            "click" => Ok(ActionKind::Click),
            "share" => Ok(ActionKind::Share),
            "purchase" => Ok(ActionKind::Purchase),
            other => Err(RecError::MalformedRecord(format!(
                "unknown action kind '{other}'"
            ))),
        }
    }
}

/// One immutable entry of the append-only interaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// `None` for anonymous / session-scoped events.
    pub user_id: Option<UserId>,
    pub business_id: String,
    pub action: ActionKind,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

impl InteractionEvent {
    pub fn new(
        user_id: Option<UserId>,
        business_id: impl Into<String>,
        action: ActionKind,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            user_id,
            business_id: business_id.into(),
            action,
            timestamp,
            duration_secs: None,
        }
    }
}

/// Raw interaction row from the log reader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionRow {
    pub user_id: Option<UserId>,
    pub business_id: Option<String>,
    pub action: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub duration_secs: Option<u64>,
}

impl TryFrom<InteractionRow> for InteractionEvent {
    type Error = RecError;

    fn try_from(row: InteractionRow) -> Result<Self, Self::Error> {
        let business_id = row
            .business_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                RecError::MalformedRecord("interaction row without business id".to_string())
            })?;
        let action = row
            .action
            .ok_or_else(|| {
                RecError::MalformedRecord(format!("interaction on {business_id} has no action"))
            })?
            .parse::<ActionKind>()?;

        Ok(InteractionEvent {
            user_id: row.user_id,
            business_id,
            action,
            timestamp: row.timestamp,
            duration_secs: row.duration_secs,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceRange {
    Budget,
    Moderate,
    Premium,
}

impl PriceRange {
    /// Bucket a numeric price. Businesses without a price count as moderate.
    pub fn from_price(price: Option<f64>, pricing: &PricingConfig) -> Self {
        match price {
            None => PriceRange::Moderate,
            Some(p) if p < pricing.budget_ceiling => PriceRange::Budget,
            Some(p) if p < pricing.moderate_ceiling => PriceRange::Moderate,
            Some(_) => PriceRange::Premium,
        }
    }
}

/// Explicit, per-request preferences. Never persisted by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationSource {
    Content,
    Collaborative,
    Hybrid,
    PopularityFallback,
}

impl RecommendationSource {
    /// Confidence assigned to a completely filled result from this source.
    pub fn base_confidence(self) -> f64 {
        match self {
            RecommendationSource::Hybrid => 0.9,
            RecommendationSource::Content => 0.8,
            RecommendationSource::Collaborative => 0.75,
            RecommendationSource::PopularityFallback => 0.3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecommendationSource::Content => "content",
            RecommendationSource::Collaborative => "collaborative",
            RecommendationSource::Hybrid => "hybrid",
            RecommendationSource::PopularityFallback => "popularity-fallback",
        }
    }
}

impl fmt::Display for RecommendationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub request_id: Uuid,
    pub businesses: Vec<BusinessRecord>,
    pub source: RecommendationSource,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
}

impl RecommendationResult {
    /// Build a result, dropping repeated business ids (first occurrence wins)
    /// and deriving confidence from the source and how full the result is.
    pub fn new(
        businesses: Vec<BusinessRecord>,
        source: RecommendationSource,
        limit: usize,
    ) -> Self {
        let mut seen = HashSet::new();
        let businesses: Vec<BusinessRecord> = businesses
            .into_iter()
            .filter(|b| seen.insert(b.id.clone()))
            .collect();

        let confidence = if limit == 0 || businesses.is_empty() {
            0.0
        } else {
            let fill = businesses.len() as f64 / limit as f64;
            (source.base_confidence() * fill).clamp(0.0, 1.0)
        };

        Self {
            request_id: Uuid::new_v4(),
            businesses,
            source,
            confidence,
            generated_at: Utc::now(),
        }
    }

    /// Scale the confidence down, e.g. for relaxed matches.
    pub fn discounted(mut self, factor: f64) -> Self {
        self.confidence = (self.confidence * factor).clamp(0.0, 1.0);
        self
    }

    pub fn ids(&self) -> Vec<&str> {
        self.businesses.iter().map(|b| b.id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.businesses.is_empty()
    }
}
