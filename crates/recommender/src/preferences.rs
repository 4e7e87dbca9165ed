//! Rule-based filtering over the catalog from explicit user preferences.

use bizrec_core::config::PricingConfig;
use bizrec_core::types::{BusinessRecord, PriceRange, UserPreferences};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Minimum length of an interest word considered in relaxed matching.
const RELAXED_MIN_WORD_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    Strict,
    Relaxed,
}

#[derive(Debug, Clone)]
pub struct PreferenceMatch {
    pub businesses: Vec<BusinessRecord>,
    pub stage: FilterStage,
}

#[derive(Debug, Clone, Default)]
pub struct PreferenceFilter {
    pricing: PricingConfig,
}

impl PreferenceFilter {
    pub fn new(pricing: PricingConfig) -> Self {
        Self { pricing }
    }

    /// Strict pass over location, price bucket and interests. When interests
    /// were given and nothing matched, a relaxed pass matches individual
    /// interest words on location alone. Output is unique by id and sorted by
    /// rating, highest first.
    pub fn filter(&self, catalog: &[BusinessRecord], preferences: &UserPreferences) -> PreferenceMatch {
        let interests: Vec<String> = preferences
            .interests
            .iter()
            .map(|i| i.trim().to_lowercase())
            .filter(|i| !i.is_empty())
            .collect();
        let location = preferences
            .location
            .as_deref()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());

        let mut stage = FilterStage::Strict;
        let mut matched: Vec<&BusinessRecord> = catalog
            .iter()
            .filter(|b| b.is_active)
            .filter(|b| location_matches(b, location.as_deref()))
            .filter(|b| self.price_matches(b, preferences.price_range))
            .filter(|b| interests_match(b, &interests))
            .collect();

        debug!(
            catalog = catalog.len(),
            matched = matched.len(),
            "Strict preference filter applied"
        );

        if matched.is_empty() && !interests.is_empty() {
            info!("No strict matches, retrying with relaxed interest matching");
            stage = FilterStage::Relaxed;
            let words: Vec<&str> = interests
                .iter()
                .flat_map(|i| i.split_whitespace())
                .filter(|w| w.chars().count() >= RELAXED_MIN_WORD_LEN)
                .collect();
            matched = catalog
                .iter()
                .filter(|b| b.is_active)
                .filter(|b| location_matches(b, location.as_deref()))
                .filter(|b| {
                    let text = b.searchable_text();
                    words.iter().any(|w| text.contains(w))
                })
                .collect();
        }

        let mut seen = HashSet::new();
        let mut businesses: Vec<BusinessRecord> = matched
            .into_iter()
            .filter(|b| seen.insert(b.id.clone()))
            .cloned()
            .collect();
        businesses.sort_by(|a, b| {
            b.rating
                .partial_cmp(&a.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        PreferenceMatch { businesses, stage }
    }

    pub fn price_range(&self, business: &BusinessRecord) -> PriceRange {
        PriceRange::from_price(business.price, &self.pricing)
    }

    fn price_matches(&self, business: &BusinessRecord, wanted: Option<PriceRange>) -> bool {
        match wanted {
            None => true,
            Some(range) => self.price_range(business) == range,
        }
    }
}

/// Businesses without a location are not excluded by a location preference.
fn location_matches(business: &BusinessRecord, wanted: Option<&str>) -> bool {
    match (wanted, business.location.as_deref()) {
        (Some(wanted), Some(location)) => location.to_lowercase().contains(wanted),
        _ => true,
    }
}

fn interests_match(business: &BusinessRecord, interests: &[String]) -> bool {
    if interests.is_empty() {
        return true;
    }
    let text = business.searchable_text();
    interests.iter().any(|interest| text.contains(interest.as_str()))
}
