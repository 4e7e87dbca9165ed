//! Per-user behaviour tracking: bounded recently-viewed / recently-purchased
//! buffers and the category-based recommendations built on them.

use bizrec_core::config::BehaviorConfig;
use bizrec_core::types::{
    ActionKind, BusinessRecord, RecommendationResult, RecommendationSource, UserId,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::popularity::most_popular;

struct BehaviorState {
    viewed: VecDeque<String>,
    purchased: VecDeque<String>,
    last_seen: Instant,
}

impl BehaviorState {
    fn new(viewed_capacity: usize, purchased_capacity: usize) -> Self {
        Self {
            viewed: VecDeque::with_capacity(viewed_capacity),
            purchased: VecDeque::with_capacity(purchased_capacity),
            last_seen: Instant::now(),
        }
    }
}

/// Push unless already present, evicting the oldest entry at capacity.
fn push_bounded(buffer: &mut VecDeque<String>, business_id: &str, capacity: usize) -> bool {
    if buffer.iter().any(|id| id == business_id) {
        return false;
    }
    while buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(business_id.to_string());
    true
}

/// Point-in-time copy of one user's behaviour, oldest entries first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSnapshot {
    pub viewed: Vec<String>,
    pub purchased: Vec<String>,
}

/// Each user has their own lock, so appends for one user serialise without
/// blocking users on other map shards.
pub struct BehaviorTracker {
    states: DashMap<UserId, Arc<Mutex<BehaviorState>>>,
    viewed_capacity: usize,
    purchased_capacity: usize,
}

impl BehaviorTracker {
    pub fn new(viewed_capacity: usize, purchased_capacity: usize) -> Self {
        Self {
            states: DashMap::new(),
            viewed_capacity,
            purchased_capacity,
        }
    }

    pub fn from_config(config: &BehaviorConfig) -> Self {
        Self::new(config.viewed_capacity, config.purchased_capacity)
    }

    /// Track an interaction. Anonymous users and share actions are ignored.
    /// Returns whether a buffer changed.
    pub fn record(&self, user_id: Option<UserId>, business_id: &str, action: ActionKind) -> bool {
        let user_id = match user_id {
            Some(id) => id,
            None => return false,
        };

        // The entry stays held until the append lands, so an idle sweep
        // cannot remove the state in between.
        let entry = self.states.entry(user_id).or_insert_with(|| {
            Arc::new(Mutex::new(BehaviorState::new(
                self.viewed_capacity,
                self.purchased_capacity,
            )))
        });
        let changed = {
            let mut state = entry.value().lock();
            state.last_seen = Instant::now();
            match action {
                ActionKind::View | ActionKind::Click => {
                    push_bounded(&mut state.viewed, business_id, self.viewed_capacity)
                }
                ActionKind::Purchase => {
                    push_bounded(&mut state.purchased, business_id, self.purchased_capacity)
                }
                ActionKind::Share => false,
            }
        };
        drop(entry);

        debug!(user_id, business_id, %action, changed, "Behaviour recorded");
        changed
    }

    pub fn snapshot(&self, user_id: UserId) -> Option<BehaviorSnapshot> {
        let state = self.states.get(&user_id)?.value().clone();
        let state = state.lock();
        Some(BehaviorSnapshot {
            viewed: state.viewed.iter().cloned().collect(),
            purchased: state.purchased.iter().cloned().collect(),
        })
    }

    /// Businesses sharing a category with the user's purchases (most recent
    /// first), or with their views when purchases yield nothing. Anonymous
    /// users and users without usable history get the popularity ranking.
    pub fn recommend_from_behavior(
        &self,
        user_id: Option<UserId>,
        catalog: &[BusinessRecord],
        limit: usize,
    ) -> RecommendationResult {
        let personalized = user_id
            .and_then(|id| self.snapshot(id))
            .map(|behavior| {
                let from_purchases = category_mates(&behavior.purchased, catalog);
                if from_purchases.is_empty() {
                    category_mates(&behavior.viewed, catalog)
                } else {
                    from_purchases
                }
            })
            .unwrap_or_default();

        if personalized.is_empty() {
            metrics::counter!("recommendations.behavior.fallback").increment(1);
            return RecommendationResult::new(
                most_popular(catalog, limit),
                RecommendationSource::PopularityFallback,
                limit,
            );
        }

        let businesses: Vec<BusinessRecord> = personalized.into_iter().take(limit).collect();
        RecommendationResult::new(businesses, RecommendationSource::Content, limit)
    }

    /// Drop users idle for longer than `ttl`. Returns how many were removed.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        self.drain_idle(ttl).len()
    }

    /// Remove users idle for longer than `ttl`, returning what they held.
    fn drain_idle(&self, ttl: Duration) -> Vec<(UserId, BehaviorSnapshot)> {
        let mut drained = Vec::new();
        self.states.retain(|user_id, state| {
            let state = state.lock();
            if state.last_seen.elapsed() <= ttl {
                return true;
            }
            drained.push((
                *user_id,
                BehaviorSnapshot {
                    viewed: state.viewed.iter().cloned().collect(),
                    purchased: state.purchased.iter().cloned().collect(),
                },
            ));
            false
        });
        drained
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for BehaviorTracker {
    fn default() -> Self {
        Self::from_config(&BehaviorConfig::default())
    }
}

/// Active catalog entries that share a category with any source business,
/// walking sources newest first and keeping first-seen order.
fn category_mates(sources: &[String], catalog: &[BusinessRecord]) -> Vec<BusinessRecord> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut mates = Vec::new();

    for source_id in sources.iter().rev() {
        let source = match catalog.iter().find(|b| &b.id == source_id) {
            Some(b) => b,
            None => continue,
        };
        for candidate in catalog {
            if candidate.id == source.id || !candidate.is_active {
                continue;
            }
            if candidate.shares_category_with(source) && seen.insert(candidate.id.as_str()) {
                mates.push(candidate.clone());
            }
        }
    }
    mates
}
