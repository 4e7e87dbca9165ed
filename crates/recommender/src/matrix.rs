//! User × business interaction matrix built from the interaction log.

use bizrec_core::types::{InteractionEvent, UserId};
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::weighting::FeatureWeighting;

/// Aggregated, recency-weighted interaction counts. Rows follow the order in
/// which users first appear in the log, columns the order of businesses.
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    user_ids: Vec<UserId>,
    business_ids: Vec<String>,
    weights: Array2<f64>,
    user_index: HashMap<UserId, usize>,
    events_used: usize,
}

impl InteractionMatrix {
    /// Accumulate weighted events into cells. Anonymous events, events
    /// outside the retention window and events on businesses missing from
    /// `known_businesses` are skipped.
    pub fn build(
        events: &[InteractionEvent],
        known_businesses: &HashSet<&str>,
        weighting: &FeatureWeighting,
        now: DateTime<Utc>,
    ) -> Self {
        let mut user_ids = Vec::new();
        let mut business_ids = Vec::new();
        let mut user_index: HashMap<UserId, usize> = HashMap::new();
        let mut business_index: HashMap<String, usize> = HashMap::new();
        let mut cells: Vec<(usize, usize, f64)> = Vec::new();

        for event in events {
            let user_id = match event.user_id {
                Some(id) => id,
                None => continue,
            };
            if !known_businesses.contains(event.business_id.as_str()) {
                continue;
            }
            let weight = match weighting.weigh_event(event, now) {
                Some(w) => w,
                None => continue,
            };

            let row = *user_index.entry(user_id).or_insert_with(|| {
                user_ids.push(user_id);
                user_ids.len() - 1
            });
            let column = match business_index.get(&event.business_id) {
                Some(&column) => column,
                None => {
                    business_ids.push(event.business_id.clone());
                    business_index.insert(event.business_id.clone(), business_ids.len() - 1);
                    business_ids.len() - 1
                }
            };
            cells.push((row, column, weight));
        }

        let mut weights = Array2::<f64>::zeros((user_ids.len(), business_ids.len()));
        for &(row, column, weight) in &cells {
            weights[[row, column]] += weight;
        }

        debug!(
            users = user_ids.len(),
            businesses = business_ids.len(),
            events = cells.len(),
            "Interaction matrix built"
        );

        Self {
            user_ids,
            business_ids,
            weights,
            user_index,
            events_used: cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }

    pub fn n_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn n_businesses(&self) -> usize {
        self.business_ids.len()
    }

    pub fn events_used(&self) -> usize {
        self.events_used
    }

    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn business_ids(&self) -> &[String] {
        &self.business_ids
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn user_index(&self, user_id: UserId) -> Option<usize> {
        self.user_index.get(&user_id).copied()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.weights.row(index)
    }

    /// Businesses the user has positive weight for.
    pub fn interacted(&self, user_id: UserId) -> Vec<&str> {
        match self.user_index(user_id) {
            Some(row) => self
                .weights
                .row(row)
                .iter()
                .enumerate()
                .filter(|(_, w)| **w > 0.0)
                .map(|(column, _)| self.business_ids[column].as_str())
                .collect(),
            None => Vec::new(),
        }
    }
}
