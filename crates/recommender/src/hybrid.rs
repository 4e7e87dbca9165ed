//! Hybrid recommender: blends content and collaborative candidates.

use bizrec_core::types::UserId;
use std::collections::HashSet;
use tracing::debug;

use crate::collaborative::CollaborativeEngine;
use crate::content::ContentIndex;

#[derive(Debug, Clone)]
pub struct HybridRecommender {
    content: ContentIndex,
    collaborative: CollaborativeEngine,
    trained: bool,
}

impl HybridRecommender {
    /// A recommender whose training pass has not run yet.
    pub fn untrained(neighbors: usize) -> Self {
        Self {
            content: ContentIndex::untrained(),
            collaborative: CollaborativeEngine::new(neighbors),
            trained: false,
        }
    }

    /// Wrap sub-engines produced by a completed training pass. Either may
    /// itself be untrained when its input data was unavailable.
    pub fn from_trained(content: ContentIndex, collaborative: CollaborativeEngine) -> Self {
        Self {
            content,
            collaborative,
            trained: true,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn content(&self) -> &ContentIndex {
        &self.content
    }

    pub fn collaborative(&self) -> &CollaborativeEngine {
        &self.collaborative
    }

    /// Returns an empty list when nothing matched; falling back to
    /// popularity is the caller's job.
    pub fn recommend(
        &self,
        user_id: Option<UserId>,
        interests: &[String],
        limit: usize,
    ) -> Vec<String> {
        if !self.trained || limit == 0 {
            return Vec::new();
        }

        let candidates = limit.saturating_mul(2);
        let content = if interests.is_empty() {
            Vec::new()
        } else {
            self.content.query(interests, candidates)
        };
        let collaborative = match user_id {
            Some(id) => self.collaborative.recommend(id, candidates),
            None => Vec::new(),
        };

        debug!(
            content = content.len(),
            collaborative = collaborative.len(),
            limit,
            "Merging hybrid candidates"
        );
        merge_candidates(&content, &collaborative, limit)
    }
}

/// Interleave policy: when both lists have candidates, half the slots go to
/// each (content first) and the rest is topped up from content then
/// collaborative order. With one list, its first `limit` unique ids.
pub fn merge_candidates(content: &[String], collaborative: &[String], limit: usize) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    // Sized by the candidates, never by the caller's limit.
    let mut merged: Vec<String> =
        Vec::with_capacity(limit.min(content.len() + collaborative.len()));

    if !content.is_empty() && !collaborative.is_empty() {
        let half = limit / 2;
        for id in content.iter().take(half) {
            if seen.insert(id.as_str()) {
                merged.push(id.clone());
            }
        }
        for id in collaborative.iter().take(half) {
            if seen.insert(id.as_str()) {
                merged.push(id.clone());
            }
        }
    }

    for id in content.iter().chain(collaborative.iter()) {
        if merged.len() >= limit {
            break;
        }
        if seen.insert(id.as_str()) {
            merged.push(id.clone());
        }
    }

    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_interleaves_both_sources() {
        let merged = merge_candidates(
            &ids(&["c1", "c2", "c3", "c4"]),
            &ids(&["u1", "u2", "u3", "u4"]),
            4,
        );
        assert_eq!(merged, ids(&["c1", "c2", "u1", "u2"]));
    }

    #[test]
    fn test_tops_up_from_union() {
        let merged = merge_candidates(&ids(&["c1", "c2", "c3"]), &ids(&["u1"]), 5);
        assert_eq!(merged, ids(&["c1", "c2", "u1", "c3"]));

        // Odd limit leaves one slot for the top-up.
        let merged = merge_candidates(&ids(&["c1", "c2"]), &ids(&["u1", "u2"]), 3);
        assert_eq!(merged, ids(&["c1", "u1", "c2"]));
    }

    #[test]
    fn test_overlap_is_deduplicated() {
        let merged = merge_candidates(&ids(&["x", "c1"]), &ids(&["x", "u1", "u2"]), 4);
        assert_eq!(merged, ids(&["x", "c1", "u1", "u2"]));
        let unique: HashSet<&String> = merged.iter().collect();
        assert_eq!(unique.len(), merged.len());
    }

    #[test]
    fn test_single_source() {
        assert_eq!(
            merge_candidates(&ids(&["c1", "c1", "c2", "c3"]), &[], 2),
            ids(&["c1", "c2"])
        );
        assert_eq!(
            merge_candidates(&[], &ids(&["u1", "u2"]), 5),
            ids(&["u1", "u2"])
        );
        assert!(merge_candidates(&[], &[], 5).is_empty());
    }

    #[test]
    fn test_length_bounded_by_limit() {
        let content = ids(&["a", "b", "c", "d", "e", "f"]);
        let collaborative = ids(&["f", "e", "g", "h"]);
        for limit in 0..10 {
            let merged = merge_candidates(&content, &collaborative, limit);
            assert!(merged.len() <= limit);
            let unique: HashSet<&String> = merged.iter().collect();
            assert_eq!(unique.len(), merged.len());
        }
    }

    #[test]
    fn test_huge_limit_does_not_allocate_by_limit() {
        let merged = merge_candidates(&ids(&["c1", "c2"]), &ids(&["u1"]), usize::MAX);
        assert_eq!(merged, ids(&["c1", "c2", "u1"]));
        let merged = merge_candidates(&ids(&["c1"]), &[], usize::MAX / 4);
        assert_eq!(merged, ids(&["c1"]));
    }

    #[test]
    fn test_untrained_returns_nothing() {
        let recommender = HybridRecommender::untrained(5);
        assert!(recommender
            .recommend(Some(1), &ids(&["coffee"]), 5)
            .is_empty());
    }
}
