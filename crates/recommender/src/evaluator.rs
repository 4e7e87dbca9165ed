//! Offline quality metrics for ranked recommendation lists.

use bizrec_core::types::{InteractionEvent, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Guards `ln(0)` for items that were never recommended before.
const NOVELTY_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Aggregate over every evaluated user of one evaluation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub k: usize,
    pub evaluated_users: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub coverage: f64,
    pub novelty: f64,
}

/// precision@k = hits / k, recall@k = hits / |truth|, F1 from both.
pub fn precision_recall_at_k(
    true_positives: &HashSet<String>,
    recommendations: &[String],
    k: usize,
) -> RankingScores {
    if k == 0 || true_positives.is_empty() || recommendations.is_empty() {
        return RankingScores::default();
    }
    let hits = recommendations
        .iter()
        .take(k)
        .filter(|id| true_positives.contains(*id))
        .count() as f64;

    let precision = hits / k as f64;
    let recall = hits / true_positives.len() as f64;
    RankingScores {
        precision,
        recall,
        f1: f1_score(precision, recall),
    }
}

pub fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// Share of the catalog that appears at least once in `recommended`.
pub fn coverage(catalog_size: usize, recommended: &[String]) -> f64 {
    if catalog_size == 0 {
        return 0.0;
    }
    let unique: HashSet<&String> = recommended.iter().collect();
    unique.len() as f64 / catalog_size as f64
}

/// Mean of `-ln(popularity + ε)`, popularity being each item's share of all
/// historical recommendation counts.
pub fn novelty(recommendation_counts: &HashMap<String, usize>, recommendations: &[String]) -> f64 {
    if recommendations.is_empty() {
        return 0.0;
    }
    let total: usize = recommendation_counts.values().sum();
    let sum: f64 = recommendations
        .iter()
        .map(|id| {
            let popularity = if total > 0 {
                recommendation_counts.get(id).copied().unwrap_or(0) as f64 / total as f64
            } else {
                0.0
            };
            -(popularity + NOVELTY_EPSILON).ln()
        })
        .sum();
    sum / recommendations.len() as f64
}

/// Leave-last-out split. For each user with at least two distinct businesses,
/// the chronologically last event (log order breaks ties) is held out as the
/// truth. Returns the training events and the held-out truth per user.
pub fn holdout_split(
    events: &[InteractionEvent],
) -> (Vec<InteractionEvent>, Vec<(UserId, HashSet<String>)>) {
    let mut per_user: HashMap<UserId, Vec<usize>> = HashMap::new();
    let mut user_order: Vec<UserId> = Vec::new();
    for (position, event) in events.iter().enumerate() {
        if let Some(user) = event.user_id {
            per_user
                .entry(user)
                .or_insert_with(|| {
                    user_order.push(user);
                    Vec::new()
                })
                .push(position);
        }
    }

    let mut held_out: HashSet<usize> = HashSet::new();
    let mut truth = Vec::new();
    for user in user_order {
        let positions = &per_user[&user];
        let distinct: HashSet<&str> = positions
            .iter()
            .map(|&p| events[p].business_id.as_str())
            .collect();
        if distinct.len() < 2 {
            continue;
        }
        // max_by_key returns the last maximum, so later log entries win ties.
        let last = positions
            .iter()
            .copied()
            .max_by_key(|&p| events[p].timestamp)
            .unwrap_or(positions[positions.len() - 1]);
        let business = events[last].business_id.clone();

        // Drop every event on the held-out business so it stays unseen.
        for &p in positions {
            if events[p].business_id == business {
                held_out.insert(p);
            }
        }
        truth.push((user, HashSet::from([business])));
    }

    let training = events
        .iter()
        .enumerate()
        .filter(|(p, _)| !held_out.contains(p))
        .map(|(_, e)| e.clone())
        .collect();
    (training, truth)
}

/// Fold per-user ranked lists into one report.
pub fn evaluate_runs(
    runs: &[(HashSet<String>, Vec<String>)],
    catalog_size: usize,
    k: usize,
) -> EvaluationReport {
    if runs.is_empty() {
        return EvaluationReport {
            k,
            ..Default::default()
        };
    }

    let mut totals = RankingScores::default();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut all_recommended: Vec<String> = Vec::new();
    for (truth, recommended) in runs {
        let scores = precision_recall_at_k(truth, recommended, k);
        totals.precision += scores.precision;
        totals.recall += scores.recall;
        for id in recommended.iter().take(k) {
            *counts.entry(id.clone()).or_insert(0) += 1;
            all_recommended.push(id.clone());
        }
    }

    let n = runs.len() as f64;
    let precision = totals.precision / n;
    let recall = totals.recall / n;
    EvaluationReport {
        k,
        evaluated_users: runs.len(),
        precision,
        recall,
        f1_score: f1_score(precision, recall),
        coverage: coverage(catalog_size, &all_recommended),
        novelty: novelty(&counts, &all_recommended),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizrec_core::types::ActionKind;
    use chrono::{Duration, Utc};

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn list(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_precision_recall_f1() {
        let scores = precision_recall_at_k(&set(&["a", "b"]), &list(&["a", "x", "b", "y"]), 4);
        assert_eq!(scores.precision, 0.5);
        assert_eq!(scores.recall, 1.0);
        assert!((scores.f1 - 2.0 / 3.0).abs() < 1e-12);

        let top1 = precision_recall_at_k(&set(&["a", "b"]), &list(&["a", "x", "b"]), 1);
        assert_eq!(top1.precision, 1.0);
        assert_eq!(top1.recall, 0.5);
    }

    #[test]
    fn test_no_hits_gives_zero_f1() {
        let scores = precision_recall_at_k(&set(&["a"]), &list(&["x", "y"]), 2);
        assert_eq!(scores, RankingScores::default());
        assert_eq!(f1_score(0.0, 0.0), 0.0);
        assert_eq!(precision_recall_at_k(&set(&[]), &list(&["x"]), 2), RankingScores::default());
    }

    #[test]
    fn test_coverage() {
        assert_eq!(coverage(4, &list(&["a", "b", "a"])), 0.5);
        assert_eq!(coverage(0, &list(&["a"])), 0.0);
    }

    #[test]
    fn test_novelty_prefers_rare_items() {
        let counts: HashMap<String, usize> =
            [("hit".to_string(), 90), ("niche".to_string(), 10)].into_iter().collect();
        let popular = novelty(&counts, &list(&["hit"]));
        let rare = novelty(&counts, &list(&["niche"]));
        assert!(rare > popular);
        assert!((popular - -(0.9f64 + NOVELTY_EPSILON).ln()).abs() < 1e-12);
        assert_eq!(novelty(&counts, &[]), 0.0);
        // Never-recommended items get the maximum novelty.
        assert!(novelty(&counts, &list(&["unseen"])) > 20.0);
    }

    #[test]
    fn test_holdout_split_takes_latest_event() {
        let now = Utc::now();
        let events = vec![
            InteractionEvent::new(Some(1), "a", ActionKind::View, Some(now - Duration::days(3))),
            InteractionEvent::new(Some(1), "b", ActionKind::Purchase, Some(now - Duration::days(1))),
            InteractionEvent::new(Some(1), "c", ActionKind::View, Some(now - Duration::days(2))),
            InteractionEvent::new(Some(2), "a", ActionKind::View, Some(now)),
            InteractionEvent::new(Some(2), "a", ActionKind::Click, Some(now)),
            InteractionEvent::new(None, "a", ActionKind::View, Some(now)),
        ];
        let (training, truth) = holdout_split(&events);
        assert_eq!(truth, vec![(1, set(&["b"]))]);
        assert_eq!(training.len(), 5);
        assert!(training.iter().all(|e| !(e.user_id == Some(1) && e.business_id == "b")));
    }

    #[test]
    fn test_evaluate_runs() {
        let runs = vec![
            (set(&["a"]), list(&["a", "b"])),
            (set(&["c"]), list(&["b", "d"])),
        ];
        let report = evaluate_runs(&runs, 4, 2);
        assert_eq!(report.evaluated_users, 2);
        assert_eq!(report.precision, 0.25);
        assert_eq!(report.recall, 0.5);
        assert_eq!(report.coverage, 0.75);
        assert!(report.novelty > 0.0);

        let empty = evaluate_runs(&[], 4, 10);
        assert_eq!(empty.evaluated_users, 0);
        assert_eq!(empty.k, 10);
    }
}
