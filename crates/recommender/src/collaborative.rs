//! User-user collaborative filtering over the interaction matrix.

use bizrec_core::error::{RecError, RecResult};
use bizrec_core::types::UserId;
use ndarray::{Array1, Array2};
use tracing::{debug, info};

use crate::matrix::InteractionMatrix;

#[derive(Debug, Clone)]
struct TrainedModel {
    matrix: InteractionMatrix,
    /// Symmetric, unit diagonal, indexed by matrix row.
    similarity: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct CollaborativeEngine {
    neighbors: usize,
    model: Option<TrainedModel>,
}

impl CollaborativeEngine {
    pub fn new(neighbors: usize) -> Self {
        Self {
            neighbors,
            model: None,
        }
    }

    /// Compute the user-user cosine similarity matrix. A matrix without rows
    /// leaves the engine untrained.
    pub fn train(&mut self, matrix: InteractionMatrix) -> RecResult<()> {
        if matrix.is_empty() {
            return Err(RecError::DataUnavailable(
                "interaction matrix has no users".to_string(),
            ));
        }

        let similarity = cosine_similarity(matrix.weights());
        info!(
            users = matrix.n_users(),
            businesses = matrix.n_businesses(),
            "Collaborative model trained"
        );
        self.model = Some(TrainedModel { matrix, similarity });
        Ok(())
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn similarity_matrix(&self) -> Option<&Array2<f64>> {
        self.model.as_ref().map(|m| &m.similarity)
    }

    pub fn matrix(&self) -> Option<&InteractionMatrix> {
        self.model.as_ref().map(|m| &m.matrix)
    }

    /// The most similar other users as `(row, similarity)`, best first.
    /// Ties keep the row order of the matrix.
    pub fn similar_users(&self, user_id: UserId) -> RecResult<Vec<(usize, f64)>> {
        let model = self.model.as_ref().ok_or_else(|| {
            RecError::DataUnavailable("collaborative model is untrained".to_string())
        })?;
        let target = model
            .matrix
            .user_index(user_id)
            .ok_or(RecError::UnknownUser(user_id))?;

        let mut others: Vec<(usize, f64)> = model
            .similarity
            .row(target)
            .iter()
            .copied()
            .enumerate()
            .filter(|(row, _)| *row != target)
            .collect();
        others.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        others.truncate(self.neighbors);
        Ok(others)
    }

    /// Sum the neighbours' interaction rows, drop everything the user already
    /// touched and return the `limit` best-scoring businesses.
    pub fn recommend(&self, user_id: UserId, limit: usize) -> Vec<String> {
        let neighbors = match self.similar_users(user_id) {
            Ok(n) => n,
            Err(e) => {
                debug!(user_id, reason = %e, "No collaborative candidates");
                return Vec::new();
            }
        };
        let model = match self.model.as_ref() {
            Some(m) => m,
            None => return Vec::new(),
        };
        let matrix = &model.matrix;
        let target = match matrix.user_index(user_id) {
            Some(row) => row,
            None => return Vec::new(),
        };

        let mut scores = Array1::<f64>::zeros(matrix.n_businesses());
        for &(row, _) in &neighbors {
            scores += &matrix.row(row);
        }
        for (column, weight) in matrix.row(target).iter().enumerate() {
            if *weight > 0.0 {
                scores[column] = 0.0;
            }
        }

        let mut ranked: Vec<(usize, f64)> = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);

        ranked
            .into_iter()
            .map(|(column, _)| matrix.business_ids()[column].clone())
            .collect()
    }
}

impl Default for CollaborativeEngine {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Row-wise cosine similarity. Rows with zero norm are similar to nothing
/// but themselves.
pub fn cosine_similarity(weights: &Array2<f64>) -> Array2<f64> {
    let n = weights.nrows();
    let norms: Vec<f64> = weights.rows().into_iter().map(|r| r.dot(&r).sqrt()).collect();
    let mut similarity = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        similarity[[i, i]] = 1.0;
        for j in (i + 1)..n {
            let value = if norms[i] > 0.0 && norms[j] > 0.0 {
                weights.row(i).dot(&weights.row(j)) / (norms[i] * norms[j])
            } else {
                0.0
            };
            similarity[[i, j]] = value;
            similarity[[j, i]] = value;
        }
    }
    similarity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weighting::FeatureWeighting;
    use bizrec_core::types::{ActionKind, InteractionEvent};
    use chrono::Utc;
    use std::collections::HashSet;

    fn build(events: &[InteractionEvent]) -> InteractionMatrix {
        let known: HashSet<&str> = ["a", "b", "c", "d", "e"].into_iter().collect();
        InteractionMatrix::build(events, &known, &FeatureWeighting::default(), Utc::now())
    }

    fn event(user: UserId, business: &str, action: ActionKind) -> InteractionEvent {
        InteractionEvent::new(Some(user), business, action, None)
    }

    #[test]
    fn test_similarity_symmetric_unit_diagonal() {
        let matrix = build(&[
            event(1, "a", ActionKind::Purchase),
            event(1, "b", ActionKind::View),
            event(2, "a", ActionKind::Click),
            event(3, "c", ActionKind::Share),
        ]);
        let mut engine = CollaborativeEngine::default();
        engine.train(matrix).unwrap();
        let sim = engine.similarity_matrix().unwrap();
        for i in 0..sim.nrows() {
            assert_eq!(sim[[i, i]], 1.0);
            for j in 0..sim.ncols() {
                assert_eq!(sim[[i, j]], sim[[j, i]]);
            }
        }
        // Users 1 and 3 share nothing.
        assert_eq!(sim[[0, 2]], 0.0);
        assert!(sim[[0, 1]] > 0.0);
    }

    #[test]
    fn test_recommend_items_from_neighbours() {
        let matrix = build(&[
            event(1, "a", ActionKind::Purchase),
            event(1, "b", ActionKind::Purchase),
            event(2, "a", ActionKind::Purchase),
            event(2, "c", ActionKind::Purchase),
            event(3, "a", ActionKind::View),
            event(3, "c", ActionKind::View),
            event(3, "d", ActionKind::Share),
        ]);
        let mut engine = CollaborativeEngine::default();
        engine.train(matrix).unwrap();

        let recs = engine.recommend(1, 10);
        // c is backed by two neighbours, d by one.
        assert_eq!(recs, vec!["c".to_string(), "d".to_string()]);
    }

    #[test]
    fn test_never_recommends_interacted() {
        let events: Vec<InteractionEvent> = (0..40)
            .map(|i| {
                event(
                    i % 6,
                    ["a", "b", "c", "d", "e"][(i * 7 % 5) as usize],
                    ActionKind::Click,
                )
            })
            .collect();
        let matrix = build(&events);
        let mut engine = CollaborativeEngine::default();
        engine.train(matrix.clone()).unwrap();

        for &user in matrix.user_ids() {
            let interacted = matrix.interacted(user);
            for business in engine.recommend(user, 10) {
                assert!(!interacted.contains(&business.as_str()));
            }
        }
    }

    #[test]
    fn test_unknown_user_and_untrained() {
        let engine = CollaborativeEngine::default();
        assert!(engine.recommend(1, 5).is_empty());
        assert!(matches!(
            engine.similar_users(1),
            Err(RecError::DataUnavailable(_))
        ));

        let mut engine = CollaborativeEngine::default();
        engine.train(build(&[event(1, "a", ActionKind::View)])).unwrap();
        assert!(engine.recommend(99, 5).is_empty());
        assert!(matches!(engine.similar_users(99), Err(RecError::UnknownUser(99))));
    }

    #[test]
    fn test_empty_matrix_leaves_untrained() {
        let mut engine = CollaborativeEngine::default();
        assert!(engine.train(build(&[])).is_err());
        assert!(!engine.is_trained());
    }

    #[test]
    fn test_neighbour_cap_and_tie_order() {
        // Users 2..=8 are identical to each other and equally similar to 1.
        let mut events = vec![event(1, "a", ActionKind::View)];
        for user in 2..=8 {
            events.push(event(user, "a", ActionKind::View));
        }
        let mut engine = CollaborativeEngine::new(5);
        engine.train(build(&events)).unwrap();
        let neighbours = engine.similar_users(1).unwrap();
        let rows: Vec<usize> = neighbours.iter().map(|(row, _)| *row).collect();
        assert_eq!(rows, vec![1, 2, 3, 4, 5]);
    }
}
