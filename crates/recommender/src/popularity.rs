//! Popularity ranking: the cold-start fallback for every strategy.

use bizrec_core::types::BusinessRecord;

/// Active businesses ordered by rating, then review count, highest first.
/// Equal entries keep catalog order.
pub fn most_popular(catalog: &[BusinessRecord], limit: usize) -> Vec<BusinessRecord> {
    let mut items: Vec<&BusinessRecord> = catalog.iter().filter(|b| b.is_active).collect();
    items.sort_by(|a, b| {
        b.rating
            .partial_cmp(&a.rating)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.review_count.cmp(&a.review_count))
    });
    items.into_iter().take(limit).cloned().collect()
}
