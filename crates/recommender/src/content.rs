//! Content index: TF-IDF vectors over business text and cosine lookup for
//! free-text interest queries.

use bizrec_core::error::{RecError, RecResult};
use bizrec_core::types::BusinessRecord;
use ndarray::{Array1, Array2};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Reduced English stop list, a subset of the usual 318-word list.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "however", "i", "if", "in", "into", "is", "it",
    "its", "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now",
    "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over",
    "own", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their",
    "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "very", "was", "we", "were", "what", "when",
    "where", "which", "while", "who", "whom", "why", "will", "with", "within", "without",
    "would", "you", "your", "yours", "yourself", "yourselves",
];

/// Lowercase alphanumeric runs of at least two characters. Words on the
/// reduced English stop list are removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

/// Fitted TF-IDF state plus one L2-normalised row per indexed business.
#[derive(Debug, Clone)]
pub struct ContentIndex {
    business_ids: Vec<String>,
    vocabulary: BTreeMap<String, usize>,
    idf: Array1<f64>,
    vectors: Array2<f64>,
    trained: bool,
}

impl ContentIndex {
    /// An index that was never fitted. Every query returns nothing.
    pub fn untrained() -> Self {
        Self {
            business_ids: Vec::new(),
            vocabulary: BTreeMap::new(),
            idf: Array1::zeros(0),
            vectors: Array2::zeros((0, 0)),
            trained: false,
        }
    }

    /// Fit over the active businesses. The vocabulary keeps the
    /// `max_features` most frequent terms (ties alphabetical).
    pub fn fit(businesses: &[BusinessRecord], max_features: usize) -> RecResult<Self> {
        let (business_ids, documents): (Vec<String>, Vec<Vec<String>>) = businesses
            .iter()
            .filter(|b| b.is_active)
            .map(|b| (b.id.clone(), tokenize(&b.content_text())))
            .unzip();

        if business_ids.is_empty() {
            return Err(RecError::DataUnavailable(
                "no active businesses to index".to_string(),
            ));
        }

        let mut corpus_counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
        for document in &documents {
            let mut seen = BTreeSet::new();
            for token in document {
                *corpus_counts.entry(token.as_str()).or_insert(0) += 1;
                if seen.insert(token.as_str()) {
                    *document_frequency.entry(token.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = corpus_counts.into_iter().collect();
        // BTreeMap order is alphabetical; the stable sort keeps it for ties.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(max_features);
        let selected: BTreeSet<&str> = ranked.into_iter().map(|(term, _)| term).collect();

        let vocabulary: BTreeMap<String, usize> = selected
            .iter()
            .enumerate()
            .map(|(index, term)| (term.to_string(), index))
            .collect();

        let n_docs = documents.len() as f64;
        let idf: Array1<f64> = selected
            .iter()
            .map(|term| {
                let df = document_frequency.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        let mut vectors = Array2::<f64>::zeros((documents.len(), vocabulary.len()));
        for (row, document) in documents.iter().enumerate() {
            let weights = weigh_terms(document, &vocabulary, &idf);
            for (column, value) in weights {
                vectors[[row, column]] = value;
            }
        }

        info!(
            businesses = business_ids.len(),
            vocabulary = vocabulary.len(),
            "Content index fitted"
        );

        Ok(Self {
            business_ids,
            vocabulary,
            idf,
            vectors,
            trained: true,
        })
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn business_ids(&self) -> &[String] {
        &self.business_ids
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Term-weight matrix, one row per entry of `business_ids()`.
    pub fn vectors(&self) -> &Array2<f64> {
        &self.vectors
    }

    /// Project a query into the fitted space. `None` when no query term is
    /// in the vocabulary.
    pub fn project(&self, interest_terms: &[String]) -> Option<Array1<f64>> {
        let tokens = tokenize(&interest_terms.join(" "));
        let weights = weigh_terms(&tokens, &self.vocabulary, &self.idf);
        if weights.is_empty() {
            return None;
        }
        let mut query = Array1::<f64>::zeros(self.vocabulary.len());
        for (column, value) in weights {
            query[column] = value;
        }
        Some(query)
    }

    /// The `limit` businesses most similar to the joined interest text.
    /// Businesses with similarity `<= 0` are never returned.
    pub fn query(&self, interest_terms: &[String], limit: usize) -> Vec<String> {
        if !self.trained || self.business_ids.is_empty() || limit == 0 {
            return Vec::new();
        }
        let query = match self.project(interest_terms) {
            Some(q) => q,
            None => {
                debug!(?interest_terms, "Query has no in-vocabulary terms");
                return Vec::new();
            }
        };

        // Rows and the query are unit length, so the dot product is the cosine.
        let similarities = self.vectors.dot(&query);
        let mut scored: Vec<(usize, f64)> = similarities
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, similarity)| *similarity > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(row, _)| self.business_ids[row].clone())
            .collect()
    }
}

impl Default for ContentIndex {
    fn default() -> Self {
        Self::untrained()
    }
}

/// Raw term counts times IDF, L2-normalised. Out-of-vocabulary tokens are
/// dropped. Returned in column order.
fn weigh_terms(
    tokens: &[String],
    vocabulary: &BTreeMap<String, usize>,
    idf: &Array1<f64>,
) -> Vec<(usize, f64)> {
    let mut counts: HashMap<usize, f64> = HashMap::new();
    for token in tokens {
        if let Some(&column) = vocabulary.get(token) {
            *counts.entry(column).or_insert(0.0) += 1.0;
        }
    }

    let mut weights: Vec<(usize, f64)> = counts
        .into_iter()
        .map(|(column, count)| (column, count * idf[column]))
        .collect();
    weights.sort_by_key(|(column, _)| *column);

    let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for (_, w) in weights.iter_mut() {
            *w /= norm;
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<BusinessRecord> {
        vec![
            BusinessRecord::new("tech_hub", "Nairobi Tech Hub")
                .with_description("A modern co-working space for tech startups and freelancers")
                .with_categories(["TECH", "COWORKING"]),
            BusinessRecord::new("coffee", "Nairobi Coffee Shop")
                .with_description("Cozy coffee shop with free WiFi")
                .with_categories(["FOOD", "COFFEE", "CAFE"])
                .with_tags(["espresso"]),
            BusinessRecord::new("gadgets", "Premium Tech Store")
                .with_description("High-end technology products and gadgets")
                .with_categories(["TECH", "ELECTRONICS"]),
        ]
    }

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_tokenize_drops_stop_words_and_short_tokens() {
        let tokens = tokenize("The Coffee-Shop, a place for WiFi & 5G!");
        assert_eq!(tokens, vec!["coffee", "shop", "place", "wifi", "5g"]);
    }

    #[test]
    fn test_query_ranks_matching_business_first() {
        let index = ContentIndex::fit(&catalog(), 1000).unwrap();
        let results = index.query(&terms(&["coffee"]), 10);
        assert_eq!(results, vec!["coffee"]);

        let results = index.query(&terms(&["tech", "gadgets"]), 10);
        assert_eq!(results[0], "gadgets");
        assert!(results.contains(&"tech_hub".to_string()));
        assert!(!results.contains(&"coffee".to_string()));
    }

    #[test]
    fn test_query_respects_limit() {
        let index = ContentIndex::fit(&catalog(), 1000).unwrap();
        let results = index.query(&terms(&["nairobi", "tech"]), 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_out_of_vocabulary_query_is_empty() {
        let index = ContentIndex::fit(&catalog(), 1000).unwrap();
        assert!(index.query(&terms(&["submarine"]), 5).is_empty());
        assert!(index.query(&[], 5).is_empty());
    }

    #[test]
    fn test_untrained_and_empty_corpus() {
        assert!(ContentIndex::untrained().query(&terms(&["coffee"]), 5).is_empty());
        assert!(matches!(
            ContentIndex::fit(&[], 1000),
            Err(RecError::DataUnavailable(_))
        ));
        let inactive = vec![BusinessRecord::new("x", "Closed Coffee").inactive()];
        assert!(ContentIndex::fit(&inactive, 1000).is_err());
    }

    #[test]
    fn test_vocabulary_cap() {
        let index = ContentIndex::fit(&catalog(), 3).unwrap();
        assert_eq!(index.vocabulary_size(), 3);
        // "tech" and "nairobi" are among the most frequent terms.
        assert!(!index.query(&terms(&["tech"]), 5).is_empty());
    }

    #[test]
    fn test_rows_are_unit_length() {
        let index = ContentIndex::fit(&catalog(), 1000).unwrap();
        for row in index.vectors().rows() {
            let norm = row.dot(&row).sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_refit_is_bit_identical() {
        let first = ContentIndex::fit(&catalog(), 1000).unwrap();
        let second = ContentIndex::fit(&catalog(), 1000).unwrap();
        assert_eq!(first.vectors(), second.vectors());
        assert_eq!(first.business_ids(), second.business_ids());
    }
}
