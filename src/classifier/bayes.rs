//! Multinomial naive Bayes over a pre-trained token-count model.
//!
//! The model file is JSON produced by an offline trainer:
//!
//! ```json
//! {
//!   "categories": {
//!     "adult": { "documents": 120, "tokens": { "слово": 14, "ещё": 3 } },
//!     "news":  { "documents": 300, "tokens": { "новости": 52 } }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;

use super::{ClassificationResult, Classifier, ClassifierError};

#[derive(Debug, Deserialize)]
struct ModelFile {
    categories: BTreeMap<String, CategoryCounts>,
}

#[derive(Debug, Deserialize)]
struct CategoryCounts {
    #[serde(default)]
    documents: u64,
    #[serde(default)]
    tokens: HashMap<String, u64>,
}

#[derive(Debug)]
struct Category {
    name: String,
    log_prior: f64,
    token_counts: HashMap<String, u64>,
    total_tokens: u64,
}

/// An immutable, ready-to-query model.
#[derive(Debug)]
pub struct NaiveBayes {
    categories: Vec<Category>,
    vocabulary: usize,
}

impl NaiveBayes {
    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let file: ModelFile = serde_json::from_str(json)?;
        Self::from_counts(file)
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn from_counts(file: ModelFile) -> Result<Self, ClassifierError> {
        if file.categories.is_empty() {
            return Err(ClassifierError::EmptyModel);
        }

        let vocabulary: HashSet<&str> = file
            .categories
            .values()
            .flat_map(|c| c.tokens.keys().map(String::as_str))
            .collect();
        let vocabulary = vocabulary.len().max(1);

        let total_documents: u64 = file.categories.values().map(|c| c.documents).sum();
        let category_count = file.categories.len() as f64;

        let categories = file
            .categories
            .into_iter()
            .map(|(name, counts)| {
                // Laplace-smoothed prior so a category with no documents stays finite.
                let prior = (counts.documents as f64 + 1.0) / (total_documents as f64 + category_count);
                Category {
                    name,
                    log_prior: prior.ln(),
                    total_tokens: counts.tokens.values().sum(),
                    token_counts: counts.tokens,
                }
            })
            .collect();

        Ok(Self {
            categories,
            vocabulary,
        })
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    fn posterior(&self, tokens: &[String]) -> ClassificationResult {
        let scores: Vec<f64> = self
            .categories
            .iter()
            .map(|category| {
                let denominator = (category.total_tokens as f64 + self.vocabulary as f64).ln();
                tokens.iter().fold(category.log_prior, |score, token| {
                    let count = category.token_counts.get(token).copied().unwrap_or(0);
                    score + (count as f64 + 1.0).ln() - denominator
                })
            })
            .collect();

        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let normalizer: f64 = scores.iter().map(|s| (s - max).exp()).sum();

        self.categories
            .iter()
            .zip(scores)
            .map(|(category, score)| (category.name.clone(), (score - max).exp() / normalizer))
            .collect()
    }
}

impl Classifier for NaiveBayes {
    fn classify(&self, tokens: &[String]) -> Result<ClassificationResult, ClassifierError> {
        Ok(self.posterior(tokens))
    }
}

/// A model that can be replaced while requests are being classified.
///
/// Each call works on one snapshot; a reload publishes a new model without
/// touching the one in use.
pub struct ReloadableClassifier {
    model: ArcSwap<NaiveBayes>,
}

impl ReloadableClassifier {
    pub fn new(model: NaiveBayes) -> Self {
        Self {
            model: ArcSwap::from_pointee(model),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        Ok(Self::new(NaiveBayes::load(path)?))
    }

    /// Load `path` and swap it in. The current model stays on failure.
    pub fn reload(&self, path: &Path) -> Result<(), ClassifierError> {
        let model = NaiveBayes::load(path)?;
        let categories = model.categories.len();
        self.model.store(Arc::new(model));
        tracing::info!(path = ?path, categories, "Classifier model reloaded");
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<NaiveBayes> {
        self.model.load_full()
    }
}

impl Classifier for ReloadableClassifier {
    fn classify(&self, tokens: &[String]) -> Result<ClassificationResult, ClassifierError> {
        self.model.load().classify(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"{
        "categories": {
            "adult": { "documents": 10, "tokens": { "эротика": 40, "новости": 1 } },
            "news":  { "documents": 10, "tokens": { "новости": 40, "политика": 20 } }
        }
    }"#;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn favours_category_with_matching_tokens() {
        let model = NaiveBayes::from_json(MODEL).unwrap();

        let result = model.classify(&words(&["эротика", "эротика", "эротика"])).unwrap();
        assert!(result["adult"] > 0.9, "{:?}", result);
        assert!(result["news"] < 0.1, "{:?}", result);

        let result = model.classify(&words(&["новости", "политика"])).unwrap();
        assert!(result["news"] > result["adult"]);
    }

    #[test]
    fn probabilities_are_bounded_and_deterministic() {
        let model = NaiveBayes::from_json(MODEL).unwrap();
        let tokens = words(&["новости", "неизвестно", "эротика"]);

        let first = model.classify(&tokens).unwrap();
        let second = model.classify(&tokens).unwrap();
        assert_eq!(first, second);
        for p in first.values() {
            assert!((0.0..=1.0).contains(p));
        }
        let names: Vec<_> = first.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["adult", "news"]);
    }

    #[test]
    fn empty_model_is_rejected() {
        assert!(matches!(
            NaiveBayes::from_json(r#"{"categories": {}}"#),
            Err(ClassifierError::EmptyModel)
        ));
        assert!(matches!(NaiveBayes::from_json("not json"), Err(ClassifierError::Model(_))));
    }

    #[test]
    fn reload_swaps_model_and_keeps_old_on_failure() {
        let dir = std::env::temp_dir().join(format!("filter-proxy-bayes-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.json");
        std::fs::write(&path, MODEL).unwrap();

        let classifier = ReloadableClassifier::load(&path).unwrap();
        assert_eq!(classifier.snapshot().category_names().count(), 2);

        std::fs::write(&path, r#"{"categories": {"only": {"documents": 1, "tokens": {}}}}"#).unwrap();
        classifier.reload(&path).unwrap();
        let names: Vec<String> = classifier.snapshot().category_names().map(String::from).collect();
        assert_eq!(names, vec!["only"]);

        std::fs::write(&path, "{ broken").unwrap();
        assert!(classifier.reload(&path).is_err());
        assert_eq!(classifier.snapshot().category_names().count(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
