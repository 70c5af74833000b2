//! Content classification subsystem.
//!
//! # Data Flow
//! ```text
//! response body + declared charset
//!     → tokens.rs (decode, strip markup, Cyrillic word runs)
//!     → Classifier::classify (category → probability)
//!     → policy::gate (threshold decision)
//! ```
//!
//! # Design Decisions
//! - The classifier sits behind a trait; the adapter owns only extraction
//! - Empty token streams never reach the classifier
//! - Results are computed per page and never cached

pub mod bayes;
pub mod tokens;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::error::ProxyError;

pub use bayes::{NaiveBayes, ReloadableClassifier};

/// Category name → probability in [0, 1]. Values are independent scores.
pub type ClassificationResult = BTreeMap<String, f64>;

/// Errors raised by a classifier or while loading its model.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to read model: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid model: {0}")]
    Model(#[from] serde_json::Error),

    #[error("model has no categories")]
    EmptyModel,
}

/// A statistical text classifier.
pub trait Classifier: Send + Sync {
    fn classify(&self, tokens: &[String]) -> Result<ClassificationResult, ClassifierError>;
}

/// Classifier used when no model is configured. Never reports a category.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledClassifier;

impl Classifier for DisabledClassifier {
    fn classify(&self, _tokens: &[String]) -> Result<ClassificationResult, ClassifierError> {
        Ok(ClassificationResult::new())
    }
}

/// Bridges raw page bytes to a [`Classifier`].
#[derive(Clone)]
pub struct ClassifierAdapter {
    classifier: Arc<dyn Classifier>,
}

impl ClassifierAdapter {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    /// Decode `html` with `encoding`, strip markup and return Cyrillic words.
    pub fn extract_tokens(html: &[u8], encoding: &str) -> Vec<String> {
        let text = tokens::decode_body(html, encoding);
        tokens::cyrillic_words(&tokens::strip_markup(&text))
    }

    /// Classify a token stream. An empty stream yields an empty result.
    pub fn classify(&self, tokens: &[String]) -> Result<ClassificationResult, ProxyError> {
        if tokens.is_empty() {
            return Ok(ClassificationResult::new());
        }
        self.classifier
            .classify(tokens)
            .map_err(|e| ProxyError::ClassificationFailure(e.to_string()))
    }

    /// Extract and classify in one step.
    pub fn classify_page(&self, html: &[u8], encoding: &str) -> Result<ClassificationResult, ProxyError> {
        let tokens = Self::extract_tokens(html, encoding);
        tracing::debug!(tokens = tokens.len(), encoding, "Extracted page tokens");
        self.classify(&tokens)
    }
}
