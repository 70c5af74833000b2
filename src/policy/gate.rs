//! Forward-or-rewrite decision.
//!
//! The gate is consulted twice per cycle: once with the target host before
//! any upstream connection exists, and once with the upstream response.
//! It performs no I/O.

use std::sync::Arc;

use crate::classifier::{ClassificationResult, ClassifierAdapter};
use crate::config::PolicyConfig;
use crate::http::HttpMessage;
use crate::policy::blacklist::SharedBlacklist;

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyVerdict {
    Allow,
    BlockHost,
    /// Carries every category that was scored, not only the one that tripped.
    BlockContent { categories: ClassificationResult },
}

impl PolicyVerdict {
    pub fn label(&self) -> &'static str {
        match self {
            PolicyVerdict::Allow => "allow",
            PolicyVerdict::BlockHost => "block_host",
            PolicyVerdict::BlockContent { .. } => "block_content",
        }
    }
}

/// Blacklist and content policy shared by all workers.
#[derive(Clone)]
pub struct PolicyGate {
    blacklist: Arc<SharedBlacklist>,
    adapter: ClassifierAdapter,
    block_threshold: f64,
    classifiable_mime_types: Arc<[String]>,
}

impl PolicyGate {
    pub fn new(blacklist: Arc<SharedBlacklist>, adapter: ClassifierAdapter, config: &PolicyConfig) -> Self {
        Self {
            blacklist,
            adapter,
            block_threshold: config.block_threshold,
            classifiable_mime_types: config
                .classifiable_mime_types
                .iter()
                .map(|m| m.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn blacklist(&self) -> &Arc<SharedBlacklist> {
        &self.blacklist
    }

    /// Host check, run before connecting upstream.
    pub fn check_host(&self, host: &str, port: u16) -> PolicyVerdict {
        if self.blacklist.snapshot().contains(host, port) {
            PolicyVerdict::BlockHost
        } else {
            PolicyVerdict::Allow
        }
    }

    /// True if the response's media type is one the gate classifies.
    pub fn is_classifiable(&self, response: &HttpMessage) -> bool {
        match response.mime_type() {
            Some(mime) => self.classifiable_mime_types.iter().any(|m| *m == mime),
            None => false,
        }
    }

    /// Threshold decision over a finished classification.
    pub fn verdict_for(&self, categories: ClassificationResult) -> PolicyVerdict {
        let tripped = categories.values().any(|p| *p >= self.block_threshold);
        if tripped {
            PolicyVerdict::BlockContent { categories }
        } else {
            PolicyVerdict::Allow
        }
    }

    /// Content check over an upstream response.
    ///
    /// A chunked body is classified by its joined payload. Classifier failures
    /// and undecodable chunking allow the response through.
    pub fn check_content(&self, response: &HttpMessage) -> PolicyVerdict {
        if !self.is_classifiable(response) {
            return PolicyVerdict::Allow;
        }
        let payload = match response.payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable chunked body, allowing response");
                return PolicyVerdict::Allow;
            }
        };
        match self.adapter.classify_page(&payload, &response.body_encoding()) {
            Ok(categories) => self.verdict_for(categories),
            Err(e) => {
                tracing::warn!(error = %e, "Classification failed, allowing response");
                PolicyVerdict::Allow
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classifier, ClassifierError, DisabledClassifier};
    use crate::policy::Blacklist;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed result and counts how often it was asked.
    struct Fixed {
        result: ClassificationResult,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(pairs: &[(&str, f64)]) -> Arc<Self> {
            Arc::new(Self {
                result: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Classifier for Fixed {
        fn classify(&self, _tokens: &[String]) -> Result<ClassificationResult, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    struct Failing;

    impl Classifier for Failing {
        fn classify(&self, _tokens: &[String]) -> Result<ClassificationResult, ClassifierError> {
            Err(ClassifierError::EmptyModel)
        }
    }

    fn gate_with(classifier: Arc<dyn Classifier>, blocked: &[&str]) -> PolicyGate {
        let blacklist = Arc::new(SharedBlacklist::new(Blacklist::from_entries(blocked.iter().copied())));
        PolicyGate::new(blacklist, ClassifierAdapter::new(classifier), &PolicyConfig::default())
    }

    fn html(body: &str, content_type: &str) -> HttpMessage {
        let mut response = HttpMessage::response("HTTP/1.1", 200, "OK");
        response.headers.append("Content-Type", content_type);
        response.body = bytes::Bytes::from(body.to_string());
        response
    }

    fn categories(pairs: &[(&str, f64)]) -> ClassificationResult {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn blacklisted_host_is_blocked() {
        let gate = gate_with(Arc::new(DisabledClassifier), &["blocked.example"]);
        assert_eq!(gate.check_host("blocked.example", 80), PolicyVerdict::BlockHost);
        assert_eq!(gate.check_host("cdn.blocked.example", 443), PolicyVerdict::BlockHost);
        assert_eq!(gate.check_host("allowed.example", 80), PolicyVerdict::Allow);
    }

    #[test]
    fn host_check_sees_reloaded_blacklist() {
        let gate = gate_with(Arc::new(DisabledClassifier), &[]);
        assert_eq!(gate.check_host("late.example", 80), PolicyVerdict::Allow);

        gate.blacklist().replace(Blacklist::from_entries(["late.example"]));
        assert_eq!(gate.check_host("late.example", 80), PolicyVerdict::BlockHost);
    }

    #[test]
    fn below_threshold_allows() {
        let gate = gate_with(Arc::new(DisabledClassifier), &[]);
        assert_eq!(gate.verdict_for(categories(&[("adult", 0.79), ("news", 0.5)])), PolicyVerdict::Allow);
        assert_eq!(gate.verdict_for(ClassificationResult::new()), PolicyVerdict::Allow);
    }

    #[test]
    fn reaching_threshold_blocks_with_full_map() {
        let gate = gate_with(Arc::new(DisabledClassifier), &[]);
        let scored = categories(&[("adult", 0.8), ("news", 0.1), ("games", 0.05)]);

        match gate.verdict_for(scored.clone()) {
            PolicyVerdict::BlockContent { categories } => assert_eq!(categories, scored),
            other => panic!("expected BlockContent, got {:?}", other),
        }
    }

    #[test]
    fn non_html_is_never_classified() {
        let classifier = Fixed::new(&[("adult", 0.99)]);
        let gate = gate_with(classifier.clone(), &[]);

        let verdict = gate.check_content(&html("Привет", "application/json"));
        assert_eq!(verdict, PolicyVerdict::Allow);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);

        let mut untyped = html("Привет", "text/html");
        untyped.headers.remove("content-type");
        assert_eq!(gate.check_content(&untyped), PolicyVerdict::Allow);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn html_is_classified() {
        let classifier = Fixed::new(&[("adult", 0.92), ("news", 0.2)]);
        let gate = gate_with(classifier.clone(), &[]);

        let verdict = gate.check_content(&html("<p>Взрослый контент</p>", "Text/HTML; charset=UTF-8"));
        assert_eq!(verdict.label(), "block_content");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn page_without_cyrillic_text_is_allowed() {
        let classifier = Fixed::new(&[("adult", 0.99)]);
        let gate = gate_with(classifier.clone(), &[]);

        assert_eq!(gate.check_content(&html("<p>english only</p>", "text/html")), PolicyVerdict::Allow);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    /// Sees only the tokens it was given.
    struct Recording {
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl Classifier for Recording {
        fn classify(&self, tokens: &[String]) -> Result<ClassificationResult, ClassifierError> {
            self.seen.lock().unwrap().extend(tokens.iter().cloned());
            Ok(categories(&[("adult", 0.9)]))
        }
    }

    #[test]
    fn chunked_page_is_classified_by_payload() {
        let recording = Arc::new(Recording {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let gate = gate_with(recording.clone(), &[]);

        let text = "<p>Взрослый</p>".as_bytes();
        let split = text.len() / 2 + 1;
        let mut body = format!("{:x}\r\n", split).into_bytes();
        body.extend_from_slice(&text[..split]);
        body.extend_from_slice(format!("\r\n{:x}\r\n", text.len() - split).as_bytes());
        body.extend_from_slice(&text[split..]);
        body.extend_from_slice(b"\r\n0\r\n\r\n");

        let mut response = html("", "text/html; charset=utf-8");
        response.headers.append("Transfer-Encoding", "chunked");
        response.body = bytes::Bytes::from(body);

        assert_eq!(gate.check_content(&response).label(), "block_content");
        assert_eq!(recording.seen.lock().unwrap().as_slice(), ["Взрослый"]);
    }

    #[test]
    fn broken_chunking_fails_open() {
        let classifier = Fixed::new(&[("adult", 0.99)]);
        let gate = gate_with(classifier.clone(), &[]);

        let mut response = html("7\r\nПривет", "text/html");
        response.headers.append("Transfer-Encoding", "chunked");
        assert_eq!(gate.check_content(&response), PolicyVerdict::Allow);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn classifier_failure_fails_open() {
        let gate = gate_with(Arc::new(Failing), &[]);
        assert_eq!(gate.check_content(&html("<p>Текст</p>", "text/html")), PolicyVerdict::Allow);
    }
}
