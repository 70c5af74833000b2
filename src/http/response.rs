//! Synthetic responses.
//!
//! # Responsibilities
//! - Build the "host blocked" page response
//! - Build the classification report response
//! - Build minimal error responses for aborted cycles
//!
//! # Design Decisions
//! - Synthetic pages are sent with status 200 and `Transfer-Encoding: identity`;
//!   the body is delimited by closing the connection
//! - The blocked page asset is loaded once and shared by every response
//! - A report that fails to render degrades to the blocked page

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;

use crate::classifier::ClassificationResult;
use crate::error::ProxyError;
use crate::http::message::HttpMessage;
use crate::render::{TemplateRenderer, PROBABILITIES_TEMPLATE};

/// Default page served for blacklisted hosts.
pub const DEFAULT_BLOCKED_PAGE: &[u8] = include_bytes!("../../assets/blocked.html");

const VERSION: &str = "HTTP/1.1";

/// Builds replacement responses for blocked cycles.
#[derive(Clone)]
pub struct SyntheticResponses {
    blocked_page: Bytes,
    renderer: Arc<dyn TemplateRenderer>,
}

impl SyntheticResponses {
    pub fn new(blocked_page: Bytes, renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            blocked_page,
            renderer,
        }
    }

    /// Load the blocked page from `path`, or use the embedded page.
    pub fn load(path: Option<&Path>, renderer: Arc<dyn TemplateRenderer>) -> std::io::Result<Self> {
        let blocked_page = match path {
            Some(path) => {
                let page = std::fs::read(path)?;
                tracing::info!(path = ?path, bytes = page.len(), "Blocked page loaded");
                Bytes::from(page)
            }
            None => Bytes::from_static(DEFAULT_BLOCKED_PAGE),
        };
        Ok(Self::new(blocked_page, renderer))
    }

    pub fn blocked_page(&self) -> &Bytes {
        &self.blocked_page
    }

    /// Response served instead of contacting a blacklisted host.
    pub fn build_blocked_host_response(&self) -> HttpMessage {
        page_response(self.blocked_page.clone())
    }

    /// Response listing every category, most probable first.
    ///
    /// Falls back to the blocked page if the report cannot be rendered.
    pub fn build_classification_report(&self, categories: &ClassificationResult) -> HttpMessage {
        match self.render_report(categories) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "Serving blocked page instead of classification report");
                self.build_blocked_host_response()
            }
        }
    }

    /// Render the classification report page.
    pub fn render_report(&self, categories: &ClassificationResult) -> Result<HttpMessage, ProxyError> {
        let mut rows: Vec<(&String, &f64)> = categories.iter().collect();
        rows.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let data = json!({
            "probabilities": rows
                .iter()
                .map(|(category, probability)| json!({
                    "category": category,
                    "probability": probability,
                }))
                .collect::<Vec<_>>(),
        });

        let body = self.renderer.render(PROBABILITIES_TEMPLATE, &data)?;
        Ok(page_response(Bytes::from(body)))
    }
}

/// Minimal response written when a cycle aborts before a real response exists.
pub fn error_response(status: u16, reason: &str) -> HttpMessage {
    let mut response = HttpMessage::response(VERSION, status, reason);
    response.headers.append("Content-Length", "0");
    response.headers.append("Connection", "close");
    response
}

/// `200 Connection Established` for an accepted CONNECT tunnel.
pub fn tunnel_established() -> HttpMessage {
    HttpMessage::response(VERSION, 200, "Connection Established")
}

fn page_response(body: Bytes) -> HttpMessage {
    let mut response = HttpMessage::response(VERSION, 200, "OK");
    response.headers.append("Content-Type", "text/html; charset=utf-8");
    response.headers.append("Transfer-Encoding", "identity");
    response.headers.append("Connection", "close");
    response.body = body;
    response
}
