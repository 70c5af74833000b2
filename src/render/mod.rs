//! Page rendering for synthetic responses.
//!
//! # Data Flow
//! ```text
//! verdict → http::response (builds data map)
//!     → TemplateRenderer::render(name, data)
//!     → body bytes
//! ```
//!
//! # Design Decisions
//! - Renderers are addressed by template name and receive a JSON data map
//! - A failed render is recoverable; the caller picks a fallback page

pub mod builtin;

pub use builtin::BuiltinTemplates;

use thiserror::Error;

/// Template used for classification reports.
pub const PROBABILITIES_TEMPLATE: &str = "probabilities";

/// Error returned by a renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unknown template {0:?}")]
    UnknownTemplate(String),

    #[error("template {template:?}: {reason}")]
    InvalidData { template: String, reason: String },
}

/// Renders a named template with a data map.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, data: &serde_json::Value) -> Result<Vec<u8>, RenderError>;
}
