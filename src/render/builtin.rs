//! Templates compiled into the binary.

use std::fmt::Write as _;

use serde_json::Value;

use super::{RenderError, TemplateRenderer, PROBABILITIES_TEMPLATE};

/// Renderer for the pages the proxy ships with.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTemplates;

impl TemplateRenderer for BuiltinTemplates {
    fn render(&self, template: &str, data: &Value) -> Result<Vec<u8>, RenderError> {
        match template {
            PROBABILITIES_TEMPLATE => render_probabilities(data),
            other => Err(RenderError::UnknownTemplate(other.to_string())),
        }
    }
}

/// Expects `{"probabilities": [{"category": str, "probability": number}, ...]}`.
/// Rows are rendered in the order given.
fn render_probabilities(data: &Value) -> Result<Vec<u8>, RenderError> {
    let invalid = |reason: &str| RenderError::InvalidData {
        template: PROBABILITIES_TEMPLATE.to_string(),
        reason: reason.to_string(),
    };

    let rows = data
        .get("probabilities")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing \"probabilities\" array"))?;

    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Page blocked</title>\n</head>\n<body>\n\
         <h1>This page was blocked by content classification</h1>\n\
         <table>\n<tr><th>Category</th><th>Probability</th></tr>\n",
    );
    for row in rows {
        let category = row
            .get("category")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("row without a \"category\" string"))?;
        let probability = row
            .get("probability")
            .and_then(Value::as_f64)
            .ok_or_else(|| invalid("row without a numeric \"probability\""))?;
        // Writing to a String cannot fail.
        let _ = writeln!(
            page,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape_html(category),
            probability
        );
    }
    page.push_str("</table>\n</body>\n</html>\n");

    Ok(page.into_bytes())
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
