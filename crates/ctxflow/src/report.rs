//! Rendering of a run's diagnostics.

use ctxflow_diag::{Diagnostic, SourceLocation, SourceMap};
use serde::Serialize;

use crate::driver::DriverError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// `path:line:col` of a location, or `path` alone for file-level findings.
fn position(sources: &SourceMap, location: SourceLocation) -> String {
    let name = sources.name(location.file_id).unwrap_or("<unknown>");
    match sources.line_col(location) {
        Some(pos) => format!("{name}:{}:{}", pos.line, pos.col),
        None => name.to_string(),
    }
}

/// One line per diagnostic, `path:line:col: message (checker)`, with labels
/// and help indented below.
pub fn render_text(diagnostics: &[Diagnostic], sources: &SourceMap) -> String {
    let mut out = String::new();
    for diag in diagnostics {
        let at = diag
            .location
            .map_or_else(|| "<unknown>".to_string(), |loc| position(sources, loc));
        out.push_str(&format!("{at}: {} ({})\n", diag.message, diag.category.as_str()));
        for label in &diag.labels {
            out.push_str(&format!(
                "    {}: note: {}\n",
                position(sources, label.location),
                label.message
            ));
        }
        if let Some(help) = &diag.help {
            out.push_str(&format!("    help: {help}\n"));
        }
    }
    out
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    diagnostics: Vec<JsonDiagnostic<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonDiagnostic<'a> {
    code: Option<&'a str>,
    severity: &'static str,
    checker: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    column: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    labels: Vec<JsonLabel<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    help: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct JsonLabel<'a> {
    position: String,
    message: &'a str,
}

/// A pretty-printed JSON document with a `diagnostics` array.
pub fn render_json(diagnostics: &[Diagnostic], sources: &SourceMap) -> Result<String, DriverError> {
    let diagnostics = diagnostics
        .iter()
        .map(|diag| {
            let pos = diag.location.and_then(|loc| sources.line_col(loc));
            JsonDiagnostic {
                code: diag.code.as_deref(),
                severity: diag.severity.as_str(),
                checker: diag.category.as_str(),
                message: &diag.message,
                path: diag.location.and_then(|loc| sources.name(loc.file_id)),
                line: pos.map(|pos| pos.line),
                column: pos.map(|pos| pos.col),
                labels: diag
                    .labels
                    .iter()
                    .map(|label| JsonLabel {
                        position: position(sources, label.location),
                        message: &label.message,
                    })
                    .collect(),
                help: diag.help.as_deref(),
            }
        })
        .collect();
    let mut text = serde_json::to_string_pretty(&JsonReport { diagnostics })?;
    text.push('\n');
    Ok(text)
}
