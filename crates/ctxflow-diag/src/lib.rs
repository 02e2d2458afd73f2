//! Error reporting and diagnostics for ctxflow.
//!
//! Diagnostics are produced by the parser (syntax errors) and by the
//! propagation checkers, and rendered by the driver. Every checker has its own
//! [`Category`]; the category doubles as the checker identity used by
//! suppression directives and configuration.

use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// Broad category for diagnostics. Checker categories identify the checker
/// that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// `go` statement closure does not use the carrier.
    Goroutine,
    /// `go` statement closure does not call a configured derivation function.
    GoroutineDerive,
    /// `errgroup.Group` callback does not use the carrier.
    Errgroup,
    /// `sync.WaitGroup.Go` callback does not use the carrier.
    Waitgroup,
    /// `conc` pool, stream or iterator callback does not use the carrier.
    Conc,
    /// Callback handed to a declared spawner does not use the carrier.
    Spawner,
    /// `gotask` task does not derive the carrier.
    Gotask,
    /// A suppression directive that never suppressed anything.
    UnusedDirective,
    /// Source text does not parse.
    Syntax,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Goroutine,
        Category::GoroutineDerive,
        Category::Errgroup,
        Category::Waitgroup,
        Category::Conc,
        Category::Spawner,
        Category::Gotask,
        Category::UnusedDirective,
        Category::Syntax,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    /// Categories that correspond to a propagation checker.
    pub fn checkers() -> impl Iterator<Item = Category> {
        Self::ALL.into_iter().filter(|cat| cat.is_checker())
    }

    pub fn is_checker(self) -> bool {
        !matches!(self, Category::UnusedDirective | Category::Syntax)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Goroutine => "goroutine",
            Category::GoroutineDerive => "goroutine_derive",
            Category::Errgroup => "errgroup",
            Category::Waitgroup => "waitgroup",
            Category::Conc => "conc",
            Category::Spawner => "spawner",
            Category::Gotask => "gotask",
            Category::UnusedDirective => "unused_directive",
            Category::Syntax => "syntax",
        }
    }

    /// Look up a category by its [`Category::as_str`] name. Dashes are
    /// accepted in place of underscores.
    pub fn parse(name: &str) -> Option<Category> {
        let normalized = name.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|cat| cat.as_str() == normalized)
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::Goroutine => "C0001",
            Category::GoroutineDerive => "C0002",
            Category::Errgroup => "C0003",
            Category::Waitgroup => "C0004",
            Category::Conc => "C0005",
            Category::Spawner => "C0006",
            Category::Gotask => "C0007",
            Category::UnusedDirective => "C0100",
            Category::Syntax => "C0900",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::Goroutine => "A goroutine spawned from a function with a carrier does not use it.",
            Category::GoroutineDerive => {
                "A goroutine does not call a required derivation function before doing work."
            }
            Category::Errgroup => "An errgroup callback does not use the carrier.",
            Category::Waitgroup => "A WaitGroup.Go callback does not use the carrier.",
            Category::Conc => "A conc pool, stream or iterator callback does not use the carrier.",
            Category::Spawner => "A callback handed to a spawner function does not use the carrier.",
            Category::Gotask => "A gotask task does not derive the carrier.",
            Category::UnusedDirective => "A suppression directive did not suppress anything.",
            Category::Syntax => "Source text does not parse.",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source locations
// ---------------------------------------------------------------------------

/// A source location for diagnostics, in byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLocation {
    pub file_id: u32,
    pub start: u32,
    pub end: u32,
}

/// One-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

/// Maps byte offsets to line/column positions for one source text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (idx, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(idx as u32 + 1);
            }
        }
        Self { line_starts }
    }

    pub fn line_col(&self, offset: u32) -> LineCol {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        LineCol {
            line: line as u32 + 1,
            col: offset - self.line_starts[line] + 1,
        }
    }

    pub fn line(&self, offset: u32) -> u32 {
        self.line_col(offset).line
    }
}

/// One source file of a session.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    /// Display name, usually the path relative to the analysis root.
    pub name: String,
    pub text: String,
    pub lines: LineIndex,
}

/// Every source file of a session, keyed by file id.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: BTreeMap<u32, SourceEntry>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, file_id: u32, name: impl Into<String>, text: impl Into<String>) {
        let text = text.into();
        let lines = LineIndex::new(&text);
        self.files.insert(
            file_id,
            SourceEntry {
                name: name.into(),
                text,
                lines,
            },
        );
    }

    pub fn get(&self, file_id: u32) -> Option<&SourceEntry> {
        self.files.get(&file_id)
    }

    pub fn name(&self, file_id: u32) -> Option<&str> {
        self.get(file_id).map(|entry| entry.name.as_str())
    }

    pub fn line_col(&self, location: SourceLocation) -> Option<LineCol> {
        self.get(location.file_id)
            .map(|entry| entry.lines.line_col(location.start))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &SourceEntry)> {
        self.files.iter().map(|(id, entry)| (*id, entry))
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. C0001).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Where it went wrong.
    pub location: Option<SourceLocation>,
    /// Additional labeled spans.
    pub labels: Vec<DiagLabel>,
    /// Suggested fix, if any.
    pub help: Option<String>,
}

/// A labeled source span within a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagLabel {
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, message)
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, message)
    }

    fn new(severity: Severity, category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity,
            category,
            message: message.into(),
            location: None,
            labels: Vec::new(),
            help: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_label(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            location,
            message: message.into(),
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Ordering key used to make output deterministic.
    pub fn sort_key(&self) -> (Option<SourceLocation>, Category, &str) {
        (self.location, self.category, &self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.severity.as_str();
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn multiple(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_builder() {
        let loc = SourceLocation {
            file_id: 0,
            start: 10,
            end: 20,
        };
        let diag = Diagnostic::error(Category::Errgroup, "closure should use context \"ctx\"")
            .at(loc)
            .with_help("reference `ctx` inside the closure");

        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.code.as_deref(), Some("C0003"));
        assert_eq!(diag.category, Category::Errgroup);
        assert!(diag.message.contains("should use context"));
        assert!(diag.help.unwrap().contains("`ctx`"));
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::warning(Category::UnusedDirective, "unused directive");
        let s = format!("{diag}");
        assert_eq!(s, "warning[C0100]: unused directive");
    }

    #[test]
    fn category_metadata_is_stable_and_unique() {
        let mut codes = std::collections::BTreeSet::new();
        for cat in Category::all() {
            assert!(!cat.as_str().is_empty());
            assert!(!cat.description().is_empty());
            assert_eq!(Category::parse(cat.as_str()), Some(*cat));
            assert!(
                codes.insert(cat.code()),
                "duplicate diagnostic code detected: {}",
                cat.code()
            );
        }
    }

    #[test]
    fn category_parse_accepts_dashes() {
        assert_eq!(
            Category::parse("goroutine-derive"),
            Some(Category::GoroutineDerive)
        );
        assert_eq!(Category::parse("nope"), None);
    }

    #[test]
    fn source_map_resolves_locations() {
        let mut sources = SourceMap::new();
        sources.add(3, "app/run.go", "package app\n\nfunc run() {}\n");
        let loc = SourceLocation {
            file_id: 3,
            start: 13,
            end: 16,
        };
        assert_eq!(sources.name(3), Some("app/run.go"));
        assert_eq!(sources.line_col(loc), Some(LineCol { line: 3, col: 1 }));
        assert_eq!(sources.line_col(SourceLocation { file_id: 9, ..loc }), None);
    }

    #[test]
    fn line_index_maps_offsets() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.line_col(0), LineCol { line: 1, col: 1 });
        assert_eq!(index.line_col(1), LineCol { line: 1, col: 2 });
        assert_eq!(index.line_col(3), LineCol { line: 2, col: 1 });
        assert_eq!(index.line_col(6), LineCol { line: 3, col: 1 });
        assert_eq!(index.line_col(8), LineCol { line: 4, col: 2 });
    }
}
