//! The suppression ledger.

use ctxflow_ast::{FileId, Span};
use ctxflow_diag::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveState {
    Unused,
    Used,
}

/// One `//ctxflow:ignore` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreEntry {
    pub file: FileId,
    /// One-based line of the comment.
    pub line: u32,
    /// `None` covers every checker.
    pub checkers: Option<Vec<Category>>,
    pub span: Span,
    pub state: DirectiveState,
}

impl IgnoreEntry {
    fn covers(&self, file: FileId, line: u32, checker: Category) -> bool {
        self.file == file
            && (self.line == line || self.line + 1 == line)
            && self
                .checkers
                .as_ref()
                .is_none_or(|checkers| checkers.contains(&checker))
    }
}

/// Every ignore directive of a run and whether it suppressed anything.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<IgnoreEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, file: FileId, line: u32, checkers: Option<Vec<Category>>, span: Span) {
        self.entries.push(IgnoreEntry {
            file,
            line,
            checkers,
            span,
            state: DirectiveState::Unused,
        });
    }

    /// Whether a finding of `checker` on `line` is silenced. Every directive
    /// that covers it is marked used.
    pub fn should_suppress(&mut self, file: FileId, line: u32, checker: Category) -> bool {
        let mut suppressed = false;
        for entry in &mut self.entries {
            if entry.covers(file, line, checker) {
                entry.state = DirectiveState::Used;
                suppressed = true;
            }
        }
        suppressed
    }

    pub fn entries(&self) -> &[IgnoreEntry] {
        &self.entries
    }

    /// Directives that never suppressed anything.
    pub fn unused(&self) -> impl Iterator<Item = &IgnoreEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.state == DirectiveState::Unused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::new(FileId(0), 0, 10)
    }

    #[test]
    fn covers_own_and_next_line() {
        let mut ledger = Ledger::new();
        ledger.add(FileId(0), 4, None, span());
        assert!(!ledger.should_suppress(FileId(0), 3, Category::Goroutine));
        assert!(!ledger.should_suppress(FileId(1), 4, Category::Goroutine));
        assert_eq!(ledger.unused().count(), 1);
        assert!(ledger.should_suppress(FileId(0), 5, Category::Errgroup));
        assert!(ledger.should_suppress(FileId(0), 4, Category::Goroutine));
        assert_eq!(ledger.unused().count(), 0);
    }

    #[test]
    fn checker_lists_restrict_suppression() {
        let mut ledger = Ledger::new();
        ledger.add(FileId(0), 1, Some(vec![Category::Conc]), span());
        assert!(!ledger.should_suppress(FileId(0), 2, Category::Goroutine));
        assert_eq!(ledger.unused().count(), 1);
        assert!(ledger.should_suppress(FileId(0), 2, Category::Conc));
        assert_eq!(ledger.entries()[0].state, DirectiveState::Used);
    }
}
