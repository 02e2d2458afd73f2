//! The derivation constraint.
//!
//! A [`DeriverMatcher`] is an OR of AND groups of functions, written
//! `a.F+b.G,c.H`: a callback satisfies it by calling both `a.F` and `b.G`, or
//! by calling `c.H`. Calls are collected from the callback body, including
//! immediately invoked literals but not other nested literals, and calls made
//! under `defer` are tracked separately so that a derivation that only happens
//! during cleanup can be reported with lower severity.

use std::fmt;

use ctxflow_ast::visit::{self, Visitor};
use ctxflow_ast::{Block, Expr, FuncLit, Stmt, StmtKind};
use ctxflow_sema::TypeInfo;
use ctxflow_types::{FuncRef, package_name, same_package};

use crate::config::ConfigError;

/// Split `pkg/path.A` or `pkg/path.A.B` into the package path followed by the
/// dotted names. Dots before the last `/` belong to the path.
pub(crate) fn split_qualified(text: &str) -> Option<Vec<&str>> {
    let last_start = text.rfind('/').map_or(0, |idx| idx + 1);
    let dot = last_start + text[last_start..].find('.')?;
    let mut parts = vec![&text[..dot]];
    parts.extend(text[dot + 1..].split('.'));
    let valid = parts[0].split('/').all(|seg| !seg.is_empty())
        && parts[1..].iter().all(|part| is_ident(part));
    valid.then_some(parts)
}

fn is_ident(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

// ---------------------------------------------------------------------------
// FuncSpec
// ---------------------------------------------------------------------------

/// A function or method named by package path, optional receiver type and
/// name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncSpec {
    pub path: String,
    pub receiver: Option<String>,
    pub name: String,
}

impl FuncSpec {
    /// Parse `pkg/path.Func`, `pkg/path.Type.Method` or
    /// `(*pkg/path.Type).Method`.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let text = text.trim();
        let invalid = |reason| ConfigError::InvalidFuncSpec {
            spec: text.to_string(),
            reason,
        };
        if let Some(rest) = text.strip_prefix('(') {
            let (recv, name) = rest
                .split_once(").")
                .ok_or_else(|| invalid("expected `(pkg/path.Type).Method`"))?;
            let recv = recv.trim_start_matches('*');
            return match split_qualified(recv).as_deref() {
                Some([path, ty]) if is_ident(name) => Ok(Self {
                    path: path.to_string(),
                    receiver: Some(ty.to_string()),
                    name: name.to_string(),
                }),
                _ => Err(invalid("expected `(pkg/path.Type).Method`")),
            };
        }
        match split_qualified(text).as_deref() {
            Some([path, name]) => Ok(Self {
                path: path.to_string(),
                receiver: None,
                name: name.to_string(),
            }),
            Some([path, ty, name]) => Ok(Self {
                path: path.to_string(),
                receiver: Some(ty.to_string()),
                name: name.to_string(),
            }),
            _ => Err(invalid("expected `pkg/path.Func` or `pkg/path.Type.Method`")),
        }
    }

    /// Whether `func` is the function this spec names. Receivers compare by
    /// origin type name, so pointer and value receivers both match.
    pub fn matches(&self, func: &FuncRef) -> bool {
        func.name == self.name
            && func.recv == self.receiver
            && same_package(&func.path, &self.path)
    }

    /// `pkg.Func` or `pkg.Type.Method`, for messages.
    pub fn short(&self) -> String {
        match &self.receiver {
            Some(recv) => format!("{}.{recv}.{}", package_name(&self.path), self.name),
            None => format!("{}.{}", package_name(&self.path), self.name),
        }
    }
}

impl fmt::Display for FuncSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.receiver {
            Some(recv) => write!(f, "{}.{recv}.{}", self.path, self.name),
            None => write!(f, "{}.{}", self.path, self.name),
        }
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// Outcome of a derivation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceResult {
    pub satisfied: bool,
    /// Not satisfied, but would be if calls under `defer` counted.
    pub only_in_deferred: bool,
}

impl TraceResult {
    pub const SATISFIED: TraceResult = TraceResult {
        satisfied: true,
        only_in_deferred: false,
    };
}

/// A function called from a callback body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedCall {
    pub func: FuncRef,
    pub deferred: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeriverMatcher {
    groups: Vec<Vec<FuncSpec>>,
}

impl DeriverMatcher {
    pub fn new(groups: Vec<Vec<FuncSpec>>) -> Self {
        Self { groups }
    }

    /// Parse the `,`-separated alternatives of `+`-joined function specs. An
    /// empty string yields the empty matcher.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut groups = Vec::new();
        for group in text.split(',') {
            let mut members = Vec::new();
            for member in group.split('+') {
                if member.trim().is_empty() {
                    return Err(ConfigError::InvalidDeriver {
                        spec: text.to_string(),
                        reason: "empty function in group",
                    });
                }
                members.push(FuncSpec::parse(member)?);
            }
            groups.push(members);
        }
        Ok(Self { groups })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[Vec<FuncSpec>] {
        &self.groups
    }

    /// Whether `func` is a member of any group.
    pub fn mentions(&self, func: &FuncRef) -> bool {
        self.groups.iter().flatten().any(|spec| spec.matches(func))
    }

    /// Human readable form: `a.F+b.G or c.H`.
    pub fn describe(&self) -> String {
        self.groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(FuncSpec::short)
                    .collect::<Vec<_>>()
                    .join("+")
            })
            .collect::<Vec<_>>()
            .join(" or ")
    }

    fn group_matches(group: &[FuncSpec], calls: &[ObservedCall], with_deferred: bool) -> bool {
        group.iter().all(|spec| {
            calls
                .iter()
                .any(|call| (with_deferred || !call.deferred) && spec.matches(&call.func))
        })
    }

    /// Evaluate the constraint over a set of observed calls.
    pub fn evaluate(&self, calls: &[ObservedCall]) -> TraceResult {
        if self.is_empty() {
            return TraceResult::SATISFIED;
        }
        if self
            .groups
            .iter()
            .any(|group| Self::group_matches(group, calls, false))
        {
            return TraceResult::SATISFIED;
        }
        TraceResult {
            satisfied: false,
            only_in_deferred: self
                .groups
                .iter()
                .any(|group| Self::group_matches(group, calls, true)),
        }
    }
}

/// Check whether a callback body satisfies `matcher`.
pub fn check_derivation(body: &Block, info: &TypeInfo, matcher: &DeriverMatcher) -> TraceResult {
    if matcher.is_empty() {
        return TraceResult::SATISFIED;
    }
    matcher.evaluate(&collect_calls(body, info))
}

/// Calls reachable from `body` without entering nested literals other than
/// immediately invoked ones.
pub fn collect_calls(body: &Block, info: &TypeInfo) -> Vec<ObservedCall> {
    let mut collector = CallCollector {
        info,
        deferred: false,
        calls: Vec::new(),
    };
    visit::walk_block(&mut collector, body);
    collector.calls
}

struct CallCollector<'i> {
    info: &'i TypeInfo,
    deferred: bool,
    calls: Vec<ObservedCall>,
}

impl<'a> Visitor<'a> for CallCollector<'_> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Defer(expr) => {
                let outer = self.deferred;
                self.deferred = true;
                self.visit_expr(expr);
                self.deferred = outer;
            }
            // Goroutines started here are checked on their own.
            StmtKind::Go(expr) => {
                if let Some(call) = expr.as_call() {
                    for arg in call.args {
                        self.visit_expr(arg);
                    }
                }
            }
            _ => visit::walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        if let Some(call) = expr.as_call() {
            if let Some(callee) = self.info.callee(call.expr) {
                self.calls.push(ObservedCall {
                    func: callee.func.clone(),
                    deferred: self.deferred,
                });
            }
            if let Some(lit) = call.func.as_func_lit() {
                visit::walk_block(self, &lit.body);
                for arg in call.args {
                    self.visit_expr(arg);
                }
                return;
            }
        }
        visit::walk_expr(self, expr);
    }

    fn visit_func_lit(&mut self, _expr: &'a Expr, _lit: &'a FuncLit) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn call(spec: &str, deferred: bool) -> ObservedCall {
        let spec = FuncSpec::parse(spec).expect("spec");
        ObservedCall {
            func: FuncRef {
                path: spec.path,
                recv: spec.receiver,
                name: spec.name,
            },
            deferred,
        }
    }

    #[test]
    fn func_spec_forms() {
        let plain = FuncSpec::parse("github.com/acme/apm.NewGoroutineContext").expect("plain");
        assert_eq!(plain.path, "github.com/acme/apm");
        assert_eq!(plain.receiver, None);
        let method = FuncSpec::parse("github.com/acme/apm.Tracer.Start").expect("method");
        assert_eq!(method.receiver.as_deref(), Some("Tracer"));
        let pointer = FuncSpec::parse("(*github.com/acme/apm.Tracer).Start").expect("pointer");
        assert_eq!(pointer, method);
        assert_eq!(method.short(), "apm.Tracer.Start");
        assert!(FuncSpec::parse("nodots").is_err());
        assert!(FuncSpec::parse("a/b.1x").is_err());
        assert!(FuncSpec::parse("(a/b.T.Start").is_err());
    }

    #[test]
    fn version_suffix_is_ignored_when_matching() {
        let spec = FuncSpec::parse("github.com/acme/apm.Derive").expect("spec");
        assert!(spec.matches(&FuncRef::func("github.com/acme/apm/v2", "Derive")));
        assert!(!spec.matches(&FuncRef::method("github.com/acme/apm", "T", "Derive")));
    }

    #[test]
    fn or_of_and_groups() {
        let matcher = DeriverMatcher::parse("a.A+b.B,c.C").expect("matcher");
        assert_eq!(matcher.describe(), "a.A+b.B or c.C");
        assert!(matcher.evaluate(&[call("c.C", false)]).satisfied);
        assert!(!matcher.evaluate(&[call("a.A", false)]).satisfied);
        assert!(
            matcher
                .evaluate(&[call("a.A", false), call("b.B", false)])
                .satisfied
        );
    }

    #[test]
    fn deferred_only_derivation_is_downgraded() {
        let matcher = DeriverMatcher::parse("a.A").expect("matcher");
        assert_eq!(
            matcher.evaluate(&[call("a.A", true)]),
            TraceResult {
                satisfied: false,
                only_in_deferred: true
            }
        );
        assert_eq!(
            matcher.evaluate(&[]),
            TraceResult {
                satisfied: false,
                only_in_deferred: false
            }
        );
    }

    #[test]
    fn empty_matcher_is_trivially_satisfied() {
        let matcher = DeriverMatcher::parse("  ").expect("empty");
        assert!(matcher.is_empty());
        assert!(matcher.evaluate(&[]).satisfied);
        assert!(DeriverMatcher::parse("a.A,").is_err());
        assert!(DeriverMatcher::parse("a.A++b.B").is_err());
    }

    proptest! {
        /// A group is satisfied exactly when every member was called outside
        /// `defer`; adding calls never turns a satisfied result unsatisfied.
        #[test]
        fn prop_group_algebra(
            groups in prop::collection::vec(prop::collection::vec(0usize..5, 1..4), 1..4),
            called in prop::collection::vec((0usize..5, any::<bool>()), 0..8),
            extra in 0usize..5,
        ) {
            let names = ["p.A", "p.B", "p.C", "p.D", "p.E"];
            let text = groups
                .iter()
                .map(|group| group.iter().map(|idx| names[*idx]).collect::<Vec<_>>().join("+"))
                .collect::<Vec<_>>()
                .join(",");
            let matcher = DeriverMatcher::parse(&text).expect("generated spec");
            let calls: Vec<_> = called.iter().map(|(idx, deferred)| call(names[*idx], *deferred)).collect();

            let expected = groups.iter().any(|group| {
                group.iter().all(|idx| called.iter().any(|(c, deferred)| c == idx && !deferred))
            });
            let result = matcher.evaluate(&calls);
            prop_assert_eq!(result.satisfied, expected);
            prop_assert!(!(result.satisfied && result.only_in_deferred));

            let mut more = calls.clone();
            more.push(call(names[extra], false));
            prop_assert!(!result.satisfied || matcher.evaluate(&more).satisfied);
        }
    }
}
