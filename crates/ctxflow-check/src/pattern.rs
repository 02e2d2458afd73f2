//! Propagation patterns.
//!
//! A [`Pattern`] turns tracer and deriver answers for one callback into a
//! [`Verdict`]. Shapes list their patterns as alternatives; see
//! [`Verdict::any_of`].

use std::collections::BTreeSet;

use ctxflow_ast::{CallRef, Expr, ExprKind, NodeId, Span};
use ctxflow_sema::Resolved;

use crate::CheckContext;
use crate::assign::last_assignment;
use crate::config::UntraceablePolicy;
use crate::deriver::check_derivation;
use crate::scope::{CarrierScope, resolve_scope};
use crate::trace::{Capture, Tracer, body_references, expr_references, resolve_callable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// The callback must reference a carrier from the enclosing scope.
    CapturesCarrier,
    /// The callback body must satisfy the derivation constraint.
    Derives,
    /// The operand at `arg` must be the result of a derivation call.
    ArgIsDerivation { arg: usize },
    /// The callback receives a carrier parameter and must use it (or the
    /// enclosing one).
    ReceivesCarrier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail { message: String },
    /// A derivation exists but only runs in deferred code.
    Downgraded { message: String, downgraded: String },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    /// Combine the verdicts of alternative patterns: any pass wins, then a
    /// downgraded failure, then the first failure.
    pub fn any_of(verdicts: impl IntoIterator<Item = Verdict>) -> Verdict {
        let mut worst: Option<Verdict> = None;
        for verdict in verdicts {
            match verdict {
                Verdict::Pass => return Verdict::Pass,
                Verdict::Downgraded { .. } if !matches!(worst, Some(Verdict::Downgraded { .. })) => {
                    worst = Some(verdict);
                }
                Verdict::Fail { .. } if worst.is_none() => worst = Some(verdict),
                _ => {}
            }
        }
        worst.unwrap_or(Verdict::Pass)
    }
}

/// Where a callback is spawned from.
#[derive(Debug, Clone, Copy)]
pub enum SiteKind<'s> {
    /// A `go` statement.
    Go,
    /// A call matching a shape, with the shape's label.
    Shape(&'s str),
}

/// One callback to judge.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a, 's> {
    pub kind: SiteKind<'s>,
    /// The spawning call (the call of a `go` statement).
    pub call: CallRef<'a>,
    /// The callback expression. For `go` statements, the called function.
    pub callback: &'a Expr,
}

impl CallSite<'_, '_> {
    fn subject(&self) -> String {
        match self.kind {
            SiteKind::Go => "goroutine".to_string(),
            SiteKind::Shape(label) => format!("{label} callback"),
        }
    }

    fn label(&self) -> &str {
        match self.kind {
            SiteKind::Go => "go",
            SiteKind::Shape(label) => label,
        }
    }

    fn use_site(&self) -> Span {
        self.call.expr.span
    }
}

/// Shared inputs of every pattern evaluation.
#[derive(Clone, Copy)]
pub struct Judge<'c, 'a> {
    pub cx: &'c CheckContext<'a>,
    pub tracer: &'c Tracer,
    pub policy: UntraceablePolicy,
    pub scope: &'c CarrierScope,
}

impl<'a> Judge<'_, 'a> {
    fn untraceable(&self, message: String) -> Verdict {
        match self.policy {
            UntraceablePolicy::Pass => Verdict::Pass,
            UntraceablePolicy::Fail => Verdict::Fail { message },
        }
    }

    /// Evaluate one pattern against one callback.
    pub fn evaluate(&self, pattern: Pattern, site: &CallSite<'a, '_>) -> Verdict {
        match pattern {
            Pattern::CapturesCarrier => self.captures_carrier(site),
            Pattern::Derives => self.derives(site),
            Pattern::ArgIsDerivation { arg } => self.arg_is_derivation(site, arg),
            Pattern::ReceivesCarrier => self.receives_carrier(site),
        }
    }

    /// Evaluate alternatives and combine them.
    pub fn evaluate_all(&self, patterns: &[Pattern], site: &CallSite<'a, '_>) -> Verdict {
        Verdict::any_of(patterns.iter().map(|pattern| self.evaluate(*pattern, site)))
    }

    fn captures_carrier(&self, site: &CallSite<'a, '_>) -> Verdict {
        let carrier = &self.scope.representative;
        let message = match site.kind {
            SiteKind::Go => format!("goroutine does not propagate context \"{carrier}\""),
            SiteKind::Shape(label) => format!("{label} closure should use context \"{carrier}\""),
        };
        if let SiteKind::Go = site.kind
            && site
                .call
                .args
                .iter()
                .any(|arg| expr_references(self.cx, arg, self.scope))
        {
            return Verdict::Pass;
        }
        match self.tracer.captures(self.cx, site.callback, self.scope) {
            Capture::Captured | Capture::SelfSufficient => Verdict::Pass,
            Capture::Missing => Verdict::Fail { message },
            Capture::Untraceable => self.untraceable(message),
        }
    }

    fn derives(&self, site: &CallSite<'a, '_>) -> Verdict {
        let deriver = self.cx.deriver;
        if deriver.is_empty() {
            return Verdict::Pass;
        }
        let subject = site.subject();
        let message = format!("{subject} should call {} to derive context", deriver.describe());
        let Some(callable) = resolve_callable(self.cx, site.callback, site.use_site()) else {
            return self.untraceable(message);
        };
        let result = check_derivation(callable.body, self.cx.info, deriver);
        if result.satisfied {
            Verdict::Pass
        } else if result.only_in_deferred {
            Verdict::Downgraded {
                downgraded: format!(
                    "{subject} calls {} in defer, but it should be called at goroutine start",
                    deriver.describe()
                ),
                message,
            }
        } else {
            Verdict::Fail { message }
        }
    }

    fn arg_is_derivation(&self, site: &CallSite<'a, '_>, arg: usize) -> Verdict {
        let deriver = self.cx.deriver;
        if deriver.is_empty() {
            return Verdict::Pass;
        }
        let message = format!(
            "{} should be called with a context from {}",
            site.label(),
            deriver.describe()
        );
        let Some(arg) = site.call.args.get(arg) else {
            return self.untraceable(message);
        };
        let mut visited = BTreeSet::new();
        match self.derivation_call(arg, site.use_site(), &mut visited) {
            Some(true) => Verdict::Pass,
            Some(false) => Verdict::Fail { message },
            None => self.untraceable(message),
        }
    }

    /// `Some(true)` when `expr` is a derivation call (directly or through a
    /// local), `Some(false)` when it is provably something else.
    fn derivation_call(&self, expr: &'a Expr, use_site: Span, visited: &mut BTreeSet<NodeId>) -> Option<bool> {
        let expr = expr.unparen();
        if !visited.insert(expr.id) {
            return None;
        }
        match &expr.kind {
            ExprKind::Call { .. } => {
                let callee = self.cx.info.callee(expr)?;
                Some(self.cx.deriver.mentions(&callee.func))
            }
            ExprKind::Ident(_) => match self.cx.info.resolved(expr)? {
                Resolved::Binding(binding) if self.scope.contains(*binding) => Some(false),
                Resolved::Binding(binding) => {
                    let value = last_assignment(self.cx, *binding, use_site)?;
                    self.derivation_call(value, value.span, visited)
                }
                _ => Some(false),
            },
            _ => None,
        }
    }

    fn receives_carrier(&self, site: &CallSite<'a, '_>) -> Verdict {
        let message = format!(
            "{} callback should use its context parameter or context \"{}\"",
            site.label(),
            self.scope.representative
        );
        let Some(callable) = resolve_callable(self.cx, site.callback, site.use_site()) else {
            return self.untraceable(message);
        };
        let mut scope = self.scope.clone();
        if let Some(own) = resolve_scope(callable.sig, self.cx.info, self.cx.carriers) {
            scope.bindings.extend(own.bindings);
        }
        if body_references(self.cx, callable.node, callable.body, &scope) {
            Verdict::Pass
        } else {
            Verdict::Fail { message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail(message: &str) -> Verdict {
        Verdict::Fail {
            message: message.to_string(),
        }
    }

    #[test]
    fn alternatives_prefer_pass_then_downgrade() {
        let downgraded = Verdict::Downgraded {
            message: "late".to_string(),
            downgraded: "soft".to_string(),
        };
        assert_eq!(Verdict::any_of([fail("a"), Verdict::Pass]), Verdict::Pass);
        assert_eq!(Verdict::any_of([fail("a"), downgraded.clone()]), downgraded);
        assert_eq!(Verdict::any_of([fail("a"), fail("b")]), fail("a"));
        assert_eq!(Verdict::any_of([]), Verdict::Pass);
    }
}
