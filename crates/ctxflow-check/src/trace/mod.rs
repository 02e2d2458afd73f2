//! Capture tracing.
//!
//! Decides whether a callback expression uses the carrier. Two strategies
//! implement [`CaptureStrategy`]: [`Precise`] reads flow summaries (free
//! variables are transitive through nested literals), [`Heuristic`] resolves
//! the expression syntactically and only looks at the body of the literal it
//! lands on. The [`Tracer`] asks them in order and keeps the first definite
//! answer.

mod heuristic;
mod precise;

use std::collections::BTreeSet;

use ctxflow_ast::visit::{self, Visitor};
use ctxflow_ast::{Block, Expr, ExprKind, FuncLit, FuncSig, NodeId, Span, Stmt, StmtKind};
use ctxflow_sema::{BindingId, Resolved};
use tracing::trace;

pub use heuristic::Heuristic;
pub use precise::Precise;

use crate::CheckContext;
use crate::assign::{last_assignment, slot_value};
use crate::scope::CarrierScope;

/// Outcome of tracing one callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// The callback references a carrier from its enclosing scope.
    Captured,
    /// The callback declares its own carrier parameter.
    SelfSufficient,
    /// The callback was resolved and does not use the carrier.
    Missing,
    /// The callback could not be resolved.
    Untraceable,
}

impl Capture {
    pub fn passes(self) -> bool {
        matches!(self, Capture::Captured | Capture::SelfSufficient)
    }

    /// Merge the answers for every value an expression may evaluate to: one
    /// passing value suffices, and only a set of definite misses is a miss.
    pub fn any_of(results: impl IntoIterator<Item = Capture>) -> Capture {
        let mut merged = None;
        for result in results {
            if result.passes() {
                return Capture::Captured;
            }
            merged = match (merged, result) {
                (None | Some(Capture::Missing), Capture::Missing) => Some(Capture::Missing),
                _ => Some(Capture::Untraceable),
            };
        }
        merged.unwrap_or(Capture::Untraceable)
    }
}

pub trait CaptureStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn captures<'a>(&self, cx: &CheckContext<'a>, expr: &'a Expr, scope: &CarrierScope) -> Capture;
}

/// Strategies in preference order.
pub struct Tracer {
    strategies: Vec<Box<dyn CaptureStrategy>>,
}

impl Tracer {
    /// The heuristic strategy, preceded by the precise one when `precise`.
    pub fn new(precise: bool) -> Self {
        let mut strategies: Vec<Box<dyn CaptureStrategy>> = Vec::new();
        if precise {
            strategies.push(Box::new(Precise));
        }
        strategies.push(Box::new(Heuristic));
        Self { strategies }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn CaptureStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    pub fn captures<'a>(&self, cx: &CheckContext<'a>, expr: &'a Expr, scope: &CarrierScope) -> Capture {
        for strategy in &self.strategies {
            let result = strategy.captures(cx, expr, scope);
            trace!(strategy = strategy.name(), ?result, "traced callback");
            if result != Capture::Untraceable {
                return result;
            }
        }
        Capture::Untraceable
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Whether reading `binding` from inside the function(s) `inside` uses the
/// carrier: it is a scope member, or a carrier-typed local declared outside.
pub(crate) fn carries(cx: &CheckContext<'_>, scope: &CarrierScope, binding: BindingId, inside: &[NodeId]) -> bool {
    if scope.contains(binding) {
        return true;
    }
    let binding = cx.info.binding(binding);
    let Some(owner) = binding.owner else {
        return false;
    };
    cx.carriers.is_carrier(&binding.ty) && !inside.iter().any(|node| cx.index.is_within(owner, *node))
}

/// Whether `expr` reads the carrier, looking into literals nested in it.
pub(crate) fn expr_references(cx: &CheckContext<'_>, expr: &Expr, scope: &CarrierScope) -> bool {
    let mut scan = RefScan {
        cx,
        scope,
        inside: Vec::new(),
        descend: true,
        found: false,
    };
    scan.visit_expr(expr);
    scan.found
}

/// Whether the body of function `node` reads the carrier, without looking
/// into nested literals.
pub(crate) fn body_references(cx: &CheckContext<'_>, node: NodeId, body: &Block, scope: &CarrierScope) -> bool {
    let mut scan = RefScan {
        cx,
        scope,
        inside: vec![node],
        descend: false,
        found: false,
    };
    visit::walk_block(&mut scan, body);
    scan.found
}

struct RefScan<'c, 'a> {
    cx: &'c CheckContext<'a>,
    scope: &'c CarrierScope,
    inside: Vec<NodeId>,
    descend: bool,
    found: bool,
}

impl<'ast> Visitor<'ast> for RefScan<'_, '_> {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        if self.found {
            return;
        }
        if let ExprKind::Ident(_) = expr.kind
            && let Some(Resolved::Binding(id)) = self.cx.info.resolved(expr)
            && carries(self.cx, self.scope, *id, &self.inside)
        {
            self.found = true;
            return;
        }
        visit::walk_expr(self, expr);
    }

    fn visit_func_lit(&mut self, expr: &'ast Expr, lit: &'ast FuncLit) {
        if self.descend {
            self.inside.push(expr.id);
            visit::walk_block(self, &lit.body);
            self.inside.pop();
        }
    }
}

/// A function body a callback expression resolves to.
#[derive(Debug, Clone, Copy)]
pub struct Callable<'a> {
    pub node: NodeId,
    pub sig: &'a FuncSig,
    pub body: &'a Block,
}

/// Resolve a callback expression to the literal or declared function it
/// denotes: literals directly, locals through their last assignment, fields
/// and slots through the literal they were stored from, and factory calls
/// through a single returned function.
pub fn resolve_callable<'a>(cx: &CheckContext<'a>, expr: &'a Expr, use_site: Span) -> Option<Callable<'a>> {
    let mut visited = BTreeSet::new();
    resolve_callable_inner(cx, expr, use_site, &mut visited)
}

fn resolve_callable_inner<'a>(
    cx: &CheckContext<'a>,
    expr: &'a Expr,
    use_site: Span,
    visited: &mut BTreeSet<NodeId>,
) -> Option<Callable<'a>> {
    let expr = expr.unparen();
    if !visited.insert(expr.id) {
        return None;
    }
    match &expr.kind {
        ExprKind::FuncLit(lit) => Some(Callable {
            node: expr.id,
            sig: &lit.sig,
            body: &lit.body,
        }),
        ExprKind::Ident(_) | ExprKind::Selector { .. } | ExprKind::Index { .. } => {
            match cx.info.resolved(expr) {
                Some(Resolved::Func(func)) => {
                    let decl = cx.program.func_decl(func)?;
                    Some(Callable {
                        node: decl.id,
                        sig: &decl.sig,
                        body: decl.body.as_ref()?,
                    })
                }
                Some(Resolved::Binding(binding)) => {
                    let value = last_assignment(cx, *binding, use_site)?;
                    resolve_callable_inner(cx, value, value.span, visited)
                }
                Some(_) => None,
                None => {
                    let value = slot_value(cx, expr, use_site)?;
                    resolve_callable_inner(cx, value, value.span, visited)
                }
            }
        }
        ExprKind::Call { func, args, .. } => {
            if cx.info.is_type(func) {
                let arg = args.first()?;
                return resolve_callable_inner(cx, arg, use_site, visited);
            }
            match heuristic::callee_returns(cx, func, use_site, visited)?.as_slice() {
                [single] => resolve_callable_inner(cx, single, single.span, visited),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Values of the `return` statements of a body, not of nested literals.
pub(crate) fn return_values(body: &Block) -> Option<Vec<&Expr>> {
    let mut collector = ReturnValues {
        values: Vec::new(),
        bare: false,
    };
    visit::walk_block(&mut collector, body);
    (!collector.bare).then_some(collector.values)
}

struct ReturnValues<'a> {
    values: Vec<&'a Expr>,
    bare: bool,
}

impl<'a> Visitor<'a> for ReturnValues<'a> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        if let StmtKind::Return(values) = &stmt.kind {
            if values.is_empty() {
                self.bare = true;
            }
            self.values.extend(values);
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_func_lit(&mut self, _expr: &'a Expr, _lit: &'a FuncLit) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_of_prefers_a_pass_and_needs_unanimous_misses() {
        use Capture::*;
        assert_eq!(Capture::any_of([Missing, Captured]), Captured);
        assert_eq!(Capture::any_of([Untraceable, SelfSufficient]), Captured);
        assert_eq!(Capture::any_of([Missing, Missing]), Missing);
        assert_eq!(Capture::any_of([Missing, Untraceable]), Untraceable);
        assert_eq!(Capture::any_of([]), Untraceable);
    }

    #[test]
    fn tracer_orders_strategies() {
        assert_eq!(Tracer::new(true).strategy_names(), vec!["precise", "heuristic"]);
        assert_eq!(Tracer::new(false).strategy_names(), vec!["heuristic"]);
    }
}
