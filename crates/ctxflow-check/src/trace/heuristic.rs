//! Syntactic capture tracing.

use std::collections::BTreeSet;

use ctxflow_ast::{Expr, ExprKind, NodeId, Span};
use ctxflow_sema::Resolved;
use ctxflow_types::FuncRef;

use super::{Capture, CaptureStrategy, body_references, expr_references, return_values};
use crate::CheckContext;
use crate::assign::{last_assignment, slot_value};
use crate::scope::{CarrierScope, has_carrier_param};

/// Resolves the callback by shape and scans the body it lands on. Nested
/// literals inside that body do not count: each asynchronous boundary has to
/// mention the carrier itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct Heuristic;

impl CaptureStrategy for Heuristic {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn captures<'a>(&self, cx: &CheckContext<'a>, expr: &'a Expr, scope: &CarrierScope) -> Capture {
        let mut visited = BTreeSet::new();
        trace_expr(cx, expr, expr.span, scope, &mut visited)
    }
}

fn trace_expr<'a>(
    cx: &CheckContext<'a>,
    expr: &'a Expr,
    use_site: Span,
    scope: &CarrierScope,
    visited: &mut BTreeSet<NodeId>,
) -> Capture {
    let expr = expr.unparen();
    if !visited.insert(expr.id) {
        return Capture::Untraceable;
    }
    match &expr.kind {
        ExprKind::FuncLit(lit) => {
            if has_carrier_param(&lit.sig, cx.info, cx.carriers) {
                Capture::SelfSufficient
            } else if body_references(cx, expr.id, &lit.body, scope) {
                Capture::Captured
            } else {
                Capture::Missing
            }
        }
        ExprKind::Ident(_) | ExprKind::Selector { .. } | ExprKind::Index { .. } => {
            match cx.info.resolved(expr) {
                Some(Resolved::Func(func)) => declared_func(cx, func),
                Some(Resolved::Binding(binding)) => match last_assignment(cx, *binding, use_site) {
                    Some(value) => trace_expr(cx, value, value.span, scope, visited),
                    None => Capture::Untraceable,
                },
                Some(_) => Capture::Untraceable,
                None => match slot_value(cx, expr, use_site) {
                    Some(value) => trace_expr(cx, value, value.span, scope, visited),
                    None => Capture::Untraceable,
                },
            }
        }
        ExprKind::Call { func, args, .. } => {
            if cx.info.is_type(func) {
                return match args.first() {
                    Some(arg) => trace_expr(cx, arg, use_site, scope, visited),
                    None => Capture::Untraceable,
                };
            }
            if args.iter().any(|arg| expr_references(cx, arg, scope)) {
                return Capture::Captured;
            }
            let Some(returns) = callee_returns(cx, func, use_site, visited) else {
                return Capture::Untraceable;
            };
            let results: Vec<_> = returns
                .into_iter()
                .map(|value| trace_returned(cx, value, scope, visited))
                .collect();
            Capture::any_of(results)
        }
        _ => Capture::Untraceable,
    }
}

/// Trace a function returned by a factory. A returned literal that does not
/// mention the carrier itself still captures it when it builds and returns a
/// literal that does (`f()()`).
fn trace_returned<'a>(
    cx: &CheckContext<'a>,
    value: &'a Expr,
    scope: &CarrierScope,
    visited: &mut BTreeSet<NodeId>,
) -> Capture {
    let result = trace_expr(cx, value, value.span, scope, visited);
    if result != Capture::Missing {
        return result;
    }
    let Some(lit) = value.as_func_lit() else {
        return result;
    };
    match return_values(&lit.body) {
        Some(inner) if !inner.is_empty() => {
            let nested: Vec<_> = inner
                .into_iter()
                .filter(|inner| inner.as_func_lit().is_some())
                .map(|inner| trace_returned(cx, inner, scope, visited))
                .collect();
            match Capture::any_of(nested) {
                Capture::Captured => Capture::Captured,
                _ => Capture::Missing,
            }
        }
        _ => Capture::Missing,
    }
}

/// A declared function used as a callback can only reach the carrier through
/// its own parameters.
fn declared_func(cx: &CheckContext<'_>, func: &FuncRef) -> Capture {
    match cx.program.func_decl(func) {
        Some(decl) if has_carrier_param(&decl.sig, cx.info, cx.carriers) => Capture::SelfSufficient,
        Some(_) => Capture::Missing,
        None => Capture::Untraceable,
    }
}

/// The expressions a call through `func` may return, following literals,
/// declared functions, locals, stored fields and nested factory calls.
pub(crate) fn callee_returns<'a>(
    cx: &CheckContext<'a>,
    func: &'a Expr,
    use_site: Span,
    visited: &mut BTreeSet<NodeId>,
) -> Option<Vec<&'a Expr>> {
    let func = func.unparen();
    match &func.kind {
        ExprKind::FuncLit(lit) => return_values(&lit.body),
        ExprKind::Ident(_) | ExprKind::Selector { .. } | ExprKind::Index { .. } => {
            match cx.info.resolved(func) {
                Some(Resolved::Func(func)) => {
                    let decl = cx.program.func_decl(func)?;
                    return_values(decl.body.as_ref()?)
                }
                Some(Resolved::Binding(binding)) => {
                    if !visited.insert(func.id) {
                        return None;
                    }
                    let value = last_assignment(cx, *binding, use_site)?;
                    callee_returns(cx, value, value.span, visited)
                }
                Some(_) => None,
                None => {
                    if !visited.insert(func.id) {
                        return None;
                    }
                    let value = slot_value(cx, func, use_site)?;
                    callee_returns(cx, value, value.span, visited)
                }
            }
        }
        ExprKind::Call { func: inner, .. } => {
            if !visited.insert(func.id) {
                return None;
            }
            let mut values = Vec::new();
            for factory in callee_returns(cx, inner, use_site, visited)? {
                values.extend(callee_returns(cx, factory, factory.span, visited)?);
            }
            Some(values)
        }
        _ => None,
    }
}
