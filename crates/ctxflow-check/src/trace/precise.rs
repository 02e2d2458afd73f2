//! Capture tracing over flow summaries.

use std::collections::BTreeSet;

use ctxflow_ast::Expr;
use ctxflow_flow::{FlowProgram, Value, value_of};
use ctxflow_sema::BindingKind;
use ctxflow_types::FuncRef;

use super::{Capture, CaptureStrategy};
use crate::CheckContext;
use crate::scope::{CarrierScope, has_carrier_param};

/// Works on the symbolic [`Value`] of the callback. A literal's free
/// variables include everything its nested literals capture, so a carrier
/// used anywhere below the callback counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Precise;

impl CaptureStrategy for Precise {
    fn name(&self) -> &'static str {
        "precise"
    }

    fn captures<'a>(&self, cx: &CheckContext<'a>, expr: &'a Expr, scope: &CarrierScope) -> Capture {
        let Some(flow) = cx.flow else {
            return Capture::Untraceable;
        };
        let tracer = ValueTracer { cx, flow, scope };
        let mut visited = BTreeSet::new();
        tracer.trace(&value_of(expr, cx.info), &mut visited)
    }
}

struct ValueTracer<'c, 'a> {
    cx: &'c CheckContext<'a>,
    flow: &'a FlowProgram,
    scope: &'c CarrierScope,
}

impl ValueTracer<'_, '_> {
    fn trace(&self, value: &Value, visited: &mut BTreeSet<Value>) -> Capture {
        if !visited.insert(value.clone()) {
            return Capture::Untraceable;
        }
        match value {
            Value::Closure(node) => self.closure(*node),
            Value::Binding(binding) => {
                if self.cx.info.binding(*binding).kind != BindingKind::Local {
                    return Capture::Untraceable;
                }
                match self.flow.single_store(*binding) {
                    Some(stored) => self.trace(stored, visited),
                    None => Capture::Untraceable,
                }
            }
            Value::Func(func) => self.declared_func(func),
            Value::Call { func, args, .. } => {
                if args.iter().any(|arg| self.carries(arg)) {
                    return Capture::Captured;
                }
                let mut seen = BTreeSet::new();
                let Some(returns) = self.callee_returns(func, &mut seen) else {
                    return Capture::Untraceable;
                };
                let results: Vec<_> = returns
                    .iter()
                    .map(|returned| self.trace(returned, visited))
                    .collect();
                Capture::any_of(results)
            }
            Value::Method { .. } | Value::Opaque => Capture::Untraceable,
        }
    }

    fn closure(&self, node: ctxflow_ast::NodeId) -> Capture {
        let Some(func) = self.cx.index.get(node) else {
            return Capture::Untraceable;
        };
        let Ok(summary) = self.flow.function(node, self.cx.index) else {
            return Capture::Untraceable;
        };
        if has_carrier_param(func.sig, self.cx.info, self.cx.carriers) {
            return Capture::SelfSufficient;
        }
        let captured = summary
            .free_vars
            .iter()
            .any(|var| self.scope.contains(var.binding) || self.cx.carriers.is_carrier(&var.ty));
        if captured {
            Capture::Captured
        } else {
            Capture::Missing
        }
    }

    fn declared_func(&self, func: &FuncRef) -> Capture {
        match self.cx.program.func_decl(func) {
            Some(decl) if has_carrier_param(&decl.sig, self.cx.info, self.cx.carriers) => {
                Capture::SelfSufficient
            }
            Some(_) => Capture::Missing,
            None => Capture::Untraceable,
        }
    }

    /// Whether an argument value hands the carrier to the call.
    fn carries(&self, value: &Value) -> bool {
        match value {
            Value::Binding(binding) => {
                let info = self.cx.info.binding(*binding);
                self.scope.contains(*binding)
                    || (info.kind != BindingKind::Global && self.cx.carriers.is_carrier(&info.ty))
            }
            Value::Closure(node) => self.closure(*node) == Capture::Captured,
            Value::Call { args, .. } => args.iter().any(|arg| self.carries(arg)),
            Value::Func(_) | Value::Method { .. } | Value::Opaque => false,
        }
    }

    /// Values returned by calling `func`, flattening nested factory calls.
    fn callee_returns(&self, func: &Value, seen: &mut BTreeSet<Value>) -> Option<Vec<Value>> {
        if !seen.insert(func.clone()) {
            return None;
        }
        match func {
            Value::Closure(node) => Some(self.flow.function(*node, self.cx.index).ok()?.returns.clone()),
            Value::Func(func) => {
                let decl = self.cx.program.func_decl(func)?;
                Some(self.flow.function(decl.id, self.cx.index).ok()?.returns.clone())
            }
            Value::Binding(binding) => {
                let stored = self.flow.single_store(*binding)?;
                self.callee_returns(stored, seen)
            }
            Value::Call { func, .. } => {
                let mut values = Vec::new();
                for factory in self.callee_returns(func, seen)? {
                    values.extend(self.callee_returns(&factory, seen)?);
                }
                Some(values)
            }
            Value::Method { .. } | Value::Opaque => None,
        }
    }
}
