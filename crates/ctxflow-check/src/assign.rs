//! Reaching assignments.
//!
//! Syntactic lookup of the value a variable, field or slot holds at a use
//! site: the last plain assignment that ends strictly before the use.
//! Assignments inside nested literals of the declaring function count, since
//! they write the same variable.

use std::collections::BTreeSet;

use ctxflow_ast::visit::{self, Visitor};
use ctxflow_ast::{AssignOp, Decl, Element, Expr, ExprKind, Lit, Span, Stmt, StmtKind, UnaryOp};
use ctxflow_sema::{BindingId, TypeInfo};

use crate::CheckContext;

/// The value last assigned to `binding` before `before`.
pub fn last_assignment<'a>(cx: &CheckContext<'a>, binding: BindingId, before: Span) -> Option<&'a Expr> {
    let Some(owner) = cx.info.binding(binding).owner else {
        return global_initializer(cx, binding);
    };
    let node = cx.index.get(owner)?;
    let mut finder = AssignFinder {
        info: cx.info,
        before,
        target: Target::Var(binding),
        found: None,
    };
    visit::walk_block(&mut finder, node.body);
    finder.found.map(|(_, value)| value)
}

fn global_initializer<'a>(cx: &CheckContext<'a>, binding: BindingId) -> Option<&'a Expr> {
    cx.program
        .packages()
        .flat_map(|pkg| &pkg.files)
        .flat_map(|file| &file.decls)
        .find_map(|decl| match decl {
            Decl::Var(spec) if spec.names.len() == spec.values.len() => spec
                .names
                .iter()
                .position(|name| cx.info.def(name) == Some(binding))
                .map(|idx| &spec.values[idx]),
            _ => None,
        })
}

/// The value held by a field or slot expression (`s.f`, `xs[0]`, `m["k"]`)
/// at `before`: a direct store `s.f = v` if there is one, otherwise the
/// matching element of the composite literal `s` was built from.
pub fn slot_value<'a>(cx: &CheckContext<'a>, expr: &'a Expr, before: Span) -> Option<&'a Expr> {
    let (base, key) = match &expr.unparen().kind {
        ExprKind::Selector { base, field } => (&**base, SlotKey::Field(&field.name)),
        ExprKind::Index { base, indices } => match indices.as_slice() {
            [index] => match &index.unparen().kind {
                ExprKind::Lit(lit) => (&**base, SlotKey::Lit(lit)),
                _ => return None,
            },
            _ => return None,
        },
        _ => return None,
    };
    if let Some(value) = direct_store(cx, base, &key, before) {
        return Some(value);
    }
    let mut visited = BTreeSet::new();
    let elems = resolve_composite(cx, base, before, &mut visited)?;
    element_for(elems, &key)
}

#[derive(Debug, Clone, Copy)]
enum SlotKey<'e> {
    Field(&'e str),
    Lit(&'e Lit),
}

/// Elements of the composite literal an expression evaluates to, following
/// `&T{...}` and locals.
fn resolve_composite<'a>(
    cx: &CheckContext<'a>,
    expr: &'a Expr,
    before: Span,
    visited: &mut BTreeSet<BindingId>,
) -> Option<&'a [Element]> {
    match &expr.unparen().kind {
        ExprKind::Composite { elems, .. } => Some(elems),
        ExprKind::Unary {
            op: UnaryOp::Addr,
            operand,
        } => resolve_composite(cx, operand, before, visited),
        ExprKind::Ident(_) => {
            let binding = cx.info.binding_of(expr)?;
            if !visited.insert(binding) {
                return None;
            }
            let value = last_assignment(cx, binding, before)?;
            resolve_composite(cx, value, value.span, visited)
        }
        _ => None,
    }
}

fn element_for<'a>(elems: &'a [Element], key: &SlotKey<'_>) -> Option<&'a Expr> {
    match key {
        SlotKey::Field(name) => elems
            .iter()
            .find(|elem| elem.key.as_ref().and_then(Expr::as_ident) == Some(*name))
            .map(|elem| &elem.value),
        SlotKey::Lit(lit) => {
            let keyed = elems.iter().find(|elem| {
                matches!(elem.key.as_ref().map(|key| &key.unparen().kind), Some(ExprKind::Lit(k)) if k == *lit)
            });
            if let Some(elem) = keyed {
                return Some(&elem.value);
            }
            if elems.iter().any(|elem| elem.key.is_some()) {
                return None;
            }
            match lit {
                Lit::Int(text) => {
                    let position: usize = text.parse().ok()?;
                    elems.get(position).map(|elem| &elem.value)
                }
                _ => None,
            }
        }
    }
}

/// The last `base.f = v` / `base[k] = v` store before `before`.
fn direct_store<'a>(
    cx: &CheckContext<'a>,
    base: &'a Expr,
    key: &SlotKey<'_>,
    before: Span,
) -> Option<&'a Expr> {
    let binding = cx.info.binding_of(base)?;
    let owner = cx.info.binding(binding).owner?;
    let node = cx.index.get(owner)?;
    let mut finder = AssignFinder {
        info: cx.info,
        before,
        target: Target::Slot(binding, *key),
        found: None,
    };
    visit::walk_block(&mut finder, node.body);
    finder.found.map(|(_, value)| value)
}

#[derive(Debug, Clone, Copy)]
enum Target<'k> {
    Var(BindingId),
    Slot(BindingId, SlotKey<'k>),
}

struct AssignFinder<'i, 'k, 'a> {
    info: &'i TypeInfo,
    before: Span,
    target: Target<'k>,
    /// Statement start and assigned value of the latest match so far.
    found: Option<(u32, &'a Expr)>,
}

impl<'a> AssignFinder<'_, '_, 'a> {
    fn record(&mut self, stmt: &Stmt, value: &'a Expr) {
        let reaches = stmt.span.file == self.before.file && stmt.span.end <= self.before.start;
        let later = self.found.is_none_or(|(start, _)| start <= stmt.span.start);
        if reaches && later {
            self.found = Some((stmt.span.start, value));
        }
    }

    fn writes_target(&self, lhs: &Expr) -> bool {
        match self.target {
            Target::Var(binding) => {
                matches!(lhs.unparen().kind, ExprKind::Ident(_)) && self.info.binding_of(lhs) == Some(binding)
            }
            Target::Slot(binding, key) => match (&lhs.unparen().kind, key) {
                (ExprKind::Selector { base, field }, SlotKey::Field(name)) => {
                    field.name == name && self.info.binding_of(base) == Some(binding)
                }
                (ExprKind::Index { base, indices }, SlotKey::Lit(lit)) => {
                    self.info.binding_of(base) == Some(binding)
                        && matches!(indices.as_slice(), [index] if matches!(&index.unparen().kind, ExprKind::Lit(l) if l == lit))
                }
                _ => false,
            },
        }
    }
}

impl<'a> Visitor<'a> for AssignFinder<'_, '_, 'a> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Define { lhs, rhs } if lhs.len() == rhs.len() => {
                if let Target::Var(binding) = self.target {
                    for (ident, value) in lhs.iter().zip(rhs) {
                        if self.info.target_binding(ident) == Some(binding) {
                            self.record(stmt, value);
                        }
                    }
                }
            }
            StmtKind::Var(spec) if spec.names.len() == spec.values.len() => {
                if let Target::Var(binding) = self.target {
                    for (ident, value) in spec.names.iter().zip(&spec.values) {
                        if self.info.def(ident) == Some(binding) {
                            self.record(stmt, value);
                        }
                    }
                }
            }
            StmtKind::Assign {
                lhs,
                op: AssignOp::Assign,
                rhs,
            } if lhs.len() == rhs.len() => {
                for (target, value) in lhs.iter().zip(rhs) {
                    if self.writes_target(target) {
                        self.record(stmt, value);
                    }
                }
            }
            _ => {}
        }
        visit::walk_stmt(self, stmt);
    }
}

#[cfg(test)]
mod tests {
    use ctxflow_ast::FileId;
    use ctxflow_flow::FlowProgram;
    use ctxflow_sema::{FuncIndex, Program};
    use ctxflow_syntax::parse_source;

    use super::*;
    use crate::{CarrierRegistry, DeriverMatcher, ShapeRegistry};

    struct Fixture {
        program: Program,
    }

    impl Fixture {
        fn new(source: &str) -> Self {
            let mut program = Program::new();
            program.add_package(
                "example.com/app",
                vec![parse_source(source, FileId(0)).expect("parse")],
            );
            Self { program }
        }

        /// Run `check` with a context over the fixture and the `go` call of
        /// the first `go` statement.
        fn with_go<R>(&self, check: impl FnOnce(&CheckContext<'_>, &Expr) -> R) -> R {
            let info = self.program.check();
            let index = FuncIndex::build(&self.program);
            let flow = FlowProgram::build(&self.program, &index, &info);
            let carriers = CarrierRegistry::default();
            let shapes = ShapeRegistry::new();
            let deriver = DeriverMatcher::default();
            let cx = CheckContext {
                program: &self.program,
                info: &info,
                index: &index,
                flow: Some(&flow),
                carriers: &carriers,
                shapes: &shapes,
                deriver: &deriver,
            };
            let go = index
                .iter()
                .filter_map(|node| node.decl)
                .flat_map(|decl| decl.body.iter().flat_map(|body| &body.stmts))
                .find_map(|stmt| match &stmt.kind {
                    StmtKind::Go(expr) => expr.as_call().map(|call| call.func),
                    _ => None,
                })
                .expect("go statement");
            check(&cx, go)
        }
    }

    fn lit_text(expr: Option<&Expr>) -> Option<String> {
        match &expr?.unparen().kind {
            ExprKind::Lit(Lit::Int(text) | Lit::String(text)) => Some(text.clone()),
            ExprKind::Call { args, .. } => args.first().and_then(|arg| lit_text(Some(arg))),
            _ => None,
        }
    }

    #[test]
    fn last_assignment_before_use_wins() {
        let fixture = Fixture::new(
            "package app\nfunc mk(n int) func() { return nil }\nfunc run() {\n\tf := mk(1)\n\tf = mk(2)\n\tgo f()\n\tf = mk(3)\n}\n",
        );
        let text = fixture.with_go(|cx, go| {
            let binding = cx.info.binding_of(go).expect("binding");
            lit_text(last_assignment(cx, binding, go.span))
        });
        assert_eq!(text.as_deref(), Some("2"));
    }

    #[test]
    fn fields_resolve_through_pointer_literals() {
        let fixture = Fixture::new(
            "package app\ntype job struct{ run func() }\nfunc mk(n int) func() { return nil }\nfunc run() {\n\tj := &job{run: mk(7)}\n\tgo j.run()\n}\n",
        );
        let text = fixture.with_go(|cx, go| lit_text(slot_value(cx, go, go.span)));
        assert_eq!(text.as_deref(), Some("7"));
    }

    #[test]
    fn direct_stores_override_literals() {
        let fixture = Fixture::new(
            "package app\nfunc mk(n int) func() { return nil }\nfunc run() {\n\tfns := []func(){mk(1), mk(2)}\n\tfns[1] = mk(5)\n\tgo fns[1]()\n}\n",
        );
        let text = fixture.with_go(|cx, go| lit_text(slot_value(cx, go, go.span)));
        assert_eq!(text.as_deref(), Some("5"));
    }

    #[test]
    fn map_slots_match_by_key() {
        let fixture = Fixture::new(
            "package app\nfunc mk(n int) func() { return nil }\nfunc run() {\n\tm := map[string]func(){\"a\": mk(1), \"b\": mk(2)}\n\tgo m[\"b\"]()\n}\n",
        );
        let text = fixture.with_go(|cx, go| lit_text(slot_value(cx, go, go.span)));
        assert_eq!(text.as_deref(), Some("2"));
    }
}
