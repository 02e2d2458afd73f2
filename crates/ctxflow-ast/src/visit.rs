//! Read-only traversal over statements and expressions.
//!
//! Implementors override the `visit_*` hooks they care about and call the
//! matching `walk_*` function to continue into children. Function literals go
//! through [`Visitor::visit_func_lit`] so passes can decide whether to descend
//! into nested closures.

use crate::{Block, Expr, ExprKind, FuncLit, RangeBinding, Stmt, StmtKind, TypeExpr};

pub trait Visitor<'ast> {
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'ast Expr) {
        walk_expr(self, expr);
    }

    /// Called for every function literal. The default descends into its body.
    fn visit_func_lit(&mut self, _expr: &'ast Expr, lit: &'ast FuncLit) {
        walk_block(self, &lit.body);
    }

    fn visit_type(&mut self, _ty: &'ast TypeExpr) {}
}

pub fn walk_block<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, block: &'ast Block) {
    for stmt in &block.stmts {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, stmt: &'ast Stmt) {
    match &stmt.kind {
        StmtKind::Expr(expr) | StmtKind::Go(expr) | StmtKind::Defer(expr) => {
            visitor.visit_expr(expr)
        }
        StmtKind::Define { rhs, .. } => {
            for expr in rhs {
                visitor.visit_expr(expr);
            }
        }
        StmtKind::Assign { lhs, rhs, .. } => {
            for expr in lhs.iter().chain(rhs) {
                visitor.visit_expr(expr);
            }
        }
        StmtKind::IncDec { target, .. } => visitor.visit_expr(target),
        StmtKind::Var(spec) => {
            if let Some(ty) = &spec.ty {
                visitor.visit_type(ty);
            }
            for expr in &spec.values {
                visitor.visit_expr(expr);
            }
        }
        StmtKind::Type(decl) => visitor.visit_type(&decl.ty),
        StmtKind::Return(values) => {
            for expr in values {
                visitor.visit_expr(expr);
            }
        }
        StmtKind::If {
            init,
            cond,
            then,
            els,
        } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            visitor.visit_expr(cond);
            walk_block(visitor, then);
            if let Some(els) = els {
                visitor.visit_stmt(els);
            }
        }
        StmtKind::For {
            init,
            cond,
            post,
            body,
        } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(cond) = cond {
                visitor.visit_expr(cond);
            }
            if let Some(post) = post {
                visitor.visit_stmt(post);
            }
            walk_block(visitor, body);
        }
        StmtKind::Range {
            binding,
            expr,
            body,
        } => {
            if let RangeBinding::Assign(targets) = binding {
                for target in targets {
                    visitor.visit_expr(target);
                }
            }
            visitor.visit_expr(expr);
            walk_block(visitor, body);
        }
        StmtKind::Switch { init, tag, clauses } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(tag) = tag {
                visitor.visit_expr(tag);
            }
            for clause in clauses {
                for expr in &clause.exprs {
                    visitor.visit_expr(expr);
                }
                for stmt in &clause.body {
                    visitor.visit_stmt(stmt);
                }
            }
        }
        StmtKind::Select { clauses } => {
            for clause in clauses {
                if let Some(comm) = &clause.comm {
                    visitor.visit_stmt(comm);
                }
                for stmt in &clause.body {
                    visitor.visit_stmt(stmt);
                }
            }
        }
        StmtKind::Send { chan, value } => {
            visitor.visit_expr(chan);
            visitor.visit_expr(value);
        }
        StmtKind::Block(block) => walk_block(visitor, block),
        StmtKind::Labeled { stmt, .. } => visitor.visit_stmt(stmt),
        StmtKind::Goto(_)
        | StmtKind::Break(_)
        | StmtKind::Continue(_)
        | StmtKind::Fallthrough
        | StmtKind::Empty => {}
    }
}

pub fn walk_expr<'ast, V: Visitor<'ast> + ?Sized>(visitor: &mut V, expr: &'ast Expr) {
    match &expr.kind {
        ExprKind::Ident(_) | ExprKind::Lit(_) => {}
        ExprKind::FuncLit(lit) => visitor.visit_func_lit(expr, lit),
        ExprKind::Composite { ty, elems } => {
            if let Some(ty) = ty {
                visitor.visit_type(ty);
            }
            for elem in elems {
                if let Some(key) = &elem.key {
                    visitor.visit_expr(key);
                }
                visitor.visit_expr(&elem.value);
            }
        }
        ExprKind::Selector { base, .. } => visitor.visit_expr(base),
        ExprKind::Index { base, indices } => {
            visitor.visit_expr(base);
            for index in indices {
                visitor.visit_expr(index);
            }
        }
        ExprKind::Slice { base, lo, hi, max } => {
            visitor.visit_expr(base);
            for bound in [lo, hi, max].into_iter().flatten() {
                visitor.visit_expr(bound);
            }
        }
        ExprKind::TypeAssert { base, ty } => {
            visitor.visit_expr(base);
            if let Some(ty) = ty {
                visitor.visit_type(ty);
            }
        }
        ExprKind::Call { func, args, .. } => {
            visitor.visit_expr(func);
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expr(operand),
        ExprKind::Binary { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        ExprKind::Paren(inner) => visitor.visit_expr(inner),
        ExprKind::Type(ty) => visitor.visit_type(ty),
    }
}
