//! The program checker.
//!
//! Runs in three passes over every package:
//! 1. declare every named type,
//! 2. resolve type definitions, function and method signatures and package
//!    variables,
//! 3. resolve function bodies and package variable initializers, recording
//!    bindings, uses, expression types and callees into [`TypeInfo`].

use std::collections::BTreeMap;

use ctxflow_ast::{
    BinOp, ChanDir, Decl, Element, Expr, ExprKind, FuncDecl, FuncLit, FuncSig, Ident, Lit, NodeId,
    RangeBinding, SourceFile, Stmt, StmtKind, TypeDecl, TypeExpr, TypeExprKind, TypeParam,
    UnaryOp, VarSpec,
};
use ctxflow_types::{self as types, Basic, Field, FuncRef, Method, Named, Signature, Type};
use tracing::debug;

use crate::decls::{Decls, FuncDef, Member, MethodDef};
use crate::universe::{self, default_type, is_untyped};
use crate::{
    Binding, BindingId, BindingKind, Callee, Package, Program, Resolved, TypeInfo,
    receiver_type_name,
};

pub(crate) fn check_program(program: &Program) -> TypeInfo {
    let mut checker = Checker::new(program);
    checker.collect_types();
    checker.collect_signatures();
    checker.check_bodies();
    debug!(
        packages = program.packages().count(),
        bindings = checker.info.bindings.len(),
        callees = checker.info.callees.len(),
        "resolved program"
    );
    checker.info
}

struct Checker<'p> {
    program: &'p Program,
    decls: Decls,
    info: TypeInfo,
    /// Import path of the package being checked.
    pkg: String,
    /// Local import name to import path, for the current file.
    imports: BTreeMap<String, String>,
    scopes: Vec<BTreeMap<String, Resolved>>,
    /// Enclosing function declarations and literals, innermost last.
    owners: Vec<NodeId>,
}

impl<'p> Checker<'p> {
    fn new(program: &'p Program) -> Self {
        Self {
            program,
            decls: Decls::default(),
            info: TypeInfo::default(),
            pkg: String::new(),
            imports: BTreeMap::new(),
            scopes: Vec::new(),
            owners: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Passes
    // -----------------------------------------------------------------------

    fn collect_types(&mut self) {
        let program = self.program;
        for package in program.packages() {
            for file in &package.files {
                for decl in &file.decls {
                    if let Decl::Type(td) = decl {
                        self.decls.declare_type(
                            &package.path,
                            &td.name.name,
                            param_names(&td.type_params),
                            td.alias,
                        );
                    }
                }
            }
        }
    }

    fn collect_signatures(&mut self) {
        let program = self.program;
        // Type definitions first so signatures see alias targets.
        for package in program.packages() {
            for file in &package.files {
                self.enter_file(package, file);
                for decl in &file.decls {
                    if let Decl::Type(td) = decl {
                        let underlying = self.type_decl_underlying(td);
                        self.decls
                            .set_underlying(&package.path, &td.name.name, underlying);
                    }
                }
            }
        }
        for package in program.packages() {
            for file in &package.files {
                self.enter_file(package, file);
                for decl in &file.decls {
                    match decl {
                        Decl::Func(fd) => self.collect_func(fd),
                        Decl::Var(spec) => self.collect_var(spec),
                        Decl::Type(_) => {}
                    }
                }
            }
        }
    }

    fn check_bodies(&mut self) {
        let program = self.program;
        for package in program.packages() {
            for file in &package.files {
                self.enter_file(package, file);
                for decl in &file.decls {
                    match decl {
                        Decl::Func(fd) => self.check_func_decl(fd),
                        Decl::Var(spec) => self.check_global_var(spec),
                        Decl::Type(_) => {}
                    }
                }
            }
        }
    }

    fn enter_file(&mut self, package: &Package, file: &SourceFile) {
        self.pkg = package.path.clone();
        self.imports.clear();
        self.scopes.clear();
        self.owners.clear();
        for import in &file.imports {
            let local = match &import.alias {
                Some(alias) if alias.name == "_" || alias.name == "." => continue,
                Some(alias) => alias.name.clone(),
                None => self
                    .program
                    .package(&import.path)
                    .map(|pkg| pkg.name.clone())
                    .unwrap_or_else(|| types::package_name(&import.path).to_string()),
            };
            self.imports.insert(local, import.path.clone());
        }
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    fn type_decl_underlying(&mut self, td: &TypeDecl) -> Type {
        self.push_scope();
        self.bind_type_params(td.type_params.iter().map(|param| &param.name));
        let ty = self.resolve_type(&td.ty);
        self.pop_scope();
        ty
    }

    /// Bind receiver and function type parameters, returning the receiver
    /// base type name and receiver parameter names.
    fn enter_func_params<'a>(&mut self, fd: &'a FuncDecl) -> Option<(&'a str, Vec<String>)> {
        let recv = fd.recv.as_ref().and_then(|recv| receiver_type_name(&recv.ty));
        if let Some((_, params)) = &recv {
            self.bind_type_params(params.iter().copied());
        }
        self.bind_type_params(fd.type_params.iter().map(|param| &param.name));
        recv.map(|(name, params)| (name, params.iter().map(|p| p.name.clone()).collect()))
    }

    fn collect_func(&mut self, fd: &FuncDecl) {
        self.push_scope();
        let recv = self.enter_func_params(fd);
        let sig = self.signature(&fd.sig);
        self.pop_scope();
        let pkg = self.pkg.clone();
        match recv {
            Some((recv_name, recv_params)) => self.decls.add_method(
                &pkg,
                recv_name,
                &fd.name.name,
                MethodDef { recv_params, sig },
            ),
            None if fd.recv.is_none() => self.decls.add_func(
                &pkg,
                &fd.name.name,
                FuncDef {
                    type_params: param_names(&fd.type_params),
                    sig,
                },
            ),
            None => {}
        }
    }

    fn collect_var(&mut self, spec: &VarSpec) {
        let ty = spec
            .ty
            .as_ref()
            .map(|ty| self.resolve_type(ty))
            .unwrap_or(Type::Unknown);
        let pkg = self.pkg.clone();
        for name in &spec.names {
            if name.is_blank() {
                continue;
            }
            let id = self.info.add_binding(Binding {
                name: name.name.clone(),
                ty: ty.clone(),
                kind: BindingKind::Global,
                span: name.span,
                owner: None,
            });
            self.info.defs.insert(name.id, id);
            self.decls.add_var(&pkg, &name.name, id);
        }
    }

    fn check_global_var(&mut self, spec: &VarSpec) {
        let declared = spec.ty.as_ref().map(|ty| self.resolve_type(ty));
        let value_types = self.check_values(&spec.values, spec.names.len(), declared.as_ref());
        if declared.is_some() {
            return;
        }
        for (idx, name) in spec.names.iter().enumerate() {
            if let (Some(id), Some(ty)) = (self.info.def(name), value_types.get(idx)) {
                self.info.set_binding_type(id, default_type(ty.clone()));
            }
        }
    }

    fn check_func_decl(&mut self, fd: &FuncDecl) {
        let Some(body) = &fd.body else {
            return;
        };
        self.owners.push(fd.id);
        self.push_scope();
        self.enter_func_params(fd);
        if let Some(recv) = &fd.recv {
            let ty = self.resolve_type(&recv.ty);
            if let Some(name) = &recv.name {
                self.declare(name, ty, BindingKind::Receiver);
            }
        }
        self.declare_signature(&fd.sig);
        self.check_stmts(&body.stmts);
        self.pop_scope();
        self.owners.pop();
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: &str, resolved: Resolved) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), resolved);
        }
    }

    fn bind_type_params<'a>(&mut self, names: impl Iterator<Item = &'a Ident>) {
        for name in names {
            self.bind(&name.name, Resolved::Type(Type::Param(name.name.clone())));
        }
    }

    fn lookup(&self, name: &str) -> Option<Resolved> {
        for scope in self.scopes.iter().rev() {
            if let Some(resolved) = scope.get(name) {
                return Some(resolved.clone());
            }
        }
        if let Some(resolved) = self.decls.package_member(&self.pkg, name) {
            return Some(resolved);
        }
        if let Some(path) = self.imports.get(name) {
            return Some(Resolved::Package(path.clone()));
        }
        universe::lookup(name)
    }

    fn declare(&mut self, ident: &Ident, ty: Type, kind: BindingKind) -> Option<BindingId> {
        if ident.is_blank() {
            return None;
        }
        let id = self.info.add_binding(Binding {
            name: ident.name.clone(),
            ty,
            kind,
            span: ident.span,
            owner: self.owners.last().copied(),
        });
        self.info.defs.entry(ident.id).or_insert(id);
        self.bind(&ident.name, Resolved::Binding(id));
        Some(id)
    }

    /// Declare parameters and named results, returning the signature.
    fn declare_signature(&mut self, sig: &FuncSig) -> Signature {
        for group in &sig.params {
            let mut ty = self.resolve_type(&group.ty);
            if group.variadic {
                ty = Type::Slice(Box::new(ty));
            }
            for name in &group.names {
                self.declare(name, ty.clone(), BindingKind::Param);
            }
        }
        for group in &sig.results {
            let ty = self.resolve_type(&group.ty);
            for name in &group.names {
                self.declare(name, ty.clone(), BindingKind::Result);
            }
        }
        self.signature(sig)
    }

    // -----------------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------------

    fn signature(&mut self, sig: &FuncSig) -> Signature {
        let mut params = Vec::new();
        let mut variadic = false;
        for group in &sig.params {
            let ty = self.resolve_type(&group.ty);
            let ty = if group.variadic {
                variadic = true;
                Type::Slice(Box::new(ty))
            } else {
                ty
            };
            for _ in 0..group.names.len().max(1) {
                params.push(ty.clone());
            }
        }
        let mut results = Vec::new();
        for group in &sig.results {
            let ty = self.resolve_type(&group.ty);
            for _ in 0..group.names.len().max(1) {
                results.push(ty.clone());
            }
        }
        Signature {
            params,
            results,
            variadic,
        }
    }

    fn resolve_type(&mut self, te: &TypeExpr) -> Type {
        let ty = self.resolve_type_kind(&te.kind);
        self.info.type_exprs.insert(te.span, ty.clone());
        ty
    }

    fn resolve_type_kind(&mut self, kind: &TypeExprKind) -> Type {
        match kind {
            TypeExprKind::Name {
                pkg: Some(pkg),
                name,
                args,
            } => {
                let Some(path) = self.imports.get(&pkg.name).cloned() else {
                    return Type::Unknown;
                };
                let args: Vec<Type> = args.iter().map(|arg| self.resolve_type(arg)).collect();
                match self.decls.package_member(&path, &name.name) {
                    Some(Resolved::Type(Type::Named(mut named))) => {
                        named.args = args;
                        Type::Named(named)
                    }
                    Some(Resolved::Type(aliased)) => aliased,
                    // Packages that were not loaded still get structural names.
                    _ => Type::Named(Named {
                        path,
                        name: name.name.clone(),
                        args,
                    }),
                }
            }
            TypeExprKind::Name {
                pkg: None,
                name,
                args,
            } => match self.lookup(&name.name) {
                Some(Resolved::Type(Type::Named(mut named))) if !args.is_empty() => {
                    named.args = args.iter().map(|arg| self.resolve_type(arg)).collect();
                    Type::Named(named)
                }
                Some(Resolved::Type(ty)) => ty,
                _ => Type::Unknown,
            },
            TypeExprKind::Pointer(inner) => Type::pointer(self.resolve_type(inner)),
            TypeExprKind::Slice(inner) => Type::Slice(Box::new(self.resolve_type(inner))),
            TypeExprKind::Array(inner) => Type::Array(Box::new(self.resolve_type(inner))),
            TypeExprKind::Map { key, value } => Type::Map(
                Box::new(self.resolve_type(key)),
                Box::new(self.resolve_type(value)),
            ),
            TypeExprKind::Chan { dir, elem } => {
                let dir = match dir {
                    ChanDir::Both => types::ChanDir::Both,
                    ChanDir::Send => types::ChanDir::Send,
                    ChanDir::Recv => types::ChanDir::Recv,
                };
                Type::Chan(dir, Box::new(self.resolve_type(elem)))
            }
            TypeExprKind::Func(sig) => Type::Func(Box::new(self.signature(sig))),
            TypeExprKind::Struct(fields) => {
                let mut resolved = Vec::new();
                for field in fields {
                    let ty = self.resolve_type(&field.ty);
                    if field.names.is_empty() {
                        let name = receiver_type_name(&field.ty)
                            .map(|(name, _)| name.to_string())
                            .unwrap_or_default();
                        resolved.push(Field {
                            name,
                            ty,
                            embedded: true,
                        });
                    } else {
                        for name in &field.names {
                            resolved.push(Field {
                                name: name.name.clone(),
                                ty: ty.clone(),
                                embedded: false,
                            });
                        }
                    }
                }
                Type::Struct(resolved)
            }
            TypeExprKind::Interface(elems) => {
                let mut methods = Vec::new();
                for elem in elems {
                    if let ctxflow_ast::InterfaceElem::Method { name, sig } = elem {
                        methods.push(Method {
                            name: name.name.clone(),
                            sig: self.signature(sig),
                        });
                    }
                }
                Type::Interface(methods)
            }
        }
    }

    /// Interpret an expression as a type, recording the resolution. Returns
    /// `None` without side effects when the expression denotes a value.
    fn expr_as_type(&mut self, expr: &Expr) -> Option<Type> {
        let expr = expr.unparen();
        let ty = match &expr.kind {
            ExprKind::Ident(name) => match self.lookup(name)? {
                Resolved::Type(ty) => ty,
                _ => return None,
            },
            ExprKind::Selector { base, field } => {
                let ExprKind::Ident(pkg) = &base.unparen().kind else {
                    return None;
                };
                let Some(Resolved::Package(path)) = self.lookup(pkg) else {
                    return None;
                };
                let Some(Resolved::Type(ty)) = self.decls.package_member(&path, &field.name)
                else {
                    return None;
                };
                self.info
                    .uses
                    .insert(base.unparen().id, Resolved::Package(path));
                ty
            }
            ExprKind::Index { base, indices } => {
                let Type::Named(mut named) = self.expr_as_type(base)? else {
                    return None;
                };
                named.args = indices
                    .iter()
                    .map(|index| self.expr_as_type(index).unwrap_or(Type::Unknown))
                    .collect();
                Type::Named(named)
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => Type::pointer(self.expr_as_type(operand)?),
            ExprKind::Type(te) => self.resolve_type(te),
            _ => return None,
        };
        self.info.uses.insert(expr.id, Resolved::Type(ty.clone()));
        Some(ty)
    }

    fn range_types(&self, ty: &Type) -> (Type, Type) {
        let int = Type::Basic(Basic::Int);
        match self.decls.underlying(ty) {
            Type::Slice(elem) | Type::Array(elem) => (int, *elem),
            Type::Pointer(inner) => match self.decls.underlying(&inner) {
                Type::Array(elem) => (int, *elem),
                _ => (Type::Unknown, Type::Unknown),
            },
            Type::Map(key, value) => (*key, *value),
            Type::Chan(_, elem) => (*elem, Type::Unknown),
            Type::Basic(Basic::String | Basic::UntypedString) => (int, Type::Basic(Basic::Int32)),
            Type::Basic(basic) => (default_type(Type::Basic(basic)), Type::Unknown),
            Type::Func(sig) => match sig.params.first() {
                Some(Type::Func(yield_sig)) => (
                    yield_sig.params.first().cloned().unwrap_or(Type::Unknown),
                    yield_sig.params.get(1).cloned().unwrap_or(Type::Unknown),
                ),
                _ => (Type::Unknown, Type::Unknown),
            },
            _ => (Type::Unknown, Type::Unknown),
        }
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn check_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.check_stmt(stmt);
        }
    }

    fn check_block(&mut self, stmts: &[Stmt]) {
        self.push_scope();
        self.check_stmts(stmts);
        self.pop_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) | StmtKind::Go(expr) | StmtKind::Defer(expr) => {
                self.check_expr(expr, None);
            }
            StmtKind::Define { lhs, rhs } => self.check_define(lhs, rhs),
            StmtKind::Assign { lhs, rhs, .. } => {
                let targets: Vec<Type> = lhs.iter().map(|expr| self.check_expr(expr, None)).collect();
                for (idx, expr) in rhs.iter().enumerate() {
                    let expected = targets.get(idx).filter(|ty| !ty.is_unknown()).cloned();
                    self.check_expr(expr, expected.as_ref());
                }
            }
            StmtKind::IncDec { target, .. } => {
                self.check_expr(target, None);
            }
            StmtKind::Var(spec) => self.check_local_var(spec),
            StmtKind::Type(td) => self.check_local_type(td),
            StmtKind::Return(values) => {
                for value in values {
                    self.check_expr(value, None);
                }
            }
            StmtKind::If {
                init,
                cond,
                then,
                els,
            } => {
                self.push_scope();
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                self.check_expr(cond, None);
                self.check_block(&then.stmts);
                if let Some(els) = els {
                    self.check_stmt(els);
                }
                self.pop_scope();
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                self.push_scope();
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(cond) = cond {
                    self.check_expr(cond, None);
                }
                if let Some(post) = post {
                    self.check_stmt(post);
                }
                self.check_block(&body.stmts);
                self.pop_scope();
            }
            StmtKind::Range {
                binding,
                expr,
                body,
            } => {
                self.push_scope();
                let ty = self.check_expr(expr, None);
                match binding {
                    RangeBinding::Define(names) => {
                        let (key, value) = self.range_types(&ty);
                        for (idx, name) in names.iter().enumerate() {
                            let ty = if idx == 0 { key.clone() } else { value.clone() };
                            self.declare(name, ty, BindingKind::Local);
                        }
                    }
                    RangeBinding::Assign(targets) => {
                        for target in targets {
                            self.check_expr(target, None);
                        }
                    }
                    RangeBinding::None => {}
                }
                self.check_block(&body.stmts);
                self.pop_scope();
            }
            StmtKind::Switch { init, tag, clauses } => {
                self.check_switch(init.as_deref(), tag.as_ref(), clauses)
            }
            StmtKind::Select { clauses } => {
                for clause in clauses {
                    self.push_scope();
                    if let Some(comm) = &clause.comm {
                        self.check_stmt(comm);
                    }
                    self.check_stmts(&clause.body);
                    self.pop_scope();
                }
            }
            StmtKind::Send { chan, value } => {
                self.check_expr(chan, None);
                self.check_expr(value, None);
            }
            StmtKind::Block(block) => self.check_block(&block.stmts),
            StmtKind::Labeled { stmt, .. } => self.check_stmt(stmt),
            StmtKind::Goto(_)
            | StmtKind::Break(_)
            | StmtKind::Continue(_)
            | StmtKind::Fallthrough
            | StmtKind::Empty => {}
        }
    }

    /// Check right-hand sides and spread them over `count` targets, handling
    /// multi-value calls and comma-ok forms.
    fn check_values(&mut self, values: &[Expr], count: usize, expected: Option<&Type>) -> Vec<Type> {
        let types: Vec<Type> = values
            .iter()
            .map(|value| self.check_expr(value, expected))
            .collect();
        if types.len() == 1 && count > 1 {
            return match &types[0] {
                Type::Tuple(items) => items.clone(),
                single => {
                    let mut spread = vec![single.clone()];
                    spread.resize(count, Type::Basic(Basic::Bool));
                    spread
                }
            };
        }
        types
    }

    fn check_define(&mut self, lhs: &[Ident], rhs: &[Expr]) {
        let types = self.check_values(rhs, lhs.len(), None);
        for (idx, ident) in lhs.iter().enumerate() {
            if ident.is_blank() {
                continue;
            }
            let existing = self
                .scopes
                .last()
                .and_then(|scope| scope.get(&ident.name))
                .cloned();
            match existing {
                // `:=` redeclaration reuses variables of the same scope.
                Some(Resolved::Binding(id)) => {
                    self.info.uses.insert(ident.id, Resolved::Binding(id));
                }
                _ => {
                    let ty = types.get(idx).cloned().unwrap_or(Type::Unknown);
                    self.declare(ident, default_type(ty), BindingKind::Local);
                }
            }
        }
    }

    fn check_local_var(&mut self, spec: &VarSpec) {
        let declared = spec.ty.as_ref().map(|ty| self.resolve_type(ty));
        let types = self.check_values(&spec.values, spec.names.len(), declared.as_ref());
        for (idx, name) in spec.names.iter().enumerate() {
            let ty = match &declared {
                Some(ty) => ty.clone(),
                None => default_type(types.get(idx).cloned().unwrap_or(Type::Unknown)),
            };
            self.declare(name, ty, BindingKind::Local);
        }
    }

    fn check_local_type(&mut self, td: &TypeDecl) {
        let pkg = self.pkg.clone();
        if self.decls.type_def(&pkg, &td.name.name).is_none() {
            self.decls.declare_type(
                &pkg,
                &td.name.name,
                param_names(&td.type_params),
                td.alias,
            );
            let underlying = self.type_decl_underlying(td);
            self.decls.set_underlying(&pkg, &td.name.name, underlying);
        }
        let resolved = match self.decls.package_member(&pkg, &td.name.name) {
            Some(resolved @ Resolved::Type(_)) => resolved,
            _ => Resolved::Type(Type::named(&pkg, &td.name.name)),
        };
        self.bind(&td.name.name, resolved);
    }

    fn check_switch(
        &mut self,
        init: Option<&Stmt>,
        tag: Option<&Expr>,
        clauses: &[ctxflow_ast::CaseClause],
    ) {
        self.push_scope();
        let mut guard: Option<(&Ident, Type)> = None;
        if let Some(init) = init {
            match &init.kind {
                StmtKind::Define { lhs, rhs } if lhs.len() == 1 && rhs.len() == 1 => {
                    if let ExprKind::TypeAssert { base, ty: None } = &rhs[0].unparen().kind {
                        let base_ty = self.check_expr(base, None);
                        guard = Some((&lhs[0], base_ty));
                    } else {
                        self.check_stmt(init);
                    }
                }
                _ => self.check_stmt(init),
            }
        }
        if let Some(tag) = tag {
            self.check_expr(tag, None);
        }
        let type_switch = guard.is_some()
            || matches!(
                tag.map(|tag| &tag.unparen().kind),
                Some(ExprKind::TypeAssert { ty: None, .. })
            );
        for clause in clauses {
            self.push_scope();
            let mut clause_ty = None;
            for expr in &clause.exprs {
                if type_switch {
                    let ty = self.expr_as_type(expr);
                    if clause.exprs.len() == 1 {
                        clause_ty = ty;
                    }
                } else {
                    self.check_expr(expr, None);
                }
            }
            if let Some((ident, base_ty)) = &guard {
                let ty = clause_ty.unwrap_or_else(|| base_ty.clone());
                self.declare(ident, ty, BindingKind::Local);
            }
            self.check_stmts(&clause.body);
            self.pop_scope();
        }
        self.pop_scope();
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn check_expr(&mut self, expr: &Expr, expected: Option<&Type>) -> Type {
        let ty = self.expr_type(expr, expected);
        if !ty.is_unknown() {
            self.info.types.insert(expr.id, ty.clone());
        }
        ty
    }

    fn expr_type(&mut self, expr: &Expr, expected: Option<&Type>) -> Type {
        match &expr.kind {
            ExprKind::Ident(name) => self.check_ident(expr, name),
            ExprKind::Lit(lit) => Type::Basic(match lit {
                Lit::Int(_) => Basic::UntypedInt,
                Lit::Float(_) => Basic::UntypedFloat,
                Lit::String(_) => Basic::UntypedString,
                Lit::Char(_) => Basic::UntypedRune,
            }),
            ExprKind::FuncLit(lit) => self.check_func_lit(expr.id, lit),
            ExprKind::Composite { ty, elems } => self.check_composite(ty.as_ref(), elems, expected),
            ExprKind::Selector { base, field } => self.check_selector(expr, base, field),
            ExprKind::Index { base, indices } => self.check_index(expr, base, indices),
            ExprKind::Slice { base, lo, hi, max } => {
                let ty = self.check_expr(base, None);
                for bound in [lo, hi, max].into_iter().flatten() {
                    self.check_expr(bound, None);
                }
                match ty {
                    Type::Basic(Basic::UntypedString) => Type::Basic(Basic::String),
                    Type::Array(elem) => Type::Slice(elem),
                    Type::Pointer(inner) => match *inner {
                        Type::Array(elem) => Type::Slice(elem),
                        other => Type::Pointer(Box::new(other)),
                    },
                    other => other,
                }
            }
            ExprKind::TypeAssert { base, ty } => {
                let base_ty = self.check_expr(base, None);
                match ty {
                    Some(ty) => self.resolve_type(ty),
                    None => base_ty,
                }
            }
            ExprKind::Call { func, args, .. } => self.check_call(expr, func, args),
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, expected),
            ExprKind::Binary { op, left, right } => {
                let left = self.check_expr(left, None);
                let right = self.check_expr(right, None);
                if op.is_comparison() {
                    Type::Basic(Basic::Bool)
                } else if matches!(op, BinOp::Shl | BinOp::Shr) || !is_untyped(&left) {
                    left
                } else {
                    right
                }
            }
            ExprKind::Paren(inner) => self.check_expr(inner, expected),
            ExprKind::Type(te) => {
                self.resolve_type(te);
                Type::Unknown
            }
        }
    }

    fn check_ident(&mut self, expr: &Expr, name: &str) -> Type {
        if name == "_" {
            return Type::Unknown;
        }
        let Some(resolved) = self.lookup(name) else {
            return Type::Unknown;
        };
        let ty = self.resolved_type(&resolved);
        self.info.uses.insert(expr.id, resolved);
        ty
    }

    fn resolved_type(&self, resolved: &Resolved) -> Type {
        match resolved {
            Resolved::Binding(id) => self.info.binding(*id).ty.clone(),
            Resolved::Func(func) => self
                .decls
                .func(func)
                .map(|def| Type::Func(Box::new(def.sig.clone())))
                .unwrap_or(Type::Unknown),
            Resolved::Const(ty) => ty.clone(),
            Resolved::Nil => Type::Nil,
            _ => Type::Unknown,
        }
    }

    fn check_func_lit(&mut self, id: NodeId, lit: &FuncLit) -> Type {
        self.owners.push(id);
        self.push_scope();
        let sig = self.declare_signature(&lit.sig);
        self.check_stmts(&lit.body.stmts);
        self.pop_scope();
        self.owners.pop();
        Type::Func(Box::new(sig))
    }

    fn check_composite(
        &mut self,
        ty: Option<&TypeExpr>,
        elems: &[Element],
        expected: Option<&Type>,
    ) -> Type {
        let ty = match ty {
            Some(ty) => self.resolve_type(ty),
            None => match expected {
                Some(Type::Pointer(inner)) => (**inner).clone(),
                Some(other) => other.clone(),
                None => Type::Unknown,
            },
        };
        let underlying = self.decls.underlying(&ty);
        for (idx, elem) in elems.iter().enumerate() {
            match &underlying {
                Type::Struct(fields) => {
                    // Keys of struct literals are field names, not expressions.
                    let field = match &elem.key {
                        Some(key) => {
                            let name = key.as_ident();
                            fields.iter().find(|field| Some(field.name.as_str()) == name)
                        }
                        None => fields.get(idx),
                    };
                    let field_ty = field.map(|field| field.ty.clone());
                    self.check_expr(&elem.value, field_ty.as_ref());
                }
                Type::Map(key_ty, value_ty) => {
                    if let Some(key) = &elem.key {
                        self.check_expr(key, Some(key_ty));
                    }
                    self.check_expr(&elem.value, Some(value_ty));
                }
                Type::Slice(elem_ty) | Type::Array(elem_ty) => {
                    if let Some(key) = &elem.key {
                        self.check_expr(key, None);
                    }
                    self.check_expr(&elem.value, Some(elem_ty));
                }
                _ => {
                    if let Some(key) = &elem.key
                        && key.as_ident().is_none()
                    {
                        self.check_expr(key, None);
                    }
                    self.check_expr(&elem.value, None);
                }
            }
        }
        ty
    }

    fn check_selector(&mut self, expr: &Expr, base: &Expr, field: &Ident) -> Type {
        if let ExprKind::Ident(name) = &base.unparen().kind
            && let Some(Resolved::Package(path)) = self.lookup(name)
        {
            self.info
                .uses
                .insert(base.unparen().id, Resolved::Package(path.clone()));
            let resolved = self
                .decls
                .package_member(&path, &field.name)
                .unwrap_or_else(|| Resolved::Func(FuncRef::func(&path, &field.name)));
            let ty = self.resolved_type(&resolved);
            self.info.uses.insert(expr.id, resolved);
            return ty;
        }
        if self.expr_as_type(base).is_some() {
            // Method expression `T.M`.
            return Type::Unknown;
        }
        let base_ty = self.check_expr(base, None);
        match self.decls.lookup_member(&base_ty, &field.name) {
            Some(Member::Field(ty)) => ty,
            Some(Member::Method { func, sig }) => {
                self.info.uses.insert(
                    expr.id,
                    Resolved::Method {
                        func,
                        recv: base_ty,
                    },
                );
                Type::Func(Box::new(sig))
            }
            None => Type::Unknown,
        }
    }

    fn check_index(&mut self, expr: &Expr, base: &Expr, indices: &[Expr]) -> Type {
        let base_ty = self.check_expr(base, None);
        if let Some(Resolved::Func(func)) = self.info.uses.get(&base.unparen().id).cloned()
            && let Some(def) = self.decls.func(&func)
            && !def.type_params.is_empty()
        {
            // Explicit instantiation `F[int]`.
            let params = def.type_params.clone();
            let sig = def.sig.clone();
            let args: Vec<Type> = indices
                .iter()
                .map(|index| self.expr_as_type(index).unwrap_or(Type::Unknown))
                .collect();
            let subst: BTreeMap<String, Type> = params.into_iter().zip(args).collect();
            self.info.uses.insert(expr.id, Resolved::Func(func));
            return Type::Func(Box::new(sig.substitute(&subst)));
        }
        for index in indices {
            self.check_expr(index, None);
        }
        self.decls.underlying(&base_ty).element()
    }

    fn check_call(&mut self, expr: &Expr, func: &Expr, args: &[Expr]) -> Type {
        if let Some(ty) = self.expr_as_type(func) {
            for arg in args {
                self.check_expr(arg, None);
            }
            return ty;
        }
        if let ExprKind::Ident(name) = &func.unparen().kind
            && let Some(Resolved::Builtin(builtin)) = self.lookup(name)
        {
            self.info
                .uses
                .insert(func.unparen().id, Resolved::Builtin(builtin.clone()));
            return self.check_builtin(&builtin, args);
        }

        let func_ty = self.check_expr(func, None);
        let callee = match self.info.uses.get(&func.unparen().id) {
            Some(Resolved::Func(func)) => Some((func.clone(), None)),
            Some(Resolved::Method { func, recv }) => Some((func.clone(), Some(recv.clone()))),
            _ => None,
        };
        let sig = match self.decls.underlying(&func_ty) {
            Type::Func(sig) => *sig,
            _ => {
                for arg in args {
                    self.check_expr(arg, None);
                }
                if let Some((func, recv)) = callee {
                    let sig = Signature {
                        params: Vec::new(),
                        results: Vec::new(),
                        variadic: false,
                    };
                    self.info.callees.insert(expr.id, Callee { func, recv, sig });
                }
                return Type::Unknown;
            }
        };
        let arg_types: Vec<Type> = args
            .iter()
            .enumerate()
            .map(|(idx, arg)| {
                let expected = sig.param_at(idx);
                self.check_expr(arg, expected.as_ref())
            })
            .collect();
        let sig = infer_type_args(&sig, &arg_types);
        let result = sig.result_type();
        if let Some((func, recv)) = callee {
            self.info.callees.insert(expr.id, Callee { func, recv, sig });
        }
        result
    }

    fn check_builtin(&mut self, name: &str, args: &[Expr]) -> Type {
        let first_as_type = |this: &mut Self| {
            args.first()
                .and_then(|arg| this.expr_as_type(arg))
                .unwrap_or(Type::Unknown)
        };
        match name {
            "new" => Type::pointer(first_as_type(self)),
            "make" => {
                let ty = first_as_type(self);
                for arg in args.iter().skip(1) {
                    self.check_expr(arg, None);
                }
                ty
            }
            _ => {
                let types: Vec<Type> = args.iter().map(|arg| self.check_expr(arg, None)).collect();
                match name {
                    "append" | "min" | "max" => types
                        .into_iter()
                        .next()
                        .map(default_type)
                        .unwrap_or(Type::Unknown),
                    "len" | "cap" | "copy" => Type::Basic(Basic::Int),
                    "real" | "imag" => Type::Basic(Basic::Float64),
                    "complex" => Type::Basic(Basic::Complex128),
                    "recover" => Type::Interface(Vec::new()),
                    _ => Type::Tuple(Vec::new()),
                }
            }
        }
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Expr, expected: Option<&Type>) -> Type {
        match op {
            UnaryOp::Addr => {
                let inner = match expected {
                    Some(Type::Pointer(inner)) => Some((**inner).clone()),
                    _ => None,
                };
                Type::pointer(self.check_expr(operand, inner.as_ref()))
            }
            UnaryOp::Deref => match self.check_expr(operand, None) {
                Type::Pointer(inner) => *inner,
                _ => Type::Unknown,
            },
            UnaryOp::Recv => {
                let ty = self.check_expr(operand, None);
                match self.decls.underlying(&ty) {
                    Type::Chan(_, elem) => *elem,
                    _ => Type::Unknown,
                }
            }
            UnaryOp::Not => {
                self.check_expr(operand, None);
                Type::Basic(Basic::Bool)
            }
            UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot => self.check_expr(operand, expected),
        }
    }
}

fn param_names(params: &[TypeParam]) -> Vec<String> {
    params.iter().map(|param| param.name.name.clone()).collect()
}

// ---------------------------------------------------------------------------
// Type argument inference
// ---------------------------------------------------------------------------

/// Infer type parameters still present in `sig` from argument types.
fn infer_type_args(sig: &Signature, args: &[Type]) -> Signature {
    let mut subst = BTreeMap::new();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(param) = sig.param_at(idx) {
            unify(&param, &default_type(arg.clone()), &mut subst);
        }
    }
    if subst.is_empty() {
        sig.clone()
    } else {
        sig.substitute(&subst)
    }
}

fn unify(param: &Type, arg: &Type, subst: &mut BTreeMap<String, Type>) {
    match (param, arg) {
        (_, Type::Unknown) => {}
        (Type::Param(name), arg) => {
            if !matches!(arg, Type::Param(other) if other == name) {
                subst.entry(name.clone()).or_insert_with(|| arg.clone());
            }
        }
        (Type::Named(p), Type::Named(a)) if p.path == a.path && p.name == a.name => {
            for (p, a) in p.args.iter().zip(&a.args) {
                unify(p, a, subst);
            }
        }
        (Type::Pointer(p), Type::Pointer(a))
        | (Type::Slice(p), Type::Slice(a))
        | (Type::Array(p), Type::Array(a))
        | (Type::Chan(_, p), Type::Chan(_, a)) => unify(p, a, subst),
        (Type::Map(pk, pv), Type::Map(ak, av)) => {
            unify(pk, ak, subst);
            unify(pv, av, subst);
        }
        (Type::Func(p), Type::Func(a)) => {
            for (p, a) in p.params.iter().zip(&a.params) {
                unify(p, a, subst);
            }
            for (p, a) in p.results.iter().zip(&a.results) {
                unify(p, a, subst);
            }
        }
        _ => {}
    }
}
