//! Value flow facts for closures.
//!
//! This crate sits between name resolution (`ctxflow-sema`) and the propagation
//! checkers. For every function body it records the variables the body
//! captures from enclosing functions (transitively through nested literals),
//! the values it returns, and, per local variable, every value stored into it.
//! Values are a small symbolic language ([`Value`]): closures, variables,
//! declared functions and methods, and calls. Anything else is
//! [`Value::Opaque`].
//!
//! Bodies containing `goto` are not summarized; queries for them fail with
//! [`FlowError::Unsupported`] and callers fall back to syntactic analysis.

use std::collections::{BTreeMap, BTreeSet};

use ctxflow_ast::visit::{self, Visitor};
use ctxflow_ast::{
    AssignOp, Expr, ExprKind, FuncLit, NodeId, RangeBinding, Stmt, StmtKind, UnaryOp,
};
use ctxflow_sema::{BindingId, BindingKind, FuncIndex, FuncNode, Program, Resolved, TypeInfo};
use ctxflow_types::{FuncRef, Type};
use tracing::debug;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Symbolic value of an expression.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    /// A function literal, keyed by its expression id.
    Closure(NodeId),
    /// A variable read.
    Binding(BindingId),
    /// A declared function used as a value.
    Func(FuncRef),
    /// A bound method value `x.M`.
    Method { func: FuncRef, recv: Type },
    /// The result of a call.
    Call {
        node: NodeId,
        func: Box<Value>,
        args: Vec<Value>,
    },
    Opaque,
}

impl Value {
    pub fn is_opaque(&self) -> bool {
        matches!(self, Value::Opaque)
    }
}

/// Compute the symbolic value of an expression.
pub fn value_of(expr: &Expr, info: &TypeInfo) -> Value {
    let expr = expr.unparen();
    match &expr.kind {
        ExprKind::FuncLit(_) => Value::Closure(expr.id),
        ExprKind::Ident(_) | ExprKind::Selector { .. } | ExprKind::Index { .. } => {
            match info.resolved(expr) {
                Some(Resolved::Binding(id)) => Value::Binding(*id),
                Some(Resolved::Func(func)) => Value::Func(func.clone()),
                Some(Resolved::Method { func, recv }) => Value::Method {
                    func: func.clone(),
                    recv: recv.clone(),
                },
                _ => Value::Opaque,
            }
        }
        ExprKind::Call { func, args, .. } => {
            if info.is_type(func) {
                // Conversions keep the converted value.
                return args
                    .first()
                    .map(|arg| value_of(arg, info))
                    .unwrap_or(Value::Opaque);
            }
            if matches!(info.resolved(func), Some(Resolved::Builtin(_))) {
                return Value::Opaque;
            }
            Value::Call {
                node: expr.id,
                func: Box::new(value_of(func, info)),
                args: args.iter().map(|arg| value_of(arg, info)).collect(),
            }
        }
        _ => Value::Opaque,
    }
}

// ---------------------------------------------------------------------------
// Flow program
// ---------------------------------------------------------------------------

/// A variable read inside a function but declared outside it.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeVar {
    pub binding: BindingId,
    pub name: String,
    pub ty: Type,
}

/// Flow summary of one function declaration or literal.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowFunction {
    pub node: NodeId,
    pub parent: Option<NodeId>,
    /// Literals declared directly inside this body.
    pub children: Vec<NodeId>,
    pub params: Vec<BindingId>,
    /// Captured variables, including those captured by nested literals. Package
    /// variables are not captures.
    pub free_vars: Vec<FreeVar>,
    /// Values of every `return` statement of this body (not of nested
    /// literals), flattened.
    pub returns: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("function {node:?} is not summarized: {reason}")]
    Unsupported { node: NodeId, reason: &'static str },
    #[error("no function body for {0:?}")]
    Missing(NodeId),
}

#[derive(Debug, Default)]
pub struct FlowProgram {
    functions: BTreeMap<NodeId, FlowFunction>,
    stores: BTreeMap<BindingId, Vec<Value>>,
    unsupported: BTreeMap<NodeId, &'static str>,
}

impl FlowProgram {
    pub fn build(program: &Program, index: &FuncIndex<'_>, info: &TypeInfo) -> Self {
        let mut flow = FlowProgram::default();

        // Stores are collected per top-level body so writes from nested
        // literals are seen by the variables they write.
        for node in index.iter().filter(|node| node.parent.is_none()) {
            let mut stores = StoreCollector {
                info,
                stores: &mut flow.stores,
                has_goto: false,
            };
            match node.lit {
                Some(lit) => stores.visit_expr(lit),
                None => visit::walk_block(&mut stores, node.body),
            }
            if stores.has_goto {
                flow.unsupported.insert(node.id, "goto");
            }
        }
        for package in program.packages() {
            for file in &package.files {
                for spec in file.decls.iter().filter_map(|decl| match decl {
                    ctxflow_ast::Decl::Var(spec) => Some(spec),
                    _ => None,
                }) {
                    record_define(
                        info,
                        &mut flow.stores,
                        spec.names.iter().map(|name| info.target_binding(name)),
                        &spec.values,
                    );
                }
            }
        }

        for node in index.iter() {
            let summary = summarize(node, index, info);
            flow.functions.insert(node.id, summary);
        }
        debug!(
            functions = flow.functions.len(),
            stores = flow.stores.len(),
            unsupported = flow.unsupported.len(),
            "built flow program"
        );
        flow
    }

    /// The summary of function `node`, or why there is none.
    pub fn function(&self, node: NodeId, index: &FuncIndex<'_>) -> Result<&FlowFunction, FlowError> {
        let root = index
            .iter()
            .find(|candidate| candidate.parent.is_none() && index.is_within(node, candidate.id))
            .map(|root| root.id)
            .unwrap_or(node);
        if let Some(reason) = self.unsupported.get(&root) {
            return Err(FlowError::Unsupported {
                node,
                reason: *reason,
            });
        }
        self.functions.get(&node).ok_or(FlowError::Missing(node))
    }

    /// Every value stored into `binding`, including its initializer.
    pub fn stores(&self, binding: BindingId) -> &[Value] {
        self.stores.get(&binding).map_or(&[], Vec::as_slice)
    }

    /// The single value of a variable assigned exactly once.
    pub fn single_store(&self, binding: BindingId) -> Option<&Value> {
        match self.stores(binding) {
            [value] => Some(value),
            _ => None,
        }
    }
}

fn summarize(node: &FuncNode<'_>, index: &FuncIndex<'_>, info: &TypeInfo) -> FlowFunction {
    let params = node
        .sig
        .param_names()
        .filter_map(|name| info.def(name))
        .collect();

    let children = index
        .iter()
        .filter(|child| child.parent == Some(node.id))
        .map(|child| child.id)
        .collect();

    let mut uses = UseCollector {
        info,
        seen: BTreeSet::new(),
    };
    visit::walk_block(&mut uses, node.body);
    let free_vars = uses
        .seen
        .into_iter()
        .filter_map(|id| {
            let binding = info.binding(id);
            let owner = binding.owner?;
            if binding.kind == BindingKind::Global || index.is_within(owner, node.id) {
                return None;
            }
            Some(FreeVar {
                binding: id,
                name: binding.name.clone(),
                ty: binding.ty.clone(),
            })
        })
        .collect();

    let named_results: Vec<BindingId> = node
        .sig
        .results
        .iter()
        .flat_map(|group| group.names.iter())
        .filter_map(|name| info.def(name))
        .collect();
    let mut returns = ReturnCollector {
        info,
        named_results: &named_results,
        returns: Vec::new(),
    };
    visit::walk_block(&mut returns, node.body);

    FlowFunction {
        node: node.id,
        parent: node.parent,
        children,
        params,
        free_vars,
        returns: returns.returns,
    }
}

// ---------------------------------------------------------------------------
// Collectors
// ---------------------------------------------------------------------------

/// Variables read (or reassigned) anywhere in a body, nested literals
/// included.
struct UseCollector<'i> {
    info: &'i TypeInfo,
    seen: BTreeSet<BindingId>,
}

impl<'a> Visitor<'a> for UseCollector<'_> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Define { lhs, .. } => {
                for ident in lhs {
                    if let Some(Resolved::Binding(id)) = self.info.ident_use(ident) {
                        self.seen.insert(*id);
                    }
                }
            }
            StmtKind::Range {
                binding: RangeBinding::Define(names),
                ..
            } => {
                for ident in names {
                    if let Some(Resolved::Binding(id)) = self.info.ident_use(ident) {
                        self.seen.insert(*id);
                    }
                }
            }
            _ => {}
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        if let ExprKind::Ident(_) = expr.kind
            && let Some(id) = self.info.binding_of(expr)
        {
            self.seen.insert(id);
        }
        visit::walk_expr(self, expr);
    }
}

/// `return` values of one body, skipping nested literals.
struct ReturnCollector<'i> {
    info: &'i TypeInfo,
    named_results: &'i [BindingId],
    returns: Vec<Value>,
}

impl<'a> Visitor<'a> for ReturnCollector<'_> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        if let StmtKind::Return(values) = &stmt.kind {
            if values.is_empty() {
                self.returns
                    .extend(self.named_results.iter().map(|id| Value::Binding(*id)));
            } else {
                self.returns
                    .extend(values.iter().map(|value| value_of(value, self.info)));
            }
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_func_lit(&mut self, _expr: &'a Expr, _lit: &'a FuncLit) {}
}

/// Stores into variables anywhere in a body, nested literals included.
struct StoreCollector<'i> {
    info: &'i TypeInfo,
    stores: &'i mut BTreeMap<BindingId, Vec<Value>>,
    has_goto: bool,
}

impl StoreCollector<'_> {
    fn store(&mut self, target: Option<BindingId>, value: Value) {
        if let Some(target) = target {
            self.stores.entry(target).or_default().push(value);
        }
    }

    fn target_of(&self, expr: &Expr) -> Option<BindingId> {
        match expr.unparen().kind {
            ExprKind::Ident(_) => self.info.binding_of(expr),
            _ => None,
        }
    }
}

fn record_define(
    info: &TypeInfo,
    stores: &mut BTreeMap<BindingId, Vec<Value>>,
    targets: impl Iterator<Item = Option<BindingId>>,
    values: &[Expr],
) {
    let targets: Vec<_> = targets.collect();
    let paired = targets.len() == values.len();
    for (idx, target) in targets.into_iter().enumerate() {
        let Some(target) = target else {
            continue;
        };
        let value = if paired {
            value_of(&values[idx], info)
        } else if values.is_empty() {
            // `var x T` starts at the zero value.
            continue;
        } else {
            Value::Opaque
        };
        stores.entry(target).or_default().push(value);
    }
}

impl<'a> Visitor<'a> for StoreCollector<'_> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Define { lhs, rhs } => {
                let targets = lhs.iter().map(|ident| self.info.target_binding(ident));
                record_define(self.info, self.stores, targets, rhs);
            }
            StmtKind::Var(spec) => {
                let targets = spec.names.iter().map(|ident| self.info.target_binding(ident));
                record_define(self.info, self.stores, targets, &spec.values);
            }
            StmtKind::Assign { lhs, op, rhs } => {
                let paired = lhs.len() == rhs.len() && *op == AssignOp::Assign;
                for (idx, target) in lhs.iter().enumerate() {
                    let value = if paired {
                        value_of(&rhs[idx], self.info)
                    } else {
                        Value::Opaque
                    };
                    let target = self.target_of(target);
                    self.store(target, value);
                }
            }
            StmtKind::IncDec { target, .. } => {
                let target = self.target_of(target);
                self.store(target, Value::Opaque);
            }
            StmtKind::Range { binding, .. } => match binding {
                RangeBinding::Define(names) => {
                    for name in names {
                        let target = self.info.target_binding(name);
                        self.store(target, Value::Opaque);
                    }
                }
                RangeBinding::Assign(targets) => {
                    for target in targets {
                        let target = self.target_of(target);
                        self.store(target, Value::Opaque);
                    }
                }
                RangeBinding::None => {}
            },
            StmtKind::Switch {
                init: Some(init), ..
            } => {
                // Type switch guards bind a fresh variable per clause.
                if let StmtKind::Define { lhs, rhs } = &init.kind
                    && matches!(
                        rhs.first().map(|expr| &expr.unparen().kind),
                        Some(ExprKind::TypeAssert { ty: None, .. })
                    )
                {
                    for ident in lhs {
                        let target = self.info.target_binding(ident);
                        self.store(target, Value::Opaque);
                    }
                    for clause in stmt_clauses(stmt) {
                        for stmt in clause {
                            self.visit_stmt(stmt);
                        }
                    }
                    return;
                }
            }
            StmtKind::Goto(_) => self.has_goto = true,
            _ => {}
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        if let ExprKind::Unary {
            op: UnaryOp::Addr,
            operand,
        } = &expr.kind
        {
            // Address-taken variables can be written through the pointer.
            let target = self.target_of(operand);
            self.store(target, Value::Opaque);
        }
        visit::walk_expr(self, expr);
    }
}

fn stmt_clauses(stmt: &Stmt) -> impl Iterator<Item = &Vec<Stmt>> {
    let clauses = match &stmt.kind {
        StmtKind::Switch { clauses, .. } => clauses.as_slice(),
        _ => &[],
    };
    clauses.iter().map(|clause| &clause.body)
}

#[cfg(test)]
mod tests {
    use ctxflow_ast::FileId;
    use ctxflow_syntax::parse_source;

    use super::*;

    const CONTEXT: &str = "package context\ntype Context interface{}\nfunc Background() Context\n";

    fn load(source: &str) -> Program {
        let mut program = Program::new();
        program.add_package("context", vec![parse_source(CONTEXT, FileId(0)).expect("parse")]);
        program.add_package(
            "example.com/app",
            vec![parse_source(source, FileId(1)).expect("parse")],
        );
        program
    }

    fn lits<'a>(index: &'a FuncIndex<'a>) -> Vec<&'a FuncNode<'a>> {
        index.iter().filter(|node| node.is_lit()).collect()
    }

    fn free_names(flow: &FlowProgram, index: &FuncIndex<'_>, node: NodeId) -> Vec<String> {
        flow.function(node, index)
            .expect("summary")
            .free_vars
            .iter()
            .map(|var| var.name.clone())
            .collect()
    }

    #[test]
    fn nested_captures_are_free_in_outer_literal() {
        let program = load(
            "package app\nimport \"context\"\nfunc run(ctx context.Context, n int) {\n\tgo func() {\n\t\tlocal := 1\n\t\tfunc() { _ = ctx; _ = local }()\n\t}()\n}\n",
        );
        let info = program.check();
        let index = FuncIndex::build(&program);
        let flow = FlowProgram::build(&program, &index, &info);

        let lits = lits(&index);
        let outer = lits.iter().find(|node| node.parent.is_some_and(|p| index.get(p).is_some_and(|p| !p.is_lit()))).expect("outer");
        let inner = lits.iter().find(|node| node.parent == Some(outer.id)).expect("inner");

        insta::assert_debug_snapshot!(free_names(&flow, &index, outer.id), @r#"
        [
            "ctx",
        ]
        "#);
        let mut inner_free = free_names(&flow, &index, inner.id);
        inner_free.sort();
        assert_eq!(inner_free, vec!["ctx", "local"]);
    }

    #[test]
    fn factory_returns_are_recorded() {
        let program = load(
            "package app\nimport \"context\"\nfunc factory(ctx context.Context) func() {\n\treturn func() { _ = ctx }\n}\nfunc run(ctx context.Context) {\n\tgo factory(ctx)()\n}\n",
        );
        let info = program.check();
        let index = FuncIndex::build(&program);
        let flow = FlowProgram::build(&program, &index, &info);
        let factory = program
            .func_decl(&FuncRef::func("example.com/app", "factory"))
            .expect("factory");
        let summary = flow.function(factory.id, &index).expect("summary");
        assert!(matches!(summary.returns.as_slice(), [Value::Closure(_)]));
        assert_eq!(summary.params.len(), 1);
    }

    #[test]
    fn stores_distinguish_single_and_multiple_assignment() {
        let program = load(
            "package app\nfunc run() {\n\tonce := func() {}\n\ttwice := func() {}\n\ttwice = func() {}\n\tvar zero func()\n\tzero = once\n\t_, _ = once, twice\n\tgo zero()\n}\n",
        );
        let info = program.check();
        let index = FuncIndex::build(&program);
        let flow = FlowProgram::build(&program, &index, &info);
        let by_name = |name: &str| {
            info.bindings()
                .find(|(_, binding)| binding.name == name)
                .map(|(id, _)| id)
                .expect("binding")
        };
        assert!(matches!(flow.single_store(by_name("once")), Some(Value::Closure(_))));
        assert_eq!(flow.stores(by_name("twice")).len(), 2);
        assert_eq!(
            flow.single_store(by_name("zero")),
            Some(&Value::Binding(by_name("once")))
        );
    }

    #[test]
    fn goto_makes_bodies_unsupported() {
        let program = load(
            "package app\nfunc run() {\nretry:\n\tgo func() {}()\n\tgoto retry\n}\n",
        );
        let info = program.check();
        let index = FuncIndex::build(&program);
        let flow = FlowProgram::build(&program, &index, &info);
        let lit = lits(&index)[0].id;
        assert!(matches!(
            flow.function(lit, &index),
            Err(FlowError::Unsupported { reason: "goto", .. })
        ));
    }
}
