//! Index of every function body in a program.
//!
//! Declarations and function literals share one id space ([`NodeId`]): a
//! declaration is keyed by `FuncDecl::id`, a literal by the id of its `FuncLit`
//! expression. [`Binding::owner`](crate::Binding::owner) uses the same keys, so
//! a binding can be mapped back to the body that declares it.

use std::collections::BTreeMap;

use ctxflow_ast::visit::{self, Visitor};
use ctxflow_ast::{Block, Decl, Expr, FuncDecl, FuncLit, FuncSig, NodeId, Span};

use crate::Program;

/// A function declaration or literal with a body.
#[derive(Debug, Clone, Copy)]
pub struct FuncNode<'a> {
    pub id: NodeId,
    pub sig: &'a FuncSig,
    pub body: &'a Block,
    /// Set for declarations.
    pub decl: Option<&'a FuncDecl>,
    /// The literal expression, for function literals.
    pub lit: Option<&'a Expr>,
    /// Lexically enclosing function, for literals.
    pub parent: Option<NodeId>,
    pub package: &'a str,
    pub span: Span,
}

impl FuncNode<'_> {
    pub fn is_lit(&self) -> bool {
        self.lit.is_some()
    }
}

#[derive(Debug, Default)]
pub struct FuncIndex<'a> {
    nodes: BTreeMap<NodeId, FuncNode<'a>>,
}

impl<'a> FuncIndex<'a> {
    pub fn build(program: &'a Program) -> Self {
        let mut index = FuncIndex::default();
        for package in program.packages() {
            for file in &package.files {
                for decl in &file.decls {
                    match decl {
                        Decl::Func(func) => {
                            let Some(body) = &func.body else {
                                continue;
                            };
                            index.nodes.insert(
                                func.id,
                                FuncNode {
                                    id: func.id,
                                    sig: &func.sig,
                                    body,
                                    decl: Some(func),
                                    lit: None,
                                    parent: None,
                                    package: &package.path,
                                    span: func.span,
                                },
                            );
                            let mut collector = LitCollector {
                                index: &mut index,
                                parents: vec![func.id],
                                package: &package.path,
                            };
                            visit::walk_block(&mut collector, body);
                        }
                        Decl::Var(spec) => {
                            let mut collector = LitCollector {
                                index: &mut index,
                                parents: Vec::new(),
                                package: &package.path,
                            };
                            for value in &spec.values {
                                collector.visit_expr(value);
                            }
                        }
                        Decl::Type(_) => {}
                    }
                }
            }
        }
        index
    }

    pub fn get(&self, id: NodeId) -> Option<&FuncNode<'a>> {
        self.nodes.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FuncNode<'a>> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The top-level declaration containing `id` (itself when `id` is a
    /// declaration).
    pub fn enclosing_decl(&self, id: NodeId) -> Option<&FuncNode<'a>> {
        let mut node = self.nodes.get(&id)?;
        while let Some(parent) = node.parent {
            node = self.nodes.get(&parent)?;
        }
        node.decl.map(|_| node)
    }

    /// Whether `inner` is `outer` or lexically nested inside it.
    pub fn is_within(&self, inner: NodeId, outer: NodeId) -> bool {
        let mut current = Some(inner);
        while let Some(id) = current {
            if id == outer {
                return true;
            }
            current = self.nodes.get(&id).and_then(|node| node.parent);
        }
        false
    }
}

struct LitCollector<'i, 'a> {
    index: &'i mut FuncIndex<'a>,
    parents: Vec<NodeId>,
    package: &'a str,
}

impl<'a> Visitor<'a> for LitCollector<'_, 'a> {
    fn visit_func_lit(&mut self, expr: &'a Expr, lit: &'a FuncLit) {
        self.index.nodes.insert(
            expr.id,
            FuncNode {
                id: expr.id,
                sig: &lit.sig,
                body: &lit.body,
                decl: None,
                lit: Some(expr),
                parent: self.parents.last().copied(),
                package: self.package,
                span: expr.span,
            },
        );
        self.parents.push(expr.id);
        visit::walk_block(self, &lit.body);
        self.parents.pop();
    }
}
