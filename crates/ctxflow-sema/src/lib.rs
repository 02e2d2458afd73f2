//! Name resolution and expression typing.
//!
//! [`Program`] owns the parsed packages of one analysis session. Checking it
//! produces a [`TypeInfo`]: the binding behind every identifier, the type of
//! every expression that could be typed, and the static callee of every call
//! whose target is a declared function or method. Resolution is best effort;
//! anything that cannot be determined is simply absent, never an error.

mod check;
mod decls;
pub mod index;
mod universe;

use std::collections::BTreeMap;

use ctxflow_ast::{Decl, Expr, FuncDecl, Ident, NodeId, SourceFile, Span, TypeExpr, TypeExprKind};
use ctxflow_types::{FuncRef, Signature, Type, package_name};

pub use index::{FuncIndex, FuncNode};

// ---------------------------------------------------------------------------
// Bindings and resolutions
// ---------------------------------------------------------------------------

/// Identity of a declared variable, parameter or result.
///
/// Two identifiers with the same name that refer to different declarations
/// get different ids, so shadowing never confuses identity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Param,
    Result,
    Receiver,
    Local,
    /// Package-level variable or constant.
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub ty: Type,
    pub kind: BindingKind,
    pub span: Span,
    /// The function declaration or literal that declares this binding.
    /// `None` for package-level variables.
    pub owner: Option<NodeId>,
}

/// What an identifier or selector expression refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Binding(BindingId),
    Func(FuncRef),
    /// A method value `x.M`, with the type of `x`.
    Method { func: FuncRef, recv: Type },
    Package(String),
    Type(Type),
    Builtin(String),
    /// `true`, `false`, `iota`.
    Const(Type),
    Nil,
}

/// The statically known target of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Callee {
    pub func: FuncRef,
    /// Receiver type for method calls, as seen at the call (pointers and type
    /// arguments intact).
    pub recv: Option<Type>,
    /// Signature with receiver and explicit or inferred type arguments
    /// substituted.
    pub sig: Signature,
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

/// One package: its import path, declared name and parsed files.
#[derive(Debug, Clone)]
pub struct Package {
    pub path: String,
    pub name: String,
    pub files: Vec<SourceFile>,
}

/// Location of a function declaration inside the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DeclLoc {
    file: usize,
    decl: usize,
}

/// All packages of an analysis session.
#[derive(Debug, Clone, Default)]
pub struct Program {
    packages: BTreeMap<String, Package>,
    funcs: BTreeMap<FuncRef, (String, DeclLoc)>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the package at `path`.
    pub fn add_package(&mut self, path: impl Into<String>, files: Vec<SourceFile>) {
        let path = path.into();
        let name = files
            .first()
            .map(|file| file.package.name.clone())
            .unwrap_or_else(|| package_name(&path).to_string());
        self.funcs.retain(|_, (pkg, _)| *pkg != path);
        for (file_idx, file) in files.iter().enumerate() {
            for (decl_idx, decl) in file.decls.iter().enumerate() {
                let Decl::Func(func) = decl else {
                    continue;
                };
                let func_ref = match &func.recv {
                    Some(recv) => match receiver_type_name(&recv.ty) {
                        Some((name, _)) => FuncRef::method(&path, name, &func.name.name),
                        None => continue,
                    },
                    None => FuncRef::func(&path, &func.name.name),
                };
                self.funcs.insert(
                    func_ref,
                    (
                        path.clone(),
                        DeclLoc {
                            file: file_idx,
                            decl: decl_idx,
                        },
                    ),
                );
            }
        }
        self.packages
            .insert(path.clone(), Package { path, name, files });
    }

    pub fn package(&self, path: &str) -> Option<&Package> {
        self.packages.get(path)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    /// Find the declaration of a function or method. Package paths must match
    /// exactly; receivers are compared by origin type name.
    pub fn func_decl(&self, func: &FuncRef) -> Option<&FuncDecl> {
        let (path, loc) = self.funcs.get(func)?;
        let file = self.packages.get(path)?.files.get(loc.file)?;
        match file.decls.get(loc.decl)? {
            Decl::Func(decl) => Some(decl),
            _ => None,
        }
    }

    /// Resolve names and types across every package.
    pub fn check(&self) -> TypeInfo {
        check::check_program(self)
    }
}

/// Receiver base type name and its type-parameter names:
/// `*Pool[T]` yields `("Pool", ["T"])`.
pub fn receiver_type_name(ty: &TypeExpr) -> Option<(&str, Vec<&Ident>)> {
    match &ty.kind {
        TypeExprKind::Pointer(inner) => receiver_type_name(inner),
        TypeExprKind::Name { name, args, .. } => {
            let params = args
                .iter()
                .filter_map(|arg| match &arg.kind {
                    TypeExprKind::Name { name, .. } => Some(name),
                    _ => None,
                })
                .collect();
            Some((name.name.as_str(), params))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// TypeInfo
// ---------------------------------------------------------------------------

/// Facts recorded while checking a [`Program`].
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    bindings: Vec<Binding>,
    defs: BTreeMap<NodeId, BindingId>,
    uses: BTreeMap<NodeId, Resolved>,
    types: BTreeMap<NodeId, Type>,
    callees: BTreeMap<NodeId, Callee>,
    type_exprs: BTreeMap<Span, Type>,
}

impl TypeInfo {
    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.0 as usize]
    }

    pub fn bindings(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
        self.bindings
            .iter()
            .enumerate()
            .map(|(idx, binding)| (BindingId(idx as u32), binding))
    }

    /// The binding declared by an identifier (parameter, `:=` target, `var`
    /// name, range variable).
    pub fn def(&self, ident: &Ident) -> Option<BindingId> {
        self.defs.get(&ident.id).copied()
    }

    /// What an identifier or selector expression refers to.
    pub fn resolved(&self, expr: &Expr) -> Option<&Resolved> {
        self.uses.get(&expr.unparen().id)
    }

    /// Resolution recorded for an identifier node that is not an expression,
    /// such as a `:=` target that reassigns an existing variable.
    pub fn ident_use(&self, ident: &Ident) -> Option<&Resolved> {
        self.uses.get(&ident.id)
    }

    /// The variable an expression names, if it is a plain identifier.
    pub fn binding_of(&self, expr: &Expr) -> Option<BindingId> {
        match self.resolved(expr)? {
            Resolved::Binding(id) => Some(*id),
            _ => None,
        }
    }

    /// The variable an assignment target identifier writes to, whether it
    /// declares it or reassigns it.
    pub fn target_binding(&self, ident: &Ident) -> Option<BindingId> {
        self.def(ident).or_else(|| match self.ident_use(ident)? {
            Resolved::Binding(id) => Some(*id),
            _ => None,
        })
    }

    pub fn type_of(&self, expr: &Expr) -> Option<&Type> {
        self.types
            .get(&expr.id)
            .or_else(|| self.types.get(&expr.unparen().id))
    }

    pub fn callee(&self, call: &Expr) -> Option<&Callee> {
        self.callees.get(&call.unparen().id)
    }

    /// The resolved type of a type expression written in a signature or
    /// declaration.
    pub fn type_expr(&self, ty: &TypeExpr) -> Option<&Type> {
        self.type_exprs.get(&ty.span)
    }

    /// Whether the expression denotes a type rather than a value.
    pub fn is_type(&self, expr: &Expr) -> bool {
        matches!(self.resolved(expr), Some(Resolved::Type(_)))
            || matches!(expr.unparen().kind, ctxflow_ast::ExprKind::Type(_))
    }

    fn add_binding(&mut self, binding: Binding) -> BindingId {
        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(binding);
        id
    }

    fn set_binding_type(&mut self, id: BindingId, ty: Type) {
        if let Some(binding) = self.bindings.get_mut(id.0 as usize) {
            binding.ty = ty;
        }
    }
}
