//! Syntax tree definitions and source spans for ctxflow.
//!
//! The tree mirrors the surface of the analyzed language closely: packages,
//! imports, declarations, statements and expressions. Every node carries a
//! [`Span`]; expressions and identifiers additionally carry a [`NodeId`] so
//! later passes can attach resolution and type facts to them.

pub mod visit;

/// Identifies a source file in the analysis session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// A byte offset range within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Self { file, start, end }
    }

    /// Create a span that covers both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        debug_assert_eq!(
            self.file, other.file,
            "cannot merge spans from different files"
        );
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// A synthetic span for generated nodes.
    pub fn synthetic() -> Self {
        Self {
            file: FileId(u32::MAX),
            start: 0,
            end: 0,
        }
    }

    /// Whether `self` lies entirely before `other` in the same file.
    pub fn precedes(self, other: Span) -> bool {
        self.file == other.file && self.start < other.start
    }

    pub fn contains(self, other: Span) -> bool {
        self.file == other.file && self.start <= other.start && other.end <= self.end
    }
}

/// Stable identity of an expression or identifier node.
///
/// Allocated by the parser, unique across every file of a session because it
/// embeds the file id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub file: FileId,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub id: NodeId,
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }
}

// ---------------------------------------------------------------------------
// Files and declarations
// ---------------------------------------------------------------------------

/// A single parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub file: FileId,
    pub package: Ident,
    pub imports: Vec<ImportDecl>,
    pub decls: Vec<Decl>,
    /// Every comment in the file, in source order.
    pub comments: Vec<Comment>,
    pub span: Span,
}

impl SourceFile {
    pub fn funcs(&self) -> impl Iterator<Item = &FuncDecl> {
        self.decls.iter().filter_map(|decl| match decl {
            Decl::Func(func) => Some(func),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Full comment text including the `//` or `/* */` delimiters.
    pub text: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub alias: Option<Ident>,
    pub path: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Func(FuncDecl),
    Type(TypeDecl),
    Var(VarSpec),
}

/// `func [recv] name[T any](params) results { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub id: NodeId,
    pub name: Ident,
    pub recv: Option<Receiver>,
    pub type_params: Vec<TypeParam>,
    pub sig: FuncSig,
    /// `None` for body-less declarations (assembly stubs, dependency stubs).
    pub body: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Receiver {
    pub name: Option<Ident>,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: Ident,
    pub constraint: TypeExpr,
}

/// `type Name[T any] Underlying` or `type Name = Other`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub ty: TypeExpr,
    pub alias: bool,
    pub span: Span,
}

/// `var a, b T = x, y` (also used for `const`).
#[derive(Debug, Clone, PartialEq)]
pub struct VarSpec {
    pub names: Vec<Ident>,
    pub ty: Option<TypeExpr>,
    pub values: Vec<Expr>,
    pub constant: bool,
    pub span: Span,
}

/// A function signature. Parameters stay grouped the way they were written:
/// `func(a, b int, c string)` has two groups.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncSig {
    pub params: Vec<ParamGroup>,
    pub results: Vec<ParamGroup>,
    pub span: Span,
}

impl FuncSig {
    pub fn param_names(&self) -> impl Iterator<Item = &Ident> {
        self.params.iter().flat_map(|group| group.names.iter())
    }
}

/// Several names sharing one declared type. `names` is empty for unnamed
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGroup {
    pub names: Vec<Ident>,
    pub ty: TypeExpr,
    pub variadic: bool,
}

// ---------------------------------------------------------------------------
// Type expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    /// `T`, `pkg.T`, `T[A, B]`.
    Name {
        pkg: Option<Ident>,
        name: Ident,
        args: Vec<TypeExpr>,
    },
    Pointer(Box<TypeExpr>),
    Slice(Box<TypeExpr>),
    Array(Box<TypeExpr>),
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    Chan {
        dir: ChanDir,
        elem: Box<TypeExpr>,
    },
    Func(FuncSig),
    Struct(Vec<FieldDecl>),
    Interface(Vec<InterfaceElem>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Empty for embedded fields.
    pub names: Vec<Ident>,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterfaceElem {
    Method { name: Ident, sig: FuncSig },
    Embed(TypeExpr),
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    /// Any compound operator (`+=`, `|=`, ...). The operator itself is
    /// irrelevant to propagation analysis.
    Compound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeBinding {
    None,
    Define(Vec<Ident>),
    Assign(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `a, b := x, y`
    Define { lhs: Vec<Ident>, rhs: Vec<Expr> },
    /// `a, b = x, y` / `a += x`
    Assign {
        lhs: Vec<Expr>,
        op: AssignOp,
        rhs: Vec<Expr>,
    },
    IncDec { target: Expr, increment: bool },
    Var(VarSpec),
    /// A local `type` declaration.
    Type(TypeDecl),
    Go(Expr),
    Defer(Expr),
    Return(Vec<Expr>),
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        then: Block,
        /// Either a `Block` statement or another `If`.
        els: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Range {
        binding: RangeBinding,
        expr: Expr,
        body: Block,
    },
    Switch {
        init: Option<Box<Stmt>>,
        tag: Option<Expr>,
        clauses: Vec<CaseClause>,
    },
    Select { clauses: Vec<CommClause> },
    Send { chan: Expr, value: Expr },
    Block(Block),
    Labeled { label: Ident, stmt: Box<Stmt> },
    Goto(Ident),
    Break(Option<Ident>),
    Continue(Option<Ident>),
    Fallthrough,
    Empty,
}

/// `case a, b:` or `default:` (empty `exprs`).
#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    pub exprs: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// `case v := <-ch:` / `case ch <- v:` / `default:` (no `comm`).
#[derive(Debug, Clone, PartialEq)]
pub struct CommClause {
    pub comm: Option<Box<Stmt>>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    /// Strip any number of surrounding parentheses.
    pub fn unparen(&self) -> &Expr {
        let mut expr = self;
        while let ExprKind::Paren(inner) = &expr.kind {
            expr = inner;
        }
        expr
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.unparen().kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_func_lit(&self) -> Option<&FuncLit> {
        match &self.unparen().kind {
            ExprKind::FuncLit(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<CallRef<'_>> {
        let expr = self.unparen();
        match &expr.kind {
            ExprKind::Call {
                func,
                args,
                ellipsis,
            } => Some(CallRef {
                expr,
                func,
                args,
                ellipsis: *ellipsis,
            }),
            _ => None,
        }
    }
}

/// Borrowed view of a call expression.
#[derive(Debug, Clone, Copy)]
pub struct CallRef<'a> {
    pub expr: &'a Expr,
    pub func: &'a Expr,
    pub args: &'a [Expr],
    pub ellipsis: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Int(String),
    Float(String),
    String(String),
    Char(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    /// `*x`
    Deref,
    /// `&x`
    Addr,
    /// `<-x`
    Recv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    BitOr,
    BitXor,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    AndNot,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Or
                | BinOp::And
                | BinOp::Eq
                | BinOp::Neq
                | BinOp::Lt
                | BinOp::Lte
                | BinOp::Gt
                | BinOp::Gte
        )
    }
}

/// `func(params) results { body }` used as a value.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncLit {
    pub sig: FuncSig,
    pub body: Block,
}

/// One element of a composite literal: `value` or `key: value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub key: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Ident(String),
    Lit(Lit),
    FuncLit(Box<FuncLit>),
    /// `T{...}`; `ty` is `None` for elided element literals (`{1, 2}` inside
    /// `[]Point{...}`).
    Composite {
        ty: Option<TypeExpr>,
        elems: Vec<Element>,
    },
    Selector {
        base: Box<Expr>,
        field: Ident,
    },
    /// `x[i]`, and also generic instantiation `F[int, string]`.
    Index {
        base: Box<Expr>,
        indices: Vec<Expr>,
    },
    Slice {
        base: Box<Expr>,
        lo: Option<Box<Expr>>,
        hi: Option<Box<Expr>>,
        max: Option<Box<Expr>>,
    },
    /// `x.(T)`; `ty` is `None` for `x.(type)`.
    TypeAssert {
        base: Box<Expr>,
        ty: Option<TypeExpr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        ellipsis: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Paren(Box<Expr>),
    /// A type literal in expression position: `[]byte(s)`, `map[string]int{}`.
    Type(TypeExpr),
}
