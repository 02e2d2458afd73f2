//! Recursive descent parser with precedence climbing for binary operators.

use ctxflow_ast::*;
use ctxflow_diag::{Category, Diagnostic, SourceLocation};

use crate::token::{Token, TokenKind, Trivia};

/// Parse a whole source file from a token stream.
pub fn parse_file(
    tokens: Vec<Token>,
    comments: Vec<Trivia>,
    file: FileId,
) -> Result<SourceFile, Vec<Diagnostic>> {
    let mut parser = Parser::new(tokens, file);
    let source_file = parser.source_file(comments);
    if parser.errors.is_empty() {
        source_file.ok_or_else(|| {
            vec![Diagnostic::error(Category::Syntax, "expected package clause")]
        })
    } else {
        Err(parser.errors)
    }
}

/// Parse a standalone expression from a token stream.
pub fn parse_expr(tokens: Vec<Token>, file: FileId) -> Result<Expr, Vec<Diagnostic>> {
    let mut parser = Parser::new(tokens, file);
    let expr = parser.expression();
    parser.skip_semis();
    if !parser.at_eof() {
        parser.error_at_current("unexpected token after expression");
    }
    if parser.errors.is_empty() {
        expr.ok_or_else(|| vec![Diagnostic::error(Category::Syntax, "expected expression")])
    } else {
        Err(parser.errors)
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: FileId,
    errors: Vec<Diagnostic>,
    next_node: u32,
    /// Nesting level used to decide whether `Name {` starts a composite
    /// literal. Negative inside `if`/`for`/`switch` headers, where the brace
    /// opens the statement body instead.
    expr_level: i32,
}

/// A parsed parameter entry before names are grouped with their types.
struct ParamEntry {
    name: Option<Ident>,
    ty: TypeExpr,
    variadic: bool,
}

impl Parser {
    fn new(tokens: Vec<Token>, file: FileId) -> Self {
        Self {
            tokens,
            pos: 0,
            file,
            errors: Vec::new(),
            next_node: 0,
            expr_level: 0,
        }
    }

    fn next_id(&mut self) -> NodeId {
        let id = NodeId {
            file: self.file,
            index: self.next_node,
        };
        self.next_node += 1;
        id
    }

    fn mk_expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.next_id(),
            kind,
            span,
        }
    }

    // -- File-level parsing --

    fn source_file(&mut self, comments: Vec<Trivia>) -> Option<SourceFile> {
        let start = self.current_span();
        self.skip_semis();
        self.expect(&TokenKind::Package, "expected 'package' clause")?;
        let package = self.expect_ident("expected package name")?;
        self.expect_semi();

        let mut imports = Vec::new();
        while self.check(&TokenKind::Import) {
            self.advance();
            if self.match_token(&TokenKind::LParen) {
                while !self.check(&TokenKind::RParen) && !self.at_eof() {
                    if self.match_token(&TokenKind::Semi) {
                        continue;
                    }
                    match self.import_spec() {
                        Some(spec) => imports.push(spec),
                        None => self.recover_to_semi(),
                    }
                }
                self.expect(&TokenKind::RParen, "expected ')' after import group");
            } else if let Some(spec) = self.import_spec() {
                imports.push(spec);
            }
            self.expect_semi();
        }

        let mut decls = Vec::new();
        while !self.at_eof() {
            if self.match_token(&TokenKind::Semi) {
                continue;
            }
            let before = self.pos;
            match self.top_level_decl(&mut decls) {
                Some(()) => self.expect_semi(),
                None => {
                    if self.pos == before {
                        self.advance();
                    }
                    self.recover_to_semi();
                }
            }
        }

        let end = self.current_span();
        Some(SourceFile {
            file: self.file,
            package,
            imports,
            decls,
            comments: comments
                .into_iter()
                .map(|trivia| Comment {
                    text: trivia.text,
                    span: trivia.span,
                })
                .collect(),
            span: start.merge(end),
        })
    }

    fn import_spec(&mut self) -> Option<ImportDecl> {
        let start = self.current_span();
        let alias = match self.peek_kind() {
            Some(TokenKind::Ident(_)) => self.expect_ident("expected import alias"),
            Some(TokenKind::Dot) => {
                let tok = self.advance();
                let id = self.next_id();
                Some(Ident {
                    id,
                    name: ".".to_string(),
                    span: tok.span,
                })
            }
            _ => None,
        };
        let Some(TokenKind::String(path)) = self.peek_kind().cloned() else {
            self.error_at_current("expected import path string");
            return None;
        };
        let tok = self.advance();
        Some(ImportDecl {
            alias,
            path,
            span: start.merge(tok.span),
        })
    }

    fn top_level_decl(&mut self, decls: &mut Vec<Decl>) -> Option<()> {
        match self.peek_kind() {
            Some(TokenKind::Func) => {
                let decl = self.func_decl()?;
                decls.push(Decl::Func(decl));
            }
            Some(TokenKind::Type) => {
                self.advance();
                for decl in self.grouped(Self::type_spec)? {
                    decls.push(Decl::Type(decl));
                }
            }
            Some(TokenKind::Var) | Some(TokenKind::Const) => {
                let constant = self.check(&TokenKind::Const);
                self.advance();
                for spec in self.grouped(|p| p.var_spec(constant))? {
                    decls.push(Decl::Var(spec));
                }
            }
            _ => {
                self.error_at_current("expected declaration (func, type, var, or const)");
                return None;
            }
        }
        Some(())
    }

    /// Parse either a single spec or a parenthesized group of specs.
    fn grouped<T>(&mut self, mut spec: impl FnMut(&mut Self) -> Option<T>) -> Option<Vec<T>> {
        if !self.match_token(&TokenKind::LParen) {
            return spec(self).map(|item| vec![item]);
        }
        let mut items = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.at_eof() {
            if self.match_token(&TokenKind::Semi) {
                continue;
            }
            match spec(self) {
                Some(item) => items.push(item),
                None => self.recover_to_semi(),
            }
        }
        self.expect(&TokenKind::RParen, "expected ')' to close declaration group")?;
        Some(items)
    }

    fn func_decl(&mut self) -> Option<FuncDecl> {
        let start = self.expect(&TokenKind::Func, "expected 'func'")?.span;
        let recv = if self.check(&TokenKind::LParen) {
            Some(self.receiver()?)
        } else {
            None
        };
        let name = self.expect_ident("expected function name")?;
        let type_params = if self.check(&TokenKind::LBracket) {
            self.type_params()?
        } else {
            Vec::new()
        };
        let sig = self.signature()?;
        let body = if self.check(&TokenKind::LBrace) {
            Some(self.with_expr_level(0, |p| p.block())?)
        } else {
            None
        };
        let end = body.as_ref().map_or(sig.span, |block| block.span);
        Some(FuncDecl {
            id: self.next_id(),
            name,
            recv,
            type_params,
            sig,
            body,
            span: start.merge(end),
        })
    }

    fn receiver(&mut self) -> Option<Receiver> {
        let start = self.expect(&TokenKind::LParen, "expected '(' before receiver")?.span;
        let named = matches!(self.peek_kind(), Some(TokenKind::Ident(_)))
            && !self.peek_is(|kind| {
                matches!(
                    kind,
                    TokenKind::RParen | TokenKind::Dot | TokenKind::LBracket
                )
            });
        let name = if named {
            self.expect_ident("expected receiver name")
        } else {
            None
        };
        let ty = self.type_expr()?;
        let end = self.expect(&TokenKind::RParen, "expected ')' after receiver")?.span;
        Some(Receiver {
            name,
            ty,
            span: start.merge(end),
        })
    }

    fn type_params(&mut self) -> Option<Vec<TypeParam>> {
        self.expect(&TokenKind::LBracket, "expected '['")?;
        let mut params = Vec::new();
        loop {
            let mut names = vec![self.expect_ident("expected type parameter name")?];
            while self.match_token(&TokenKind::Comma) {
                names.push(self.expect_ident("expected type parameter name")?);
            }
            let constraint = self.constraint()?;
            for name in names {
                params.push(TypeParam {
                    name,
                    constraint: constraint.clone(),
                });
            }
            if !self.match_token(&TokenKind::Comma) || self.check(&TokenKind::RBracket) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "expected ']' after type parameters")?;
        Some(params)
    }

    /// `any`, `comparable`, `~int | ~string`, `interface{ ... }`.
    fn constraint(&mut self) -> Option<TypeExpr> {
        self.match_token(&TokenKind::Tilde);
        let first = self.type_expr()?;
        let mut span = first.span;
        let mut union = false;
        while self.match_token(&TokenKind::Pipe) {
            union = true;
            self.match_token(&TokenKind::Tilde);
            span = span.merge(self.type_expr()?.span);
        }
        if union {
            Some(TypeExpr {
                kind: TypeExprKind::Interface(Vec::new()),
                span,
            })
        } else {
            Some(first)
        }
    }

    fn type_spec(&mut self) -> Option<TypeDecl> {
        let name = self.expect_ident("expected type name")?;
        // `type T[P any] ...` vs `type T [N]int`: a type parameter list starts
        // with `[ident` followed by a constraint or a comma.
        let type_params = if self.check(&TokenKind::LBracket)
            && matches!(
                self.peek_at(1).map(|t| &t.kind),
                Some(TokenKind::Ident(_))
            )
            && !matches!(self.peek_at(2).map(|t| &t.kind), Some(TokenKind::RBracket))
        {
            self.type_params()?
        } else {
            Vec::new()
        };
        let alias = self.match_token(&TokenKind::Eq);
        let ty = self.type_expr()?;
        Some(TypeDecl {
            span: name.span.merge(ty.span),
            name,
            type_params,
            ty,
            alias,
        })
    }

    fn var_spec(&mut self, constant: bool) -> Option<VarSpec> {
        let first = self.expect_ident("expected variable name")?;
        let start = first.span;
        let mut names = vec![first];
        while self.match_token(&TokenKind::Comma) {
            names.push(self.expect_ident("expected variable name")?);
        }
        let ty = if !self.check(&TokenKind::Eq)
            && !self.check(&TokenKind::Semi)
            && !self.check(&TokenKind::RParen)
        {
            Some(self.type_expr()?)
        } else {
            None
        };
        let values = if self.match_token(&TokenKind::Eq) {
            self.expr_list()?
        } else {
            Vec::new()
        };
        let mut span = start;
        if let Some(ty) = &ty {
            span = span.merge(ty.span);
        }
        if let Some(last) = values.last() {
            span = span.merge(last.span);
        }
        Some(VarSpec {
            names,
            ty,
            values,
            constant,
            span,
        })
    }

    // -- Signatures and types --

    fn signature(&mut self) -> Option<FuncSig> {
        let start = self.current_span();
        let params = self.parameters()?;
        let mut end = self.previous_span();
        let results = if self.check(&TokenKind::LParen) {
            let results = self.parameters()?;
            end = self.previous_span();
            results
        } else if self.starts_type() {
            let ty = self.type_expr()?;
            end = ty.span;
            vec![ParamGroup {
                names: Vec::new(),
                ty,
                variadic: false,
            }]
        } else {
            Vec::new()
        };
        Some(FuncSig {
            params,
            results,
            span: start.merge(end),
        })
    }

    fn parameters(&mut self) -> Option<Vec<ParamGroup>> {
        self.expect(&TokenKind::LParen, "expected '(' to start parameter list")?;
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.at_eof() {
            entries.push(self.param_entry()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "expected ')' to close parameter list")?;
        self.group_params(entries)
    }

    fn param_entry(&mut self) -> Option<ParamEntry> {
        if self.match_token(&TokenKind::Ellipsis) {
            return Some(ParamEntry {
                name: None,
                ty: self.type_expr()?,
                variadic: true,
            });
        }
        let first = self.type_expr()?;
        if self.check(&TokenKind::Comma) || self.check(&TokenKind::RParen) {
            return Some(ParamEntry {
                name: None,
                ty: first,
                variadic: false,
            });
        }
        let Some(name) = simple_type_name(&first) else {
            self.error_at_current("expected ',' or ')' after parameter type");
            return None;
        };
        let variadic = self.match_token(&TokenKind::Ellipsis);
        let ty = self.type_expr()?;
        Some(ParamEntry {
            name: Some(name),
            ty,
            variadic,
        })
    }

    /// Group `a, b int, c string` into `[a b] int`, `[c] string`.
    fn group_params(&mut self, entries: Vec<ParamEntry>) -> Option<Vec<ParamGroup>> {
        if entries.iter().all(|entry| entry.name.is_none()) {
            return Some(
                entries
                    .into_iter()
                    .map(|entry| ParamGroup {
                        names: Vec::new(),
                        ty: entry.ty,
                        variadic: entry.variadic,
                    })
                    .collect(),
            );
        }
        let mut groups = Vec::new();
        let mut pending = Vec::new();
        for entry in entries {
            match entry.name {
                Some(name) => {
                    pending.push(name);
                    groups.push(ParamGroup {
                        names: std::mem::take(&mut pending),
                        ty: entry.ty,
                        variadic: entry.variadic,
                    });
                }
                None => match simple_type_name(&entry.ty) {
                    Some(name) => pending.push(name),
                    None => {
                        self.error_at_span(entry.ty.span, "mixed named and unnamed parameters");
                        return None;
                    }
                },
            }
        }
        if let Some(name) = pending.first() {
            let span = name.span;
            self.error_at_span(span, "missing parameter type");
            return None;
        }
        Some(groups)
    }

    fn starts_type(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(
                TokenKind::Ident(_)
                    | TokenKind::Star
                    | TokenKind::LBracket
                    | TokenKind::Map
                    | TokenKind::Chan
                    | TokenKind::Arrow
                    | TokenKind::Func
                    | TokenKind::Struct
                    | TokenKind::Interface
                    | TokenKind::LParen
            )
        )
    }

    fn type_expr(&mut self) -> Option<TypeExpr> {
        let start = self.current_span();
        let kind = match self.peek_kind() {
            Some(TokenKind::Ident(_)) => return self.type_name(),
            Some(TokenKind::Star) => {
                self.advance();
                TypeExprKind::Pointer(Box::new(self.type_expr()?))
            }
            Some(TokenKind::LBracket) => {
                self.advance();
                if self.match_token(&TokenKind::RBracket) {
                    TypeExprKind::Slice(Box::new(self.type_expr()?))
                } else {
                    if !self.match_token(&TokenKind::Ellipsis) {
                        self.with_expr_level(self.expr_level + 1, |p| p.expression())?;
                    }
                    self.expect(&TokenKind::RBracket, "expected ']' after array length")?;
                    TypeExprKind::Array(Box::new(self.type_expr()?))
                }
            }
            Some(TokenKind::Map) => {
                self.advance();
                self.expect(&TokenKind::LBracket, "expected '[' after 'map'")?;
                let key = self.type_expr()?;
                self.expect(&TokenKind::RBracket, "expected ']' after map key type")?;
                let value = self.type_expr()?;
                TypeExprKind::Map {
                    key: Box::new(key),
                    value: Box::new(value),
                }
            }
            Some(TokenKind::Chan) => {
                self.advance();
                let dir = if self.match_token(&TokenKind::Arrow) {
                    ChanDir::Send
                } else {
                    ChanDir::Both
                };
                TypeExprKind::Chan {
                    dir,
                    elem: Box::new(self.type_expr()?),
                }
            }
            Some(TokenKind::Arrow) => {
                self.advance();
                self.expect(&TokenKind::Chan, "expected 'chan' after '<-'")?;
                TypeExprKind::Chan {
                    dir: ChanDir::Recv,
                    elem: Box::new(self.type_expr()?),
                }
            }
            Some(TokenKind::Func) => {
                self.advance();
                TypeExprKind::Func(self.signature()?)
            }
            Some(TokenKind::Struct) => {
                self.advance();
                TypeExprKind::Struct(self.struct_fields()?)
            }
            Some(TokenKind::Interface) => {
                self.advance();
                TypeExprKind::Interface(self.interface_elems()?)
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let inner = self.type_expr()?;
                self.expect(&TokenKind::RParen, "expected ')' after type")?;
                return Some(inner);
            }
            _ => {
                self.error_at_current("expected type");
                return None;
            }
        };
        Some(TypeExpr {
            kind,
            span: start.merge(self.previous_span()),
        })
    }

    fn type_name(&mut self) -> Option<TypeExpr> {
        let first = self.expect_ident("expected type name")?;
        let start = first.span;
        let (pkg, name) = if self.check(&TokenKind::Dot) {
            self.advance();
            let name = self.expect_ident("expected type name after '.'")?;
            (Some(first), name)
        } else {
            (None, first)
        };
        let mut args = Vec::new();
        // `name []T` in a parameter list is a name followed by a slice type.
        if self.check(&TokenKind::LBracket) && !self.peek_is(|kind| *kind == TokenKind::RBracket) {
            self.advance();
            loop {
                args.push(self.type_expr()?);
                if !self.match_token(&TokenKind::Comma) || self.check(&TokenKind::RBracket) {
                    break;
                }
            }
            self.expect(&TokenKind::RBracket, "expected ']' after type arguments")?;
        }
        Some(TypeExpr {
            kind: TypeExprKind::Name { pkg, name, args },
            span: start.merge(self.previous_span()),
        })
    }

    fn struct_fields(&mut self) -> Option<Vec<FieldDecl>> {
        self.expect(&TokenKind::LBrace, "expected '{' after 'struct'")?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            if self.match_token(&TokenKind::Semi) {
                continue;
            }
            let embedded = match self.peek_kind() {
                Some(TokenKind::Star) => true,
                Some(TokenKind::Ident(_)) => self.peek_is(|kind| {
                    matches!(
                        kind,
                        TokenKind::Dot | TokenKind::Semi | TokenKind::RBrace | TokenKind::String(_)
                    )
                }),
                _ => false,
            };
            let field = if embedded {
                FieldDecl {
                    names: Vec::new(),
                    ty: self.type_expr()?,
                }
            } else {
                let mut names = vec![self.expect_ident("expected field name")?];
                while self.match_token(&TokenKind::Comma) {
                    names.push(self.expect_ident("expected field name")?);
                }
                FieldDecl {
                    names,
                    ty: self.type_expr()?,
                }
            };
            // Struct tags carry no meaning for the analysis.
            if matches!(self.peek_kind(), Some(TokenKind::String(_))) {
                self.advance();
            }
            fields.push(field);
            if !self.check(&TokenKind::RBrace) {
                self.expect_semi();
            }
        }
        self.expect(&TokenKind::RBrace, "expected '}' to close struct")?;
        Some(fields)
    }

    fn interface_elems(&mut self) -> Option<Vec<InterfaceElem>> {
        self.expect(&TokenKind::LBrace, "expected '{' after 'interface'")?;
        let mut elems = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            if self.match_token(&TokenKind::Semi) {
                continue;
            }
            let is_method = matches!(self.peek_kind(), Some(TokenKind::Ident(_)))
                && self.peek_is(|kind| matches!(kind, TokenKind::LParen));
            if is_method {
                let name = self.expect_ident("expected method name")?;
                let sig = self.signature()?;
                elems.push(InterfaceElem::Method { name, sig });
            } else {
                elems.push(InterfaceElem::Embed(self.constraint()?));
            }
            if !self.check(&TokenKind::RBrace) {
                self.expect_semi();
            }
        }
        self.expect(&TokenKind::RBrace, "expected '}' to close interface")?;
        Some(elems)
    }

    // -- Statements --

    fn block(&mut self) -> Option<Block> {
        let start = self.expect(&TokenKind::LBrace, "expected '{'")?.span;
        let stmts = self.stmt_list()?;
        let end = self.expect(&TokenKind::RBrace, "expected '}'")?.span;
        Some(Block {
            stmts,
            span: start.merge(end),
        })
    }

    /// Statements up to (not including) `}`, `case` or `default`.
    fn stmt_list(&mut self) -> Option<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !matches!(
            self.peek_kind(),
            Some(TokenKind::RBrace | TokenKind::Case | TokenKind::Default | TokenKind::Eof) | None
        ) {
            if self.match_token(&TokenKind::Semi) {
                continue;
            }
            let before = self.pos;
            match self.statement() {
                Some(stmt) => {
                    stmts.push(stmt);
                    if !self.check(&TokenKind::RBrace)
                        && !self.check(&TokenKind::Case)
                        && !self.check(&TokenKind::Default)
                    {
                        self.expect_semi();
                    }
                }
                None => {
                    if self.pos == before {
                        self.advance();
                    }
                    self.recover_to_semi();
                }
            }
        }
        Some(stmts)
    }

    fn statement(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        let kind = match self.peek_kind() {
            Some(TokenKind::Var) | Some(TokenKind::Const) => {
                let constant = self.check(&TokenKind::Const);
                self.advance();
                let mut specs = self.grouped(|p| p.var_spec(constant))?;
                if specs.len() == 1 {
                    StmtKind::Var(specs.remove(0))
                } else {
                    let stmts = specs
                        .into_iter()
                        .map(|spec| Stmt {
                            span: spec.span,
                            kind: StmtKind::Var(spec),
                        })
                        .collect();
                    StmtKind::Block(Block {
                        stmts,
                        span: start.merge(self.previous_span()),
                    })
                }
            }
            Some(TokenKind::Type) => {
                self.advance();
                StmtKind::Type(self.type_spec()?)
            }
            Some(TokenKind::Go) => {
                self.advance();
                StmtKind::Go(self.expression()?)
            }
            Some(TokenKind::Defer) => {
                self.advance();
                StmtKind::Defer(self.expression()?)
            }
            Some(TokenKind::Return) => {
                self.advance();
                if self.check(&TokenKind::Semi) || self.check(&TokenKind::RBrace) {
                    StmtKind::Return(Vec::new())
                } else {
                    StmtKind::Return(self.expr_list()?)
                }
            }
            Some(TokenKind::If) => return self.if_stmt(),
            Some(TokenKind::For) => return self.for_stmt(),
            Some(TokenKind::Switch) => return self.switch_stmt(),
            Some(TokenKind::Select) => return self.select_stmt(),
            Some(TokenKind::Break) => {
                self.advance();
                StmtKind::Break(self.optional_label())
            }
            Some(TokenKind::Continue) => {
                self.advance();
                StmtKind::Continue(self.optional_label())
            }
            Some(TokenKind::Goto) => {
                self.advance();
                StmtKind::Goto(self.expect_ident("expected label after 'goto'")?)
            }
            Some(TokenKind::Fallthrough) => {
                self.advance();
                StmtKind::Fallthrough
            }
            Some(TokenKind::LBrace) => StmtKind::Block(self.block()?),
            Some(TokenKind::Ident(_)) if self.peek_is(|kind| *kind == TokenKind::Colon) => {
                let label = self.expect_ident("expected label")?;
                self.advance(); // consume ':'
                let stmt = if self.check(&TokenKind::RBrace) {
                    Stmt {
                        kind: StmtKind::Empty,
                        span: label.span,
                    }
                } else {
                    self.statement()?
                };
                StmtKind::Labeled {
                    label,
                    stmt: Box::new(stmt),
                }
            }
            _ => return self.simple_stmt(),
        };
        Some(Stmt {
            kind,
            span: start.merge(self.previous_span()),
        })
    }

    fn optional_label(&mut self) -> Option<Ident> {
        if matches!(self.peek_kind(), Some(TokenKind::Ident(_))) {
            self.expect_ident("expected label")
        } else {
            None
        }
    }

    fn simple_stmt(&mut self) -> Option<Stmt> {
        match self.simple_or_range()? {
            SimpleOrRange::Simple(stmt) => Some(stmt),
            SimpleOrRange::Range { span, .. } => {
                self.error_at_span(span, "'range' is only allowed in a for clause");
                None
            }
        }
    }

    fn simple_or_range(&mut self) -> Option<SimpleOrRange> {
        let start = self.current_span();
        if self.check(&TokenKind::Range) {
            self.advance();
            let expr = self.expression()?;
            return Some(SimpleOrRange::Range {
                binding: RangeBinding::None,
                span: start.merge(expr.span),
                expr,
            });
        }
        let lhs = self.expr_list()?;
        let kind = match self.peek_kind() {
            Some(TokenKind::Define) => {
                self.advance();
                let mut names = Vec::new();
                for expr in &lhs {
                    match &expr.kind {
                        ExprKind::Ident(name) => names.push(Ident {
                            id: expr.id,
                            name: name.clone(),
                            span: expr.span,
                        }),
                        _ => {
                            self.error_at_span(expr.span, "non-name on left side of ':='");
                            return None;
                        }
                    }
                }
                if self.match_token(&TokenKind::Range) {
                    let expr = self.expression()?;
                    return Some(SimpleOrRange::Range {
                        binding: RangeBinding::Define(names),
                        span: start.merge(expr.span),
                        expr,
                    });
                }
                StmtKind::Define {
                    lhs: names,
                    rhs: self.expr_list()?,
                }
            }
            Some(TokenKind::Eq) => {
                self.advance();
                if self.match_token(&TokenKind::Range) {
                    let expr = self.expression()?;
                    return Some(SimpleOrRange::Range {
                        binding: RangeBinding::Assign(lhs),
                        span: start.merge(expr.span),
                        expr,
                    });
                }
                StmtKind::Assign {
                    lhs,
                    op: AssignOp::Assign,
                    rhs: self.expr_list()?,
                }
            }
            Some(TokenKind::OpAssign(_)) => {
                self.advance();
                StmtKind::Assign {
                    lhs,
                    op: AssignOp::Compound,
                    rhs: self.expr_list()?,
                }
            }
            Some(TokenKind::Inc) | Some(TokenKind::Dec) => {
                let increment = self.check(&TokenKind::Inc);
                self.advance();
                let target = self.single(lhs)?;
                StmtKind::IncDec { target, increment }
            }
            Some(TokenKind::Arrow) => {
                self.advance();
                let chan = self.single(lhs)?;
                let value = self.expression()?;
                StmtKind::Send { chan, value }
            }
            _ => StmtKind::Expr(self.single(lhs)?),
        };
        Some(SimpleOrRange::Simple(Stmt {
            kind,
            span: start.merge(self.previous_span()),
        }))
    }

    fn single(&mut self, mut exprs: Vec<Expr>) -> Option<Expr> {
        if exprs.len() == 1 {
            exprs.pop()
        } else {
            self.error_at_current("expected a single expression");
            None
        }
    }

    fn if_stmt(&mut self) -> Option<Stmt> {
        let start = self.expect(&TokenKind::If, "expected 'if'")?.span;
        let (init, cond) = self.with_expr_level(-1, |p| {
            let first = p.simple_stmt()?;
            if p.match_token(&TokenKind::Semi) {
                let cond = p.expression()?;
                Some((Some(Box::new(first)), cond))
            } else {
                match first.kind {
                    StmtKind::Expr(cond) => Some((None, cond)),
                    _ => {
                        p.error_at_span(first.span, "expected condition after 'if'");
                        None
                    }
                }
            }
        })?;
        let then = self.block()?;
        let els = if self.match_token(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(Box::new(self.if_stmt()?))
            } else {
                let block = self.block()?;
                Some(Box::new(Stmt {
                    span: block.span,
                    kind: StmtKind::Block(block),
                }))
            }
        } else {
            None
        };
        Some(Stmt {
            kind: StmtKind::If {
                init,
                cond,
                then,
                els,
            },
            span: start.merge(self.previous_span()),
        })
    }

    fn for_stmt(&mut self) -> Option<Stmt> {
        let start = self.expect(&TokenKind::For, "expected 'for'")?.span;
        if self.check(&TokenKind::LBrace) {
            let body = self.block()?;
            return Some(Stmt {
                span: start.merge(body.span),
                kind: StmtKind::For {
                    init: None,
                    cond: None,
                    post: None,
                    body,
                },
            });
        }

        let header = self.with_expr_level(-1, |p| -> Option<ForHeader> {
            let first = if p.check(&TokenKind::Semi) {
                None
            } else {
                Some(p.simple_or_range()?)
            };
            match first {
                Some(SimpleOrRange::Range { binding, expr, .. }) => {
                    Some(ForHeader::Range { binding, expr })
                }
                Some(SimpleOrRange::Simple(stmt)) if !p.check(&TokenKind::Semi) => match stmt.kind
                {
                    StmtKind::Expr(cond) => Some(ForHeader::Cond(cond)),
                    _ => {
                        p.error_at_span(stmt.span, "expected for loop condition");
                        None
                    }
                },
                init => {
                    let init = match init {
                        Some(SimpleOrRange::Simple(stmt)) => Some(Box::new(stmt)),
                        _ => None,
                    };
                    p.expect(&TokenKind::Semi, "expected ';' in for clause")?;
                    let cond = if p.check(&TokenKind::Semi) {
                        None
                    } else {
                        Some(p.expression()?)
                    };
                    p.expect(&TokenKind::Semi, "expected ';' in for clause")?;
                    let post = if p.check(&TokenKind::LBrace) {
                        None
                    } else {
                        Some(Box::new(p.simple_stmt()?))
                    };
                    Some(ForHeader::Clauses { init, cond, post })
                }
            }
        })?;

        let body = self.block()?;
        let span = start.merge(body.span);
        let kind = match header {
            ForHeader::Range { binding, expr } => StmtKind::Range {
                binding,
                expr,
                body,
            },
            ForHeader::Cond(cond) => StmtKind::For {
                init: None,
                cond: Some(cond),
                post: None,
                body,
            },
            ForHeader::Clauses { init, cond, post } => StmtKind::For {
                init,
                cond,
                post,
                body,
            },
        };
        Some(Stmt { kind, span })
    }

    fn switch_stmt(&mut self) -> Option<Stmt> {
        let start = self.expect(&TokenKind::Switch, "expected 'switch'")?.span;
        let (init, tag) = self.with_expr_level(-1, |p| {
            if p.check(&TokenKind::LBrace) {
                return Some((None, None));
            }
            let first = if p.check(&TokenKind::Semi) {
                None
            } else {
                Some(p.simple_stmt()?)
            };
            if p.match_token(&TokenKind::Semi) {
                let tag = if p.check(&TokenKind::LBrace) {
                    None
                } else {
                    Some(p.switch_tag()?)
                };
                let (extra_init, tag) = match tag {
                    Some(SwitchTag::Expr(expr)) => (None, Some(expr)),
                    Some(SwitchTag::Binding(stmt)) => (Some(stmt), None),
                    None => (None, None),
                };
                // `switch a := f(); v := a.(type)` keeps only the first init.
                let init = first.map(Box::new).or(extra_init.map(Box::new));
                return Some((init, tag));
            }
            match first.map(|stmt| stmt.kind) {
                Some(StmtKind::Expr(expr)) => Some((None, Some(expr))),
                // Type switch with a binding: `switch v := x.(type)`.
                Some(kind @ StmtKind::Define { .. }) => Some((
                    Some(Box::new(Stmt {
                        kind,
                        span: start.merge(p.previous_span()),
                    })),
                    None,
                )),
                _ => Some((None, None)),
            }
        })?;

        self.expect(&TokenKind::LBrace, "expected '{' after switch header")?;
        let mut clauses = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            if self.match_token(&TokenKind::Semi) {
                continue;
            }
            let clause_start = self.current_span();
            let exprs = if self.match_token(&TokenKind::Default) {
                Vec::new()
            } else {
                self.expect(&TokenKind::Case, "expected 'case' or 'default'")?;
                self.expr_list()?
            };
            self.expect(&TokenKind::Colon, "expected ':' after case")?;
            let body = self.stmt_list()?;
            clauses.push(CaseClause {
                exprs,
                body,
                span: clause_start.merge(self.previous_span()),
            });
        }
        let end = self.expect(&TokenKind::RBrace, "expected '}' to close switch")?.span;
        Some(Stmt {
            kind: StmtKind::Switch { init, tag, clauses },
            span: start.merge(end),
        })
    }

    fn switch_tag(&mut self) -> Option<SwitchTag> {
        let stmt = self.simple_stmt()?;
        match stmt.kind {
            StmtKind::Expr(expr) => Some(SwitchTag::Expr(expr)),
            _ => Some(SwitchTag::Binding(stmt)),
        }
    }

    fn select_stmt(&mut self) -> Option<Stmt> {
        let start = self.expect(&TokenKind::Select, "expected 'select'")?.span;
        self.expect(&TokenKind::LBrace, "expected '{' after 'select'")?;
        let mut clauses = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            if self.match_token(&TokenKind::Semi) {
                continue;
            }
            let clause_start = self.current_span();
            let comm = if self.match_token(&TokenKind::Default) {
                None
            } else {
                self.expect(&TokenKind::Case, "expected 'case' or 'default'")?;
                Some(Box::new(self.simple_stmt()?))
            };
            self.expect(&TokenKind::Colon, "expected ':' after case")?;
            let body = self.stmt_list()?;
            clauses.push(CommClause {
                comm,
                body,
                span: clause_start.merge(self.previous_span()),
            });
        }
        let end = self.expect(&TokenKind::RBrace, "expected '}' to close select")?.span;
        Some(Stmt {
            kind: StmtKind::Select { clauses },
            span: start.merge(end),
        })
    }

    // -- Expressions --

    fn expr_list(&mut self) -> Option<Vec<Expr>> {
        let mut exprs = vec![self.expression()?];
        while self.match_token(&TokenKind::Comma) {
            exprs.push(self.expression()?);
        }
        Some(exprs)
    }

    fn expression(&mut self) -> Option<Expr> {
        self.binary_expr(1)
    }

    /// Precedence climbing over the five binary precedence levels.
    fn binary_expr(&mut self, min_prec: u8) -> Option<Expr> {
        let mut lhs = self.unary_expr()?;
        while let Some((op, prec)) = self.peek_kind().and_then(binop_info) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.binary_expr(prec + 1)?;
            let span = lhs.span.merge(rhs.span);
            lhs = self.mk_expr(
                ExprKind::Binary {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
                span,
            );
        }
        Some(lhs)
    }

    fn unary_expr(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Plus) => UnaryOp::Plus,
            Some(TokenKind::Bang) => UnaryOp::Not,
            Some(TokenKind::Caret) => UnaryOp::BitNot,
            Some(TokenKind::Star) => UnaryOp::Deref,
            Some(TokenKind::Amp) => UnaryOp::Addr,
            Some(TokenKind::Arrow) => {
                // `<-chan T` in expression position is a channel type.
                if self.peek_is(|kind| *kind == TokenKind::Chan) {
                    return self.primary_expr();
                }
                UnaryOp::Recv
            }
            _ => return self.primary_expr(),
        };
        self.advance();
        let operand = self.unary_expr()?;
        let span = start.merge(operand.span);
        Some(self.mk_expr(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn primary_expr(&mut self) -> Option<Expr> {
        let mut expr = self.operand()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.advance();
                    if self.match_token(&TokenKind::LParen) {
                        let ty = if self.match_token(&TokenKind::Type) {
                            None
                        } else {
                            Some(self.type_expr()?)
                        };
                        let end = self
                            .expect(&TokenKind::RParen, "expected ')' after type assertion")?
                            .span;
                        let span = expr.span.merge(end);
                        expr = self.mk_expr(
                            ExprKind::TypeAssert {
                                base: Box::new(expr),
                                ty,
                            },
                            span,
                        );
                    } else {
                        let field = self.expect_ident("expected selector after '.'")?;
                        let span = expr.span.merge(field.span);
                        expr = self.mk_expr(
                            ExprKind::Selector {
                                base: Box::new(expr),
                                field,
                            },
                            span,
                        );
                    }
                }
                Some(TokenKind::LBracket) => {
                    self.advance();
                    expr = self.with_expr_level(self.expr_level.max(0) + 1, |p| {
                        p.index_or_slice(expr)
                    })?;
                }
                Some(TokenKind::LParen) => {
                    self.advance();
                    let (args, ellipsis) =
                        self.with_expr_level(self.expr_level.max(0) + 1, |p| p.call_args())?;
                    let end = self
                        .expect(&TokenKind::RParen, "expected ')' to close call")?
                        .span;
                    let span = expr.span.merge(end);
                    expr = self.mk_expr(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            ellipsis,
                        },
                        span,
                    );
                }
                Some(TokenKind::LBrace)
                    if is_literal_type(&expr) && (self.expr_level >= 0 || !is_type_name(&expr)) =>
                {
                    let Some(ty) = expr_to_type(&expr) else {
                        break;
                    };
                    expr = self.composite_lit(Some(ty), expr.span)?;
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn index_or_slice(&mut self, base: Expr) -> Option<Expr> {
        let lo = if self.check(&TokenKind::Colon) {
            None
        } else {
            Some(self.expression()?)
        };
        if self.match_token(&TokenKind::Colon) {
            let hi = if self.check(&TokenKind::Colon) || self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            let max = if self.match_token(&TokenKind::Colon) {
                Some(Box::new(self.expression()?))
            } else {
                None
            };
            let end = self.expect(&TokenKind::RBracket, "expected ']' to close slice")?.span;
            let span = base.span.merge(end);
            return Some(self.mk_expr(
                ExprKind::Slice {
                    base: Box::new(base),
                    lo: lo.map(Box::new),
                    hi,
                    max,
                },
                span,
            ));
        }
        let mut indices = Vec::new();
        if let Some(lo) = lo {
            indices.push(lo);
        }
        while self.match_token(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            indices.push(self.expression()?);
        }
        let end = self.expect(&TokenKind::RBracket, "expected ']' to close index")?.span;
        let span = base.span.merge(end);
        Some(self.mk_expr(
            ExprKind::Index {
                base: Box::new(base),
                indices,
            },
            span,
        ))
    }

    fn call_args(&mut self) -> Option<(Vec<Expr>, bool)> {
        let mut args = Vec::new();
        let mut ellipsis = false;
        while !self.check(&TokenKind::RParen) && !self.at_eof() {
            args.push(self.expression()?);
            if self.match_token(&TokenKind::Ellipsis) {
                ellipsis = true;
            }
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Some((args, ellipsis))
    }

    fn operand(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let kind = match self.peek_kind().cloned() {
            Some(TokenKind::Int(text)) => {
                self.advance();
                ExprKind::Lit(Lit::Int(text))
            }
            Some(TokenKind::Float(text)) => {
                self.advance();
                ExprKind::Lit(Lit::Float(text))
            }
            Some(TokenKind::String(text)) => {
                self.advance();
                ExprKind::Lit(Lit::String(text))
            }
            Some(TokenKind::Char(text)) => {
                self.advance();
                ExprKind::Lit(Lit::Char(text))
            }
            Some(TokenKind::Ident(name)) => {
                self.advance();
                ExprKind::Ident(name)
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let inner = self.with_expr_level(self.expr_level.max(0) + 1, |p| p.expression())?;
                self.expect(&TokenKind::RParen, "expected ')'")?;
                ExprKind::Paren(Box::new(inner))
            }
            Some(TokenKind::Func) => {
                self.advance();
                let sig = self.signature()?;
                if self.check(&TokenKind::LBrace) {
                    let body = self.with_expr_level(0, |p| p.block())?;
                    ExprKind::FuncLit(Box::new(FuncLit { sig, body }))
                } else {
                    ExprKind::Type(TypeExpr {
                        span: start.merge(sig.span),
                        kind: TypeExprKind::Func(sig),
                    })
                }
            }
            Some(
                TokenKind::LBracket
                | TokenKind::Map
                | TokenKind::Chan
                | TokenKind::Struct
                | TokenKind::Interface
                | TokenKind::Arrow,
            ) => ExprKind::Type(self.type_expr()?),
            Some(TokenKind::LBrace) => {
                // Elided element literal inside an outer composite.
                return self.composite_lit(None, start);
            }
            _ => {
                self.error_at_current("expected expression");
                return None;
            }
        };
        let span = start.merge(self.previous_span());
        Some(self.mk_expr(kind, span))
    }

    fn composite_lit(&mut self, ty: Option<TypeExpr>, start: Span) -> Option<Expr> {
        self.expect(&TokenKind::LBrace, "expected '{' to start composite literal")?;
        let elems = self.with_expr_level(0, |p| {
            let mut elems = Vec::new();
            while !p.check(&TokenKind::RBrace) && !p.at_eof() {
                if p.match_token(&TokenKind::Semi) {
                    continue;
                }
                let first = p.element_value()?;
                let elem = if p.match_token(&TokenKind::Colon) {
                    Element {
                        key: Some(first),
                        value: p.element_value()?,
                    }
                } else {
                    Element {
                        key: None,
                        value: first,
                    }
                };
                elems.push(elem);
                if !p.match_token(&TokenKind::Comma) {
                    p.skip_semis();
                    break;
                }
            }
            Some(elems)
        })?;
        let end = self
            .expect(&TokenKind::RBrace, "expected '}' to close composite literal")?
            .span;
        Some(self.mk_expr(ExprKind::Composite { ty, elems }, start.merge(end)))
    }

    fn element_value(&mut self) -> Option<Expr> {
        if self.check(&TokenKind::LBrace) {
            let start = self.current_span();
            self.composite_lit(None, start)
        } else {
            self.expression()
        }
    }

    // -- Token stream helpers --

    fn with_expr_level<T>(&mut self, level: i32, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.expr_level;
        self.expr_level = level;
        let result = f(self);
        self.expr_level = saved;
        result
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    /// Check whether the next token (at pos+1) satisfies a predicate.
    fn peek_is(&self, pred: impl FnOnce(&TokenKind) -> bool) -> bool {
        self.tokens.get(self.pos + 1).is_some_and(|t| pred(&t.kind))
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or(Span::new(self.file, 0, 0))
    }

    fn previous_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|idx| self.tokens.get(idx))
            .map(|t| t.span)
            .unwrap_or_else(|| self.current_span())
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Eof) | None)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| std::mem::discriminant(k) == std::mem::discriminant(kind))
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn skip_semis(&mut self) {
        while self.check(&TokenKind::Semi) {
            self.advance();
        }
    }

    fn expect_semi(&mut self) {
        if self.check(&TokenKind::RParen) || self.check(&TokenKind::RBrace) || self.at_eof() {
            return;
        }
        if !self.match_token(&TokenKind::Semi) {
            self.error_at_current("expected ';' or newline");
            self.recover_to_semi();
        }
    }

    /// Skip to just past the next `;` at the current nesting depth.
    fn recover_to_semi(&mut self) {
        let mut depth = 0usize;
        while !self.at_eof() {
            match self.peek_kind() {
                Some(TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket) => depth += 1,
                Some(TokenKind::RBrace | TokenKind::RParen | TokenKind::RBracket) => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                Some(TokenKind::Semi) if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn expect(&mut self, kind: &TokenKind, msg: &str) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            self.error_at_current(msg);
            None
        }
    }

    fn expect_ident(&mut self, msg: &str) -> Option<Ident> {
        if let Some(TokenKind::Ident(name)) = self.peek_kind() {
            let name = name.clone();
            let tok = self.advance();
            Some(Ident {
                id: self.next_id(),
                name,
                span: tok.span,
            })
        } else {
            self.error_at_current(msg);
            None
        }
    }

    fn error_at_current(&mut self, msg: &str) {
        let span = self.current_span();
        self.error_at_span(span, msg);
    }

    fn error_at_span(&mut self, span: Span, msg: &str) {
        self.errors
            .push(Diagnostic::error(Category::Syntax, msg).at(SourceLocation {
                file_id: self.file.0,
                start: span.start,
                end: span.end,
            }));
    }
}

enum SimpleOrRange {
    Simple(Stmt),
    Range {
        binding: RangeBinding,
        expr: Expr,
        span: Span,
    },
}

enum ForHeader {
    Range { binding: RangeBinding, expr: Expr },
    Cond(Expr),
    Clauses {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
    },
}

enum SwitchTag {
    Expr(Expr),
    Binding(Stmt),
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn binop_info(kind: &TokenKind) -> Option<(BinOp, u8)> {
    let info = match kind {
        TokenKind::OrOr => (BinOp::Or, 1),
        TokenKind::AndAnd => (BinOp::And, 2),
        TokenKind::EqEq => (BinOp::Eq, 3),
        TokenKind::NotEq => (BinOp::Neq, 3),
        TokenKind::Lt => (BinOp::Lt, 3),
        TokenKind::LtEq => (BinOp::Lte, 3),
        TokenKind::Gt => (BinOp::Gt, 3),
        TokenKind::GtEq => (BinOp::Gte, 3),
        TokenKind::Plus => (BinOp::Add, 4),
        TokenKind::Minus => (BinOp::Sub, 4),
        TokenKind::Pipe => (BinOp::BitOr, 4),
        TokenKind::Caret => (BinOp::BitXor, 4),
        TokenKind::Star => (BinOp::Mul, 5),
        TokenKind::Slash => (BinOp::Div, 5),
        TokenKind::Percent => (BinOp::Rem, 5),
        TokenKind::Shl => (BinOp::Shl, 5),
        TokenKind::Shr => (BinOp::Shr, 5),
        TokenKind::Amp => (BinOp::BitAnd, 5),
        TokenKind::AmpCaret => (BinOp::AndNot, 5),
        _ => return None,
    };
    Some(info)
}

/// A bare identifier parsed as a type, reinterpreted as a parameter name.
fn simple_type_name(ty: &TypeExpr) -> Option<Ident> {
    match &ty.kind {
        TypeExprKind::Name {
            pkg: None,
            name,
            args,
        } if args.is_empty() => Some(name.clone()),
        _ => None,
    }
}

fn is_type_name(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident(_) => true,
        ExprKind::Selector { base, .. } => matches!(base.kind, ExprKind::Ident(_)),
        _ => false,
    }
}

fn is_literal_type(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident(_) => true,
        ExprKind::Selector { base, .. } => matches!(base.kind, ExprKind::Ident(_)),
        ExprKind::Index { base, .. } => is_type_name(base),
        ExprKind::Type(ty) => matches!(
            ty.kind,
            TypeExprKind::Slice(_)
                | TypeExprKind::Array(_)
                | TypeExprKind::Map { .. }
                | TypeExprKind::Struct(_)
        ),
        _ => false,
    }
}

/// Reinterpret an expression parsed in value position as a type.
pub(crate) fn expr_to_type(expr: &Expr) -> Option<TypeExpr> {
    let kind = match &expr.kind {
        ExprKind::Ident(name) => TypeExprKind::Name {
            pkg: None,
            name: Ident {
                id: expr.id,
                name: name.clone(),
                span: expr.span,
            },
            args: Vec::new(),
        },
        ExprKind::Selector { base, field } => {
            let ExprKind::Ident(pkg) = &base.kind else {
                return None;
            };
            TypeExprKind::Name {
                pkg: Some(Ident {
                    id: base.id,
                    name: pkg.clone(),
                    span: base.span,
                }),
                name: field.clone(),
                args: Vec::new(),
            }
        }
        ExprKind::Index { base, indices } => {
            let TypeExprKind::Name { pkg, name, .. } = expr_to_type(base)?.kind else {
                return None;
            };
            let args = indices.iter().map(expr_to_type).collect::<Option<Vec<_>>>()?;
            TypeExprKind::Name { pkg, name, args }
        }
        ExprKind::Unary {
            op: UnaryOp::Deref,
            operand,
        } => TypeExprKind::Pointer(Box::new(expr_to_type(operand)?)),
        ExprKind::Paren(inner) => return expr_to_type(inner),
        ExprKind::Type(ty) => return Some(ty.clone()),
        _ => return None,
    };
    Some(TypeExpr {
        kind,
        span: expr.span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse(source: &str) -> SourceFile {
        let lexed = lex(source, FileId(0)).expect("lex failed");
        parse_file(lexed.tokens, lexed.comments, FileId(0)).expect("parse failed")
    }

    fn parse_err(source: &str) -> Vec<Diagnostic> {
        let lexed = lex(source, FileId(0)).expect("lex failed");
        parse_file(lexed.tokens, lexed.comments, FileId(0)).unwrap_err()
    }

    fn only_func(file: &SourceFile) -> &FuncDecl {
        file.funcs().next().expect("expected a function")
    }

    #[test]
    fn parse_package_and_imports() {
        let file = parse(
            "package demo\n\nimport \"context\"\nimport (\n\teg \"golang.org/x/sync/errgroup\"\n\t\"sync\"\n)\n",
        );
        assert_eq!(file.package.name, "demo");
        assert_eq!(file.imports.len(), 3);
        assert_eq!(file.imports[1].alias.as_ref().map(|a| a.name.as_str()), Some("eg"));
        assert_eq!(file.imports[1].path, "golang.org/x/sync/errgroup");
    }

    #[test]
    fn parse_grouped_params() {
        let file = parse("package p\nfunc f(a, b int, ctx context.Context, fns ...func()) {}\n");
        let func = only_func(&file);
        assert_eq!(func.sig.params.len(), 3);
        assert_eq!(func.sig.params[0].names.len(), 2);
        assert!(matches!(
            &func.sig.params[1].ty.kind,
            TypeExprKind::Name { pkg: Some(pkg), name, .. }
                if pkg.name == "context" && name.name == "Context"
        ));
        assert!(func.sig.params[2].variadic);
    }

    #[test]
    fn parse_unnamed_params_and_results() {
        let file = parse("package p\nfunc f(int, string) (int, error)\n");
        let func = only_func(&file);
        assert!(func.body.is_none());
        assert_eq!(func.sig.params.len(), 2);
        assert!(func.sig.params.iter().all(|group| group.names.is_empty()));
        assert_eq!(func.sig.results.len(), 2);
    }

    #[test]
    fn parse_method_with_generic_receiver() {
        let file = parse("package p\nfunc (p *Pool[T]) Go(f func() T) {}\n");
        let func = only_func(&file);
        let recv = func.recv.as_ref().expect("receiver");
        assert_eq!(recv.name.as_ref().map(|n| n.name.as_str()), Some("p"));
        let TypeExprKind::Pointer(inner) = &recv.ty.kind else {
            panic!("expected pointer receiver");
        };
        assert!(matches!(&inner.kind, TypeExprKind::Name { args, .. } if args.len() == 1));
    }

    #[test]
    fn parse_generic_type_decl() {
        let file = parse("package p\ntype Mapper[T, R any] struct {\n\tfn func(T) R\n}\n");
        let Decl::Type(decl) = &file.decls[0] else {
            panic!("expected type decl");
        };
        assert_eq!(decl.type_params.len(), 2);
        assert!(matches!(&decl.ty.kind, TypeExprKind::Struct(fields) if fields.len() == 1));
    }

    #[test]
    fn parse_go_and_defer() {
        let file = parse(
            "package p\nfunc f(ctx context.Context) {\n\tgo func() {\n\t\t_ = ctx\n\t}()\n\tdefer cleanup()\n}\n",
        );
        let body = only_func(&file).body.as_ref().expect("body");
        assert_eq!(body.stmts.len(), 2);
        let StmtKind::Go(call) = &body.stmts[0].kind else {
            panic!("expected go statement");
        };
        let call = call.as_call().expect("go takes a call");
        assert!(call.func.as_func_lit().is_some());
        assert!(matches!(body.stmts[1].kind, StmtKind::Defer(_)));
    }

    #[test]
    fn composite_literal_not_allowed_in_if_header() {
        let file = parse("package p\nfunc f() {\n\tif x {\n\t\treturn\n\t}\n}\n");
        let body = only_func(&file).body.as_ref().expect("body");
        let StmtKind::If { cond, then, .. } = &body.stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(cond.as_ident(), Some("x"));
        assert_eq!(then.stmts.len(), 1);
    }

    #[test]
    fn composite_literal_with_func_fields() {
        let file = parse(
            "package p\nfunc f() {\n\th := Holder{\n\t\trun: func() {},\n\t}\n\tfs := []func(){func() {}, nil}\n\tm := map[string]func(){\"a\": func() {}}\n}\n",
        );
        let body = only_func(&file).body.as_ref().expect("body");
        assert_eq!(body.stmts.len(), 3);
        for stmt in &body.stmts {
            let StmtKind::Define { rhs, .. } = &stmt.kind else {
                panic!("expected define");
            };
            assert!(matches!(rhs[0].kind, ExprKind::Composite { .. }));
        }
    }

    #[test]
    fn parse_for_forms() {
        let file = parse(
            "package p\nfunc f() {\n\tfor {\n\t}\n\tfor i := 0; i < n; i++ {\n\t}\n\tfor _, v := range xs {\n\t}\n\tfor ok {\n\t}\n}\n",
        );
        let body = only_func(&file).body.as_ref().expect("body");
        assert!(matches!(body.stmts[0].kind, StmtKind::For { cond: None, .. }));
        assert!(matches!(
            body.stmts[1].kind,
            StmtKind::For {
                init: Some(_),
                cond: Some(_),
                post: Some(_),
                ..
            }
        ));
        assert!(matches!(
            &body.stmts[2].kind,
            StmtKind::Range { binding: RangeBinding::Define(names), .. } if names.len() == 2
        ));
        assert!(matches!(
            body.stmts[3].kind,
            StmtKind::For {
                init: None,
                cond: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn parse_switch_and_select() {
        let file = parse(
            "package p\nfunc f() {\n\tswitch x := g(); x {\n\tcase 1, 2:\n\t\th()\n\tdefault:\n\t}\n\tselect {\n\tcase v := <-ch:\n\t\t_ = v\n\tcase out <- 1:\n\t}\n}\n",
        );
        let body = only_func(&file).body.as_ref().expect("body");
        let StmtKind::Switch { init, tag, clauses } = &body.stmts[0].kind else {
            panic!("expected switch");
        };
        assert!(init.is_some());
        assert!(tag.is_some());
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].exprs.len(), 2);
        let StmtKind::Select { clauses } = &body.stmts[1].kind else {
            panic!("expected select");
        };
        assert_eq!(clauses.len(), 2);
    }

    #[test]
    fn parse_generic_instantiation_call() {
        let file = parse("package p\nfunc f() {\n\tp := pool.NewWithResults[int]()\n}\n");
        let body = only_func(&file).body.as_ref().expect("body");
        let StmtKind::Define { rhs, .. } = &body.stmts[0].kind else {
            panic!("expected define");
        };
        let call = rhs[0].as_call().expect("call");
        assert!(matches!(call.func.kind, ExprKind::Index { .. }));
    }

    #[test]
    fn parse_chained_factory_calls() {
        let file = parse("package p\nfunc f() {\n\tg.Go(make()()())\n}\n");
        let body = only_func(&file).body.as_ref().expect("body");
        let StmtKind::Expr(expr) = &body.stmts[0].kind else {
            panic!("expected expression statement");
        };
        let call = expr.as_call().expect("call");
        let inner = call.args[0].as_call().expect("factory call");
        assert!(inner.func.as_call().is_some());
    }

    #[test]
    fn parse_labeled_goto() {
        let file = parse("package p\nfunc f() {\nretry:\n\tgoto retry\n}\n");
        let body = only_func(&file).body.as_ref().expect("body");
        assert!(matches!(body.stmts[0].kind, StmtKind::Labeled { .. }));
    }

    #[test]
    fn missing_package_clause_is_an_error() {
        let errors = parse_err("func f() {}\n");
        assert!(errors[0].message.contains("package"));
    }

    #[test]
    fn bad_statement_reports_and_recovers() {
        let errors = parse_err("package p\nfunc f() {\n\tx := \n\ty := 1\n}\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, Category::Syntax);
    }
}
