//! The analysis driver.
//!
//! [`Analyzer::analyze`] resolves the program, walks every function of the
//! target files with the carrier scope of the enclosing function, judges each
//! `go` statement and each call matching a shape, and filters the verdicts
//! through the suppression ledger.

use std::collections::BTreeSet;

use ctxflow_ast::visit::{self, Visitor};
use ctxflow_ast::{CallRef, Expr, ExprKind, FileId, FuncLit, Span, Stmt, StmtKind};
use ctxflow_diag::{Category, Diagnostic, SourceLocation, SourceMap};
use ctxflow_flow::FlowProgram;
use ctxflow_sema::{FuncIndex, Program, receiver_type_name};
use ctxflow_types::Type;
use tracing::debug;

use crate::CheckContext;
use crate::carrier::CarrierRegistry;
use crate::config::AnalysisConfig;
use crate::deriver::{DeriverMatcher, FuncSpec};
use crate::directive::{Directive, parse_directive};
use crate::ledger::Ledger;
use crate::pattern::{CallSite, Judge, Pattern, SiteKind, Verdict};
use crate::scope::{CarrierScope, resolve_scope};
use crate::shape::{CallbackSlot, ShapeMatch, ShapeRegistry};
use crate::trace::Tracer;

/// Frozen analysis settings. Built by [`AnalysisConfig::build`].
#[derive(Debug)]
pub struct Analyzer {
    carriers: CarrierRegistry,
    shapes: ShapeRegistry,
    deriver: DeriverMatcher,
    disabled: BTreeSet<Category>,
    tracer: Tracer,
    config: AnalysisConfig,
}

/// Findings of one run, sorted by location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn count(&self, category: Category) -> usize {
        self.diagnostics
            .iter()
            .filter(|diag| diag.category == category)
            .count()
    }
}

/// A verdict awaiting the ledger.
#[derive(Debug)]
struct Finding {
    checker: Category,
    span: Span,
    verdict: Verdict,
}

impl Analyzer {
    pub fn new(
        carriers: CarrierRegistry,
        shapes: ShapeRegistry,
        deriver: DeriverMatcher,
        disabled: BTreeSet<Category>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            carriers,
            shapes,
            deriver,
            disabled,
            tracer: Tracer::new(config.precise),
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn shapes(&self) -> &ShapeRegistry {
        &self.shapes
    }

    pub fn is_enabled(&self, checker: Category) -> bool {
        !self.disabled.contains(&checker)
    }

    /// Analyze the functions of the files in `targets`. Other files of
    /// `program` only contribute declarations.
    pub fn analyze(&self, program: &Program, sources: &SourceMap, targets: &BTreeSet<FileId>) -> Report {
        let info = program.check();
        let index = FuncIndex::build(program);
        let flow = self
            .config
            .precise
            .then(|| FlowProgram::build(program, &index, &info));
        let line_of = |span: Span| {
            sources
                .get(span.file.0)
                .map_or(0, |entry| entry.lines.line(span.start))
        };

        let mut shapes = self.shapes.clone();
        for spec in marked_spawners(program, &line_of) {
            debug!(spawner = %spec, "registered marked spawner");
            shapes.add_spawner(spec);
        }

        let mut diagnostics = Vec::new();
        let mut ledger = Ledger::new();
        for file in program
            .packages()
            .flat_map(|pkg| &pkg.files)
            .filter(|file| targets.contains(&file.file))
        {
            for comment in &file.comments {
                let Some(Directive::Ignore { checkers, unknown }) = parse_directive(&comment.text) else {
                    continue;
                };
                for name in unknown {
                    diagnostics.push(
                        Diagnostic::warning(
                            Category::UnusedDirective,
                            format!("unknown checker \"{name}\" in ignore directive"),
                        )
                        .at(location(comment.span)),
                    );
                }
                ledger.add(file.file, line_of(comment.span), checkers, comment.span);
            }
        }

        let cx = CheckContext {
            program,
            info: &info,
            index: &index,
            flow: flow.as_ref(),
            carriers: &self.carriers,
            shapes: &shapes,
            deriver: &self.deriver,
        };
        let mut walker = Walker {
            analyzer: self,
            cx: &cx,
            scopes: Vec::new(),
            findings: Vec::new(),
        };
        for file in program
            .packages()
            .flat_map(|pkg| &pkg.files)
            .filter(|file| targets.contains(&file.file))
        {
            for func in file.funcs() {
                let Some(body) = &func.body else {
                    continue;
                };
                walker.scopes.push(resolve_scope(&func.sig, &info, &self.carriers));
                visit::walk_block(&mut walker, body);
                walker.scopes.pop();
            }
        }
        let findings = walker.findings;
        debug!(
            targets = targets.len(),
            findings = findings.len(),
            "judged spawn sites"
        );

        for finding in findings {
            let line = line_of(finding.span);
            let loc = location(finding.span);
            let diagnostic = match finding.verdict {
                Verdict::Pass => continue,
                _ if ledger.should_suppress(finding.span.file, line, finding.checker) => continue,
                Verdict::Fail { message } => Diagnostic::error(finding.checker, message).at(loc),
                Verdict::Downgraded {
                    message,
                    downgraded,
                } => Diagnostic::warning(finding.checker, downgraded)
                    .at(loc)
                    .with_label(loc, message),
            };
            diagnostics.push(diagnostic);
        }
        for entry in ledger.unused() {
            diagnostics.push(
                Diagnostic::warning(Category::UnusedDirective, "unused ctxflow:ignore directive")
                    .at(location(entry.span))
                    .with_help("remove the directive or the checkers it no longer needs"),
            );
        }

        diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        diagnostics.dedup();
        Report { diagnostics }
    }
}

fn location(span: Span) -> SourceLocation {
    SourceLocation {
        file_id: span.file.0,
        start: span.start,
        end: span.end,
    }
}

/// Functions marked `//ctxflow:spawner` on the line directly above them.
fn marked_spawners(program: &Program, line_of: &impl Fn(Span) -> u32) -> Vec<FuncSpec> {
    let mut specs = Vec::new();
    for package in program.packages() {
        for file in &package.files {
            for comment in &file.comments {
                if parse_directive(&comment.text) != Some(Directive::Spawner) {
                    continue;
                }
                let line = line_of(comment.span);
                let Some(func) = file.funcs().find(|func| line_of(func.span) == line + 1) else {
                    continue;
                };
                let receiver = match &func.recv {
                    Some(recv) => match receiver_type_name(&recv.ty) {
                        Some((name, _)) => Some(name.to_string()),
                        None => continue,
                    },
                    None => None,
                };
                specs.push(FuncSpec {
                    path: package.path.clone(),
                    receiver,
                    name: func.name.name.clone(),
                });
            }
        }
    }
    specs
}

/// Walks function bodies with a stack of carrier scopes and records a
/// finding per judged callback.
struct Walker<'c, 'a> {
    analyzer: &'c Analyzer,
    cx: &'c CheckContext<'a>,
    scopes: Vec<Option<CarrierScope>>,
    findings: Vec<Finding>,
}

impl<'a> Walker<'_, 'a> {
    fn scope(&self) -> Option<&CarrierScope> {
        self.scopes.last().and_then(Option::as_ref)
    }

    fn judge<'s>(&'s self, scope: &'s CarrierScope) -> Judge<'s, 'a> {
        Judge {
            cx: self.cx,
            tracer: &self.analyzer.tracer,
            policy: self.analyzer.config.untraceable,
            scope,
        }
    }

    fn check_go(&mut self, stmt: &'a Stmt, call: CallRef<'a>) {
        let Some(scope) = self.scope() else {
            return;
        };
        let site = CallSite {
            kind: SiteKind::Go,
            call,
            callback: call.func,
        };
        let mut findings = Vec::new();
        if self.analyzer.is_enabled(Category::Goroutine) {
            findings.push(Finding {
                checker: Category::Goroutine,
                span: stmt.span,
                verdict: self.judge(scope).evaluate(Pattern::CapturesCarrier, &site),
            });
        }
        if self.analyzer.is_enabled(Category::GoroutineDerive) && !self.cx.deriver.is_empty() {
            findings.push(Finding {
                checker: Category::GoroutineDerive,
                span: stmt.span,
                verdict: self.judge(scope).evaluate(Pattern::Derives, &site),
            });
        }
        self.findings.extend(findings);
    }

    fn check_shape(&mut self, call: CallRef<'a>, matched: ShapeMatch<'_>) {
        let shape = matched.shape;
        if shape.task_constructor || !self.analyzer.is_enabled(shape.checker) {
            return;
        }
        let Some(scope) = self.scope() else {
            return;
        };
        let constructor = self.cx.shapes.constructor_for(&shape.key);
        let label = shape.label();
        let mut findings = Vec::new();
        for (operand, span) in self.callbacks(call, shape.callback) {
            // Task consumers are judged on the callback the task was built
            // from; an untraceable task is judged as is.
            let callback = constructor
                .and_then(|ctor| {
                    let ctor_call = self.cx.shapes.trace_constructor(self.cx, ctor, operand, call.expr.span)?;
                    match ctor.callback {
                        CallbackSlot::Arg(idx) => ctor_call.args.get(idx),
                        _ => None,
                    }
                })
                .unwrap_or(operand);
            let site = CallSite {
                kind: SiteKind::Shape(&label),
                call,
                callback,
            };
            findings.push(Finding {
                checker: shape.checker,
                span,
                verdict: self.judge(scope).evaluate_all(&shape.patterns, &site),
            });
        }
        self.findings.extend(findings);
    }

    /// Callback operands of a call for `slot`, with the span to report at.
    fn callbacks(&self, call: CallRef<'a>, slot: CallbackSlot) -> Vec<(&'a Expr, Span)> {
        let at_call = |expr: &'a Expr| (expr, call.expr.span);
        match slot {
            CallbackSlot::Arg(idx) => call.args.get(idx).map(at_call).into_iter().collect(),
            CallbackSlot::Variadic(from) => call
                .args
                .iter()
                .skip(from)
                .map(|arg| (arg, arg.span))
                .collect(),
            CallbackSlot::Receiver => match &call.func.unparen().kind {
                ExprKind::Selector { base, .. } => vec![at_call(&**base)],
                _ => Vec::new(),
            },
            CallbackSlot::FuncArgs => {
                let sig = self.cx.info.callee(call.expr).map(|callee| &callee.sig);
                call.args
                    .iter()
                    .enumerate()
                    .filter(|(idx, arg)| {
                        arg.as_func_lit().is_some()
                            || self.cx.info.type_of(arg).is_some_and(Type::is_func)
                            || sig
                                .and_then(|sig| sig.param_at(*idx))
                                .is_some_and(|ty| ty.is_func())
                    })
                    .map(|(_, arg)| (arg, arg.span))
                    .collect()
            }
        }
    }
}

impl<'a> Visitor<'a> for Walker<'_, 'a> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        if let StmtKind::Go(expr) = &stmt.kind
            && let Some(call) = expr.as_call()
        {
            self.check_go(stmt, call);
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        let cx = self.cx;
        if let ExprKind::Call { .. } = expr.kind
            && self.scope().is_some()
            && let Some(call) = expr.as_call()
            && let Some(matched) = cx.shapes.match_call(call, cx.info)
        {
            self.check_shape(call, matched);
        }
        visit::walk_expr(self, expr);
    }

    fn visit_func_lit(&mut self, _expr: &'a Expr, lit: &'a FuncLit) {
        let scope = resolve_scope(&lit.sig, self.cx.info, self.cx.carriers).or_else(|| self.scope().cloned());
        self.scopes.push(scope);
        visit::walk_block(self, &lit.body);
        self.scopes.pop();
    }
}
