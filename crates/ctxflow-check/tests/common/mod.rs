//! Shared fixtures: stub dependency packages and a `// want` harness.
//!
//! A test source marks every expected finding with a trailing
//! `// want "substring"` comment (several strings allowed). Every finding
//! must be wanted on its line and every wanted substring must be found.

#![allow(dead_code)]

use std::collections::BTreeSet;

use ctxflow_ast::FileId;
use ctxflow_check::{AnalysisConfig, Report};
use ctxflow_diag::{Diagnostic, SourceMap};
use ctxflow_sema::Program;
use ctxflow_syntax::parse_source;

pub const APP: &str = "example.com/app";

const STUBS: &[(&str, &str)] = &[
    (
        "context",
        "package context

type Context interface {
	Err() error
	Value(key any) any
}

type CancelFunc func()

func Background() Context
func TODO() Context
func WithCancel(parent Context) (Context, CancelFunc)
func WithValue(parent Context, key, val any) Context
",
    ),
    (
        "golang.org/x/sync/errgroup",
        "package errgroup

import \"context\"

type Group struct{}

func WithContext(ctx context.Context) (*Group, context.Context)
func (g *Group) Go(f func() error)
func (g *Group) TryGo(f func() error) bool
func (g *Group) Wait() error
",
    ),
    (
        "sync",
        "package sync

type WaitGroup struct{}

func (wg *WaitGroup) Go(f func())
func (wg *WaitGroup) Add(n int)
func (wg *WaitGroup) Done()
func (wg *WaitGroup) Wait()
",
    ),
    (
        "github.com/sourcegraph/conc",
        "package conc

type WaitGroup struct{}

func (wg *WaitGroup) Go(f func())
func (wg *WaitGroup) Wait()
",
    ),
    (
        "github.com/sourcegraph/conc/pool",
        "package pool

import \"context\"

type Pool struct{}

func New() *Pool
func (p *Pool) Go(f func())
func (p *Pool) Wait()
func (p *Pool) WithErrors() *ErrorPool
func (p *Pool) WithContext(ctx context.Context) *ContextPool

type ErrorPool struct{}

func (p *ErrorPool) Go(f func() error)
func (p *ErrorPool) Wait() error

type ContextPool struct{}

func (p *ContextPool) Go(f func(ctx context.Context) error)
func (p *ContextPool) Wait() error

type ResultPool[T any] struct{}

func NewWithResults[T any]() *ResultPool[T]
func (p *ResultPool[T]) Go(f func() T)
func (p *ResultPool[T]) Wait() []T
",
    ),
    (
        "github.com/sourcegraph/conc/stream",
        "package stream

type Callback func()

type Stream struct{}

func New() *Stream
func (s *Stream) Go(f func() Callback)
func (s *Stream) Wait()
",
    ),
    (
        "github.com/sourcegraph/conc/iter",
        "package iter

func ForEach[T any](input []T, f func(*T))
func Map[T, R any](input []T, f func(*T) R) []R

type Iterator[T any] struct {
	MaxGoroutines int
}

func (iter Iterator[T]) ForEach(input []T, f func(*T))

type Mapper[T, R any] struct {
	MaxGoroutines int
}

func (m Mapper[T, R]) Map(input []T, f func(*T) R) []R
",
    ),
    (
        "github.com/mpyw/gotask",
        "package gotask

import \"context\"

type Task struct{}

type CancelableTask struct{}

func NewTask(fn func(ctx context.Context)) Task
func (t Task) DoAsync(ctx context.Context, errc chan<- error)
func (t Task) Cancelable() CancelableTask
func (t CancelableTask) DoAsync(ctx context.Context, errc chan<- error)
func DoAll(ctx context.Context, tasks ...Task) error
func DoAllFns(ctx context.Context, fns ...func(ctx context.Context)) error
",
    ),
    (
        "github.com/acme/apm",
        "package apm

import \"context\"

func NewGoroutineContext(ctx context.Context) context.Context
func StartSpan(ctx context.Context, name string) func()
",
    ),
];

/// File id of the analyzed source.
pub const APP_FILE: FileId = FileId(100);

pub struct Outcome {
    pub report: Report,
    pub sources: SourceMap,
}

impl Outcome {
    pub fn line(&self, diag: &Diagnostic) -> u32 {
        diag.location
            .and_then(|loc| self.sources.line_col(loc))
            .map_or(0, |pos| pos.line)
    }

    /// `line: message` for every finding, for snapshots.
    pub fn render(&self) -> String {
        self.report
            .diagnostics
            .iter()
            .map(|diag| format!("{}: {} {}", self.line(diag), diag.severity.as_str(), diag.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn program_with(sources: &mut SourceMap, files: &[(&str, FileId, &str)]) -> Program {
    let mut program = Program::new();
    for (idx, (path, text)) in STUBS.iter().enumerate() {
        let file = FileId(idx as u32);
        sources.add(file.0, format!("{path}/stub.go"), *text);
        program.add_package(*path, vec![parse_source(text, file).expect("stub parses")]);
    }
    for (path, file, text) in files {
        sources.add(file.0, format!("{path}/main.go"), *text);
        program.add_package(*path, vec![parse_source(text, *file).expect("source parses")]);
    }
    program
}

/// Analyze `source` as package [`APP`].
pub fn analyze(source: &str, config: AnalysisConfig) -> Outcome {
    let mut sources = SourceMap::new();
    let program = program_with(&mut sources, &[(APP, APP_FILE, source)]);
    let analyzer = config.build().expect("valid config");
    let targets = BTreeSet::from([APP_FILE]);
    let report = analyzer.analyze(&program, &sources, &targets);
    Outcome { report, sources }
}

pub fn default_config() -> AnalysisConfig {
    AnalysisConfig::default()
}

pub fn deriver_config() -> AnalysisConfig {
    AnalysisConfig {
        deriver: "github.com/acme/apm.NewGoroutineContext".to_string(),
        ..AnalysisConfig::default()
    }
}

pub fn heuristic_config() -> AnalysisConfig {
    AnalysisConfig {
        precise: false,
        ..AnalysisConfig::default()
    }
}

/// The `// want` expectations of a source, by one-based line.
pub fn wants(source: &str) -> Vec<(u32, String)> {
    let mut wanted = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        let Some((_, rest)) = line.split_once("// want ") else {
            continue;
        };
        let mut rest = rest.trim();
        while let Some(open) = rest.chars().next().filter(|c| *c == '"' || *c == '`') {
            let body = &rest[1..];
            let Some(close) = body.find(open) else {
                break;
            };
            wanted.push((idx as u32 + 1, body[..close].to_string()));
            rest = body[close + 1..].trim_start();
        }
    }
    wanted
}

/// Analyze `source` and compare the findings with its `// want` comments.
#[track_caller]
pub fn check(source: &str, config: AnalysisConfig) {
    let outcome = analyze(source, config);
    let mut unmatched: Vec<&Diagnostic> = outcome.report.diagnostics.iter().collect();
    let mut missing = Vec::new();
    for (line, want) in wants(source) {
        let found = unmatched
            .iter()
            .position(|diag| outcome.line(diag) == line && diag.message.contains(&want));
        match found {
            Some(pos) => {
                unmatched.remove(pos);
            }
            None => missing.push(format!("{line}: {want}")),
        }
    }
    let unexpected: Vec<_> = unmatched
        .iter()
        .map(|diag| format!("{}: {}", outcome.line(diag), diag.message))
        .collect();
    assert!(
        missing.is_empty() && unexpected.is_empty(),
        "missing findings: {missing:#?}\nunexpected findings: {unexpected:#?}"
    );
}
