mod common;

use common::{analyze, check, default_config, deriver_config, heuristic_config};
use ctxflow_diag::{Category, Severity};

#[test]
fn closures_must_use_the_carrier() {
    check(
        r#"package app

import "context"

func work() {}

func worker(ctx context.Context) { _ = ctx }

func uses(ctx context.Context) {
	go func() {
		_ = ctx
	}()
}

func ignores(ctx context.Context) {
	go func() { // want `goroutine does not propagate context "ctx"`
		work()
	}()
}

func secondParam(n int, ctx context.Context) {
	go func() {
		_ = ctx
	}()
	go func() { // want `goroutine does not propagate context "ctx"`
		_ = n
	}()
}

func noCarrier() {
	go func() {
		work()
	}()
}

func shadowed(ctx context.Context) {
	go func() { // want "goroutine does not propagate context"
		ctx := 42
		_ = ctx
	}()
}
"#,
        default_config(),
    );
}

#[test]
fn arguments_and_declared_functions() {
    check(
        r#"package app

import "context"

func work() {}

func worker(ctx context.Context) { _ = ctx }

func spawn(ctx context.Context) {
	go worker(ctx)
	go work() // want "goroutine does not propagate context"
	go func(c context.Context) {
		_ = c
	}(ctx)
	go func(c context.Context) {
		_ = c
	}(context.Background())
	go worker(context.TODO())
}
"#,
        default_config(),
    );
}

#[test]
fn derived_locals_count_as_carriers() {
    check(
        r#"package app

import "context"

func cancelable(ctx context.Context) {
	c, cancel := context.WithCancel(ctx)
	defer cancel()
	go func() {
		_ = c
	}()
}
"#,
        default_config(),
    );
}

#[test]
fn the_first_carrier_names_the_finding() {
    let outcome = analyze(
        r#"package app

import "context"

func two(parent context.Context, child context.Context) {
	go func() {
	}()
}
"#,
        default_config(),
    );
    insta::assert_snapshot!(outcome.render(), @r#"6: error goroutine does not propagate context "parent""#);
}

/// A literal that only reaches the carrier through a nested literal. Flow
/// summaries treat free variables transitively, so this is only a finding
/// with `precise: false`.
const NESTED: &str = r#"package app

import "context"

func nested(ctx context.Context) {
	go func() { // want "goroutine does not propagate context"
		func() {
			_ = ctx
		}()
	}()
}
"#;

#[test]
fn nested_literals_count_with_flow_summaries() {
    assert!(analyze(NESTED, default_config()).report.is_clean());
}

#[test]
fn nested_literals_do_not_count_syntactically() {
    check(NESTED, heuristic_config());
}

#[test]
fn goroutines_must_derive_when_a_deriver_is_set() {
    check(
        r#"package app

import (
	"context"

	"github.com/acme/apm"
)

func derived(ctx context.Context) {
	go func() {
		ctx := apm.NewGoroutineContext(ctx)
		_ = ctx
	}()
}

func derivedInside(ctx context.Context) {
	go func() {
		func() {
			_ = apm.NewGoroutineContext(ctx)
		}()
	}()
}

func notDerived(ctx context.Context) {
	go func() { // want "goroutine should call apm.NewGoroutineContext to derive context"
		_ = ctx
	}()
}

func deferredOnly(ctx context.Context) {
	go func() { // want "goroutine calls apm.NewGoroutineContext in defer, but it should be called at goroutine start"
		defer apm.NewGoroutineContext(ctx)
		_ = ctx
	}()
}
"#,
        deriver_config(),
    );
}

#[test]
fn deferred_derivation_is_a_warning_with_the_failure_as_label() {
    let outcome = analyze(
        r#"package app

import (
	"context"

	"github.com/acme/apm"
)

func deferredOnly(ctx context.Context) {
	go func() {
		defer apm.NewGoroutineContext(ctx)
		_ = ctx
	}()
}
"#,
        deriver_config(),
    );
    let [diag] = outcome.report.diagnostics.as_slice() else {
        panic!("expected one finding, got {:#?}", outcome.report.diagnostics);
    };
    assert_eq!(diag.category, Category::GoroutineDerive);
    assert_eq!(diag.severity, Severity::Warning);
    assert_eq!(diag.labels.len(), 1);
    assert!(diag.labels[0].message.contains("should call apm.NewGoroutineContext"));
}

#[test]
fn disabled_checkers_stay_silent() {
    let mut config = default_config();
    config.disabled = vec!["goroutine".to_string()];
    let outcome = analyze(
        r#"package app

import "context"

func work() {}

func ignores(ctx context.Context) {
	go func() {
		work()
	}()
}
"#,
        config,
    );
    assert!(outcome.report.is_clean(), "{}", outcome.render());
}
