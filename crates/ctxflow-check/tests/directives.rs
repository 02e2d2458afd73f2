mod common;

use common::{analyze, check, default_config};
use ctxflow_diag::{Category, Severity};

#[test]
fn ignore_directives_cover_their_line_and_the_next() {
    check(
        r#"package app

import "context"

func work() {}

func suppressed(ctx context.Context) {
	//ctxflow:ignore goroutine - fire and forget
	go func() {
		work()
	}()
}

func trailing(ctx context.Context) {
	go func() { //ctxflow:ignore
		work()
	}()
}

func tooFar(ctx context.Context) {
	//ctxflow:ignore // want "unused ctxflow:ignore directive"

	go func() { // want "goroutine does not propagate context"
		work()
	}()
}

func stale(ctx context.Context) {
	//ctxflow:ignore // want "unused ctxflow:ignore directive"
	go func() {
		_ = ctx
	}()
}

func otherChecker(ctx context.Context) {
	//ctxflow:ignore errgroup // want "unused ctxflow:ignore directive"
	go func() { // want "goroutine does not propagate context"
		work()
	}()
}

func typo(ctx context.Context) {
	//ctxflow:ignore gorotine // want `unknown checker "gorotine" in ignore directive` "unused ctxflow:ignore directive"
	go func() { // want "goroutine does not propagate context"
		work()
	}()
}
"#,
        default_config(),
    );
}

#[test]
fn ignoring_a_disabled_checker_is_unused() {
    let mut config = default_config();
    config.disabled = vec!["goroutine".to_string()];
    check(
        r#"package app

import "context"

func work() {}

func disabled(ctx context.Context) {
	//ctxflow:ignore goroutine // want "unused ctxflow:ignore directive"
	go func() {
		work()
	}()
}
"#,
        config,
    );
}

#[test]
fn directive_findings_are_warnings() {
    let outcome = analyze(
        r#"package app

import "context"

func work() {}

func typo(ctx context.Context) {
	//ctxflow:ignore goroutine,spawnr
	go func() {
		work()
	}()
}
"#,
        default_config(),
    );
    insta::assert_snapshot!(outcome.render(), @r#"8: warning unknown checker "spawnr" in ignore directive"#);
    assert!(
        outcome
            .report
            .diagnostics
            .iter()
            .all(|diag| diag.severity == Severity::Warning && diag.category == Category::UnusedDirective)
    );
}
