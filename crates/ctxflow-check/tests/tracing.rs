//! Callback tracing through factories, locals and data structures. Every
//! source is checked with and without flow summaries.

mod common;

use common::{analyze, check, default_config, heuristic_config};
use ctxflow_check::{AnalysisConfig, UntraceablePolicy};

#[track_caller]
fn check_both(source: &str) {
    check(source, default_config());
    check(source, heuristic_config());
}

const HEADER: &str = r#"package app

import (
	"context"

	"golang.org/x/sync/errgroup"
)
"#;

fn source(body: &str) -> String {
    format!("{HEADER}{body}")
}

#[test]
fn factories_are_followed_to_their_results() {
    check_both(&source(
        r#"
func makeJob(ctx context.Context) func() error {
	return func() error {
		_ = ctx
		return nil
	}
}

func makeIdle() func() error {
	return func() error {
		return nil
	}
}

func factories(ctx context.Context, g *errgroup.Group) {
	g.Go(makeJob(ctx))
	g.Go(makeIdle()) // want "errgroup.Group.Go() closure should use context"
}
"#,
    ));
}

#[test]
fn nested_factories_are_followed() {
    check_both(&source(
        r#"
func chains(ctx context.Context, g *errgroup.Group) {
	f := func() func() error {
		return func() error {
			_ = ctx
			return nil
		}
	}
	g.Go(f())

	h := func() func() func() error {
		return func() func() error {
			return func() error {
				_ = ctx
				return nil
			}
		}
	}
	g.Go(h()())

	idle := func() func() error {
		return func() error {
			return nil
		}
	}
	g.Go(idle()) // want "errgroup.Group.Go() closure should use context"
}
"#,
    ));
}

#[test]
fn factories_returning_factories_are_followed() {
    check_both(
        r#"package app

import "context"

func chained(ctx context.Context) {
	f := func() func() func() {
		return func() func() {
			return func() {
				_ = ctx
			}
		}
	}
	go f()()
	go f()()()

	idle := func() func() func() {
		return func() func() {
			return func() {
			}
		}
	}
	go idle()()() // want "goroutine does not propagate context"
}
"#,
    );
}

#[test]
fn fields_and_elements_resolve_to_stored_literals() {
    check_both(&source(
        r#"
type jobs struct {
	run func() error
}

func fields(ctx context.Context, g *errgroup.Group) {
	j := jobs{run: func() error {
		_ = ctx
		return nil
	}}
	g.Go(j.run)

	idle := &jobs{run: func() error {
		return nil
	}}
	g.Go(idle.run) // want "errgroup.Group.Go() closure should use context"

	fns := []func() error{func() error {
		return nil
	}}
	g.Go(fns[0]) // want "errgroup.Group.Go() closure should use context"

	byName := map[string]func() error{"a": func() error {
		_ = ctx
		return nil
	}}
	g.Go(byName["a"])
}
"#,
    ));
}

#[test]
fn the_last_assignment_before_use_is_traced() {
    check_both(&source(
        r#"
func reassigned(ctx context.Context, g *errgroup.Group) {
	fn := func() error {
		return nil
	}
	fn = func() error {
		_ = ctx
		return nil
	}
	g.Go(fn)
	fn = func() error {
		return nil
	}
	g.Go(fn) // want "errgroup.Group.Go() closure should use context"
}
"#,
    ));
}

const CYCLE: &str = r#"
func wrap(f func() error) func() error {
	return f
}

func cycle(ctx context.Context, g *errgroup.Group, ch chan func() error) {
	var x func() error
	x = wrap(x)
	g.Go(x)
	g.Go(<-ch)
}
"#;

#[test]
fn untraceable_callbacks_pass_by_default() {
    let outcome = analyze(&source(CYCLE), default_config());
    assert!(outcome.report.is_clean(), "{}", outcome.render());
    let outcome = analyze(&source(CYCLE), heuristic_config());
    assert!(outcome.report.is_clean(), "{}", outcome.render());
}

#[test]
fn strict_policy_reports_untraceable_callbacks() {
    let config = AnalysisConfig {
        untraceable: UntraceablePolicy::Fail,
        ..AnalysisConfig::default()
    };
    let outcome = analyze(&source(CYCLE), config);
    insta::assert_snapshot!(outcome.render(), @r#"
    16: error errgroup.Group.Go() closure should use context "ctx"
    17: error errgroup.Group.Go() closure should use context "ctx"
    "#);
}

#[test]
fn closures_stored_in_locals_are_traced() {
    check_both(&source(
        r#"
func locals(ctx context.Context, g *errgroup.Group) {
	job := func() error {
		_ = ctx
		return nil
	}
	g.Go(job)

	idle := func() error {
		return nil
	}
	g.Go(idle) // want "errgroup.Group.Go() closure should use context"
}
"#,
    ));
}
