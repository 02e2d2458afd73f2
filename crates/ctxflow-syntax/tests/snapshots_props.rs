use std::fmt::Write;

use ctxflow_ast::{FileId, StmtKind};
use ctxflow_diag::Diagnostic;
use ctxflow_syntax::{TokenKind, lex, parse_source};
use insta::assert_snapshot;
use proptest::prelude::*;

#[test]
fn lexer_go_statement_tokens() {
    assert_snapshot!(render_tokens("go f(ctx)\n"), @r#"
    Go
    Ident("f")
    LParen
    Ident("ctx")
    RParen
    Semi
    Eof
    "#);
}

#[test]
fn lexer_keeps_directive_comments() {
    let lexed = lex("x := 1 //ctxflow:ignore goroutine\n", FileId(0)).expect("lex");
    assert_eq!(lexed.comments.len(), 1);
    assert_eq!(lexed.comments[0].text, "//ctxflow:ignore goroutine");
    assert_eq!(lexed.comments[0].span.start, 7);
}

#[test]
fn parser_reports_missing_package_name() {
    let diags = parse_source("package\n", FileId(0)).expect_err("must fail");
    assert_snapshot!(render_diagnostics(&diags), @"- Error C0900 @8..8: expected package name");
}

#[test]
fn parser_handles_spawn_shapes() {
    let source = r#"package demo

import (
	"context"
	"golang.org/x/sync/errgroup"
)

type holder struct {
	run func()
}

func run(ctx context.Context, g *errgroup.Group) {
	h := holder{run: func() { _ = ctx }}
	fs := []func(){func() {}}
	g.Go(func() error {
		return nil
	})
	go h.run()
	go fs[0]()
	go func() {
		defer func() {}()
	}()
}
"#;
    let file = parse_source(source, FileId(3)).expect("parse");
    let func = file.funcs().next().expect("func");
    let body = func.body.as_ref().expect("body");
    let go_count = body
        .stmts
        .iter()
        .filter(|stmt| matches!(stmt.kind, StmtKind::Go(_)))
        .count();
    assert_eq!(go_count, 3);
    assert!(body.stmts.iter().all(|stmt| stmt.span.file == FileId(3)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_semicolons_never_repeat(lines in prop::collection::vec((0u8..4, 0u8..3), 1..32)) {
        let source = render_random_lines(&lines);
        let lexed = lex(&source, FileId(0)).expect("generated source always lexes");
        prop_assert!(matches!(lexed.tokens.last().map(|tok| &tok.kind), Some(TokenKind::Eof)));
        for pair in lexed.tokens.windows(2) {
            prop_assert!(
                !(pair[0].kind == TokenKind::Semi && pair[1].kind == TokenKind::Semi),
                "adjacent inserted semicolons in {source:?}"
            );
        }
    }

    #[test]
    fn prop_go_statements_are_counted(count in 0usize..12, blank in any::<bool>()) {
        let mut source = String::from("package p\nfunc f(ctx context.Context) {\n");
        for idx in 0..count {
            let _ = writeln!(&mut source, "\tgo func() {{ work{idx}(ctx) }}()");
            if blank {
                source.push('\n');
            }
        }
        source.push_str("}\n");
        let file = parse_source(&source, FileId(0)).expect("generated source always parses");
        let func = file.funcs().next().expect("func");
        let stmts = &func.body.as_ref().expect("body").stmts;
        prop_assert_eq!(stmts.len(), count);
        prop_assert!(stmts.iter().all(|stmt| matches!(stmt.kind, StmtKind::Go(_))));
    }
}

fn render_tokens(source: &str) -> String {
    let mut out = String::new();
    match lex(source, FileId(0)) {
        Ok(lexed) => {
            for token in lexed.tokens {
                let _ = writeln!(&mut out, "{:?}", token.kind);
            }
        }
        Err(diags) => out.push_str(&render_diagnostics(&diags)),
    }
    out
}

fn render_diagnostics(diags: &[Diagnostic]) -> String {
    let mut out = String::new();
    for diag in diags {
        let location = diag
            .location
            .map(|loc| format!("{}..{}", loc.start, loc.end))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            &mut out,
            "- {:?} {} @{}: {}",
            diag.severity,
            diag.code.as_deref().unwrap_or("-"),
            location,
            diag.message
        );
    }
    out
}

fn render_random_lines(lines: &[(u8, u8)]) -> String {
    let mut source = String::new();
    for (shape, blanks) in lines {
        match shape {
            0 => source.push_str("x := f(y)"),
            1 => source.push_str("go func() {"),
            2 => source.push_str("}()"),
            _ => source.push_str("// note"),
        }
        for _ in 0..=*blanks {
            source.push('\n');
        }
    }
    source
}
