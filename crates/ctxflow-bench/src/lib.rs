//! Synthetic inputs shared by the benchmarks.

use ctxflow_ast::FileId;
use ctxflow_diag::SourceMap;
use ctxflow_sema::Program;
use ctxflow_syntax::parse_source;

pub const APP: &str = "example.com/bench";
pub const APP_FILE: FileId = FileId(16);

const CONTEXT: &str = "package context

type Context interface {
	Err() error
}

func Background() Context
";

const ERRGROUP: &str = "package errgroup

import \"context\"

type Group struct{}

func WithContext(ctx context.Context) (*Group, context.Context)
func (g *Group) Go(f func() error)
func (g *Group) Wait() error
";

/// A package of `funcs` functions, each spawning through a `go` statement,
/// an errgroup literal, a factory and a reassigned local. Every fourth
/// function forgets the carrier.
pub fn spawning_source(funcs: usize) -> String {
    let mut source = String::from(
        "package bench\n\nimport (\n\t\"context\"\n\n\t\"golang.org/x/sync/errgroup\"\n)\n\nfunc work() {}\n\n\
         func job(ctx context.Context) func() error {\n\treturn func() error {\n\t\t_ = ctx\n\t\treturn nil\n\t}\n}\n",
    );
    for idx in 0..funcs {
        let used = if idx % 4 == 3 { "work()" } else { "_ = ctx" };
        source.push_str(&format!(
            "\nfunc spawn{idx}(ctx context.Context) error {{\n\
             \tg, _ := errgroup.WithContext(ctx)\n\
             \tgo func() {{\n\t\t{used}\n\t}}()\n\
             \tg.Go(func() error {{\n\t\t{used}\n\t\treturn nil\n\t}})\n\
             \tg.Go(job(ctx))\n\
             \tfn := func() error {{\n\t\treturn nil\n\t}}\n\
             \tfn = func() error {{\n\t\t{used}\n\t\treturn nil\n\t}}\n\
             \tg.Go(fn)\n\
             \treturn g.Wait()\n}}\n"
        ));
    }
    source
}

/// Parse `source` as package [`APP`] next to the stub dependencies it
/// imports.
pub fn program(source: &str) -> (Program, SourceMap) {
    let mut sources = SourceMap::new();
    let mut program = Program::new();
    let stubs = [("context", CONTEXT), ("golang.org/x/sync/errgroup", ERRGROUP)];
    for (idx, (path, text)) in stubs.into_iter().enumerate() {
        let file = FileId(idx as u32);
        sources.add(file.0, format!("{path}/stub.go"), text);
        match parse_source(text, file) {
            Ok(parsed) => program.add_package(path, vec![parsed]),
            Err(diags) => panic!("stub {path} does not parse: {diags:?}"),
        }
    }
    sources.add(APP_FILE.0, "bench.go", source);
    match parse_source(source, APP_FILE) {
        Ok(parsed) => program.add_package(APP, vec![parsed]),
        Err(diags) => panic!("benchmark source does not parse: {diags:?}"),
    }
    (program, sources)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use ctxflow_check::AnalysisConfig;
    use ctxflow_diag::Category;

    use super::*;

    #[test]
    fn every_fourth_function_is_reported() {
        let (program, sources) = program(&spawning_source(8));
        let analyzer = AnalysisConfig::default().build().expect("default config");
        let report = analyzer.analyze(&program, &sources, &BTreeSet::from([APP_FILE]));
        assert_eq!(report.count(Category::Goroutine), 2);
        assert_eq!(report.count(Category::Errgroup), 4);
    }
}
