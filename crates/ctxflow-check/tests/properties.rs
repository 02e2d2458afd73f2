mod common;

use common::{analyze, default_config};
use ctxflow_diag::Category;
use proptest::prelude::*;

/// One spawning function: whether its goroutine uses the carrier and whether
/// an ignore directive sits above it.
#[derive(Debug, Clone, Copy)]
struct Site {
    uses_carrier: bool,
    ignored: bool,
}

fn site() -> impl Strategy<Value = Site> {
    (any::<bool>(), any::<bool>()).prop_map(|(uses_carrier, ignored)| Site {
        uses_carrier,
        ignored,
    })
}

fn render(sites: &[Site]) -> String {
    let mut source = String::from("package app\n\nimport \"context\"\n\nfunc work() {}\n");
    for (idx, site) in sites.iter().enumerate() {
        source.push_str(&format!("\nfunc f{idx}(ctx context.Context) {{\n"));
        if site.ignored {
            source.push_str("\t//ctxflow:ignore\n");
        }
        let body = if site.uses_carrier { "_ = ctx" } else { "work()" };
        source.push_str(&format!("\tgo func() {{\n\t\t{body}\n\t}}()\n}}\n"));
    }
    source
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn analysis_is_deterministic(sites in prop::collection::vec(site(), 0..6)) {
        let source = render(&sites);
        let first = analyze(&source, default_config());
        let second = analyze(&source, default_config());
        prop_assert_eq!(first.report, second.report);
    }

    #[test]
    fn ignores_suppress_exactly_their_findings(sites in prop::collection::vec(site(), 0..6)) {
        let outcome = analyze(&render(&sites), default_config());
        let reported = sites.iter().filter(|site| !site.uses_carrier && !site.ignored).count();
        let unused = sites.iter().filter(|site| site.uses_carrier && site.ignored).count();
        prop_assert_eq!(outcome.report.count(Category::Goroutine), reported);
        prop_assert_eq!(outcome.report.count(Category::UnusedDirective), unused);
    }
}
