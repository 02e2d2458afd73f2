//! Carrier scopes.

use ctxflow_ast::FuncSig;
use ctxflow_sema::{BindingId, TypeInfo};

use crate::carrier::CarrierRegistry;

/// Carrier parameters visible in one function body.
///
/// Membership is by binding identity: a local that shadows a carrier
/// parameter's name is not a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierScope {
    pub bindings: Vec<BindingId>,
    /// Name of the first carrier parameter. Only used in messages.
    pub representative: String,
}

impl CarrierScope {
    pub fn contains(&self, binding: BindingId) -> bool {
        self.bindings.contains(&binding)
    }
}

/// Collect every named carrier parameter of `sig`. `None` when there is none,
/// in which case the function is not subject to any check.
pub fn resolve_scope(
    sig: &FuncSig,
    info: &TypeInfo,
    carriers: &CarrierRegistry,
) -> Option<CarrierScope> {
    let mut bindings = Vec::new();
    let mut representative = None;
    for group in &sig.params {
        let Some(ty) = info.type_expr(&group.ty) else {
            continue;
        };
        if group.variadic || !carriers.is_carrier(ty) {
            continue;
        }
        for name in group.names.iter().filter(|name| !name.is_blank()) {
            let Some(id) = info.def(name) else {
                continue;
            };
            representative.get_or_insert_with(|| name.name.clone());
            bindings.push(id);
        }
    }
    Some(CarrierScope {
        bindings,
        representative: representative?,
    })
}

/// Whether `sig` declares any carrier parameter, named or not.
pub fn has_carrier_param(sig: &FuncSig, info: &TypeInfo, carriers: &CarrierRegistry) -> bool {
    sig.params.iter().any(|group| {
        !group.variadic
            && info
                .type_expr(&group.ty)
                .is_some_and(|ty| carriers.is_carrier(ty))
    })
}

#[cfg(test)]
mod tests {
    use ctxflow_ast::FileId;
    use ctxflow_sema::Program;
    use ctxflow_syntax::parse_source;

    use super::*;

    fn scope_of(source: &str) -> Option<CarrierScope> {
        let mut program = Program::new();
        program.add_package(
            "context",
            vec![parse_source("package context\ntype Context interface{}\n", FileId(0)).expect("parse")],
        );
        program.add_package(
            "example.com/app",
            vec![parse_source(source, FileId(1)).expect("parse")],
        );
        let info = program.check();
        let func = program
            .package("example.com/app")
            .and_then(|pkg| pkg.files[0].funcs().next())
            .expect("func");
        resolve_scope(&func.sig, &info, &CarrierRegistry::default())
    }

    #[test]
    fn carriers_in_any_position_are_collected() {
        let scope = scope_of(
            "package app\nimport \"context\"\nfunc run(n int, a, b context.Context, p *context.Context) {}\n",
        )
        .expect("scope");
        assert_eq!(scope.bindings.len(), 3);
        assert_eq!(scope.representative, "a");
    }

    #[test]
    fn no_carrier_means_no_scope() {
        assert_eq!(scope_of("package app\nfunc run(n int) {}\n"), None);
        assert_eq!(
            scope_of("package app\nimport \"context\"\nfunc run(_ context.Context) {}\n"),
            None
        );
    }

    #[test]
    fn aliased_import_still_resolves() {
        let scope = scope_of(
            "package app\nimport stdctx \"context\"\nfunc run(c stdctx.Context) {}\n",
        )
        .expect("scope");
        assert_eq!(scope.representative, "c");
    }
}
