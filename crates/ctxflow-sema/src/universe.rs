//! Predeclared identifiers.

use ctxflow_types::{Basic, Method, Signature, Type};

use crate::Resolved;

const BUILTIN_FUNCS: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "max",
    "min", "new", "panic", "print", "println", "real", "recover",
];

/// Resolve a name in the universe scope.
pub(crate) fn lookup(name: &str) -> Option<Resolved> {
    if BUILTIN_FUNCS.contains(&name) {
        return Some(Resolved::Builtin(name.to_string()));
    }
    if let Some(basic) = Basic::from_name(name) {
        return Some(Resolved::Type(Type::Basic(basic)));
    }
    let resolved = match name {
        "error" => Resolved::Type(Type::error()),
        "any" | "comparable" => Resolved::Type(Type::Interface(Vec::new())),
        "true" | "false" => Resolved::Const(Type::Basic(Basic::Bool)),
        "iota" => Resolved::Const(Type::Basic(Basic::UntypedInt)),
        "nil" => Resolved::Nil,
        _ => return None,
    };
    Some(resolved)
}

/// Underlying type of the predeclared `error` interface.
pub(crate) fn error_underlying() -> Type {
    Type::Interface(vec![Method {
        name: "Error".to_string(),
        sig: Signature {
            params: Vec::new(),
            results: vec![Type::Basic(Basic::String)],
            variadic: false,
        },
    }])
}

/// The default type an untyped constant takes when assigned to a variable.
pub(crate) fn default_type(ty: Type) -> Type {
    match ty {
        Type::Basic(Basic::UntypedInt) => Type::Basic(Basic::Int),
        Type::Basic(Basic::UntypedFloat) => Type::Basic(Basic::Float64),
        Type::Basic(Basic::UntypedRune) => Type::Basic(Basic::Int32),
        Type::Basic(Basic::UntypedString) => Type::Basic(Basic::String),
        other => other,
    }
}

pub(crate) fn is_untyped(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Basic(
            Basic::UntypedInt | Basic::UntypedFloat | Basic::UntypedRune | Basic::UntypedString
        ) | Type::Nil
    )
}
