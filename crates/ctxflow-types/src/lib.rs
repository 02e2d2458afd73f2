//! Type representations for ctxflow.
//!
//! This crate defines the semantic types produced by name resolution in
//! `ctxflow-sema`. These are distinct from syntactic type expressions (which
//! live in `ctxflow-ast`). Named types are identified structurally by their
//! package path and name, so two packages that were loaded separately still
//! agree on what `context.Context` is.

use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Package paths
// ---------------------------------------------------------------------------

/// Strip a trailing major-version component (`/v2`, `/v3`, ...) from an import
/// path. `/v0` and `/v1` are not version suffixes.
pub fn strip_major_version(path: &str) -> &str {
    let Some((head, last)) = path.rsplit_once('/') else {
        return path;
    };
    match last.strip_prefix('v').map(str::parse::<u32>) {
        Some(Ok(major)) if major >= 2 => head,
        _ => path,
    }
}

/// Whether two import paths name the same package modulo a major-version
/// suffix.
pub fn same_package(a: &str, b: &str) -> bool {
    strip_major_version(a) == strip_major_version(b)
}

/// The default package name for an import path: the last path component,
/// ignoring any major-version suffix.
pub fn package_name(path: &str) -> &str {
    let path = strip_major_version(path);
    path.rsplit_once('/').map_or(path, |(_, last)| last)
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Predeclared non-composite types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Basic {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    UntypedInt,
    UntypedFloat,
    UntypedRune,
    UntypedString,
}

impl Basic {
    /// Look up a predeclared basic type by name. `byte` and `rune` resolve to
    /// their underlying integer types.
    pub fn from_name(name: &str) -> Option<Basic> {
        let basic = match name {
            "bool" => Basic::Bool,
            "int" => Basic::Int,
            "int8" => Basic::Int8,
            "int16" => Basic::Int16,
            "int32" | "rune" => Basic::Int32,
            "int64" => Basic::Int64,
            "uint" => Basic::Uint,
            "uint8" | "byte" => Basic::Uint8,
            "uint16" => Basic::Uint16,
            "uint32" => Basic::Uint32,
            "uint64" => Basic::Uint64,
            "uintptr" => Basic::Uintptr,
            "float32" => Basic::Float32,
            "float64" => Basic::Float64,
            "complex64" => Basic::Complex64,
            "complex128" => Basic::Complex128,
            "string" => Basic::String,
            _ => return None,
        };
        Some(basic)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Basic::Bool => "bool",
            Basic::Int => "int",
            Basic::Int8 => "int8",
            Basic::Int16 => "int16",
            Basic::Int32 => "int32",
            Basic::Int64 => "int64",
            Basic::Uint => "uint",
            Basic::Uint8 => "uint8",
            Basic::Uint16 => "uint16",
            Basic::Uint32 => "uint32",
            Basic::Uint64 => "uint64",
            Basic::Uintptr => "uintptr",
            Basic::Float32 => "float32",
            Basic::Float64 => "float64",
            Basic::Complex64 => "complex64",
            Basic::Complex128 => "complex128",
            Basic::String => "string",
            Basic::UntypedInt => "untyped int",
            Basic::UntypedFloat => "untyped float",
            Basic::UntypedRune => "untyped rune",
            Basic::UntypedString => "untyped string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

/// A reference to a named type, possibly instantiated.
///
/// `path` is empty for predeclared names such as `error`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Named {
    pub path: String,
    pub name: String,
    pub args: Vec<Type>,
}

impl Named {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// The uninstantiated origin of a generic type: `Iterator[int]` becomes
    /// `Iterator`.
    pub fn origin(&self) -> Named {
        Named {
            path: self.path.clone(),
            name: self.name.clone(),
            args: Vec::new(),
        }
    }

    /// Whether this names `name` declared in `path`, modulo major-version
    /// suffixes on the path.
    pub fn is(&self, path: &str, name: &str) -> bool {
        self.name == name && same_package(&self.path, path)
    }
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
    /// The last parameter is `...T`, stored as `[]T`.
    pub variadic: bool,
}

impl Signature {
    /// The type of the argument at `index`, expanding a variadic tail.
    pub fn param_at(&self, index: usize) -> Option<Type> {
        let last = self.params.len().checked_sub(1)?;
        if self.variadic && index >= last {
            return match &self.params[last] {
                Type::Slice(elem) => Some((**elem).clone()),
                other => Some(other.clone()),
            };
        }
        self.params.get(index).cloned()
    }

    /// The single result type, or a tuple for several results.
    pub fn result_type(&self) -> Type {
        match self.results.as_slice() {
            [] => Type::Tuple(Vec::new()),
            [single] => single.clone(),
            many => Type::Tuple(many.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub embedded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Method {
    pub name: String,
    pub sig: Signature,
}

/// A semantic type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Basic(Basic),
    Named(Named),
    /// A type parameter of the enclosing generic declaration.
    Param(String),
    Pointer(Box<Type>),
    Slice(Box<Type>),
    Array(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Chan(ChanDir, Box<Type>),
    Func(Box<Signature>),
    Struct(Vec<Field>),
    Interface(Vec<Method>),
    /// Result of a multi-value call.
    Tuple(Vec<Type>),
    /// The type of the `nil` literal.
    Nil,
    /// Anything resolution could not determine.
    Unknown,
}

impl Type {
    pub fn named(path: impl Into<String>, name: impl Into<String>) -> Type {
        Type::Named(Named::new(path, name))
    }

    pub fn pointer(inner: Type) -> Type {
        Type::Pointer(Box::new(inner))
    }

    pub fn func(params: Vec<Type>, results: Vec<Type>) -> Type {
        Type::Func(Box::new(Signature {
            params,
            results,
            variadic: false,
        }))
    }

    pub fn error() -> Type {
        Type::named("", "error")
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// Strip every level of pointer indirection.
    pub fn deref(&self) -> &Type {
        let mut ty = self;
        while let Type::Pointer(inner) = ty {
            ty = inner;
        }
        ty
    }

    /// The named type after stripping pointers, if any.
    pub fn as_named(&self) -> Option<&Named> {
        match self.deref() {
            Type::Named(named) => Some(named),
            _ => None,
        }
    }

    pub fn as_signature(&self) -> Option<&Signature> {
        match self {
            Type::Func(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn is_func(&self) -> bool {
        matches!(self, Type::Func(_))
    }

    /// Replace type parameters by the types bound in `subst`.
    pub fn substitute(&self, subst: &BTreeMap<String, Type>) -> Type {
        if subst.is_empty() {
            return self.clone();
        }
        let sub = |ty: &Type| Box::new(ty.substitute(subst));
        match self {
            Type::Param(name) => subst.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::Named(named) => Type::Named(Named {
                path: named.path.clone(),
                name: named.name.clone(),
                args: named.args.iter().map(|arg| arg.substitute(subst)).collect(),
            }),
            Type::Pointer(inner) => Type::Pointer(sub(inner)),
            Type::Slice(inner) => Type::Slice(sub(inner)),
            Type::Array(inner) => Type::Array(sub(inner)),
            Type::Map(key, value) => Type::Map(sub(key), sub(value)),
            Type::Chan(dir, elem) => Type::Chan(*dir, sub(elem)),
            Type::Func(sig) => Type::Func(Box::new(sig.substitute(subst))),
            Type::Struct(fields) => Type::Struct(
                fields
                    .iter()
                    .map(|field| Field {
                        name: field.name.clone(),
                        ty: field.ty.substitute(subst),
                        embedded: field.embedded,
                    })
                    .collect(),
            ),
            Type::Interface(methods) => Type::Interface(
                methods
                    .iter()
                    .map(|method| Method {
                        name: method.name.clone(),
                        sig: method.sig.substitute(subst),
                    })
                    .collect(),
            ),
            Type::Tuple(items) => Type::Tuple(items.iter().map(|ty| ty.substitute(subst)).collect()),
            Type::Basic(_) | Type::Nil | Type::Unknown => self.clone(),
        }
    }

    /// Element type produced by indexing or ranging over this type.
    pub fn element(&self) -> Type {
        match self.deref() {
            Type::Slice(elem) | Type::Array(elem) | Type::Chan(_, elem) => (**elem).clone(),
            Type::Map(_, value) => (**value).clone(),
            Type::Basic(Basic::String | Basic::UntypedString) => Type::Basic(Basic::Uint8),
            _ => Type::Unknown,
        }
    }
}

impl Signature {
    pub fn substitute(&self, subst: &BTreeMap<String, Type>) -> Signature {
        Signature {
            params: self.params.iter().map(|ty| ty.substitute(subst)).collect(),
            results: self.results.iter().map(|ty| ty.substitute(subst)).collect(),
            variadic: self.variadic,
        }
    }
}

// ---------------------------------------------------------------------------
// Function references
// ---------------------------------------------------------------------------

/// Identity of a declared function or method: package path, receiver origin
/// type name (methods only) and member name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef {
    pub path: String,
    pub recv: Option<String>,
    pub name: String,
}

impl FuncRef {
    pub fn func(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            recv: None,
            name: name.into(),
        }
    }

    pub fn method(path: impl Into<String>, recv: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            recv: Some(recv.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.recv {
            Some(recv) => write!(f, "({}.{recv}).{}", self.path, self.name),
            None if self.path.is_empty() => write!(f, "{}", self.name),
            None => write!(f, "{}.{}", self.path, self.name),
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Type]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func(")?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            match param {
                Type::Slice(elem) if self.variadic && idx + 1 == self.params.len() => {
                    write!(f, "...{elem}")?
                }
                other => write!(f, "{other}")?,
            }
        }
        write!(f, ")")?;
        match self.results.as_slice() {
            [] => Ok(()),
            [single] => write!(f, " {single}"),
            many => {
                write!(f, " (")?;
                write_list(f, many)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(basic) => write!(f, "{}", basic.as_str()),
            Type::Named(named) => {
                if named.path.is_empty() {
                    write!(f, "{}", named.name)?;
                } else {
                    write!(f, "{}.{}", package_name(&named.path), named.name)?;
                }
                if !named.args.is_empty() {
                    write!(f, "[")?;
                    write_list(f, &named.args)?;
                    write!(f, "]")?;
                }
                Ok(())
            }
            Type::Param(name) => write!(f, "{name}"),
            Type::Pointer(inner) => write!(f, "*{inner}"),
            Type::Slice(inner) => write!(f, "[]{inner}"),
            Type::Array(inner) => write!(f, "[N]{inner}"),
            Type::Map(key, value) => write!(f, "map[{key}]{value}"),
            Type::Chan(ChanDir::Both, elem) => write!(f, "chan {elem}"),
            Type::Chan(ChanDir::Send, elem) => write!(f, "chan<- {elem}"),
            Type::Chan(ChanDir::Recv, elem) => write!(f, "<-chan {elem}"),
            Type::Func(sig) => write!(f, "{sig}"),
            Type::Struct(fields) => {
                write!(f, "struct{{")?;
                for (idx, field) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, "; ")?;
                    }
                    if field.embedded {
                        write!(f, "{}", field.ty)?;
                    } else {
                        write!(f, "{} {}", field.name, field.ty)?;
                    }
                }
                write!(f, "}}")
            }
            Type::Interface(methods) if methods.is_empty() => write!(f, "any"),
            Type::Interface(methods) => {
                write!(f, "interface{{")?;
                for (idx, method) in methods.iter().enumerate() {
                    if idx > 0 {
                        write!(f, "; ")?;
                    }
                    let sig = method.sig.to_string();
                    write!(f, "{}{}", method.name, sig.trim_start_matches("func"))?;
                }
                write!(f, "}}")
            }
            Type::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Type::Nil => write!(f, "nil"),
            Type::Unknown => write!(f, "?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn major_version_suffix_is_stripped() {
        assert_eq!(strip_major_version("github.com/mpyw/gotask/v2"), "github.com/mpyw/gotask");
        assert_eq!(strip_major_version("example.com/lib/v1"), "example.com/lib/v1");
        assert_eq!(strip_major_version("example.com/v2x"), "example.com/v2x");
        assert_eq!(strip_major_version("context"), "context");
        assert!(same_package("github.com/a/b/v3", "github.com/a/b"));
        assert!(!same_package("github.com/a/b", "github.com/a/c"));
    }

    #[test]
    fn package_name_skips_version() {
        assert_eq!(package_name("golang.org/x/sync/errgroup"), "errgroup");
        assert_eq!(package_name("github.com/sourcegraph/conc/v2"), "conc");
        assert_eq!(package_name("sync"), "sync");
    }

    #[test]
    fn origin_drops_type_arguments() {
        let named = Named {
            path: "github.com/sourcegraph/conc/iter".to_string(),
            name: "Iterator".to_string(),
            args: vec![Type::Basic(Basic::Int)],
        };
        assert!(named.origin().args.is_empty());
        assert!(named.is("github.com/sourcegraph/conc/iter/v2", "Iterator"));
    }

    #[test]
    fn deref_strips_all_pointers() {
        let ctx = Type::named("context", "Context");
        let ptr = Type::pointer(Type::pointer(ctx.clone()));
        assert_eq!(ptr.deref(), &ctx);
        assert_eq!(ptr.as_named().map(|n| n.name.as_str()), Some("Context"));
    }

    #[test]
    fn substitute_replaces_params() {
        let sig = Type::func(vec![Type::Param("T".to_string())], vec![Type::error()]);
        let subst = BTreeMap::from([("T".to_string(), Type::Basic(Basic::String))]);
        assert_eq!(sig.substitute(&subst).to_string(), "func(string) error");
    }

    #[test]
    fn variadic_param_at_expands_tail() {
        let sig = Signature {
            params: vec![
                Type::named("context", "Context"),
                Type::Slice(Box::new(Type::func(vec![], vec![]))),
            ],
            results: vec![],
            variadic: true,
        };
        assert_eq!(sig.param_at(0), Some(Type::named("context", "Context")));
        assert_eq!(sig.param_at(5), Some(Type::func(vec![], vec![])));
        assert_eq!(sig.to_string(), "func(context.Context, ...func())");
    }

    #[test]
    fn func_ref_display() {
        assert_eq!(
            FuncRef::func("github.com/my/pkg", "Derive").to_string(),
            "github.com/my/pkg.Derive"
        );
        assert_eq!(
            FuncRef::method("github.com/my/pkg", "Scope", "Enter").to_string(),
            "(github.com/my/pkg.Scope).Enter"
        );
    }

    proptest! {
        #[test]
        fn prop_strip_is_idempotent(base in "[a-z]{1,8}(/[a-z]{1,8}){0,3}", major in 0u32..12) {
            let path = format!("{base}/v{major}");
            let once = strip_major_version(&path);
            prop_assert_eq!(strip_major_version(once), once);
            prop_assert!(same_package(&path, once));
        }
    }
}
