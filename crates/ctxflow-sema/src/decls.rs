//! Package-level declaration registry.
//!
//! Filled in by the collection phase of the checker, then queried while
//! resolving function bodies: named type definitions with their method sets,
//! package functions and package variables.

use std::collections::BTreeMap;

use ctxflow_types::{FuncRef, Named, Signature, Type};

use crate::universe::error_underlying;
use crate::{BindingId, Resolved};

/// Limit on named-type and embedding chains followed during lookups.
const MAX_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub(crate) struct TypeDef {
    pub params: Vec<String>,
    /// For aliases, the aliased type itself.
    pub underlying: Type,
    pub alias: bool,
    pub methods: BTreeMap<String, MethodDef>,
}

#[derive(Debug, Clone)]
pub(crate) struct MethodDef {
    /// Type parameter names as spelled in the receiver (`func (p *Pool[T])`).
    pub recv_params: Vec<String>,
    pub sig: Signature,
}

#[derive(Debug, Clone)]
pub(crate) struct FuncDef {
    pub type_params: Vec<String>,
    pub sig: Signature,
}

/// A field or method found by selector lookup.
#[derive(Debug, Clone)]
pub(crate) enum Member {
    Field(Type),
    Method { func: FuncRef, sig: Signature },
}

#[derive(Debug, Default)]
pub(crate) struct Decls {
    types: BTreeMap<String, BTreeMap<String, TypeDef>>,
    funcs: BTreeMap<String, BTreeMap<String, FuncDef>>,
    vars: BTreeMap<String, BTreeMap<String, BindingId>>,
}

fn bind_params(params: &[String], args: &[Type]) -> BTreeMap<String, Type> {
    params.iter().cloned().zip(args.iter().cloned()).collect()
}

impl Decls {
    // -- Registration --

    pub fn declare_type(&mut self, path: &str, name: &str, params: Vec<String>, alias: bool) {
        self.types
            .entry(path.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert(TypeDef {
                params,
                underlying: Type::Unknown,
                alias,
                methods: BTreeMap::new(),
            });
    }

    pub fn set_underlying(&mut self, path: &str, name: &str, underlying: Type) {
        if let Some(def) = self.types.get_mut(path).and_then(|defs| defs.get_mut(name)) {
            def.underlying = underlying;
        }
    }

    pub fn add_method(&mut self, path: &str, recv: &str, name: &str, method: MethodDef) {
        self.declare_type(path, recv, method.recv_params.clone(), false);
        if let Some(def) = self.types.get_mut(path).and_then(|defs| defs.get_mut(recv)) {
            def.methods.insert(name.to_string(), method);
        }
    }

    pub fn add_func(&mut self, path: &str, name: &str, def: FuncDef) {
        self.funcs
            .entry(path.to_string())
            .or_default()
            .insert(name.to_string(), def);
    }

    pub fn add_var(&mut self, path: &str, name: &str, id: BindingId) {
        self.vars
            .entry(path.to_string())
            .or_default()
            .insert(name.to_string(), id);
    }

    // -- Queries --

    pub fn type_def(&self, path: &str, name: &str) -> Option<&TypeDef> {
        self.types.get(path)?.get(name)
    }

    pub fn func(&self, func: &FuncRef) -> Option<&FuncDef> {
        if func.recv.is_some() {
            return None;
        }
        self.funcs.get(&func.path)?.get(&func.name)
    }

    /// Resolve `name` declared at package level in `path`.
    pub fn package_member(&self, path: &str, name: &str) -> Option<Resolved> {
        if self.func(&FuncRef::func(path, name)).is_some() {
            return Some(Resolved::Func(FuncRef::func(path, name)));
        }
        if let Some(def) = self.type_def(path, name) {
            if def.alias {
                return Some(Resolved::Type(def.underlying.clone()));
            }
            return Some(Resolved::Type(Type::named(path, name)));
        }
        let id = self.vars.get(path)?.get(name)?;
        Some(Resolved::Binding(*id))
    }

    /// Underlying type of `ty`, following chains of defined types.
    pub fn underlying(&self, ty: &Type) -> Type {
        let mut current = ty.clone();
        for _ in 0..MAX_DEPTH {
            let Type::Named(named) = &current else {
                return current;
            };
            if named.path.is_empty() && named.name == "error" {
                return error_underlying();
            }
            let Some(def) = self.type_def(&named.path, &named.name) else {
                return Type::Unknown;
            };
            let subst = bind_params(&def.params, &named.args);
            current = def.underlying.substitute(&subst);
        }
        Type::Unknown
    }

    /// Look up a field or method selected from a value of type `ty`.
    pub fn lookup_member(&self, ty: &Type, name: &str) -> Option<Member> {
        self.lookup_member_at(ty, name, 0)
    }

    fn lookup_member_at(&self, ty: &Type, name: &str, depth: usize) -> Option<Member> {
        if depth > MAX_DEPTH {
            return None;
        }
        let base = ty.deref();
        let owner = match base {
            Type::Named(named) => Some(named),
            _ => None,
        };
        if let Some(named) = owner
            && let Some(def) = self.type_def(&named.path, &named.name)
            && let Some(method) = def.methods.get(name)
        {
            let subst = bind_params(&method.recv_params, &named.args);
            return Some(Member::Method {
                func: FuncRef::method(&named.path, &named.name, name),
                sig: method.sig.substitute(&subst),
            });
        }
        match self.underlying(base) {
            Type::Struct(fields) => {
                if let Some(field) = fields.iter().find(|field| field.name == name) {
                    return Some(Member::Field(field.ty.clone()));
                }
                fields
                    .iter()
                    .filter(|field| field.embedded)
                    .find_map(|field| self.lookup_member_at(&field.ty, name, depth + 1))
            }
            Type::Interface(methods) => {
                let method = methods.iter().find(|method| method.name == name)?;
                let func = match owner {
                    Some(Named { path, name: recv, .. }) => FuncRef::method(path, recv, name),
                    None => FuncRef::method("", "interface", name),
                };
                Some(Member::Method {
                    func,
                    sig: method.sig.clone(),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxflow_types::{Basic, Field};

    fn sig(params: Vec<Type>) -> Signature {
        Signature {
            params,
            results: Vec::new(),
            variadic: false,
        }
    }

    #[test]
    fn method_lookup_substitutes_receiver_args() {
        let mut decls = Decls::default();
        decls.declare_type("conc/pool", "ResultPool", vec!["T".to_string()], false);
        decls.add_method(
            "conc/pool",
            "ResultPool",
            "Go",
            MethodDef {
                recv_params: vec!["R".to_string()],
                sig: sig(vec![Type::func(vec![], vec![Type::Param("R".to_string())])]),
            },
        );
        let recv = Type::pointer(Type::Named(Named {
            path: "conc/pool".to_string(),
            name: "ResultPool".to_string(),
            args: vec![Type::Basic(Basic::Int)],
        }));
        let Some(Member::Method { func, sig }) = decls.lookup_member(&recv, "Go") else {
            panic!("expected method");
        };
        assert_eq!(func, FuncRef::method("conc/pool", "ResultPool", "Go"));
        assert_eq!(sig.to_string(), "func(func() int)");
    }

    #[test]
    fn embedded_fields_are_promoted() {
        let mut decls = Decls::default();
        decls.declare_type("p", "Inner", Vec::new(), false);
        decls.set_underlying(
            "p",
            "Inner",
            Type::Struct(vec![Field {
                name: "run".to_string(),
                ty: Type::func(vec![], vec![]),
                embedded: false,
            }]),
        );
        decls.declare_type("p", "Outer", Vec::new(), false);
        decls.set_underlying(
            "p",
            "Outer",
            Type::Struct(vec![Field {
                name: "Inner".to_string(),
                ty: Type::pointer(Type::named("p", "Inner")),
                embedded: true,
            }]),
        );
        let found = decls.lookup_member(&Type::named("p", "Outer"), "run");
        assert!(matches!(found, Some(Member::Field(ty)) if ty.is_func()));
    }

    #[test]
    fn error_interface_has_error_method() {
        let decls = Decls::default();
        let found = decls.lookup_member(&Type::error(), "Error");
        assert!(matches!(found, Some(Member::Method { func, .. }) if func.name == "Error"));
    }
}
