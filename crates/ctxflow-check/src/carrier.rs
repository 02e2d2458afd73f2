//! Carrier types.

use std::fmt;

use ctxflow_types::{Type, same_package};

use crate::config::ConfigError;
use crate::deriver::split_qualified;

/// A named type that counts as a carrier, such as `context.Context`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CarrierSpec {
    pub path: String,
    pub name: String,
}

impl CarrierSpec {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    /// Parse `pkg/path.Type`.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidCarrier {
            spec: text.to_string(),
            reason,
        };
        let parts = split_qualified(text.trim()).ok_or_else(|| invalid("expected `pkg/path.Type`"))?;
        match parts.as_slice() {
            [path, name] => Ok(Self::new(*path, *name)),
            _ => Err(invalid("expected `pkg/path.Type`")),
        }
    }

    /// Whether `ty` names this carrier, through any number of pointers and
    /// regardless of a major-version suffix on the package path.
    pub fn matches(&self, ty: &Type) -> bool {
        match ty.deref() {
            Type::Named(named) => named.name == self.name && same_package(&named.path, &self.path),
            _ => false,
        }
    }
}

impl fmt::Display for CarrierSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.path, self.name)
    }
}

/// The set of carrier types of an analysis run. `context.Context` is always a
/// member.
#[derive(Debug, Clone)]
pub struct CarrierRegistry {
    specs: Vec<CarrierSpec>,
}

impl Default for CarrierRegistry {
    fn default() -> Self {
        Self {
            specs: vec![CarrierSpec::new("context", "Context")],
        }
    }
}

impl CarrierRegistry {
    /// The built-in carrier plus every spec in `extra`.
    pub fn with_specs(extra: impl IntoIterator<Item = CarrierSpec>) -> Self {
        let mut registry = Self::default();
        for spec in extra {
            if !registry.specs.contains(&spec) {
                registry.specs.push(spec);
            }
        }
        registry
    }

    pub fn is_carrier(&self, ty: &Type) -> bool {
        self.specs.iter().any(|spec| spec.matches(ty))
    }

    pub fn specs(&self) -> &[CarrierSpec] {
        &self.specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_carrier_matches_through_pointers() {
        let registry = CarrierRegistry::default();
        let ctx = Type::named("context", "Context");
        assert!(registry.is_carrier(&ctx));
        assert!(registry.is_carrier(&Type::pointer(Type::pointer(ctx))));
        assert!(!registry.is_carrier(&Type::named("example.com/context", "Context")));
        assert!(!registry.is_carrier(&Type::named("context", "CancelFunc")));
    }

    #[test]
    fn custom_carrier_ignores_major_version() {
        let spec = CarrierSpec::parse("github.com/acme/reqctx.Handle").expect("valid");
        let registry = CarrierRegistry::with_specs([spec]);
        assert!(registry.is_carrier(&Type::named("github.com/acme/reqctx/v3", "Handle")));
        assert_eq!(registry.specs().len(), 2);
    }

    #[test]
    fn malformed_carrier_is_rejected() {
        assert!(CarrierSpec::parse("Context").is_err());
        assert!(CarrierSpec::parse("a/b.C.D").is_err());
        assert!(CarrierSpec::parse("").is_err());
    }
}
