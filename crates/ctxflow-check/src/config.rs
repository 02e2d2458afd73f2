//! Analysis configuration.
//!
//! Read from JSON (`ctxflow.json`), adjusted by command line flags, then
//! turned into a frozen [`Analyzer`] by [`AnalysisConfig::build`]. Every
//! malformed entry is reported here, before any source is analyzed.

use std::collections::BTreeSet;

use ctxflow_diag::Category;
use serde::{Deserialize, Serialize};

use crate::analyzer::Analyzer;
use crate::carrier::{CarrierRegistry, CarrierSpec};
use crate::deriver::{DeriverMatcher, FuncSpec};
use crate::shape::ShapeRegistry;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid carrier `{spec}`: {reason}")]
    InvalidCarrier { spec: String, reason: &'static str },
    #[error("invalid function `{spec}`: {reason}")]
    InvalidFuncSpec { spec: String, reason: &'static str },
    #[error("invalid deriver `{spec}`: {reason}")]
    InvalidDeriver { spec: String, reason: &'static str },
    #[error("unknown checker `{0}`")]
    UnknownChecker(String),
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// What to do when a callback cannot be traced to a definite answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UntraceablePolicy {
    /// Stay silent: only report what can be shown.
    #[default]
    Pass,
    /// Report the call as if the carrier were missing.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Extra carrier types, `pkg/path.Type`. `context.Context` is implied.
    pub carriers: Vec<String>,
    /// Derivation constraint: `,` separates alternatives, `+` joins required
    /// functions.
    pub deriver: String,
    /// Functions whose function-typed arguments run asynchronously.
    pub spawners: Vec<String>,
    /// Checker names to turn off.
    pub disabled: Vec<String>,
    pub untraceable: UntraceablePolicy,
    /// Use flow summaries before falling back to syntax.
    pub precise: bool,
    /// Analyze `_test.go` files too.
    pub include_tests: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            carriers: Vec::new(),
            deriver: String::new(),
            spawners: Vec::new(),
            disabled: Vec::new(),
            untraceable: UntraceablePolicy::Pass,
            precise: true,
            include_tests: false,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn carrier_registry(&self) -> Result<CarrierRegistry, ConfigError> {
        let specs = self
            .carriers
            .iter()
            .map(|text| CarrierSpec::parse(text))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CarrierRegistry::with_specs(specs))
    }

    pub fn disabled_checkers(&self) -> Result<BTreeSet<Category>, ConfigError> {
        self.disabled
            .iter()
            .map(|name| match Category::parse(name) {
                Some(category) if category.is_checker() => Ok(category),
                _ => Err(ConfigError::UnknownChecker(name.clone())),
            })
            .collect()
    }

    /// Validate every entry and freeze the result into an [`Analyzer`].
    pub fn build(self) -> Result<Analyzer, ConfigError> {
        let carriers = self.carrier_registry()?;
        let deriver = DeriverMatcher::parse(&self.deriver)?;
        let mut shapes = ShapeRegistry::with_defaults();
        for text in &self.spawners {
            shapes.add_spawner(FuncSpec::parse(text)?);
        }
        let disabled = self.disabled_checkers()?;
        Ok(Analyzer::new(carriers, shapes, deriver, disabled, self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = AnalysisConfig::from_json(r#"{ "deriver": "github.com/acme/apm.Derive" }"#)
            .expect("valid json");
        assert!(config.precise);
        assert_eq!(config.untraceable, UntraceablePolicy::Pass);
        assert!(config.carriers.is_empty());
    }

    #[test]
    fn strict_policy_parses() {
        let config = AnalysisConfig::from_json(r#"{ "untraceable": "fail", "precise": false }"#)
            .expect("valid json");
        assert_eq!(config.untraceable, UntraceablePolicy::Fail);
        assert!(!config.precise);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = AnalysisConfig::from_json(r#"{ "carrier": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn build_rejects_bad_entries_before_analysis() {
        let bad_deriver = AnalysisConfig {
            deriver: "a.A+".to_string(),
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            bad_deriver.build(),
            Err(ConfigError::InvalidDeriver { .. })
        ));

        let bad_checker = AnalysisConfig {
            disabled: vec!["syntax".to_string()],
            ..AnalysisConfig::default()
        };
        let err = bad_checker.build().err().expect("error");
        assert_eq!(err.to_string(), "unknown checker `syntax`");

        let bad_spawner = AnalysisConfig {
            spawners: vec!["spawn".to_string()],
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            bad_spawner.build(),
            Err(ConfigError::InvalidFuncSpec { .. })
        ));
    }
}
