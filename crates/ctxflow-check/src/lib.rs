//! Carrier propagation checks.
//!
//! Given a resolved [`Program`], the [`Analyzer`] finds every place where
//! asynchronous work is spawned (`go` statements and calls matching a
//! registered [`ApiShape`]) inside a function that has a carrier parameter,
//! and verifies that the spawned callback uses the carrier (or derives a new
//! one). Verdicts pass through the suppression [`Ledger`] before they become
//! diagnostics.
//!
//! The pieces, leaf first:
//! - [`carrier`]: which types count as carriers,
//! - [`scope`]: carrier parameters of a signature,
//! - [`shape`]: spawn-like call shapes and the call-site matcher,
//! - [`trace`]: whether a callback expression captures the carrier,
//! - [`deriver`]: the derivation-call constraint,
//! - [`pattern`]: reusable checks composing the above into verdicts.

pub mod analyzer;
pub mod assign;
pub mod carrier;
pub mod config;
pub mod deriver;
pub mod directive;
pub mod ledger;
pub mod pattern;
pub mod scope;
pub mod shape;
pub mod skip;
pub mod trace;

use ctxflow_flow::FlowProgram;
use ctxflow_sema::{FuncIndex, Program, TypeInfo};

pub use analyzer::{Analyzer, Report};
pub use carrier::{CarrierRegistry, CarrierSpec};
pub use config::{AnalysisConfig, ConfigError, UntraceablePolicy};
pub use deriver::{DeriverMatcher, FuncSpec, TraceResult};
pub use ledger::Ledger;
pub use pattern::{Pattern, Verdict};
pub use scope::CarrierScope;
pub use shape::{ApiShape, CallbackSlot, ShapeMatch, ShapeRegistry};
pub use trace::{Capture, CaptureStrategy, Tracer};

/// Everything a check needs to look at while analyzing one program.
#[derive(Clone, Copy)]
pub struct CheckContext<'a> {
    pub program: &'a Program,
    pub info: &'a TypeInfo,
    pub index: &'a FuncIndex<'a>,
    /// Present unless the precise strategy is disabled.
    pub flow: Option<&'a FlowProgram>,
    pub carriers: &'a CarrierRegistry,
    pub shapes: &'a ShapeRegistry,
    pub deriver: &'a DeriverMatcher,
}
