//! Driver for the ctxflow analyzer: loads a module from disk, runs the
//! checks and renders the findings.

mod driver;
mod report;

pub use driver::{
    CheckOptions, CheckOutcome, DEFAULT_CONFIG, DriverError, Workspace, check, load_config,
    module_path,
};
pub use report::{OutputFormat, render_json, render_text};
