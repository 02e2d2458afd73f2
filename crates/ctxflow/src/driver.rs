use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use ctxflow_ast::{FileId, SourceFile};
use ctxflow_check::skip::{is_test_file, should_skip};
use ctxflow_check::{AnalysisConfig, ConfigError, UntraceablePolicy};
use ctxflow_diag::{Diagnostic, SourceLocation, SourceMap};
use ctxflow_sema::Program;
use ctxflow_syntax::parse_source;
use tracing::{debug, info};

/// Configuration file looked up in the analysis root.
pub const DEFAULT_CONFIG: &str = "ctxflow.json";

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no `module` line in `{}`", path.display())]
    MissingModule { path: PathBuf },
    #[error("`{}`: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DriverError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        DriverError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Command line overrides, applied on top of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOptions {
    pub root: PathBuf,
    pub config: Option<PathBuf>,
    pub strict: bool,
    pub no_precise: bool,
    pub include_tests: bool,
}

/// Read the configuration for `options`: the explicit file if given, else
/// `ctxflow.json` in the root when present, else defaults. Flags win.
pub fn load_config(options: &CheckOptions) -> Result<AnalysisConfig, DriverError> {
    let path = match &options.config {
        Some(path) => Some(path.clone()),
        None => Some(options.root.join(DEFAULT_CONFIG)).filter(|path| path.is_file()),
    };
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(&path).map_err(|err| DriverError::io(&path, err))?;
            debug!(path = %path.display(), "loaded configuration");
            AnalysisConfig::from_json(&text).map_err(|source| DriverError::Config { path, source })?
        }
        None => AnalysisConfig::default(),
    };
    if options.strict {
        config.untraceable = UntraceablePolicy::Fail;
    }
    if options.no_precise {
        config.precise = false;
    }
    if options.include_tests {
        config.include_tests = true;
    }
    Ok(config)
}

/// Every loaded source of one analysis root.
#[derive(Debug)]
pub struct Workspace {
    pub module: String,
    pub program: Program,
    pub sources: SourceMap,
    /// Files whose functions are analyzed.
    pub targets: BTreeSet<FileId>,
    /// Parse failures, one or more per unparsable file.
    pub syntax: Vec<Diagnostic>,
}

impl Workspace {
    /// Load the module rooted at `root` and its `vendor/` dependencies.
    pub fn load(root: &Path, include_tests: bool) -> Result<Self, DriverError> {
        let go_mod = root.join("go.mod");
        let text = fs::read_to_string(&go_mod).map_err(|err| DriverError::io(&go_mod, err))?;
        let module = module_path(&text).ok_or(DriverError::MissingModule { path: go_mod })?;

        let mut loader = Loader {
            root,
            include_tests,
            next_file: 0,
            packages: BTreeMap::new(),
            sources: SourceMap::new(),
            targets: BTreeSet::new(),
            syntax: Vec::new(),
        };
        let vendor = root.join("vendor");
        if vendor.is_dir() {
            loader.walk(&vendor, &vendor, None, false)?;
        }
        loader.walk(root, root, Some(&module), true)?;

        let mut program = Program::new();
        for (path, files) in loader.packages {
            program.add_package(path, files);
        }
        info!(
            module = %module,
            files = loader.next_file,
            targets = loader.targets.len(),
            "loaded workspace"
        );
        Ok(Workspace {
            module,
            program,
            sources: loader.sources,
            targets: loader.targets,
            syntax: loader.syntax,
        })
    }
}

/// The module path declared by a `go.mod` file.
pub fn module_path(go_mod: &str) -> Option<String> {
    go_mod.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("module")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let path = rest.trim().trim_matches('"');
        (!path.is_empty()).then(|| path.to_string())
    })
}

struct Loader<'r> {
    root: &'r Path,
    include_tests: bool,
    next_file: u32,
    packages: BTreeMap<String, Vec<SourceFile>>,
    sources: SourceMap,
    targets: BTreeSet<FileId>,
    syntax: Vec<Diagnostic>,
}

impl Loader<'_> {
    /// Load every package below `dir`. Import paths are relative to `base`,
    /// prefixed with `module` when given. Only `analyzed` files become
    /// targets.
    fn walk(&mut self, dir: &Path, base: &Path, module: Option<&str>, analyzed: bool) -> Result<(), DriverError> {
        let mut entries = fs::read_dir(dir)
            .map_err(|err| DriverError::io(dir, err))?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| DriverError::io(dir, err))?;
        entries.sort();

        let rel = dir.strip_prefix(base).unwrap_or(dir);
        let rel = rel
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let import_path = match (module, rel.is_empty()) {
            (Some(module), true) => module.to_string(),
            (Some(module), false) => format!("{module}/{rel}"),
            (None, _) => rel,
        };

        for path in &entries {
            if path.is_dir() {
                let name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
                let skipped = name.starts_with('.')
                    || name.starts_with('_')
                    || name == "testdata"
                    || (analyzed && *path == self.root.join("vendor"));
                if !skipped {
                    self.walk(path, base, module, analyzed)?;
                }
            } else if path.extension().is_some_and(|ext| ext == "go") && !import_path.is_empty() {
                self.load_file(path, &import_path, analyzed)?;
            }
        }
        Ok(())
    }

    fn load_file(&mut self, path: &Path, import_path: &str, analyzed: bool) -> Result<(), DriverError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_test_file(&name) && !(analyzed && self.include_tests) {
            return Ok(());
        }
        let text = fs::read_to_string(path).map_err(|err| DriverError::io(path, err))?;
        let file = FileId(self.next_file);
        self.next_file += 1;
        let shown = path.strip_prefix(self.root).unwrap_or(path).display().to_string();
        self.sources.add(file.0, shown.as_str(), text.as_str());

        let parsed = match parse_source(&text, file) {
            Ok(parsed) => parsed,
            Err(diags) => {
                debug!(file = %shown, errors = diags.len(), "parse failed");
                let whole_file = SourceLocation {
                    file_id: file.0,
                    start: 0,
                    end: 0,
                };
                self.syntax.extend(diags.into_iter().map(|diag| match diag.location {
                    Some(_) => diag,
                    None => diag.at(whole_file),
                }));
                return Ok(());
            }
        };
        if analyzed && !should_skip(&name, &text, self.include_tests) {
            self.targets.insert(file);
        }
        // External test packages live next to the package they test.
        let package = if parsed.package.name.ends_with("_test") {
            format!("{import_path}_test")
        } else {
            import_path.to_string()
        };
        self.packages.entry(package).or_default().push(parsed);
        Ok(())
    }
}

/// Diagnostics of one run with the sources they point into.
#[derive(Debug)]
pub struct CheckOutcome {
    pub diagnostics: Vec<Diagnostic>,
    pub sources: SourceMap,
}

impl CheckOutcome {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Load, analyze and collect every diagnostic for `options.root`.
pub fn check(options: &CheckOptions) -> Result<CheckOutcome, DriverError> {
    let config = load_config(options)?;
    let include_tests = config.include_tests;
    let analyzer = config.build()?;
    let workspace = Workspace::load(&options.root, include_tests)?;
    let report = analyzer.analyze(&workspace.program, &workspace.sources, &workspace.targets);

    let mut diagnostics = workspace.syntax;
    diagnostics.extend(report.diagnostics);
    diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    Ok(CheckOutcome {
        diagnostics,
        sources: workspace.sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_path_reads_the_module_line() {
        assert_eq!(
            module_path("// comment\nmodule example.com/app\n\ngo 1.22\n").as_deref(),
            Some("example.com/app")
        );
        assert_eq!(module_path("module \"example.com/quoted\"\n").as_deref(), Some("example.com/quoted"));
        assert_eq!(module_path("modules example.com/app\n"), None);
        assert_eq!(module_path("go 1.22\n"), None);
    }

    #[test]
    fn flags_override_the_file() {
        let options = CheckOptions {
            root: PathBuf::from("/nonexistent"),
            strict: true,
            no_precise: true,
            include_tests: true,
            ..CheckOptions::default()
        };
        let config = load_config(&options).expect("defaults");
        assert_eq!(config.untraceable, UntraceablePolicy::Fail);
        assert!(!config.precise);
        assert!(config.include_tests);
    }

    #[test]
    fn unparsable_files_become_syntax_diagnostics() {
        let root = std::env::temp_dir().join(format!("ctxflow-driver-syntax-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("worker")).expect("temp dir should be creatable");
        fs::write(root.join("go.mod"), "module example.com/svc\n").expect("write go.mod");
        fs::write(root.join("worker/broken.go"), "package worker\n\nfunc (\n").expect("write source");

        let workspace = Workspace::load(&root, false);
        let _ = fs::remove_dir_all(&root);
        let workspace = workspace.expect("loads despite the parse error");

        assert!(workspace.targets.is_empty());
        assert!(!workspace.syntax.is_empty());
        let file = workspace.syntax[0].location.expect("located").file_id;
        assert_eq!(workspace.sources.name(file), Some("worker/broken.go"));
    }

    #[test]
    fn an_explicit_config_must_exist() {
        let options = CheckOptions {
            root: PathBuf::from("/nonexistent"),
            config: Some(PathBuf::from("/nonexistent/ctxflow.json")),
            ..CheckOptions::default()
        };
        assert!(matches!(load_config(&options), Err(DriverError::Io { .. })));
    }
}
