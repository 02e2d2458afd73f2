//! Which source files are analyzed.
//!
//! Skipped files are still loaded so their declarations resolve; they only
//! produce no findings.

/// Whether the file carries the standard generated-code header
/// `// Code generated ... DO NOT EDIT.` before its package clause.
pub fn is_generated(source: &str) -> bool {
    source
        .lines()
        .map(str::trim_end)
        .take_while(|line| !line.starts_with("package "))
        .any(|line| line.starts_with("// Code generated ") && line.ends_with(" DO NOT EDIT."))
}

pub fn is_test_file(name: &str) -> bool {
    name.ends_with("_test.go")
}

pub fn should_skip(name: &str, source: &str, include_tests: bool) -> bool {
    (!include_tests && is_test_file(name)) || is_generated(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_header_must_precede_package() {
        assert!(is_generated(
            "// Code generated by mockgen. DO NOT EDIT.\n\npackage app\n"
        ));
        assert!(!is_generated(
            "package app\n\n// Code generated by mockgen. DO NOT EDIT.\n"
        ));
        assert!(!is_generated("// Code generated by hand.\npackage app\n"));
    }

    #[test]
    fn test_files_are_opt_in() {
        assert!(should_skip("worker_test.go", "package app\n", false));
        assert!(!should_skip("worker_test.go", "package app\n", true));
        assert!(!should_skip("worker.go", "package app\n", false));
    }
}
