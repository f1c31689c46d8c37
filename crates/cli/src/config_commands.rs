use std::path::Path;

use anyhow::Result;

use chatrelay_config::{Severity, ValidationResult, validate};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Validate the config file and print its diagnostics. Exits with status 1
/// when there are errors.
pub fn check(path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    for line in report(&result, verbose) {
        eprintln!("{line}");
    }

    if result.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

/// Diagnostic lines followed by a summary line.
fn report(result: &ValidationResult, verbose: bool) -> Vec<String> {
    let mut lines: Vec<String> = result
        .diagnostics
        .iter()
        .filter(|d| verbose || d.severity != Severity::Info)
        .map(|d| {
            let (color, label) = match d.severity {
                Severity::Error => (RED, "error"),
                Severity::Warning => (YELLOW, "warning"),
                Severity::Info => (CYAN, "info"),
            };
            if d.path.is_empty() {
                format!("  {BOLD}{color}{label}{RESET} {}", d.message)
            } else {
                format!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message)
            }
        })
        .collect();
    if !lines.is_empty() {
        lines.push(String::new());
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        lines.push("No issues found.".into());
    } else {
        lines.push(format!("{errors} error(s), {warnings} warning(s)"));
    }
    lines
}
