use crate::config::{Config, WarnLevel};
use crate::paths;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub pass: bool,
    pub message: String,
}

impl CheckResult {
    fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            pass: true,
            message: message.into(),
        }
    }

    fn fail(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            pass: false,
            message: message.into(),
        }
    }
}

/// Every diagnostic for the project at `root`, in display order.
pub fn run_checks(root: &Path) -> Vec<CheckResult> {
    vec![
        check_tool("git"),
        check_config_exists(root),
        check_config_valid(root),
    ]
}

pub fn all_passed(results: &[CheckResult]) -> bool {
    results.iter().all(|r| r.pass)
}

pub fn check_tool(tool: &str) -> CheckResult {
    let name = format!("{tool} installed");
    match which::which(tool) {
        Ok(path) => CheckResult::pass(&name, path.display().to_string()),
        Err(_) => CheckResult::fail(&name, "not found in PATH"),
    }
}

pub fn check_config_exists(root: &Path) -> CheckResult {
    const NAME: &str = ".wt/config.yaml exists";
    let path = paths::config_path(root);
    if path.exists() {
        CheckResult::pass(NAME, path.display().to_string())
    } else {
        CheckResult::fail(NAME, "not found; run 'wt init'")
    }
}

/// Loads the merged config; any `validate()` error fails the check, warnings are reported.
pub fn check_config_valid(root: &Path) -> CheckResult {
    const NAME: &str = "config valid";
    let config = match Config::load(root) {
        Ok(c) => c,
        Err(e) => return CheckResult::fail(NAME, e.to_string()),
    };

    let issues = config.validate();
    let errors: Vec<&str> = issues
        .iter()
        .filter(|w| w.level == WarnLevel::Error)
        .map(|w| w.message.as_str())
        .collect();
    if !errors.is_empty() {
        return CheckResult::fail(NAME, errors.join(", "));
    }

    let mut message = format!("project: {}", config.name);
    for warning in issues.iter().filter(|w| w.level == WarnLevel::Warning) {
        message.push_str(&format!("; warning: {}", warning.message));
    }
    CheckResult::pass(NAME, message)
}
