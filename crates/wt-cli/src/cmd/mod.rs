pub mod dev;
pub mod doctor;
pub mod down;
pub mod init;
pub mod ports;
pub mod refresh;
pub mod run;
pub mod status;
pub mod up;

use anyhow::Context;
use std::path::Path;
use wt_core::config::WarnLevel;
use wt_core::lifecycle::Project;
use wt_core::{detect, WtError};

/// Load config and hooks, refusing configs with validation errors.
pub fn load_project(root: &Path) -> anyhow::Result<Project> {
    let project = Project::load(root)
        .with_context(|| format!("failed to load project at {}", root.display()))?;

    let mut errors = Vec::new();
    for issue in project.config.validate() {
        match issue.level {
            WarnLevel::Warning => tracing::warn!("config: {}", issue.message),
            WarnLevel::Error => errors.push(issue.message),
        }
    }
    if !errors.is_empty() {
        return Err(WtError::InvalidConfig(errors.join("; ")).into());
    }
    Ok(project)
}

/// The explicit feature, or the one whose tree contains the current directory.
pub fn resolve_feature(project: &Project, explicit: Option<&str>) -> anyhow::Result<String> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(detect::resolve_feature(
        explicit,
        &cwd,
        &project.config.worktrees.dir,
    )?)
}
