//! `wt init`: config template, starter scripts and `.gitignore` entries.

use crate::error::{Result, WtError};
use crate::io::{atomic_write, ensure_gitignore_entries, make_executable};
use crate::paths;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Local-only files that must never be committed.
pub const GITIGNORE_ENTRIES: &[&str] = &[
    paths::LOCAL_CONFIG_FILE,
    paths::ALLOCATIONS_FILE,
    paths::ALLOCATIONS_LOCK_FILE,
    ".wt/logs/",
];

const ENV_DOCS: &str = "\
# Available environment variables:
#   WT_PROJECT      Project name from config
#   WT_PROJECT_DIR  Absolute path to the project root
#   WT_FEATURE      Feature name (e.g. \"my-feature\")
#   WT_FEATURE_DIR  Absolute path to the feature worktree
#   WT_PORT         First allocated port (same as WT_PORT_1)
#   WT_PORT_1..N    One variable per allocated port (N = port.per_feature)
#
# Working directory is the feature worktree.";

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub project_name: String,
    pub created: Vec<PathBuf>,
    pub gitignore_added: Vec<String>,
}

pub fn config_template(project_name: &str) -> String {
    format!(
        r#"# wt project configuration

name: {project_name}

worktrees:
  # Where feature worktrees are created, relative to the project root
  dir: trees
  # Prefix for feature branches (feature/my-feature)
  branch_prefix: feature/

port:
  # First port of the allocation pool
  base: 3000
  # Ports reserved for each feature
  per_feature: 2
  # Total ports in the pool
  max: 100

scripts:
  # Runs after worktree creation and env file generation (relative to .wt/)
  setup: scripts/setup.sh
  # Runs before worktree removal (relative to .wt/)
  cleanup: scripts/cleanup.sh

# commands:
#   - name: dev
#     command: npm run dev
#     description: Start development server
#     scope: feature

# env_files:
#   - path: .
#     source: .env.example
#     dest: .env
#     replace:
#       PORT: "${{WT_PORT_1}}"

# services:
#   - name: api
#     command: npm run dev
#     working_dir: .
#     pre_hooks:
#       - npm install

# hooks:
#   - event: up
#     command: echo "Ready!"
#   - event: down
#     command: echo "Tearing down..."
#   - event: run
#     command: echo "Command finished!"
"#
    )
}

pub fn setup_script() -> String {
    format!(
        "#!/usr/bin/env bash
set -euo pipefail

# Runs during `wt up <feature>`, after the worktree and env files exist.
#
{ENV_DOCS}

echo \"Setting up feature: $WT_FEATURE\"

# npm install
# npm run db:migrate
"
    )
}

pub fn cleanup_script() -> String {
    format!(
        "#!/usr/bin/env bash
set -euo pipefail

# Runs during `wt down <feature>`, before the worktree is removed.
#
{ENV_DOCS}

echo \"Cleaning up feature: $WT_FEATURE\"

# dropdb \"myapp_${{WT_FEATURE}}\" --if-exists
# docker compose down
"
    )
}

/// Name used for a fresh config: the root directory's name.
pub fn default_project_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "project".to_string())
}

pub fn init(root: &Path) -> Result<InitReport> {
    let config_path = paths::config_path(root);
    if config_path.exists() {
        return Err(WtError::AlreadyInitialized(config_path));
    }

    let project_name = default_project_name(root);
    let scripts = paths::scripts_dir(root);
    std::fs::create_dir_all(&scripts)?;

    atomic_write(&config_path, config_template(&project_name).as_bytes())?;
    let mut created = vec![config_path];

    for (file, body) in [("setup.sh", setup_script()), ("cleanup.sh", cleanup_script())] {
        let path = scripts.join(file);
        atomic_write(&path, body.as_bytes())?;
        make_executable(&path)?;
        created.push(path);
    }

    let gitignore_added = ensure_gitignore_entries(root, GITIGNORE_ENTRIES)?;
    tracing::info!(project = %project_name, root = %root.display(), "initialized project");

    Ok(InitReport {
        project_name,
        created,
        gitignore_added,
    })
}
