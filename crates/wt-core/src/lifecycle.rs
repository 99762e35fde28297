//! `up`, `down` and `run`: the orchestration around a feature's lifetime.
//!
//! Ordering is the contract here. `up` allocates ports and creates the tree
//! before any user code runs. `down` runs hooks and the cleanup script while
//! the tree and its ports still exist, and only then removes and releases them.

use crate::config::{CommandScope, Config};
use crate::env::ScriptContext;
use crate::envfile::generate_env_files;
use crate::error::{Result, WtError};
use crate::git::Worktrees;
use crate::hooks::{self, HookEntry, HookEvent};
use crate::paths;
use crate::ports::{ports_for_index, PortStore};
use crate::runner::{self, CommandRunner};
use serde::Serialize;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// A loaded project: root, resolved config and merged hook list.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
    pub hooks: Vec<HookEntry>,
}

impl Project {
    /// Load the project at `root`. A relative root is anchored at the current directory.
    pub fn load(root: &Path) -> Result<Self> {
        let root = std::path::absolute(root)?;
        let config = Config::load(&root)?;
        let hooks = hooks::load_all_hooks(&root)?;
        Ok(Self {
            root,
            config,
            hooks,
        })
    }

    pub fn store(&self) -> PortStore {
        PortStore::new(&self.root)
    }

    pub fn tree_path(&self, feature: &str) -> PathBuf {
        paths::worktree_path(&self.root, &self.config.worktrees.dir, feature)
    }

    /// Directory that script paths are resolved against and confined to.
    pub fn scripts_base(&self) -> PathBuf {
        paths::wt_dir(&self.root)
    }

    pub fn context(&self, feature: &str, ports: Vec<u32>) -> ScriptContext {
        ScriptContext {
            root: self.root.clone(),
            feature: feature.to_string(),
            feature_dir: self.tree_path(feature),
            project_name: self.config.name.clone(),
            ports,
        }
    }

    /// Context for a feature that must already hold ports.
    pub fn context_for(&self, feature: &str) -> Result<ScriptContext> {
        let ports = self.store().ports_for(feature, &self.config.port)?;
        Ok(self.context(feature, ports))
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct UpReport {
    pub feature: String,
    pub branch: String,
    pub index: u32,
    pub ports: Vec<u32>,
    pub tree_path: PathBuf,
    /// False when the tree already existed and was reused.
    pub created: bool,
    pub hooks_run: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownReport {
    pub feature: String,
    pub ports: Vec<u32>,
    pub tree_removed: bool,
    pub hooks_run: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub command: String,
    pub feature: Option<String>,
    pub cwd: PathBuf,
    pub hooks_run: usize,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub struct Lifecycle<'a> {
    project: &'a Project,
    worktrees: &'a dyn Worktrees,
    runner: &'a dyn CommandRunner,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        project: &'a Project,
        worktrees: &'a dyn Worktrees,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            project,
            worktrees,
            runner,
        }
    }

    /// Bring a feature up. Safe to repeat: the slot and an existing tree are reused.
    pub fn up(&self, feature: &str) -> Result<UpReport> {
        paths::validate_feature_name(feature)?;
        let project = self.project;
        let config = &project.config;

        let index = project.store().allocate(feature, &config.port)?;
        let ports = ports_for_index(&config.port, index);

        let tree = project.tree_path(feature);
        let branch = config.worktrees.branch_for(feature);
        let created = if tree.exists() {
            tracing::info!(tree = %tree.display(), "reusing existing worktree");
            false
        } else {
            self.worktrees.add(&project.root, &tree, &branch)?;
            tracing::info!(tree = %tree.display(), branch = %branch, "created worktree");
            true
        };

        generate_env_files(&tree, &config.env_files, &ports)?;

        let context = project.context(feature, ports.clone());
        if let Some(setup) = &config.scripts.setup {
            tracing::info!(script = %setup, "running setup script");
            runner::run_script(self.runner, setup, &project.scripts_base(), &context, None)?;
        }
        let hooks_run = hooks::dispatch(self.runner, HookEvent::Up, &context, &project.hooks, None)?;

        Ok(UpReport {
            feature: feature.to_string(),
            branch,
            index,
            ports,
            tree_path: tree,
            created,
            hooks_run,
        })
    }

    /// Tear a feature down. A feature with no allocation or no tree is still cleaned up.
    pub fn down(&self, feature: &str) -> Result<DownReport> {
        paths::validate_feature_name(feature)?;
        let project = self.project;
        let config = &project.config;
        let store = project.store();

        let ports = store
            .load()?
            .ports_for(feature, &config.port)
            .unwrap_or_default();
        let context = project.context(feature, ports.clone());

        let tree = project.tree_path(feature);
        let tree_exists = tree.exists();
        let cwd = if tree_exists { tree.as_path() } else { project.root.as_path() };

        let hooks_run =
            hooks::dispatch(self.runner, HookEvent::Down, &context, &project.hooks, Some(cwd))?;
        if let Some(cleanup) = &config.scripts.cleanup {
            tracing::info!(script = %cleanup, "running cleanup script");
            runner::run_script(
                self.runner,
                cleanup,
                &project.scripts_base(),
                &context,
                Some(cwd),
            )?;
        }

        if tree_exists {
            self.worktrees.remove(&project.root, &tree)?;
            tracing::info!(tree = %tree.display(), "removed worktree");
        } else {
            tracing::info!(tree = %tree.display(), "no worktree to remove");
        }
        store.deallocate(feature)?;

        Ok(DownReport {
            feature: feature.to_string(),
            ports,
            tree_removed: tree_exists,
            hooks_run,
        })
    }

    /// Run the configured command `name`, then the `run` hooks.
    ///
    /// Feature-scoped commands need a feature with allocated ports and run in
    /// its tree. Project-scoped commands run at the root and take the feature's
    /// context only when one is given.
    pub fn run(&self, name: &str, feature: Option<&str>) -> Result<RunReport> {
        let project = self.project;
        let command = project.config.find_command(name)?;

        let (context, cwd) = match (command.scope, feature) {
            (CommandScope::Feature, None) => {
                return Err(WtError::FeatureRequired(name.to_string()));
            }
            (CommandScope::Feature, Some(feature)) => {
                let context = project.context_for(feature)?;
                let cwd = context.feature_dir.clone();
                (context, cwd)
            }
            (CommandScope::Project, Some(feature)) => {
                (project.context_for(feature)?, project.root.clone())
            }
            (CommandScope::Project, None) => (
                ScriptContext::project(project.root.clone(), project.config.name.clone()),
                project.root.clone(),
            ),
        };

        tracing::info!(command = name, cwd = %cwd.display(), "running command");
        runner::run_command(self.runner, &command.command, &context, &cwd)?;
        let hooks_run =
            hooks::dispatch(self.runner, HookEvent::Run, &context, &project.hooks, None)?;

        Ok(RunReport {
            command: name.to_string(),
            feature: feature.map(str::to_string),
            cwd,
            hooks_run,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
