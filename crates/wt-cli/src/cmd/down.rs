use crate::cmd::{load_project, resolve_feature};
use crate::output::{port_range, print_json};
use std::path::Path;
use wt_core::git::GitWorktrees;
use wt_core::lifecycle::Lifecycle;
use wt_core::runner::SystemRunner;

pub fn run(root: &Path, feature: Option<&str>, json: bool) -> anyhow::Result<()> {
    let project = load_project(root)?;
    let feature = resolve_feature(&project, feature)?;
    if !json {
        println!("Tearing down feature: {feature}");
    }

    let report = Lifecycle::new(&project, &GitWorktrees, &SystemRunner).down(&feature)?;
    if json {
        return print_json(&report);
    }

    if report.tree_removed {
        println!("  removed worktree");
    }
    if !report.ports.is_empty() {
        println!("  released ports {}", port_range(&report.ports));
    }
    println!("Feature '{feature}' is down");
    Ok(())
}
