use crate::cmd::load_project;
use crate::output::{port_range, print_json};
use serde::Serialize;
use std::path::{Path, PathBuf};
use wt_core::git::{self, WorktreeInfo};
use wt_core::paths;

#[derive(Serialize)]
struct FeatureStatus {
    feature: String,
    path: PathBuf,
    branch: String,
    ports: Vec<u32>,
    status: String,
}

/// Worktrees that live under `<trees_dir>/`.
fn feature_worktrees(worktrees: Vec<WorktreeInfo>, trees_dir: &str) -> Vec<WorktreeInfo> {
    let segment = format!("/{}/", trees_dir.trim_end_matches('/'));
    worktrees
        .into_iter()
        .filter(|wt| wt.path.to_string_lossy().replace('\\', "/").contains(&segment))
        .collect()
}

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    if !paths::is_initialized(root) {
        eprintln!("Not a wt project. Run `wt init` to initialize.");
        return Ok(());
    }
    let project = load_project(root)?;
    let config = &project.config;
    let allocations = project.store().load()?;

    let features: Vec<FeatureStatus> =
        feature_worktrees(git::list_worktrees(root)?, &config.worktrees.dir)
            .into_iter()
            .map(|wt| {
                let feature = wt
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let ports = allocations
                    .ports_for(&feature, &config.port)
                    .unwrap_or_default();
                FeatureStatus {
                    branch: wt.branch_name().to_string(),
                    status: git::worktree_stats(&wt.path).summary(),
                    feature,
                    path: wt.path,
                    ports,
                }
            })
            .collect();

    if json {
        return print_json(&features);
    }
    if features.is_empty() {
        println!("No active feature worktrees");
        return Ok(());
    }

    println!("Active features ({}):", features.len());
    println!();
    for f in &features {
        let ports = if f.ports.is_empty() {
            "unallocated".to_string()
        } else {
            port_range(&f.ports)
        };
        println!("  {}", f.feature);
        println!("    Branch: {}", f.branch);
        println!("    Ports:  {ports}");
        println!("    Status: {}", f.status);
        println!();
    }
    Ok(())
}
