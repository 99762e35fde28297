use crate::cmd::load_project;
use crate::output::{port_range, print_json};
use std::path::Path;
use wt_core::git::GitWorktrees;
use wt_core::lifecycle::Lifecycle;
use wt_core::runner::SystemRunner;

pub fn run(root: &Path, feature: &str, json: bool) -> anyhow::Result<()> {
    let project = load_project(root)?;
    if !json {
        println!("Bringing up feature: {feature}");
    }

    let report = Lifecycle::new(&project, &GitWorktrees, &SystemRunner).up(feature)?;
    if json {
        return print_json(&report);
    }

    let verb = if report.created { "created" } else { "reused" };
    println!("  tree:   {} ({verb})", report.tree_path.display());
    println!("  branch: {}", report.branch);
    println!("  ports:  {}", port_range(&report.ports));
    println!("Feature '{}' is up", report.feature);
    Ok(())
}
