use crate::cmd::{load_project, resolve_feature};
use crate::output::print_json;
use std::path::Path;
use wt_core::git::GitWorktrees;
use wt_core::lifecycle::Lifecycle;
use wt_core::runner::SystemRunner;

pub fn run(root: &Path, name: &str, feature: Option<&str>, json: bool) -> anyhow::Result<()> {
    let project = load_project(root)?;
    // outside a feature tree, project-scoped commands still run without one
    let feature = resolve_feature(&project, feature).ok();

    if !json {
        match &feature {
            Some(f) => println!("Running '{name}' for feature: {f}"),
            None => println!("Running '{name}'"),
        }
    }

    let report =
        Lifecycle::new(&project, &GitWorktrees, &SystemRunner).run(name, feature.as_deref())?;
    if json {
        return print_json(&report);
    }
    Ok(())
}
