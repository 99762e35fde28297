use crate::output::print_json;
use std::path::Path;
use wt_core::scaffold;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let report = scaffold::init(root)?;
    if json {
        return print_json(&report);
    }

    println!("Initialized wt project '{}'", report.project_name);
    println!();
    println!("Created:");
    for path in &report.created {
        let shown = path.strip_prefix(root).unwrap_or(path);
        println!("  {}", shown.display());
    }
    if !report.gitignore_added.is_empty() {
        println!("Added to .gitignore:");
        for entry in &report.gitignore_added {
            println!("  {entry}");
        }
    }
    println!();
    println!("Next steps:");
    println!("  1. Edit .wt/config.yaml to match your project");
    println!("  2. Customize .wt/scripts/setup.sh and cleanup.sh");
    println!("  3. Run `wt up <feature>` to create your first worktree");
    Ok(())
}
