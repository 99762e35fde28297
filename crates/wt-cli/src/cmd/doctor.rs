use crate::output::print_json;
use anyhow::bail;
use std::path::Path;
use wt_core::doctor;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let results = doctor::run_checks(root);
    let passed = doctor::all_passed(&results);

    if json {
        print_json(&results)?;
    } else {
        for r in &results {
            let icon = if r.pass { "\u{2713}" } else { "\u{2717}" };
            println!("{icon} {}: {}", r.name, r.message);
        }
        println!();
        if passed {
            println!("All checks passed");
        }
    }

    if !passed {
        bail!("some checks failed");
    }
    Ok(())
}
