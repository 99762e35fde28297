use crate::cmd::load_project;
use crate::output::{port_range, print_json, print_table};
use serde::Serialize;
use std::path::Path;
use wt_core::ports::ports_for_index;

#[derive(Serialize)]
struct PortRow {
    feature: String,
    index: u32,
    ports: Vec<u32>,
    tree: bool,
}

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = load_project(root)?;
    let config = &project.config;
    let table = project.store().load()?;

    let rows: Vec<PortRow> = table
        .features
        .iter()
        .map(|(feature, alloc)| PortRow {
            feature: feature.clone(),
            index: alloc.index,
            ports: ports_for_index(&config.port, alloc.index),
            tree: project.tree_path(feature).is_dir(),
        })
        .collect();

    if json {
        return print_json(&rows);
    }

    let slots = config.port.max_slots();
    println!(
        "{} of {slots} slots in use (base {}, {} per feature)",
        rows.len(),
        config.port.base,
        config.port.per_feature
    );
    if rows.is_empty() {
        return Ok(());
    }
    println!();
    print_table(
        &["FEATURE", "SLOT", "PORTS", "TREE"],
        rows.iter()
            .map(|r| {
                vec![
                    r.feature.clone(),
                    r.index.to_string(),
                    port_range(&r.ports),
                    if r.tree { "yes" } else { "missing" }.to_string(),
                ]
            })
            .collect(),
    );
    Ok(())
}
