use crate::output::print_json;
use serde::Serialize;
use std::path::Path;
use wt_core::git;

#[derive(Serialize)]
struct RefreshResult {
    branch: String,
    output: String,
}

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let branch = git::default_branch(root);
    if !json {
        println!("Fetching origin/{branch}...");
    }

    let output = git::fetch(root, &branch)?;
    if json {
        return print_json(&RefreshResult { branch, output });
    }

    if !output.is_empty() {
        println!("{output}");
    }
    println!("Fetched latest from origin/{branch}");
    Ok(())
}
