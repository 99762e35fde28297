use crate::cmd::{load_project, resolve_feature};
use crate::output::{port_range, print_json};
use anyhow::bail;
use std::path::Path;
use wt_core::runner::SystemRunner;
use wt_core::services::{DevSession, Echo};

pub fn run(root: &Path, feature: Option<&str>, json: bool) -> anyhow::Result<()> {
    let project = load_project(root)?;
    let feature = resolve_feature(&project, feature)?;
    // keep stdout clean for the JSON report
    let echo = if json { Echo::Stderr } else { Echo::Stdout };
    let session = DevSession::new(&project, &feature)?.with_echo(echo);

    if session.services().is_empty() {
        bail!("no services configured: add a 'services' list to .wt/config.yaml");
    }

    if !json {
        println!("Starting dev services for: {feature}");
        println!("  ports: {}", port_range(&session.context().ports));
    }
    session.run_pre_hooks(&SystemRunner)?;

    let rt = tokio::runtime::Runtime::new()?;
    if !json {
        println!("All services running. Press Ctrl+C to stop.");
    }
    let report = rt.block_on(session.run())?;

    if json {
        return print_json(&report);
    }

    if report.interrupted {
        println!("Stopped all services");
        return Ok(());
    }
    let failed: Vec<String> = report
        .exits
        .iter()
        .filter(|e| e.code != Some(0))
        .map(|e| match e.code {
            Some(code) => format!("{} (exit code {code})", e.name),
            None => e.name.clone(),
        })
        .collect();
    if !failed.is_empty() {
        bail!("services failed: {}", failed.join(", "));
    }
    println!("All services exited");
    Ok(())
}
