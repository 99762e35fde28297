//! Lifecycle hooks.
//!
//! Hooks come from up to three YAML files, each with a top-level `hooks:` list:
//!
//! 1. `.wt/config.yaml` (project)
//! 2. `.wt/local.yaml` (local override)
//! 3. `~/.config/wt/config.yaml` (user)
//!
//! The lists are concatenated in that order and never deduplicated. A
//! malformed entry is rejected with a reason and skipped; it never fails the
//! whole load.

use crate::config::read_yaml;
use crate::env::ScriptContext;
use crate::error::Result;
use crate::paths;
use crate::runner::{run_command, CommandRunner};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// HookEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    /// End of `wt up`, once the tree, env files and setup script are in place.
    Up,
    /// Start of `wt down`, while the tree and ports still exist.
    Down,
    /// After a named command succeeds.
    Run,
}

impl HookEvent {
    pub fn all() -> &'static [HookEvent] {
        &[HookEvent::Up, HookEvent::Down, HookEvent::Run]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Up => "up",
            HookEvent::Down => "down",
            HookEvent::Run => "run",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEvent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        HookEvent::all()
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = HookEvent::all().iter().map(|e| e.as_str()).collect();
                format!("unknown event '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

// ---------------------------------------------------------------------------
// Entries and sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEntry {
    pub event: HookEvent,
    pub command: String,
}

/// A hook entry that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRejection {
    pub origin: PathBuf,
    pub position: usize,
    pub reason: String,
}

impl fmt::Display for HookRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: hooks[{}]: {}",
            self.origin.display(),
            self.position,
            self.reason
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedHooks {
    pub entries: Vec<HookEntry>,
    pub rejected: Vec<HookRejection>,
}

/// One file to read hooks from, and the directory its relative commands are anchored at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSource {
    pub path: PathBuf,
    pub base_dir: PathBuf,
}

impl HookSource {
    /// Project, local and user sources for `root`, in precedence order.
    ///
    /// The user source is omitted when no home directory can be found.
    pub fn defaults(root: &Path) -> Vec<HookSource> {
        let wt_dir = paths::wt_dir(root);
        let mut sources = vec![
            HookSource {
                path: paths::config_path(root),
                base_dir: wt_dir.clone(),
            },
            HookSource {
                path: paths::local_config_path(root),
                base_dir: wt_dir,
            },
        ];
        match paths::user_config_path() {
            Ok(path) => {
                let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                sources.push(HookSource { path, base_dir });
            }
            Err(e) => tracing::debug!("skipping user hooks: {e}"),
        }
        sources
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Validate a raw `hooks:` value. `origin` is only used in rejection messages.
pub fn parse_hooks(raw: &Value, base_dir: &Path, origin: &Path) -> ParsedHooks {
    let mut parsed = ParsedHooks::default();
    let reject = |position: usize, reason: String| HookRejection {
        origin: origin.to_path_buf(),
        position,
        reason,
    };

    let items = match raw {
        Value::Null => return parsed,
        Value::Sequence(items) => items,
        _ => {
            parsed
                .rejected
                .push(reject(0, "\"hooks\" must be a list".to_string()));
            return parsed;
        }
    };

    for (position, item) in items.iter().enumerate() {
        match parse_entry(item, base_dir) {
            Ok(entry) => parsed.entries.push(entry),
            Err(reason) => parsed.rejected.push(reject(position, reason)),
        }
    }
    parsed
}

fn parse_entry(item: &Value, base_dir: &Path) -> std::result::Result<HookEntry, String> {
    if !item.is_mapping() {
        return Err("entry must be a mapping with \"event\" and \"command\"".to_string());
    }
    let event = item
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing \"event\"".to_string())?;
    let event: HookEvent = event.parse()?;
    let command = item
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing \"command\"".to_string())?;

    Ok(HookEntry {
        event,
        command: paths::resolve_relative_command(command, base_dir),
    })
}

/// Read the `hooks:` list from one file. A missing file has no hooks.
pub fn load_hooks_from_file(source: &HookSource) -> Result<ParsedHooks> {
    if !source.path.exists() {
        return Ok(ParsedHooks::default());
    }
    let doc = read_yaml(&source.path)?;
    let raw = doc.get("hooks").cloned().unwrap_or(Value::Null);
    Ok(parse_hooks(&raw, &source.base_dir, &source.path))
}

/// Load and concatenate hooks from `sources`, logging each rejected entry.
pub fn load_hooks(sources: &[HookSource]) -> Result<Vec<HookEntry>> {
    let mut all = Vec::new();
    for source in sources {
        let parsed = load_hooks_from_file(source)?;
        for rejection in &parsed.rejected {
            tracing::warn!("ignoring hook: {rejection}");
        }
        all.extend(parsed.entries);
    }
    Ok(all)
}

/// Load hooks from the project, local and user config files.
pub fn load_all_hooks(root: &Path) -> Result<Vec<HookEntry>> {
    load_hooks(&HookSource::defaults(root))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run every hook registered for `event`, in order, stopping at the first failure.
///
/// `cwd` defaults to the feature directory, or the root for project scope.
/// Returns how many hooks ran.
pub fn dispatch(
    runner: &dyn CommandRunner,
    event: HookEvent,
    context: &ScriptContext,
    hooks: &[HookEntry],
    cwd: Option<&Path>,
) -> Result<usize> {
    let cwd = cwd.unwrap_or_else(|| context.default_cwd());
    let mut ran = 0;
    for entry in hooks.iter().filter(|h| h.event == event) {
        tracing::info!(event = %event, command = %entry.command, "running hook");
        run_command(runner, &entry.command, context, cwd).inspect_err(|e| {
            tracing::warn!(event = %event, "hook failed after {ran} succeeded: {e}");
        })?;
        ran += 1;
    }
    Ok(ran)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
