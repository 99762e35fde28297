//! Child process execution for hooks, scripts and named commands.
//!
//! Everything here is synchronous: the caller blocks until the child exits.
//! Output is inherited so the child writes straight to the user's terminal.
//! A zero exit status is the only success; anything else becomes
//! [`WtError::CommandFailed`] carrying the child's code.

use crate::env::{build_env, Env, ScriptContext};
use crate::error::{Result, WtError};
use crate::paths::normalize;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// The seam between orchestration and the OS process table.
pub trait CommandRunner {
    /// Run `command` through the platform shell.
    fn run_command(&self, command: &str, env: &Env, cwd: &Path) -> Result<()>;

    /// Execute `program` directly, without a shell.
    fn run_program(&self, program: &Path, env: &Env, cwd: &Path) -> Result<()>;
}

/// Spawns real child processes. `env` is layered over the inherited environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run_command(&self, command: &str, env: &Env, cwd: &Path) -> Result<()> {
        let mut cmd = shell_command(command);
        run_to_completion(&mut cmd, command, env, cwd)
    }

    fn run_program(&self, program: &Path, env: &Env, cwd: &Path) -> Result<()> {
        let mut cmd = Command::new(program);
        run_to_completion(&mut cmd, &program.display().to_string(), env, cwd)
    }
}

#[cfg(unix)]
pub fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
pub fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

fn run_to_completion(cmd: &mut Command, label: &str, env: &Env, cwd: &Path) -> Result<()> {
    tracing::debug!(command = label, cwd = %cwd.display(), vars = env.len(), "spawning");
    let status = cmd
        .envs(env)
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|source| WtError::Spawn {
            command: label.to_string(),
            source,
        })?;

    if status.success() {
        return Ok(());
    }
    Err(WtError::CommandFailed {
        command: label.to_string(),
        code: exit_code(status),
    })
}

/// Exit code of a finished child; signals map to `128 + signal` on Unix.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

// ---------------------------------------------------------------------------
// Commands and scripts with a derived environment
// ---------------------------------------------------------------------------

/// Run a shell command line with the `WT_*` environment for `context`.
pub fn run_command(
    runner: &dyn CommandRunner,
    command: &str,
    context: &ScriptContext,
    cwd: &Path,
) -> Result<()> {
    runner.run_command(command, &build_env(context), cwd)
}

/// Resolve `script` against `base_dir`, refusing anything that lands outside it.
pub fn resolve_script(script: &str, base_dir: &Path) -> Result<PathBuf> {
    let base = normalize(base_dir);
    let resolved = normalize(&base.join(script));
    if resolved != base && !resolved.starts_with(&base) {
        return Err(WtError::PathEscape {
            script: script.to_string(),
            base,
        });
    }
    Ok(resolved)
}

/// Execute a script file from the trusted `base_dir`.
///
/// `cwd` defaults to the context's feature directory (the root for project scope).
pub fn run_script(
    runner: &dyn CommandRunner,
    script: &str,
    base_dir: &Path,
    context: &ScriptContext,
    cwd: Option<&Path>,
) -> Result<()> {
    let path = resolve_script(script, base_dir)?;
    tracing::debug!(script, resolved = %path.display(), "running script");
    let cwd = cwd.unwrap_or_else(|| context.default_cwd());
    runner.run_program(&path, &build_env(context), cwd)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
