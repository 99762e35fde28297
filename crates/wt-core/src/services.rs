//! Long-running dev services for `wt dev`.
//!
//! Services are started together under tokio and stream their output to the
//! terminal with a `[NAME]` prefix while appending timestamped lines to a
//! per-service log. On Unix each service leads its own process group, and
//! shutdown signals the whole group so processes started by the service's
//! shell go down with it. Children are also spawned with `kill_on_drop`.

use crate::env::{build_env, Env, ScriptContext};
use crate::error::{Result, WtError};
use crate::lifecycle::Project;
use crate::runner::{exit_code, CommandRunner};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinSet;

/// How long services get to exit after SIGTERM before the group is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One service resolved against a feature's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePlan {
    pub name: String,
    pub command: String,
    pub cwd: PathBuf,
    pub pre_hooks: Vec<String>,
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceExit {
    pub name: String,
    /// `None` when the service was killed by `wt` itself.
    pub code: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub feature: String,
    pub exits: Vec<ServiceExit>,
    pub interrupted: bool,
}

pub struct DevSession {
    context: ScriptContext,
    services: Vec<ServicePlan>,
    echo: Echo,
}

/// Where prefixed service output is echoed. Logs are written either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    Stdout,
    Stderr,
}

impl DevSession {
    /// Plan the configured services for `feature`, which must hold ports.
    pub fn new(project: &Project, feature: &str) -> Result<Self> {
        let context = project.context_for(feature)?;
        let logs_dir = project.root.join(&project.config.logs.dir).join(feature);
        let services = project
            .config
            .services
            .iter()
            .map(|s| ServicePlan {
                name: s.name.clone(),
                command: s.command.clone(),
                cwd: context.feature_dir.join(&s.working_dir),
                pre_hooks: s.pre_hooks.clone(),
                log_path: logs_dir.join(format!("{}.log", s.name)),
            })
            .collect();
        Ok(Self {
            context,
            services,
            echo: Echo::Stdout,
        })
    }

    pub fn with_echo(mut self, echo: Echo) -> Self {
        self.echo = echo;
        self
    }

    pub fn context(&self) -> &ScriptContext {
        &self.context
    }

    pub fn services(&self) -> &[ServicePlan] {
        &self.services
    }

    /// Run every service's pre-hooks in order, stopping at the first failure.
    pub fn run_pre_hooks(&self, runner: &dyn CommandRunner) -> Result<usize> {
        let env = build_env(&self.context);
        let mut count = 0;
        for service in &self.services {
            for hook in &service.pre_hooks {
                tracing::info!(service = %service.name, hook = %hook, "running pre-hook");
                runner.run_command(hook, &env, &service.cwd)?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Start all services and wait for them to exit, or for Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<SessionReport> {
        self.run_until(shutdown_signal()).await
    }

    /// Start all services and wait until they exit or `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<SessionReport>
    where
        F: Future<Output = ()>,
    {
        let env = build_env(&self.context);
        let mut waiters = JoinSet::new();
        let mut streams = JoinSet::new();
        let mut groups = Vec::new();

        for plan in &self.services {
            if let Some(dir) = plan.log_path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            append_line(&plan.log_path, &format!("\n--- Session started: {} ---", now())).await?;

            let mut child = spawn_service(plan, &env)?;
            groups.extend(child.id());
            let prefix = format!("[{}]", plan.name.to_uppercase());
            if let Some(stdout) = child.stdout.take() {
                streams.spawn(stream_lines(stdout, prefix.clone(), plan.log_path.clone(), self.echo));
            }
            if let Some(stderr) = child.stderr.take() {
                streams.spawn(stream_lines(stderr, prefix, plan.log_path.clone(), self.echo));
            }
            tracing::info!(service = %plan.name, cwd = %plan.cwd.display(), "service started");

            let name = plan.name.clone();
            waiters.spawn(async move {
                let code = match child.wait().await {
                    Ok(status) => Some(exit_code(status)),
                    Err(e) => {
                        tracing::warn!(service = %name, error = %e, "failed to wait for service");
                        None
                    }
                };
                ServiceExit { name, code }
            });
        }

        let mut exits = Vec::new();
        let interrupted = tokio::select! {
            _ = collect_exits(&mut waiters, &mut exits) => false,
            _ = shutdown => true,
        };

        if interrupted {
            tracing::info!("shutting down services");
            stop_groups(&groups, &mut waiters).await;
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, drain(&mut streams)).await;
            streams.shutdown().await;
            for plan in &self.services {
                if !exits.iter().any(|e: &ServiceExit| e.name == plan.name) {
                    exits.push(ServiceExit {
                        name: plan.name.clone(),
                        code: None,
                    });
                }
            }
        } else {
            drain(&mut streams).await;
        }

        for plan in &self.services {
            append_line(&plan.log_path, &format!("--- Session ended: {} ---", now())).await?;
        }

        Ok(SessionReport {
            feature: self.context.feature.clone(),
            exits,
            interrupted,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn spawn_service(plan: &ServicePlan, env: &Env) -> Result<tokio::process::Child> {
    let mut cmd = Command::from(crate::runner::shell_command(&plan.command));
    cmd.envs(env)
        .current_dir(&plan.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn().map_err(|source| WtError::Spawn {
        command: plan.command.clone(),
        source,
    })
}

/// Resolves on SIGINT or SIGTERM. Handlers are installed before this returns.
#[cfg(unix)]
fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};
    let listen = |kind: SignalKind, name: &'static str| match signal(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!(signal = name, error = %e, "failed to install signal handler");
            None
        }
    };
    let mut interrupt = listen(SignalKind::interrupt(), "SIGINT");
    let mut terminate = listen(SignalKind::terminate(), "SIGTERM");
    async move {
        tokio::select! {
            Some(_) = recv(&mut interrupt) => tracing::info!("received SIGINT"),
            Some(_) = recv(&mut terminate) => tracing::info!("received SIGTERM"),
            else => std::future::pending::<()>().await,
        }
    }
}

#[cfg(unix)]
async fn recv(stream: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match stream {
        Some(stream) => stream.recv().await,
        None => None,
    }
}

#[cfg(not(unix))]
fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

/// SIGTERM every service group, then SIGKILL whatever outlives the grace period.
///
/// Services that exit here were stopped by us, so their codes are not collected.
async fn stop_groups(groups: &[u32], waiters: &mut JoinSet<ServiceExit>) {
    if cfg!(unix) {
        for pid in groups {
            signal_group(*pid, "TERM").await;
        }
        let mut stopped = Vec::new();
        if tokio::time::timeout(SHUTDOWN_GRACE, collect_exits(waiters, &mut stopped))
            .await
            .is_ok()
        {
            return;
        }
        for pid in groups {
            signal_group(*pid, "KILL").await;
        }
    }
    waiters.shutdown().await;
}

/// Send `signal` to the process group led by `pid`.
async fn signal_group(pid: u32, signal: &str) {
    let result = Command::new("kill")
        .arg(format!("-{signal}"))
        .arg("--")
        .arg(format!("-{pid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) if !status.success() => {
            tracing::debug!(pid, signal = %signal, "process group already gone");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(pid, signal = %signal, error = %e, "failed to signal process group"),
    }
}

async fn drain(streams: &mut JoinSet<()>) {
    while streams.join_next().await.is_some() {}
}

async fn collect_exits(waiters: &mut JoinSet<ServiceExit>, exits: &mut Vec<ServiceExit>) {
    while let Some(joined) = waiters.join_next().await {
        match joined {
            Ok(exit) => {
                tracing::info!(service = %exit.name, code = ?exit.code, "service exited");
                exits.push(exit);
            }
            Err(e) => tracing::warn!(error = %e, "service waiter failed"),
        }
    }
}

async fn stream_lines<R>(reader: R, prefix: String, log_path: PathBuf, echo: Echo)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.is_empty() {
            continue;
        }
        match echo {
            Echo::Stdout => println!("{prefix} {line}"),
            Echo::Stderr => eprintln!("{prefix} {line}"),
        }
        if let Err(e) = append_line(&log_path, &format!("[{}] {line}", now())).await {
            tracing::warn!(log = %log_path.display(), error = %e, "failed to write service log");
        }
    }
}

async fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{line}\n").as_bytes()).await?;
    Ok(())
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ServiceConfig};
    use crate::runner::testing::RecordingRunner;
    use tempfile::TempDir;

    fn project(dir: &TempDir, services: Vec<ServiceConfig>) -> Project {
        let mut config = Config::new("app");
        config.services = services;
        let project = Project {
            root: dir.path().to_path_buf(),
            config,
            hooks: Vec::new(),
        };
        project.store().allocate("auth", &project.config.port).unwrap();
        std::fs::create_dir_all(project.tree_path("auth").join("api")).unwrap();
        project
    }

    fn service(name: &str, command: &str, working_dir: &str, pre_hooks: &[&str]) -> ServiceConfig {
        ServiceConfig {
            name: name.into(),
            command: command.into(),
            working_dir: working_dir.into(),
            pre_hooks: pre_hooks.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[test]
    fn plans_resolve_against_tree_and_logs_dir() {
        let dir = TempDir::new().unwrap();
        let project = project(&dir, vec![service("api", "npm run dev", "api", &[])]);
        let session = DevSession::new(&project, "auth").unwrap();
        let plan = &session.services()[0];
        assert_eq!(plan.cwd, project.tree_path("auth").join("api"));
        assert_eq!(plan.log_path, dir.path().join(".wt/logs/auth/api.log"));
        assert_eq!(session.context().base_port(), Some(3000));
    }

    #[test]
    fn unallocated_feature_is_rejected() {
        let dir = TempDir::new().unwrap();
        let project = project(&dir, Vec::new());
        let err = DevSession::new(&project, "other").err().unwrap();
        assert!(matches!(err, WtError::MissingAllocation(_)));
    }

    #[test]
    fn pre_hooks_run_in_order_with_feature_env() {
        let dir = TempDir::new().unwrap();
        let project = project(
            &dir,
            vec![
                service("api", "true", "api", &["npm install", "npm run migrate"]),
                service("web", "true", ".", &["pnpm install"]),
            ],
        );
        let session = DevSession::new(&project, "auth").unwrap();
        let runner = RecordingRunner::default();
        assert_eq!(session.run_pre_hooks(&runner).unwrap(), 3);
        assert_eq!(
            runner.commands(),
            vec!["npm install", "npm run migrate", "pnpm install"]
        );
        let calls = runner.calls.borrow();
        assert_eq!(calls[0].env["WT_FEATURE"], "auth");
        assert_eq!(calls[0].cwd, project.tree_path("auth").join("api"));
    }

    #[test]
    fn failing_pre_hook_stops_the_rest() {
        let dir = TempDir::new().unwrap();
        let project = project(
            &dir,
            vec![service("api", "true", "api", &["npm install", "npm run migrate"])],
        );
        let session = DevSession::new(&project, "auth").unwrap();
        let runner = RecordingRunner::failing(&["npm install"]);
        assert!(session.run_pre_hooks(&runner).is_err());
        assert_eq!(runner.commands(), vec!["npm install"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn services_log_output_and_exit_codes() {
        let dir = TempDir::new().unwrap();
        let project = project(
            &dir,
            vec![
                service("api", "echo \"api on $WT_PORT\"", "api", &[]),
                service("web", "echo oops >&2; exit 3", ".", &[]),
            ],
        );
        let session = DevSession::new(&project, "auth").unwrap();
        let report = session
            .run_until(std::future::pending::<()>())
            .await
            .unwrap();

        assert!(!report.interrupted);
        let code = |name: &str| report.exits.iter().find(|e| e.name == name).unwrap().code;
        assert_eq!(code("api"), Some(0));
        assert_eq!(code("web"), Some(3));

        let api_log = std::fs::read_to_string(dir.path().join(".wt/logs/auth/api.log")).unwrap();
        assert!(api_log.contains("--- Session started:"));
        assert!(api_log.contains("] api on 3000"));
        assert!(api_log.trim_end().ends_with("---"));
        let web_log = std::fs::read_to_string(dir.path().join(".wt/logs/auth/web.log")).unwrap();
        assert!(web_log.contains("] oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_kills_running_services() {
        let dir = TempDir::new().unwrap();
        let project = project(&dir, vec![service("api", "sleep 30", ".", &[])]);
        let session = DevSession::new(&project, "auth").unwrap();

        let started = std::time::Instant::now();
        let report = session
            .run_until(tokio::time::sleep(std::time::Duration::from_millis(200)))
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.exits[0].code, None);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        let log = std::fs::read_to_string(dir.path().join(".wt/logs/auth/api.log")).unwrap();
        assert!(log.contains("--- Session ended:"));
    }

    #[cfg(target_os = "linux")]
    fn process_alive(pid: u32) -> bool {
        // reaped, or a zombie waiting for a reaper
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat.rsplit(')').next().unwrap_or("").trim_start().starts_with('Z'),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn shutdown_stops_processes_started_by_the_service_shell() {
        let dir = TempDir::new().unwrap();
        let project = project(
            &dir,
            vec![service("api", "sleep 4343 & echo $! > sleep.pid; wait", ".", &[])],
        );
        let pid_file = project.tree_path("auth").join("sleep.pid");
        let session = DevSession::new(&project, "auth").unwrap();

        let started = pid_file.clone();
        let report = session
            .run_until(async move {
                while std::fs::read_to_string(&started).map_or(true, |s| s.trim().is_empty()) {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            })
            .await
            .unwrap();
        assert!(report.interrupted);

        let pid: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while process_alive(pid) && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!process_alive(pid), "sleep {pid} outlived the session");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stderr_echo_still_writes_logs() {
        let dir = TempDir::new().unwrap();
        let project = project(&dir, vec![service("api", "echo ready", ".", &[])]);
        let session = DevSession::new(&project, "auth").unwrap().with_echo(Echo::Stderr);
        let report = session
            .run_until(std::future::pending::<()>())
            .await
            .unwrap();
        assert_eq!(report.exits[0].code, Some(0));
        let log = std::fs::read_to_string(dir.path().join(".wt/logs/auth/api.log")).unwrap();
        assert!(log.contains("] ready"));
    }

    #[tokio::test]
    async fn no_services_finishes_immediately() {
        let dir = TempDir::new().unwrap();
        let project = project(&dir, Vec::new());
        let session = DevSession::new(&project, "auth").unwrap();
        let report = session
            .run_until(std::future::pending::<()>())
            .await
            .unwrap();
        assert!(report.exits.is_empty());
        assert!(!report.interrupted);
    }
}
