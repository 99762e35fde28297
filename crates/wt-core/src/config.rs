use crate::error::{Result, WtError};
use crate::paths;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// WorktreesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreesConfig {
    #[serde(default = "default_trees_dir")]
    pub dir: String,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_trees_dir() -> String {
    "trees".to_string()
}

fn default_branch_prefix() -> String {
    "feature/".to_string()
}

impl Default for WorktreesConfig {
    fn default() -> Self {
        Self {
            dir: default_trees_dir(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

impl WorktreesConfig {
    /// Trees directory without a trailing slash.
    pub fn trimmed_dir(&self) -> &str {
        self.dir.trim_end_matches('/')
    }

    pub fn branch_for(&self, feature: &str) -> String {
        format!("{}{}", self.branch_prefix, feature)
    }
}

// ---------------------------------------------------------------------------
// PortConfig
// ---------------------------------------------------------------------------

/// The pool of ports handed out to features, `per_feature` at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default = "default_base_port")]
    pub base: u32,
    #[serde(default = "default_per_feature")]
    pub per_feature: u32,
    #[serde(default = "default_max_ports")]
    pub max: u32,
}

fn default_base_port() -> u32 {
    3000
}

fn default_per_feature() -> u32 {
    2
}

fn default_max_ports() -> u32 {
    100
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            base: default_base_port(),
            per_feature: default_per_feature(),
            max: default_max_ports(),
        }
    }
}

impl PortConfig {
    /// Number of features that can hold ports at once.
    pub fn max_slots(&self) -> u32 {
        if self.per_feature == 0 {
            return 0;
        }
        self.max / self.per_feature
    }
}

// ---------------------------------------------------------------------------
// ScriptsConfig
// ---------------------------------------------------------------------------

/// Script paths, relative to `.wt/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<String>,
}

// ---------------------------------------------------------------------------
// EnvFile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvFile {
    /// Directory inside the worktree holding `source` and `dest`.
    #[serde(default = "default_env_path")]
    pub path: String,
    pub source: String,
    pub dest: String,
    #[serde(default)]
    pub replace: BTreeMap<String, String>,
}

fn default_env_path() -> String {
    ".".to_string()
}

// ---------------------------------------------------------------------------
// CommandConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandScope {
    /// Runs in the feature worktree; requires allocated ports.
    Feature,
    /// Runs at the project root; a feature is optional.
    #[default]
    Project,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub name: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub scope: CommandScope,
}

// ---------------------------------------------------------------------------
// ServiceConfig / LogsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub command: String,
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    #[serde(default)]
    pub pre_hooks: Vec<String>,
}

fn default_working_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_logs_dir")]
    pub dir: String,
}

fn default_logs_dir() -> String {
    ".wt/logs".to_string()
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

/// Resolved project configuration: `.wt/config.yaml` with `.wt/local.yaml` merged on top.
///
/// Hooks are not part of this struct; they are read per source by [`crate::hooks`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub worktrees: WorktreesConfig,
    #[serde(default)]
    pub port: PortConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub env_files: Vec<EnvFile>,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub logs: LogsConfig,
}

impl Config {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worktrees: WorktreesConfig::default(),
            port: PortConfig::default(),
            scripts: ScriptsConfig::default(),
            env_files: Vec::new(),
            commands: Vec::new(),
            services: Vec::new(),
            logs: LogsConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(WtError::NotInitialized(root.to_path_buf()));
        }
        let mut merged = read_yaml(&path)?;

        let local = paths::local_config_path(root);
        if local.exists() {
            tracing::debug!(path = %local.display(), "merging local config");
            merge_yaml(&mut merged, read_yaml(&local)?);
        }

        if !merged.is_mapping() {
            return Err(WtError::InvalidConfig(format!(
                "{} must contain a mapping",
                path.display()
            )));
        }
        let config: Config = serde_yaml::from_value(merged)?;
        Ok(config)
    }

    pub fn find_command(&self, name: &str) -> Result<&CommandConfig> {
        self.commands
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                let available = if self.commands.is_empty() {
                    "none".to_string()
                } else {
                    self.commands
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                WtError::UnknownCommand {
                    name: name.to_string(),
                    available,
                }
            })
    }

    /// Check for common mistakes and return any warnings found.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.name.trim().is_empty() {
            error("missing \"name\"".to_string());
        }
        if self.worktrees.trimmed_dir().is_empty() {
            error("\"worktrees.dir\" must not be empty".to_string());
        }
        if self.port.per_feature == 0 {
            error("\"port.per_feature\" must be greater than 0".to_string());
        }
        if self.port.max == 0 {
            error("\"port.max\" must be greater than 0".to_string());
        }
        if self.port.per_feature > 0 && self.port.max < self.port.per_feature {
            error(format!(
                "\"port.max\" ({}) is smaller than \"port.per_feature\" ({}): no feature can be allocated",
                self.port.max, self.port.per_feature
            ));
        }
        let highest = u64::from(self.port.base) + u64::from(self.port.max);
        if highest > 65_536 {
            error(format!(
                "port range {}..{} exceeds 65535",
                self.port.base,
                highest - 1
            ));
        }

        let mut seen = HashSet::new();
        for cmd in &self.commands {
            if !seen.insert(cmd.name.as_str()) {
                error(format!("duplicate command name \"{}\"", cmd.name));
            }
        }
        let mut seen = HashSet::new();
        for svc in &self.services {
            if !seen.insert(svc.name.as_str()) {
                error(format!("duplicate service name \"{}\"", svc.name));
            }
        }

        if self.port.per_feature > 0 && self.port.max % self.port.per_feature != 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "\"port.max\" ({}) is not a multiple of \"port.per_feature\" ({}); {} ports are unused",
                    self.port.max,
                    self.port.per_feature,
                    self.port.max % self.port.per_feature
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Layered YAML
// ---------------------------------------------------------------------------

/// Read a YAML file; an empty file reads as an empty mapping.
pub fn read_yaml(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&raw)?;
    Ok(match value {
        Value::Null => Value::Mapping(Default::default()),
        other => other,
    })
}

/// Recursively merge `overlay` into `base`.
///
/// Mappings merge key by key; any other value in `overlay` replaces the one in `base`.
pub fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                let nested = value.is_mapping() && base_map.get(&key).is_some_and(Value::is_mapping);
                match base_map.get_mut(&key) {
                    Some(existing) if nested => merge_yaml(existing, value),
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
