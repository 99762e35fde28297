use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WtError {
    #[error("no .wt/config.yaml found at {0}: run 'wt init'")]
    NotInitialized(PathBuf),

    #[error("project already initialized: config exists at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("invalid feature name '{0}': use letters, digits, '.', '_' or '-'")]
    InvalidFeatureName(String),

    #[error("no available port slots for feature '{feature}' (max {max_slots} features)")]
    NoAvailableSlots { feature: String, max_slots: u32 },

    #[error("no ports allocated for feature '{0}': run 'wt up {0}' first")]
    MissingAllocation(String),

    #[error("script path '{script}' escapes {}", .base.display())]
    PathEscape { script: String, base: PathBuf },

    #[error("command failed: {command} (exit code {code})")]
    CommandFailed { command: String, code: i32 },

    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown command '{name}'; available: {available}")]
    UnknownCommand { name: String, available: String },

    #[error("could not detect feature name: run from inside a feature tree or pass it explicitly")]
    FeatureNotDetected,

    #[error("command '{0}' requires a feature: run from inside a feature tree or pass -f <feature>")]
    FeatureRequired(String),

    #[error("env template not found: {}", .0.display())]
    EnvTemplateNotFound(PathBuf),

    #[error("git {args} failed: {message}")]
    Git { args: String, message: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl WtError {
    /// Exit code of the failed child process, if this error carries one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            WtError::CommandFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WtError>;
