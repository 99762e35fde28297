//! The `WT_*` environment handed to hooks, scripts, commands and services.
//!
//! Variable names are a stable contract with user scripts:
//!
//! | Variable         | Set when            |
//! |------------------|---------------------|
//! | `WT_PROJECT`     | always              |
//! | `WT_PROJECT_DIR` | always              |
//! | `WT_FEATURE`     | feature is non-empty |
//! | `WT_FEATURE_DIR` | feature is non-empty |
//! | `WT_PORT`        | feature is non-empty and at least one port |
//! | `WT_PORT_1..N`   | feature is non-empty, one per port |

use std::collections::BTreeMap;
use std::path::PathBuf;

pub type Env = BTreeMap<String, String>;

/// Everything one lifecycle operation knows about the feature it acts on.
///
/// An empty `feature` marks a project-scoped operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptContext {
    pub root: PathBuf,
    pub feature: String,
    pub feature_dir: PathBuf,
    pub project_name: String,
    pub ports: Vec<u32>,
}

impl ScriptContext {
    /// Context for an operation that is not tied to a feature.
    pub fn project(root: PathBuf, project_name: impl Into<String>) -> Self {
        Self {
            feature_dir: root.clone(),
            root,
            feature: String::new(),
            project_name: project_name.into(),
            ports: Vec::new(),
        }
    }

    pub fn is_feature_scoped(&self) -> bool {
        !self.feature.is_empty()
    }

    /// First port of the feature's range.
    pub fn base_port(&self) -> Option<u32> {
        self.ports.first().copied()
    }

    /// Default working directory: the feature tree, or the root for project scope.
    pub fn default_cwd(&self) -> &std::path::Path {
        if self.is_feature_scoped() {
            &self.feature_dir
        } else {
            &self.root
        }
    }
}

pub fn build_env(context: &ScriptContext) -> Env {
    let mut env = Env::new();
    env.insert("WT_PROJECT".into(), context.project_name.clone());
    env.insert(
        "WT_PROJECT_DIR".into(),
        context.root.to_string_lossy().into_owned(),
    );

    if !context.is_feature_scoped() {
        return env;
    }

    env.insert("WT_FEATURE".into(), context.feature.clone());
    env.insert(
        "WT_FEATURE_DIR".into(),
        context.feature_dir.to_string_lossy().into_owned(),
    );
    if let Some(port) = context.base_port() {
        env.insert("WT_PORT".into(), port.to_string());
    }
    env.extend(port_vars(&context.ports));
    env
}

/// `WT_PORT_1..N`, one entry per port.
pub fn port_vars(ports: &[u32]) -> Env {
    ports
        .iter()
        .enumerate()
        .map(|(i, port)| (format!("WT_PORT_{}", i + 1), port.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ScriptContext {
        ScriptContext {
            root: PathBuf::from("/projects/app"),
            feature: "my-feature".into(),
            feature_dir: PathBuf::from("/projects/app/trees/my-feature"),
            project_name: "app".into(),
            ports: vec![3100, 3101, 3102],
        }
    }

    #[test]
    fn always_sets_project_vars() {
        let env = build_env(&context());
        assert_eq!(env["WT_PROJECT"], "app");
        assert_eq!(env["WT_PROJECT_DIR"], "/projects/app");
    }

    #[test]
    fn sets_feature_and_numbered_port_vars() {
        let env = build_env(&context());
        assert_eq!(env["WT_FEATURE"], "my-feature");
        assert_eq!(env["WT_FEATURE_DIR"], "/projects/app/trees/my-feature");
        assert_eq!(env["WT_PORT"], "3100");
        assert_eq!(env["WT_PORT_1"], "3100");
        assert_eq!(env["WT_PORT_2"], "3101");
        assert_eq!(env["WT_PORT_3"], "3102");
        assert_eq!(env.len(), 8);
    }

    #[test]
    fn single_port() {
        let env = build_env(&ScriptContext {
            ports: vec![8080],
            ..context()
        });
        assert_eq!(env["WT_PORT"], "8080");
        assert_eq!(env["WT_PORT_1"], "8080");
        assert!(!env.contains_key("WT_PORT_2"));
    }

    #[test]
    fn zero_ports_with_feature_omits_port_vars() {
        let env = build_env(&ScriptContext {
            ports: vec![],
            ..context()
        });
        assert_eq!(env["WT_FEATURE"], "my-feature");
        assert!(!env.contains_key("WT_PORT"));
        assert!(!env.contains_key("WT_PORT_1"));
    }

    #[test]
    fn empty_feature_omits_feature_and_port_vars() {
        let env = build_env(&ScriptContext {
            feature: String::new(),
            ports: vec![],
            ..context()
        });
        assert_eq!(env.len(), 2);
        assert!(!env.contains_key("WT_FEATURE"));
        assert!(!env.contains_key("WT_FEATURE_DIR"));
    }

    #[test]
    fn empty_feature_omits_ports_even_when_present() {
        let env = build_env(&ScriptContext {
            feature: String::new(),
            ..context()
        });
        assert!(!env.contains_key("WT_PORT"));
        assert!(env.keys().all(|k| !k.starts_with("WT_PORT_")));
    }

    #[test]
    fn build_env_is_pure() {
        assert_eq!(build_env(&context()), build_env(&context()));
    }

    #[test]
    fn project_context_defaults_cwd_to_root() {
        let ctx = ScriptContext::project(PathBuf::from("/projects/app"), "app");
        assert!(!ctx.is_feature_scoped());
        assert_eq!(ctx.default_cwd(), std::path::Path::new("/projects/app"));
        assert_eq!(ctx.base_port(), None);
    }
}
