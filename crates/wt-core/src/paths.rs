use crate::error::{Result, WtError};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const WT_DIR: &str = ".wt";
pub const SCRIPTS_DIR: &str = ".wt/scripts";

pub const CONFIG_FILE: &str = ".wt/config.yaml";
pub const LOCAL_CONFIG_FILE: &str = ".wt/local.yaml";
pub const ALLOCATIONS_FILE: &str = ".wt/port_allocations.json";
pub const ALLOCATIONS_LOCK_FILE: &str = ".wt/port_allocations.lock";

/// User-global config, relative to the home directory.
pub const USER_CONFIG_FILE: &str = ".config/wt/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn wt_dir(root: &Path) -> PathBuf {
    root.join(WT_DIR)
}

pub fn scripts_dir(root: &Path) -> PathBuf {
    root.join(SCRIPTS_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn local_config_path(root: &Path) -> PathBuf {
    root.join(LOCAL_CONFIG_FILE)
}

pub fn allocations_path(root: &Path) -> PathBuf {
    root.join(ALLOCATIONS_FILE)
}

pub fn allocations_lock_path(root: &Path) -> PathBuf {
    root.join(ALLOCATIONS_LOCK_FILE)
}

pub fn user_config_path() -> Result<PathBuf> {
    let home = home::home_dir().ok_or(WtError::HomeNotFound)?;
    Ok(home.join(USER_CONFIG_FILE))
}

pub fn worktree_path(root: &Path, trees_dir: &str, feature: &str) -> PathBuf {
    root.join(trees_dir).join(feature)
}

pub fn is_initialized(root: &Path) -> bool {
    config_path(root).exists()
}

// ---------------------------------------------------------------------------
// Command path resolution
// ---------------------------------------------------------------------------

/// A command "looks like a path" if it contains a separator or names a shell script.
pub fn is_relative_command(command: &str) -> bool {
    command.contains('/') || command.ends_with(".sh")
}

/// Anchor relative-looking commands at `base`; absolute and bare commands pass through.
pub fn resolve_relative_command(command: &str, base: &Path) -> String {
    if !is_relative_command(command) || Path::new(command).is_absolute() {
        return command.to_string();
    }
    base.join(command).to_string_lossy().into_owned()
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` at the root is dropped, matching how the OS treats `/..`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Feature name validation
// ---------------------------------------------------------------------------

static FEATURE_RE: OnceLock<Regex> = OnceLock::new();

fn feature_re() -> &'static Regex {
    FEATURE_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._\-]*$").expect("feature name regex is valid")
    })
}

pub fn validate_feature_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 || name.contains("..") || !feature_re().is_match(name) {
        return Err(WtError::InvalidFeatureName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_feature_names() {
        for name in ["auth-login", "a", "my_feature.2", "JIRA-123"] {
            validate_feature_name(name).unwrap_or_else(|_| panic!("expected valid: {name}"));
        }
    }

    #[test]
    fn invalid_feature_names() {
        for name in ["", "-dash", ".hidden", "has spaces", "a/b", "a..b", "../up"] {
            assert!(validate_feature_name(name).is_err(), "expected invalid: {name}");
        }
    }

    #[test]
    fn relative_commands_are_detected() {
        assert!(is_relative_command("./scripts/setup.sh"));
        assert!(is_relative_command("scripts/run"));
        assert!(is_relative_command("setup.sh"));
        assert!(!is_relative_command("npm"));
        assert!(!is_relative_command("bun"));
    }

    #[test]
    fn resolve_relative_command_anchors_at_base() {
        let base = Path::new("/project/.wt");
        assert_eq!(
            resolve_relative_command("./scripts/run.sh", base),
            "/project/.wt/./scripts/run.sh"
        );
        assert_eq!(resolve_relative_command("setup.sh", base), "/project/.wt/setup.sh");
    }

    #[test]
    fn resolve_relative_command_leaves_bare_and_absolute() {
        let base = Path::new("/project/.wt");
        assert_eq!(resolve_relative_command("npm run build", base), "npm run build");
        assert_eq!(resolve_relative_command("/usr/bin/env", base), "/usr/bin/env");
    }

    #[test]
    fn normalize_collapses_parent_segments() {
        assert_eq!(
            normalize(Path::new("/project/.wt/../../etc/passwd")),
            PathBuf::from("/etc/passwd")
        );
        assert_eq!(
            normalize(Path::new("/project/.wt/./scripts/setup.sh")),
            PathBuf::from("/project/.wt/scripts/setup.sh")
        );
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[test]
    fn worktree_path_joins_segments() {
        assert_eq!(
            worktree_path(Path::new("/repo"), "trees", "auth"),
            PathBuf::from("/repo/trees/auth")
        );
    }
}
