use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `WT_ROOT` env var (passed in as `explicit`), made absolute
/// 2. Walk upward from `cwd` looking for `.wt/`
/// 3. Walk upward from `cwd` looking for `.git`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf());
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root_from(&cwd)
}

fn find_root_from(cwd: &Path) -> PathBuf {
    // the main checkout holds .wt/; a worktree's .git is a file, so stop at .git dirs only
    find_upward(cwd, |dir| dir.join(".wt").is_dir())
        .or_else(|| find_upward(cwd, |dir| dir.join(".git").is_dir()))
        .unwrap_or_else(|| cwd.to_path_buf())
}

fn find_upward(start: &Path, found: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start.ancestors().find(|dir| found(dir)).map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn relative_explicit_root_is_made_absolute() {
        let result = resolve_root(Some(Path::new(".")));
        assert!(result.is_absolute());
        assert_eq!(result, std::env::current_dir().unwrap().join("."));
    }

    #[test]
    fn finds_wt_dir_from_feature_tree() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".wt")).unwrap();
        let tree = dir.path().join("trees/auth/src");
        std::fs::create_dir_all(&tree).unwrap();
        std::fs::write(dir.path().join("trees/auth/.git"), "gitdir: elsewhere\n").unwrap();

        assert_eq!(find_root_from(&tree), dir.path());
    }

    #[test]
    fn falls_back_to_git_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let sub = dir.path().join("src/deep");
        std::fs::create_dir_all(&sub).unwrap();

        assert_eq!(find_root_from(&sub), dir.path());
    }
}
