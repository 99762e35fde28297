use crate::error::{Result, WtError};
use std::path::Path;

/// Feature name from a path inside `<trees_dir>/<feature>/...`.
pub fn detect_feature_from_cwd(cwd: &Path, trees_dir: &str) -> Option<String> {
    let normalized = cwd.to_string_lossy().replace('\\', "/");
    let segment = format!("/{}/", trees_dir.trim_end_matches('/'));
    // a bare tree directory has no trailing slash
    let haystack = format!("{normalized}/");
    let idx = haystack.find(&segment)?;
    let rest = &haystack[idx + segment.len()..];
    let feature = rest.split('/').next()?;
    if feature.is_empty() {
        return None;
    }
    Some(feature.to_string())
}

/// Explicit name if given, otherwise the feature whose tree contains `cwd`.
pub fn resolve_feature(explicit: Option<&str>, cwd: &Path, trees_dir: &str) -> Result<String> {
    if let Some(feature) = explicit.filter(|f| !f.is_empty()) {
        return Ok(feature.to_string());
    }
    detect_feature_from_cwd(cwd, trees_dir).ok_or(WtError::FeatureNotDetected)
}
