//! `.env` generation from templates checked into the worktree.

use crate::config::EnvFile;
use crate::env::{port_vars, Env};
use crate::error::{Result, WtError};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

static ASSIGN_RE: OnceLock<Regex> = OnceLock::new();
static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn assign_re() -> &'static Regex {
    ASSIGN_RE.get_or_init(|| Regex::new(r"^([A-Z_][A-Z0-9_]*)=(.*)").expect("assignment regex is valid"))
}

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE
        .get_or_init(|| Regex::new(r"\$\{(WT_PORT_\d+)\}").expect("placeholder regex is valid"))
}

/// Expand `${WT_PORT_N}` placeholders. Unknown placeholders are kept verbatim.
pub fn substitute_port_vars(template: &str, vars: &Env) -> String {
    placeholder_re()
        .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Rewrite `KEY=value` when `KEY` is in `replace`; every other line is returned as-is.
pub fn process_line(line: &str, replace: &BTreeMap<String, String>, vars: &Env) -> String {
    let Some(caps) = assign_re().captures(line) else {
        return line.to_string();
    };
    let key = &caps[1];
    match replace.get(key) {
        Some(template) => format!("{key}={}", substitute_port_vars(template, vars)),
        None => line.to_string(),
    }
}

pub fn apply_replacements(content: &str, replace: &BTreeMap<String, String>, vars: &Env) -> String {
    content
        .split('\n')
        .map(|line| process_line(line, replace, vars))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render every configured env file inside `tree` for the given ports.
pub fn generate_env_files(tree: &Path, env_files: &[EnvFile], ports: &[u32]) -> Result<()> {
    let vars = port_vars(ports);
    for entry in env_files {
        let dir = tree.join(&entry.path);
        let source = dir.join(&entry.source);
        let dest = dir.join(&entry.dest);

        if !source.exists() {
            return Err(WtError::EnvTemplateNotFound(source));
        }
        let content = std::fs::read_to_string(&source)?;
        let rendered = apply_replacements(&content, &entry.replace, &vars);

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, rendered)?;
        tracing::debug!(dest = %dest.display(), "wrote env file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn replace(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_placeholders() {
        let vars = port_vars(&[3000, 3001]);
        assert_eq!(
            substitute_port_vars("http://localhost:${WT_PORT_1}", &vars),
            "http://localhost:3000"
        );
        assert_eq!(substitute_port_vars("${WT_PORT_1}:${WT_PORT_2}", &vars), "3000:3001");
    }

    #[test]
    fn leaves_unknown_placeholders() {
        let vars = port_vars(&[3000]);
        assert_eq!(substitute_port_vars("${WT_PORT_9}", &vars), "${WT_PORT_9}");
        assert_eq!(substitute_port_vars("${HOME}", &vars), "${HOME}");
    }

    #[test]
    fn process_line_only_touches_listed_keys() {
        let vars = port_vars(&[4000]);
        let map = replace(&[("PORT", "${WT_PORT_1}")]);
        assert_eq!(process_line("PORT=3000", &map, &vars), "PORT=4000");
        assert_eq!(process_line("API_KEY=secret", &map, &vars), "API_KEY=secret");
        assert_eq!(process_line("# PORT=3000", &map, &vars), "# PORT=3000");
        assert_eq!(process_line("", &map, &vars), "");
    }

    #[test]
    fn apply_replacements_preserves_trailing_newline() {
        let vars = port_vars(&[4000]);
        let map = replace(&[("PORT", "${WT_PORT_1}")]);
        assert_eq!(
            apply_replacements("A=1\nPORT=3000\n", &map, &vars),
            "A=1\nPORT=4000\n"
        );
    }

    #[test]
    fn generates_env_file_from_template() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("packages/api");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(
            pkg.join(".env.template"),
            "PORT=3000\nDATABASE_URL=postgres://localhost:5432/db\n",
        )
        .unwrap();

        let env_files = vec![EnvFile {
            path: "packages/api".into(),
            source: ".env.template".into(),
            dest: ".env".into(),
            replace: replace(&[
                ("PORT", "${WT_PORT_1}"),
                ("DATABASE_URL", "postgres://localhost:${WT_PORT_2}/db"),
            ]),
        }];
        generate_env_files(dir.path(), &env_files, &[3100, 3101]).unwrap();

        let content = std::fs::read_to_string(pkg.join(".env")).unwrap();
        assert_eq!(content, "PORT=3100\nDATABASE_URL=postgres://localhost:3101/db\n");
    }

    #[test]
    fn missing_template_errors() {
        let dir = TempDir::new().unwrap();
        let env_files = vec![EnvFile {
            path: "missing".into(),
            source: ".env.template".into(),
            dest: ".env".into(),
            replace: BTreeMap::new(),
        }];
        let err = generate_env_files(dir.path(), &env_files, &[]).unwrap_err();
        assert!(err.to_string().contains("env template not found"));
    }
}
