//! Project file (`taskbench.toml`) describing tasks and executor limits.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::naming::is_valid_task_name;

/// File name looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "taskbench.toml";

/// Project configuration (TOML).
///
/// Missing fields default to sensible values, so an empty or absent file is a
/// valid project with no tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name; defaults to the directory name.
    pub name: Option<String>,

    pub executor: ExecutorConfig,

    /// Present when the helm plugin should be applied.
    pub helm: Option<HelmConfig>,

    #[serde(rename = "task")]
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Wall-clock limit for a single external command, in seconds.
    pub timeout_secs: u64,

    /// Keep at most this many bytes of stdout and of stderr per command.
    pub output_limit_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HelmConfig {
    /// Helm binary to invoke.
    pub executable: String,
    /// Chart directory, relative to the project directory.
    pub chart_dir: PathBuf,
    /// Where packaged charts are written, relative to the project directory.
    pub destination: PathBuf,
    /// Pass `--strict` to `helm lint`.
    pub strict: bool,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            executable: "helm".to_string(),
            chart_dir: PathBuf::from("chart"),
            destination: PathBuf::from("build/charts"),
            strict: false,
        }
    }
}

/// A command task declared in the project file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct TaskConfig {
    pub name: String,
    /// Program followed by its arguments (e.g. `["cargo","fmt","--check"]`).
    pub command: Vec<String>,
    /// Working directory relative to the project directory.
    pub workdir: Option<PathBuf>,
    pub depends_on: Vec<String>,
    pub description: Option<String>,
    /// Treat a non-zero exit code as success.
    pub ignore_exit_code: bool,
}

impl ProjectConfig {
    pub fn validate(&self) -> Result<()> {
        if self.executor.timeout_secs == 0 {
            return Err(anyhow!("executor.timeout_secs must be > 0"));
        }
        if self.executor.output_limit_bytes == 0 {
            return Err(anyhow!("executor.output_limit_bytes must be > 0"));
        }
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(anyhow!("name must not be blank"));
        }
        if let Some(helm) = &self.helm
            && helm.executable.trim().is_empty()
        {
            return Err(anyhow!("helm.executable must not be blank"));
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !is_valid_task_name(&task.name) {
                return Err(anyhow!("invalid task name {:?}", task.name));
            }
            if !seen.insert(task.name.as_str()) {
                return Err(anyhow!("duplicate task name {:?}", task.name));
            }
            if task.command.is_empty() || task.command[0].trim().is_empty() {
                return Err(anyhow!(
                    "task {:?}: command must be a non-empty array",
                    task.name
                ));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ProjectConfig::default()`.
pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no project file, using defaults");
        let cfg = ProjectConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ProjectConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    debug!(tasks = cfg.tasks.len(), helm = cfg.helm.is_some(), "project file loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ProjectConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, command: &[&str]) -> TaskConfig {
        TaskConfig {
            name: name.to_string(),
            command: command.iter().map(|part| part.to_string()).collect(),
            ..TaskConfig::default()
        }
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ProjectConfig::default());
    }

    #[test]
    fn parses_tasks_and_helm_section() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"
name = "demo"

[executor]
timeout_secs = 5

[helm]
chart_dir = "charts/demo"

[[task]]
name = "fmt"
command = ["cargo", "fmt", "--check"]

[[task]]
name = "ci"
command = ["just", "ci"]
depends_on = ["fmt"]
"#,
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.name.as_deref(), Some("demo"));
        assert_eq!(cfg.executor.timeout_secs, 5);
        assert_eq!(cfg.executor.output_limit_bytes, 1_000_000);
        let helm = cfg.helm.expect("helm section");
        assert_eq!(helm.chart_dir, PathBuf::from("charts/demo"));
        assert_eq!(helm.executable, "helm");
        assert_eq!(cfg.tasks.len(), 2);
        assert_eq!(cfg.tasks[1].depends_on, vec!["fmt".to_string()]);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        let cfg = ProjectConfig {
            name: Some("demo".to_string()),
            tasks: vec![task("fmt", &["cargo", "fmt"])],
            ..ProjectConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = ProjectConfig::default();
        cfg.executor.timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let cfg = ProjectConfig {
            tasks: vec![task("fmt", &[])],
            ..ProjectConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("command must be a non-empty array"));

        let cfg = ProjectConfig {
            tasks: vec![task("fmt", &["a"]), task("fmt", &["b"])],
            ..ProjectConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate task name"));

        let cfg = ProjectConfig {
            tasks: vec![task("has space", &["a"])],
            ..ProjectConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
