//! Build a [`Project`] from the project file in a directory.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::config::{CONFIG_FILE_NAME, ProjectConfig, load_config};
use crate::io::executor::SystemExecutor;
use crate::plugins::HelmPlugin;
use crate::project::Project;
use crate::task::{ExecTask, Task};

/// Load `taskbench.toml` from `dir` and build the project it describes.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn load_project(dir: &Path) -> Result<Project> {
    let cfg = load_config(&dir.join(CONFIG_FILE_NAME))?;
    project_from_config(dir, &cfg)
}

/// Build a project over `dir` from an already loaded config.
pub fn project_from_config(dir: &Path, cfg: &ProjectConfig) -> Result<Project> {
    let name = cfg
        .name
        .clone()
        .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "project".to_string());
    let mut project = Project::open(name, dir)
        .with_executor(Box::new(SystemExecutor::new(&cfg.executor)));

    if let Some(helm) = &cfg.helm {
        project.apply_plugin(&HelmPlugin::new(helm.clone()))?;
    }

    for task_cfg in &cfg.tasks {
        project
            .register_task::<ExecTask, _>(Some(&task_cfg.name), |task| {
                task.command_line(task_cfg.command.iter().cloned());
                task.workdir = task_cfg.workdir.clone();
                task.ignore_exit_code = task_cfg.ignore_exit_code;
                task.core_mut().description = task_cfg.description.clone();
                for dep in &task_cfg.depends_on {
                    task.depend_on(dep);
                }
            })
            .with_context(|| format!("register task {:?}", task_cfg.name))?;
    }
    debug!(tasks = project.task_names().len(), "project loaded");
    Ok(project)
}
