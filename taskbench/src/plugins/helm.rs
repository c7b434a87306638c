//! Helm plugin: `HelmLint` and `HelmPackage` task kinds that drive the `helm` CLI.
//!
//! The tasks only build command lines and hand them to the project's
//! executor; chart contents are never read here.

use std::any::Any;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::kinds::KindSpec;
use crate::core::types::ExecRequest;
use crate::io::config::HelmConfig;
use crate::io::executor::exec_checked;
use crate::plugins::Plugin;
use crate::project::Project;
use crate::task::{Task, TaskContext, TaskCore, TaskType};

pub const PLUGIN_ID: &str = "helm";

/// Registers the helm task kinds plus `helmLint` and `helmPackage` tasks.
#[derive(Debug, Clone, Default)]
pub struct HelmPlugin {
    config: HelmConfig,
}

impl HelmPlugin {
    pub fn new(config: HelmConfig) -> Self {
        Self { config }
    }
}

impl Plugin for HelmPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn apply(&self, project: &mut Project) -> Result<()> {
        project.register_kind(KindSpec::new(HelmLint::KIND))?;
        project.register_kind(KindSpec::new(HelmPackage::KIND))?;
        project.set_property("helm.executable", &self.config.executable);

        let lint_name = project
            .register_task::<HelmLint, _>(None, |task| {
                task.core_mut().description = Some("Lint the chart with `helm lint`".into());
                task.executable = self.config.executable.clone();
                task.chart_dir = self.config.chart_dir.clone();
                task.strict = self.config.strict;
            })?
            .name()
            .to_string();
        project.register_task::<HelmPackage, _>(None, |task| {
            task.core_mut().description = Some("Package the chart into an archive".into());
            task.executable = self.config.executable.clone();
            task.chart_dir = self.config.chart_dir.clone();
            task.destination = self.config.destination.clone();
            task.depend_on(&lint_name);
        })?;
        Ok(())
    }
}

/// `helm lint <chart> [--strict] [-f values]...`
#[derive(Debug, Clone, Default)]
pub struct HelmLint {
    core: TaskCore,
    pub executable: String,
    pub chart_dir: PathBuf,
    pub strict: bool,
    pub values_files: Vec<PathBuf>,
}

impl HelmLint {
    pub fn request(&self, ctx: &TaskContext<'_>) -> ExecRequest {
        let mut request = ExecRequest::new(&self.executable, ctx.project_dir)
            .arg("lint")
            .arg(self.chart_dir.display().to_string());
        if self.strict {
            request = request.arg("--strict");
        }
        for values in &self.values_files {
            request = request.arg("-f").arg(values.display().to_string());
        }
        request
    }
}

impl Task for HelmLint {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    #[instrument(skip_all, fields(task = %self.core.name()))]
    fn run(&self, ctx: &TaskContext<'_>) -> Result<()> {
        let request = self.request(ctx);
        info!(chart = %self.chart_dir.display(), "linting chart");
        exec_checked(ctx.executor, &request)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TaskType for HelmLint {
    const KIND: &'static str = "HelmLint";

    fn create(name: &str) -> Self {
        Self {
            core: TaskCore::new(name),
            executable: "helm".to_string(),
            ..Self::default()
        }
    }
}

/// `helm package <chart> --destination <dir> [--version v] [--app-version v]`
#[derive(Debug, Clone, Default)]
pub struct HelmPackage {
    core: TaskCore,
    pub executable: String,
    pub chart_dir: PathBuf,
    pub destination: PathBuf,
    pub version: Option<String>,
    pub app_version: Option<String>,
}

impl HelmPackage {
    pub fn request(&self, ctx: &TaskContext<'_>) -> ExecRequest {
        let mut request = ExecRequest::new(&self.executable, ctx.project_dir)
            .arg("package")
            .arg(self.chart_dir.display().to_string())
            .arg("--destination")
            .arg(self.destination.display().to_string());
        if let Some(version) = &self.version {
            request = request.arg("--version").arg(version);
        }
        if let Some(app_version) = &self.app_version {
            request = request.arg("--app-version").arg(app_version);
        }
        request
    }
}

impl Task for HelmPackage {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    #[instrument(skip_all, fields(task = %self.core.name()))]
    fn run(&self, ctx: &TaskContext<'_>) -> Result<()> {
        let destination = ctx.resolve(&self.destination);
        fs::create_dir_all(&destination)
            .with_context(|| format!("create chart destination {}", destination.display()))?;
        let request = self.request(ctx);
        info!(chart = %self.chart_dir.display(), "packaging chart");
        exec_checked(ctx.executor, &request)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TaskType for HelmPackage {
    const KIND: &'static str = "HelmPackage";

    fn create(name: &str) -> Self {
        Self {
            core: TaskCore::new(name),
            executable: "helm".to_string(),
            ..Self::default()
        }
    }
}
