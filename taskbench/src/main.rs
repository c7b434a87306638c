//! `taskbench` CLI.
//!
//! Loads `taskbench.toml` from the project directory, builds the project
//! (applying plugins named in the file) and lists or runs its tasks through
//! the real process executor.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use taskbench::exit_codes;
use taskbench::load::load_project;
use taskbench::logging;
use taskbench::project::{Project, ProjectError};

#[derive(Parser)]
#[command(
    name = "taskbench",
    version,
    about = "Run build tasks declared in taskbench.toml"
)]
struct Cli {
    /// Directory containing `taskbench.toml`.
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print registered tasks in registration order.
    List {
        /// Emit JSON instead of one line per task.
        #[arg(long)]
        json: bool,
    },
    /// Run tasks after their dependencies.
    Run {
        #[arg(required = true)]
        tasks: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct TaskSummary<'a> {
    name: &'a str,
    kind: &'a str,
    depends_on: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let project = load_project(&cli.project_dir)
        .with_context(|| format!("load project from {}", cli.project_dir.display()))?;
    match cli.command {
        Command::List { json } => cmd_list(&project, json),
        Command::Run { tasks } => cmd_run(&project, &tasks),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ProjectError>() {
        Some(ProjectError::TaskFailed { .. }) => exit_codes::TASK_FAILED,
        _ => exit_codes::INVALID,
    }
}

fn summaries(project: &Project) -> Vec<TaskSummary<'_>> {
    project
        .task_names()
        .iter()
        .filter_map(|name| project.task(name))
        .map(|task| TaskSummary {
            name: task.name(),
            kind: task.kind(),
            depends_on: task.depends_on(),
            description: task.description(),
        })
        .collect()
}

fn cmd_list(project: &Project, json: bool) -> Result<()> {
    let tasks = summaries(project);
    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }
    for task in &tasks {
        match task.description {
            Some(description) => println!("{}\t{}\t{}", task.name, task.kind, description),
            None => println!("{}\t{}", task.name, task.kind),
        }
    }
    Ok(())
}

fn cmd_run(project: &Project, tasks: &[String]) -> Result<()> {
    let order = project.run_tasks(tasks)?;
    println!("{}", order.join(" -> "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskbench::core::graph::GraphError;

    #[test]
    fn parse_list_json() {
        let cli = Cli::parse_from(["taskbench", "list", "--json"]);
        assert!(matches!(cli.command, Command::List { json: true }));
        assert_eq!(cli.project_dir, PathBuf::from("."));
    }

    #[test]
    fn parse_run_with_project_dir() {
        let cli = Cli::parse_from(["taskbench", "--project-dir", "/srv/app", "run", "lint", "package"]);
        assert_eq!(cli.project_dir, PathBuf::from("/srv/app"));
        match cli.command {
            Command::Run { tasks } => assert_eq!(tasks, vec!["lint", "package"]),
            Command::List { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_a_task() {
        assert!(Cli::try_parse_from(["taskbench", "run"]).is_err());
    }

    #[test]
    fn task_failure_maps_to_its_own_exit_code() {
        let failed = anyhow::Error::from(ProjectError::TaskFailed {
            task: "lint".to_string(),
            source: "exit code 1".into(),
        });
        assert_eq!(exit_code_for(&failed), exit_codes::TASK_FAILED);

        let unknown = anyhow::Error::from(ProjectError::from(GraphError::UnknownTask {
            name: "ghost".to_string(),
        }));
        assert_eq!(exit_code_for(&unknown), exit_codes::INVALID);
    }
}
