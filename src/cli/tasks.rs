//! Tasks command - list available tasks

use std::path::PathBuf;

use clap::Args;

use crate::config::Config;
use crate::tasks::{get_tasks, LocalTask, Task, TaskType};

#[derive(Args)]
pub struct TasksArgs {
    /// Only these task types (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub task_types: Vec<String>,

    /// Only tasks covering these languages (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub languages: Vec<String>,

    /// Also list local tasks from this directory
    #[arg(long)]
    pub tasks_dir: Option<PathBuf>,

    /// Show dataset and citation details
    #[arg(short, long)]
    pub detailed: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

pub async fn run(args: TasksArgs) -> anyhow::Result<()> {
    let mut local: Vec<Box<dyn Task>> = Vec::new();
    if let Some(dir) = args.tasks_dir.or_else(|| Config::load().run.tasks_dir) {
        for task in LocalTask::discover(&dir)? {
            local.push(Box::new(task));
        }
    }

    let task_types = args
        .task_types
        .iter()
        .map(|t| t.parse::<TaskType>())
        .collect::<Result<Vec<_>, _>>()?;
    let tasks = get_tasks(&[], &task_types, &args.languages, local)?;

    if args.format == "json" {
        let metadata: Vec<_> = tasks.iter().map(|t| t.metadata()).collect();
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("MTEB Tasks");
    println!("{}", "=".repeat(50));
    for (i, task) in tasks.iter().enumerate() {
        let meta = task.metadata();
        println!(
            "   {}. {} [{}] main score: {}",
            i + 1,
            meta.name,
            meta.task_type,
            meta.main_score
        );
        println!("      languages: {}", meta.eval_langs.languages().join(", "));
        if args.detailed {
            println!("      dataset: {} @ {}", meta.dataset.path, meta.dataset.revision);
            println!("      splits: {}", meta.eval_splits.join(", "));
            if let Some(category) = &meta.category {
                println!("      category: {}", category);
            }
            if let Some(citation) = &meta.bibtex_citation {
                println!("      citation: {}", citation.lines().next().unwrap_or(""));
            }
        }
    }
    println!("{}", "=".repeat(50));
    println!("Total: {} task(s)", tasks.len());

    Ok(())
}
