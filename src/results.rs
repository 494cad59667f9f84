//! Result files - one JSON document per model/revision/task, plus aggregation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::evaluation::Scores;
use crate::models::ModelMeta;
use crate::tasks::{SubsetScores, TaskMetadata};

pub const MTEB_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MODEL_META_FILE: &str = "model_meta.json";

/// Scores of one subset; metric names sit next to the bookkeeping fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub hf_subset: String,
    pub languages: Vec<String>,
    pub main_score: f64,
    #[serde(flatten)]
    pub metrics: Scores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub dataset_revision: String,
    pub task_name: String,
    pub mteb_version: String,
    /// split -> per-subset scores
    pub scores: BTreeMap<String, Vec<ScoreEntry>>,
    /// Seconds spent evaluating all splits
    pub evaluation_time: f64,
    pub kg_co2_emissions: Option<f64>,
}

impl TaskResult {
    /// Assemble a result, picking each subset's main score from its metrics
    pub fn from_scores(
        task: &TaskMetadata,
        split_scores: BTreeMap<String, Vec<SubsetScores>>,
        evaluation_time: f64,
    ) -> anyhow::Result<Self> {
        let mut scores = BTreeMap::new();
        for (split, subsets) in split_scores {
            let mut entries = Vec::with_capacity(subsets.len());
            for subset in subsets {
                let main_score = *subset.scores.get(&task.main_score).with_context(|| {
                    format!(
                        "{}: main score '{}' missing from {}/{} scores",
                        task.name, task.main_score, split, subset.hf_subset
                    )
                })?;
                entries.push(ScoreEntry {
                    hf_subset: subset.hf_subset,
                    languages: subset.languages,
                    main_score,
                    metrics: subset.scores,
                });
            }
            scores.insert(split, entries);
        }

        Ok(Self {
            dataset_revision: task.dataset.revision.clone(),
            task_name: task.name.clone(),
            mteb_version: MTEB_VERSION.to_string(),
            scores,
            evaluation_time,
            kg_co2_emissions: None,
        })
    }

    /// Mean main score over every split and subset
    pub fn main_score(&self) -> Option<f64> {
        let values: Vec<f64> = self
            .scores
            .values()
            .flat_map(|entries| entries.iter().map(|e| e.main_score))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// `<output>/<org__model>/<revision>/<task>.json`
    pub fn path(output_folder: &Path, model: &ModelMeta, task_name: &str) -> PathBuf {
        model_dir(output_folder, model).join(format!("{}.json", task_name))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let result = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(result)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        debug!("Saved {}", path.display());
        Ok(())
    }
}

/// Directory holding one model revision's results
pub fn model_dir(output_folder: &Path, model: &ModelMeta) -> PathBuf {
    output_folder
        .join(model.model_dir_name())
        .join(model.revision_dir_name())
}

/// Write `model_meta.json` next to the task results
pub fn save_model_meta(output_folder: &Path, model: &ModelMeta) -> anyhow::Result<PathBuf> {
    let dir = model_dir(output_folder, model);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(MODEL_META_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(model)?)?;
    Ok(path)
}

/// Every result stored for one model revision
#[derive(Debug, Clone)]
pub struct ModelResults {
    /// Model name as written on disk (`org__model` mapped back to `org/model`)
    pub model: String,
    pub revision: String,
    pub tasks: Vec<TaskResult>,
}

/// Walk `<output>/<model>/<revision>/*.json`; unreadable files are skipped
pub fn load_all(output_folder: &Path) -> anyhow::Result<Vec<ModelResults>> {
    let mut all = Vec::new();
    if !output_folder.exists() {
        return Ok(all);
    }

    for model_dir in sorted_dirs(output_folder)? {
        let model = dir_name(&model_dir).replace("__", "/");
        for revision_dir in sorted_dirs(&model_dir)? {
            let mut files: Vec<PathBuf> = std::fs::read_dir(&revision_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension().map_or(false, |ext| ext == "json")
                        && p.file_name().map_or(false, |n| n != MODEL_META_FILE)
                })
                .collect();
            files.sort();

            let mut tasks = Vec::new();
            for file in files {
                match TaskResult::load(&file) {
                    Ok(result) => tasks.push(result),
                    Err(e) => warn!("Skipping {}: {:#}", file.display(), e),
                }
            }

            if !tasks.is_empty() {
                all.push(ModelResults {
                    model: model.clone(),
                    revision: dir_name(&revision_dir),
                    tasks,
                });
            }
        }
    }

    Ok(all)
}

fn sorted_dirs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Per-task main scores and their mean for one model revision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub model: String,
    pub revision: String,
    pub task_scores: BTreeMap<String, f64>,
    pub mean: Option<f64>,
}

pub fn aggregate(results: &[ModelResults]) -> Vec<ModelSummary> {
    results
        .iter()
        .map(|r| {
            let task_scores: BTreeMap<String, f64> = r
                .tasks
                .iter()
                .filter_map(|t| t.main_score().map(|s| (t.task_name.clone(), s)))
                .collect();
            let mean = if task_scores.is_empty() {
                None
            } else {
                Some(task_scores.values().sum::<f64>() / task_scores.len() as f64)
            };
            ModelSummary {
                model: r.model.clone(),
                revision: r.revision.clone(),
                task_scores,
                mean,
            }
        })
        .collect()
}

/// Plain-text table: one row per model, one column per task, then the mean.
/// Scores are shown as percentages.
pub fn render_table(summaries: &[ModelSummary]) -> String {
    let mut tasks: Vec<&str> = summaries
        .iter()
        .flat_map(|s| s.task_scores.keys().map(|k| k.as_str()))
        .collect();
    tasks.sort();
    tasks.dedup();

    let mut header = vec!["Model".to_string()];
    header.extend(tasks.iter().map(|t| t.to_string()));
    header.push("Mean".to_string());

    let cell = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{:.2}", v * 100.0));
    let rows: Vec<Vec<String>> = summaries
        .iter()
        .map(|s| {
            let mut row = vec![s.model.clone()];
            row.extend(tasks.iter().map(|t| cell(s.task_scores.get(*t).copied())));
            row.push(cell(s.mean));
            row
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            rows.iter()
                .map(|r| r[i].len())
                .chain(std::iter::once(header[i].len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |row: &[String]| -> String {
        row.iter()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    format!("{:<w$}", c, w = widths[i])
                } else {
                    format!("{:>w$}", c, w = widths[i])
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
    };

    let mut out = format_row(&header);
    out.push('\n');
    out.push_str(&"-".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1)));
    for row in &rows {
        out.push('\n');
        out.push_str(&format_row(row));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{Task, XMarket};

    fn subset(name: &str, ndcg: f64) -> SubsetScores {
        SubsetScores {
            hf_subset: name.to_string(),
            languages: vec![format!("{}-Latn", name)],
            scores: BTreeMap::from([
                ("ndcg_at_10".to_string(), ndcg),
                ("map_at_10".to_string(), 0.5),
            ]),
        }
    }

    fn sample_result() -> TaskResult {
        let task = XMarket::new();
        let splits = BTreeMap::from([("test".to_string(), vec![subset("de", 0.4), subset("en", 0.6)])]);
        TaskResult::from_scores(task.metadata(), splits, 1.5).unwrap()
    }

    #[test]
    fn test_from_scores_picks_main_score() {
        let result = sample_result();
        assert_eq!(result.task_name, "XMarket");
        assert_eq!(result.dataset_revision, "dfe57acff5b62c23732a7b7d3e3fb84ff501708b");
        assert_eq!(result.scores["test"][1].main_score, 0.6);
        assert!((result.main_score().unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(result.kg_co2_emissions, None);
    }

    #[test]
    fn test_missing_main_score_is_error() {
        let task = XMarket::new();
        let mut bad = subset("de", 0.1);
        bad.scores.remove("ndcg_at_10");
        let splits = BTreeMap::from([("test".to_string(), vec![bad])]);
        assert!(TaskResult::from_scores(task.metadata(), splits, 0.0).is_err());
    }

    #[test]
    fn test_metrics_flattened_on_disk() {
        let json = serde_json::to_value(sample_result()).unwrap();
        let entry = &json["scores"]["test"][0];
        assert_eq!(entry["hf_subset"], "de");
        assert_eq!(entry["ndcg_at_10"], 0.4);
        assert_eq!(entry["main_score"], 0.4);
        assert!(json["kg_co2_emissions"].is_null());
    }

    #[test]
    fn test_save_load_and_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelMeta::unregistered("org/model", None);
        let path = TaskResult::path(dir.path(), &model, "XMarket");
        assert!(path.ends_with("org__model/no_revision_available/XMarket.json"));

        let result = sample_result();
        result.save(&path).unwrap();
        save_model_meta(dir.path(), &model).unwrap();
        assert_eq!(TaskResult::load(&path).unwrap(), result);

        let all = load_all(dir.path()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].model, "org/model");
        assert_eq!(all[0].tasks.len(), 1);

        let summaries = aggregate(&all);
        assert!((summaries[0].mean.unwrap() - 0.5).abs() < 1e-9);

        let table = render_table(&summaries);
        assert!(table.starts_with("Model"));
        assert!(table.contains("XMarket"));
        assert!(table.contains("50.00"));
    }

    #[test]
    fn test_load_all_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_all(&dir.path().join("nothing")).unwrap().is_empty());
    }
}
