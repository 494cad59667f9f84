//! Benchmark runner - evaluates one model over a list of tasks

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::datasets::DatasetSource;
use crate::encoder::Encoder;
use crate::models::ModelMeta;
use crate::results::{save_model_meta, TaskResult};
use crate::tasks::{EvalOptions, Task};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_folder: PathBuf,
    /// Re-run tasks that already have a result file
    pub overwrite_results: bool,
    /// Stop at the first failing task instead of logging and moving on
    pub raise_error: bool,
    /// Restrict multilingual tasks to subsets in these languages
    pub languages: Vec<String>,
    pub eval: EvalOptions,
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_folder: PathBuf::from("results"),
            overwrite_results: false,
            raise_error: false,
            languages: Vec::new(),
            eval: EvalOptions::default(),
            show_progress: true,
        }
    }
}

/// Outcome of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Results of evaluated and previously stored tasks
    pub results: Vec<TaskResult>,
    pub evaluated: Vec<String>,
    pub skipped: Vec<String>,
    /// (task, error message)
    pub failed: Vec<(String, String)>,
}

pub struct Mteb {
    tasks: Vec<Box<dyn Task>>,
}

impl Mteb {
    pub fn new(tasks: Vec<Box<dyn Task>>) -> Self {
        Self { tasks }
    }

    pub async fn run(
        &mut self,
        model: &dyn Encoder,
        meta: &ModelMeta,
        source: &DatasetSource,
        options: &RunOptions,
    ) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary::default();
        info!("Evaluating {} on {} task(s)", model.name(), self.tasks.len());
        save_model_meta(&options.output_folder, meta)?;

        let progress = if options.show_progress {
            ProgressBar::new(self.tasks.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );

        for task in self.tasks.iter_mut() {
            let name = task.metadata().name.clone();
            progress.set_message(name.clone());
            let path = TaskResult::path(&options.output_folder, meta, &name);

            if path.exists() && !options.overwrite_results {
                info!("{}: results exist at {}, skipping", name, path.display());
                match TaskResult::load(&path) {
                    Ok(existing) => summary.results.push(existing),
                    Err(e) => warn!("{}: could not read existing result: {:#}", name, e),
                }
                summary.skipped.push(name);
                progress.inc(1);
                continue;
            }

            match run_task(task.as_mut(), model, source, options).await {
                Ok(Some(result)) => {
                    result.save(&path)?;
                    info!(
                        "{}: main score {:.5} in {:.1}s",
                        name,
                        result.main_score().unwrap_or(0.0),
                        result.evaluation_time
                    );
                    summary.results.push(result);
                    summary.evaluated.push(name);
                }
                Ok(None) => {
                    info!("{}: no subsets match the requested languages, skipping", name);
                    summary.skipped.push(name);
                }
                Err(e) if options.raise_error => {
                    progress.abandon();
                    return Err(e.context(format!("task {} failed", name)));
                }
                Err(e) => {
                    error!("{} failed: {:#}", name, e);
                    summary.failed.push((name, format!("{:#}", e)));
                }
            }
            progress.inc(1);
        }

        progress.finish_with_message(format!(
            "{} evaluated, {} skipped, {} failed",
            summary.evaluated.len(),
            summary.skipped.len(),
            summary.failed.len()
        ));
        Ok(summary)
    }
}

async fn run_task(
    task: &mut dyn Task,
    model: &dyn Encoder,
    source: &DatasetSource,
    options: &RunOptions,
) -> anyhow::Result<Option<TaskResult>> {
    let mut eval = options.eval.clone();
    if !options.languages.is_empty() {
        let subsets: Vec<String> = task
            .metadata()
            .subsets_for_languages(&options.languages)
            .into_iter()
            .map(|(subset, _)| subset)
            .collect();
        if subsets.is_empty() {
            return Ok(None);
        }
        eval.subsets = Some(subsets);
    }

    if !task.data_loaded() {
        task.load_data(source).await?;
    }

    let start = Instant::now();
    let mut split_scores = BTreeMap::new();
    for split in task.metadata().eval_splits.clone() {
        info!("{}: evaluating split '{}'", task.metadata().name, split);
        let scores = task.evaluate(model, &split, &eval).await?;
        split_scores.insert(split, scores);
    }
    let elapsed = start.elapsed().as_secs_f64();

    TaskResult::from_scores(task.metadata(), split_scores, elapsed).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::encoder::{EncodeOptions, PromptMap};
    use crate::tasks::{EvalLangs, SubsetScores, TaskMetadata, TaskType};
    use crate::datasets::DatasetRef;

    struct Constant;

    #[async_trait]
    impl Encoder for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn prompts(&self) -> Option<&PromptMap> {
            None
        }

        async fn encode(&self, sentences: &[String], _options: &EncodeOptions) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0]; sentences.len()])
        }
    }

    /// Reports a fixed score per subset and counts loads and evaluations
    struct FakeTask {
        metadata: TaskMetadata,
        fail: bool,
        loaded: bool,
        loads: Arc<AtomicUsize>,
        evaluations: Arc<AtomicUsize>,
    }

    impl FakeTask {
        fn new(name: &str, fail: bool, evaluations: Arc<AtomicUsize>) -> Self {
            let langs = BTreeMap::from([
                ("de".to_string(), vec!["deu-Latn".to_string()]),
                ("en".to_string(), vec!["eng-Latn".to_string()]),
            ]);
            Self {
                metadata: TaskMetadata {
                    name: name.to_string(),
                    description: String::new(),
                    reference: None,
                    dataset: DatasetRef::new("fake/data", "rev"),
                    task_type: TaskType::Retrieval,
                    category: None,
                    modalities: vec!["text".to_string()],
                    eval_splits: vec!["test".to_string()],
                    eval_langs: EvalLangs::Multilingual(langs),
                    main_score: "ndcg_at_10".to_string(),
                    bibtex_citation: None,
                },
                fail,
                loaded: false,
                loads: Arc::new(AtomicUsize::new(0)),
                evaluations,
            }
        }
    }

    #[async_trait]
    impl Task for FakeTask {
        fn metadata(&self) -> &TaskMetadata {
            &self.metadata
        }

        fn data_loaded(&self) -> bool {
            self.loaded
        }

        async fn load_data(&mut self, _source: &DatasetSource) -> anyhow::Result<()> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.loaded = true;
            Ok(())
        }

        async fn evaluate(
            &self,
            _model: &dyn Encoder,
            _split: &str,
            options: &EvalOptions,
        ) -> anyhow::Result<Vec<SubsetScores>> {
            self.evaluations.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(self
                .metadata
                .eval_langs
                .subsets()
                .into_iter()
                .filter(|(s, _)| options.wants_subset(s))
                .map(|(hf_subset, languages)| SubsetScores {
                    hf_subset,
                    languages,
                    scores: BTreeMap::from([("ndcg_at_10".to_string(), 0.25)]),
                })
                .collect())
        }
    }

    fn options(dir: &std::path::Path) -> RunOptions {
        RunOptions {
            output_folder: dir.join("results"),
            show_progress: false,
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn test_run_saves_and_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let source = DatasetSource::new(dir.path().join("cache"), None);
        let meta = ModelMeta::unregistered("org/m", Some("r1".to_string()));
        let count = Arc::new(AtomicUsize::new(0));

        let mut bench = Mteb::new(vec![Box::new(FakeTask::new("A", false, count.clone()))]);
        let summary = bench.run(&Constant, &meta, &source, &options(dir.path())).await.unwrap();
        assert_eq!(summary.evaluated, vec!["A"]);
        assert!(dir.path().join("results/org__m/r1/A.json").exists());
        assert!(dir.path().join("results/org__m/r1/model_meta.json").exists());

        let mut again = Mteb::new(vec![Box::new(FakeTask::new("A", false, count.clone()))]);
        let summary = again.run(&Constant, &meta, &source, &options(dir.path())).await.unwrap();
        assert_eq!(summary.skipped, vec!["A"]);
        assert_eq!(summary.results.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let mut overwrite = options(dir.path());
        overwrite.overwrite_results = true;
        let mut third = Mteb::new(vec![Box::new(FakeTask::new("A", false, count.clone()))]);
        third.run(&Constant, &meta, &source, &overwrite).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_logged_or_raised() {
        let dir = tempfile::tempdir().unwrap();
        let source = DatasetSource::new(dir.path().join("cache"), None);
        let meta = ModelMeta::unregistered("m", None);
        let count = Arc::new(AtomicUsize::new(0));

        let mut bench = Mteb::new(vec![
            Box::new(FakeTask::new("Bad", true, count.clone())),
            Box::new(FakeTask::new("Good", false, count.clone())),
        ]);
        let summary = bench.run(&Constant, &meta, &source, &options(dir.path())).await.unwrap();
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "Bad");
        assert_eq!(summary.evaluated, vec!["Good"]);

        let mut strict = options(dir.path());
        strict.raise_error = true;
        strict.overwrite_results = true;
        let mut bench = Mteb::new(vec![Box::new(FakeTask::new("Bad", true, count.clone()))]);
        let err = bench.run(&Constant, &meta, &source, &strict).await.unwrap_err();
        assert!(format!("{:#}", err).contains("boom"));
    }

    #[tokio::test]
    async fn test_language_filter_limits_subsets() {
        let dir = tempfile::tempdir().unwrap();
        let source = DatasetSource::new(dir.path().join("cache"), None);
        let meta = ModelMeta::unregistered("m", None);
        let count = Arc::new(AtomicUsize::new(0));

        let mut opts = options(dir.path());
        opts.languages = vec!["eng".to_string()];
        let mut bench = Mteb::new(vec![Box::new(FakeTask::new("A", false, count.clone()))]);
        let summary = bench.run(&Constant, &meta, &source, &opts).await.unwrap();
        let entries = &summary.results[0].scores["test"];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hf_subset, "en");

        opts.languages = vec!["fra".to_string()];
        opts.overwrite_results = true;
        let mut bench = Mteb::new(vec![Box::new(FakeTask::new("A", false, count.clone()))]);
        let summary = bench.run(&Constant, &meta, &source, &opts).await.unwrap();
        assert_eq!(summary.skipped, vec!["A"]);
    }

    #[tokio::test]
    async fn test_preloaded_task_not_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let source = DatasetSource::new(dir.path().join("cache"), None);
        let meta = ModelMeta::unregistered("m", None);
        let count = Arc::new(AtomicUsize::new(0));

        let fresh = FakeTask::new("Fresh", false, count.clone());
        let fresh_loads = fresh.loads.clone();
        let mut preloaded = FakeTask::new("Preloaded", false, count.clone());
        preloaded.loaded = true;
        let preloaded_loads = preloaded.loads.clone();

        let mut bench = Mteb::new(vec![Box::new(fresh), Box::new(preloaded)]);
        let summary = bench.run(&Constant, &meta, &source, &options(dir.path())).await.unwrap();
        assert_eq!(summary.evaluated, vec!["Fresh", "Preloaded"]);
        assert_eq!(fresh_loads.load(Ordering::SeqCst), 1);
        assert_eq!(preloaded_loads.load(Ordering::SeqCst), 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
