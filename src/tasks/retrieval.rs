//! Shared retrieval task plumbing: row shapes, loading and evaluation

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tracing::info;

use super::{EvalOptions, SubsetScores, TaskMetadata};
use crate::datasets::{DatasetRef, DatasetSource};
use crate::encoder::Encoder;
use crate::error::MtebError;
use crate::evaluation::{Corpus, CorpusDoc, Qrels, Queries, RetrievalEvaluator};

/// Corpus, queries and judgments of one subset/split
#[derive(Debug, Clone, Default)]
pub struct RetrievalSplit {
    pub corpus: Corpus,
    pub queries: Queries,
    pub relevant_docs: Qrels,
}

/// subset -> split -> data
pub type RetrievalData = BTreeMap<String, BTreeMap<String, RetrievalSplit>>;

#[derive(Debug, Deserialize)]
pub(crate) struct CorpusRow {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextRow {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
}

pub(crate) fn corpus_from_rows(rows: Vec<CorpusRow>) -> Corpus {
    rows.into_iter()
        .map(|row| {
            (
                row.id,
                CorpusDoc {
                    title: row.title,
                    text: row.text,
                },
            )
        })
        .collect()
}

pub(crate) fn queries_from_rows(rows: Vec<TextRow>) -> Queries {
    rows.into_iter().map(|row| (row.id, row.text)).collect()
}

/// Qrels rows whose `text` lists relevant doc ids separated by spaces,
/// each judged with relevance 1
pub(crate) fn qrels_from_id_lists(rows: Vec<TextRow>) -> Qrels {
    rows.into_iter()
        .map(|row| {
            let docs: HashMap<String, i32> = row
                .text
                .split(' ')
                .filter(|id| !id.is_empty())
                .map(|id| (id.to_string(), 1))
                .collect();
            (row.id, docs)
        })
        .collect()
}

/// Load `corpus-{lang}`, `queries-{lang}` and `qrels-{lang}` for every
/// language subset
pub async fn load_multilingual_retrieval(
    source: &DatasetSource,
    dataset: &DatasetRef,
    langs: &[String],
    split: &str,
) -> anyhow::Result<RetrievalData> {
    let mut data = RetrievalData::new();

    for lang in langs {
        let corpus_config = format!("corpus-{}", lang);
        let queries_config = format!("queries-{}", lang);
        let qrels_config = format!("qrels-{}", lang);

        let (corpus_rows, query_rows, qrels_rows) = futures::try_join!(
            source.load_rows::<CorpusRow>(dataset, &corpus_config, split),
            source.load_rows::<TextRow>(dataset, &queries_config, split),
            source.load_rows::<TextRow>(dataset, &qrels_config, split),
        )?;

        let split_data = RetrievalSplit {
            corpus: corpus_from_rows(corpus_rows),
            queries: queries_from_rows(query_rows),
            relevant_docs: qrels_from_id_lists(qrels_rows),
        };

        info!(
            "{} [{}]: {} documents, {} queries, {} judged queries",
            dataset.path,
            lang,
            split_data.corpus.len(),
            split_data.queries.len(),
            split_data.relevant_docs.len()
        );

        data.entry(lang.clone())
            .or_default()
            .insert(split.to_string(), split_data);
    }

    Ok(data)
}

/// Run the retrieval evaluator over every selected subset of a split
pub async fn evaluate_retrieval(
    metadata: &TaskMetadata,
    data: &RetrievalData,
    model: &dyn Encoder,
    split: &str,
    options: &EvalOptions,
) -> anyhow::Result<Vec<SubsetScores>> {
    let mut evaluator = RetrievalEvaluator::new(&metadata.name, metadata.task_type.as_str());
    evaluator.k_values = options.k_values.clone();
    evaluator.ignore_identical_ids = options.ignore_identical_ids;
    evaluator.corpus_chunk_size = options.corpus_chunk_size;
    evaluator.encode_options = options.encode.clone();

    let mut results = Vec::new();
    for (subset, languages) in metadata.eval_langs.subsets() {
        if !options.wants_subset(&subset) {
            continue;
        }

        let split_data = data
            .get(&subset)
            .and_then(|splits| splits.get(split))
            .ok_or_else(|| MtebError::MissingSplit {
                task: metadata.name.clone(),
                split: format!("{}/{}", subset, split),
            })?;

        info!("Evaluating {} subset '{}' split '{}'", metadata.name, subset, split);
        let scores = evaluator
            .evaluate(model, &split_data.corpus, &split_data.queries, &split_data.relevant_docs)
            .await?;

        results.push(SubsetScores {
            hf_subset: subset,
            languages,
            scores,
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(id: &str, text: &str) -> TextRow {
        TextRow {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_qrels_split_on_spaces() {
        let qrels = qrels_from_id_lists(vec![text_row("q1", "d1 d2"), text_row("q2", "d3  d4")]);
        assert_eq!(qrels["q1"].len(), 2);
        assert_eq!(qrels["q1"]["d2"], 1);
        assert_eq!(qrels["q2"].len(), 2);
        assert!(!qrels["q2"].contains_key(""));
    }

    #[test]
    fn test_corpus_keeps_title() {
        let rows: Vec<CorpusRow> = serde_json::from_str(
            r#"[{"_id":"d1","title":"Shoe","text":"red"},{"_id":"d2","text":"blue"}]"#,
        )
        .unwrap();
        let corpus = corpus_from_rows(rows);
        assert_eq!(corpus["d1"].full_text(), "Shoe red");
        assert_eq!(corpus["d2"].title, None);
    }

    #[tokio::test]
    async fn test_load_multilingual_from_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("org/xm");
        for (config, body) in [
            ("corpus-en", "{\"_id\":\"d1\",\"text\":\"red shoe\"}\n"),
            ("queries-en", "{\"_id\":\"q1\",\"text\":\"shoe\"}\n"),
            ("qrels-en", "{\"_id\":\"q1\",\"text\":\"d1\"}\n"),
        ] {
            std::fs::create_dir_all(root.join(config)).unwrap();
            std::fs::write(root.join(config).join("test.jsonl"), body).unwrap();
        }

        let source = DatasetSource::new(dir.path().join("cache"), Some(dir.path().to_path_buf()));
        let dataset = DatasetRef::new("org/xm", "r");
        let data = load_multilingual_retrieval(&source, &dataset, &["en".to_string()], "test")
            .await
            .unwrap();

        let split = &data["en"]["test"];
        assert_eq!(split.corpus.len(), 1);
        assert_eq!(split.queries["q1"], "shoe");
        assert_eq!(split.relevant_docs["q1"]["d1"], 1);
    }
}
