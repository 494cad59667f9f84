//! Dataset files from the Hugging Face hub, cached on disk

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::jsonl::read_jsonl;
use crate::http::{check_response, create_client};

const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// A dataset repository pinned to a revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub path: String,
    pub revision: String,
}

impl DatasetRef {
    pub fn new(path: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision: revision.into(),
        }
    }

    /// Repository-relative file for one config/split.
    ///
    /// XMarket reads `corpus-{lang}/test.jsonl`, `queries-{lang}/test.jsonl`
    /// and `qrels-{lang}/test.jsonl`. `jinaai/xmarket_ml` is published with a
    /// loading script, so the hub copy may not hold files at these paths; a
    /// `data_dir` mirror laid out as `{path}/{config}/{split}.jsonl` is read
    /// before any download is attempted.
    pub fn file_for(config: &str, split: &str) -> String {
        format!("{}/{}.jsonl", config, split)
    }
}

/// Resolves dataset files: local mirror first, then cache, then download
pub struct DatasetSource {
    client: Client,
    endpoint: String,
    token: Option<String>,
    cache_dir: PathBuf,
    data_dir: Option<PathBuf>,
}

impl DatasetSource {
    pub fn new(cache_dir: PathBuf, data_dir: Option<PathBuf>) -> Self {
        Self {
            client: create_client(),
            endpoint: env::var("HF_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            token: env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
            cache_dir,
            data_dir,
        }
    }

    /// Default cache location: `<cache_dir>/mteb/datasets`
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("mteb")
            .join("datasets")
    }

    fn cached_path(&self, dataset: &DatasetRef, file: &str) -> PathBuf {
        self.cache_dir
            .join(&dataset.path)
            .join(&dataset.revision)
            .join(file)
    }

    fn mirror_path(&self, dataset: &DatasetRef, file: &str) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(&dataset.path).join(file))
    }

    /// Local path of `file`, downloading it when needed
    pub async fn fetch(&self, dataset: &DatasetRef, file: &str) -> anyhow::Result<PathBuf> {
        if let Some(mirror) = self.mirror_path(dataset, file) {
            if mirror.exists() {
                debug!("Using local mirror {}", mirror.display());
                return Ok(mirror);
            }
        }

        let cached = self.cached_path(dataset, file);
        if cached.exists() {
            debug!("Using cached {}", cached.display());
            return Ok(cached);
        }

        self.download(dataset, file, &cached).await?;
        Ok(cached)
    }

    fn file_url(&self, dataset: &DatasetRef, file: &str) -> String {
        format!(
            "{}/datasets/{}/resolve/{}/{}",
            self.endpoint.trim_end_matches('/'),
            dataset.path,
            dataset.revision,
            file
        )
    }

    async fn download(&self, dataset: &DatasetRef, file: &str, target: &Path) -> anyhow::Result<()> {
        let url = self.file_url(dataset, file);
        info!("Downloading {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = check_response(request.send().await?, "Hugging Face hub")
            .await
            .with_context(|| {
                format!(
                    "{} not found on the hub; place it at <data_dir>/{}/{}",
                    url, dataset.path, file
                )
            })?;
        let bytes = response.bytes().await?;

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create cache dir {}", parent.display()))?;
        }
        // Write-then-rename so an interrupted download never looks cached
        let partial = target.with_extension("partial");
        std::fs::write(&partial, &bytes).with_context(|| format!("write {}", partial.display()))?;
        std::fs::rename(&partial, target)?;

        debug!("Cached {} bytes at {}", bytes.len(), target.display());
        Ok(())
    }

    /// Fetch and parse the rows of one config/split
    pub async fn load_rows<T: DeserializeOwned>(
        &self,
        dataset: &DatasetRef,
        config: &str,
        split: &str,
    ) -> anyhow::Result<Vec<T>> {
        let file = DatasetRef::file_for(config, split);
        let path = self.fetch(dataset, &file).await?;
        read_jsonl(&path).with_context(|| format!("load {}:{}/{}", dataset.path, config, split))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mirror_wins_over_network() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = DatasetRef::new("org/data", "rev1");
        let file = DatasetRef::file_for("queries-en", "test");
        let mirror = dir.path().join("mirror").join("org/data").join(&file);
        std::fs::create_dir_all(mirror.parent().unwrap()).unwrap();
        std::fs::write(&mirror, "{\"_id\":\"q1\",\"text\":\"hi\"}\n").unwrap();

        let source = DatasetSource::new(dir.path().join("cache"), Some(dir.path().join("mirror")));
        let path = source.fetch(&dataset, &file).await.unwrap();
        assert_eq!(path, mirror);

        let rows: Vec<serde_json::Value> = source.load_rows(&dataset, "queries-en", "test").await.unwrap();
        assert_eq!(rows[0]["text"], "hi");
    }

    #[tokio::test]
    async fn test_cache_hit_is_revision_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let source = DatasetSource::new(dir.path().to_path_buf(), None);
        let dataset = DatasetRef::new("org/data", "rev1");
        let cached = source.cached_path(&dataset, "corpus-en/test.jsonl");
        assert!(cached.ends_with("org/data/rev1/corpus-en/test.jsonl"));

        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, "").unwrap();
        assert_eq!(source.fetch(&dataset, "corpus-en/test.jsonl").await.unwrap(), cached);
    }

    #[test]
    fn test_xmarket_file_layout() {
        let source = DatasetSource {
            client: create_client(),
            endpoint: "https://hub.example/".to_string(),
            token: None,
            cache_dir: PathBuf::from("cache"),
            data_dir: Some(PathBuf::from("mirror")),
        };
        let dataset = DatasetRef::new("jinaai/xmarket_ml", "dfe57acff5b62c23732a7b7d3e3fb84ff501708b");

        assert_eq!(DatasetRef::file_for("corpus-de", "test"), "corpus-de/test.jsonl");
        assert_eq!(DatasetRef::file_for("qrels-es", "test"), "qrels-es/test.jsonl");

        let file = DatasetRef::file_for("queries-en", "test");
        assert_eq!(
            source.file_url(&dataset, &file),
            "https://hub.example/datasets/jinaai/xmarket_ml/resolve/dfe57acff5b62c23732a7b7d3e3fb84ff501708b/queries-en/test.jsonl"
        );
        assert_eq!(
            source.mirror_path(&dataset, &file),
            Some(PathBuf::from("mirror/jinaai/xmarket_ml/queries-en/test.jsonl"))
        );
    }
}
