use crate::chunking::TextChunk;
use crate::embeddings::Embedding;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

/// A chunk together with the embedding it is searched by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: TextChunk,
    pub embedding: Embedding,
}

/// A search hit, higher score is more similar
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// Persistent storage for an embedded document index
#[allow(async_fn_in_trait)]
pub trait VectorStore {
    /// Whether an index has already been persisted
    async fn exists(&self) -> Result<bool>;

    /// Persist a freshly built index
    async fn store(&self, chunks: Vec<IndexedChunk>) -> Result<()>;

    /// Most similar chunks first, at most `limit` of them
    async fn search(&self, query: &Embedding, limit: usize) -> Result<Vec<ScoredChunk>>;
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    chunks: Vec<IndexedChunk>,
}

/// Vector index kept in a single JSON file and searched by cosine similarity.
///
/// The file is read at most once per store; later searches use the copy in memory.
pub struct LocalStore {
    persist_path: PathBuf,
    loaded: OnceCell<Vec<IndexedChunk>>,
}

impl LocalStore {
    pub fn new(persist_path: impl Into<PathBuf>) -> Self {
        LocalStore {
            persist_path: persist_path.into(),
            loaded: OnceCell::new(),
        }
    }

    /// `{tmpdir}/union.json`
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join("union.json")
    }

    pub fn persist_path(&self) -> &Path {
        &self.persist_path
    }

    async fn chunks(&self) -> Result<&Vec<IndexedChunk>> {
        self.loaded
            .get_or_try_init(|| async {
                let bytes = tokio::fs::read(&self.persist_path).await.with_context(|| {
                    format!("Failed to read index {}", self.persist_path.display())
                })?;
                let index: IndexFile = serde_json::from_slice(&bytes).with_context(|| {
                    format!("Failed to parse index {}", self.persist_path.display())
                })?;
                debug!(
                    "Loaded {} chunks from {}",
                    index.chunks.len(),
                    self.persist_path.display()
                );
                Ok::<_, anyhow::Error>(index.chunks)
            })
            .await
    }
}

impl VectorStore for LocalStore {
    async fn exists(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.persist_path).await?)
    }

    async fn store(&self, chunks: Vec<IndexedChunk>) -> Result<()> {
        if let Some(parent) = self.persist_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let index = IndexFile { chunks };
        let bytes = serde_json::to_vec(&index)?;

        // The final path only appears once the whole index is on disk
        let tmp_path = self.persist_path.with_extension("tmp");
        if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                warn!("Failed to remove {}: {}", tmp_path.display(), cleanup);
            }
            return Err(e).with_context(|| {
                format!("Failed to write index {}", self.persist_path.display())
            });
        }
        tokio::fs::rename(&tmp_path, &self.persist_path)
            .await
            .with_context(|| format!("Failed to write index {}", self.persist_path.display()))?;

        info!(
            "Persisted {} chunks to {}",
            index.chunks.len(),
            self.persist_path.display()
        );
        // ignore the error if a previous index was already loaded in this process
        let _ = self.loaded.set(index.chunks);

        Ok(())
    }

    async fn search(&self, query: &Embedding, limit: usize) -> Result<Vec<ScoredChunk>> {
        let mut hits: Vec<ScoredChunk> = self
            .chunks()
            .await?
            .iter()
            .map(|indexed| ScoredChunk {
                chunk: indexed.chunk.clone(),
                score: query.cosine_similarity(&indexed.embedding),
            })
            .collect();

        // stable sort keeps index order between equal scores
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(text: &str, values: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            chunk: TextChunk {
                text: text.to_string(),
                token_count: 1,
                source: "test".to_string(),
            },
            embedding: Embedding { values },
        }
    }

    #[tokio::test]
    async fn test_exists_follows_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("index.json"));

        assert!(!store.exists().await.unwrap());
        store.store(vec![]).await.unwrap();
        assert!(store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        // a directory in the way makes the temporary write fail
        std::fs::create_dir(path.with_extension("tmp")).unwrap();
        let store = LocalStore::new(&path);

        let err = store
            .store(vec![indexed("lost", vec![1.0])])
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("Failed to write index"));
        assert!(!store.exists().await.unwrap());
        assert!(!LocalStore::new(&path).exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_store_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        LocalStore::new(&path).store(vec![]).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("index.json"));
        store
            .store(vec![
                indexed("x axis", vec![1.0, 0.0]),
                indexed("diagonal", vec![1.0, 1.0]),
                indexed("y axis", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .search(&Embedding { values: vec![0.1, 1.0] }, 2)
            .await
            .unwrap();

        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["y axis", "diagonal"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_persisted_index_is_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");
        LocalStore::new(&path)
            .store(vec![indexed("saved", vec![1.0])])
            .await
            .unwrap();

        let reopened = LocalStore::new(&path);
        assert!(reopened.exists().await.unwrap());
        let hits = reopened
            .search(&Embedding { values: vec![1.0] }, 4)
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "saved");
    }

    #[tokio::test]
    async fn test_search_without_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("missing.json"));

        let err = store
            .search(&Embedding { values: vec![1.0] }, 4)
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("Failed to read index"));
    }
}
