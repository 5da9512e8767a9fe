use crate::chunking::TextSplitter;
use crate::document::DocumentSource;
use crate::embeddings::Embedder;
use crate::store::{IndexedChunk, VectorStore};
use anyhow::Result;
use log::{debug, info};

/// Number of documents returned per question
pub const DEFAULT_TOP_K: usize = 4;

/// A piece of indexed text returned for a question
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub text: String,
    /// URL or file name the text came from
    pub source: String,
    pub score: f32,
}

/// Returns the documents most relevant to a question, best match first
#[allow(async_fn_in_trait)]
pub trait Retriever {
    async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedDocument>>;
}

impl<T: Retriever + ?Sized> Retriever for &T {
    async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedDocument>> {
        (**self).retrieve(question).await
    }
}

/// Build the index from `source` unless the store already holds one.
///
/// Returns `true` when a new index was built.
pub async fn ensure_index<D, E, S>(
    source: &D,
    splitter: &TextSplitter,
    embedder: &E,
    store: &S,
) -> Result<bool>
where
    D: DocumentSource,
    E: Embedder,
    S: VectorStore,
{
    if store.exists().await? {
        info!("Using existing vector index");
        return Ok(false);
    }

    info!("No vector index found, building one");
    let documents = source.load().await?;

    let chunks = splitter.split_documents(&documents);
    info!(
        "Split {} documents into {} chunks",
        documents.len(),
        chunks.len()
    );

    info!("Generating embeddings for chunks...");
    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let embeddings = embedder.embed_all(&texts).await?;

    let indexed = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
        .collect();
    store.store(indexed).await?;

    Ok(true)
}

/// Similarity search over a [`VectorStore`], embedding the question first
pub struct VectorRetriever<E, S> {
    embedder: E,
    store: S,
    top_k: usize,
}

impl<E: Embedder, S: VectorStore> VectorRetriever<E, S> {
    pub fn new(embedder: E, store: S) -> Self {
        VectorRetriever {
            embedder,
            store,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Reuse the persisted index in `store`, or build it from `source` first
    pub async fn build_or_load<D: DocumentSource>(
        source: &D,
        splitter: &TextSplitter,
        embedder: E,
        store: S,
    ) -> Result<Self> {
        ensure_index(source, splitter, &embedder, &store).await?;
        Ok(Self::new(embedder, store))
    }
}

impl<E: Embedder, S: VectorStore> Retriever for VectorRetriever<E, S> {
    async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedDocument>> {
        let query = self.embedder.embed(question).await?;
        let hits = self.store.search(&query, self.top_k).await?;
        debug!("Retrieved {} chunks", hits.len());

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedDocument {
                text: hit.chunk.text,
                source: hit.chunk.source,
                score: hit.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::embeddings::tests::LetterEmbedder;
    use crate::store::LocalStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory documents, counts how often they are loaded
    struct StaticSource {
        documents: Vec<Document>,
        loads: AtomicUsize,
    }

    impl StaticSource {
        fn new(texts: &[&str]) -> Self {
            StaticSource {
                documents: texts
                    .iter()
                    .enumerate()
                    .map(|(i, t)| Document::new(*t, format!("page-{}", i)))
                    .collect(),
                loads: AtomicUsize::new(0),
            }
        }

        fn load_count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl DocumentSource for StaticSource {
        async fn load(&self) -> Result<Vec<Document>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.documents.clone())
        }
    }

    struct BrokenSource;

    impl DocumentSource for BrokenSource {
        async fn load(&self) -> Result<Vec<Document>> {
            Err(anyhow::anyhow!("sitemap unreachable"))
        }
    }

    #[tokio::test]
    async fn test_index_is_built_once_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let source = StaticSource::new(&["aaa", "bbb", "ccc"]);
        let embedder = LetterEmbedder::default();
        let splitter = TextSplitter::default();

        let built = ensure_index(&source, &splitter, &embedder, &LocalStore::new(&path))
            .await
            .unwrap();
        assert!(built);
        assert_eq!(source.load_count(), 1);
        assert_eq!(embedder.call_count(), 3);

        let built = ensure_index(&source, &splitter, &embedder, &LocalStore::new(&path))
            .await
            .unwrap();
        assert!(!built);
        assert_eq!(source.load_count(), 1);
        assert_eq!(embedder.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retrieve_returns_best_matches_first() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticSource::new(&["aaaa", "bbbb", "cccc", "ab"]);
        let embedder = LetterEmbedder::default();

        let retriever = VectorRetriever::build_or_load(
            &source,
            &TextSplitter::default(),
            &embedder,
            LocalStore::new(dir.path().join("index.json")),
        )
        .await
        .unwrap()
        .with_top_k(2);

        let docs = retriever.retrieve("bb").await.unwrap();

        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["bbbb", "ab"]);
        assert_eq!(docs[0].source, "page-1");
        // four chunks plus the question
        assert_eq!(embedder.call_count(), 5);
    }

    #[tokio::test]
    async fn test_build_failure_is_propagated() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("index.json"));

        let err = ensure_index(
            &BrokenSource,
            &TextSplitter::default(),
            &LetterEmbedder::default(),
            &store,
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "sitemap unreachable");
        assert!(!store.exists().await.unwrap());
    }
}
