use crate::chunking::{estimate_token_count, TextChunk};
use crate::embeddings::Embedding;
use crate::store::{IndexedChunk, ScoredChunk, VectorStore};
use anyhow::{Context, Result};
use log::{info, warn};
use qdrant_client::qdrant::{
    with_payload_selector, CreateCollectionBuilder, Distance, PointStruct, SearchPoints,
    UpsertPointsBuilder, Value, VectorParams, WithPayloadSelector,
};
use qdrant_client::Qdrant;
use serde_json::json;
use std::collections::HashMap;
use std::env;

const COLLECTION_VECTOR_SIZE: u64 = 768; // embedding-001 dimension

/// Configuration for Qdrant
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let url = env::var("QDRANT_URL").context("QDRANT_URL environment variable is required")?;
        let api_key = env::var("QDRANT_API_KEY").ok();

        Ok(QdrantConfig { url, api_key })
    }
}

/// Vector index kept in a Qdrant collection. The collection existing means
/// the index has been built.
pub struct QdrantStore {
    client: Qdrant,
    collection_name: String,
}

impl QdrantStore {
    /// Create a new Qdrant-backed store for an index name
    pub fn new(config: QdrantConfig, index_name: &str) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder.build()?;

        Ok(QdrantStore {
            client,
            collection_name: get_collection_name(index_name),
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn create_collection(&self, vector_size: u64) -> Result<()> {
        let create_collection = CreateCollectionBuilder::new(self.collection_name.clone())
            .vectors_config(VectorParams {
                size: vector_size,
                distance: Distance::Cosine.into(),
                ..Default::default()
            });

        self.client
            .create_collection(create_collection)
            .await
            .with_context(|| format!("Failed to create collection {}", self.collection_name))?;

        Ok(())
    }
}

impl VectorStore for QdrantStore {
    async fn exists(&self) -> Result<bool> {
        match self.client.collection_info(&self.collection_name).await {
            Ok(_) => Ok(true),
            Err(qdrant_client::QdrantError::ResponseError { status })
                if status.code() == tonic::Code::NotFound =>
            {
                Ok(false)
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to check collection existence: {}",
                e
            )),
        }
    }

    async fn store(&self, chunks: Vec<IndexedChunk>) -> Result<()> {
        let vector_size = chunks
            .first()
            .map(|c| c.embedding.values.len() as u64)
            .unwrap_or(COLLECTION_VECTOR_SIZE);
        self.create_collection(vector_size).await?;

        let count = chunks.len();
        let points = chunks
            .into_iter()
            .enumerate()
            .map(|(idx, indexed)| -> Result<PointStruct> {
                let payload = chunk_payload(&indexed.chunk, idx)?;
                Ok(PointStruct::new(idx as u64, indexed.embedding.values, payload))
            })
            .collect::<Result<Vec<PointStruct>>>();

        let upserted = match points {
            Ok(points) => {
                let upsert_request =
                    UpsertPointsBuilder::new(self.collection_name.clone(), points).build();
                self.client
                    .upsert_points(upsert_request)
                    .await
                    .map(|_| ())
                    .with_context(|| {
                        format!(
                            "Failed to upsert points in collection {}",
                            self.collection_name
                        )
                    })
            }
            Err(e) => Err(e),
        };

        // A half-filled collection would be taken for a finished index
        if let Err(e) = upserted {
            if let Err(cleanup) = self
                .client
                .delete_collection(self.collection_name.clone())
                .await
            {
                warn!(
                    "Failed to drop incomplete collection {}: {}",
                    self.collection_name, cleanup
                );
            }
            return Err(e);
        }

        info!("Stored {} chunks in {}", count, self.collection_name);
        Ok(())
    }

    async fn search(&self, query: &Embedding, limit: usize) -> Result<Vec<ScoredChunk>> {
        let search_request = SearchPoints {
            collection_name: self.collection_name.clone(),
            vector: query.values.clone(),
            limit: limit as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(with_payload_selector::SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let search_response = self
            .client
            .search_points(search_request)
            .await
            .with_context(|| format!("Failed to search collection {}", self.collection_name))?;

        let hits = search_response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                Some(ScoredChunk {
                    chunk: chunk_from_payload(&scored_point.payload)?,
                    score: scored_point.score,
                })
            })
            .collect();

        Ok(hits)
    }
}

/// Point payload for the `idx`-th chunk of an index
fn chunk_payload(chunk: &TextChunk, idx: usize) -> Result<HashMap<String, Value>> {
    let payload = serde_json::from_value(json!({
        "text": chunk.text,
        "source": chunk.source,
        "token_count": chunk.token_count,
        "chunk_index": idx,
    }))?;
    Ok(payload)
}

/// Rebuild a chunk from a point payload. Points without text are skipped.
fn chunk_from_payload(payload: &HashMap<String, Value>) -> Option<TextChunk> {
    let text = payload.get("text")?.as_str()?.to_string();
    let source = payload
        .get("source")
        .and_then(|v| v.as_str())
        .cloned()
        .unwrap_or_default();
    let token_count = payload
        .get("token_count")
        .and_then(|v| v.as_integer())
        .map(|v| v as usize)
        .unwrap_or_else(|| estimate_token_count(&text));

    Some(TextChunk {
        text,
        token_count,
        source,
    })
}

/// Generate a collection name from an index name
fn get_collection_name(index_name: &str) -> String {
    // Replace non-alphanumeric characters with underscores and convert to lowercase
    let name = index_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase();

    format!("rag_{}", name)
}
