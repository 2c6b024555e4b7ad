//! # Example Store
//!
//! Holds the stored examples together with a [`FlatIpIndex`] over the embeddings
//! of their question text. The example list and the index are one unit: they are
//! written together, loaded together, and always have the same length.
//!
//! Each save stamps both files with the same generation number, so a list and an
//! index left over from different saves are refused on load even when their
//! lengths agree.
//!
//! Bulk replacement (`add_all`) embeds every question before taking the write
//! lock, then swaps list and index in one step. There is no per-example update.

use crate::{
    constants::{EXAMPLES_FILE, INDEX_FILE},
    errors::IndexError,
    providers::ai::Embedder,
    rag::index::FlatIpIndex,
    types::Example,
};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const INDEX_TYPE: &str = "flat inner product (cosine similarity)";

/// Bytes of little-endian generation number ahead of the index data.
const GENERATION_LEN: usize = 8;

/// On-disk form of the example list.
#[derive(Serialize, Deserialize)]
struct ExamplesFile<'a> {
    generation: u64,
    examples: Cow<'a, [Example]>,
}

/// Statistics about the stored examples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagStats {
    pub total_examples: usize,
    pub embedding_dimension: usize,
    pub model_name: String,
    pub index_type: String,
    pub data_loaded: bool,
}

#[derive(Debug)]
struct StoreState {
    examples: Vec<Example>,
    index: FlatIpIndex,
    generation: u64,
}

#[derive(Debug)]
pub struct ExampleStore {
    data_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    state: RwLock<StoreState>,
}

impl ExampleStore {
    /// Opens the store in `data_dir`, loading any persisted examples.
    ///
    /// Neither file present yields an empty store. Exactly one present, or a
    /// length or generation mismatch between them, is reported as corruption.
    pub async fn open(
        data_dir: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, IndexError> {
        let data_dir = data_dir.into();
        let dimension = embedder.dimension();
        let examples_path = data_dir.join(EXAMPLES_FILE);
        let index_path = data_dir.join(INDEX_FILE);

        let state = match (
            tokio::fs::try_exists(&examples_path).await?,
            tokio::fs::try_exists(&index_path).await?,
        ) {
            (false, false) => {
                info!(data_dir = %data_dir.display(), "No stored examples found");
                StoreState {
                    examples: Vec::new(),
                    index: FlatIpIndex::new(dimension),
                    generation: 0,
                }
            }
            (true, true) => {
                let stored: ExamplesFile =
                    serde_json::from_slice(&tokio::fs::read(&examples_path).await?)?;
                let (index_generation, index) =
                    decode_index(&tokio::fs::read(&index_path).await?)?;
                if stored.generation != index_generation {
                    return Err(IndexError::Corrupt(format!(
                        "{EXAMPLES_FILE} is generation {} but {INDEX_FILE} is generation {index_generation}",
                        stored.generation
                    )));
                }
                let generation = stored.generation;
                let examples = stored.examples.into_owned();
                if index.len() != examples.len() {
                    return Err(IndexError::Corrupt(format!(
                        "{} examples but {} index vectors",
                        examples.len(),
                        index.len()
                    )));
                }
                if index.dimension() != dimension && !index.is_empty() {
                    return Err(IndexError::DimensionMismatch {
                        expected: dimension,
                        actual: index.dimension(),
                    });
                }
                info!(count = examples.len(), generation, "Loaded stored examples and index");
                StoreState {
                    examples,
                    index: if index.is_empty() {
                        FlatIpIndex::new(dimension)
                    } else {
                        index
                    },
                    generation,
                }
            }
            (true, false) => {
                return Err(IndexError::Corrupt(format!(
                    "{EXAMPLES_FILE} exists without {INDEX_FILE}"
                )))
            }
            (false, true) => {
                return Err(IndexError::Corrupt(format!(
                    "{INDEX_FILE} exists without {EXAMPLES_FILE}"
                )))
            }
        };

        Ok(Self {
            data_dir,
            embedder,
            state: RwLock::new(state),
        })
    }

    /// Replaces every stored example and rebuilds the index from scratch.
    pub async fn add_all(&self, examples: Vec<Example>) -> Result<(), IndexError> {
        info!(count = examples.len(), "Embedding examples");
        let questions: Vec<String> = examples
            .iter()
            .map(|e| e.natural_language_query.clone())
            .collect();
        let vectors = self.embedder.embed_batch(&questions).await?;

        let mut index = FlatIpIndex::new(self.embedder.dimension());
        for vector in vectors {
            index.add(vector)?;
        }
        if index.len() != examples.len() {
            return Err(IndexError::Corrupt(format!(
                "embedder returned {} vectors for {} examples",
                index.len(),
                examples.len()
            )));
        }

        let examples: Vec<Example> = examples
            .into_iter()
            .map(|e| Example::new(e.natural_language_query, e.sql_query))
            .collect();

        let mut state = self.state.write().await;
        let generation = state.generation + 1;
        persist(&self.data_dir, generation, &examples, &index).await?;
        *state = StoreState {
            examples,
            index,
            generation,
        };
        info!(count = state.examples.len(), "Stored examples replaced");
        Ok(())
    }

    /// Returns up to `k` stored examples closest to `query`, highest score first.
    pub async fn find_similar(&self, query: &str, k: usize) -> Result<Vec<Example>, IndexError> {
        if self.state.read().await.examples.is_empty() {
            warn!("No examples available for retrieval");
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await?;

        let state = self.state.read().await;
        let hits = state.index.search(&vector, k)?;
        let results: Vec<Example> = hits
            .into_iter()
            .filter_map(|(position, score)| {
                state.examples.get(position).map(|e| Example {
                    similarity_score: Some(score),
                    ..e.clone()
                })
            })
            .collect();
        debug!(count = results.len(), "Found similar examples");
        Ok(results)
    }

    pub async fn all(&self) -> Vec<Example> {
        self.state.read().await.examples.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.examples.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Removes every example and persists the empty pair.
    pub async fn clear(&self) -> Result<(), IndexError> {
        let mut state = self.state.write().await;
        let index = FlatIpIndex::new(self.embedder.dimension());
        let generation = state.generation + 1;
        persist(&self.data_dir, generation, &[], &index).await?;
        *state = StoreState {
            examples: Vec::new(),
            index,
            generation,
        };
        info!("Cleared all examples");
        Ok(())
    }

    pub async fn stats(&self) -> RagStats {
        let total_examples = self.len().await;
        RagStats {
            total_examples,
            embedding_dimension: self.embedder.dimension(),
            model_name: self.embedder.model_name().to_string(),
            index_type: INDEX_TYPE.to_string(),
            data_loaded: total_examples > 0,
        }
    }
}

fn decode_index(bytes: &[u8]) -> Result<(u64, FlatIpIndex), IndexError> {
    let (generation, body) = bytes
        .split_first_chunk::<GENERATION_LEN>()
        .ok_or_else(|| IndexError::Corrupt(format!("{INDEX_FILE} has no generation")))?;
    Ok((u64::from_le_bytes(*generation), FlatIpIndex::from_bytes(body)?))
}

/// Writes the example list and the index, each through a temp file and rename.
async fn persist(
    data_dir: &Path,
    generation: u64,
    examples: &[Example],
    index: &FlatIpIndex,
) -> Result<(), IndexError> {
    let dir = data_dir.to_path_buf();
    let examples_bytes = serde_json::to_vec_pretty(&ExamplesFile {
        generation,
        examples: Cow::Borrowed(examples),
    })?;
    let mut index_bytes = generation.to_le_bytes().to_vec();
    index_bytes.extend_from_slice(&index.to_bytes());

    tokio::task::spawn_blocking(move || -> Result<(), IndexError> {
        std::fs::create_dir_all(&dir)?;

        let mut examples_tmp = NamedTempFile::new_in(&dir)?;
        examples_tmp.write_all(&examples_bytes)?;
        examples_tmp.as_file().sync_all()?;

        let mut index_tmp = NamedTempFile::new_in(&dir)?;
        index_tmp.write_all(&index_bytes)?;
        index_tmp.as_file().sync_all()?;

        examples_tmp.persist(dir.join(EXAMPLES_FILE))?;
        index_tmp.persist(dir.join(INDEX_FILE))?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)??;

    debug!(data_dir = %data_dir.display(), generation, "Persisted examples and index");
    Ok(())
}
