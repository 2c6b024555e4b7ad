//! # Schema Artifact Cache
//!
//! Schema artifacts are stored on disk as one JSON file per artifact kind, named
//! `{logical_name}_{digest}_{kind}.json`. The digest is a SHA-256 of the data
//! source's content, so any change to the underlying data yields a new key and
//! old entries simply stop being read.
//!
//! Every save writes a temporary file in the cache directory and renames it over
//! the target, so readers never observe a half-written artifact.

use crate::{
    constants::FINGERPRINT_CHUNK_SIZE,
    errors::CacheError,
    providers::db::SourceIdentity,
    types::SampleData,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// A content hash of a data source paired with its logical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub logical_name: String,
    pub digest: String,
}

impl Fingerprint {
    /// The cache partition key, `{logical_name}_{digest}`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.logical_name, self.digest)
    }
}

fn hash_file_into(hasher: &mut Sha256, path: &Path) -> io::Result<()> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; FINGERPRINT_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(())
}

fn wal_path(path: &Path) -> PathBuf {
    let mut wal = path.as_os_str().to_os_string();
    wal.push("-wal");
    PathBuf::from(wal)
}

/// Hashes a database file, followed by its `-wal` sibling when one exists.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    hash_file_into(&mut hasher, path)?;
    let wal = wal_path(path);
    if wal.exists() {
        hash_file_into(&mut hasher, &wal)?;
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Computes the fingerprint of a data source identity.
pub async fn fingerprint(identity: &SourceIdentity) -> Result<Fingerprint, CacheError> {
    match identity {
        SourceIdentity::File { path, logical_name } => {
            let path = path.clone();
            let digest = tokio::task::spawn_blocking(move || fingerprint_file(&path))
                .await
                .map_err(io::Error::other)??;
            Ok(Fingerprint {
                logical_name: logical_name.clone(),
                digest,
            })
        }
        SourceIdentity::Opaque { id, logical_name } => Ok(Fingerprint {
            logical_name: logical_name.clone(),
            digest: format!("{:x}", Sha256::digest(id.as_bytes())),
        }),
    }
}

/// The three kinds of schema artifact stored per fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RawSchema,
    StructuredSchema,
    DataDictionary,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::RawSchema,
        ArtifactKind::StructuredSchema,
        ArtifactKind::DataDictionary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::RawSchema => "raw_schema",
            ArtifactKind::StructuredSchema => "structured_schema",
            ArtifactKind::DataDictionary => "data_dictionary",
        }
    }
}

/// One stored schema artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaArtifact {
    /// The catalog listing together with the sample rows captured alongside it.
    RawSchema {
        raw_schema: String,
        sample_data: SampleData,
    },
    StructuredSchema(Value),
    DataDictionary(String),
}

impl SchemaArtifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            SchemaArtifact::RawSchema { .. } => ArtifactKind::RawSchema,
            SchemaArtifact::StructuredSchema(_) => ArtifactKind::StructuredSchema,
            SchemaArtifact::DataDictionary(_) => ArtifactKind::DataDictionary,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            SchemaArtifact::RawSchema {
                raw_schema,
                sample_data,
            } => serde_json::json!({ "raw_schema": raw_schema, "sample_data": sample_data }),
            SchemaArtifact::StructuredSchema(value) => value.clone(),
            SchemaArtifact::DataDictionary(text) => {
                serde_json::json!({ "data_dictionary": text })
            }
        }
    }

    fn from_json(kind: ArtifactKind, value: Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct RawFile {
            raw_schema: String,
            #[serde(default)]
            sample_data: SampleData,
        }
        #[derive(Deserialize)]
        struct DictionaryFile {
            data_dictionary: String,
        }

        Ok(match kind {
            ArtifactKind::RawSchema => {
                let raw: RawFile = serde_json::from_value(value)?;
                SchemaArtifact::RawSchema {
                    raw_schema: raw.raw_schema,
                    sample_data: raw.sample_data,
                }
            }
            ArtifactKind::StructuredSchema => SchemaArtifact::StructuredSchema(value),
            ArtifactKind::DataDictionary => {
                let dict: DictionaryFile = serde_json::from_value(value)?;
                SchemaArtifact::DataDictionary(dict.data_dictionary)
            }
        })
    }
}

/// Status of one artifact file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheFileInfo {
    pub exists: bool,
    pub path: PathBuf,
    pub size: u64,
}

/// Status summary for one cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub key: String,
    /// The content digest part of the key.
    pub fingerprint: String,
    pub has_complete_cache: bool,
    pub files: BTreeMap<ArtifactKind, CacheFileInfo>,
}

/// File-backed store of schema artifacts.
#[derive(Debug, Clone)]
pub struct SchemaCache {
    cache_dir: PathBuf,
}

impl SchemaCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn path_for(&self, key: &str, kind: ArtifactKind) -> PathBuf {
        self.cache_dir.join(format!("{key}_{}.json", kind.as_str()))
    }

    /// True only when all three artifact kinds are present and loadable.
    pub async fn has(&self, key: &str) -> bool {
        for kind in ArtifactKind::ALL {
            match self.load(kind, key).await {
                Ok(Some(_)) => {}
                Ok(None) => return false,
                Err(e) => {
                    warn!(key = %key, kind = kind.as_str(), error = %e, "Unreadable cache artifact");
                    return false;
                }
            }
        }
        true
    }

    /// Writes an artifact, replacing any previous file for the same key and kind.
    pub async fn save(&self, key: &str, artifact: &SchemaArtifact) -> Result<(), CacheError> {
        let path = self.path_for(key, artifact.kind());
        let dir = self.cache_dir.clone();
        let bytes = serde_json::to_vec_pretty(&artifact.to_json())?;
        let target = path.clone();

        tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target)?;
            Ok(())
        })
        .await
        .map_err(io::Error::other)??;

        debug!(path = %path.display(), "Saved schema artifact");
        Ok(())
    }

    /// Reads an artifact. A missing file is `Ok(None)`; an unparseable one is an error.
    pub async fn load(
        &self,
        kind: ArtifactKind,
        key: &str,
    ) -> Result<Option<SchemaArtifact>, CacheError> {
        let path = self.path_for(key, kind);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_slice(&bytes)?;
        Ok(Some(SchemaArtifact::from_json(kind, value)?))
    }

    /// Deletes every artifact file for a key. Missing files are ignored.
    pub async fn clear(&self, key: &str) -> Result<(), CacheError> {
        for kind in ArtifactKind::ALL {
            match tokio::fs::remove_file(self.path_for(key, kind)).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(key = %key, "Cleared schema cache");
        Ok(())
    }

    pub async fn info(&self, fingerprint: &Fingerprint) -> CacheInfo {
        let key = fingerprint.key();
        let key = key.as_str();
        let mut files = BTreeMap::new();
        for kind in ArtifactKind::ALL {
            let path = self.path_for(key, kind);
            let (exists, size) = match tokio::fs::metadata(&path).await {
                Ok(meta) => (true, meta.len()),
                Err(_) => (false, 0),
            };
            files.insert(kind, CacheFileInfo { exists, path, size });
        }
        CacheInfo {
            key: key.to_string(),
            fingerprint: fingerprint.digest.clone(),
            has_complete_cache: self.has(key).await,
            files,
        }
    }
}
