//! # Schema Grounding
//!
//! Extraction, caching, and model-assisted enrichment of a data source's schema.

pub mod cache;
pub mod extractor;
pub mod pipeline;

pub use cache::{
    fingerprint, ArtifactKind, CacheFileInfo, CacheInfo, Fingerprint, SchemaArtifact, SchemaCache,
};
pub use extractor::SchemaExtractor;
pub use pipeline::{PipelineStage, SchemaPipeline};
