//! # Shared Constants
//!
//! Defaults and file names shared by the library and the server.

/// Default directory for schema artifact cache files.
pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Default directory for the example list and vector index.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Sample rows captured per table during schema extraction.
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

/// Similar examples retrieved for each request.
pub const DEFAULT_SIMILAR_EXAMPLES: usize = 3;

/// Row cap for unbounded read statements.
pub const DEFAULT_ROW_LIMIT: usize = 200;

/// Default row cap for the `sample_rows` tool.
pub const DEFAULT_SAMPLE_TOOL_LIMIT: usize = 50;

/// Examples requested from the model when none is specified.
pub const DEFAULT_EXAMPLE_COUNT: usize = 50;

/// Tool-use cycles allowed per agent turn.
pub const DEFAULT_AGENT_ITERATIONS: usize = 3;

/// Chunk size used when hashing a data source file.
pub const FINGERPRINT_CHUNK_SIZE: usize = 4096;

/// File holding the stored example list.
pub const EXAMPLES_FILE: &str = "rag_examples.json";

/// File holding the vector index for the stored examples.
pub const INDEX_FILE: &str = "rag_embeddings.idx";
