pub mod sqlite;
pub mod storage;

pub use sqlite::SqliteSource;
pub use storage::{quote_identifier, DataSource, SourceIdentity};
