//! # Example Retrieval
//!
//! Similarity retrieval over stored question/SQL examples.

pub mod generator;
pub mod index;
pub mod store;

pub use generator::ExampleGenerator;
pub use index::{normalize, FlatIpIndex};
pub use store::{ExampleStore, RagStats};
