//! Vector storage for indexed code chunks.
//!
//! [`VectorStore`] is the seam between the indexer and the similarity backend.
//! [`QdrantOps`] talks to a Qdrant server; [`InMemoryVectorStore`] keeps
//! everything in process and backs the test suites.

pub mod in_memory_store;
pub mod qdrant_ops;
pub mod vector_store;

pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantOps;
pub use vector_store::{
    CollectionSpec, DistanceMetric, FieldCondition, FieldValue, ScoredVectorPoint, VectorFilter,
    VectorPoint, VectorStore, VectorStoreError,
};
