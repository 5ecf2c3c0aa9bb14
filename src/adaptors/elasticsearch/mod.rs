// file: src/adaptors/elasticsearch/mod.rs
// description: elasticsearch storage for documents, elements and chunks
// reference: internal module structure

pub mod adaptor;
pub mod client;
pub mod mapping;
pub mod migration;
pub mod query;

pub use adaptor::ElasticsearchAdaptor;
pub use client::ElasticsearchClient;
pub use migration::{ChunkIdCounts, ChunkIdMigration, MigrationOptions, MigrationReport};
