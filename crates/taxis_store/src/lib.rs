pub mod config;
mod db;
pub mod lookup;
pub mod migration;
pub mod processor;
pub mod repo;
pub mod tabular;

pub use taxis_core::*;

pub use config::{PoolConfig, TaxisConfig};
pub use lookup::{AttributeMetadata, GraphMetadataManager, IS_ATTRIBUTE, OUTGOING};
pub use processor::{
    AttributeOutcome, AttributeProcessor, AttributeResolver, CreateOptions, DeleteOptions,
    DocumentResolver, GraphResolver, Operation, Options, ReadOptions, TabularResolver,
    UpdateOptions,
};
pub use repo::{
    AttributeDocument, AttributeNode, DatasetKind, DocumentRepository, GraphRepository,
    MemoryDocumentRepository, MemoryGraphRepository, NodeHeader, Relationship, RelationshipFilter,
};
pub use tabular::{TabularPayload, TabularStore};
