use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use taxis_core::{StorageFamily, TaxisError, TaxisResult, TimeBasedValue};

/// Major/minor kind label carried by every node in the lookup graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetKind {
    pub major: String,
    pub minor: String,
}

/// Directed relationship between a parent entity and one of its attribute
/// nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub related_entity_id: String,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub direction: String,
}

/// Node stored in the lookup graph for one attribute. The attribute name
/// rides in a time-based value so the node carries its own validity window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeNode {
    pub id: String,
    pub kind: DatasetKind,
    pub name: TimeBasedValue,
    pub created: String,
    pub terminated: String,
    pub metadata: BTreeMap<String, JsonValue>,
    pub relationships: BTreeMap<String, Relationship>,
}

/// Graph-side header of a node: everything `GetAttribute` needs without
/// touching the document store.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeHeader {
    pub kind: DatasetKind,
    pub name: TimeBasedValue,
    pub created: String,
    pub terminated: String,
}

/// Edge query predicate. `start_time` is matched by RFC-3339 string
/// equality when present.
#[derive(Clone, Debug, Default)]
pub struct RelationshipFilter {
    pub name: Option<String>,
    pub direction: Option<String>,
    pub start_time: Option<String>,
}

impl RelationshipFilter {
    fn matches(&self, relationship: &Relationship) -> bool {
        if let Some(name) = &self.name {
            if &relationship.name != name {
                return false;
            }
        }
        if let Some(direction) = &self.direction {
            if &relationship.direction != direction {
                return false;
            }
        }
        if let Some(start_time) = &self.start_time {
            if &relationship.start_time != start_time {
                return false;
            }
        }
        true
    }
}

/// Lookup-graph backend. Production deployments implement this over a graph
/// database; the core only relies on the operations below.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    async fn read_entity(&self, id: &str) -> TaxisResult<Option<AttributeNode>>;
    async fn create_entity(&self, node: &AttributeNode) -> TaxisResult<()>;
    async fn update_relationships(
        &self,
        entity_id: &str,
        relationships: &BTreeMap<String, Relationship>,
    ) -> TaxisResult<()>;
    async fn filtered_relationships(
        &self,
        entity_id: &str,
        filter: &RelationshipFilter,
    ) -> TaxisResult<Vec<Relationship>>;
    async fn entity_header(&self, id: &str) -> TaxisResult<NodeHeader>;
}

/// Metadata record persisted per attribute in the document backend. Must
/// agree with the graph node on `attribute_id`, `storage_family`, and
/// `storage_path`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeDocument {
    pub attribute_id: String,
    pub attribute_name: String,
    pub storage_family: StorageFamily,
    pub storage_path: String,
    pub updated: String,
    #[serde(default)]
    pub schema: BTreeMap<String, JsonValue>,
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn create_document(&self, document: &AttributeDocument) -> TaxisResult<()>;
    async fn read_document(&self, attribute_id: &str) -> TaxisResult<Option<AttributeDocument>>;
}

/// In-process graph backend used by tests and local runs.
#[derive(Default)]
pub struct MemoryGraphRepository {
    nodes: Mutex<HashMap<String, AttributeNode>>,
    relationships: Mutex<HashMap<String, BTreeMap<String, Relationship>>>,
}

impl MemoryGraphRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().expect("graph node lock").len()
    }

    pub fn relationship_count(&self, entity_id: &str) -> usize {
        self.relationships
            .lock()
            .expect("graph relationship lock")
            .get(entity_id)
            .map(|edges| edges.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl GraphRepository for MemoryGraphRepository {
    async fn read_entity(&self, id: &str) -> TaxisResult<Option<AttributeNode>> {
        Ok(self.nodes.lock().expect("graph node lock").get(id).cloned())
    }

    async fn create_entity(&self, node: &AttributeNode) -> TaxisResult<()> {
        self.nodes
            .lock()
            .expect("graph node lock")
            .entry(node.id.clone())
            .or_insert_with(|| node.clone());
        Ok(())
    }

    async fn update_relationships(
        &self,
        entity_id: &str,
        relationships: &BTreeMap<String, Relationship>,
    ) -> TaxisResult<()> {
        let mut guard = self.relationships.lock().expect("graph relationship lock");
        let entry = guard.entry(entity_id.to_string()).or_default();
        for (id, relationship) in relationships {
            entry.insert(id.clone(), relationship.clone());
        }
        Ok(())
    }

    async fn filtered_relationships(
        &self,
        entity_id: &str,
        filter: &RelationshipFilter,
    ) -> TaxisResult<Vec<Relationship>> {
        let guard = self.relationships.lock().expect("graph relationship lock");
        Ok(guard
            .get(entity_id)
            .map(|edges| {
                edges
                    .values()
                    .filter(|relationship| filter.matches(relationship))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn entity_header(&self, id: &str) -> TaxisResult<NodeHeader> {
        let guard = self.nodes.lock().expect("graph node lock");
        let node = guard
            .get(id)
            .ok_or_else(|| TaxisError::not_found(format!("graph node {id} not found")))?;
        Ok(NodeHeader {
            kind: node.kind.clone(),
            name: node.name.clone(),
            created: node.created.clone(),
            terminated: node.terminated.clone(),
        })
    }
}

/// In-process document backend used by tests and local runs.
#[derive(Default)]
pub struct MemoryDocumentRepository {
    documents: Mutex<HashMap<String, AttributeDocument>>,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_count(&self) -> usize {
        self.documents.lock().expect("document lock").len()
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocumentRepository {
    async fn create_document(&self, document: &AttributeDocument) -> TaxisResult<()> {
        self.documents
            .lock()
            .expect("document lock")
            .insert(document.attribute_id.clone(), document.clone());
        Ok(())
    }

    async fn read_document(&self, attribute_id: &str) -> TaxisResult<Option<AttributeDocument>> {
        Ok(self
            .documents
            .lock()
            .expect("document lock")
            .get(attribute_id)
            .cloned())
    }
}
