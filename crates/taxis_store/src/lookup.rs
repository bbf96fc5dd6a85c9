use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use taxis_core::{
    format_rfc3339, ids, parse_rfc3339_or_epoch, AttributeValue, Scalar, StorageFamily,
    TaxisError, TaxisResult, TimeBasedValue, DATASET_MAJOR,
};

use crate::repo::{
    AttributeDocument, AttributeNode, DatasetKind, DocumentRepository, GraphRepository,
    Relationship, RelationshipFilter,
};

/// Relationship type connecting an entity to one of its attribute nodes.
pub const IS_ATTRIBUTE: &str = "IS_ATTRIBUTE";

/// The attribute node hangs off the parent entity, so the edge points
/// outward from the entity.
pub const OUTGOING: &str = "OUTGOING";

/// Flat, in-memory view of one attribute's lookup metadata. The graph node
/// and the metadata document must agree on `attribute_id`, `storage_family`,
/// and `storage_path`.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeMetadata {
    pub entity_id: String,
    pub attribute_id: String,
    pub attribute_name: String,
    pub storage_family: StorageFamily,
    pub storage_path: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub schema: BTreeMap<String, JsonValue>,
}

/// Keeps the lookup graph and the per-attribute metadata documents in step.
pub struct GraphMetadataManager {
    graph: Arc<dyn GraphRepository>,
    documents: Arc<dyn DocumentRepository>,
}

impl GraphMetadataManager {
    pub fn new(graph: Arc<dyn GraphRepository>, documents: Arc<dyn DocumentRepository>) -> Self {
        Self { graph, documents }
    }

    /// Creates the attribute node, its `IS_ATTRIBUTE` edge, and the metadata
    /// document. Each of the three writes is skipped when its target already
    /// exists, so replaying the same metadata leaves exactly one of each.
    pub async fn create_attribute(&self, metadata: &AttributeMetadata) -> TaxisResult<()> {
        let node_exists = self.graph.read_entity(&metadata.attribute_id).await?.is_some();
        if !node_exists {
            self.graph.create_entity(&attribute_node(metadata)).await?;
            log::debug!(
                "created attribute node {} for entity {}",
                metadata.attribute_id,
                metadata.entity_id
            );
        }

        self.ensure_edge(metadata).await?;

        let document_exists = self
            .documents
            .read_document(&metadata.attribute_id)
            .await?
            .is_some();
        if !document_exists {
            self.documents
                .create_document(&attribute_document(metadata))
                .await?;
        }

        Ok(())
    }

    async fn ensure_edge(&self, metadata: &AttributeMetadata) -> TaxisResult<()> {
        let existing = self
            .graph
            .filtered_relationships(
                &metadata.entity_id,
                &RelationshipFilter {
                    name: Some(IS_ATTRIBUTE.to_string()),
                    direction: Some(OUTGOING.to_string()),
                    start_time: None,
                },
            )
            .await?;
        if existing
            .iter()
            .any(|edge| edge.related_entity_id == metadata.attribute_id)
        {
            return Ok(());
        }

        let relationship = is_attribute_edge(metadata);
        let mut relationships = BTreeMap::new();
        relationships.insert(relationship.id.clone(), relationship);
        self.graph
            .update_relationships(&metadata.entity_id, &relationships)
            .await
    }

    /// Resolves `(entity, attribute_name)` at `start_time` to the attribute
    /// metadata. Matching on `start_time` is RFC-3339 string equality; the
    /// name match is a linear scan over the entity's edges, which stay few
    /// per entity.
    pub async fn get_attribute(
        &self,
        entity_id: &str,
        attribute_name: &str,
        start_time: DateTime<Utc>,
    ) -> TaxisResult<AttributeMetadata> {
        let edges = self
            .graph
            .filtered_relationships(
                entity_id,
                &RelationshipFilter {
                    name: Some(IS_ATTRIBUTE.to_string()),
                    direction: Some(OUTGOING.to_string()),
                    start_time: Some(format_rfc3339(start_time)),
                },
            )
            .await?;
        if edges.is_empty() {
            return Err(TaxisError::not_found(format!(
                "no attributes found for entity {entity_id}"
            )));
        }

        let mut target: Option<(String, String)> = None;
        for edge in &edges {
            let header = match self.graph.entity_header(&edge.related_entity_id).await {
                Ok(header) => header,
                Err(err) => {
                    log::warn!(
                        "skipping attribute node {}: {err}",
                        edge.related_entity_id
                    );
                    continue;
                }
            };
            if node_name(&header.name) == attribute_name {
                target = Some((edge.related_entity_id.clone(), header.created));
                break;
            }
        }
        let (attribute_id, created) = target.ok_or_else(|| {
            TaxisError::not_found(format!(
                "attribute '{attribute_name}' not found for entity {entity_id}"
            ))
        })?;

        let document = self.require_document(&attribute_id, entity_id).await?;
        Ok(merge_metadata(
            entity_id,
            attribute_name,
            &attribute_id,
            &created,
            document,
        ))
    }

    /// Returns metadata for every attribute of an entity. A graph node
    /// without a matching document is a hard error: the two stores are out
    /// of step and the caller has to know.
    pub async fn list_attributes(&self, entity_id: &str) -> TaxisResult<Vec<AttributeMetadata>> {
        let edges = self
            .graph
            .filtered_relationships(
                entity_id,
                &RelationshipFilter {
                    name: Some(IS_ATTRIBUTE.to_string()),
                    direction: Some(OUTGOING.to_string()),
                    start_time: None,
                },
            )
            .await?;

        let mut attributes = Vec::with_capacity(edges.len());
        for edge in &edges {
            let header = self.graph.entity_header(&edge.related_entity_id).await?;
            let name = node_name(&header.name);
            let document = self
                .require_document(&edge.related_entity_id, entity_id)
                .await?;
            attributes.push(merge_metadata(
                entity_id,
                &name,
                &edge.related_entity_id,
                &header.created,
                document,
            ));
        }
        Ok(attributes)
    }

    /// Finds the stable attribute id for `(entity, name)` when one was
    /// already assigned.
    pub async fn find_attribute_id(
        &self,
        entity_id: &str,
        attribute_name: &str,
    ) -> TaxisResult<Option<String>> {
        let edges = self
            .graph
            .filtered_relationships(
                entity_id,
                &RelationshipFilter {
                    name: Some(IS_ATTRIBUTE.to_string()),
                    direction: Some(OUTGOING.to_string()),
                    start_time: None,
                },
            )
            .await?;
        for edge in &edges {
            let Ok(header) = self.graph.entity_header(&edge.related_entity_id).await else {
                continue;
            };
            if node_name(&header.name) == attribute_name {
                return Ok(Some(edge.related_entity_id.clone()));
            }
        }
        Ok(None)
    }

    /// Metadata rewrite on update is not supported yet; the stored document
    /// stays as written. Succeeds so the processor can continue with the
    /// family store.
    pub async fn update_attribute(&self, metadata: &AttributeMetadata) -> TaxisResult<()> {
        log::debug!(
            "update_attribute noop: entity={} attribute={}",
            metadata.entity_id,
            metadata.attribute_name
        );
        Ok(())
    }

    /// Node and edge removal is not supported yet.
    pub async fn delete_attribute(
        &self,
        entity_id: &str,
        attribute_name: &str,
    ) -> TaxisResult<()> {
        log::debug!("delete_attribute noop: entity={entity_id} attribute={attribute_name}");
        Ok(())
    }

    async fn require_document(
        &self,
        attribute_id: &str,
        entity_id: &str,
    ) -> TaxisResult<AttributeDocument> {
        self.documents
            .read_document(attribute_id)
            .await?
            .ok_or_else(|| {
                TaxisError::not_found(format!(
                    "metadata document for attribute {attribute_id} (entity {entity_id}) is missing"
                ))
            })
    }
}

fn node_name(name: &TimeBasedValue) -> String {
    match &name.value {
        Some(AttributeValue::Scalar(Scalar::Str(value))) => value.clone(),
        _ => String::new(),
    }
}

fn attribute_node(metadata: &AttributeMetadata) -> AttributeNode {
    let created = format_rfc3339(metadata.created);
    let mut node_metadata = BTreeMap::new();
    node_metadata.insert(
        "attribute_id".to_string(),
        JsonValue::String(metadata.attribute_id.clone()),
    );
    node_metadata.insert(
        "storage_path".to_string(),
        JsonValue::String(metadata.storage_path.clone()),
    );
    node_metadata.insert(
        "storage_family".to_string(),
        JsonValue::String(metadata.storage_family.as_str().to_string()),
    );
    node_metadata.insert(
        "updated".to_string(),
        JsonValue::String(format_rfc3339(metadata.updated)),
    );
    if !metadata.schema.is_empty() {
        node_metadata.insert(
            "schema".to_string(),
            JsonValue::Object(metadata.schema.clone().into_iter().collect()),
        );
    }

    AttributeNode {
        id: metadata.attribute_id.clone(),
        kind: DatasetKind {
            major: DATASET_MAJOR.to_string(),
            minor: metadata.storage_family.dataset_minor().to_string(),
        },
        name: TimeBasedValue::new(
            created.clone(),
            "",
            AttributeValue::str(metadata.attribute_name.clone()),
        ),
        created,
        terminated: String::new(),
        metadata: node_metadata,
        relationships: BTreeMap::new(),
    }
}

fn is_attribute_edge(metadata: &AttributeMetadata) -> Relationship {
    Relationship {
        id: ids::relationship_id(),
        related_entity_id: metadata.attribute_id.clone(),
        name: IS_ATTRIBUTE.to_string(),
        start_time: format_rfc3339(metadata.created),
        end_time: String::new(),
        direction: OUTGOING.to_string(),
    }
}

fn attribute_document(metadata: &AttributeMetadata) -> AttributeDocument {
    AttributeDocument {
        attribute_id: metadata.attribute_id.clone(),
        attribute_name: metadata.attribute_name.clone(),
        storage_family: metadata.storage_family,
        storage_path: metadata.storage_path.clone(),
        updated: format_rfc3339(metadata.updated),
        schema: metadata.schema.clone(),
    }
}

fn merge_metadata(
    entity_id: &str,
    attribute_name: &str,
    attribute_id: &str,
    created: &str,
    document: AttributeDocument,
) -> AttributeMetadata {
    AttributeMetadata {
        entity_id: entity_id.to_string(),
        attribute_id: attribute_id.to_string(),
        attribute_name: attribute_name.to_string(),
        storage_family: document.storage_family,
        storage_path: document.storage_path,
        created: parse_rfc3339_or_epoch(created),
        updated: parse_rfc3339_or_epoch(&document.updated),
        end_time: None,
        schema: document.schema,
    }
}
