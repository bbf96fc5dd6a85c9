use std::collections::BTreeMap;
use std::sync::Arc;

use taxis_store::{
    ids, parse_rfc3339_or_epoch, AttributeMetadata, AttributeNode, DatasetKind,
    GraphMetadataManager, MemoryDocumentRepository, MemoryGraphRepository, Relationship,
    StorageFamily, TaxisError, TaxisResult, TimeBasedValue, AttributeValue, GraphRepository,
    IS_ATTRIBUTE, OUTGOING,
};

fn manager() -> (
    GraphMetadataManager,
    Arc<MemoryGraphRepository>,
    Arc<MemoryDocumentRepository>,
) {
    let graph = Arc::new(MemoryGraphRepository::new());
    let documents = Arc::new(MemoryDocumentRepository::new());
    let manager = GraphMetadataManager::new(graph.clone(), documents.clone());
    (manager, graph, documents)
}

fn metadata(entity_id: &str, name: &str, start_time: &str) -> AttributeMetadata {
    AttributeMetadata {
        entity_id: entity_id.to_string(),
        attribute_id: ids::attribute_id(),
        attribute_name: name.to_string(),
        storage_family: StorageFamily::Tabular,
        storage_path: ids::storage_path(entity_id, name, StorageFamily::Tabular),
        created: parse_rfc3339_or_epoch(start_time),
        updated: parse_rfc3339_or_epoch(start_time),
        end_time: None,
        schema: BTreeMap::new(),
    }
}

#[tokio::test]
async fn attribute_lookup_round_trip() -> TaxisResult<()> {
    let (manager, _, _) = manager();
    let input = metadata("e1", "sales", "2024-01-01T00:00:00Z");
    manager.create_attribute(&input).await?;

    let found = manager
        .get_attribute("e1", "sales", parse_rfc3339_or_epoch("2024-01-01T00:00:00Z"))
        .await?;
    assert_eq!(found.entity_id, "e1");
    assert_eq!(found.attribute_name, "sales");
    assert_eq!(found.attribute_id, input.attribute_id);
    assert_eq!(found.storage_family, StorageFamily::Tabular);
    assert_eq!(found.storage_path, "tables/attr_e1_sales");
    assert_eq!(found.created, input.created);
    Ok(())
}

#[tokio::test]
async fn create_attribute_is_idempotent() -> TaxisResult<()> {
    let (manager, graph, documents) = manager();
    let input = metadata("e1", "sales", "2024-01-01T00:00:00Z");

    manager.create_attribute(&input).await?;
    manager.create_attribute(&input).await?;

    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.relationship_count("e1"), 1);
    assert_eq!(documents.document_count(), 1);
    Ok(())
}

#[tokio::test]
async fn list_attributes_returns_every_attribute() -> TaxisResult<()> {
    let (manager, _, _) = manager();
    manager
        .create_attribute(&metadata("e1", "sales", "2024-01-01T00:00:00Z"))
        .await?;
    manager
        .create_attribute(&metadata("e1", "staff", "2024-02-01T00:00:00Z"))
        .await?;

    let mut names: Vec<String> = manager
        .list_attributes("e1")
        .await?
        .into_iter()
        .map(|attribute| attribute.attribute_name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["sales", "staff"]);
    Ok(())
}

#[tokio::test]
async fn lookup_failures_are_not_found() -> TaxisResult<()> {
    let (manager, _, _) = manager();
    let at = parse_rfc3339_or_epoch("2024-01-01T00:00:00Z");

    let err = manager.get_attribute("e1", "sales", at).await.unwrap_err();
    assert!(matches!(err, TaxisError::NotFound { .. }), "{err}");

    manager
        .create_attribute(&metadata("e1", "sales", "2024-01-01T00:00:00Z"))
        .await?;
    let err = manager.get_attribute("e1", "other", at).await.unwrap_err();
    assert!(matches!(err, TaxisError::NotFound { .. }), "{err}");

    // Same name, different start time: the edge filter is string equality.
    let err = manager
        .get_attribute("e1", "sales", parse_rfc3339_or_epoch("2025-01-01T00:00:00Z"))
        .await
        .unwrap_err();
    assert!(matches!(err, TaxisError::NotFound { .. }), "{err}");
    Ok(())
}

#[tokio::test]
async fn graph_node_without_document_is_a_hard_error() -> TaxisResult<()> {
    let (manager, graph, _) = manager();
    manager
        .create_attribute(&metadata("e1", "sales", "2024-01-01T00:00:00Z"))
        .await?;

    // Wedge an orphan node into the graph behind the manager's back.
    let orphan_id = ids::attribute_id();
    graph
        .create_entity(&AttributeNode {
            id: orphan_id.clone(),
            kind: DatasetKind {
                major: "Dataset".to_string(),
                minor: "Tabular".to_string(),
            },
            name: TimeBasedValue::new(
                "2024-01-01T00:00:00Z",
                "",
                AttributeValue::str("orphan"),
            ),
            created: "2024-01-01T00:00:00Z".to_string(),
            terminated: String::new(),
            metadata: BTreeMap::new(),
            relationships: BTreeMap::new(),
        })
        .await?;
    let mut relationships = BTreeMap::new();
    let relationship_id = ids::relationship_id();
    relationships.insert(
        relationship_id.clone(),
        Relationship {
            id: relationship_id,
            related_entity_id: orphan_id,
            name: IS_ATTRIBUTE.to_string(),
            start_time: "2024-01-01T00:00:00Z".to_string(),
            end_time: String::new(),
            direction: OUTGOING.to_string(),
        },
    );
    graph.update_relationships("e1", &relationships).await?;

    let err = manager.list_attributes("e1").await.unwrap_err();
    assert!(matches!(err, TaxisError::NotFound { .. }), "{err}");
    Ok(())
}
