use std::collections::HashMap;
use std::sync::Arc;

use taxis_store::{
    parse_rfc3339_or_epoch, AttributeProcessor, AttributeValue, Entity, MemoryDocumentRepository,
    MemoryGraphRepository, Operation, Options, Scalar, StorageFamily, TableValue, TabularPayload,
    TabularStore, TaxisError, TaxisResult, TimeBasedValue,
};
use tempfile::tempdir;

const T0: &str = "2024-01-01T00:00:00Z";

fn table_value(columns: &[&str], rows: Vec<Vec<Scalar>>) -> AttributeValue {
    AttributeValue::Table(TableValue {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    })
}

fn decode_payload(value: &AttributeValue) -> TabularPayload {
    let AttributeValue::Map(map) = value else {
        panic!("expected envelope map, got {value:?}");
    };
    let AttributeValue::Scalar(Scalar::Str(json)) = &map["data"] else {
        panic!("expected data json string");
    };
    serde_json::from_str(json).expect("payload json")
}

async fn processor(
    dir: &std::path::Path,
) -> TaxisResult<(AttributeProcessor, Arc<MemoryGraphRepository>)> {
    let store = TabularStore::connect_sqlite(&dir.join("taxis.sqlite")).await?;
    let graph = Arc::new(MemoryGraphRepository::new());
    let documents = Arc::new(MemoryDocumentRepository::new());
    Ok((
        AttributeProcessor::new(store, graph.clone(), documents),
        graph,
    ))
}

#[tokio::test]
async fn one_bad_attribute_does_not_abort_siblings() -> TaxisResult<()> {
    let dir = tempdir().expect("tempdir");
    let (processor, _) = processor(dir.path()).await?;

    let entity = Entity::new("e1")
        .with_attribute(
            "good",
            vec![TimeBasedValue::new(
                T0,
                "",
                table_value(&["a"], vec![vec![Scalar::Num(1.0)], vec![Scalar::Num(2.0)]]),
            )],
        )
        .with_attribute(
            "bad",
            vec![TimeBasedValue::new(
                T0,
                "",
                // Ragged rows have no recognizable storage shape.
                table_value(&["a", "b"], vec![vec![Scalar::Num(1.0)]]),
            )],
        );

    let results = processor.process(&entity, Operation::Create, None).await;
    assert_eq!(results.len(), 2);
    assert!(results["good"].success);
    let bad = &results["bad"];
    assert!(!bad.success);
    assert!(
        matches!(bad.error, Some(TaxisError::InvalidShape { .. })),
        "{:?}",
        bad.error
    );
    Ok(())
}

#[tokio::test]
async fn empty_value_list_is_a_successful_noop() -> TaxisResult<()> {
    let dir = tempdir().expect("tempdir");
    let (processor, _) = processor(dir.path()).await?;

    let entity = Entity::new("e1").with_attribute("empty", vec![]);
    let results = processor.process(&entity, Operation::Create, None).await;
    let outcome = &results["empty"];
    assert!(outcome.success);
    assert!(outcome.data.is_none());
    assert!(outcome.error.is_none());
    Ok(())
}

#[tokio::test]
async fn create_records_lookup_metadata() -> TaxisResult<()> {
    let dir = tempdir().expect("tempdir");
    let (processor, _) = processor(dir.path()).await?;

    let entity = Entity::new("e1").with_attribute(
        "sales",
        vec![TimeBasedValue::new(
            T0,
            "",
            table_value(&["a"], vec![vec![Scalar::Num(1.0)]]),
        )],
    );
    let results = processor.process(&entity, Operation::Create, None).await;
    assert!(results["sales"].success);

    let metadata = processor
        .lookup()
        .get_attribute("e1", "sales", parse_rfc3339_or_epoch(T0))
        .await?;
    assert_eq!(metadata.storage_family, StorageFamily::Tabular);
    assert_eq!(metadata.storage_path, "tables/attr_e1_sales");
    Ok(())
}

#[tokio::test]
async fn repeated_create_keeps_one_node_per_attribute() -> TaxisResult<()> {
    let dir = tempdir().expect("tempdir");
    let (processor, graph) = processor(dir.path()).await?;

    let entity = Entity::new("e1").with_attribute(
        "sales",
        vec![TimeBasedValue::new(
            T0,
            "",
            table_value(&["a"], vec![vec![Scalar::Num(1.0)]]),
        )],
    );
    let first = processor.process(&entity, Operation::Create, None).await;
    assert!(first["sales"].success);
    let second = processor.process(&entity, Operation::Create, None).await;
    assert!(second["sales"].success);

    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.relationship_count("e1"), 1);
    Ok(())
}

#[tokio::test]
async fn read_applies_filters_and_projection() -> TaxisResult<()> {
    let dir = tempdir().expect("tempdir");
    let (processor, _) = processor(dir.path()).await?;

    let value = TimeBasedValue::new(
        T0,
        "",
        table_value(
            &["name"],
            vec![
                vec![Scalar::Str("alpha".into())],
                vec![Scalar::Str("beta".into())],
                vec![Scalar::Str("gamma".into())],
            ],
        ),
    );
    let entity = Entity::new("e1").with_attribute("people", vec![value]);
    let created = processor.process(&entity, Operation::Create, None).await;
    assert!(created["people"].success);

    let mut filters = HashMap::new();
    filters.insert("id".to_string(), Scalar::Num(2.0));
    let options = Options::for_read(filters, vec!["name".to_string()]);
    let results = processor
        .process(&entity, Operation::Read, Some(&options))
        .await;

    let outcome = &results["people"];
    assert!(outcome.success);
    let data = outcome.data.as_ref().expect("read data");
    let payload = decode_payload(data.value.as_ref().expect("envelope"));
    assert_eq!(payload.columns, vec!["name"]);
    assert_eq!(payload.rows, vec![vec![serde_json::json!("beta")]]);
    Ok(())
}

#[tokio::test]
async fn scalar_attribute_routes_to_document_family() -> TaxisResult<()> {
    let dir = tempdir().expect("tempdir");
    let (processor, _) = processor(dir.path()).await?;

    let entity = Entity::new("e1").with_attribute(
        "note",
        vec![TimeBasedValue::new(T0, "", AttributeValue::str("hello"))],
    );
    let results = processor.process(&entity, Operation::Create, None).await;
    assert!(results["note"].success);

    let metadata = processor
        .lookup()
        .get_attribute("e1", "note", parse_rfc3339_or_epoch(T0))
        .await?;
    assert_eq!(metadata.storage_family, StorageFamily::Scalar);
    assert_eq!(metadata.storage_path, "documents/attr_e1_note");
    Ok(())
}

#[tokio::test]
async fn update_and_delete_propagate_stub_success() -> TaxisResult<()> {
    let dir = tempdir().expect("tempdir");
    let (processor, _) = processor(dir.path()).await?;

    let entity = Entity::new("e1").with_attribute(
        "sales",
        vec![TimeBasedValue::new(
            T0,
            "",
            table_value(&["a"], vec![vec![Scalar::Num(1.0)]]),
        )],
    );
    let created = processor.process(&entity, Operation::Create, None).await;
    assert!(created["sales"].success);

    let updated = processor.process(&entity, Operation::Update, None).await;
    assert!(updated["sales"].success);

    let deleted = processor.process(&entity, Operation::Delete, None).await;
    assert!(deleted["sales"].success);
    Ok(())
}
