use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use taxis_core::{
    ids, infer, infer_schema, parse_rfc3339_or_epoch, AttributeValue, Entity, Scalar,
    StorageFamily, TaxisError, TaxisResult, TimeBasedValue,
};

use crate::lookup::{AttributeMetadata, GraphMetadataManager};
use crate::repo::{DocumentRepository, GraphRepository};
use crate::tabular::TabularStore;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// Equality filters, ANDed together.
    pub filters: HashMap<String, Scalar>,
    /// Projection; empty means all fields.
    pub fields: Vec<String>,
}

/// Per-operation options. Only the read options are recognized today; the
/// remaining slots are reserved and ignored when set.
#[derive(Clone, Debug, Default)]
pub struct Options {
    pub read: Option<ReadOptions>,
    pub create: Option<CreateOptions>,
    pub update: Option<UpdateOptions>,
    pub delete: Option<DeleteOptions>,
}

#[derive(Clone, Debug, Default)]
pub struct CreateOptions {}

#[derive(Clone, Debug, Default)]
pub struct UpdateOptions {}

#[derive(Clone, Debug, Default)]
pub struct DeleteOptions {}

impl Options {
    pub fn for_read(filters: HashMap<String, Scalar>, fields: Vec<String>) -> Self {
        Self {
            read: Some(ReadOptions { filters, fields }),
            ..Self::default()
        }
    }
}

/// Outcome of processing one attribute. A failed attribute never aborts its
/// siblings; the caller inspects the map.
#[derive(Debug)]
pub struct AttributeOutcome {
    pub success: bool,
    pub data: Option<TimeBasedValue>,
    pub error: Option<TaxisError>,
}

impl AttributeOutcome {
    fn ok(data: Option<TimeBasedValue>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn failed(error: TaxisError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Family-specific persistence contract. One implementation per storage
/// family, dispatched by the processor.
#[async_trait]
pub trait AttributeResolver: Send + Sync {
    async fn create(
        &self,
        entity_id: &str,
        attribute_name: &str,
        value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>>;

    async fn read(
        &self,
        entity_id: &str,
        attribute_name: &str,
        options: &ReadOptions,
    ) -> TaxisResult<Option<TimeBasedValue>>;

    async fn update(
        &self,
        entity_id: &str,
        attribute_name: &str,
        value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>>;

    async fn delete(
        &self,
        entity_id: &str,
        attribute_name: &str,
        value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>>;
}

/// Tabular attributes: schema inference and evolution over the relational
/// store.
pub struct TabularResolver {
    store: TabularStore,
}

impl TabularResolver {
    pub fn new(store: TabularStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AttributeResolver for TabularResolver {
    async fn create(
        &self,
        entity_id: &str,
        attribute_name: &str,
        value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        let Some(AttributeValue::Table(table)) = &value.value else {
            return Err(TaxisError::invalid_shape(format!(
                "attribute {attribute_name} carries no tabular payload"
            )));
        };
        let schema = infer_schema(table);
        self.store
            .handle_tabular_data(entity_id, attribute_name, table, &schema)
            .await?;
        Ok(None)
    }

    async fn read(
        &self,
        entity_id: &str,
        attribute_name: &str,
        options: &ReadOptions,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        let table = self
            .store
            .binding(entity_id, attribute_name)
            .await?
            .ok_or_else(|| {
                TaxisError::not_found(format!(
                    "no table bound for attribute {attribute_name} of entity {entity_id}"
                ))
            })?;
        let data = self
            .store
            .get_data(&table, &options.filters, &options.fields)
            .await?;
        Ok(Some(TimeBasedValue::new("", "", data)))
    }

    async fn update(
        &self,
        entity_id: &str,
        attribute_name: &str,
        _value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        log::debug!("tabular update pending for {attribute_name} of {entity_id}");
        Ok(None)
    }

    async fn delete(
        &self,
        entity_id: &str,
        attribute_name: &str,
        _value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        log::debug!("tabular delete pending for {attribute_name} of {entity_id}");
        Ok(None)
    }
}

/// Graph attributes. Persistence lives in the graph driver; this resolver
/// only upholds the routing contract.
pub struct GraphResolver;

#[async_trait]
impl AttributeResolver for GraphResolver {
    async fn create(
        &self,
        entity_id: &str,
        attribute_name: &str,
        _value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        log::debug!("graph create routed for {attribute_name} of {entity_id}");
        Ok(None)
    }

    async fn read(
        &self,
        _entity_id: &str,
        _attribute_name: &str,
        _options: &ReadOptions,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        Ok(Some(TimeBasedValue::default()))
    }

    async fn update(
        &self,
        _entity_id: &str,
        _attribute_name: &str,
        _value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        Ok(None)
    }

    async fn delete(
        &self,
        _entity_id: &str,
        _attribute_name: &str,
        _value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        Ok(None)
    }
}

/// Map, list, and scalar attributes all land in the document backend.
pub struct DocumentResolver;

#[async_trait]
impl AttributeResolver for DocumentResolver {
    async fn create(
        &self,
        entity_id: &str,
        attribute_name: &str,
        _value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        log::debug!("document create routed for {attribute_name} of {entity_id}");
        Ok(None)
    }

    async fn read(
        &self,
        _entity_id: &str,
        _attribute_name: &str,
        _options: &ReadOptions,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        Ok(Some(TimeBasedValue::default()))
    }

    async fn update(
        &self,
        _entity_id: &str,
        _attribute_name: &str,
        _value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        Ok(None)
    }

    async fn delete(
        &self,
        _entity_id: &str,
        _attribute_name: &str,
        _value: &TimeBasedValue,
    ) -> TaxisResult<Option<TimeBasedValue>> {
        Ok(None)
    }
}

/// Orchestrates attribute persistence: infer the storage family, record the
/// lookup metadata, then dispatch to the family store. Immutable after
/// construction; per-request state stays on the stack.
pub struct AttributeProcessor {
    resolvers: HashMap<StorageFamily, Box<dyn AttributeResolver>>,
    lookup: GraphMetadataManager,
}

impl AttributeProcessor {
    pub fn new(
        store: TabularStore,
        graph: Arc<dyn GraphRepository>,
        documents: Arc<dyn DocumentRepository>,
    ) -> Self {
        let mut resolvers: HashMap<StorageFamily, Box<dyn AttributeResolver>> = HashMap::new();
        resolvers.insert(
            StorageFamily::Tabular,
            Box::new(TabularResolver::new(store)),
        );
        resolvers.insert(StorageFamily::Graph, Box::new(GraphResolver));
        resolvers.insert(StorageFamily::Map, Box::new(DocumentResolver));
        Self {
            resolvers,
            lookup: GraphMetadataManager::new(graph, documents),
        }
    }

    pub fn lookup(&self) -> &GraphMetadataManager {
        &self.lookup
    }

    /// Processes every attribute of the entity. Attributes fail
    /// independently; the returned map carries one outcome per attribute
    /// name. With several values under one name, later values overwrite
    /// earlier outcomes (known limitation for multi-value reads).
    pub async fn process(
        &self,
        entity: &Entity,
        operation: Operation,
        options: Option<&Options>,
    ) -> HashMap<String, AttributeOutcome> {
        let mut results = HashMap::new();

        for (attribute_name, values) in &entity.attributes {
            if values.is_empty() {
                results.insert(attribute_name.clone(), AttributeOutcome::ok(None));
                continue;
            }

            for value in values {
                if value.value.is_none() {
                    continue;
                }
                let outcome = self
                    .process_value(entity, attribute_name, value, operation, options)
                    .await;
                results.insert(attribute_name.clone(), outcome);
            }
        }

        results
    }

    async fn process_value(
        &self,
        entity: &Entity,
        attribute_name: &str,
        value: &TimeBasedValue,
        operation: Operation,
        options: Option<&Options>,
    ) -> AttributeOutcome {
        let Some(payload) = value.value.as_ref() else {
            return AttributeOutcome::ok(None);
        };
        let family = infer(payload);
        if family == StorageFamily::Unknown {
            return AttributeOutcome::failed(TaxisError::invalid_shape(format!(
                "attribute {attribute_name} has no recognizable storage shape"
            )));
        }

        if let Err(err) = self
            .handle_attribute_lookup(&entity.id, attribute_name, family, operation, value)
            .await
        {
            return AttributeOutcome::failed(err);
        }

        let Some(resolver) = self.resolvers.get(&family.dispatch_key()) else {
            return AttributeOutcome::failed(TaxisError::not_implemented(format!(
                "no resolver for storage family {}",
                family.as_str()
            )));
        };

        let result = match operation {
            Operation::Create => resolver.create(&entity.id, attribute_name, value).await,
            Operation::Read => {
                let defaults = ReadOptions::default();
                let read_options = options
                    .and_then(|options| options.read.as_ref())
                    .unwrap_or(&defaults);
                resolver.read(&entity.id, attribute_name, read_options).await
            }
            Operation::Update => resolver.update(&entity.id, attribute_name, value).await,
            Operation::Delete => resolver.delete(&entity.id, attribute_name, value).await,
        };

        match result {
            Ok(data) => AttributeOutcome::ok(data),
            Err(err) => AttributeOutcome::failed(err),
        }
    }

    /// First step of the pipeline: keep the lookup graph current for this
    /// attribute. The timestamp is always the attribute-level start time,
    /// not the entity-level one.
    async fn handle_attribute_lookup(
        &self,
        entity_id: &str,
        attribute_name: &str,
        family: StorageFamily,
        operation: Operation,
        value: &TimeBasedValue,
    ) -> TaxisResult<()> {
        let start_time = parse_rfc3339_or_epoch(&value.start_time);
        match operation {
            Operation::Create => {
                let metadata = self
                    .attribute_metadata(entity_id, attribute_name, family, start_time)
                    .await?;
                self.lookup.create_attribute(&metadata).await
            }
            Operation::Update => {
                let metadata = self
                    .attribute_metadata(entity_id, attribute_name, family, start_time)
                    .await?;
                self.lookup.update_attribute(&metadata).await
            }
            Operation::Delete => self.lookup.delete_attribute(entity_id, attribute_name).await,
            Operation::Read => {
                match self
                    .lookup
                    .get_attribute(entity_id, attribute_name, start_time)
                    .await
                {
                    Ok(metadata) => {
                        log::debug!(
                            "resolved attribute {attribute_name} of {entity_id} at {}",
                            metadata.storage_path
                        );
                    }
                    Err(err) => {
                        log::warn!(
                            "attribute {attribute_name} not found in lookup graph for {entity_id}: {err}"
                        );
                    }
                }
                Ok(())
            }
        }
    }

    async fn attribute_metadata(
        &self,
        entity_id: &str,
        attribute_name: &str,
        family: StorageFamily,
        start_time: chrono::DateTime<Utc>,
    ) -> TaxisResult<AttributeMetadata> {
        // Reuse the id once assigned so (entity, name) stays stable across
        // repeated writes.
        let attribute_id = match self.lookup.find_attribute_id(entity_id, attribute_name).await? {
            Some(existing) => existing,
            None => ids::attribute_id(),
        };
        Ok(AttributeMetadata {
            entity_id: entity_id.to_string(),
            attribute_id,
            attribute_name: attribute_name.to_string(),
            storage_family: family,
            storage_path: ids::storage_path(entity_id, attribute_name, family),
            created: start_time,
            updated: Utc::now(),
            end_time: None,
            schema: std::collections::BTreeMap::new(),
        })
    }
}
