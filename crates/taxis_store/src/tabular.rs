use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use sea_orm::sea_query::{
    Alias, ColumnDef, Expr, ExprTrait, OnConflict, Order, Query, SimpleExpr, Table,
    Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, StatementBuilder, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use taxis_core::{
    check_compatible, ids, parse_datetime, validate_rows, AttributeValue, ColumnType, FieldType,
    Scalar, TableValue, TabularSchema, TaxisError, TaxisResult,
};

use crate::config::TaxisConfig;
use crate::db::{AttributeSchemas, EntityAttributes};
use crate::migration::Migrator;

/// Columns every attribute table carries besides its user columns. They are
/// masked from default projections.
const INTERNAL_COLUMNS: [&str; 2] = ["created_at", "entity_attribute_id"];

/// Wire shape of a tabular read result before envelope wrapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabularPayload {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

/// Relational backend for tabular attributes: physical tables named
/// `attr_<32hex>`, a binding row per `(entity, attribute)`, and a versioned
/// schema document per table.
#[derive(Clone)]
pub struct TabularStore {
    conn: DatabaseConnection,
}

impl TabularStore {
    /// Opens the pool and brings the metadata tables up to date. The URL
    /// scheme is validated before any connection is attempted.
    pub async fn connect(config: &TaxisConfig) -> TaxisResult<Self> {
        log::debug!("connecting tabular store ({})", config.backend_name()?);
        let mut options = ConnectOptions::new(config.database_url.clone());
        options
            .max_connections(config.pool.max_connections)
            .acquire_timeout(Duration::from_millis(config.pool.acquire_timeout_ms));
        if let Some(idle_ms) = config.pool.idle_timeout_ms {
            options.idle_timeout(Duration::from_millis(idle_ms));
        }
        let conn = Database::connect(options).await.map_err(db_err)?;
        Migrator::up(&conn, None).await.map_err(db_err)?;
        Ok(Self { conn })
    }

    pub async fn connect_sqlite(path: &Path) -> TaxisResult<Self> {
        Self::connect(&TaxisConfig::sqlite(path)).await
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Persists one tabular write: resolve or create the binding, enforce
    /// schema compatibility, validate rows, insert. The whole write runs in
    /// a single transaction; a failure leaves nothing behind.
    pub async fn handle_tabular_data(
        &self,
        entity_id: &str,
        attribute_name: &str,
        data: &TableValue,
        new_schema: &TabularSchema,
    ) -> TaxisResult<()> {
        let tx = self.conn.begin().await.map_err(db_err)?;

        match lookup_binding(&tx, entity_id, attribute_name).await? {
            Some((binding_id, table)) => {
                let existing = latest_schema(&tx, &table).await?.ok_or_else(|| {
                    TaxisError::internal(format!("no stored schema for table {table}"))
                })?;
                check_compatible(&existing, new_schema)?;
                validate_rows(&existing, data)?;
                insert_rows(&tx, &table, binding_id, data, &existing).await?;
            }
            None => {
                let table = ids::table_name();
                if !table_exists(&tx, &table).await? {
                    create_attribute_table(&tx, &table, new_schema).await?;
                }
                store_schema(&tx, &table, 1, new_schema).await?;
                let binding_id = upsert_binding(&tx, entity_id, attribute_name, &table).await?;
                insert_rows(&tx, &table, binding_id, data, new_schema).await?;
                log::debug!(
                    "created table {table} for attribute {attribute_name} of {entity_id}"
                );
            }
        }

        tx.commit().await.map_err(db_err)
    }

    /// Resolves the physical table bound to `(entity, attribute)`.
    pub async fn binding(
        &self,
        entity_id: &str,
        attribute_name: &str,
    ) -> TaxisResult<Option<String>> {
        Ok(lookup_binding(&self.conn, entity_id, attribute_name)
            .await?
            .map(|(_, table)| table))
    }

    pub async fn table_exists(&self, table: &str) -> TaxisResult<bool> {
        table_exists(&self.conn, table).await
    }

    /// Latest stored schema for a table.
    pub async fn schema_of_table(&self, table: &str) -> TaxisResult<TabularSchema> {
        latest_schema(&self.conn, table).await?.ok_or_else(|| {
            TaxisError::not_found(format!("no schema stored for table {table}"))
        })
    }

    /// Every attribute table bound to an entity.
    pub async fn table_list(&self, entity_id: &str) -> TaxisResult<Vec<String>> {
        let select = Query::select()
            .from(EntityAttributes::Table)
            .column(EntityAttributes::TableName)
            .and_where(Expr::col(EntityAttributes::EntityId).eq(entity_id))
            .to_owned();
        let rows = query_all(&self.conn, &select).await?;
        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            tables.push(row.try_get::<String>("", "table_name").map_err(db_err)?);
        }
        Ok(tables)
    }

    /// Filtered, projected read over one attribute table. Empty `fields`
    /// select every physical column and then mask the internal ones from
    /// the projection; explicit `fields` are returned exactly as requested.
    /// The result is the double-wrapped envelope the transport layer
    /// expects: a map `{"data": "<json of {columns, rows}>"}`.
    pub async fn get_data(
        &self,
        table: &str,
        filters: &HashMap<String, Scalar>,
        fields: &[String],
    ) -> TaxisResult<AttributeValue> {
        let table = ids::sanitize_identifier(table)?;
        let schema = latest_schema(&self.conn, &table).await?.ok_or_else(|| {
            TaxisError::not_found(format!("no schema stored for table {table}"))
        })?;

        let selected: Vec<String> = if fields.is_empty() {
            physical_columns(&schema)?
        } else {
            fields
                .iter()
                .map(|field| ids::sanitize_identifier(field))
                .collect::<TaxisResult<_>>()?
        };

        let kinds: Vec<ColumnKind> = selected
            .iter()
            .map(|column| column_kind(&schema, column))
            .collect();

        let mut select = Query::select();
        select.from(Alias::new(table.as_str()));
        for column in &selected {
            select.column(Alias::new(column.as_str()));
        }
        for (key, value) in filters {
            let column = ids::sanitize_identifier(key)?;
            select.and_where(Expr::col(Alias::new(column.as_str())).eq(filter_value(value)));
        }
        let rows = query_all(&self.conn, &select).await?;

        let keep: Vec<usize> = if fields.is_empty() {
            selected
                .iter()
                .enumerate()
                .filter(|(_, name)| !INTERNAL_COLUMNS.contains(&name.as_str()))
                .map(|(index, _)| index)
                .collect()
        } else {
            (0..selected.len()).collect()
        };

        let columns: Vec<String> = keep.iter().map(|&index| selected[index].clone()).collect();
        let mut payload_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut cells = Vec::with_capacity(keep.len());
            for &index in &keep {
                cells.push(read_cell(row, &selected[index], kinds[index]));
            }
            payload_rows.push(cells);
        }

        envelope(&TabularPayload {
            columns,
            rows: payload_rows,
        })
    }
}

/// Physical column layout of an attribute table: auto id, user columns, then
/// the internal bookkeeping columns.
fn physical_columns(schema: &TabularSchema) -> TaxisResult<Vec<String>> {
    let mut columns = vec!["id".to_string()];
    for name in schema.fields.keys() {
        if name.eq_ignore_ascii_case("id") {
            continue;
        }
        columns.push(ids::sanitize_identifier(name)?);
    }
    columns.push("entity_attribute_id".to_string());
    columns.push("created_at".to_string());
    Ok(columns)
}

fn envelope(payload: &TabularPayload) -> TaxisResult<AttributeValue> {
    let json = serde_json::to_string(payload)
        .map_err(|err| TaxisError::internal(format!("serialize tabular payload: {err}")))?;
    let mut wrapper = std::collections::BTreeMap::new();
    wrapper.insert("data".to_string(), AttributeValue::str(json));
    Ok(AttributeValue::Map(wrapper))
}

async fn lookup_binding<C>(
    conn: &C,
    entity_id: &str,
    attribute_name: &str,
) -> TaxisResult<Option<(i64, String)>>
where
    C: ConnectionTrait,
{
    let select = Query::select()
        .from(EntityAttributes::Table)
        .column(EntityAttributes::Id)
        .column(EntityAttributes::TableName)
        .and_where(Expr::col(EntityAttributes::EntityId).eq(entity_id))
        .and_where(Expr::col(EntityAttributes::AttributeName).eq(attribute_name))
        .limit(1)
        .to_owned();
    let row = query_one(conn, &select).await?;
    match row {
        Some(row) => {
            let id = read_i64(&row, "id")?;
            let table: String = row.try_get("", "table_name").map_err(db_err)?;
            Ok(Some((id, table)))
        }
        None => Ok(None),
    }
}

async fn upsert_binding<C>(
    conn: &C,
    entity_id: &str,
    attribute_name: &str,
    table: &str,
) -> TaxisResult<i64>
where
    C: ConnectionTrait,
{
    let insert = Query::insert()
        .into_table(EntityAttributes::Table)
        .columns([
            EntityAttributes::EntityId,
            EntityAttributes::AttributeName,
            EntityAttributes::TableName,
        ])
        .values_panic([entity_id.into(), attribute_name.into(), table.into()])
        .on_conflict(
            OnConflict::columns([EntityAttributes::EntityId, EntityAttributes::AttributeName])
                .update_column(EntityAttributes::TableName)
                .to_owned(),
        )
        .to_owned();
    exec(conn, &insert).await?;

    let (id, _) = lookup_binding(conn, entity_id, attribute_name)
        .await?
        .ok_or_else(|| TaxisError::internal("binding upsert did not persist"))?;
    Ok(id)
}

async fn latest_schema<C>(conn: &C, table: &str) -> TaxisResult<Option<TabularSchema>>
where
    C: ConnectionTrait,
{
    let select = Query::select()
        .from(AttributeSchemas::Table)
        .column(AttributeSchemas::SchemaDefinition)
        .and_where(Expr::col(AttributeSchemas::TableName).eq(table))
        .order_by(AttributeSchemas::SchemaVersion, Order::Desc)
        .limit(1)
        .to_owned();
    let row = query_one(conn, &select).await?;
    match row {
        Some(row) => {
            let raw: String = row.try_get("", "schema_definition").map_err(db_err)?;
            let schema = serde_json::from_str(&raw)
                .map_err(|err| TaxisError::internal(format!("decode stored schema: {err}")))?;
            Ok(Some(schema))
        }
        None => Ok(None),
    }
}

async fn store_schema<C>(
    conn: &C,
    table: &str,
    version: i32,
    schema: &TabularSchema,
) -> TaxisResult<()>
where
    C: ConnectionTrait,
{
    let raw = serde_json::to_string(schema)
        .map_err(|err| TaxisError::internal(format!("encode schema: {err}")))?;
    let insert = Query::insert()
        .into_table(AttributeSchemas::Table)
        .columns([
            AttributeSchemas::TableName,
            AttributeSchemas::SchemaVersion,
            AttributeSchemas::SchemaDefinition,
        ])
        .values_panic([table.into(), version.into(), raw.into()])
        .to_owned();
    exec(conn, &insert).await
}

async fn table_exists<C>(conn: &C, table: &str) -> TaxisResult<bool>
where
    C: ConnectionTrait,
{
    let table = ids::sanitize_identifier(table)?;
    let backend = conn.get_database_backend();
    let sql = match backend {
        DatabaseBackend::Sqlite => {
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?"
        }
        DatabaseBackend::Postgres => {
            "SELECT table_name FROM information_schema.tables WHERE table_name = $1"
        }
        _ => "SELECT table_name FROM information_schema.tables WHERE table_name = ?",
    };
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(
            backend,
            sql,
            [SeaValue::from(table)],
        ))
        .await
        .map_err(db_err)?;
    Ok(row.is_some())
}

async fn create_attribute_table<C>(
    conn: &C,
    table: &str,
    schema: &TabularSchema,
) -> TaxisResult<()>
where
    C: ConnectionTrait,
{
    let mut stmt = Table::create();
    stmt.table(Alias::new(ids::sanitize_identifier(table)?))
        .if_not_exists()
        .col(
            ColumnDef::new(Alias::new("id"))
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(Alias::new("entity_attribute_id"))
                .integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(Alias::new("created_at"))
                .timestamp_with_time_zone()
                .default(Expr::current_timestamp()),
        );

    for (name, field) in &schema.fields {
        // The auto primary key owns this name.
        if name.eq_ignore_ascii_case("id") {
            continue;
        }
        let mut column = ColumnDef::new(Alias::new(ids::sanitize_identifier(name)?));
        match field.column_type {
            ColumnType::Int => column.integer(),
            ColumnType::Float => column.double(),
            ColumnType::String => column.text(),
            ColumnType::Bool => column.boolean(),
            ColumnType::Date => column.date(),
            ColumnType::DateTime => column.timestamp_with_time_zone(),
        };
        if field.nullable {
            column.null();
        } else {
            column.not_null();
        }
        stmt.col(&mut column);
    }

    exec(conn, &stmt).await
}

async fn insert_rows<C>(
    conn: &C,
    table: &str,
    binding_id: i64,
    data: &TableValue,
    schema: &TabularSchema,
) -> TaxisResult<()>
where
    C: ConnectionTrait,
{
    if data.rows.is_empty() {
        return Ok(());
    }

    let mut columns: Vec<(usize, String, FieldType)> = Vec::with_capacity(data.columns.len());
    for (index, name) in data.columns.iter().enumerate() {
        if name.eq_ignore_ascii_case("id") {
            continue;
        }
        let field = schema
            .fields
            .get(name)
            .copied()
            .unwrap_or(FieldType::nullable(ColumnType::String));
        columns.push((index, ids::sanitize_identifier(name)?, field));
    }

    let mut insert = Query::insert();
    insert.into_table(Alias::new(ids::sanitize_identifier(table)?));
    let mut idens = vec![Alias::new("entity_attribute_id")];
    idens.extend(columns.iter().map(|(_, name, _)| Alias::new(name.as_str())));
    insert.columns(idens);

    for row in &data.rows {
        let mut values: Vec<SimpleExpr> = Vec::with_capacity(columns.len() + 1);
        values.push(SeaValue::BigInt(Some(binding_id)).into());
        for (index, _, field) in &columns {
            values.push(cell_value(&row[*index], field).into());
        }
        insert.values_panic(values);
    }

    exec(conn, &insert).await
}

fn cell_value(cell: &Scalar, field: &FieldType) -> SeaValue {
    match (field.column_type, cell) {
        (ColumnType::Int, Scalar::Null) => SeaValue::BigInt(None),
        (ColumnType::Float, Scalar::Null) => SeaValue::Double(None),
        (ColumnType::Bool, Scalar::Null) => SeaValue::Bool(None),
        (ColumnType::Date | ColumnType::DateTime, Scalar::Null) => {
            SeaValue::ChronoDateTimeUtc(None)
        }
        (_, Scalar::Null) => SeaValue::String(None),
        (ColumnType::Int, Scalar::Num(n)) => SeaValue::BigInt(Some(*n as i64)),
        (ColumnType::Float, Scalar::Num(n)) => SeaValue::Double(Some(*n)),
        (ColumnType::Bool, Scalar::Bool(b)) => SeaValue::Bool(Some(*b)),
        (ColumnType::Date | ColumnType::DateTime, Scalar::Str(s)) => match parse_datetime(s) {
            Some(instant) => SeaValue::from(instant),
            None => SeaValue::from(s.clone()),
        },
        (_, cell) => SeaValue::from(cell.render()),
    }
}

fn filter_value(value: &Scalar) -> SeaValue {
    match value {
        Scalar::Null => SeaValue::String(None),
        Scalar::Bool(b) => SeaValue::Bool(Some(*b)),
        Scalar::Num(n) => {
            if *n == n.trunc() {
                SeaValue::BigInt(Some(*n as i64))
            } else {
                SeaValue::Double(Some(*n))
            }
        }
        Scalar::Str(s) => SeaValue::from(s.clone()),
    }
}

fn read_i64(row: &QueryResult, column: &str) -> TaxisResult<i64> {
    if let Ok(value) = row.try_get::<i64>("", column) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<i32>("", column) {
        return Ok(value as i64);
    }
    Err(TaxisError::storage(format!(
        "column {column} is not an integer"
    )))
}

/// Decode strategy for one selected column, derived from the stored schema
/// so driver-level coercion never misreads a cell.
#[derive(Clone, Copy, Debug)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
    Timestamp,
}

fn column_kind(schema: &TabularSchema, column: &str) -> ColumnKind {
    if column == "id" || column == "entity_attribute_id" {
        return ColumnKind::Int;
    }
    if column == "created_at" {
        return ColumnKind::Timestamp;
    }
    let field = schema.fields.iter().find_map(|(name, field)| {
        let sanitized = ids::sanitize_identifier(name).ok()?;
        (sanitized == column).then_some(*field)
    });
    match field.map(|field| field.column_type) {
        Some(ColumnType::Int) => ColumnKind::Int,
        Some(ColumnType::Float) => ColumnKind::Float,
        Some(ColumnType::Bool) => ColumnKind::Bool,
        Some(ColumnType::Date) | Some(ColumnType::DateTime) => ColumnKind::Timestamp,
        Some(ColumnType::String) | None => ColumnKind::Text,
    }
}

/// Reads one cell as loosely-typed JSON. Byte cells come back as strings;
/// anything undecodable becomes null.
fn read_cell(row: &QueryResult, column: &str, kind: ColumnKind) -> JsonValue {
    match kind {
        ColumnKind::Int => {
            if let Ok(Some(value)) = row.try_get::<Option<i64>>("", column) {
                return JsonValue::from(value);
            }
            if let Ok(Some(value)) = row.try_get::<Option<i32>>("", column) {
                return JsonValue::from(value);
            }
            JsonValue::Null
        }
        ColumnKind::Float => {
            if let Ok(Some(value)) = row.try_get::<Option<f64>>("", column) {
                return serde_json::Number::from_f64(value)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null);
            }
            if let Ok(Some(value)) = row.try_get::<Option<i64>>("", column) {
                return JsonValue::from(value);
            }
            JsonValue::Null
        }
        ColumnKind::Bool => {
            if let Ok(Some(value)) = row.try_get::<Option<bool>>("", column) {
                return JsonValue::Bool(value);
            }
            if let Ok(Some(value)) = row.try_get::<Option<i64>>("", column) {
                return JsonValue::Bool(value != 0);
            }
            JsonValue::Null
        }
        ColumnKind::Timestamp => {
            if let Ok(Some(value)) = row.try_get::<Option<String>>("", column) {
                return JsonValue::String(value);
            }
            if let Ok(Some(value)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>>("", column)
            {
                return JsonValue::String(value.to_rfc3339());
            }
            JsonValue::Null
        }
        ColumnKind::Text => {
            if let Ok(Some(value)) = row.try_get::<Option<String>>("", column) {
                return JsonValue::String(value);
            }
            if let Ok(Some(value)) = row.try_get::<Option<Vec<u8>>>("", column) {
                return JsonValue::String(String::from_utf8_lossy(&value).into_owned());
            }
            JsonValue::Null
        }
    }
}

// Statements render through the connection's own backend; query and schema
// statements go through the same path.
async fn exec<C, S>(conn: &C, stmt: &S) -> TaxisResult<()>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let statement = conn.get_database_backend().build(stmt);
    conn.execute_raw(statement).await.map_err(db_err)?;
    Ok(())
}

async fn query_all<C, S>(conn: &C, stmt: &S) -> TaxisResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let statement = conn.get_database_backend().build(stmt);
    conn.query_all_raw(statement).await.map_err(db_err)
}

async fn query_one<C, S>(conn: &C, stmt: &S) -> TaxisResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let statement = conn.get_database_backend().build(stmt);
    conn.query_one_raw(statement).await.map_err(db_err)
}

pub(crate) fn db_err(err: sea_orm::DbErr) -> TaxisError {
    TaxisError::storage(err.to_string())
}
