use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TaxisError, TaxisResult};
use crate::family::StorageFamily;
use crate::value::{Scalar, TableValue};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ColumnType {
    Int,
    Float,
    String,
    Bool,
    Date,
    DateTime,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FieldType {
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl FieldType {
    pub fn required(column_type: ColumnType) -> Self {
        Self {
            column_type,
            nullable: false,
        }
    }

    pub fn nullable(column_type: ColumnType) -> Self {
        Self {
            column_type,
            nullable: true,
        }
    }
}

/// Relational schema inferred from a (columns, rows) value and stored as a
/// versioned JSON document alongside the physical table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabularSchema {
    pub storage_family: StorageFamily,
    pub fields: BTreeMap<String, FieldType>,
}

impl TabularSchema {
    pub fn new(fields: BTreeMap<String, FieldType>) -> Self {
        Self {
            storage_family: StorageFamily::Tabular,
            fields,
        }
    }
}

const DATE_ONLY_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
const EXTRA_DATETIME_FORMATS: [&str; 1] = ["%Y-%m-%d %H:%M:%S"];
const DAY_FIRST_FORMAT: &str = "%d/%m/%Y";

/// Accepts RFC-3339 plus the handful of spreadsheet-style formats seen in
/// ingested exports. Bare dates land at midnight UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in EXTRA_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }
    for format in DATE_ONLY_FORMATS
        .iter()
        .chain(std::iter::once(&DAY_FIRST_FORMAT))
    {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&parsed.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

pub fn is_datetime(value: &str) -> bool {
    parse_datetime(value).is_some()
}

/// Per-column inference state. Each cell contributes one base state and the
/// column's final type is the join of all contributions, so scanning rows in
/// any order produces the same schema. `Mixed` is the absorbing top: once a
/// column holds mixed or free-form text nothing can take it out of nullable
/// text.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Inferred {
    Unseen,
    Int,
    Float,
    Bool,
    DateTime,
    Mixed,
}

impl Inferred {
    fn of_cell(cell: &Scalar) -> Inferred {
        match cell {
            Scalar::Num(n) => {
                if *n == n.trunc() {
                    Inferred::Int
                } else {
                    Inferred::Float
                }
            }
            Scalar::Bool(_) => Inferred::Bool,
            Scalar::Str(s) => {
                if is_datetime(s) {
                    Inferred::DateTime
                } else {
                    Inferred::Mixed
                }
            }
            Scalar::Null => Inferred::Mixed,
        }
    }

    fn join(self, other: Inferred) -> Inferred {
        use Inferred::*;
        match (self, other) {
            (Unseen, state) | (state, Unseen) => state,
            (Mixed, _) | (_, Mixed) => Mixed,
            (a, b) if a == b => a,
            (Int, Float) | (Float, Int) => Float,
            _ => Mixed,
        }
    }

    fn field_type(self) -> FieldType {
        match self {
            Inferred::Int => FieldType::required(ColumnType::Int),
            Inferred::Float => FieldType::required(ColumnType::Float),
            Inferred::Bool => FieldType::required(ColumnType::Bool),
            Inferred::DateTime => FieldType::required(ColumnType::DateTime),
            Inferred::Unseen => FieldType::required(ColumnType::String),
            Inferred::Mixed => FieldType::nullable(ColumnType::String),
        }
    }
}

/// Infers a relational schema from tabular data. A table with no rows yields
/// a schema with no fields.
pub fn infer_schema(table: &TableValue) -> TabularSchema {
    if table.rows.is_empty() {
        return TabularSchema::new(BTreeMap::new());
    }

    let mut states = vec![Inferred::Unseen; table.columns.len()];
    for row in &table.rows {
        for (index, cell) in row.iter().enumerate() {
            if index < states.len() {
                states[index] = states[index].join(Inferred::of_cell(cell));
            }
        }
    }

    let fields = table
        .columns
        .iter()
        .zip(states)
        .map(|(name, state)| (name.clone(), state.field_type()))
        .collect();
    TabularSchema::new(fields)
}

fn promotion_allowed(existing: ColumnType, incoming: ColumnType) -> bool {
    if existing == incoming {
        return true;
    }
    // Int widens to Float; every type widens to text.
    if incoming == ColumnType::String {
        return true;
    }
    matches!((existing, incoming), (ColumnType::Int, ColumnType::Float))
}

/// Schema-evolution gate. Rules are evaluated in order and the first failure
/// decides. Extra fields in `incoming` are currently accepted without a
/// check.
pub fn check_compatible(existing: &TabularSchema, incoming: &TabularSchema) -> TaxisResult<()> {
    if existing.storage_family != incoming.storage_family {
        return Err(TaxisError::incompatible(
            "*",
            format!(
                "storage family mismatch: existing={}, incoming={}",
                existing.storage_family.as_str(),
                incoming.storage_family.as_str()
            ),
        ));
    }

    for (name, existing_field) in &existing.fields {
        let incoming_field = incoming
            .fields
            .get(name)
            .ok_or_else(|| TaxisError::incompatible(name.clone(), "missing in incoming schema"))?;

        if !promotion_allowed(existing_field.column_type, incoming_field.column_type) {
            return Err(TaxisError::incompatible(
                name.clone(),
                format!(
                    "type change {:?} -> {:?} is not a supported promotion",
                    existing_field.column_type, incoming_field.column_type
                ),
            ));
        }

        if !existing_field.nullable && incoming_field.nullable {
            return Err(TaxisError::incompatible(
                name.clone(),
                "cannot change NOT NULL to NULL",
            ));
        }
    }

    Ok(())
}

fn cell_matches(field: &FieldType, cell: &Scalar) -> bool {
    if matches!(cell, Scalar::Null) {
        return field.nullable;
    }
    match field.column_type {
        ColumnType::Int => cell.is_integral(),
        ColumnType::Float => matches!(cell, Scalar::Num(_)),
        ColumnType::Bool => matches!(cell, Scalar::Bool(_)),
        ColumnType::Date | ColumnType::DateTime => {
            matches!(cell, Scalar::Str(s) if is_datetime(s))
        }
        ColumnType::String => matches!(cell, Scalar::Str(_)),
    }
}

/// Validates every cell against the stored schema. The first violation
/// aborts the whole batch; a write is all-or-nothing.
pub fn validate_rows(schema: &TabularSchema, table: &TableValue) -> TaxisResult<()> {
    for column in &table.columns {
        if !schema.fields.contains_key(column) {
            return Err(TaxisError::validation(format!(
                "column {column} not found in schema"
            )));
        }
    }

    for (row_index, row) in table.rows.iter().enumerate() {
        for (cell_index, cell) in row.iter().enumerate() {
            let column = &table.columns[cell_index];
            let field = &schema.fields[column];
            if !cell_matches(field, cell) {
                return Err(TaxisError::validation(format!(
                    "row {row_index}, column {column}: expected {:?}, got {:?}",
                    field.column_type, cell
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: Vec<Vec<Scalar>>) -> TableValue {
        TableValue {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    fn field(schema: &TabularSchema, name: &str) -> FieldType {
        schema.fields[name]
    }

    #[test]
    fn pure_int_columns() {
        let schema = infer_schema(&table(
            &["a", "b"],
            vec![
                vec![Scalar::Num(1.0), Scalar::Num(2.0)],
                vec![Scalar::Num(3.0), Scalar::Num(4.0)],
            ],
        ));
        assert_eq!(field(&schema, "a"), FieldType::required(ColumnType::Int));
        assert_eq!(field(&schema, "b"), FieldType::required(ColumnType::Int));
    }

    #[test]
    fn int_promotes_to_float() {
        let schema = infer_schema(&table(
            &["a", "b"],
            vec![
                vec![Scalar::Num(1.0), Scalar::Num(2.0)],
                vec![Scalar::Num(3.0), Scalar::Num(4.5)],
            ],
        ));
        assert_eq!(field(&schema, "a"), FieldType::required(ColumnType::Int));
        assert_eq!(field(&schema, "b"), FieldType::required(ColumnType::Float));
    }

    #[test]
    fn mixed_cells_demote_to_nullable_string() {
        let schema = infer_schema(&table(
            &["a", "b"],
            vec![
                vec![Scalar::Num(1.0), Scalar::Str("x".into())],
                vec![Scalar::Num(2.0), Scalar::Str("y".into())],
            ],
        ));
        assert_eq!(field(&schema, "a"), FieldType::required(ColumnType::Int));
        assert_eq!(field(&schema, "b"), FieldType::nullable(ColumnType::String));

        let mixed = infer_schema(&table(
            &["a"],
            vec![vec![Scalar::Num(1.0)], vec![Scalar::Str("x".into())]],
        ));
        assert_eq!(field(&mixed, "a"), FieldType::nullable(ColumnType::String));
    }

    #[test]
    fn datetime_detection_and_demotion() {
        let dates = infer_schema(&table(
            &["d"],
            vec![
                vec![Scalar::Str("2020-01-01".into())],
                vec![Scalar::Str("2020-02-01".into())],
            ],
        ));
        assert_eq!(field(&dates, "d"), FieldType::required(ColumnType::DateTime));

        let broken = infer_schema(&table(
            &["d"],
            vec![
                vec![Scalar::Str("2020-01-01".into())],
                vec![Scalar::Str("not a date".into())],
            ],
        ));
        assert_eq!(field(&broken, "d"), FieldType::nullable(ColumnType::String));
    }

    #[test]
    fn inference_is_row_order_independent() {
        let rows = vec![
            vec![Scalar::Num(1.0)],
            vec![Scalar::Str("2020-01-01".into())],
            vec![Scalar::Bool(true)],
            vec![Scalar::Num(2.5)],
        ];
        let forward = infer_schema(&table(&["a"], rows.clone()));
        let mut reversed_rows = rows;
        reversed_rows.reverse();
        let reversed = infer_schema(&table(&["a"], reversed_rows));
        assert_eq!(forward, reversed);
        assert_eq!(
            field(&forward, "a"),
            FieldType::nullable(ColumnType::String)
        );
    }

    #[test]
    fn nullable_string_is_absorbing() {
        let schema = infer_schema(&table(
            &["a"],
            vec![
                vec![Scalar::Num(1.0)],
                vec![Scalar::Str("x".into())],
                vec![Scalar::Num(2.0)],
                vec![Scalar::Bool(false)],
            ],
        ));
        assert_eq!(field(&schema, "a"), FieldType::nullable(ColumnType::String));
    }

    #[test]
    fn zero_rows_yield_no_fields() {
        let schema = infer_schema(&table(&["a", "b"], vec![]));
        assert!(schema.fields.is_empty());
    }

    #[test]
    fn compatibility_is_reflexive() {
        let schema = infer_schema(&table(
            &["a", "b"],
            vec![vec![Scalar::Num(1.0), Scalar::Str("x".into())]],
        ));
        assert!(check_compatible(&schema, &schema).is_ok());
    }

    #[test]
    fn compatibility_accepts_promotions() {
        let mut existing = BTreeMap::new();
        existing.insert("a".to_string(), FieldType::required(ColumnType::Int));
        existing.insert("b".to_string(), FieldType::required(ColumnType::DateTime));
        let existing = TabularSchema::new(existing);

        let mut incoming = BTreeMap::new();
        incoming.insert("a".to_string(), FieldType::required(ColumnType::Float));
        incoming.insert("b".to_string(), FieldType::required(ColumnType::String));
        let incoming = TabularSchema::new(incoming);

        assert!(check_compatible(&existing, &incoming).is_ok());
    }

    #[test]
    fn compatibility_rejects_missing_field_and_narrowing() {
        let mut existing = BTreeMap::new();
        existing.insert("a".to_string(), FieldType::required(ColumnType::Float));
        let existing = TabularSchema::new(existing);

        let incoming = TabularSchema::new(BTreeMap::new());
        let err = check_compatible(&existing, &incoming).unwrap_err();
        assert!(matches!(
            err,
            TaxisError::SchemaIncompatible { ref field, .. } if field == "a"
        ));

        let mut narrowed = BTreeMap::new();
        narrowed.insert("a".to_string(), FieldType::required(ColumnType::Int));
        let narrowed = TabularSchema::new(narrowed);
        assert!(check_compatible(&existing, &narrowed).is_err());
    }

    #[test]
    fn compatibility_rejects_nullable_widening() {
        let mut existing = BTreeMap::new();
        existing.insert("a".to_string(), FieldType::required(ColumnType::Int));
        let existing = TabularSchema::new(existing);

        let mut incoming = BTreeMap::new();
        incoming.insert("a".to_string(), FieldType::nullable(ColumnType::Int));
        let incoming = TabularSchema::new(incoming);

        let err = check_compatible(&existing, &incoming).unwrap_err();
        assert!(matches!(
            err,
            TaxisError::SchemaIncompatible { ref field, .. } if field == "a"
        ));
    }

    #[test]
    fn rows_validated_by_a_pass_any_compatible_stored_schema() {
        let data = table(
            &["a"],
            vec![vec![Scalar::Num(1.0)], vec![Scalar::Num(2.0)]],
        );
        let inferred = infer_schema(&data);

        let mut stored = BTreeMap::new();
        stored.insert("a".to_string(), FieldType::required(ColumnType::Int));
        let stored = TabularSchema::new(stored);

        assert!(check_compatible(&stored, &inferred).is_ok());
        assert!(validate_rows(&stored, &data).is_ok());
    }

    #[test]
    fn validation_rejects_type_violation_and_unknown_column() {
        let mut stored = BTreeMap::new();
        stored.insert("a".to_string(), FieldType::required(ColumnType::Int));
        let stored = TabularSchema::new(stored);

        let bad_cell = table(&["a"], vec![vec![Scalar::Str("x".into())]]);
        assert!(validate_rows(&stored, &bad_cell).is_err());

        let unknown_column = table(&["zzz"], vec![vec![Scalar::Num(1.0)]]);
        assert!(validate_rows(&stored, &unknown_column).is_err());
    }

    #[test]
    fn null_cells_respect_nullability() {
        let mut stored = BTreeMap::new();
        stored.insert("a".to_string(), FieldType::nullable(ColumnType::String));
        stored.insert("b".to_string(), FieldType::required(ColumnType::Int));
        let stored = TabularSchema::new(stored);

        let nullable_ok = table(
            &["a", "b"],
            vec![vec![Scalar::Null, Scalar::Num(1.0)]],
        );
        assert!(validate_rows(&stored, &nullable_ok).is_ok());

        let required_null = table(
            &["a", "b"],
            vec![vec![Scalar::Str("x".into()), Scalar::Null]],
        );
        assert!(validate_rows(&stored, &required_null).is_err());
    }

    #[test]
    fn datetime_formats_accepted() {
        for value in [
            "2024-05-01T10:00:00Z",
            "2020-01-01",
            "2020-01-01 10:30:00",
            "2020/01/02",
            "31/12/2020",
        ] {
            assert!(is_datetime(value), "{value} should parse");
        }
        assert!(!is_datetime("yesterday"));
        assert!(!is_datetime("2020-13-45"));
    }
}
