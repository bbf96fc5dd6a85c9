use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::error::{TaxisError, TaxisResult};
use crate::family::StorageFamily;

fn uuid_no_hyphens() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Globally unique attribute identifier: `attr_` + 32 hex chars.
pub fn attribute_id() -> String {
    format!("attr_{}", uuid_no_hyphens())
}

/// Identifier for an `IS_ATTRIBUTE` edge in the lookup graph.
pub fn relationship_id() -> String {
    format!("attr_rel_{}", uuid_no_hyphens())
}

/// Physical table name for a tabular attribute, 37 chars total. Hyphens are
/// stripped for database identifier compatibility.
pub fn table_name() -> String {
    format!("attr_{}", uuid_no_hyphens())
}

/// Advisory storage location label. The tabular family replaces this with
/// the generated table name once a physical table exists.
pub fn storage_path(entity_id: &str, attribute_name: &str, family: StorageFamily) -> String {
    let prefix = match family {
        StorageFamily::Tabular => "tables",
        StorageFamily::Graph => "graphs",
        StorageFamily::Map | StorageFamily::List | StorageFamily::Scalar => "documents",
        StorageFamily::Unknown => "unknown",
    };
    format!("{prefix}/attr_{entity_id}_{attribute_name}")
}

/// Reduces an identifier to `[A-Za-z0-9_]` after NFKC normalization. Every
/// table and column name is passed through here before it reaches SQL text.
pub fn sanitize_identifier(raw: &str) -> TaxisResult<String> {
    let sanitized: String = raw
        .nfkc()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if sanitized.is_empty() {
        return Err(TaxisError::validation(format!(
            "identifier '{raw}' is empty after sanitization"
        )));
    }
    Ok(sanitized)
}
