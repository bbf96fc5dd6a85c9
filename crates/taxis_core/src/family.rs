use serde::{Deserialize, Serialize};

/// Major type label shared by every attribute node in the lookup graph.
pub const DATASET_MAJOR: &str = "Dataset";

/// Storage family assigned to an attribute value by shape.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum StorageFamily {
    Tabular,
    Graph,
    Map,
    List,
    Scalar,
    Unknown,
}

impl StorageFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageFamily::Tabular => "tabular",
            StorageFamily::Graph => "graph",
            StorageFamily::Map => "map",
            StorageFamily::List => "list",
            StorageFamily::Scalar => "scalar",
            StorageFamily::Unknown => "unknown",
        }
    }

    pub fn from_str_loose(value: &str) -> Self {
        match value {
            "tabular" => StorageFamily::Tabular,
            "graph" => StorageFamily::Graph,
            "map" => StorageFamily::Map,
            "list" => StorageFamily::List,
            "scalar" => StorageFamily::Scalar,
            _ => StorageFamily::Unknown,
        }
    }

    /// Minor label of the dataset node for this family. Map, list, and
    /// scalar payloads all live in the document backend; anything
    /// unrecognized is labeled a blob.
    pub fn dataset_minor(self) -> &'static str {
        match self {
            StorageFamily::Tabular => "Tabular",
            StorageFamily::Graph => "Graph",
            StorageFamily::Map | StorageFamily::List | StorageFamily::Scalar => "Document",
            StorageFamily::Unknown => "Blob",
        }
    }

    /// Key used to pick a resolver: families that share a backend share a
    /// dispatch slot.
    pub fn dispatch_key(self) -> StorageFamily {
        match self {
            StorageFamily::Map | StorageFamily::List | StorageFamily::Scalar => StorageFamily::Map,
            other => other,
        }
    }
}
