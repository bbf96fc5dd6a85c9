use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::time::parse_rfc3339;
use crate::value::AttributeValue;

/// A value bounded by a validity window. Times are RFC-3339 strings and the
/// empty string marks an open bound.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeBasedValue {
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    pub value: Option<AttributeValue>,
}

impl TimeBasedValue {
    pub fn new(
        start_time: impl Into<String>,
        end_time: impl Into<String>,
        value: AttributeValue,
    ) -> Self {
        Self {
            start_time: start_time.into(),
            end_time: end_time.into(),
            value: Some(value),
        }
    }

    /// `start_time <= end_time` whenever both bounds are present.
    pub fn window_is_valid(&self) -> bool {
        match (
            parse_rfc3339(&self.start_time),
            parse_rfc3339(&self.end_time),
        ) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }
}

/// Input envelope. Entities are not owned by this workspace; the processor
/// walks the attribute map and never stores the envelope itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub attributes: HashMap<String, Vec<TimeBasedValue>>,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        values: Vec<TimeBasedValue>,
    ) -> Self {
        self.attributes.insert(name.into(), values);
        self
    }
}
