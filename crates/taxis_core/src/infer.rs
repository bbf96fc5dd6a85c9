use crate::family::StorageFamily;
use crate::value::{AttributeValue, ScalarKind};

/// Shape discriminant used for the list-homogeneity check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Shape {
    Scalar(ScalarKind),
    List,
    Map,
    Table,
}

fn shape_of(value: &AttributeValue) -> Shape {
    match value {
        AttributeValue::Scalar(s) => Shape::Scalar(s.kind()),
        AttributeValue::List(_) => Shape::List,
        AttributeValue::Map(_) => Shape::Map,
        AttributeValue::Table(_) => Shape::Table,
    }
}

/// Determines the storage family of an opaque value. This is the only place
/// in the workspace that inspects value shape. Ambiguity never raises an
/// error; it yields `Unknown`, which the processor turns into a
/// per-attribute failure.
pub fn infer(value: &AttributeValue) -> StorageFamily {
    match value {
        AttributeValue::Table(table) => {
            if table.is_well_formed() {
                StorageFamily::Tabular
            } else {
                StorageFamily::Unknown
            }
        }
        AttributeValue::Map(map) => {
            if map.contains_key("nodes") && map.contains_key("edges") {
                StorageFamily::Graph
            } else {
                StorageFamily::Map
            }
        }
        AttributeValue::List(items) => {
            let mut shapes = items.iter().map(shape_of);
            match shapes.next() {
                None => StorageFamily::List,
                Some(first) => {
                    if shapes.all(|shape| shape == first) {
                        StorageFamily::List
                    } else {
                        StorageFamily::Unknown
                    }
                }
            }
        }
        AttributeValue::Scalar(_) => StorageFamily::Scalar,
    }
}
