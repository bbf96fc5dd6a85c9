pub mod entity;
pub mod error;
pub mod family;
pub mod ids;
pub mod infer;
pub mod schema;
pub mod time;
pub mod value;

pub use entity::*;
pub use error::{TaxisError, TaxisResult};
pub use family::*;
pub use ids::*;
pub use infer::*;
pub use schema::*;
pub use time::*;
pub use value::*;
