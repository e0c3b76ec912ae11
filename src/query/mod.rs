pub mod filter;
pub mod params;
pub mod projection;
pub mod schema;

pub use filter::{CompareOp, Filter, Scalar};
pub use params::{ListQuery, ParseMode, Populate, SearchQuery, SortKey};
pub use projection::Projection;
pub use schema::{FieldDef, FieldKind, Schema, TASKS, USERS};
