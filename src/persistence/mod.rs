pub mod filter;
pub mod service;

pub use filter::{FilterCondition, FilterOperator, QueryOptions};
pub use service::{JsonMap, PersistenceService};
