//! Tool catalog aggregation and call routing.

mod aggregator;
mod catalog;
pub mod errors;

pub use aggregator::ToolAggregator;
pub use catalog::{ServerFailure, Shadowed, ToolCatalog, ToolDescriptor};
pub use errors::ToolError;
