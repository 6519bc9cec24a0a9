//! State module for work items flowing through the pipeline
//!
//! # Components
//!
//! - `WorkItem`: one candidate link, its enrichment, and its interchange form
//! - `Issues`: independent reasons an item should not be fetched
//! - `FetchStatus`: lifecycle of a work item

mod fetch_status;
mod work_item;

// Re-export main types
pub use fetch_status::FetchStatus;
pub use work_item::{Issues, WorkItem, NEVER_PRIORITY};
