//! External collaborators of the fetch pipeline
//!
//! This module contains the pieces the pipeline delegates to, including:
//! - HTTP fetching and failure classification
//! - Host name resolution
//! - Output sinks that receive fetch results
//!
//! Each one sits behind a trait so tests and other transports can replace it.

mod dns;
mod fetcher;
mod sink;

pub use dns::{Resolver, StaticResolver, SystemResolver};
pub use fetcher::{build_http_client, FetchOutcome, Fetcher, HttpFetcher};
pub use sink::{MemorySink, OutputSink, TsvSink};
