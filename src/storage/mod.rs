//! Persistence for the crawl graph
//!
//! This module owns the transactional crawl store: every request ever
//! seen, its crawl status and lineage, plus crawl-session metadata and the
//! downstream scanner tables. The store is what makes a crawl resumable.

mod schema;
mod store;

pub use schema::initialize_schema;
pub use store::{CrawlStore, InheritedSession, SessionInfo, StoreBatch};
