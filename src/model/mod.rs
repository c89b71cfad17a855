//! Core data model: requests, cookies and per-dispatch crawl results
//!
//! A [`Request`] is both the unit of work handed to the rendering probe and
//! a node of the persisted crawl graph. A [`CrawlResult`] is the ephemeral
//! outcome of one dispatch, handed from a worker to the coordinator.

mod cookie;
mod request;
mod result;

pub use cookie::Cookie;
pub use request::{Request, RequestType};
pub use result::{CrawlErrorCode, CrawlResult};
