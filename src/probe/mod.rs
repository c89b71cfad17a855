//! Rendering-probe integration
//!
//! The probe itself is an external process; this module owns its process
//! contract (argv encoding, wall-clock budget, retry policy) and the
//! decoding of its tagged-record output protocol.

mod gateway;
mod protocol;

pub use gateway::ProbeGateway;
pub use protocol::{decode_probe_output, DiscoveredRequest, ProbeOutcome};
