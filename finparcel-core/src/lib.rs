//! Core types and pipeline wiring for the finparcel shipment tracking aggregator.

/// Concurrent per-parcel detail enrichment.
pub mod fanout;
/// Domain models and identifiers shared by all carriers.
pub mod model;
/// Single-flight aggregation pipeline used by hosts.
pub mod pipeline;
/// Registry for plugging carrier providers into the pipeline.
pub mod plugin;
/// Traits describing the carrier interfaces.
pub mod ports;
/// Filtering, ranking, and truncation of aggregated parcels.
pub mod projection;
/// Per-carrier session token cache.
pub mod token;
/// HTTP transport abstraction and its `reqwest` implementation.
pub mod transport;

pub use fanout::*;
pub use model::*;
pub use pipeline::*;
pub use plugin::*;
pub use ports::*;
pub use token::*;
pub use transport::*;
