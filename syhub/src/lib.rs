//! # syhub
//!
//! In-memory telemetry retention for a single-process sensor hub dashboard.
//!
//! syhub keeps the most recent readings for every metric a telemetry feed
//! reports, lets any number of request threads read consistent copies of
//! them, and renders a status page combining those readings with system and
//! service health.
//!
//! ## Key Properties
//!
//! - Bounded memory: each metric keeps at most `max_points` samples, oldest
//!   evicted first
//! - One background writer and many concurrent readers, with no torn reads
//! - Readers get independent, deep copies; nothing aliases the store
//! - Malformed feed messages are logged and dropped, never fatal
//! - No persistence: the store lives exactly as long as the process
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use syhub::{IngestionAdapter, SeriesStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SeriesStore::new(10)?);
//! let adapter = IngestionAdapter::new(Arc::clone(&store));
//!
//! adapter.ingest(br#"{"temperature": 25.5, "pH": 6.8}"#);
//! adapter.ingest(b"not json"); // logged and dropped
//!
//! let snapshot = store.snapshot();
//! assert_eq!(snapshot.len(), 2);
//! assert_eq!(snapshot.latest("pH"), Some(&serde_json::json!(6.8)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`SeriesStore`]: keyed, lock-protected collection of bounded series
//! - [`IngestionAdapter`]: decodes feed payloads and applies them to the store
//! - [`Snapshot`]: independent point-in-time copy used for rendering
//! - [`HealthCollector`]: CPU/memory and per-service status, on demand
//! - [`Page`]: pure HTML rendering of snapshot plus health
//!
//! ## Modules
//!
//! - [`store`]: the series store
//! - [`series`]: a single bounded series
//! - [`snapshot`]: snapshots and the per-request reader
//! - [`ingest`]: message decoding and ingestion
//! - [`health`]: system sampling and service probes
//! - [`alert`]: threshold checks on the latest readings
//! - [`render`]: dashboard page rendering
//! - [`settings`]: startup configuration
//! - [`error`]: error types

pub mod alert;
pub mod error;
pub mod health;
pub mod ingest;
pub mod render;
pub mod series;
pub mod settings;
pub mod snapshot;
pub mod store;

/// Identifier of a telemetry metric, as supplied by the feed.
pub type MetricKey = String;

/// One retained reading. Opaque to the store: numeric, string or nested.
pub type Sample = serde_json::Value;

// Re-export primary API types at crate root for convenience.
pub use alert::{Alert, Threshold, evaluate_thresholds};
pub use error::{Result, SyhubError};
pub use health::{HealthCollector, HealthReport, ServiceProbe, ServiceState, SystemStats};
pub use ingest::{IngestionAdapter, decode_message};
pub use render::Page;
pub use settings::Settings;
pub use snapshot::{Snapshot, SnapshotReader};
pub use store::{DEFAULT_MAX_POINTS, SeriesStore};
