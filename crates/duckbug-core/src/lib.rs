//! duckbug-core library.
//!
//! Groups incoming error and log events by caller-supplied fingerprint,
//! keeps per-group occurrence aggregates, manages group status, and answers
//! trailing-window occurrence queries. Everything is backed by one SQLite
//! file shared by any number of worker connections.
//!
//! ```no_run
//! use duckbug_core::{Ingestor, NewEvent, StatsAggregator, EventKind, db};
//!
//! # fn main() -> anyhow::Result<()> {
//! let conn = db::open_store("duckbug.sqlite3".as_ref(), db::DEFAULT_BUSY_TIMEOUT)?;
//! Ingestor::new(&conn).create_event(NewEvent::error("p1", "f1", "boom", "app.php", 12))?;
//! let counts = StatsAggregator::new(&conn).get_stats(EventKind::Error, "p1", Some("f1"))?;
//! assert!(counts.last_24h <= counts.last_7d);
//! # Ok(())
//! # }
//! ```
//!
//! # Conventions
//!
//! - **Errors**: engine operations return [`Result`] with [`Error`];
//!   config and store bootstrap use `anyhow::Result`.
//! - **Logging**: `tracing` macros only; subscribers are installed by binaries.
//! - **Time**: event `time` is unix milliseconds; `*_seen_at`, `created_at`
//!   and `updated_at` are unix seconds.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod groups;
pub mod ingest;
pub mod lifecycle;
pub mod model;
pub mod overview;
pub mod stats;

pub use db::filter::{Page, SortDirection};
pub use error::{Error, ErrorCode, Result};
pub use events::{EventPatch, EventQuery, EventStore};
pub use groups::{GroupQuery, GroupStore};
pub use ingest::{IngestOutcome, Ingestor};
pub use lifecycle::{BatchUpdate, GroupLifecycle};
pub use model::{Event, EventKind, Group, GroupStatus, LogLevel, NewEvent};
pub use overview::{ProjectOverview, ProjectOverviews};
pub use stats::{StatsAggregator, WindowCounts};
