//! Compare the structure of one Postgres schema across two databases.
//!
//! This crate provides:
//! - Concurrent metadata fetching from two live databases
//! - A deterministic structural diff of the two snapshots
//! - A report that renders as text or serializes to JSON
//!
//! # Comparing two databases
//!
//! ```ignore
//! use tandem::{ConnectParams, NoProgress, compare_databases};
//!
//! let prod = ConnectParams::from_url("postgres://app@prod-db/shop")?;
//! let staging = ConnectParams::from_url("postgres://app@staging-db/shop")?;
//!
//! let report =
//!     compare_databases(&prod, &staging, "public", "prod", "staging", &NoProgress).await?;
//! print!("{}", report.render("prod", "staging"));
//! ```
//!
//! # Comparing snapshots
//!
//! The diff itself needs no database. Given two [`SchemaSnapshot`]s:
//!
//! ```ignore
//! let report = left.diff(&right);
//! assert!(report.missing_in_left.is_empty());
//! ```
//!
//! # Progress
//!
//! Progress is delivered through a [`ProgressSink`]. Each fetch reports a
//! status event and then one progress event per table, tagged with the
//! database label; the comparison phase reports under [`COMPARE_LABEL`].
//! Sinks never block the fetches: a full channel loses events.
//!
//! # Limitations
//!
//! Indexes and foreign keys are compared by name only. An index that keeps
//! its name but changes columns or uniqueness is not reported.

pub mod catalog;
mod compare;
mod diff;
mod error;
mod fetch;
pub mod postgres;
mod progress;
mod report;
pub mod schema;

pub use catalog::{Catalog, CatalogQuery};
pub use compare::{Endpoint, compare, compare_databases};
pub use error::{CatalogError, CompareError, FetchError, Side};
pub use fetch::fetch_snapshot;
pub use postgres::{ConnectParams, PgCatalog};
pub use progress::{COMPARE_LABEL, EventKind, NoProgress, ProgressEvent, ProgressSink};
pub use report::{
    AttributeChange, ColumnAttribute, ColumnDiff, ColumnsDiff, ComparisonReport, NameDiff,
    PrimaryKeyDiff, Rendered, TableDiff,
};
pub use schema::{ColumnInfo, ForeignKeyEntry, IndexEntry, SchemaSnapshot, TableStructure};

/// Result type for comparisons.
pub type Result<T> = std::result::Result<T, CompareError>;
