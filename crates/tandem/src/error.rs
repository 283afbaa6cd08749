use thiserror::Error;

use crate::catalog::CatalogQuery;

/// A catalog query could not be answered.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("{0}")]
    Backend(String),
}

/// Fetching one side's metadata failed. Partial results are discarded.
#[derive(Debug, Error)]
#[error("{label}: {query} query failed: {cause}")]
pub struct FetchError {
    /// Label of the database being fetched.
    pub label: String,
    /// Which of the four catalog queries failed.
    pub query: CatalogQuery,
    #[source]
    pub cause: CatalogError,
}

/// Which of the two compared databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// A comparison could not produce a report.
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("could not connect to {label}: {source}")]
    Connect {
        side: Side,
        label: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("{side} database failed: {source}")]
    Fetch {
        side: Side,
        #[source]
        source: FetchError,
    },

    #[error("fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("fetch tasks ended without producing both snapshots")]
    Incomplete,
}

impl CompareError {
    /// The side that failed, when known.
    pub fn side(&self) -> Option<Side> {
        match self {
            CompareError::Connect { side, .. } | CompareError::Fetch { side, .. } => Some(*side),
            _ => None,
        }
    }
}
