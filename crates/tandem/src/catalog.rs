//! The seam between the fetcher and a live database.
//!
//! A [`Catalog`] answers the four metadata queries the fetcher needs. The
//! Postgres implementation lives in [`crate::postgres`]; tests use in-memory
//! implementations.

use std::future::Future;
use std::pin::Pin;

use crate::error::CatalogError;
use crate::schema::{ColumnInfo, ForeignKeyEntry, IndexEntry};

/// Boxed future returned by [`Catalog`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a catalog query.
pub type CatalogResult<T> = Result<Vec<T>, CatalogError>;

/// The four catalog queries, in the order the fetcher issues them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogQuery {
    Columns,
    PrimaryKeys,
    Indexes,
    ForeignKeys,
}

impl CatalogQuery {
    pub const ALL: [CatalogQuery; 4] = [
        CatalogQuery::Columns,
        CatalogQuery::PrimaryKeys,
        CatalogQuery::Indexes,
        CatalogQuery::ForeignKeys,
    ];
}

impl std::fmt::Display for CatalogQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogQuery::Columns => write!(f, "columns"),
            CatalogQuery::PrimaryKeys => write!(f, "primary keys"),
            CatalogQuery::Indexes => write!(f, "indexes"),
            CatalogQuery::ForeignKeys => write!(f, "foreign keys"),
        }
    }
}

/// A column row: ordered by table name, then column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub table_name: String,
    pub column: ColumnInfo,
}

/// A primary key column row: ordered by table name, then key ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyRow {
    pub table_name: String,
    pub column_name: String,
}

/// An index column row: ordered by table name, then index name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub table_name: String,
    pub entry: IndexEntry,
}

/// A foreign key column row: ordered by table name, then constraint name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRow {
    pub table_name: String,
    pub entry: ForeignKeyEntry,
}

/// Read access to one database's catalog, scoped by schema name.
///
/// Implementations must bind `schema` as a query parameter. A catalog is
/// owned by exactly one fetch and is not expected to run statements
/// concurrently.
pub trait Catalog: Send + Sync {
    /// All columns of all tables in the schema.
    fn columns<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<ColumnRow>>;

    /// All primary key columns in the schema.
    fn primary_keys<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<PrimaryKeyRow>>;

    /// All index columns in the schema, with uniqueness.
    fn indexes<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<IndexRow>>;

    /// All foreign key columns in the schema, with their referenced column.
    fn foreign_keys<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<ForeignKeyRow>>;
}

impl<C: Catalog + ?Sized> Catalog for Box<C> {
    fn columns<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<ColumnRow>> {
        (**self).columns(schema)
    }

    fn primary_keys<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<PrimaryKeyRow>> {
        (**self).primary_keys(schema)
    }

    fn indexes<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<IndexRow>> {
        (**self).indexes(schema)
    }

    fn foreign_keys<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<ForeignKeyRow>> {
        (**self).foreign_keys(schema)
    }
}
