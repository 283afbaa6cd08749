//! Postgres catalog access over `tokio-postgres`.
//!
//! All queries bind the schema name as `$1` and are logged via tracing.
//! Catalog domain types (`sql_identifier`, `yes_or_no`, `cardinal_number`)
//! are cast to plain `text`/`int4` in SQL.

use std::fmt;
use std::str::FromStr;

use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::Instrument;

use crate::catalog::{
    BoxFuture, Catalog, CatalogResult, ColumnRow, ForeignKeyRow, IndexRow, PrimaryKeyRow,
};
use crate::error::CatalogError;
use crate::schema::{ColumnInfo, ForeignKeyEntry, IndexEntry};

const COLUMNS_SQL: &str = "
    SELECT
        table_name::text,
        column_name::text,
        is_nullable::text,
        data_type::text,
        character_maximum_length::int4,
        numeric_precision::int4,
        numeric_scale::int4,
        datetime_precision::int4,
        udt_name::text,
        ordinal_position::int4
    FROM information_schema.columns
    WHERE table_schema = $1
    ORDER BY table_name, column_name";

const PRIMARY_KEYS_SQL: &str = "
    SELECT
        tc.table_name::text,
        kcu.column_name::text
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
    WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_schema = $1
    ORDER BY tc.table_name, kcu.ordinal_position";

const INDEXES_SQL: &str = "
    SELECT
        t.relname::text AS table_name,
        i.relname::text AS index_name,
        a.attname::text AS column_name,
        ix.indisunique AS is_unique
    FROM pg_class t
    JOIN pg_index ix ON t.oid = ix.indrelid
    JOIN pg_class i ON i.oid = ix.indexrelid
    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
    JOIN pg_namespace n ON t.relnamespace = n.oid
    WHERE n.nspname = $1
    ORDER BY t.relname, i.relname, array_position(ix.indkey::int2[], a.attnum)";

const FOREIGN_KEYS_SQL: &str = "
    SELECT
        kcu.table_name::text,
        tc.constraint_name::text,
        kcu.column_name::text,
        ccu.table_name::text AS foreign_table_name,
        ccu.column_name::text AS foreign_column_name
    FROM information_schema.table_constraints AS tc
    JOIN information_schema.key_column_usage AS kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage AS ccu
        ON ccu.constraint_name = tc.constraint_name
        AND ccu.table_schema = tc.table_schema
    WHERE tc.constraint_type = 'FOREIGN KEY'
        AND tc.table_schema = $1
    ORDER BY kcu.table_name, tc.constraint_name";

/// Parameters for opening one connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
}

impl ConnectParams {
    /// Parse a `postgres://` URL or a `key=value` connection string.
    pub fn from_url(url: &str) -> Result<Self, tokio_postgres::Error> {
        let config = tokio_postgres::Config::from_str(url)?;
        let host = config
            .get_hosts()
            .iter()
            .find_map(|host| match host {
                tokio_postgres::config::Host::Tcp(name) => Some(name.clone()),
                #[cfg(unix)]
                tokio_postgres::config::Host::Unix(path) => Some(path.display().to_string()),
            })
            .unwrap_or_else(|| "localhost".to_string());
        Ok(Self {
            host,
            port: config.get_ports().first().copied().unwrap_or(5432),
            dbname: config.get_dbname().unwrap_or_default().to_string(),
            user: config.get_user().unwrap_or_default().to_string(),
            password: config
                .get_password()
                .map(|p| String::from_utf8_lossy(p).into_owned()),
        })
    }

    /// Build the `tokio-postgres` configuration for these parameters.
    pub fn to_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .application_name("tandem");
        if !self.dbname.is_empty() {
            config.dbname(&self.dbname);
        }
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl fmt::Display for ConnectParams {
    /// `user@host:port/dbname`, never the password.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.dbname)
    }
}

/// A [`Catalog`] backed by one Postgres connection.
///
/// Dropping the catalog drops the client, which closes the connection.
pub struct PgCatalog {
    client: Client,
}

impl PgCatalog {
    /// Wrap an already-connected client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Open a connection and spawn its driver onto the current runtime.
    pub async fn connect(params: &ConnectParams) -> Result<Self, tokio_postgres::Error> {
        let (client, connection) = params.to_config().connect(NoTls).await?;

        let target = params.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(target = %target, error = %e, "database connection error");
            }
        });

        Ok(Self { client })
    }

    /// Get the inner client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Execute a query, returning all rows.
    async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, CatalogError> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql.trim(),
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self.client.query(sql, params).instrument(span.clone()).await?;
        span.record("rows", rows.len());
        Ok(rows)
    }
}

fn column_row(row: &Row) -> Result<ColumnRow, tokio_postgres::Error> {
    let is_nullable: String = row.try_get(2)?;
    Ok(ColumnRow {
        table_name: row.try_get(0)?,
        column: ColumnInfo {
            name: row.try_get(1)?,
            nullable: is_nullable == "YES",
            data_type: row.try_get(3)?,
            max_length: row.try_get(4)?,
            numeric_precision: row.try_get(5)?,
            numeric_scale: row.try_get(6)?,
            datetime_precision: row.try_get(7)?,
            udt_name: row.try_get(8)?,
            ordinal_position: row.try_get(9)?,
        },
    })
}

fn primary_key_row(row: &Row) -> Result<PrimaryKeyRow, tokio_postgres::Error> {
    Ok(PrimaryKeyRow {
        table_name: row.try_get(0)?,
        column_name: row.try_get(1)?,
    })
}

fn index_row(row: &Row) -> Result<IndexRow, tokio_postgres::Error> {
    Ok(IndexRow {
        table_name: row.try_get(0)?,
        entry: IndexEntry {
            index_name: row.try_get(1)?,
            column_name: row.try_get(2)?,
            is_unique: row.try_get(3)?,
        },
    })
}

fn foreign_key_row(row: &Row) -> Result<ForeignKeyRow, tokio_postgres::Error> {
    Ok(ForeignKeyRow {
        table_name: row.try_get(0)?,
        entry: ForeignKeyEntry {
            constraint_name: row.try_get(1)?,
            column_name: row.try_get(2)?,
            foreign_table_name: row.try_get(3)?,
            foreign_column_name: row.try_get(4)?,
        },
    })
}

impl PgCatalog {
    async fn fetch<T>(
        &self,
        sql: &str,
        schema: &str,
        decode: fn(&Row) -> Result<T, tokio_postgres::Error>,
    ) -> CatalogResult<T> {
        let rows = self.query(sql, &[&schema]).await?;
        let decoded = rows
            .iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(decoded)
    }
}

impl Catalog for PgCatalog {
    fn columns<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<ColumnRow>> {
        Box::pin(self.fetch(COLUMNS_SQL, schema, column_row))
    }

    fn primary_keys<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<PrimaryKeyRow>> {
        Box::pin(self.fetch(PRIMARY_KEYS_SQL, schema, primary_key_row))
    }

    fn indexes<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<IndexRow>> {
        Box::pin(self.fetch(INDEXES_SQL, schema, index_row))
    }

    fn foreign_keys<'a>(&'a self, schema: &'a str) -> BoxFuture<'a, CatalogResult<ForeignKeyRow>> {
        Box::pin(self.fetch(FOREIGN_KEYS_SQL, schema, foreign_key_row))
    }
}
