//! Metadata fetching: four catalog queries folded into a [`SchemaSnapshot`].

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::Instrument;

use crate::catalog::{Catalog, CatalogQuery};
use crate::error::{CatalogError, FetchError};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::schema::{SchemaSnapshot, TableStructure};

/// Fetch the structure of every table in `schema`.
///
/// The queries run one after the other on the same catalog: columns,
/// primary keys, indexes, foreign keys. Tables are discovered by the column
/// scan only; key, index and foreign key rows naming an unknown table are
/// dropped.
///
/// Emits a status event before the column query and one progress event per
/// table discovered. On failure an error event is emitted and nothing is
/// returned but the error.
pub async fn fetch_snapshot<C, S>(
    catalog: &C,
    schema: &str,
    label: &str,
    sink: &S,
) -> Result<SchemaSnapshot, FetchError>
where
    C: Catalog + ?Sized,
    S: ProgressSink + ?Sized,
{
    let span = tracing::info_span!("fetch", label = %label, schema = %schema);
    let result = fetch_inner(catalog, schema, label, sink).instrument(span).await;
    if let Err(err) = &result {
        tracing::warn!(label = %label, error = %err, "fetch failed");
        sink.emit(ProgressEvent::error(label, err.to_string()));
    }
    result
}

async fn fetch_inner<C, S>(
    catalog: &C,
    schema: &str,
    label: &str,
    sink: &S,
) -> Result<SchemaSnapshot, FetchError>
where
    C: Catalog + ?Sized,
    S: ProgressSink + ?Sized,
{
    let fail = |query: CatalogQuery| {
        move |cause: CatalogError| FetchError {
            label: label.to_string(),
            query,
            cause,
        }
    };

    sink.emit(ProgressEvent::status(
        label,
        format!("fetching structure for {label}"),
    ));

    let columns = catalog
        .columns(schema)
        .await
        .map_err(fail(CatalogQuery::Columns))?;

    let total = columns
        .iter()
        .map(|row| row.table_name.as_str())
        .collect::<HashSet<_>>()
        .len();

    let mut tables: IndexMap<String, TableStructure> = IndexMap::with_capacity(total);
    for row in columns {
        if !tables.contains_key(&row.table_name) {
            tables.insert(row.table_name.clone(), TableStructure::default());
            sink.emit(ProgressEvent::progress(
                label,
                tables.len(),
                total,
                row.table_name.as_str(),
            ));
        }
        if let Some(table) = tables.get_mut(&row.table_name) {
            table.columns.push(row.column);
        }
    }

    let primary_keys = catalog
        .primary_keys(schema)
        .await
        .map_err(fail(CatalogQuery::PrimaryKeys))?;
    for row in primary_keys {
        if let Some(table) = tables.get_mut(&row.table_name) {
            table.primary_keys.push(row.column_name);
        }
    }

    let indexes = catalog
        .indexes(schema)
        .await
        .map_err(fail(CatalogQuery::Indexes))?;
    for row in indexes {
        if let Some(table) = tables.get_mut(&row.table_name) {
            table.indexes.push(row.entry);
        }
    }

    let foreign_keys = catalog
        .foreign_keys(schema)
        .await
        .map_err(fail(CatalogQuery::ForeignKeys))?;
    for row in foreign_keys {
        if let Some(table) = tables.get_mut(&row.table_name) {
            table.foreign_keys.push(row.entry);
        }
    }

    tracing::debug!(tables = tables.len(), "fetched structure");
    Ok(SchemaSnapshot { tables })
}
