//! Running a comparison: two concurrent fetches, then the diff.
//!
//! Each fetch runs as its own tokio task with its own progress channel. The
//! orchestrator forwards both streams to the caller's sink as events arrive,
//! so left and right progress interleave freely while each stream keeps its
//! own order. If either fetch fails, the comparison fails with that error
//! and the other task is aborted, which drops its catalog and so releases
//! its connection.

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::catalog::Catalog;
use crate::error::{CompareError, FetchError, Side};
use crate::fetch::fetch_snapshot;
use crate::postgres::{ConnectParams, PgCatalog};
use crate::progress::{COMPARE_LABEL, ProgressEvent, ProgressSink};
use crate::report::ComparisonReport;
use crate::schema::SchemaSnapshot;

/// One side of a comparison: a catalog and the label it is reported under.
pub struct Endpoint<C> {
    pub label: String,
    pub catalog: C,
}

impl<C> Endpoint<C> {
    pub fn new(label: impl Into<String>, catalog: C) -> Self {
        Self {
            label: label.into(),
            catalog,
        }
    }
}

/// Open both connections, then [`compare`] them.
///
/// Both connections are opened concurrently. If either cannot be opened the
/// comparison fails before any catalog query runs.
pub async fn compare_databases(
    left: &ConnectParams,
    right: &ConnectParams,
    schema: &str,
    left_label: &str,
    right_label: &str,
    sink: &dyn ProgressSink,
) -> Result<ComparisonReport, CompareError> {
    let (left_conn, right_conn) =
        tokio::join!(PgCatalog::connect(left), PgCatalog::connect(right));
    let left_catalog = left_conn.map_err(|source| CompareError::Connect {
        side: Side::Left,
        label: left_label.to_string(),
        source,
    })?;
    let right_catalog = right_conn.map_err(|source| CompareError::Connect {
        side: Side::Right,
        label: right_label.to_string(),
        source,
    })?;

    compare(
        Endpoint::new(left_label, left_catalog),
        Endpoint::new(right_label, right_catalog),
        schema,
        sink,
    )
    .await
}

/// Compare `schema` across two catalogs.
///
/// Takes ownership of both catalogs; they are dropped before this returns
/// (or, for a task aborted after the other side failed, as soon as the
/// runtime cancels it).
pub async fn compare<L, R>(
    left: Endpoint<L>,
    right: Endpoint<R>,
    schema: &str,
    sink: &dyn ProgressSink,
) -> Result<ComparisonReport, CompareError>
where
    L: Catalog + 'static,
    R: Catalog + 'static,
{
    tracing::info!(
        schema = %schema,
        left = %left.label,
        right = %right.label,
        "comparing schema structure"
    );

    // Unbounded so that the caller's sink is the only place events are lost.
    let (left_tx, mut left_rx) = mpsc::unbounded_channel();
    let (right_tx, mut right_rx) = mpsc::unbounded_channel();

    let mut tasks: JoinSet<(Side, Result<SchemaSnapshot, FetchError>)> = JoinSet::new();
    tasks.spawn(run_fetch(Side::Left, left, schema.to_string(), left_tx));
    tasks.spawn(run_fetch(Side::Right, right, schema.to_string(), right_tx));

    let mut left_snapshot = None;
    let mut right_snapshot = None;

    while left_snapshot.is_none() || right_snapshot.is_none() {
        tokio::select! {
            Some(event) = left_rx.recv() => sink.emit(event),
            Some(event) = right_rx.recv() => sink.emit(event),
            Some(joined) = tasks.join_next() => {
                let (side, result) = joined?;
                // Forward what the finished task emitted before completing.
                match side {
                    Side::Left => drain(&mut left_rx, sink),
                    Side::Right => drain(&mut right_rx, sink),
                }
                // Returning here drops `tasks`, aborting the other fetch.
                let snapshot = result.map_err(|source| CompareError::Fetch { side, source })?;
                match side {
                    Side::Left => left_snapshot = Some(snapshot),
                    Side::Right => right_snapshot = Some(snapshot),
                }
            }
            else => break,
        }
    }

    let (Some(left_snapshot), Some(right_snapshot)) = (left_snapshot, right_snapshot) else {
        return Err(CompareError::Incomplete);
    };

    sink.emit(ProgressEvent::status(COMPARE_LABEL, "comparing structures"));
    let report = left_snapshot.diff_with_progress(&right_snapshot, |current, total, table| {
        sink.emit(ProgressEvent::progress(COMPARE_LABEL, current, total, table));
    });

    tracing::info!(
        left_tables = left_snapshot.len(),
        right_tables = right_snapshot.len(),
        differing_tables = report.table_count(),
        "comparison finished"
    );
    Ok(report)
}

async fn run_fetch<C: Catalog>(
    side: Side,
    endpoint: Endpoint<C>,
    schema: String,
    progress: mpsc::UnboundedSender<ProgressEvent>,
) -> (Side, Result<SchemaSnapshot, FetchError>) {
    let result = fetch_snapshot(&endpoint.catalog, &schema, &endpoint.label, &progress).await;
    // Release the connection as soon as this side is done.
    drop(endpoint);
    (side, result)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>, sink: &dyn ProgressSink) {
    while let Ok(event) = rx.try_recv() {
        sink.emit(event);
    }
}
