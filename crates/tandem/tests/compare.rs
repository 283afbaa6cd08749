//! End-to-end comparisons over in-memory catalogs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tandem::catalog::{BoxFuture, CatalogResult, ColumnRow, ForeignKeyRow, IndexRow, PrimaryKeyRow};
use tandem::{
    COMPARE_LABEL, Catalog, CatalogError, CatalogQuery, ColumnInfo, CompareError, Endpoint,
    EventKind, IndexEntry, NoProgress, ProgressEvent, ProgressSink, Side, compare,
};

/// A catalog serving fixed rows, optionally failing or hanging on one query.
#[derive(Default)]
struct MemoryCatalog {
    columns: Vec<ColumnRow>,
    primary_keys: Vec<PrimaryKeyRow>,
    indexes: Vec<IndexRow>,
    foreign_keys: Vec<ForeignKeyRow>,
    delay: Option<Duration>,
    fail_on: Option<CatalogQuery>,
    hang_on: Option<CatalogQuery>,
    dropped: Arc<AtomicBool>,
}

impl Drop for MemoryCatalog {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl MemoryCatalog {
    /// `tables` pairs a table name with its space-separated column names;
    /// the first column is the primary key.
    fn with_tables(tables: &[(&str, &str)]) -> Self {
        let mut catalog = MemoryCatalog::default();
        for (table, columns) in tables {
            let columns: Vec<&str> = columns.split_whitespace().collect();
            for (i, name) in columns.iter().enumerate() {
                catalog.columns.push(ColumnRow {
                    table_name: table.to_string(),
                    column: column(name, false, i as i32 + 1),
                });
            }
            catalog.primary_keys.push(PrimaryKeyRow {
                table_name: table.to_string(),
                column_name: columns[0].to_string(),
            });
        }
        catalog
    }

    fn answer<T: Clone + Send + 'static>(
        &self,
        query: CatalogQuery,
        rows: &[T],
    ) -> BoxFuture<'static, CatalogResult<T>> {
        let rows = rows.to_vec();
        let delay = self.delay;
        let fail = self.fail_on == Some(query);
        let hang = self.hang_on == Some(query);
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if hang {
                std::future::pending::<()>().await;
            }
            if fail {
                return Err(CatalogError::Backend(format!("{query} unavailable")));
            }
            Ok(rows)
        })
    }
}

impl Catalog for MemoryCatalog {
    fn columns<'a>(&'a self, _schema: &'a str) -> BoxFuture<'a, CatalogResult<ColumnRow>> {
        self.answer(CatalogQuery::Columns, &self.columns)
    }

    fn primary_keys<'a>(&'a self, _schema: &'a str) -> BoxFuture<'a, CatalogResult<PrimaryKeyRow>> {
        self.answer(CatalogQuery::PrimaryKeys, &self.primary_keys)
    }

    fn indexes<'a>(&'a self, _schema: &'a str) -> BoxFuture<'a, CatalogResult<IndexRow>> {
        self.answer(CatalogQuery::Indexes, &self.indexes)
    }

    fn foreign_keys<'a>(&'a self, _schema: &'a str) -> BoxFuture<'a, CatalogResult<ForeignKeyRow>> {
        self.answer(CatalogQuery::ForeignKeys, &self.foreign_keys)
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<ProgressEvent>>);

impl ProgressSink for Recorder {
    fn emit(&self, event: ProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}

impl Recorder {
    fn for_label(&self, label: &str) -> Vec<ProgressEvent> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.label() == label)
            .cloned()
            .collect()
    }
}

fn column(name: &str, nullable: bool, position: i32) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        nullable,
        data_type: "text".to_string(),
        max_length: None,
        numeric_precision: None,
        numeric_scale: None,
        datetime_precision: None,
        udt_name: "text".to_string(),
        ordinal_position: position,
    }
}

async fn within_deadline<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("comparison did not finish in time")
}

#[tokio::test]
async fn reports_tables_missing_on_each_side() {
    let left = MemoryCatalog::with_tables(&[("orders", "id"), ("users", "id email")]);
    let right = MemoryCatalog::with_tables(&[("products", "id"), ("users", "id email")]);

    let report = within_deadline(compare(
        Endpoint::new("prod", left),
        Endpoint::new("staging", right),
        "public",
        &NoProgress,
    ))
    .await
    .unwrap();

    assert_eq!(report.missing_in_left.iter().collect::<Vec<_>>(), vec!["products"]);
    assert_eq!(report.missing_in_right.iter().collect::<Vec<_>>(), vec!["orders"]);
    assert!(report.structure_diff.is_empty());
}

#[tokio::test]
async fn reports_nullability_change() {
    let left = MemoryCatalog::with_tables(&[("users", "id email")]);
    let mut right = MemoryCatalog::with_tables(&[("users", "id email")]);
    right.columns[1].column.nullable = true;

    let report = within_deadline(compare(
        Endpoint::new("prod", left),
        Endpoint::new("staging", right),
        "public",
        &NoProgress,
    ))
    .await
    .unwrap();

    let columns = report.structure_diff["users"].columns.as_ref().unwrap();
    let email = &columns.differences["email"];
    assert!(!email.left.nullable);
    assert!(email.right.nullable);
    assert_eq!(email.changes().len(), 1);
}

#[tokio::test]
async fn same_index_name_with_different_uniqueness_is_not_reported() {
    let index = |unique| IndexRow {
        table_name: "users".to_string(),
        entry: IndexEntry {
            index_name: "idx_user_email".to_string(),
            column_name: "email".to_string(),
            is_unique: unique,
        },
    };
    let mut left = MemoryCatalog::with_tables(&[("users", "id email")]);
    left.indexes.push(index(true));
    let mut right = MemoryCatalog::with_tables(&[("users", "id email")]);
    right.indexes.push(index(false));

    let report = within_deadline(compare(
        Endpoint::new("prod", left),
        Endpoint::new("staging", right),
        "public",
        &NoProgress,
    ))
    .await
    .unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn forwards_both_streams_then_compare_progress() {
    let left = MemoryCatalog::with_tables(&[("a", "id"), ("b", "id"), ("c", "id")]);
    let mut right = MemoryCatalog::with_tables(&[("c", "id"), ("b", "id")]);
    right.delay = Some(Duration::from_millis(20));

    let recorder = Recorder::default();
    within_deadline(compare(
        Endpoint::new("prod", left),
        Endpoint::new("staging", right),
        "public",
        &recorder,
    ))
    .await
    .unwrap();

    assert_eq!(
        recorder.for_label("prod"),
        vec![
            ProgressEvent::status("prod", "fetching structure for prod"),
            ProgressEvent::progress("prod", 1, 3, "a"),
            ProgressEvent::progress("prod", 2, 3, "b"),
            ProgressEvent::progress("prod", 3, 3, "c"),
        ]
    );
    assert_eq!(
        recorder.for_label("staging"),
        vec![
            ProgressEvent::status("staging", "fetching structure for staging"),
            ProgressEvent::progress("staging", 1, 2, "c"),
            ProgressEvent::progress("staging", 2, 2, "b"),
        ]
    );
    assert_eq!(
        recorder.for_label(COMPARE_LABEL),
        vec![
            ProgressEvent::status(COMPARE_LABEL, "comparing structures"),
            ProgressEvent::progress(COMPARE_LABEL, 1, 2, "b"),
            ProgressEvent::progress(COMPARE_LABEL, 2, 2, "c"),
        ]
    );
}

#[tokio::test]
async fn failure_on_one_side_does_not_wait_for_the_other() {
    let mut left = MemoryCatalog::with_tables(&[("users", "id")]);
    left.fail_on = Some(CatalogQuery::Indexes);
    let mut right = MemoryCatalog::with_tables(&[("users", "id")]);
    right.hang_on = Some(CatalogQuery::Columns);
    let right_dropped = right.dropped.clone();

    let recorder = Recorder::default();
    let err = within_deadline(compare(
        Endpoint::new("prod", left),
        Endpoint::new("staging", right),
        "public",
        &recorder,
    ))
    .await
    .unwrap_err();

    match &err {
        CompareError::Fetch { side, source } => {
            assert_eq!(*side, Side::Left);
            assert_eq!(source.label, "prod");
            assert_eq!(source.query, CatalogQuery::Indexes);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.side(), Some(Side::Left));
    assert!(err.to_string().contains("prod"));

    let prod_events = recorder.for_label("prod");
    assert_eq!(prod_events.last().map(ProgressEvent::kind), Some(EventKind::Error));
    assert!(recorder.for_label(COMPARE_LABEL).is_empty());

    // The aborted side releases its catalog once the runtime cancels it.
    for _ in 0..50 {
        if right_dropped.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(right_dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn right_side_failure_is_attributed_to_right() {
    let left = MemoryCatalog::with_tables(&[("users", "id")]);
    let mut right = MemoryCatalog::with_tables(&[("users", "id")]);
    right.fail_on = Some(CatalogQuery::Columns);

    let err = within_deadline(compare(
        Endpoint::new("prod", left),
        Endpoint::new("staging", right),
        "public",
        &NoProgress,
    ))
    .await
    .unwrap_err();

    assert_eq!(err.side(), Some(Side::Right));
    assert!(err.to_string().contains("staging"));
}

#[tokio::test]
async fn catalogs_are_released_after_success() {
    let left = MemoryCatalog::with_tables(&[("users", "id")]);
    let right = MemoryCatalog::with_tables(&[("users", "id")]);
    let (left_dropped, right_dropped) = (left.dropped.clone(), right.dropped.clone());

    within_deadline(compare(
        Endpoint::new("prod", left),
        Endpoint::new("staging", right),
        "public",
        &NoProgress,
    ))
    .await
    .unwrap();

    assert!(left_dropped.load(Ordering::SeqCst));
    assert!(right_dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn full_caller_channel_does_not_stall() {
    let tables: Vec<String> = (0..100).map(|i| format!("t{i:03}")).collect();
    let layout: Vec<(&str, &str)> = tables.iter().map(|t| (t.as_str(), "id")).collect();
    let left = MemoryCatalog::with_tables(&layout);
    let right = MemoryCatalog::with_tables(&layout);

    // Never read: fills after one event.
    let (tx, _rx) = tokio::sync::mpsc::channel::<ProgressEvent>(1);
    let report = within_deadline(compare(
        Endpoint::new("prod", left),
        Endpoint::new("staging", right),
        "public",
        &tx,
    ))
    .await
    .unwrap();
    assert!(report.is_empty());
}

fn numbered_tables(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("t{i:04}")).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_table_event_reaches_the_sink() {
    let tables = numbered_tables(1000);
    let layout: Vec<(&str, &str)> = tables.iter().map(|t| (t.as_str(), "id")).collect();
    let left = MemoryCatalog::with_tables(&layout);

    let recorder = Recorder::default();
    within_deadline(compare(
        Endpoint::new("prod", left),
        Endpoint::new("staging", MemoryCatalog::default()),
        "public",
        &recorder,
    ))
    .await
    .unwrap();

    let prod = recorder.for_label("prod");
    assert_eq!(prod.len(), 1001);
    assert_eq!(prod[0].kind(), EventKind::Status);
    for (i, (event, table)) in prod[1..].iter().zip(&tables).enumerate() {
        assert_eq!(*event, ProgressEvent::progress("prod", i + 1, 1000, table.as_str()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_after_many_tables_reaches_the_sink() {
    let tables = numbered_tables(300);
    let layout: Vec<(&str, &str)> = tables.iter().map(|t| (t.as_str(), "id")).collect();
    let mut left = MemoryCatalog::with_tables(&layout);
    left.fail_on = Some(CatalogQuery::PrimaryKeys);

    let recorder = Recorder::default();
    let err = within_deadline(compare(
        Endpoint::new("prod", left),
        Endpoint::new("staging", MemoryCatalog::default()),
        "public",
        &recorder,
    ))
    .await
    .unwrap_err();
    assert_eq!(err.side(), Some(Side::Left));

    let prod = recorder.for_label("prod");
    assert_eq!(prod.len(), 302);
    let progress = prod.iter().filter(|e| e.kind() == EventKind::Progress).count();
    assert_eq!(progress, 300);
    assert_eq!(prod.last().map(ProgressEvent::kind), Some(EventKind::Error));
}

#[tokio::test]
async fn empty_schemas_produce_empty_report() {
    let report = within_deadline(compare(
        Endpoint::new("prod", MemoryCatalog::default()),
        Endpoint::new("staging", MemoryCatalog::default()),
        "public",
        &NoProgress,
    ))
    .await
    .unwrap();
    assert!(report.is_empty());
}
