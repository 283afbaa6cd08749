//! Structural comparison of two [`SchemaSnapshot`]s.
//!
//! The comparison is pure and deterministic. Tables present on only one side
//! are reported by name; tables present on both sides are compared facet by
//! facet, in lexicographic table-name order:
//!
//! - **Columns** by name, then by the full column definition (including
//!   ordinal position).
//! - **Primary keys** as ordered sequences of column names. Reordering the
//!   key columns counts as a difference.
//! - **Indexes** by index name only.
//! - **Foreign keys** by constraint name only.
//!
//! Index and foreign key comparison is existence-only: an index whose
//! columns or uniqueness changed under the same name is not reported.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::report::{
    ColumnDiff, ColumnsDiff, ComparisonReport, NameDiff, PrimaryKeyDiff, TableDiff,
};
use crate::schema::{ColumnInfo, SchemaSnapshot, TableStructure};

impl SchemaSnapshot {
    /// Compare this snapshot (left) against `right`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let report = left.diff(&right);
    /// if report.is_empty() {
    ///     println!("Schemas match!");
    /// }
    /// ```
    pub fn diff(&self, right: &SchemaSnapshot) -> ComparisonReport {
        self.diff_with_progress(right, |_, _, _| {})
    }

    /// Like [`SchemaSnapshot::diff`], calling `on_table(current, total, name)`
    /// for each table present on both sides, in the order they are compared.
    pub fn diff_with_progress<F>(&self, right: &SchemaSnapshot, mut on_table: F) -> ComparisonReport
    where
        F: FnMut(usize, usize, &str),
    {
        let missing_in_left: BTreeSet<String> = right
            .table_names()
            .filter(|name| !self.contains(name))
            .map(str::to_string)
            .collect();
        let missing_in_right: BTreeSet<String> = self
            .table_names()
            .filter(|name| !right.contains(name))
            .map(str::to_string)
            .collect();

        let mut common: Vec<&str> = self
            .table_names()
            .filter(|name| right.contains(name))
            .collect();
        common.sort_unstable();

        let total = common.len();
        let mut structure_diff = BTreeMap::new();
        for (i, name) in common.into_iter().enumerate() {
            on_table(i + 1, total, name);
            let (Some(left_table), Some(right_table)) = (self.table(name), right.table(name))
            else {
                continue;
            };
            if let Some(table_diff) = diff_table(left_table, right_table) {
                structure_diff.insert(name.to_string(), table_diff);
            }
        }

        ComparisonReport {
            missing_in_left,
            missing_in_right,
            structure_diff,
        }
    }
}

/// Diff two tables with the same name. `None` when they match.
fn diff_table(left: &TableStructure, right: &TableStructure) -> Option<TableDiff> {
    let table_diff = TableDiff {
        columns: diff_columns(&left.columns, &right.columns),
        primary_keys: diff_primary_keys(&left.primary_keys, &right.primary_keys),
        indexes: diff_names(left.index_names(), right.index_names()),
        foreign_keys: diff_names(left.foreign_key_names(), right.foreign_key_names()),
    };
    (!table_diff.is_empty()).then_some(table_diff)
}

fn diff_columns(left: &[ColumnInfo], right: &[ColumnInfo]) -> Option<ColumnsDiff> {
    let left_by_name: HashMap<&str, &ColumnInfo> =
        left.iter().map(|c| (c.name.as_str(), c)).collect();
    let right_by_name: HashMap<&str, &ColumnInfo> =
        right.iter().map(|c| (c.name.as_str(), c)).collect();

    let missing_in_left = sorted_difference(&right_by_name, &left_by_name);
    let missing_in_right = sorted_difference(&left_by_name, &right_by_name);

    let differences: BTreeMap<String, ColumnDiff> = left_by_name
        .iter()
        .filter_map(|(name, left_col)| {
            let right_col = right_by_name.get(name)?;
            (left_col != right_col).then(|| {
                (
                    name.to_string(),
                    ColumnDiff {
                        left: (*left_col).clone(),
                        right: (*right_col).clone(),
                    },
                )
            })
        })
        .collect();

    let columns = ColumnsDiff {
        missing_in_left,
        missing_in_right,
        differences,
    };
    (!columns.is_empty()).then_some(columns)
}

fn diff_primary_keys(left: &[String], right: &[String]) -> Option<PrimaryKeyDiff> {
    (left != right).then(|| PrimaryKeyDiff {
        left: left.to_vec(),
        right: right.to_vec(),
    })
}

fn diff_names<'a>(
    left: impl IntoIterator<Item = &'a str>,
    right: impl IntoIterator<Item = &'a str>,
) -> Option<NameDiff> {
    let left: BTreeSet<&str> = left.into_iter().collect();
    let right: BTreeSet<&str> = right.into_iter().collect();

    let names = NameDiff {
        missing_in_left: right.difference(&left).map(|s| s.to_string()).collect(),
        missing_in_right: left.difference(&right).map(|s| s.to_string()).collect(),
    };
    (!names.is_empty()).then_some(names)
}

/// Keys of `names` that are not keys of `other`, sorted.
fn sorted_difference<V>(names: &HashMap<&str, V>, other: &HashMap<&str, V>) -> Vec<String> {
    let mut missing: Vec<String> = names
        .keys()
        .filter(|name| !other.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    missing.sort_unstable();
    missing
}
