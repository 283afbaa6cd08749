//! The result of a comparison, and its human-readable rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::ColumnInfo;

/// Every structural difference between two snapshots.
///
/// "Left" and "right" refer to the two databases, in the order they were
/// passed to the comparison. An empty report means no differences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Tables that only the right database has.
    pub missing_in_left: BTreeSet<String>,
    /// Tables that only the left database has.
    pub missing_in_right: BTreeSet<String>,
    /// Tables present on both sides whose structure differs.
    pub structure_diff: BTreeMap<String, TableDiff>,
}

impl ComparisonReport {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.missing_in_left.is_empty()
            && self.missing_in_right.is_empty()
            && self.structure_diff.is_empty()
    }

    /// Number of tables mentioned anywhere in the report.
    pub fn table_count(&self) -> usize {
        self.missing_in_left.len() + self.missing_in_right.len() + self.structure_diff.len()
    }

    /// Render the report for humans, naming each side by its label.
    pub fn render<'a>(&'a self, left_label: &'a str, right_label: &'a str) -> Rendered<'a> {
        Rendered {
            report: self,
            left: left_label,
            right: right_label,
        }
    }
}

/// Differences within one table. Absent parts did not differ.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<ColumnsDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_keys: Option<PrimaryKeyDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexes: Option<NameDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_keys: Option<NameDiff>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.columns.is_none()
            && self.primary_keys.is_none()
            && self.indexes.is_none()
            && self.foreign_keys.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnsDiff {
    /// Column names only the right table has, sorted.
    pub missing_in_left: Vec<String>,
    /// Column names only the left table has, sorted.
    pub missing_in_right: Vec<String>,
    /// Columns on both sides whose definitions differ.
    pub differences: BTreeMap<String, ColumnDiff>,
}

impl ColumnsDiff {
    pub fn is_empty(&self) -> bool {
        self.missing_in_left.is_empty()
            && self.missing_in_right.is_empty()
            && self.differences.is_empty()
    }
}

/// Both definitions of a column that differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDiff {
    pub left: ColumnInfo,
    pub right: ColumnInfo,
}

impl ColumnDiff {
    /// The attributes that differ, derived from both definitions.
    pub fn changes(&self) -> Vec<AttributeChange> {
        let (l, r) = (&self.left, &self.right);
        let mut changes = Vec::new();
        let mut check = |attribute: ColumnAttribute, left: String, right: String| {
            if left != right {
                changes.push(AttributeChange {
                    attribute,
                    left,
                    right,
                });
            }
        };

        check(
            ColumnAttribute::DataType,
            l.data_type.clone(),
            r.data_type.clone(),
        );
        check(
            ColumnAttribute::UdtName,
            l.udt_name.clone(),
            r.udt_name.clone(),
        );
        check(
            ColumnAttribute::MaxLength,
            show_opt(l.max_length),
            show_opt(r.max_length),
        );
        check(
            ColumnAttribute::NumericPrecision,
            show_opt(l.numeric_precision),
            show_opt(r.numeric_precision),
        );
        check(
            ColumnAttribute::NumericScale,
            show_opt(l.numeric_scale),
            show_opt(r.numeric_scale),
        );
        check(
            ColumnAttribute::DatetimePrecision,
            show_opt(l.datetime_precision),
            show_opt(r.datetime_precision),
        );
        check(
            ColumnAttribute::Nullable,
            l.nullable.to_string(),
            r.nullable.to_string(),
        );
        check(
            ColumnAttribute::OrdinalPosition,
            l.ordinal_position.to_string(),
            r.ordinal_position.to_string(),
        );

        changes
    }
}

fn show_opt(value: Option<i32>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}

/// A column attribute that can differ between two definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAttribute {
    DataType,
    UdtName,
    MaxLength,
    NumericPrecision,
    NumericScale,
    DatetimePrecision,
    Nullable,
    OrdinalPosition,
}

impl fmt::Display for ColumnAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnAttribute::DataType => "data type",
            ColumnAttribute::UdtName => "udt name",
            ColumnAttribute::MaxLength => "max length",
            ColumnAttribute::NumericPrecision => "precision",
            ColumnAttribute::NumericScale => "scale",
            ColumnAttribute::DatetimePrecision => "datetime precision",
            ColumnAttribute::Nullable => "nullable",
            ColumnAttribute::OrdinalPosition => "position",
        };
        f.write_str(name)
    }
}

/// One attribute-level delta, with both values already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    pub attribute: ColumnAttribute,
    pub left: String,
    pub right: String,
}

impl fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.attribute, self.left, self.right)
    }
}

/// Primary keys that differ, as ordered column name sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyDiff {
    pub left: Vec<String>,
    pub right: Vec<String>,
}

/// Index or foreign key names present on only one side, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameDiff {
    pub missing_in_left: Vec<String>,
    pub missing_in_right: Vec<String>,
}

impl NameDiff {
    pub fn is_empty(&self) -> bool {
        self.missing_in_left.is_empty() && self.missing_in_right.is_empty()
    }
}

/// A report paired with the labels of both sides, ready to display.
pub struct Rendered<'a> {
    report: &'a ComparisonReport,
    left: &'a str,
    right: &'a str,
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        if report.is_empty() {
            return writeln!(f, "No differences found.");
        }

        self.write_missing(
            f,
            "",
            "Tables",
            report.missing_in_left.iter(),
            report.missing_in_right.iter(),
        )?;
        if !report.missing_in_left.is_empty() || !report.missing_in_right.is_empty() {
            writeln!(f)?;
        }

        if report.structure_diff.is_empty() {
            return Ok(());
        }

        writeln!(f, "Structure differences:")?;
        for (table, diff) in &report.structure_diff {
            writeln!(f)?;
            writeln!(f, "Table {table}:")?;

            if let Some(columns) = &diff.columns {
                self.write_missing(
                    f,
                    "  ",
                    "Columns",
                    columns.missing_in_left.iter(),
                    columns.missing_in_right.iter(),
                )?;
                if !columns.differences.is_empty() {
                    writeln!(f, "  Column definition differences:")?;
                    for (name, column) in &columns.differences {
                        writeln!(f, "    {name}:")?;
                        for change in column.changes() {
                            writeln!(f, "      - {change}")?;
                        }
                    }
                }
            }

            if let Some(pk) = &diff.primary_keys {
                writeln!(f, "  Primary key differences:")?;
                writeln!(f, "    {}: {}", self.left, key_list(&pk.left))?;
                writeln!(f, "    {}: {}", self.right, key_list(&pk.right))?;
            }

            if let Some(indexes) = &diff.indexes {
                self.write_missing(
                    f,
                    "  ",
                    "Indexes",
                    indexes.missing_in_left.iter(),
                    indexes.missing_in_right.iter(),
                )?;
            }

            if let Some(fks) = &diff.foreign_keys {
                self.write_missing(
                    f,
                    "  ",
                    "Foreign keys",
                    fks.missing_in_left.iter(),
                    fks.missing_in_right.iter(),
                )?;
            }
        }
        Ok(())
    }
}

impl Rendered<'_> {
    fn write_missing<'i>(
        &self,
        f: &mut fmt::Formatter<'_>,
        indent: &str,
        what: &str,
        in_left: impl ExactSizeIterator<Item = &'i String>,
        in_right: impl ExactSizeIterator<Item = &'i String>,
    ) -> fmt::Result {
        write_list(f, indent, &format!("{what} missing in {}", self.left), in_left)?;
        write_list(f, indent, &format!("{what} missing in {}", self.right), in_right)
    }
}

/// Write `title:` followed by one `- item` line per item. Nothing if empty.
fn write_list<'a>(
    f: &mut fmt::Formatter<'_>,
    indent: &str,
    title: &str,
    items: impl ExactSizeIterator<Item = &'a String>,
) -> fmt::Result {
    if items.len() == 0 {
        return Ok(());
    }
    writeln!(f, "{indent}{title}:")?;
    for item in items {
        writeln!(f, "{indent}  - {item}")?;
    }
    Ok(())
}

fn key_list(columns: &[String]) -> String {
    if columns.is_empty() {
        "(none)".to_string()
    } else {
        columns.join(", ")
    }
}
