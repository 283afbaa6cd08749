//! Canonical per-table structure, as read from a database catalog.
//!
//! A [`SchemaSnapshot`] is built once by the fetcher and never mutated
//! afterwards. Names are kept byte-exact as the catalog returned them.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// One column of a table, as described by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name. Unique within a table.
    pub name: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// SQL data type (`integer`, `character varying`, ...).
    pub data_type: String,
    /// Declared maximum length for character types.
    pub max_length: Option<i32>,
    /// Precision for numeric types.
    pub numeric_precision: Option<i32>,
    /// Scale for exact numeric types.
    pub numeric_scale: Option<i32>,
    /// Fractional seconds precision for date/time types.
    pub datetime_precision: Option<i32>,
    /// Underlying type name (`int4`, `varchar`, `_text`, ...).
    pub udt_name: String,
    /// 1-based position of the column in the table.
    pub ordinal_position: i32,
}

/// One column of an index. Composite indexes produce one entry per column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexEntry {
    pub index_name: String,
    pub column_name: String,
    pub is_unique: bool,
}

/// One column of a foreign key constraint and the column it references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyEntry {
    pub constraint_name: String,
    pub column_name: String,
    pub foreign_table_name: String,
    pub foreign_column_name: String,
}

/// The structure of a single table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStructure {
    /// Columns in catalog order (by column name).
    pub columns: Vec<ColumnInfo>,
    /// Primary key column names, in key ordinal order.
    pub primary_keys: Vec<String>,
    /// Raw index entries, one per indexed column.
    pub indexes: Vec<IndexEntry>,
    /// Raw foreign key entries, one per constrained column.
    pub foreign_keys: Vec<ForeignKeyEntry>,
}

impl TableStructure {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Distinct index names, in first-seen order.
    pub fn index_names(&self) -> IndexSet<&str> {
        self.indexes.iter().map(|idx| idx.index_name.as_str()).collect()
    }

    /// Distinct foreign key constraint names, in first-seen order.
    pub fn foreign_key_names(&self) -> IndexSet<&str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.constraint_name.as_str())
            .collect()
    }
}

/// Every table of one schema at fetch time, keyed by table name.
///
/// Tables appear in the order the column scan discovered them. A table
/// with no columns cannot be present: existence is driven by the column
/// scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: IndexMap<String, TableStructure>,
}

impl SchemaSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableStructure> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl FromIterator<(String, TableStructure)> for SchemaSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, TableStructure)>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(name: &str, column: &str) -> IndexEntry {
        IndexEntry {
            index_name: name.to_string(),
            column_name: column.to_string(),
            is_unique: false,
        }
    }

    #[test]
    fn index_names_are_deduplicated() {
        let table = TableStructure {
            indexes: vec![
                index("idx_a", "x"),
                index("idx_a", "y"),
                index("idx_b", "x"),
            ],
            ..Default::default()
        };
        let names: Vec<_> = table.index_names().into_iter().collect();
        assert_eq!(names, vec!["idx_a", "idx_b"]);
    }

    #[test]
    fn foreign_key_names_are_deduplicated_in_first_seen_order() {
        let fk = |name: &str, column: &str| ForeignKeyEntry {
            constraint_name: name.to_string(),
            column_name: column.to_string(),
            foreign_table_name: "accounts".to_string(),
            foreign_column_name: column.to_string(),
        };
        let table = TableStructure {
            foreign_keys: vec![
                fk("fk_owner", "tenant_id"),
                fk("fk_account", "account_id"),
                fk("fk_owner", "owner_id"),
            ],
            ..Default::default()
        };
        let names: Vec<_> = table.foreign_key_names().into_iter().collect();
        assert_eq!(names, vec!["fk_owner", "fk_account"]);
    }

    #[test]
    fn many_index_columns_collapse_to_their_names() {
        let indexes: Vec<IndexEntry> = (0..5000)
            .map(|i| index(&format!("idx_{}", i % 50), &format!("c{i}")))
            .collect();
        let table = TableStructure {
            indexes,
            ..Default::default()
        };
        let names = table.index_names();
        assert_eq!(names.len(), 50);
        assert_eq!(names.first(), Some(&"idx_0"));
        assert_eq!(names.last(), Some(&"idx_49"));
    }

    #[test]
    fn snapshot_keeps_discovery_order() {
        let snapshot: SchemaSnapshot = ["orders", "accounts"]
            .into_iter()
            .map(|name| (name.to_string(), TableStructure::default()))
            .collect();
        let names: Vec<_> = snapshot.table_names().collect();
        assert_eq!(names, vec!["orders", "accounts"]);
        assert!(snapshot.contains("accounts"));
        assert!(!snapshot.contains("Accounts"));
    }
}
