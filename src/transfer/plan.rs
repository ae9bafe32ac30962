use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use crate::db::TableSchema;

/// How a chunk lands in its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Drop and recreate the table, then insert
    Replace,
    /// Insert into the existing table
    Append,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Replace => f.write_str("replace"),
            WriteMode::Append => f.write_str("append"),
        }
    }
}

/// Decides target table and write mode for every chunk of a run
///
/// The first chunk written to a table in a run replaces it and fixes its
/// schema; every later chunk for that table appends against that schema.
#[derive(Debug)]
pub struct WritePlanner {
    continuous_table: Option<String>,
    tables: HashMap<String, TableSchema>,
}

impl WritePlanner {
    /// One table per sheet
    pub fn independent() -> Self {
        Self {
            continuous_table: None,
            tables: HashMap::new(),
        }
    }

    /// Every sheet into `table`
    pub fn continuous(table: impl Into<String>) -> Self {
        Self {
            continuous_table: Some(table.into()),
            tables: HashMap::new(),
        }
    }

    pub fn table_for<'a>(&'a self, sheet: &'a str) -> &'a str {
        self.continuous_table.as_deref().unwrap_or(sheet)
    }

    /// Schema fixed for `table` by an earlier write in this run
    pub fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table)
    }

    /// Write mode and schema for the next chunk into `table`
    ///
    /// `infer` runs only for the first chunk of a table.
    pub fn next_write(
        &mut self,
        table: &str,
        infer: impl FnOnce() -> TableSchema,
    ) -> (WriteMode, &TableSchema) {
        match self.tables.entry(table.to_string()) {
            Entry::Occupied(entry) => (WriteMode::Append, entry.into_mut()),
            Entry::Vacant(entry) => (WriteMode::Replace, entry.insert(infer())),
        }
    }
}
