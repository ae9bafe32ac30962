//! Error taxonomy for a load run.
//!
//! Every variant is fatal to the run. Variants carry the context needed to
//! diagnose a failure without re-running: phase, sheet, chunk, table, dialect
//! and database name where they apply.

use std::fmt;

use thiserror::Error;

use crate::db::Dialect;
use crate::workbook::SheetError;

pub type Result<T, E = LoadError> = std::result::Result<T, E>;

/// The two phases of a transfer run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validate,
    Transfer,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Validate => f.write_str("validation"),
            Phase::Transfer => f.write_str("transfer"),
        }
    }
}

/// Driver-level failure from any of the supported databases
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Mssql(#[from] tiberius::error::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to connect to {dialect} {target}: {source}")]
    Connect {
        dialect: Dialect,
        target: String,
        #[source]
        source: DbError,
    },

    #[error("failed to create database '{database}' on {dialect}: {source}")]
    Provision {
        dialect: Dialect,
        database: String,
        #[source]
        source: DbError,
    },

    #[error("failed to open workbook '{path}': {source}")]
    OpenWorkbook {
        path: String,
        #[source]
        source: SheetError,
    },

    #[error("failed to read sheet '{sheet}' during {phase}: {source}")]
    ReadSheet {
        phase: Phase,
        sheet: String,
        #[source]
        source: SheetError,
    },

    #[error(
        "inconsistent columns detected in sheet '{sheet}' in continuous mode \
         (expected {expected:?}, found {found:?}; offending sheets: {offending:?})"
    )]
    SchemaMismatch {
        sheet: String,
        expected: Vec<String>,
        found: Vec<String>,
        offending: Vec<String>,
    },

    #[error("failed to write chunk {chunk} of sheet '{sheet}' into table '{table}': {source}")]
    Transfer {
        sheet: String,
        chunk: usize,
        table: String,
        #[source]
        source: DbError,
    },
}

impl LoadError {
    /// Sheet the failure is attributed to, if any
    pub fn sheet(&self) -> Option<&str> {
        match self {
            LoadError::ReadSheet { sheet, .. }
            | LoadError::SchemaMismatch { sheet, .. }
            | LoadError::Transfer { sheet, .. } => Some(sheet),
            _ => None,
        }
    }
}
