//! Configuration constants for the workbook loader
//!
//! This module centralizes all tunable parameters and defaults used throughout
//! the application.

use std::time::Duration;

// ============================================================================
// Connection Configuration
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

// ============================================================================
// Transfer Configuration
// ============================================================================

/// Maximum number of rows written by a single chunk
///
/// Bounds the memory held by one write and the amount of work lost when a
/// write fails. Every chunk is acknowledged by the destination before the
/// next one is prepared.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Destination table used when all sheets are loaded as one continuous table
pub const CONTINUOUS_TABLE_NAME: &str = "continuous_table";

/// Upper bound on rows per INSERT statement, independent of dialect
///
/// SQL Server rejects row value constructors with more than 1000 rows.
pub const MAX_ROWS_PER_INSERT: usize = 1000;

// ============================================================================
// Bind Parameter Limits
// ============================================================================

pub const MYSQL_MAX_BIND_PARAMS: usize = 65_535;

pub const POSTGRES_MAX_BIND_PARAMS: usize = 65_535;

/// SQL Server allows 2100 parameters per RPC call
pub const MSSQL_MAX_BIND_PARAMS: usize = 2_100;

#[cfg(test)]
pub const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

// ============================================================================
// CLI Defaults
// ============================================================================

/// Directory that relative workbook paths are resolved against
pub const DEFAULT_DATA_DIR: &str = "./DATA";

/// Log file, truncated at the start of every run
pub const DEFAULT_LOG_FILE: &str = "./logs/script_process.log";
