// Public API - the runner plus the defaults the CLI builds on
pub mod runner;

pub use config::{CONTINUOUS_TABLE_NAME, DEFAULT_CHUNK_SIZE, DEFAULT_DATA_DIR, DEFAULT_LOG_FILE};

// Internal modules - organized by subsystem
mod config;
mod db;
mod error;
mod telemetry;
mod transfer;
mod workbook;
