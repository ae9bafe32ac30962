//! Progress reporting for provisioning and transfer
//!
//! The core never configures logging itself. It reports [`LoadEvent`]s to a
//! [`Telemetry`] handle supplied by the caller; [`TracingTelemetry`] turns them
//! into `tracing` records.

use crate::db::Dialect;
use crate::db::schema::SqlType;
use crate::transfer::WriteMode;

/// Events emitted while provisioning and transferring
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    /// Target database exists (created now or already present)
    DatabaseReady {
        dialect: Dialect,
        database: String,
        idempotent: bool,
    },
    /// Database creation failed
    ProvisionFailed {
        dialect: Dialect,
        database: String,
        error: String,
    },
    /// Header of a sheet was read during validation
    SheetValidated { sheet: String, columns: usize },
    /// Header of a sheet differs from the first sheet's
    SheetColumnsDiffer {
        sheet: String,
        expected: Vec<String>,
        found: Vec<String>,
        continuous: bool,
    },
    /// Rows of a sheet are materialized and about to be written
    SheetStarted {
        sheet: String,
        table: String,
        rows: usize,
        chunks: usize,
    },
    /// A sheet appending to an existing table holds values the table's
    /// column type does not store as-is
    ColumnTypeConflict {
        sheet: String,
        table: String,
        column: String,
        table_type: SqlType,
        sheet_type: SqlType,
    },
    /// One chunk was written and acknowledged
    ChunkWritten {
        sheet: String,
        chunk: usize,
        rows: usize,
        table: String,
        mode: WriteMode,
        duration_ms: u64,
    },
    SheetCompleted {
        sheet: String,
        rows: usize,
        chunks: usize,
    },
    /// A chunk write failed; the run stops here
    SheetFailed {
        sheet: String,
        chunk: usize,
        table: String,
        error: String,
    },
    TransferCompleted {
        sheets: usize,
        rows: usize,
        chunks: usize,
        elapsed_ms: u64,
    },
}

/// Sink for [`LoadEvent`]s
pub trait Telemetry: Send + Sync {
    fn record(&self, event: &LoadEvent);
}

/// Reports events through `tracing`
///
/// Milestones and per-chunk progress go out at INFO, the write detail of each
/// chunk at DEBUG and failures at ERROR.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn record(&self, event: &LoadEvent) {
        match event {
            LoadEvent::DatabaseReady {
                dialect,
                database,
                idempotent,
            } => {
                tracing::info!(%dialect, database, idempotent, "Database ready");
            }
            LoadEvent::ProvisionFailed {
                dialect,
                database,
                error,
            } => {
                tracing::error!(%dialect, database, "Database creation failed: {}", error);
            }
            LoadEvent::SheetValidated { sheet, columns } => {
                tracing::debug!(sheet, columns, "Sheet header read");
            }
            LoadEvent::SheetColumnsDiffer {
                sheet,
                expected,
                found,
                continuous: true,
            } => {
                tracing::error!(
                    sheet,
                    ?expected,
                    ?found,
                    "Inconsistent columns detected in sheet '{}' in continuous mode",
                    sheet
                );
            }
            LoadEvent::SheetColumnsDiffer { sheet, found, .. } => {
                tracing::debug!(sheet, ?found, "Sheet columns differ from first sheet");
            }
            LoadEvent::SheetStarted {
                sheet,
                table,
                rows,
                chunks,
            } => {
                tracing::info!(sheet, table, rows, chunks, "Transferring sheet");
            }
            LoadEvent::ColumnTypeConflict {
                sheet,
                table,
                column,
                table_type,
                sheet_type,
            } => {
                tracing::warn!(
                    sheet,
                    table,
                    column,
                    ?table_type,
                    ?sheet_type,
                    "Column '{}' of sheet '{}' holds {:?} values but table '{}' stores {:?}, the database may convert them",
                    column,
                    sheet,
                    sheet_type,
                    table,
                    table_type
                );
            }
            LoadEvent::ChunkWritten {
                sheet,
                chunk,
                rows,
                table,
                mode,
                duration_ms,
            } => {
                tracing::info!(
                    sheet,
                    chunk,
                    rows,
                    "Processing chunk {} of sheet '{}'. Rows: {}",
                    chunk,
                    sheet,
                    rows
                );
                tracing::debug!(
                    sheet,
                    chunk,
                    table,
                    %mode,
                    duration_ms,
                    "Chunk {} of sheet '{}' written to '{}'",
                    chunk,
                    sheet,
                    table
                );
            }
            LoadEvent::SheetCompleted {
                sheet,
                rows,
                chunks,
            } => {
                tracing::info!(sheet, rows, chunks, "Sheet transferred");
            }
            LoadEvent::SheetFailed {
                sheet,
                chunk,
                table,
                error,
            } => {
                tracing::error!(sheet, chunk, table, "Chunk write failed: {}", error);
            }
            LoadEvent::TransferCompleted {
                sheets,
                rows,
                chunks,
                elapsed_ms,
            } => {
                tracing::info!(
                    sheets,
                    rows,
                    chunks,
                    "Transfer completed in {:.2}s",
                    *elapsed_ms as f64 / 1000.0
                );
            }
        }
    }
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub sheets_completed: usize,
    pub chunks_written: usize,
    pub rows_written: usize,
    pub chunk_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &LoadEvent) {
        match event {
            LoadEvent::ChunkWritten {
                rows, duration_ms, ..
            } => {
                self.chunks_written += 1;
                self.rows_written += rows;
                self.chunk_durations_ms.push(*duration_ms);
            }
            LoadEvent::SheetCompleted { .. } => {
                self.sheets_completed += 1;
            }
            _ => {}
        }
    }

    /// Calculate percentile from chunk write durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.chunk_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.chunk_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}

/// Keeps every event for later assertions
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: std::sync::Mutex<Vec<LoadEvent>>,
}

#[cfg(test)]
impl RecordingTelemetry {
    pub fn events(&self) -> Vec<LoadEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `(sheet, chunk, rows, table, mode)` of every written chunk
    pub fn chunks(&self) -> Vec<(String, usize, usize, String, WriteMode)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LoadEvent::ChunkWritten {
                    sheet,
                    chunk,
                    rows,
                    table,
                    mode,
                    ..
                } => Some((sheet, chunk, rows, table, mode)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl Telemetry for RecordingTelemetry {
    fn record(&self, event: &LoadEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
