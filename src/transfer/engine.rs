use std::time::{Duration, Instant};

use derive_builder::Builder;

use super::plan::WritePlanner;
use super::sink::TableSink;
use crate::config::{CONTINUOUS_TABLE_NAME, DEFAULT_CHUNK_SIZE};
use crate::db::TableSchema;
use crate::error::{LoadError, Phase, Result};
use crate::telemetry::{LoadEvent, ProgressStats, Telemetry};
use crate::workbook::WorkbookSource;

/// Settings for one transfer run
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct TransferConfig {
    /// Append every sheet into one table instead of one table per sheet
    #[builder(default)]
    pub continuous: bool,
    /// Upper bound on rows per chunk
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    pub chunk_size: usize,
    #[builder(setter(into), default = "CONTINUOUS_TABLE_NAME.to_string()")]
    pub continuous_table: String,
}

impl TransferConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.chunk_size == Some(0) {
            return Err("chunk size must be at least 1".to_string());
        }
        if let Some(table) = &self.continuous_table
            && table.trim().is_empty()
        {
            return Err("continuous table name must not be empty".to_string());
        }
        Ok(())
    }
}

/// Totals of a completed transfer
#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub sheets: usize,
    pub chunks: usize,
    pub rows: usize,
    /// Wall-clock time of the transfer phase
    pub elapsed: Duration,
    pub stats: ProgressStats,
}

impl TransferSummary {
    /// p50, p90, p99 chunk write latency in milliseconds
    pub fn percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        self.stats.get_percentiles()
    }
}

/// Moves every sheet of a workbook into database tables
///
/// A run has two phases. Validation reads only sheet headers and compares
/// each against the first sheet's; in continuous mode any difference stops
/// the run before anything is written. Transfer then materializes one sheet
/// at a time and writes it in chunks of at most `chunk_size` rows, in sheet
/// order and row order.
pub struct TransferEngine<'a> {
    config: TransferConfig,
    telemetry: &'a dyn Telemetry,
}

impl<'a> TransferEngine<'a> {
    pub fn new(config: TransferConfig, telemetry: &'a dyn Telemetry) -> Self {
        Self { config, telemetry }
    }

    /// Validate, then transfer
    pub async fn run(
        &self,
        workbook: &mut dyn WorkbookSource,
        sink: &mut dyn TableSink,
    ) -> Result<TransferSummary> {
        let sheets = self.validate(workbook)?;
        self.transfer(workbook, sink, &sheets).await
    }

    /// Read every sheet header and check column signatures
    ///
    /// Returns the sheet names in workbook order. In continuous mode every
    /// offending sheet is reported before the error, which names the first.
    pub fn validate(&self, workbook: &mut dyn WorkbookSource) -> Result<Vec<String>> {
        let sheets = workbook.sheet_names();
        let mut reference: Option<Vec<String>> = None;
        let mut offending: Vec<(String, Vec<String>)> = Vec::new();

        for sheet in &sheets {
            let header = workbook
                .read_header(sheet)
                .map_err(|source| LoadError::ReadSheet {
                    phase: Phase::Validate,
                    sheet: sheet.clone(),
                    source,
                })?;

            self.telemetry.record(&LoadEvent::SheetValidated {
                sheet: sheet.clone(),
                columns: header.len(),
            });

            let Some(expected) = reference.as_ref() else {
                reference = Some(header);
                continue;
            };
            if *expected != header {
                self.telemetry.record(&LoadEvent::SheetColumnsDiffer {
                    sheet: sheet.clone(),
                    expected: expected.clone(),
                    found: header.clone(),
                    continuous: self.config.continuous,
                });
                if self.config.continuous {
                    offending.push((sheet.clone(), header));
                }
            }
        }

        if let Some((sheet, found)) = offending.first() {
            return Err(LoadError::SchemaMismatch {
                sheet: sheet.clone(),
                expected: reference.unwrap_or_default(),
                found: found.clone(),
                offending: offending.iter().map(|(name, _)| name.clone()).collect(),
            });
        }

        Ok(sheets)
    }

    /// Write `sheets` in order, chunk by chunk
    pub async fn transfer(
        &self,
        workbook: &mut dyn WorkbookSource,
        sink: &mut dyn TableSink,
        sheets: &[String],
    ) -> Result<TransferSummary> {
        let start_time = Instant::now();
        let mut planner = if self.config.continuous {
            WritePlanner::continuous(self.config.continuous_table.clone())
        } else {
            WritePlanner::independent()
        };
        let mut stats = ProgressStats::new();

        for sheet in sheets {
            let data = workbook
                .read_sheet(sheet)
                .map_err(|source| LoadError::ReadSheet {
                    phase: Phase::Transfer,
                    sheet: sheet.clone(),
                    source,
                })?;
            let table = planner.table_for(&data.name).to_string();
            let chunk_count = data.rows.len().div_ceil(self.config.chunk_size);

            self.record(
                &mut stats,
                LoadEvent::SheetStarted {
                    sheet: sheet.clone(),
                    table: table.clone(),
                    rows: data.rows.len(),
                    chunks: chunk_count,
                },
            );

            if let Some(schema) = planner.schema(&table) {
                for (column, table_type, sheet_type) in schema.unfit_columns(&data.rows) {
                    self.record(
                        &mut stats,
                        LoadEvent::ColumnTypeConflict {
                            sheet: sheet.clone(),
                            table: table.clone(),
                            column,
                            table_type,
                            sheet_type,
                        },
                    );
                }
            }

            for (idx, rows) in data.rows.chunks(self.config.chunk_size).enumerate() {
                let chunk = idx + 1;
                let (mode, schema) =
                    planner.next_write(&table, || TableSchema::infer(&data.columns, &data.rows));

                let chunk_start = Instant::now();
                if let Err(source) = sink.write_chunk(&table, schema, rows, mode).await {
                    self.record(
                        &mut stats,
                        LoadEvent::SheetFailed {
                            sheet: sheet.clone(),
                            chunk,
                            table: table.clone(),
                            error: source.to_string(),
                        },
                    );
                    return Err(LoadError::Transfer {
                        sheet: sheet.clone(),
                        chunk,
                        table,
                        source,
                    });
                }

                self.record(
                    &mut stats,
                    LoadEvent::ChunkWritten {
                        sheet: sheet.clone(),
                        chunk,
                        rows: rows.len(),
                        table: table.clone(),
                        mode,
                        duration_ms: chunk_start.elapsed().as_millis() as u64,
                    },
                );
            }

            self.record(
                &mut stats,
                LoadEvent::SheetCompleted {
                    sheet: sheet.clone(),
                    rows: data.rows.len(),
                    chunks: chunk_count,
                },
            );
        }

        let elapsed = start_time.elapsed();
        let summary = TransferSummary {
            sheets: stats.sheets_completed,
            chunks: stats.chunks_written,
            rows: stats.rows_written,
            elapsed,
            stats,
        };
        self.telemetry.record(&LoadEvent::TransferCompleted {
            sheets: summary.sheets,
            rows: summary.rows,
            chunks: summary.chunks,
            elapsed_ms: elapsed.as_millis() as u64,
        });

        Ok(summary)
    }

    fn record(&self, stats: &mut ProgressStats, event: LoadEvent) {
        stats.update(&event);
        self.telemetry.record(&event);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::db::schema::SqlType;
    use crate::error::DbError;
    use crate::telemetry::RecordingTelemetry;
    use crate::transfer::WriteMode;
    use crate::workbook::{CellValue, MemoryWorkbook, Row};

    /// Keeps every chunk it is handed, optionally failing one of them
    #[derive(Default)]
    struct RecordingSink {
        writes: Vec<(String, WriteMode, Vec<Row>)>,
        schemas: Vec<TableSchema>,
        fail_on_write: Option<usize>,
    }

    impl RecordingSink {
        fn failing_on(write: usize) -> Self {
            Self {
                fail_on_write: Some(write),
                ..Default::default()
            }
        }

        fn rows_in(&self, table: &str) -> Vec<Row> {
            self.writes
                .iter()
                .filter(|(t, _, _)| t == table)
                .flat_map(|(_, _, rows)| rows.iter().cloned())
                .collect()
        }

        fn plan(&self) -> Vec<(String, WriteMode, usize)> {
            self.writes
                .iter()
                .map(|(table, mode, rows)| (table.clone(), *mode, rows.len()))
                .collect()
        }
    }

    #[async_trait]
    impl TableSink for RecordingSink {
        async fn write_chunk(
            &mut self,
            table: &str,
            schema: &TableSchema,
            rows: &[Row],
            mode: WriteMode,
        ) -> std::result::Result<(), DbError> {
            if self.fail_on_write == Some(self.writes.len() + 1) {
                return Err(DbError::Io(std::io::Error::other("connection reset")));
            }
            self.writes.push((table.to_string(), mode, rows.to_vec()));
            self.schemas.push(schema.clone());
            Ok(())
        }
    }

    fn numbered_rows(prefix: &str, count: i64) -> Vec<Row> {
        (0..count)
            .map(|i| vec![CellValue::Int(i), CellValue::Text(format!("{}-{}", prefix, i))])
            .collect()
    }

    fn config(continuous: bool, chunk_size: usize) -> TransferConfig {
        TransferConfigBuilder::default()
            .continuous(continuous)
            .chunk_size(chunk_size)
            .build()
            .unwrap()
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config = TransferConfigBuilder::default().build().unwrap();
        assert!(!config.continuous);
        assert_eq!(config.chunk_size, 10_000);
        assert_eq!(config.continuous_table, "continuous_table");

        assert!(TransferConfigBuilder::default().chunk_size(0).build().is_err());
        assert!(
            TransferConfigBuilder::default()
                .continuous_table(" ")
                .build()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_validation_fails_before_any_write() {
        let mut workbook = MemoryWorkbook::default()
            .with_sheet("S1", &["id", "name"], numbered_rows("s1", 3))
            .with_sheet("S2", &["id", "label"], numbered_rows("s2", 3))
            .with_sheet("S3", &["id", "name"], numbered_rows("s3", 3));
        let mut sink = RecordingSink::default();
        let telemetry = RecordingTelemetry::default();

        let result = TransferEngine::new(config(true, 2), &telemetry)
            .run(&mut workbook, &mut sink)
            .await;

        match result {
            Err(LoadError::SchemaMismatch {
                sheet,
                expected,
                found,
                offending,
            }) => {
                assert_eq!(sheet, "S2");
                assert_eq!(expected, vec!["id", "name"]);
                assert_eq!(found, vec!["id", "label"]);
                assert_eq!(offending, vec!["S2"]);
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
        assert!(sink.writes.is_empty());
        assert!(workbook.materialized.is_empty());
    }

    #[tokio::test]
    async fn test_validation_reports_every_offending_sheet() {
        let mut workbook = MemoryWorkbook::default()
            .with_sheet("S1", &["id"], vec![])
            .with_sheet("S2", &["id", "extra"], vec![])
            .with_sheet("S3", &["id"], vec![])
            .with_sheet("S4", &["other"], vec![]);
        let telemetry = RecordingTelemetry::default();

        let err = TransferEngine::new(config(true, 10), &telemetry)
            .validate(&mut workbook)
            .unwrap_err();

        assert!(matches!(
            &err,
            LoadError::SchemaMismatch { sheet, offending, .. }
                if sheet == "S2" && *offending == vec!["S2", "S4"]
        ));
        let reported: Vec<_> = telemetry
            .events()
            .into_iter()
            .filter_map(|event| match event {
                LoadEvent::SheetColumnsDiffer {
                    sheet,
                    continuous: true,
                    ..
                } => Some(sheet),
                _ => None,
            })
            .collect();
        assert_eq!(reported, vec!["S2", "S4"]);
    }

    #[tokio::test]
    async fn test_independent_mode_allows_differing_columns() {
        let mut workbook = MemoryWorkbook::default()
            .with_sheet("A", &["id", "name"], numbered_rows("a", 2))
            .with_sheet("B", &["code"], vec![vec![CellValue::Bool(true)]]);
        let mut sink = RecordingSink::default();
        let telemetry = RecordingTelemetry::default();

        TransferEngine::new(config(false, 10), &telemetry)
            .run(&mut workbook, &mut sink)
            .await
            .unwrap();

        assert_eq!(
            sink.plan(),
            vec![
                ("A".to_string(), WriteMode::Replace, 2),
                ("B".to_string(), WriteMode::Replace, 1),
            ]
        );
        assert_eq!(sink.schemas[1].columns[0].name, "code");
    }

    #[tokio::test]
    async fn test_independent_mode_chunks_each_sheet() {
        let mut workbook = MemoryWorkbook::default()
            .with_sheet("A", &["id", "name"], numbered_rows("a", 25_000))
            .with_sheet("B", &["id", "name"], numbered_rows("b", 25_000));
        let mut sink = RecordingSink::default();
        let telemetry = RecordingTelemetry::default();

        let summary = TransferEngine::new(config(false, 10_000), &telemetry)
            .run(&mut workbook, &mut sink)
            .await
            .unwrap();

        let expected: Vec<_> = ["A", "B"]
            .iter()
            .flat_map(|table| {
                [
                    (table.to_string(), WriteMode::Replace, 10_000),
                    (table.to_string(), WriteMode::Append, 10_000),
                    (table.to_string(), WriteMode::Append, 5_000),
                ]
            })
            .collect();
        assert_eq!(sink.plan(), expected);
        assert_eq!(sink.rows_in("A"), numbered_rows("a", 25_000));
        assert_eq!(sink.rows_in("B"), numbered_rows("b", 25_000));

        assert_eq!(summary.sheets, 2);
        assert_eq!(summary.chunks, 6);
        assert_eq!(summary.rows, 50_000);
        assert!(summary.percentiles().0.is_some());

        let chunk_indices: Vec<_> = telemetry
            .chunks()
            .into_iter()
            .map(|(sheet, chunk, rows, _, _)| (sheet, chunk, rows))
            .collect();
        assert_eq!(
            chunk_indices,
            vec![
                ("A".to_string(), 1, 10_000),
                ("A".to_string(), 2, 10_000),
                ("A".to_string(), 3, 5_000),
                ("B".to_string(), 1, 10_000),
                ("B".to_string(), 2, 10_000),
                ("B".to_string(), 3, 5_000),
            ]
        );
    }

    #[tokio::test]
    async fn test_continuous_mode_appends_in_sheet_order() {
        let mut workbook = MemoryWorkbook::default()
            .with_sheet("A", &["id", "name"], numbered_rows("a", 25_000))
            .with_sheet("B", &["id", "name"], numbered_rows("b", 25_000));
        let mut sink = RecordingSink::default();
        let telemetry = RecordingTelemetry::default();

        TransferEngine::new(config(true, 10_000), &telemetry)
            .run(&mut workbook, &mut sink)
            .await
            .unwrap();

        let modes: Vec<_> = sink.writes.iter().map(|(_, mode, _)| *mode).collect();
        assert_eq!(modes[0], WriteMode::Replace);
        assert!(modes[1..].iter().all(|mode| *mode == WriteMode::Append));
        assert_eq!(modes.len(), 6);

        let mut expected = numbered_rows("a", 25_000);
        expected.extend(numbered_rows("b", 25_000));
        assert_eq!(sink.rows_in("continuous_table"), expected);

        // Schema is fixed by sheet A and reused for sheet B
        assert!(sink.schemas.iter().all(|schema| *schema == sink.schemas[0]));
    }

    #[tokio::test]
    async fn test_continuous_mode_reports_wider_values_in_later_sheets() {
        let mut workbook = MemoryWorkbook::default()
            .with_sheet("A", &["id", "name"], numbered_rows("a", 2))
            .with_sheet(
                "B",
                &["id", "name"],
                vec![vec![CellValue::Float(2.5), CellValue::Text("b".to_string())]],
            );
        let mut sink = RecordingSink::default();
        let telemetry = RecordingTelemetry::default();

        TransferEngine::new(config(true, 10), &telemetry)
            .run(&mut workbook, &mut sink)
            .await
            .unwrap();

        let conflicts: Vec<_> = telemetry
            .events()
            .into_iter()
            .filter(|event| matches!(event, LoadEvent::ColumnTypeConflict { .. }))
            .collect();
        assert_eq!(
            conflicts,
            vec![LoadEvent::ColumnTypeConflict {
                sheet: "B".to_string(),
                table: "continuous_table".to_string(),
                column: "id".to_string(),
                table_type: SqlType::BigInt,
                sheet_type: SqlType::Double,
            }]
        );
        // The table keeps the schema fixed by sheet A
        assert_eq!(sink.schemas[1], sink.schemas[0]);
        assert_eq!(sink.plan().len(), 2);
    }

    #[tokio::test]
    async fn test_chunk_size_divides_rows_evenly() {
        let mut workbook =
            MemoryWorkbook::default().with_sheet("A", &["id", "name"], numbered_rows("a", 20));
        let mut sink = RecordingSink::default();
        let telemetry = RecordingTelemetry::default();

        TransferEngine::new(config(false, 10), &telemetry)
            .run(&mut workbook, &mut sink)
            .await
            .unwrap();

        let sizes: Vec<_> = sink.plan().into_iter().map(|(_, _, rows)| rows).collect();
        assert_eq!(sizes, vec![10, 10]);
    }

    #[tokio::test]
    async fn test_empty_sheet_writes_nothing() {
        let mut workbook = MemoryWorkbook::default()
            .with_sheet("Empty", &["id", "name"], vec![])
            .with_sheet("Full", &["id", "name"], numbered_rows("f", 1));
        let mut sink = RecordingSink::default();
        let telemetry = RecordingTelemetry::default();

        let summary = TransferEngine::new(config(false, 10), &telemetry)
            .run(&mut workbook, &mut sink)
            .await
            .unwrap();

        assert_eq!(sink.plan(), vec![("Full".to_string(), WriteMode::Replace, 1)]);
        assert_eq!(summary.sheets, 2);
        assert_eq!(summary.rows, 1);
    }

    #[tokio::test]
    async fn test_failed_chunk_stops_the_run() {
        let mut workbook = MemoryWorkbook::default()
            .with_sheet("A", &["id", "name"], numbered_rows("a", 30))
            .with_sheet("B", &["id", "name"], numbered_rows("b", 30));
        let mut sink = RecordingSink::failing_on(2);
        let telemetry = RecordingTelemetry::default();

        let err = TransferEngine::new(config(false, 10), &telemetry)
            .run(&mut workbook, &mut sink)
            .await
            .unwrap_err();

        match &err {
            LoadError::Transfer {
                sheet,
                chunk,
                table,
                ..
            } => {
                assert_eq!(sheet, "A");
                assert_eq!(*chunk, 2);
                assert_eq!(table, "A");
            }
            other => panic!("expected transfer error, got {:?}", other),
        }
        assert!(err.to_string().contains("connection reset"));

        // The first chunk stays written and sheet B is never read
        assert_eq!(sink.writes.len(), 1);
        assert_eq!(workbook.materialized, vec!["A"]);
        assert!(
            telemetry
                .events()
                .iter()
                .any(|event| matches!(event, LoadEvent::SheetFailed { chunk: 2, .. }))
        );
    }
}
