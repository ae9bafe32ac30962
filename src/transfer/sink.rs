use async_trait::async_trait;

use super::WriteMode;
use crate::db::TableSchema;
use crate::error::DbError;
use crate::workbook::Row;

/// Destination for chunks of sheet rows
#[async_trait]
pub trait TableSink: Send {
    /// Write `rows` into `table`, in order
    ///
    /// With [`WriteMode::Replace`] any existing table is dropped and recreated
    /// from `schema` first. With [`WriteMode::Append`] the table must already
    /// exist with that schema. A chunk is acknowledged as a unit: on error
    /// none of its rows are kept.
    async fn write_chunk(
        &mut self,
        table: &str,
        schema: &TableSchema,
        rows: &[Row],
        mode: WriteMode,
    ) -> Result<(), DbError>;
}
