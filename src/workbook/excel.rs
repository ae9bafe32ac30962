//! Spreadsheet workbook reader backed by calamine.
//!
//! `.xlsx` and `.xlsb` headers are read by streaming cells, so validating a
//! workbook never materializes data rows. The stream is still drained to find
//! the used column span, which must match what a full range read sees.
//! `.xls` and `.ods` only expose whole ranges.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{Data, DataRef, Range, Reader, Sheets, open_workbook_auto};
use chrono::{NaiveDate, NaiveDateTime};

use super::{CellValue, Row, SheetData, SheetError, WorkbookSource, column_names};

/// Largest magnitude at which every integer is exactly representable in an f64
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

pub struct ExcelWorkbook {
    sheets: Sheets<BufReader<File>>,
}

impl ExcelWorkbook {
    /// Open a workbook, detecting the container format from its extension
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SheetError> {
        let sheets = open_workbook_auto(path)?;
        Ok(Self { sheets })
    }

    fn ensure_sheet(&self, sheet: &str) -> Result<(), SheetError> {
        if self.sheets.sheet_names().iter().any(|name| name == sheet) {
            Ok(())
        } else {
            Err(SheetError::NotFound(sheet.to_string()))
        }
    }
}

/// Stream every cell of a cells reader, keeping only the header row
macro_rules! stream_header {
    ($reader:expr) => {{
        let mut header = HeaderCells::default();
        while let Some(cell) = $reader.next_cell().map_err(calamine::Error::from)? {
            let (row, column) = cell.get_position();
            header.push(row, column, data_from_ref(cell.get_value()));
        }
        header.into_layout().names
    }};
}

impl WorkbookSource for ExcelWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names().to_vec()
    }

    fn read_header(&mut self, sheet: &str) -> Result<Vec<String>, SheetError> {
        self.ensure_sheet(sheet)?;

        if let Sheets::Xlsx(xlsx) = &mut self.sheets {
            let mut reader = xlsx
                .worksheet_cells_reader(sheet)
                .map_err(calamine::Error::from)?;
            return Ok(stream_header!(reader));
        }
        if let Sheets::Xlsb(xlsb) = &mut self.sheets {
            let mut reader = xlsb
                .worksheet_cells_reader(sheet)
                .map_err(calamine::Error::from)?;
            return Ok(stream_header!(reader));
        }

        let range = self.sheets.worksheet_range(sheet)?;
        Ok(SheetLayout::from_range(&range).names)
    }

    fn read_sheet(&mut self, sheet: &str) -> Result<SheetData, SheetError> {
        self.ensure_sheet(sheet)?;
        let range = self.sheets.worksheet_range(sheet)?;
        let layout = SheetLayout::from_range(&range);
        let rows = layout.data_rows(&range);

        Ok(SheetData {
            name: sheet.to_string(),
            columns: layout.names,
            rows,
        })
    }
}

/// Non-empty cells of the first non-empty row, keyed by absolute column,
/// plus the column span of every stored cell in the sheet
#[derive(Debug, Default)]
struct HeaderCells {
    row: Option<u32>,
    cells: BTreeMap<u32, Data>,
    columns: Option<(u32, u32)>,
}

impl HeaderCells {
    /// Offer a cell in reading order
    fn push(&mut self, row: u32, column: u32, value: Data) {
        // Range reads skip the same cells, so both paths agree on the span
        if matches!(value, Data::Empty) {
            return;
        }
        self.widen(column);

        if cell_value(&value).is_null() {
            return;
        }
        match self.row {
            None => {
                self.row = Some(row);
                self.cells.insert(column, value);
            }
            Some(header_row) if header_row == row => {
                self.cells.insert(column, value);
            }
            Some(_) => {}
        }
    }

    fn widen(&mut self, column: u32) {
        self.columns = Some(match self.columns {
            None => (column, column),
            Some((first, last)) => (first.min(column), last.max(column)),
        });
    }

    /// Header spanning the whole used width; blank positions are `Unnamed: <n>`
    fn into_layout(self) -> SheetLayout {
        let (Some(header_row), Some((first, last))) = (self.row, self.columns) else {
            return SheetLayout::default();
        };

        let raw = (first..=last)
            .map(|column| {
                self.cells
                    .get(&column)
                    .map(|value| cell_value(value).to_string())
            })
            .collect();

        SheetLayout {
            header_row,
            first_column: first,
            names: column_names(raw),
        }
    }
}

/// Where the header sits in a sheet and what its columns are called
#[derive(Debug, Default)]
struct SheetLayout {
    /// Absolute row of the header
    header_row: u32,
    /// Absolute column of the first used column
    first_column: u32,
    names: Vec<String>,
}

impl SheetLayout {
    fn from_range(range: &Range<Data>) -> Self {
        let (Some((start_row, start_column)), Some((_, end_column))) = (range.start(), range.end())
        else {
            return SheetLayout::default();
        };

        let mut header = HeaderCells::default();
        for (row_offset, row) in range.rows().enumerate() {
            for (column_offset, value) in row.iter().enumerate() {
                header.push(
                    start_row + row_offset as u32,
                    start_column + column_offset as u32,
                    value.clone(),
                );
            }
            if header.row.is_some() {
                break;
            }
        }
        header.widen(start_column);
        header.widen(end_column);

        header.into_layout()
    }

    /// Rows below the header, one value per used column
    ///
    /// Trailing rows with no values are dropped.
    fn data_rows(&self, range: &Range<Data>) -> Vec<Row> {
        let Some((start_row, start_column)) = range.start() else {
            return Vec::new();
        };
        if self.names.is_empty() {
            return Vec::new();
        }

        let skip = (self.header_row - start_row) as usize + 1;
        let offset = (self.first_column - start_column) as usize;
        let width = self.names.len();

        let mut rows: Vec<Row> = range
            .rows()
            .skip(skip)
            .map(|row| {
                (offset..offset + width)
                    .map(|idx| row.get(idx).map(cell_value).unwrap_or(CellValue::Null))
                    .collect()
            })
            .collect();

        while rows
            .last()
            .is_some_and(|row| row.iter().all(CellValue::is_null))
        {
            rows.pop();
        }

        rows
    }
}

fn data_from_ref(value: &DataRef<'_>) -> Data {
    match value {
        DataRef::Int(value) => Data::Int(*value),
        DataRef::Float(value) => Data::Float(*value),
        DataRef::String(value) => Data::String(value.to_owned()),
        DataRef::SharedString(value) => Data::String(value.to_string()),
        DataRef::Bool(value) => Data::Bool(*value),
        DataRef::DateTime(value) => Data::DateTime(*value),
        DataRef::DateTimeIso(value) => Data::DateTimeIso(value.to_owned()),
        DataRef::DurationIso(value) => Data::DurationIso(value.to_owned()),
        DataRef::Error(value) => Data::Error(value.to_owned()),
        DataRef::Empty => Data::Empty,
    }
}

/// Normalize a calamine cell
pub(crate) fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Null,
        Data::String(s) if s.is_empty() => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => float_value(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) if dt.is_duration() => match dt.as_duration() {
            Some(duration) => {
                let secs = duration.num_seconds();
                CellValue::Text(format!(
                    "{:02}:{:02}:{:02}",
                    secs / 3600,
                    (secs % 3600) / 60,
                    secs % 60
                ))
            }
            None => CellValue::Float(dt.as_f64()),
        },
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Float(dt.as_f64())),
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// Spreadsheets store every number as a double; whole numbers become integers
fn float_value(f: f64) -> CellValue {
    if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT_INT {
        CellValue::Int(f as i64)
    } else {
        CellValue::Float(f)
    }
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
