//! Workbook access - sheet enumeration, header-only reads and full sheet reads

pub mod excel;

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

pub use excel::ExcelWorkbook;

/// Normalized value of a single cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(true) => f.write_str("True"),
            CellValue::Bool(false) => f.write_str("False"),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// A single data row, one value per header column
pub type Row = Vec<CellValue>;

/// Fully materialized sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Error)]
pub enum SheetError {
    #[error(transparent)]
    Calamine(#[from] calamine::Error),

    #[error("sheet '{0}' not found in workbook")]
    NotFound(String),
}

/// Read access to a workbook's sheets, in workbook order
pub trait WorkbookSource {
    /// Sheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Read only the column signature of a sheet
    fn read_header(&mut self, sheet: &str) -> Result<Vec<String>, SheetError>;

    /// Read the header and every data row of a sheet
    fn read_sheet(&mut self, sheet: &str) -> Result<SheetData, SheetError>;
}

/// Turn raw header cells into unique column names
///
/// Empty cells become `Unnamed: <position>`; a name seen before gets a
/// `.1`, `.2`, ... suffix on each repeat.
pub(crate) fn column_names(raw: Vec<Option<String>>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    raw.into_iter()
        .enumerate()
        .map(|(idx, cell)| {
            let base = match cell {
                Some(name) if !name.trim().is_empty() => name,
                _ => format!("Unnamed: {}", idx),
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

/// In-memory workbook for exercising the transfer engine
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryWorkbook {
    pub sheets: Vec<SheetData>,
    /// Sheets whose rows have been materialized
    pub materialized: Vec<String>,
}

#[cfg(test)]
impl MemoryWorkbook {
    pub fn with_sheet(mut self, name: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        self.sheets.push(SheetData {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        });
        self
    }

    fn find(&self, sheet: &str) -> Result<&SheetData, SheetError> {
        self.sheets
            .iter()
            .find(|s| s.name == sheet)
            .ok_or_else(|| SheetError::NotFound(sheet.to_string()))
    }
}

#[cfg(test)]
impl WorkbookSource for MemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn read_header(&mut self, sheet: &str) -> Result<Vec<String>, SheetError> {
        Ok(self.find(sheet)?.columns.clone())
    }

    fn read_sheet(&mut self, sheet: &str) -> Result<SheetData, SheetError> {
        let data = self.find(sheet)?.clone();
        self.materialized.push(sheet.to_string());
        Ok(data)
    }
}
