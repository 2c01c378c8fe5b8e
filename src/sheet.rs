//! Spreadsheet loading — workbook or CSV into header + rows.

use std::fmt;
use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto};

use crate::config::ColumnRef;
use crate::error::SheetError;

static EMPTY_CELL: CellValue = CellValue::Empty;

/// A raw scalar cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// Trimmed text form, or `None` for empty/blank cells.
    pub fn as_text(&self) -> Option<String> {
        let text = self.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn from_text(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(raw.to_string())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(s) => f.write_str(s),
            // Spreadsheets store 12345 as 12345.0; render whole numbers
            // without the fraction so account cells read naturally.
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{n:.0}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Self::Empty,
            Data::String(s) => Self::from_text(s),
            Data::Float(n) => Self::Number(*n),
            #[allow(clippy::cast_precision_loss)]
            Data::Int(n) => Self::Number(*n as f64),
            Data::Bool(b) => Self::Bool(*b),
            other => Self::from_text(&other.to_string()),
        }
    }
}

/// One record of the sheet. Immutable once read.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadsheetRow {
    /// 1-based data row number (header excluded).
    pub number: usize,
    pub cells: Vec<CellValue>,
}

impl SpreadsheetRow {
    pub fn new(number: usize, cells: Vec<CellValue>) -> Self {
        Self { number, cells }
    }

    /// Cell at `index`, or `Empty` when the row is shorter.
    pub fn get(&self, index: usize) -> &CellValue {
        self.cells.get(index).unwrap_or(&EMPTY_CELL)
    }
}

/// One logical table: a header row plus data rows.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<SpreadsheetRow>,
}

impl Sheet {
    /// Build a sheet from a header row and raw rows (used by loaders and tests).
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, cells)| SpreadsheetRow::new(i + 1, cells))
            .collect();
        Self { headers, rows }
    }

    /// Resolve a column to a position: header name first, index otherwise.
    pub fn resolve(&self, column: &ColumnRef) -> usize {
        column
            .name
            .as_deref()
            .and_then(|name| self.headers.iter().position(|h| h.trim() == name))
            .unwrap_or(column.index)
    }

    /// Load a sheet from disk, dispatching on the file extension.
    pub fn load(path: &Path, sheet_name: Option<&str>) -> Result<Self, SheetError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Self::load_csv(path),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Self::load_workbook(path, sheet_name),
            other => Err(SheetError::UnsupportedFormat(other.to_string())),
        }
    }

    fn load_workbook(path: &Path, sheet_name: Option<&str>) -> Result<Self, SheetError> {
        let mut workbook = open_workbook_auto(path).map_err(|e| SheetError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let name = match sheet_name {
            Some(name) => {
                if !workbook.sheet_names().iter().any(|n| n == name) {
                    return Err(SheetError::SheetNotFound(name.to_string()));
                }
                name.to_string()
            }
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or(SheetError::NoSheets)?,
        };

        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| SheetError::Open {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::debug!(path = %path.display(), sheet = %name, "Loaded workbook");
        Ok(Self::from_range(&range))
    }

    /// Lay a worksheet range out from cell A1.
    ///
    /// calamine ranges cover only the used area, so leading empty rows and
    /// columns are restored here; positional indices always count from
    /// column A and the header is always row 1.
    pub fn from_range(range: &Range<Data>) -> Self {
        let Some((start_row, start_col)) = range.start() else {
            return Self::default();
        };

        let mut grid: Vec<Vec<CellValue>> = (0..start_row).map(|_| Vec::new()).collect();
        for row in range.rows() {
            let mut cells = vec![CellValue::Empty; start_col as usize];
            cells.extend(row.iter().map(CellValue::from));
            grid.push(cells);
        }

        let mut grid = grid.into_iter();
        let headers = grid
            .next()
            .map(|cells| cells.iter().map(ToString::to_string).collect())
            .unwrap_or_default();
        Self::from_rows(headers, grid.collect())
    }

    fn load_csv(path: &Path) -> Result<Self, SheetError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut data = Vec::new();
        for record in reader.records() {
            let record = record?;
            data.push(record.iter().map(CellValue::from_text).collect());
        }

        tracing::debug!(path = %path.display(), "Loaded CSV");
        Ok(Self::from_rows(headers, data))
    }
}
