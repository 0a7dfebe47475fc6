//! Turns report groups into cell writes.
//!
//! Each group becomes a fixed-shape block:
//!
//! ```text
//! row r     | Customer No | Customer Name | <customer no> | <name>
//! row r+1   | (blank)
//! row r+2   | Call No     | Date Of Call  | Subject
//! row r+3.. | <call no>   | <date>        | <subject>      (one row per call)
//! last      | (blank)
//! ```
//!
//! A group with `k` calls consumes `4 + k` rows.

use super::aggregate::ReportGroup;
use super::cursor::{EXCEL_MAX_COLUMNS, EXCEL_MAX_ROWS, SheetCursor};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

pub const CUSTOMER_NO_LABEL: &str = "Customer No";
pub const CUSTOMER_NAME_LABEL: &str = "Customer Name";
pub const CALL_NO_LABEL: &str = "Call No";
pub const DATE_OF_CALL_LABEL: &str = "Date Of Call";
pub const SUBJECT_LABEL: &str = "Subject";

/// 1-based `(row, column)` address of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CellAddress {
    pub row: u32,
    pub column: u32,
}

impl CellAddress {
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}C{}", self.row, self.column)
    }
}

/// A value written into one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Date(NaiveDate),
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

/// Internal layout defects. Any of these aborts report generation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutViolation {
    #[error("cell {0} written more than once")]
    DuplicateAddress(CellAddress),

    #[error("cell {0} lies outside the worksheet")]
    OutOfBounds(CellAddress),

    #[error("row {row} exceeds the worksheet limit of {max} rows")]
    RowLimitExceeded { row: u64, max: u32 },
}

/// Destination for cell writes.
pub trait CellSink {
    fn set_cell(&mut self, address: CellAddress, value: CellValue);
}

/// In-memory grid of written cells, ordered by row then column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CellGrid {
    cells: BTreeMap<CellAddress, CellValue>,
}

impl CellGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, row: u32, column: u32) -> Option<&CellValue> {
        self.cells.get(&CellAddress::new(row, column))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Highest row holding a value, if any.
    pub fn last_row(&self) -> Option<u32> {
        self.cells.keys().next_back().map(|address| address.row)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellAddress, &CellValue)> {
        self.cells.iter()
    }

    /// Values in one row, in column order.
    pub fn row(&self, row: u32) -> Vec<(u32, &CellValue)> {
        self.cells
            .range(CellAddress::new(row, 0)..=CellAddress::new(row, u32::MAX))
            .map(|(address, value)| (address.column, value))
            .collect()
    }
}

impl CellSink for CellGrid {
    fn set_cell(&mut self, address: CellAddress, value: CellValue) {
        self.cells.insert(address, value);
    }
}

/// Writes report groups as blocks, one after another.
///
/// The writer remembers every address it has emitted so overlapping blocks
/// are caught before they reach the document.
#[derive(Debug, Default)]
pub struct BlockWriter {
    written: HashSet<CellAddress>,
}

impl BlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cells written so far.
    pub fn cells_written(&self) -> usize {
        self.written.len()
    }

    /// Emits one group starting at the cursor's current row and leaves the
    /// cursor on the first row of the next block.
    pub fn write_group<S: CellSink + ?Sized>(
        &mut self,
        group: &ReportGroup,
        cursor: &mut SheetCursor,
        sink: &mut S,
    ) -> Result<(), LayoutViolation> {
        let customer = &group.customer;

        // Labels and values share one row.
        let row = cursor.current();
        self.put(sink, row, 1, CUSTOMER_NO_LABEL.into())?;
        self.put(sink, row, 2, CUSTOMER_NAME_LABEL.into())?;
        self.put(sink, row, 3, customer.customer_no.get().into())?;
        self.put(sink, row, 4, customer.name.clone().into())?;
        cursor.advance(2)?;

        let row = cursor.current();
        self.put(sink, row, 1, CALL_NO_LABEL.into())?;
        self.put(sink, row, 2, DATE_OF_CALL_LABEL.into())?;
        self.put(sink, row, 3, SUBJECT_LABEL.into())?;
        cursor.advance(1)?;

        for call in &group.calls {
            let row = cursor.current();
            self.put(sink, row, 1, call.call_no.get().into())?;
            self.put(sink, row, 2, call.date_of_call.into())?;
            self.put(sink, row, 3, call.subject.clone().into())?;
            cursor.advance(1)?;
        }

        cursor.advance(1)
    }

    fn put<S: CellSink + ?Sized>(
        &mut self,
        sink: &mut S,
        row: u32,
        column: u32,
        value: CellValue,
    ) -> Result<(), LayoutViolation> {
        let address = CellAddress::new(row, column);
        if row == 0 || row > EXCEL_MAX_ROWS || column == 0 || column > EXCEL_MAX_COLUMNS {
            return Err(LayoutViolation::OutOfBounds(address));
        }
        if !self.written.insert(address) {
            return Err(LayoutViolation::DuplicateAddress(address));
        }
        sink.set_cell(address, value);
        Ok(())
    }
}

/// Lays out every group, in order, into `sink`. Returns the final cursor.
pub fn write_groups<S: CellSink + ?Sized>(
    groups: &[ReportGroup],
    sink: &mut S,
) -> Result<SheetCursor, LayoutViolation> {
    let mut cursor = SheetCursor::new();
    let mut writer = BlockWriter::new();
    for group in groups {
        writer.write_group(group, &mut cursor, sink)?;
    }
    Ok(cursor)
}
