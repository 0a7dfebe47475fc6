//! Workbook assembly on top of `umya_spreadsheet`.

use super::layout::{CellAddress, CellSink, CellValue};
use super::ReportError;
use chrono::{Datelike, NaiveDate};
use std::io::Cursor;
use umya_spreadsheet::helper::coordinate::coordinate_from_index;
use umya_spreadsheet::{NumberingFormat, Spreadsheet};

/// Name of the single worksheet in the report workbook.
pub const SHEET_NAME: &str = "CustomerCallsReport";

/// An in-progress xlsx workbook with one worksheet.
///
/// The handle is consumed by [`XlsxDocument::serialize`], so a document can
/// only be turned into bytes once.
pub struct XlsxDocument {
    book: Spreadsheet,
    cells: usize,
    lost_writes: usize,
}

impl XlsxDocument {
    pub fn new() -> Result<Self, ReportError> {
        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        book.new_sheet(SHEET_NAME)
            .map_err(|e| ReportError::Serialization(format!("failed to create sheet: {e}")))?;
        Ok(Self {
            book,
            cells: 0,
            lost_writes: 0,
        })
    }

    /// Cells written into the worksheet so far.
    pub fn cell_count(&self) -> usize {
        self.cells
    }

    /// Encodes the workbook as xlsx bytes.
    pub fn serialize(self) -> Result<Vec<u8>, ReportError> {
        if self.lost_writes > 0 {
            return Err(ReportError::Serialization(format!(
                "{} cell writes did not reach sheet '{}'",
                self.lost_writes, SHEET_NAME
            )));
        }
        let mut buffer = Cursor::new(Vec::new());
        umya_spreadsheet::writer::xlsx::write_writer(&self.book, &mut buffer)
            .map_err(|e| ReportError::Serialization(e.to_string()))?;
        Ok(buffer.into_inner())
    }
}

impl CellSink for XlsxDocument {
    fn set_cell(&mut self, address: CellAddress, value: CellValue) {
        let Some(sheet) = self.book.get_sheet_by_name_mut(SHEET_NAME) else {
            self.lost_writes += 1;
            return;
        };
        let coordinate = coordinate_from_index(&address.column, &address.row);
        let cell = sheet.get_cell_mut(coordinate.as_str());
        match value {
            CellValue::Text(text) => {
                // Stored as a shared string even when it looks numeric or boolean.
                cell.set_value_string(text);
            }
            CellValue::Integer(number) => {
                cell.set_value_number(number as f64);
            }
            CellValue::Date(date) => {
                cell.set_value_number(excel_serial(date));
                cell.get_style_mut()
                    .get_number_format_mut()
                    .set_format_code(NumberingFormat::FORMAT_DATE_YYYYMMDD);
            }
        }
        self.cells += 1;
    }
}

/// Excel 1900-system serial number for a date.
///
/// Serials count from 1899-12-30, except that Excel treats 1900 as a leap
/// year, so dates before 1900-03-01 are shifted back by one.
pub fn excel_serial(date: NaiveDate) -> f64 {
    let serial = i64::from(date.num_days_from_ce()) - DAYS_TO_EXCEL_EPOCH;
    if serial < FIRST_REAL_MARCH_1900 {
        (serial - 1) as f64
    } else {
        serial as f64
    }
}

// Days from 0001-01-01 (CE day 1) to 1899-12-30.
const DAYS_TO_EXCEL_EPOCH: i64 = 693_594;
const FIRST_REAL_MARCH_1900: i64 = 61;

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn excel_serial_known_values() {
        assert_eq!(excel_serial(date(1900, 1, 1)), 1.0);
        assert_eq!(excel_serial(date(1900, 2, 28)), 59.0);
        assert_eq!(excel_serial(date(1900, 3, 1)), 61.0);
        assert_eq!(excel_serial(date(2000, 1, 1)), 36526.0);
        assert_eq!(excel_serial(date(2024, 1, 1)), 45292.0);
        assert_eq!(excel_serial(date(2024, 2, 29)), 45351.0);
    }

    #[test]
    fn text_cells_are_not_coerced() {
        let mut doc = XlsxDocument::new().unwrap();
        doc.set_cell(CellAddress::new(1, 4), CellValue::from("TRUE"));
        doc.set_cell(CellAddress::new(4, 3), CellValue::from("0042"));
        doc.set_cell(CellAddress::new(5, 3), CellValue::from("1e3"));

        let sheet = doc.book.get_sheet_by_name(SHEET_NAME).unwrap();
        for (coordinate, expected) in [("D1", "TRUE"), ("C4", "0042"), ("C5", "1e3")] {
            let cell = sheet.get_cell(coordinate).unwrap();
            assert_eq!(cell.get_value(), expected);
            assert_eq!(cell.get_data_type(), "s");
        }
    }

    #[test]
    fn serializes_to_zip_container() {
        let mut doc = XlsxDocument::new().unwrap();
        doc.set_cell(CellAddress::new(1, 1), CellValue::from("Customer No"));
        doc.set_cell(CellAddress::new(1, 3), CellValue::Integer(1));
        doc.set_cell(CellAddress::new(4, 2), CellValue::Date(date(2024, 1, 5)));
        assert_eq!(doc.cell_count(), 3);

        let bytes = doc.serialize().unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
