use super::layout::LayoutViolation;

/// Maximum number of rows in an Excel worksheet (2^20).
pub const EXCEL_MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in an Excel worksheet (2^14).
pub const EXCEL_MAX_COLUMNS: u32 = 16_384;

/// Forward-only row pointer used while laying out blocks.
///
/// Rows are 1-based. There is no way to move the cursor backwards; column
/// addressing is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetCursor {
    row: u32,
}

impl SheetCursor {
    pub fn new() -> Self {
        Self { row: 1 }
    }

    /// Current row.
    pub fn current(&self) -> u32 {
        self.row
    }

    /// Moves the cursor down by `rows`. Advancing by zero is a no-op.
    pub fn advance(&mut self, rows: u32) -> Result<(), LayoutViolation> {
        let next = self
            .row
            .checked_add(rows)
            .filter(|next| *next <= EXCEL_MAX_ROWS + 1)
            .ok_or(LayoutViolation::RowLimitExceeded {
                row: u64::from(self.row) + u64::from(rows),
                max: EXCEL_MAX_ROWS,
            })?;
        self.row = next;
        Ok(())
    }
}

impl Default for SheetCursor {
    fn default() -> Self {
        Self::new()
    }
}
