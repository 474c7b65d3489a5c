use std::fmt;

/// One corner of an A1 range. `row` is 1-based; `None` means the whole column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub col: u32,
    pub row: Option<u32>,
}

/// A typed A1 range such as `'03-2024'!A2:F2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRange {
    pub sheet: String,
    pub start: Option<CellRef>,
    pub end: Option<CellRef>,
}

impl CellRange {
    pub fn whole_sheet(sheet: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            start: None,
            end: None,
        }
    }

    /// Full columns, e.g. `A:H`.
    pub fn columns(sheet: &str, first: u32, last: u32) -> Self {
        Self {
            sheet: sheet.to_string(),
            start: Some(CellRef { col: first, row: None }),
            end: Some(CellRef { col: last, row: None }),
        }
    }

    /// A column span on one row, e.g. `A5:F5`.
    pub fn row_span(sheet: &str, row: u32, first: u32, last: u32) -> Self {
        Self {
            sheet: sheet.to_string(),
            start: Some(CellRef { col: first, row: Some(row) }),
            end: Some(CellRef { col: last, row: Some(row) }),
        }
    }

    pub fn cell(sheet: &str, col: u32, row: u32) -> Self {
        Self {
            sheet: sheet.to_string(),
            start: Some(CellRef { col, row: Some(row) }),
            end: None,
        }
    }

    /// First column index covered (0-based).
    pub fn first_col(&self) -> u32 {
        self.start.map(|cell| cell.col).unwrap_or(0)
    }

    /// Last column index covered, `None` when unbounded.
    pub fn last_col(&self) -> Option<u32> {
        match (self.start, self.end) {
            (_, Some(end)) => Some(end.col),
            (Some(start), None) => Some(start.col),
            (None, None) => None,
        }
    }

    /// First row covered (1-based).
    pub fn first_row(&self) -> u32 {
        self.start.and_then(|cell| cell.row).unwrap_or(1)
    }

    /// Last row covered, `None` when unbounded.
    pub fn last_row(&self) -> Option<u32> {
        match (self.start, self.end) {
            (_, Some(end)) => end.row,
            (Some(start), None) => start.row,
            (None, None) => None,
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.sheet.replace('\'', "''"))?;
        if let Some(start) = self.start {
            write!(f, "!{}", format_cell(start))?;
            if let Some(end) = self.end {
                write!(f, ":{}", format_cell(end))?;
            }
        }
        Ok(())
    }
}

/// `0 -> A`, `25 -> Z`, `26 -> AA`.
pub fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (col % 26) as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn format_cell(cell: CellRef) -> String {
    match cell.row {
        Some(row) => format!("{}{}", column_letters(cell.col), row),
        None => column_letters(cell.col),
    }
}
