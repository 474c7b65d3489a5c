use super::a1::CellRange;
use super::{SheetProperties, SheetsBackend};
use crate::errors::{AppError, AppResult, RemoteFailure};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct MemorySheet {
    sheet_id: i64,
    title: String,
    rows: Vec<Vec<String>>,
}

/// Process-local spreadsheet with the same range semantics as the remote API.
/// Backs `--in-memory` runs and the test suites.
#[derive(Debug, Default)]
pub struct MemorySheets {
    sheets: Mutex<Vec<MemorySheet>>,
    next_sheet_id: Mutex<i64>,
    calls: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of backend calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes every mutating call fail with a remote error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw rows of a tab, header included.
    pub fn snapshot(&self, title: &str) -> Option<Vec<Vec<String>>> {
        let sheets = self.sheets.lock().ok()?;
        sheets.iter().find(|sheet| sheet.title == title).map(|sheet| sheet.rows.clone())
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Vec<MemorySheet>>> {
        self.sheets
            .lock()
            .map_err(|_| AppError::Internal("spreadsheet mutex poisoned".to_string()))
    }

    fn begin(&self, mutating: bool) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if mutating && self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::remote("sheets", RemoteFailure::Other, "write rejected by backend"));
        }
        Ok(())
    }
}

fn find_sheet<'a>(sheets: &'a mut [MemorySheet], range: &CellRange) -> AppResult<&'a mut MemorySheet> {
    sheets
        .iter_mut()
        .find(|sheet| sheet.title == range.sheet)
        .ok_or_else(|| AppError::NotFound(format!("Unable to parse range: {}", range)))
}

fn write_cell(rows: &mut Vec<Vec<String>>, row: usize, col: usize, value: String) {
    if rows.len() <= row {
        rows.resize(row + 1, Vec::new());
    }
    let cells = &mut rows[row];
    if cells.len() <= col {
        cells.resize(col + 1, String::new());
    }
    cells[col] = value;
}

fn trim_trailing(mut rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    for row in rows.iter_mut() {
        while row.last().is_some_and(|cell| cell.is_empty()) {
            row.pop();
        }
    }
    while rows.last().is_some_and(|row| row.is_empty()) {
        rows.pop();
    }
    rows
}

#[async_trait]
impl SheetsBackend for MemorySheets {
    async fn list_sheets(&self) -> AppResult<Vec<SheetProperties>> {
        self.begin(false)?;
        let sheets = self.lock()?;
        Ok(sheets
            .iter()
            .map(|sheet| SheetProperties {
                sheet_id: sheet.sheet_id,
                title: sheet.title.clone(),
            })
            .collect())
    }

    async fn add_sheet(&self, title: &str, header: Option<&[String]>) -> AppResult<SheetProperties> {
        self.begin(true)?;
        let mut sheets = self.lock()?;
        if sheets.iter().any(|sheet| sheet.title == title) {
            return Err(AppError::remote(
                "sheets",
                RemoteFailure::Other,
                format!("A sheet with the name \"{}\" already exists", title),
            ));
        }
        let sheet_id = {
            let mut next = self
                .next_sheet_id
                .lock()
                .map_err(|_| AppError::Internal("spreadsheet mutex poisoned".to_string()))?;
            let id = *next;
            *next += 1;
            id
        };
        let rows = header.map(|header| vec![header.to_vec()]).unwrap_or_default();
        sheets.push(MemorySheet {
            sheet_id,
            title: title.to_string(),
            rows,
        });
        Ok(SheetProperties {
            sheet_id,
            title: title.to_string(),
        })
    }

    async fn get_values(&self, range: &CellRange) -> AppResult<Vec<Vec<String>>> {
        self.begin(false)?;
        let mut sheets = self.lock()?;
        let sheet = find_sheet(&mut sheets, range)?;
        let first_row = range.first_row() as usize - 1;
        let last_row = range
            .last_row()
            .map(|row| row as usize)
            .unwrap_or(sheet.rows.len())
            .min(sheet.rows.len());
        let first_col = range.first_col() as usize;

        let mut values = Vec::new();
        for row in sheet.rows.iter().take(last_row).skip(first_row) {
            let last_col = range
                .last_col()
                .map(|col| col as usize + 1)
                .unwrap_or(row.len())
                .min(row.len());
            let cells = if first_col < last_col {
                row[first_col..last_col].to_vec()
            } else {
                Vec::new()
            };
            values.push(cells);
        }
        Ok(trim_trailing(values))
    }

    async fn update_values(&self, range: &CellRange, rows: Vec<Vec<String>>) -> AppResult<()> {
        self.begin(true)?;
        let mut sheets = self.lock()?;
        let sheet = find_sheet(&mut sheets, range)?;
        let first_row = range.first_row() as usize - 1;
        let first_col = range.first_col() as usize;
        for (row_offset, cells) in rows.into_iter().enumerate() {
            for (col_offset, value) in cells.into_iter().enumerate() {
                write_cell(&mut sheet.rows, first_row + row_offset, first_col + col_offset, value);
            }
        }
        Ok(())
    }

    async fn append_values(&self, range: &CellRange, rows: Vec<Vec<String>>) -> AppResult<()> {
        self.begin(true)?;
        let mut sheets = self.lock()?;
        let sheet = find_sheet(&mut sheets, range)?;
        let first_col = range.first_col() as usize;
        let last_col = range.last_col().map(|col| col as usize);
        let table_end = sheet
            .rows
            .iter()
            .rposition(|row| {
                row.iter()
                    .enumerate()
                    .any(|(col, cell)| col >= first_col && last_col.map_or(true, |last| col <= last) && !cell.is_empty())
            })
            .map(|index| index + 1)
            .unwrap_or(range.first_row() as usize - 1);
        for (row_offset, cells) in rows.into_iter().enumerate() {
            for (col_offset, value) in cells.into_iter().enumerate() {
                write_cell(&mut sheet.rows, table_end + row_offset, first_col + col_offset, value);
            }
        }
        Ok(())
    }

    async fn clear_values(&self, range: &CellRange) -> AppResult<()> {
        self.begin(true)?;
        let mut sheets = self.lock()?;
        let sheet = find_sheet(&mut sheets, range)?;
        let first_row = range.first_row() as usize - 1;
        let last_row = range.last_row().map(|row| row as usize).unwrap_or(usize::MAX);
        let first_col = range.first_col() as usize;
        let last_col = range.last_col().map(|col| col as usize).unwrap_or(usize::MAX);
        for (index, row) in sheet.rows.iter_mut().enumerate() {
            if index < first_row || index >= last_row {
                continue;
            }
            for (col, cell) in row.iter_mut().enumerate() {
                if col >= first_col && col <= last_col {
                    cell.clear();
                }
            }
        }
        Ok(())
    }

    async fn delete_rows(&self, sheet_id: i64, start: u32, end: u32) -> AppResult<()> {
        self.begin(true)?;
        let mut sheets = self.lock()?;
        let sheet = sheets
            .iter_mut()
            .find(|sheet| sheet.sheet_id == sheet_id)
            .ok_or_else(|| AppError::NotFound(format!("No grid with id: {}", sheet_id)))?;
        let start = (start as usize).min(sheet.rows.len());
        let end = (end as usize).min(sheet.rows.len());
        if start < end {
            sheet.rows.drain(start..end);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemorySheets;
    use crate::sheets::a1::CellRange;
    use crate::sheets::SheetsBackend;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn append_lands_after_last_non_empty_row() {
        let sheets = MemorySheets::new();
        sheets.add_sheet("t", Some(&row(&["h1", "h2"]))).await.expect("add");
        sheets
            .append_values(&CellRange::columns("t", 0, 1), vec![row(&["a", "b"])])
            .await
            .expect("append");
        sheets
            .append_values(&CellRange::columns("t", 0, 1), vec![row(&["c", "d"])])
            .await
            .expect("append");

        let values = sheets.get_values(&CellRange::columns("t", 0, 1)).await.expect("get");
        assert_eq!(values, vec![row(&["h1", "h2"]), row(&["a", "b"]), row(&["c", "d"])]);
    }

    #[tokio::test]
    async fn get_trims_and_respects_bounds() {
        let sheets = MemorySheets::new();
        sheets.add_sheet("t", None).await.expect("add");
        sheets
            .update_values(&CellRange::cell("t", 0, 1), vec![row(&["a", "b", "c"]), row(&["d", "", ""])])
            .await
            .expect("update");

        let cell = sheets.get_values(&CellRange::cell("t", 1, 1)).await.expect("get");
        assert_eq!(cell, vec![row(&["b"])]);
        let all = sheets.get_values(&CellRange::whole_sheet("t")).await.expect("get");
        assert_eq!(all, vec![row(&["a", "b", "c"]), row(&["d"])]);
    }

    #[tokio::test]
    async fn missing_tab_reads_as_not_found() {
        let sheets = MemorySheets::new();
        let error = sheets
            .get_values(&CellRange::columns("nope", 0, 7))
            .await
            .expect_err("missing tab");
        assert_eq!(error.status_code(), 404);
    }

    #[tokio::test]
    async fn duplicate_tab_is_rejected() {
        let sheets = MemorySheets::new();
        sheets.add_sheet("t", None).await.expect("add");
        assert!(sheets.add_sheet("t", None).await.is_err());
    }
}
