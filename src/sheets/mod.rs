pub mod a1;
pub mod google;
pub mod memory;

use crate::errors::AppResult;
use a1::CellRange;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub title: String,
}

/// The subset of a spreadsheet API the store needs. One implementation per backend;
/// every method is a single remote call.
#[async_trait]
pub trait SheetsBackend: Send + Sync {
    async fn list_sheets(&self) -> AppResult<Vec<SheetProperties>>;

    /// Creates a tab and, when given, writes `header` into row 1 in the same request.
    async fn add_sheet(&self, title: &str, header: Option<&[String]>) -> AppResult<SheetProperties>;

    /// Reads cell text. Trailing empty rows and cells are trimmed; a missing tab is `NotFound`.
    async fn get_values(&self, range: &CellRange) -> AppResult<Vec<Vec<String>>>;

    /// Overwrites cells starting at the range's top-left corner.
    async fn update_values(&self, range: &CellRange, rows: Vec<Vec<String>>) -> AppResult<()>;

    /// Writes rows after the last non-empty row of the range's table.
    async fn append_values(&self, range: &CellRange, rows: Vec<Vec<String>>) -> AppResult<()>;

    async fn clear_values(&self, range: &CellRange) -> AppResult<()>;

    /// Removes rows `[start, end)` (0-based) and shifts later rows up.
    async fn delete_rows(&self, sheet_id: i64, start: u32, end: u32) -> AppResult<()>;
}
