//! Spreadsheet-backed record store.
//!
//! Records are addressed by `(partition, offset)` where offset is the 1-based sheet row
//! (row 1 is the header, so the first record is offset 2). Offsets are positional: deleting
//! offset N moves every later record in that partition from M to M-1. Nothing tracks
//! outstanding offsets held by clients, so an update racing a delete can land on a
//! neighbouring row. Callers re-list after any delete.

use crate::assets::AssetRemover;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AssetCleanup, Record, RecordFields, RecordStatus, RecordUpdate, DEFAULT_ASSIGNEE,
    DEFAULT_TASK_NAME,
};
use crate::sheets::a1::CellRange;
use crate::sheets::{SheetProperties, SheetsBackend};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub const RECORD_HEADER: [&str; 8] = [
    "Date",
    "TaskName",
    "Assignee",
    "Status",
    "Description",
    "Cost",
    "ImageURL",
    "LastUpdated",
];

pub const COL_DATE: u32 = 0;
pub const COL_STATUS: u32 = 3;
pub const COL_COST: u32 = 5;
pub const COL_IMAGE: u32 = 6;
pub const COL_LAST_UPDATED: u32 = 7;

const FIRST_DATA_ROW: u32 = 2;
const METADATA_LAST_COL: u32 = 25;

/// Millisecond timestamps that never repeat or go backwards within the process.
#[derive(Debug, Default)]
pub struct AuditClock {
    last_millis: AtomicI64,
}

impl AuditClock {
    pub fn stamp(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut previous = self.last_millis.load(Ordering::SeqCst);
        loop {
            let next = now.max(previous + 1);
            match self
                .last_millis
                .compare_exchange(previous, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    return DateTime::<Utc>::from_timestamp_millis(next)
                        .unwrap_or_default()
                        .to_rfc3339_opts(SecondsFormat::Millis, true);
                }
                Err(actual) => previous = actual,
            }
        }
    }
}

pub struct TabularStore {
    backend: Arc<dyn SheetsBackend>,
    assets: Arc<dyn AssetRemover>,
    clock: AuditClock,
}

impl TabularStore {
    pub fn new(backend: Arc<dyn SheetsBackend>, assets: Arc<dyn AssetRemover>) -> Self {
        Self {
            backend,
            assets,
            clock: AuditClock::default(),
        }
    }

    async fn find_partition(&self, name: &str) -> AppResult<Option<SheetProperties>> {
        let sheets = self.backend.list_sheets().await?;
        Ok(sheets.into_iter().find(|sheet| sheet.title == name))
    }

    /// Create-or-get. The header goes in with the creation call, so a partition never
    /// exists without one. If a concurrent writer wins the creation race the existing
    /// partition is used as-is.
    pub async fn ensure_partition(&self, name: &str, header: &[&str]) -> AppResult<SheetProperties> {
        if let Some(existing) = self.find_partition(name).await? {
            return Ok(existing);
        }

        let header: Vec<String> = header.iter().map(|label| label.to_string()).collect();
        let header = (!header.is_empty()).then_some(header.as_slice());
        match self.backend.add_sheet(name, header).await {
            Ok(created) => {
                tracing::info!(partition = %name, "created partition");
                Ok(created)
            }
            Err(error) => match self.find_partition(name).await {
                Ok(Some(existing)) => {
                    tracing::debug!(partition = %name, "partition created concurrently");
                    Ok(existing)
                }
                _ => Err(error),
            },
        }
    }

    /// Appends one record and returns the LastUpdated stamp written with it.
    /// No offset comes back; re-list to find the new row.
    pub async fn append(&self, partition: &str, fields: &RecordFields) -> AppResult<String> {
        let stamp = self.clock.stamp();
        let row = vec![
            fields.date.clone(),
            fields.task_name.clone(),
            fields.assignee.clone(),
            fields.status.as_str().to_string(),
            fields.description.clone(),
            format_cost(fields.cost),
            fields.image_url.clone(),
            stamp.clone(),
        ];
        self.backend
            .append_values(&CellRange::columns(partition, COL_DATE, COL_LAST_UPDATED), vec![row])
            .await?;
        Ok(stamp)
    }

    /// Records newest-first by sheet position.
    pub async fn list(&self, partition: &str) -> AppResult<Vec<Record>> {
        let rows = self
            .backend
            .get_values(&CellRange::columns(partition, COL_DATE, COL_LAST_UPDATED))
            .await?;
        let mut records: Vec<Record> = rows
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, row)| parse_row(partition, index as u32 + 1, row))
            .collect();
        records.reverse();
        Ok(records)
    }

    /// Overwrites a column span on one row, then refreshes LastUpdated.
    pub async fn update_fields(&self, partition: &str, offset: u32, first_col: u32, values: Vec<String>) -> AppResult<String> {
        check_offset(offset)?;
        if values.is_empty() {
            return Err(AppError::Validation("No values to update".to_string()));
        }
        let last_col = first_col + values.len() as u32 - 1;
        if last_col >= COL_LAST_UPDATED {
            return Err(AppError::Validation("LastUpdated is maintained by the store".to_string()));
        }
        self.backend
            .update_values(&CellRange::row_span(partition, offset, first_col, last_col), vec![values])
            .await?;
        self.touch(partition, offset).await
    }

    pub async fn update_status(&self, partition: &str, offset: u32, status: RecordStatus) -> AppResult<String> {
        self.update_fields(partition, offset, COL_STATUS, vec![status.as_str().to_string()])
            .await
    }

    /// Rewrites Date through Cost. ImageURL is left alone.
    pub async fn update_record(&self, partition: &str, offset: u32, update: &RecordUpdate) -> AppResult<String> {
        let values = vec![
            update.date.clone(),
            update.task_name.clone(),
            update.assignee.clone(),
            update.status.as_str().to_string(),
            update.description.clone(),
            format_cost(update.cost),
        ];
        self.update_fields(partition, offset, COL_DATE, values).await
    }

    async fn touch(&self, partition: &str, offset: u32) -> AppResult<String> {
        let stamp = self.clock.stamp();
        self.backend
            .update_values(
                &CellRange::cell(partition, COL_LAST_UPDATED, offset),
                vec![vec![stamp.clone()]],
            )
            .await?;
        Ok(stamp)
    }

    /// Removes the row at `offset`. Reading the row and cleaning up its linked asset are
    /// best-effort; their outcome is reported but never stops the row removal. Only a
    /// missing partition fails before anything is deleted.
    pub async fn delete_record(&self, partition: &str, offset: u32) -> AppResult<AssetCleanup> {
        check_offset(offset)?;
        let sheet = self
            .find_partition(partition)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Partition {} not found", partition)))?;

        let asset = match self
            .backend
            .get_values(&CellRange::row_span(partition, offset, COL_DATE, COL_LAST_UPDATED))
            .await
        {
            Ok(rows) => self.remove_linked_asset(partition, offset, &rows).await,
            Err(error) => {
                tracing::warn!(error = %error, partition = %partition, offset, "row read before delete failed");
                AssetCleanup::ReadFailed {
                    reason: error.to_string(),
                }
            }
        };

        self.backend.delete_rows(sheet.sheet_id, offset - 1, offset).await?;
        Ok(asset)
    }

    async fn remove_linked_asset(&self, partition: &str, offset: u32, rows: &[Vec<String>]) -> AssetCleanup {
        let url = rows
            .first()
            .and_then(|cells| cells.get(COL_IMAGE as usize))
            .map(|url| url.trim())
            .filter(|url| !url.is_empty());
        let Some(url) = url else {
            return AssetCleanup::None;
        };
        match self.assets.remove(url).await {
            Ok(cleanup) => cleanup,
            Err(error) => {
                tracing::warn!(error = %error, partition = %partition, offset, "asset cleanup failed");
                AssetCleanup::Failed {
                    reason: error.to_string(),
                }
            }
        }
    }

    /// Whole-tab read for metadata partitions. A missing tab reads as empty.
    pub async fn read_tab(&self, name: &str) -> AppResult<Vec<Vec<String>>> {
        match self
            .backend
            .get_values(&CellRange::columns(name, 0, METADATA_LAST_COL))
            .await
        {
            Ok(rows) => Ok(rows),
            Err(AppError::NotFound(_)) => Ok(Vec::new()),
            Err(error) => Err(error),
        }
    }

    /// Replaces a metadata tab's contents, creating the tab when needed.
    pub async fn write_tab(&self, name: &str, rows: Vec<Vec<String>>) -> AppResult<()> {
        self.ensure_partition(name, &[]).await?;
        self.backend
            .clear_values(&CellRange::columns(name, 0, METADATA_LAST_COL))
            .await?;
        if !rows.is_empty() {
            self.backend.update_values(&CellRange::cell(name, 0, 1), rows).await?;
        }
        Ok(())
    }
}

fn check_offset(offset: u32) -> AppResult<()> {
    if offset < FIRST_DATA_ROW {
        return Err(AppError::Validation(format!(
            "Record id must be {} or greater, got {}",
            FIRST_DATA_ROW, offset
        )));
    }
    Ok(())
}

pub fn format_cost(cost: f64) -> String {
    if cost.fract() == 0.0 {
        format!("{:.0}", cost)
    } else {
        cost.to_string()
    }
}

/// Parses a cost cell, tolerating thousands separators. Anything else reads as 0.
pub fn parse_cost(raw: &str) -> f64 {
    raw.replace(',', "")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

fn parse_row(partition: &str, offset: u32, row: &[String]) -> Record {
    let cell = |index: u32| row.get(index as usize).map(|value| value.trim()).unwrap_or("");
    let or_default = |value: &str, default: &str| {
        if value.is_empty() {
            default.to_string()
        } else {
            value.to_string()
        }
    };
    Record {
        id: offset,
        partition: partition.to_string(),
        fields: RecordFields {
            date: cell(0).to_string(),
            task_name: or_default(cell(1), DEFAULT_TASK_NAME),
            assignee: or_default(cell(2), DEFAULT_ASSIGNEE),
            status: RecordStatus::parse(cell(COL_STATUS)).unwrap_or_default(),
            description: cell(4).to_string(),
            cost: parse_cost(cell(COL_COST)),
            image_url: cell(COL_IMAGE).to_string(),
        },
        last_updated: cell(COL_LAST_UPDATED).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{format_cost, parse_cost, AuditClock, TabularStore, RECORD_HEADER};
    use crate::assets::{AssetRemover, NoopAssetRemover};
    use crate::errors::{AppError, AppResult, RemoteFailure};
    use crate::models::{AssetCleanup, RecordFields, RecordStatus, RecordUpdate};
    use crate::sheets::a1::CellRange;
    use crate::sheets::memory::MemorySheets;
    use crate::sheets::{SheetProperties, SheetsBackend};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    fn fields(task: &str, image_url: &str) -> RecordFields {
        RecordFields {
            date: "2024-03-01".to_string(),
            task_name: task.to_string(),
            assignee: "Alice".to_string(),
            status: RecordStatus::Pending,
            description: format!("{} details", task),
            cost: 120.5,
            image_url: image_url.to_string(),
        }
    }

    fn store_with(sheets: Arc<MemorySheets>) -> TabularStore {
        TabularStore::new(sheets, Arc::new(NoopAssetRemover))
    }

    async fn seeded(count: usize) -> (Arc<MemorySheets>, TabularStore) {
        let sheets = Arc::new(MemorySheets::new());
        let store = store_with(sheets.clone());
        store.ensure_partition("03-2024", &RECORD_HEADER).await.expect("ensure");
        for index in 1..=count {
            store
                .append("03-2024", &fields(&format!("task-{}", index), ""))
                .await
                .expect("append");
        }
        (sheets, store)
    }

    #[test]
    fn audit_clock_never_repeats() {
        let clock = AuditClock::default();
        let mut previous = clock.stamp();
        for _ in 0..200 {
            let next = clock.stamp();
            assert!(next > previous, "{} should be after {}", next, previous);
            previous = next;
        }
    }

    #[test]
    fn cost_cells_round_trip_with_separators() {
        assert_eq!(parse_cost("1,500"), 1500.0);
        assert_eq!(parse_cost(" 12.75 "), 12.75);
        assert_eq!(parse_cost("n/a"), 0.0);
        assert_eq!(format_cost(500.0), "500");
        assert_eq!(format_cost(12.5), "12.5");
    }

    #[tokio::test]
    async fn ensure_partition_writes_header_once() {
        let sheets = Arc::new(MemorySheets::new());
        let store = store_with(sheets.clone());
        store.ensure_partition("03-2024", &RECORD_HEADER).await.expect("first");
        store.ensure_partition("03-2024", &RECORD_HEADER).await.expect("second");
        let rows = sheets.snapshot("03-2024").expect("tab exists");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "Date");
        assert_eq!(rows[0][7], "LastUpdated");
    }

    #[tokio::test]
    async fn append_then_list_returns_equal_fields_newest_first() {
        let (_, store) = seeded(3).await;
        let records = store.list("03-2024").await.expect("list");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, 4);
        assert_eq!(records[0].fields, fields("task-3", ""));
        assert_eq!(records[2].id, 2);
        assert_eq!(records[2].fields.task_name, "task-1");
        assert!(!records[0].last_updated.is_empty());
    }

    #[tokio::test]
    async fn short_rows_fill_defaults() {
        let sheets = Arc::new(MemorySheets::new());
        let store = store_with(sheets.clone());
        store.ensure_partition("03-2024", &RECORD_HEADER).await.expect("ensure");
        SheetsBackend::append_values(
            sheets.as_ref(),
            &CellRange::columns("03-2024", 0, 7),
            vec![vec!["2024-03-02".to_string()]],
        )
        .await
        .expect("append");

        let records = store.list("03-2024").await.expect("list");
        assert_eq!(records[0].fields.task_name, "Untitled Task");
        assert_eq!(records[0].fields.assignee, "Unassigned");
        assert_eq!(records[0].fields.status, RecordStatus::Pending);
        assert_eq!(records[0].fields.cost, 0.0);
    }

    #[tokio::test]
    async fn every_update_advances_last_updated() {
        let (_, store) = seeded(1).await;
        let mut previous = store.list("03-2024").await.expect("list")[0].last_updated.clone();
        for status in [RecordStatus::InProgress, RecordStatus::Completed, RecordStatus::Completed] {
            let stamp = store.update_status("03-2024", 2, status).await.expect("update");
            let listed = store.list("03-2024").await.expect("list");
            assert_eq!(listed[0].last_updated, stamp);
            assert_eq!(listed[0].fields.status, status);
            assert!(stamp > previous);
            previous = stamp;
        }
    }

    #[tokio::test]
    async fn update_record_rewrites_data_columns_only() {
        let (_, store) = seeded(1).await;
        store
            .append("03-2024", &fields("with-image", "https://drive.google.com/file/d/abc/view"))
            .await
            .expect("append");
        store
            .update_record(
                "03-2024",
                3,
                &RecordUpdate {
                    date: "2024-03-05".to_string(),
                    task_name: "Renamed".to_string(),
                    assignee: "Bob".to_string(),
                    status: RecordStatus::Completed,
                    description: "done".to_string(),
                    cost: 10.0,
                },
            )
            .await
            .expect("update");

        let record = store
            .list("03-2024")
            .await
            .expect("list")
            .into_iter()
            .find(|record| record.id == 3)
            .expect("row 3");
        assert_eq!(record.fields.task_name, "Renamed");
        assert_eq!(record.fields.cost, 10.0);
        assert_eq!(record.fields.image_url, "https://drive.google.com/file/d/abc/view");
    }

    #[tokio::test]
    async fn header_offsets_and_store_column_are_rejected() {
        let (_, store) = seeded(1).await;
        let error = store
            .update_status("03-2024", 1, RecordStatus::Completed)
            .await
            .expect_err("header row");
        assert!(matches!(error, AppError::Validation(_)));
        let error = store
            .update_fields("03-2024", 2, 6, vec!["x".to_string(), "y".to_string()])
            .await
            .expect_err("touches LastUpdated");
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_shifts_later_offsets_down() {
        let (_, store) = seeded(5).await;
        // offsets 2..=6 hold task-1..task-5
        store.delete_record("03-2024", 4).await.expect("delete");

        let records = store.list("03-2024").await.expect("list");
        assert_eq!(records.len(), 4);
        let by_offset: Vec<(u32, String)> = records
            .iter()
            .rev()
            .map(|record| (record.id, record.fields.task_name.clone()))
            .collect();
        assert_eq!(
            by_offset,
            vec![
                (2, "task-1".to_string()),
                (3, "task-2".to_string()),
                (4, "task-4".to_string()),
                (5, "task-5".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn delete_in_missing_partition_is_not_found() {
        let (_, store) = seeded(2).await;
        let error = store.delete_record("04-2024", 2).await.expect_err("missing partition");
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn blank_rows_are_still_deleted() {
        let (sheets, store) = seeded(2).await;
        SheetsBackend::clear_values(sheets.as_ref(), &CellRange::row_span("03-2024", 2, 0, 7))
            .await
            .expect("blank row 2");
        let ids: Vec<u32> = store.list("03-2024").await.expect("list").iter().map(|record| record.id).collect();
        assert_eq!(ids, vec![3, 2]);

        let cleanup = store.delete_record("03-2024", 2).await.expect("delete blank row");
        assert_eq!(cleanup, AssetCleanup::None);
        let records = store.list("03-2024").await.expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields.task_name, "task-2");
    }

    /// Delegates to memory but refuses reads bounded to specific rows.
    struct RowReadsFail(Arc<MemorySheets>);

    #[async_trait]
    impl SheetsBackend for RowReadsFail {
        async fn list_sheets(&self) -> AppResult<Vec<SheetProperties>> {
            self.0.list_sheets().await
        }

        async fn add_sheet(&self, title: &str, header: Option<&[String]>) -> AppResult<SheetProperties> {
            self.0.add_sheet(title, header).await
        }

        async fn get_values(&self, range: &CellRange) -> AppResult<Vec<Vec<String>>> {
            if range.last_row().is_some() {
                return Err(AppError::remote("sheets", RemoteFailure::Other, "transient read failure"));
            }
            self.0.get_values(range).await
        }

        async fn update_values(&self, range: &CellRange, rows: Vec<Vec<String>>) -> AppResult<()> {
            self.0.update_values(range, rows).await
        }

        async fn append_values(&self, range: &CellRange, rows: Vec<Vec<String>>) -> AppResult<()> {
            self.0.append_values(range, rows).await
        }

        async fn clear_values(&self, range: &CellRange) -> AppResult<()> {
            self.0.clear_values(range).await
        }

        async fn delete_rows(&self, sheet_id: i64, start: u32, end: u32) -> AppResult<()> {
            self.0.delete_rows(sheet_id, start, end).await
        }
    }

    #[tokio::test]
    async fn failed_row_read_still_deletes_the_row() {
        let (sheets, _) = seeded(2).await;
        let store = TabularStore::new(Arc::new(RowReadsFail(sheets.clone())), Arc::new(NoopAssetRemover));

        let cleanup = store.delete_record("03-2024", 2).await.expect("delete despite read failure");
        assert!(matches!(cleanup, AssetCleanup::ReadFailed { ref reason } if reason.contains("transient")));
        let rows = sheets.snapshot("03-2024").expect("partition");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], "task-2");
    }

    struct FailingRemover {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AssetRemover for FailingRemover {
        async fn remove(&self, url: &str) -> AppResult<AssetCleanup> {
            self.seen.lock().expect("seen").push(url.to_string());
            Err(AppError::remote("drive", RemoteFailure::Auth, "forbidden"))
        }
    }

    #[tokio::test]
    async fn asset_cleanup_failure_is_reported_not_fatal() {
        let sheets = Arc::new(MemorySheets::new());
        let remover = Arc::new(FailingRemover {
            seen: Mutex::new(Vec::new()),
        });
        let store = TabularStore::new(sheets, remover.clone());
        store.ensure_partition("03-2024", &RECORD_HEADER).await.expect("ensure");
        store
            .append("03-2024", &fields("photo", "https://drive.google.com/uc?id=file-1"))
            .await
            .expect("append");

        let cleanup = store.delete_record("03-2024", 2).await.expect("delete succeeds");
        assert!(matches!(cleanup, AssetCleanup::Failed { .. }));
        assert_eq!(remover.seen.lock().expect("seen").len(), 1);
        assert!(store.list("03-2024").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn metadata_tabs_are_overwritten_wholesale() {
        let sheets = Arc::new(MemorySheets::new());
        let store = store_with(sheets.clone());
        assert!(store.read_tab("_SYS_CONFIG").await.expect("read").is_empty());

        let row = |a: &str, b: &str| vec![a.to_string(), b.to_string()];
        store
            .write_tab("_SYS_CONFIG", vec![row("key", "value"), row("a", "1"), row("b", "2")])
            .await
            .expect("write");
        store
            .write_tab("_SYS_CONFIG", vec![row("key", "value"), row("a", "3")])
            .await
            .expect("rewrite");

        let rows = store.read_tab("_SYS_CONFIG").await.expect("read");
        assert_eq!(rows, vec![row("key", "value"), row("a", "3")]);
    }
}
