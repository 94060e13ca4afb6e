//! CSV export of the active schedule.

use crate::types::{DueStatus, EntryKind, ScheduleItem};
use crate::Result;
use std::io::Write;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    name: &'a str,
    kind: EntryKind,
    due_date: Option<String>,
    status: DueStatus,
    completed: bool,
    note: Option<&'a str>,
}

impl<'a> From<&'a ScheduleItem> for CsvRow<'a> {
    fn from(item: &'a ScheduleItem) -> Self {
        CsvRow {
            id: &item.entry.id,
            name: &item.entry.name,
            kind: item.kind,
            due_date: item.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
            status: item.status,
            completed: item.completed,
            note: item.note.as_deref(),
        }
    }
}

/// Write schedule rows as CSV with a header line
pub fn write_schedule_csv<W: Write>(items: &[ScheduleItem], writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    if items.is_empty() {
        // serde only emits headers alongside the first record
        writer.write_record([
            "id", "name", "kind", "due_date", "status", "completed", "note",
        ])?;
    }
    for item in items {
        writer.serialize(CsvRow::from(item))?;
    }
    writer.flush()?;
    Ok(())
}

/// Export the schedule to a CSV file, replacing it if it exists
///
/// Returns the number of rows written.
pub fn export_schedule(items: &[ScheduleItem], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(path)?;
    write_schedule_csv(items, &file)?;
    file.sync_all()?;

    tracing::info!("Exported {} schedule rows to {:?}", items.len(), path);
    Ok(items.len())
}
