use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::transform::Table;
use crate::sheets::SheetsError;

/// A worksheet addressed by workbook name and tab title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub workbook: String,
    pub worksheet: String,
}

impl SheetTarget {
    pub fn new(workbook: impl Into<String>, worksheet: impl Into<String>) -> Self {
        Self {
            workbook: workbook.into(),
            worksheet: worksheet.into(),
        }
    }
}

impl std::fmt::Display for SheetTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' - '{}'", self.workbook, self.worksheet)
    }
}

/// Tabular destination that is fully replaced on every run.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Replace everything in `target` with the table's header and rows.
    async fn replace(&self, target: &SheetTarget, table: &Table) -> Result<(), SheetsError>;
}

/// In-memory [`Sink`] for dry runs and testing. Keeps every write in order.
#[derive(Clone, Default)]
pub struct MemorySink {
    writes: Arc<Mutex<Vec<(SheetTarget, Table)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn writes(&self) -> Vec<(SheetTarget, Table)> {
        self.writes.lock().await.clone()
    }

    /// The table most recently written to `target`.
    pub async fn contents(&self, target: &SheetTarget) -> Option<Table> {
        let writes = self.writes.lock().await;
        writes
            .iter()
            .rev()
            .find(|(t, _)| t == target)
            .map(|(_, table)| table.clone())
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn replace(&self, target: &SheetTarget, table: &Table) -> Result<(), SheetsError> {
        let mut writes = self.writes.lock().await;
        writes.push((target.clone(), table.clone()));
        Ok(())
    }
}
