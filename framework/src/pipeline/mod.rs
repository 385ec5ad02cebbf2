//! Supabase to Google Sheets transfer.
//!
//! A run moves strictly forward through four stages:
//!
//! 1. **fetch** every record of the source collection ([`RecordSource`])
//! 2. **resolve** each distinct `createdBy` id to an email ([`IdentityLookup`])
//! 3. **transform** records into a [`Table`] ([`transform()`])
//! 4. **write** the table over the destination worksheet ([`Sink`])
//!
//! ```text
//! Start -> Fetched -> Resolved -> Transformed -> Written
//!             |                        |             |
//!             +-> NoOp (no records)    +-------------+-> Failed
//! ```
//!
//! Fetch failures and individual lookup failures are absorbed (an empty record set and a
//! sentinel email respectively). Key policy violations and write failures end the run in
//! [`PipelineState::Failed`] and are returned as a [`SyncError`].
//!
//! ```ignore
//! let config = SyncConfig::load()?;
//! let supabase = SupabaseClient::new(&config.supabase_url, &config.supabase_service_key, config.timeout())?;
//! let sheets = GoogleSheets::from_credentials_file(&config.google_sheets_credentials_path, config.timeout())?;
//!
//! let outcome = SyncPipeline::new(supabase.clone(), supabase, sheets, config.target())
//!     .layout(config.layout())
//!     .run()
//!     .await?;
//! ```

mod resolve;
mod sink;
mod source;
mod transform;

pub use resolve::{
    display_value, lookup_identity, resolve_identities, Identity, IdentityLookup, LookupError,
    Resolutions, EMAIL_NOT_FOUND, LOOKUP_FAILED, USER_NOT_FOUND,
};
pub use sink::{MemorySink, SheetTarget, Sink};
pub use source::{fetch_records, try_fetch_records, FetchError, Record, RecordSource};
pub use transform::{
    collect_identifiers, compare_keys, normalize, transform, KeyPolicy, Table, TableLayout,
    TransformError, APPLICATION_COLUMNS, UNRESOLVED,
};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::config::{load_dotenv, require_env, ConfigError, EnvConfig};
use crate::sheets::SheetsError;
use crate::ErrorKind;

const PREVIEW_ROWS: usize = 5;

/// Settings for a sync run, read from the environment.
///
/// | Variable | Required | Description |
/// |----------|----------|-------------|
/// | `SUPABASE_URL` | Yes | Project URL |
/// | `SUPABASE_SERVICE_KEY` | Yes | Service role key (`SUPABASE_ANON_KEY` is accepted as an alias) |
/// | `GOOGLE_SHEETS_CREDENTIALS_PATH` | Yes, except dry runs | Service account JSON key file |
/// | `GOOGLE_SHEET_NAME` | Yes, except dry runs | Workbook name |
/// | `GOOGLE_SHEET_WORKSHEET_NAME` | Yes, except dry runs | Worksheet (tab) title |
/// | `SUPABASE_TABLE` | No | Source collection (default: `applications`) |
/// | `KEY_POLICY` | No | `strict` (default) or `lenient` |
/// | `RESOLVE_CONCURRENCY` | No | Lookups in flight (default: 1) |
/// | `HTTP_TIMEOUT_SECONDS` | No | Per request timeout (default: 30) |
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub supabase_url: String,
    #[serde(alias = "supabase_anon_key")]
    pub supabase_service_key: String,
    #[serde(default = "default_table")]
    pub supabase_table: String,
    #[serde(default)]
    pub google_sheets_credentials_path: PathBuf,
    #[serde(default)]
    pub google_sheet_name: String,
    #[serde(default)]
    pub google_sheet_worksheet_name: String,
    #[serde(default)]
    pub key_policy: KeyPolicy,
    #[serde(default = "default_concurrency")]
    pub resolve_concurrency: usize,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_table() -> String {
    "applications".to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_http_timeout() -> u64 {
    30
}

impl SyncConfig {
    pub const SOURCE_REQUIRED: &'static [&'static str] =
        &["SUPABASE_URL", "SUPABASE_SERVICE_KEY|SUPABASE_ANON_KEY"];

    pub const REQUIRED: &'static [&'static str] = &[
        "SUPABASE_URL",
        "SUPABASE_SERVICE_KEY|SUPABASE_ANON_KEY",
        "GOOGLE_SHEETS_CREDENTIALS_PATH",
        "GOOGLE_SHEET_NAME",
        "GOOGLE_SHEET_WORKSHEET_NAME",
    ];

    /// Read `.env` and the environment, failing before any I/O if a required key is unset.
    pub fn load() -> Result<Self, ConfigError> {
        load_dotenv();
        require_env(Self::REQUIRED)?;
        Self::from_env()
    }

    /// Like [`load`](Self::load), but only the Supabase keys are required.
    ///
    /// For runs that never write to Google Sheets.
    pub fn load_for_dry_run() -> Result<Self, ConfigError> {
        load_dotenv();
        require_env(Self::SOURCE_REQUIRED)?;
        Self::from_env()
    }

    pub fn target(&self) -> SheetTarget {
        SheetTarget::new(&self.google_sheet_name, &self.google_sheet_worksheet_name)
    }

    pub fn layout(&self) -> TableLayout {
        TableLayout::applications().key_policy(self.key_policy)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Fetched,
    Resolved,
    Transformed,
    Written,
    /// The source had no records. Nothing was looked up or written.
    NoOp,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Written | PipelineState::NoOp | PipelineState::Failed
        )
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub state: PipelineState,
    /// Data rows written, not counting the header.
    pub rows: usize,
}

#[derive(Debug, thiserror::Error, ErrorKind)]
pub enum SyncError {
    #[error(transparent)]
    #[error_kind(Transform)]
    Transform(#[from] TransformError),

    #[error("failed to write {target}: {source}")]
    #[error_kind(Write, "could not update {target}")]
    Write {
        target: SheetTarget,
        #[source]
        source: SheetsError,
    },
}

/// One sync run with injected source, lookup, and sink.
pub struct SyncPipeline<S, L, K> {
    source: S,
    lookup: Arc<L>,
    sink: K,
    target: SheetTarget,
    collection: String,
    layout: TableLayout,
    concurrency: usize,
    state: PipelineState,
}

impl<S, L, K> SyncPipeline<S, L, K>
where
    S: RecordSource,
    L: IdentityLookup,
    K: Sink,
{
    pub fn new(source: S, lookup: L, sink: K, target: SheetTarget) -> Self {
        Self {
            source,
            lookup: Arc::new(lookup),
            sink,
            target,
            collection: default_table(),
            layout: TableLayout::applications(),
            concurrency: default_concurrency(),
            state: PipelineState::Start,
        }
    }

    /// Source collection to read (default: `applications`).
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn layout(mut self, layout: TableLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Maximum identity lookups in flight (default: 1, sequential).
    pub fn resolve_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub async fn run(&mut self) -> Result<SyncOutcome, SyncError> {
        self.state = PipelineState::Start;

        let records = fetch_records(&self.source, &self.collection).await;
        self.advance(PipelineState::Fetched);

        if records.is_empty() {
            self.advance(PipelineState::NoOp);
            tracing::info!(collection = %self.collection, "no records to transfer");
            return Ok(SyncOutcome {
                state: PipelineState::NoOp,
                rows: 0,
            });
        }

        let ids = collect_identifiers(&records, &self.layout.identity_field);
        tracing::debug!(count = ids.len(), "resolving identities");
        let resolutions = resolve_identities(self.lookup.clone(), ids, self.concurrency).await;
        self.advance(PipelineState::Resolved);

        let table = match transform(records, &resolutions, &self.layout) {
            Ok(table) => table,
            Err(err) => return Err(self.fail(err.into())),
        };
        self.advance(PipelineState::Transformed);
        preview(&table);

        if let Err(source) = self.sink.replace(&self.target, &table).await {
            let target = self.target.clone();
            return Err(self.fail(SyncError::Write { target, source }));
        }
        self.advance(PipelineState::Written);

        tracing::info!(rows = table.len(), target = %self.target, "transferred rows");
        Ok(SyncOutcome {
            state: PipelineState::Written,
            rows: table.len(),
        })
    }

    fn advance(&mut self, next: PipelineState) {
        tracing::debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }

    fn fail(&mut self, err: SyncError) -> SyncError {
        self.advance(PipelineState::Failed);
        tracing::error!(kind = %err.kind(), error = %err, "sync failed");
        err
    }
}

fn preview(table: &Table) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    tracing::debug!(columns = ?table.header, "preview");
    for row in table.rows.iter().take(PREVIEW_ROWS) {
        tracing::debug!(?row, "preview");
    }
}
