use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::supabase::SupabaseError;
use crate::ErrorKind;

/// One row of source data. Field order follows the source response.
pub type Record = Map<String, Value>;

/// Bulk read access to a named collection.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Record>, SupabaseError>;
}

#[derive(Debug, thiserror::Error, ErrorKind)]
pub enum FetchError {
    #[error("failed to fetch {collection}: {source}")]
    #[error_kind(Fetch, "could not read {collection}")]
    Source {
        collection: String,
        #[source]
        source: SupabaseError,
    },
}

/// Read every record of `collection`, keeping the failure.
pub async fn try_fetch_records<S>(source: &S, collection: &str) -> Result<Vec<Record>, FetchError>
where
    S: RecordSource + ?Sized,
{
    source
        .fetch_all(collection)
        .await
        .map_err(|source| FetchError::Source {
            collection: collection.to_string(),
            source,
        })
}

/// Read every record of `collection`, treating any failure as an empty collection.
pub async fn fetch_records<S>(source: &S, collection: &str) -> Vec<Record>
where
    S: RecordSource + ?Sized,
{
    match try_fetch_records(source, collection).await {
        Ok(records) => {
            if records.is_empty() {
                tracing::info!(collection, "no records found");
            } else {
                tracing::info!(collection, count = records.len(), "fetched records");
            }
            records
        }
        Err(err) => {
            tracing::error!(collection, kind = %err.kind(), error = %err, "failed to fetch records");
            Vec::new()
        }
    }
}
