use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::supabase::SupabaseError;
use crate::ErrorKind;

pub const EMAIL_NOT_FOUND: &str = "Email Not Found";
pub const USER_NOT_FOUND: &str = "User Not Found";
pub const LOOKUP_FAILED: &str = "Error Fetching Email";

/// What an identity lookup knows about a user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub email: Option<String>,
}

/// Point lookup of one identity by its opaque id.
///
/// `Ok(None)` means the lookup worked and no such identity exists.
#[async_trait]
pub trait IdentityLookup: Send + Sync + 'static {
    async fn lookup(&self, id: &str) -> Result<Option<Identity>, SupabaseError>;
}

#[derive(Debug, thiserror::Error, ErrorKind)]
pub enum LookupError {
    #[error("failed to look up user {id}: {source}")]
    #[error_kind(Resolution, "could not look up user {id}")]
    Lookup {
        id: String,
        #[source]
        source: SupabaseError,
    },
}

/// Look up one identity, keeping the failure.
pub async fn lookup_identity<L>(lookup: &L, id: &str) -> Result<Option<Identity>, LookupError>
where
    L: IdentityLookup + ?Sized,
{
    lookup
        .lookup(id)
        .await
        .map_err(|source| LookupError::Lookup {
            id: id.to_string(),
            source,
        })
}

/// Identifier to display value, one entry per identifier that was looked up.
pub type Resolutions = HashMap<String, String>;

/// Map a single lookup outcome to the value shown in the sheet.
pub fn display_value(outcome: Result<Option<Identity>, LookupError>) -> String {
    match outcome {
        Ok(Some(Identity { email: Some(email) })) if !email.trim().is_empty() => email,
        Ok(Some(_)) => EMAIL_NOT_FOUND.to_string(),
        Ok(None) => USER_NOT_FOUND.to_string(),
        Err(err) => {
            tracing::error!(kind = %err.kind(), error = %err, "failed to look up user");
            LOOKUP_FAILED.to_string()
        }
    }
}

/// Resolve every identifier, at most `concurrency` lookups in flight.
///
/// A failed lookup only affects its own identifier. Every input identifier has an entry in
/// the result.
pub async fn resolve_identities<L>(lookup: Arc<L>, ids: Vec<String>, concurrency: usize) -> Resolutions
where
    L: IdentityLookup,
{
    let mut resolved = Resolutions::with_capacity(ids.len());

    if concurrency <= 1 {
        for id in ids {
            let outcome = lookup_identity(lookup.as_ref(), &id).await;
            let value = display_value(outcome);
            resolved.insert(id, value);
        }
        return resolved;
    }

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    for id in ids.iter().cloned() {
        let lookup = lookup.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let outcome = lookup_identity(lookup.as_ref(), &id).await;
            let value = display_value(outcome);
            (id, value)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, value)) => {
                resolved.insert(id, value);
            }
            Err(err) => tracing::error!(error = %err, "lookup task failed"),
        }
    }

    // A panicked task leaves its identifier unresolved
    for id in ids {
        resolved.entry(id).or_insert_with(|| LOOKUP_FAILED.to_string());
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_value_covers_every_outcome() {
        let found = Ok(Some(Identity {
            email: Some("a@x.com".into()),
        }));
        assert_eq!(display_value(found), "a@x.com");

        let blank = Ok(Some(Identity {
            email: Some("  ".into()),
        }));
        assert_eq!(display_value(blank), EMAIL_NOT_FOUND);

        let absent = Ok(Some(Identity { email: None }));
        assert_eq!(display_value(absent), EMAIL_NOT_FOUND);

        assert_eq!(display_value(Ok(None)), USER_NOT_FOUND);

        let failed = LookupError::Lookup {
            id: "u1".into(),
            source: SupabaseError::Status {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: "upstream".into(),
            },
        };
        assert_eq!(failed.kind(), ErrorKind::Resolution);
        assert!(!failed.kind().is_fatal());
        assert_eq!(failed.summary(), "could not look up user u1");
        assert_eq!(display_value(Err(failed)), LOOKUP_FAILED);
    }
}
