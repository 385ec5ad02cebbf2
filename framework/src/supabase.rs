//! Supabase REST client: PostgREST reads and GoTrue admin user lookups.
//!
//! Both calls authenticate with the project's service role key, which bypasses row level
//! security and is required by the admin users endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::pipeline::{Identity, IdentityLookup, Record, RecordSource};

/// Transport level failure talking to Supabase.
///
/// Carries no [`ErrorKind`](crate::ErrorKind) of its own: the same failure is a `Fetch`
/// error when reading a collection and a `Resolution` error when looking up a user. The
/// pipeline wraps it as [`FetchError`](crate::pipeline::FetchError) or
/// [`LookupError`](crate::pipeline::LookupError) at those two call sites.
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("supabase responded {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("invalid supabase url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("supabase url cannot carry a path: {0}")]
    BaseUrl(String),
}

/// Thin client over a Supabase project's REST surface.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base: Url,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(
        url: &str,
        service_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SupabaseError> {
        let base = Url::parse(url)?;
        if base.cannot_be_a_base() {
            return Err(SupabaseError::BaseUrl(url.to_string()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base,
            service_key: service_key.into(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SupabaseError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SupabaseError::BaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// `select *` over one collection.
    pub async fn select_all(&self, collection: &str) -> Result<Vec<Record>, SupabaseError> {
        let url = self.endpoint(&["rest", "v1", collection])?;
        let response = self.get(url).query(&[("select", "*")]).send().await?;
        let response = error_for_status(response).await?;
        Ok(response.json::<Vec<Record>>().await?)
    }

    /// Fetch one auth user by id. A 404 means no such user.
    pub async fn admin_user(&self, id: &str) -> Result<Option<AdminUser>, SupabaseError> {
        let url = self.endpoint(&["auth", "v1", "admin", "users", id])?;
        let response = self.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = error_for_status(response).await?;
        Ok(Some(response.json::<AdminUser>().await?))
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, SupabaseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SupabaseError::Status { status, body })
}

/// The subset of a GoTrue user this crate reads.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
impl RecordSource for SupabaseClient {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Record>, SupabaseError> {
        self.select_all(collection).await
    }
}

#[async_trait]
impl IdentityLookup for SupabaseClient {
    async fn lookup(&self, id: &str) -> Result<Option<Identity>, SupabaseError> {
        let user = self.admin_user(id).await?;
        Ok(user.map(|user| Identity { email: user.email }))
    }
}
