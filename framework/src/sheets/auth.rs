use std::path::Path;
use std::time::Duration;

use jwt::algorithm::openssl::PKeyWithDigest;
use jwt::header::HeaderType;
use jwt::{AlgorithmType, Header, SignWithKey, Token};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::SheetsError;

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.readonly",
];

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME: time::Duration = time::Duration::hours(1);
// Refresh a cached token this long before it expires
const EXPIRY_MARGIN: time::Duration = time::Duration::seconds(60);

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The fields of a Google service account JSON key this crate uses.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SheetsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| SheetsError::Credentials {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    access_token: String,
    expires_at: OffsetDateTime,
}

/// OAuth access tokens for a service account via the JWT bearer grant.
///
/// Tokens are cached until shortly before they expire.
pub struct ServiceAccount {
    key: ServiceAccountKey,
    signing_key: PKey<Private>,
    http: reqwest::Client,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccount {
    pub fn new(key: ServiceAccountKey, timeout: Duration) -> Result<Self, SheetsError> {
        let signing_key = PKey::private_key_from_pem(key.private_key.as_bytes())?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            key,
            signing_key,
            http,
            scope: SCOPES.join(" "),
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Signed RS256 assertion for the token endpoint.
    pub fn assertion(&self, now: OffsetDateTime) -> Result<String, SheetsError> {
        let header = Header {
            algorithm: AlgorithmType::Rs256,
            key_id: self.key.private_key_id.clone(),
            type_: Some(HeaderType::JsonWebToken),
            ..Default::default()
        };
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat: now.unix_timestamp(),
            exp: (now + ASSERTION_LIFETIME).unix_timestamp(),
        };
        let signer = PKeyWithDigest {
            digest: MessageDigest::sha256(),
            key: self.signing_key.clone(),
        };

        let token = Token::new(header, claims).sign_with_key(&signer)?;
        Ok(token.as_str().to_string())
    }

    /// A valid access token, exchanging a fresh assertion when needed.
    pub async fn access_token(&self) -> Result<String, SheetsError> {
        let mut cached = self.cached.lock().await;
        let now = OffsetDateTime::now_utc();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - EXPIRY_MARGIN > now {
                return Ok(token.access_token.clone());
            }
        }

        let assertion = self.assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Status { status, body });
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!(
            account = %self.key.client_email,
            expires_in = token.expires_in,
            "obtained access token"
        );

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: now + time::Duration::seconds(token.expires_in),
        });
        Ok(access_token)
    }
}
