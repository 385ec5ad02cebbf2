//! Google Sheets destination.
//!
//! Authenticates as a service account (the workbook must be shared with the service
//! account's email), finds the workbook by name through Drive, and replaces a worksheet's
//! contents with a single `batchUpdate`. The service applies a batch atomically, so a
//! failed run never leaves the worksheet cleared but unwritten.

mod auth;
mod client;

pub use auth::{ServiceAccount, ServiceAccountKey, SCOPES};
pub use client::{Endpoints, GoogleSheets};

use std::path::PathBuf;

use reqwest::StatusCode;

use crate::ErrorKind;

#[derive(Debug, thiserror::Error, ErrorKind)]
pub enum SheetsError {
    #[error("cannot read credentials {path}: {source}")]
    #[error_kind(Config, "cannot read credentials {path:?}")]
    Credentials {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed service account key: {0}")]
    #[error_kind(Config)]
    Key(#[from] serde_json::Error),

    #[error("cannot load private key: {0}")]
    #[error_kind(Config)]
    PrivateKey(#[from] openssl::error::ErrorStack),

    #[error("cannot sign token request: {0}")]
    #[error_kind(Write)]
    Sign(#[from] jwt::Error),

    #[error("HTTP request failed: {0}")]
    #[error_kind(Write)]
    Http(#[from] reqwest::Error),

    #[error("google responded {status}: {body}")]
    #[error_kind(Write)]
    Status { status: StatusCode, body: String },

    #[error("invalid endpoint url: {0}")]
    #[error_kind(Config)]
    Url(#[from] url::ParseError),

    #[error("no spreadsheet named '{0}' is shared with the service account")]
    #[error_kind(Write)]
    WorkbookNotFound(String),

    #[error("spreadsheet '{workbook}' has no worksheet '{worksheet}'")]
    #[error_kind(Write)]
    WorksheetNotFound { workbook: String, worksheet: String },
}
