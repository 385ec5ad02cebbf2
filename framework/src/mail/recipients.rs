//! Recipient list loaders.
//!
//! Every loader drops duplicate addresses: the first occurrence keeps its
//! position in the list, the last occurrence supplies the name.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
}

impl Recipient {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn named(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, thiserror::Error, ErrorKind)]
pub enum RecipientError {
    #[error("cannot read {path}: {source}")]
    #[error_kind(Input, "cannot read recipient list {path:?}")]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed CSV: {0}")]
    #[error_kind(Input)]
    Csv(#[from] csv::Error),
}

/// Lines of tab-separated fields: the first field is the name, the last the address.
///
/// Lines with fewer than two fields are skipped.
pub fn parse_tab_separated(text: &str) -> Vec<Recipient> {
    let parsed = text.lines().filter_map(|line| {
        let fields: Vec<&str> = line.trim().split('\t').collect();
        if fields.len() < 2 {
            return None;
        }
        let name = fields[0].trim();
        let email = fields[fields.len() - 1].trim();
        if email.is_empty() {
            return None;
        }
        Some(Recipient::named(email, name))
    });
    dedupe(parsed)
}

pub fn load_tab_separated(path: impl AsRef<Path>) -> Result<Vec<Recipient>, RecipientError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| RecipientError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_tab_separated(&text))
}

#[derive(Deserialize)]
struct InviteeRow {
    #[serde(rename = "Invitee Email", default)]
    email: String,
    #[serde(rename = "Invitee First Name", default)]
    first_name: String,
}

/// CSV with an `Invitee Email` and `Invitee First Name` header. Other columns are ignored.
pub fn parse_csv<R: io::Read>(reader: R) -> Result<Vec<Recipient>, RecipientError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let mut parsed = Vec::new();
    for row in reader.deserialize::<InviteeRow>() {
        let row = row?;
        let email = row.email.trim();
        if email.is_empty() {
            continue;
        }
        parsed.push(Recipient::named(email, row.first_name.trim()));
    }
    Ok(dedupe(parsed))
}

pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Recipient>, RecipientError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| RecipientError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_csv(file)
}

/// Bare addresses. Entries without an `@` are dropped.
pub fn parse_inline<I, S>(entries: I) -> Vec<Recipient>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parsed = entries
        .into_iter()
        .map(|entry| entry.as_ref().trim().to_string())
        .filter(|entry| entry.contains('@'))
        .map(Recipient::new);
    dedupe(parsed)
}

/// Remove duplicate addresses, keeping first position and last name.
pub fn dedupe(recipients: impl IntoIterator<Item = Recipient>) -> Vec<Recipient> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Recipient> = Vec::new();

    for recipient in recipients {
        match index.get(&recipient.email) {
            Some(&at) => {
                tracing::debug!(email = %recipient.email, "duplicate recipient");
                unique[at].name = recipient.name;
            }
            None => {
                index.insert(recipient.email.clone(), unique.len());
                unique.push(recipient);
            }
        }
    }
    unique
}
