//! Turns fetched records into the table written to the sheet.
//!
//! The steps run in a fixed order: merge resolved identities, order columns, sort rows by
//! primary key, then normalize cells to text. Sorting looks at the original JSON values, so
//! normalization must come last.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::io;

use serde::Deserialize;
use serde_json::Value;

use super::resolve::Resolutions;
use super::source::Record;
use crate::ErrorKind;

/// Cell value for records whose identifier was never looked up.
pub const UNRESOLVED: &str = "N/A";

/// Preferred column order for the applications sheet.
pub const APPLICATION_COLUMNS: &[&str] = &[
    "id",
    "email",
    "firstName",
    "lastName",
    "city",
    "country",
    "phone",
    "ieltsScore",
    "satScore",
    "schoolName",
    "grade",
    "gpa",
    "parentPhone",
    "fieldsOfInterest",
    "researchInterest",
    "motivation",
    "financialAid",
    "noFinancialAidMoney",
    "extracurriculars",
    "parentFirstName",
    "parentLastName",
    "additionalInfo",
    "createdAt",
];

/// What to do with records whose primary key is missing or repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
    /// Refuse to produce a table.
    #[default]
    Strict,
    /// Warn and keep going. Missing keys sort last, duplicates keep input order.
    Lenient,
}

#[derive(Debug, thiserror::Error, ErrorKind)]
pub enum TransformError {
    #[error("record {index} has no `{field}` value")]
    #[error_kind(Transform)]
    MissingKey { index: usize, field: String },

    #[error("`{field}` value {key} appears on more than one record")]
    #[error_kind(Transform)]
    DuplicateKey { key: String, field: String },
}

/// Field names the transformer works with.
#[derive(Debug, Clone)]
pub struct TableLayout {
    /// Preferred column order. Fields not listed follow in first-seen order.
    pub columns: Vec<String>,
    pub primary_key: String,
    /// Field holding the raw identifier. Removed from the output.
    pub identity_field: String,
    /// Field that receives the resolved identity.
    pub resolved_field: String,
    pub key_policy: KeyPolicy,
}

impl TableLayout {
    pub fn applications() -> Self {
        Self {
            columns: APPLICATION_COLUMNS.iter().map(|c| c.to_string()).collect(),
            primary_key: "id".into(),
            identity_field: "createdBy".into(),
            resolved_field: "email".into(),
            key_policy: KeyPolicy::Strict,
        }
    }

    pub fn key_policy(mut self, key_policy: KeyPolicy) -> Self {
        self.key_policy = key_policy;
        self
    }

    /// Preferred columns that are present, then every other present column in its
    /// existing order.
    pub fn order_columns(&self, present: &[String]) -> Vec<String> {
        let present_set: HashSet<&str> = present.iter().map(String::as_str).collect();
        let mut ordered: Vec<String> = self
            .columns
            .iter()
            .filter(|c| present_set.contains(c.as_str()))
            .cloned()
            .collect();

        let placed: HashSet<String> = ordered.iter().cloned().collect();
        ordered.extend(present.iter().filter(|c| !placed.contains(*c)).cloned());
        ordered
    }
}

impl Default for TableLayout {
    fn default() -> Self {
        Self::applications()
    }
}

/// Header plus rows of printable cells.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header followed by the rows, the shape the sheet expects.
    pub fn to_values(&self) -> Vec<Vec<String>> {
        std::iter::once(self.header.clone())
            .chain(self.rows.iter().cloned())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.header.iter().position(|h| h == name)?;
        Some(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&self.header)?;
        for row in &self.rows {
            csv.write_record(row)?;
        }
        csv.flush()?;
        Ok(())
    }
}

/// Distinct, non-null identifiers in first-seen order.
pub fn collect_identifiers(records: &[Record], field: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| record.get(field).and_then(identifier_of))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn identifier_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Union of field names across records, in first-seen order.
fn union_columns(records: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for record in records {
        for field in record.keys() {
            if seen.insert(field.as_str()) {
                columns.push(field.clone());
            }
        }
    }
    columns
}

/// Build the output table from fetched records and resolved identities.
pub fn transform(
    mut records: Vec<Record>,
    resolutions: &Resolutions,
    layout: &TableLayout,
) -> Result<Table, TransformError> {
    let mut present = union_columns(&records);

    // 1. swap the raw identifier for its display value
    for record in records.iter_mut() {
        let resolved = record
            .remove(&layout.identity_field)
            .and_then(|raw| identifier_of(&raw))
            .and_then(|id| resolutions.get(&id).cloned())
            .unwrap_or_else(|| UNRESOLVED.to_string());
        record.insert(layout.resolved_field.clone(), Value::String(resolved));
    }
    present.retain(|c| *c != layout.identity_field);
    if !present.contains(&layout.resolved_field) {
        present.push(layout.resolved_field.clone());
    }

    // 2. column order
    let header = layout.order_columns(&present);

    // 3. stable sort on the primary key
    check_missing_keys(&records, layout)?;
    let key = layout.primary_key.as_str();
    records.sort_by(|a, b| compare_keys(a.get(key), b.get(key)));
    check_duplicate_keys(&records, layout)?;

    // 4. printable cells
    let rows = records
        .iter()
        .map(|record| header.iter().map(|c| normalize(record.get(c))).collect())
        .collect();

    Ok(Table { header, rows })
}

fn check_missing_keys(records: &[Record], layout: &TableLayout) -> Result<(), TransformError> {
    let missing: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| matches!(r.get(&layout.primary_key), None | Some(Value::Null)))
        .map(|(index, _)| index)
        .collect();

    match (missing.first(), layout.key_policy) {
        (None, _) => Ok(()),
        (Some(&index), KeyPolicy::Strict) => Err(TransformError::MissingKey {
            index,
            field: layout.primary_key.clone(),
        }),
        (Some(_), KeyPolicy::Lenient) => {
            tracing::warn!(
                field = %layout.primary_key,
                count = missing.len(),
                "records without a primary key will sort last"
            );
            Ok(())
        }
    }
}

/// Expects `records` sorted, so duplicates are adjacent.
fn check_duplicate_keys(records: &[Record], layout: &TableLayout) -> Result<(), TransformError> {
    let key = layout.primary_key.as_str();
    let duplicate = records.windows(2).find(|pair| {
        let (a, b) = (pair[0].get(key), pair[1].get(key));
        !matches!(a, None | Some(Value::Null)) && compare_keys(a, b) == Ordering::Equal
    });

    match (duplicate, layout.key_policy) {
        (None, _) => Ok(()),
        (Some(pair), KeyPolicy::Strict) => Err(TransformError::DuplicateKey {
            key: normalize(pair[0].get(key)),
            field: layout.primary_key.clone(),
        }),
        (Some(pair), KeyPolicy::Lenient) => {
            tracing::warn!(
                field = %layout.primary_key,
                key = %normalize(pair[0].get(key)),
                "duplicate primary key, keeping input order"
            );
            Ok(())
        }
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Number(_)) => 0,
        Some(Value::String(_)) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Array(_)) | Some(Value::Object(_)) => 3,
        Some(Value::Null) | None => 4,
    }
}

/// Total order over key values: numbers, then strings, then booleans, then composites,
/// then missing.
pub fn compare_keys(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x @ (Value::Array(_) | Value::Object(_))), Some(y @ (Value::Array(_) | Value::Object(_)))) => {
            x.to_string().cmp(&y.to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Render one cell. Composites become compact JSON, null and absent become empty.
pub fn normalize(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(composite) => composite.to_string(),
    }
}
