use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::auth::{ServiceAccount, ServiceAccountKey};
use super::SheetsError;
use crate::pipeline::{SheetTarget, Sink, Table};

const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Base URLs for the Drive and Sheets APIs. Override to point at a fake server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub drive: Url,
    pub sheets: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            drive: Url::parse("https://www.googleapis.com/drive/v3/").expect("static url"),
            sheets: Url::parse("https://sheets.googleapis.com/v4/").expect("static url"),
        }
    }
}

/// A worksheet located inside a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Worksheet {
    spreadsheet_id: String,
    sheet_id: i64,
    rows: u64,
    columns: u64,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: u64,
    #[serde(default)]
    column_count: u64,
}

/// Google Sheets [`Sink`] authenticated as a service account.
#[derive(Clone)]
pub struct GoogleSheets {
    http: reqwest::Client,
    account: Arc<ServiceAccount>,
    endpoints: Endpoints,
}

impl GoogleSheets {
    pub fn new(account: ServiceAccount, timeout: Duration) -> Result<Self, SheetsError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            account: Arc::new(account),
            endpoints: Endpoints::default(),
        })
    }

    /// Load a service account JSON key and build a client.
    pub fn from_credentials_file(
        path: impl AsRef<Path>,
        timeout: Duration,
    ) -> Result<Self, SheetsError> {
        let key = ServiceAccountKey::from_file(path)?;
        Self::new(ServiceAccount::new(key, timeout)?, timeout)
    }

    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, SheetsError> {
        let token = self.account.access_token().await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        Ok(error_for_status(response).await?.json().await?)
    }

    /// Id of the first spreadsheet with exactly this name visible to the service account.
    async fn find_spreadsheet(&self, name: &str) -> Result<String, SheetsError> {
        let mut url = self.endpoints.drive.join("files")?;
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query(name),
            SPREADSHEET_MIME
        );
        url.query_pairs_mut()
            .append_pair("q", &query)
            .append_pair("fields", "files(id,name)")
            .append_pair("supportsAllDrives", "true")
            .append_pair("includeItemsFromAllDrives", "true");

        let list: FileList = self.get_json(url).await?;
        list.files
            .into_iter()
            .next()
            .map(|file| file.id)
            .ok_or_else(|| SheetsError::WorkbookNotFound(name.to_string()))
    }

    async fn open(&self, target: &SheetTarget) -> Result<Worksheet, SheetsError> {
        let spreadsheet_id = self.find_spreadsheet(&target.workbook).await?;

        let mut url = self
            .endpoints
            .sheets
            .join("spreadsheets/")?
            .join(&format!("./{spreadsheet_id}"))?;
        url.query_pairs_mut().append_pair(
            "fields",
            "sheets.properties(sheetId,title,gridProperties(rowCount,columnCount))",
        );
        let spreadsheet: Spreadsheet = self.get_json(url).await?;

        let properties = spreadsheet
            .sheets
            .into_iter()
            .map(|entry| entry.properties)
            .find(|p| p.title == target.worksheet)
            .ok_or_else(|| SheetsError::WorksheetNotFound {
                workbook: target.workbook.clone(),
                worksheet: target.worksheet.clone(),
            })?;

        tracing::debug!(
            %spreadsheet_id,
            sheet_id = properties.sheet_id,
            "opened worksheet {}",
            target
        );

        Ok(Worksheet {
            spreadsheet_id,
            sheet_id: properties.sheet_id,
            rows: properties.grid_properties.row_count,
            columns: properties.grid_properties.column_count,
        })
    }

    async fn batch_update(&self, spreadsheet_id: &str, body: &Value) -> Result<(), SheetsError> {
        let url = self
            .endpoints
            .sheets
            .join("spreadsheets/")?
            .join(&format!("./{spreadsheet_id}:batchUpdate"))?;
        let token = self.account.access_token().await?;
        let response = self.http.post(url).bearer_auth(token).json(body).send().await?;
        error_for_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Sink for GoogleSheets {
    async fn replace(&self, target: &SheetTarget, table: &Table) -> Result<(), SheetsError> {
        let worksheet = self.open(target).await?;
        let body = replace_request(&worksheet, &table.to_values());
        self.batch_update(&worksheet.spreadsheet_id, &body).await
    }
}

/// One atomic batch: grow the grid if needed, clear every value, write the new values.
fn replace_request(worksheet: &Worksheet, values: &[Vec<String>]) -> Value {
    let needed_rows = values.len() as u64;
    let needed_columns = values.iter().map(Vec::len).max().unwrap_or(0) as u64;

    let mut requests = Vec::new();
    if needed_rows > worksheet.rows || needed_columns > worksheet.columns {
        requests.push(json!({
            "updateSheetProperties": {
                "properties": {
                    "sheetId": worksheet.sheet_id,
                    "gridProperties": {
                        "rowCount": needed_rows.max(worksheet.rows),
                        "columnCount": needed_columns.max(worksheet.columns),
                    }
                },
                "fields": "gridProperties.rowCount,gridProperties.columnCount"
            }
        }));
    }

    requests.push(json!({
        "updateCells": {
            "range": { "sheetId": worksheet.sheet_id },
            "fields": "userEnteredValue"
        }
    }));

    let rows: Vec<Value> = values
        .iter()
        .map(|row| {
            let cells: Vec<Value> = row
                .iter()
                .map(|cell| json!({ "userEnteredValue": { "stringValue": cell } }))
                .collect();
            json!({ "values": cells })
        })
        .collect();

    requests.push(json!({
        "updateCells": {
            "start": { "sheetId": worksheet.sheet_id, "rowIndex": 0, "columnIndex": 0 },
            "rows": rows,
            "fields": "userEnteredValue"
        }
    }));

    json!({ "requests": requests })
}

/// Escape a literal for a Drive `q` string.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, SheetsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SheetsError::Status { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worksheet(rows: u64, columns: u64) -> Worksheet {
        Worksheet {
            spreadsheet_id: "abc".into(),
            sheet_id: 42,
            rows,
            columns,
        }
    }

    #[test]
    fn replace_request_clears_then_writes() {
        let values = vec![
            vec!["id".to_string(), "email".to_string()],
            vec!["1".to_string(), "a@x.com".to_string()],
        ];
        let body = replace_request(&worksheet(1000, 26), &values);
        let requests = body["requests"].as_array().unwrap();

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["updateCells"]["range"]["sheetId"], 42);
        assert_eq!(
            requests[1]["updateCells"]["rows"][1]["values"][1]["userEnteredValue"]["stringValue"],
            "a@x.com"
        );
    }

    #[test]
    fn replace_request_grows_small_grids() {
        let values = vec![vec!["a".to_string(); 30]; 3];
        let body = replace_request(&worksheet(2, 26), &values);
        let requests = body["requests"].as_array().unwrap();

        assert_eq!(requests.len(), 3);
        let grid = &requests[0]["updateSheetProperties"]["properties"]["gridProperties"];
        assert_eq!(grid["rowCount"], 3);
        assert_eq!(grid["columnCount"], 30);
    }

    #[test]
    fn escape_query_quotes() {
        assert_eq!(escape_query(r"O'Brien \ Co"), r"O\'Brien \\ Co");
    }
}
