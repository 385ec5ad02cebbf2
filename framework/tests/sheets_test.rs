use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use backoffice::pipeline::{SheetTarget, Sink, Table};
use backoffice::sheets::{
    Endpoints, GoogleSheets, ServiceAccount, ServiceAccountKey, SheetsError, SCOPES,
};
use backoffice::ErrorKind;
use jwt::algorithm::openssl::PKeyWithDigest;
use jwt::{Header, Token, VerifyWithKey};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Rsa;
use serde_json::{json, Value};
use time::OffsetDateTime;
use url::Url;

const CLIENT_EMAIL: &str = "sync@stemulate.iam.gserviceaccount.com";
const ACCESS_TOKEN: &str = "ya29.fake-token";
const SPREADSHEET_ID: &str = "sheet-123";

fn keypair() -> (PKey<Private>, PKey<Public>) {
    let private = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let public = PKey::public_key_from_pem(&private.public_key_to_pem().unwrap()).unwrap();
    (private, public)
}

fn verifier(public: &PKey<Public>) -> PKeyWithDigest<Public> {
    PKeyWithDigest {
        digest: MessageDigest::sha256(),
        key: public.clone(),
    }
}

fn service_key(private: &PKey<Private>, token_uri: String) -> ServiceAccountKey {
    let pem = private.private_key_to_pem_pkcs8().unwrap();
    ServiceAccountKey {
        client_email: CLIENT_EMAIL.to_string(),
        private_key: String::from_utf8(pem).unwrap(),
        private_key_id: Some("key-1".to_string()),
        token_uri,
    }
}

#[derive(Clone)]
struct FakeGoogle {
    public: PKey<Public>,
    token_uri: String,
    tokens: Arc<AtomicUsize>,
    batches: Arc<Mutex<Vec<Value>>>,
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {ACCESS_TOKEN}");
    headers
        .get("authorization")
        .is_some_and(|v| v == expected.as_str())
}

async fn token(
    State(google): State<FakeGoogle>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if form.get("grant_type").map(String::as_str)
        != Some("urn:ietf:params:oauth:grant-type:jwt-bearer")
    {
        return (StatusCode::BAD_REQUEST, "unsupported_grant_type").into_response();
    }
    let Some(assertion) = form.get("assertion") else {
        return (StatusCode::BAD_REQUEST, "missing assertion").into_response();
    };

    let claims: Result<BTreeMap<String, Value>, _> =
        assertion.as_str().verify_with_key(&verifier(&google.public));
    match claims {
        Ok(claims)
            if claims.get("aud") == Some(&json!(google.token_uri))
                && claims.get("iss") == Some(&json!(CLIENT_EMAIL)) =>
        {
            google.tokens.fetch_add(1, Ordering::SeqCst);
            Json(json!({
                "access_token": ACCESS_TOKEN,
                "expires_in": 3599,
                "token_type": "Bearer"
            }))
            .into_response()
        }
        _ => (StatusCode::UNAUTHORIZED, "invalid_grant").into_response(),
    }
}

async fn files(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> Response {
    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let q = query.get("q").cloned().unwrap_or_default();
    if q.contains("name = 'Applications 2025'")
        && q.contains("mimeType = 'application/vnd.google-apps.spreadsheet'")
    {
        Json(json!({"files": [{"id": SPREADSHEET_ID, "name": "Applications 2025"}]}))
            .into_response()
    } else {
        Json(json!({"files": []})).into_response()
    }
}

async fn metadata(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id != SPREADSHEET_ID {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "sheets": [
            {"properties": {"sheetId": 0, "title": "Sheet1",
                "gridProperties": {"rowCount": 1000, "columnCount": 26}}},
            {"properties": {"sheetId": 7, "title": "Applications",
                "gridProperties": {"rowCount": 2, "columnCount": 3}}}
        ]
    }))
    .into_response()
}

async fn batch_update(
    State(google): State<FakeGoogle>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !bearer_ok(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id != format!("{SPREADSHEET_ID}:batchUpdate") {
        return StatusCode::NOT_FOUND.into_response();
    }
    google.batches.lock().unwrap().push(body);
    Json(json!({"spreadsheetId": SPREADSHEET_ID, "replies": []})).into_response()
}

struct Harness {
    google: FakeGoogle,
    sheets: GoogleSheets,
}

async fn harness() -> Harness {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let (private, public) = keypair();
    let google = FakeGoogle {
        public,
        token_uri: format!("{base}/token"),
        tokens: Arc::default(),
        batches: Arc::default(),
    };

    let app = Router::new()
        .route("/token", post(token))
        .route("/drive/v3/files", get(files))
        .route("/v4/spreadsheets/:id", get(metadata).post(batch_update))
        .with_state(google.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let timeout = Duration::from_secs(5);
    let account = ServiceAccount::new(service_key(&private, google.token_uri.clone()), timeout).unwrap();
    let sheets = GoogleSheets::new(account, timeout)
        .unwrap()
        .endpoints(Endpoints {
            drive: Url::parse(&format!("{base}/drive/v3/")).unwrap(),
            sheets: Url::parse(&format!("{base}/v4/")).unwrap(),
        });

    Harness { google, sheets }
}

fn table() -> Table {
    Table {
        header: vec!["id".into(), "email".into()],
        rows: vec![
            vec!["1".into(), "a@x.com".into()],
            vec!["2".into(), "User Not Found".into()],
            vec!["3".into(), "N/A".into()],
        ],
    }
}

fn cell(row: &Value, column: usize) -> &Value {
    &row["values"][column]["userEnteredValue"]["stringValue"]
}

#[tokio::test]
async fn replace_sends_one_atomic_batch() {
    let Harness { google, sheets } = harness().await;
    let target = SheetTarget::new("Applications 2025", "Applications");

    sheets.replace(&target, &table()).await.unwrap();

    let batches = google.batches.lock().unwrap().clone();
    assert_eq!(batches.len(), 1);
    let requests = batches[0]["requests"].as_array().unwrap();
    assert_eq!(requests.len(), 3);

    let grid = &requests[0]["updateSheetProperties"]["properties"];
    assert_eq!(grid["sheetId"], 7);
    assert_eq!(grid["gridProperties"]["rowCount"], 4);
    assert_eq!(grid["gridProperties"]["columnCount"], 3);

    assert_eq!(requests[1]["updateCells"]["range"]["sheetId"], 7);

    let rows = requests[2]["updateCells"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(cell(&rows[0], 0), "id");
    assert_eq!(cell(&rows[1], 1), "a@x.com");
    assert_eq!(cell(&rows[3], 1), "N/A");
}

#[tokio::test]
async fn access_token_is_cached_between_writes() {
    let Harness { google, sheets } = harness().await;
    let target = SheetTarget::new("Applications 2025", "Sheet1");

    sheets.replace(&target, &table()).await.unwrap();
    sheets.replace(&target, &table()).await.unwrap();

    assert_eq!(google.tokens.load(Ordering::SeqCst), 1);
    let batches = google.batches.lock().unwrap().clone();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0], batches[1]);
    // grid is already large enough
    assert_eq!(batches[0]["requests"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_workbook_is_a_write_error() {
    let Harness { google, sheets } = harness().await;
    let target = SheetTarget::new("Someone Else's Sheet", "Sheet1");

    let err = sheets.replace(&target, &table()).await.unwrap_err();
    assert!(matches!(&err, SheetsError::WorkbookNotFound(name) if name == "Someone Else's Sheet"));
    assert_eq!(err.kind(), ErrorKind::Write);
    assert!(google.batches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_worksheet_is_a_write_error() {
    let Harness { google, sheets } = harness().await;
    let target = SheetTarget::new("Applications 2025", "Archive");

    let err = sheets.replace(&target, &table()).await.unwrap_err();
    assert!(matches!(&err, SheetsError::WorksheetNotFound { worksheet, .. } if worksheet == "Archive"));
    assert!(google.batches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rejected_assertion_surfaces_status() {
    let Harness { google, .. } = harness().await;

    // signed with a key the token endpoint does not know
    let (stranger, _) = keypair();
    let timeout = Duration::from_secs(5);
    let account = ServiceAccount::new(service_key(&stranger, google.token_uri.clone()), timeout).unwrap();

    let err = account.access_token().await.unwrap_err();
    assert!(matches!(err, SheetsError::Status { status, .. } if status == StatusCode::UNAUTHORIZED));
}

#[test]
fn assertion_carries_service_account_claims() {
    let (private, public) = keypair();
    let key = service_key(&private, "https://oauth2.googleapis.com/token".to_string());
    let account = ServiceAccount::new(key, Duration::from_secs(1)).unwrap();

    let now = OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap();
    let assertion = account.assertion(now).unwrap();

    let token: Token<Header, BTreeMap<String, Value>, _> =
        assertion.as_str().verify_with_key(&verifier(&public)).unwrap();
    assert_eq!(token.header().key_id.as_deref(), Some("key-1"));

    let claims = token.claims();
    assert_eq!(claims["iss"], CLIENT_EMAIL);
    assert_eq!(claims["aud"], "https://oauth2.googleapis.com/token");
    assert_eq!(claims["scope"], SCOPES.join(" "));
    assert_eq!(claims["iat"], 1_750_000_000);
    assert_eq!(claims["exp"], 1_750_003_600);
}

#[test]
fn credentials_file_errors_are_config_errors() {
    let missing = GoogleSheets::from_credentials_file("/nope/credentials.json", Duration::from_secs(1));
    let err = missing.err().unwrap();
    assert!(matches!(err, SheetsError::Credentials { .. }));
    assert_eq!(err.kind(), ErrorKind::Config);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    std::fs::write(&path, r#"{"client_email": "x@y.z"}"#).unwrap();
    let err = GoogleSheets::from_credentials_file(&path, Duration::from_secs(1))
        .err()
        .unwrap();
    assert!(matches!(err, SheetsError::Key(_)));
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn credentials_file_loads_service_account() {
    let (private, _) = keypair();
    let key = service_key(&private, "https://oauth2.googleapis.com/token".to_string());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let file = json!({
        "type": "service_account",
        "project_id": "stemulate",
        "private_key_id": key.private_key_id,
        "private_key": key.private_key,
        "client_email": key.client_email,
    });
    std::fs::write(&path, file.to_string()).unwrap();

    let loaded = ServiceAccountKey::from_file(&path).unwrap();
    assert_eq!(loaded.client_email, CLIENT_EMAIL);
    assert_eq!(loaded.token_uri, "https://oauth2.googleapis.com/token");
    assert!(!format!("{loaded:?}").contains("PRIVATE KEY"));
}
