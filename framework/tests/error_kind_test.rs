use backoffice::ErrorKind;

#[derive(thiserror::Error, Debug, ErrorKind)]
enum CampaignError {
    #[error("settings missing")]
    #[error_kind(Config)]
    Unconfigured,

    #[error("recipient list unreadable: {0}")]
    #[error_kind(Input)]
    Unreadable(String),

    #[error("relay rejected {0} with code {1}")]
    #[error_kind(Send, "{0} rejected ({1})")]
    Rejected(String, u16),

    #[error("could not write row {row} of {sheet}")]
    #[error_kind(Write, "sheet {sheet} failed at row {row}")]
    Row { sheet: &'static str, row: usize },

    #[error("lookup failed: {0}")]
    #[error_kind(Resolution, "identity service unavailable")]
    Lookup(#[from] anyhow::Error),
}

#[test]
fn derives_kind_and_summary() {
    let unconfigured = CampaignError::Unconfigured;
    assert_eq!(unconfigured.kind(), ErrorKind::Config);
    assert_eq!(unconfigured.summary(), "settings missing");

    let unreadable = CampaignError::Unreadable("schools.txt".into());
    assert_eq!(unreadable.kind(), ErrorKind::Input);
    assert_eq!(unreadable.summary(), "recipient list unreadable: schools.txt");

    let rejected = CampaignError::Rejected("a@x.com".into(), 550);
    assert_eq!(rejected.kind(), ErrorKind::Send);
    assert_eq!(rejected.summary(), "a@x.com rejected (550)");

    let row = CampaignError::Row {
        sheet: "Sheet1",
        row: 7,
    };
    assert_eq!(row.kind(), ErrorKind::Write);
    assert_eq!(row.summary(), "sheet Sheet1 failed at row 7");

    let lookup = CampaignError::Lookup(anyhow::anyhow!("connection reset"));
    assert_eq!(lookup.kind(), ErrorKind::Resolution);
    assert_eq!(lookup.summary(), "identity service unavailable");
    assert_eq!(lookup.to_string(), "lookup failed: connection reset");
}

#[test]
fn fatal_kinds() {
    let fatal: Vec<ErrorKind> = [
        ErrorKind::Config,
        ErrorKind::Fetch,
        ErrorKind::Resolution,
        ErrorKind::Transform,
        ErrorKind::Write,
        ErrorKind::Input,
        ErrorKind::Send,
    ]
    .into_iter()
    .filter(|kind| kind.is_fatal())
    .collect();

    assert_eq!(
        fatal,
        vec![
            ErrorKind::Config,
            ErrorKind::Transform,
            ErrorKind::Write,
            ErrorKind::Input
        ]
    );
    assert_eq!(ErrorKind::Resolution.to_string(), "resolution");
}
