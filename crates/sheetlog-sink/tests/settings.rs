use pretty_assertions::assert_eq;
use sheetlog_model::{CellRef, CellValue};
use sheetlog_sink::{BatchingSink, MemoryStore, SinkSettings, SpreadsheetSink};
use sheetlog_template::{Level, LogEvent};

#[test]
fn json_settings_drive_a_batching_sink() {
    let settings: SinkSettings = serde_json::from_str(
        r#"{
            "fileName": "logs/{Level}.xlsx",
            "outputTemplate": "{Timestamp:%Y-%m-%d}|{Message}",
            "includeMessageProperties": false,
            "batchSizeLimit": 2,
            "minimumLevel": "Warning"
        }"#,
    )
    .unwrap();
    let (options, batching) = settings.into_options().unwrap();

    let store = MemoryStore::new();
    let sink = SpreadsheetSink::new(options, &store).unwrap();
    let mut batching = BatchingSink::new(sink, batching).unwrap();

    let ts = chrono::DateTime::parse_from_rfc3339("2024-05-06T07:08:09+00:00").unwrap();
    let make = |level, user: &str| {
        LogEvent::new(level, "Login by {User}")
            .with_timestamp(ts)
            .with_property("User", user)
    };
    assert!(batching.emit(make(Level::Information, "ignored")).is_none());
    assert!(batching.emit(make(Level::Warning, "ada")).is_none());
    let report = batching.emit(make(Level::Error, "grace")).unwrap();
    assert_eq!(report.destinations.len(), 2);

    let warnings = store.get("logs/Warning.xlsx").unwrap();
    let sheet = warnings.sheet(1).unwrap();
    assert_eq!(sheet.value(CellRef::new(0, 0)), &CellValue::String("Timestamp".to_string()));
    assert_eq!(sheet.value(CellRef::new(0, 1)), &CellValue::String("Message".to_string()));
    assert_eq!(sheet.value(CellRef::new(1, 0)), &CellValue::String("2024-05-06".to_string()));
    assert_eq!(
        sheet.value(CellRef::new(1, 1)),
        &CellValue::String("Login by \"ada\"".to_string())
    );
    assert!(store.get("logs/Error.xlsx").is_some());
}
