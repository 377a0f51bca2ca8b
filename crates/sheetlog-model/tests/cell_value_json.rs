use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use serde_json::json;
use sheetlog_model::{CellRef, CellValue, ErrorValue};

#[test]
fn cell_values_serialize_as_tagged_json() {
    let at = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(6, 30, 0)
        .unwrap();

    assert_eq!(
        serde_json::to_value(CellValue::Number(1.5)).unwrap(),
        json!({"type": "number", "value": 1.5})
    );
    assert_eq!(
        serde_json::to_value(CellValue::Error(ErrorValue::Div0)).unwrap()["type"],
        json!("error")
    );
    assert_eq!(
        serde_json::to_value(CellValue::DateTime(at)).unwrap(),
        json!({"type": "date_time", "value": "2024-02-29T06:30:00"})
    );
    assert_eq!(
        serde_json::to_value(CellValue::Duration(Duration::minutes(90))).unwrap(),
        json!({"type": "duration", "value": 5_400_000})
    );
    assert_eq!(serde_json::to_value(CellValue::Empty).unwrap(), json!({"type": "empty"}));
}

#[test]
fn durations_come_back_from_json() {
    let value: CellValue =
        serde_json::from_value(json!({"type": "duration", "value": 1_500})).unwrap();
    assert_eq!(value, CellValue::Duration(Duration::milliseconds(1_500)));
}

#[test]
fn cell_refs_serialize_zero_based() {
    let at = CellRef::from_a1("C7").unwrap();
    assert_eq!(serde_json::to_value(at).unwrap(), json!({"row": 6, "col": 2}));
}
