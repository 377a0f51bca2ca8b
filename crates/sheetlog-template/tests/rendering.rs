use chrono::DateTime;
use pretty_assertions::assert_eq;
use sheetlog_template::{render_output, Level, LogEvent, MessageTemplate, PropertyValue};

fn at(ts: &str) -> DateTime<chrono::FixedOffset> {
    DateTime::parse_from_rfc3339(ts).unwrap()
}

#[test]
fn default_output_layout_renders_one_line_per_event() {
    let layout = MessageTemplate::parse(
        "[{Timestamp:%Y-%m-%d %H:%M:%S%.3f} {Level:u3}] {Message:lj}{NewLine}{Exception}",
    );
    let event = LogEvent::new(Level::Information, "{Id},{Name},{Age}")
        .with_timestamp(at("2024-05-01T08:00:00+02:00"))
        .with_args([PropertyValue::from(3), "Grace".into(), 45.into()]);

    assert_eq!(
        render_output(&layout, &event),
        "[2024-05-01 08:00:00.000 INF] 3,Grace,45\n"
    );
}

#[test]
fn destructured_structures_render_as_json_under_lj() {
    let layout = MessageTemplate::parse("{Message:lj}");
    let order = PropertyValue::structure(
        None,
        [("Sku", PropertyValue::from("A-1")), ("Qty", PropertyValue::from(2))],
    );
    let event = LogEvent::new(Level::Debug, "Placed {@Order}").with_property("Order", order);

    assert_eq!(render_output(&layout, &event), r#"Placed {"Qty":2,"Sku":"A-1"}"#);
    assert_eq!(event.render_message(), r#"Placed { Sku: "A-1", Qty: 2 }"#);
}

#[test]
fn file_name_templates_use_the_event_timestamp() {
    let naming = MessageTemplate::parse("logs/{Timestamp:%Y-%m-%d}.xlsx");
    let event = LogEvent::new(Level::Warning, "x").with_timestamp(at("2023-12-31T23:59:59+00:00"));
    assert_eq!(render_output(&naming, &event), "logs/2023-12-31.xlsx");
}
