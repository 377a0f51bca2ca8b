use sheetlog_model::{CellRef, CellValue, Worksheet};
use sheetlog_template::{LogEvent, PropertyValue};

use crate::{coerce, ColumnSource, ColumnSpec, FieldRenderer, RowError, Schema};

/// Rows written to one worksheet by [`append_rows`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// 1-based number of the first row written to.
    pub first_row: u32,
    pub rows_written: usize,
    pub rows_failed: usize,
}

/// Header names in row 1, one per column.
pub fn write_header(sheet: &mut Worksheet, schema: &Schema) -> Result<(), RowError> {
    for column in schema.columns() {
        let at = cell_at(1, column.index)?;
        sheet.set_value(at, CellValue::String(column.header.clone()))?;
    }
    Ok(())
}

/// Append one row per event below the last used row.
///
/// A failing event leaves whatever cells it already wrote, is logged and skipped;
/// its row number is not reused.
pub fn append_rows<R: FieldRenderer + ?Sized>(
    sheet: &mut Worksheet,
    schema: &Schema,
    events: &[&LogEvent],
    renderer: &R,
) -> AppendOutcome {
    let first_row = sheet.last_row_number().saturating_add(1);
    let mut outcome = AppendOutcome {
        first_row,
        ..AppendOutcome::default()
    };

    for (row, event) in (first_row..).zip(events) {
        match write_row(sheet, schema, row, event, renderer) {
            Ok(()) => outcome.rows_written += 1,
            Err(err) => {
                outcome.rows_failed += 1;
                log::warn!("failed to write row {row} to `{}`: {err}; event: {event}", sheet.name());
            }
        }
    }
    outcome
}

fn write_row<R: FieldRenderer + ?Sized>(
    sheet: &mut Worksheet,
    schema: &Schema,
    row: u32,
    event: &LogEvent,
    renderer: &R,
) -> Result<(), RowError> {
    for column in schema.columns() {
        let at = cell_at(row, column.index)?;
        match &column.source {
            ColumnSource::Fixed { template, .. } => {
                let text = renderer.render(template, event);
                write_text(sheet, at, text.trim())?;
            }
            ColumnSource::Property { name } => {
                let Some(value) = event.property(name) else {
                    continue;
                };
                write_property(sheet, at, column, value)?;
            }
            ColumnSource::Formula { template } => {
                sheet.set_formula(at, &instantiate_formula(template, row))?;
            }
        }
    }
    Ok(())
}

fn write_property(
    sheet: &mut Worksheet,
    at: CellRef,
    column: &ColumnSpec,
    value: &PropertyValue,
) -> Result<(), RowError> {
    let rendered = if value.is_structure() {
        value.render(Some("l"))
    } else {
        value.to_string()
    };
    let text = strip_quotes(&rendered).trim();
    if text.is_empty() {
        return Ok(());
    }
    sheet.set_value(at, coerce(text, column.coercion))?;
    Ok(())
}

fn write_text(sheet: &mut Worksheet, at: CellRef, text: &str) -> Result<(), RowError> {
    if !text.is_empty() {
        sheet.set_value(at, CellValue::String(text.to_string()))?;
    }
    Ok(())
}

fn cell_at(row: u32, column: u32) -> Result<CellRef, RowError> {
    CellRef::from_numbers(row, column).ok_or(RowError::OutOfGrid { row, column })
}

/// Remove one pair of surrounding double quotes.
pub fn strip_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

/// Substitute the row number for `{0}`; `{{` and `}}` are literal braces.
pub fn instantiate_formula(template: &str, row: u32) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;
    while let Some(ch) = rest.chars().next() {
        if rest.starts_with("{0}") {
            out.push_str(&row.to_string());
            rest = &rest[3..];
        } else if rest.starts_with("{{") {
            out.push('{');
            rest = &rest[2..];
        } else if rest.starts_with("}}") {
            out.push('}');
            rest = &rest[2..];
        } else {
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoercionType, FixedField, TemplateRenderer};
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use sheetlog_model::EXCEL_MAX_ROWS;
    use sheetlog_template::{Level, MessageTemplate};

    fn property(name: &str, coercion: Option<CoercionType>) -> (String, ColumnSource, Option<CoercionType>) {
        (
            name.to_string(),
            ColumnSource::Property {
                name: name.to_string(),
            },
            coercion,
        )
    }

    fn fixed(field: FixedField, template: &str) -> (String, ColumnSource, Option<CoercionType>) {
        (
            field.name().to_string(),
            ColumnSource::Fixed {
                field,
                template: MessageTemplate::parse(template),
            },
            None,
        )
    }

    fn value(sheet: &Worksheet, a1: &str) -> CellValue {
        sheet.value(CellRef::from_a1(a1).unwrap()).clone()
    }

    #[test]
    fn writes_fixed_fields_properties_and_formulas() {
        let schema = Schema::new([
            fixed(FixedField::Timestamp, "{Timestamp:%Y-%m-%d}"),
            fixed(FixedField::Level, "{Level:u3}"),
            property("Age", Some(CoercionType::Number)),
            property("Name", None),
            fixed(FixedField::Message, "{Message:lj}"),
            (
                "Total".to_string(),
                ColumnSource::Formula {
                    template: "=C{0}*2".to_string(),
                },
                None,
            ),
        ])
        .unwrap();

        let mut sheet = Worksheet::new("Sheet1");
        write_header(&mut sheet, &schema).unwrap();

        let event = LogEvent::new(Level::Warning, "{Name} is {Age}")
            .with_timestamp(DateTime::parse_from_rfc3339("2024-02-29T12:00:00+00:00").unwrap())
            .with_args([sheetlog_template::PropertyValue::from("Ada"), 36.into()]);
        let outcome = append_rows(&mut sheet, &schema, &[&event], &TemplateRenderer);

        assert_eq!(
            outcome,
            AppendOutcome {
                first_row: 2,
                rows_written: 1,
                rows_failed: 0
            }
        );
        assert_eq!(value(&sheet, "A1"), CellValue::String("Timestamp".to_string()));
        assert_eq!(value(&sheet, "F1"), CellValue::String("Total".to_string()));
        assert_eq!(value(&sheet, "A2"), CellValue::String("2024-02-29".to_string()));
        assert_eq!(value(&sheet, "B2"), CellValue::String("WRN".to_string()));
        assert_eq!(value(&sheet, "C2"), CellValue::Number(36.0));
        assert_eq!(value(&sheet, "D2"), CellValue::String("Ada".to_string()));
        assert_eq!(value(&sheet, "E2"), CellValue::String("Ada is 36".to_string()));
        assert_eq!(sheet.formula(CellRef::from_a1("F2").unwrap()), Some("C2*2"));
    }

    #[test]
    fn absent_properties_leave_cells_untouched() {
        let schema = Schema::new([property("A", None), property("B", None)]).unwrap();
        let mut sheet = Worksheet::new("Sheet1");
        let event = LogEvent::new(Level::Information, "x").with_property("B", "only b");
        append_rows(&mut sheet, &schema, &[&event], &TemplateRenderer);

        assert_eq!(value(&sheet, "A1"), CellValue::Empty);
        assert_eq!(value(&sheet, "B1"), CellValue::String("only b".to_string()));
    }

    #[test]
    fn structures_use_their_text_form() {
        let schema = Schema::new([property("Order", None)]).unwrap();
        let mut sheet = Worksheet::new("Sheet1");
        let order = PropertyValue::structure(
            Some("Order"),
            [("Sku", PropertyValue::from("A-1")), ("Qty", PropertyValue::from(2))],
        );
        let event = LogEvent::new(Level::Information, "x").with_property("Order", order);
        append_rows(&mut sheet, &schema, &[&event], &TemplateRenderer);

        assert_eq!(
            value(&sheet, "A1"),
            CellValue::String("Order { Sku: A-1, Qty: 2 }".to_string())
        );
    }

    #[test]
    fn rows_continue_after_existing_content() {
        let schema = Schema::new([property("N", Some(CoercionType::Number))]).unwrap();
        let mut sheet = Worksheet::new("Sheet1");
        sheet
            .set_value(CellRef::new(4, 3), CellValue::String("note".to_string()))
            .unwrap();

        let events: Vec<LogEvent> = (1..=3)
            .map(|n| LogEvent::new(Level::Information, "{N}").with_args([n]))
            .collect();
        let refs: Vec<&LogEvent> = events.iter().collect();
        let outcome = append_rows(&mut sheet, &schema, &refs, &TemplateRenderer);

        assert_eq!(outcome.first_row, 6);
        assert_eq!(value(&sheet, "A6"), CellValue::Number(1.0));
        assert_eq!(value(&sheet, "A8"), CellValue::Number(3.0));
    }

    #[test]
    fn a_failing_row_does_not_stop_the_batch() {
        let schema = Schema::new([property("N", None)]).unwrap();
        let mut sheet = Worksheet::new("Sheet1");
        sheet
            .set_value(CellRef::new(EXCEL_MAX_ROWS - 2, 0), CellValue::Number(0.0))
            .unwrap();

        let events: Vec<LogEvent> = (1..=3)
            .map(|n| LogEvent::new(Level::Information, "{N}").with_args([n]))
            .collect();
        let refs: Vec<&LogEvent> = events.iter().collect();
        let outcome = append_rows(&mut sheet, &schema, &refs, &TemplateRenderer);

        assert_eq!(outcome.rows_written, 1);
        assert_eq!(outcome.rows_failed, 2);
        assert_eq!(sheet.last_row_number(), EXCEL_MAX_ROWS);
    }

    #[test]
    fn quotes_and_formulas() {
        assert_eq!(strip_quotes(r#""quoted""#), "quoted");
        assert_eq!(strip_quotes(r#""""#), "");
        assert_eq!(strip_quotes(r#"half""#), r#"half""#);
        assert_eq!(instantiate_formula("=SUM(A{0}:B{0})", 5), "=SUM(A5:B5)");
        assert_eq!(instantiate_formula("=\"{{{0}}}\"", 9), "=\"{9}\"");
    }
}
