use std::collections::BTreeMap;
use std::ops::Range;
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sheetlog_model::{Cell, CellRef, CellValue, DateSystem, ErrorValue};

use crate::styles::{NumberFormatKind, Styles};
use crate::XlsxError;

/// One `<row>` as it appears in the source part.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawRow {
    /// The complete element, emitted verbatim while the row stays unmodified.
    pub(crate) xml: String,
    /// Opening-tag attributes other than `r` and `spans`, still escaped.
    pub(crate) attrs: Vec<(String, String)>,
}

/// Byte spans of the worksheet part that get rewritten on save.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SheetLayout {
    /// Namespace prefix of the SpreadsheetML elements, including the colon (`""` when default).
    pub(crate) prefix: String,
    pub(crate) sheet_data: Range<usize>,
    pub(crate) dimension: Option<Range<usize>>,
    /// Source rows keyed by 0-indexed row.
    pub(crate) rows: BTreeMap<u32, RawRow>,
}

pub(crate) struct ParsedSheet {
    pub(crate) layout: SheetLayout,
    pub(crate) cells: Vec<(CellRef, Cell)>,
}

#[derive(Default)]
struct PendingCell {
    at: Option<CellRef>,
    cell_type: Option<String>,
    style_id: u32,
    value: Option<String>,
    formula: Option<String>,
    inline: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    None,
    Value,
    Formula,
    Inline,
}

pub(crate) fn parse_worksheet(
    part_name: &str,
    xml: &str,
    shared_strings: &[String],
    styles: &Styles,
    date_system: DateSystem,
) -> Result<ParsedSheet, XlsxError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut layout = SheetLayout::default();
    let mut cells = Vec::new();
    let mut sheet_data_start: Option<usize> = None;

    let mut row: Option<(u32, usize, Vec<(String, String)>)> = None;
    let mut next_row = 0u32;
    let mut next_col = 0u32;
    let mut cell: Option<PendingCell> = None;
    let mut target = TextTarget::None;
    let mut in_phonetic = false;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf)?;
        let after = reader.buffer_position() as usize;

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"worksheet" => layout.prefix = prefix_of(&e),
                b"sheetData" => sheet_data_start = Some(before),
                b"row" if sheet_data_start.is_some() => {
                    let (index, attrs) = row_attributes(&e, next_row)?;
                    next_row = index + 1;
                    next_col = 0;
                    row = Some((index, before, attrs));
                }
                b"c" if row.is_some() => {
                    let row_index = row.as_ref().map_or(0, |(r, _, _)| *r);
                    let pending = cell_attributes(&e, row_index, next_col)?;
                    next_col = pending.at.map_or(next_col, |at| at.col + 1);
                    cell = Some(pending);
                }
                b"v" if cell.is_some() => target = TextTarget::Value,
                b"f" if cell.is_some() => target = TextTarget::Formula,
                b"rPh" => in_phonetic = true,
                b"t" if cell.is_some() && !in_phonetic => target = TextTarget::Inline,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"sheetData" => layout.sheet_data = before..after,
                b"dimension" => layout.dimension = Some(before..after),
                b"row" if sheet_data_start.is_some() => {
                    let (index, attrs) = row_attributes(&e, next_row)?;
                    next_row = index + 1;
                    layout.rows.insert(
                        index,
                        RawRow {
                            xml: xml[before..after].to_string(),
                            attrs,
                        },
                    );
                }
                b"c" if row.is_some() => {
                    let row_index = row.as_ref().map_or(0, |(r, _, _)| *r);
                    let pending = cell_attributes(&e, row_index, next_col)?;
                    next_col = pending.at.map_or(next_col, |at| at.col + 1);
                    if let Some(done) = finish_cell(pending, shared_strings, styles, date_system) {
                        cells.push(done);
                    }
                }
                _ => {}
            },
            Event::Text(e) if target != TextTarget::None => {
                let text = e.unescape()?;
                append_text(cell.as_mut(), target, &text);
            }
            Event::CData(e) if target != TextTarget::None => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                append_text(cell.as_mut(), target, &text);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"f" | b"t" => target = TextTarget::None,
                b"rPh" => in_phonetic = false,
                b"c" => {
                    if let Some(pending) = cell.take() {
                        if let Some(done) =
                            finish_cell(pending, shared_strings, styles, date_system)
                        {
                            cells.push(done);
                        }
                    }
                    target = TextTarget::None;
                }
                b"row" => {
                    if let Some((index, start, attrs)) = row.take() {
                        layout.rows.insert(
                            index,
                            RawRow {
                                xml: xml[start..after].to_string(),
                                attrs,
                            },
                        );
                    }
                }
                b"sheetData" => {
                    if let Some(start) = sheet_data_start {
                        layout.sheet_data = start..after;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if layout.sheet_data.is_empty() {
        return Err(XlsxError::Invalid(format!(
            "{part_name} has no <sheetData> element"
        )));
    }

    Ok(ParsedSheet { layout, cells })
}

fn prefix_of(e: &BytesStart<'_>) -> String {
    let name = e.name();
    match name.prefix() {
        Some(prefix) => format!("{}:", String::from_utf8_lossy(prefix.as_ref())),
        None => String::new(),
    }
}

fn row_attributes(
    e: &BytesStart<'_>,
    fallback: u32,
) -> Result<(u32, Vec<(String, String)>), XlsxError> {
    let mut index = fallback;
    let mut attrs = Vec::new();
    for a in e.attributes().with_checks(false) {
        let a = a?;
        match a.key.as_ref() {
            b"r" => {
                if let Some(row_number) = a
                    .unescape_value()?
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n >= 1)
                {
                    index = row_number - 1;
                }
            }
            b"spans" => {}
            key => attrs.push((
                String::from_utf8_lossy(key).into_owned(),
                String::from_utf8_lossy(&a.value).into_owned(),
            )),
        }
    }
    Ok((index, attrs))
}

fn cell_attributes(
    e: &BytesStart<'_>,
    row: u32,
    fallback_col: u32,
) -> Result<PendingCell, XlsxError> {
    let mut pending = PendingCell {
        at: Some(CellRef::new(row, fallback_col)),
        ..PendingCell::default()
    };
    for a in e.attributes().with_checks(false) {
        let a = a?;
        match a.key.as_ref() {
            b"r" => pending.at = CellRef::from_a1(a.unescape_value()?.trim()).ok(),
            b"t" => pending.cell_type = Some(a.unescape_value()?.into_owned()),
            b"s" => pending.style_id = a.unescape_value()?.trim().parse().unwrap_or(0),
            _ => {}
        }
    }
    Ok(pending)
}

fn append_text(cell: Option<&mut PendingCell>, target: TextTarget, text: &str) {
    let Some(cell) = cell else {
        return;
    };
    let slot = match target {
        TextTarget::Value => &mut cell.value,
        TextTarget::Formula => &mut cell.formula,
        TextTarget::Inline => &mut cell.inline,
        TextTarget::None => return,
    };
    slot.get_or_insert_with(String::new).push_str(text);
}

fn finish_cell(
    pending: PendingCell,
    shared_strings: &[String],
    styles: &Styles,
    date_system: DateSystem,
) -> Option<(CellRef, Cell)> {
    let at = pending.at?;
    let raw = pending.value.as_deref().map(str::trim);

    let value = match pending.cell_type.as_deref() {
        Some("s") => raw
            .and_then(|v| v.parse::<usize>().ok())
            .and_then(|idx| shared_strings.get(idx))
            .map(|s| CellValue::String(s.clone()))
            .unwrap_or_default(),
        Some("b") => match raw {
            Some("1") | Some("true") => CellValue::Boolean(true),
            Some("0") | Some("false") => CellValue::Boolean(false),
            _ => CellValue::Empty,
        },
        Some("e") => match raw {
            Some(code) => ErrorValue::from_str(code)
                .map(CellValue::Error)
                .unwrap_or_else(|_| CellValue::String(code.to_string())),
            None => CellValue::Empty,
        },
        Some("str") => pending
            .value
            .clone()
            .map(CellValue::String)
            .unwrap_or_default(),
        Some("inlineStr") => pending
            .inline
            .map(CellValue::String)
            .unwrap_or_default(),
        Some("d") => match raw {
            Some(text) => parse_iso_datetime(text)
                .map(CellValue::DateTime)
                .unwrap_or_else(|| CellValue::String(text.to_string())),
            None => CellValue::Empty,
        },
        _ => match raw.and_then(|v| v.parse::<f64>().ok()) {
            Some(n) => numeric_value(n, styles.kind_for_xf(pending.style_id), date_system),
            None => CellValue::Empty,
        },
    };

    let formula = pending
        .formula
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty());

    Some((
        at,
        Cell {
            value,
            formula,
            style_id: pending.style_id,
        },
    ))
}

fn numeric_value(n: f64, kind: NumberFormatKind, date_system: DateSystem) -> CellValue {
    match kind {
        NumberFormatKind::DateTime => date_system
            .serial_to_datetime(n)
            .map_or(CellValue::Number(n), CellValue::DateTime),
        NumberFormatKind::Duration => {
            DateSystem::serial_to_duration(n).map_or(CellValue::Number(n), CellValue::Duration)
        }
        NumberFormatKind::Number => CellValue::Number(n),
    }
}

fn parse_iso_datetime(text: &str) -> Option<chrono::NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::styles::default_styles_xml;
    use pretty_assertions::assert_eq;

    fn parse(xml: &str, shared: &[String]) -> ParsedSheet {
        let styles = Styles::parse("xl/styles.xml", &default_styles_xml()).unwrap();
        parse_worksheet("xl/worksheets/sheet1.xml", xml, shared, &styles, DateSystem::Excel1900)
            .unwrap()
    }

    #[test]
    fn reads_cells_and_row_spans() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:C2"/><sheetData><row r="1" spans="1:3" ht="20" customHeight="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="b"><v>1</v></c><c r="C1" s="1"><v>45292.5</v></c></row><row r="2"><c r="A2"><f>SUM(B2:C2)</f><v>3</v></c><c r="B2" t="inlineStr"><is><t>x &amp; y</t></is></c><c r="C2" t="e"><v>#N/A</v></c></row></sheetData></worksheet>"#;
        let parsed = parse(xml, &["Id".to_string()]);

        let values: Vec<_> = parsed
            .cells
            .iter()
            .map(|(at, cell)| (at.to_a1(), cell.value.clone()))
            .collect();
        assert_eq!(
            values,
            vec![
                ("A1".to_string(), CellValue::String("Id".to_string())),
                ("B1".to_string(), CellValue::Boolean(true)),
                (
                    "C1".to_string(),
                    CellValue::DateTime(
                        chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                            .unwrap()
                            .and_hms_opt(12, 0, 0)
                            .unwrap()
                    )
                ),
                ("A2".to_string(), CellValue::Number(3.0)),
                ("B2".to_string(), CellValue::String("x & y".to_string())),
                ("C2".to_string(), CellValue::Error(ErrorValue::NA)),
            ]
        );
        assert_eq!(parsed.cells[3].1.formula.as_deref(), Some("SUM(B2:C2)"));

        let layout = &parsed.layout;
        assert_eq!(layout.prefix, "");
        assert!(xml[layout.sheet_data.clone()].starts_with("<sheetData>"));
        assert!(xml[layout.sheet_data.clone()].ends_with("</sheetData>"));
        assert_eq!(&xml[layout.dimension.clone().unwrap()], r#"<dimension ref="A1:C2"/>"#);
        assert_eq!(layout.rows.len(), 2);
        assert!(layout.rows[&0].xml.starts_with(r#"<row r="1""#));
        assert!(layout.rows[&1].xml.ends_with("</row>"));
        assert_eq!(
            layout.rows[&0].attrs,
            vec![
                ("ht".to_string(), "20".to_string()),
                ("customHeight".to_string(), "1".to_string())
            ]
        );
    }

    #[test]
    fn handles_prefixed_and_empty_sheet_data() {
        let xml = r#"<x:worksheet xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:sheetData/></x:worksheet>"#;
        let parsed = parse(xml, &[]);
        assert_eq!(parsed.layout.prefix, "x:");
        assert_eq!(&xml[parsed.layout.sheet_data.clone()], "<x:sheetData/>");
        assert!(parsed.cells.is_empty());
    }

    #[test]
    fn rows_and_cells_without_references_follow_their_predecessors() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row><c><v>1</v></c><c><v>2</v></c></row><row><c><v>3</v></c></row></sheetData></worksheet>"#;
        let parsed = parse(xml, &[]);
        let refs: Vec<_> = parsed.cells.iter().map(|(at, _)| at.to_a1()).collect();
        assert_eq!(refs, vec!["A1", "B1", "A2"]);
    }

    #[test]
    fn missing_sheet_data_is_invalid() {
        let styles = Styles::parse("xl/styles.xml", &default_styles_xml()).unwrap();
        let err = parse_worksheet(
            "xl/worksheets/sheet1.xml",
            "<worksheet/>",
            &[],
            &styles,
            DateSystem::Excel1900,
        )
        .err()
        .unwrap();
        assert!(matches!(err, XlsxError::Invalid(_)));
    }
}
