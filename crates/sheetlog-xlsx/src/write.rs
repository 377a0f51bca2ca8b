use std::collections::BTreeSet;
use std::fmt::Write as _;

use sheetlog_model::{Cell, CellRef, CellValue, DateSystem, Worksheet};

use crate::openxml::parse_xml;
use crate::read::SheetLayout;
use crate::styles::{NumberFormatKind, Styles, NUM_FMT_DATETIME, NUM_FMT_DURATION};
use crate::XlsxError;

/// Result of splicing the model back into the worksheet part.
pub(crate) struct WrittenSheet {
    pub(crate) xml: String,
    pub(crate) wrote_formula: bool,
}

/// Rebuild `<sheetData>` (and `<dimension>`), keeping every row the model did not touch verbatim.
pub(crate) fn write_worksheet(
    original: &str,
    layout: &SheetLayout,
    sheet: &Worksheet,
    styles: &mut Styles,
    date_system: DateSystem,
) -> Result<WrittenSheet, XlsxError> {
    let p = layout.prefix.as_str();
    let dirty = sheet.dirty_rows();

    let mut rows: BTreeSet<u32> = layout.rows.keys().copied().collect();
    rows.extend(dirty.iter().copied());

    let mut wrote_formula = false;
    let mut body = String::new();
    for row in rows {
        let raw = layout.rows.get(&row);
        if let (false, Some(raw)) = (dirty.contains(&row), raw) {
            body.push_str(&raw.xml);
            continue;
        }

        let mut cells = String::new();
        for (at, cell) in sheet.row_cells(row) {
            wrote_formula |= cell.formula.is_some();
            write_cell(&mut cells, p, at, cell, styles, date_system)?;
        }

        let attrs = raw.map(|r| r.attrs.as_slice()).unwrap_or_default();
        if cells.is_empty() && attrs.is_empty() {
            continue;
        }
        let _ = write!(body, r#"<{p}row r="{}""#, row + 1);
        for (key, value) in attrs {
            let _ = write!(body, r#" {key}="{value}""#);
        }
        if cells.is_empty() {
            body.push_str("/>");
        } else {
            let _ = write!(body, ">{cells}</{p}row>");
        }
    }

    let sheet_data = if body.is_empty() {
        format!("<{p}sheetData/>")
    } else {
        format!("<{p}sheetData>{body}</{p}sheetData>")
    };

    let mut xml = String::with_capacity(original.len() + sheet_data.len());
    let mut cursor = 0;
    if let Some(dimension) = layout
        .dimension
        .as_ref()
        .filter(|d| d.end <= layout.sheet_data.start)
    {
        let reference = sheet
            .used_range()
            .map_or_else(|| "A1".to_string(), |range| range.to_string());
        xml.push_str(&original[cursor..dimension.start]);
        let _ = write!(xml, r#"<{p}dimension ref="{reference}"/>"#);
        cursor = dimension.end;
    }
    xml.push_str(&original[cursor..layout.sheet_data.start]);
    xml.push_str(&sheet_data);
    xml.push_str(&original[layout.sheet_data.end..]);

    Ok(WrittenSheet { xml, wrote_formula })
}

fn write_cell(
    out: &mut String,
    p: &str,
    at: CellRef,
    cell: &Cell,
    styles: &mut Styles,
    date_system: DateSystem,
) -> Result<(), XlsxError> {
    let mut style_id = cell.style_id;
    let mut cell_type: Option<&str> = None;
    let mut value: Option<String> = None;
    let mut inline: Option<&str> = None;

    match &cell.value {
        CellValue::Empty => {}
        CellValue::Number(n) => value = Some(number_text(*n)),
        CellValue::String(s) if cell.formula.is_some() => {
            cell_type = Some("str");
            value = Some(escape_text(s));
        }
        CellValue::String(s) => {
            cell_type = Some("inlineStr");
            inline = Some(s);
        }
        CellValue::Boolean(b) => {
            cell_type = Some("b");
            value = Some(if *b { "1" } else { "0" }.to_string());
        }
        CellValue::Error(err) => {
            cell_type = Some("e");
            value = Some(escape_text(err.as_str()));
        }
        CellValue::DateTime(dt) => {
            if styles.kind_for_xf(style_id) != NumberFormatKind::DateTime {
                style_id = styles.ensure_xf(NUM_FMT_DATETIME)?;
            }
            value = Some(number_text(date_system.datetime_to_serial(*dt)));
        }
        CellValue::Duration(d) => {
            if styles.kind_for_xf(style_id) != NumberFormatKind::Duration {
                style_id = styles.ensure_xf(NUM_FMT_DURATION)?;
            }
            value = Some(number_text(DateSystem::duration_to_serial(*d)));
        }
    }

    let _ = write!(out, r#"<{p}c r="{}""#, at.to_a1());
    if style_id != 0 {
        let _ = write!(out, r#" s="{style_id}""#);
    }
    if let Some(t) = cell_type {
        let _ = write!(out, r#" t="{t}""#);
    }

    if cell.formula.is_none() && value.is_none() && inline.is_none() {
        out.push_str("/>");
        return Ok(());
    }
    out.push('>');
    if let Some(formula) = &cell.formula {
        let _ = write!(out, "<{p}f>{}</{p}f>", escape_text(formula));
    }
    if let Some(value) = value {
        let _ = write!(out, "<{p}v>{value}</{p}v>");
    }
    if let Some(text) = inline {
        let space = if needs_space_preserve(text) {
            r#" xml:space="preserve""#
        } else {
            ""
        };
        let _ = write!(out, "<{p}is><{p}t{space}>{}</{p}t></{p}is>", escape_text(text));
    }
    let _ = write!(out, "</{p}c>");
    Ok(())
}

fn number_text(n: f64) -> String {
    if n.is_finite() {
        n.to_string()
    } else {
        "0".to_string()
    }
}

fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace)
}

/// Escape text content, dropping characters XML 1.0 cannot carry.
pub(crate) fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\t' | '\n' | '\r' => out.push(ch),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
    out
}

pub(crate) fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;").replace('\'', "&apos;")
}

/// Workbook children that must follow `<calcPr>`.
const AFTER_CALC_PR: &[&str] = &[
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

/// Ask spreadsheet applications to recalculate every formula when the workbook opens.
pub(crate) fn ensure_full_calc_on_load(part_name: &str, xml: &str) -> Result<String, XlsxError> {
    let doc = parse_xml(part_name, xml)?;
    let root = doc.root_element();
    let root_tag = &xml[root.range()];
    let qname = root_tag
        .trim_start_matches('<')
        .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .next()
        .unwrap_or("workbook");
    let p = qname
        .split_once(':')
        .map(|(prefix, _)| format!("{prefix}:"))
        .unwrap_or_default();

    let children: Vec<_> = root.children().filter(|n| n.is_element()).collect();

    if let Some(calc_pr) = children.iter().find(|n| n.tag_name().name() == "calcPr") {
        let value = calc_pr.attribute("fullCalcOnLoad").map(str::trim);
        if matches!(value, Some("1") | Some("true")) {
            return Ok(xml.to_string());
        }
        let range = calc_pr.range();
        let element = &xml[range.clone()];
        let rebuilt = match value {
            Some(_) => element
                .replacen(r#"fullCalcOnLoad="0""#, r#"fullCalcOnLoad="1""#, 1)
                .replacen(r#"fullCalcOnLoad="false""#, r#"fullCalcOnLoad="1""#, 1),
            None => {
                let name_end = element
                    .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
                    .unwrap_or(element.len());
                format!(
                    r#"{} fullCalcOnLoad="1"{}"#,
                    &element[..name_end],
                    &element[name_end..]
                )
            }
        };
        return Ok(format!("{}{rebuilt}{}", &xml[..range.start], &xml[range.end..]));
    }

    let element = format!(r#"<{p}calcPr fullCalcOnLoad="1"/>"#);
    let insert_at = children
        .iter()
        .find(|n| AFTER_CALC_PR.contains(&n.tag_name().name()))
        .map(|n| n.range().start)
        .or_else(|| xml[..root.range().end].rfind("</").filter(|i| *i > root.range().start))
        .ok_or_else(|| XlsxError::Invalid(format!("{part_name} has an empty root element")))?;

    Ok(format!("{}{element}{}", &xml[..insert_at], &xml[insert_at..]))
}
