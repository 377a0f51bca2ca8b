use std::collections::HashMap;

use crate::openxml::parse_xml;
use crate::XlsxError;

/// Built-in `m/d/yy h:mm` format.
pub(crate) const NUM_FMT_DATETIME: u32 = 22;
/// Built-in `[h]:mm:ss` format.
pub(crate) const NUM_FMT_DURATION: u32 = 46;

/// How a numeric cell should be read back given its number format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormatKind {
    Number,
    DateTime,
    Duration,
}

/// Cell formats (`cellXfs`) of a `styles.xml` part, plus the text needed to append new ones.
#[derive(Debug, Clone)]
pub(crate) struct Styles {
    part_name: String,
    xml: String,
    xf_num_fmts: Vec<u32>,
    custom_formats: HashMap<u32, String>,
}

impl Styles {
    pub(crate) fn parse(part_name: &str, xml: &str) -> Result<Self, XlsxError> {
        let doc = parse_xml(part_name, xml)?;
        let root = doc.root_element();

        let mut custom_formats = HashMap::new();
        if let Some(num_fmts) = child(root, "numFmts") {
            for fmt in num_fmts
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "numFmt")
            {
                let id = fmt.attribute("numFmtId").and_then(|v| v.trim().parse().ok());
                if let (Some(id), Some(code)) = (id, fmt.attribute("formatCode")) {
                    custom_formats.insert(id, code.to_string());
                }
            }
        }

        let xf_num_fmts = child(root, "cellXfs")
            .map(|xfs| {
                xfs.children()
                    .filter(|n| n.is_element() && n.tag_name().name() == "xf")
                    .map(|xf| {
                        xf.attribute("numFmtId")
                            .and_then(|v| v.trim().parse().ok())
                            .unwrap_or(0)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            part_name: part_name.to_string(),
            xml: xml.to_string(),
            xf_num_fmts,
            custom_formats,
        })
    }

    pub(crate) fn part_name(&self) -> &str {
        &self.part_name
    }

    pub(crate) fn into_xml(self) -> String {
        self.xml
    }

    pub(crate) fn kind_for_xf(&self, xf: u32) -> NumberFormatKind {
        let Some(&num_fmt_id) = self.xf_num_fmts.get(xf as usize) else {
            return NumberFormatKind::Number;
        };
        match self.custom_formats.get(&num_fmt_id) {
            Some(code) => classify_format_code(code),
            None => builtin_kind(num_fmt_id),
        }
    }

    /// Index of a cell format using `num_fmt_id`, appending one to `cellXfs` if needed.
    pub(crate) fn ensure_xf(&mut self, num_fmt_id: u32) -> Result<u32, XlsxError> {
        if let Some(idx) = self.xf_num_fmts.iter().position(|id| *id == num_fmt_id) {
            // Index 0 is the workbook default; never repurpose it.
            if idx != 0 {
                return Ok(idx as u32);
            }
        }

        let doc = parse_xml(&self.part_name, &self.xml)?;
        let root = doc.root_element();
        let cell_xfs = child(root, "cellXfs").ok_or_else(|| {
            XlsxError::Invalid(format!("{} has no <cellXfs> element", self.part_name))
        })?;

        let range = cell_xfs.range();
        let element = &self.xml[range.clone()];
        let qname = qualified_name(element);
        let prefix = qname.split_once(':').map(|(p, _)| format!("{p}:")).unwrap_or_default();

        let mut new_xfs = String::new();
        let mut count = self.xf_num_fmts.len();
        if count == 0 {
            new_xfs.push_str(&xf_xml(&prefix, 0));
            count += 1;
        }
        new_xfs.push_str(&xf_xml(&prefix, num_fmt_id));
        let index = count as u32;
        count += 1;

        let rebuilt = match element.rfind(&format!("</{qname}>")) {
            Some(close) => {
                let open_end = element.find('>').map_or(0, |i| i + 1);
                let open_tag = with_count(&element[..open_end], count);
                format!("{open_tag}{}{new_xfs}{}", &element[open_end..close], &element[close..])
            }
            // Self-closing `<cellXfs/>`.
            None => {
                let open_tag = with_count(element.trim_end_matches("/>").trim_end(), count);
                format!("{open_tag}>{new_xfs}</{qname}>")
            }
        };

        let mut xml = String::with_capacity(self.xml.len() + new_xfs.len() + 16);
        xml.push_str(&self.xml[..range.start]);
        xml.push_str(&rebuilt);
        xml.push_str(&self.xml[range.end..]);
        self.xml = xml;

        if self.xf_num_fmts.is_empty() {
            self.xf_num_fmts.push(0);
        }
        self.xf_num_fmts.push(num_fmt_id);
        Ok(index)
    }
}

/// Minimal stylesheet with the default format plus date/time and elapsed-time formats.
pub(crate) fn default_styles_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>
  <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>{}{}</cellXfs>
  <cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>
"#,
        xf_xml("", NUM_FMT_DATETIME),
        xf_xml("", NUM_FMT_DURATION)
    )
}

fn xf_xml(prefix: &str, num_fmt_id: u32) -> String {
    let apply = if num_fmt_id == 0 { "" } else { r#" applyNumberFormat="1""# };
    format!(
        r#"<{prefix}xf numFmtId="{num_fmt_id}" fontId="0" fillId="0" borderId="0" xfId="0"{apply}/>"#
    )
}

fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn qualified_name(element: &str) -> &str {
    let rest = element.trim_start_matches('<');
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Rewrite (or add) the `count` attribute of an opening tag.
fn with_count(open_tag: &str, count: usize) -> String {
    let body = open_tag.trim_end_matches('>');
    if let Some(start) = body.find("count=\"") {
        let value_start = start + "count=\"".len();
        if let Some(len) = body[value_start..].find('"') {
            return format!(
                "{}{count}{}>",
                &body[..value_start],
                &body[value_start + len..]
            );
        }
    }
    format!(r#"{body} count="{count}">"#)
}

fn builtin_kind(num_fmt_id: u32) -> NumberFormatKind {
    match num_fmt_id {
        NUM_FMT_DURATION => NumberFormatKind::Duration,
        14..=22 | 45 | 47 => NumberFormatKind::DateTime,
        // Locale-specific date slots that real-world files rely on without declaring them.
        27..=36 | 50..=58 => NumberFormatKind::DateTime,
        _ => NumberFormatKind::Number,
    }
}

/// Decide whether a custom number format renders dates, elapsed time, or plain numbers.
pub fn classify_format_code(code: &str) -> NumberFormatKind {
    let mut in_quotes = false;
    let mut escape = false;
    let mut chars = code.chars().peekable();
    let mut saw_date_token = false;

    while let Some(ch) = chars.next() {
        if escape {
            escape = false;
            continue;
        }
        if in_quotes {
            if ch == '"' {
                in_quotes = false;
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            '\\' | '_' | '*' => escape = true,
            ';' => break,
            '[' => {
                let mut content = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    content.push(c);
                }
                let lower = content.to_ascii_lowercase();
                let elapsed = ['h', 'm', 's']
                    .into_iter()
                    .any(|unit| !lower.is_empty() && lower.chars().all(|c| c == unit));
                if elapsed {
                    return NumberFormatKind::Duration;
                }
            }
            'y' | 'Y' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' | 'm' | 'M' => saw_date_token = true,
            _ => {}
        }
    }

    if saw_date_token {
        NumberFormatKind::DateTime
    } else {
        NumberFormatKind::Number
    }
}
