use roxmltree::Document;

use crate::XlsxError;

pub(crate) const REL_TYPE_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub(crate) const REL_TYPE_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub(crate) const REL_TYPE_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub(crate) const REL_TYPE_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    pub target_mode: Option<String>,
}

impl Relationship {
    pub fn is_external(&self) -> bool {
        self.target_mode
            .as_deref()
            .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("External"))
    }
}

/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`.
pub fn rels_part_name(part_name: &str) -> String {
    let part_name = part_name.trim_start_matches('/');
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

pub fn parse_relationships(part_name: &str, xml: &str) -> Result<Vec<Relationship>, XlsxError> {
    let doc = parse_xml(part_name, xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
        .filter_map(|node| {
            Some(Relationship {
                id: node.attribute("Id")?.to_string(),
                type_uri: node.attribute("Type").unwrap_or_default().to_string(),
                target: node.attribute("Target").unwrap_or_default().to_string(),
                target_mode: node.attribute("TargetMode").map(str::to_string),
            })
        })
        .collect())
}

/// Resolve a relationship target relative to the part that owns the relationship.
pub fn resolve_target(base_part: &str, target: &str) -> String {
    // Part names never carry fragments.
    let target = target.split_once('#').map_or(target, |(base, _)| base);

    let (target, is_absolute) = match target.strip_prefix('/') {
        Some(target) => (target, true),
        None => (target, false),
    };
    let base_dir = if is_absolute {
        ""
    } else {
        base_part
            .trim_start_matches('/')
            .rsplit_once('/')
            .map_or("", |(dir, _)| dir)
    };

    let mut components: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            _ => components.push(segment),
        }
    }
    components.join("/")
}

pub(crate) fn parse_xml<'a>(part_name: &str, xml: &'a str) -> Result<Document<'a>, XlsxError> {
    Document::parse(xml).map_err(|source| XlsxError::XmlParse {
        part: part_name.to_string(),
        source,
    })
}
