use std::path::Path;

use sheetlog_model::{DateSystem, Workbook, Worksheet};

use crate::openxml::{
    parse_relationships, parse_xml, rels_part_name, resolve_target, REL_TYPE_OFFICE_DOCUMENT,
    REL_TYPE_SHARED_STRINGS, REL_TYPE_STYLES, REL_TYPE_WORKSHEET,
};
use crate::read::{parse_worksheet, SheetLayout};
use crate::shared_strings::parse_shared_strings;
use crate::styles::{default_styles_xml, Styles};
use crate::write::{ensure_full_calc_on_load, escape_attr, write_worksheet};
use crate::{XlsxError, XlsxPackage};

const NS_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const CONTENT_TYPE_STYLES: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";

const DEFAULT_SHEET_NAME: &str = "Sheet1";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>
"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>
"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>
"#;

const SHEET_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><dimension ref="A1"/><sheetData/></worksheet>
"#;

/// A workbook whose first worksheet is editable and whose other parts are kept as loaded.
#[derive(Debug, Clone)]
pub struct XlsxDocument {
    package: XlsxPackage,
    workbook_part: String,
    sheet_part: String,
    styles: Styles,
    layout: SheetLayout,
    workbook: Workbook,
}

pub fn load_from_bytes(bytes: &[u8]) -> Result<XlsxDocument, XlsxError> {
    XlsxDocument::from_package(XlsxPackage::from_bytes(bytes)?)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<XlsxDocument, XlsxError> {
    let bytes = std::fs::read(path)?;
    load_from_bytes(&bytes)
}

impl XlsxDocument {
    /// A fresh single-sheet workbook with one empty worksheet named `Sheet1`.
    pub fn new() -> Result<Self, XlsxError> {
        let workbook_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><workbookPr/><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets><calcPr fullCalcOnLoad="1"/></workbook>
"#,
            escape_attr(DEFAULT_SHEET_NAME)
        );
        let package = XlsxPackage::from_parts([
            ("[Content_Types].xml".to_string(), CONTENT_TYPES_XML.as_bytes().to_vec()),
            ("_rels/.rels".to_string(), ROOT_RELS_XML.as_bytes().to_vec()),
            ("xl/workbook.xml".to_string(), workbook_xml.into_bytes()),
            (
                "xl/_rels/workbook.xml.rels".to_string(),
                WORKBOOK_RELS_XML.as_bytes().to_vec(),
            ),
            ("xl/styles.xml".to_string(), default_styles_xml().into_bytes()),
            (
                "xl/worksheets/sheet1.xml".to_string(),
                SHEET_XML.as_bytes().to_vec(),
            ),
        ]);
        Self::from_package(package)
    }

    pub fn from_package(mut package: XlsxPackage) -> Result<Self, XlsxError> {
        let workbook_part = find_workbook_part(&package)?;
        let workbook_xml = package.required_part_str(&workbook_part)?;
        let (sheet_name, sheet_rel_id, date_system) =
            read_workbook_xml(&workbook_part, workbook_xml)?;

        let rels_part = rels_part_name(&workbook_part);
        let rels = match package.part_str(&rels_part)? {
            Some(xml) => parse_relationships(&rels_part, xml)?,
            None => Vec::new(),
        };
        let target_of = |pred: &dyn Fn(&crate::Relationship) -> bool| {
            rels.iter()
                .find(|rel| !rel.is_external() && pred(rel))
                .map(|rel| resolve_target(&workbook_part, &rel.target))
        };

        let sheet_part = target_of(&|rel| rel.id == sheet_rel_id)
            .or_else(|| target_of(&|rel| rel.type_uri == REL_TYPE_WORKSHEET))
            .ok_or_else(|| {
                XlsxError::Invalid(format!("{workbook_part} does not reference its first sheet"))
            })?;
        let shared_strings_part = target_of(&|rel| rel.type_uri == REL_TYPE_SHARED_STRINGS);
        let styles_part = target_of(&|rel| rel.type_uri == REL_TYPE_STYLES);

        let styles_part = match styles_part {
            Some(part) if package.part(&part).is_some() => part,
            _ => add_default_styles(&mut package, &workbook_part, &rels_part)?,
        };
        let styles = Styles::parse(&styles_part, package.required_part_str(&styles_part)?)?;

        let shared_strings = match shared_strings_part {
            Some(part) => match package.part_str(&part)? {
                Some(xml) => parse_shared_strings(&part, xml)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        let sheet_xml = package.required_part_str(&sheet_part)?;
        let parsed =
            parse_worksheet(&sheet_part, sheet_xml, &shared_strings, &styles, date_system)?;

        let mut worksheet = Worksheet::new(sheet_name);
        for (at, cell) in parsed.cells {
            worksheet.set_cell(at, cell)?;
        }
        worksheet.mark_clean();

        let mut workbook = Workbook::new();
        workbook.date_system = date_system;
        let position = workbook.add_sheet(worksheet.name().to_string());
        if let Some(slot) = workbook.sheet_mut(position) {
            *slot = worksheet;
        }

        Ok(Self {
            package,
            workbook_part,
            sheet_part,
            styles,
            layout: parsed.layout,
            workbook,
        })
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    pub fn workbook_mut(&mut self) -> &mut Workbook {
        &mut self.workbook
    }

    /// The first (and only editable) worksheet.
    pub fn worksheet(&self) -> Option<&Worksheet> {
        self.workbook.sheet(1)
    }

    pub fn worksheet_mut(&mut self) -> Option<&mut Worksheet> {
        self.workbook.sheet_mut(1)
    }

    pub fn package(&self) -> &XlsxPackage {
        &self.package
    }

    /// Package with the worksheet model spliced back into its parts.
    pub fn to_package(&self) -> Result<XlsxPackage, XlsxError> {
        let mut package = self.package.clone();
        let Some(sheet) = self.worksheet() else {
            return Ok(package);
        };
        if sheet.dirty_rows().is_empty() {
            return Ok(package);
        }

        let mut styles = self.styles.clone();
        let original = package.required_part_str(&self.sheet_part)?;
        let written = write_worksheet(
            original,
            &self.layout,
            sheet,
            &mut styles,
            self.workbook.date_system,
        )?;

        if written.wrote_formula {
            let workbook_xml = package.required_part_str(&self.workbook_part)?;
            let patched = ensure_full_calc_on_load(&self.workbook_part, workbook_xml)?;
            package.set_part(self.workbook_part.clone(), patched.into_bytes());
        }
        package.set_part(self.sheet_part.clone(), written.xml.into_bytes());
        let styles_part = styles.part_name().to_string();
        package.set_part(styles_part, styles.into_xml().into_bytes());
        Ok(package)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        self.to_package()?.write_to_bytes()
    }

    /// Atomically write the document to `path`; the in-memory state then reflects what was saved.
    pub fn save_to_path(&mut self, path: impl AsRef<Path>) -> Result<(), XlsxError> {
        let package = self.to_package()?;
        let bytes = package.write_to_bytes()?;
        sheetlog_fs::atomic_write_bytes(path, &bytes)?;
        *self = Self::from_package(package)?;
        Ok(())
    }
}

impl AsRef<Workbook> for XlsxDocument {
    fn as_ref(&self) -> &Workbook {
        &self.workbook
    }
}

impl AsMut<Workbook> for XlsxDocument {
    fn as_mut(&mut self) -> &mut Workbook {
        &mut self.workbook
    }
}

fn find_workbook_part(package: &XlsxPackage) -> Result<String, XlsxError> {
    if let Some(xml) = package.part_str("_rels/.rels")? {
        let rels = parse_relationships("_rels/.rels", xml)?;
        if let Some(rel) = rels
            .iter()
            .find(|rel| rel.type_uri == REL_TYPE_OFFICE_DOCUMENT && !rel.is_external())
        {
            return Ok(resolve_target("", &rel.target));
        }
    }
    Ok("xl/workbook.xml".to_string())
}

fn read_workbook_xml(
    part_name: &str,
    xml: &str,
) -> Result<(String, String, DateSystem), XlsxError> {
    let doc = parse_xml(part_name, xml)?;
    let root = doc.root_element();

    let date1904 = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "workbookPr")
        .and_then(|n| n.attribute("date1904"))
        .is_some_and(|v| matches!(v.trim(), "1" | "true"));
    let date_system = if date1904 {
        DateSystem::Excel1904
    } else {
        DateSystem::Excel1900
    };

    let sheet = root
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "sheet")
        .ok_or_else(|| XlsxError::Invalid(format!("{part_name} declares no sheets")))?;
    let name = sheet.attribute("name").unwrap_or(DEFAULT_SHEET_NAME).to_string();
    let rel_id = sheet
        .attribute((NS_RELATIONSHIPS, "id"))
        .unwrap_or_default()
        .to_string();

    Ok((name, rel_id, date_system))
}

/// Give a workbook without a stylesheet the default one, wiring up its relationship and content type.
fn add_default_styles(
    package: &mut XlsxPackage,
    workbook_part: &str,
    rels_part: &str,
) -> Result<String, XlsxError> {
    let dir = workbook_part.rsplit_once('/').map_or("", |(dir, _)| dir);
    let styles_part = if dir.is_empty() {
        "styles.xml".to_string()
    } else {
        format!("{dir}/styles.xml")
    };

    let rels_xml = package
        .part_str(rels_part)?
        .unwrap_or(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#)
        .to_string();
    let existing = parse_relationships(rels_part, &rels_xml)?;
    let mut next = existing.len() + 1;
    while existing.iter().any(|rel| rel.id == format!("rId{next}")) {
        next += 1;
    }
    let relationship = format!(
        r#"<Relationship Id="rId{next}" Type="{REL_TYPE_STYLES}" Target="styles.xml"/>"#
    );
    package.set_part(
        rels_part,
        insert_before_close(&rels_xml, "Relationships", &relationship).into_bytes(),
    );

    if let Some(types_xml) = package.part_str("[Content_Types].xml")? {
        let entry = format!(
            r#"<Override PartName="/{styles_part}" ContentType="{CONTENT_TYPE_STYLES}"/>"#
        );
        let patched = insert_before_close(types_xml, "Types", &entry);
        package.set_part("[Content_Types].xml", patched.into_bytes());
    }

    package.set_part(styles_part.clone(), default_styles_xml().into_bytes());
    Ok(styles_part)
}

fn insert_before_close(xml: &str, local_name: &str, fragment: &str) -> String {
    let close = xml
        .rfind(&format!("</{local_name}>"))
        .or_else(|| xml.rfind(&format!(":{local_name}>")).and_then(|i| xml[..i].rfind("</")));
    match close {
        Some(at) => format!("{}{fragment}{}", &xml[..at], &xml[at..]),
        None => match xml.rfind("/>") {
            // `<Relationships .../>` with no children.
            Some(at) if xml[at..].trim() == "/>" => {
                let tag_start = xml[..at].rfind('<').unwrap_or(0);
                let name = xml[tag_start + 1..]
                    .split(|c: char| c.is_whitespace() || c == '/' || c == '>')
                    .next()
                    .unwrap_or(local_name)
                    .to_string();
                format!("{}>{fragment}</{name}>", xml[..at].trim_end())
            }
            _ => format!("{xml}{fragment}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheetlog_model::{CellRef, CellValue};

    #[test]
    fn new_document_has_one_empty_sheet() {
        let doc = XlsxDocument::new().unwrap();
        let sheet = doc.worksheet().unwrap();
        assert_eq!(sheet.name(), "Sheet1");
        assert_eq!(sheet.last_row_number(), 0);
        assert_eq!(doc.workbook().sheet_count(), 1);
    }

    #[test]
    fn reload_from_bytes_sees_written_cells() {
        let mut doc = XlsxDocument::new().unwrap();
        let sheet = doc.worksheet_mut().unwrap();
        sheet
            .set_value(CellRef::new(0, 0), CellValue::String("Id".to_string()))
            .unwrap();
        sheet.set_value(CellRef::new(1, 0), CellValue::Number(7.0)).unwrap();

        let reread = load_from_bytes(&doc.to_bytes().unwrap()).unwrap();
        let sheet = reread.worksheet().unwrap();
        assert_eq!(sheet.last_row_number(), 2);
        assert_eq!(sheet.value(CellRef::new(0, 0)), &CellValue::String("Id".to_string()));
        assert_eq!(sheet.value(CellRef::new(1, 0)), &CellValue::Number(7.0));
    }

    #[test]
    fn workbook_without_styles_gets_a_default_stylesheet() {
        let package = XlsxPackage::from_parts([
            (
                "[Content_Types].xml".to_string(),
                CONTENT_TYPES_XML.replace(r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#, "").into_bytes(),
            ),
            ("_rels/.rels".to_string(), ROOT_RELS_XML.as_bytes().to_vec()),
            (
                "xl/workbook.xml".to_string(),
                br#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><workbookPr date1904="1"/><sheets><sheet name="Log" sheetId="1" r:id="rId7"/></sheets></workbook>"#.to_vec(),
            ),
            (
                "xl/_rels/workbook.xml.rels".to_string(),
                br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet1.xml"/></Relationships>"#.to_vec(),
            ),
            ("xl/worksheets/sheet1.xml".to_string(), SHEET_XML.as_bytes().to_vec()),
        ]);

        let doc = XlsxDocument::from_package(package).unwrap();
        assert_eq!(doc.worksheet().unwrap().name(), "Log");
        assert_eq!(doc.workbook().date_system, DateSystem::Excel1904);

        let package = doc.package();
        assert!(package.part("xl/styles.xml").is_some());
        let rels = package.required_part_str("xl/_rels/workbook.xml.rels").unwrap();
        assert!(rels.contains(r#"Id="rId2""#), "{rels}");
        let types = package.required_part_str("[Content_Types].xml").unwrap();
        assert!(types.contains(r#"PartName="/xl/styles.xml""#));
    }

    #[test]
    fn insert_before_close_handles_self_closing_roots() {
        assert_eq!(
            insert_before_close("<Types/>", "Types", "<X/>"),
            "<Types><X/></Types>"
        );
        assert_eq!(
            insert_before_close("<a:Types></a:Types>", "Types", "<X/>"),
            "<a:Types><X/></a:Types>"
        );
    }
}
