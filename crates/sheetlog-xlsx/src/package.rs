use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use thiserror::Error;

/// Maximum allowed *inflated* bytes for a single ZIP entry.
///
/// Keeps a hostile or corrupt seed file from ballooning into memory.
pub const MAX_XLSX_PACKAGE_PART_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("failed to parse {part}: {source}")]
    XmlParse {
        part: String,
        #[source]
        source: roxmltree::Error,
    },
    #[error("part {0} is not valid UTF-8")]
    NonUtf8(String),
    #[error("part {part} exceeds {limit} bytes")]
    PartTooLarge { part: String, limit: u64 },
    #[error("missing required part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error(transparent)]
    Worksheet(#[from] sheetlog_model::WorksheetError),
}

/// Raw OPC package: part name -> bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XlsxPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;

        let mut parts = BTreeMap::new();
        for i in 0..zip.len() {
            let file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }

            let name = file.name().trim_start_matches('/').to_string();
            if file.size() > MAX_XLSX_PACKAGE_PART_BYTES {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    limit: MAX_XLSX_PACKAGE_PART_BYTES,
                });
            }

            let mut buf = Vec::with_capacity(file.size() as usize);
            file.take(MAX_XLSX_PACKAGE_PART_BYTES + 1)
                .read_to_end(&mut buf)?;
            if buf.len() as u64 > MAX_XLSX_PACKAGE_PART_BYTES {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    limit: MAX_XLSX_PACKAGE_PART_BYTES,
                });
            }
            parts.insert(name, buf);
        }

        Ok(Self { parts })
    }

    pub fn from_parts(parts: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            parts: parts.into_iter().collect(),
        }
    }

    /// Look up a part by name; a leading `/` and ASCII case differences are tolerated.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        let name = name.trim_start_matches('/');
        if let Some(bytes) = self.parts.get(name) {
            return Some(bytes.as_slice());
        }
        self.parts
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// Look up a part and decode it as UTF-8 XML text.
    pub fn part_str(&self, name: &str) -> Result<Option<&str>, XlsxError> {
        self.part(name)
            .map(|bytes| {
                std::str::from_utf8(bytes).map_err(|_| XlsxError::NonUtf8(name.to_string()))
            })
            .transpose()
    }

    pub fn required_part_str(&self, name: &str) -> Result<&str, XlsxError> {
        self.part_str(name)?
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))
    }

    pub fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        let name = name.trim_start_matches('/');
        // Reuse the stored spelling so a case-variant producer name is overwritten, not duplicated.
        let key = self
            .parts
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| name.to_string());
        self.parts.insert(key, bytes);
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    pub fn write_to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), XlsxError> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        // `[Content_Types].xml` sorts first in the map, which is where readers expect it.
        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_roundtrip_through_zip() {
        let package = XlsxPackage::from_parts([
            ("[Content_Types].xml".to_string(), b"<Types/>".to_vec()),
            ("xl/workbook.xml".to_string(), b"<workbook/>".to_vec()),
        ]);
        let bytes = package.write_to_bytes().unwrap();
        let reread = XlsxPackage::from_bytes(&bytes).unwrap();
        assert_eq!(reread, package);
    }

    #[test]
    fn part_lookup_tolerates_slash_and_case() {
        let mut package =
            XlsxPackage::from_parts([("xl/Workbook.xml".to_string(), b"<workbook/>".to_vec())]);
        assert!(package.part("/xl/workbook.xml").is_some());

        package.set_part("xl/workbook.xml", b"<workbook a=\"1\"/>".to_vec());
        assert_eq!(package.part_names().count(), 1);
        assert_eq!(
            package.required_part_str("xl/workbook.xml").unwrap(),
            "<workbook a=\"1\"/>"
        );
        assert!(matches!(
            package.required_part_str("xl/styles.xml"),
            Err(XlsxError::MissingPart(_))
        ));
    }
}
