use crate::openxml::parse_xml;
use crate::XlsxError;

/// Plain text of every `<si>` entry in `sharedStrings.xml`, in index order.
///
/// Rich-text runs are flattened; phonetic (`<rPh>`) runs are dropped.
pub(crate) fn parse_shared_strings(part_name: &str, xml: &str) -> Result<Vec<String>, XlsxError> {
    let doc = parse_xml(part_name, xml)?;
    let items = doc
        .root_element()
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "si")
        .map(|si| {
            si.descendants()
                .filter(|n| n.is_element() && n.tag_name().name() == "t")
                .filter(|t| !t.ancestors().any(|a| a.tag_name().name() == "rPh"))
                .filter_map(|t| t.text())
                .collect::<String>()
        })
        .collect();
    Ok(items)
}
