use std::fmt;
use std::str::FromStr;

use sheetlog_model::{CellRef, CellType, Worksheet};
use sheetlog_template::{
    LogEvent, MessageTemplate, PropertyToken, EXCEPTION, LEVEL, MESSAGE, NEW_LINE, TIMESTAMP,
};

use crate::{FieldRenderer, SchemaError};

/// Row of a seed worksheet that holds column directives (row 1 is for humans).
pub const DIRECTIVE_ROW: u32 = 2;

const FORMULA_PREFIX: &str = "FUN";

/// The four event attributes every log event has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedField {
    Timestamp,
    Level,
    Message,
    Exception,
}

impl FixedField {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            TIMESTAMP => Some(FixedField::Timestamp),
            LEVEL => Some(FixedField::Level),
            MESSAGE => Some(FixedField::Message),
            EXCEPTION => Some(FixedField::Exception),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            FixedField::Timestamp => TIMESTAMP,
            FixedField::Level => LEVEL,
            FixedField::Message => MESSAGE,
            FixedField::Exception => EXCEPTION,
        }
    }
}

/// Cell type a property's text is parsed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoercionType {
    Text,
    Number,
    Boolean,
    DateTime,
    Duration,
}

impl FromStr for CoercionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [
            ("Text", CoercionType::Text),
            ("String", CoercionType::Text),
            ("Number", CoercionType::Number),
            ("Boolean", CoercionType::Boolean),
            ("DateTime", CoercionType::DateTime),
            ("Duration", CoercionType::Duration),
            ("TimeSpan", CoercionType::Duration),
        ]
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(s))
        .map(|(_, ty)| ty)
        .ok_or(())
    }
}

/// Where a column's cell content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// A fixed field, rendered through the output-template hole that declared it.
    Fixed {
        field: FixedField,
        template: MessageTemplate,
    },
    /// A named event property.
    Property { name: String },
    /// A formula; `{0}` stands for the row number.
    Formula { template: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// 1-based column number.
    pub index: u32,
    pub header: String,
    pub source: ColumnSource,
    /// `None` writes text.
    pub coercion: Option<CoercionType>,
}

/// Ordered columns of one destination. Never empty; indices run 1, 2, 3, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

impl Schema {
    /// Number the columns densely from 1.
    pub fn new(
        columns: impl IntoIterator<Item = (String, ColumnSource, Option<CoercionType>)>,
    ) -> Result<Self, SchemaError> {
        let columns: Vec<ColumnSpec> = columns
            .into_iter()
            .zip(1u32..)
            .map(|((header, source, coercion), index)| ColumnSpec {
                index,
                header,
                source,
                coercion,
            })
            .collect();
        if columns.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.header.as_str())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match &column.source {
                ColumnSource::Formula { template } => write!(f, "{}=FUN({template})", column.index)?,
                _ => write!(f, "{}={}", column.index, column.header)?,
            }
        }
        Ok(())
    }
}

/// Columns from the output template's holes, in order.
///
/// With `include_message_properties`, the holes of `sample`'s own message become
/// columns placed just before the `Message` column.
pub fn resolve_auto<R: FieldRenderer + ?Sized>(
    renderer: &R,
    output_template: &MessageTemplate,
    sample: &LogEvent,
    include_message_properties: bool,
) -> Result<Schema, SchemaError> {
    let mut columns = Vec::new();
    for token in output_template.property_tokens() {
        if token.name == NEW_LINE {
            continue;
        }
        match FixedField::from_name(&token.name) {
            Some(field) => {
                if field == FixedField::Message && include_message_properties {
                    for name in renderer.named_fields(sample.template()) {
                        columns.push((
                            name.clone(),
                            ColumnSource::Property { name },
                            None,
                        ));
                    }
                }
                columns.push((
                    token.name.clone(),
                    ColumnSource::Fixed {
                        field,
                        template: sub_template(token),
                    },
                    None,
                ));
            }
            None => columns.push((
                token.name.clone(),
                ColumnSource::Property {
                    name: token.name.clone(),
                },
                None,
            )),
        }
    }
    Schema::new(columns)
}

fn sub_template(token: &PropertyToken) -> MessageTemplate {
    match &token.format {
        Some(format) => MessageTemplate::parse(&format!("{{{}:{format}}}", token.name)),
        None => MessageTemplate::parse(&format!("{{{}}}", token.name)),
    }
}

/// One parsed row-2 directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub header: String,
    pub source: ColumnSource,
    pub coercion: Option<CoercionType>,
    /// A malformed directive still yields its column but ends the scan.
    pub stop: bool,
}

/// Parse `Name`, `Name:Type` or `FUN:formula`.
pub fn parse_directive(text: &str) -> Directive {
    let Some((head, tail)) = text.split_once(':') else {
        return Directive {
            header: text.to_string(),
            source: ColumnSource::Property {
                name: text.to_string(),
            },
            coercion: Some(CoercionType::Text),
            stop: false,
        };
    };

    if head.trim().eq_ignore_ascii_case(FORMULA_PREFIX) {
        let body = tail.trim();
        if body.strip_prefix('=').unwrap_or(body).trim().is_empty() {
            return Directive {
                header: head.to_string(),
                source: ColumnSource::Property {
                    name: head.to_string(),
                },
                coercion: Some(CoercionType::Text),
                stop: true,
            };
        }
        return Directive {
            header: text.to_string(),
            source: ColumnSource::Formula {
                template: tail.to_string(),
            },
            coercion: None,
            stop: false,
        };
    }

    let name = head.to_string();
    let (coercion, stop) = match tail.parse::<CoercionType>() {
        Ok(ty) => (ty, false),
        Err(()) => (CoercionType::Text, true),
    };
    Directive {
        header: name.clone(),
        source: ColumnSource::Property { name },
        coercion: Some(coercion),
        stop,
    }
}

/// Columns from the directives in row 2, left to right, up to the first blank or error cell.
pub fn resolve_from_template(worksheet: &Worksheet) -> Result<Schema, SchemaError> {
    let mut columns = Vec::new();
    for column in 1..=worksheet.last_column_number() {
        let Some(at) = CellRef::from_numbers(DIRECTIVE_ROW, column) else {
            break;
        };
        let value = worksheet.value(at);
        if matches!(value.cell_type(), CellType::Blank | CellType::Error) {
            break;
        }
        let text = value.to_text();
        let text = text.trim();
        if text.is_empty() {
            break;
        }

        let directive = parse_directive(text);
        columns.push((directive.header, directive.source, directive.coercion));
        if directive.stop {
            log::debug!("column directive `{text}` is malformed; ignoring the columns after it");
            break;
        }
    }
    Schema::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TemplateRenderer;
    use pretty_assertions::assert_eq;
    use sheetlog_model::CellValue;
    use sheetlog_template::Level;

    fn sheet_with_directives(directives: &[&str]) -> Worksheet {
        let mut sheet = Worksheet::new("Sheet1");
        for (col, text) in (0u32..).zip(directives) {
            sheet
                .set_value(CellRef::new(0, col), CellValue::String(format!("Header {col}")))
                .unwrap();
            if !text.is_empty() {
                sheet
                    .set_value(CellRef::new(1, col), CellValue::String(text.to_string()))
                    .unwrap();
            }
        }
        sheet
    }

    fn sources(schema: &Schema) -> Vec<(u32, &str, Option<CoercionType>)> {
        schema
            .columns()
            .iter()
            .map(|c| (c.index, c.header.as_str(), c.coercion))
            .collect()
    }

    #[test]
    fn auto_schema_expands_message_properties_before_message() {
        let output = MessageTemplate::parse("{Timestamp:%H:%M} {Level:u3} {Message:lj}{NewLine}{Exception}");
        let sample = LogEvent::new(Level::Information, "{Id},{Name},{Age}");

        let schema = resolve_auto(&TemplateRenderer, &output, &sample, true).unwrap();
        assert_eq!(
            schema.headers().collect::<Vec<_>>(),
            vec!["Timestamp", "Level", "Id", "Name", "Age", "Message", "Exception"]
        );
        assert_eq!(
            schema.columns()[0].source,
            ColumnSource::Fixed {
                field: FixedField::Timestamp,
                template: MessageTemplate::parse("{Timestamp:%H:%M}"),
            }
        );
        assert_eq!(
            schema.columns()[2].source,
            ColumnSource::Property {
                name: "Id".to_string()
            }
        );
        let indices: Vec<u32> = schema.columns().iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn auto_schema_without_message_properties() {
        let output = MessageTemplate::parse("{Message}|{RequestId}");
        let sample = LogEvent::new(Level::Information, "{Id}");
        let schema = resolve_auto(&TemplateRenderer, &output, &sample, false).unwrap();
        assert_eq!(schema.headers().collect::<Vec<_>>(), vec!["Message", "RequestId"]);
        assert_eq!(
            schema.columns()[1].source,
            ColumnSource::Property {
                name: "RequestId".to_string()
            }
        );
    }

    #[test]
    fn auto_schema_needs_at_least_one_field() {
        let output = MessageTemplate::parse("just text{NewLine}");
        let sample = LogEvent::new(Level::Information, "x");
        assert_eq!(
            resolve_auto(&TemplateRenderer, &output, &sample, true),
            Err(SchemaError::Empty)
        );
    }

    #[test]
    fn directive_forms() {
        assert_eq!(
            parse_directive("Age:number"),
            Directive {
                header: "Age".to_string(),
                source: ColumnSource::Property {
                    name: "Age".to_string()
                },
                coercion: Some(CoercionType::Number),
                stop: false,
            }
        );
        assert_eq!(
            parse_directive("fun:=SUM(A{0}:B{0})").source,
            ColumnSource::Formula {
                template: "=SUM(A{0}:B{0})".to_string()
            }
        );
        assert_eq!(parse_directive("Elapsed:TimeSpan").coercion, Some(CoercionType::Duration));
        assert_eq!(parse_directive("Plain").coercion, Some(CoercionType::Text));
        assert!(parse_directive("Foo:bogus").stop);
    }

    #[test]
    fn template_schema_reads_row_two_until_blank() {
        let sheet = sheet_with_directives(&["Id:Number", "Name", "", "Ignored"]);
        let schema = resolve_from_template(&sheet).unwrap();
        assert_eq!(
            sources(&schema),
            vec![
                (1, "Id", Some(CoercionType::Number)),
                (2, "Name", Some(CoercionType::Text)),
            ]
        );
    }

    #[test]
    fn malformed_directive_ends_the_schema() {
        let sheet = sheet_with_directives(&["Foo:bogus", "Bar:Number"]);
        let schema = resolve_from_template(&sheet).unwrap();
        assert_eq!(sources(&schema), vec![(1, "Foo", Some(CoercionType::Text))]);
    }

    #[test]
    fn formula_directive_without_a_body_ends_the_schema() {
        assert!(parse_directive("FUN:").stop);
        assert!(parse_directive("fun: = ").stop);

        let sheet = sheet_with_directives(&["Id:Number", "FUN:", "Total:Number"]);
        let schema = resolve_from_template(&sheet).unwrap();
        assert_eq!(
            sources(&schema),
            vec![
                (1, "Id", Some(CoercionType::Number)),
                (2, "FUN", Some(CoercionType::Text)),
            ]
        );
    }

    #[test]
    fn error_cells_end_the_schema() {
        let mut sheet = sheet_with_directives(&["A", "B", "C"]);
        sheet
            .set_value(
                CellRef::new(1, 1),
                CellValue::Error(sheetlog_model::ErrorValue::Ref),
            )
            .unwrap();
        let schema = resolve_from_template(&sheet).unwrap();
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn template_without_directives_is_an_error() {
        let sheet = sheet_with_directives(&["", ""]);
        assert_eq!(resolve_from_template(&sheet), Err(SchemaError::Empty));
    }
}
