use sheetlog_template::{render_name, render_output, LogEvent, MessageTemplate};

/// Text rendering of events, as the sink needs it.
pub trait FieldRenderer {
    /// Render an output-style template (`{Timestamp}`, `{Level}`, properties, ...) against one event.
    fn render(&self, template: &MessageTemplate, event: &LogEvent) -> String;

    /// Render a file-name template; property text must be usable inside a path.
    fn render_name(&self, template: &MessageTemplate, event: &LogEvent) -> String;

    /// Names of the holes in `template`, in order of appearance.
    fn named_fields(&self, template: &MessageTemplate) -> Vec<String>;
}

/// Renders with [`sheetlog_template`]'s rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl FieldRenderer for TemplateRenderer {
    fn render(&self, template: &MessageTemplate, event: &LogEvent) -> String {
        render_output(template, event)
    }

    fn render_name(&self, template: &MessageTemplate, event: &LogEvent) -> String {
        render_name(template, event)
    }

    fn named_fields(&self, template: &MessageTemplate) -> Vec<String> {
        template.property_names().map(str::to_string).collect()
    }
}

impl<R: FieldRenderer + ?Sized> FieldRenderer for &R {
    fn render(&self, template: &MessageTemplate, event: &LogEvent) -> String {
        (**self).render(template, event)
    }

    fn render_name(&self, template: &MessageTemplate, event: &LogEvent) -> String {
        (**self).render_name(template, event)
    }

    fn named_fields(&self, template: &MessageTemplate) -> Vec<String> {
        (**self).named_fields(template)
    }
}
