use std::fmt;

/// How a property value should be captured when the template is bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Capturing {
    #[default]
    Default,
    /// `{@Name}`: keep the value's structure.
    Destructure,
    /// `{$Name}`: render the value as a string.
    Stringify,
}

/// Padding applied to a rendered hole (`{Name,10}` right-aligns, `{Name,-10}` left-aligns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Alignment {
    pub left: bool,
    pub width: usize,
}

impl Alignment {
    pub fn apply(self, text: &str) -> String {
        let len = text.chars().count();
        if len >= self.width {
            return text.to_string();
        }
        let pad = " ".repeat(self.width - len);
        if self.left {
            format!("{text}{pad}")
        } else {
            format!("{pad}{text}")
        }
    }
}

/// A `{...}` hole.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyToken {
    pub name: String,
    pub format: Option<String>,
    pub alignment: Option<Alignment>,
    pub capturing: Capturing,
    /// The hole exactly as written, braces included.
    pub raw: String,
}

impl PropertyToken {
    /// Positional holes (`{0}`, `{1}`) bind arguments by index.
    pub fn position(&self) -> Option<usize> {
        if self.name.bytes().all(|b| b.is_ascii_digit()) {
            self.name.parse().ok()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Text(String),
    Property(PropertyToken),
}

/// A parsed message or output template. Parsing never fails: anything that is not a
/// well-formed hole is kept as literal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageTemplate {
    text: String,
    tokens: Vec<Token>,
}

impl MessageTemplate {
    pub fn parse(text: &str) -> Self {
        Self {
            text: text.to_string(),
            tokens: tokenize(text),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn property_tokens(&self) -> impl Iterator<Item = &PropertyToken> {
        self.tokens.iter().filter_map(|token| match token {
            Token::Property(p) => Some(p),
            Token::Text(_) => None,
        })
    }

    /// Hole names in order of appearance, repeats included.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.property_tokens().map(|p| p.name.as_str())
    }

    /// Hole names in order of first appearance.
    pub fn distinct_property_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.property_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

impl fmt::Display for MessageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for MessageTemplate {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        match ch {
            '{' if rest.starts_with("{{") => {
                literal.push('{');
                rest = &rest[2..];
            }
            '}' if rest.starts_with("}}") => {
                literal.push('}');
                rest = &rest[2..];
            }
            '{' => {
                // A hole runs to the next `}`; another `{` first means this one is text.
                let end = rest[1..].find(['{', '}']).map(|i| i + 1);
                match end.filter(|&i| rest.as_bytes()[i] == b'}') {
                    Some(close) => {
                        let raw = &rest[..=close];
                        match parse_property(raw) {
                            Some(property) => {
                                if !literal.is_empty() {
                                    tokens.push(Token::Text(std::mem::take(&mut literal)));
                                }
                                tokens.push(Token::Property(property));
                            }
                            None => literal.push_str(raw),
                        }
                        rest = &rest[close + 1..];
                    }
                    None => {
                        let next = end.unwrap_or(rest.len());
                        literal.push_str(&rest[..next]);
                        rest = &rest[next..];
                    }
                }
            }
            _ => {
                literal.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Text(literal));
    }
    tokens
}

fn parse_property(raw: &str) -> Option<PropertyToken> {
    let inner = &raw[1..raw.len() - 1];
    let (capturing, inner) = match inner.as_bytes().first() {
        Some(b'@') => (Capturing::Destructure, &inner[1..]),
        Some(b'$') => (Capturing::Stringify, &inner[1..]),
        _ => (Capturing::Default, inner),
    };

    let (head, format) = match inner.split_once(':') {
        Some((head, format)) => (head, Some(format)),
        None => (inner, None),
    };
    let (name, alignment) = match head.split_once(',') {
        Some((name, alignment)) => (name, Some(parse_alignment(alignment)?)),
        None => (head, None),
    };

    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    if format.is_some_and(str::is_empty) {
        return None;
    }

    Some(PropertyToken {
        name: name.to_string(),
        format: format.map(str::to_string),
        alignment,
        capturing,
        raw: raw.to_string(),
    })
}

fn parse_alignment(text: &str) -> Option<Alignment> {
    let (left, digits) = match text.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, text),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(Alignment {
        left,
        width: digits.parse().ok()?,
    })
}
