//! Stylesheet model (rules, declarations) and CSS parsing.

/// One property/value pair inside a rule. Names are unique per rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
}

/// One selector-scoped, ordered group of declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub selector: String,
    pub declarations: Vec<Declaration>,
}

impl Rule {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            declarations: Vec::new(),
        }
    }

    pub fn declaration_count(&self) -> usize {
        self.declarations.len()
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|declaration| declaration.name == name)
            .map(|declaration| declaration.value.as_str())
    }

    /// Overwrites an existing declaration in place, or appends a new one.
    pub fn set_property(&mut self, name: &str, value: &str) {
        if let Some(existing) = self
            .declarations
            .iter_mut()
            .find(|declaration| declaration.name == name)
        {
            existing.value = value.to_owned();
            return;
        }

        self.declarations.push(Declaration {
            name: name.to_owned(),
            value: value.to_owned(),
        });
    }

    pub fn remove_property(&mut self, name: &str) -> Option<String> {
        let pos = self
            .declarations
            .iter()
            .position(|declaration| declaration.name == name)?;
        Some(self.declarations.remove(pos).value)
    }

    /// Normalized serialization: `selector{name:value;name:value}`.
    pub fn css_text(&self) -> String {
        let body = self
            .declarations
            .iter()
            .map(|declaration| format!("{}:{}", declaration.name, declaration.value))
            .collect::<Vec<_>>()
            .join(";");
        format!("{}{{{body}}}", self.selector)
    }
}

/// The single tracked stylesheet: an ordered list of rules. Rule order is
/// externally meaningful; callers address rules by index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StyleSheet {
    pub rules: Vec<Rule>,
}

impl StyleSheet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Inserts at `pos`, clamped to the current rule count.
    pub fn insert_rule(&mut self, pos: usize, rule: Rule) {
        let pos = pos.min(self.rules.len());
        self.rules.insert(pos, rule);
    }

    pub fn remove_rule(&mut self, pos: usize) -> Option<Rule> {
        if pos >= self.rules.len() {
            return None;
        }
        Some(self.rules.remove(pos))
    }

    /// Full sheet text: rule texts joined by newlines.
    pub fn css_text(&self) -> String {
        self.rules
            .iter()
            .map(Rule::css_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parses CSS source text. Total: malformed input yields fewer rules, never
/// an error.
#[derive(Debug, Default)]
pub struct CssParser;

impl CssParser {
    pub fn parse(&self, input: &str) -> StyleSheet {
        let sanitized = strip_comments(input);
        let mut rules = Vec::new();
        parse_rules_recursive(&sanitized, &mut rules);
        StyleSheet { rules }
    }

    /// First rule of the input, if the text yields any valid rule.
    pub fn parse_rule(&self, input: &str) -> Option<Rule> {
        self.parse(input).rules.into_iter().next()
    }
}

/// Tracks quoted-string state while scanning CSS bytes. `step` consumes one
/// byte and reports whether it belonged to a quoted run (including the
/// opening and closing quotes themselves).
#[derive(Debug, Default)]
struct QuoteState {
    in_single: bool,
    in_double: bool,
    escape: bool,
}

impl QuoteState {
    fn step(&mut self, byte: u8) -> bool {
        if self.in_single || self.in_double {
            let quote = if self.in_single { b'\'' } else { b'"' };
            if !self.escape && byte == b'\\' {
                self.escape = true;
            } else if !self.escape && byte == quote {
                self.in_single = false;
                self.in_double = false;
            } else {
                self.escape = false;
            }
            return true;
        }

        match byte {
            b'\'' => {
                self.in_single = true;
                true
            }
            b'"' => {
                self.in_double = true;
                true
            }
            _ => false,
        }
    }
}

fn parse_rules_recursive(input: &str, out: &mut Vec<Rule>) {
    let mut cursor = 0_usize;

    while let Some((selector_raw, body_raw, next_cursor)) = next_rule_block(input, cursor) {
        cursor = next_cursor;

        let selector = normalize_ws(selector_raw);
        if selector.is_empty() {
            continue;
        }

        if is_grouping_at_rule(&selector) {
            parse_rules_recursive(body_raw, out);
            continue;
        }

        let declarations = parse_declarations(body_raw);
        if declarations.is_empty() {
            continue;
        }

        out.push(Rule {
            selector,
            declarations,
        });
    }
}

fn next_rule_block(input: &str, from: usize) -> Option<(&str, &str, usize)> {
    let start = skip_rule_separators(input, from);
    if start >= input.len() {
        return None;
    }

    let open = find_top_level_byte(&input[start..], b'{').map(|offset| start + offset)?;
    let close = find_matching_brace(input, open)?;
    Some((&input[start..open], &input[open + 1..close], close + 1))
}

fn skip_rule_separators(input: &str, mut idx: usize) -> usize {
    let bytes = input.as_bytes();
    while idx < bytes.len() && (bytes[idx].is_ascii_whitespace() || bytes[idx] == b';') {
        idx = idx.saturating_add(1);
    }
    idx
}

/// First occurrence of `needle` outside quotes, parens, and brackets.
fn find_top_level_byte(input: &str, needle: u8) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut quotes = QuoteState::default();
    let mut paren_depth = 0_u32;
    let mut bracket_depth = 0_u32;

    for (idx, &byte) in bytes.iter().enumerate() {
        if quotes.step(byte) {
            continue;
        }

        match byte {
            b'(' => paren_depth = paren_depth.saturating_add(1),
            b')' => paren_depth = paren_depth.saturating_sub(1),
            b'[' => bracket_depth = bracket_depth.saturating_add(1),
            b']' => bracket_depth = bracket_depth.saturating_sub(1),
            _ => {
                if byte == needle && paren_depth == 0 && bracket_depth == 0 {
                    return Some(idx);
                }
            }
        }
    }

    None
}

fn find_matching_brace(input: &str, open_brace: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    if bytes.get(open_brace).copied() != Some(b'{') {
        return None;
    }

    let mut quotes = QuoteState::default();
    let mut depth = 1_u32;
    let mut idx = open_brace.saturating_add(1);

    while idx < bytes.len() {
        let byte = bytes[idx];
        if quotes.step(byte) {
            idx = idx.saturating_add(1);
            continue;
        }

        match byte {
            b'{' => depth = depth.saturating_add(1),
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }

        idx = idx.saturating_add(1);
    }

    None
}

fn is_grouping_at_rule(selector: &str) -> bool {
    let lower = selector.to_ascii_lowercase();
    lower.starts_with("@media")
        || lower.starts_with("@supports")
        || lower.starts_with("@layer")
        || lower.starts_with("@document")
}

fn parse_declarations(input: &str) -> Vec<Declaration> {
    let mut declarations: Vec<Declaration> = Vec::new();

    for piece in split_top_level(input, b';') {
        let trimmed = piece.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some(colon_idx) = find_top_level_byte(trimmed, b':') else {
            continue;
        };

        let name = normalize_ws(&trimmed[..colon_idx]);
        let value = normalize_value(trimmed[colon_idx + 1..].trim());
        if name.is_empty() || value.is_empty() {
            continue;
        }

        // Later declarations for the same name overwrite in place.
        if let Some(existing) = declarations
            .iter_mut()
            .find(|declaration| declaration.name == name)
        {
            existing.value = value;
        } else {
            declarations.push(Declaration { name, value });
        }
    }

    declarations
}

fn split_top_level(input: &str, delimiter: u8) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut quotes = QuoteState::default();
    let mut paren_depth = 0_u32;
    let mut bracket_depth = 0_u32;
    let mut parts = Vec::new();
    let mut start = 0_usize;

    for (idx, &byte) in bytes.iter().enumerate() {
        if quotes.step(byte) {
            continue;
        }

        match byte {
            b'(' => paren_depth = paren_depth.saturating_add(1),
            b')' => paren_depth = paren_depth.saturating_sub(1),
            b'[' => bracket_depth = bracket_depth.saturating_add(1),
            b']' => bracket_depth = bracket_depth.saturating_sub(1),
            _ => {
                if byte == delimiter && paren_depth == 0 && bracket_depth == 0 {
                    parts.push(&input[start..idx]);
                    start = idx.saturating_add(1);
                }
            }
        }
    }

    parts.push(&input[start..]);
    parts
}

fn strip_comments(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(input.len());
    let mut quotes = QuoteState::default();
    let mut in_comment = false;
    let mut idx = 0_usize;

    while idx < bytes.len() {
        let byte = bytes[idx];
        let next = bytes.get(idx.saturating_add(1)).copied();

        if in_comment {
            if byte == b'*' && next == Some(b'/') {
                in_comment = false;
                idx = idx.saturating_add(2);
                continue;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        if quotes.step(byte) {
            out.push(byte);
            idx = idx.saturating_add(1);
            continue;
        }

        if byte == b'/' && next == Some(b'*') {
            in_comment = true;
            idx = idx.saturating_add(2);
            continue;
        }

        out.push(byte);
        idx = idx.saturating_add(1);
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn normalize_ws(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_value(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut quote: Option<char> = None;
    let mut escape = false;
    let mut last_was_space = false;

    for ch in input.chars() {
        if let Some(open) = quote {
            out.push(ch);
            if !escape && ch == '\\' {
                escape = true;
            } else if !escape && ch == open {
                quote = None;
            } else {
                escape = false;
            }
            last_was_space = false;
            continue;
        }

        if ch == '\'' || ch == '"' {
            quote = Some(ch);
            out.push(ch);
            last_was_space = false;
            continue;
        }

        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
            continue;
        }

        last_was_space = false;
        out.push(ch);
    }

    out.trim().to_owned()
}
