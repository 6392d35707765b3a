//! Markup fragment parsing into `rt-dom` trees.

use rt_dom::DomNode;
use rt_dom::Element;
use rt_dom::is_raw_text_tag;
use rt_dom::is_void_tag;

/// Parses a markup fragment into a forest of nodes. Total: malformed input
/// yields a best-effort tree, never an error. Tag and attribute names are
/// lowercased; entities are decoded in text and attribute values; the content
/// of `script`/`style` is kept verbatim.
pub fn parse_fragment(input: &str) -> Vec<DomNode> {
    build_forest(Tokenizer::new(input).run())
}

/// First element of a fragment, skipping leading text. The analog of parsing
/// markup into a template and taking its first child.
pub fn first_element(input: &str) -> Option<Element> {
    parse_fragment(input.trim())
        .into_iter()
        .find_map(|node| match node {
            DomNode::Element(el) => Some(el),
            DomNode::Text(_) => None,
        })
}

/// First element with the given tag, in document order, searching the whole
/// forest.
pub fn find_element<'a>(nodes: &'a [DomNode], tag: &str) -> Option<&'a Element> {
    for node in nodes {
        let DomNode::Element(el) = node else {
            continue;
        };
        if el.tag.eq_ignore_ascii_case(tag) {
            return Some(el);
        }
        if let Some(found) = find_element(&el.children, tag) {
            return Some(found);
        }
    }
    None
}

/// Concatenated text of a node list, descendants included.
pub fn collect_text(nodes: &[DomNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            DomNode::Text(text) => out.push_str(text),
            DomNode::Element(el) => out.push_str(&collect_text(&el.children)),
        }
    }
    out
}

#[derive(Debug)]
enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Text(String),
    Raw(String),
}

struct Tokenizer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn run(mut self) -> Vec<Token> {
        let mut out = Vec::new();

        while self.pos < self.bytes.len() {
            if self.at(b"<!--") {
                self.skip_comment();
                continue;
            }

            if self.bytes[self.pos] == b'<' {
                if self.at(b"</") {
                    if let Some(token) = self.read_end_tag() {
                        out.push(token);
                        continue;
                    }
                } else if self.at(b"<!") || self.at(b"<?") {
                    self.skip_declaration();
                    continue;
                } else if let Some(token) = self.read_start_tag() {
                    let raw_tag = match &token {
                        Token::Start {
                            name, self_closing, ..
                        } if !*self_closing && is_raw_text_tag(name) => Some(name.clone()),
                        _ => None,
                    };

                    out.push(token);

                    if let Some(tag) = raw_tag {
                        let (raw, closed) = self.read_raw_text(&tag);
                        if !raw.is_empty() {
                            out.push(Token::Raw(raw));
                        }
                        if closed {
                            out.push(Token::End { name: tag });
                        }
                    }
                    continue;
                }
            }

            let text = self.read_text();
            if !text.is_empty() {
                out.push(Token::Text(text));
            }
        }

        out
    }

    fn at(&self, pattern: &[u8]) -> bool {
        let end = self.pos.saturating_add(pattern.len());
        end <= self.bytes.len() && &self.bytes[self.pos..end] == pattern
    }

    fn skip_comment(&mut self) {
        let mut idx = self.pos.saturating_add(4);
        while idx.saturating_add(2) < self.bytes.len() {
            if &self.bytes[idx..idx + 3] == b"-->" {
                self.pos = idx + 3;
                return;
            }
            idx = idx.saturating_add(1);
        }
        self.pos = self.bytes.len();
    }

    fn skip_declaration(&mut self) {
        let mut idx = self.pos.saturating_add(2);
        while idx < self.bytes.len() {
            if self.bytes[idx] == b'>' {
                self.pos = idx + 1;
                return;
            }
            idx = idx.saturating_add(1);
        }
        self.pos = self.bytes.len();
    }

    fn skip_spaces(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos = self.pos.saturating_add(1);
        }
    }

    /// Plain text up to the next `<`. A stray `<` that opened no tag is
    /// consumed as text so the cursor always advances.
    fn read_text(&mut self) -> String {
        let start = self.pos;
        if self.pos < self.bytes.len() && self.bytes[self.pos] == b'<' {
            self.pos = self.pos.saturating_add(1);
        }
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'<' {
            self.pos = self.pos.saturating_add(1);
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    fn read_name(&mut self) -> Option<String> {
        let start = self.pos;
        while self.pos < self.bytes.len() && is_name_byte(self.bytes[self.pos]) {
            self.pos = self.pos.saturating_add(1);
        }
        if self.pos == start {
            return None;
        }
        Some(String::from_utf8_lossy(&self.bytes[start..self.pos]).to_ascii_lowercase())
    }

    fn read_end_tag(&mut self) -> Option<Token> {
        let restore = self.pos;
        self.pos = self.pos.saturating_add(2);
        self.skip_spaces();

        let Some(name) = self.read_name() else {
            self.pos = restore;
            return None;
        };

        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'>' {
            self.pos = self.pos.saturating_add(1);
        }
        if self.pos >= self.bytes.len() {
            self.pos = restore;
            return None;
        }

        self.pos = self.pos.saturating_add(1);
        Some(Token::End { name })
    }

    fn read_start_tag(&mut self) -> Option<Token> {
        let restore = self.pos;
        self.pos = self.pos.saturating_add(1);
        self.skip_spaces();

        let Some(name) = self.read_name() else {
            self.pos = restore;
            return None;
        };

        let mut attrs = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_spaces();
            if self.pos >= self.bytes.len() {
                self.pos = restore;
                return None;
            }

            if self.bytes[self.pos] == b'>' {
                self.pos = self.pos.saturating_add(1);
                break;
            }

            if self.bytes[self.pos] == b'/' {
                self_closing = true;
                self.pos = self.pos.saturating_add(1);
                self.skip_spaces();
                if self.pos < self.bytes.len() && self.bytes[self.pos] == b'>' {
                    self.pos = self.pos.saturating_add(1);
                    break;
                }
                continue;
            }

            let Some(attr_name) = self.read_name() else {
                // Junk inside the tag: skip to the closing angle bracket.
                while self.pos < self.bytes.len() && self.bytes[self.pos] != b'>' {
                    self.pos = self.pos.saturating_add(1);
                }
                if self.pos < self.bytes.len() {
                    self.pos = self.pos.saturating_add(1);
                }
                break;
            };

            self.skip_spaces();
            let mut value = String::new();
            if self.pos < self.bytes.len() && self.bytes[self.pos] == b'=' {
                self.pos = self.pos.saturating_add(1);
                self.skip_spaces();
                value = self.read_attr_value();
            }

            attrs.push((attr_name, decode_entities(&value)));
        }

        Some(Token::Start {
            name,
            attrs,
            self_closing,
        })
    }

    fn read_attr_value(&mut self) -> String {
        if self.pos < self.bytes.len()
            && (self.bytes[self.pos] == b'"' || self.bytes[self.pos] == b'\'')
        {
            let quote = self.bytes[self.pos];
            self.pos = self.pos.saturating_add(1);
            let start = self.pos;
            while self.pos < self.bytes.len() && self.bytes[self.pos] != quote {
                self.pos = self.pos.saturating_add(1);
            }
            let value = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
            if self.pos < self.bytes.len() {
                self.pos = self.pos.saturating_add(1);
            }
            return value;
        }

        let start = self.pos;
        while self.pos < self.bytes.len()
            && !self.bytes[self.pos].is_ascii_whitespace()
            && self.bytes[self.pos] != b'>'
            && self.bytes[self.pos] != b'/'
        {
            self.pos = self.pos.saturating_add(1);
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    /// Verbatim content up to the matching end tag of a raw-text element.
    /// Returns the content and whether the end tag was found.
    fn read_raw_text(&mut self, tag: &str) -> (String, bool) {
        let tag_bytes = tag.as_bytes();
        let start = self.pos;
        let mut idx = self.pos;

        while idx < self.bytes.len() {
            if self.bytes[idx] != b'<'
                || idx + 2 + tag_bytes.len() > self.bytes.len()
                || self.bytes[idx + 1] != b'/'
            {
                idx = idx.saturating_add(1);
                continue;
            }

            let name_start = idx + 2;
            let name_end = name_start + tag_bytes.len();
            if !bytes_eq_ignore_ascii_case(&self.bytes[name_start..name_end], tag_bytes) {
                idx = idx.saturating_add(1);
                continue;
            }

            let mut close = name_end;
            while close < self.bytes.len() && self.bytes[close].is_ascii_whitespace() {
                close = close.saturating_add(1);
            }
            if close < self.bytes.len() && self.bytes[close] == b'>' {
                let text = String::from_utf8_lossy(&self.bytes[start..idx]).into_owned();
                self.pos = close + 1;
                return (text, true);
            }

            idx = idx.saturating_add(1);
        }

        let text = String::from_utf8_lossy(&self.bytes[start..]).into_owned();
        self.pos = self.bytes.len();
        (text, false)
    }
}

fn build_forest(tokens: Vec<Token>) -> Vec<DomNode> {
    let mut stack = vec![Element::new("#fragment")];

    for token in tokens {
        match token {
            Token::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.children.push(DomNode::Text(decode_entities(&text)));
                }
            }
            Token::Raw(text) => {
                if let Some(current) = stack.last_mut() {
                    current.children.push(DomNode::Text(text));
                }
            }
            Token::Start {
                name,
                attrs,
                self_closing,
            } => {
                let mut el = Element::new(name.clone());
                for (attr_name, attr_value) in attrs {
                    el.set_attribute(&attr_name, &attr_value);
                }

                if self_closing || is_void_tag(&name) {
                    if let Some(current) = stack.last_mut() {
                        current.children.push(DomNode::Element(el));
                    }
                } else {
                    stack.push(el);
                }
            }
            Token::End { name } => {
                // Unwind to the matching open element, implicitly closing
                // anything unclosed along the way.
                while stack.len() > 1 {
                    let Some(el) = stack.pop() else {
                        break;
                    };
                    let matched = el.tag == name;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(DomNode::Element(el));
                    }
                    if matched {
                        break;
                    }
                }
            }
        }
    }

    while stack.len() > 1 {
        let Some(el) = stack.pop() else {
            break;
        };
        if let Some(parent) = stack.last_mut() {
            parent.children.push(DomNode::Element(el));
        }
    }

    stack.pop().map(|root| root.children).unwrap_or_default()
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}

fn bytes_eq_ignore_ascii_case(left: &[u8], right: &[u8]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right.iter())
            .all(|(lhs, rhs)| lhs.eq_ignore_ascii_case(rhs))
}

fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0_usize;

    while let Some(rel_amp) = input[cursor..].find('&') {
        let amp = cursor + rel_amp;
        out.push_str(&input[cursor..amp]);

        let rest = &input[(amp + 1)..];
        let Some(rel_semi) = rest.find(';') else {
            out.push('&');
            cursor = amp + 1;
            continue;
        };

        let semi = amp + 1 + rel_semi;
        let entity = &input[(amp + 1)..semi];
        if let Some(decoded) = decode_entity(entity) {
            out.push(decoded);
            cursor = semi + 1;
        } else {
            out.push('&');
            cursor = amp + 1;
        }
    }

    out.push_str(&input[cursor..]);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                char::from_u32(u32::from_str_radix(hex, 16).ok()?)
            } else if let Some(dec) = entity.strip_prefix('#') {
                char::from_u32(dec.parse::<u32>().ok()?)
            } else {
                None
            }
        }
    }
}
