//! Document tree model: elements, focus, scroll, and motion state.

use rt_css::StyleSheet;

/// One node in the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomNode {
    Element(Element),
    Text(String),
}

/// An element: tag, ordered attributes (names unique, lowercased), children,
/// and its own scroll offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<DomNode>,
    pub scroll_top: i32,
    pub scroll_left: i32,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            scroll_top: 0,
            scroll_left: 0,
        }
    }

    /// The element's identifier; empty when absent.
    pub fn id(&self) -> &str {
        self.attribute("id").unwrap_or("")
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.attrs
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Sets an attribute, replacing an existing value in place. Names are
    /// lowercased on write; insertion order is preserved.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if let Some((_, existing)) = self
            .attrs
            .iter_mut()
            .find(|(existing, _)| *existing == name)
        {
            *existing = value.to_owned();
            return;
        }
        self.attrs.push((name, value.to_owned()));
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        let pos = self.attrs.iter().position(|(existing, _)| *existing == name)?;
        Some(self.attrs.remove(pos).1)
    }

    /// Number of descendant elements, excluding self.
    pub fn descendant_elements(&self) -> usize {
        count_elements(&self.children)
    }

    /// First element with the given non-empty id, in document order.
    /// Matches self as well as descendants.
    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        let path = self.path_to(id)?;
        self.element_at_path(&path)
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        let path = self.path_to(id)?;
        self.element_at_path_mut(&path)
    }

    /// Child-index path from self to the element with the given id; empty
    /// path means self. `None` for empty ids and unknown ids.
    pub fn path_to(&self, id: &str) -> Option<Vec<usize>> {
        if id.is_empty() {
            return None;
        }
        if self.id() == id {
            return Some(Vec::new());
        }

        for (idx, child) in self.children.iter().enumerate() {
            let DomNode::Element(el) = child else {
                continue;
            };
            if let Some(mut path) = el.path_to(id) {
                path.insert(0, idx);
                return Some(path);
            }
        }

        None
    }

    pub fn element_at_path(&self, path: &[usize]) -> Option<&Element> {
        let mut current = self;
        for &idx in path {
            match current.children.get(idx) {
                Some(DomNode::Element(el)) => current = el,
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn element_at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for &idx in path {
            match current.children.get_mut(idx) {
                Some(DomNode::Element(el)) => current = el,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Detaches the descendant with the given id. Self cannot be detached.
    pub fn remove_descendant(&mut self, id: &str) -> Option<DomNode> {
        let path = self.path_to(id)?;
        let (&last, parent_path) = path.split_last()?;
        let parent = self.element_at_path_mut(parent_path)?;
        Some(parent.children.remove(last))
    }

    /// `(scroll_top, scroll_left)` for every descendant element whose offsets
    /// are both non-zero, in document order. Elements with a zero component
    /// carry no distinguishing scroll state.
    pub fn scroll_offsets(&self) -> Vec<(i32, i32)> {
        let mut out = Vec::new();
        collect_scroll_offsets(&self.children, &mut out);
        out
    }

    /// Serialized markup including the element itself.
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }

    /// Serialized markup of the children only.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        write_nodes(&self.children, is_raw_text_tag(&self.tag), &mut out);
        out
    }
}

fn count_elements(nodes: &[DomNode]) -> usize {
    let mut count = 0_usize;
    for node in nodes {
        if let DomNode::Element(el) = node {
            count = count.saturating_add(1).saturating_add(el.descendant_elements());
        }
    }
    count
}

fn collect_scroll_offsets(nodes: &[DomNode], out: &mut Vec<(i32, i32)>) {
    for node in nodes {
        let DomNode::Element(el) = node else {
            continue;
        };
        if el.scroll_top != 0 && el.scroll_left != 0 {
            out.push((el.scroll_top, el.scroll_left));
        }
        collect_scroll_offsets(&el.children, out);
    }
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_into(value, true, out);
        out.push('"');
    }
    out.push('>');

    if is_void_tag(&el.tag) {
        return;
    }

    write_nodes(&el.children, is_raw_text_tag(&el.tag), out);
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

fn write_nodes(nodes: &[DomNode], raw: bool, out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(text) => {
                if raw {
                    out.push_str(text);
                } else {
                    escape_into(text, false, out);
                }
            }
            DomNode::Element(el) => write_element(el, out),
        }
    }
}

fn escape_into(input: &str, in_attribute: bool, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// Tags serialized without children or a closing tag.
pub fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Tags whose text content is carried verbatim, without entity escaping.
pub fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

/// Runtime category of a motion effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    Animation,
    Transition,
}

/// One in-flight animation or transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionEffect {
    pub kind: MotionKind,
    pub name: String,
    pub target_id: String,
}

/// The live document: body tree, the single tracked stylesheet, focus
/// pointer, window scroll offset, and active motion effects. Mutated by
/// exactly one actor at a time; nothing here suspends or blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub body: Element,
    pub stylesheet: Option<StyleSheet>,
    focused: Option<String>,
    pub scroll_x: i32,
    pub scroll_y: i32,
    motions: Vec<MotionEffect>,
}

impl Document {
    pub fn new() -> Self {
        Self::with_body(Element::new("body"))
    }

    pub fn with_body(body: Element) -> Self {
        Self {
            body,
            stylesheet: Some(StyleSheet::empty()),
            focused: None,
            scroll_x: 0,
            scroll_y: 0,
            motions: Vec::new(),
        }
    }

    pub fn find(&self, id: &str) -> Option<&Element> {
        self.body.find_by_id(id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.body.find_by_id_mut(id)
    }

    pub fn path_to(&self, id: &str) -> Option<Vec<usize>> {
        self.body.path_to(id)
    }

    pub fn element_at_path(&self, path: &[usize]) -> Option<&Element> {
        self.body.element_at_path(path)
    }

    pub fn element_at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        self.body.element_at_path_mut(path)
    }

    pub fn remove_descendant(&mut self, id: &str) -> Option<DomNode> {
        self.body.remove_descendant(id)
    }

    /// Moves focus to the element with the given id. No-op (returning false)
    /// when the id does not resolve.
    pub fn focus(&mut self, id: &str) -> bool {
        if self.find(id).is_none() {
            return false;
        }
        self.focused = Some(id.to_owned());
        true
    }

    pub fn blur(&mut self) {
        self.focused = None;
    }

    /// The focused element's id, if it still resolves in the live tree.
    pub fn focused_id(&self) -> Option<&str> {
        let id = self.focused.as_deref()?;
        self.find(id).map(|_| id)
    }

    pub fn focused_element(&self) -> Option<&Element> {
        self.find(self.focused.as_deref()?)
    }

    pub fn scroll_window(&mut self, x: i32, y: i32) {
        self.scroll_x = x;
        self.scroll_y = y;
    }

    /// Scrolls the element with the given id. Returns false when it does not
    /// resolve.
    pub fn scroll_node(&mut self, id: &str, left: i32, top: i32) -> bool {
        let Some(el) = self.find_mut(id) else {
            return false;
        };
        el.scroll_left = left;
        el.scroll_top = top;
        true
    }

    pub fn add_motion(&mut self, effect: MotionEffect) {
        self.motions.push(effect);
    }

    pub fn motion_count(&self) -> usize {
        self.motions.len()
    }

    /// Cancels every active effect of one runtime category.
    pub fn cancel_motions(&mut self, kind: MotionKind) {
        self.motions.retain(|effect| effect.kind != kind);
    }

    pub fn cancel_all_motions(&mut self) {
        self.motions.clear();
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
