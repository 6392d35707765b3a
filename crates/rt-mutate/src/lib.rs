//! Reversible mutation commands over the live document.
//!
//! Every constructor applies its mutation immediately and captures just
//! enough prior state to invert it. Preconditions are validated against the
//! document as it is *now*; a missing target never errors, it degrades the
//! command to inert. `restore` is safe to call on inert commands and safe to
//! call twice.
//!
//! Known, deliberate granularity limits (kept, not fixed): DelNode and
//! MoveNode restore by overwriting the captured parent's entire inner
//! markup, so interleaved mutations under that parent are clobbered by the
//! restore; AddCSS restores positionally (last rule popped), so interleaved
//! rule mutations break out-of-order restores.

use rt_css::CssParser;
use rt_css::Rule;
use rt_dom::Document;
use rt_dom::DomNode;
use rt_dom::Element;

/// Where AddNode places the parsed element relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    BeforeTarget,
    AfterTarget,
    InsideFirst,
    InsideLast,
}

impl InsertPosition {
    /// The adjacency name used on the driver wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeTarget => "beforebegin",
            Self::InsideFirst => "afterbegin",
            Self::InsideLast => "beforeend",
            Self::AfterTarget => "afterend",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "beforebegin" => Some(Self::BeforeTarget),
            "afterbegin" => Some(Self::InsideFirst),
            "beforeend" => Some(Self::InsideLast),
            "afterend" => Some(Self::AfterTarget),
            _ => None,
        }
    }
}

/// One applied mutation with its captured inverse.
#[derive(Debug)]
pub struct Command {
    mutable: bool,
    undo: Option<Undo>,
}

/// Captured prior state, one variant per restore strategy.
#[derive(Debug)]
enum Undo {
    SwapBack {
        target_id: String,
        original: Element,
    },
    ParentInner {
        parent_path: Vec<usize>,
        markup: String,
    },
    DetachThenParentInner {
        moved_id: String,
        parent_path: Vec<usize>,
        markup: String,
    },
    PriorAttribute {
        target_path: Vec<usize>,
        name: String,
        prior: String,
    },
    ReinsertAttribute {
        target_path: Vec<usize>,
        name: String,
        value: String,
    },
    PopLastRule,
    ReinsertRule {
        pos: usize,
        rule: Rule,
    },
    ResetProperty {
        rule_pos: usize,
        name: String,
        value: String,
    },
    ScrollBack {
        target_id: String,
        left: i32,
        top: i32,
    },
}

impl Command {
    fn inert() -> Self {
        Self {
            mutable: false,
            undo: None,
        }
    }

    fn applied(undo: Undo) -> Self {
        Self {
            mutable: true,
            undo: Some(undo),
        }
    }

    /// True iff preconditions held at construction and the mutation can be
    /// inverted.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Replaces the element with id `id` by a fresh `new_tag` element
    /// carrying the same attributes and children. Restore swaps the original
    /// element back in.
    pub fn tag_change(doc: &mut Document, id: &str, new_tag: &str) -> Self {
        let Some(path) = doc.path_to(id) else {
            return Self::inert();
        };
        let Some((&last, parent_path)) = path.split_last() else {
            return Self::inert();
        };
        let Some(parent) = doc.element_at_path_mut(parent_path) else {
            return Self::inert();
        };
        let Some(DomNode::Element(target)) = parent.children.get(last) else {
            return Self::inert();
        };

        let mut replacement = Element::new(new_tag.to_ascii_lowercase());
        replacement.attrs = target.attrs.clone();
        replacement.children = target.children.clone();

        let swapped = std::mem::replace(&mut parent.children[last], DomNode::Element(replacement));
        let DomNode::Element(original) = swapped else {
            return Self::inert();
        };

        Self::applied(Undo::SwapBack {
            target_id: id.to_owned(),
            original,
        })
    }

    /// Parses `markup` and inserts its first element adjacent to the element
    /// with id `id`. One-way: no inverse is exposed and the command always
    /// reports immutable.
    pub fn add_node(doc: &mut Document, id: &str, pos: InsertPosition, markup: &str) -> Self {
        let Some(new_el) = rt_html::first_element(markup) else {
            return Self::inert();
        };
        let Some(path) = doc.path_to(id) else {
            return Self::inert();
        };

        match pos {
            InsertPosition::InsideFirst => {
                if let Some(target) = doc.element_at_path_mut(&path) {
                    target.children.insert(0, DomNode::Element(new_el));
                }
            }
            InsertPosition::InsideLast => {
                if let Some(target) = doc.element_at_path_mut(&path) {
                    target.children.push(DomNode::Element(new_el));
                }
            }
            InsertPosition::BeforeTarget | InsertPosition::AfterTarget => {
                // The body has no parent in this model; before/after it is a
                // no-op.
                let Some((&last, parent_path)) = path.split_last() else {
                    return Self::inert();
                };
                if let Some(parent) = doc.element_at_path_mut(parent_path) {
                    let at = if pos == InsertPosition::BeforeTarget {
                        last
                    } else {
                        last.saturating_add(1)
                    };
                    let at = at.min(parent.children.len());
                    parent.children.insert(at, DomNode::Element(new_el));
                }
            }
        }

        Self::inert()
    }

    /// Removes the element with id `id`, capturing its parent's entire inner
    /// markup first. Restore rewrites the parent's children from that
    /// capture.
    pub fn del_node(doc: &mut Document, id: &str) -> Self {
        let Some(path) = doc.path_to(id) else {
            return Self::inert();
        };
        let Some((&last, parent_path)) = path.split_last() else {
            return Self::inert();
        };
        let parent_path = parent_path.to_vec();
        let Some(parent) = doc.element_at_path_mut(&parent_path) else {
            return Self::inert();
        };

        let markup = parent.inner_html();
        parent.children.remove(last);

        Self::applied(Undo::ParentInner {
            parent_path,
            markup,
        })
    }

    /// Appends the element `id1` as the last child of `id2`. Rejected (inert)
    /// when either is missing, they are the same element, or one contains the
    /// other.
    pub fn move_node(doc: &mut Document, id1: &str, id2: &str) -> Self {
        if id1 == id2 {
            return Self::inert();
        }
        let Some(path1) = doc.path_to(id1) else {
            return Self::inert();
        };
        let Some(path2) = doc.path_to(id2) else {
            return Self::inert();
        };
        if is_path_prefix(&path1, &path2) || is_path_prefix(&path2, &path1) {
            return Self::inert();
        }
        let Some((&last, parent_path)) = path1.split_last() else {
            return Self::inert();
        };

        let parent_path = parent_path.to_vec();
        let Some(parent) = doc.element_at_path_mut(&parent_path) else {
            return Self::inert();
        };
        let markup = parent.inner_html();
        let moved = parent.children.remove(last);

        // The target's path may have shifted once the node left its parent.
        let Some(target_path) = doc.path_to(id2) else {
            return Self::inert();
        };
        let Some(target) = doc.element_at_path_mut(&target_path) else {
            return Self::inert();
        };
        target.children.push(moved);

        Self::applied(Undo::DetachThenParentInner {
            moved_id: id1.to_owned(),
            parent_path,
            markup,
        })
    }

    /// Sets attribute `name` to `value`, capturing the prior value (empty
    /// when absent). Restore re-sets a non-empty prior and removes the
    /// attribute otherwise — an empty prior value restores to removal.
    /// The undo addresses the element by path, not by id: `name` may be
    /// `id` itself, in which case the command just renamed its own lookup
    /// key.
    pub fn add_attribute(doc: &mut Document, id: &str, name: &str, value: &str) -> Self {
        let Some(target_path) = doc.path_to(id) else {
            return Self::inert();
        };
        let Some(el) = doc.element_at_path_mut(&target_path) else {
            return Self::inert();
        };

        let prior = el.attribute(name).unwrap_or("").to_owned();
        el.set_attribute(name, value);

        Self::applied(Undo::PriorAttribute {
            target_path,
            name: name.to_ascii_lowercase(),
            prior,
        })
    }

    /// Removes attribute `name`; inert when the element lacks it. Like
    /// AddAttribute, the undo is path-addressed so removing `id` itself
    /// stays invertible.
    pub fn del_attribute(doc: &mut Document, id: &str, name: &str) -> Self {
        let Some(target_path) = doc.path_to(id) else {
            return Self::inert();
        };
        let Some(el) = doc.element_at_path_mut(&target_path) else {
            return Self::inert();
        };
        let Some(value) = el.remove_attribute(name) else {
            return Self::inert();
        };

        Self::applied(Undo::ReinsertAttribute {
            target_path,
            name: name.to_ascii_lowercase(),
            value,
        })
    }

    /// Appends the first rule parsed from `css_text` to the stylesheet.
    /// Restore pops the *last* rule: valid only while no other rule mutation
    /// intervened (LIFO, positional, not content-addressed).
    pub fn add_css(doc: &mut Document, css_text: &str) -> Self {
        let Some(sheet) = doc.stylesheet.as_mut() else {
            return Self::inert();
        };
        let Some(rule) = CssParser.parse_rule(css_text) else {
            return Self::inert();
        };

        sheet.rules.push(rule);
        Self::applied(Undo::PopLastRule)
    }

    /// Removes the rule at `rule_idx % rule_count`. Out-of-range indices wrap
    /// by modulo as part of the contract. Restore re-inserts the captured
    /// rule at the same position (clamped to the current count).
    pub fn del_css(doc: &mut Document, rule_idx: usize) -> Self {
        let Some(sheet) = doc.stylesheet.as_mut() else {
            return Self::inert();
        };
        let count = sheet.rule_count();
        if count == 0 {
            return Self::inert();
        }

        let pos = rule_idx % count;
        let Some(rule) = sheet.remove_rule(pos) else {
            return Self::inert();
        };

        Self::applied(Undo::ReinsertRule { pos, rule })
    }

    /// Removes the declaration at `prop_idx % declaration_count` from the
    /// rule at `rule_idx % rule_count`. Both indices wrap by modulo. Requires
    /// at least two rules in the sheet. Restore re-sets the property on the
    /// rule at the captured index.
    pub fn del_css_property(doc: &mut Document, rule_idx: usize, prop_idx: usize) -> Self {
        let Some(sheet) = doc.stylesheet.as_mut() else {
            return Self::inert();
        };
        let count = sheet.rule_count();
        if count < 2 {
            return Self::inert();
        }

        let rule_pos = rule_idx % count;
        let Some(rule) = sheet.rules.get_mut(rule_pos) else {
            return Self::inert();
        };
        let declarations = rule.declaration_count();
        if declarations == 0 {
            return Self::inert();
        }

        let name = rule.declarations[prop_idx % declarations].name.clone();
        let Some(value) = rule.remove_property(&name) else {
            return Self::inert();
        };

        Self::applied(Undo::ResetProperty {
            rule_pos,
            name,
            value,
        })
    }

    /// Scrolls the element with id `id` to `(left, top)`, capturing the prior
    /// offsets.
    pub fn scrolling(doc: &mut Document, id: &str, left: i32, top: i32) -> Self {
        let Some(el) = doc.find_mut(id) else {
            return Self::inert();
        };

        let prior_left = el.scroll_left;
        let prior_top = el.scroll_top;
        el.scroll_left = left;
        el.scroll_top = top;

        Self::applied(Undo::ScrollBack {
            target_id: id.to_owned(),
            left: prior_left,
            top: prior_top,
        })
    }

    /// Inverts the mutation. No-op for inert commands and for second calls.
    /// A capture whose target no longer resolves restores nothing.
    pub fn restore(&mut self, doc: &mut Document) {
        let Some(undo) = self.undo.take() else {
            return;
        };

        match undo {
            Undo::SwapBack {
                target_id,
                original,
            } => {
                let Some(path) = doc.path_to(&target_id) else {
                    return;
                };
                let Some((&last, parent_path)) = path.split_last() else {
                    return;
                };
                if let Some(parent) = doc.element_at_path_mut(parent_path) {
                    parent.children[last] = DomNode::Element(original);
                }
            }
            Undo::ParentInner {
                parent_path,
                markup,
            } => {
                if let Some(parent) = doc.element_at_path_mut(&parent_path) {
                    parent.children = rt_html::parse_fragment(&markup);
                }
            }
            Undo::DetachThenParentInner {
                moved_id,
                parent_path,
                markup,
            } => {
                let _ = doc.remove_descendant(&moved_id);
                if let Some(parent) = doc.element_at_path_mut(&parent_path) {
                    parent.children = rt_html::parse_fragment(&markup);
                }
            }
            Undo::PriorAttribute {
                target_path,
                name,
                prior,
            } => {
                if let Some(el) = doc.element_at_path_mut(&target_path) {
                    if prior.is_empty() {
                        el.remove_attribute(&name);
                    } else {
                        el.set_attribute(&name, &prior);
                    }
                }
            }
            Undo::ReinsertAttribute {
                target_path,
                name,
                value,
            } => {
                if let Some(el) = doc.element_at_path_mut(&target_path) {
                    el.set_attribute(&name, &value);
                }
            }
            Undo::PopLastRule => {
                if let Some(sheet) = doc.stylesheet.as_mut() {
                    sheet.rules.pop();
                }
            }
            Undo::ReinsertRule { pos, rule } => {
                if let Some(sheet) = doc.stylesheet.as_mut() {
                    sheet.insert_rule(pos, rule);
                }
            }
            Undo::ResetProperty {
                rule_pos,
                name,
                value,
            } => {
                if let Some(rule) = doc
                    .stylesheet
                    .as_mut()
                    .and_then(|sheet| sheet.rules.get_mut(rule_pos))
                {
                    rule.set_property(&name, &value);
                }
            }
            Undo::ScrollBack {
                target_id,
                left,
                top,
            } => {
                if let Some(el) = doc.find_mut(&target_id) {
                    el.scroll_left = left;
                    el.scroll_top = top;
                }
            }
        }
    }
}

fn is_path_prefix(prefix: &[usize], path: &[usize]) -> bool {
    prefix.len() <= path.len() && path[..prefix.len()] == *prefix
}
