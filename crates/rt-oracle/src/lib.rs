//! State snapshot and equivalence oracle.
//!
//! `StateChecker::capture` freezes the observable render state of a document:
//! body tree, stylesheet text, focused element, scroll positions, and the
//! live motion count. Each `is_*_same` predicate re-derives the same facet
//! from a document and compares it against the snapshot. `is_same_state` is
//! the conjunction used as the metamorphic verdict; the css facet is tracked
//! but deliberately left out of it, matching what the verdict has always
//! meant.
//!
//! Fresh copies are stripped of the reload sentinel before comparison; the
//! stored snapshot is taken before any sentinel exists and is kept as-is.

use rt_dom::Document;
use rt_dom::Element;
use rt_dom::MotionKind;

/// A frozen render-state snapshot plus the packaged page it came from.
#[derive(Debug, Clone)]
pub struct StateChecker {
    dom_tree: Element,
    css_rules: String,
    focus_node: Option<Element>,
    scroll_positions: Vec<(i32, i32)>,
    animations: usize,
    page_html: String,
}

impl StateChecker {
    /// Snapshots `doc`. Transitions are cancelled before animations so a
    /// transition retrigger cannot masquerade as an animation; both are gone
    /// by the time the counts and the page are captured.
    pub fn capture(doc: &mut Document) -> Self {
        doc.cancel_motions(MotionKind::Transition);
        doc.cancel_motions(MotionKind::Animation);

        let dom_tree = doc.body.clone();
        let css_rules = stylesheet_text(doc);
        let focus_node = doc.focused_element().cloned();
        let scroll_positions = scroll_positions(doc);
        let animations = doc.motion_count();
        let page_html = rt_reload::package_page(doc, doc.focused_id());

        Self {
            dom_tree,
            css_rules,
            focus_node,
            scroll_positions,
            animations,
            page_html,
        }
    }

    /// The standalone page packaged at capture time, reloadable via
    /// `rt_reload::reopen`.
    pub fn page_html(&self) -> &str {
        &self.page_html
    }

    /// Body tree equality against the snapshot, ignoring a reload sentinel
    /// in `doc`.
    pub fn is_dom_same(&self, doc: &Document) -> bool {
        let mut current = doc.body.clone();
        strip_sentinel(&mut current);
        compare_nodes(&self.dom_tree, &current)
    }

    /// Stylesheet text equality. Tracked for diagnostics only; not part of
    /// `is_same_state`.
    pub fn is_css_same(&self, doc: &Document) -> bool {
        self.css_rules == stylesheet_text(doc)
    }

    /// Focused-element equality by subtree comparison. Both unfocused counts
    /// as same; a focus appearing or disappearing does not.
    pub fn is_focus_same(&self, doc: &Document) -> bool {
        match (&self.focus_node, doc.focused_element()) {
            (None, None) => true,
            (Some(captured), Some(current)) => {
                let mut current = current.clone();
                strip_sentinel(&mut current);
                compare_nodes(captured, &current)
            }
            _ => false,
        }
    }

    /// Scroll equality: window offsets plus every scrolled element, in
    /// document order.
    pub fn is_scroll_same(&self, doc: &Document) -> bool {
        self.scroll_positions == scroll_positions(doc)
    }

    /// Quiescence check: passes only when both the snapshot and `doc` have
    /// zero live motions.
    pub fn is_animation_same(&self, doc: &Document) -> bool {
        self.animations == 0 && doc.motion_count() == 0
    }

    /// The aggregate verdict: dom, focus, scroll, and animation facets must
    /// all match. Css is excluded.
    pub fn is_same_state(&self, doc: &Document) -> bool {
        self.is_dom_same(doc)
            && self.is_focus_same(doc)
            && self.is_scroll_same(doc)
            && self.is_animation_same(doc)
    }
}

/// Structural equality: equal descendant element counts, then equal
/// serialized markup. The count check rejects most mismatches without
/// serializing.
pub fn compare_nodes(a: &Element, b: &Element) -> bool {
    if a.descendant_elements() != b.descendant_elements() {
        return false;
    }
    a.outer_html() == b.outer_html()
}

fn stylesheet_text(doc: &Document) -> String {
    doc.stylesheet
        .as_ref()
        .map(|sheet| sheet.css_text())
        .unwrap_or_default()
}

/// Window `(x, y)` first, then `(scroll_top, scroll_left)` for every element
/// with a live scroll offset, in document order.
fn scroll_positions(doc: &Document) -> Vec<(i32, i32)> {
    let mut positions = vec![(doc.scroll_x, doc.scroll_y)];
    positions.extend(doc.body.scroll_offsets());
    positions
}

fn strip_sentinel(el: &mut Element) {
    let _ = el.remove_descendant(rt_reload::SENTINEL_ID);
}

#[cfg(test)]
mod tests {
    use super::StateChecker;
    use super::compare_nodes;
    use rt_css::CssParser;
    use rt_dom::Document;
    use rt_dom::Element;
    use rt_dom::MotionEffect;
    use rt_dom::MotionKind;
    use rt_mutate::Command;

    fn sample_document() -> Document {
        let mut body = Element::new("body");
        body.children = rt_html::parse_fragment(
            "<div id=\"a\"><input id=\"field\"><span id=\"b\">hi</span></div><p id=\"p\">tail</p>",
        );
        let mut doc = Document::with_body(body);
        doc.stylesheet = Some(CssParser.parse("p { color: red; }"));
        doc
    }

    #[test]
    fn snapshot_matches_the_unchanged_document() {
        let mut doc = sample_document();
        let checker = StateChecker::capture(&mut doc);

        assert!(checker.is_dom_same(&doc));
        assert!(checker.is_focus_same(&doc));
        assert!(checker.is_scroll_same(&doc));
        assert!(checker.is_animation_same(&doc));
        assert!(checker.is_css_same(&doc));
        assert!(checker.is_same_state(&doc));
    }

    #[test]
    fn dom_changes_break_only_the_dom_facet() {
        let mut doc = sample_document();
        let checker = StateChecker::capture(&mut doc);

        let mut command = Command::add_attribute(&mut doc, "b", "data-x", "1");
        assert!(!checker.is_dom_same(&doc));
        assert!(!checker.is_same_state(&doc));
        assert!(checker.is_scroll_same(&doc));

        command.restore(&mut doc);
        assert!(checker.is_same_state(&doc));
    }

    #[test]
    fn element_count_mismatch_fails_before_markup() {
        let a = Element::new("div");
        let mut b = Element::new("div");
        b.children.push(rt_dom::DomNode::Element(Element::new("span")));
        assert!(!compare_nodes(&a, &b));
        assert!(compare_nodes(&a, &a.clone()));
    }

    #[test]
    fn focus_changes_are_detected() {
        let mut doc = sample_document();
        assert!(doc.focus("field"));
        let checker = StateChecker::capture(&mut doc);
        assert!(checker.is_focus_same(&doc));

        doc.blur();
        assert!(!checker.is_focus_same(&doc));

        assert!(doc.focus("b"));
        assert!(!checker.is_focus_same(&doc));

        assert!(doc.focus("field"));
        assert!(checker.is_focus_same(&doc));
    }

    #[test]
    fn window_and_element_scroll_changes_are_detected() {
        let mut doc = sample_document();
        assert!(doc.scroll_node("a", 5, 9));
        let checker = StateChecker::capture(&mut doc);
        assert!(checker.is_scroll_same(&doc));

        doc.scroll_window(0, 100);
        assert!(!checker.is_scroll_same(&doc));
        doc.scroll_window(0, 0);
        assert!(checker.is_scroll_same(&doc));

        let mut command = Command::scrolling(&mut doc, "a", 50, 90);
        assert!(!checker.is_scroll_same(&doc));
        command.restore(&mut doc);
        assert!(checker.is_scroll_same(&doc));
    }

    #[test]
    fn capture_cancels_motions_and_flags_new_ones() {
        let mut doc = sample_document();
        doc.add_motion(MotionEffect {
            kind: MotionKind::Transition,
            name: "fade".to_owned(),
            target_id: "a".to_owned(),
        });

        let checker = StateChecker::capture(&mut doc);
        assert_eq!(doc.motion_count(), 0);
        assert!(checker.is_animation_same(&doc));

        doc.add_motion(MotionEffect {
            kind: MotionKind::Animation,
            name: "spin".to_owned(),
            target_id: "a".to_owned(),
        });
        assert!(!checker.is_animation_same(&doc));
        assert!(!checker.is_same_state(&doc));
    }

    #[test]
    fn css_divergence_does_not_change_the_verdict() {
        let mut doc = sample_document();
        let checker = StateChecker::capture(&mut doc);

        let applied = Command::add_css(&mut doc, "h1 { color: blue }");
        assert!(applied.is_mutable());
        assert!(!checker.is_css_same(&doc));
        assert!(checker.is_same_state(&doc));
    }

    #[test]
    fn reloading_the_packaged_page_preserves_the_verdict() {
        let mut doc = sample_document();
        assert!(doc.focus("field"));
        let checker = StateChecker::capture(&mut doc);

        // The reloaded body gains the sentinel script; stripping it before
        // comparison keeps the reload invisible to every facet.
        let reloaded = rt_reload::reopen(checker.page_html());
        assert!(checker.is_dom_same(&reloaded));
        assert!(checker.is_focus_same(&reloaded));
        assert!(checker.is_scroll_same(&reloaded));
        assert!(checker.is_same_state(&reloaded));
    }

    #[test]
    fn mutate_restore_reload_is_state_preserving() {
        let mut doc = sample_document();
        let checker = StateChecker::capture(&mut doc);

        let mut commands = vec![
            Command::tag_change(&mut doc, "b", "strong"),
            Command::add_attribute(&mut doc, "p", "data-k", "v"),
            Command::del_node(&mut doc, "field"),
        ];
        assert!(!checker.is_dom_same(&doc));
        assert!(!checker.is_same_state(&doc));

        for command in commands.iter_mut().rev() {
            command.restore(&mut doc);
        }
        assert!(checker.is_same_state(&doc));

        let reloaded = rt_reload::reopen(checker.page_html());
        assert!(checker.is_same_state(&reloaded));
    }
}
