//! Serializes a document into a standalone page and reconstructs a document
//! from one, modelling a save-then-reload cycle.
//!
//! The packaged page carries everything a fresh load needs: the stylesheet
//! inlined in `<head>`, the body markup, and a trailing sentinel script that
//! replays focus and cancels animations on load. The sentinel sits after the
//! body in the page text; a reload re-parents it as the body's last child,
//! exactly as a live parser would.

use rt_css::CssParser;
use rt_dom::Document;
use rt_dom::DomNode;
use rt_dom::Element;

/// Element id of the sentinel script appended to every packaged page.
pub const SENTINEL_ID: &str = "fit";

/// Source path of the harness script referenced from the packaged head.
pub const ATTACH_SCRIPT_SRC: &str = "/tmp/roundtrip.js";

/// Renders `doc` as a complete standalone page. `focused_id` is baked into
/// the sentinel so the reloaded page restores focus to the same element.
pub fn package_page(doc: &Document, focused_id: Option<&str>) -> String {
    let mut page = String::from("<!DOCTYPE html>\n<html><head><style>");
    if let Some(sheet) = &doc.stylesheet {
        page.push_str(&sheet.css_text());
    }
    page.push_str("</style><script src='");
    page.push_str(ATTACH_SCRIPT_SRC);
    page.push_str("'></script></head>");
    page.push_str(&doc.body.outer_html());
    page.push_str(&sentinel_block(focused_id));
    page.push_str("</html>");
    page
}

/// The sentinel script block: a focus replay for `focused_id` when present,
/// then an unconditional animation cancel.
pub fn sentinel_block(focused_id: Option<&str>) -> String {
    let mut js = String::from("\n");
    if let Some(id) = focused_id {
        js.push_str("let foc = document.getElementById(\"");
        for ch in id.chars() {
            // Keep the id a valid JS string literal even when it carries
            // quotes or backslashes.
            if ch == '"' || ch == '\\' {
                js.push('\\');
            }
            js.push(ch);
        }
        js.push_str("\");\nif (foc) {\n    foc.focus();\n}\n");
    }
    js.push_str(
        "let anis = document.getAnimations();\nfor (let i = 0; i < anis.length; i++) {\n    anis[i].cancel();\n}\n",
    );
    format!("<script id=\"{SENTINEL_ID}\">{js}</script>")
}

/// Reconstructs a document from a packaged page, applying what the sentinel
/// would do on load: the sentinel script moves into the body, its focus
/// directive is replayed, all animations are cancelled, and window scroll
/// starts at the origin.
pub fn reopen(page: &str) -> Document {
    let mut nodes = rt_html::parse_fragment(page);

    let css_text = rt_html::find_element(&nodes, "style")
        .map(|style| rt_html::collect_text(&style.children))
        .unwrap_or_default();

    let (mut body, sentinel) = if let Some(mut html) = take_child(&mut nodes, |el| el.tag == "html")
    {
        let sentinel = take_child(&mut html.children, |el| el.id() == SENTINEL_ID);
        let body = take_child(&mut html.children, |el| el.tag == "body")
            .unwrap_or_else(|| Element::new("body"));
        (body, sentinel)
    } else {
        // No <html> wrapper: treat the whole forest as body content.
        let sentinel = take_child(&mut nodes, |el| el.id() == SENTINEL_ID);
        let mut body = Element::new("body");
        body.children = nodes;
        (body, sentinel)
    };

    let focus_target = sentinel
        .as_ref()
        .and_then(|script| focus_directive(&rt_html::collect_text(&script.children)));
    if let Some(script) = sentinel {
        body.children.push(DomNode::Element(script));
    }

    let mut doc = Document::with_body(body);
    doc.stylesheet = Some(CssParser.parse(&css_text));
    if let Some(id) = focus_target {
        let _ = doc.focus(&id);
    }
    doc.cancel_all_motions();
    doc.scroll_window(0, 0);
    doc
}

/// Removes and returns the first direct child element matching `pred`.
fn take_child<F>(children: &mut Vec<DomNode>, pred: F) -> Option<Element>
where
    F: Fn(&Element) -> bool,
{
    let idx = children
        .iter()
        .position(|node| matches!(node, DomNode::Element(el) if pred(el)))?;
    let DomNode::Element(el) = children.remove(idx) else {
        return None;
    };
    Some(el)
}

/// Extracts the element id from the sentinel's focus replay line, undoing
/// the string-literal escaping applied on emission.
fn focus_directive(script_text: &str) -> Option<String> {
    let marker = "getElementById(\"";
    let start = script_text.find(marker)? + marker.len();

    let mut id = String::new();
    let mut chars = script_text[start..].chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => id.push(chars.next()?),
            '"' => return Some(id),
            _ => id.push(ch),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::ATTACH_SCRIPT_SRC;
    use super::SENTINEL_ID;
    use super::package_page;
    use super::reopen;
    use super::sentinel_block;
    use rt_css::CssParser;
    use rt_dom::Document;
    use rt_dom::DomNode;
    use rt_dom::Element;
    use rt_dom::MotionEffect;
    use rt_dom::MotionKind;

    fn sample_document() -> Document {
        let mut body = Element::new("body");
        body.children =
            rt_html::parse_fragment("<div id=\"a\"><input id=\"field\"></div><p id=\"p\">text</p>");
        let mut doc = Document::with_body(body);
        doc.stylesheet = Some(CssParser.parse("p { color: red; }"));
        doc
    }

    #[test]
    fn packaged_page_has_head_body_and_sentinel() {
        let doc = sample_document();
        let page = package_page(&doc, Some("field"));

        assert!(page.starts_with("<!DOCTYPE html>\n<html><head><style>"));
        assert!(page.contains("p{color:red}"));
        assert!(page.contains(&format!("<script src='{ATTACH_SCRIPT_SRC}'></script></head>")));
        assert!(page.contains("<body><div id=\"a\">"));
        assert!(page.contains(&format!("<script id=\"{SENTINEL_ID}\">")));
        assert!(page.contains("getElementById(\"field\")"));
        assert!(page.ends_with("</html>"));
    }

    #[test]
    fn sentinel_without_focus_omits_the_replay_line() {
        let block = sentinel_block(None);
        assert!(!block.contains("getElementById"));
        assert!(block.contains("anis[i].cancel()"));
    }

    #[test]
    fn reopen_rebuilds_body_and_stylesheet() {
        let doc = sample_document();
        let page = package_page(&doc, None);

        let reloaded = reopen(&page);
        assert!(reloaded.find("a").is_some());
        assert_eq!(
            rt_html::collect_text(&reloaded.find("p").map(|el| el.children.clone()).unwrap_or_default()),
            "text",
        );
        assert_eq!(
            reloaded.stylesheet.as_ref().map(|sheet| sheet.css_text()),
            Some("p{color:red}".to_owned()),
        );
    }

    #[test]
    fn reopen_reparents_the_sentinel_into_the_body() {
        let doc = sample_document();
        let page = package_page(&doc, None);

        let reloaded = reopen(&page);
        let Some(DomNode::Element(last)) = reloaded.body.children.last() else {
            panic!("body should end with the sentinel element");
        };
        assert_eq!(last.tag, "script");
        assert_eq!(last.id(), SENTINEL_ID);
    }

    #[test]
    fn reopen_replays_focus_from_the_sentinel() {
        let mut doc = sample_document();
        assert!(doc.focus("field"));
        let page = package_page(&doc, doc.focused_id());

        let reloaded = reopen(&page);
        assert_eq!(reloaded.focused_id(), Some("field"));
    }

    #[test]
    fn focus_survives_reload_for_ids_with_quotes_and_backslashes() {
        for id in ["a\"b", "a\\b", "a\\\"b"] {
            let mut body = Element::new("body");
            let mut field = Element::new("input");
            field.set_attribute("id", id);
            body.children.push(DomNode::Element(field));
            let mut doc = Document::with_body(body);
            assert!(doc.focus(id));

            let reloaded = reopen(&package_page(&doc, doc.focused_id()));
            assert_eq!(reloaded.focused_id(), Some(id), "id {id:?}");
        }
    }

    #[test]
    fn reopen_drops_motions_and_window_scroll() {
        let mut doc = sample_document();
        doc.add_motion(MotionEffect {
            kind: MotionKind::Animation,
            name: "spin".to_owned(),
            target_id: "a".to_owned(),
        });
        doc.scroll_window(12, 99);
        let page = package_page(&doc, None);

        let reloaded = reopen(&page);
        assert_eq!(reloaded.motion_count(), 0);
        assert_eq!((reloaded.scroll_x, reloaded.scroll_y), (0, 0));
    }

    #[test]
    fn reopen_without_html_wrapper_uses_the_forest_as_body() {
        let reloaded = reopen("<div id=\"solo\">x</div>");
        assert!(reloaded.find("solo").is_some());
    }

    #[test]
    fn each_reload_cycle_adds_one_sentinel_to_the_body() {
        // Packaging appends a fresh sentinel after the body and reloading
        // re-parents it inside, so repeated cycles accumulate sentinel
        // scripts. Comparisons elsewhere strip them before diffing.
        let doc = sample_document();
        let once = reopen(&package_page(&doc, None));
        let twice = reopen(&package_page(&once, None));

        let count = |reloaded: &Document| {
            reloaded
                .body
                .children
                .iter()
                .filter(|node| matches!(node, DomNode::Element(el) if el.id() == SENTINEL_ID))
                .count()
        };
        assert_eq!(count(&once), 1);
        assert_eq!(count(&twice), 2);
    }
}
