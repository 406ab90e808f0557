use crate::dom::{Document, ElementData, NodeId, NodeKind};
use scraper::{ElementRef, Html, Node};

/// Parse raw HTML into an arena [`Document`].
///
/// html5ever recovers from any malformed markup, so this never fails;
/// callers decide up front whether the input is worth parsing at all.
pub fn parse_html(html: &str) -> Document {
    let parsed = Html::parse_document(html);
    let mut doc = Document::new();
    let root = doc.root();

    for child in parsed.tree.root().children() {
        match ElementRef::wrap(child) {
            Some(el) => convert_element(el, &mut doc, root),
            None => {
                if let Some(kind) = convert_leaf(child.value()) {
                    doc.append(root, kind);
                }
            }
        }
    }
    doc
}

/// Parse `markup` as a body fragment and append its nodes under `parent`.
pub fn parse_fragment_into(doc: &mut Document, parent: NodeId, markup: &str) {
    let parsed = Html::parse_fragment(markup);
    // The fragment parser wraps its output in a synthetic <html>
    for child in parsed.root_element().children() {
        match ElementRef::wrap(child) {
            Some(el) => convert_element(el, doc, parent),
            None => {
                if let Some(kind) = convert_leaf(child.value()) {
                    doc.append(parent, kind);
                }
            }
        }
    }
}

fn convert_element(el: ElementRef<'_>, doc: &mut Document, parent: NodeId) {
    let data = ElementData {
        name: el.value().name.clone(),
        attributes: el
            .value()
            .attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect(),
    };
    let id = doc.append(parent, NodeKind::Element(data));

    for child_ref in el.children() {
        match ElementRef::wrap(child_ref) {
            Some(child_el) => convert_element(child_el, doc, id),
            None => {
                if let Some(kind) = convert_leaf(child_ref.value()) {
                    doc.append(id, kind);
                }
            }
        }
    }
}

fn convert_leaf(node: &Node) -> Option<NodeKind> {
    match node {
        Node::Text(t) => Some(NodeKind::Text(t.text.to_string())),
        Node::Comment(c) => Some(NodeKind::Comment(c.comment.to_string())),
        Node::Doctype(d) => Some(NodeKind::Doctype {
            name: d.name().to_string(),
            public_id: d.public_id().to_string(),
            system_id: d.system_id().to_string(),
        }),
        // Processing instructions and fragments never come out of a
        // document parse
        _ => None,
    }
}
