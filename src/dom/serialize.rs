//! HTML output for the arena DOM through html5ever's serializer.

use std::io;

use html5ever::serialize::{Serialize, SerializeOpts, Serializer, TraversalScope};

use crate::dom::{Document, NodeId, NodeKind};

enum Step {
    Open(NodeId),
    Close(NodeId),
}

impl Serialize for Document {
    fn serialize<S>(&self, serializer: &mut S, traversal_scope: TraversalScope) -> io::Result<()>
    where
        S: Serializer,
    {
        let root = self.root();
        let mut stack: Vec<Step> = match traversal_scope {
            TraversalScope::IncludeNode => vec![Step::Open(root)],
            TraversalScope::ChildrenOnly(_) => {
                self.node(root).children.iter().rev().map(|id| Step::Open(*id)).collect()
            }
        };

        while let Some(step) = stack.pop() {
            match step {
                Step::Open(id) => {
                    let node = self.node(id);
                    match &node.kind {
                        NodeKind::Document => {}
                        NodeKind::Doctype { name, .. } => serializer.write_doctype(name)?,
                        NodeKind::Text(text) => serializer.write_text(text)?,
                        NodeKind::Comment(text) => serializer.write_comment(text)?,
                        NodeKind::Element(el) => {
                            serializer.start_elem(
                                el.name.clone(),
                                el.attributes.iter().map(|(k, v)| (k, v.as_str())),
                            )?;
                            stack.push(Step::Close(id));
                        }
                    }
                    stack.extend(node.children.iter().rev().map(|id| Step::Open(*id)));
                }
                Step::Close(id) => {
                    if let Some(el) = self.element(id) {
                        serializer.end_elem(el.name.clone())?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Serialize the whole document as HTML.
pub fn serialize(doc: &Document) -> io::Result<String> {
    let mut buf = Vec::new();
    html5ever::serialize(&mut buf, doc, SerializeOpts::default())?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
