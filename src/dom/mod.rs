use html5ever::{namespace_url, ns, LocalName, QualName};

pub mod parser;
pub mod rewrite;
pub mod serialize;

/// Index of a node inside its [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    /// Namespaced name as produced by the HTML parser
    pub name: QualName,
    /// Source order; new attributes go last. Foreign attributes such as
    /// `xlink:href` keep their namespace.
    pub attributes: Vec<(QualName, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Arena-backed DOM tree. Node 0 is always the document node.
///
/// Detached nodes stay in the arena but are unreachable from the root, so
/// ids handed out earlier never dangle.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Create `kind` as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// Attached nodes in document (pre-)order, root included.
    pub fn descendants(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    /// Attached elements in document order.
    pub fn elements(&self) -> Vec<NodeId> {
        self.descendants()
            .into_iter()
            .filter(|id| self.element(*id).is_some())
            .collect()
    }

    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.elements()
            .into_iter()
            .filter(|id| self.element(*id).is_some_and(|el| el.tag() == tag))
            .collect()
    }

    pub fn first_element_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.elements_by_tag(tag).into_iter().next()
    }
}

impl ElementData {
    /// Empty HTML element.
    pub fn new(tag: &str) -> Self {
        Self {
            name: QualName::new(None, ns!(html), LocalName::from(tag)),
            attributes: Vec::new(),
        }
    }

    /// Local name (lowercase for HTML, case-adjusted for SVG/MathML).
    pub fn tag(&self) -> &str {
        &self.name.local
    }

    /// Value of a plain, un-namespaced attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| is_plain(k, name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the value in place, or append when absent.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| is_plain(k, name)) {
            Some((_, v)) => *v = value,
            None => self
                .attributes
                .push((QualName::new(None, ns!(), LocalName::from(name)), value)),
        }
    }
}

fn is_plain(qual: &QualName, name: &str) -> bool {
    qual.ns == ns!() && &*qual.local == name
}
