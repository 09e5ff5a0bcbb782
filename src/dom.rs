//! A DOM-shaped view of the tree.
//!
//! The store keeps text in the `value` and `after` spans of nodes, not in
//! nodes of its own. The DOM wants text nodes, so they are derived here
//! from the char nodes of a span: a span without char nodes is a single
//! text node, otherwise every char node is one.
use crate::locale::Locale;
use crate::xobj::{CharNodeKind, Node, NodeKind, Xobj};

/// DOM node types, with their W3C codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomNodeType {
    Element,
    Attribute,
    Text,
    CDataSection,
    ProcessingInstruction,
    Comment,
    Document,
}

impl DomNodeType {
    /// The numeric `nodeType`.
    pub fn code(self) -> u16 {
        match self {
            DomNodeType::Element => 1,
            DomNodeType::Attribute => 2,
            DomNodeType::Text => 3,
            DomNodeType::CDataSection => 4,
            DomNodeType::ProcessingInstruction => 7,
            DomNodeType::Comment => 8,
            DomNodeType::Document => 9,
        }
    }
}

/// Which span of its owner a text node lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextSlot {
    /// The text at the start of a container.
    Value,
    /// The text following a node.
    After,
}

/// A node as the DOM sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomNode {
    Node(Node),
    /// The `index`th char node of a span of `owner`.
    Text {
        owner: Node,
        slot: TextSlot,
        index: usize,
    },
}

fn slot_of(xobj: &Xobj, slot: TextSlot) -> (&crate::charutil::Span, &crate::xobj::CharNodes) {
    match slot {
        TextSlot::Value => (&xobj.value, &xobj.value_nodes),
        TextSlot::After => (&xobj.after, &xobj.after_nodes),
    }
}

/// ## DOM view
impl Locale {
    // the text nodes of one span
    fn text_nodes(&self, owner: Node, slot: TextSlot) -> impl Iterator<Item = DomNode> {
        let (span, nodes) = slot_of(self.xobj(owner.get()), slot);
        let count = if span.is_empty() {
            0
        } else {
            nodes.nodes().len().max(1)
        };
        (0..count).map(move |index| DomNode::Text { owner, slot, index })
    }

    // offset, length and kind of a text node within its span
    fn text_extent(&self, owner: Node, slot: TextSlot, index: usize) -> (usize, usize, CharNodeKind) {
        let (span, nodes) = slot_of(self.xobj(owner.get()), slot);
        if !nodes.is_materialized() {
            return (0, span.len(), CharNodeKind::Text);
        }
        let offset = nodes.nodes()[..index].iter().map(|n| n.cch).sum();
        let node = nodes.nodes()[index];
        (offset, node.cch, node.kind)
    }

    pub fn dom_node_type(&self, node: DomNode) -> DomNodeType {
        match node {
            DomNode::Node(node) => match self.node_kind(node) {
                NodeKind::Root => DomNodeType::Document,
                NodeKind::Element => DomNodeType::Element,
                NodeKind::Attr => DomNodeType::Attribute,
                NodeKind::Comment => DomNodeType::Comment,
                NodeKind::Procinst => DomNodeType::ProcessingInstruction,
            },
            DomNode::Text { owner, slot, index } => match self.text_extent(owner, slot, index).2 {
                CharNodeKind::Text => DomNodeType::Text,
                CharNodeKind::CData => DomNodeType::CDataSection,
            },
        }
    }

    /// The `nodeName`: the qualified name of elements and attributes, the
    /// target of processing instructions and a `#` name for everything
    /// else.
    pub fn dom_node_name(&self, node: DomNode) -> String {
        let qualified = |node: Node| match self.node_name(node) {
            Some(name) if name.prefix().is_empty() => name.local_name().to_string(),
            Some(name) => format!("{}:{}", name.prefix(), name.local_name()),
            None => String::new(),
        };
        match (self.dom_node_type(node), node) {
            (DomNodeType::Document, _) => "#document".to_string(),
            (DomNodeType::Comment, _) => "#comment".to_string(),
            (DomNodeType::Text, _) => "#text".to_string(),
            (DomNodeType::CDataSection, _) => "#cdata-section".to_string(),
            (DomNodeType::Attribute, DomNode::Node(attr)) if self.is_namespace_attr(attr) => {
                match self.node_name(attr) {
                    Some(name) if !name.local_name().is_empty() => {
                        format!("xmlns:{}", name.local_name())
                    }
                    _ => "xmlns".to_string(),
                }
            }
            (_, DomNode::Node(node)) => qualified(node),
            (_, DomNode::Text { .. }) => unreachable!("text nodes have text types"),
        }
    }

    /// The `nodeValue`: text for attributes, text, comments and processing
    /// instructions, nothing for elements and documents.
    pub fn dom_node_value(&self, node: DomNode) -> Option<String> {
        match node {
            DomNode::Node(node) if self.node_kind(node).is_container() => None,
            DomNode::Node(node) => Some(self.value_text(node)),
            DomNode::Text { owner, slot, index } => {
                let (offset, cch, _) = self.text_extent(owner, slot, index);
                let (span, _) = slot_of(self.xobj(owner.get()), slot);
                Some(span.sub(offset, cch).get_string())
            }
        }
    }

    /// The `childNodes` of a node, text included. Attributes aren't
    /// children.
    pub fn dom_child_nodes(&self, node: Node) -> Vec<DomNode> {
        if !self.node_kind(node).is_container() {
            return Vec::new();
        }
        let mut children: Vec<DomNode> = self.text_nodes(node, TextSlot::Value).collect();
        for child in self.children(node) {
            if self.node_kind(child) != NodeKind::Attr {
                children.push(DomNode::Node(child));
            }
            // text following the last attribute is content too
            children.extend(self.text_nodes(child, TextSlot::After));
        }
        children
    }

    /// The `parentNode`. Attributes have none.
    pub fn dom_parent_node(&self, node: DomNode) -> Option<DomNode> {
        match node {
            DomNode::Node(node) if self.node_kind(node) == NodeKind::Attr => None,
            DomNode::Node(node) => self.parent(node).map(DomNode::Node),
            DomNode::Text {
                owner,
                slot: TextSlot::Value,
                ..
            } => Some(DomNode::Node(owner)),
            DomNode::Text {
                owner,
                slot: TextSlot::After,
                ..
            } => self.parent(owner).map(DomNode::Node),
        }
    }

    /// The `attributes` of an element, namespace declarations included.
    pub fn dom_attributes(&self, node: Node) -> Vec<DomNode> {
        self.attributes(node).map(DomNode::Node).collect()
    }
}
