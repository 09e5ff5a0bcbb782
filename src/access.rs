use indextree::NodeEdge;

use crate::error::{Error, Result};
use crate::locale::Locale;
use crate::name::{QName, XML_NAMESPACE};
use crate::xobj::{Flavor, Node, NodeKind};

/// ## Read-only node access
impl Locale {
    /// The kind of a node.
    pub fn node_kind(&self, node: Node) -> NodeKind {
        self.xobj(node.get()).kind
    }

    /// The capability flavor of a node.
    pub fn flavor(&self, node: Node) -> Flavor {
        self.xobj(node.get()).flavor
    }

    /// The name of an element or attribute, or the target of a processing
    /// instruction. The prefix is the one the node was created or loaded
    /// with, if any.
    ///
    /// ```rust
    /// let mut locale = xmlstore::Locale::new();
    /// let root = locale.parse(r#"<a:doc xmlns:a="urn:a"/>"#).unwrap();
    /// let doc = locale.document_element(root).unwrap();
    /// let name = locale.node_name(doc).unwrap();
    /// assert_eq!(name.namespace(), "urn:a");
    /// assert_eq!(name.local_name(), "doc");
    /// assert_eq!(name.prefix(), "a");
    /// ```
    pub fn node_name(&self, node: Node) -> Option<QName> {
        let xobj = self.xobj(node.get());
        xobj.name.map(|name| {
            self.names
                .qname(name, xobj.prefix.unwrap_or(self.names.empty_prefix))
        })
    }

    /// The value text: attribute value, comment text, processing
    /// instruction data or the text at the start of a container.
    pub fn value_text(&self, node: Node) -> String {
        self.xobj(node.get()).value.get_string()
    }

    /// The text that follows the node up to the next token.
    pub fn after_text(&self, node: Node) -> String {
        self.xobj(node.get()).after.get_string()
    }

    /// The text content of a node. For a container this is all the text
    /// inside it; attribute values, comments and processing instructions
    /// don't count. For anything else it's the value.
    ///
    /// ```rust
    /// let mut locale = xmlstore::Locale::new();
    /// let root = locale.parse(r#"<p a="x">one<b>two</b><!--no-->three</p>"#).unwrap();
    /// let p = locale.document_element(root).unwrap();
    /// assert_eq!(locale.text_value(p), "onetwothree");
    /// ```
    pub fn text_value(&self, node: Node) -> String {
        let x = node.get();
        if !self.xobj(x).is_container() {
            return self.value_text(node);
        }
        let mut text = String::new();
        for edge in x.traverse(&self.arena) {
            match edge {
                NodeEdge::Start(n) => {
                    let xobj = self.xobj(n);
                    if xobj.is_container() {
                        text.push_str(&xobj.value.get_string());
                    }
                }
                NodeEdge::End(n) => {
                    if n != x {
                        text.push_str(&self.xobj(n).after.get_string());
                    }
                }
            }
        }
        text
    }

    /// Check whether a node has been removed.
    pub fn is_removed(&self, node: Node) -> bool {
        self.arena[node.get()].is_removed()
    }

    /// Get parent node. Attributes have their element as parent.
    pub fn parent(&self, node: Node) -> Option<Node> {
        self.arena[node.get()].parent().map(Node::new)
    }

    /// All children, attributes first.
    pub fn children(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        node.get().children(&self.arena).map(Node::new)
    }

    /// The attribute children, namespace declarations included.
    pub fn attributes(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        self.children(node)
            .take_while(move |child| self.node_kind(*child) == NodeKind::Attr)
    }

    /// The children that are not attributes.
    pub fn content_children(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        self.children(node)
            .skip_while(move |child| self.node_kind(*child) == NodeKind::Attr)
    }

    /// Index of a child among the children that are not attributes.
    pub fn child_index(&self, parent: Node, child: Node) -> Option<usize> {
        if self.parent(child) != Some(parent) {
            return None;
        }
        self.content_children(parent).position(|n| n == child)
    }

    /// Ancestors of a node, starting with the node itself.
    pub fn ancestors(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        node.get().ancestors(&self.arena).map(Node::new)
    }

    /// Descendants of a node in document order, starting with the node
    /// itself. Attributes aren't included.
    pub fn descendants(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        node.get()
            .descendants(&self.arena)
            .filter(move |n| *n == node.get() || !self.xobj(*n).is_attr())
            .map(Node::new)
    }

    /// The root node of the tree that contains `node`.
    pub fn root(&self, node: Node) -> Node {
        let mut current = node.get();
        while let Some(parent) = self.arena[current].parent() {
            current = parent;
        }
        Node::new(current)
    }

    /// The single element child of a document root.
    pub fn document_element(&self, node: Node) -> Result<Node> {
        if self.node_kind(node) != NodeKind::Root {
            return Err(Error::InvalidOperation("not a document root".to_string()));
        }
        self.content_children(node)
            .find(|child| self.node_kind(*child) == NodeKind::Element)
            .ok_or_else(|| Error::InvalidOperation("document has no element".to_string()))
    }

    /// The attribute with a name.
    pub fn attribute(&self, node: Node, name: &QName) -> Option<Node> {
        self.find_attr(node.get(), name).map(Node::new)
    }

    /// Is the attribute a namespace declaration?
    pub fn is_namespace_attr(&self, node: Node) -> bool {
        let xobj = self.xobj(node.get());
        xobj.is_attr()
            && xobj
                .name
                .map(|name| self.names.namespace_for_name(name) == self.names.xmlns_namespace)
                .unwrap_or(false)
    }

    /// The namespace declarations made directly on an element, as
    /// `(prefix, uri)` pairs. The default namespace has an empty prefix.
    pub fn namespace_declarations(&self, node: Node) -> Vec<(String, String)> {
        self.attributes(node)
            .filter(|attr| self.is_namespace_attr(*attr))
            .filter_map(|attr| {
                let name = self.xobj(attr.get()).name?;
                Some((
                    self.names.local_str(name).to_string(),
                    self.value_text(attr),
                ))
            })
            .collect()
    }

    /// The namespace declarations in scope at a node, nearest first. An
    /// undeclaration of the default namespace hides outer defaults and is
    /// not reported.
    pub fn in_scope_namespaces(&self, node: Node) -> Vec<(String, String)> {
        let mut seen: Vec<String> = Vec::new();
        let mut result = Vec::new();
        for ancestor in self.ancestors(node) {
            for (prefix, uri) in self.namespace_declarations(ancestor) {
                if seen.contains(&prefix) {
                    continue;
                }
                seen.push(prefix.clone());
                if !uri.is_empty() {
                    result.push((prefix, uri));
                }
            }
        }
        result
    }

    /// The namespace bound to a prefix at a node. The empty prefix gives
    /// the default namespace, the empty string if there is none.
    pub fn namespace_for_prefix(&self, node: Node, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE.to_string());
        }
        for ancestor in self.ancestors(node) {
            for (declared, uri) in self.namespace_declarations(ancestor) {
                if declared == prefix {
                    return Some(uri);
                }
            }
        }
        prefix.is_empty().then(String::new)
    }

    /// A prefix bound to a namespace at a node, if one is in scope and not
    /// shadowed.
    pub fn prefix_for_namespace(&self, node: Node, uri: &str) -> Option<String> {
        if uri == XML_NAMESPACE {
            return Some("xml".to_string());
        }
        self.in_scope_namespaces(node)
            .into_iter()
            .find(|(_, declared)| declared == uri)
            .map(|(prefix, _)| prefix)
    }
}
