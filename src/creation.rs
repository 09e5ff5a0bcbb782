use crate::charutil::Span;
use crate::error::{Error, Result};
use crate::locale::Locale;
use crate::name::{validate_name, QName};
use crate::xobj::{Node, NodeKind, Xobj};

/// Node factories. Nodes are created unlinked; they become part of a
/// document through [`Locale::insert_node`].
impl Locale {
    pub(crate) fn new_node(&mut self, xobj: Xobj) -> Node {
        Node::new(self.arena.new_node(xobj))
    }

    pub(crate) fn text_span(&mut self, text: &str) -> Span {
        self.char_util.save_str(text)
    }

    /// Create a document root.
    pub fn create_root(&mut self) -> Node {
        self.new_node(Xobj::new(NodeKind::Root, None))
    }

    /// Create an element. The prefix of `name` is kept as a hint for saving.
    pub fn create_element(&mut self, name: &QName) -> Result<Node> {
        validate_name(name, false)?;
        let name_id = self.names.add_qname(name);
        let mut xobj = Xobj::new(NodeKind::Element, Some(name_id));
        xobj.prefix = self.prefix_hint(name);
        Ok(self.new_node(xobj))
    }

    /// Create an attribute with a value.
    pub fn create_attr(&mut self, name: &QName, value: &str) -> Result<Node> {
        validate_name(name, true)?;
        let name_id = self.names.add_qname(name);
        let mut xobj = Xobj::new(NodeKind::Attr, Some(name_id));
        xobj.prefix = self.prefix_hint(name);
        xobj.value = self.text_span(value);
        Ok(self.new_node(xobj))
    }

    /// Create a namespace declaration. An empty prefix declares the default
    /// namespace.
    pub fn create_namespace_attr(&mut self, prefix: &str, uri: &str) -> Result<Node> {
        if !prefix.is_empty() && !crate::name::is_ncname(prefix) {
            return Err(Error::InvalidName(prefix.to_string()));
        }
        if prefix == "xmlns" || (prefix == "xml") != (uri == crate::name::XML_NAMESPACE) {
            return Err(Error::InvalidPrefix {
                prefix: prefix.to_string(),
                namespace: uri.to_string(),
            });
        }
        if !prefix.is_empty() && uri.is_empty() {
            return Err(Error::InvalidPrefix {
                prefix: prefix.to_string(),
                namespace: uri.to_string(),
            });
        }
        let xmlns = self.names.xmlns_namespace;
        let name_id = self.names.add_name_ns(prefix, xmlns);
        let mut xobj = Xobj::new(NodeKind::Attr, Some(name_id));
        xobj.value = self.text_span(uri);
        Ok(self.new_node(xobj))
    }

    /// Create a comment.
    pub fn create_comment(&mut self, text: &str) -> Result<Node> {
        if text.contains("--") || text.ends_with('-') {
            return Err(Error::InvalidComment(text.to_string()));
        }
        let mut xobj = Xobj::new(NodeKind::Comment, None);
        xobj.value = self.text_span(text);
        Ok(self.new_node(xobj))
    }

    /// Create a processing instruction.
    pub fn create_procinst(&mut self, target: &str, data: &str) -> Result<Node> {
        if !crate::name::is_ncname(target) || target.eq_ignore_ascii_case("xml") {
            return Err(Error::InvalidTarget(target.to_string()));
        }
        if data.contains("?>") {
            return Err(Error::InvalidOperation(
                "processing instruction data contains '?>'".to_string(),
            ));
        }
        let name_id = self.names.add_name("", target);
        let mut xobj = Xobj::new(NodeKind::Procinst, Some(name_id));
        xobj.value = self.text_span(data);
        Ok(self.new_node(xobj))
    }

    fn prefix_hint(&mut self, name: &QName) -> Option<crate::name::PrefixId> {
        if name.prefix().is_empty() {
            None
        } else {
            Some(self.names.add_prefix(name.prefix()))
        }
    }
}
