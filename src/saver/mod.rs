//! Saving a document or fragment as XML text.
//!
//! The [`Saver`] is a pull serializer: every call to
//! [`process`](Saver::process) writes one token into its buffer. It doesn't
//! hold on to the locale between calls, so output can be produced in
//! chunks; if the document is edited in between, the next call fails with
//! [`Error::ConcurrentModification`].
mod prefixes;

use std::io;

use indextree::NodeId;

use crate::charutil::Span;
use crate::cursor::LocaleAccess;
use crate::entity::{escape, EscapeContext};
use crate::error::{Error, Result};
use crate::locale::Locale;
use crate::options::XmlOptions;
use crate::xobj::{CharNodeKind, CharNodes, Node, NodeKind};

use prefixes::PrefixStack;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Start(NodeId),
    End(NodeId),
}

// what we know about an open container
#[derive(Debug)]
struct Open {
    // children are laid out on their own lines
    indent_children: bool,
    has_content: bool,
    name: String,
}

/// Incremental XML writer for one node.
#[derive(Debug)]
pub struct Saver {
    top: NodeId,
    next: Option<Edge>,
    version: u64,
    prefixes: PrefixStack,
    open: Vec<Open>,
    indent: Option<usize>,
    inner: bool,
    declaration: Option<&'static str>,
    buffer: String,
    line_start: bool,
}

impl Saver {
    /// Prepare to save `node`: a document root, an element or any other
    /// node. Namespace declarations in scope at an element that isn't the
    /// document element are repeated on it, so the output stands alone.
    pub fn new(locale: &Locale, node: Node, options: &XmlOptions) -> Result<Saver> {
        options.validate()?;
        let top = node.get();
        let inherited = match locale.parent_of(top) {
            Some(parent) if locale.xobj(top).kind == NodeKind::Element && !options.save_inner => locale
                .in_scope_namespaces(Node::new(parent))
                .into_iter()
                .rev()
                .collect(),
            _ => Vec::new(),
        };
        let declaration = (options.save_xml_declaration
            && !options.save_inner
            && locale.xobj(top).kind == NodeKind::Root)
            .then(|| options.encoding().map(|e| e.name()))
            .transpose()?;
        let mut saver = Saver {
            top,
            next: Some(Edge::Start(top)),
            version: locale.version_all(),
            prefixes: PrefixStack::new(Vec::new()),
            open: Vec::new(),
            indent: options.save_pretty_print_indent,
            inner: options.save_inner,
            declaration,
            buffer: String::new(),
            line_start: true,
        };
        // declarations of ancestors go on the top element
        for (prefix, uri) in inherited {
            saver.prefixes.declare(&prefix, &uri);
        }
        Ok(saver)
    }

    /// Is everything written?
    pub fn is_done(&self) -> bool {
        self.next.is_none()
    }

    /// Write the next token. Returns `false` once there is nothing left.
    pub fn process(&mut self, locale: &Locale) -> Result<bool> {
        if locale.version_all() != self.version {
            return Err(Error::ConcurrentModification);
        }
        let Some(edge) = self.next else {
            return Ok(false);
        };
        match edge {
            Edge::Start(x) => self.start(locale, x)?,
            Edge::End(x) => self.end(locale, x),
        }
        self.next = self.next_edge(locale, edge);
        if self.next.is_none() {
            tracing::debug!(len = self.buffer.len(), "saved");
        }
        Ok(true)
    }

    /// Write tokens until at least `len` bytes are buffered or everything
    /// is written. Returns the number of bytes buffered.
    pub fn fill(&mut self, locale: &Locale, len: usize) -> Result<usize> {
        while self.buffer.len() < len && self.process(locale)? {}
        Ok(self.buffer.len())
    }

    /// Take what's buffered.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    fn next_edge(&self, locale: &Locale, edge: Edge) -> Option<Edge> {
        match edge {
            Edge::Start(x) => {
                if locale.xobj(x).is_container() {
                    match locale.first_content_child_of(x) {
                        Some(child) => Some(Edge::Start(child)),
                        None => Some(Edge::End(x)),
                    }
                } else {
                    Some(Edge::End(x))
                }
            }
            Edge::End(x) if x == self.top => None,
            Edge::End(x) => match locale.next_sibling_of(x) {
                Some(next) => Some(Edge::Start(next)),
                None => locale.parent_of(x).map(Edge::End),
            },
        }
    }

    fn writes_tags(&self, x: NodeId) -> bool {
        !(self.inner && x == self.top)
    }

    fn parent_indents(&self) -> bool {
        self.open.last().map(|o| o.indent_children).unwrap_or(false)
    }

    fn newline(&mut self, depth: usize) {
        if let Some(indent) = self.indent {
            if !self.line_start {
                self.buffer.push('\n');
            }
            self.buffer.push_str(&" ".repeat(indent * depth));
        }
    }

    // number of open elements whose tags are written
    fn depth(&self) -> usize {
        self.open.iter().filter(|o| !o.name.is_empty()).count()
    }

    fn start(&mut self, locale: &Locale, x: NodeId) -> Result<()> {
        if self.parent_indents() {
            let depth = self.depth();
            self.newline(depth);
        }
        let xobj = locale.xobj(x);
        match xobj.kind {
            NodeKind::Root => {
                if let Some(encoding) = self.declaration {
                    self.buffer.push_str(&format!(
                        "<?xml version=\"1.0\" encoding=\"{}\"?>\n",
                        encoding
                    ));
                }
                let indent_children = self.indent.is_some() && is_element_only(locale, x);
                self.open.push(Open {
                    indent_children,
                    has_content: true,
                    name: String::new(),
                });
                self.prefixes.push(Vec::new());
                if !indent_children {
                    self.text(&xobj.value, &xobj.value_nodes);
                }
            }
            NodeKind::Element => {
                self.start_element(locale, x)?;
                if self.writes_tags(x) {
                    self.line_start = false;
                }
            }
            NodeKind::Attr => {
                // an attribute on its own saves as its value
                self.text(&xobj.value, &xobj.value_nodes);
            }
            NodeKind::Comment => {
                self.buffer.push_str("<!--");
                self.buffer.push_str(&xobj.value.get_string());
                self.buffer.push_str("-->");
                self.line_start = false;
            }
            NodeKind::Procinst => {
                let target = xobj
                    .name
                    .map(|name| locale.names.local_str(name))
                    .unwrap_or_default();
                let data = xobj.value.get_string();
                if data.is_empty() {
                    self.buffer.push_str(&format!("<?{}?>", target));
                } else {
                    self.buffer.push_str(&format!("<?{} {}?>", target, data));
                }
                self.line_start = false;
            }
        }
        Ok(())
    }

    fn start_element(&mut self, locale: &Locale, x: NodeId) -> Result<()> {
        let node = Node::new(x);
        if !self.writes_tags(x) {
            // children declare what they need themselves
            self.prefixes.push(Vec::new());
            let (lead, lead_nodes) = lead_text(locale, x);
            let indent_children = self.indent.is_some() && is_element_only(locale, x);
            self.open.push(Open {
                indent_children,
                has_content: true,
                name: String::new(),
            });
            if !indent_children {
                self.text(&lead, &lead_nodes);
            }
            return Ok(());
        }
        let declared = locale.namespace_declarations(node);
        self.prefixes.push(declared.clone());
        let mut added: Vec<(String, String)> = Vec::new();
        if x == self.top {
            // the ancestor declarations pushed in `new` sit in the base frame
            for (prefix, uri) in locale
                .in_scope_namespaces(node)
                .into_iter()
                .filter(|(prefix, _)| !declared.iter().any(|(p, _)| p == prefix))
            {
                added.push((prefix, uri));
            }
        }

        let name = locale
            .node_name(node)
            .ok_or_else(|| Error::InvalidOperation("element without a name".to_string()))?;
        let qualified = if name.namespace().is_empty() {
            if !self.prefixes.default_namespace().is_empty() {
                self.prefixes.declare("", "");
                added.push((String::new(), String::new()));
            }
            name.local_name().to_string()
        } else {
            let prefix = match self.prefixes.element_prefix(name.namespace(), name.prefix()) {
                Some(prefix) => prefix,
                None => {
                    let prefix = self.prefixes.fresh_prefix(name.prefix(), true);
                    self.prefixes.declare(&prefix, name.namespace());
                    added.push((prefix.clone(), name.namespace().to_string()));
                    prefix
                }
            };
            qualify(&prefix, name.local_name())
        };

        let mut attributes = Vec::new();
        for attr in locale.attributes(node) {
            if locale.is_namespace_attr(attr) {
                continue;
            }
            let Some(attr_name) = locale.node_name(attr) else {
                continue;
            };
            let attr_qualified = if attr_name.namespace().is_empty() {
                attr_name.local_name().to_string()
            } else {
                let prefix = match self
                    .prefixes
                    .attribute_prefix(attr_name.namespace(), attr_name.prefix())
                {
                    Some(prefix) => prefix,
                    None => {
                        let prefix = self.prefixes.fresh_prefix(attr_name.prefix(), false);
                        self.prefixes.declare(&prefix, attr_name.namespace());
                        added.push((prefix.clone(), attr_name.namespace().to_string()));
                        prefix
                    }
                };
                qualify(&prefix, attr_name.local_name())
            };
            attributes.push((attr_qualified, locale.value_text(attr)));
        }

        let (lead, lead_nodes) = lead_text(locale, x);
        let has_content = !lead.is_empty() || locale.first_content_child_of(x).is_some();
        let indent_children = self.indent.is_some() && is_element_only(locale, x);

        {
            self.buffer.push('<');
            self.buffer.push_str(&qualified);
            for (prefix, uri) in merge_declarations(&declared, &added) {
                if prefix.is_empty() {
                    self.buffer.push_str(" xmlns=\"");
                } else {
                    self.buffer.push_str(" xmlns:");
                    self.buffer.push_str(prefix);
                    self.buffer.push_str("=\"");
                }
                self.buffer.push_str(&escape(uri, EscapeContext::Attribute));
                self.buffer.push('"');
            }
            for (attr_name, value) in attributes {
                self.buffer.push(' ');
                self.buffer.push_str(&attr_name);
                self.buffer.push_str("=\"");
                self.buffer.push_str(&escape(&value, EscapeContext::Attribute));
                self.buffer.push('"');
            }
            self.buffer.push_str(if has_content { ">" } else { "/>" });
        }
        self.open.push(Open {
            indent_children,
            has_content,
            name: qualified,
        });
        if !indent_children {
            self.text(&lead, &lead_nodes);
        }
        Ok(())
    }

    fn end(&mut self, locale: &Locale, x: NodeId) {
        let xobj = locale.xobj(x);
        if xobj.is_container() {
            if let Some(open) = self.open.pop() {
                if open.indent_children && xobj.kind != NodeKind::Root {
                    let depth = self.depth();
                    self.newline(depth);
                }
                if open.has_content && !open.name.is_empty() {
                    self.buffer.push_str("</");
                    self.buffer.push_str(&open.name);
                    self.buffer.push('>');
                    self.line_start = false;
                }
            }
            self.prefixes.pop();
        }
        if x != self.top && !self.parent_indents() {
            let xobj = locale.xobj(x);
            self.text(&xobj.after, &xobj.after_nodes);
        }
    }

    fn text(&mut self, span: &Span, nodes: &CharNodes) {
        if span.is_empty() {
            return;
        }
        self.line_start = false;
        let text = span.get_string();
        if !nodes.is_materialized() {
            self.buffer.push_str(&escape(&text, EscapeContext::Text));
            return;
        }
        let mut chars = text.chars();
        for node in nodes.nodes() {
            let run: String = chars.by_ref().take(node.cch).collect();
            match node.kind {
                CharNodeKind::Text => self.buffer.push_str(&escape(&run, EscapeContext::Text)),
                CharNodeKind::CData => {
                    self.buffer.push_str("<![CDATA[");
                    self.buffer.push_str(&run.replace("]]>", "]]]]><![CDATA[>"));
                    self.buffer.push_str("]]>");
                }
            }
        }
    }
}

fn qualify(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

// one declaration per prefix; a later binding replaces an earlier one in place
fn merge_declarations<'a>(
    declared: &'a [(String, String)],
    added: &'a [(String, String)],
) -> Vec<(&'a str, &'a str)> {
    let mut merged: Vec<(&str, &str)> = Vec::new();
    for (prefix, uri) in declared.iter().chain(added.iter()) {
        match merged.iter_mut().find(|(p, _)| *p == prefix.as_str()) {
            Some(entry) => entry.1 = uri.as_str(),
            None => merged.push((prefix.as_str(), uri.as_str())),
        }
    }
    merged
}

// the text before the first child of a container
fn lead_text(locale: &Locale, x: NodeId) -> (Span, CharNodes) {
    match locale.last_attr_of(x) {
        Some(attr) => {
            let attr = locale.xobj(attr);
            (attr.after.clone(), attr.after_nodes.clone())
        }
        None => {
            let xobj = locale.xobj(x);
            (xobj.value.clone(), xobj.value_nodes.clone())
        }
    }
}

fn is_blank(span: &Span) -> bool {
    span.is_empty() || span.is_white_space()
}

// a container whose children can be indented: it has children and all its
// direct text is whitespace
fn is_element_only(locale: &Locale, x: NodeId) -> bool {
    if locale.first_content_child_of(x).is_none() {
        return false;
    }
    let lead = match locale.last_attr_of(x) {
        Some(attr) => &locale.xobj(attr).after,
        None => &locale.xobj(x).value,
    };
    if !is_blank(lead) {
        return false;
    }
    let mut child = locale.first_content_child_of(x);
    while let Some(c) = child {
        if !is_blank(&locale.xobj(c).after) {
            return false;
        }
        child = locale.next_sibling_of(c);
    }
    true
}

/// ## Saving
impl Locale {
    /// Save a node as XML text.
    ///
    /// ```rust
    /// use xmlstore::{Locale, XmlOptions};
    ///
    /// let mut locale = Locale::new();
    /// let root = locale.parse(r#"<a><b x="1"/>text</a>"#).unwrap();
    /// let options = XmlOptions::new().with_pretty_print(2);
    /// let xml = locale.save_to_string(root, &options).unwrap();
    /// assert_eq!(xml, "<a><b x=\"1\"/>text</a>");
    /// ```
    pub fn save_to_string(&self, node: Node, options: &XmlOptions) -> Result<String> {
        let mut saver = Saver::new(self, node, options)?;
        while saver.process(self)? {}
        Ok(saver.take())
    }

    /// Save a node into a writer, encoded as the options ask.
    pub fn save<W: io::Write>(&self, node: Node, options: &XmlOptions, w: &mut W) -> Result<()> {
        let xml = self.save_to_string(node, options)?;
        w.write_all(&crate::encoding::encode(&xml, options.encoding()?))?;
        Ok(())
    }
}

const READ_CHUNK: usize = 4096;

/// Reads the saved form of a node as bytes in the configured encoding.
/// The document is saved chunk by chunk as the reader is read.
pub struct SaveReader<L: LocaleAccess> {
    access: L,
    saver: Saver,
    encoding: &'static encoding_rs::Encoding,
    pending: Vec<u8>,
    offset: usize,
}

impl<L: LocaleAccess> SaveReader<L> {
    pub(crate) fn new(access: L, node: Node, options: &XmlOptions) -> Result<Self> {
        let saver = access.with(|locale| Saver::new(locale, node, options))?;
        Ok(SaveReader {
            access,
            saver,
            encoding: options.encoding()?,
            pending: Vec::new(),
            offset: 0,
        })
    }
}

impl<L: LocaleAccess> io::Read for SaveReader<L> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset == self.pending.len() {
            if self.saver.is_done() {
                return Ok(0);
            }
            let saver = &mut self.saver;
            let text = self
                .access
                .with(|locale| saver.fill(locale, READ_CHUNK).map(|_| saver.take()))
                .map_err(|e| match e {
                    Error::Io(e) => e,
                    other => io::Error::new(io::ErrorKind::Other, other),
                })?;
            self.pending = crate::encoding::encode(&text, self.encoding);
            self.offset = 0;
        }
        let len = buf.len().min(self.pending.len() - self.offset);
        buf[..len].copy_from_slice(&self.pending[self.offset..self.offset + len]);
        self.offset += len;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cur::{CurClass, END_POS};
    use crate::name::QName;
    use rstest::rstest;

    fn roundtrip(xml: &str) -> String {
        let mut locale = Locale::new();
        let root = locale.parse(xml).unwrap();
        locale.save_to_string(root, &XmlOptions::default()).unwrap()
    }

    #[rstest]
    #[case("<a/>")]
    #[case("<a>text</a>")]
    #[case(r#"<a x="1" y="2">t<b/>u</a>"#)]
    #[case(r#"<p:a xmlns:p="urn:p"><p:b/></p:a>"#)]
    #[case(r#"<a xmlns="urn:d"><b xmlns=""/></a>"#)]
    #[case("<a><!--c--><?pi data?><?pi?></a>")]
    #[case("<a>&lt;&amp;&gt;</a>")]
    #[case("<a>x<![CDATA[<y>]]>z</a>")]
    fn test_roundtrip(#[case] xml: &str) {
        assert_eq!(roundtrip(xml), xml);
    }

    #[test]
    fn test_attribute_escaping() {
        assert_eq!(roundtrip(r#"<a v="&quot;&lt;"/>"#), r#"<a v="&quot;&lt;"/>"#);
    }

    #[test]
    fn test_fragment_redeclares_ancestors() {
        let mut locale = Locale::new();
        let root = locale
            .parse(r#"<a xmlns="urn:d" xmlns:p="urn:p"><p:b/></a>"#)
            .unwrap();
        let a = locale.document_element(root).unwrap();
        let b = locale.content_children(a).next().unwrap();
        let xml = locale.save_to_string(b, &XmlOptions::default()).unwrap();
        assert_eq!(xml, r#"<p:b xmlns="urn:d" xmlns:p="urn:p"/>"#);
    }

    #[test]
    fn test_synthesized_declarations() {
        let mut locale = Locale::new();
        let root = locale.create_root();
        let a = locale
            .create_element(&QName::with_prefix("urn:a", "a", "x"))
            .unwrap();
        let attr = locale
            .create_attr(&QName::with_namespace("urn:b", "at"), "v")
            .unwrap();
        let id = locale.alloc_cur(CurClass::Perm);
        locale.move_to(id, root, END_POS);
        locale.insert_node(a, id).unwrap();
        locale.move_to(id, a, END_POS);
        locale.insert_node(attr, id).unwrap();
        let xml = locale.save_to_string(root, &XmlOptions::default()).unwrap();
        assert_eq!(xml, r#"<x:a xmlns:x="urn:a" xmlns:ns1="urn:b" ns1:at="v"/>"#);
    }

    #[rstest]
    #[case(r#"<s xmlns="urn:n"/>"#, r#"<r xmlns=""/>"#)]
    #[case(r#"<s xmlns="urn:n" xmlns:p="urn:p" p:a="1"/>"#, r#"<r xmlns="" xmlns:p="urn:p" p:a="1"/>"#)]
    #[case(r#"<o xmlns="urn:n"><s/></o>"#, r#"<r xmlns=""/>"#)]
    fn test_renamed_out_of_default_namespace(#[case] xml: &str, #[case] expected: &str) {
        let mut locale = Locale::new();
        let root = locale.parse(xml).unwrap();
        let mut element = locale.document_element(root).unwrap();
        if let Some(child) = locale.content_children(element).next() {
            element = child;
        }
        locale.rename_node(element, &QName::new("r")).unwrap();
        let saved = locale
            .save_to_string(element, &XmlOptions::default())
            .unwrap();
        assert_eq!(saved, expected);
        assert_eq!(saved.matches("xmlns=").count(), 1);
        let mut reloaded = Locale::new();
        let reroot = reloaded.parse(&saved).unwrap();
        let r = reloaded.document_element(reroot).unwrap();
        assert_eq!(reloaded.node_name(r).unwrap().namespace(), "");
    }

    #[test]
    fn test_pretty_print() {
        let mut locale = Locale::new();
        let root = locale
            .parse("<a>\n<b><c/></b>  <d>text</d><e>mixed<f/></e></a>")
            .unwrap();
        let options = XmlOptions::new().with_pretty_print(2);
        let xml = locale.save_to_string(root, &options).unwrap();
        insta::assert_snapshot!(xml, @r###"
        <a>
          <b>
            <c/>
          </b>
          <d>text</d>
          <e>mixed<f/></e>
        </a>
        "###);
    }

    #[test]
    fn test_xml_declaration() {
        let mut locale = Locale::new();
        let root = locale.parse("<a/>").unwrap();
        let options = XmlOptions::new().with_xml_declaration(true);
        assert_eq!(
            locale.save_to_string(root, &options).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a/>"
        );
    }

    #[test]
    fn test_save_inner() {
        let mut locale = Locale::new();
        let root = locale.parse("<a>one<b/>two</a>").unwrap();
        let a = locale.document_element(root).unwrap();
        let options = XmlOptions::new().with_inner(true);
        assert_eq!(locale.save_to_string(a, &options).unwrap(), "one<b/>two");
    }

    #[test]
    fn test_concurrent_modification() {
        let mut locale = Locale::new();
        let root = locale.parse("<a><b/><c/></a>").unwrap();
        let mut saver = Saver::new(&locale, root, &XmlOptions::default()).unwrap();
        assert!(saver.process(&locale).unwrap());
        let id = locale.alloc_cur(CurClass::Perm);
        let a = locale.document_element(root).unwrap();
        locale.move_to(id, a, END_POS);
        locale.insert_chars(id, "late");
        assert!(matches!(
            saver.process(&locale),
            Err(Error::ConcurrentModification)
        ));
    }

    #[test]
    fn test_fill_in_chunks() {
        let mut locale = Locale::new();
        let root = locale.parse("<a><b>1</b><b>2</b><b>3</b></a>").unwrap();
        let mut saver = Saver::new(&locale, root, &XmlOptions::default()).unwrap();
        let mut out = String::new();
        while !saver.is_done() {
            saver.fill(&locale, 4).unwrap();
            out.push_str(&saver.take());
        }
        assert_eq!(out, "<a><b>1</b><b>2</b><b>3</b></a>");
    }
}
