use indextree::NodeId;
use xmlparser::{ElementEnd, StrSpan, Token, Tokenizer};

use crate::cur::LineNumber;
use crate::entity::decode_entities;
use crate::error::{Error, Result};
use crate::locale::Locale;
use crate::name::{QName, XML_NAMESPACE};
use crate::options::XmlOptions;
use crate::xobj::{CharNodeKind, CharNodes, Node};

// an element whose start tag is still being read
struct PendingElement<'a> {
    prefix: &'a str,
    local: &'a str,
    offset: usize,
    declarations: Vec<(&'a str, String)>,
    attributes: Vec<(&'a str, &'a str, String)>,
}

struct OpenElement<'a> {
    node: NodeId,
    prefix: &'a str,
    local: &'a str,
    declarations: Vec<(&'a str, String)>,
}

// text collected between two tokens, with its CDATA runs
#[derive(Default)]
struct PendingText {
    text: String,
    cch: usize,
    nodes: CharNodes,
}

impl PendingText {
    fn push(&mut self, text: &str, kind: CharNodeKind) {
        let cch = text.chars().count();
        self.nodes.push(self.cch, kind, cch);
        self.text.push_str(text);
        self.cch += cch;
    }

    fn is_blank(&self) -> bool {
        !self.nodes.is_materialized() && self.text.chars().all(|c| c.is_ascii_whitespace())
    }
}

// converts byte offsets to 1-based line and column, moving forward only
struct LineTracker<'a> {
    xml: &'a str,
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> LineTracker<'a> {
    fn new(xml: &'a str) -> Self {
        LineTracker {
            xml,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn advance(&mut self, offset: usize) -> LineNumber {
        for c in self.xml[self.offset..offset].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset = offset;
        LineNumber {
            line: self.line,
            column: self.column,
            offset,
        }
    }
}

struct DocumentBuilder<'a, 'o> {
    locale: &'a mut Locale,
    options: &'o XmlOptions,
    root: NodeId,
    open: Vec<OpenElement<'a>>,
    pending: Option<PendingElement<'a>>,
    text: PendingText,
    lines: LineTracker<'a>,
}

impl<'a, 'o> DocumentBuilder<'a, 'o> {
    fn new(locale: &'a mut Locale, xml: &'a str, options: &'o XmlOptions) -> Self {
        let root = locale.create_root().get();
        DocumentBuilder {
            locale,
            options,
            root,
            open: Vec::new(),
            pending: None,
            text: PendingText::default(),
            lines: LineTracker::new(xml),
        }
    }

    fn current(&self) -> NodeId {
        self.open.last().map(|open| open.node).unwrap_or(self.root)
    }

    fn namespace_for_prefix(&self, prefix: &str) -> Result<String> {
        if prefix == "xml" {
            return Ok(XML_NAMESPACE.to_string());
        }
        let pending = self.pending.iter().map(|p| &p.declarations);
        let open = self.open.iter().rev().map(|o| &o.declarations);
        for declarations in pending.chain(open) {
            if let Some((_, uri)) = declarations.iter().find(|(p, _)| *p == prefix) {
                return Ok(uri.clone());
            }
        }
        if prefix.is_empty() {
            Ok(String::new())
        } else {
            Err(Error::UnknownPrefix(prefix.to_string()))
        }
    }

    fn append(&mut self, x: NodeId) -> Result<()> {
        self.flush_text();
        let parent = self.current();
        parent.checked_append(x, &mut self.locale.arena)?;
        Ok(())
    }

    // text goes to the last child's after text, or into the container
    fn flush_text(&mut self) {
        let text = std::mem::take(&mut self.text);
        if text.cch == 0 || (self.options.load_strip_whitespace && text.is_blank()) {
            return;
        }
        let container = self.current();
        let target = self.locale.last_child_of(container);
        let span = self.locale.char_util.save_str(&text.text);
        match target {
            Some(last) => {
                let xobj = self.locale.xobj_mut(last);
                xobj.after = span;
                xobj.after_nodes = text.nodes;
            }
            None if container != self.root => {
                let xobj = self.locale.xobj_mut(container);
                xobj.value = span;
                xobj.value_nodes = text.nodes;
            }
            // text outside the document element
            None => {}
        }
    }

    fn element_start(&mut self, prefix: StrSpan<'a>, local: StrSpan<'a>, offset: usize) {
        self.pending = Some(PendingElement {
            prefix: prefix.as_str(),
            local: local.as_str(),
            offset,
            declarations: Vec::new(),
            attributes: Vec::new(),
        });
    }

    fn attribute(&mut self, prefix: &'a str, local: &'a str, value: &'a str) -> Result<()> {
        let value = decode_entities(value.into())?.into_owned();
        let Some(pending) = self.pending.as_mut() else {
            return Err(Error::InvalidOperation("attribute outside a start tag".to_string()));
        };
        let declared = match (prefix, local) {
            ("", "xmlns") => Some(""),
            ("xmlns", _) => Some(local),
            _ => None,
        };
        let repeated = match declared {
            Some(declared) => pending.declarations.iter().any(|(p, _)| *p == declared),
            None => pending
                .attributes
                .iter()
                .any(|(p, l, _)| *p == prefix && *l == local),
        };
        if repeated {
            return Err(Error::DuplicateAttribute(display_name(prefix, local)));
        }
        match declared {
            Some(declared) => pending.declarations.push((declared, value)),
            None => pending.attributes.push((prefix, local, value)),
        }
        Ok(())
    }

    fn open_element(&mut self) -> Result<()> {
        let Some(pending) = &self.pending else {
            return Err(Error::InvalidOperation("start tag without a name".to_string()));
        };
        let (prefix, local, offset) = (pending.prefix, pending.local, pending.offset);
        let namespace = self.namespace_for_prefix(prefix)?;
        let mut attributes = Vec::with_capacity(pending.attributes.len());
        for (attr_prefix, attr_local, value) in &pending.attributes {
            // unprefixed attributes are in no namespace
            let attr_namespace = if attr_prefix.is_empty() {
                String::new()
            } else {
                self.namespace_for_prefix(attr_prefix)?
            };
            // two prefixes bound to one namespace still name the same attribute
            if attributes.iter().any(|(name, _): &(QName, String)| {
                name.namespace() == attr_namespace && name.local_name() == *attr_local
            }) {
                return Err(Error::DuplicateAttribute(display_name(attr_prefix, attr_local)));
            }
            attributes.push((
                QName::with_prefix(attr_namespace, *attr_local, *attr_prefix),
                value.clone(),
            ));
        }
        let declarations = self
            .pending
            .take()
            .map(|pending| pending.declarations)
            .unwrap_or_default();

        let name = QName::with_prefix(namespace, local, prefix);
        let element = self.locale.create_element(&name)?.get();
        self.append(element)?;
        for (declared, uri) in &declarations {
            let attr = self.locale.create_namespace_attr(declared, uri)?.get();
            element.checked_append(attr, &mut self.locale.arena)?;
        }
        for (name, value) in attributes {
            let attr = self.locale.create_attr(&name, &value)?.get();
            element.checked_append(attr, &mut self.locale.arena)?;
        }
        if self.options.load_line_numbers {
            let line = self.lines.advance(offset);
            self.locale.set_bookmark_at(element, 0, line);
        }
        self.open.push(OpenElement {
            node: element,
            prefix,
            local,
            declarations,
        });
        Ok(())
    }

    fn close_element(&mut self, prefix: &str, local: &str) -> Result<()> {
        self.flush_text();
        match self.open.pop() {
            Some(open) if open.prefix == prefix && open.local == local => Ok(()),
            Some(open) => Err(Error::UnclosedTag(format!(
                "{} closed by {}",
                display_name(open.prefix, open.local),
                display_name(prefix, local)
            ))),
            None => Err(Error::UnclosedTag(display_name(prefix, local))),
        }
    }

    fn empty_element(&mut self) -> Result<()> {
        self.open_element()?;
        self.flush_text();
        self.open.pop();
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        if self.options.load_strip_comments {
            return Ok(());
        }
        let comment = self.locale.create_comment(text)?.get();
        self.append(comment)
    }

    fn procinst(&mut self, target: &str, data: &str) -> Result<()> {
        if self.options.load_strip_procinsts {
            return Ok(());
        }
        let procinst = self.locale.create_procinst(target, data)?.get();
        self.append(procinst)
    }

    fn finish(mut self) -> Result<Node> {
        if let Some(open) = self.open.last() {
            return Err(Error::UnclosedTag(display_name(open.prefix, open.local)));
        }
        self.flush_text();
        if self.locale.first_content_child_of(self.root).is_none() {
            return Err(Error::InvalidOperation("document has no element".to_string()));
        }
        self.locale.update_flavor(self.root);
        self.locale.bump_structure_version();
        Ok(Node::new(self.root))
    }
}

fn display_name(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

/// ## Loading
impl Locale {
    /// Load a document from text. Returns the document root.
    ///
    /// ```rust
    /// use xmlstore::{Locale, XmlOptions};
    ///
    /// let mut locale = Locale::new();
    /// let options = XmlOptions::new().with_strip_comments(true);
    /// let root = locale.load("<a>x<!--c-->y</a>", &options).unwrap();
    /// let a = locale.document_element(root).unwrap();
    /// assert_eq!(locale.value_text(a), "xy");
    /// ```
    pub fn load(&mut self, xml: &str, options: &XmlOptions) -> Result<Node> {
        options.validate()?;
        let mut builder = DocumentBuilder::new(self, xml, options);
        for token in Tokenizer::from(xml) {
            match token? {
                Token::ElementStart {
                    prefix,
                    local,
                    span,
                } => builder.element_start(prefix, local, span.start()),
                Token::Attribute {
                    prefix,
                    local,
                    value,
                    ..
                } => builder.attribute(prefix.as_str(), local.as_str(), value.as_str())?,
                Token::ElementEnd { end, .. } => match end {
                    ElementEnd::Open => builder.open_element()?,
                    ElementEnd::Close(prefix, local) => {
                        builder.close_element(prefix.as_str(), local.as_str())?
                    }
                    ElementEnd::Empty => builder.empty_element()?,
                },
                Token::Text { text } => {
                    let decoded = decode_entities(text.as_str().into())?;
                    builder.text.push(&decoded, CharNodeKind::Text);
                }
                Token::Cdata { text, .. } => builder.text.push(text.as_str(), CharNodeKind::CData),
                Token::Comment { text, .. } => builder.comment(text.as_str())?,
                Token::ProcessingInstruction {
                    target, content, ..
                } => builder.procinst(
                    target.as_str(),
                    content.map(|c| c.as_str()).unwrap_or(""),
                )?,
                // the declaration and the DTD are not part of the infoset
                _ => {}
            }
        }
        let root = builder.finish()?;
        tracing::debug!(
            source = options.document_source_name.as_deref().unwrap_or("<string>"),
            nodes = self.arena.len(),
            "loaded document"
        );
        Ok(root)
    }

    /// Load a document from text with default options.
    pub fn parse(&mut self, xml: &str) -> Result<Node> {
        self.load(xml, &XmlOptions::default())
    }

    /// Load a document from bytes in any encoding that can be detected from
    /// a byte order mark or the XML declaration.
    pub fn load_bytes(&mut self, bytes: &[u8], options: &XmlOptions) -> Result<Node> {
        let xml = crate::encoding::decode(bytes, options.character_encoding.clone())?;
        self.load(&xml, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xobj::CharNode;

    #[test]
    fn test_text_placement() {
        let mut locale = Locale::new();
        let root = locale.parse(r#"<a x="1">one<b/>two</a>"#).unwrap();
        let a = locale.document_element(root).unwrap();
        assert_eq!(locale.value_text(a), "");
        let x = locale.attributes(a).next().unwrap();
        assert_eq!(locale.after_text(x), "one");
        let b = locale.content_children(a).next().unwrap();
        assert_eq!(locale.after_text(b), "two");
    }

    #[test]
    fn test_namespaces_resolved() {
        let mut locale = Locale::new();
        let root = locale
            .parse(r#"<p:a xmlns:p="urn:p" xmlns="urn:d" p:x="1" y="2"><b/></p:a>"#)
            .unwrap();
        let a = locale.document_element(root).unwrap();
        assert_eq!(locale.node_name(a).unwrap(), QName::with_namespace("urn:p", "a"));
        let b = locale.content_children(a).next().unwrap();
        assert_eq!(locale.node_name(b).unwrap(), QName::with_namespace("urn:d", "b"));
        let names: Vec<QName> = locale
            .attributes(a)
            .filter(|attr| !locale.is_namespace_attr(*attr))
            .filter_map(|attr| locale.node_name(attr))
            .collect();
        assert_eq!(
            names,
            vec![QName::with_namespace("urn:p", "x"), QName::new("y")]
        );
    }

    #[test]
    fn test_unknown_prefix() {
        let mut locale = Locale::new();
        assert!(matches!(
            locale.parse("<p:a/>"),
            Err(Error::UnknownPrefix(prefix)) if prefix == "p"
        ));
    }

    #[test]
    fn test_mismatched_tag() {
        let mut locale = Locale::new();
        assert!(matches!(locale.parse("<a><b></a>"), Err(Error::UnclosedTag(_))));
    }

    #[test]
    fn test_cdata_char_nodes() {
        let mut locale = Locale::new();
        let root = locale.parse("<a>x<![CDATA[<y>]]>z</a>").unwrap();
        let a = locale.document_element(root).unwrap();
        assert_eq!(locale.value_text(a), "x<y>z");
        assert_eq!(
            locale.xobj(a.get()).value_nodes.nodes(),
            &[
                CharNode {
                    kind: CharNodeKind::Text,
                    cch: 1
                },
                CharNode {
                    kind: CharNodeKind::CData,
                    cch: 3
                },
                CharNode {
                    kind: CharNodeKind::Text,
                    cch: 1
                },
            ]
        );
    }

    #[test]
    fn test_entities_decoded() {
        let mut locale = Locale::new();
        let root = locale.parse(r#"<a v="&lt;&#65;">&amp;&#x42;</a>"#).unwrap();
        let a = locale.document_element(root).unwrap();
        let v = locale.attributes(a).next().unwrap();
        assert_eq!(locale.value_text(v), "<A");
        assert_eq!(locale.after_text(v), "&B");
    }

    #[test]
    fn test_strip_whitespace() {
        let mut locale = Locale::new();
        let options = XmlOptions::new().with_strip_whitespace(true);
        let root = locale.load("<a>\n  <b> x </b>\n</a>", &options).unwrap();
        let a = locale.document_element(root).unwrap();
        assert_eq!(locale.value_text(a), "");
        let b = locale.content_children(a).next().unwrap();
        assert_eq!(locale.value_text(b), " x ");
        assert_eq!(locale.after_text(b), "");
    }

    #[test]
    fn test_line_numbers() {
        let mut locale = Locale::new();
        let options = XmlOptions::new().with_line_numbers(true);
        let root = locale.load("<a>\n  <b/>\n</a>", &options).unwrap();
        let a = locale.document_element(root).unwrap();
        let b = locale.content_children(a).next().unwrap();
        assert_eq!(
            locale.node_bookmark::<LineNumber>(a),
            Some(&LineNumber {
                line: 1,
                column: 1,
                offset: 0
            })
        );
        assert_eq!(
            locale.node_bookmark::<LineNumber>(b),
            Some(&LineNumber {
                line: 2,
                column: 3,
                offset: 6
            })
        );
    }

    #[test]
    fn test_load_bytes() {
        let mut locale = Locale::new();
        let root = locale
            .load_bytes(
                b"<?xml version=\"1.0\" encoding=\"iso-8859-1\"?><a>\xe9</a>",
                &XmlOptions::default(),
            )
            .unwrap();
        assert_eq!(locale.text_value(root), "\u{e9}");
    }
}
