// Prefix bookkeeping while saving. Every element pushes a frame with the
// declarations made on it, both the ones in the document and the ones the
// saver has to add to make names resolvable. Looking up a prefix never has
// to wander the tree.

use crate::name::XML_NAMESPACE;

type Declarations = Vec<(String, String)>;

#[derive(Debug, Default)]
struct Frame {
    declared: Declarations,
}

#[derive(Debug)]
pub(crate) struct PrefixStack {
    frames: Vec<Frame>,
    generated: usize,
}

impl PrefixStack {
    pub(crate) fn new(inherited: Declarations) -> Self {
        PrefixStack {
            frames: vec![Frame {
                declared: inherited,
            }],
            generated: 0,
        }
    }

    pub(crate) fn push(&mut self, declared: Declarations) {
        self.frames.push(Frame { declared });
    }

    pub(crate) fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    // add a declaration to the innermost frame
    pub(crate) fn declare(&mut self, prefix: &str, uri: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.declared.push((prefix.to_string(), uri.to_string()));
        }
    }

    pub(crate) fn namespace_by_prefix(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.declared.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    pub(crate) fn default_namespace(&self) -> &str {
        self.namespace_by_prefix("").unwrap_or("")
    }

    fn is_declared_here(&self, prefix: &str) -> bool {
        self.frames
            .last()
            .map(|frame| frame.declared.iter().any(|(p, _)| p == prefix))
            .unwrap_or(false)
    }

    // prefixes bound to the namespace that aren't shadowed, innermost first
    fn prefixes_for<'a>(&'a self, uri: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.declared.iter().rev())
            .filter(move |(p, u)| u == uri && self.namespace_by_prefix(p) == Some(uri))
            .map(|(p, _)| p.as_str())
    }

    /// The prefix to write an element name with. The hint wins if it's
    /// bound to the namespace, then the default namespace, then the
    /// innermost prefix.
    pub(crate) fn element_prefix(&self, uri: &str, hint: &str) -> Option<String> {
        if uri == XML_NAMESPACE {
            return Some("xml".to_string());
        }
        if self.namespace_by_prefix(hint) == Some(uri) {
            return Some(hint.to_string());
        }
        if self.default_namespace() == uri {
            return Some(String::new());
        }
        self.prefixes_for(uri).next().map(str::to_string)
    }

    /// The prefix to write an attribute name with. Attributes in a
    /// namespace always need a prefix.
    pub(crate) fn attribute_prefix(&self, uri: &str, hint: &str) -> Option<String> {
        if uri == XML_NAMESPACE {
            return Some("xml".to_string());
        }
        if !hint.is_empty() && self.namespace_by_prefix(hint) == Some(uri) {
            return Some(hint.to_string());
        }
        self.prefixes_for(uri)
            .find(|p| !p.is_empty())
            .map(str::to_string)
    }

    fn is_usable(&self, prefix: &str, allow_empty: bool) -> bool {
        prefix != "xml"
            && prefix != "xmlns"
            && (allow_empty || !prefix.is_empty())
            && !self.is_declared_here(prefix)
    }

    /// A prefix that can be declared on the current element: the hint if it
    /// is free here, a generated one otherwise.
    pub(crate) fn fresh_prefix(&mut self, hint: &str, allow_empty: bool) -> String {
        if self.is_usable(hint, allow_empty) {
            return hint.to_string();
        }
        loop {
            self.generated += 1;
            let candidate = format!("ns{}", self.generated);
            if self.is_usable(&candidate, false) && self.namespace_by_prefix(&candidate).is_none() {
                return candidate;
            }
        }
    }
}
