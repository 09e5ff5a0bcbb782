use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};
use crate::idmap::{IdIndex, IdMap};

/// The namespace bound to the `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
/// The namespace of namespace declaration attributes.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// An XML name: namespace URI plus local name.
///
/// The prefix is only a hint used when the name is serialized and no
/// declaration for its namespace is in scope. It takes no part in equality.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QName {
    namespace: String,
    local: String,
    prefix: String,
}

impl QName {
    /// A name without a namespace.
    pub fn new(local: impl Into<String>) -> Self {
        QName {
            namespace: String::new(),
            local: local.into(),
            prefix: String::new(),
        }
    }

    /// A name in a namespace. The empty string means no namespace.
    pub fn with_namespace(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        QName {
            namespace: namespace.into(),
            local: local.into(),
            prefix: String::new(),
        }
    }

    /// A name in a namespace with a preferred prefix.
    pub fn with_prefix(
        namespace: impl Into<String>,
        local: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        QName {
            namespace: namespace.into(),
            local: local.into(),
            prefix: prefix.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.local == other.local
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local.hash(state);
    }
}

impl Display for QName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

impl From<&str> for QName {
    fn from(local: &str) -> Self {
        QName::new(local)
    }
}

/// Interned name (namespace plus local name) in a [`Locale`](crate::Locale).
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct NameId(u32);

impl IdIndex for NameId {
    fn to_id(index: usize) -> NameId {
        NameId(index as u32)
    }

    fn from_id(self) -> usize {
        self.0 as usize
    }
}

/// Interned namespace URI.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct NamespaceId(u32);

impl IdIndex for NamespaceId {
    fn to_id(index: usize) -> NamespaceId {
        NamespaceId(index as u32)
    }

    fn from_id(self) -> usize {
        self.0 as usize
    }
}

/// Interned prefix.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct PrefixId(u32);

impl IdIndex for PrefixId {
    fn to_id(index: usize) -> PrefixId {
        PrefixId(index as u32)
    }

    fn from_id(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub(crate) struct Name {
    pub(crate) local: String,
    pub(crate) namespace_id: NamespaceId,
}

#[derive(Debug, Clone)]
pub(crate) struct Names {
    namespaces: IdMap<NamespaceId, String>,
    prefixes: IdMap<PrefixId, String>,
    names: IdMap<NameId, Name>,
    pub(crate) no_namespace: NamespaceId,
    pub(crate) xml_namespace: NamespaceId,
    pub(crate) xmlns_namespace: NamespaceId,
    pub(crate) empty_prefix: PrefixId,
    pub(crate) xml_prefix: PrefixId,
}

impl Names {
    pub(crate) fn new() -> Self {
        let mut namespaces = IdMap::new();
        let no_namespace = namespaces.intern(String::new());
        let xml_namespace = namespaces.intern(XML_NAMESPACE.to_string());
        let xmlns_namespace = namespaces.intern(XMLNS_NAMESPACE.to_string());
        let mut prefixes = IdMap::new();
        let empty_prefix = prefixes.intern(String::new());
        let xml_prefix = prefixes.intern("xml".to_string());
        Names {
            namespaces,
            prefixes,
            names: IdMap::new(),
            no_namespace,
            xml_namespace,
            xmlns_namespace,
            empty_prefix,
            xml_prefix,
        }
    }

    pub(crate) fn add_namespace(&mut self, uri: &str) -> NamespaceId {
        self.namespaces.intern(uri.to_string())
    }

    pub(crate) fn namespace_id(&self, uri: &str) -> Option<NamespaceId> {
        self.namespaces.lookup(&uri.to_string())
    }

    pub(crate) fn namespace_str(&self, id: NamespaceId) -> &str {
        self.namespaces.get(id)
    }

    pub(crate) fn add_prefix(&mut self, prefix: &str) -> PrefixId {
        self.prefixes.intern(prefix.to_string())
    }

    pub(crate) fn prefix_str(&self, id: PrefixId) -> &str {
        self.prefixes.get(id)
    }

    pub(crate) fn add_name(&mut self, namespace: &str, local: &str) -> NameId {
        let namespace_id = self.add_namespace(namespace);
        self.add_name_ns(local, namespace_id)
    }

    pub(crate) fn add_name_ns(&mut self, local: &str, namespace_id: NamespaceId) -> NameId {
        self.names.intern(Name {
            local: local.to_string(),
            namespace_id,
        })
    }

    pub(crate) fn add_qname(&mut self, qname: &QName) -> NameId {
        self.add_name(qname.namespace(), qname.local_name())
    }

    pub(crate) fn name_id(&self, qname: &QName) -> Option<NameId> {
        let namespace_id = self.namespace_id(qname.namespace())?;
        self.names.lookup(&Name {
            local: qname.local_name().to_string(),
            namespace_id,
        })
    }

    pub(crate) fn local_str(&self, id: NameId) -> &str {
        &self.names.get(id).local
    }

    pub(crate) fn namespace_for_name(&self, id: NameId) -> NamespaceId {
        self.names.get(id).namespace_id
    }

    pub(crate) fn qname(&self, id: NameId, prefix: PrefixId) -> QName {
        let name = self.names.get(id);
        QName::with_prefix(
            self.namespace_str(name.namespace_id),
            name.local.as_str(),
            self.prefix_str(prefix),
        )
    }
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}')
}

/// Is this a non-colonized XML name?
pub fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) => chars.all(is_name_char),
        _ => false,
    }
}

/// Split `prefix:local` into its parts. A name without a colon has an empty
/// prefix.
pub(crate) fn split_qualified(name: &str) -> (&str, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", name),
    }
}

/// Check a name that is about to be given to an element or attribute.
pub(crate) fn validate_name(name: &QName, is_attr: bool) -> Result<()> {
    if !is_ncname(name.local_name()) {
        return Err(Error::InvalidName(name.local_name().to_string()));
    }
    let prefix = name.prefix();
    if !prefix.is_empty() && !is_ncname(prefix) {
        return Err(Error::InvalidName(prefix.to_string()));
    }
    if prefix == "xml" && name.namespace() != XML_NAMESPACE {
        return Err(Error::InvalidPrefix {
            prefix: prefix.to_string(),
            namespace: name.namespace().to_string(),
        });
    }
    // namespace declarations go through their own insertion path
    let declares_namespace = is_attr && name.namespace().is_empty() && name.local_name() == "xmlns";
    if prefix == "xmlns" || name.namespace() == XMLNS_NAMESPACE || declares_namespace {
        return Err(Error::InvalidPrefix {
            prefix: prefix.to_string(),
            namespace: name.namespace().to_string(),
        });
    }
    Ok(())
}
