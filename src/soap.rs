//! SOAP envelope access.
//!
//! Elements of a SOAP envelope carry a [`Flavor`] that records which part
//! of the envelope they are. The flavor is computed when a node is linked
//! into a tree, from its name and the flavor of its parent, so these
//! lookups don't need to inspect names again.
use indextree::NodeId;

use crate::locale::Locale;
use crate::xobj::{Flavor, Node, NodeKind};

/// The envelope namespace of SOAP 1.1.
pub const SOAP11_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// The envelope namespace of SOAP 1.2.
pub const SOAP12_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";

/// The part of a SOAP envelope an element is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoapKind {
    Envelope,
    Header,
    Body,
    Fault,
    Detail,
    /// A child of the header.
    HeaderElement,
    /// A child of the body other than a fault.
    BodyElement,
    /// A child of a fault detail.
    DetailEntry,
}

/// SOAP version, determined by the envelope namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoapVersion {
    V1_1,
    V1_2,
}

impl SoapVersion {
    pub fn namespace(self) -> &'static str {
        match self {
            SoapVersion::V1_1 => SOAP11_NAMESPACE,
            SoapVersion::V1_2 => SOAP12_NAMESPACE,
        }
    }

    fn from_namespace(uri: &str) -> Option<SoapVersion> {
        match uri {
            SOAP11_NAMESPACE => Some(SoapVersion::V1_1),
            SOAP12_NAMESPACE => Some(SoapVersion::V1_2),
            _ => None,
        }
    }
}

pub(crate) fn flavor_of(locale: &Locale, x: NodeId) -> Flavor {
    let xobj = locale.xobj(x);
    if xobj.kind != NodeKind::Element {
        return Flavor::Plain;
    }
    let Some(name) = xobj.name else {
        return Flavor::Plain;
    };
    let local = locale.names.local_str(name);
    let version =
        SoapVersion::from_namespace(locale.names.namespace_str(locale.names.namespace_for_name(name)));
    let parent = locale.arena[x].parent().map(|p| locale.xobj(p));
    let parent_kind = parent.and_then(|p| match p.flavor {
        Flavor::Soap(kind) => Some(kind),
        Flavor::Plain => None,
    });
    let kind = match (parent_kind, version, local) {
        (None, Some(_), "Envelope") if parent.map(|p| p.kind) != Some(NodeKind::Element) => {
            Some(SoapKind::Envelope)
        }
        (Some(SoapKind::Envelope), Some(_), "Header") => Some(SoapKind::Header),
        (Some(SoapKind::Envelope), Some(_), "Body") => Some(SoapKind::Body),
        (Some(SoapKind::Body), Some(_), "Fault") => Some(SoapKind::Fault),
        // SOAP 1.1 puts detail in no namespace, SOAP 1.2 in the envelope namespace
        (Some(SoapKind::Fault), None, "detail") | (Some(SoapKind::Fault), Some(_), "Detail") => {
            Some(SoapKind::Detail)
        }
        (Some(SoapKind::Header), _, _) => Some(SoapKind::HeaderElement),
        (Some(SoapKind::Body), _, _) => Some(SoapKind::BodyElement),
        (Some(SoapKind::Detail), _, _) => Some(SoapKind::DetailEntry),
        _ => None,
    };
    kind.map(Flavor::Soap).unwrap_or(Flavor::Plain)
}

/// ## SOAP
impl Locale {
    /// The envelope part an element is, if it is part of a SOAP envelope.
    ///
    /// ```rust
    /// use xmlstore::{Locale, SoapKind};
    ///
    /// let mut locale = Locale::new();
    /// let root = locale.parse(concat!(
    ///     r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">"#,
    ///     r#"<s:Body><m:get xmlns:m="urn:m"/></s:Body></s:Envelope>"#
    /// )).unwrap();
    /// let envelope = locale.document_element(root).unwrap();
    /// assert_eq!(locale.soap_kind(envelope), Some(SoapKind::Envelope));
    /// let body = locale.soap_body(root).unwrap();
    /// let get = locale.soap_body_elements(root)[0];
    /// assert_eq!(locale.soap_kind(get), Some(SoapKind::BodyElement));
    /// assert_eq!(locale.parent(get), Some(body));
    /// ```
    pub fn soap_kind(&self, node: Node) -> Option<SoapKind> {
        match self.flavor(node) {
            Flavor::Soap(kind) => Some(kind),
            Flavor::Plain => None,
        }
    }

    /// The SOAP version of the envelope that contains `node`.
    pub fn soap_version(&self, node: Node) -> Option<SoapVersion> {
        let envelope = self.soap_envelope(node)?;
        let name = self.xobj(envelope.get()).name?;
        SoapVersion::from_namespace(self.names.namespace_str(self.names.namespace_for_name(name)))
    }

    /// The envelope element of the document that contains `node`.
    pub fn soap_envelope(&self, node: Node) -> Option<Node> {
        let root = self.root(node);
        self.content_children(root)
            .find(|child| self.soap_kind(*child) == Some(SoapKind::Envelope))
    }

    fn soap_child(&self, parent: Node, kind: SoapKind) -> Option<Node> {
        self.content_children(parent)
            .find(|child| self.soap_kind(*child) == Some(kind))
    }

    /// The header of the envelope that contains `node`.
    pub fn soap_header(&self, node: Node) -> Option<Node> {
        self.soap_child(self.soap_envelope(node)?, SoapKind::Header)
    }

    /// The body of the envelope that contains `node`.
    pub fn soap_body(&self, node: Node) -> Option<Node> {
        self.soap_child(self.soap_envelope(node)?, SoapKind::Body)
    }

    /// The fault in the body, if there is one.
    pub fn soap_fault(&self, node: Node) -> Option<Node> {
        self.soap_child(self.soap_body(node)?, SoapKind::Fault)
    }

    /// The detail of the fault, if there is one.
    pub fn soap_detail(&self, node: Node) -> Option<Node> {
        self.soap_child(self.soap_fault(node)?, SoapKind::Detail)
    }

    /// The elements in the body, faults excluded.
    pub fn soap_body_elements(&self, node: Node) -> Vec<Node> {
        match self.soap_body(node) {
            Some(body) => self
                .content_children(body)
                .filter(|child| self.soap_kind(*child) == Some(SoapKind::BodyElement))
                .collect(),
            None => Vec::new(),
        }
    }

    /// The elements in the header.
    pub fn soap_header_elements(&self, node: Node) -> Vec<Node> {
        match self.soap_header(node) {
            Some(header) => self
                .content_children(header)
                .filter(|child| self.soap_kind(*child) == Some(SoapKind::HeaderElement))
                .collect(),
            None => Vec::new(),
        }
    }
}
