//! A mutable XML infoset store with cursor-addressable positions.
//!
//! Documents live in a [`Locale`]: an arena of nodes whose text is held in
//! shared character spans, plus every cursor that points into it. Cursors
//! survive edits; inserting or removing text or nodes fixes up all of them.
//!
//! Most code wants the [`Cursor`] API of a [`Document`]:
//!
//! ```rust
//! use xmlstore::{QName, UnsyncDocument, XmlOptions};
//!
//! let doc = UnsyncDocument::parse("<list><item>one</item></list>").unwrap();
//! let mut cursor = doc.cursor();
//! cursor.to_first_child().unwrap();
//! cursor.to_end_token().unwrap();
//! cursor.insert_element_with_text(&QName::new("item"), "two").unwrap();
//! assert_eq!(
//!     doc.xml_text(&XmlOptions::default()).unwrap(),
//!     "<list><item>one</item><item>two</item></list>"
//! );
//! ```
//!
//! The engine underneath is available on [`Locale`] directly.
#![forbid(unsafe_code)]

mod access;
pub mod charutil;
mod creation;
mod cur;
mod cursor;
mod dom;
mod encoding;
mod entity;
mod error;
mod idmap;
mod load;
mod locale;
mod name;
mod options;
mod path;
mod saver;
mod soap;
mod xobj;

pub use cur::{CurClass, CurId, CurState, Fragment, LineNumber, TokenKind, END_POS};
pub use cursor::{
    Cursor, Document, LocaleAccess, SyncCursor, SyncDocument, UnsyncCursor, UnsyncDocument,
};
pub use dom::{DomNode, DomNodeType, TextSlot};
pub use error::{Error, Result};
pub use locale::Locale;
pub use name::{is_ncname, QName, XMLNS_NAMESPACE, XML_NAMESPACE};
pub use options::XmlOptions;
pub use path::{CompiledPath, CompiledQuery, Path, PathExecution, QueryEngine};
pub use saver::{SaveReader, Saver};
pub use soap::{SoapKind, SoapVersion, SOAP11_NAMESPACE, SOAP12_NAMESPACE};
pub use xobj::{CharNode, CharNodeKind, CharNodes, Flavor, Node, NodeKind};
