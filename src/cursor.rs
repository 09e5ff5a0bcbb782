//! Document and cursor handles.
//!
//! A [`Document`] shares its [`Locale`] through a [`LocaleAccess`]: either
//! `Rc<RefCell<Locale>>` for single-threaded use or `Arc<Mutex<Locale>>`
//! when cursors are used from several threads. Every [`Cursor`] call takes
//! the locale for its whole duration, checks that the cursor is still live
//! and validates its arguments before anything is changed.
use std::any::Any;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};

use indextree::NodeId;

use crate::cur::{CurClass, CurId, Fragment, LineNumber, TokenKind, END_POS};
use crate::entity::{escape, EscapeContext};
use crate::error::{Error, Result};
use crate::locale::Locale;
use crate::name::QName;
use crate::options::XmlOptions;
use crate::path::QueryEngine;
use crate::saver::SaveReader;
use crate::xobj::{Node, NodeKind};

// element carrying attributes copied out of their document
const FRAGMENT_ELEMENT: &str = "xml-fragment";

/// Shared access to a locale.
pub trait LocaleAccess: Clone {
    /// Wrap a locale.
    fn from_locale(locale: Locale) -> Self;

    /// Run `f` with exclusive access to the locale.
    fn with<R>(&self, f: impl FnOnce(&mut Locale) -> R) -> R;

    /// Do both handles refer to the same locale?
    fn same_locale(&self, other: &Self) -> bool;
}

impl LocaleAccess for Rc<RefCell<Locale>> {
    fn from_locale(locale: Locale) -> Self {
        Rc::new(RefCell::new(locale))
    }

    fn with<R>(&self, f: impl FnOnce(&mut Locale) -> R) -> R {
        f(&mut self.borrow_mut())
    }

    fn same_locale(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl LocaleAccess for Arc<Mutex<Locale>> {
    fn from_locale(locale: Locale) -> Self {
        Arc::new(Mutex::new(locale))
    }

    fn with<R>(&self, f: impl FnOnce(&mut Locale) -> R) -> R {
        // a panic while holding the lock leaves the locale as consistent as
        // the engine left it, so keep going
        let mut guard = self.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn same_locale(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

/// A document for use on one thread.
pub type UnsyncDocument = Document<Rc<RefCell<Locale>>>;
/// A cursor into an [`UnsyncDocument`].
pub type UnsyncCursor = Cursor<Rc<RefCell<Locale>>>;
/// A document that can be shared between threads.
pub type SyncDocument = Document<Arc<Mutex<Locale>>>;
/// A cursor into a [`SyncDocument`].
pub type SyncCursor = Cursor<Arc<Mutex<Locale>>>;

/// A document: a root node in a shared locale.
#[derive(Debug, Clone)]
pub struct Document<L: LocaleAccess> {
    access: L,
    root: Node,
}

impl<L: LocaleAccess> Default for Document<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: LocaleAccess> Document<L> {
    /// An empty document.
    pub fn new() -> Self {
        let mut locale = Locale::new();
        let root = locale.create_root();
        Document::from_parts(L::from_locale(locale), root)
    }

    /// Parse a document with default options.
    ///
    /// ```rust
    /// use xmlstore::{UnsyncDocument, XmlOptions};
    ///
    /// let doc = UnsyncDocument::parse("<greeting>hello</greeting>").unwrap();
    /// let mut cursor = doc.cursor();
    /// assert!(cursor.to_first_child().unwrap());
    /// assert_eq!(cursor.text_value().unwrap(), "hello");
    /// ```
    pub fn parse(xml: &str) -> Result<Self> {
        Self::load(xml, &XmlOptions::default())
    }

    /// Parse a document.
    pub fn load(xml: &str, options: &XmlOptions) -> Result<Self> {
        let mut locale = Locale::new();
        let root = locale.load(xml, options)?;
        Ok(Document::from_parts(L::from_locale(locale), root))
    }

    /// Parse a document from bytes, detecting their encoding.
    pub fn load_bytes(bytes: &[u8], options: &XmlOptions) -> Result<Self> {
        let mut locale = Locale::new();
        let root = locale.load_bytes(bytes, options)?;
        Ok(Document::from_parts(L::from_locale(locale), root))
    }

    pub(crate) fn from_parts(access: L, root: Node) -> Self {
        Document { access, root }
    }

    pub fn root(&self) -> Node {
        self.root
    }

    pub fn access(&self) -> &L {
        &self.access
    }

    /// Run `f` with the locale of the document.
    pub fn with<R>(&self, f: impl FnOnce(&mut Locale) -> R) -> R {
        self.access.with(f)
    }

    /// A new cursor at the start of the document.
    pub fn cursor(&self) -> Cursor<L> {
        let root = self.root;
        let id = self.access.with(|locale| {
            let id = locale.alloc_cur(CurClass::Weak);
            locale.move_to(id, root, 0);
            id
        });
        Cursor::from_id(self.access.clone(), id)
    }

    /// Save the document as text.
    pub fn xml_text(&self, options: &XmlOptions) -> Result<String> {
        let root = self.root;
        self.access
            .with(|locale| locale.save_to_string(root, options))
    }

    /// A reader over the saved document.
    pub fn new_reader(&self, options: &XmlOptions) -> Result<SaveReader<L>> {
        SaveReader::new(self.access.clone(), self.root, options)
    }

    /// Register the engine used for paths the built-in engine can't run,
    /// and for queries.
    pub fn register_query_engine(&self, engine: Arc<dyn QueryEngine>) {
        self.access
            .with(|locale| locale.register_query_engine(engine));
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidOperation(message.to_string())
}

fn weak_cur_at(locale: &mut Locale, other: CurId) -> CurId {
    let id = locale.alloc_cur(CurClass::Weak);
    locale.move_to_cur(id, other);
    id
}

// the node whose start token the cursor is at
fn node_at(locale: &Locale, id: CurId) -> Option<Node> {
    let (x, p) = locale.raw_pos(id);
    (p == 0).then(|| Node::new(x))
}

fn require_node(locale: &Locale, id: CurId) -> Result<Node> {
    node_at(locale, id).ok_or_else(|| invalid("cursor is not at the start of a node"))
}

fn require_container(locale: &Locale, id: CurId) -> Result<NodeId> {
    match node_at(locale, id) {
        Some(node) if locale.node_kind(node).is_container() => Ok(node.get()),
        _ => Err(invalid("cursor is not at the start of an element or document")),
    }
}

// the container a cursor is at or in
fn context_of(locale: &Locale, id: CurId) -> Result<Node> {
    let (x, p) = locale.raw_pos(id);
    let context = if p == 0 {
        Some(x)
    } else {
        locale.container_at(x, p)
    };
    match context {
        Some(c) if locale.xobj(c).is_container() => Ok(Node::new(c)),
        _ => Err(invalid("cursor is not in an element or document")),
    }
}

// the first position after the start token and the attributes
fn content_start(locale: &Locale, x: NodeId) -> (NodeId, i32) {
    match locale.last_attr_of(x) {
        Some(attr) => locale.normalize(attr, locale.xobj(attr).pos_after()),
        None => locale.normalize(x, 1),
    }
}

fn check_content_insert(locale: &Locale, id: CurId) -> Result<()> {
    let (x, p) = locale.raw_pos(id);
    match locale.token_at(x, p) {
        TokenKind::StartDoc => Err(invalid("can't insert before the start of a document")),
        TokenKind::Attr | TokenKind::Namespace => {
            Err(invalid("can't insert content among attributes"))
        }
        _ => match locale.container_at(x, p) {
            Some(c) if locale.xobj(c).is_container() => Ok(()),
            _ => Err(invalid("can't insert into the value of a leaf")),
        },
    }
}

// attributes go right after a start token or another attribute; returns
// the element that gets the attribute
fn check_attr_insert(locale: &Locale, id: CurId) -> Result<NodeId> {
    let (x, p) = locale.raw_pos(id);
    if p == 0 && locale.xobj(x).is_attr() {
        if let Some(parent) = locale.parent_of(x) {
            return Ok(parent);
        }
    }
    match locale.container_at(x, p) {
        Some(c)
            if locale.xobj(c).kind == NodeKind::Element && content_start(locale, c) == (x, p) =>
        {
            Ok(c)
        }
        _ => Err(invalid(
            "attributes can only be inserted after a start or another attribute",
        )),
    }
}

fn check_new_attr(locale: &Locale, element: NodeId, name: &QName) -> Result<()> {
    if locale.find_attr(element, name).is_some() {
        return Err(invalid("duplicate attribute"));
    }
    Ok(())
}

fn check_new_namespace(locale: &Locale, element: NodeId, prefix: &str) -> Result<()> {
    let declared = locale.namespace_declarations(Node::new(element));
    if declared.iter().any(|(p, _)| p == prefix) {
        return Err(invalid("duplicate namespace declaration"));
    }
    Ok(())
}

// check that a node of `kind` can be linked at `to`
fn check_destination(locale: &Locale, to: CurId, kind: NodeKind, name: Option<&QName>) -> Result<()> {
    match kind {
        NodeKind::Root => Err(invalid("a document can't be moved or copied")),
        NodeKind::Attr => {
            let element = check_attr_insert(locale, to)?;
            match name {
                Some(name) => check_new_attr(locale, element, name),
                None => Ok(()),
            }
        }
        _ => check_content_insert(locale, to),
    }
}

// run an edit that takes away the node at the cursor; the cursor ends up
// where the node used to end
fn follow_node(
    locale: &mut Locale,
    id: CurId,
    x: NodeId,
    edit: impl FnOnce(&mut Locale) -> Result<()>,
) -> Result<()> {
    locale.scope(|locale| {
        let follow = locale.temp_cur();
        let (fx, fp) = locale.normalize(x, locale.xobj(x).pos_after());
        locale.set_pos(follow, fx, fp);
        edit(locale)?;
        locale.move_to_cur(id, follow);
        Ok(())
    })
}

fn element_children(locale: &Locale, x: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    x.children(&locale.arena)
        .filter(move |c| locale.xobj(*c).kind == NodeKind::Element)
}

// create a content node and link it at the cursor
fn insert_content(
    locale: &mut Locale,
    id: CurId,
    make: impl FnOnce(&mut Locale) -> Result<Node>,
) -> Result<Node> {
    check_content_insert(locale, id)?;
    let node = make(locale)?;
    locale.insert_node(node, id)?;
    Ok(node)
}

fn insert_at(locale: &mut Locale, (x, p): (NodeId, i32), node: Node) -> Result<()> {
    locale.scope(|locale| {
        let at = locale.temp_cur();
        locale.set_pos(at, x, p);
        locale.insert_node(node, at)
    })
}

/// A position in a document, with the navigation and editing operations
/// of the public API.
///
/// The cursor is released when it is dropped.
#[derive(Debug)]
pub struct Cursor<L: LocaleAccess> {
    access: L,
    id: CurId,
    saved: Vec<CurId>,
    selections: Vec<CurId>,
    selection: Option<usize>,
}

impl<L: LocaleAccess> Drop for Cursor<L> {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl<L: LocaleAccess> Cursor<L> {
    fn from_id(access: L, id: CurId) -> Self {
        Cursor {
            access,
            id,
            saved: Vec::new(),
            selections: Vec::new(),
            selection: None,
        }
    }

    fn release_all(&mut self) {
        let ids: Vec<CurId> = std::iter::once(self.id)
            .chain(self.saved.drain(..))
            .chain(self.selections.drain(..))
            .collect();
        self.selection = None;
        self.access.with(|locale| {
            for id in ids {
                if locale.is_live(id) {
                    locale.release_cur(id);
                }
            }
        });
    }

    fn run<R>(&self, f: impl FnOnce(&mut Locale, CurId) -> Result<R>) -> Result<R> {
        let id = self.id;
        self.access.with(|locale| {
            if !locale.is_live(id) {
                return Err(Error::DisposedCursor);
            }
            f(locale, id)
        })
    }

    fn is(&self, kind: TokenKind) -> Result<bool> {
        Ok(self.token_type()? == kind)
    }

    // the id of another cursor in the same document
    fn peer_id(&self, other: &Cursor<L>) -> Result<Option<CurId>> {
        let id = other.run(|_, id| Ok(id))?;
        Ok(self.access.same_locale(&other.access).then_some(id))
    }

    /// Release the cursor. Every later call fails with
    /// [`Error::DisposedCursor`].
    pub fn dispose(&mut self) {
        self.release_all();
    }

    /// A new cursor at the same position.
    pub fn new_cursor(&self) -> Result<Cursor<L>> {
        let id = self.run(|locale, id| Ok(weak_cur_at(locale, id)))?;
        Ok(Cursor::from_id(self.access.clone(), id))
    }

    /// The document the cursor is in.
    pub fn document(&self) -> Result<Document<L>> {
        let root = self.run(|locale, id| {
            let (x, _) = locale.raw_pos(id);
            Ok(locale.root(Node::new(x)))
        })?;
        Ok(Document::from_parts(self.access.clone(), root))
    }

    /// The node whose start token the cursor is at.
    pub fn node(&self) -> Result<Option<Node>> {
        self.run(|locale, id| Ok(node_at(locale, id)))
    }

    // token types

    pub fn token_type(&self) -> Result<TokenKind> {
        self.run(|locale, id| Ok(locale.kind(id)))
    }

    pub fn is_start_doc(&self) -> Result<bool> {
        self.is(TokenKind::StartDoc)
    }

    pub fn is_end_doc(&self) -> Result<bool> {
        self.is(TokenKind::EndDoc)
    }

    pub fn is_start(&self) -> Result<bool> {
        self.is(TokenKind::Start)
    }

    pub fn is_end(&self) -> Result<bool> {
        self.is(TokenKind::End)
    }

    pub fn is_text(&self) -> Result<bool> {
        self.is(TokenKind::Text)
    }

    pub fn is_attr(&self) -> Result<bool> {
        self.is(TokenKind::Attr)
    }

    pub fn is_namespace(&self) -> Result<bool> {
        self.is(TokenKind::Namespace)
    }

    pub fn is_comment(&self) -> Result<bool> {
        self.is(TokenKind::Comment)
    }

    pub fn is_procinst(&self) -> Result<bool> {
        self.is(TokenKind::Procinst)
    }

    pub fn is_container(&self) -> Result<bool> {
        Ok(self.token_type()?.is_container())
    }

    pub fn is_finish(&self) -> Result<bool> {
        Ok(self.token_type()?.is_finish())
    }

    pub fn is_any_attr(&self) -> Result<bool> {
        Ok(self.token_type()?.is_any_attr())
    }

    // navigation

    /// Move to the next token and return its type, or `None` at the end of
    /// the document.
    pub fn to_next_token(&mut self) -> Result<Option<TokenKind>> {
        self.run(|locale, id| Ok(locale.next(id).then(|| locale.kind(id))))
    }

    /// Move to the previous token and return its type, or `None` at the
    /// start of the document.
    pub fn to_prev_token(&mut self) -> Result<Option<TokenKind>> {
        self.run(|locale, id| Ok(locale.prev(id).then(|| locale.kind(id))))
    }

    /// Move from the start of a container to its first child element.
    pub fn to_first_child(&mut self) -> Result<bool> {
        self.run(|locale, id| {
            let Ok(x) = require_container(locale, id) else {
                return Ok(false);
            };
            let first = element_children(locale, x).next();
            match first {
                Some(child) => {
                    locale.set_pos(id, child, 0);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    /// Move from the start of a container to its last child element.
    pub fn to_last_child(&mut self) -> Result<bool> {
        self.run(|locale, id| {
            let Ok(x) = require_container(locale, id) else {
                return Ok(false);
            };
            match element_children(locale, x).last() {
                Some(child) => {
                    locale.set_pos(id, child, 0);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    /// Move from the start of a container to its first child element with
    /// a name.
    pub fn to_child(&mut self, name: &QName) -> Result<bool> {
        self.run(|locale, id| {
            let Ok(x) = require_container(locale, id) else {
                return Ok(false);
            };
            let Some(name_id) = locale.names.name_id(name) else {
                return Ok(false);
            };
            let found = element_children(locale, x).find(|c| locale.xobj(*c).name == Some(name_id));
            match found {
                Some(child) => {
                    locale.set_pos(id, child, 0);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    /// Move to the next sibling element after the cursor.
    pub fn to_next_sibling(&mut self) -> Result<bool> {
        self.run(|locale, id| {
            let (x, p) = locale.raw_pos(id);
            let xobj = locale.xobj(x);
            let mut candidate = if p == 0 && !xobj.is_attr() {
                locale.next_sibling_of(x)
            } else if p == END_POS || p == 0 {
                None
            } else if p < xobj.pos_after() {
                locale.first_child_of(x)
            } else {
                locale.next_sibling_of(x)
            };
            while let Some(c) = candidate {
                if locale.xobj(c).kind == NodeKind::Element {
                    locale.set_pos(id, c, 0);
                    return Ok(true);
                }
                candidate = locale.next_sibling_of(c);
            }
            Ok(false)
        })
    }

    /// Move to the previous sibling element before the cursor.
    pub fn to_prev_sibling(&mut self) -> Result<bool> {
        self.run(|locale, id| {
            let (x, p) = locale.raw_pos(id);
            let xobj = locale.xobj(x);
            let mut candidate = if p == 0 && !xobj.is_attr() {
                locale.prev_sibling_of(x)
            } else if p != END_POS && p >= xobj.pos_after() {
                Some(x)
            } else {
                None
            };
            while let Some(c) = candidate {
                if locale.xobj(c).kind == NodeKind::Element {
                    locale.set_pos(id, c, 0);
                    return Ok(true);
                }
                candidate = locale.prev_sibling_of(c);
            }
            Ok(false)
        })
    }

    /// Move to the start of the container the cursor is in.
    pub fn to_parent(&mut self) -> Result<bool> {
        self.run(|locale, id| Ok(locale.to_parent(id)))
    }

    /// Move from the start of an element to its first attribute that isn't
    /// a namespace declaration.
    pub fn to_first_attribute(&mut self) -> Result<bool> {
        self.run(|locale, id| {
            let Ok(x) = require_container(locale, id) else {
                return Ok(false);
            };
            let found = locale
                .attributes(Node::new(x))
                .find(|attr| !locale.is_namespace_attr(*attr));
            match found {
                Some(attr) => {
                    locale.set_pos(id, attr.get(), 0);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    /// Move from an attribute to the next one that isn't a namespace
    /// declaration.
    pub fn to_next_attribute(&mut self) -> Result<bool> {
        self.run(|locale, id| {
            let (x, p) = locale.raw_pos(id);
            if p != 0 || !locale.xobj(x).is_attr() {
                return Ok(false);
            }
            let mut candidate = locale.next_sibling_of(x);
            while let Some(c) = candidate {
                if !locale.xobj(c).is_attr() {
                    break;
                }
                if !locale.is_namespace_attr(Node::new(c)) {
                    locale.set_pos(id, c, 0);
                    return Ok(true);
                }
                candidate = locale.next_sibling_of(c);
            }
            Ok(false)
        })
    }

    /// Move from the start of a container to its end token.
    pub fn to_end_token(&mut self) -> Result<bool> {
        self.run(|locale, id| Ok(locale.to_end(id)))
    }

    pub fn to_start_doc(&mut self) -> Result<()> {
        self.run(|locale, id| {
            locale.to_root(id);
            Ok(())
        })
    }

    pub fn to_end_doc(&mut self) -> Result<()> {
        self.run(|locale, id| {
            locale.to_root(id);
            locale.to_end(id);
            Ok(())
        })
    }

    /// Move from the start of a container past its attributes.
    pub fn to_first_content_token(&mut self) -> Result<Option<TokenKind>> {
        self.run(|locale, id| {
            let Ok(x) = require_container(locale, id) else {
                return Ok(None);
            };
            let (y, q) = content_start(locale, x);
            locale.set_pos(id, y, q);
            Ok(Some(locale.kind(id)))
        })
    }

    /// Move right over up to `cch` chars of the current text. Returns how
    /// many chars were passed.
    pub fn to_next_char(&mut self, cch: usize) -> Result<usize> {
        self.run(|locale, id| Ok(locale.next_chars(id, cch)))
    }

    /// Move left over up to `cch` chars of the preceding text.
    pub fn to_prev_char(&mut self, cch: usize) -> Result<usize> {
        self.run(|locale, id| Ok(locale.prev_chars(id, cch)))
    }

    /// Move to the position of another cursor in the same document.
    pub fn to_cursor(&mut self, other: &Cursor<L>) -> Result<()> {
        let other_id = self.peer_id(other)?.ok_or(Error::CrossDocument)?;
        self.run(|locale, id| {
            locale.move_to_cur(id, other_id);
            Ok(())
        })
    }

    // names and values

    /// The name of the element, attribute or processing instruction at the
    /// cursor.
    pub fn name(&self) -> Result<Option<QName>> {
        self.run(|locale, id| Ok(node_at(locale, id).and_then(|node| locale.node_name(node))))
    }

    /// Rename the element or attribute at the cursor.
    pub fn set_name(&mut self, name: &QName) -> Result<()> {
        self.run(|locale, id| {
            let node = require_node(locale, id)?;
            if locale.node_kind(node) == NodeKind::Attr {
                if let Some(parent) = locale.parent_of(node.get()) {
                    match locale.find_attr(parent, name) {
                        Some(existing) if existing != node.get() => {
                            return Err(invalid("duplicate attribute"))
                        }
                        _ => {}
                    }
                }
            }
            locale.rename_node(node, name)
        })
    }

    /// The text value of the node at the cursor.
    pub fn text_value(&self) -> Result<String> {
        self.run(|locale, id| Ok(locale.text_value(require_node(locale, id)?)))
    }

    /// Replace the contents of a container with text, or set the value of
    /// an attribute, comment or processing instruction.
    pub fn set_text_value(&mut self, text: &str) -> Result<()> {
        self.run(|locale, id| {
            let node = require_node(locale, id)?;
            let x = node.get();
            match locale.node_kind(node) {
                NodeKind::Root | NodeKind::Element => {
                    locale.remove_contents(node)?;
                    if !text.is_empty() {
                        locale.scope(|locale| {
                            let at = locale.temp_cur();
                            locale.move_to(at, node, END_POS);
                            locale.insert_chars(at, text);
                        });
                    }
                }
                NodeKind::Comment => {
                    if text.contains("--") || text.ends_with('-') {
                        return Err(Error::InvalidComment(text.to_string()));
                    }
                    locale.set_leaf_value(x, text);
                }
                NodeKind::Procinst => {
                    if text.contains("?>") {
                        return Err(invalid("processing instruction data contains '?>'"));
                    }
                    locale.set_leaf_value(x, text);
                }
                NodeKind::Attr => locale.set_leaf_value(x, text),
            }
            Ok(())
        })
    }

    /// The text right of the cursor, up to the next token.
    pub fn chars(&self) -> Result<String> {
        self.run(|locale, id| Ok(locale.chars_right(id, usize::MAX)))
    }

    /// The value of an attribute of the element at the cursor.
    pub fn attribute_text(&self, name: &QName) -> Result<Option<String>> {
        self.run(|locale, id| {
            let x = require_container(locale, id)?;
            Ok(locale
                .find_attr(x, name)
                .map(|attr| locale.value_text(Node::new(attr))))
        })
    }

    /// Set an attribute of the element at the cursor, adding it if needed.
    pub fn set_attribute_text(&mut self, name: &QName, value: &str) -> Result<()> {
        self.run(|locale, id| {
            let x = require_container(locale, id)?;
            if locale.xobj(x).kind != NodeKind::Element {
                return Err(invalid("only elements have attributes"));
            }
            match locale.find_attr(x, name) {
                Some(attr) => locale.set_leaf_value(attr, value),
                None => {
                    let attr = locale.create_attr(name, value)?;
                    let at = content_start(locale, x);
                    insert_at(locale, at, attr)?;
                }
            }
            Ok(())
        })
    }

    /// Remove an attribute of the element at the cursor. Returns whether
    /// there was one.
    pub fn remove_attribute(&mut self, name: &QName) -> Result<bool> {
        self.run(|locale, id| {
            let x = require_container(locale, id)?;
            match locale.find_attr(x, name) {
                Some(attr) => {
                    locale.remove_node(Node::new(attr))?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    // insertion; the cursor ends up after what was inserted

    pub fn insert_element(&mut self, name: &QName) -> Result<()> {
        self.run(|locale, id| {
            insert_content(locale, id, |locale| locale.create_element(name)).map(|_| ())
        })
    }

    pub fn insert_element_with_text(&mut self, name: &QName, text: &str) -> Result<()> {
        self.run(|locale, id| {
            let element = insert_content(locale, id, |locale| locale.create_element(name))?;
            if !text.is_empty() {
                locale.scope(|locale| {
                    let at = locale.temp_cur();
                    locale.move_to(at, element, END_POS);
                    locale.insert_chars(at, text);
                });
            }
            Ok(())
        })
    }

    /// Insert an element and move between its start and end tokens.
    pub fn begin_element(&mut self, name: &QName) -> Result<()> {
        self.run(|locale, id| {
            let element = insert_content(locale, id, |locale| locale.create_element(name))?;
            locale.move_to(id, element, END_POS);
            Ok(())
        })
    }

    pub fn insert_attribute_with_value(&mut self, name: &QName, value: &str) -> Result<()> {
        self.run(|locale, id| {
            let element = check_attr_insert(locale, id)?;
            check_new_attr(locale, element, name)?;
            let attr = locale.create_attr(name, value)?;
            locale.insert_node(attr, id)
        })
    }

    /// Declare a namespace on the element. An empty prefix declares the
    /// default namespace.
    pub fn insert_namespace(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.run(|locale, id| {
            let element = check_attr_insert(locale, id)?;
            check_new_namespace(locale, element, prefix)?;
            let attr = locale.create_namespace_attr(prefix, uri)?;
            locale.insert_node(attr, id)
        })
    }

    pub fn insert_comment(&mut self, text: &str) -> Result<()> {
        self.run(|locale, id| {
            insert_content(locale, id, |locale| locale.create_comment(text)).map(|_| ())
        })
    }

    pub fn insert_proc_inst(&mut self, target: &str, data: &str) -> Result<()> {
        self.run(|locale, id| {
            insert_content(locale, id, |locale| locale.create_procinst(target, data)).map(|_| ())
        })
    }

    pub fn insert_chars(&mut self, text: &str) -> Result<()> {
        self.run(|locale, id| {
            check_content_insert(locale, id)?;
            locale.insert_chars(id, text);
            Ok(())
        })
    }

    // removal

    /// Remove the node or the text at the cursor. The cursor ends up where
    /// the removed XML was.
    pub fn remove_xml(&mut self) -> Result<()> {
        self.run(|locale, id| {
            let (x, p) = locale.raw_pos(id);
            match locale.token_at(x, p) {
                TokenKind::StartDoc | TokenKind::EndDoc | TokenKind::End => {
                    Err(invalid("nothing to remove at the cursor"))
                }
                TokenKind::Text => {
                    let cch = locale.cch_right(id);
                    locale.remove_chars(id, cch);
                    Ok(())
                }
                _ => follow_node(locale, id, x, |locale| locale.remove_node(Node::new(x))),
            }
        })
    }

    /// Remove everything inside the container at the cursor except its
    /// attributes.
    pub fn remove_xml_contents(&mut self) -> Result<()> {
        self.run(|locale, id| {
            let x = require_container(locale, id)?;
            locale.remove_contents(Node::new(x))
        })
    }

    /// Remove up to `cch` chars right of the cursor.
    pub fn remove_chars(&mut self, cch: usize) -> Result<usize> {
        self.run(|locale, id| Ok(locale.remove_chars(id, cch)))
    }

    // moving and copying

    /// Move the node at the cursor to `to`, possibly in another document.
    /// This cursor ends up where the node used to be.
    pub fn move_xml(&mut self, to: &Cursor<L>) -> Result<()> {
        match self.peer_id(to)? {
            Some(to_id) => self.run(|locale, id| {
                let node = require_node(locale, id)?;
                let x = node.get();
                if locale.raw_pos(to_id) == (x, 0) {
                    return Ok(());
                }
                if locale.is_in_subtree(to_id, x) {
                    return Err(invalid("can't move a node into itself"));
                }
                let kind = locale.node_kind(node);
                if kind == NodeKind::Attr {
                    let element = check_attr_insert(locale, to_id)?;
                    if locale.parent_of(x) != Some(element) {
                        check_new_attr(locale, element, &node_name_or_empty(locale, node))?;
                    }
                } else {
                    check_destination(locale, to_id, kind, None)?;
                }
                follow_node(locale, id, x, |locale| locale.move_node(node, to_id))
            }),
            None => {
                self.copy_xml(to)?;
                self.remove_xml()
            }
        }
    }

    /// Copy the node at the cursor to `to`, possibly in another document.
    pub fn copy_xml(&mut self, to: &Cursor<L>) -> Result<()> {
        match self.peer_id(to)? {
            Some(to_id) => self.run(|locale, id| {
                let node = require_node(locale, id)?;
                let name = locale.node_name(node);
                check_destination(locale, to_id, locale.node_kind(node), name.as_ref())?;
                if locale.is_in_subtree(to_id, node.get()) {
                    return Err(invalid("can't copy a node into itself"));
                }
                locale.copy_node(node, to_id).map(|_| ())
            }),
            None => {
                let (fragment, kind, name) = self.run(|locale, id| {
                    let node = require_node(locale, id)?;
                    Ok((
                        locale.export_subtree(node),
                        locale.node_kind(node),
                        locale.node_name(node),
                    ))
                })?;
                to.run(|locale, to_id| {
                    check_destination(locale, to_id, kind, name.as_ref())?;
                    let copy = locale.import_subtree(fragment)?;
                    locale.insert_node(copy, to_id)
                })
            }
        }
    }

    /// Move up to `cch` chars right of the cursor to `to`. Returns how many
    /// were moved.
    pub fn move_chars(&mut self, cch: usize, to: &Cursor<L>) -> Result<usize> {
        match self.peer_id(to)? {
            Some(to_id) => self.run(|locale, id| {
                check_content_insert(locale, to_id)?;
                Ok(locale.move_chars(id, cch, to_id))
            }),
            None => {
                let moved = self.copy_chars(cch, to)?;
                self.run(|locale, id| Ok(locale.remove_chars(id, moved)))
            }
        }
    }

    /// Copy up to `cch` chars right of the cursor to `to`.
    pub fn copy_chars(&mut self, cch: usize, to: &Cursor<L>) -> Result<usize> {
        match self.peer_id(to)? {
            Some(to_id) => self.run(|locale, id| {
                check_content_insert(locale, to_id)?;
                Ok(locale.copy_chars(id, cch, to_id))
            }),
            None => {
                let (span, nodes) = self.run(|locale, id| {
                    let (x, p) = locale.raw_pos(id);
                    let n = cch.min(locale.cch_right_at(x, p));
                    Ok(locale.text_at(x, p, n))
                })?;
                let n = span.len();
                if n == 0 {
                    return Ok(0);
                }
                to.run(|locale, to_id| {
                    check_content_insert(locale, to_id)?;
                    locale.insert_span(to_id, span, nodes);
                    Ok(n)
                })
            }
        }
    }

    // saved positions

    /// Remember the current position.
    pub fn push(&mut self) -> Result<()> {
        let saved = self.run(|locale, id| Ok(weak_cur_at(locale, id)))?;
        self.saved.push(saved);
        Ok(())
    }

    /// Go back to the last remembered position. Returns false if there is
    /// none.
    pub fn pop(&mut self) -> Result<bool> {
        let Some(saved) = self.saved.pop() else {
            return Ok(false);
        };
        self.run(|locale, id| {
            locale.move_to_cur(id, saved);
            locale.release_cur(saved);
            Ok(true)
        })
    }

    // comparison

    /// Compare positions in document order.
    pub fn compare_position(&self, other: &Cursor<L>) -> Result<Ordering> {
        let other_id = self.peer_id(other)?.ok_or(Error::CrossDocument)?;
        self.run(|locale, id| {
            locale
                .compare_position(id, other_id)
                .ok_or_else(|| invalid("cursors are in different trees"))
        })
    }

    pub fn is_at_same_position_as(&self, other: &Cursor<L>) -> Result<bool> {
        Ok(self.compare_position(other)? == Ordering::Equal)
    }

    pub fn is_left_of(&self, other: &Cursor<L>) -> Result<bool> {
        Ok(self.compare_position(other)? == Ordering::Less)
    }

    pub fn is_right_of(&self, other: &Cursor<L>) -> Result<bool> {
        Ok(self.compare_position(other)? == Ordering::Greater)
    }

    // bookmarks

    /// Attach a value to the current position. It moves with the content.
    pub fn set_bookmark<T: Any + Send>(&mut self, value: T) -> Result<()> {
        self.run(|locale, id| {
            locale.set_bookmark(id, value);
            Ok(())
        })
    }

    pub fn get_bookmark<T: Any + Send + Clone>(&self) -> Result<Option<T>> {
        self.run(|locale, id| Ok(locale.get_bookmark::<T>(id).cloned()))
    }

    pub fn clear_bookmark<T: Any + Send>(&mut self) -> Result<Option<T>> {
        self.run(|locale, id| Ok(locale.clear_bookmark::<T>(id)))
    }

    /// Where the element at the cursor was in the loaded text, if line
    /// numbers were recorded.
    pub fn line_number(&self) -> Result<Option<LineNumber>> {
        self.run(|locale, id| Ok(locale.get_bookmark::<LineNumber>(id).copied()))
    }

    // selections

    /// Select the nodes a path finds from the container at the cursor,
    /// replacing the current selection. The cursor doesn't move.
    pub fn select_path(&mut self, expr: &str, options: &XmlOptions) -> Result<()> {
        self.clear_selections()?;
        let selected = self.run(|locale, id| {
            let context = context_of(locale, id)?;
            let nodes = locale.select_path(context, expr, options)?;
            Ok(nodes
                .into_iter()
                .map(|node| {
                    let c = locale.alloc_cur(CurClass::Weak);
                    locale.move_to(c, node, 0);
                    c
                })
                .collect::<Vec<_>>())
        })?;
        self.selections = selected;
        Ok(())
    }

    pub fn selection_count(&self) -> usize {
        self.selections.len()
    }

    /// Move to the next selected node.
    pub fn to_next_selection(&mut self) -> Result<bool> {
        let next = self.selection.map(|i| i + 1).unwrap_or(0);
        if next >= self.selections.len() {
            return Ok(false);
        }
        self.to_selection(next)
    }

    /// Move to a selected node by index.
    pub fn to_selection(&mut self, index: usize) -> Result<bool> {
        let Some(&selected) = self.selections.get(index) else {
            return Ok(false);
        };
        self.run(|locale, id| {
            locale.move_to_cur(id, selected);
            Ok(())
        })?;
        self.selection = Some(index);
        Ok(true)
    }

    pub fn clear_selections(&mut self) -> Result<()> {
        let selections = std::mem::take(&mut self.selections);
        self.selection = None;
        self.run(|locale, _| {
            for c in selections {
                if locale.is_live(c) {
                    locale.release_cur(c);
                }
            }
            Ok(())
        })
    }

    /// Run a query from the container at the cursor. The results are
    /// copied into a new document.
    ///
    /// Attributes can't stand in a document on their own. A run of
    /// attribute results is carried by an `xml-fragment` element, and a
    /// name repeated within the run starts a new one.
    pub fn exec_query(&self, expr: &str, options: &XmlOptions) -> Result<Document<L>> {
        let fragments: Vec<Fragment> = self.run(|locale, id| {
            let context = context_of(locale, id)?;
            locale.exec_query(context, expr, options)
        })?;
        let mut locale = Locale::new();
        let root = locale.create_root();
        let mut carrier: Option<Node> = None;
        for fragment in fragments {
            let node = locale.import_subtree(fragment)?;
            if locale.node_kind(node) != NodeKind::Attr {
                carrier = None;
                insert_at(&mut locale, (root.get(), END_POS), node)?;
                continue;
            }
            let name = locale.node_name(node);
            let element = match carrier {
                Some(element)
                    if !locale
                        .attributes(element)
                        .any(|attr| locale.node_name(attr) == name) =>
                {
                    element
                }
                _ => {
                    let element = locale.create_element(&QName::new(FRAGMENT_ELEMENT))?;
                    insert_at(&mut locale, (root.get(), END_POS), element)?;
                    element
                }
            };
            carrier = Some(element);
            let at = content_start(&locale, element.get());
            insert_at(&mut locale, at, node)?;
        }
        Ok(Document::from_parts(L::from_locale(locale), root))
    }

    // saving

    /// The XML at the cursor: the node whose start it is at, or the
    /// escaped text right of it.
    pub fn xml_text(&self, options: &XmlOptions) -> Result<String> {
        self.run(|locale, id| match node_at(locale, id) {
            Some(node) => locale.save_to_string(node, options),
            None if locale.kind(id) == TokenKind::Text => {
                let text = locale.chars_right(id, usize::MAX);
                Ok(escape(&text, EscapeContext::Text).into_owned())
            }
            None => Err(invalid("nothing to save at the cursor")),
        })
    }

    /// A reader over the saved node at the cursor.
    pub fn new_reader(&self, options: &XmlOptions) -> Result<SaveReader<L>> {
        let node = self.run(|locale, id| require_node(locale, id))?;
        SaveReader::new(self.access.clone(), node, options)
    }
}

fn node_name_or_empty(locale: &Locale, node: Node) -> QName {
    locale.node_name(node).unwrap_or_else(|| QName::new(""))
}
