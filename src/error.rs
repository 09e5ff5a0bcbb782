use thiserror::Error;

/// Errors reported by the store.
///
/// Invariant violations inside the cursor engine are not represented here:
/// they indicate a bug in the caller and panic. What is here is either bad
/// user input caught at the [`Cursor`](crate::Cursor) boundary before any
/// mutation happens, a load/save failure, or a document that changed
/// underneath a multi-step traversal.
#[derive(Debug, Error)]
pub enum Error {
    /// Not a valid XML name (NCName) for an element, attribute or prefix.
    #[error("invalid XML name: {0:?}")]
    InvalidName(String),
    /// A reserved prefix (`xml`, `xmlns`) used in a way that is not allowed.
    #[error("invalid use of prefix {prefix:?} with namespace {namespace:?}")]
    InvalidPrefix { prefix: String, namespace: String },
    /// Comment text containing `--` or ending in `-`.
    #[error("invalid comment: {0:?}")]
    InvalidComment(String),
    /// Processing instruction target that is empty or `xml`.
    #[error("invalid processing instruction target: {0:?}")]
    InvalidTarget(String),
    /// An operation that isn't allowed at the current position.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// A prefix that has no namespace declaration in scope.
    #[error("unknown prefix: {0:?}")]
    UnknownPrefix(String),
    /// An entity reference without a closing `;`.
    #[error("unclosed entity: {0:?}")]
    UnclosedEntity(String),
    /// An entity reference that is neither predefined nor a character reference.
    #[error("invalid entity: {0:?}")]
    InvalidEntity(String),
    /// A close tag that doesn't match the open element, or input that ends
    /// inside an element.
    #[error("unclosed or mismatched tag: {0:?}")]
    UnclosedTag(String),
    /// An attribute or namespace declaration repeated on one start tag.
    #[error("duplicate attribute: {0:?}")]
    DuplicateAttribute(String),
    /// The document changed between steps of a save or path execution.
    #[error("document was modified during traversal")]
    ConcurrentModification,
    /// No external query engine is registered.
    #[error("no query engine available for {0:?}")]
    EngineUnavailable(String),
    /// A path expression that can't be compiled.
    #[error("unsupported path expression: {0:?}")]
    UnsupportedPath(String),
    /// An option value that isn't acceptable.
    #[error("invalid option: {0}")]
    InvalidOption(String),
    /// A cursor that was already released.
    #[error("cursor has been disposed")]
    DisposedCursor,
    /// An operation spanning two documents that requires a copy.
    #[error("cursors are in different documents")]
    CrossDocument,
    /// The requested character encoding isn't known.
    #[error("unknown encoding: {0:?}")]
    Encoding(String),
    /// Tree linking error.
    #[error("tree error: {0}")]
    Node(#[from] indextree::NodeError),
    /// Tokenizer error.
    #[error("parser error: {0}")]
    Parser(#[from] xmlparser::Error),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
