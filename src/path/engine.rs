use crate::cur::Fragment;
use crate::error::Result;
use crate::locale::Locale;
use crate::xobj::Node;

/// An external XPath/XQuery implementation.
///
/// None is built in. Register one with
/// [`Locale::register_query_engine`](crate::Locale::register_query_engine)
/// to run paths the built-in engine can't handle, and queries.
pub trait QueryEngine: Send + Sync {
    /// Compile a path expression. `current_node_var` is the name (without
    /// `$`) the expression uses for the context node.
    fn compile_path(&self, expr: &str, current_node_var: &str) -> Result<Box<dyn CompiledPath>>;

    /// Compile a query.
    fn compile_query(&self, expr: &str, current_node_var: &str)
        -> Result<Box<dyn CompiledQuery>>;
}

/// A path compiled by a [`QueryEngine`].
pub trait CompiledPath: Send + Sync {
    /// The nodes selected from `context`, in document order.
    fn select(&self, locale: &Locale, context: Node) -> Result<Vec<Node>>;
}

/// A query compiled by a [`QueryEngine`].
pub trait CompiledQuery: Send + Sync {
    /// Run the query. The result items are copied out of the locale.
    fn execute(&self, locale: &Locale, context: Node) -> Result<Vec<Fragment>>;
}
