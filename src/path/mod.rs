//! Path selection and queries.
//!
//! Paths are compiled once per locale and cached. The built-in engine
//! handles simple downward paths; everything else goes to a registered
//! [`QueryEngine`].
mod engine;
mod simple;

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use indextree::NodeId;

use crate::cur::Fragment;
use crate::error::{Error, Result};
use crate::locale::Locale;
use crate::options::XmlOptions;
use crate::xobj::{Node, NodeKind};

pub use engine::{CompiledPath, CompiledQuery, QueryEngine};
use simple::SimplePath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EngineChoice {
    Any,
    External,
    Builtin,
}

impl EngineChoice {
    fn from_options(options: &XmlOptions) -> Self {
        if options.use_xquery_for_xpath {
            EngineChoice::External
        } else if options.use_builtin_for_xpath {
            EngineChoice::Builtin
        } else {
            EngineChoice::Any
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PathKey {
    current_node_var: String,
    expr: String,
    engine: EngineChoice,
}

enum Compiled {
    Builtin(SimplePath),
    External(Box<dyn CompiledPath>),
}

/// A compiled path expression.
pub struct Path {
    expr: String,
    compiled: Compiled,
}

impl Debug for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Path")
            .field("expr", &self.expr)
            .field("builtin", &self.is_builtin())
            .finish()
    }
}

impl Path {
    fn compile(
        engine: Option<&Arc<dyn QueryEngine>>,
        expr: &str,
        options: &XmlOptions,
    ) -> Result<Path> {
        let var = options.current_node_var();
        let external = || -> Result<Path> {
            let engine = engine.ok_or_else(|| Error::EngineUnavailable(expr.to_string()))?;
            tracing::debug!(expr, "compiling path with the query engine");
            Ok(Path {
                expr: expr.to_string(),
                compiled: Compiled::External(engine.compile_path(expr, var)?),
            })
        };
        match EngineChoice::from_options(options) {
            EngineChoice::External => external(),
            choice => match simple::compile(expr, var) {
                Ok(simple) => Ok(Path {
                    expr: expr.to_string(),
                    compiled: Compiled::Builtin(simple),
                }),
                Err(Error::UnsupportedPath(_)) if choice == EngineChoice::Any => external(),
                Err(e) => Err(e),
            },
        }
    }

    /// The expression text.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Is this path run by the built-in engine?
    pub fn is_builtin(&self) -> bool {
        matches!(self.compiled, Compiled::Builtin(_))
    }

    /// Start selecting from a context node.
    pub fn execute(self: &Arc<Self>, locale: &Locale, context: Node) -> Result<PathExecution> {
        let state = match &self.compiled {
            Compiled::Builtin(_) => State::Walk {
                next: Some(context.get()),
            },
            Compiled::External(compiled) => State::Selected {
                nodes: compiled.select(locale, context)?,
                index: 0,
            },
        };
        Ok(PathExecution {
            path: Arc::clone(self),
            context: context.get(),
            version: locale.version_sans_text(),
            state,
        })
    }
}

#[derive(Debug)]
enum State {
    // the next candidate of the walk over the context subtree
    Walk { next: Option<NodeId> },
    Selected { nodes: Vec<Node>, index: usize },
}

/// A path being executed. Selected nodes come out one at a time, in
/// document order. Structural edits to the document in between fail the
/// execution.
#[derive(Debug)]
pub struct PathExecution {
    path: Arc<Path>,
    context: NodeId,
    version: u64,
    state: State,
}

impl PathExecution {
    /// The next selected node.
    pub fn next(&mut self, locale: &Locale) -> Result<Option<Node>> {
        if locale.version_sans_text() != self.version {
            return Err(Error::ConcurrentModification);
        }
        match &mut self.state {
            State::Walk { next } => {
                let Compiled::Builtin(simple) = &self.path.compiled else {
                    unreachable!("a walk runs a built-in path");
                };
                let attributes = simple.selects_attributes();
                while let Some(candidate) = *next {
                    *next = preorder_next(locale, self.context, candidate);
                    let xobj = locale.xobj(candidate);
                    let eligible = match xobj.kind {
                        NodeKind::Root | NodeKind::Element => true,
                        NodeKind::Attr => attributes,
                        NodeKind::Comment | NodeKind::Procinst => false,
                    };
                    if eligible && simple.matches(locale, self.context, candidate) {
                        return Ok(Some(Node::new(candidate)));
                    }
                }
                Ok(None)
            }
            State::Selected { nodes, index } => {
                let node = nodes.get(*index).copied();
                *index += 1;
                Ok(node)
            }
        }
    }
}

fn preorder_next(locale: &Locale, context: NodeId, x: NodeId) -> Option<NodeId> {
    if let Some(child) = locale.first_child_of(x) {
        return Some(child);
    }
    let mut current = x;
    loop {
        if current == context {
            return None;
        }
        if let Some(next) = locale.next_sibling_of(current) {
            return Some(next);
        }
        current = locale.parent_of(current)?;
    }
}

/// ## Paths and queries
impl Locale {
    /// Compile a path, or get it from the cache.
    pub fn compile_path(&mut self, expr: &str, options: &XmlOptions) -> Result<Arc<Path>> {
        options.validate()?;
        let key = PathKey {
            current_node_var: options.current_node_var().to_string(),
            expr: expr.to_string(),
            engine: EngineChoice::from_options(options),
        };
        if let Some(path) = self.path_cache.get(&key) {
            return Ok(Arc::clone(path));
        }
        let path = Arc::new(Path::compile(self.query_engine.as_ref(), expr, options)?);
        self.path_cache.put(key, Arc::clone(&path));
        Ok(path)
    }

    /// All nodes a path selects from a context node.
    ///
    /// ```rust
    /// use xmlstore::{Locale, XmlOptions};
    ///
    /// let mut locale = Locale::new();
    /// let root = locale.parse(r#"<a><b id="1"/><c><b id="2"/></c></a>"#).unwrap();
    /// let a = locale.document_element(root).unwrap();
    /// let ids: Vec<String> = locale
    ///     .select_path(a, ".//b/@id", &XmlOptions::default())
    ///     .unwrap()
    ///     .into_iter()
    ///     .map(|attr| locale.value_text(attr))
    ///     .collect();
    /// assert_eq!(ids, vec!["1", "2"]);
    /// ```
    pub fn select_path(
        &mut self,
        context: Node,
        expr: &str,
        options: &XmlOptions,
    ) -> Result<Vec<Node>> {
        let path = self.compile_path(expr, options)?;
        let mut execution = path.execute(self, context)?;
        let mut nodes = Vec::new();
        while let Some(node) = execution.next(self)? {
            nodes.push(node);
        }
        Ok(nodes)
    }

    /// Run a query with the registered query engine.
    pub fn exec_query(
        &self,
        context: Node,
        expr: &str,
        options: &XmlOptions,
    ) -> Result<Vec<Fragment>> {
        options.validate()?;
        let engine = self
            .query_engine
            .as_ref()
            .ok_or_else(|| Error::EngineUnavailable(expr.to_string()))?;
        tracing::debug!(expr, "running query with the query engine");
        let query = engine.compile_query(expr, options.current_node_var())?;
        query.execute(self, context)
    }
}
