//! Options that control loading, saving and path selection.
use crate::error::{Error, Result};

/// Options for loading, saving and path selection.
///
/// Fields can be set directly; the `with_` methods chain.
///
/// ```rust
/// use xmlstore::XmlOptions;
///
/// let options = XmlOptions::new()
///     .with_pretty_print(2)
///     .with_xml_declaration(true);
/// assert_eq!(options.save_pretty_print_indent, Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct XmlOptions {
    /// Record a [`LineNumber`](crate::LineNumber) bookmark on every element
    /// start when loading.
    pub load_line_numbers: bool,
    /// Drop text that consists only of whitespace when loading.
    pub load_strip_whitespace: bool,
    /// Drop comments when loading.
    pub load_strip_comments: bool,
    /// Drop processing instructions when loading.
    pub load_strip_procinsts: bool,
    /// Indent element-only content by this many spaces when saving.
    pub save_pretty_print_indent: Option<usize>,
    /// Save only the contents of the container, not its tags.
    pub save_inner: bool,
    /// Write an XML declaration when saving a document.
    pub save_xml_declaration: bool,
    /// Character encoding used by [`SaveReader`](crate::SaveReader) and
    /// named in the XML declaration. UTF-8 when not set.
    pub character_encoding: Option<String>,
    /// Send path expressions to the registered query engine even when the
    /// built-in engine could handle them.
    pub use_xquery_for_xpath: bool,
    /// Only ever use the built-in engine for path expressions.
    pub use_builtin_for_xpath: bool,
    /// Name of the variable bound to the context node in path expressions,
    /// without the `$`. `this` when not set.
    pub current_node_var: Option<String>,
    /// A name for the document, for diagnostics.
    pub document_source_name: Option<String>,
}

pub(crate) const DEFAULT_CURRENT_NODE_VAR: &str = "this";

impl XmlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line_numbers(mut self, on: bool) -> Self {
        self.load_line_numbers = on;
        self
    }

    pub fn with_strip_whitespace(mut self, on: bool) -> Self {
        self.load_strip_whitespace = on;
        self
    }

    pub fn with_strip_comments(mut self, on: bool) -> Self {
        self.load_strip_comments = on;
        self
    }

    pub fn with_strip_procinsts(mut self, on: bool) -> Self {
        self.load_strip_procinsts = on;
        self
    }

    pub fn with_pretty_print(mut self, indent: usize) -> Self {
        self.save_pretty_print_indent = Some(indent);
        self
    }

    pub fn with_inner(mut self, on: bool) -> Self {
        self.save_inner = on;
        self
    }

    pub fn with_xml_declaration(mut self, on: bool) -> Self {
        self.save_xml_declaration = on;
        self
    }

    pub fn with_character_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.character_encoding = Some(encoding.into());
        self
    }

    pub fn with_xquery_for_xpath(mut self, on: bool) -> Self {
        self.use_xquery_for_xpath = on;
        self
    }

    pub fn with_builtin_for_xpath(mut self, on: bool) -> Self {
        self.use_builtin_for_xpath = on;
        self
    }

    pub fn with_current_node_var(mut self, name: impl Into<String>) -> Self {
        self.current_node_var = Some(name.into());
        self
    }

    pub fn with_document_source_name(mut self, name: impl Into<String>) -> Self {
        self.document_source_name = Some(name.into());
        self
    }

    /// The context node variable, defaulted.
    pub fn current_node_var(&self) -> &str {
        self.current_node_var
            .as_deref()
            .unwrap_or(DEFAULT_CURRENT_NODE_VAR)
    }

    /// The encoding to save in.
    pub(crate) fn encoding(&self) -> Result<&'static encoding_rs::Encoding> {
        match &self.character_encoding {
            None => Ok(encoding_rs::UTF_8),
            Some(label) => encoding_rs::Encoding::for_label(label.as_bytes())
                .ok_or_else(|| Error::Encoding(label.clone())),
        }
    }

    /// Check option values that can't be expressed in their types.
    pub fn validate(&self) -> Result<()> {
        if let Some(var) = &self.current_node_var {
            if var.starts_with('$') {
                return Err(Error::InvalidOption(format!(
                    "current node variable {:?} must not start with '$'",
                    var
                )));
            }
            if !crate::name::is_ncname(var) {
                return Err(Error::InvalidOption(format!(
                    "current node variable {:?} is not a name",
                    var
                )));
            }
        }
        if self.use_xquery_for_xpath && self.use_builtin_for_xpath {
            return Err(Error::InvalidOption(
                "can't require both the query engine and the built-in engine".to_string(),
            ));
        }
        self.encoding()?;
        Ok(())
    }
}
