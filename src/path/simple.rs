//! The built-in path engine.
//!
//! It handles a small downward subset of XPath:
//!
//! ```text
//! declare namespace p='urn:p'; declare default element namespace 'urn:d';
//! $this/p:a//b/@c | ./*/p:*
//! ```
//!
//! Every step moves to children (`/`) or descendants (`//`) and selects
//! elements, or attributes in the last step. Anything else is reported as
//! unsupported so it can go to an external engine.
use indextree::NodeId;

use crate::error::{Error, Result};
use crate::locale::Locale;
use crate::name::{is_name_char, is_ncname, QName, XML_NAMESPACE};
use crate::xobj::NodeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    // `.` in the middle of a location
    Context,
    AnyElement,
    AnyInNamespace(String),
    Element(QName),
    AnyAttribute,
    Attribute(QName),
}

impl NodeTest {
    fn is_attribute(&self) -> bool {
        matches!(self, NodeTest::AnyAttribute | NodeTest::Attribute(_))
    }

    fn matches(&self, locale: &Locale, x: NodeId) -> bool {
        let xobj = locale.xobj(x);
        let name = || {
            xobj.name.map(|name| {
                (
                    locale
                        .names
                        .namespace_str(locale.names.namespace_for_name(name)),
                    locale.names.local_str(name),
                )
            })
        };
        match self {
            NodeTest::Context => xobj.is_container(),
            NodeTest::AnyElement => xobj.kind == NodeKind::Element,
            NodeTest::AnyInNamespace(uri) => {
                xobj.kind == NodeKind::Element
                    && name().map(|(ns, _)| ns == uri.as_str()).unwrap_or(false)
            }
            NodeTest::Element(qname) => {
                xobj.kind == NodeKind::Element
                    && name()
                        .map(|(ns, local)| ns == qname.namespace() && local == qname.local_name())
                        .unwrap_or(false)
            }
            NodeTest::AnyAttribute => {
                xobj.kind == NodeKind::Attr
                    && name().map(|(ns, _)| ns != crate::name::XMLNS_NAMESPACE).unwrap_or(false)
            }
            NodeTest::Attribute(qname) => {
                xobj.kind == NodeKind::Attr
                    && name()
                        .map(|(ns, local)| ns == qname.namespace() && local == qname.local_name())
                        .unwrap_or(false)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
}

// one branch of a union, relative to the context node
#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    steps: Vec<Step>,
}

impl Location {
    fn selects_attributes(&self) -> bool {
        self.steps
            .last()
            .map(|step| step.test.is_attribute())
            .unwrap_or(false)
    }

    // does the chain from the context node down to a candidate match the
    // steps from `step` on, with `chain[at]` as the current context
    fn matches_chain(&self, locale: &Locale, chain: &[NodeId], step: usize, at: usize) -> bool {
        let Some(current) = self.steps.get(step) else {
            return at + 1 == chain.len();
        };
        if current.test == NodeTest::Context {
            return current.test.matches(locale, chain[at])
                && self.matches_chain(locale, chain, step + 1, at);
        }
        match current.axis {
            Axis::Child => {
                at + 1 < chain.len()
                    && current.test.matches(locale, chain[at + 1])
                    && self.matches_chain(locale, chain, step + 1, at + 1)
            }
            Axis::Descendant => (at + 1..chain.len()).any(|k| {
                current.test.matches(locale, chain[k]) && self.matches_chain(locale, chain, step + 1, k)
            }),
        }
    }
}

/// A compiled simple path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SimplePath {
    locations: Vec<Location>,
}

impl SimplePath {
    pub(crate) fn selects_attributes(&self) -> bool {
        self.locations.iter().any(Location::selects_attributes)
    }

    /// Does `candidate`, somewhere in the subtree of `context`, match?
    pub(crate) fn matches(&self, locale: &Locale, context: NodeId, candidate: NodeId) -> bool {
        let mut chain: Vec<NodeId> = candidate
            .ancestors(&locale.arena)
            .take_while(|n| *n != context)
            .collect();
        chain.push(context);
        chain.reverse();
        self.locations
            .iter()
            .any(|location| location.matches_chain(locale, &chain, 0, 0))
    }
}

struct Parser<'a> {
    rest: &'a str,
    current_node_var: &'a str,
    namespaces: Vec<(String, String)>,
    default_namespace: String,
}

fn unsupported(expr: &str) -> Error {
    Error::UnsupportedPath(expr.to_string())
}

impl<'a> Parser<'a> {
    fn skip_space(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn eat(&mut self, s: &str) -> bool {
        match self.rest.strip_prefix(s) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        self.skip_space();
        if self.eat(s) {
            Ok(())
        } else {
            Err(unsupported(self.rest))
        }
    }

    fn ncname(&mut self) -> Option<&'a str> {
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| !is_name_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let name = &self.rest[..end];
        if is_ncname(name) {
            self.rest = &self.rest[end..];
            Some(name)
        } else {
            None
        }
    }

    fn literal(&mut self) -> Result<String> {
        self.skip_space();
        let quote = match self.rest.chars().next() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(unsupported(self.rest)),
        };
        let body = &self.rest[1..];
        let end = body.find(quote).ok_or_else(|| unsupported(self.rest))?;
        let value = body[..end].to_string();
        self.rest = &body[end + 1..];
        Ok(value)
    }

    fn prolog(&mut self) -> Result<()> {
        loop {
            self.skip_space();
            let is_declaration = self
                .rest
                .strip_prefix("declare")
                .map(|rest| rest.starts_with(char::is_whitespace))
                .unwrap_or(false);
            if !is_declaration {
                return Ok(());
            }
            self.eat("declare");
            self.skip_space();
            if self.eat("namespace") {
                self.skip_space();
                let prefix = self.ncname().ok_or_else(|| unsupported(self.rest))?;
                self.expect("=")?;
                let uri = self.literal()?;
                self.namespaces.push((prefix.to_string(), uri));
            } else if self.eat("default") {
                self.expect("element")?;
                self.expect("namespace")?;
                self.default_namespace = self.literal()?;
            } else {
                return Err(unsupported(self.rest));
            }
            self.expect(";")?;
        }
    }

    fn namespace_for_prefix(&self, prefix: &str) -> Result<String> {
        if prefix == "xml" {
            return Ok(XML_NAMESPACE.to_string());
        }
        self.namespaces
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone())
            .ok_or_else(|| Error::UnknownPrefix(prefix.to_string()))
    }

    fn test(&mut self, axis: Axis) -> Result<NodeTest> {
        if self.rest.starts_with("..") {
            return Err(unsupported(self.rest));
        }
        if self.eat(".") {
            // `//.` would select the context and every descendant
            if axis == Axis::Descendant {
                return Err(unsupported(self.rest));
            }
            return Ok(NodeTest::Context);
        }
        let attribute = self.eat("@");
        if self.eat("*") {
            return Ok(if attribute {
                NodeTest::AnyAttribute
            } else {
                NodeTest::AnyElement
            });
        }
        let first = self.ncname().ok_or_else(|| unsupported(self.rest))?;
        let (prefix, local) = if self.eat(":") {
            if self.eat("*") {
                if attribute {
                    return Err(unsupported(self.rest));
                }
                return Ok(NodeTest::AnyInNamespace(self.namespace_for_prefix(first)?));
            }
            let local = self.ncname().ok_or_else(|| unsupported(self.rest))?;
            (first, local)
        } else {
            ("", first)
        };
        let namespace = if !prefix.is_empty() {
            self.namespace_for_prefix(prefix)?
        } else if attribute {
            String::new()
        } else {
            self.default_namespace.clone()
        };
        let name = QName::with_prefix(namespace, local, prefix);
        Ok(if attribute {
            NodeTest::Attribute(name)
        } else {
            NodeTest::Element(name)
        })
    }

    fn location(&mut self) -> Result<Location> {
        self.skip_space();
        let mut steps = Vec::new();
        let mut first = true;
        if self.eat("$") {
            let var = self.ncname().ok_or_else(|| unsupported(self.rest))?;
            if var != self.current_node_var {
                return Err(unsupported(var));
            }
            first = false;
        } else if self.rest.starts_with('/') {
            // absolute paths
            return Err(unsupported(self.rest));
        }
        loop {
            self.skip_space();
            if self.rest.is_empty() || self.rest.starts_with('|') {
                break;
            }
            let axis = if self.eat("//") {
                Axis::Descendant
            } else if self.eat("/") {
                Axis::Child
            } else if first {
                Axis::Child
            } else {
                return Err(unsupported(self.rest));
            };
            first = false;
            let test = self.test(axis)?;
            if steps.last().map(|s: &Step| s.test.is_attribute()).unwrap_or(false) {
                return Err(unsupported(self.rest));
            }
            steps.push(Step { axis, test });
        }
        Ok(Location { steps })
    }
}

/// Compile a path, or report it unsupported.
pub(crate) fn compile(expr: &str, current_node_var: &str) -> Result<SimplePath> {
    let mut parser = Parser {
        rest: expr,
        current_node_var,
        namespaces: Vec::new(),
        default_namespace: String::new(),
    };
    parser.prolog()?;
    let mut locations = vec![parser.location()?];
    loop {
        parser.skip_space();
        if parser.rest.is_empty() {
            break;
        }
        if !parser.eat("|") {
            return Err(unsupported(expr));
        }
        locations.push(parser.location()?);
    }
    Ok(SimplePath { locations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a")]
    #[case("$this/a")]
    #[case("./a//b")]
    #[case(".//a/@b")]
    #[case("*/@*")]
    #[case("declare namespace p='urn:p'; p:a/p:*")]
    #[case("declare default element namespace \"urn:d\"; a | b")]
    #[case(".")]
    fn test_supported(#[case] expr: &str) {
        assert!(compile(expr, "this").is_ok(), "{}", expr);
    }

    #[rstest]
    #[case("/a")]
    #[case("a/..")]
    #[case("a[1]")]
    #[case("count(a)")]
    #[case(".//.")]
    #[case("@a/b")]
    #[case("$other/a")]
    #[case("child::a")]
    fn test_unsupported(#[case] expr: &str) {
        assert!(
            matches!(compile(expr, "this"), Err(Error::UnsupportedPath(_))),
            "{}",
            expr
        );
    }

    #[test]
    fn test_unknown_prefix() {
        assert!(matches!(compile("q:a", "this"), Err(Error::UnknownPrefix(p)) if p == "q"));
    }

    #[test]
    fn test_default_element_namespace_not_for_attributes() {
        let path = compile("declare default element namespace 'urn:d'; a/@b", "this").unwrap();
        assert_eq!(
            path.locations[0].steps,
            vec![
                Step {
                    axis: Axis::Child,
                    test: NodeTest::Element(QName::with_namespace("urn:d", "a")),
                },
                Step {
                    axis: Axis::Child,
                    test: NodeTest::Attribute(QName::new("b")),
                },
            ]
        );
    }
}
