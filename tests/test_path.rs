use std::sync::Arc;

use rstest::rstest;
use xmlstore::{
    CompiledPath, CompiledQuery, Error, Fragment, Locale, Node, NodeKind, QName, QueryEngine,
    Result, Saver, UnsyncDocument, XmlOptions,
};

const DOC: &str = concat!(
    r#"<r xmlns:m="urn:m">"#,
    r#"<a id="1"><b/><m:b n="x"/></a>"#,
    r#"<a id="2"><c><b/></c></a>"#,
    r#"</r>"#
);

fn selected_names(expr: &str) -> Vec<String> {
    let doc = UnsyncDocument::parse(DOC).unwrap();
    let mut cursor = doc.cursor();
    cursor.to_first_child().unwrap();
    cursor.select_path(expr, &XmlOptions::default()).unwrap();
    let mut names = Vec::new();
    while cursor.to_next_selection().unwrap() {
        let name = cursor.name().unwrap().unwrap();
        names.push(name.local_name().to_string());
    }
    names
}

#[rstest]
#[case("a", &["a", "a"])]
#[case("a/b", &["b"])]
#[case(".//b", &["b", "b"])]
#[case("declare namespace q='urn:m'; .//q:b", &["b"])]
#[case("a/*", &["b", "b", "c"])]
#[case("a/@id", &["id", "id"])]
#[case("./a/c | a/b", &["b", "c"])]
#[case("zzz", &[])]
fn test_select(#[case] expr: &str, #[case] expected: &[&str]) {
    assert_eq!(selected_names(expr), expected);
}

#[test]
fn test_selections_follow_edits() {
    let doc = UnsyncDocument::parse(DOC).unwrap();
    let mut cursor = doc.cursor();
    cursor.to_first_child().unwrap();
    cursor.select_path("a", &XmlOptions::default()).unwrap();
    assert_eq!(cursor.selection_count(), 2);

    let mut editor = cursor.new_cursor().unwrap();
    editor.to_first_child().unwrap();
    editor.insert_element(&QName::new("first")).unwrap();

    assert!(cursor.to_selection(1).unwrap());
    assert_eq!(
        cursor.attribute_text(&QName::new("id")).unwrap(),
        Some("2".to_string())
    );
    assert!(!cursor.to_selection(2).unwrap());
    cursor.clear_selections().unwrap();
    assert_eq!(cursor.selection_count(), 0);
}

// an engine understanding `name=<local>`: every descendant element with
// that local name
struct ByName(String);

impl CompiledPath for ByName {
    fn select(&self, locale: &Locale, context: Node) -> Result<Vec<Node>> {
        Ok(locale
            .descendants(context)
            .filter(|n| *n != context && locale.node_kind(*n) == NodeKind::Element)
            .filter(|n| {
                locale
                    .node_name(*n)
                    .map(|name| name.local_name() == self.0)
                    .unwrap_or(false)
            })
            .collect())
    }
}

impl CompiledQuery for ByName {
    fn execute(&self, locale: &Locale, context: Node) -> Result<Vec<Fragment>> {
        Ok(ByName::select(self, locale, context)?
            .into_iter()
            .map(|node| locale.export_subtree(node))
            .collect())
    }
}

// `attr=<local>`: every attribute below the context with that local name
struct AttrByName(String);

impl CompiledQuery for AttrByName {
    fn execute(&self, locale: &Locale, context: Node) -> Result<Vec<Fragment>> {
        Ok(locale
            .descendants(context)
            .filter(|n| locale.node_kind(*n) == NodeKind::Element)
            .flat_map(|n| locale.attributes(n))
            .filter(|a| {
                locale
                    .node_name(*a)
                    .map(|name| name.local_name() == self.0)
                    .unwrap_or(false)
            })
            .map(|a| locale.export_subtree(a))
            .collect())
    }
}

struct NameEngine;

fn parse_name(expr: &str) -> Result<String> {
    expr.strip_prefix("name=")
        .map(str::to_string)
        .ok_or_else(|| Error::UnsupportedPath(expr.to_string()))
}

impl QueryEngine for NameEngine {
    fn compile_path(&self, expr: &str, _current_node_var: &str) -> Result<Box<dyn CompiledPath>> {
        Ok(Box::new(ByName(parse_name(expr)?)))
    }

    fn compile_query(
        &self,
        expr: &str,
        _current_node_var: &str,
    ) -> Result<Box<dyn CompiledQuery>> {
        if let Some(local) = expr.strip_prefix("attr=") {
            return Ok(Box::new(AttrByName(local.to_string())));
        }
        Ok(Box::new(ByName(parse_name(expr)?)))
    }
}

#[test]
fn test_unsupported_path_needs_engine() {
    let doc = UnsyncDocument::parse(DOC).unwrap();
    let mut cursor = doc.cursor();
    cursor.to_first_child().unwrap();
    assert!(matches!(
        cursor.select_path("name=b", &XmlOptions::default()),
        Err(Error::EngineUnavailable(_))
    ));

    doc.register_query_engine(Arc::new(NameEngine));
    cursor.select_path("name=b", &XmlOptions::default()).unwrap();
    assert_eq!(cursor.selection_count(), 3);
}

#[test]
fn test_query_copies_into_new_document() {
    let doc = UnsyncDocument::parse(DOC).unwrap();
    doc.register_query_engine(Arc::new(NameEngine));
    let mut cursor = doc.cursor();
    cursor.to_first_child().unwrap();
    let result = cursor.exec_query("name=c", &XmlOptions::default()).unwrap();
    assert_eq!(
        result.xml_text(&XmlOptions::default()).unwrap(),
        "<c><b/></c>"
    );
    // the source is untouched
    assert_eq!(doc.xml_text(&XmlOptions::default()).unwrap(), DOC);
}

#[rstest]
#[case("attr=n", r#"<xml-fragment n="x"/>"#)]
#[case("attr=id", r#"<xml-fragment id="1"/><xml-fragment id="2"/>"#)]
fn test_query_attributes_get_a_fragment_element(#[case] expr: &str, #[case] expected: &str) {
    let doc = UnsyncDocument::parse(DOC).unwrap();
    doc.register_query_engine(Arc::new(NameEngine));
    let mut cursor = doc.cursor();
    cursor.to_first_child().unwrap();
    let result = cursor.exec_query(expr, &XmlOptions::default()).unwrap();
    assert_eq!(result.xml_text(&XmlOptions::default()).unwrap(), expected);
    let root = result.root();
    result.with(|locale| {
        assert!(locale.attributes(root).next().is_none());
        assert!(locale
            .content_children(root)
            .all(|n| locale.node_kind(n) == NodeKind::Element));
    });
}

#[test]
fn test_structure_change_during_path_execution() {
    let mut locale = Locale::new();
    let root = locale.parse(DOC).unwrap();
    let r = locale.document_element(root).unwrap();
    let path = locale.compile_path(".//b", &XmlOptions::default()).unwrap();
    let mut execution = path.execute(&locale, r).unwrap();
    let first = execution.next(&locale).unwrap().unwrap();
    locale.remove_node(first).unwrap();
    assert!(matches!(
        execution.next(&locale),
        Err(Error::ConcurrentModification)
    ));
}

#[test]
fn test_edit_during_save() {
    let mut locale = Locale::new();
    let root = locale.parse(DOC).unwrap();
    let r = locale.document_element(root).unwrap();
    let mut saver = Saver::new(&locale, root, &XmlOptions::default()).unwrap();
    assert!(saver.process(&locale).unwrap());
    let id = locale.alloc_cur(xmlstore::CurClass::Perm);
    locale.move_to(id, r, 0);
    locale.to_first_child(id);
    locale.insert_chars(id, "text");
    assert!(matches!(
        saver.process(&locale),
        Err(Error::ConcurrentModification)
    ));
}
