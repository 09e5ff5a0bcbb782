use xmlstore::{
    CurClass, Error, Locale, QName, TokenKind, UnsyncDocument, XmlOptions, END_POS,
};

fn save(locale: &Locale, node: xmlstore::Node) -> String {
    locale.save_to_string(node, &XmlOptions::default()).unwrap()
}

#[test]
fn test_cursor_inside_moved_node_moves_along() {
    let mut locale = Locale::new();
    let root = locale.parse("<r><a>xy<b/></a><c/></r>").unwrap();
    let r = locale.document_element(root).unwrap();
    let mut children = locale.content_children(r);
    let a = children.next().unwrap();
    let c = children.next().unwrap();
    drop(children);

    let inside = locale.alloc_cur(CurClass::Perm);
    locale.move_to(inside, a, 2);
    assert_eq!(locale.chars_right(inside, 1), "y");

    let to = locale.alloc_cur(CurClass::Perm);
    locale.move_to(to, c, END_POS);
    locale.move_node(a, to).unwrap();

    assert_eq!(save(&locale, root), "<r><c><a>xy<b/></a></c></r>");
    assert_eq!(locale.cur_pos(inside), (a, 2));
    assert_eq!(locale.chars_right(inside, 1), "y");
}

#[test]
fn test_cursors_in_removed_text_collapse() {
    let mut locale = Locale::new();
    let root = locale.parse("<r>abcdef</r>").unwrap();
    let r = locale.document_element(root).unwrap();
    let at = locale.alloc_cur(CurClass::Perm);
    locale.move_to(at, r, 2);
    let inside = locale.alloc_cur(CurClass::Perm);
    locale.move_to(inside, r, 4);
    let after = locale.alloc_cur(CurClass::Perm);
    locale.move_to(after, r, 6);

    assert_eq!(locale.remove_chars(at, 3), 3);
    assert_eq!(locale.value_text(r), "aef");
    assert_eq!(locale.chars_right(inside, 10), "ef");
    assert_eq!(locale.chars_right(after, 10), "f");
}

#[test]
fn test_temp_frame_releases_its_cursors() {
    let mut locale = Locale::new();
    let root = locale.parse("<r/>").unwrap();
    let before = locale.live_cursor_count();
    let kept = locale.scope(|locale| {
        let a = locale.temp_cur();
        locale.move_to(a, root, 0);
        let kept = locale.perm_cur_at(a);
        locale.temp_cur();
        assert_eq!(locale.live_cursor_count(), before + 3);
        kept
    });
    assert_eq!(locale.live_cursor_count(), before + 1);
    assert!(locale.is_live(kept));
    locale.release_cur(kept);
    assert!(!locale.is_live(kept));
    assert_eq!(locale.live_cursor_count(), before);
}

#[test]
fn test_versions_are_monotonic() {
    let mut locale = Locale::new();
    let root = locale.parse("<r>text</r>").unwrap();
    let r = locale.document_element(root).unwrap();
    let id = locale.alloc_cur(CurClass::Perm);
    locale.move_to(id, r, 1);

    let (all, sans_text) = (locale.version_all(), locale.version_sans_text());
    locale.insert_chars(id, "more ");
    assert!(locale.version_all() > all);
    assert_eq!(locale.version_sans_text(), sans_text);

    let (all, sans_text) = (locale.version_all(), locale.version_sans_text());
    let b = locale.create_element(&QName::new("b")).unwrap();
    locale.insert_node(b, id).unwrap();
    assert!(locale.version_all() > all);
    assert!(locale.version_sans_text() > sans_text);
}

#[test]
fn test_attribute_order_is_kept() {
    let doc = UnsyncDocument::parse(r#"<r z="1" a="2" m="3"/>"#).unwrap();
    let mut cursor = doc.cursor();
    cursor.to_first_child().unwrap();
    cursor.set_attribute_text(&QName::new("a"), "two").unwrap();
    cursor.set_attribute_text(&QName::new("b"), "4").unwrap();
    let mut names = Vec::new();
    let mut more = cursor.to_first_attribute().unwrap();
    while more {
        names.push(cursor.name().unwrap().unwrap().local_name().to_string());
        more = cursor.to_next_attribute().unwrap();
    }
    assert_eq!(names, vec!["z", "a", "m", "b"]);
    assert_eq!(
        doc.xml_text(&XmlOptions::default()).unwrap(),
        r#"<r z="1" a="two" m="3" b="4"/>"#
    );
}

#[test]
fn test_other_cursors_survive_edits() {
    let doc = UnsyncDocument::parse("<r><a/><b/></r>").unwrap();
    let mut editor = doc.cursor();
    editor.to_first_child().unwrap();
    editor.to_first_child().unwrap();
    let mut watcher = editor.new_cursor().unwrap();
    assert!(watcher.to_next_sibling().unwrap());
    assert_eq!(watcher.name().unwrap(), Some(QName::new("b")));

    editor.insert_element(&QName::new("new")).unwrap();
    editor.insert_chars("text").unwrap();
    editor.remove_xml().unwrap();

    assert_eq!(watcher.name().unwrap(), Some(QName::new("b")));
    assert_eq!(
        doc.xml_text(&XmlOptions::default()).unwrap(),
        "<r><new/>text<b/></r>"
    );
    assert!(watcher.to_prev_sibling().unwrap());
    assert_eq!(watcher.name().unwrap(), Some(QName::new("new")));
}

#[test]
fn test_walk_all_tokens() {
    let doc = UnsyncDocument::parse(r#"<r a="1">x<!--c--><?p d?><e/></r>"#).unwrap();
    let mut cursor = doc.cursor();
    let mut kinds = vec![cursor.token_type().unwrap()];
    while let Some(kind) = cursor.to_next_token().unwrap() {
        kinds.push(kind);
    }
    assert_eq!(
        kinds,
        vec![
            TokenKind::StartDoc,
            TokenKind::Start,
            TokenKind::Attr,
            TokenKind::Text,
            TokenKind::Comment,
            TokenKind::Procinst,
            TokenKind::Start,
            TokenKind::End,
            TokenKind::End,
            TokenKind::EndDoc,
        ]
    );
    let mut back = 0;
    while cursor.to_prev_token().unwrap().is_some() {
        back += 1;
    }
    assert_eq!(back, kinds.len() - 1);
    assert!(cursor.is_start_doc().unwrap());
}

#[test]
fn test_disposed_cursor_fails() {
    let doc = UnsyncDocument::parse("<r/>").unwrap();
    let mut cursor = doc.cursor();
    let other = cursor.new_cursor().unwrap();
    cursor.dispose();
    assert!(matches!(cursor.token_type(), Err(Error::DisposedCursor)));
    assert!(matches!(cursor.move_xml(&other), Err(Error::DisposedCursor)));
    assert!(other.is_start_doc().unwrap());
}
