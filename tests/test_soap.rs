use rstest::rstest;
use xmlstore::{
    Locale, QName, SoapKind, SoapVersion, UnsyncDocument, XmlOptions, SOAP11_NAMESPACE,
    SOAP12_NAMESPACE,
};

fn fault_envelope(version: SoapVersion) -> String {
    let detail = match version {
        SoapVersion::V1_1 => "<detail><e:info xmlns:e=\"urn:e\"/></detail>",
        SoapVersion::V1_2 => "<s:Detail><e:info xmlns:e=\"urn:e\"/></s:Detail>",
    };
    format!(
        r#"<s:Envelope xmlns:s="{}"><s:Body><s:Fault>{}</s:Fault></s:Body></s:Envelope>"#,
        version.namespace(),
        detail
    )
}

#[rstest]
#[case(SoapVersion::V1_1)]
#[case(SoapVersion::V1_2)]
fn test_fault_detail_entries(#[case] version: SoapVersion) {
    let mut locale = Locale::new();
    let root = locale.parse(&fault_envelope(version)).unwrap();
    assert_eq!(locale.soap_version(root), Some(version));
    let fault = locale.soap_fault(root).unwrap();
    assert_eq!(locale.soap_kind(fault), Some(SoapKind::Fault));
    let detail = locale.soap_detail(root).unwrap();
    assert_eq!(locale.soap_kind(detail), Some(SoapKind::Detail));
    let info = locale.content_children(detail).next().unwrap();
    assert_eq!(locale.soap_kind(info), Some(SoapKind::DetailEntry));
}

#[test]
fn test_wrong_detail_namespace_is_plain() {
    // SOAP 1.1 wants the detail in no namespace
    let mut locale = Locale::new();
    let root = locale
        .parse(&format!(
            r#"<s:Envelope xmlns:s="{}"><s:Body><s:Fault><s:detail/></s:Fault></s:Body></s:Envelope>"#,
            SOAP11_NAMESPACE
        ))
        .unwrap();
    assert_eq!(locale.soap_detail(root), None);
}

#[test]
fn test_envelope_built_with_cursor() {
    let doc = UnsyncDocument::new();
    let mut cursor = doc.cursor();
    cursor.to_end_token().unwrap();
    let soap = |local: &str| QName::with_prefix(SOAP12_NAMESPACE, local, "env");
    cursor.begin_element(&soap("Envelope")).unwrap();
    cursor.begin_element(&soap("Header")).unwrap();
    cursor
        .insert_element(&QName::with_namespace("urn:t", "trace"))
        .unwrap();
    cursor.to_next_token().unwrap();
    cursor.begin_element(&soap("Body")).unwrap();
    cursor
        .insert_element_with_text(&QName::with_prefix("urn:m", "get", "m"), "42")
        .unwrap();

    let xml = doc.xml_text(&XmlOptions::default()).unwrap();
    assert_eq!(
        xml,
        concat!(
            r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">"#,
            r#"<env:Header><trace xmlns="urn:t"/></env:Header>"#,
            r#"<env:Body><m:get xmlns:m="urn:m">42</m:get></env:Body>"#,
            r#"</env:Envelope>"#
        )
    );

    doc.with(|locale| {
        let root = doc.root();
        assert_eq!(locale.soap_version(root), Some(SoapVersion::V1_2));
        let headers = locale.soap_header_elements(root);
        assert_eq!(headers.len(), 1);
        assert_eq!(locale.soap_kind(headers[0]), Some(SoapKind::HeaderElement));
        let body = locale.soap_body_elements(root);
        assert_eq!(body.len(), 1);
        assert_eq!(locale.text_value(body[0]), "42");
    });
}

#[test]
fn test_renaming_changes_flavor() {
    let doc = UnsyncDocument::parse(&format!(
        r#"<s:Envelope xmlns:s="{}"><s:Body><x/></s:Body></s:Envelope>"#,
        SOAP11_NAMESPACE
    ))
    .unwrap();
    let mut cursor = doc.cursor();
    cursor.to_first_child().unwrap();
    cursor.to_first_child().unwrap();
    cursor
        .set_name(&QName::with_namespace("urn:elsewhere", "Body"))
        .unwrap();
    let root = doc.root();
    doc.with(|locale| {
        assert_eq!(locale.soap_body(root), None);
        assert!(locale.soap_body_elements(root).is_empty());
    });
}
