use webxml_tester::{Harness, MockWebConnection, SERIALIZE_DOCUMENT_FUNCTION};

#[test]
fn serializer_round_trips_nested_markup() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var source = '<shelf kind="fiction"><book id="1">Dune</book><book id="2"/></shelf>';
      var doc = new DOMParser().parseFromString(source, 'text/xml');
      alert(new XMLSerializer().serializeToString(doc) === source);
      alert(new XMLSerializer().serializeToString(doc));
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&[
        "true",
        "<shelf kind=\"fiction\"><book id=\"1\">Dune</book><book id=\"2\"/></shelf>",
    ])?;
    Ok(())
}

#[test]
fn serializer_escapes_text_and_attribute_values() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<note/>', 'text/xml');
      var root = doc.documentElement;
      root.setAttribute('title', 'a<b & "c"');
      root.appendChild(doc.createTextNode('x < y & z'));
      alert(new XMLSerializer().serializeToString(root));
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["<note title=\"a&lt;b &amp; &quot;c&quot;\">x &lt; y &amp; z</note>"])?;
    Ok(())
}

#[test]
fn empty_elements_serialize_self_closed() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<r><gap></gap><t>x</t></r>', 'text/xml');
      alert(new XMLSerializer().serializeToString(doc));
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["<r><gap/><t>x</t></r>"])?;
    Ok(())
}

#[test]
fn cdata_comments_and_instructions_pass_through() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var source = '<?pi data here?><r><![CDATA[a < b]]><!-- note --></r>';
      var doc = new DOMParser().parseFromString(source, 'text/xml');
      alert(new XMLSerializer().serializeToString(doc) === source);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["true"])?;
    Ok(())
}

#[test]
fn namespace_declarations_and_prefixes_survive() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var source = '<a:r xmlns:a="urn:x" a:k="v"><a:c/></a:r>';
      var doc = new DOMParser().parseFromString(source, 'text/xml');
      alert(new XMLSerializer().serializeToString(doc) === source);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["true"])?;
    Ok(())
}

#[test]
fn subtree_serialization_stops_at_the_chosen_node() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<r><keep><in/></keep><drop/></r>', 'text/xml');
      var keep = doc.getElementsByTagName('keep').item(0);
      alert(new XMLSerializer().serializeToString(keep));
      alert(new XMLSerializer().serializeToString(keep.firstChild));
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["<keep><in/></keep>", "<in/>"])?;
    Ok(())
}

#[test]
fn parsed_entities_reencode_only_where_needed() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<m>&amp;&lt;&gt;&quot;</m>', 'text/xml');
      alert(doc.documentElement.textContent);
      alert(new XMLSerializer().serializeToString(doc));
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["&<>\"", "<m>&amp;&lt;&gt;\"</m>"])?;
    Ok(())
}

#[test]
fn built_documents_serialize_from_created_nodes() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<catalog/>', 'text/xml');
      var root = doc.documentElement;
      var entry = doc.createElement('entry');
      entry.setAttribute('lang', 'ar');
      entry.appendChild(doc.createTextNode('مرحبا'));
      root.appendChild(entry);
      root.appendChild(doc.createComment('end'));
      alert(new XMLSerializer().serializeToString(doc));
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["<catalog><entry lang=\"ar\">مرحبا</entry><!--end--></catalog>"])?;
    Ok(())
}

#[test]
fn serialize_helper_snippet_matches_the_direct_call() -> webxml_tester::Result<()> {
    let mut connection = MockWebConnection::new();
    connection.set_response("http://first/doc.xml", "<top><leaf n=\"1\"/></top>", "text/xml");

    let html = format!(
        "<script>{SERIALIZE_DOCUMENT_FUNCTION}{}</script>",
        r#"
    var request = new XMLHttpRequest();
    request.open('GET', 'doc.xml', false);
    request.send('');
    var doc = request.responseXML;
    alert(serializeXMLDocumentToString(doc));
    alert(serializeXMLDocumentToString(doc) === new XMLSerializer().serializeToString(doc));
    "#
    );

    let harness = Harness::from_html_with_connection("http://first/", &html, connection)?;
    harness.assert_alerts(&["<top><leaf n=\"1\"/></top>", "true"])?;
    Ok(())
}
