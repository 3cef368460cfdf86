use webxml_tester::{Harness, LOAD_XML_DOCUMENT_FUNCTION, MockWebConnection};

#[test]
fn utf8_arabic_document_code_points_match_literal_sequence() -> webxml_tester::Result<()> {
    let mut connection = MockWebConnection::new();
    connection.set_response(
        "http://first/arabic.xml",
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><doc>مرحبا</doc>",
        "text/xml;charset=UTF-8",
    );

    let html = format!(
        "<script>{LOAD_XML_DOCUMENT_FUNCTION}{}</script>",
        r#"
    var doc = loadXMLDocument('arabic.xml');
    var text = doc.documentElement.textContent;
    alert(text.length);
    for (var i = 0; i < text.length; i++) {
      alert(text.charCodeAt(i));
    }
    "#
    );

    let harness = Harness::from_html_with_connection("http://first/", &html, connection)?;
    harness.assert_alerts(&["5", "1605", "1585", "1581", "1576", "1575"])?;
    Ok(())
}

#[test]
fn dom_parser_separates_well_formed_from_malformed() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var parser = new DOMParser();
      var good = parser.parseFromString('<doc><a/><b/></doc>', 'text/xml');
      alert(good.documentElement.nodeName);
      alert(good.documentElement.childNodes.length);
      var bad = parser.parseFromString('<doc><a></doc>', 'text/xml');
      alert(bad.documentElement.nodeName);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["doc", "2", "parsererror"])?;
    Ok(())
}

#[test]
fn get_elements_by_tag_name_covers_documents_and_subtrees() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString(
        '<library><shelf><book/><book/></shelf><book/></library>', 'text/xml');
      alert(doc.getElementsByTagName('book').length);
      var shelf = doc.getElementsByTagName('shelf').item(0);
      alert(shelf.getElementsByTagName('book').length);
      alert(doc.getElementsByTagName('*').length);
      alert(doc.getElementsByTagName('missing').length);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["3", "2", "5", "0"])?;
    Ok(())
}

#[test]
fn sibling_and_parent_navigation_follows_document_order() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<r><a/><b/><c/></r>', 'text/xml');
      var root = doc.documentElement;
      alert(root.firstChild.nodeName);
      alert(root.lastChild.nodeName);
      alert(root.firstChild.nextSibling.nodeName);
      alert(root.lastChild.previousSibling.nodeName);
      alert(root.firstChild.parentNode.nodeName);
      alert(root.childNodes.length);
      alert(root.firstChild.nextSibling.nextSibling.nextSibling === null);
      alert(root.ownerDocument.nodeType);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["a", "c", "b", "b", "r", "3", "true", "9"])?;
    Ok(())
}

#[test]
fn clone_node_copies_shallow_or_deep() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<r><kid k="v"><gk/></kid></r>', 'text/xml');
      var kid = doc.getElementsByTagName('kid').item(0);
      var shallow = kid.cloneNode(false);
      alert(shallow.hasChildNodes());
      alert(shallow.getAttribute('k'));
      var deep = kid.cloneNode(true);
      alert(deep.hasChildNodes());
      alert(deep.firstChild.nodeName);
      alert(deep.parentNode === null);
      alert(doc.getElementsByTagName('kid').length);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["false", "v", "true", "gk", "true", "1"])?;
    Ok(())
}

#[test]
fn import_node_copies_across_documents() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var target = new DOMParser().parseFromString('<list/>', 'text/xml');
      var source = new DOMParser().parseFromString('<entry><p>text</p></entry>', 'text/xml');
      var imported = target.importNode(source.documentElement, true);
      target.documentElement.appendChild(imported);
      alert(new XMLSerializer().serializeToString(target));
      alert(source.getElementsByTagName('entry').length);
      try {
        target.documentElement.appendChild(source.documentElement);
        alert('appended');
      } catch (err) {
        alert(err.name);
      }
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&[
        "<list><entry><p>text</p></entry></list>",
        "1",
        "WrongDocumentError",
    ])?;
    Ok(())
}

#[test]
fn attributes_round_trip_through_element_setters() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<tag a="1"/>', 'text/xml');
      var root = doc.documentElement;
      alert(root.getAttribute('a'));
      alert(root.hasAttribute('b'));
      root.setAttribute('b', 'two');
      alert(root.getAttribute('b'));
      alert(root.attributes.length);
      alert(root.attributes.getNamedItem('b').value);
      root.removeAttribute('a');
      alert(root.hasAttribute('a'));
      alert(root.getAttribute('a') === null);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["1", "false", "two", "2", "two", "false", "true"])?;
    Ok(())
}

#[test]
fn text_content_reads_and_replaces_descendants() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<r><a>one</a><b>two</b></r>', 'text/xml');
      alert(doc.documentElement.textContent);
      var a = doc.getElementsByTagName('a').item(0);
      a.textContent = 'uno';
      alert(doc.documentElement.textContent);
      alert(a.childNodes.length);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["onetwo", "unotwo", "1"])?;
    Ok(())
}

#[test]
fn normalize_merges_adjacent_text_nodes() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<r/>', 'text/xml');
      var root = doc.documentElement;
      root.appendChild(doc.createTextNode('a'));
      root.appendChild(doc.createTextNode('b'));
      alert(root.childNodes.length);
      root.normalize();
      alert(root.childNodes.length);
      alert(root.firstChild.nodeValue);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["2", "1", "ab"])?;
    Ok(())
}

#[test]
fn node_types_distinguish_every_kind() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString(
        '<?work keep?><r><!--note--><![CDATA[x<y]]>plain</r>', 'text/xml');
      alert(doc.nodeType);
      alert(doc.childNodes.item(0).nodeType);
      alert(doc.childNodes.item(0).target);
      var root = doc.documentElement;
      alert(root.childNodes.item(0).nodeType);
      alert(root.childNodes.item(1).nodeType);
      alert(root.childNodes.item(1).nodeValue);
      alert(root.childNodes.item(2).nodeType);
      alert(doc.createDocumentFragment().nodeType);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["9", "7", "work", "8", "4", "x<y", "3", "11"])?;
    Ok(())
}

#[test]
fn namespace_aware_lookup_and_creation() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString(
        '<w:root xmlns:w="urn:w"><w:kid/><plain/></w:root>', 'text/xml');
      var root = doc.documentElement;
      alert(root.localName);
      alert(root.prefix);
      alert(root.namespaceURI);
      alert(doc.getElementsByTagNameNS('urn:w', 'kid').length);
      alert(doc.getElementsByTagNameNS('urn:w', '*').length);
      var plain = doc.getElementsByTagName('plain').item(0);
      alert(plain.prefix === null);
      alert(plain.namespaceURI === null);
      var made = doc.createElementNS('urn:v', 'v:item');
      alert(made.namespaceURI);
      alert(made.tagName);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&[
        "root", "w", "urn:w", "1", "2", "true", "true", "urn:v", "v:item",
    ])?;
    Ok(())
}

#[test]
fn insertion_and_removal_keep_sibling_order() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<r><a/><c/></r>', 'text/xml');
      var root = doc.documentElement;
      var b = doc.createElement('b');
      root.insertBefore(b, root.lastChild);
      alert(new XMLSerializer().serializeToString(root));
      var d = doc.createElement('d');
      root.replaceChild(d, root.firstChild);
      alert(new XMLSerializer().serializeToString(root));
      root.removeChild(root.firstChild);
      alert(new XMLSerializer().serializeToString(root));
      try {
        root.removeChild(doc.createElement('stranger'));
      } catch (err) {
        alert(err.name);
      }
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&[
        "<r><a/><b/><c/></r>",
        "<r><d/><b/><c/></r>",
        "<r><b/><c/></r>",
        "NotFoundError",
    ])?;
    Ok(())
}

#[test]
fn invalid_names_raise_invalid_character_errors() -> webxml_tester::Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<r/>', 'text/xml');
      try {
        doc.createElement('a b');
      } catch (err) {
        alert(err.name);
        alert(err.message);
      }
      try {
        doc.documentElement.setAttribute('1bad', 'x');
      } catch (err) {
        alert(err.name);
      }
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&[
        "InvalidCharacterError",
        "'a b' is not a valid XML name",
        "InvalidCharacterError",
    ])?;
    Ok(())
}

#[test]
fn xml_declaration_fields_surface_on_the_document() -> webxml_tester::Result<()> {
    let mut connection = MockWebConnection::new();
    connection.set_response(
        "http://first/decl.xml",
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><doc/>",
        "text/xml",
    );

    let html = format!(
        "<script>{LOAD_XML_DOCUMENT_FUNCTION}{}</script>",
        r#"
    var doc = loadXMLDocument('decl.xml');
    alert(doc.xmlVersion);
    alert(doc.xmlEncoding);
    alert(doc.xmlStandalone);
    var bare = new DOMParser().parseFromString('<doc/>', 'text/xml');
    alert(bare.xmlVersion);
    alert(bare.xmlEncoding === null);
    "#
    );

    let harness = Harness::from_html_with_connection("http://first/", &html, connection)?;
    harness.assert_alerts(&["1.0", "UTF-8", "true", "1.0", "true"])?;
    Ok(())
}
