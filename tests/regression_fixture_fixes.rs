use webxml_tester::{Harness, Result};

#[test]
fn regex_character_classes_allow_quotes() -> Result<()> {
    let html = r#"
    <script>
      alert('<a&b>'.replace(/[&<>"']/g, '_'));
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["_a_b_"])?;
    Ok(())
}

#[test]
fn regex_literals_parse_after_prefix_operators() -> Result<()> {
    let html = r#"
    <script>
      var value = '42';
      if (!/^[0-9]+$/.test(value)) {
        alert('no');
      } else {
        alert('yes');
      }
      alert(!/^[a-z]+$/.test(value));
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["yes", "true"])?;
    Ok(())
}

#[test]
fn division_disambiguates_from_regex_after_calls() -> Result<()> {
    let html = r#"
    <script>
      function half(n) { return n / 2; }
      alert(half(8) / 2);
      var ratio = half(12) / half(4);
      alert(ratio);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["2", "3"])?;
    Ok(())
}

#[test]
fn regex_literals_parse_in_parenthesized_positions() -> Result<()> {
    let html = r#"
    <script>
      alert((/\d/).test('a1'));
      var found = 'x7y'.match(/[0-9]/);
      alert(found[0]);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["true", "7"])?;
    Ok(())
}

#[test]
fn surrogate_pairs_occupy_two_units() -> Result<()> {
    let html = r#"
    <script>
      var clef = '𝄞';
      alert(clef.length);
      alert(clef.charCodeAt(0));
      alert(clef.charCodeAt(1));
      alert(('ab' + clef).length);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["2", "55348", "56606", "4"])?;
    Ok(())
}

#[test]
fn cdata_sections_preserve_markup_characters() -> Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<r>a<![CDATA[ < b & ]]>c</r>', 'text/xml');
      var root = doc.documentElement;
      alert(root.childNodes.length);
      alert(root.childNodes[1].nodeType);
      alert(root.textContent);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["3", "4", "a < b & c"])?;
    Ok(())
}

#[test]
fn malformed_xml_yields_a_parsererror_document() -> Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<broken', 'text/xml');
      alert(doc.nodeType);
      alert(doc.documentElement.tagName);
      alert(doc.getElementsByTagName('parsererror').length);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["9", "parsererror", "1"])?;
    Ok(())
}

#[test]
fn dom_exception_names_follow_the_standard() -> Result<()> {
    let html = r#"
    <script>
      var doc = new DOMParser().parseFromString('<a><b/></a>', 'text/xml');
      var root = doc.documentElement;
      var inner = root.firstChild;
      try {
        inner.appendChild(root);
      } catch (err) {
        alert(err.name);
      }
      try {
        root.removeChild(doc.createElement('c'));
      } catch (err) {
        alert(err.name);
      }
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["HierarchyRequestError", "NotFoundError"])?;
    Ok(())
}

#[test]
fn for_in_walks_keys_and_for_of_walks_items() -> Result<()> {
    let html = r#"
    <script>
      var obj = { one: 1, two: 2 };
      var keys = '';
      for (var k in obj) {
        keys += k + ';';
      }
      alert(keys);

      var arr = [3, 4, 5];
      var sum = 0;
      for (var item of arr) {
        sum += item;
      }
      alert(sum);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["one;two;", "12"])?;
    Ok(())
}

#[test]
fn do_while_bodies_execute_at_least_once() -> Result<()> {
    let html = r#"
    <script>
      var count = 0;
      do {
        count = count + 1;
      } while (count < 0);
      alert(count);

      var text = '';
      do {
        text += 'x';
      } while (text.length < 3);
      alert(text);
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["1", "xxx"])?;
    Ok(())
}

#[test]
fn numeric_and_string_conversions_keep_edge_cases() -> Result<()> {
    let html = r#"
    <script>
      alert('a1b2c'.split(/[0-9]/).join('-'));
      alert((255).toString(16));
      alert((3.7).toFixed(0));
      alert(parseInt('42px'));
      alert(parseFloat('3.5rem'));
    </script>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["a-b-c", "ff", "4", "42", "3.5"])?;
    Ok(())
}

#[test]
fn body_onload_calls_into_earlier_script_scopes() -> Result<()> {
    let html = r#"
    <html>
      <head>
        <title>Fixture</title>
        <script>
          function announce() { alert('ready ' + document.title); }
        </script>
      </head>
      <body onload="announce()"></body>
    </html>
    "#;

    let harness = Harness::from_html(html)?;
    harness.assert_alerts(&["ready Fixture"])?;
    Ok(())
}
