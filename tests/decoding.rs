use encoding_rs::{BIG5, GBK, WINDOWS_1252};
use webxml_tester::charset::{Cell, DoubleByteDecoder};
use webxml_tester::{Harness, MockWebConnection};

#[test]
fn gbk_single_bytes_agree_with_the_platform_decoder() {
    let decoder = DoubleByteDecoder::derive(GBK).unwrap();
    for b in 0..=255u8 {
        let buf = [b];
        let (platform, _) = GBK.decode_without_bom_handling(&buf);
        let (table, _) = decoder.decode(&buf);
        assert_eq!(table, platform, "byte {b:#04x}");
    }
}

#[test]
fn gbk_pair_space_agrees_outside_the_four_byte_gap() {
    let decoder = DoubleByteDecoder::derive(GBK).unwrap();
    for lead in 0..=255u8 {
        if !decoder.is_lead(lead) {
            continue;
        }
        for trail in 0..=255u8 {
            // Trail bytes 0x30-0x39 open gb18030 four-byte sequences, which
            // a two-byte table cannot follow.
            if (0x30..=0x39).contains(&trail) {
                continue;
            }
            let bytes = [lead, trail];
            let (platform, _) = GBK.decode_without_bom_handling(&bytes);
            let (table, _) = decoder.decode(&bytes);
            assert_eq!(table, platform, "pair {lead:#04x} {trail:#04x}");
        }
    }
}

#[test]
fn big5_tables_agree_with_the_platform_decoder() {
    let decoder = DoubleByteDecoder::derive(BIG5).unwrap();
    for b in 0..=255u8 {
        let buf = [b];
        let (platform, _) = BIG5.decode_without_bom_handling(&buf);
        let (table, _) = decoder.decode(&buf);
        assert_eq!(table, platform, "byte {b:#04x}");
    }
    for lead in 0..=255u8 {
        if !decoder.is_lead(lead) {
            continue;
        }
        for trail in 0..=255u8 {
            let bytes = [lead, trail];
            let (platform, _) = BIG5.decode_without_bom_handling(&bytes);
            let (table, _) = decoder.decode(&bytes);
            assert_eq!(table, platform, "pair {lead:#04x} {trail:#04x}");
        }
    }
}

#[test]
fn independent_derivations_are_field_for_field_identical() {
    let first = DoubleByteDecoder::derive(GBK).unwrap();
    let second = DoubleByteDecoder::derive(GBK).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.trail_range(), second.trail_range());
    assert_eq!(first.replacement(), second.replacement());
    assert_eq!(first.average_chars_per_byte(), second.average_chars_per_byte());
    assert_eq!(first.max_chars_per_byte(), second.max_chars_per_byte());
}

#[test]
fn windows_1252_derives_a_pure_single_byte_table() {
    let decoder = DoubleByteDecoder::derive(WINDOWS_1252).unwrap();
    assert_eq!(decoder.trail_range(), (0, 0));
    assert_eq!(decoder.average_chars_per_byte(), 1.0);
    for b in 0..=255u8 {
        assert!(!decoder.is_lead(b), "byte {b:#04x} should not lead");
        let buf = [b];
        let (platform, _) = WINDOWS_1252.decode_without_bom_handling(&buf);
        let (table, _) = decoder.decode(&buf);
        assert_eq!(table, platform, "byte {b:#04x}");
    }
}

#[test]
fn double_byte_metadata_matches_the_codepage_shape() {
    let gbk = DoubleByteDecoder::derive(GBK).unwrap();
    assert_eq!(gbk.name(), "GBK");
    assert_eq!(gbk.trail_range(), (0x40, 0xFE));
    assert_eq!(gbk.replacement(), '\u{FFFD}');
    assert_eq!(gbk.average_chars_per_byte(), 0.5);
    assert_eq!(gbk.max_chars_per_byte(), 1.0);

    let big5 = DoubleByteDecoder::derive(BIG5).unwrap();
    assert_eq!(big5.name(), "Big5");
    assert_eq!(big5.trail_range(), (0x40, 0xFE));
}

#[test]
fn known_code_points_decode_through_the_tables() {
    let gbk = DoubleByteDecoder::derive(GBK).unwrap();
    assert_eq!(gbk.lookup_pair(0xBA, 0xBA), Cell::One('汉'));
    let (text, first_error) = gbk.decode(&[0xBA, 0xBA, 0xD7, 0xD6]);
    assert_eq!(text, "汉字");
    assert_eq!(first_error, None);

    let big5 = DoubleByteDecoder::derive(BIG5).unwrap();
    let (text, first_error) = big5.decode(&[0xA4, 0xA4, 0xA4, 0xE5]);
    assert_eq!(text, "中文");
    assert_eq!(first_error, None);
}

#[test]
fn decode_reports_the_first_malformed_offset() {
    let gbk = DoubleByteDecoder::derive(GBK).unwrap();

    let (text, first_error) = gbk.decode(b"ok");
    assert_eq!(text, "ok");
    assert_eq!(first_error, None);

    let (_, first_error) = gbk.decode(&[b'o', b'k', 0x81]);
    assert_eq!(first_error, Some(2));

    let (text, first_error) = gbk.decode(&[0x81, 0x20, b'x']);
    assert_eq!(text, "\u{FFFD} x");
    assert_eq!(first_error, Some(0));
}

#[test]
fn gbk_response_bodies_decode_through_the_charset_label() -> webxml_tester::Result<()> {
    let mut connection = MockWebConnection::new();
    connection.set_response_bytes(
        "http://first/cn.txt",
        &[0xBA, 0xBA, 0xD7, 0xD6],
        "text/plain; charset=GBK",
    );

    let html = r#"
    <script>
      var request = new XMLHttpRequest();
      request.open('GET', 'cn.txt', false);
      request.send('');
      alert(request.responseText);
      alert(request.responseText.length);
    </script>
    "#;

    let harness = Harness::from_html_with_connection("http://first/", html, connection)?;
    harness.assert_alerts(&["汉字", "2"])?;
    Ok(())
}

#[test]
fn byte_order_marks_override_the_transport_charset() -> webxml_tester::Result<()> {
    let mut body = vec![0xEF, 0xBB, 0xBF];
    body.extend_from_slice("héllo".as_bytes());

    let mut connection = MockWebConnection::new();
    connection.set_response_bytes(
        "http://first/bom.txt",
        &body,
        "text/plain; charset=windows-1252",
    );

    let html = r#"
    <script>
      var request = new XMLHttpRequest();
      request.open('GET', 'bom.txt', false);
      request.send('');
      alert(request.responseText);
    </script>
    "#;

    let harness = Harness::from_html_with_connection("http://first/", html, connection)?;
    harness.assert_alerts(&["héllo"])?;
    Ok(())
}

#[test]
fn xml_declaration_labels_decode_non_utf8_documents() -> webxml_tester::Result<()> {
    let mut body = Vec::new();
    let (encoded, _, _) = WINDOWS_1252.encode("<?xml version=\"1.0\" encoding=\"windows-1252\"?><w>café</w>");
    body.extend_from_slice(&encoded);

    let mut connection = MockWebConnection::new();
    connection.set_response_bytes("http://first/w.xml", &body, "text/xml");

    let html = r#"
    <script>
      var request = new XMLHttpRequest();
      request.open('GET', 'w.xml', false);
      request.send('');
      alert(request.responseXML.documentElement.textContent);
    </script>
    "#;

    let harness = Harness::from_html_with_connection("http://first/", html, connection)?;
    harness.assert_alerts(&["café"])?;
    Ok(())
}
