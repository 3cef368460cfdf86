use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};

use crate::{Error, Result};

pub fn for_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

pub fn sniff_bom(bytes: &[u8]) -> Option<(&'static Encoding, usize)> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some((UTF_8, 3));
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Some((UTF_16BE, 2));
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Some((UTF_16LE, 2));
    }
    None
}

// ASCII prescan of `<?xml version="..." encoding="..."?>`. Only the first
// 1024 bytes are considered and the value must be a plain label with no
// embedded whitespace, otherwise the declaration is ignored.
pub fn sniff_xml_declaration(bytes: &[u8]) -> Option<&'static Encoding> {
    let window = &bytes[..bytes.len().min(1024)];
    if !window.starts_with(b"<?xml") {
        return None;
    }
    match window.get(5) {
        Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {}
        _ => return None,
    }
    let close = find_subslice(window, 0, b"?>")?;
    let declaration = &window[..close];

    let mut i = find_subslice(declaration, 0, b"encoding")? + b"encoding".len();
    while declaration.get(i).copied().is_some_and(|b| b.is_ascii_whitespace()) {
        i += 1;
    }
    if declaration.get(i) != Some(&b'=') {
        return None;
    }
    i += 1;
    while declaration.get(i).copied().is_some_and(|b| b.is_ascii_whitespace()) {
        i += 1;
    }
    let quote = match declaration.get(i) {
        Some(&b) if b == b'"' || b == b'\'' => b,
        _ => return None,
    };
    i += 1;
    let start = i;
    while let Some(&b) = declaration.get(i) {
        if b == quote {
            let label = &declaration[start..i];
            if label.is_empty() || label.iter().any(|b| b.is_ascii_whitespace()) {
                return None;
            }
            return Encoding::for_label(label);
        }
        i += 1;
    }
    None
}

pub fn charset_from_content_type(value: &str) -> Option<String> {
    for part in value.split(';').skip(1) {
        let part = part.trim();
        if let Some(raw) = part
            .strip_prefix("charset=")
            .or_else(|| part.strip_prefix("CHARSET="))
            .or_else(|| strip_prefix_ignore_case(part, "charset="))
        {
            let cleaned = raw.trim().trim_matches('"').trim_matches('\'');
            if !cleaned.is_empty() {
                return Some(cleaned.to_string());
            }
        }
    }
    None
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

// Response bodies: BOM wins, then the declared label, then UTF-8.
pub(crate) fn decode_body(bytes: &[u8], declared: Option<&str>) -> (String, &'static Encoding) {
    if let Some((encoding, _)) = sniff_bom(bytes) {
        let (text, _) = encoding.decode_with_bom_removal(bytes);
        return (text.into_owned(), encoding);
    }
    let encoding = declared.and_then(for_label).unwrap_or(UTF_8);
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    (text.into_owned(), encoding)
}

// XML entity bytes: BOM, then transport charset, then the xml declaration.
pub(crate) fn decode_xml_bytes(
    bytes: &[u8],
    transport_charset: Option<&str>,
) -> (String, &'static Encoding) {
    if let Some((encoding, _)) = sniff_bom(bytes) {
        let (text, _) = encoding.decode_with_bom_removal(bytes);
        return (text.into_owned(), encoding);
    }
    let encoding = transport_charset
        .and_then(for_label)
        .or_else(|| sniff_xml_declaration(bytes))
        .unwrap_or(UTF_8);
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    (text.into_owned(), encoding)
}

pub(crate) fn find_subslice(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}

const UNSUPPORTED_DERIVE: &[&str] = &[
    "UTF-8",
    "UTF-16LE",
    "UTF-16BE",
    "ISO-2022-JP",
    "EUC-JP",
    "replacement",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    One(char),
    Two(char, char),
}

impl Cell {
    fn push_onto(&self, out: &mut String) -> bool {
        match self {
            Self::Empty => false,
            Self::One(a) => {
                out.push(*a);
                true
            }
            Self::Two(a, b) => {
                out.push(*a);
                out.push(*b);
                true
            }
        }
    }
}

// Flat single-byte and per-lead double-byte tables for one encoding,
// derived by probing the platform decoder over the whole byte space.
// Unlike the streaming platform API, `decode` reports where the first
// malformed sequence sits, which the XML layer wants for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleByteDecoder {
    name: &'static str,
    b2_min: u8,
    b2_max: u8,
    single: Vec<Option<char>>,
    double: Vec<Vec<Cell>>,
    replacement: char,
    average_chars_per_byte: f32,
    max_chars_per_byte: f32,
}

impl DoubleByteDecoder {
    pub fn derive(encoding: &'static Encoding) -> Result<Self> {
        let name = encoding.name();
        if UNSUPPORTED_DERIVE.contains(&name) {
            return Err(Error::Decode(format!(
                "{name} is not a single- or double-byte encoding"
            )));
        }

        let mut single: Vec<Option<char>> = vec![None; 256];
        let mut lead_candidates = Vec::new();
        for b in 0..=255u8 {
            let buf = [b];
            let (text, had_errors) = encoding.decode_without_bom_handling(&buf);
            if had_errors {
                lead_candidates.push(b);
                continue;
            }
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => single[b as usize] = Some(ch),
                _ => {
                    return Err(Error::Decode(format!(
                        "{name}: unexpected multi-char single-byte mapping for {b:#04x}"
                    )));
                }
            }
        }

        let mut pairs: Vec<(u8, Vec<(u8, Cell)>)> = Vec::new();
        let mut b2_min = 0xFFu8;
        let mut b2_max = 0x00u8;
        for &lead in &lead_candidates {
            let mut cells = Vec::new();
            for t in 0..=255u8 {
                let buf = [lead, t];
                let (text, had_errors) = encoding.decode_without_bom_handling(&buf);
                if had_errors {
                    continue;
                }
                let mut chars = text.chars();
                let cell = match (chars.next(), chars.next(), chars.next()) {
                    (Some(a), None, _) => Cell::One(a),
                    (Some(a), Some(b), None) => Cell::Two(a, b),
                    _ => {
                        return Err(Error::Decode(format!(
                            "{name}: pair {lead:#04x} {t:#04x} expands past two chars"
                        )));
                    }
                };
                b2_min = b2_min.min(t);
                b2_max = b2_max.max(t);
                cells.push((t, cell));
            }
            if !cells.is_empty() {
                pairs.push((lead, cells));
            }
        }

        let has_leads = !pairs.is_empty();
        if !has_leads {
            b2_min = 0;
            b2_max = 0;
        }

        let width = if has_leads {
            b2_max as usize - b2_min as usize + 1
        } else {
            0
        };
        let mut double: Vec<Vec<Cell>> = vec![Vec::new(); 256];
        for (lead, cells) in pairs {
            let row = &mut double[lead as usize];
            row.resize(width, Cell::Empty);
            for (t, cell) in cells {
                row[(t - b2_min) as usize] = cell;
            }
        }

        Ok(Self {
            name,
            b2_min,
            b2_max,
            single,
            double,
            replacement: '\u{FFFD}',
            average_chars_per_byte: if has_leads { 0.5 } else { 1.0 },
            max_chars_per_byte: 1.0,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn trail_range(&self) -> (u8, u8) {
        (self.b2_min, self.b2_max)
    }

    pub fn replacement(&self) -> char {
        self.replacement
    }

    pub fn average_chars_per_byte(&self) -> f32 {
        self.average_chars_per_byte
    }

    pub fn max_chars_per_byte(&self) -> f32 {
        self.max_chars_per_byte
    }

    pub fn is_lead(&self, byte: u8) -> bool {
        !self.double[byte as usize].is_empty()
    }

    pub fn lookup_single(&self, byte: u8) -> Option<char> {
        self.single[byte as usize]
    }

    pub fn lookup_pair(&self, lead: u8, trail: u8) -> Cell {
        let row = &self.double[lead as usize];
        if row.is_empty() || trail < self.b2_min || trail > self.b2_max {
            return Cell::Empty;
        }
        row[(trail - self.b2_min) as usize]
    }

    // Whole-buffer decode with WHATWG resync: a malformed pair emits one
    // replacement and reprocesses an ASCII trail byte. Returns the byte
    // offset of the first malformed sequence, if any.
    pub fn decode(&self, bytes: &[u8]) -> (String, Option<usize>) {
        let mut out = String::with_capacity(bytes.len());
        let mut first_error = None;
        let mut i = 0usize;

        while i < bytes.len() {
            let b = bytes[i];
            if self.is_lead(b) {
                let Some(&trail) = bytes.get(i + 1) else {
                    out.push(self.replacement);
                    first_error.get_or_insert(i);
                    i += 1;
                    continue;
                };
                if self.lookup_pair(b, trail).push_onto(&mut out) {
                    i += 2;
                    continue;
                }
                out.push(self.replacement);
                first_error.get_or_insert(i);
                i += 1;
                if !trail.is_ascii() {
                    i += 1;
                }
                continue;
            }
            if let Some(ch) = self.single[b as usize] {
                out.push(ch);
                i += 1;
                continue;
            }
            out.push(self.replacement);
            first_error.get_or_insert(i);
            i += 1;
        }

        (out, first_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bom_sniffing_orders_utf8_before_utf16() {
        assert_eq!(sniff_bom(&[0xEF, 0xBB, 0xBF, b'<']), Some((UTF_8, 3)));
        assert_eq!(sniff_bom(&[0xFE, 0xFF, 0x00, 0x3C]), Some((UTF_16BE, 2)));
        assert_eq!(sniff_bom(&[0xFF, 0xFE, 0x3C, 0x00]), Some((UTF_16LE, 2)));
        assert_eq!(sniff_bom(b"<?xml"), None);
    }

    #[test]
    fn xml_declaration_prescan_accepts_plain_labels_only() {
        assert_eq!(
            sniff_xml_declaration(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><r/>"),
            Some(UTF_8)
        );
        assert_eq!(
            sniff_xml_declaration(b"<?xml encoding='windows-1252'?>"),
            Some(encoding_rs::WINDOWS_1252)
        );
        assert_eq!(
            sniff_xml_declaration(b"<?xml encoding = \"UTF-8\" ?>"),
            Some(UTF_8)
        );
        assert_eq!(sniff_xml_declaration(b"<?xmX encoding='UTF-8'?>"), None);
        assert_eq!(sniff_xml_declaration(b"<?xml?> encoding='UTF-8'"), None);
        assert_eq!(sniff_xml_declaration(b"<?xml encoding=' UTF-8'?>"), None);
        assert_eq!(sniff_xml_declaration(b"<?xml encoding=UTF-8?>"), None);
        assert_eq!(sniff_xml_declaration(b"<?xml encoding=''?>"), None);
    }

    #[test]
    fn content_type_charset_extraction() {
        assert_eq!(
            charset_from_content_type("text/xml; charset=ISO-8859-1"),
            Some("ISO-8859-1".to_string())
        );
        assert_eq!(
            charset_from_content_type("text/html;CHARSET=\"utf-8\""),
            Some("utf-8".to_string())
        );
        assert_eq!(charset_from_content_type("text/xml"), None);
        assert_eq!(charset_from_content_type("text/xml; charset="), None);
    }

    #[test]
    fn body_decoding_prefers_bom_over_declared_label() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("héllo".as_bytes());
        let (text, encoding) = decode_body(&bytes, Some("windows-1252"));
        assert_eq!(text, "héllo");
        assert_eq!(encoding, UTF_8);
    }

    #[test]
    fn derive_rejects_variable_width_encodings() {
        assert!(DoubleByteDecoder::derive(UTF_8).is_err());
        assert!(DoubleByteDecoder::derive(encoding_rs::EUC_JP).is_err());
    }

    #[test]
    fn single_byte_table_decodes_windows_1252() {
        let decoder = DoubleByteDecoder::derive(encoding_rs::WINDOWS_1252).unwrap();
        assert_eq!(decoder.lookup_single(b'A'), Some('A'));
        assert_eq!(decoder.lookup_single(0x80), Some('\u{20AC}'));
        assert!(!decoder.is_lead(0x80));
        let (text, first_error) = decoder.decode(&[b'a', 0xE9, b'b']);
        assert_eq!(text, "aéb");
        assert_eq!(first_error, None);
    }

    #[test]
    fn truncated_lead_reports_error_offset() {
        let decoder = DoubleByteDecoder::derive(encoding_rs::GBK).unwrap();
        let (text, first_error) = decoder.decode(&[b'a', 0x81]);
        assert_eq!(text, "a\u{FFFD}");
        assert_eq!(first_error, Some(1));
    }
}
