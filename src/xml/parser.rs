use std::collections::HashMap;

use crate::{Error, Result};

use super::{DOCUMENT_ROOT, XmlDocument, XmlNodeId};

pub const PARSER_ERROR_NAMESPACE: &str = "http://www.mozilla.org/newlayout/xml/parsererror.xml";
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

const PARSE_STACK_RED_ZONE: usize = 64 * 1024;
const PARSE_STACK_SIZE: usize = 32 * 1024 * 1024;

pub fn parse_document(input: &str) -> Result<XmlDocument> {
    let mut parser = Parser {
        cur: Cursor {
            bytes: input.as_bytes(),
            pos: 0,
        },
        doc: XmlDocument::new(),
        seen_doctype: false,
    };
    parser.parse()?;
    Ok(parser.doc)
}

// Browsers surface malformed XML as a document whose root reports the
// failure instead of throwing from `parseFromString`.
pub fn parse_error_document(message: &str) -> XmlDocument {
    let mut doc = XmlDocument::new();
    let root = doc.create_element_ns(Some(PARSER_ERROR_NAMESPACE), "parsererror");
    doc.set_attribute_ns(
        root,
        Some("http://www.w3.org/2000/xmlns/"),
        "xmlns",
        PARSER_ERROR_NAMESPACE,
    );
    let text = doc.create_text(message);
    let _ = doc.append_child(root, text);
    let _ = doc.append_child(DOCUMENT_ROOT, root);
    doc
}

#[derive(Clone, Default)]
struct NamespaceScope {
    default: Option<String>,
    prefixes: HashMap<String, String>,
}

impl NamespaceScope {
    fn resolve_element(&self, prefix: Option<&str>) -> Option<String> {
        match prefix {
            Some("xml") => Some(XML_NAMESPACE.to_string()),
            Some(prefix) => self.prefixes.get(prefix).cloned(),
            None => self.default.clone(),
        }
    }

    fn resolve_attribute(&self, prefix: Option<&str>) -> Option<String> {
        // Unprefixed attributes never take the default namespace.
        match prefix {
            Some("xml") => Some(XML_NAMESPACE.to_string()),
            Some("xmlns") => Some("http://www.w3.org/2000/xmlns/".to_string()),
            Some(prefix) => self.prefixes.get(prefix).cloned(),
            None => None,
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn starts_with(&self, s: &[u8]) -> bool {
        self.bytes[self.pos..].starts_with(s)
    }

    fn eat_str(&mut self, s: &[u8]) -> bool {
        if self.starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn line_col(&self, pos: usize) -> (usize, usize) {
        let mut line = 1usize;
        let mut col = 1usize;
        for &b in &self.bytes[..pos.min(self.bytes.len())] {
            if b == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    fn error_at(&self, pos: usize, message: &str) -> Error {
        let (line, col) = self.line_col(pos);
        Error::XmlParse(format!("{message} at {line}:{col}"))
    }

    fn error(&self, message: &str) -> Error {
        self.error_at(self.pos, message)
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_name_byte(b: u8) -> bool {
    is_name_start(b) || b.is_ascii_digit() || b == b'-' || b == b'.'
}

struct Parser<'a> {
    cur: Cursor<'a>,
    doc: XmlDocument,
    seen_doctype: bool,
}

impl<'a> Parser<'a> {
    fn parse(&mut self) -> Result<()> {
        if self.cur.starts_with(b"<?xml")
            && self
                .cur
                .peek_at(5)
                .is_some_and(|b| b.is_ascii_whitespace() || b == b'?')
        {
            self.parse_declaration()?;
        }

        let mut root = None;
        loop {
            self.cur.skip_ws();
            if self.cur.at_end() {
                break;
            }
            if self.cur.starts_with(b"<!--") {
                let comment = self.parse_comment()?;
                self.doc.append_child(DOCUMENT_ROOT, comment)?;
            } else if self.cur.starts_with(b"<?") {
                let pi = self.parse_processing_instruction()?;
                self.doc.append_child(DOCUMENT_ROOT, pi)?;
            } else if self.cur.starts_with(b"<!DOCTYPE") {
                if self.seen_doctype || root.is_some() {
                    return Err(self.cur.error("misplaced doctype"));
                }
                self.seen_doctype = true;
                self.skip_doctype()?;
            } else if self.cur.peek() == Some(b'<') {
                if root.is_some() {
                    return Err(self.cur.error("document has more than one root element"));
                }
                let scope = NamespaceScope::default();
                let element = self.parse_element(&scope)?;
                self.doc.append_child(DOCUMENT_ROOT, element)?;
                root = Some(element);
            } else {
                return Err(self.cur.error("text outside the root element"));
            }
        }

        if root.is_none() {
            return Err(self.cur.error("document has no root element"));
        }
        Ok(())
    }

    fn parse_declaration(&mut self) -> Result<()> {
        self.cur.pos += b"<?xml".len();
        loop {
            self.cur.skip_ws();
            if self.cur.eat_str(b"?>") {
                return Ok(());
            }
            if self.cur.at_end() {
                return Err(self.cur.error("unterminated xml declaration"));
            }
            let name = self.parse_name()?;
            self.cur.skip_ws();
            if !self.cur.eat(b'=') {
                return Err(self.cur.error("expected '=' in xml declaration"));
            }
            self.cur.skip_ws();
            let value = self.parse_quoted_value()?;
            match name.as_str() {
                "version" => self.doc.declared_version = Some(value),
                "encoding" => self.doc.declared_encoding = Some(value),
                "standalone" => self.doc.declared_standalone = Some(value == "yes"),
                _ => return Err(self.cur.error("unknown xml declaration attribute")),
            }
        }
    }

    fn parse_name(&mut self) -> Result<String> {
        let start = self.cur.pos;
        if !self.cur.peek().is_some_and(is_name_start) && self.cur.peek() != Some(b':') {
            return Err(self.cur.error("expected a name"));
        }
        while self
            .cur
            .peek()
            .is_some_and(|b| is_name_byte(b) || b == b':')
        {
            self.cur.pos += 1;
        }
        String::from_utf8(self.cur.bytes[start..self.cur.pos].to_vec())
            .map_err(|_| self.cur.error_at(start, "name is not valid UTF-8"))
    }

    fn parse_quoted_value(&mut self) -> Result<String> {
        let quote = match self.cur.peek() {
            Some(b @ (b'"' | b'\'')) => b,
            _ => return Err(self.cur.error("expected a quoted value")),
        };
        self.cur.pos += 1;
        let start = self.cur.pos;
        let mut out = String::new();
        loop {
            match self.cur.peek() {
                None => return Err(self.cur.error_at(start, "unterminated attribute value")),
                Some(b) if b == quote => {
                    self.cur.pos += 1;
                    return Ok(out);
                }
                Some(b'<') => return Err(self.cur.error("'<' is not allowed in attribute values")),
                Some(b'&') => out.push_str(&self.parse_entity()?),
                Some(_) => {
                    let from = self.cur.pos;
                    while self
                        .cur
                        .peek()
                        .is_some_and(|b| b != quote && b != b'&' && b != b'<')
                    {
                        self.cur.pos += 1;
                    }
                    out.push_str(self.slice_utf8(from)?);
                }
            }
        }
    }

    fn slice_utf8(&self, from: usize) -> Result<&'a str> {
        std::str::from_utf8(&self.cur.bytes[from..self.cur.pos])
            .map_err(|_| self.cur.error_at(from, "input is not valid UTF-8"))
    }

    fn parse_entity(&mut self) -> Result<String> {
        let start = self.cur.pos;
        self.cur.pos += 1;
        let mut name = String::new();
        loop {
            match self.cur.bump() {
                None => return Err(self.cur.error_at(start, "unterminated entity reference")),
                Some(b';') => break,
                Some(b) if b.is_ascii_alphanumeric() || b == b'#' || b == b'x' => {
                    name.push(b as char)
                }
                Some(_) => return Err(self.cur.error_at(start, "malformed entity reference")),
            }
            if name.len() > 10 {
                return Err(self.cur.error_at(start, "malformed entity reference"));
            }
        }
        let decoded = match name.as_str() {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "apos" => '\'',
            "quot" => '"',
            _ => {
                let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = name.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                match code.and_then(char::from_u32) {
                    Some(ch) => ch,
                    None => {
                        return Err(self
                            .cur
                            .error_at(start, &format!("unknown entity reference '&{name};'")));
                    }
                }
            }
        };
        Ok(decoded.to_string())
    }

    fn parse_comment(&mut self) -> Result<XmlNodeId> {
        let start = self.cur.pos;
        self.cur.pos += b"<!--".len();
        let from = self.cur.pos;
        loop {
            if self.cur.at_end() {
                return Err(self.cur.error_at(start, "unterminated comment"));
            }
            if self.cur.starts_with(b"-->") {
                let data = self.slice_utf8(from)?.to_string();
                self.cur.pos += 3;
                return Ok(self.doc.create_comment(&data));
            }
            self.cur.pos += 1;
        }
    }

    fn parse_processing_instruction(&mut self) -> Result<XmlNodeId> {
        let start = self.cur.pos;
        self.cur.pos += b"<?".len();
        let target = self.parse_name()?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(self.cur.error_at(start, "misplaced xml declaration"));
        }
        self.cur.skip_ws();
        let from = self.cur.pos;
        loop {
            if self.cur.at_end() {
                return Err(self.cur.error_at(start, "unterminated processing instruction"));
            }
            if self.cur.starts_with(b"?>") {
                let data = self.slice_utf8(from)?.to_string();
                self.cur.pos += 2;
                return Ok(self.doc.create_processing_instruction(&target, &data));
            }
            self.cur.pos += 1;
        }
    }

    fn skip_doctype(&mut self) -> Result<()> {
        let start = self.cur.pos;
        self.cur.pos += b"<!DOCTYPE".len();
        let mut bracket_depth = 0usize;
        loop {
            match self.cur.bump() {
                None => return Err(self.cur.error_at(start, "unterminated doctype")),
                Some(b'[') => bracket_depth += 1,
                Some(b']') => bracket_depth = bracket_depth.saturating_sub(1),
                Some(b'>') if bracket_depth == 0 => return Ok(()),
                Some(_) => {}
            }
        }
    }

    fn parse_element(&mut self, parent_scope: &NamespaceScope) -> Result<XmlNodeId> {
        stacker::maybe_grow(PARSE_STACK_RED_ZONE, PARSE_STACK_SIZE, || {
            self.parse_element_inner(parent_scope)
        })
    }

    fn parse_element_inner(&mut self, parent_scope: &NamespaceScope) -> Result<XmlNodeId> {
        let open_pos = self.cur.pos;
        self.cur.pos += 1;
        let name = self.parse_name()?;

        let mut attrs: Vec<(String, String, usize)> = Vec::new();
        let self_closing;
        loop {
            self.cur.skip_ws();
            match self.cur.peek() {
                None => return Err(self.cur.error_at(open_pos, "unterminated start tag")),
                Some(b'>') => {
                    self.cur.pos += 1;
                    self_closing = false;
                    break;
                }
                Some(b'/') => {
                    self.cur.pos += 1;
                    if !self.cur.eat(b'>') {
                        return Err(self.cur.error("expected '>' after '/'"));
                    }
                    self_closing = true;
                    break;
                }
                Some(_) => {
                    let attr_pos = self.cur.pos;
                    let attr_name = self.parse_name()?;
                    self.cur.skip_ws();
                    if !self.cur.eat(b'=') {
                        return Err(self.cur.error("expected '=' after attribute name"));
                    }
                    self.cur.skip_ws();
                    let value = self.parse_quoted_value()?;
                    if attrs.iter().any(|(existing, _, _)| *existing == attr_name) {
                        return Err(self
                            .cur
                            .error_at(attr_pos, &format!("duplicate attribute '{attr_name}'")));
                    }
                    attrs.push((attr_name, value, attr_pos));
                }
            }
        }

        let mut scope = parent_scope.clone();
        for (attr_name, value, _) in &attrs {
            if attr_name == "xmlns" {
                scope.default = if value.is_empty() {
                    None
                } else {
                    Some(value.clone())
                };
            } else if let Some(prefix) = attr_name.strip_prefix("xmlns:") {
                scope.prefixes.insert(prefix.to_string(), value.clone());
            }
        }

        let parsed = super::XmlName::parse(&name);
        if let Some(prefix) = &parsed.prefix {
            if scope.resolve_element(Some(prefix)).is_none() {
                return Err(self
                    .cur
                    .error_at(open_pos, &format!("undeclared namespace prefix '{prefix}'")));
            }
        }
        let namespace = scope.resolve_element(parsed.prefix.as_deref());
        let element = self.doc.create_element_ns(namespace.as_deref(), &name);
        for (attr_name, value, attr_pos) in attrs {
            let parsed_attr = super::XmlName::parse(&attr_name);
            let attr_prefix = parsed_attr.prefix.as_deref();
            if let Some(prefix) = attr_prefix {
                if prefix != "xmlns" && scope.prefixes.get(prefix).is_none() && prefix != "xml" {
                    return Err(self
                        .cur
                        .error_at(attr_pos, &format!("undeclared namespace prefix '{prefix}'")));
                }
            }
            let attr_namespace = if attr_name == "xmlns" {
                Some("http://www.w3.org/2000/xmlns/".to_string())
            } else {
                scope.resolve_attribute(attr_prefix)
            };
            self.doc
                .set_attribute_ns(element, attr_namespace.as_deref(), &attr_name, &value);
        }

        if self_closing {
            return Ok(element);
        }

        loop {
            if self.cur.at_end() {
                return Err(self
                    .cur
                    .error_at(open_pos, &format!("unclosed element '{name}'")));
            }
            if self.cur.starts_with(b"</") {
                let close_pos = self.cur.pos;
                self.cur.pos += 2;
                let closing = self.parse_name()?;
                self.cur.skip_ws();
                if !self.cur.eat(b'>') {
                    return Err(self.cur.error("expected '>' in end tag"));
                }
                if closing != name {
                    return Err(self.cur.error_at(
                        close_pos,
                        &format!("mismatched end tag: expected '</{name}>', found '</{closing}>'"),
                    ));
                }
                return Ok(element);
            }
            if self.cur.starts_with(b"<![CDATA[") {
                let cdata = self.parse_cdata()?;
                self.doc.append_child(element, cdata)?;
            } else if self.cur.starts_with(b"<!--") {
                let comment = self.parse_comment()?;
                self.doc.append_child(element, comment)?;
            } else if self.cur.starts_with(b"<?") {
                let pi = self.parse_processing_instruction()?;
                self.doc.append_child(element, pi)?;
            } else if self.cur.peek() == Some(b'<') {
                let child = self.parse_element(&scope)?;
                self.doc.append_child(element, child)?;
            } else {
                let text = self.parse_text()?;
                if !text.is_empty() {
                    let node = self.doc.create_text(&text);
                    self.doc.append_child(element, node)?;
                }
            }
        }
    }

    fn parse_cdata(&mut self) -> Result<XmlNodeId> {
        let start = self.cur.pos;
        self.cur.pos += b"<![CDATA[".len();
        let from = self.cur.pos;
        loop {
            if self.cur.at_end() {
                return Err(self.cur.error_at(start, "unterminated CDATA section"));
            }
            if self.cur.starts_with(b"]]>") {
                let data = self.slice_utf8(from)?.to_string();
                self.cur.pos += 3;
                return Ok(self.doc.create_cdata(&data));
            }
            self.cur.pos += 1;
        }
    }

    fn parse_text(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.cur.peek() {
                None | Some(b'<') => return Ok(out),
                Some(b'&') => out.push_str(&self.parse_entity()?),
                Some(_) => {
                    let from = self.cur.pos;
                    while self.cur.peek().is_some_and(|b| b != b'<' && b != b'&') {
                        self.cur.pos += 1;
                    }
                    out.push_str(self.slice_utf8(from)?);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{CDATA_SECTION_NODE, TEXT_NODE};

    #[test]
    fn parses_declaration_and_tree() {
        let doc = parse_document(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root a=\"1\"><child>hi</child></root>",
        )
        .unwrap();
        assert_eq!(doc.declared_version.as_deref(), Some("1.0"));
        assert_eq!(doc.declared_encoding.as_deref(), Some("UTF-8"));
        let root = doc.document_element().unwrap();
        assert_eq!(doc.node_name(root), "root");
        assert_eq!(doc.get_attribute(root, "a"), Some("1".to_string()));
        let child = doc.first_child(root).unwrap();
        assert_eq!(doc.text_content(child), "hi");
    }

    #[test]
    fn decodes_entities_in_text_and_attributes() {
        let doc =
            parse_document("<r a=\"x&amp;y\">&lt;tag&gt; &#65;&#x42;</r>").unwrap();
        let root = doc.document_element().unwrap();
        assert_eq!(doc.get_attribute(root, "a"), Some("x&y".to_string()));
        assert_eq!(doc.text_content(root), "<tag> AB");
    }

    #[test]
    fn keeps_cdata_as_its_own_node_kind() {
        let doc = parse_document("<r>before<![CDATA[<raw&>]]>after</r>").unwrap();
        let root = doc.document_element().unwrap();
        let kinds: Vec<u32> = doc
            .children(root)
            .iter()
            .map(|&c| doc.node_type(c))
            .collect();
        assert_eq!(kinds, vec![TEXT_NODE, CDATA_SECTION_NODE, TEXT_NODE]);
        assert_eq!(doc.text_content(root), "before<raw&>after");
    }

    #[test]
    fn resolves_namespaces() {
        let doc = parse_document(
            "<a:root xmlns:a=\"urn:one\" xmlns=\"urn:two\"><leaf a:id=\"7\"/></a:root>",
        )
        .unwrap();
        let root = doc.document_element().unwrap();
        let name = doc.element_name(root).unwrap();
        assert_eq!(name.prefix.as_deref(), Some("a"));
        assert_eq!(name.local, "root");
        assert_eq!(name.namespace.as_deref(), Some("urn:one"));

        let leaf = doc.first_child(root).unwrap();
        let leaf_name = doc.element_name(leaf).unwrap();
        assert_eq!(leaf_name.namespace.as_deref(), Some("urn:two"));
        let attr = doc.attribute_node(leaf, "a:id").unwrap();
        assert_eq!(
            doc.attribute_name(attr).unwrap().namespace.as_deref(),
            Some("urn:one")
        );
    }

    #[test]
    fn reports_positions_for_mismatched_tags() {
        let err = parse_document("<root>\n  <a></b>\n</root>").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("mismatched end tag"), "{message}");
        assert!(message.contains("2:"), "{message}");
    }

    #[test]
    fn rejects_structural_errors() {
        assert!(parse_document("").is_err());
        assert!(parse_document("just text").is_err());
        assert!(parse_document("<a/><b/>").is_err());
        assert!(parse_document("<a x=\"1\" x=\"2\"/>").is_err());
        assert!(parse_document("<a>&bogus;</a>").is_err());
        assert!(parse_document("<p:a xmlns=\"urn:d\"/>").is_err());
        assert!(parse_document("<a>").is_err());
    }

    #[test]
    fn doctype_with_internal_subset_is_skipped() {
        let doc = parse_document(
            "<!DOCTYPE note [<!ELEMENT note (#PCDATA)>]><note>ok</note>",
        )
        .unwrap();
        let root = doc.document_element().unwrap();
        assert_eq!(doc.text_content(root), "ok");
    }

    #[test]
    fn error_document_carries_the_message() {
        let doc = parse_error_document("boom");
        let root = doc.document_element().unwrap();
        assert_eq!(doc.node_name(root), "parsererror");
        assert_eq!(
            doc.element_name(root).unwrap().namespace.as_deref(),
            Some(PARSER_ERROR_NAMESPACE)
        );
        assert_eq!(doc.text_content(root), "boom");
    }
}
