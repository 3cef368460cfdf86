use std::collections::HashMap;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HtmlNodeId(pub(crate) usize);

#[derive(Debug, Clone)]
enum HtmlNodeKind {
    Document,
    Element(HtmlElement),
    Text(String),
}

#[derive(Debug, Clone)]
struct HtmlElement {
    tag: String,
    attrs: HashMap<String, String>,
    value: String,
}

#[derive(Debug, Clone)]
struct HtmlNode {
    parent: Option<HtmlNodeId>,
    children: Vec<HtmlNodeId>,
    kind: HtmlNodeKind,
}

#[derive(Debug, Clone)]
pub(crate) struct HtmlDom {
    nodes: Vec<HtmlNode>,
    root: HtmlNodeId,
    id_index: HashMap<String, HtmlNodeId>,
}

#[derive(Debug)]
pub(crate) struct ParsedPage {
    pub(crate) dom: HtmlDom,
    pub(crate) scripts: Vec<String>,
}

impl HtmlDom {
    fn new() -> Self {
        let root = HtmlNode {
            parent: None,
            children: Vec::new(),
            kind: HtmlNodeKind::Document,
        };
        Self {
            nodes: vec![root],
            root: HtmlNodeId(0),
            id_index: HashMap::new(),
        }
    }

    fn create_node(&mut self, parent: Option<HtmlNodeId>, kind: HtmlNodeKind) -> HtmlNodeId {
        let id = HtmlNodeId(self.nodes.len());
        self.nodes.push(HtmlNode {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    fn create_element(
        &mut self,
        parent: HtmlNodeId,
        tag: String,
        attrs: HashMap<String, String>,
    ) -> HtmlNodeId {
        let value = attrs.get("value").cloned().unwrap_or_default();
        let element = HtmlElement { tag, attrs, value };
        let id = self.create_node(Some(parent), HtmlNodeKind::Element(element));
        if let Some(id_attr) = self
            .element(id)
            .and_then(|element| element.attrs.get("id").cloned())
        {
            self.id_index.insert(id_attr, id);
        }
        id
    }

    fn create_text(&mut self, parent: HtmlNodeId, text: String) -> HtmlNodeId {
        self.create_node(Some(parent), HtmlNodeKind::Text(text))
    }

    fn element(&self, id: HtmlNodeId) -> Option<&HtmlElement> {
        match &self.nodes[id.0].kind {
            HtmlNodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: HtmlNodeId) -> Option<&mut HtmlElement> {
        match &mut self.nodes[id.0].kind {
            HtmlNodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn root(&self) -> HtmlNodeId {
        self.root
    }

    pub(crate) fn by_id(&self, id: &str) -> Option<HtmlNodeId> {
        self.id_index.get(id).copied()
    }

    pub(crate) fn tag_name(&self, id: HtmlNodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub(crate) fn attr(&self, id: HtmlNodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attrs.get(name)).map(String::as_str)
    }

    pub(crate) fn set_attr(&mut self, id: HtmlNodeId, name: &str, value: &str) {
        if let Some(element) = self.element_mut(id) {
            element.attrs.insert(name.to_string(), value.to_string());
            if name == "value" {
                element.value = value.to_string();
            }
        }
    }

    pub(crate) fn value(&self, id: HtmlNodeId) -> Option<&str> {
        self.element(id).map(|e| e.value.as_str())
    }

    pub(crate) fn set_value(&mut self, id: HtmlNodeId, value: &str) {
        if let Some(element) = self.element_mut(id) {
            element.value = value.to_string();
        }
    }

    pub(crate) fn text_content(&self, id: HtmlNodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: HtmlNodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            HtmlNodeKind::Text(text) => out.push_str(text),
            _ => {
                for &child in &self.nodes[id.0].children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    pub(crate) fn set_text_content(&mut self, id: HtmlNodeId, text: &str) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
        if !text.is_empty() {
            self.create_text(id, text.to_string());
        }
    }

    fn find_element(&self, scope: HtmlNodeId, tag: &str) -> Option<HtmlNodeId> {
        for &child in &self.nodes[scope.0].children {
            if self.tag_name(child).is_some_and(|t| t.eq_ignore_ascii_case(tag)) {
                return Some(child);
            }
            if let Some(found) = self.find_element(child, tag) {
                return Some(found);
            }
        }
        None
    }

    pub(crate) fn title(&self) -> String {
        self.find_element(self.root, "title")
            .map(|id| self.text_content(id))
            .unwrap_or_default()
    }

    pub(crate) fn body(&self) -> Option<HtmlNodeId> {
        self.find_element(self.root, "body")
    }

    pub(crate) fn body_onload(&self) -> Option<String> {
        let body = self.body()?;
        self.attr(body, "onload").map(str::to_string)
    }
}

// Lenient fixture-page parser: mismatched end tags pop to the nearest open
// element, unknown declarations are skipped, raw text is kept verbatim for
// script and style bodies.
pub(crate) fn parse_page(html: &str) -> Result<ParsedPage> {
    let mut dom = HtmlDom::new();
    let mut scripts = Vec::new();

    let mut stack = vec![dom.root];
    let bytes = html.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if starts_with_at(bytes, i, b"<!--") {
            if let Some(end) = crate::charset::find_subslice(bytes, i + 4, b"-->") {
                i = end + 3;
            } else {
                return Err(Error::HtmlParse("unclosed comment".into()));
            }
            continue;
        }

        if bytes[i] == b'<' {
            if starts_with_at(bytes, i, b"</") {
                let (tag, next) = parse_end_tag(html, i)?;
                i = next;
                while stack.len() > 1 {
                    let top = stack[stack.len() - 1];
                    let top_tag = dom.tag_name(top).unwrap_or("");
                    let matched = top_tag.eq_ignore_ascii_case(&tag);
                    stack.pop();
                    if matched {
                        break;
                    }
                }
                continue;
            }

            if starts_with_at(bytes, i, b"<!") {
                i = skip_declaration(html, i)?;
                continue;
            }

            let (tag, attrs, self_closing, next) = parse_start_tag(html, i)?;
            i = next;
            let parent = stack[stack.len() - 1];

            if tag == "script" {
                let executable = is_executable_script_type(attrs.get("type").map(String::as_str));
                let node = dom.create_element(parent, tag, attrs);
                let close = find_raw_end_tag(bytes, i, b"script")
                    .ok_or_else(|| Error::HtmlParse("unclosed <script>".into()))?;
                if let Some(body) = html.get(i..close) {
                    if !body.is_empty() {
                        dom.create_text(node, body.to_string());
                        if executable {
                            scripts.push(body.to_string());
                        }
                    }
                }
                i = close;
                let (_, after_end) = parse_end_tag(html, i)?;
                i = after_end;
                continue;
            }

            if matches!(tag.as_str(), "style" | "title" | "textarea") && !self_closing {
                let node = dom.create_element(parent, tag.clone(), attrs);
                let close = find_raw_end_tag(bytes, i, tag.as_bytes())
                    .ok_or_else(|| Error::HtmlParse(format!("unclosed <{tag}>")))?;
                if let Some(body) = html.get(i..close) {
                    if !body.is_empty() {
                        let decoded = decode_character_references(body);
                        if tag == "textarea" {
                            dom.set_value(node, &decoded);
                        }
                        dom.create_text(node, decoded);
                    }
                }
                i = close;
                let (_, after_end) = parse_end_tag(html, i)?;
                i = after_end;
                continue;
            }

            let node = dom.create_element(parent, tag.clone(), attrs);
            if !self_closing && !is_void_tag(&tag) {
                stack.push(node);
            }
            continue;
        }

        let text_start = i;
        while i < bytes.len() && bytes[i] != b'<' {
            i += 1;
        }
        if let Some(text) = html.get(text_start..i) {
            if !text.is_empty() {
                let parent = stack[stack.len() - 1];
                let decoded = decode_character_references(text);
                if !decoded.is_empty() {
                    dom.create_text(parent, decoded);
                }
            }
        }
    }

    Ok(ParsedPage { dom, scripts })
}

fn is_executable_script_type(raw_type: Option<&str>) -> bool {
    let Some(raw_type) = raw_type else {
        return true;
    };
    let media_type = raw_type
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_ascii_lowercase();
    if media_type.is_empty() {
        return true;
    }
    matches!(
        media_type.as_str(),
        "text/javascript" | "application/javascript" | "application/ecmascript" | "text/ecmascript"
    )
}

fn parse_start_tag(
    html: &str,
    at: usize,
) -> Result<(String, HashMap<String, String>, bool, usize)> {
    let bytes = html.as_bytes();
    let mut i = at + 1;

    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = html
        .get(tag_start..i)
        .unwrap_or_default()
        .to_ascii_lowercase();
    if tag.is_empty() {
        return Err(Error::HtmlParse("empty tag name".into()));
    }

    let mut attrs = HashMap::new();
    let mut self_closing = false;

    loop {
        skip_ws(bytes, &mut i);
        if i >= bytes.len() {
            return Err(Error::HtmlParse("unclosed start tag".into()));
        }
        if bytes[i] == b'>' {
            i += 1;
            break;
        }
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>') {
            self_closing = true;
            i += 2;
            break;
        }
        if !is_attr_name_char(bytes[i]) {
            // Skip junk tokens the way browser engines recover.
            while i < bytes.len()
                && !bytes[i].is_ascii_whitespace()
                && bytes[i] != b'>'
                && !(bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>'))
            {
                i += 1;
            }
            continue;
        }

        let name_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }
        let name = html
            .get(name_start..i)
            .unwrap_or_default()
            .to_ascii_lowercase();

        skip_ws(bytes, &mut i);
        let value = if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            skip_ws(bytes, &mut i);
            parse_attr_value(html, bytes, &mut i)?
        } else {
            "true".to_string()
        };
        attrs.insert(name, value);
    }

    Ok((tag, attrs, self_closing, i))
}

fn parse_attr_value(html: &str, bytes: &[u8], i: &mut usize) -> Result<String> {
    if *i >= bytes.len() {
        return Err(Error::HtmlParse("missing attribute value".into()));
    }
    if bytes[*i] == b'\'' || bytes[*i] == b'"' {
        let quote = bytes[*i];
        *i += 1;
        let start = *i;
        while *i < bytes.len() && bytes[*i] != quote {
            *i += 1;
        }
        if *i >= bytes.len() {
            return Err(Error::HtmlParse("unclosed quoted attribute value".into()));
        }
        let value = html.get(start..*i).unwrap_or_default().to_string();
        *i += 1;
        return Ok(decode_character_references(&value));
    }

    let start = *i;
    while *i < bytes.len()
        && !bytes[*i].is_ascii_whitespace()
        && bytes[*i] != b'>'
        && !(bytes[*i] == b'/' && bytes.get(*i + 1) == Some(&b'>'))
    {
        *i += 1;
    }
    let value = html.get(start..*i).unwrap_or_default().to_string();
    Ok(decode_character_references(&value))
}

fn parse_end_tag(html: &str, at: usize) -> Result<(String, usize)> {
    let bytes = html.as_bytes();
    let mut i = at + 2;
    skip_ws(bytes, &mut i);

    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = html
        .get(tag_start..i)
        .unwrap_or_default()
        .to_ascii_lowercase();

    while i < bytes.len() && bytes[i] != b'>' {
        i += 1;
    }
    if i >= bytes.len() {
        return Err(Error::HtmlParse("unclosed end tag".into()));
    }
    Ok((tag, i + 1))
}

fn skip_declaration(html: &str, at: usize) -> Result<usize> {
    let bytes = html.as_bytes();
    let mut i = at + 2;
    let mut quoted = 0u8;
    while i < bytes.len() {
        let b = bytes[i];
        if quoted != 0 {
            if b == quoted {
                quoted = 0;
            }
        } else if b == b'\'' || b == b'"' {
            quoted = b;
        } else if b == b'>' {
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(Error::HtmlParse("unclosed declaration".into()))
}

fn find_raw_end_tag(bytes: &[u8], from: usize, tag: &[u8]) -> Option<usize> {
    let mut i = from;
    while i + tag.len() + 2 <= bytes.len() {
        if bytes[i] == b'<' && bytes[i + 1] == b'/' {
            let name = &bytes[i + 2..i + 2 + tag.len()];
            if name.eq_ignore_ascii_case(tag) {
                let after = bytes.get(i + 2 + tag.len()).copied();
                if matches!(after, Some(b'>') | Some(b'/') | None)
                    || after.is_some_and(|b| b.is_ascii_whitespace())
                {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

fn decode_character_references(src: &str) -> String {
    if !src.contains('&') {
        return src.to_string();
    }

    fn decode_named(value: &str) -> Option<char> {
        match value {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{00A0}'),
            _ => None,
        }
    }

    let mut out = String::with_capacity(src.len());
    let mut i = 0usize;
    while i < src.len() {
        let Some(ch) = src[i..].chars().next() else {
            break;
        };
        if ch != '&' {
            out.push(ch);
            i += ch.len_utf8();
            continue;
        }
        let tail = &src[i + 1..];
        let Some(semi) = tail.find(';') else {
            out.push('&');
            i += 1;
            continue;
        };
        let raw = &tail[..semi];
        let decoded = if let Some(numeric) = raw.strip_prefix('#') {
            let code = if let Some(hex) = numeric.strip_prefix('x').or_else(|| numeric.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                numeric.parse::<u32>().ok()
            };
            code.and_then(char::from_u32)
        } else {
            decode_named(raw)
        };
        if let Some(value) = decoded {
            out.push(value);
            i += semi + 2;
        } else {
            out.push('&');
            i += 1;
        }
    }
    out
}

fn skip_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn is_tag_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn is_attr_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}

fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn starts_with_at(bytes: &[u8], at: usize, needle: &[u8]) -> bool {
    bytes.len() >= at + needle.len() && &bytes[at..at + needle.len()] == needle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_extract_in_document_order() {
        let page = parse_page(
            "<html><head><script>first();</script></head>\
             <body><script type='text/javascript'>second();</script>\
             <script type='text/plain'>not me</script></body></html>",
        )
        .unwrap();
        assert_eq!(page.scripts, vec!["first();", "second();"]);
    }

    #[test]
    fn script_bodies_are_raw_text() {
        let page =
            parse_page("<html><body><script>if (a < b) { go('</div>'); }</script></body></html>")
                .unwrap();
        assert_eq!(page.scripts, vec!["if (a < b) { go('</div>'); }"]);

        let page =
            parse_page("<html><body><script>var x = 1 < 2;</script></body></html>").unwrap();
        assert_eq!(page.scripts, vec!["var x = 1 < 2;"]);
    }

    #[test]
    fn id_lookup_and_text() {
        let page = parse_page(
            "<html><body><div id='out'>hello &amp; goodbye</div>\
             <textarea id='data'>&lt;root/&gt;</textarea></body></html>",
        )
        .unwrap();
        let dom = page.dom;
        let div = dom.by_id("out").unwrap();
        assert_eq!(dom.text_content(div), "hello & goodbye");
        assert_eq!(dom.tag_name(div), Some("div"));
        let area = dom.by_id("data").unwrap();
        assert_eq!(dom.value(area), Some("<root/>"));
    }

    #[test]
    fn title_and_onload() {
        let page = parse_page(
            "<html><head><title>My Page</title></head><body onload='go()'></body></html>",
        )
        .unwrap();
        assert_eq!(page.dom.title(), "My Page");
        assert_eq!(page.dom.body_onload(), Some("go()".to_string()));
    }

    #[test]
    fn mismatched_end_tags_recover() {
        let page = parse_page("<html><body><div><span>x</div></body></html>").unwrap();
        assert_eq!(page.dom.title(), "");
        let text = page.dom.text_content(page.dom.root);
        assert_eq!(text, "x");
    }

    #[test]
    fn void_and_self_closing_tags_do_not_nest() {
        let page = parse_page("<html><body><br><input id='i' value='v'/><p>tail</p></body></html>")
            .unwrap();
        let input = page.dom.by_id("i").unwrap();
        assert_eq!(page.dom.value(input), Some("v"));
        assert_eq!(page.dom.text_content(page.dom.root), "tail");
    }
}
