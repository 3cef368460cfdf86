use super::{XmlDocument, XmlNodeId, XmlNodeKind};

pub fn serialize_node(doc: &XmlDocument, id: XmlNodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, &mut out);
    out
}

fn write_node(doc: &XmlDocument, id: XmlNodeId, out: &mut String) {
    match doc.kind(id) {
        XmlNodeKind::Document | XmlNodeKind::DocumentFragment => {
            for &child in doc.children(id) {
                write_node(doc, child, out);
            }
        }
        XmlNodeKind::Element { name } => {
            out.push('<');
            out.push_str(&name.qualified());
            for &attr in doc.attributes(id) {
                if let XmlNodeKind::Attribute { name, value } = doc.kind(attr) {
                    out.push(' ');
                    out.push_str(&name.qualified());
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
            }
            if doc.children(id).is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for &child in doc.children(id) {
                write_node(doc, child, out);
            }
            out.push_str("</");
            out.push_str(&name.qualified());
            out.push('>');
        }
        XmlNodeKind::Text(data) => out.push_str(&escape_text(data)),
        XmlNodeKind::CData(data) => {
            out.push_str("<![CDATA[");
            out.push_str(data);
            out.push_str("]]>");
        }
        XmlNodeKind::Comment(data) => {
            out.push_str("<!--");
            out.push_str(data);
            out.push_str("-->");
        }
        XmlNodeKind::ProcessingInstruction { target, data } => {
            out.push_str("<?");
            out.push_str(target);
            if !data.is_empty() {
                out.push(' ');
                out.push_str(data);
            }
            out.push_str("?>");
        }
        XmlNodeKind::Attribute { value, .. } => out.push_str(&escape_text(value)),
    }
}

pub(crate) fn escape_text(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    for ch in data.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
