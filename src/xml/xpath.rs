use crate::{Error, Result};

use super::{DOCUMENT_ROOT, XmlDocument, XmlNodeId, XmlNodeKind};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Axis {
    Child,
    Attribute,
    DescendantOrSelf,
    SelfNode,
    Parent,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum NodeTest {
    Name(String),
    Wildcard,
    Text,
    AnyNode,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Predicate {
    Index(usize),
    Last,
    HasAttribute(String),
    AttributeEquals(String, String),
    HasChild(String),
    ChildEquals(String, String),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Predicate>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Path {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PathExpr {
    pub paths: Vec<Path>,
}

pub(crate) fn parse(expr: &str) -> Result<PathExpr> {
    let mut parser = PathParser {
        bytes: expr.as_bytes(),
        pos: 0,
        source: expr,
    };
    let parsed = parser.parse_union()?;
    parser.skip_ws();
    if parser.pos < parser.bytes.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(parsed)
}

pub(crate) fn select(doc: &XmlDocument, context: XmlNodeId, expr: &PathExpr) -> Vec<XmlNodeId> {
    let mut out: Vec<XmlNodeId> = Vec::new();
    for path in &expr.paths {
        for node in select_path(doc, context, path) {
            if !out.contains(&node) {
                out.push(node);
            }
        }
    }
    if expr.paths.len() > 1 {
        let order = doc.order_index();
        out.sort_by_key(|node| order.get(node).copied().unwrap_or(usize::MAX));
    }
    out
}

pub(crate) fn select_str(
    doc: &XmlDocument,
    context: XmlNodeId,
    expr: &str,
) -> Result<Vec<XmlNodeId>> {
    Ok(select(doc, context, &parse(expr)?))
}

pub(crate) fn string_value(doc: &XmlDocument, node: XmlNodeId) -> String {
    doc.text_content(node)
}

fn select_path(doc: &XmlDocument, context: XmlNodeId, path: &Path) -> Vec<XmlNodeId> {
    let mut current = if path.absolute {
        vec![DOCUMENT_ROOT]
    } else {
        vec![context]
    };
    for step in &path.steps {
        let mut next = Vec::new();
        for &node in &current {
            let candidates = apply_axis(doc, node, step);
            let size = candidates.len();
            for (i, candidate) in candidates.into_iter().enumerate() {
                if step
                    .predicates
                    .iter()
                    .all(|p| eval_predicate(doc, candidate, i + 1, size, p))
                    && !next.contains(&candidate)
                {
                    next.push(candidate);
                }
            }
        }
        current = next;
    }
    current
}

fn apply_axis(doc: &XmlDocument, node: XmlNodeId, step: &Step) -> Vec<XmlNodeId> {
    match step.axis {
        Axis::SelfNode => vec![node],
        Axis::Parent => doc.parent(node).into_iter().collect(),
        Axis::Attribute => doc
            .attributes(node)
            .iter()
            .copied()
            .filter(|&a| attribute_matches(doc, a, &step.test))
            .collect(),
        Axis::Child => doc
            .children(node)
            .iter()
            .copied()
            .filter(|&c| node_matches(doc, c, &step.test))
            .collect(),
        Axis::DescendantOrSelf => {
            let mut out = Vec::new();
            descend(doc, node, &step.test, &mut out);
            out
        }
    }
}

fn descend(doc: &XmlDocument, node: XmlNodeId, test: &NodeTest, out: &mut Vec<XmlNodeId>) {
    if node_matches(doc, node, test) {
        out.push(node);
    }
    for &child in doc.children(node) {
        descend(doc, child, test, out);
    }
}

pub(crate) fn node_matches(doc: &XmlDocument, node: XmlNodeId, test: &NodeTest) -> bool {
    match test {
        NodeTest::AnyNode => true,
        NodeTest::Text => matches!(
            doc.kind(node),
            XmlNodeKind::Text(_) | XmlNodeKind::CData(_)
        ),
        NodeTest::Wildcard => matches!(doc.kind(node), XmlNodeKind::Element { .. }),
        NodeTest::Name(name) => match doc.kind(node) {
            XmlNodeKind::Element { name: actual } => actual.qualified() == *name,
            _ => false,
        },
    }
}

pub(crate) fn attribute_matches(doc: &XmlDocument, attr: XmlNodeId, test: &NodeTest) -> bool {
    match test {
        NodeTest::Wildcard | NodeTest::AnyNode => true,
        NodeTest::Name(name) => doc
            .attribute_name(attr)
            .is_some_and(|actual| actual.qualified() == *name),
        NodeTest::Text => false,
    }
}

pub(crate) fn eval_predicate(
    doc: &XmlDocument,
    node: XmlNodeId,
    position: usize,
    size: usize,
    predicate: &Predicate,
) -> bool {
    match predicate {
        Predicate::Index(i) => position == *i,
        Predicate::Last => position == size,
        Predicate::HasAttribute(name) => doc.has_attribute(node, name),
        Predicate::AttributeEquals(name, value) => {
            doc.get_attribute(node, name).as_deref() == Some(value.as_str())
        }
        Predicate::HasChild(name) => doc.children(node).iter().any(|&c| {
            matches!(doc.kind(c), XmlNodeKind::Element { name: actual }
                if actual.qualified() == *name)
        }),
        Predicate::ChildEquals(name, value) => doc.children(node).iter().any(|&c| {
            matches!(doc.kind(c), XmlNodeKind::Element { name: actual }
                if actual.qualified() == *name)
                && doc.text_content(c) == *value
        }),
    }
}

struct PathParser<'a> {
    bytes: &'a [u8],
    pos: usize,
    source: &'a str,
}

impl<'a> PathParser<'a> {
    fn error(&self, message: &str) -> Error {
        Error::Xslt(format!(
            "invalid path expression '{}': {message}",
            self.source
        ))
    }

    fn skip_ws(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &[u8]) -> bool {
        if self.bytes[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn parse_union(&mut self) -> Result<PathExpr> {
        let mut paths = vec![self.parse_path()?];
        loop {
            self.skip_ws();
            if self.eat(b'|') {
                paths.push(self.parse_path()?);
            } else {
                return Ok(PathExpr { paths });
            }
        }
    }

    fn parse_path(&mut self) -> Result<Path> {
        self.skip_ws();
        let mut steps = Vec::new();
        let absolute;
        if self.eat_str(b"//") {
            absolute = true;
            steps.push(Step {
                axis: Axis::DescendantOrSelf,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        } else if self.eat(b'/') {
            absolute = true;
            self.skip_ws();
            if self.at_path_end() {
                return Ok(Path { absolute, steps });
            }
        } else {
            absolute = false;
        }

        steps.push(self.parse_step()?);
        loop {
            self.skip_ws();
            if self.eat_str(b"//") {
                steps.push(Step {
                    axis: Axis::DescendantOrSelf,
                    test: NodeTest::AnyNode,
                    predicates: Vec::new(),
                });
                steps.push(self.parse_step()?);
            } else if self.eat(b'/') {
                steps.push(self.parse_step()?);
            } else {
                return Ok(Path { absolute, steps });
            }
        }
    }

    fn at_path_end(&self) -> bool {
        matches!(self.peek(), None | Some(b'|') | Some(b']'))
    }

    fn parse_step(&mut self) -> Result<Step> {
        self.skip_ws();
        if self.eat_str(b"..") {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            return Ok(Step {
                axis: Axis::SelfNode,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(b'@') {
            Axis::Attribute
        } else {
            Axis::Child
        };
        let test = if self.eat(b'*') {
            NodeTest::Wildcard
        } else if self.eat_str(b"text()") {
            NodeTest::Text
        } else if self.eat_str(b"node()") {
            NodeTest::AnyNode
        } else {
            NodeTest::Name(self.parse_name()?)
        };

        let mut predicates = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(b'[') {
                predicates.push(self.parse_predicate()?);
                self.skip_ws();
                if !self.eat(b']') {
                    return Err(self.error("expected ']'"));
                }
            } else {
                return Ok(Step {
                    axis,
                    test,
                    predicates,
                });
            }
        }
    }

    fn parse_name(&mut self) -> Result<String> {
        let start = self.pos;
        while self.peek().is_some_and(|b| {
            b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.' || b == b':' || b >= 0x80
        }) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a name"));
        }
        Ok(self.source[start..self.pos].to_string())
    }

    fn parse_predicate(&mut self) -> Result<Predicate> {
        self.skip_ws();
        if self.eat_str(b"last()") {
            return Ok(Predicate::Last);
        }
        if self.eat_str(b"position()") {
            self.skip_ws();
            if !self.eat(b'=') {
                return Err(self.error("expected '=' after position()"));
            }
            self.skip_ws();
            return Ok(Predicate::Index(self.parse_number()?));
        }
        if self.peek().is_some_and(|b| b.is_ascii_digit()) {
            return Ok(Predicate::Index(self.parse_number()?));
        }
        if self.eat(b'@') {
            let name = self.parse_name()?;
            self.skip_ws();
            if self.eat(b'=') {
                self.skip_ws();
                let value = self.parse_string()?;
                return Ok(Predicate::AttributeEquals(name, value));
            }
            return Ok(Predicate::HasAttribute(name));
        }
        let name = self.parse_name()?;
        self.skip_ws();
        if self.eat(b'=') {
            self.skip_ws();
            let value = self.parse_string()?;
            return Ok(Predicate::ChildEquals(name, value));
        }
        Ok(Predicate::HasChild(name))
    }

    fn parse_number(&mut self) -> Result<usize> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.source[start..self.pos]
            .parse::<usize>()
            .map_err(|_| self.error("expected a number"))
    }

    fn parse_string(&mut self) -> Result<String> {
        let quote = match self.peek() {
            Some(b @ (b'\'' | b'"')) => b,
            _ => return Err(self.error("expected a quoted string")),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == quote {
                let value = self.source[start..self.pos].to_string();
                self.pos += 1;
                return Ok(value);
            }
            self.pos += 1;
        }
        Err(self.error("unterminated string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn sample() -> XmlDocument {
        parse_document(
            "<library>\
               <book id=\"b1\"><title>Dune</title><year>1965</year></book>\
               <book id=\"b2\"><title>Hyperion</title><year>1989</year></book>\
               <magazine id=\"m1\"><title>Nature</title></magazine>\
             </library>",
        )
        .unwrap()
    }

    fn names(doc: &XmlDocument, nodes: &[XmlNodeId]) -> Vec<String> {
        nodes.iter().map(|&n| doc.node_name(n)).collect()
    }

    #[test]
    fn absolute_and_relative_paths() {
        let doc = sample();
        let books = select_str(&doc, DOCUMENT_ROOT, "/library/book").unwrap();
        assert_eq!(books.len(), 2);

        let library = doc.document_element().unwrap();
        let same = select_str(&doc, library, "book").unwrap();
        assert_eq!(books, same);
    }

    #[test]
    fn descendant_shorthand_finds_nested_nodes() {
        let doc = sample();
        let titles = select_str(&doc, DOCUMENT_ROOT, "//title").unwrap();
        assert_eq!(titles.len(), 3);
        assert_eq!(string_value(&doc, titles[0]), "Dune");
        assert_eq!(string_value(&doc, titles[2]), "Nature");
    }

    #[test]
    fn attribute_axis_and_predicates() {
        let doc = sample();
        let ids = select_str(&doc, DOCUMENT_ROOT, "//book/@id").unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(string_value(&doc, ids[1]), "b2");

        let second = select_str(&doc, DOCUMENT_ROOT, "/library/book[2]").unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(doc.get_attribute(second[0], "id"), Some("b2".to_string()));

        let last = select_str(&doc, DOCUMENT_ROOT, "/library/book[last()]").unwrap();
        assert_eq!(last, second);

        let by_attr = select_str(&doc, DOCUMENT_ROOT, "//book[@id='b1']").unwrap();
        assert_eq!(by_attr.len(), 1);

        let by_child = select_str(&doc, DOCUMENT_ROOT, "//book[title='Hyperion']").unwrap();
        assert_eq!(by_child, second);

        let with_year = select_str(&doc, DOCUMENT_ROOT, "//*[year]").unwrap();
        assert_eq!(with_year.len(), 2);
    }

    #[test]
    fn unions_come_back_in_document_order() {
        let doc = sample();
        let nodes = select_str(&doc, DOCUMENT_ROOT, "//magazine | //book").unwrap();
        assert_eq!(names(&doc, &nodes), vec!["book", "book", "magazine"]);
    }

    #[test]
    fn text_and_node_tests() {
        let doc = sample();
        let library = doc.document_element().unwrap();
        let all_children = select_str(&doc, library, "node()").unwrap();
        assert_eq!(all_children.len(), 3);

        let title = select_str(&doc, library, "book[1]/title/text()").unwrap();
        assert_eq!(title.len(), 1);
        assert_eq!(string_value(&doc, title[0]), "Dune");
    }

    #[test]
    fn dot_and_parent_steps() {
        let doc = sample();
        let library = doc.document_element().unwrap();
        let title = select_str(&doc, library, "book[1]/title").unwrap()[0];
        assert_eq!(select_str(&doc, title, ".").unwrap(), vec![title]);
        let back_up = select_str(&doc, title, "../@id").unwrap();
        assert_eq!(string_value(&doc, back_up[0]), "b1");
    }

    #[test]
    fn root_selection() {
        let doc = sample();
        let root = select_str(&doc, doc.document_element().unwrap(), "/").unwrap();
        assert_eq!(root, vec![DOCUMENT_ROOT]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("//book[").is_err());
        assert!(parse("a/%b").is_err());
        assert!(parse("a | ").is_err());
    }
}
