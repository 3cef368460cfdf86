mod parser;
mod serializer;
pub(crate) mod xpath;

pub use parser::{parse_document, parse_error_document};
pub use serializer::serialize_node;

use crate::{Error, Result};

pub const ELEMENT_NODE: u32 = 1;
pub const ATTRIBUTE_NODE: u32 = 2;
pub const TEXT_NODE: u32 = 3;
pub const CDATA_SECTION_NODE: u32 = 4;
pub const PROCESSING_INSTRUCTION_NODE: u32 = 7;
pub const COMMENT_NODE: u32 = 8;
pub const DOCUMENT_NODE: u32 = 9;
pub const DOCUMENT_FRAGMENT_NODE: u32 = 11;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct XmlNodeId(pub(crate) usize);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct XmlDocId(pub(crate) usize);

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct XmlName {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
}

impl XmlName {
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => Self {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
                namespace: None,
            },
            _ => Self {
                prefix: None,
                local: qualified.to_string(),
                namespace: None,
            },
        }
    }

    pub fn with_namespace(qualified: &str, namespace: Option<&str>) -> Self {
        let mut name = Self::parse(qualified);
        name.namespace = namespace.map(str::to_string);
        name
    }

    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local),
            None => self.local.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum XmlNodeKind {
    Document,
    DocumentFragment,
    Element { name: XmlName },
    Attribute { name: XmlName, value: String },
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Clone, Debug)]
pub(crate) struct XmlNode {
    pub kind: XmlNodeKind,
    pub parent: Option<XmlNodeId>,
    pub children: Vec<XmlNodeId>,
    pub attrs: Vec<XmlNodeId>,
}

#[derive(Clone, Debug)]
pub struct XmlDocument {
    nodes: Vec<XmlNode>,
    pub(crate) declared_version: Option<String>,
    pub(crate) declared_encoding: Option<String>,
    pub(crate) declared_standalone: Option<bool>,
}

pub const DOCUMENT_ROOT: XmlNodeId = XmlNodeId(0);

impl Default for XmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlDocument {
    pub fn new() -> Self {
        Self {
            nodes: vec![XmlNode {
                kind: XmlNodeKind::Document,
                parent: None,
                children: Vec::new(),
                attrs: Vec::new(),
            }],
            declared_version: None,
            declared_encoding: None,
            declared_standalone: None,
        }
    }

    fn push(&mut self, kind: XmlNodeKind) -> XmlNodeId {
        let id = XmlNodeId(self.nodes.len());
        self.nodes.push(XmlNode {
            kind,
            parent: None,
            children: Vec::new(),
            attrs: Vec::new(),
        });
        id
    }

    pub(crate) fn node(&self, id: XmlNodeId) -> &XmlNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: XmlNodeId) -> &mut XmlNode {
        &mut self.nodes[id.0]
    }

    pub fn kind(&self, id: XmlNodeId) -> &XmlNodeKind {
        &self.nodes[id.0].kind
    }

    pub fn create_element(&mut self, qualified: &str) -> XmlNodeId {
        self.push(XmlNodeKind::Element {
            name: XmlName::parse(qualified),
        })
    }

    pub fn create_element_ns(&mut self, namespace: Option<&str>, qualified: &str) -> XmlNodeId {
        self.push(XmlNodeKind::Element {
            name: XmlName::with_namespace(qualified, namespace),
        })
    }

    pub fn create_text(&mut self, data: &str) -> XmlNodeId {
        self.push(XmlNodeKind::Text(data.to_string()))
    }

    pub fn create_cdata(&mut self, data: &str) -> XmlNodeId {
        self.push(XmlNodeKind::CData(data.to_string()))
    }

    pub fn create_comment(&mut self, data: &str) -> XmlNodeId {
        self.push(XmlNodeKind::Comment(data.to_string()))
    }

    pub fn create_processing_instruction(&mut self, target: &str, data: &str) -> XmlNodeId {
        self.push(XmlNodeKind::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    pub fn create_fragment(&mut self) -> XmlNodeId {
        self.push(XmlNodeKind::DocumentFragment)
    }

    pub fn create_attribute(&mut self, qualified: &str, value: &str) -> XmlNodeId {
        self.push(XmlNodeKind::Attribute {
            name: XmlName::parse(qualified),
            value: value.to_string(),
        })
    }

    pub fn create_attribute_ns(
        &mut self,
        namespace: Option<&str>,
        qualified: &str,
        value: &str,
    ) -> XmlNodeId {
        self.push(XmlNodeKind::Attribute {
            name: XmlName::with_namespace(qualified, namespace),
            value: value.to_string(),
        })
    }

    pub fn node_type(&self, id: XmlNodeId) -> u32 {
        match &self.nodes[id.0].kind {
            XmlNodeKind::Element { .. } => ELEMENT_NODE,
            XmlNodeKind::Attribute { .. } => ATTRIBUTE_NODE,
            XmlNodeKind::Text(_) => TEXT_NODE,
            XmlNodeKind::CData(_) => CDATA_SECTION_NODE,
            XmlNodeKind::ProcessingInstruction { .. } => PROCESSING_INSTRUCTION_NODE,
            XmlNodeKind::Comment(_) => COMMENT_NODE,
            XmlNodeKind::Document => DOCUMENT_NODE,
            XmlNodeKind::DocumentFragment => DOCUMENT_FRAGMENT_NODE,
        }
    }

    pub fn node_name(&self, id: XmlNodeId) -> String {
        match &self.nodes[id.0].kind {
            XmlNodeKind::Element { name } => name.qualified(),
            XmlNodeKind::Attribute { name, .. } => name.qualified(),
            XmlNodeKind::Text(_) => "#text".to_string(),
            XmlNodeKind::CData(_) => "#cdata-section".to_string(),
            XmlNodeKind::Comment(_) => "#comment".to_string(),
            XmlNodeKind::ProcessingInstruction { target, .. } => target.clone(),
            XmlNodeKind::Document => "#document".to_string(),
            XmlNodeKind::DocumentFragment => "#document-fragment".to_string(),
        }
    }

    pub fn node_value(&self, id: XmlNodeId) -> Option<String> {
        match &self.nodes[id.0].kind {
            XmlNodeKind::Attribute { value, .. } => Some(value.clone()),
            XmlNodeKind::Text(data) | XmlNodeKind::CData(data) | XmlNodeKind::Comment(data) => {
                Some(data.clone())
            }
            XmlNodeKind::ProcessingInstruction { data, .. } => Some(data.clone()),
            _ => None,
        }
    }

    pub fn set_node_value(&mut self, id: XmlNodeId, value: &str) {
        match &mut self.nodes[id.0].kind {
            XmlNodeKind::Attribute { value: slot, .. } => *slot = value.to_string(),
            XmlNodeKind::Text(data)
            | XmlNodeKind::CData(data)
            | XmlNodeKind::Comment(data) => *data = value.to_string(),
            XmlNodeKind::ProcessingInstruction { data, .. } => *data = value.to_string(),
            _ => {}
        }
    }

    pub fn element_name(&self, id: XmlNodeId) -> Option<&XmlName> {
        match &self.nodes[id.0].kind {
            XmlNodeKind::Element { name } => Some(name),
            _ => None,
        }
    }

    pub fn attribute_name(&self, id: XmlNodeId) -> Option<&XmlName> {
        match &self.nodes[id.0].kind {
            XmlNodeKind::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn parent(&self, id: XmlNodeId) -> Option<XmlNodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: XmlNodeId) -> &[XmlNodeId] {
        &self.nodes[id.0].children
    }

    pub fn attributes(&self, id: XmlNodeId) -> &[XmlNodeId] {
        &self.nodes[id.0].attrs
    }

    pub fn has_child_nodes(&self, id: XmlNodeId) -> bool {
        !self.nodes[id.0].children.is_empty()
    }

    pub fn first_child(&self, id: XmlNodeId) -> Option<XmlNodeId> {
        self.nodes[id.0].children.first().copied()
    }

    pub fn last_child(&self, id: XmlNodeId) -> Option<XmlNodeId> {
        self.nodes[id.0].children.last().copied()
    }

    pub fn next_sibling(&self, id: XmlNodeId) -> Option<XmlNodeId> {
        let parent = self.nodes[id.0].parent?;
        let siblings = &self.nodes[parent.0].children;
        let at = siblings.iter().position(|&c| c == id)?;
        siblings.get(at + 1).copied()
    }

    pub fn previous_sibling(&self, id: XmlNodeId) -> Option<XmlNodeId> {
        let parent = self.nodes[id.0].parent?;
        let siblings = &self.nodes[parent.0].children;
        let at = siblings.iter().position(|&c| c == id)?;
        at.checked_sub(1).map(|i| siblings[i])
    }

    pub fn document_element(&self) -> Option<XmlNodeId> {
        self.nodes[DOCUMENT_ROOT.0]
            .children
            .iter()
            .copied()
            .find(|&c| matches!(self.nodes[c.0].kind, XmlNodeKind::Element { .. }))
    }

    fn is_ancestor(&self, maybe_ancestor: XmlNodeId, of: XmlNodeId) -> bool {
        let mut cursor = Some(of);
        while let Some(id) = cursor {
            if id == maybe_ancestor {
                return true;
            }
            cursor = self.nodes[id.0].parent;
        }
        false
    }

    pub(crate) fn detach(&mut self, child: XmlNodeId) {
        if let Some(parent) = self.nodes[child.0].parent {
            let parent_node = &mut self.nodes[parent.0];
            parent_node.children.retain(|&c| c != child);
            parent_node.attrs.retain(|&c| c != child);
            self.nodes[child.0].parent = None;
        }
    }

    pub fn append_child(&mut self, parent: XmlNodeId, child: XmlNodeId) -> Result<()> {
        self.insert_child_at(parent, child, None)
    }

    pub fn insert_before(
        &mut self,
        parent: XmlNodeId,
        child: XmlNodeId,
        reference: Option<XmlNodeId>,
    ) -> Result<()> {
        self.insert_child_at(parent, child, reference)
    }

    fn insert_child_at(
        &mut self,
        parent: XmlNodeId,
        child: XmlNodeId,
        reference: Option<XmlNodeId>,
    ) -> Result<()> {
        match self.nodes[child.0].kind {
            XmlNodeKind::Document => {
                return Err(Error::ScriptRuntime(
                    "HierarchyRequestError: a document cannot be inserted".to_string(),
                ));
            }
            XmlNodeKind::Attribute { .. } => {
                return Err(Error::ScriptRuntime(
                    "HierarchyRequestError: an attribute cannot be inserted".to_string(),
                ));
            }
            _ => {}
        }
        if self.is_ancestor(child, parent) {
            return Err(Error::ScriptRuntime(
                "HierarchyRequestError: cannot insert a node into its own subtree".to_string(),
            ));
        }
        if let Some(reference) = reference {
            if self.nodes[reference.0].parent != Some(parent) {
                return Err(Error::ScriptRuntime(
                    "NotFoundError: reference node is not a child".to_string(),
                ));
            }
        }

        let moved: Vec<XmlNodeId> =
            if matches!(self.nodes[child.0].kind, XmlNodeKind::DocumentFragment) {
                std::mem::take(&mut self.nodes[child.0].children)
            } else {
                self.detach(child);
                vec![child]
            };

        for &node in &moved {
            self.nodes[node.0].parent = Some(parent);
        }
        let children = &mut self.nodes[parent.0].children;
        let at = match reference {
            Some(reference) => children
                .iter()
                .position(|&c| c == reference)
                .unwrap_or(children.len()),
            None => children.len(),
        };
        children.splice(at..at, moved);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: XmlNodeId, child: XmlNodeId) -> Result<()> {
        if self.nodes[child.0].parent != Some(parent) {
            return Err(Error::ScriptRuntime(
                "NotFoundError: node to remove is not a child".to_string(),
            ));
        }
        self.detach(child);
        Ok(())
    }

    pub fn replace_child(
        &mut self,
        parent: XmlNodeId,
        new_child: XmlNodeId,
        old_child: XmlNodeId,
    ) -> Result<()> {
        if self.nodes[old_child.0].parent != Some(parent) {
            return Err(Error::ScriptRuntime(
                "NotFoundError: node to replace is not a child".to_string(),
            ));
        }
        self.insert_before(parent, new_child, Some(old_child))?;
        self.detach(old_child);
        Ok(())
    }

    pub fn get_attribute(&self, element: XmlNodeId, qualified: &str) -> Option<String> {
        self.nodes[element.0].attrs.iter().find_map(|&a| {
            match &self.nodes[a.0].kind {
                XmlNodeKind::Attribute { name, value } if name.qualified() == qualified => {
                    Some(value.clone())
                }
                _ => None,
            }
        })
    }

    pub fn get_attribute_ns(
        &self,
        element: XmlNodeId,
        namespace: Option<&str>,
        local: &str,
    ) -> Option<String> {
        self.nodes[element.0].attrs.iter().find_map(|&a| {
            match &self.nodes[a.0].kind {
                XmlNodeKind::Attribute { name, value }
                    if name.local == local && name.namespace.as_deref() == namespace =>
                {
                    Some(value.clone())
                }
                _ => None,
            }
        })
    }

    pub fn attribute_node(&self, element: XmlNodeId, qualified: &str) -> Option<XmlNodeId> {
        self.nodes[element.0].attrs.iter().copied().find(|&a| {
            matches!(&self.nodes[a.0].kind, XmlNodeKind::Attribute { name, .. }
                if name.qualified() == qualified)
        })
    }

    pub fn has_attribute(&self, element: XmlNodeId, qualified: &str) -> bool {
        self.attribute_node(element, qualified).is_some()
    }

    pub fn set_attribute(&mut self, element: XmlNodeId, qualified: &str, value: &str) {
        if let Some(existing) = self.attribute_node(element, qualified) {
            if let XmlNodeKind::Attribute { value: slot, .. } = &mut self.nodes[existing.0].kind {
                *slot = value.to_string();
            }
            return;
        }
        let attr = self.create_attribute(qualified, value);
        self.nodes[attr.0].parent = Some(element);
        self.nodes[element.0].attrs.push(attr);
    }

    pub fn set_attribute_ns(
        &mut self,
        element: XmlNodeId,
        namespace: Option<&str>,
        qualified: &str,
        value: &str,
    ) {
        if let Some(existing) = self.attribute_node(element, qualified) {
            if let XmlNodeKind::Attribute { value: slot, .. } = &mut self.nodes[existing.0].kind {
                *slot = value.to_string();
            }
            return;
        }
        let attr = self.create_attribute_ns(namespace, qualified, value);
        self.nodes[attr.0].parent = Some(element);
        self.nodes[element.0].attrs.push(attr);
    }

    pub fn remove_attribute(&mut self, element: XmlNodeId, qualified: &str) {
        if let Some(attr) = self.attribute_node(element, qualified) {
            self.nodes[element.0].attrs.retain(|&a| a != attr);
            self.nodes[attr.0].parent = None;
        }
    }

    pub fn text_content(&self, id: XmlNodeId) -> String {
        match &self.nodes[id.0].kind {
            XmlNodeKind::Text(data) | XmlNodeKind::CData(data) | XmlNodeKind::Comment(data) => {
                data.clone()
            }
            XmlNodeKind::ProcessingInstruction { data, .. } => data.clone(),
            XmlNodeKind::Attribute { value, .. } => value.clone(),
            _ => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
        }
    }

    fn collect_text(&self, id: XmlNodeId, out: &mut String) {
        for &child in &self.nodes[id.0].children {
            match &self.nodes[child.0].kind {
                XmlNodeKind::Text(data) | XmlNodeKind::CData(data) => out.push_str(data),
                XmlNodeKind::Element { .. } | XmlNodeKind::DocumentFragment => {
                    self.collect_text(child, out)
                }
                _ => {}
            }
        }
    }

    pub fn set_text_content(&mut self, id: XmlNodeId, text: &str) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
        if !text.is_empty() {
            let data = self.create_text(text);
            self.nodes[data.0].parent = Some(id);
            self.nodes[id.0].children.push(data);
        }
    }

    pub fn elements_by_tag_name(&self, scope: XmlNodeId, name: &str) -> Vec<XmlNodeId> {
        let mut out = Vec::new();
        self.collect_elements(scope, name, &mut out);
        out
    }

    fn collect_elements(&self, id: XmlNodeId, name: &str, out: &mut Vec<XmlNodeId>) {
        for &child in &self.nodes[id.0].children {
            if let XmlNodeKind::Element { name: child_name } = &self.nodes[child.0].kind {
                if name == "*" || child_name.qualified() == name {
                    out.push(child);
                }
                self.collect_elements(child, name, out);
            }
        }
    }

    pub fn elements_by_tag_name_ns(
        &self,
        scope: XmlNodeId,
        namespace: &str,
        local: &str,
    ) -> Vec<XmlNodeId> {
        let mut out = Vec::new();
        self.collect_elements_ns(scope, namespace, local, &mut out);
        out
    }

    fn collect_elements_ns(
        &self,
        id: XmlNodeId,
        namespace: &str,
        local: &str,
        out: &mut Vec<XmlNodeId>,
    ) {
        for &child in &self.nodes[id.0].children {
            if let XmlNodeKind::Element { name } = &self.nodes[child.0].kind {
                let ns_ok = namespace == "*" || name.namespace.as_deref() == Some(namespace);
                let local_ok = local == "*" || name.local == local;
                if ns_ok && local_ok {
                    out.push(child);
                }
                self.collect_elements_ns(child, namespace, local, out);
            }
        }
    }

    // Merges adjacent text children and drops empty text nodes, recursively.
    pub fn normalize(&mut self, id: XmlNodeId) {
        let children = self.nodes[id.0].children.clone();
        let mut merged: Vec<XmlNodeId> = Vec::with_capacity(children.len());
        for child in children {
            let is_text = matches!(self.nodes[child.0].kind, XmlNodeKind::Text(_));
            if is_text {
                let data = match &self.nodes[child.0].kind {
                    XmlNodeKind::Text(data) => data.clone(),
                    _ => String::new(),
                };
                if data.is_empty() {
                    self.nodes[child.0].parent = None;
                    continue;
                }
                if let Some(&prev) = merged.last() {
                    if let XmlNodeKind::Text(prev_data) = &mut self.nodes[prev.0].kind {
                        prev_data.push_str(&data);
                        self.nodes[child.0].parent = None;
                        continue;
                    }
                }
            }
            merged.push(child);
        }
        self.nodes[id.0].children = merged.clone();
        for child in merged {
            if matches!(self.nodes[child.0].kind, XmlNodeKind::Element { .. }) {
                self.normalize(child);
            }
        }
    }

    pub fn clone_node(&mut self, id: XmlNodeId, deep: bool) -> XmlNodeId {
        let kind = self.nodes[id.0].kind.clone();
        let copy = self.push(kind);
        let attrs = self.nodes[id.0].attrs.clone();
        for attr in attrs {
            let attr_kind = self.nodes[attr.0].kind.clone();
            let attr_copy = self.push(attr_kind);
            self.nodes[attr_copy.0].parent = Some(copy);
            self.nodes[copy.0].attrs.push(attr_copy);
        }
        if deep {
            let children = self.nodes[id.0].children.clone();
            for child in children {
                let child_copy = self.clone_node(child, true);
                self.nodes[child_copy.0].parent = Some(copy);
                self.nodes[copy.0].children.push(child_copy);
            }
        }
        copy
    }

    pub fn import_from(&mut self, source: &XmlDocument, id: XmlNodeId, deep: bool) -> XmlNodeId {
        let copy = self.push(source.nodes[id.0].kind.clone());
        for &attr in &source.nodes[id.0].attrs {
            let attr_copy = self.push(source.nodes[attr.0].kind.clone());
            self.nodes[attr_copy.0].parent = Some(copy);
            self.nodes[copy.0].attrs.push(attr_copy);
        }
        if deep {
            for &child in &source.nodes[id.0].children {
                let child_copy = self.import_from(source, child, true);
                self.nodes[child_copy.0].parent = Some(copy);
                self.nodes[copy.0].children.push(child_copy);
            }
        }
        copy
    }

    // Preorder positions; attributes sort directly after their element.
    pub(crate) fn order_index(&self) -> std::collections::HashMap<XmlNodeId, usize> {
        let mut index = std::collections::HashMap::new();
        let mut counter = 0usize;
        self.walk_order(DOCUMENT_ROOT, &mut index, &mut counter);
        index
    }

    fn walk_order(
        &self,
        id: XmlNodeId,
        index: &mut std::collections::HashMap<XmlNodeId, usize>,
        counter: &mut usize,
    ) {
        index.insert(id, *counter);
        *counter += 1;
        for &attr in &self.nodes[id.0].attrs {
            index.insert(attr, *counter);
            *counter += 1;
        }
        for &child in &self.nodes[id.0].children {
            self.walk_order(child, index, counter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_navigate() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(DOCUMENT_ROOT, root).unwrap();
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        doc.append_child(root, a).unwrap();
        doc.append_child(root, b).unwrap();

        assert_eq!(doc.document_element(), Some(root));
        assert_eq!(doc.first_child(root), Some(a));
        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.previous_sibling(b), Some(a));
        assert_eq!(doc.parent(a), Some(root));
        assert_eq!(doc.node_name(root), "root");
        assert_eq!(doc.node_type(root), ELEMENT_NODE);
    }

    #[test]
    fn insert_rejects_cycles() {
        let mut doc = XmlDocument::new();
        let outer = doc.create_element("outer");
        let inner = doc.create_element("inner");
        doc.append_child(DOCUMENT_ROOT, outer).unwrap();
        doc.append_child(outer, inner).unwrap();
        assert!(doc.append_child(inner, outer).is_err());
    }

    #[test]
    fn fragment_insertion_moves_children() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(DOCUMENT_ROOT, root).unwrap();
        let fragment = doc.create_fragment();
        let x = doc.create_element("x");
        let y = doc.create_element("y");
        doc.append_child(fragment, x).unwrap();
        doc.append_child(fragment, y).unwrap();

        doc.append_child(root, fragment).unwrap();
        assert_eq!(doc.children(root), &[x, y]);
        assert!(doc.children(fragment).is_empty());
    }

    #[test]
    fn attributes_are_nodes_with_owner() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(DOCUMENT_ROOT, root).unwrap();
        doc.set_attribute(root, "id", "first");
        doc.set_attribute(root, "id", "second");

        assert_eq!(doc.attributes(root).len(), 1);
        let attr = doc.attribute_node(root, "id").unwrap();
        assert_eq!(doc.node_type(attr), ATTRIBUTE_NODE);
        assert_eq!(doc.node_value(attr), Some("second".to_string()));
        assert_eq!(doc.parent(attr), Some(root));
        assert_eq!(doc.get_attribute(root, "id"), Some("second".to_string()));

        doc.remove_attribute(root, "id");
        assert!(!doc.has_attribute(root, "id"));
    }

    #[test]
    fn text_content_skips_comments() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(DOCUMENT_ROOT, root).unwrap();
        let hello = doc.create_text("hello ");
        let note = doc.create_comment("ignored");
        let world = doc.create_cdata("world");
        doc.append_child(root, hello).unwrap();
        doc.append_child(root, note).unwrap();
        doc.append_child(root, world).unwrap();

        assert_eq!(doc.text_content(root), "hello world");
    }

    #[test]
    fn tag_name_search_is_document_order() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(DOCUMENT_ROOT, root).unwrap();
        let first = doc.create_element("item");
        let nested = doc.create_element("item");
        let wrap = doc.create_element("wrap");
        doc.append_child(root, first).unwrap();
        doc.append_child(root, wrap).unwrap();
        doc.append_child(wrap, nested).unwrap();

        assert_eq!(doc.elements_by_tag_name(DOCUMENT_ROOT, "item"), vec![first, nested]);
        assert_eq!(
            doc.elements_by_tag_name(DOCUMENT_ROOT, "*"),
            vec![root, first, wrap, nested]
        );
    }

    #[test]
    fn import_copies_subtree_between_documents() {
        let mut src = XmlDocument::new();
        let root = src.create_element("root");
        src.append_child(DOCUMENT_ROOT, root).unwrap();
        src.set_attribute(root, "kind", "demo");
        let text = src.create_text("payload");
        src.append_child(root, text).unwrap();

        let mut dst = XmlDocument::new();
        let copy = dst.import_from(&src, root, true);
        dst.append_child(DOCUMENT_ROOT, copy).unwrap();

        assert_eq!(dst.get_attribute(copy, "kind"), Some("demo".to_string()));
        assert_eq!(dst.text_content(copy), "payload");
        assert_eq!(src.text_content(root), "payload");
    }

    #[test]
    fn normalize_merges_adjacent_text() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element("root");
        doc.append_child(DOCUMENT_ROOT, root).unwrap();
        for part in ["ab", "", "cd"] {
            let t = doc.create_text(part);
            doc.append_child(root, t).unwrap();
        }
        let inner = doc.create_element("inner");
        doc.append_child(root, inner).unwrap();
        let tail = doc.create_text("ef");
        doc.append_child(root, tail).unwrap();

        doc.normalize(root);
        assert_eq!(doc.children(root).len(), 3);
        let first = doc.first_child(root).unwrap();
        assert_eq!(doc.node_value(first), Some("abcd".to_string()));
        assert_eq!(doc.text_content(root), "abcdef");
    }

    #[test]
    fn namespace_aware_lookups() {
        let mut doc = XmlDocument::new();
        let root = doc.create_element_ns(Some("urn:a"), "a:root");
        doc.append_child(DOCUMENT_ROOT, root).unwrap();
        let child = doc.create_element_ns(Some("urn:b"), "b:item");
        doc.append_child(root, child).unwrap();
        doc.set_attribute_ns(child, Some("urn:meta"), "m:lang", "ar");

        assert_eq!(doc.elements_by_tag_name_ns(DOCUMENT_ROOT, "urn:b", "item"), vec![child]);
        assert_eq!(doc.elements_by_tag_name_ns(DOCUMENT_ROOT, "*", "item"), vec![child]);
        assert!(doc.elements_by_tag_name_ns(DOCUMENT_ROOT, "urn:a", "item").is_empty());
        assert_eq!(doc.get_attribute_ns(child, Some("urn:meta"), "lang"), Some("ar".to_string()));
        assert_eq!(doc.get_attribute_ns(child, None, "lang"), None);
    }
}
