use std::cell::RefCell;
use std::rc::Rc;

use crate::script::regex::JsRegex;
use crate::xhr::XhrBody;
use crate::xml::{self, XmlDocId, XmlNodeId, DOCUMENT_ROOT};
use crate::{Error, Result};

use super::{
    to_number, to_string_value, truthy, BlobValue, Interp, PendingXhr, Value, XhrSlot,
};

impl Interp<'_> {
    pub(crate) fn member_get(&mut self, target: &Value, name: &str) -> Result<Value> {
        match target {
            Value::Undefined | Value::Null => Err(Error::ScriptRuntime(format!(
                "TypeError: cannot read property '{name}' of {}",
                if matches!(target, Value::Null) { "null" } else { "undefined" }
            ))),
            Value::Str(s) => Ok(match name {
                "length" => Value::Number(s.encode_utf16().count() as f64),
                _ => Value::Undefined,
            }),
            Value::Array(items) => Ok(match name {
                "length" => Value::Number(items.borrow().len() as f64),
                _ => Value::Undefined,
            }),
            Value::Object(object) => Ok(object.borrow().get(name).unwrap_or(Value::Undefined)),
            Value::Regex(regex) => Ok(match name {
                "source" => Value::Str(regex.source().to_string()),
                "flags" => Value::Str(regex.flags().to_string()),
                "global" => Value::Bool(regex.is_global()),
                _ => Value::Undefined,
            }),
            Value::Bytes(bytes) => Ok(match name {
                "length" | "byteLength" => Value::Number(bytes.borrow().len() as f64),
                _ => Value::Undefined,
            }),
            Value::Blob(blob) => Ok(match name {
                "size" => Value::Number(blob.bytes.len() as f64),
                "type" => Value::Str(blob.mime.clone()),
                _ => Value::Undefined,
            }),
            Value::ErrorObject { name: err_name, message } => Ok(match name {
                "name" => Value::Str(err_name.clone()),
                "message" => Value::Str(message.clone()),
                _ => Value::Undefined,
            }),
            Value::Document => Ok(match name {
                "title" => Value::Str(self.page.dom.title()),
                "body" => match self.page.dom.body() {
                    Some(body) => Value::HtmlElement(body),
                    None => Value::Null,
                },
                "location" => Value::Location,
                _ => Value::Undefined,
            }),
            Value::Window => Ok(match name {
                "document" => Value::Document,
                "location" => Value::Location,
                "window" | "self" | "top" => Value::Window,
                _ => self
                    .page
                    .globals
                    .borrow()
                    .get(name)
                    .cloned()
                    .unwrap_or(Value::Undefined),
            }),
            Value::Location => Ok(self.location_property(name)),
            Value::HtmlElement(id) => {
                let id = *id;
                Ok(match name {
                    "textContent" | "innerText" => Value::Str(self.page.dom.text_content(id)),
                    "value" => Value::Str(
                        self.page.dom.value(id).unwrap_or_default().to_string(),
                    ),
                    "id" => Value::Str(
                        self.page.dom.attr(id, "id").unwrap_or_default().to_string(),
                    ),
                    "title" => Value::Str(
                        self.page.dom.attr(id, "title").unwrap_or_default().to_string(),
                    ),
                    "tagName" => Value::Str(
                        self.page
                            .dom
                            .tag_name(id)
                            .unwrap_or_default()
                            .to_ascii_uppercase(),
                    ),
                    _ => Value::Undefined,
                })
            }
            Value::XmlNode { doc, node } => self.xml_node_property(*doc, *node, name),
            Value::NodeList { nodes, .. } => Ok(match name {
                "length" => Value::Number(nodes.len() as f64),
                _ => Value::Undefined,
            }),
            Value::Xhr(index) => self.xhr_property(*index, name),
            Value::Math => Ok(match name {
                "PI" => Value::Number(std::f64::consts::PI),
                "E" => Value::Number(std::f64::consts::E),
                _ => Value::Undefined,
            }),
            _ => Ok(Value::Undefined),
        }
    }

    pub(crate) fn member_set(&mut self, target: &Value, name: &str, value: Value) -> Result<()> {
        match target {
            Value::Undefined | Value::Null => Err(Error::ScriptRuntime(format!(
                "TypeError: cannot set property '{name}' of {}",
                if matches!(target, Value::Null) { "null" } else { "undefined" }
            ))),
            Value::Object(object) => {
                object.borrow_mut().set(name, value);
                Ok(())
            }
            Value::Array(items) => {
                if name == "length" {
                    let len = to_number(self.page, &value);
                    if len.is_finite() && len >= 0.0 && len.fract() == 0.0 {
                        items.borrow_mut().resize(len as usize, Value::Undefined);
                    } else {
                        return Err(Error::ScriptRuntime(
                            "RangeError: invalid array length".to_string(),
                        ));
                    }
                }
                Ok(())
            }
            Value::Window => {
                self.page
                    .globals
                    .borrow_mut()
                    .insert(name.to_string(), value);
                Ok(())
            }
            Value::HtmlElement(id) => {
                let id = *id;
                match name {
                    "textContent" | "innerText" => {
                        let text = to_string_value(self.page, &value);
                        self.page.dom.set_text_content(id, &text);
                    }
                    "value" => {
                        let text = to_string_value(self.page, &value);
                        self.page.dom.set_value(id, &text);
                    }
                    _ => {}
                }
                Ok(())
            }
            Value::XmlNode { doc, node } => {
                let (doc, node) = (*doc, *node);
                match name {
                    "nodeValue" | "data" => {
                        let text = to_string_value(self.page, &value);
                        self.page.doc_mut(doc).set_node_value(node, &text);
                    }
                    "textContent" => {
                        let text = to_string_value(self.page, &value);
                        self.page.doc_mut(doc).set_text_content(node, &text);
                    }
                    _ => {}
                }
                Ok(())
            }
            Value::Xhr(index) => {
                let index = *index;
                let stored = match value {
                    Value::Null | Value::Undefined => None,
                    other => Some(other),
                };
                match name {
                    "onreadystatechange" => self.page.xhrs[index].onreadystatechange = stored,
                    "onload" => self.page.xhrs[index].onload = stored,
                    "onerror" => self.page.xhrs[index].onerror = stored,
                    _ => {}
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn index_get(&mut self, target: &Value, index: &Value) -> Result<Value> {
        if let Value::Str(key) = index {
            if key.parse::<usize>().is_err() {
                return self.member_get(target, key);
            }
        }
        let position = to_number(self.page, index);
        match target {
            Value::Undefined | Value::Null => Err(Error::ScriptRuntime(
                "TypeError: cannot index null or undefined".to_string(),
            )),
            Value::Object(object) => {
                let key = to_string_value(self.page, index);
                Ok(object.borrow().get(&key).unwrap_or(Value::Undefined))
            }
            Value::Array(items) => Ok(usize_index(position)
                .and_then(|i| items.borrow().get(i).cloned())
                .unwrap_or(Value::Undefined)),
            Value::Str(s) => Ok(usize_index(position)
                .and_then(|i| s.encode_utf16().nth(i))
                .map(|unit| Value::Str(String::from_utf16_lossy(&[unit])))
                .unwrap_or(Value::Undefined)),
            Value::NodeList { doc, nodes } => Ok(usize_index(position)
                .and_then(|i| nodes.get(i).copied())
                .map(|node| Value::XmlNode { doc: *doc, node })
                .unwrap_or(Value::Undefined)),
            Value::Bytes(bytes) => Ok(usize_index(position)
                .and_then(|i| bytes.borrow().get(i).copied())
                .map(|b| Value::Number(f64::from(b)))
                .unwrap_or(Value::Undefined)),
            _ => Ok(Value::Undefined),
        }
    }

    pub(crate) fn index_set(&mut self, target: &Value, index: &Value, value: Value) -> Result<()> {
        if let Value::Str(key) = index {
            if key.parse::<usize>().is_err() {
                return self.member_set(target, key, value);
            }
        }
        let position = to_number(self.page, index);
        match target {
            Value::Undefined | Value::Null => Err(Error::ScriptRuntime(
                "TypeError: cannot index null or undefined".to_string(),
            )),
            Value::Object(object) => {
                let key = to_string_value(self.page, index);
                object.borrow_mut().set(&key, value);
                Ok(())
            }
            Value::Array(items) => {
                if let Some(i) = usize_index(position) {
                    let mut items = items.borrow_mut();
                    if i >= items.len() {
                        items.resize(i + 1, Value::Undefined);
                    }
                    items[i] = value;
                }
                Ok(())
            }
            Value::Bytes(bytes) => {
                if let Some(i) = usize_index(position) {
                    let byte = wrap_u8(to_number(self.page, &value));
                    let mut bytes = bytes.borrow_mut();
                    if i < bytes.len() {
                        bytes[i] = byte;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn method_call(
        &mut self,
        target: Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        match &target {
            Value::Str(s) => {
                let s = s.clone();
                self.string_method(&s, name, &args)
            }
            Value::Number(n) => self.number_method(*n, name, &args),
            Value::Array(items) => {
                let items = items.clone();
                self.array_method(&items, name, &args)
            }
            Value::Object(object) => {
                let method = object.borrow().get(name);
                match method {
                    Some(Value::Function(function)) => self.call_function(&function, args),
                    Some(_) => Err(Error::ScriptRuntime(format!(
                        "TypeError: {name} is not a function"
                    ))),
                    None => self.unknown_method(&target, name),
                }
            }
            Value::Regex(regex) => {
                let regex = regex.clone();
                self.regex_method(&regex, name, &args)
            }
            Value::Math => self.math_method(name, &args),
            Value::StringConstructor => match name {
                "fromCharCode" => {
                    let units: Vec<u16> = args
                        .iter()
                        .map(|value| wrap_u16(to_number(self.page, value)))
                        .collect();
                    Ok(Value::Str(String::from_utf16_lossy(&units)))
                }
                _ => self.unknown_method(&target, name),
            },
            Value::Window => match name {
                "alert" => {
                    let message = args
                        .first()
                        .map(|value| to_string_value(self.page, value))
                        .unwrap_or_default();
                    self.page.push_alert(message);
                    Ok(Value::Undefined)
                }
                _ => self.unknown_method(&target, name),
            },
            Value::Document => match name {
                "getElementById" => {
                    let id = self.arg_string(&args, 0);
                    Ok(match self.page.dom.by_id(&id) {
                        Some(node) => Value::HtmlElement(node),
                        None => Value::Null,
                    })
                }
                _ => self.unknown_method(&target, name),
            },
            Value::HtmlElement(id) => {
                let id = *id;
                match name {
                    "getAttribute" => {
                        let attr = self.arg_string(&args, 0);
                        Ok(match self.page.dom.attr(id, &attr) {
                            Some(value) => Value::Str(value.to_string()),
                            None => Value::Null,
                        })
                    }
                    "setAttribute" => {
                        let attr = self.arg_string(&args, 0);
                        let value = self.arg_string(&args, 1);
                        self.page.dom.set_attr(id, &attr, &value);
                        Ok(Value::Undefined)
                    }
                    "hasAttribute" => {
                        let attr = self.arg_string(&args, 0);
                        Ok(Value::Bool(self.page.dom.attr(id, &attr).is_some()))
                    }
                    _ => self.unknown_method(&target, name),
                }
            }
            Value::XmlNode { doc, node } => self.xml_node_method(*doc, *node, name, args),
            Value::NodeList { doc, nodes } => {
                let (doc, nodes) = (*doc, nodes.clone());
                match name {
                    "item" => {
                        let position = to_number(self.page, args.first().unwrap_or(&Value::Undefined));
                        Ok(usize_index(position)
                            .and_then(|i| nodes.get(i).copied())
                            .map(|node| Value::XmlNode { doc, node })
                            .unwrap_or(Value::Null))
                    }
                    "getNamedItem" => {
                        let wanted = self.arg_string(&args, 0);
                        for &node in nodes.iter() {
                            if self.page.doc(doc).node_name(node) == wanted {
                                return Ok(Value::XmlNode { doc, node });
                            }
                        }
                        Ok(Value::Null)
                    }
                    _ => self.unknown_method(&target, name),
                }
            }
            Value::Xhr(index) => self.xhr_method(*index, name, args),
            Value::Xslt(index) => self.xslt_method(*index, name, args),
            Value::DomParser => match name {
                "parseFromString" => self.dom_parser_parse(&args),
                _ => self.unknown_method(&target, name),
            },
            Value::XmlSerializer => match name {
                "serializeToString" => match args.first() {
                    Some(Value::XmlNode { doc, node }) => Ok(Value::Str(xml::serialize_node(
                        self.page.doc(*doc),
                        *node,
                    ))),
                    _ => Err(Error::ScriptRuntime(
                        "TypeError: serializeToString expects a node".to_string(),
                    )),
                },
                _ => self.unknown_method(&target, name),
            },
            _ => self.unknown_method(&target, name),
        }
    }

    pub(crate) fn unknown_method(&mut self, target: &Value, name: &str) -> Result<Value> {
        match name {
            "toString" => Ok(Value::Str(to_string_value(self.page, target))),
            "valueOf" => Ok(target.clone()),
            _ => Err(Error::ScriptRuntime(format!(
                "TypeError: {name} is not a function"
            ))),
        }
    }

    pub(crate) fn construct(&mut self, ctor: &str, args: Vec<Value>) -> Result<Value> {
        match ctor {
            "XMLHttpRequest" => {
                let index = self.page.xhrs.len();
                self.page.xhrs.push(XhrSlot::default());
                Ok(Value::Xhr(index))
            }
            "DOMParser" => Ok(Value::DomParser),
            "XMLSerializer" => Ok(Value::XmlSerializer),
            "XSLTProcessor" => {
                let index = self.page.xslts.len();
                self.page.xslts.push(crate::xslt::XsltProcessor::new());
                Ok(Value::Xslt(index))
            }
            "RegExp" => {
                let pattern = self.arg_string(&args, 0);
                let flags = self.arg_string(&args, 1);
                JsRegex::compile(&pattern, &flags)
                    .map(|regex| Value::Regex(Rc::new(regex)))
                    .map_err(|err| Error::ScriptRuntime(format!("SyntaxError: {err}")))
            }
            "Error" | "TypeError" | "RangeError" | "SyntaxError" | "DOMException" => {
                let message = args
                    .first()
                    .map(|value| to_string_value(self.page, value))
                    .unwrap_or_default();
                Ok(Value::ErrorObject {
                    name: ctor.to_string(),
                    message,
                })
            }
            "Object" => Ok(Value::Object(Rc::new(RefCell::new(
                super::ObjectValue::default(),
            )))),
            "Array" => match args.as_slice() {
                [Value::Number(n)] => {
                    let len = if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 {
                        *n as usize
                    } else {
                        return Err(Error::ScriptRuntime(
                            "RangeError: invalid array length".to_string(),
                        ));
                    };
                    Ok(Value::Array(Rc::new(RefCell::new(vec![
                        Value::Undefined;
                        len
                    ]))))
                }
                _ => Ok(Value::Array(Rc::new(RefCell::new(args)))),
            },
            "Uint8Array" => {
                let bytes = match args.first() {
                    None => Vec::new(),
                    Some(Value::Number(n)) => {
                        let len = if n.is_finite() && *n >= 0.0 {
                            *n as usize
                        } else {
                            0
                        };
                        vec![0u8; len]
                    }
                    Some(Value::Array(items)) => items
                        .borrow()
                        .iter()
                        .map(|item| wrap_u8(to_number(self.page, item)))
                        .collect(),
                    Some(Value::Bytes(bytes)) => bytes.borrow().clone(),
                    Some(other) => {
                        return Err(Error::ScriptRuntime(format!(
                            "TypeError: cannot build a Uint8Array from {}",
                            super::type_of(other)
                        )));
                    }
                };
                Ok(Value::Bytes(Rc::new(RefCell::new(bytes))))
            }
            "Blob" => {
                let mut bytes = Vec::new();
                if let Some(Value::Array(parts)) = args.first() {
                    let parts = parts.borrow().clone();
                    for part in parts {
                        match part {
                            Value::Str(text) => bytes.extend_from_slice(text.as_bytes()),
                            Value::Bytes(part_bytes) => {
                                bytes.extend_from_slice(&part_bytes.borrow());
                            }
                            Value::Blob(blob) => bytes.extend_from_slice(&blob.bytes),
                            other => bytes
                                .extend_from_slice(to_string_value(self.page, &other).as_bytes()),
                        }
                    }
                }
                let mime = match args.get(1) {
                    Some(Value::Object(options)) => options
                        .borrow()
                        .get("type")
                        .map(|value| to_string_value(self.page, &value))
                        .unwrap_or_default(),
                    _ => String::new(),
                };
                Ok(Value::Blob(Rc::new(BlobValue { bytes, mime })))
            }
            _ => Err(Error::ScriptRuntime(format!(
                "ReferenceError: {ctor} is not a constructor"
            ))),
        }
    }

    fn location_property(&self, name: &str) -> Value {
        let url = self.page.base_url.as_str();
        let (scheme, rest) = url.split_once("://").unwrap_or(("", url));
        let (authority, tail) = match rest.find(['/', '?', '#']) {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        let (path_and_query, hash) = match tail.split_once('#') {
            Some((p, h)) => (p, Some(h)),
            None => (tail, None),
        };
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path_and_query, None),
        };
        match name {
            "href" => Value::Str(url.to_string()),
            "protocol" => Value::Str(format!("{scheme}:")),
            "host" => Value::Str(authority.to_string()),
            "hostname" => Value::Str(
                authority
                    .split_once(':')
                    .map(|(host, _)| host)
                    .unwrap_or(authority)
                    .to_string(),
            ),
            "port" => Value::Str(
                authority
                    .split_once(':')
                    .map(|(_, port)| port)
                    .unwrap_or_default()
                    .to_string(),
            ),
            "pathname" => Value::Str(if path.is_empty() {
                "/".to_string()
            } else {
                path.to_string()
            }),
            "search" => Value::Str(match query {
                Some(q) if !q.is_empty() => format!("?{q}"),
                _ => String::new(),
            }),
            "hash" => Value::Str(match hash {
                Some(h) if !h.is_empty() => format!("#{h}"),
                _ => String::new(),
            }),
            _ => Value::Undefined,
        }
    }

    fn xml_node_property(&mut self, doc: XmlDocId, node: XmlNodeId, name: &str) -> Result<Value> {
        let document = self.page.doc(doc);
        Ok(match name {
            "nodeType" => Value::Number(f64::from(document.node_type(node))),
            "nodeName" => Value::Str(document.node_name(node)),
            "nodeValue" => match document.node_value(node) {
                Some(value) => Value::Str(value),
                None => Value::Null,
            },
            "localName" => match document
                .element_name(node)
                .or_else(|| document.attribute_name(node))
            {
                Some(xml_name) => Value::Str(xml_name.local.clone()),
                None => Value::Null,
            },
            "prefix" => match document
                .element_name(node)
                .or_else(|| document.attribute_name(node))
                .and_then(|xml_name| xml_name.prefix.clone())
            {
                Some(prefix) => Value::Str(prefix),
                None => Value::Null,
            },
            "namespaceURI" => match document
                .element_name(node)
                .or_else(|| document.attribute_name(node))
                .and_then(|xml_name| xml_name.namespace.clone())
            {
                Some(namespace) => Value::Str(namespace),
                None => Value::Null,
            },
            "tagName" => match document.element_name(node) {
                Some(xml_name) => Value::Str(xml_name.qualified()),
                None => Value::Undefined,
            },
            "name" => match document.attribute_name(node) {
                Some(xml_name) => Value::Str(xml_name.qualified()),
                None => Value::Undefined,
            },
            "value" => match document.attribute_name(node) {
                Some(_) => match document.node_value(node) {
                    Some(value) => Value::Str(value),
                    None => Value::Str(String::new()),
                },
                None => Value::Undefined,
            },
            "target" => match document.kind(node) {
                xml::XmlNodeKind::ProcessingInstruction { target, .. } => {
                    Value::Str(target.clone())
                }
                _ => Value::Undefined,
            },
            "data" => match document.node_value(node) {
                Some(value) => Value::Str(value),
                None => Value::Undefined,
            },
            "textContent" => Value::Str(document.text_content(node)),
            "firstChild" => node_or_null(doc, document.first_child(node)),
            "lastChild" => node_or_null(doc, document.last_child(node)),
            "nextSibling" => node_or_null(doc, document.next_sibling(node)),
            "previousSibling" => node_or_null(doc, document.previous_sibling(node)),
            "parentNode" => node_or_null(doc, document.parent(node)),
            "childNodes" => Value::NodeList {
                doc,
                nodes: Rc::new(document.children(node).to_vec()),
            },
            "attributes" => Value::NodeList {
                doc,
                nodes: Rc::new(document.attributes(node).to_vec()),
            },
            "ownerDocument" => {
                if node == DOCUMENT_ROOT {
                    Value::Null
                } else {
                    Value::XmlNode {
                        doc,
                        node: DOCUMENT_ROOT,
                    }
                }
            }
            "documentElement" => {
                if node == DOCUMENT_ROOT {
                    node_or_null(doc, document.document_element())
                } else {
                    Value::Undefined
                }
            }
            "xmlVersion" => {
                if node == DOCUMENT_ROOT {
                    Value::Str(
                        document
                            .declared_version
                            .clone()
                            .unwrap_or_else(|| "1.0".to_string()),
                    )
                } else {
                    Value::Undefined
                }
            }
            "xmlEncoding" => {
                if node == DOCUMENT_ROOT {
                    match &document.declared_encoding {
                        Some(encoding) => Value::Str(encoding.clone()),
                        None => Value::Null,
                    }
                } else {
                    Value::Undefined
                }
            }
            "xmlStandalone" => {
                if node == DOCUMENT_ROOT {
                    Value::Bool(document.declared_standalone.unwrap_or(false))
                } else {
                    Value::Undefined
                }
            }
            _ => Value::Undefined,
        })
    }

    fn xml_node_method(
        &mut self,
        doc: XmlDocId,
        node: XmlNodeId,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        match name {
            "createElement" => {
                let tag = self.arg_string(&args, 0);
                validate_xml_name(&tag)?;
                let created = self.page.doc_mut(doc).create_element(&tag);
                Ok(Value::XmlNode { doc, node: created })
            }
            "createElementNS" => {
                let namespace = self.arg_opt_string(&args, 0);
                let tag = self.arg_string(&args, 1);
                validate_xml_name(&tag)?;
                let created = self
                    .page
                    .doc_mut(doc)
                    .create_element_ns(namespace.as_deref(), &tag);
                Ok(Value::XmlNode { doc, node: created })
            }
            "createTextNode" => {
                let data = self.arg_string(&args, 0);
                let created = self.page.doc_mut(doc).create_text(&data);
                Ok(Value::XmlNode { doc, node: created })
            }
            "createCDATASection" => {
                let data = self.arg_string(&args, 0);
                let created = self.page.doc_mut(doc).create_cdata(&data);
                Ok(Value::XmlNode { doc, node: created })
            }
            "createComment" => {
                let data = self.arg_string(&args, 0);
                let created = self.page.doc_mut(doc).create_comment(&data);
                Ok(Value::XmlNode { doc, node: created })
            }
            "createProcessingInstruction" => {
                let target = self.arg_string(&args, 0);
                validate_xml_name(&target)?;
                let data = self.arg_string(&args, 1);
                let created = self
                    .page
                    .doc_mut(doc)
                    .create_processing_instruction(&target, &data);
                Ok(Value::XmlNode { doc, node: created })
            }
            "createDocumentFragment" => {
                let created = self.page.doc_mut(doc).create_fragment();
                Ok(Value::XmlNode { doc, node: created })
            }
            "createAttribute" => {
                let attr = self.arg_string(&args, 0);
                validate_xml_name(&attr)?;
                let created = self.page.doc_mut(doc).create_attribute(&attr, "");
                Ok(Value::XmlNode { doc, node: created })
            }
            "importNode" => {
                let (source_doc, source_node) = match args.first() {
                    Some(Value::XmlNode { doc, node }) => (*doc, *node),
                    _ => {
                        return Err(Error::ScriptRuntime(
                            "TypeError: importNode expects a node".to_string(),
                        ));
                    }
                };
                let deep = args.get(1).map(truthy).unwrap_or(false);
                let imported = if source_doc == doc {
                    self.page.doc_mut(doc).clone_node(source_node, deep)
                } else {
                    let source = self.page.doc(source_doc).clone();
                    self.page.doc_mut(doc).import_from(&source, source_node, deep)
                };
                Ok(Value::XmlNode {
                    doc,
                    node: imported,
                })
            }
            "appendChild" => {
                let child = self.node_arg(&args, 0, doc)?;
                self.page.doc_mut(doc).append_child(node, child)?;
                Ok(Value::XmlNode { doc, node: child })
            }
            "insertBefore" => {
                let child = self.node_arg(&args, 0, doc)?;
                let reference = match args.get(1) {
                    None | Some(Value::Null) | Some(Value::Undefined) => None,
                    _ => Some(self.node_arg(&args, 1, doc)?),
                };
                self.page.doc_mut(doc).insert_before(node, child, reference)?;
                Ok(Value::XmlNode { doc, node: child })
            }
            "removeChild" => {
                let child = self.node_arg(&args, 0, doc)?;
                self.page.doc_mut(doc).remove_child(node, child)?;
                Ok(Value::XmlNode { doc, node: child })
            }
            "replaceChild" => {
                let new_child = self.node_arg(&args, 0, doc)?;
                let old_child = self.node_arg(&args, 1, doc)?;
                self.page
                    .doc_mut(doc)
                    .replace_child(node, new_child, old_child)?;
                Ok(Value::XmlNode {
                    doc,
                    node: old_child,
                })
            }
            "cloneNode" => {
                let deep = args.first().map(truthy).unwrap_or(false);
                let cloned = self.page.doc_mut(doc).clone_node(node, deep);
                Ok(Value::XmlNode { doc, node: cloned })
            }
            "hasChildNodes" => Ok(Value::Bool(self.page.doc(doc).has_child_nodes(node))),
            "hasAttributes" => Ok(Value::Bool(!self.page.doc(doc).attributes(node).is_empty())),
            "normalize" => {
                self.page.doc_mut(doc).normalize(node);
                Ok(Value::Undefined)
            }
            "getElementsByTagName" => {
                let tag = self.arg_string(&args, 0);
                let nodes = self.page.doc(doc).elements_by_tag_name(node, &tag);
                Ok(Value::NodeList {
                    doc,
                    nodes: Rc::new(nodes),
                })
            }
            "getElementsByTagNameNS" => {
                let namespace = self.arg_string(&args, 0);
                let local = self.arg_string(&args, 1);
                let nodes = self
                    .page
                    .doc(doc)
                    .elements_by_tag_name_ns(node, &namespace, &local);
                Ok(Value::NodeList {
                    doc,
                    nodes: Rc::new(nodes),
                })
            }
            "getAttribute" => {
                let attr = self.arg_string(&args, 0);
                Ok(match self.page.doc(doc).get_attribute(node, &attr) {
                    Some(value) => Value::Str(value),
                    None => Value::Null,
                })
            }
            "getAttributeNS" => {
                let namespace = self.arg_opt_string(&args, 0);
                let local = self.arg_string(&args, 1);
                Ok(
                    match self
                        .page
                        .doc(doc)
                        .get_attribute_ns(node, namespace.as_deref(), &local)
                    {
                        Some(value) => Value::Str(value),
                        None => Value::Null,
                    },
                )
            }
            "setAttribute" => {
                let attr = self.arg_string(&args, 0);
                validate_xml_name(&attr)?;
                let value = self.arg_string(&args, 1);
                self.page.doc_mut(doc).set_attribute(node, &attr, &value);
                Ok(Value::Undefined)
            }
            "setAttributeNS" => {
                let namespace = self.arg_opt_string(&args, 0);
                let attr = self.arg_string(&args, 1);
                validate_xml_name(&attr)?;
                let value = self.arg_string(&args, 2);
                self.page
                    .doc_mut(doc)
                    .set_attribute_ns(node, namespace.as_deref(), &attr, &value);
                Ok(Value::Undefined)
            }
            "hasAttribute" => {
                let attr = self.arg_string(&args, 0);
                Ok(Value::Bool(self.page.doc(doc).has_attribute(node, &attr)))
            }
            "removeAttribute" => {
                let attr = self.arg_string(&args, 0);
                self.page.doc_mut(doc).remove_attribute(node, &attr);
                Ok(Value::Undefined)
            }
            "getAttributeNode" => {
                let attr = self.arg_string(&args, 0);
                Ok(match self.page.doc(doc).attribute_node(node, &attr) {
                    Some(found) => Value::XmlNode { doc, node: found },
                    None => Value::Null,
                })
            }
            "getElementById" => Ok(Value::Null),
            _ => self.unknown_method(&Value::XmlNode { doc, node }, name),
        }
    }

    fn node_arg(&self, args: &[Value], index: usize, expected: XmlDocId) -> Result<XmlNodeId> {
        match args.get(index) {
            Some(Value::XmlNode { doc, node }) if *doc == expected => Ok(*node),
            Some(Value::XmlNode { .. }) => Err(Error::ScriptRuntime(
                "WrongDocumentError: node belongs to a different document".to_string(),
            )),
            _ => Err(Error::ScriptRuntime(
                "TypeError: argument is not a node".to_string(),
            )),
        }
    }

    fn xhr_property(&mut self, index: usize, name: &str) -> Result<Value> {
        Ok(match name {
            "readyState" => Value::Number(f64::from(self.page.xhrs[index].instance.ready_state())),
            "status" => Value::Number(f64::from(self.page.xhrs[index].instance.status())),
            "statusText" => Value::Str(self.page.xhrs[index].instance.status_text()),
            "responseText" => Value::Str(self.page.xhrs[index].instance.response_text()),
            "responseXML" => self.xhr_response_xml(index),
            "onreadystatechange" => self.page.xhrs[index]
                .onreadystatechange
                .clone()
                .unwrap_or(Value::Null),
            "onload" => self.page.xhrs[index].onload.clone().unwrap_or(Value::Null),
            "onerror" => self.page.xhrs[index].onerror.clone().unwrap_or(Value::Null),
            _ => Value::Undefined,
        })
    }

    fn xhr_response_xml(&mut self, index: usize) -> Value {
        if self.page.xhrs[index].response_doc.is_none() {
            let parsed = self.page.xhrs[index].instance.response_xml();
            let interned = parsed.map(|doc| self.page.intern_doc(doc));
            self.page.xhrs[index].response_doc = Some(interned);
        }
        match self.page.xhrs[index].response_doc {
            Some(Some(doc)) => Value::XmlNode {
                doc,
                node: DOCUMENT_ROOT,
            },
            _ => Value::Null,
        }
    }

    fn xhr_method(&mut self, index: usize, name: &str, args: Vec<Value>) -> Result<Value> {
        match name {
            "open" => {
                let method = self.arg_string(&args, 0);
                let url = self.arg_string(&args, 1);
                let is_async = args.get(2).map(truthy).unwrap_or(true);
                let base = self.page.base_url.clone();
                self.page.xhrs[index]
                    .instance
                    .open(&method, &url, is_async, &base)?;
                self.page.xhrs[index].response_doc = None;
                let resolved = self.page.xhrs[index].instance.url().to_string();
                self.page
                    .trace_line(format!("[xhr] open {method} {resolved} async={is_async}"));
                self.fire_xhr_readystatechange(index)?;
                Ok(Value::Undefined)
            }
            "setRequestHeader" => {
                let header = self.arg_string(&args, 0);
                let value = self.arg_string(&args, 1);
                self.page.xhrs[index]
                    .instance
                    .set_request_header(&header, &value)?;
                Ok(Value::Undefined)
            }
            "overrideMimeType" => {
                let mime = self.arg_string(&args, 0);
                self.page.xhrs[index].instance.override_mime_type(&mime)?;
                Ok(Value::Undefined)
            }
            "send" => self.xhr_send(index, &args),
            "abort" => {
                self.page.xhrs[index].instance.abort();
                self.page.xhrs[index].response_doc = None;
                Ok(Value::Undefined)
            }
            "getResponseHeader" => {
                let header = self.arg_string(&args, 0);
                Ok(
                    match self.page.xhrs[index].instance.get_response_header(&header) {
                        Some(value) => Value::Str(value),
                        None => Value::Null,
                    },
                )
            }
            "getAllResponseHeaders" => Ok(Value::Str(
                self.page.xhrs[index].instance.get_all_response_headers(),
            )),
            _ => self.unknown_method(&Value::Xhr(index), name),
        }
    }

    fn xhr_send(&mut self, index: usize, args: &[Value]) -> Result<Value> {
        let body = match args.first() {
            None | Some(Value::Undefined) | Some(Value::Null) => None,
            Some(Value::Str(text)) => Some(XhrBody::Text(text.clone())),
            Some(Value::Bytes(bytes)) => Some(XhrBody::Bytes(bytes.borrow().clone())),
            Some(Value::Blob(blob)) => Some(XhrBody::Blob {
                bytes: blob.bytes.clone(),
                content_type: if blob.mime.is_empty() {
                    None
                } else {
                    Some(blob.mime.clone())
                },
            }),
            Some(other) => Some(XhrBody::Text(to_string_value(self.page, other))),
        };
        let request = self.page.xhrs[index].instance.prepare_send(body)?;
        let is_async = self.page.xhrs[index].instance.is_async();
        let line = format!("[xhr] send {} {}", request.method(), request.url());
        self.page.trace_line(line);
        let outcome = self.page.connection.fetch(request);
        if is_async {
            self.page.tasks.push_back(PendingXhr {
                xhr: index,
                outcome,
            });
            return Ok(Value::Undefined);
        }
        self.complete_xhr(index, outcome, true)
    }

    pub(crate) fn finish_xhr(&mut self, task: PendingXhr) -> Result<()> {
        self.complete_xhr(task.xhr, task.outcome, false)?;
        Ok(())
    }

    fn complete_xhr(
        &mut self,
        index: usize,
        outcome: Result<crate::http::WebResponse>,
        sync: bool,
    ) -> Result<Value> {
        match outcome {
            Ok(response) => {
                let line = format!(
                    "[xhr] response {} for {}",
                    response.status(),
                    self.page.xhrs[index].instance.url()
                );
                self.page.trace_line(line);
                self.page.xhrs[index].instance.receive_headers(response);
                self.page.xhrs[index].response_doc = None;
                self.fire_xhr_readystatechange(index)?;
                self.page.xhrs[index].instance.mark_loading();
                self.fire_xhr_readystatechange(index)?;
                self.page.xhrs[index].instance.mark_done();
                self.fire_xhr_readystatechange(index)?;
                let onload = self.page.xhrs[index].onload.clone();
                self.fire_handler(onload)?;
                Ok(Value::Undefined)
            }
            Err(error) => {
                let message = error.script_message();
                let line = format!(
                    "[xhr] network failure for {}: {message}",
                    self.page.xhrs[index].instance.url()
                );
                self.page.trace_line(line);
                self.page.xhrs[index].instance.mark_done();
                self.page.xhrs[index].response_doc = None;
                if sync {
                    return Err(Error::ScriptRuntime(format!("NetworkError: {message}")));
                }
                self.fire_xhr_readystatechange(index)?;
                let onerror = self.page.xhrs[index].onerror.clone();
                self.fire_handler(onerror)?;
                Ok(Value::Undefined)
            }
        }
    }

    fn fire_xhr_readystatechange(&mut self, index: usize) -> Result<()> {
        let handler = self.page.xhrs[index].onreadystatechange.clone();
        self.fire_handler(handler)
    }

    fn fire_handler(&mut self, handler: Option<Value>) -> Result<()> {
        if let Some(Value::Function(function)) = handler {
            self.call_function(&function, Vec::new())?;
        }
        Ok(())
    }

    fn xslt_method(&mut self, index: usize, name: &str, args: Vec<Value>) -> Result<Value> {
        match name {
            "importStylesheet" => {
                let source = self.doc_arg(&args, 0)?;
                let page = &mut *self.page;
                page.xslts[index].import_stylesheet(&page.docs[source.0])?;
                self.page.trace_line("[xslt] stylesheet imported".to_string());
                Ok(Value::Undefined)
            }
            "setParameter" => {
                let param = self.arg_string(&args, 1);
                let value = self.arg_string(&args, 2);
                self.page.xslts[index].set_parameter(&param, &value);
                Ok(Value::Undefined)
            }
            "getParameter" => {
                let param = self.arg_string(&args, 1);
                Ok(match self.page.xslts[index].get_parameter(&param) {
                    Some(value) => Value::Str(value),
                    None => Value::Null,
                })
            }
            "removeParameter" => {
                let param = self.arg_string(&args, 1);
                self.page.xslts[index].remove_parameter(&param);
                Ok(Value::Undefined)
            }
            "clearParameters" => {
                self.page.xslts[index].clear_parameters();
                Ok(Value::Undefined)
            }
            "reset" => {
                self.page.xslts[index].reset();
                Ok(Value::Undefined)
            }
            "transformToDocument" => {
                let source = self.doc_arg(&args, 0)?;
                let source_doc = self.page.doc(source).clone();
                let result = self.page.xslts[index].transform_to_document(&source_doc)?;
                let doc = self.page.intern_doc(result);
                self.page
                    .trace_line("[xslt] transform to document".to_string());
                Ok(Value::XmlNode {
                    doc,
                    node: DOCUMENT_ROOT,
                })
            }
            "transformToFragment" => {
                let source = self.doc_arg(&args, 0)?;
                let owner = self.doc_arg(&args, 1)?;
                let source_doc = self.page.doc(source).clone();
                let page = &mut *self.page;
                let fragment =
                    page.xslts[index].transform_to_fragment(&source_doc, &mut page.docs[owner.0])?;
                self.page
                    .trace_line("[xslt] transform to fragment".to_string());
                Ok(Value::XmlNode {
                    doc: owner,
                    node: fragment,
                })
            }
            _ => self.unknown_method(&Value::Xslt(index), name),
        }
    }

    fn doc_arg(&self, args: &[Value], index: usize) -> Result<XmlDocId> {
        match args.get(index) {
            Some(Value::XmlNode { doc, .. }) => Ok(*doc),
            _ => Err(Error::ScriptRuntime(
                "TypeError: argument is not an XML node".to_string(),
            )),
        }
    }

    fn dom_parser_parse(&mut self, args: &[Value]) -> Result<Value> {
        let text = self.arg_string(args, 0);
        let mime = self.arg_string(args, 1);
        if !crate::xhr::is_xml_mime(&mime) {
            return Err(Error::ScriptRuntime(format!(
                "TypeError: unsupported media type {mime}"
            )));
        }
        let document = match xml::parse_document(&text) {
            Ok(document) => document,
            Err(error) => xml::parse_error_document(&error.script_message()),
        };
        let doc = self.page.intern_doc(document);
        Ok(Value::XmlNode {
            doc,
            node: DOCUMENT_ROOT,
        })
    }

    pub(crate) fn arg_string(&self, args: &[Value], index: usize) -> String {
        args.get(index)
            .map(|value| to_string_value(self.page, value))
            .unwrap_or_default()
    }

    fn arg_opt_string(&self, args: &[Value], index: usize) -> Option<String> {
        match args.get(index) {
            None | Some(Value::Null) | Some(Value::Undefined) => None,
            Some(value) => Some(to_string_value(self.page, value)),
        }
    }
}

fn node_or_null(doc: XmlDocId, node: Option<XmlNodeId>) -> Value {
    match node {
        Some(node) => Value::XmlNode { doc, node },
        None => Value::Null,
    }
}

fn usize_index(position: f64) -> Option<usize> {
    if position.is_finite() && position >= 0.0 && position.fract() == 0.0 {
        Some(position as usize)
    } else {
        None
    }
}

fn wrap_u16(value: f64) -> u16 {
    if value.is_nan() || value.is_infinite() {
        return 0;
    }
    (value as i64).rem_euclid(65_536) as u16
}

fn wrap_u8(value: f64) -> u8 {
    if value.is_nan() || value.is_infinite() {
        return 0;
    }
    (value as i64).rem_euclid(256) as u8
}

fn validate_xml_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_alphabetic() || first == '_' || first == ':')
                && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'))
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::ScriptRuntime(format!(
            "InvalidCharacterError: '{name}' is not a valid XML name"
        )))
    }
}
