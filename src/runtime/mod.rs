use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::html::{HtmlDom, HtmlNodeId};
use crate::http::{MockWebConnection, WebResponse};
use crate::script::ast::Stmt;
use crate::script::format_float;
use crate::script::regex::JsRegex;
use crate::xhr::XhrInstance;
use crate::xml::{self, XmlDocId, XmlDocument, XmlNodeId};
use crate::xslt::XsltProcessor;
use crate::{Error, Result};

mod builtins;
mod eval;
mod exec;
mod host;

pub(crate) type Scope = Rc<RefCell<HashMap<String, Value>>>;

#[derive(Debug, Clone)]
pub(crate) enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<ObjectValue>>),
    Function(Rc<FunctionValue>),
    Regex(Rc<JsRegex>),
    Document,
    Window,
    Location,
    HtmlElement(HtmlNodeId),
    XmlNode { doc: XmlDocId, node: XmlNodeId },
    NodeList { doc: XmlDocId, nodes: Rc<Vec<XmlNodeId>> },
    Xhr(usize),
    Xslt(usize),
    DomParser,
    XmlSerializer,
    Blob(Rc<BlobValue>),
    Bytes(Rc<RefCell<Vec<u8>>>),
    Math,
    StringConstructor,
    ErrorObject { name: String, message: String },
}

#[derive(Debug, Default)]
pub(crate) struct ObjectValue {
    entries: Vec<(String, Value)>,
}

impl ObjectValue {
    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.clone())
    }

    pub(crate) fn set(&mut self, key: &str, value: Value) {
        for entry in &mut self.entries {
            if entry.0 == key {
                entry.1 = value;
                return;
            }
        }
        self.entries.push((key.to_string(), value));
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }
}

#[derive(Debug)]
pub(crate) struct FunctionValue {
    pub(crate) params: Vec<String>,
    pub(crate) body: Vec<Stmt>,
    pub(crate) captured: Vec<Scope>,
}

#[derive(Debug)]
pub(crate) struct BlobValue {
    pub(crate) bytes: Vec<u8>,
    pub(crate) mime: String,
}

#[derive(Debug, Default)]
pub(crate) struct XhrSlot {
    pub(crate) instance: XhrInstance,
    pub(crate) onreadystatechange: Option<Value>,
    pub(crate) onload: Option<Value>,
    pub(crate) onerror: Option<Value>,
    pub(crate) response_doc: Option<Option<XmlDocId>>,
}

pub(crate) struct PendingXhr {
    pub(crate) xhr: usize,
    pub(crate) outcome: Result<WebResponse>,
}

pub(crate) struct Page {
    pub(crate) dom: HtmlDom,
    pub(crate) base_url: String,
    pub(crate) connection: MockWebConnection,
    pub(crate) alerts: Vec<String>,
    pub(crate) docs: Vec<XmlDocument>,
    pub(crate) xhrs: Vec<XhrSlot>,
    pub(crate) xslts: Vec<XsltProcessor>,
    pub(crate) tasks: VecDeque<PendingXhr>,
    pub(crate) globals: Scope,
    pub(crate) script_step_limit: usize,
    pub(crate) task_step_limit: usize,
    pub(crate) trace: bool,
    pub(crate) trace_logs: Vec<String>,
    pub(crate) trace_log_limit: usize,
    pub(crate) trace_to_stderr: bool,
}

impl Page {
    pub(crate) fn new(base_url: &str, dom: HtmlDom, connection: MockWebConnection) -> Self {
        Self {
            dom,
            base_url: base_url.to_string(),
            connection,
            alerts: Vec::new(),
            docs: Vec::new(),
            xhrs: Vec::new(),
            xslts: Vec::new(),
            tasks: VecDeque::new(),
            globals: Rc::new(RefCell::new(HashMap::new())),
            script_step_limit: 2_000_000,
            task_step_limit: 10_000,
            trace: false,
            trace_logs: Vec::new(),
            trace_log_limit: 10_000,
            trace_to_stderr: true,
        }
    }

    pub(crate) fn intern_doc(&mut self, doc: XmlDocument) -> XmlDocId {
        let id = XmlDocId(self.docs.len());
        self.docs.push(doc);
        id
    }

    pub(crate) fn doc(&self, id: XmlDocId) -> &XmlDocument {
        &self.docs[id.0]
    }

    pub(crate) fn doc_mut(&mut self, id: XmlDocId) -> &mut XmlDocument {
        &mut self.docs[id.0]
    }

    pub(crate) fn push_alert(&mut self, message: String) {
        self.trace_line(format!("[alert] {message}"));
        self.alerts.push(message);
    }

    pub(crate) fn trace_line(&mut self, line: String) {
        if self.trace {
            if self.trace_to_stderr {
                eprintln!("{line}");
            }
            if self.trace_logs.len() >= self.trace_log_limit {
                self.trace_logs.remove(0);
            }
            self.trace_logs.push(line);
        }
    }
}

pub(crate) struct Interp<'p> {
    pub(crate) page: &'p mut Page,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) thrown: Option<Value>,
    pub(crate) steps: usize,
    pub(crate) call_depth: usize,
}

impl<'p> Interp<'p> {
    pub(crate) fn new(page: &'p mut Page) -> Self {
        let globals = page.globals.clone();
        Self {
            page,
            scopes: vec![globals],
            thrown: None,
            steps: 0,
            call_depth: 0,
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.borrow().get(name) {
                return Some(value.clone());
            }
        }
        None
    }

    pub(crate) fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last() {
            scope.borrow_mut().insert(name.to_string(), value);
        }
    }

    // Assignment to an undeclared name lands on the globals, like sloppy-mode
    // scripts in the emulated engine.
    pub(crate) fn assign_var(&mut self, name: &str, value: Value) {
        for scope in self.scopes.iter().rev() {
            if scope.borrow().contains_key(name) {
                scope.borrow_mut().insert(name.to_string(), value);
                return;
            }
        }
        self.scopes[0].borrow_mut().insert(name.to_string(), value);
    }
}

pub(crate) fn run_script(page: &mut Page, source: &str) -> Result<()> {
    let program = crate::script::parse_program(source)?;
    let mut interp = Interp::new(page);
    interp.hoist_function_decls(&program);
    match interp.execute_stmts(&program)? {
        ExecFlow::Break | ExecFlow::ContinueLoop => Err(Error::ScriptRuntime(
            "break or continue outside of a loop".to_string(),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn drain_tasks(page: &mut Page) -> Result<()> {
    let mut delivered = 0usize;
    while let Some(task) = page.tasks.pop_front() {
        delivered += 1;
        if delivered > page.task_step_limit {
            return Err(Error::ScriptRuntime(format!(
                "task limit of {} exceeded",
                page.task_step_limit
            )));
        }
        let mut interp = Interp::new(page);
        interp.finish_xhr(task)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExecFlow {
    Continue,
    Break,
    ContinueLoop,
    Return(Value),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        strict_eq(self, other)
    }
}

pub(crate) fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Str(_) => "string",
        Value::Function(_) | Value::StringConstructor => "function",
        _ => "object",
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::Str(s) => !s.is_empty(),
        _ => true,
    }
}

pub(crate) fn to_string_value(page: &Page, value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_float(*n),
        Value::Str(s) => s.clone(),
        Value::Array(items) => {
            let items = items.borrow();
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    other => to_string_value(page, other),
                })
                .collect();
            parts.join(",")
        }
        Value::Object(_) => "[object Object]".to_string(),
        Value::Function(_) => "function () {}".to_string(),
        Value::Regex(regex) => format!("/{}/{}", regex.source(), regex.flags()),
        Value::Document => "[object HTMLDocument]".to_string(),
        Value::Window => "[object Window]".to_string(),
        Value::Location => page.base_url.clone(),
        Value::HtmlElement(_) => "[object HTMLElement]".to_string(),
        Value::XmlNode { doc, node } => {
            let tag = match page.doc(*doc).node_type(*node) {
                xml::ELEMENT_NODE => "Element",
                xml::ATTRIBUTE_NODE => "Attr",
                xml::TEXT_NODE => "Text",
                xml::CDATA_SECTION_NODE => "CDATASection",
                xml::PROCESSING_INSTRUCTION_NODE => "ProcessingInstruction",
                xml::COMMENT_NODE => "Comment",
                xml::DOCUMENT_NODE => "XMLDocument",
                xml::DOCUMENT_FRAGMENT_NODE => "DocumentFragment",
                _ => "Node",
            };
            format!("[object {tag}]")
        }
        Value::NodeList { .. } => "[object NodeList]".to_string(),
        Value::Xhr(_) => "[object XMLHttpRequest]".to_string(),
        Value::Xslt(_) => "[object XSLTProcessor]".to_string(),
        Value::DomParser => "[object DOMParser]".to_string(),
        Value::XmlSerializer => "[object XMLSerializer]".to_string(),
        Value::Blob(_) => "[object Blob]".to_string(),
        Value::Bytes(bytes) => {
            let bytes = bytes.borrow();
            let parts: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
            parts.join(",")
        }
        Value::Math => "[object Math]".to_string(),
        Value::StringConstructor => "function String() { [native code] }".to_string(),
        Value::ErrorObject { name, message } => {
            if message.is_empty() {
                name.clone()
            } else {
                format!("{name}: {message}")
            }
        }
    }
}

pub(crate) fn str_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return match u64::from_str_radix(hex, 16) {
            Ok(value) => value as f64,
            Err(_) => f64::NAN,
        };
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

pub(crate) fn to_number(page: &Page, value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => *n,
        Value::Str(s) => str_to_number(s),
        Value::Array(_) | Value::Bytes(_) => str_to_number(&to_string_value(page, value)),
        _ => f64::NAN,
    }
}

pub(crate) fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Regex(x), Value::Regex(y)) => Rc::ptr_eq(x, y),
        (Value::Blob(x), Value::Blob(y)) => Rc::ptr_eq(x, y),
        (Value::Bytes(x), Value::Bytes(y)) => Rc::ptr_eq(x, y),
        (Value::Document, Value::Document)
        | (Value::Window, Value::Window)
        | (Value::Location, Value::Location)
        | (Value::DomParser, Value::DomParser)
        | (Value::XmlSerializer, Value::XmlSerializer)
        | (Value::Math, Value::Math)
        | (Value::StringConstructor, Value::StringConstructor) => true,
        (Value::HtmlElement(x), Value::HtmlElement(y)) => x == y,
        (
            Value::XmlNode { doc: da, node: na },
            Value::XmlNode { doc: db, node: nb },
        ) => da == db && na == nb,
        (
            Value::NodeList { nodes: x, .. },
            Value::NodeList { nodes: y, .. },
        ) => Rc::ptr_eq(x, y),
        (Value::Xhr(x), Value::Xhr(y)) => x == y,
        (Value::Xslt(x), Value::Xslt(y)) => x == y,
        (
            Value::ErrorObject { name: xn, message: xm },
            Value::ErrorObject { name: yn, message: ym },
        ) => xn == yn && xm == ym,
        _ => false,
    }
}

pub(crate) fn loose_eq(page: &Page, a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Number(x), Value::Str(y)) => *x == str_to_number(y),
        (Value::Str(x), Value::Number(y)) => str_to_number(x) == *y,
        (Value::Bool(_), _) => loose_eq(page, &Value::Number(to_number(page, a)), b),
        (_, Value::Bool(_)) => loose_eq(page, a, &Value::Number(to_number(page, b))),
        (Value::Array(_) | Value::Object(_), Value::Str(y)) => to_string_value(page, a) == *y,
        (Value::Str(x), Value::Array(_) | Value::Object(_)) => *x == to_string_value(page, b),
        (Value::Array(_) | Value::Object(_), Value::Number(y)) => to_number(page, a) == *y,
        (Value::Number(x), Value::Array(_) | Value::Object(_)) => *x == to_number(page, b),
        _ => strict_eq(a, b),
    }
}

// Pulls a DOM-style error name out of a message like "NetworkError: ...".
pub(crate) fn error_name(error: &Error) -> String {
    let message = error.script_message();
    if let Some((prefix, _)) = message.split_once(':') {
        if !prefix.contains(' ') && (prefix.ends_with("Error") || prefix == "DOMException") {
            return prefix.to_string();
        }
    }
    "Error".to_string()
}

// A host failure surfaced to a catch block: the name prefix moves into the
// name field so e.name and e.message read like engine-made errors.
pub(crate) fn error_to_value(error: &Error) -> Value {
    let name = error_name(error);
    let mut message = error.script_message();
    if let Some(stripped) = message.strip_prefix(&format!("{name}: ")) {
        message = stripped.to_string();
    }
    Value::ErrorObject { name, message }
}
