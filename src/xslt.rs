use std::collections::HashMap;

use crate::xml::xpath::{self, Axis, NodeTest, Path, PathExpr};
use crate::xml::{DOCUMENT_ROOT, XmlDocument, XmlNodeId, XmlNodeKind};
use crate::{Error, Result};

pub const XSL_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
const RESULT_NAMESPACE: &str = "http://www.mozilla.org/TransforMiix";

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
enum OutputMethod {
    #[default]
    Xml,
    Text,
}

#[derive(Clone, Debug)]
struct TemplateEntry {
    body: XmlNodeId,
    pattern: Option<PathExpr>,
    name: Option<String>,
    priority: Option<f64>,
    order: usize,
}

#[derive(Clone, Debug)]
pub(crate) struct CompiledStylesheet {
    doc: XmlDocument,
    templates: Vec<TemplateEntry>,
    output_method: OutputMethod,
    top_params: Vec<(String, ValueSource)>,
    top_variables: Vec<(String, ValueSource)>,
}

// Where a parameter or variable takes its value from: a select
// expression or the element's instantiated content.
#[derive(Clone, Debug)]
enum ValueSource {
    Select(String),
    Content(XmlNodeId),
}

#[derive(Default)]
pub(crate) struct XsltProcessor {
    stylesheet: Option<CompiledStylesheet>,
    params: HashMap<String, String>,
}

impl XsltProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import_stylesheet(&mut self, doc: &XmlDocument) -> Result<()> {
        self.stylesheet = Some(compile(doc)?);
        Ok(())
    }

    pub fn set_parameter(&mut self, name: &str, value: &str) {
        self.params.insert(name.to_string(), value.to_string());
    }

    pub fn get_parameter(&self, name: &str) -> Option<String> {
        self.params.get(name).cloned()
    }

    pub fn remove_parameter(&mut self, name: &str) {
        self.params.remove(name);
    }

    pub fn clear_parameters(&mut self) {
        self.params.clear();
    }

    pub fn reset(&mut self) {
        self.stylesheet = None;
        self.params.clear();
    }

    pub fn transform_to_document(&self, source: &XmlDocument) -> Result<XmlDocument> {
        let result = self.run(source)?;
        if result.doc.document_element().is_some() && result.method == OutputMethod::Xml {
            return Ok(result.doc);
        }
        // Text output (or a rootless tree) is wrapped the way Gecko's
        // transformiix engine reports it.
        let text = result.doc.text_content(DOCUMENT_ROOT);
        let mut doc = XmlDocument::new();
        let root = doc.create_element_ns(Some(RESULT_NAMESPACE), "transformiix:result");
        doc.set_attribute_ns(
            root,
            Some("http://www.w3.org/2000/xmlns/"),
            "xmlns:transformiix",
            RESULT_NAMESPACE,
        );
        if !text.is_empty() {
            let node = doc.create_text(&text);
            doc.append_child(root, node)?;
        }
        doc.append_child(DOCUMENT_ROOT, root)?;
        Ok(doc)
    }

    pub fn transform_to_fragment(
        &self,
        source: &XmlDocument,
        target: &mut XmlDocument,
    ) -> Result<XmlNodeId> {
        let result = self.run(source)?;
        let fragment = target.create_fragment();
        if result.method == OutputMethod::Text {
            let text = result.doc.text_content(DOCUMENT_ROOT);
            if !text.is_empty() {
                let node = target.create_text(&text);
                target.append_child(fragment, node)?;
            }
            return Ok(fragment);
        }
        for &child in &result.doc.children(DOCUMENT_ROOT).to_vec() {
            let copy = target.import_from(&result.doc, child, true);
            target.append_child(fragment, copy)?;
        }
        Ok(fragment)
    }

    fn run(&self, source: &XmlDocument) -> Result<TransformOutput> {
        let style = self
            .stylesheet
            .as_ref()
            .ok_or_else(|| Error::Xslt("no stylesheet imported".to_string()))?;
        let mut runner = Runner {
            style,
            source,
            scopes: vec![HashMap::new()],
            depth: 0,
        };
        let mut out = ResultBuilder::new();

        for (name, source_value) in &style.top_variables {
            let value = runner.value_of_source(source_value, Context::root())?;
            runner.scopes[0].insert(name.clone(), value);
        }
        for (name, source_value) in &style.top_params {
            let value = match self.params.get(name) {
                Some(external) => external.clone(),
                None => runner.value_of_source(source_value, Context::root())?,
            };
            runner.scopes[0].insert(name.clone(), value);
        }

        runner.apply_templates(&[DOCUMENT_ROOT], Context::root(), &HashMap::new(), &mut out)?;
        Ok(TransformOutput {
            doc: out.finish(),
            method: style.output_method,
        })
    }
}

struct TransformOutput {
    doc: XmlDocument,
    method: OutputMethod,
}

#[derive(Clone, Copy)]
struct Context {
    node: XmlNodeId,
    position: usize,
    size: usize,
}

impl Context {
    fn root() -> Self {
        Self {
            node: DOCUMENT_ROOT,
            position: 1,
            size: 1,
        }
    }
}

fn compile(doc: &XmlDocument) -> Result<CompiledStylesheet> {
    let root = doc
        .document_element()
        .ok_or_else(|| Error::Xslt("stylesheet has no root element".to_string()))?;
    if doc.node_name(root) == "parsererror" {
        return Err(Error::Xslt(format!(
            "stylesheet failed to parse: {}",
            doc.text_content(root)
        )));
    }
    let root_name = doc
        .element_name(root)
        .ok_or_else(|| Error::Xslt("stylesheet has no root element".to_string()))?;
    if root_name.namespace.as_deref() != Some(XSL_NAMESPACE)
        || !matches!(root_name.local.as_str(), "stylesheet" | "transform")
    {
        return Err(Error::Xslt(
            "root element is not an XSL stylesheet".to_string(),
        ));
    }

    let mut doc = doc.clone();
    strip_stylesheet_whitespace(&mut doc, root);

    let mut templates = Vec::new();
    let mut output_method = OutputMethod::default();
    let mut top_params = Vec::new();
    let mut top_variables = Vec::new();

    for &child in &doc.children(root).to_vec() {
        let Some(local) = xsl_local_name(&doc, child) else {
            continue;
        };
        match local.as_str() {
            "template" => {
                let pattern = match doc.get_attribute(child, "match") {
                    Some(pattern) => Some(xpath::parse(&pattern)?),
                    None => None,
                };
                let name = doc.get_attribute(child, "name");
                if pattern.is_none() && name.is_none() {
                    return Err(Error::Xslt(
                        "xsl:template needs a match pattern or a name".to_string(),
                    ));
                }
                let priority = match doc.get_attribute(child, "priority") {
                    Some(raw) => Some(raw.trim().parse::<f64>().map_err(|_| {
                        Error::Xslt(format!("invalid template priority '{raw}'"))
                    })?),
                    None => None,
                };
                templates.push(TemplateEntry {
                    body: child,
                    pattern,
                    name,
                    priority,
                    order: templates.len(),
                });
            }
            "output" => {
                if let Some(method) = doc.get_attribute(child, "method") {
                    output_method = match method.as_str() {
                        "text" => OutputMethod::Text,
                        _ => OutputMethod::Xml,
                    };
                }
            }
            "param" => {
                let (name, value) = read_binding(&doc, child)?;
                top_params.push((name, value));
            }
            "variable" => {
                let (name, value) = read_binding(&doc, child)?;
                top_variables.push((name, value));
            }
            _ => {}
        }
    }

    Ok(CompiledStylesheet {
        doc,
        templates,
        output_method,
        top_params,
        top_variables,
    })
}

fn read_binding(doc: &XmlDocument, node: XmlNodeId) -> Result<(String, ValueSource)> {
    let name = doc
        .get_attribute(node, "name")
        .ok_or_else(|| Error::Xslt("binding element is missing a name".to_string()))?;
    let value = match doc.get_attribute(node, "select") {
        Some(select) => ValueSource::Select(select),
        None => ValueSource::Content(node),
    };
    Ok((name, value))
}

fn xsl_local_name(doc: &XmlDocument, node: XmlNodeId) -> Option<String> {
    let name = doc.element_name(node)?;
    if name.namespace.as_deref() == Some(XSL_NAMESPACE) {
        Some(name.local.clone())
    } else {
        None
    }
}

fn strip_stylesheet_whitespace(doc: &mut XmlDocument, node: XmlNodeId) {
    if xsl_local_name(doc, node).as_deref() == Some("text") {
        return;
    }
    let children = doc.children(node).to_vec();
    for child in children {
        match doc.kind(child) {
            XmlNodeKind::Text(data) if data.chars().all(char::is_whitespace) => {
                doc.detach(child);
            }
            XmlNodeKind::Element { .. } => strip_stylesheet_whitespace(doc, child),
            _ => {}
        }
    }
}

// Result tree under construction. Adjacent text runs merge so the
// output matches what a streaming serializer would produce.
struct ResultBuilder {
    doc: XmlDocument,
    stack: Vec<XmlNodeId>,
}

impl ResultBuilder {
    fn new() -> Self {
        Self {
            doc: XmlDocument::new(),
            stack: vec![DOCUMENT_ROOT],
        }
    }

    fn parent(&self) -> XmlNodeId {
        *self.stack.last().unwrap_or(&DOCUMENT_ROOT)
    }

    fn append_text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let parent = self.parent();
        if let Some(&last) = self.doc.children(parent).last() {
            if matches!(self.doc.kind(last), XmlNodeKind::Text(_)) {
                let merged = format!("{}{}", self.doc.text_content(last), text);
                self.doc.set_node_value(last, &merged);
                return Ok(());
            }
        }
        let node = self.doc.create_text(text);
        self.doc.append_child(parent, node)
    }

    fn start_element(&mut self, namespace: Option<&str>, qualified: &str) -> Result<()> {
        let element = self.doc.create_element_ns(namespace, qualified);
        self.doc.append_child(self.parent(), element)?;
        self.stack.push(element);
        Ok(())
    }

    fn end_element(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    fn add_attribute(&mut self, namespace: Option<&str>, qualified: &str, value: &str) -> Result<()> {
        let parent = self.parent();
        if parent == DOCUMENT_ROOT || !matches!(self.doc.kind(parent), XmlNodeKind::Element { .. }) {
            return Err(Error::Xslt(format!(
                "cannot create attribute '{qualified}' without an open element"
            )));
        }
        self.doc.set_attribute_ns(parent, namespace, qualified, value);
        Ok(())
    }

    fn append_comment(&mut self, data: &str) -> Result<()> {
        let node = self.doc.create_comment(data);
        self.doc.append_child(self.parent(), node)
    }

    fn append_import(&mut self, source: &XmlDocument, node: XmlNodeId) -> Result<()> {
        match source.kind(node) {
            XmlNodeKind::Attribute { name, value } => {
                let name = name.clone();
                let value = value.clone();
                self.add_attribute(name.namespace.as_deref(), &name.qualified(), &value)
            }
            XmlNodeKind::Text(data) | XmlNodeKind::CData(data) => {
                let data = data.clone();
                self.append_text(&data)
            }
            XmlNodeKind::Document => {
                for &child in source.children(node) {
                    self.append_import(source, child)?;
                }
                Ok(())
            }
            _ => {
                let copy = self.doc.import_from(source, node, true);
                self.doc.append_child(self.parent(), copy)
            }
        }
    }

    fn finish(self) -> XmlDocument {
        self.doc
    }
}

const MAX_TEMPLATE_DEPTH: usize = 512;

struct Runner<'a> {
    style: &'a CompiledStylesheet,
    source: &'a XmlDocument,
    scopes: Vec<HashMap<String, String>>,
    depth: usize,
}

impl<'a> Runner<'a> {
    fn lookup_variable(&self, name: &str) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    fn apply_templates(
        &mut self,
        nodes: &[XmlNodeId],
        _outer: Context,
        params: &HashMap<String, String>,
        out: &mut ResultBuilder,
    ) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_TEMPLATE_DEPTH {
            self.depth -= 1;
            return Err(Error::Xslt("template recursion is too deep".to_string()));
        }
        let size = nodes.len();
        for (i, &node) in nodes.iter().enumerate() {
            let context = Context {
                node,
                position: i + 1,
                size,
            };
            match self.find_template(node) {
                Some(template) => self.instantiate_template(template, context, params, out)?,
                None => self.builtin_rule(context, out)?,
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn find_template(&self, node: XmlNodeId) -> Option<&'a TemplateEntry> {
        let mut best: Option<(&TemplateEntry, f64)> = None;
        for template in &self.style.templates {
            let Some(pattern) = &template.pattern else {
                continue;
            };
            let Some(matched_path) = pattern
                .paths
                .iter()
                .find(|path| pattern_matches(self.source, node, path))
            else {
                continue;
            };
            let priority = template
                .priority
                .unwrap_or_else(|| default_priority(matched_path));
            let wins = match best {
                None => true,
                // Ties go to the later declaration.
                Some((current, current_priority)) => {
                    priority > current_priority
                        || (priority == current_priority && template.order > current.order)
                }
            };
            if wins {
                best = Some((template, priority));
            }
        }
        best.map(|(template, _)| template)
    }

    fn builtin_rule(&mut self, context: Context, out: &mut ResultBuilder) -> Result<()> {
        match self.source.kind(context.node) {
            XmlNodeKind::Document | XmlNodeKind::Element { .. } => {
                let children = self.source.children(context.node).to_vec();
                self.apply_templates(&children, context, &HashMap::new(), out)
            }
            XmlNodeKind::Text(data) | XmlNodeKind::CData(data) => {
                let data = data.clone();
                out.append_text(&data)
            }
            XmlNodeKind::Attribute { value, .. } => {
                let value = value.clone();
                out.append_text(&value)
            }
            _ => Ok(()),
        }
    }

    fn instantiate_template(
        &mut self,
        template: &'a TemplateEntry,
        context: Context,
        params: &HashMap<String, String>,
        out: &mut ResultBuilder,
    ) -> Result<()> {
        self.scopes.push(HashMap::new());
        let result = self.run_template_body(template.body, context, params, out);
        self.scopes.pop();
        result
    }

    fn run_template_body(
        &mut self,
        body: XmlNodeId,
        context: Context,
        params: &HashMap<String, String>,
        out: &mut ResultBuilder,
    ) -> Result<()> {
        let children = self.style.doc.children(body).to_vec();
        let mut rest_from = 0usize;
        for (i, &child) in children.iter().enumerate() {
            if xsl_local_name(&self.style.doc, child).as_deref() == Some("param") {
                let (name, source_value) = read_binding(&self.style.doc, child)?;
                let value = match params.get(&name) {
                    Some(passed) => passed.clone(),
                    None => self.value_of_source(&source_value, context)?,
                };
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name, value);
                }
                rest_from = i + 1;
            } else {
                break;
            }
        }
        for &child in &children[rest_from..] {
            self.execute(child, context, out)?;
        }
        Ok(())
    }

    fn execute(&mut self, style_node: XmlNodeId, context: Context, out: &mut ResultBuilder) -> Result<()> {
        let style_doc = &self.style.doc;
        match style_doc.kind(style_node) {
            XmlNodeKind::Text(data) | XmlNodeKind::CData(data) => {
                let data = data.clone();
                return out.append_text(&data);
            }
            XmlNodeKind::Element { .. } => {}
            _ => return Ok(()),
        }

        let Some(local) = xsl_local_name(style_doc, style_node) else {
            return self.literal_element(style_node, context, out);
        };
        match local.as_str() {
            "apply-templates" => {
                let params = self.collect_with_params(style_node, context)?;
                let nodes = match self.style.doc.get_attribute(style_node, "select") {
                    Some(select) => self.select_nodes(&select, context)?,
                    None => self.source.children(context.node).to_vec(),
                };
                self.apply_templates(&nodes, context, &params, out)
            }
            "call-template" => {
                let name = self
                    .style
                    .doc
                    .get_attribute(style_node, "name")
                    .ok_or_else(|| Error::Xslt("xsl:call-template needs a name".to_string()))?;
                let template = self
                    .style
                    .templates
                    .iter()
                    .find(|t| t.name.as_deref() == Some(name.as_str()))
                    .ok_or_else(|| Error::Xslt(format!("no template named '{name}'")))?;
                let params = self.collect_with_params(style_node, context)?;
                self.depth += 1;
                if self.depth > MAX_TEMPLATE_DEPTH {
                    self.depth -= 1;
                    return Err(Error::Xslt("template recursion is too deep".to_string()));
                }
                let result = self.instantiate_template(template, context, &params, out);
                self.depth -= 1;
                result
            }
            "value-of" => {
                let select = self
                    .style
                    .doc
                    .get_attribute(style_node, "select")
                    .ok_or_else(|| Error::Xslt("xsl:value-of needs a select".to_string()))?;
                let value = self.eval_string(&select, context)?;
                out.append_text(&value)
            }
            "for-each" => {
                let select = self
                    .style
                    .doc
                    .get_attribute(style_node, "select")
                    .ok_or_else(|| Error::Xslt("xsl:for-each needs a select".to_string()))?;
                let nodes = self.select_nodes(&select, context)?;
                let size = nodes.len();
                for (i, node) in nodes.into_iter().enumerate() {
                    let inner = Context {
                        node,
                        position: i + 1,
                        size,
                    };
                    self.scopes.push(HashMap::new());
                    let result = self.run_template_body(style_node, inner, &HashMap::new(), out);
                    self.scopes.pop();
                    result?;
                }
                Ok(())
            }
            "if" => {
                let test = self
                    .style
                    .doc
                    .get_attribute(style_node, "test")
                    .ok_or_else(|| Error::Xslt("xsl:if needs a test".to_string()))?;
                if self.eval_test(&test, context)? {
                    self.run_template_body(style_node, context, &HashMap::new(), out)?;
                }
                Ok(())
            }
            "choose" => {
                for &branch in &self.style.doc.children(style_node).to_vec() {
                    match xsl_local_name(&self.style.doc, branch).as_deref() {
                        Some("when") => {
                            let test = self
                                .style
                                .doc
                                .get_attribute(branch, "test")
                                .ok_or_else(|| Error::Xslt("xsl:when needs a test".to_string()))?;
                            if self.eval_test(&test, context)? {
                                return self.run_template_body(branch, context, &HashMap::new(), out);
                            }
                        }
                        Some("otherwise") => {
                            return self.run_template_body(branch, context, &HashMap::new(), out);
                        }
                        _ => {}
                    }
                }
                Ok(())
            }
            "text" => {
                let data = self.style.doc.text_content(style_node);
                out.append_text(&data)
            }
            "element" => {
                let name_attr = self
                    .style
                    .doc
                    .get_attribute(style_node, "name")
                    .ok_or_else(|| Error::Xslt("xsl:element needs a name".to_string()))?;
                let name = self.eval_avt(&name_attr, context)?;
                out.start_element(None, &name)?;
                let result = self.run_template_body(style_node, context, &HashMap::new(), out);
                out.end_element();
                result
            }
            "attribute" => {
                let name_attr = self
                    .style
                    .doc
                    .get_attribute(style_node, "name")
                    .ok_or_else(|| Error::Xslt("xsl:attribute needs a name".to_string()))?;
                let name = self.eval_avt(&name_attr, context)?;
                let value = self.content_as_string(style_node, context)?;
                out.add_attribute(None, &name, &value)
            }
            "comment" => {
                let data = self.content_as_string(style_node, context)?;
                out.append_comment(&data)
            }
            "copy" => {
                match self.source.kind(context.node) {
                    XmlNodeKind::Element { name } => {
                        let name = name.clone();
                        out.start_element(name.namespace.as_deref(), &name.qualified())?;
                        let result = self.run_template_body(style_node, context, &HashMap::new(), out);
                        out.end_element();
                        result
                    }
                    XmlNodeKind::Document | XmlNodeKind::DocumentFragment => {
                        self.run_template_body(style_node, context, &HashMap::new(), out)
                    }
                    _ => out.append_import(self.source, context.node),
                }
            }
            "copy-of" => {
                let select = self
                    .style
                    .doc
                    .get_attribute(style_node, "select")
                    .ok_or_else(|| Error::Xslt("xsl:copy-of needs a select".to_string()))?;
                if let Some(name) = select.trim().strip_prefix('$') {
                    let value = self.lookup_variable(name).ok_or_else(|| {
                        Error::Xslt(format!("unknown variable '${name}'"))
                    })?;
                    return out.append_text(&value);
                }
                for node in self.select_nodes(&select, context)? {
                    out.append_import(self.source, node)?;
                }
                Ok(())
            }
            "variable" => {
                let (name, source_value) = read_binding(&self.style.doc, style_node)?;
                let value = self.value_of_source(&source_value, context)?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name, value);
                }
                Ok(())
            }
            "param" => Ok(()),
            other => Err(Error::Xslt(format!("unsupported instruction xsl:{other}"))),
        }
    }

    fn literal_element(
        &mut self,
        style_node: XmlNodeId,
        context: Context,
        out: &mut ResultBuilder,
    ) -> Result<()> {
        let name = match self.style.doc.element_name(style_node) {
            Some(name) => name.clone(),
            None => return Ok(()),
        };
        out.start_element(name.namespace.as_deref(), &name.qualified())?;
        for &attr in &self.style.doc.attributes(style_node).to_vec() {
            let Some(attr_name) = self.style.doc.attribute_name(attr).cloned() else {
                continue;
            };
            // Drop declarations of the XSL namespace itself.
            let value = self.style.doc.node_value(attr).unwrap_or_default();
            if (attr_name.qualified() == "xmlns" || attr_name.prefix.as_deref() == Some("xmlns"))
                && value == XSL_NAMESPACE
            {
                continue;
            }
            let evaluated = self.eval_avt(&value, context)?;
            out.add_attribute(attr_name.namespace.as_deref(), &attr_name.qualified(), &evaluated)?;
        }
        let result = self.run_template_body(style_node, context, &HashMap::new(), out);
        out.end_element();
        result
    }

    fn collect_with_params(
        &mut self,
        style_node: XmlNodeId,
        context: Context,
    ) -> Result<HashMap<String, String>> {
        let mut params = HashMap::new();
        for &child in &self.style.doc.children(style_node).to_vec() {
            if xsl_local_name(&self.style.doc, child).as_deref() == Some("with-param") {
                let (name, source_value) = read_binding(&self.style.doc, child)?;
                let value = self.value_of_source(&source_value, context)?;
                params.insert(name, value);
            }
        }
        Ok(params)
    }

    fn value_of_source(&mut self, source_value: &ValueSource, context: Context) -> Result<String> {
        match source_value {
            ValueSource::Select(select) => self.eval_string(select, context),
            ValueSource::Content(node) => self.content_as_string(*node, context),
        }
    }

    fn content_as_string(&mut self, style_node: XmlNodeId, context: Context) -> Result<String> {
        let mut scratch = ResultBuilder::new();
        self.run_template_body(style_node, context, &HashMap::new(), &mut scratch)?;
        let doc = scratch.finish();
        Ok(doc.text_content(DOCUMENT_ROOT))
    }

    fn select_nodes(&self, select: &str, context: Context) -> Result<Vec<XmlNodeId>> {
        xpath::select_str(self.source, context.node, select)
    }

    fn eval_string(&mut self, expr: &str, context: Context) -> Result<String> {
        let expr = expr.trim();
        if let Some(name) = expr.strip_prefix('$') {
            return self
                .lookup_variable(name)
                .ok_or_else(|| Error::Xslt(format!("unknown variable '${name}'")));
        }
        if (expr.starts_with('\'') && expr.ends_with('\'') && expr.len() >= 2)
            || (expr.starts_with('"') && expr.ends_with('"') && expr.len() >= 2)
        {
            return Ok(expr[1..expr.len() - 1].to_string());
        }
        if expr == "position()" {
            return Ok(context.position.to_string());
        }
        if expr == "last()" {
            return Ok(context.size.to_string());
        }
        let nodes = self.select_nodes(expr, context)?;
        Ok(nodes
            .first()
            .map(|&node| xpath::string_value(self.source, node))
            .unwrap_or_default())
    }

    fn eval_test(&mut self, test: &str, context: Context) -> Result<bool> {
        let test = test.trim();
        if let Some(inner) = test
            .strip_prefix("not(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return Ok(!self.eval_test(inner, context)?);
        }
        if let Some(at) = find_comparison(test, "!=") {
            let lhs = self.eval_string(&test[..at], context)?;
            let rhs = self.eval_string(&test[at + 2..], context)?;
            return Ok(lhs != rhs);
        }
        if let Some(at) = find_comparison(test, "=") {
            let lhs = self.eval_string(&test[..at], context)?;
            let rhs = self.eval_string(&test[at + 1..], context)?;
            return Ok(lhs == rhs);
        }
        if let Some(name) = test.strip_prefix('$') {
            let value = self
                .lookup_variable(name)
                .ok_or_else(|| Error::Xslt(format!("unknown variable '${name}'")))?;
            return Ok(!value.is_empty());
        }
        Ok(!self.select_nodes(test, context)?.is_empty())
    }

    fn eval_avt(&mut self, template: &str, context: Context) -> Result<String> {
        let mut out = String::new();
        let mut chars = template.chars().peekable();
        let mut expr = String::new();
        let mut in_expr = false;
        while let Some(ch) = chars.next() {
            match ch {
                '{' if !in_expr => {
                    if chars.peek() == Some(&'{') {
                        chars.next();
                        out.push('{');
                    } else {
                        in_expr = true;
                        expr.clear();
                    }
                }
                '}' if !in_expr => {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                    }
                    out.push('}');
                }
                '}' if in_expr => {
                    out.push_str(&self.eval_string(&expr, context)?);
                    in_expr = false;
                }
                _ if in_expr => expr.push(ch),
                _ => out.push(ch),
            }
        }
        if in_expr {
            return Err(Error::Xslt(format!(
                "unterminated attribute value template '{template}'"
            )));
        }
        Ok(out)
    }
}

// Comparison operators split outside quoted strings only.
fn find_comparison(test: &str, op: &str) -> Option<usize> {
    let bytes = test.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i + op.len() <= bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                } else if &test[i..i + op.len()] == op {
                    if op == "=" && i > 0 && bytes[i - 1] == b'!' {
                        i += 1;
                        continue;
                    }
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

fn pattern_matches(doc: &XmlDocument, node: XmlNodeId, path: &Path) -> bool {
    match_steps(doc, node, &path.steps, path.absolute)
}

fn match_steps(doc: &XmlDocument, node: XmlNodeId, steps: &[xpath::Step], absolute: bool) -> bool {
    let Some((last, rest)) = steps.split_last() else {
        return !absolute || node == DOCUMENT_ROOT;
    };
    if last.axis == Axis::DescendantOrSelf && last.test == NodeTest::AnyNode {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if match_steps(doc, current, rest, absolute) {
                return true;
            }
            cursor = doc.parent(current);
        }
        return false;
    }
    if !step_matches_node(doc, node, last) {
        return false;
    }
    match doc.parent(node) {
        Some(parent) => match_steps(doc, parent, rest, absolute),
        None => rest.is_empty() && !absolute,
    }
}

fn step_matches_node(doc: &XmlDocument, node: XmlNodeId, step: &xpath::Step) -> bool {
    let is_attribute = matches!(doc.kind(node), XmlNodeKind::Attribute { .. });
    match step.axis {
        Axis::Attribute => {
            if !is_attribute || !xpath::attribute_matches(doc, node, &step.test) {
                return false;
            }
        }
        Axis::Child => {
            if is_attribute || !xpath::node_matches(doc, node, &step.test) {
                return false;
            }
        }
        _ => return false,
    }
    if step.predicates.is_empty() {
        return true;
    }
    let (position, size) = sibling_position(doc, node, step);
    step.predicates
        .iter()
        .all(|p| xpath::eval_predicate(doc, node, position, size, p))
}

fn sibling_position(doc: &XmlDocument, node: XmlNodeId, step: &xpath::Step) -> (usize, usize) {
    let Some(parent) = doc.parent(node) else {
        return (1, 1);
    };
    let peers: Vec<XmlNodeId> = doc
        .children(parent)
        .iter()
        .copied()
        .filter(|&c| xpath::node_matches(doc, c, &step.test))
        .collect();
    let position = peers.iter().position(|&c| c == node).map_or(1, |i| i + 1);
    (position, peers.len())
}

fn default_priority(path: &Path) -> f64 {
    if path.steps.is_empty() {
        return -0.5;
    }
    if path.steps.len() != 1 || path.absolute {
        return 0.5;
    }
    let step = &path.steps[0];
    if !step.predicates.is_empty() {
        return 0.5;
    }
    match &step.test {
        NodeTest::Name(_) => 0.0,
        _ => -0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{parse_document, serialize_node};

    fn transform(stylesheet: &str, source: &str) -> String {
        let style_doc = parse_document(stylesheet).unwrap();
        let source_doc = parse_document(source).unwrap();
        let mut processor = XsltProcessor::new();
        processor.import_stylesheet(&style_doc).unwrap();
        let result = processor.transform_to_document(&source_doc).unwrap();
        serialize_node(&result, DOCUMENT_ROOT)
    }

    const XSL_OPEN: &str =
        "<xsl:stylesheet version=\"1.0\" xmlns:xsl=\"http://www.w3.org/1999/XSL/Transform\">";

    #[test]
    fn value_of_and_literal_elements() {
        let out = transform(
            &format!(
                "{XSL_OPEN}<xsl:template match=\"/\"><out><xsl:value-of select=\"/doc/name\"/></out>\
                 </xsl:template></xsl:stylesheet>"
            ),
            "<doc><name>Ada</name></doc>",
        );
        assert_eq!(out, "<out>Ada</out>");
    }

    #[test]
    fn for_each_with_position() {
        let out = transform(
            &format!(
                "{XSL_OPEN}<xsl:template match=\"/\"><list><xsl:for-each select=\"//item\">\
                 <entry n=\"{{position()}}\"><xsl:value-of select=\".\"/></entry>\
                 </xsl:for-each></list></xsl:template></xsl:stylesheet>"
            ),
            "<doc><item>a</item><item>b</item></doc>",
        );
        assert_eq!(
            out,
            "<list><entry n=\"1\">a</entry><entry n=\"2\">b</entry></list>"
        );
    }

    #[test]
    fn choose_picks_first_true_branch() {
        let stylesheet = format!(
            "{XSL_OPEN}<xsl:template match=\"/\"><xsl:for-each select=\"//n\">\
             <xsl:choose>\
             <xsl:when test=\". = 'x'\"><hit/></xsl:when>\
             <xsl:otherwise><miss/></xsl:otherwise>\
             </xsl:choose></xsl:for-each></xsl:template></xsl:stylesheet>"
        );
        let out = transform(&stylesheet, "<r><n>x</n><n>y</n></r>");
        assert_eq!(out, "<hit/><miss/>");
    }

    #[test]
    fn template_matching_prefers_specific_patterns() {
        let stylesheet = format!(
            "{XSL_OPEN}\
             <xsl:template match=\"*\"><any><xsl:apply-templates/></any></xsl:template>\
             <xsl:template match=\"b\"><bee/></xsl:template>\
             </xsl:stylesheet>"
        );
        let out = transform(&stylesheet, "<a><b/></a>");
        assert_eq!(out, "<any><bee/></any>");
    }

    #[test]
    fn explicit_priority_beats_default() {
        let stylesheet = format!(
            "{XSL_OPEN}\
             <xsl:template match=\"b\"><named/></xsl:template>\
             <xsl:template match=\"*\" priority=\"2\"><starred><xsl:apply-templates/></starred></xsl:template>\
             </xsl:stylesheet>"
        );
        let out = transform(&stylesheet, "<b/>");
        assert_eq!(out, "<starred/>");
    }

    #[test]
    fn call_template_with_params() {
        let stylesheet = format!(
            "{XSL_OPEN}\
             <xsl:template match=\"/\"><xsl:call-template name=\"greet\">\
             <xsl:with-param name=\"who\" select=\"'world'\"/></xsl:call-template></xsl:template>\
             <xsl:template name=\"greet\"><xsl:param name=\"who\" select=\"'nobody'\"/>\
             <p>hello <xsl:value-of select=\"$who\"/></p></xsl:template>\
             </xsl:stylesheet>"
        );
        assert_eq!(transform(&stylesheet, "<x/>"), "<p>hello world</p>");
    }

    #[test]
    fn element_and_attribute_instructions() {
        let stylesheet = format!(
            "{XSL_OPEN}<xsl:template match=\"/\">\
             <xsl:element name=\"tag\"><xsl:attribute name=\"k\"><xsl:value-of select=\"/r/@v\"/>\
             </xsl:attribute>body</xsl:element></xsl:template></xsl:stylesheet>"
        );
        assert_eq!(transform(&stylesheet, "<r v=\"7\"/>"), "<tag k=\"7\">body</tag>");
    }

    #[test]
    fn copy_of_imports_subtrees() {
        let stylesheet = format!(
            "{XSL_OPEN}<xsl:template match=\"/\"><wrap><xsl:copy-of select=\"//keep\"/></wrap>\
             </xsl:template></xsl:stylesheet>"
        );
        assert_eq!(
            transform(&stylesheet, "<r><keep a=\"1\"><in>t</in></keep><skip/></r>"),
            "<wrap><keep a=\"1\"><in>t</in></keep></wrap>"
        );
    }

    #[test]
    fn builtin_rules_walk_down_to_text() {
        let stylesheet = format!(
            "{XSL_OPEN}<xsl:template match=\"title\"><h1><xsl:apply-templates/></h1></xsl:template>\
             </xsl:stylesheet>"
        );
        let out = transform(&stylesheet, "<doc><title>T</title><body>B</body></doc>");
        assert_eq!(out, "<h1>T</h1>B");
    }

    #[test]
    fn text_output_wraps_in_result_root() {
        let stylesheet = format!(
            "{XSL_OPEN}<xsl:output method=\"text\"/>\
             <xsl:template match=\"/\"><xsl:value-of select=\"/r\"/></xsl:template>\
             </xsl:stylesheet>"
        );
        let style_doc = parse_document(&stylesheet).unwrap();
        let source_doc = parse_document("<r>plain</r>").unwrap();
        let mut processor = XsltProcessor::new();
        processor.import_stylesheet(&style_doc).unwrap();
        let result = processor.transform_to_document(&source_doc).unwrap();
        let root = result.document_element().unwrap();
        assert_eq!(result.node_name(root), "transformiix:result");
        assert_eq!(result.text_content(root), "plain");
    }

    #[test]
    fn fragments_land_in_the_target_document() {
        let style_doc = parse_document(&format!(
            "{XSL_OPEN}<xsl:template match=\"/\"><li><xsl:value-of select=\"/r\"/></li>\
             </xsl:template></xsl:stylesheet>"
        ))
        .unwrap();
        let source_doc = parse_document("<r>item</r>").unwrap();
        let mut target = parse_document("<ul/>").unwrap();
        let mut processor = XsltProcessor::new();
        processor.import_stylesheet(&style_doc).unwrap();
        let fragment = processor
            .transform_to_fragment(&source_doc, &mut target)
            .unwrap();
        let ul = target.document_element().unwrap();
        target.append_child(ul, fragment).unwrap();
        assert_eq!(
            serialize_node(&target, DOCUMENT_ROOT),
            "<ul><li>item</li></ul>"
        );
    }

    #[test]
    fn external_parameters_override_defaults() {
        let style_doc = parse_document(&format!(
            "{XSL_OPEN}<xsl:param name=\"mode\" select=\"'default'\"/>\
             <xsl:template match=\"/\"><m><xsl:value-of select=\"$mode\"/></m></xsl:template>\
             </xsl:stylesheet>"
        ))
        .unwrap();
        let source_doc = parse_document("<x/>").unwrap();
        let mut processor = XsltProcessor::new();
        processor.import_stylesheet(&style_doc).unwrap();
        processor.set_parameter("mode", "custom");
        let result = processor.transform_to_document(&source_doc).unwrap();
        assert_eq!(
            serialize_node(&result, DOCUMENT_ROOT),
            "<m>custom</m>"
        );
        assert_eq!(processor.get_parameter("mode"), Some("custom".to_string()));

        processor.remove_parameter("mode");
        let result = processor.transform_to_document(&source_doc).unwrap();
        assert_eq!(serialize_node(&result, DOCUMENT_ROOT), "<m>default</m>");
    }

    #[test]
    fn rejects_non_stylesheet_roots() {
        let doc = parse_document("<not-a-stylesheet/>").unwrap();
        let mut processor = XsltProcessor::new();
        assert!(processor.import_stylesheet(&doc).is_err());
    }

    #[test]
    fn transform_without_stylesheet_fails() {
        let processor = XsltProcessor::new();
        let source = parse_document("<x/>").unwrap();
        assert!(processor.transform_to_document(&source).is_err());
    }

    #[test]
    fn runaway_recursion_is_cut_off() {
        let stylesheet = format!(
            "{XSL_OPEN}<xsl:template match=\"/\"><xsl:call-template name=\"loop\"/></xsl:template>\
             <xsl:template name=\"loop\"><xsl:call-template name=\"loop\"/></xsl:template>\
             </xsl:stylesheet>"
        );
        let style_doc = parse_document(&stylesheet).unwrap();
        let source = parse_document("<x/>").unwrap();
        let mut processor = XsltProcessor::new();
        processor.import_stylesheet(&style_doc).unwrap();
        assert!(processor.transform_to_document(&source).is_err());
    }
}
