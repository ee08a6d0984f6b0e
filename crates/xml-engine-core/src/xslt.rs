//! XSLT interpreter
//!
//! Compiles a stylesheet into indexed template rules with precompiled
//! XPath expressions, then instantiates templates against a source
//! tree to build a result tree. Static errors (malformed stylesheet
//! XML, bad XPath in `select`/`test` attributes) surface at compile
//! time; everything else at transform time.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::item::{sequence_string, Item, Sequence};
use crate::tree::{Document, NodeId, NodeKind};
use crate::xpath::{self, Environment, XPathProgram};

pub const XSLT_NS: &str = "http://www.w3.org/1999/XSL/Transform";

/// One part of an attribute value template.
#[derive(Debug, Clone)]
enum AvtPart {
    Text(String),
    Expr(XPathProgram),
}

#[derive(Debug, Clone, PartialEq)]
enum PatternStep {
    Name(String),
    AnyElement,
    Text,
}

/// Simplified match pattern: either the document node or a child-step
/// chain matched right to left against the node and its ancestors.
#[derive(Debug, Clone)]
enum Pattern {
    Root,
    Steps(Vec<PatternStep>),
}

impl Pattern {
    fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text == "/" {
            return Ok(Pattern::Root);
        }
        let text = text.strip_prefix('/').unwrap_or(text);
        let mut steps = Vec::new();
        for part in text.split('/') {
            let part = part.trim();
            let step = match part {
                "*" => PatternStep::AnyElement,
                "text()" => PatternStep::Text,
                name if !name.is_empty()
                    && name
                        .chars()
                        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':') =>
                {
                    PatternStep::Name(name.rsplit(':').next().unwrap_or(name).to_string())
                }
                other => {
                    return Err(Error::XsltCompile(format!(
                        "unsupported match pattern step '{other}'"
                    )))
                }
            };
            steps.push(step);
        }
        Ok(Pattern::Steps(steps))
    }

    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        match self {
            Pattern::Root => doc.kind(node) == NodeKind::Document,
            Pattern::Steps(steps) => {
                let mut current = Some(node);
                for step in steps.iter().rev() {
                    let node = match current {
                        Some(n) => n,
                        None => return false,
                    };
                    let ok = match step {
                        PatternStep::Name(name) => {
                            doc.kind(node) == NodeKind::Element && doc.local_name(node) == name
                        }
                        PatternStep::AnyElement => doc.kind(node) == NodeKind::Element,
                        PatternStep::Text => doc.kind(node) == NodeKind::Text,
                    };
                    if !ok {
                        return false;
                    }
                    current = doc.parent(node);
                }
                true
            }
        }
    }

    /// Longer patterns win over shorter ones, names over wildcards.
    fn specificity(&self) -> usize {
        match self {
            Pattern::Root => 1,
            Pattern::Steps(steps) => {
                steps.len() * 2
                    + usize::from(matches!(steps.last(), Some(PatternStep::Name(_))))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct TemplateRule {
    pattern: Pattern,
    body: NodeId,
}

#[derive(Debug, Clone)]
struct GlobalParam {
    name: String,
    default: Option<XPathProgram>,
}

/// A compiled stylesheet.
#[derive(Debug, Clone)]
pub struct StylesheetProgram {
    sheet: Document,
    templates: Vec<TemplateRule>,
    params: Vec<GlobalParam>,
    selects: HashMap<(NodeId, &'static str), XPathProgram>,
    avts: HashMap<(NodeId, String), Vec<AvtPart>>,
}

/// Compile a stylesheet from its XML text.
pub fn compile(stylesheet: &str) -> Result<StylesheetProgram> {
    let sheet =
        Document::parse(stylesheet).map_err(|e| Error::XsltCompile(e.to_string()))?;
    let root = sheet
        .root_element()
        .ok_or_else(|| Error::XsltCompile("stylesheet has no document element".to_string()))?;
    if sheet.namespace_uri(root) != Some(XSLT_NS)
        || !matches!(sheet.local_name(root), "stylesheet" | "transform")
    {
        return Err(Error::XsltCompile(
            "document element is not xsl:stylesheet".to_string(),
        ));
    }

    let mut program = StylesheetProgram {
        sheet: sheet.clone(),
        templates: Vec::new(),
        params: Vec::new(),
        selects: HashMap::new(),
        avts: HashMap::new(),
    };

    for &child in sheet.children(root) {
        if sheet.kind(child) != NodeKind::Element {
            continue;
        }
        if sheet.namespace_uri(child) != Some(XSLT_NS) {
            continue;
        }
        match sheet.local_name(child) {
            "template" => {
                let pattern_text = sheet.attribute(child, "match").ok_or_else(|| {
                    Error::XsltCompile("xsl:template without match attribute".to_string())
                })?;
                let pattern = Pattern::parse(pattern_text)?;
                program.compile_body(&sheet, child)?;
                program.templates.push(TemplateRule {
                    pattern,
                    body: child,
                });
            }
            "param" => {
                let name = sheet.attribute(child, "name").ok_or_else(|| {
                    Error::XsltCompile("xsl:param without name attribute".to_string())
                })?;
                let default = match sheet.attribute(child, "select") {
                    Some(select) => Some(
                        xpath::compile(select)
                            .map_err(|e| Error::XsltCompile(e.to_string()))?,
                    ),
                    None => None,
                };
                program.params.push(GlobalParam {
                    name: name.to_string(),
                    default,
                });
            }
            // Serialization hints are accepted and ignored.
            "output" | "strip-space" | "preserve-space" => {}
            other => {
                return Err(Error::XsltCompile(format!(
                    "unsupported top-level declaration xsl:{other}"
                )))
            }
        }
    }

    if program.templates.is_empty() {
        return Err(Error::XsltCompile(
            "stylesheet declares no templates".to_string(),
        ));
    }
    Ok(program)
}

impl StylesheetProgram {
    /// Precompile `select`/`test` attributes and attribute value
    /// templates in a template body.
    fn compile_body(&mut self, sheet: &Document, node: NodeId) -> Result<()> {
        for &child in sheet.children(node) {
            if sheet.kind(child) != NodeKind::Element {
                continue;
            }
            if sheet.namespace_uri(child) == Some(XSLT_NS) {
                for attr in ["select", "test"] {
                    if let Some(text) = sheet.attribute(child, attr) {
                        let program = xpath::compile(text)
                            .map_err(|e| Error::XsltCompile(e.to_string()))?;
                        self.selects.insert((child, attr), program);
                    }
                }
            } else {
                for (name, value) in sheet.attributes(child) {
                    if value.contains('{') {
                        let parts = compile_avt(value)?;
                        self.avts.insert((child, name.clone()), parts);
                    }
                }
            }
            self.compile_body(sheet, child)?;
        }
        Ok(())
    }

    fn select(&self, node: NodeId, attr: &'static str) -> Option<&XPathProgram> {
        self.selects.get(&(node, attr))
    }

    /// Run the stylesheet against a source document.
    ///
    /// `params` override the defaults of global `xsl:param`
    /// declarations; `initial_params` are the invocation-time initial
    /// template parameters, visible to templates under their names
    /// whether tunnelled or not.
    pub fn transform(
        &self,
        source: &Document,
        params: &HashMap<String, Sequence>,
        initial_params: &HashMap<String, Sequence>,
    ) -> Result<Document> {
        let mut env = Environment::default();
        for param in &self.params {
            let value = match params.get(&param.name) {
                Some(value) => value.clone(),
                None => match &param.default {
                    Some(program) => program.evaluate(source, None, &env)?,
                    None => Vec::new(),
                },
            };
            env.variables.insert(param.name.clone(), value);
        }
        for (name, value) in params {
            env.variables
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        for (name, value) in initial_params {
            env.variables.insert(name.clone(), value.clone());
        }

        let mut runtime = Runtime {
            program: self,
            source,
            env,
            output: Document::new(),
        };
        let output_root = runtime.output.root();
        runtime.apply_templates(&[Item::Node(source.root())], output_root)?;
        Ok(runtime.output)
    }
}

struct Runtime<'a> {
    program: &'a StylesheetProgram,
    source: &'a Document,
    env: Environment,
    output: Document,
}

impl Runtime<'_> {
    fn apply_templates(&mut self, items: &[Item], out_parent: NodeId) -> Result<()> {
        for item in items {
            let node = match item {
                Item::Node(id) => *id,
                atomic => {
                    let text = atomic.string_value(self.source);
                    self.output.push_text(out_parent, &text);
                    continue;
                }
            };
            match self.best_rule(node) {
                Some(body) => self.instantiate(body, &Item::Node(node), out_parent)?,
                None => self.builtin_rule(node, out_parent)?,
            }
        }
        Ok(())
    }

    /// Highest specificity wins; among equals the later declaration.
    fn best_rule(&self, node: NodeId) -> Option<NodeId> {
        let mut best: Option<(usize, usize, NodeId)> = None;
        for (index, rule) in self.program.templates.iter().enumerate() {
            if !rule.pattern.matches(self.source, node) {
                continue;
            }
            let key = (rule.pattern.specificity(), index, rule.body);
            if best.map_or(true, |b| (key.0, key.1) >= (b.0, b.1)) {
                best = Some(key);
            }
        }
        best.map(|(_, _, body)| body)
    }

    fn builtin_rule(&mut self, node: NodeId, out_parent: NodeId) -> Result<()> {
        match self.source.kind(node) {
            NodeKind::Document | NodeKind::Element => {
                let children: Vec<Item> = self
                    .source
                    .children(node)
                    .iter()
                    .map(|&c| Item::Node(c))
                    .collect();
                self.apply_templates(&children, out_parent)
            }
            NodeKind::Text => {
                let text = self.source.value(node).to_string();
                self.output.push_text(out_parent, &text);
                Ok(())
            }
            NodeKind::Comment | NodeKind::ProcessingInstruction => Ok(()),
        }
    }

    fn instantiate(&mut self, body: NodeId, context: &Item, out_parent: NodeId) -> Result<()> {
        let sheet = &self.program.sheet;
        for &child in sheet.children(body) {
            self.instantiate_node(child, context, out_parent)?;
        }
        Ok(())
    }

    fn instantiate_node(
        &mut self,
        node: NodeId,
        context: &Item,
        out_parent: NodeId,
    ) -> Result<()> {
        let sheet = &self.program.sheet;
        match sheet.kind(node) {
            NodeKind::Text => {
                let text = sheet.value(node);
                if !text.trim().is_empty() {
                    self.output.push_text(out_parent, text);
                }
                Ok(())
            }
            NodeKind::Element if sheet.namespace_uri(node) == Some(XSLT_NS) => {
                self.instruction(node, context, out_parent)
            }
            NodeKind::Element => {
                // Literal result element.
                let name = sheet.name(node).to_string();
                let element = self.output.push_element(out_parent, &name);
                let attrs: Vec<(String, String)> = sheet.attributes(node).to_vec();
                for (attr_name, attr_value) in attrs {
                    let value = match self.program.avts.get(&(node, attr_name.clone())) {
                        Some(parts) => self.expand_avt(parts, context)?,
                        None => attr_value,
                    };
                    self.output.set_attribute(element, &attr_name, &value);
                }
                for &child in self.program.sheet.children(node) {
                    self.instantiate_node(child, context, element)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn instruction(&mut self, node: NodeId, context: &Item, out_parent: NodeId) -> Result<()> {
        let sheet = &self.program.sheet;
        match sheet.local_name(node) {
            "value-of" => {
                let seq = self.eval_select(node, "select", context)?;
                let text = sequence_string(&seq, self.source);
                if !text.is_empty() {
                    self.output.push_text(out_parent, &text);
                }
                Ok(())
            }
            "apply-templates" => {
                let items = match self.program.select(node, "select") {
                    Some(_) => self.eval_select(node, "select", context)?,
                    None => match context {
                        Item::Node(id) => self
                            .source
                            .children(*id)
                            .iter()
                            .map(|&c| Item::Node(c))
                            .collect(),
                        _ => Vec::new(),
                    },
                };
                self.apply_templates(&items, out_parent)
            }
            "for-each" => {
                let items = self.eval_select(node, "select", context)?;
                for item in items {
                    self.instantiate(node, &item, out_parent)?;
                }
                Ok(())
            }
            "if" => {
                let seq = self.eval_select(node, "test", context)?;
                if crate::item::effective_boolean_value(&seq, self.source) {
                    self.instantiate(node, context, out_parent)?;
                }
                Ok(())
            }
            "choose" => {
                let branches: Vec<NodeId> = sheet.children(node).to_vec();
                for branch in branches {
                    if sheet.kind(branch) != NodeKind::Element {
                        continue;
                    }
                    match sheet.local_name(branch) {
                        "when" => {
                            let seq = self.eval_select(branch, "test", context)?;
                            if crate::item::effective_boolean_value(&seq, self.source) {
                                return self.instantiate(branch, context, out_parent);
                            }
                        }
                        "otherwise" => {
                            return self.instantiate(branch, context, out_parent);
                        }
                        _ => {}
                    }
                }
                Ok(())
            }
            "copy-of" => {
                let seq = self.eval_select(node, "select", context)?;
                for item in seq {
                    match item {
                        Item::Node(id) => {
                            self.output.copy_subtree(out_parent, self.source, id);
                        }
                        atomic => {
                            let text = atomic.string_value(self.source);
                            self.output.push_text(out_parent, &text);
                        }
                    }
                }
                Ok(())
            }
            "text" => {
                let text = self.program.sheet.string_value(node);
                self.output.push_text(out_parent, &text);
                Ok(())
            }
            other => Err(Error::XsltRuntime(format!(
                "unsupported instruction xsl:{other}"
            ))),
        }
    }

    fn eval_select(
        &mut self,
        node: NodeId,
        attr: &'static str,
        context: &Item,
    ) -> Result<Sequence> {
        let program = self.program.select(node, attr).ok_or_else(|| {
            Error::XsltRuntime(format!(
                "xsl:{} is missing its {attr} attribute",
                self.program.sheet.local_name(node)
            ))
        })?;
        program.evaluate(self.source, Some(context.clone()), &self.env)
    }

    fn expand_avt(&mut self, parts: &[AvtPart], context: &Item) -> Result<String> {
        let mut out = String::new();
        for part in parts {
            match part {
                AvtPart::Text(text) => out.push_str(text),
                AvtPart::Expr(program) => {
                    let seq =
                        program.evaluate(self.source, Some(context.clone()), &self.env)?;
                    out.push_str(&sequence_string(&seq, self.source));
                }
            }
        }
        Ok(out)
    }
}

fn compile_avt(value: &str) -> Result<Vec<AvtPart>> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                if !text.is_empty() {
                    parts.push(AvtPart::Text(std::mem::take(&mut text)));
                }
                let mut expr = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    expr.push(c);
                }
                if !closed {
                    return Err(Error::XsltCompile(format!(
                        "unterminated attribute value template in '{value}'"
                    )));
                }
                parts.push(AvtPart::Expr(
                    xpath::compile(&expr).map_err(|e| Error::XsltCompile(e.to_string()))?,
                ));
            }
            c => text.push(c),
        }
    }
    if !text.is_empty() {
        parts.push(AvtPart::Text(text));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERSON_XML: &str =
        "<out><person>text1</person><person>text2</person><person>text3</person></out>";

    const VALUES_XSL: &str = r#"<xsl:stylesheet version="2.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:param name="values" select="(2,3,4)"/>
  <xsl:template match="/">
    <output>
      <xsl:value-of select="/out/person[1]/text()"/>
      <xsl:for-each select="$values">
        <out><xsl:value-of select=". * 3"/></out>
      </xsl:for-each>
    </output>
  </xsl:template>
</xsl:stylesheet>"#;

    #[test]
    fn values_param_transform() {
        let source = Document::parse(PERSON_XML).unwrap();
        let program = compile(VALUES_XSL).unwrap();
        let result = program
            .transform(&source, &HashMap::new(), &HashMap::new())
            .unwrap();
        assert_eq!(
            result.serialize_document(),
            "<output>text1<out>6</out><out>9</out><out>12</out></output>"
        );
    }

    #[test]
    fn supplied_param_overrides_default() {
        let source = Document::parse(PERSON_XML).unwrap();
        let program = compile(VALUES_XSL).unwrap();
        let mut params = HashMap::new();
        params.insert("values".to_string(), vec![Item::Integer(10)]);
        let result = program
            .transform(&source, &params, &HashMap::new())
            .unwrap();
        assert_eq!(
            result.serialize_document(),
            "<output>text1<out>30</out></output>"
        );
    }

    #[test]
    fn template_match_and_builtin_rules() {
        let source = Document::parse("<r><a>1</a><b>2</b></r>").unwrap();
        let sheet = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="a"><hit><xsl:value-of select="."/></hit></xsl:template>
</xsl:stylesheet>"#;
        let program = compile(sheet).unwrap();
        let result = program
            .transform(&source, &HashMap::new(), &HashMap::new())
            .unwrap();
        // Built-in rules walk into <b> and copy its text.
        assert_eq!(result.serialize_document(), "<hit>1</hit>2");
    }

    #[test]
    fn attribute_value_template() {
        let source = Document::parse("<r><a id=\"7\"/></r>").unwrap();
        let sheet = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/"><item ref="{//a/@id}"/></xsl:template>
</xsl:stylesheet>"#;
        let program = compile(sheet).unwrap();
        let result = program
            .transform(&source, &HashMap::new(), &HashMap::new())
            .unwrap();
        assert_eq!(result.serialize_document(), "<item ref=\"7\"/>");
    }

    #[test]
    fn choose_instruction() {
        let source = Document::parse("<r><n>5</n></r>").unwrap();
        let sheet = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/">
    <xsl:choose>
      <xsl:when test="/r/n > 3"><big/></xsl:when>
      <xsl:otherwise><small/></xsl:otherwise>
    </xsl:choose>
  </xsl:template>
</xsl:stylesheet>"#;
        let program = compile(sheet).unwrap();
        let result = program
            .transform(&source, &HashMap::new(), &HashMap::new())
            .unwrap();
        assert_eq!(result.serialize_document(), "<big/>");
    }

    #[test]
    fn bad_select_fails_at_compile() {
        let sheet = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/"><xsl:value-of select="//[broken"/></xsl:template>
</xsl:stylesheet>"#;
        let error = compile(sheet).unwrap_err();
        assert!(matches!(error, Error::XsltCompile(_)));
    }

    #[test]
    fn malformed_stylesheet_fails_at_compile() {
        assert!(compile("<xsl:stylesheet").is_err());
        assert!(compile("<not-a-stylesheet/>").is_err());
    }
}
