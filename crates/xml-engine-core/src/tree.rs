//! Arena-based XML tree model
//!
//! Documents are parsed once and never mutated afterwards. Node handles
//! are plain indices into the arena; because the arena is filled by a
//! pre-order walk, comparing two `NodeId`s compares document order.

use crate::error::{Error, Result};

/// Handle to a node inside a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Index into the owning arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// XML node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Text,
    Comment,
    ProcessingInstruction,
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    /// Qualified name as written in the source (elements and PIs).
    qname: String,
    /// Local part of the name (elements only).
    local: String,
    /// Namespace URI the element name is bound to.
    ns_uri: Option<String>,
    /// Text, comment or PI content.
    value: String,
    attrs: Vec<(String, String)>,
    /// Namespace declarations introduced on this element, as
    /// (prefix, uri) with an empty prefix for the default namespace.
    ns_decls: Vec<(String, String)>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl NodeData {
    fn empty(kind: NodeKind) -> Self {
        Self {
            kind,
            qname: String::new(),
            local: String::new(),
            ns_uri: None,
            value: String::new(),
            attrs: Vec::new(),
            ns_decls: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// One parsed (or constructed) XML document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    /// Create an empty document containing only the document node.
    /// Used by the XSLT and XQuery interpreters to build result trees.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData::empty(NodeKind::Document)],
        }
    }

    /// Parse an XML string into an owned arena document.
    pub fn parse(xml: &str) -> Result<Self> {
        Self::parse_with_options(xml, false)
    }

    /// Parse, optionally dropping whitespace-only text nodes.
    pub fn parse_with_options(xml: &str, strip_whitespace: bool) -> Result<Self> {
        let parsed = roxmltree::Document::parse(xml).map_err(|e| Error::Parse(e.to_string()))?;
        let mut doc = Document::new();
        let root = doc.root();
        for child in parsed.root().children() {
            doc.copy_from_roxml(child, root, strip_whitespace);
        }
        Ok(doc)
    }

    fn copy_from_roxml(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        parent: NodeId,
        strip_whitespace: bool,
    ) {
        match node.node_type() {
            roxmltree::NodeType::Element => {
                let tag = node.tag_name();
                let qname = match node.lookup_prefix(tag.namespace().unwrap_or("")) {
                    Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, tag.name()),
                    _ => tag.name().to_string(),
                };
                let id = self.push_element_full(
                    parent,
                    qname,
                    tag.name().to_string(),
                    tag.namespace().map(|s| s.to_string()),
                );
                for attr in node.attributes() {
                    let name = match attr.namespace().and_then(|ns| node.lookup_prefix(ns)) {
                        Some(prefix) if !prefix.is_empty() => {
                            format!("{}:{}", prefix, attr.name())
                        }
                        _ => attr.name().to_string(),
                    };
                    self.nodes[id.0].attrs.push((name, attr.value().to_string()));
                }
                // Record declarations introduced on this element so that
                // serialization can reproduce them.
                let parent_scope: Vec<_> = node
                    .parent_element()
                    .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
                    .unwrap_or_default();
                for ns in node.namespaces() {
                    let entry = (ns.name(), ns.uri());
                    if !parent_scope.contains(&entry) {
                        self.nodes[id.0].ns_decls.push((
                            ns.name().unwrap_or("").to_string(),
                            ns.uri().to_string(),
                        ));
                    }
                }
                for child in node.children() {
                    self.copy_from_roxml(child, id, strip_whitespace);
                }
            }
            roxmltree::NodeType::Text => {
                let text = node.text().unwrap_or("");
                let skip = text.is_empty()
                    || (strip_whitespace && text.chars().all(char::is_whitespace));
                if !skip {
                    self.push_text(parent, text);
                }
            }
            roxmltree::NodeType::Comment => {
                self.push_node(parent, {
                    let mut data = NodeData::empty(NodeKind::Comment);
                    data.value = node.text().unwrap_or("").to_string();
                    data
                });
            }
            roxmltree::NodeType::PI => {
                if let Some(pi) = node.pi() {
                    self.push_node(parent, {
                        let mut data = NodeData::empty(NodeKind::ProcessingInstruction);
                        data.qname = pi.target.to_string();
                        data.value = pi.value.unwrap_or("").to_string();
                        data
                    });
                }
            }
            roxmltree::NodeType::Root => {}
        }
    }

    fn push_node(&mut self, parent: NodeId, mut data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        data.parent = Some(parent);
        self.nodes.push(data);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push_element_full(
        &mut self,
        parent: NodeId,
        qname: String,
        local: String,
        ns_uri: Option<String>,
    ) -> NodeId {
        let mut data = NodeData::empty(NodeKind::Element);
        data.qname = qname;
        data.local = local;
        data.ns_uri = ns_uri;
        self.push_node(parent, data)
    }

    // ==================== Result-tree construction ====================

    /// Append an element with an unqualified name.
    pub fn push_element(&mut self, parent: NodeId, name: &str) -> NodeId {
        let local = name.rsplit(':').next().unwrap_or(name).to_string();
        self.push_element_full(parent, name.to_string(), local, None)
    }

    /// Append a text node, merging with a preceding text sibling.
    pub fn push_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if self.nodes[last.0].kind == NodeKind::Text {
                self.nodes[last.0].value.push_str(text);
                return last;
            }
        }
        let mut data = NodeData::empty(NodeKind::Text);
        data.value = text.to_string();
        self.push_node(parent, data)
    }

    /// Append a comment node.
    pub fn push_comment(&mut self, parent: NodeId, text: &str) -> NodeId {
        let mut data = NodeData::empty(NodeKind::Comment);
        data.value = text.to_string();
        self.push_node(parent, data)
    }

    /// Set an attribute on an element, replacing an existing binding.
    pub fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) {
        let attrs = &mut self.nodes[element.0].attrs;
        if let Some(slot) = attrs.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value.to_string();
        } else {
            attrs.push((name.to_string(), value.to_string()));
        }
    }

    /// Deep-copy a node (from the same or another document) as a child
    /// of `parent`.
    pub fn copy_subtree(&mut self, parent: NodeId, source: &Document, node: NodeId) -> NodeId {
        let data = &source.nodes[node.0];
        let mut copied = data.clone();
        copied.children = Vec::new();
        let id = self.push_node(parent, copied);
        for &child in &data.children {
            self.copy_subtree(id, source, child);
        }
        id
    }

    // ==================== Accessors ====================

    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The outermost element, if the document has one.
    pub fn root_element(&self) -> Option<NodeId> {
        self.nodes[0]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c.0].kind == NodeKind::Element)
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.0].kind
    }

    /// Qualified name as written in the source.
    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].qname
    }

    /// Local part of an element name.
    pub fn local_name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].local
    }

    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].ns_uri.as_deref()
    }

    /// Text, comment or PI content.
    pub fn value(&self, id: NodeId) -> &str {
        &self.nodes[id.0].value
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        &self.nodes[id.0].attrs
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0]
            .attrs
            .iter()
            .find(|(n, _)| n == name || n.rsplit(':').next() == Some(name))
            .map(|(_, v)| v.as_str())
    }

    /// All descendants of `id` (excluding `id` itself) in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(id, &mut out);
        out
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in &self.nodes[id.0].children {
            out.push(child);
            self.collect_descendants(child, out);
        }
    }

    /// XPath string value: concatenation of descendant text content.
    pub fn string_value(&self, id: NodeId) -> String {
        match self.nodes[id.0].kind {
            NodeKind::Text | NodeKind::Comment | NodeKind::ProcessingInstruction => {
                self.nodes[id.0].value.clone()
            }
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                self.append_text(id, &mut out);
                out
            }
        }
    }

    fn append_text(&self, id: NodeId, out: &mut String) {
        for &child in &self.nodes[id.0].children {
            match self.nodes[child.0].kind {
                NodeKind::Text => out.push_str(&self.nodes[child.0].value),
                NodeKind::Element => self.append_text(child, out),
                _ => {}
            }
        }
    }

    // ==================== Serialization ====================

    /// Serialize a node (compact form, no added whitespace).
    pub fn serialize(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.serialize_into(id, &mut out);
        out
    }

    /// Serialize the whole document.
    pub fn serialize_document(&self) -> String {
        self.serialize(self.root())
    }

    fn serialize_into(&self, id: NodeId, out: &mut String) {
        let data = &self.nodes[id.0];
        match data.kind {
            NodeKind::Document => {
                for &child in &data.children {
                    self.serialize_into(child, out);
                }
            }
            NodeKind::Element => {
                out.push('<');
                out.push_str(&data.qname);
                for (prefix, uri) in &data.ns_decls {
                    if prefix.is_empty() {
                        out.push_str(&format!(" xmlns=\"{}\"", escape_attr(uri)));
                    } else {
                        out.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape_attr(uri)));
                    }
                }
                for (name, value) in &data.attrs {
                    out.push_str(&format!(" {}=\"{}\"", name, escape_attr(value)));
                }
                if data.children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in &data.children {
                        self.serialize_into(child, out);
                    }
                    out.push_str("</");
                    out.push_str(&data.qname);
                    out.push('>');
                }
            }
            NodeKind::Text => out.push_str(&escape_text(&data.value)),
            NodeKind::Comment => {
                out.push_str("<!--");
                out.push_str(&data.value);
                out.push_str("-->");
            }
            NodeKind::ProcessingInstruction => {
                out.push_str("<?");
                out.push_str(&data.qname);
                if !data.value.is_empty() {
                    out.push(' ');
                    out.push_str(&data.value);
                }
                out.push_str("?>");
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}
