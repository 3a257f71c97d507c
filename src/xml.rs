//! Owned XML element tree.
//!
//! Documents are parsed with `roxmltree` and converted into an owned,
//! mutable tree so that schema repair can insert elements and write the
//! result back out. Element and attribute names are resolved to [`QName`]s
//! at parse time; prefixes and namespace declarations are kept so that
//! QName-valued attribute content (`type="tns:Foo"`) can be resolved later
//! through a [`NamespaceScope`].
//!
//! Comments, processing instructions and whitespace-only text are dropped.

use std::fmt::Write as _;

use crate::error::XmlError;
use crate::qname::{QName, XML_NAMESPACE};

/// A namespace declaration (`xmlns` or `xmlns:prefix`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// `None` for the default namespace
    pub prefix: Option<String>,
    /// Bound URI; empty undeclares the default namespace
    pub uri: String,
}

/// An attribute with its resolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Resolved name; unqualified attributes have no namespace
    pub name: QName,
    /// Prefix used when writing a namespaced attribute
    pub prefix: Option<String>,
    /// Unescaped value
    pub value: String,
}

/// Child node of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// Nested element
    Element(XmlElement),
    /// Character data
    Text(String),
}

/// An element with its namespace declarations, attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: QName,
    prefix: Option<String>,
    namespaces: Vec<NamespaceDecl>,
    attributes: Vec<XmlAttribute>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an empty element written with `prefix`.
    pub fn new(name: QName, prefix: Option<String>) -> Self {
        Self {
            name,
            prefix,
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Parses a document and returns its root element.
    ///
    /// # Errors
    ///
    /// Returns `XmlError` if the text is not well-formed XML.
    ///
    /// # Examples
    ///
    /// ```
    /// use ws_policy_core::{QName, XmlElement};
    ///
    /// let root = XmlElement::parse(r#"<p:a xmlns:p="urn:x" b="1"><p:c/></p:a>"#).unwrap();
    /// assert_eq!(root.name(), &QName::new("urn:x", "a"));
    /// assert_eq!(root.attribute_local("b"), Some("1"));
    /// assert_eq!(root.child_elements().count(), 1);
    /// ```
    pub fn parse(text: &str) -> Result<XmlElement, XmlError> {
        let doc = roxmltree::Document::parse(text)?;
        Ok(convert(doc.root_element()))
    }

    /// Returns the resolved element name.
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Returns the prefix the element is written with.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Returns the namespace declarations made on this element.
    pub fn namespaces(&self) -> &[NamespaceDecl] {
        &self.namespaces
    }

    /// Declares a namespace on this element.
    pub fn declare_namespace(&mut self, prefix: Option<String>, uri: impl Into<String>) {
        self.namespaces.push(NamespaceDecl {
            prefix,
            uri: uri.into(),
        });
    }

    /// Returns all attributes.
    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    /// Returns the value of the attribute named `name`.
    pub fn attribute(&self, name: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| &a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Returns the value of an unqualified attribute.
    pub fn attribute_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace().is_empty() && a.name.local_part() == local)
            .map(|a| a.value.as_str())
    }

    /// Sets an unqualified attribute, replacing any previous value.
    pub fn set_attribute(&mut self, local: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.namespace().is_empty() && a.name.local_part() == local)
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(XmlAttribute {
                name: QName::local(local),
                prefix: None,
                value,
            }),
        }
    }

    /// Returns the child nodes.
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// Returns the element children in order.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// Appends a child node.
    pub fn push_child(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    /// Inserts a child node at `index` among all child nodes.
    pub fn insert_child(&mut self, index: usize, child: XmlNode) {
        let index = index.min(self.children.len());
        self.children.insert(index, child);
    }

    /// Concatenated text content of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Visits this element and all descendants in document order, with the
    /// namespace bindings in scope at each element.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a XmlElement, &NamespaceScope<'a>)) {
        let mut scope = NamespaceScope { frames: Vec::new() };
        self.walk_inner(&mut scope, visit);
    }

    fn walk_inner<'a>(
        &'a self,
        scope: &mut NamespaceScope<'a>,
        visit: &mut dyn FnMut(&'a XmlElement, &NamespaceScope<'a>),
    ) {
        scope.frames.push(&self.namespaces);
        visit(self, scope);
        for child in self.child_elements() {
            child.walk_inner(scope, visit);
        }
        scope.frames.pop();
    }

    /// Serializes the element, indenting element-only content.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, 0);
        out
    }

    fn write(&self, out: &mut String, depth: usize) {
        indent(out, depth);
        let tag = self.qualified_tag();
        out.push('<');
        out.push_str(&tag);
        for ns in &self.namespaces {
            match &ns.prefix {
                Some(p) => {
                    let _ = write!(out, " xmlns:{}=\"{}\"", p, escape(&ns.uri, true));
                }
                None => {
                    let _ = write!(out, " xmlns=\"{}\"", escape(&ns.uri, true));
                }
            }
        }
        for attr in &self.attributes {
            out.push(' ');
            if let Some(p) = &attr.prefix {
                out.push_str(p);
                out.push(':');
            }
            let _ = write!(
                out,
                "{}=\"{}\"",
                attr.name.local_part(),
                escape(&attr.value, true)
            );
        }

        if self.children.is_empty() {
            out.push_str("/>\n");
            return;
        }
        if self.children.iter().all(|c| matches!(c, XmlNode::Text(_))) {
            let _ = writeln!(out, ">{}</{}>", escape(&self.text(), false), tag);
            return;
        }
        out.push_str(">\n");
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.write(out, depth + 1),
                XmlNode::Text(t) => {
                    indent(out, depth + 1);
                    out.push_str(&escape(t.trim(), false));
                    out.push('\n');
                }
            }
        }
        indent(out, depth);
        let _ = writeln!(out, "</{}>", tag);
    }

    fn qualified_tag(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.name.local_part()),
            None => self.name.local_part().to_string(),
        }
    }
}

/// Namespace bindings in scope during a [`XmlElement::walk`].
#[derive(Debug)]
pub struct NamespaceScope<'a> {
    frames: Vec<&'a [NamespaceDecl]>,
}

impl<'a> NamespaceScope<'a> {
    /// Looks up the URI bound to `prefix` (`None` = default namespace).
    pub fn lookup(&self, prefix: Option<&str>) -> Option<&'a str> {
        if prefix == Some("xml") {
            return Some(XML_NAMESPACE);
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter())
            .find(|decl| decl.prefix.as_deref() == prefix)
            .map(|decl| decl.uri.as_str())
    }

    /// Resolves QName-valued content such as `tns:Foo` or `Foo`.
    ///
    /// Unprefixed values use the default namespace, or no namespace when
    /// none is declared. Returns `None` for an unbound prefix.
    pub fn resolve(&self, value: &str) -> Option<QName> {
        let value = value.trim();
        match value.split_once(':') {
            Some((prefix, local)) => self.lookup(Some(prefix)).map(|ns| QName::new(ns, local)),
            None => Some(QName::new(self.lookup(None).unwrap_or(""), value)),
        }
    }
}

fn convert(node: roxmltree::Node<'_, '_>) -> XmlElement {
    let in_scope = scope_of(node);
    let inherited = node.parent_element().map(scope_of).unwrap_or_default();
    let namespaces: Vec<NamespaceDecl> = in_scope
        .iter()
        .filter(|decl| !inherited.contains(decl))
        .cloned()
        .collect();

    let tag = node.tag_name();
    let ns = tag.namespace().unwrap_or("");
    let prefix = if ns.is_empty() {
        None
    } else {
        in_scope
            .iter()
            .filter(|d| d.uri == ns)
            .max_by_key(|d| d.prefix.is_some())
            .and_then(|d| d.prefix.clone())
    };

    let attributes = node
        .attributes()
        .map(|attr| {
            let attr_ns = attr.namespace().unwrap_or("");
            let prefix = if attr_ns.is_empty() {
                None
            } else if attr_ns == XML_NAMESPACE {
                Some("xml".to_string())
            } else {
                in_scope
                    .iter()
                    .find(|d| d.uri == attr_ns && d.prefix.is_some())
                    .and_then(|d| d.prefix.clone())
            };
            XmlAttribute {
                name: QName::new(attr_ns, attr.name()),
                prefix,
                value: attr.value().to_string(),
            }
        })
        .collect();

    let mut children = Vec::new();
    for child in node.children() {
        if child.is_element() {
            children.push(XmlNode::Element(convert(child)));
        } else if child.is_text() {
            if let Some(text) = child.text().filter(|t| !t.trim().is_empty()) {
                children.push(XmlNode::Text(text.to_string()));
            }
        }
    }

    XmlElement {
        name: QName::new(ns, tag.name()),
        prefix,
        namespaces,
        attributes,
        children,
    }
}

fn scope_of(node: roxmltree::Node<'_, '_>) -> Vec<NamespaceDecl> {
    node.namespaces()
        .filter(|ns| ns.name() != Some("xml"))
        .map(|ns| NamespaceDecl {
            prefix: ns.name().map(str::to_string),
            uri: ns.uri().to_string(),
        })
        .collect()
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn escape(raw: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
