//! A single XML Schema document: its declarations, references and imports.

use super::{ReferenceKind, SchemaReference};
use crate::error::{Error, SchemaError, SchemaErrorKind};
use crate::qname::{QName, XML_NAMESPACE, XSD_NAMESPACE};
use crate::xml::{XmlElement, XmlNode};

/// A parsed XML Schema document.
///
/// # Examples
///
/// ```
/// use ws_policy_core::SchemaDocument;
///
/// let mut doc = SchemaDocument::parse(
///     r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
///                    targetNamespace="urn:orders"/>"#,
/// )
/// .unwrap();
///
/// assert!(doc.add_import_if_needed("urn:customers"));
/// assert!(!doc.add_import_if_needed("urn:customers"));
/// assert!(doc.imports_namespace("urn:customers"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDocument {
    system_id: Option<String>,
    target_namespace: String,
    root: XmlElement,
}

impl SchemaDocument {
    /// Parses schema text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Xml` for malformed text and `Error::Schema` if the
    /// root element is not `xsd:schema`.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let root = XmlElement::parse(text)?;
        Ok(Self::from_element(root)?)
    }

    /// Wraps an already parsed `xsd:schema` element.
    ///
    /// # Errors
    ///
    /// Returns `SchemaErrorKind::NotASchema` for any other root.
    pub fn from_element(root: XmlElement) -> Result<Self, SchemaError> {
        if root.name() != &QName::new(XSD_NAMESPACE, "schema") {
            return Err(SchemaError::new(
                SchemaErrorKind::NotASchema,
                format!("root element is {}", root.name()),
            ));
        }
        let target_namespace = root
            .attribute_local("targetNamespace")
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            system_id: None,
            target_namespace,
            root,
        })
    }

    /// Attaches a location label used in diagnostics.
    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    /// Returns the location label, if any.
    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    /// Returns the target namespace (empty for none).
    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    /// Returns the `xsd:schema` element.
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    /// Namespaces imported by this document. An import without a
    /// `namespace` attribute imports the empty namespace.
    pub fn imports(&self) -> Vec<&str> {
        self.root
            .child_elements()
            .filter(|c| is_xsd(c, "import"))
            .map(|c| c.attribute_local("namespace").unwrap_or_default())
            .collect()
    }

    /// Returns true if an `<xsd:import>` for `namespace` exists.
    pub fn imports_namespace(&self, namespace: &str) -> bool {
        self.imports().contains(&namespace)
    }

    /// Adds `<xsd:import namespace="..."/>` unless it is already there.
    ///
    /// The empty namespace, the XSD namespace and the document's own target
    /// namespace are never imported. Returns true if an import was added.
    pub fn add_import_if_needed(&mut self, namespace: &str) -> bool {
        if namespace.is_empty()
            || namespace == XSD_NAMESPACE
            || namespace == self.target_namespace
            || self.imports_namespace(namespace)
        {
            return false;
        }

        let mut import = XmlElement::new(
            QName::new(XSD_NAMESPACE, "import"),
            self.root.prefix().map(str::to_string),
        );
        import.set_attribute("namespace", namespace);

        // Imports must precede every definition: keep them after the
        // leading include/import/redefine/annotation block.
        let mut position = 0;
        for (i, child) in self.root.children().iter().enumerate() {
            match child {
                XmlNode::Element(e) if is_composition(e) => position = i + 1,
                XmlNode::Element(_) => break,
                XmlNode::Text(_) => {}
            }
        }
        self.root.insert_child(position, XmlNode::Element(import));
        true
    }

    /// Top-level named components declared by this document.
    pub fn declarations(&self) -> Vec<(ReferenceKind, QName)> {
        self.root
            .child_elements()
            .filter(|c| c.name().namespace() == XSD_NAMESPACE)
            .filter_map(|c| {
                let kind = match c.name().local_part() {
                    "element" => ReferenceKind::Element,
                    "attribute" => ReferenceKind::Attribute,
                    "complexType" | "simpleType" => ReferenceKind::Type,
                    "group" => ReferenceKind::Group,
                    "attributeGroup" => ReferenceKind::AttributeGroup,
                    _ => return None,
                };
                let name = c.attribute_local("name")?;
                Some((kind, QName::new(self.target_namespace.clone(), name)))
            })
            .collect()
    }

    /// Returns true if a top-level component of `kind` named `name` exists.
    pub fn declares(&self, kind: ReferenceKind, name: &QName) -> bool {
        name.namespace() == self.target_namespace
            && self
                .declarations()
                .iter()
                .any(|(k, n)| *k == kind && n == name)
    }

    /// Every QName reference in the document, in document order.
    pub fn references(&self) -> Vec<SchemaReference> {
        let mut out = Vec::new();
        self.root.walk(&mut |el, scope| {
            if el.name().namespace() != XSD_NAMESPACE {
                return;
            }
            let mut push = |kind: ReferenceKind, attr: &str| {
                if let Some(value) = el.attribute_local(attr) {
                    out.push(SchemaReference {
                        kind,
                        value: value.to_string(),
                        target: scope.resolve(value),
                    });
                }
            };
            match el.name().local_part() {
                "element" => {
                    push(ReferenceKind::Type, "type");
                    push(ReferenceKind::Element, "ref");
                    push(ReferenceKind::Element, "substitutionGroup");
                }
                "attribute" => {
                    push(ReferenceKind::Type, "type");
                    push(ReferenceKind::Attribute, "ref");
                }
                "extension" | "restriction" => push(ReferenceKind::Type, "base"),
                "list" => push(ReferenceKind::Type, "itemType"),
                "group" => push(ReferenceKind::Group, "ref"),
                "attributeGroup" => push(ReferenceKind::AttributeGroup, "ref"),
                "union" => {
                    if let Some(members) = el.attribute_local("memberTypes") {
                        for member in members.split_whitespace() {
                            out.push(SchemaReference {
                                kind: ReferenceKind::Type,
                                value: member.to_string(),
                                target: scope.resolve(member),
                            });
                        }
                    }
                }
                _ => {}
            }
        });
        out
    }

    /// Serializes the (possibly repaired) document.
    pub fn to_xml_string(&self) -> String {
        self.root.to_xml_string()
    }
}

/// References into these namespaces never need an import.
pub(crate) fn is_builtin_namespace(namespace: &str) -> bool {
    namespace == XSD_NAMESPACE || namespace == XML_NAMESPACE
}

fn is_xsd(element: &XmlElement, local: &str) -> bool {
    element.name().namespace() == XSD_NAMESPACE && element.name().local_part() == local
}

fn is_composition(element: &XmlElement) -> bool {
    ["include", "import", "redefine", "annotation"]
        .iter()
        .any(|local| is_xsd(element, local))
}
