//! Namespace-indexed schema collections and cross-import repair.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::document::is_builtin_namespace;
use super::{ReferenceKind, SchemaDocument};
use crate::error::{Error, SchemaError, SchemaErrorKind, SchemaViolation, ViolationReason};
use crate::qname::QName;

/// Schema documents indexed by target namespace.
///
/// Each target namespace maps to at most one document.
///
/// # Examples
///
/// ```
/// use ws_policy_core::SchemaCollection;
///
/// let mut schemas = SchemaCollection::new();
/// schemas
///     .add_text(r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
///                    targetNamespace="urn:b"><xsd:complexType name="T"/></xsd:schema>"#)
///     .unwrap();
/// schemas
///     .add_text(r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
///                    xmlns:b="urn:b" targetNamespace="urn:a">
///                    <xsd:element name="e" type="b:T"/></xsd:schema>"#)
///     .unwrap();
///
/// assert!(schemas.validate().is_err());
/// assert_eq!(schemas.add_cross_imports(), 1);
/// assert!(schemas.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaCollection {
    documents: Vec<SchemaDocument>,
    by_namespace: HashMap<String, usize>,
}

impl SchemaCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNamespace` if a document with the same target
    /// namespace is already present.
    pub fn add(&mut self, document: SchemaDocument) -> Result<(), SchemaError> {
        let namespace = document.target_namespace().to_string();
        if self.by_namespace.contains_key(&namespace) {
            return Err(SchemaError::new(
                SchemaErrorKind::DuplicateNamespace {
                    namespace: namespace.clone(),
                },
                format!(
                    "schema {} already registered",
                    document.system_id().unwrap_or(&namespace)
                ),
            ));
        }
        tracing::debug!(namespace = %namespace, "schema added to collection");
        self.by_namespace.insert(namespace, self.documents.len());
        self.documents.push(document);
        Ok(())
    }

    /// Parses and adds schema text.
    ///
    /// # Errors
    ///
    /// Parse errors from [`SchemaDocument::parse`] and duplicate namespaces.
    pub fn add_text(&mut self, text: &str) -> Result<(), Error> {
        let document = SchemaDocument::parse(text)?;
        self.add(document)?;
        Ok(())
    }

    /// Returns the document for `namespace`.
    pub fn get(&self, namespace: &str) -> Option<&SchemaDocument> {
        self.by_namespace.get(namespace).map(|&i| &self.documents[i])
    }

    /// Returns true if a document for `namespace` is present.
    pub fn contains_namespace(&self, namespace: &str) -> bool {
        self.by_namespace.contains_key(namespace)
    }

    /// Documents in insertion order.
    pub fn documents(&self) -> impl Iterator<Item = &SchemaDocument> {
        self.documents.iter()
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Returns true if some document declares a top-level `kind` component
    /// named `name`.
    pub fn find_component(&self, kind: ReferenceKind, name: &QName) -> bool {
        self.get(name.namespace())
            .is_some_and(|doc| doc.declares(kind, name))
    }

    /// Imports each document is missing, keyed by target namespace.
    ///
    /// Only namespaces that have a document in the collection are listed.
    /// References into other foreign namespaces are logged and skipped.
    pub fn required_imports(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut plan: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for doc in &self.documents {
            let own = doc.target_namespace();
            let mut unknown = BTreeSet::new();
            for reference in doc.references() {
                let Some(target) = reference.target else {
                    continue;
                };
                let ns = target.namespace();
                if ns.is_empty() || ns == own || is_builtin_namespace(ns) || doc.imports_namespace(ns)
                {
                    continue;
                }
                if self.contains_namespace(ns) {
                    plan.entry(own.to_string()).or_default().insert(ns.to_string());
                } else {
                    unknown.insert(ns.to_string());
                }
            }
            for ns in unknown {
                tracing::warn!(
                    schema = %own,
                    namespace = %ns,
                    "referenced namespace has no schema in the collection"
                );
            }
        }
        plan
    }

    /// Inserts every missing cross-import and returns how many were added.
    ///
    /// Running it again on the repaired collection adds nothing.
    pub fn add_cross_imports(&mut self) -> usize {
        let plan = self.required_imports();
        let mut added = 0;
        for (own, namespaces) in plan {
            let Some(&index) = self.by_namespace.get(&own) else {
                continue;
            };
            let doc = &mut self.documents[index];
            for ns in namespaces {
                if doc.add_import_if_needed(&ns) {
                    tracing::debug!(schema = %own, namespace = %ns, "added schema import");
                    added += 1;
                }
            }
        }
        tracing::info!(
            schemas = self.documents.len(),
            added,
            "schema cross-import repair finished"
        );
        added
    }

    /// Strictly resolves every reference in every document.
    ///
    /// A foreign reference resolves only if its namespace is imported, has a
    /// document in the collection, and that document declares the component.
    /// References into the XSD and XML namespaces always resolve.
    ///
    /// # Errors
    ///
    /// Returns `SchemaErrorKind::Invalid` listing every unresolved reference.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut violations = Vec::new();
        for doc in &self.documents {
            let own = doc.target_namespace();
            for reference in doc.references() {
                let reason = match &reference.target {
                    None => Some(ViolationReason::UnboundPrefix),
                    Some(target) => {
                        let ns = target.namespace();
                        if is_builtin_namespace(ns) {
                            None
                        } else if ns != own && !doc.imports_namespace(ns) {
                            Some(ViolationReason::MissingImport)
                        } else if !self.contains_namespace(ns) {
                            Some(ViolationReason::UnknownNamespace)
                        } else if !self.find_component(reference.kind, target) {
                            Some(ViolationReason::MissingComponent)
                        } else {
                            None
                        }
                    }
                };
                if let Some(reason) = reason {
                    violations.push(SchemaViolation {
                        schema: own.to_string(),
                        reference: reference.kind,
                        value: reference.value,
                        target: reference.target,
                        reason,
                    });
                }
            }
        }

        if violations.is_empty() {
            return Ok(());
        }
        let message = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(SchemaError::new(SchemaErrorKind::Invalid { violations }, message))
    }
}
