//! XML Schema collections and cross-import repair.
//!
//! Independently authored schema documents often reference each other's
//! types and elements without declaring the `<xsd:import>` a strict
//! validator requires. [`SchemaCollection::add_cross_imports`] computes the
//! missing imports over the whole collection and inserts them.
//!
//! This module provides:
//! - `SchemaDocument`: one parsed schema with its references and declarations
//! - `SchemaCollection`: documents indexed by target namespace
//! - `ReferenceKind` / `SchemaReference`: QName references found in a document

mod collection;
mod document;

use std::fmt;

pub use collection::SchemaCollection;
pub use document::SchemaDocument;

use crate::qname::QName;

/// Symbol space a reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceKind {
    /// Simple or complex type (`type`, `base`, `itemType`, `memberTypes`)
    Type,
    /// Global element (`ref`, `substitutionGroup` on `element`)
    Element,
    /// Global attribute (`ref` on `attribute`)
    Attribute,
    /// Model group (`ref` on `group`)
    Group,
    /// Attribute group (`ref` on `attributeGroup`)
    AttributeGroup,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type => write!(f, "type"),
            Self::Element => write!(f, "element"),
            Self::Attribute => write!(f, "attribute"),
            Self::Group => write!(f, "group"),
            Self::AttributeGroup => write!(f, "attributeGroup"),
        }
    }
}

/// A QName-valued reference found in a schema document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReference {
    /// Symbol space
    pub kind: ReferenceKind,
    /// Raw attribute content, e.g. `tns:Address`
    pub value: String,
    /// Resolved name; `None` when the prefix is unbound
    pub target: Option<QName>,
}
