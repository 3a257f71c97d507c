//! WS-Policy assertion model and XML Schema cross-import repair.
//!
//! This crate provides:
//! - **Assertions**: primitive, nested and custom policy assertions with
//!   structural equality and recursive satisfaction checks
//! - **Policies**: `All` / `ExactlyOne` expressions, normalization to
//!   alternatives, merge and intersection
//! - **Assertion records**: per-exchange bookkeeping of which assertions
//!   the runtime actually honoured
//! - **Engine**: vocabulary registration and alternative selection
//! - **Schema repair**: inserting the `<xsd:import>` elements a collection
//!   of schema documents needs before strict validation
//!
//! # Core Types
//!
//! - [`PolicyAssertion`]: one of [`PrimitiveAssertion`],
//!   [`NestedPrimitiveAssertion`] or [`CustomAssertion`]
//! - [`Policy`]: a policy expression
//! - [`AssertionInfoMap`]: assertion records keyed by [`QName`]
//! - [`PolicyEngine`]: selects an alternative for an exchange
//! - [`SchemaCollection`]: schema documents keyed by target namespace
//!
//! # Examples
//!
//! ```
//! use ws_policy_core::{AssertionInfoMap, NestedPrimitiveAssertion, Policy, PolicyAssertion,
//!     PrimitiveAssertion, QName};
//!
//! let binding = QName::new("urn:sp", "TransportBinding");
//! let token = QName::new("urn:sp", "HttpsToken");
//!
//! let mut inner = Policy::new();
//! inner.add_assertion(PrimitiveAssertion::new(token.clone(), false));
//! let nested = PolicyAssertion::from(NestedPrimitiveAssertion::new(binding, false, Some(inner)));
//!
//! let mut aim = AssertionInfoMap::new([nested.clone()]);
//! assert!(!nested.is_asserted(&aim));
//!
//! aim.assert_all(&token);
//! assert!(nested.is_asserted(&aim));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod assertion;
mod assertion_info;
pub mod builder;
mod engine;
mod error;
mod policy;
mod qname;
pub mod schema;
mod selector;
mod xml;

#[cfg(test)]
mod test_utils;

pub use assertion::{
    AssertionPayload, CustomAssertion, NestedPrimitiveAssertion, PolicyAssertion,
    PrimitiveAssertion,
};
pub use assertion_info::{AssertionInfo, AssertionInfoMap};
pub use builder::{
    AssertionBuilder, AssertionBuilderRegistry, NestedPrimitiveAssertionBuilder, PolicyBuilder,
    PrimitiveAssertionBuilder,
};
pub use engine::{EngineConfig, PolicyEngine};
pub use error::{
    Error, PolicyError, PolicyErrorKind, SchemaError, SchemaErrorKind, SchemaViolation,
    ViolationReason, XmlError,
};
pub use policy::{
    Alternative, OperatorKind, Policy, PolicyComponent, PolicyOperator, vocabulary,
};
pub use qname::{QName, WSP_NAMESPACE, WSP_NAMESPACE_2004, XML_NAMESPACE, XSD_NAMESPACE};
pub use schema::{ReferenceKind, SchemaCollection, SchemaDocument, SchemaReference};
pub use selector::{
    AlternativeSelector, Assertor, FirstAlternativeSelector, MaximalAlternativeSelector,
    MinimalAlternativeSelector, SelectorKind,
};
pub use xml::{NamespaceDecl, NamespaceScope, XmlAttribute, XmlElement, XmlNode};
