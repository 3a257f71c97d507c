//! Building policy trees from WS-Policy XML.
//!
//! `wsp:Policy`, `wsp:All` and `wsp:ExactlyOne` (WS-Policy 1.5 or 1.2) map to
//! the policy algebra. Every other element is an assertion and is handed to
//! the [`AssertionBuilder`] registered for its name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::assertion::{NestedPrimitiveAssertion, PolicyAssertion, PrimitiveAssertion};
use crate::error::{Error, PolicyError, PolicyErrorKind};
use crate::policy::{OperatorKind, Policy, PolicyOperator};
use crate::qname::{QName, WSP_NAMESPACE, WSP_NAMESPACE_2004};
use crate::xml::XmlElement;

const WSU_NAMESPACE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// Turns an assertion element into a [`PolicyAssertion`].
pub trait AssertionBuilder: Send + Sync {
    /// Names of the elements this builder understands.
    fn known_elements(&self) -> Vec<QName>;

    /// Builds the assertion. `builder` builds nested policies.
    ///
    /// # Errors
    ///
    /// Returns an error if the element content is not acceptable.
    fn build(&self, element: &XmlElement, builder: &PolicyBuilder<'_>)
        -> Result<PolicyAssertion, Error>;
}

/// Builds [`PrimitiveAssertion`]s for a fixed set of names.
#[derive(Debug, Clone)]
pub struct PrimitiveAssertionBuilder {
    names: Vec<QName>,
}

impl PrimitiveAssertionBuilder {
    /// Creates a builder for `names`.
    pub fn new(names: impl IntoIterator<Item = QName>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }
}

impl AssertionBuilder for PrimitiveAssertionBuilder {
    fn known_elements(&self) -> Vec<QName> {
        self.names.clone()
    }

    fn build(
        &self,
        element: &XmlElement,
        _builder: &PolicyBuilder<'_>,
    ) -> Result<PolicyAssertion, Error> {
        Ok(PrimitiveAssertion::new(element.name().clone(), is_optional(element))
            .with_ignorable(is_ignorable(element))
            .into())
    }
}

/// Builds [`NestedPrimitiveAssertion`]s for a fixed set of names.
///
/// The first child `wsp:Policy`, if any, becomes the nested policy.
#[derive(Debug, Clone)]
pub struct NestedPrimitiveAssertionBuilder {
    names: Vec<QName>,
}

impl NestedPrimitiveAssertionBuilder {
    /// Creates a builder for `names`.
    pub fn new(names: impl IntoIterator<Item = QName>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }
}

impl AssertionBuilder for NestedPrimitiveAssertionBuilder {
    fn known_elements(&self) -> Vec<QName> {
        self.names.clone()
    }

    fn build(
        &self,
        element: &XmlElement,
        builder: &PolicyBuilder<'_>,
    ) -> Result<PolicyAssertion, Error> {
        build_generic(element, builder)
    }
}

/// Registry of assertion builders keyed by element name.
#[derive(Clone, Default)]
pub struct AssertionBuilderRegistry {
    builders: HashMap<QName, Arc<dyn AssertionBuilder>>,
}

impl AssertionBuilderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `builder` for every name it knows. Later registrations win.
    pub fn register(&mut self, builder: Arc<dyn AssertionBuilder>) {
        for name in builder.known_elements() {
            self.builders.insert(name, Arc::clone(&builder));
        }
    }

    /// Returns the builder registered for `name`.
    pub fn get(&self, name: &QName) -> Option<&dyn AssertionBuilder> {
        self.builders.get(name).map(|b| b.as_ref())
    }

    /// Returns true if some builder handles `name`.
    pub fn contains(&self, name: &QName) -> bool {
        self.builders.contains_key(name)
    }
}

impl fmt::Debug for AssertionBuilderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.builders.keys().map(|n| n.to_string()).collect();
        names.sort();
        f.debug_struct("AssertionBuilderRegistry")
            .field("names", &names)
            .finish()
    }
}

/// Builds [`Policy`] trees from XML.
///
/// # Examples
///
/// ```
/// use ws_policy_core::{AssertionBuilderRegistry, PolicyBuilder};
///
/// let registry = AssertionBuilderRegistry::new();
/// let builder = PolicyBuilder::new(&registry);
/// let policy = builder
///     .build_policy(
///         r#"<wsp:Policy xmlns:wsp="http://www.w3.org/ns/ws-policy" xmlns:sp="urn:sp">
///              <wsp:ExactlyOne>
///                <sp:A/>
///                <sp:B wsp:Optional="true"/>
///              </wsp:ExactlyOne>
///            </wsp:Policy>"#,
///     )
///     .unwrap();
///
/// // {A}, {B}, {}
/// assert_eq!(policy.alternatives().len(), 3);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PolicyBuilder<'r> {
    registry: &'r AssertionBuilderRegistry,
    ignore_unknown_assertions: bool,
}

impl<'r> PolicyBuilder<'r> {
    /// Creates a builder that tolerates unknown assertions.
    pub fn new(registry: &'r AssertionBuilderRegistry) -> Self {
        Self {
            registry,
            ignore_unknown_assertions: true,
        }
    }

    /// Sets whether assertions without a registered builder are accepted.
    pub fn with_ignore_unknown_assertions(mut self, ignore: bool) -> Self {
        self.ignore_unknown_assertions = ignore;
        self
    }

    /// Parses `xml` and builds the policy rooted at its document element.
    ///
    /// # Errors
    ///
    /// Returns `Error::Xml` for malformed text and `Error::Policy` if the
    /// root is not `wsp:Policy` or an assertion cannot be built.
    pub fn build_policy(&self, xml: &str) -> Result<Policy, Error> {
        let root = XmlElement::parse(xml)?;
        self.build_policy_element(&root)
    }

    /// Builds a policy from a `wsp:Policy` element.
    ///
    /// # Errors
    ///
    /// See [`build_policy`](Self::build_policy).
    pub fn build_policy_element(&self, element: &XmlElement) -> Result<Policy, Error> {
        if !is_policy_element(element, "Policy") {
            return Err(PolicyError::new(
                PolicyErrorKind::InvalidPolicy,
                format!("expected wsp:Policy, found {}", element.name()),
            )
            .into());
        }
        let mut policy = Policy::new();
        if let Some(name) = element.attribute_local("Name") {
            policy = policy.with_name(name);
        }
        if let Some(id) = element.attribute(&QName::new(WSU_NAMESPACE, "Id")) {
            policy = policy.with_id(id);
        }
        for child in element.child_elements() {
            self.add_component(child, &mut |c| policy.add_policy_component(c))?;
        }
        Ok(policy)
    }

    /// Builds a single assertion element.
    ///
    /// # Errors
    ///
    /// Returns `PolicyErrorKind::UnknownAssertion` when no builder is
    /// registered and unknown assertions are not tolerated.
    pub fn build_assertion(&self, element: &XmlElement) -> Result<PolicyAssertion, Error> {
        if let Some(builder) = self.registry.get(element.name()) {
            return builder.build(element, self);
        }
        if !self.ignore_unknown_assertions {
            return Err(PolicyError::new(
                PolicyErrorKind::UnknownAssertion {
                    name: element.name().clone(),
                },
                "no assertion builder registered",
            )
            .into());
        }
        tracing::warn!(assertion = %element.name(), "no assertion builder registered, building generic assertion");
        build_generic(element, self)
    }

    fn build_operator(&self, element: &XmlElement, kind: OperatorKind) -> Result<PolicyOperator, Error> {
        let mut op = PolicyOperator::new(kind);
        for child in element.child_elements() {
            self.add_component(child, &mut |c| op.add_policy_component(c))?;
        }
        Ok(op)
    }

    fn add_component(
        &self,
        element: &XmlElement,
        sink: &mut dyn FnMut(crate::policy::PolicyComponent),
    ) -> Result<(), Error> {
        if element.name().is_policy_namespace() {
            match element.name().local_part() {
                // A nested wsp:Policy behaves like wsp:All.
                "All" | "Policy" => {
                    sink(self.build_operator(element, OperatorKind::All)?.into());
                }
                "ExactlyOne" => {
                    sink(self.build_operator(element, OperatorKind::ExactlyOne)?.into());
                }
                "PolicyReference" => {
                    return Err(PolicyError::new(
                        PolicyErrorKind::InvalidPolicy,
                        format!(
                            "unresolved policy reference '{}'",
                            element.attribute_local("URI").unwrap_or_default()
                        ),
                    )
                    .into());
                }
                other => {
                    return Err(PolicyError::new(
                        PolicyErrorKind::InvalidPolicy,
                        format!("unexpected policy element '{}'", other),
                    )
                    .into());
                }
            }
            return Ok(());
        }
        sink(self.build_assertion(element)?.into());
        Ok(())
    }
}

fn build_generic(element: &XmlElement, builder: &PolicyBuilder<'_>) -> Result<PolicyAssertion, Error> {
    let nested = element
        .child_elements()
        .find(|c| is_policy_element(c, "Policy"));
    let optional = is_optional(element);
    let ignorable = is_ignorable(element);
    match nested {
        Some(policy) => {
            let policy = builder.build_policy_element(policy)?;
            Ok(NestedPrimitiveAssertion::new(element.name().clone(), optional, Some(policy))
                .with_ignorable(ignorable)
                .into())
        }
        None => Ok(PrimitiveAssertion::new(element.name().clone(), optional)
            .with_ignorable(ignorable)
            .into()),
    }
}

fn is_policy_element(element: &XmlElement, local: &str) -> bool {
    element.name().is_policy_namespace() && element.name().local_part() == local
}

fn policy_flag(element: &XmlElement, local: &str) -> bool {
    [WSP_NAMESPACE, WSP_NAMESPACE_2004]
        .iter()
        .filter_map(|ns| element.attribute(&QName::new(*ns, local)))
        .any(|v| matches!(v.trim(), "true" | "1"))
}

/// Reads `wsp:Optional` as an `xs:boolean`.
pub fn is_optional(element: &XmlElement) -> bool {
    policy_flag(element, "Optional")
}

/// Reads `wsp:Ignorable` as an `xs:boolean`.
pub fn is_ignorable(element: &XmlElement) -> bool {
    policy_flag(element, "Ignorable")
}
