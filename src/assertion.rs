//! Policy assertions.
//!
//! An assertion is a named requirement or capability claim. Three shapes
//! exist, flattened into the [`PolicyAssertion`] sum type:
//!
//! - [`PrimitiveAssertion`]: a leaf with no payload
//! - [`NestedPrimitiveAssertion`]: a leaf wrapping a whole sub-policy
//! - [`CustomAssertion`]: a leaf whose identity also depends on a
//!   domain-specific [`AssertionPayload`]
//!
//! Equality (`equal`) is per variant; mismatched variants are never equal.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::assertion_info::AssertionInfoMap;
use crate::policy::Policy;
use crate::qname::QName;

/// Domain-specific data carried by a [`CustomAssertion`].
///
/// Implementations decide what "the same requirement" means for their
/// payload. `equal` must not panic and must return `false` for payloads of
/// a different concrete type.
///
/// # Examples
///
/// ```
/// use std::any::Any;
/// use ws_policy_core::AssertionPayload;
///
/// #[derive(Debug)]
/// struct Timeout(u64);
///
/// impl AssertionPayload for Timeout {
///     fn equal(&self, other: &dyn AssertionPayload) -> bool {
///         other.as_any().downcast_ref::<Timeout>().is_some_and(|o| o.0 == self.0)
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
///
/// assert!(Timeout(30).equal(&Timeout(30)));
/// assert!(!Timeout(30).equal(&Timeout(60)));
/// ```
pub trait AssertionPayload: fmt::Debug + Send + Sync {
    /// Returns true if `other` expresses the same requirement.
    fn equal(&self, other: &dyn AssertionPayload) -> bool;

    /// Upcast used for downcasting to the concrete payload type.
    fn as_any(&self) -> &dyn Any;
}

/// A leaf assertion identified by name and optionality.
#[derive(Debug, Clone)]
pub struct PrimitiveAssertion {
    name: QName,
    optional: bool,
    ignorable: bool,
}

impl PrimitiveAssertion {
    /// Creates a primitive assertion.
    pub fn new(name: QName, optional: bool) -> Self {
        Self {
            name,
            optional,
            ignorable: false,
        }
    }

    /// Marks the assertion as ignorable (`wsp:Ignorable`).
    pub fn with_ignorable(mut self, ignorable: bool) -> Self {
        self.ignorable = ignorable;
        self
    }

    /// Returns the assertion name.
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Returns true if the assertion is optional.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Returns true if the assertion is ignorable.
    pub fn is_ignorable(&self) -> bool {
        self.ignorable
    }

    /// Compares name and optional flag.
    pub fn equal(&self, other: &PrimitiveAssertion) -> bool {
        self.name == other.name && self.optional == other.optional
    }

    /// An optional assertion is trivially satisfied; otherwise at least one
    /// record registered under its name must be asserted.
    pub fn is_asserted(&self, aim: &AssertionInfoMap) -> bool {
        self.optional || any_asserted(aim, &self.name)
    }
}

/// An assertion wrapping a sub-policy.
///
/// The sub-policy is exclusively owned; cloning the assertion deep-copies it.
#[derive(Debug, Clone)]
pub struct NestedPrimitiveAssertion {
    name: QName,
    optional: bool,
    ignorable: bool,
    policy: Option<Policy>,
}

impl NestedPrimitiveAssertion {
    /// Creates a nested assertion. `policy` may be absent.
    pub fn new(name: QName, optional: bool, policy: Option<Policy>) -> Self {
        Self {
            name,
            optional,
            ignorable: false,
            policy,
        }
    }

    /// Marks the assertion as ignorable (`wsp:Ignorable`).
    pub fn with_ignorable(mut self, ignorable: bool) -> Self {
        self.ignorable = ignorable;
        self
    }

    /// Returns the assertion name.
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Returns true if the assertion is optional.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Returns true if the assertion is ignorable.
    pub fn is_ignorable(&self) -> bool {
        self.ignorable
    }

    /// Returns the nested policy, if any.
    pub fn policy(&self) -> Option<&Policy> {
        self.policy.as_ref()
    }

    /// Returns a mutable handle on the nested policy, if any.
    pub fn policy_mut(&mut self) -> Option<&mut Policy> {
        self.policy.as_mut()
    }

    /// Replaces the nested policy.
    pub fn set_policy(&mut self, policy: Option<Policy>) {
        self.policy = policy;
    }

    /// Compares name, optional flag and nested policy content.
    ///
    /// An absent nested policy equals an empty one.
    pub fn equal(&self, other: &NestedPrimitiveAssertion) -> bool {
        if self.name != other.name || self.optional != other.optional {
            return false;
        }
        match (self.non_empty_policy(), other.non_empty_policy()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.equal(b),
            _ => false,
        }
    }

    /// Evaluates the nested policy against the exchange's assertion records.
    ///
    /// Optional assertions and absent or empty nested policies are
    /// vacuously asserted. Otherwise some alternative of the nested policy
    /// must have every member supported by `aim`: nested members recurse on
    /// their own contents, other members need every record registered
    /// under their name to be asserted. The policy is never expanded.
    pub fn is_asserted(&self, aim: &AssertionInfoMap) -> bool {
        if self.optional {
            return true;
        }
        let Some(policy) = self.non_empty_policy() else {
            return true;
        };
        aim.supports_policy(policy)
    }

    fn non_empty_policy(&self) -> Option<&Policy> {
        self.policy.as_ref().filter(|p| !p.is_empty())
    }
}

/// A leaf assertion whose identity includes a domain payload.
#[derive(Debug, Clone)]
pub struct CustomAssertion {
    name: QName,
    optional: bool,
    ignorable: bool,
    payload: Arc<dyn AssertionPayload>,
}

impl CustomAssertion {
    /// Creates a custom assertion carrying `payload`.
    pub fn new(name: QName, optional: bool, payload: Arc<dyn AssertionPayload>) -> Self {
        Self {
            name,
            optional,
            ignorable: false,
            payload,
        }
    }

    /// Marks the assertion as ignorable (`wsp:Ignorable`).
    pub fn with_ignorable(mut self, ignorable: bool) -> Self {
        self.ignorable = ignorable;
        self
    }

    /// Returns the assertion name.
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Returns true if the assertion is optional.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Returns true if the assertion is ignorable.
    pub fn is_ignorable(&self) -> bool {
        self.ignorable
    }

    /// Returns the payload.
    pub fn payload(&self) -> &dyn AssertionPayload {
        self.payload.as_ref()
    }

    /// Returns the payload as its concrete type, if it is a `T`.
    pub fn payload_as<T: 'static>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref::<T>()
    }

    /// Compares name, optional flag and payload.
    pub fn equal(&self, other: &CustomAssertion) -> bool {
        self.name == other.name
            && self.optional == other.optional
            && self.payload.equal(other.payload.as_ref())
    }

    /// Same rule as a primitive assertion.
    pub fn is_asserted(&self, aim: &AssertionInfoMap) -> bool {
        self.optional || any_asserted(aim, &self.name)
    }
}

/// Any assertion that can appear in a policy.
///
/// # Examples
///
/// ```
/// use ws_policy_core::{NestedPrimitiveAssertion, PolicyAssertion, PrimitiveAssertion, QName};
///
/// let a: PolicyAssertion = PrimitiveAssertion::new(QName::local("abc"), false).into();
/// let n: PolicyAssertion = NestedPrimitiveAssertion::new(QName::local("nested"), false, None).into();
///
/// assert!(a.equal(&a));
/// assert!(!a.equal(&n));
/// ```
#[derive(Debug, Clone)]
pub enum PolicyAssertion {
    /// A leaf assertion
    Primitive(PrimitiveAssertion),
    /// An assertion wrapping a sub-policy
    Nested(NestedPrimitiveAssertion),
    /// A leaf assertion with a domain payload
    Custom(CustomAssertion),
}

impl PolicyAssertion {
    /// Returns the assertion name.
    pub fn name(&self) -> &QName {
        match self {
            Self::Primitive(a) => a.name(),
            Self::Nested(a) => a.name(),
            Self::Custom(a) => a.name(),
        }
    }

    /// Returns true if the assertion is optional.
    pub fn is_optional(&self) -> bool {
        match self {
            Self::Primitive(a) => a.is_optional(),
            Self::Nested(a) => a.is_optional(),
            Self::Custom(a) => a.is_optional(),
        }
    }

    /// Returns true if the assertion is ignorable.
    pub fn is_ignorable(&self) -> bool {
        match self {
            Self::Primitive(a) => a.is_ignorable(),
            Self::Nested(a) => a.is_ignorable(),
            Self::Custom(a) => a.is_ignorable(),
        }
    }

    /// Returns the nested policy for nested assertions.
    pub fn policy(&self) -> Option<&Policy> {
        match self {
            Self::Nested(a) => a.policy(),
            _ => None,
        }
    }

    /// Returns a copy with the optional flag replaced.
    pub fn with_optional(&self, optional: bool) -> Self {
        let mut copy = self.clone();
        match &mut copy {
            Self::Primitive(a) => a.optional = optional,
            Self::Nested(a) => a.optional = optional,
            Self::Custom(a) => a.optional = optional,
        }
        copy
    }

    /// Variant-specific equality. Never panics; different variants are unequal.
    pub fn equal(&self, other: &PolicyAssertion) -> bool {
        match (self, other) {
            (Self::Primitive(a), Self::Primitive(b)) => a.equal(b),
            (Self::Nested(a), Self::Nested(b)) => a.equal(b),
            (Self::Custom(a), Self::Custom(b)) => a.equal(b),
            _ => false,
        }
    }

    /// Variant-specific satisfaction check against the exchange records.
    pub fn is_asserted(&self, aim: &AssertionInfoMap) -> bool {
        match self {
            Self::Primitive(a) => a.is_asserted(aim),
            Self::Nested(a) => a.is_asserted(aim),
            Self::Custom(a) => a.is_asserted(aim),
        }
    }
}

impl PartialEq for PolicyAssertion {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl From<PrimitiveAssertion> for PolicyAssertion {
    fn from(a: PrimitiveAssertion) -> Self {
        PolicyAssertion::Primitive(a)
    }
}

impl From<NestedPrimitiveAssertion> for PolicyAssertion {
    fn from(a: NestedPrimitiveAssertion) -> Self {
        PolicyAssertion::Nested(a)
    }
}

impl From<CustomAssertion> for PolicyAssertion {
    fn from(a: CustomAssertion) -> Self {
        PolicyAssertion::Custom(a)
    }
}

fn any_asserted(aim: &AssertionInfoMap, name: &QName) -> bool {
    aim.get_assertion_info(name).iter().any(|ai| ai.is_asserted())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion_info::AssertionInfoMap;
    use crate::policy::{Policy, PolicyOperator};

    #[derive(Debug)]
    struct State(u32);

    impl AssertionPayload for State {
        fn equal(&self, other: &dyn AssertionPayload) -> bool {
            other
                .as_any()
                .downcast_ref::<State>()
                .is_some_and(|o| o.0 == self.0)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn q(local: &str) -> QName {
        QName::new("http://example.org/test", local)
    }

    #[test]
    fn primitive_equality_ignores_ignorable() {
        let a = PrimitiveAssertion::new(q("a"), false);
        let b = PrimitiveAssertion::new(q("a"), false).with_ignorable(true);
        assert!(a.equal(&b));
        assert!(!a.equal(&PrimitiveAssertion::new(q("a"), true)));
    }

    #[test]
    fn custom_equality_includes_payload() {
        let a = CustomAssertion::new(q("c"), false, Arc::new(State(1)));
        let b = CustomAssertion::new(q("c"), false, Arc::new(State(1)));
        let c = CustomAssertion::new(q("c"), false, Arc::new(State(2)));
        assert!(a.equal(&b));
        assert!(!a.equal(&c));
        assert_eq!(a.payload_as::<State>().map(|s| s.0), Some(1));
    }

    #[test]
    fn variants_never_cross_compare() {
        let p: PolicyAssertion = PrimitiveAssertion::new(q("x"), false).into();
        let n: PolicyAssertion = NestedPrimitiveAssertion::new(q("x"), false, None).into();
        let c: PolicyAssertion = CustomAssertion::new(q("x"), false, Arc::new(State(0))).into();
        assert!(!p.equal(&n));
        assert!(!n.equal(&c));
        assert!(!c.equal(&p));
    }

    #[test]
    fn absent_nested_policy_equals_empty_one() {
        let a = NestedPrimitiveAssertion::new(q("n"), false, None);
        let b = NestedPrimitiveAssertion::new(q("n"), false, Some(Policy::new()));
        assert!(a.equal(&b));
    }

    #[test]
    fn optional_primitive_is_trivially_asserted() {
        let a = PrimitiveAssertion::new(q("a"), true);
        assert!(a.is_asserted(&AssertionInfoMap::default()));
        assert!(!PrimitiveAssertion::new(q("a"), false).is_asserted(&AssertionInfoMap::default()));
    }

    #[test]
    fn primitive_needs_only_one_asserted_record() {
        let a1 = PrimitiveAssertion::new(q("a"), false);
        let a2 = PrimitiveAssertion::new(q("a"), false);
        let mut aim = AssertionInfoMap::new(vec![a1.clone().into(), a2.into()]);
        assert!(!a1.is_asserted(&aim));
        aim.get_assertion_info_mut(&q("a"))[1].set_asserted(true);
        assert!(a1.is_asserted(&aim));
    }

    #[test]
    fn nested_with_empty_exactly_one_is_never_asserted() {
        let mut policy = Policy::new();
        policy.add_policy_component(PolicyOperator::exactly_one());
        let n = NestedPrimitiveAssertion::new(q("n"), false, Some(policy));
        assert!(!n.is_asserted(&AssertionInfoMap::default()));
    }

    #[test]
    fn with_optional_keeps_everything_else() {
        let n: PolicyAssertion = NestedPrimitiveAssertion::new(q("n"), false, None)
            .with_ignorable(true)
            .into();
        let opt = n.with_optional(true);
        assert!(opt.is_optional());
        assert!(opt.is_ignorable());
        assert_eq!(opt.name(), &q("n"));
    }
}
