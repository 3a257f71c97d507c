//! Per-exchange assertion records.
//!
//! An [`AssertionInfoMap`] is created fresh for every message exchange from
//! the chosen policy alternative. Runtime components flip the `asserted`
//! flag of the records they confirm; afterwards the map answers whether
//! the effective policy was honoured. The map is an explicit value passed
//! to every evaluation call, never ambient state.

use std::collections::BTreeMap;

use crate::assertion::PolicyAssertion;
use crate::error::{PolicyError, PolicyErrorKind};
use crate::policy::{Alternative, OperatorKind, Policy, PolicyComponent};
use crate::qname::QName;

/// Runtime record of one assertion instance.
#[derive(Debug, Clone)]
pub struct AssertionInfo {
    assertion: PolicyAssertion,
    asserted: bool,
    error_message: Option<String>,
}

impl AssertionInfo {
    /// Creates a record that has not been asserted yet.
    pub fn new(assertion: PolicyAssertion) -> Self {
        Self {
            assertion,
            asserted: false,
            error_message: None,
        }
    }

    /// Returns the wrapped assertion.
    pub fn assertion(&self) -> &PolicyAssertion {
        &self.assertion
    }

    /// Returns true once runtime behaviour confirmed the assertion.
    pub fn is_asserted(&self) -> bool {
        self.asserted
    }

    /// Sets the asserted flag. Asserting clears any recorded error.
    pub fn set_asserted(&mut self, asserted: bool) {
        self.asserted = asserted;
        if asserted {
            self.error_message = None;
        }
    }

    /// Marks the record as not asserted and remembers why.
    pub fn set_not_asserted(&mut self, message: impl Into<String>) {
        self.asserted = false;
        self.error_message = Some(message.into());
    }

    /// Returns the reason recorded by [`set_not_asserted`](Self::set_not_asserted).
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// Mapping from assertion name to every record registered under it.
///
/// Records keep insertion order within a name.
///
/// # Examples
///
/// ```
/// use ws_policy_core::{AssertionInfoMap, PrimitiveAssertion, QName};
///
/// let name = QName::local("abc");
/// let mut aim = AssertionInfoMap::new(vec![PrimitiveAssertion::new(name.clone(), false).into()]);
///
/// assert_eq!(aim.get_assertion_info(&name).len(), 1);
/// assert!(aim.get_assertion_info(&QName::local("unknown")).is_empty());
///
/// aim.assert_all(&name);
/// assert!(aim.get_assertion_info(&name)[0].is_asserted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AssertionInfoMap {
    infos: BTreeMap<QName, Vec<AssertionInfo>>,
}

impl AssertionInfoMap {
    /// Builds the map from a chosen alternative.
    ///
    /// Assertions inside nested policies are registered too.
    pub fn new(assertions: impl IntoIterator<Item = PolicyAssertion>) -> Self {
        let mut aim = Self::default();
        for assertion in assertions {
            aim.put_assertion(assertion);
        }
        aim
    }

    /// Builds the map from every assertion anywhere in `policy`.
    pub fn from_policy(policy: &Policy) -> Self {
        let mut aim = Self::default();
        aim.put_policy(policy);
        aim
    }

    /// Registers one assertion (and, for nested assertions, their contents).
    pub fn put_assertion(&mut self, assertion: PolicyAssertion) {
        if let Some(policy) = assertion.policy() {
            self.put_policy(policy);
        }
        self.infos
            .entry(assertion.name().clone())
            .or_default()
            .push(AssertionInfo::new(assertion));
    }

    fn put_policy(&mut self, policy: &Policy) {
        for assertion in policy.assertions() {
            self.put_assertion(assertion.clone());
        }
    }

    /// Returns every record under `name`; empty for unknown names.
    pub fn get_assertion_info(&self, name: &QName) -> &[AssertionInfo] {
        self.infos.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Mutable variant of [`get_assertion_info`](Self::get_assertion_info).
    pub fn get_assertion_info_mut(&mut self, name: &QName) -> &mut [AssertionInfo] {
        self.infos
            .get_mut(name)
            .map(Vec::as_mut_slice)
            .unwrap_or_default()
    }

    /// Marks every record under `name` as asserted and returns how many.
    pub fn assert_all(&mut self, name: &QName) -> usize {
        let infos = self.get_assertion_info_mut(name);
        for info in infos.iter_mut() {
            info.set_asserted(true);
        }
        infos.len()
    }

    /// Returns the registered names in order.
    pub fn keys(&self) -> impl Iterator<Item = &QName> {
        self.infos.keys()
    }

    /// Returns the number of distinct names.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Conjunctive check used inside alternatives.
    ///
    /// Optional assertions pass. Nested assertions are evaluated on their
    /// contents. Every other assertion needs at least one record under its
    /// name, and every record under that name must be asserted.
    pub fn supports_assertion(&self, assertion: &PolicyAssertion) -> bool {
        if assertion.is_optional() {
            return true;
        }
        match assertion {
            PolicyAssertion::Nested(nested) => nested.is_asserted(self),
            _ => {
                let infos = self.get_assertion_info(assertion.name());
                !infos.is_empty() && infos.iter().all(AssertionInfo::is_asserted)
            }
        }
    }

    /// Checks a whole alternative, appending unmet names to `errors`.
    pub fn supports_alternative(
        &self,
        alternative: &[PolicyAssertion],
        errors: &mut Vec<QName>,
    ) -> bool {
        let mut pass = true;
        for assertion in alternative {
            if !self.supports_assertion(assertion) {
                if !errors.contains(assertion.name()) {
                    errors.push(assertion.name().clone());
                }
                pass = false;
            }
        }
        pass
    }

    /// True if some alternative of `policy` is supported.
    ///
    /// Walks the expression tree directly instead of normalizing it: `All`
    /// needs every child, `ExactlyOne` needs one child, and an optional
    /// assertion always passes. The verdict equals checking each normalized
    /// alternative with [`supports_alternative`](Self::supports_alternative).
    pub fn supports_policy(&self, policy: &Policy) -> bool {
        self.satisfy_all(policy.components(), &mut Vec::new())
            .is_some()
    }

    /// Verifies that some alternative of `policy` has been satisfied.
    ///
    /// Returns the first satisfied alternative in normalization order,
    /// found without expanding the policy.
    ///
    /// # Errors
    ///
    /// Returns `PolicyErrorKind::Unsatisfied` listing the unmet assertion
    /// names, with any recorded error messages in the message text.
    pub fn check_effective_policy(&self, policy: &Policy) -> Result<Alternative, PolicyError> {
        let mut errors = Vec::new();
        if let Some(alternative) = self.satisfy_all(policy.components(), &mut errors) {
            return Ok(alternative);
        }

        let reasons: Vec<String> = errors
            .iter()
            .flat_map(|name| self.get_assertion_info(name))
            .filter_map(|info| {
                info.error_message()
                    .map(|m| format!("{}: {}", info.assertion().name(), m))
            })
            .collect();
        let message = if reasons.is_empty() {
            "none of the policy alternatives can be satisfied".to_string()
        } else {
            reasons.join("; ")
        };
        tracing::warn!(unsatisfied = errors.len(), "effective policy not satisfied");
        Err(PolicyError::new(
            PolicyErrorKind::Unsatisfied { names: errors },
            message,
        ))
    }

    // First satisfying choice of each component, concatenated.
    fn satisfy_all(
        &self,
        components: &[PolicyComponent],
        errors: &mut Vec<QName>,
    ) -> Option<Alternative> {
        let mut chosen = Vec::new();
        let mut pass = true;
        for component in components {
            match self.satisfy(component, errors) {
                Some(part) => chosen.extend(part),
                None => pass = false,
            }
        }
        pass.then_some(chosen)
    }

    fn satisfy(&self, component: &PolicyComponent, errors: &mut Vec<QName>) -> Option<Alternative> {
        match component {
            PolicyComponent::Assertion(a) if a.is_optional() => {
                let required = a.with_optional(false);
                if self.supports_assertion(&required) {
                    Some(vec![required])
                } else {
                    Some(Vec::new())
                }
            }
            PolicyComponent::Assertion(a) => {
                if self.supports_assertion(a) {
                    Some(vec![a.clone()])
                } else {
                    if !errors.contains(a.name()) {
                        errors.push(a.name().clone());
                    }
                    None
                }
            }
            PolicyComponent::Operator(op) => match op.kind() {
                OperatorKind::All => self.satisfy_all(op.components(), errors),
                OperatorKind::ExactlyOne => op
                    .components()
                    .iter()
                    .find_map(|child| self.satisfy(child, errors)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::{NestedPrimitiveAssertion, PrimitiveAssertion};
    use crate::policy::PolicyOperator;
    use crate::test_utils::{arb_flat_policy, arb_name};
    use proptest::prelude::*;

    fn q(local: &str) -> QName {
        QName::new("http://example.org/test", local)
    }

    fn prim(local: &str, optional: bool) -> PolicyAssertion {
        PrimitiveAssertion::new(q(local), optional).into()
    }

    #[test]
    fn unknown_name_yields_empty_slices() {
        let mut aim = AssertionInfoMap::default();
        assert!(aim.get_assertion_info(&q("nope")).is_empty());
        assert!(aim.get_assertion_info_mut(&q("nope")).is_empty());
        assert_eq!(aim.assert_all(&q("nope")), 0);
    }

    #[test]
    fn records_keep_insertion_order() {
        let aim = AssertionInfoMap::new(vec![prim("a", true), prim("a", false)]);
        let infos = aim.get_assertion_info(&q("a"));
        assert_eq!(infos.len(), 2);
        assert!(infos[0].assertion().is_optional());
        assert!(!infos[1].assertion().is_optional());
    }

    #[test]
    fn nested_contents_are_registered() {
        let mut inner = Policy::new();
        inner.add_assertion(PrimitiveAssertion::new(q("inner"), false));
        let nested = NestedPrimitiveAssertion::new(q("outer"), false, Some(inner));
        let aim = AssertionInfoMap::new(vec![nested.into()]);
        assert_eq!(aim.len(), 2);
        assert_eq!(aim.get_assertion_info(&q("inner")).len(), 1);
    }

    #[test]
    fn set_not_asserted_keeps_reason_until_asserted() {
        let mut info = AssertionInfo::new(prim("a", false));
        info.set_not_asserted("no signature");
        assert_eq!(info.error_message(), Some("no signature"));
        info.set_asserted(true);
        assert!(info.is_asserted());
        assert!(info.error_message().is_none());
    }

    #[test]
    fn effective_policy_picks_first_satisfied_alternative() {
        let mut policy = Policy::new();
        policy.add_policy_component(
            PolicyOperator::exactly_one()
                .with(prim("a", false))
                .with(prim("b", false)),
        );
        let mut aim = AssertionInfoMap::from_policy(&policy);
        assert!(aim.check_effective_policy(&policy).is_err());

        aim.assert_all(&q("b"));
        let chosen = aim.check_effective_policy(&policy).expect("b asserted");
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].name(), &q("b"));
    }

    #[test]
    fn unsatisfied_error_carries_names_and_reasons() {
        let mut policy = Policy::new();
        policy.add_assertion(prim("a", false));
        let mut aim = AssertionInfoMap::from_policy(&policy);
        aim.get_assertion_info_mut(&q("a"))[0].set_not_asserted("token missing");

        let err = aim.check_effective_policy(&policy).unwrap_err();
        assert_eq!(
            err.kind(),
            &PolicyErrorKind::Unsatisfied {
                names: vec![q("a")]
            }
        );
        assert!(err.message().contains("token missing"));
    }

    #[test]
    fn conjunctive_check_needs_every_record() {
        let mut aim = AssertionInfoMap::new(vec![prim("a", false), prim("a", false)]);
        let required = prim("a", false);
        aim.get_assertion_info_mut(&q("a"))[0].set_asserted(true);
        assert!(!aim.supports_assertion(&required));
        aim.get_assertion_info_mut(&q("a"))[1].set_asserted(true);
        assert!(aim.supports_assertion(&required));
    }

    // 40 two-way choices would be 2^40 alternatives if expanded.
    fn wide_choice(width: usize) -> Policy {
        let mut policy = Policy::new();
        for i in 0..width {
            policy.add_policy_component(
                PolicyOperator::exactly_one()
                    .with(prim(&format!("a{i}"), false))
                    .with(prim(&format!("b{i}"), false)),
            );
        }
        policy
    }

    #[test]
    fn wide_policy_is_checked_without_expansion() {
        let policy = wide_choice(40);
        let mut aim = AssertionInfoMap::from_policy(&policy);
        assert!(!aim.supports_policy(&policy));
        assert!(aim.check_effective_policy(&policy).is_err());

        for i in 0..40 {
            let local = if i % 2 == 0 { format!("a{i}") } else { format!("b{i}") };
            aim.assert_all(&q(&local));
        }
        assert!(aim.supports_policy(&policy));
        let chosen = aim.check_effective_policy(&policy).unwrap();
        assert_eq!(chosen.len(), 40);
        assert_eq!(chosen[1].name(), &q("b1"));

        let nested: PolicyAssertion =
            NestedPrimitiveAssertion::new(q("wide"), false, Some(policy)).into();
        assert!(nested.is_asserted(&aim));
    }

    #[test]
    fn optional_member_is_kept_only_when_supported() {
        let mut policy = Policy::new();
        policy.add_assertion(prim("a", true));
        policy.add_assertion(prim("b", false));
        let mut aim = AssertionInfoMap::from_policy(&policy);
        aim.assert_all(&q("b"));

        let chosen = aim.check_effective_policy(&policy).unwrap();
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].name(), &q("b"));

        aim.assert_all(&q("a"));
        let chosen = aim.check_effective_policy(&policy).unwrap();
        assert_eq!(chosen.len(), 2);
        assert!(!chosen[0].is_optional());
    }

    #[test]
    fn failed_branches_are_reported_once() {
        let mut policy = Policy::new();
        policy.add_policy_component(
            PolicyOperator::exactly_one()
                .with(PolicyOperator::all().with(prim("a", false)).with(prim("c", false)))
                .with(PolicyOperator::all().with(prim("b", false)).with(prim("c", false))),
        );
        let aim = AssertionInfoMap::from_policy(&policy);
        let err = aim.check_effective_policy(&policy).unwrap_err();
        assert_eq!(
            err.kind(),
            &PolicyErrorKind::Unsatisfied {
                names: vec![q("a"), q("c"), q("b")]
            }
        );
    }

    proptest! {
        #[test]
        fn tree_check_matches_expanded_alternatives(
            policy in arb_flat_policy(),
            asserted in prop::collection::vec(arb_name(), 0..4),
        ) {
            let mut aim = AssertionInfoMap::from_policy(&policy);
            for name in &asserted {
                aim.assert_all(name);
            }
            let expanded = policy
                .alternatives()
                .into_iter()
                .find(|alt| alt.iter().all(|a| aim.supports_assertion(a)));
            prop_assert_eq!(aim.supports_policy(&policy), expanded.is_some());
            prop_assert_eq!(aim.check_effective_policy(&policy).ok(), expanded);
        }
    }
}
