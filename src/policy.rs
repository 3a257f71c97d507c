//! Policy expressions and their algebra.
//!
//! A [`Policy`] is an ordered list of components, each either an assertion
//! or a [`PolicyOperator`] (`All` = conjunction, `ExactlyOne` = choice).
//! The top level of a policy behaves like `All`.
//!
//! Normalization turns any policy into its normal form: a disjunction of
//! alternatives, each a flat list of required assertions. Nested
//! sub-policies stay inside their assertion and are not expanded.

use std::collections::BTreeSet;

use crate::assertion::{
    CustomAssertion, NestedPrimitiveAssertion, PolicyAssertion, PrimitiveAssertion,
};
use crate::error::{PolicyError, PolicyErrorKind};
use crate::qname::QName;

/// One alternative of a normalized policy: every assertion must hold.
pub type Alternative = Vec<PolicyAssertion>;

/// Operator variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    /// Every child must hold
    All,
    /// Exactly one child branch is chosen
    ExactlyOne,
}

/// A policy operator with ordered children.
#[derive(Debug, Clone)]
pub struct PolicyOperator {
    kind: OperatorKind,
    components: Vec<PolicyComponent>,
}

impl PolicyOperator {
    /// Creates an empty operator of the given kind.
    pub fn new(kind: OperatorKind) -> Self {
        Self {
            kind,
            components: Vec::new(),
        }
    }

    /// Creates an empty `All`.
    pub fn all() -> Self {
        Self::new(OperatorKind::All)
    }

    /// Creates an empty `ExactlyOne`.
    pub fn exactly_one() -> Self {
        Self::new(OperatorKind::ExactlyOne)
    }

    /// Returns the operator kind.
    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    /// Returns the children in insertion order.
    pub fn components(&self) -> &[PolicyComponent] {
        &self.components
    }

    /// Appends an assertion. No deduplication takes place.
    pub fn add_assertion(&mut self, assertion: impl Into<PolicyAssertion>) {
        self.components
            .push(PolicyComponent::Assertion(assertion.into()));
    }

    /// Appends any component. No deduplication takes place.
    pub fn add_policy_component(&mut self, component: impl Into<PolicyComponent>) {
        self.components.push(component.into());
    }

    /// Builder-style variant of [`add_policy_component`](Self::add_policy_component).
    pub fn with(mut self, component: impl Into<PolicyComponent>) -> Self {
        self.add_policy_component(component);
        self
    }

    /// Same variant and pairwise-equal children, in order.
    pub fn equal(&self, other: &PolicyOperator) -> bool {
        self.kind == other.kind && components_equal(&self.components, &other.components)
    }
}

/// A node of a policy tree.
#[derive(Debug, Clone)]
pub enum PolicyComponent {
    /// A leaf or nested assertion
    Assertion(PolicyAssertion),
    /// An `All` or `ExactlyOne` operator
    Operator(PolicyOperator),
}

impl PolicyComponent {
    /// Assertions compare via their own equality, operators structurally.
    pub fn equal(&self, other: &PolicyComponent) -> bool {
        match (self, other) {
            (Self::Assertion(a), Self::Assertion(b)) => a.equal(b),
            (Self::Operator(a), Self::Operator(b)) => a.equal(b),
            _ => false,
        }
    }

    /// Returns the assertion if this component is one.
    pub fn as_assertion(&self) -> Option<&PolicyAssertion> {
        match self {
            Self::Assertion(a) => Some(a),
            Self::Operator(_) => None,
        }
    }
}

impl From<PolicyAssertion> for PolicyComponent {
    fn from(a: PolicyAssertion) -> Self {
        PolicyComponent::Assertion(a)
    }
}

impl From<PrimitiveAssertion> for PolicyComponent {
    fn from(a: PrimitiveAssertion) -> Self {
        PolicyComponent::Assertion(a.into())
    }
}

impl From<NestedPrimitiveAssertion> for PolicyComponent {
    fn from(a: NestedPrimitiveAssertion) -> Self {
        PolicyComponent::Assertion(a.into())
    }
}

impl From<CustomAssertion> for PolicyComponent {
    fn from(a: CustomAssertion) -> Self {
        PolicyComponent::Assertion(a.into())
    }
}

impl From<PolicyOperator> for PolicyComponent {
    fn from(op: PolicyOperator) -> Self {
        PolicyComponent::Operator(op)
    }
}

/// A policy expression.
///
/// # Examples
///
/// ```
/// use ws_policy_core::{Policy, PolicyOperator, PrimitiveAssertion, QName};
///
/// let mut choice = PolicyOperator::exactly_one();
/// choice.add_assertion(PrimitiveAssertion::new(QName::local("a"), false));
/// choice.add_assertion(PrimitiveAssertion::new(QName::local("b"), false));
///
/// let mut policy = Policy::new();
/// policy.add_assertion(PrimitiveAssertion::new(QName::local("c"), false));
/// policy.add_policy_component(choice);
///
/// // {c, a} or {c, b}
/// assert_eq!(policy.alternatives().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Policy {
    id: Option<String>,
    name: Option<String>,
    components: Vec<PolicyComponent>,
}

impl Policy {
    /// Creates an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the normal form `ExactlyOne(All(..), ..)` from alternatives.
    pub fn from_alternatives(alternatives: impl IntoIterator<Item = Alternative>) -> Self {
        let mut choice = PolicyOperator::exactly_one();
        for alternative in alternatives {
            let mut all = PolicyOperator::all();
            for assertion in alternative {
                all.add_assertion(assertion);
            }
            choice.add_policy_component(all);
        }
        let mut policy = Policy::new();
        policy.add_policy_component(choice);
        policy
    }

    /// Sets the `wsu:Id` of the policy.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the `Name` attribute of the policy.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the `wsu:Id`, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the `Name` attribute, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Appends a component.
    pub fn add_policy_component(&mut self, component: impl Into<PolicyComponent>) {
        self.components.push(component.into());
    }

    /// Appends an assertion.
    pub fn add_assertion(&mut self, assertion: impl Into<PolicyAssertion>) {
        self.components
            .push(PolicyComponent::Assertion(assertion.into()));
    }

    /// Returns the top-level components in insertion order.
    pub fn components(&self) -> &[PolicyComponent] {
        &self.components
    }

    /// Returns the component at index 0.
    pub fn first_policy_component(&self) -> Option<&PolicyComponent> {
        self.components.first()
    }

    /// Returns true if the policy has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Structural equality of the component sequences.
    ///
    /// `id` and `name` do not take part.
    pub fn equal(&self, other: &Policy) -> bool {
        components_equal(&self.components, &other.components)
    }

    /// Every assertion in this policy tree, in document order.
    ///
    /// Does not descend into nested sub-policies.
    pub fn assertions(&self) -> Vec<&PolicyAssertion> {
        let mut out = Vec::new();
        collect_assertions(&self.components, &mut out);
        out
    }

    /// Computes the normalized alternatives.
    ///
    /// An optional assertion yields one alternative with it (flag cleared)
    /// and one without it. An empty policy or `All` yields a single empty
    /// alternative; an empty `ExactlyOne` yields none.
    pub fn alternatives(&self) -> Vec<Alternative> {
        expand_all(&self.components, None).unwrap_or_default()
    }

    /// Like [`alternatives`](Self::alternatives), failing once more than
    /// `limit` alternatives would be produced at any step.
    ///
    /// # Errors
    ///
    /// Returns `PolicyErrorKind::TooManyAlternatives` when the bound is hit.
    pub fn alternatives_bounded(&self, limit: usize) -> Result<Vec<Alternative>, PolicyError> {
        expand_all(&self.components, Some(limit))
    }

    /// Returns the normal form as a policy tree.
    pub fn normalize(&self) -> Policy {
        let mut normal = Policy::from_alternatives(self.alternatives());
        normal.id = self.id.clone();
        normal.name = self.name.clone();
        normal
    }

    /// True if both policies have the same set of alternatives.
    ///
    /// Alternatives are compared as multisets of assertions.
    pub fn equivalent(&self, other: &Policy) -> bool {
        self.equivalent_bounded(other, usize::MAX).unwrap_or(false)
    }

    /// Like [`equivalent`](Self::equivalent), expanding each side at most
    /// to `limit` alternatives.
    ///
    /// # Errors
    ///
    /// Returns `PolicyErrorKind::TooManyAlternatives` when the bound is hit.
    pub fn equivalent_bounded(&self, other: &Policy, limit: usize) -> Result<bool, PolicyError> {
        let mine = self.alternatives_bounded(limit)?;
        let theirs = other.alternatives_bounded(limit)?;
        Ok(mine
            .iter()
            .all(|a| theirs.iter().any(|b| alternatives_equal(a, b)))
            && theirs
                .iter()
                .all(|b| mine.iter().any(|a| alternatives_equal(a, b))))
    }

    /// Conjunction of both policies.
    pub fn merge(&self, other: &Policy) -> Policy {
        let mut merged = Policy::new();
        merged.components.extend(self.components.iter().cloned());
        merged.components.extend(other.components.iter().cloned());
        merged
    }

    /// Intersects two policies.
    ///
    /// Two alternatives are compatible when their vocabularies match and
    /// every pair of same-named nested assertions has intersecting nested
    /// policies. The result holds the union of every compatible pair, or is
    /// `None` if no pair is compatible.
    pub fn intersect(&self, other: &Policy) -> Option<Policy> {
        self.intersect_bounded(other, usize::MAX).ok().flatten()
    }

    /// Like [`intersect`](Self::intersect), bounding every expansion (each
    /// side, nested policies, and the result) to `limit` alternatives.
    ///
    /// # Errors
    ///
    /// Returns `PolicyErrorKind::TooManyAlternatives` when the bound is hit.
    pub fn intersect_bounded(
        &self,
        other: &Policy,
        limit: usize,
    ) -> Result<Option<Policy>, PolicyError> {
        let mine = self.alternatives_bounded(limit)?;
        let theirs = other.alternatives_bounded(limit)?;
        let mut result = Vec::new();
        for a in &mine {
            for b in &theirs {
                if alternatives_compatible(a, b, limit)? {
                    let mut union = a.clone();
                    union.extend(b.iter().cloned());
                    result.push(union);
                    check_bound(result.len(), Some(limit))?;
                }
            }
        }
        if result.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Policy::from_alternatives(result)))
        }
    }
}

impl PartialEq for Policy {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

/// The set of assertion names used by an alternative.
pub fn vocabulary(alternative: &[PolicyAssertion]) -> BTreeSet<QName> {
    alternative.iter().map(|a| a.name().clone()).collect()
}

fn components_equal(a: &[PolicyComponent], b: &[PolicyComponent]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equal(y))
}

fn collect_assertions<'a>(components: &'a [PolicyComponent], out: &mut Vec<&'a PolicyAssertion>) {
    for component in components {
        match component {
            PolicyComponent::Assertion(a) => out.push(a),
            PolicyComponent::Operator(op) => collect_assertions(&op.components, out),
        }
    }
}

fn check_bound(len: usize, limit: Option<usize>) -> Result<(), PolicyError> {
    match limit {
        Some(limit) if len > limit => Err(PolicyError::new(
            PolicyErrorKind::TooManyAlternatives { limit },
            format!("normalization produced {} alternatives", len),
        )),
        _ => Ok(()),
    }
}

// Conjunction over `components`: cross product of each child's alternatives.
fn expand_all(
    components: &[PolicyComponent],
    limit: Option<usize>,
) -> Result<Vec<Alternative>, PolicyError> {
    let mut acc: Vec<Alternative> = vec![Vec::new()];
    for component in components {
        let child = expand(component, limit)?;
        let mut next = Vec::with_capacity(acc.len() * child.len());
        for prefix in &acc {
            for suffix in &child {
                let mut alternative = prefix.clone();
                alternative.extend(suffix.iter().cloned());
                next.push(alternative);
            }
        }
        check_bound(next.len(), limit)?;
        acc = next;
    }
    Ok(acc)
}

fn expand(
    component: &PolicyComponent,
    limit: Option<usize>,
) -> Result<Vec<Alternative>, PolicyError> {
    match component {
        PolicyComponent::Assertion(a) if a.is_optional() => {
            Ok(vec![vec![a.with_optional(false)], Vec::new()])
        }
        PolicyComponent::Assertion(a) => Ok(vec![vec![a.clone()]]),
        PolicyComponent::Operator(op) => match op.kind {
            OperatorKind::All => expand_all(&op.components, limit),
            OperatorKind::ExactlyOne => {
                let mut union = Vec::new();
                for child in &op.components {
                    union.extend(expand(child, limit)?);
                    check_bound(union.len(), limit)?;
                }
                Ok(union)
            }
        },
    }
}

fn alternatives_equal(a: &[PolicyAssertion], b: &[PolicyAssertion]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|x| {
        let found = b
            .iter()
            .enumerate()
            .find(|(i, y)| !used[*i] && x.equal(y))
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

fn alternatives_compatible(
    a: &[PolicyAssertion],
    b: &[PolicyAssertion],
    limit: usize,
) -> Result<bool, PolicyError> {
    if vocabulary(a) != vocabulary(b) {
        return Ok(false);
    }
    for x in a {
        let PolicyAssertion::Nested(nx) = x else {
            continue;
        };
        for y in b {
            let PolicyAssertion::Nested(ny) = y else {
                continue;
            };
            if nx.name() != ny.name() {
                continue;
            }
            let px = nx.policy().filter(|p| !p.is_empty());
            let py = ny.policy().filter(|p| !p.is_empty());
            let compatible = match (px, py) {
                (None, None) => true,
                (Some(p), Some(q)) => p.intersect_bounded(q, limit)?.is_some(),
                _ => false,
            };
            if !compatible {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::{NestedPrimitiveAssertion, PrimitiveAssertion};
    use crate::test_utils::arb_flat_policy;
    use proptest::prelude::*;

    fn q(local: &str) -> QName {
        QName::new("http://example.org/test", local)
    }

    fn prim(local: &str) -> PrimitiveAssertion {
        PrimitiveAssertion::new(q(local), false)
    }

    fn names(alternative: &[PolicyAssertion]) -> Vec<&str> {
        alternative.iter().map(|a| a.name().local_part()).collect()
    }

    #[test]
    fn empty_policy_has_one_empty_alternative() {
        let alternatives = Policy::new().alternatives();
        assert_eq!(alternatives.len(), 1);
        assert!(alternatives[0].is_empty());
    }

    #[test]
    fn empty_exactly_one_has_no_alternatives() {
        let mut policy = Policy::new();
        policy.add_policy_component(PolicyOperator::exactly_one());
        assert!(policy.alternatives().is_empty());
    }

    #[test]
    fn all_is_cross_product_of_choices() {
        let mut policy = Policy::new();
        policy.add_policy_component(
            PolicyOperator::exactly_one()
                .with(prim("a"))
                .with(prim("b")),
        );
        policy.add_policy_component(
            PolicyOperator::exactly_one()
                .with(prim("c"))
                .with(prim("d")),
        );
        let alternatives = policy.alternatives();
        let got: Vec<Vec<&str>> = alternatives.iter().map(|a| names(a)).collect();
        assert_eq!(
            got,
            vec![
                vec!["a", "c"],
                vec!["a", "d"],
                vec!["b", "c"],
                vec!["b", "d"]
            ]
        );
    }

    #[test]
    fn optional_assertion_splits_into_with_and_without() {
        let mut policy = Policy::new();
        policy.add_assertion(PrimitiveAssertion::new(q("a"), true));
        let alternatives = policy.alternatives();
        assert_eq!(alternatives.len(), 2);
        assert_eq!(names(&alternatives[0]), vec!["a"]);
        assert!(!alternatives[0][0].is_optional());
        assert!(alternatives[1].is_empty());
    }

    #[test]
    fn nested_policy_is_not_expanded() {
        let mut inner = Policy::new();
        inner.add_policy_component(
            PolicyOperator::exactly_one()
                .with(prim("x"))
                .with(prim("y")),
        );
        let mut policy = Policy::new();
        policy.add_assertion(NestedPrimitiveAssertion::new(q("n"), false, Some(inner)));
        assert_eq!(policy.alternatives().len(), 1);
    }

    #[test]
    fn bounded_expansion_fails_past_limit() {
        let mut policy = Policy::new();
        for i in 0..4 {
            policy.add_policy_component(
                PolicyOperator::exactly_one()
                    .with(prim(&format!("a{}", i)))
                    .with(prim(&format!("b{}", i))),
            );
        }
        assert_eq!(policy.alternatives_bounded(16).map(|a| a.len()), Ok(16));
        let err = policy.alternatives_bounded(15).unwrap_err();
        assert_eq!(
            err.kind(),
            &PolicyErrorKind::TooManyAlternatives { limit: 15 }
        );
    }

    #[test]
    fn structural_equality_is_order_sensitive_but_equivalence_is_not() {
        let mut p1 = Policy::new();
        p1.add_assertion(prim("a"));
        p1.add_assertion(prim("b"));
        let mut p2 = Policy::new();
        p2.add_assertion(prim("b"));
        p2.add_assertion(prim("a"));
        assert!(!p1.equal(&p2));
        assert!(p1.equivalent(&p2));
    }

    #[test]
    fn operators_compare_by_kind() {
        let all = PolicyOperator::all().with(prim("a"));
        let one = PolicyOperator::exactly_one().with(prim("a"));
        assert!(!all.equal(&one));
        assert!(all.equal(&PolicyOperator::all().with(prim("a"))));
    }

    #[test]
    fn normalize_is_equivalent_to_original() {
        let mut policy = Policy::new().with_id("p1");
        policy.add_assertion(prim("a"));
        policy.add_policy_component(
            PolicyOperator::exactly_one()
                .with(prim("b"))
                .with(PrimitiveAssertion::new(q("c"), true)),
        );
        let normal = policy.normalize();
        assert!(normal.equivalent(&policy));
        assert_eq!(normal.id(), Some("p1"));
    }

    #[test]
    fn merge_is_conjunction() {
        let mut p1 = Policy::new();
        p1.add_assertion(prim("a"));
        let mut p2 = Policy::new();
        p2.add_policy_component(PolicyOperator::exactly_one().with(prim("b")).with(prim("c")));
        let merged = p1.merge(&p2);
        let alternatives = merged.alternatives();
        let got: Vec<Vec<&str>> = alternatives.iter().map(|a| names(a)).collect();
        assert_eq!(got, vec![vec!["a", "b"], vec!["a", "c"]]);
    }

    #[test]
    fn intersect_keeps_only_matching_vocabularies() {
        let mut p1 = Policy::new();
        p1.add_policy_component(PolicyOperator::exactly_one().with(prim("a")).with(prim("b")));
        let mut p2 = Policy::new();
        p2.add_policy_component(PolicyOperator::exactly_one().with(prim("b")).with(prim("c")));

        let result = p1.intersect(&p2).expect("b is shared");
        let alternatives = result.alternatives();
        assert_eq!(alternatives.len(), 1);
        assert_eq!(names(&alternatives[0]), vec!["b", "b"]);

        let mut p3 = Policy::new();
        p3.add_assertion(prim("z"));
        assert!(p1.intersect(&p3).is_none());
    }

    #[test]
    fn intersect_recurses_into_nested_policies() {
        let nested = |inner: &str| {
            let mut p = Policy::new();
            p.add_assertion(prim(inner));
            let mut outer = Policy::new();
            outer.add_assertion(NestedPrimitiveAssertion::new(q("n"), false, Some(p)));
            outer
        };
        assert!(nested("x").intersect(&nested("x")).is_some());
        assert!(nested("x").intersect(&nested("y")).is_none());
    }

    #[test]
    fn first_component_is_index_zero() {
        let mut policy = Policy::new();
        assert!(policy.first_policy_component().is_none());
        policy.add_assertion(prim("a"));
        policy.add_assertion(prim("b"));
        let first = policy
            .first_policy_component()
            .and_then(PolicyComponent::as_assertion)
            .map(|a| a.name().local_part());
        assert_eq!(first, Some("a"));
    }

    fn choices(width: usize) -> Policy {
        let mut policy = Policy::new();
        for i in 0..width {
            policy.add_policy_component(
                PolicyOperator::exactly_one()
                    .with(prim(&format!("a{i}")))
                    .with(prim(&format!("b{i}"))),
            );
        }
        policy
    }

    #[test]
    fn bounded_comparisons_stop_at_the_limit() {
        let wide = choices(30);
        let err = wide.equivalent_bounded(&wide, 1024).unwrap_err();
        assert_eq!(err.kind(), &PolicyErrorKind::TooManyAlternatives { limit: 1024 });
        let err = wide.intersect_bounded(&wide, 1024).unwrap_err();
        assert_eq!(err.kind(), &PolicyErrorKind::TooManyAlternatives { limit: 1024 });

        let small = choices(3);
        assert!(small.equivalent_bounded(&small, 1024).unwrap());
        let result = small.intersect_bounded(&small, 1024).unwrap().unwrap();
        assert_eq!(result.alternatives().len(), 8);
        assert!(small.intersect_bounded(&small, 4).is_err());
    }

    #[test]
    fn nested_intersection_honours_the_limit() {
        let wrap = |inner: Policy| {
            let mut outer = Policy::new();
            outer.add_assertion(NestedPrimitiveAssertion::new(q("n"), false, Some(inner)));
            outer
        };
        let outer = wrap(choices(30));
        assert!(outer.intersect_bounded(&outer, 1024).is_err());
        assert!(wrap(choices(2)).intersect_bounded(&wrap(choices(2)), 1024).unwrap().is_some());
    }

    proptest! {
        #[test]
        fn merge_multiplies_alternatives(p in arb_flat_policy(), r in arb_flat_policy()) {
            let merged = p.merge(&r);
            prop_assert_eq!(
                merged.alternatives().len(),
                p.alternatives().len() * r.alternatives().len()
            );
        }

        #[test]
        fn flat_policy_intersects_itself_when_it_has_alternatives(p in arb_flat_policy()) {
            let result = p.intersect(&p);
            prop_assert_eq!(result.is_some(), !p.alternatives().is_empty());
        }

        #[test]
        fn intersection_is_symmetric_in_size(p in arb_flat_policy(), r in arb_flat_policy()) {
            let left = p.intersect(&r).map(|x| x.alternatives().len());
            let right = r.intersect(&p).map(|x| x.alternatives().len());
            prop_assert_eq!(left, right);
        }
    }
}
