//! Shared proptest strategies for unit tests.

use proptest::prelude::*;

use crate::assertion::PrimitiveAssertion;
use crate::policy::{Policy, PolicyComponent, PolicyOperator};
use crate::qname::QName;

/// Namespace used by generated names.
pub const TEST_NS: &str = "urn:test-utils";

/// Strategy: a name from a four-letter vocabulary
pub fn arb_name() -> impl Strategy<Value = QName> {
    prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(|local| QName::new(TEST_NS, local))
}

/// Strategy: a primitive assertion, optional or not
pub fn arb_primitive() -> impl Strategy<Value = PrimitiveAssertion> {
    (arb_name(), any::<bool>()).prop_map(|(name, optional)| PrimitiveAssertion::new(name, optional))
}

/// Strategy: an `All`/`ExactlyOne` tree of primitive assertions
pub fn arb_flat_component() -> impl Strategy<Value = PolicyComponent> {
    let leaf = arb_primitive().prop_map(PolicyComponent::from);
    leaf.prop_recursive(2, 4, 3, |inner| {
        (any::<bool>(), prop::collection::vec(inner, 0..3)).prop_map(|(all, children)| {
            let mut op = if all {
                PolicyOperator::all()
            } else {
                PolicyOperator::exactly_one()
            };
            for child in children {
                op.add_policy_component(child);
            }
            PolicyComponent::from(op)
        })
    })
}

/// Strategy: a policy without nested assertions
pub fn arb_flat_policy() -> impl Strategy<Value = Policy> {
    prop::collection::vec(arb_flat_component(), 0..2).prop_map(|components| {
        let mut policy = Policy::new();
        for component in components {
            policy.add_policy_component(component);
        }
        policy
    })
}
