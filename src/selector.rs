//! Alternative selection.
//!
//! After normalization a policy offers several alternatives. The engine
//! filters them down to the ones it can support and an
//! [`AlternativeSelector`] picks the winner.

use std::collections::HashSet;

use crate::policy::Alternative;
use crate::qname::QName;

/// Something that can confirm assertions at runtime (a transport, a
/// conduit, an interceptor set).
pub trait Assertor {
    /// Returns true if this component can assert `name`.
    fn can_assert(&self, name: &QName) -> bool;
}

impl Assertor for HashSet<QName> {
    fn can_assert(&self, name: &QName) -> bool {
        self.contains(name)
    }
}

/// Strategy for choosing one alternative among the supported ones.
pub trait AlternativeSelector: Send + Sync {
    /// Picks an alternative from `alternatives`, considering only those for
    /// which `supported` returns true.
    fn select_alternative(
        &self,
        alternatives: Vec<Alternative>,
        supported: &dyn Fn(&Alternative) -> bool,
    ) -> Option<Alternative>;
}

/// Picks the first supported alternative in document order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAlternativeSelector;

impl AlternativeSelector for FirstAlternativeSelector {
    fn select_alternative(
        &self,
        alternatives: Vec<Alternative>,
        supported: &dyn Fn(&Alternative) -> bool,
    ) -> Option<Alternative> {
        alternatives.into_iter().find(|a| supported(a))
    }
}

/// Picks the supported alternative with the fewest assertions.
///
/// Ties go to the earliest alternative.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalAlternativeSelector;

impl AlternativeSelector for MinimalAlternativeSelector {
    fn select_alternative(
        &self,
        alternatives: Vec<Alternative>,
        supported: &dyn Fn(&Alternative) -> bool,
    ) -> Option<Alternative> {
        let mut best: Option<Alternative> = None;
        for alternative in alternatives.into_iter().filter(|a| supported(a)) {
            if best.as_ref().map_or(true, |b| alternative.len() < b.len()) {
                best = Some(alternative);
            }
        }
        best
    }
}

/// Picks the supported alternative with the most assertions.
///
/// Ties go to the earliest alternative.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaximalAlternativeSelector;

impl AlternativeSelector for MaximalAlternativeSelector {
    fn select_alternative(
        &self,
        alternatives: Vec<Alternative>,
        supported: &dyn Fn(&Alternative) -> bool,
    ) -> Option<Alternative> {
        let mut best: Option<Alternative> = None;
        for alternative in alternatives.into_iter().filter(|a| supported(a)) {
            if best.as_ref().map_or(true, |b| alternative.len() > b.len()) {
                best = Some(alternative);
            }
        }
        best
    }
}

/// Configurable choice of built-in selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectorKind {
    /// [`FirstAlternativeSelector`]
    #[default]
    First,
    /// [`MinimalAlternativeSelector`]
    Minimal,
    /// [`MaximalAlternativeSelector`]
    Maximal,
}

impl SelectorKind {
    /// Returns the selector implementing this choice.
    pub fn selector(self) -> Box<dyn AlternativeSelector> {
        match self {
            SelectorKind::First => Box::new(FirstAlternativeSelector),
            SelectorKind::Minimal => Box::new(MinimalAlternativeSelector),
            SelectorKind::Maximal => Box::new(MaximalAlternativeSelector),
        }
    }
}
