//! The policy engine: configuration, supported vocabulary and alternative
//! selection.

use std::collections::HashSet;
use std::sync::Arc;

use crate::assertion::PolicyAssertion;
use crate::assertion_info::AssertionInfoMap;
use crate::builder::{AssertionBuilder, AssertionBuilderRegistry, PolicyBuilder};
use crate::error::{PolicyError, PolicyErrorKind};
use crate::policy::{Alternative, Policy};
use crate::qname::QName;
use crate::selector::{AlternativeSelector, Assertor, SelectorKind};

/// Engine configuration.
///
/// # Examples
///
/// ```
/// use ws_policy_core::{EngineConfig, SelectorKind};
///
/// let config = EngineConfig::default()
///     .with_ignore_unknown_assertions(false)
///     .with_selector(SelectorKind::Minimal);
/// assert!(config.enabled());
/// assert_eq!(config.max_alternatives(), 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    enabled: bool,
    ignore_unknown_assertions: bool,
    max_alternatives: usize,
    selector: SelectorKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ignore_unknown_assertions: true,
            max_alternatives: 1024,
            selector: SelectorKind::First,
        }
    }
}

impl EngineConfig {
    /// Enables or disables the engine.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets whether assertions without a registered builder are accepted.
    pub fn with_ignore_unknown_assertions(mut self, ignore: bool) -> Self {
        self.ignore_unknown_assertions = ignore;
        self
    }

    /// Bounds the number of alternatives produced by normalization.
    pub fn with_max_alternatives(mut self, max: usize) -> Self {
        self.max_alternatives = max;
        self
    }

    /// Chooses the alternative selector.
    pub fn with_selector(mut self, selector: SelectorKind) -> Self {
        self.selector = selector;
        self
    }

    /// Returns true if the engine is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true if unknown assertions are tolerated.
    pub fn ignore_unknown_assertions(&self) -> bool {
        self.ignore_unknown_assertions
    }

    /// Returns the normalization bound.
    pub fn max_alternatives(&self) -> usize {
        self.max_alternatives
    }

    /// Returns the configured selector.
    pub fn selector(&self) -> SelectorKind {
        self.selector
    }
}

/// Chooses alternatives and prepares per-exchange assertion records.
///
/// The engine is built once at startup and then only read, so it can be
/// shared across exchanges. Each exchange gets its own
/// [`AssertionInfoMap`] from [`new_exchange`](Self::new_exchange).
///
/// # Examples
///
/// ```
/// use ws_policy_core::{EngineConfig, Policy, PolicyEngine, PolicyOperator, PrimitiveAssertion, QName};
///
/// let fast = QName::new("urn:t", "Fast");
/// let cheap = QName::new("urn:t", "Cheap");
///
/// let mut engine = PolicyEngine::new(EngineConfig::default());
/// engine.register_interceptor_provider([cheap.clone()]);
///
/// let mut policy = Policy::new();
/// policy.add_policy_component(
///     PolicyOperator::exactly_one()
///         .with(PrimitiveAssertion::new(fast, false))
///         .with(PrimitiveAssertion::new(cheap.clone(), false)),
/// );
///
/// let mut aim = engine.new_exchange(&policy, None).unwrap();
/// aim.assert_all(&cheap);
/// assert!(aim.check_effective_policy(&policy).is_ok());
/// ```
pub struct PolicyEngine {
    config: EngineConfig,
    vocabulary: HashSet<QName>,
    registry: AssertionBuilderRegistry,
    selector: Box<dyn AlternativeSelector>,
}

impl PolicyEngine {
    /// Creates an engine with an empty vocabulary and builder registry.
    pub fn new(config: EngineConfig) -> Self {
        let selector = config.selector().selector();
        Self {
            config,
            vocabulary: HashSet::new(),
            registry: AssertionBuilderRegistry::new(),
            selector,
        }
    }

    /// Replaces the selector with a custom strategy.
    pub fn with_selector(mut self, selector: Box<dyn AlternativeSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Declares that runtime components can assert these names.
    pub fn register_interceptor_provider(&mut self, names: impl IntoIterator<Item = QName>) {
        self.vocabulary.extend(names);
    }

    /// Registers an assertion builder.
    pub fn register_assertion_builder(&mut self, builder: Arc<dyn AssertionBuilder>) {
        self.registry.register(builder);
    }

    /// Returns the builder registry.
    pub fn registry(&self) -> &AssertionBuilderRegistry {
        &self.registry
    }

    /// Returns a policy builder honouring this engine's configuration.
    pub fn builder(&self) -> PolicyBuilder<'_> {
        PolicyBuilder::new(&self.registry)
            .with_ignore_unknown_assertions(self.config.ignore_unknown_assertions())
    }

    /// True if every assertion is optional, in the engine vocabulary, or
    /// assertable by `assertor`.
    pub fn supports_alternative(
        &self,
        alternative: &[PolicyAssertion],
        assertor: Option<&dyn Assertor>,
    ) -> bool {
        alternative.iter().all(|a| {
            a.is_optional()
                || self.vocabulary.contains(a.name())
                || assertor.is_some_and(|x| x.can_assert(a.name()))
        })
    }

    /// Normalizes `policy` and picks a supported alternative.
    ///
    /// # Errors
    ///
    /// - `Disabled` if the engine is switched off
    /// - `TooManyAlternatives` if normalization exceeds the configured bound
    /// - `NoAlternative` if nothing is supported
    pub fn select_alternative(
        &self,
        policy: &Policy,
        assertor: Option<&dyn Assertor>,
    ) -> Result<Alternative, PolicyError> {
        if !self.config.enabled() {
            return Err(PolicyError::new(
                PolicyErrorKind::Disabled,
                "alternative selection requested from a disabled engine",
            ));
        }
        let alternatives = policy.alternatives_bounded(self.config.max_alternatives())?;
        let offered = alternatives.len();
        let supported = |alternative: &Alternative| self.supports_alternative(alternative, assertor);
        match self.selector.select_alternative(alternatives, &supported) {
            Some(chosen) => {
                tracing::debug!(offered, chosen = chosen.len(), "selected policy alternative");
                Ok(chosen)
            }
            None => {
                tracing::warn!(offered, "no policy alternative is supported");
                Err(PolicyError::new(
                    PolicyErrorKind::NoAlternative,
                    format!("none of {} alternatives is supported", offered),
                ))
            }
        }
    }

    /// Intersects two policies under the configured normalization bound.
    ///
    /// # Errors
    ///
    /// Returns `TooManyAlternatives` if either side, a nested policy, or
    /// the result exceeds the bound.
    pub fn intersect(&self, a: &Policy, b: &Policy) -> Result<Option<Policy>, PolicyError> {
        let result = a.intersect_bounded(b, self.config.max_alternatives());
        if let Err(e) = &result {
            tracing::warn!(error = %e, "policy intersection refused");
        }
        result
    }

    /// Selects an alternative and builds a fresh record map for one exchange.
    ///
    /// # Errors
    ///
    /// Same as [`select_alternative`](Self::select_alternative).
    pub fn new_exchange(
        &self,
        policy: &Policy,
        assertor: Option<&dyn Assertor>,
    ) -> Result<AssertionInfoMap, PolicyError> {
        let chosen = self.select_alternative(policy, assertor)?;
        Ok(AssertionInfoMap::new(chosen))
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("config", &self.config)
            .field("vocabulary", &self.vocabulary.len())
            .field("registry", &self.registry)
            .finish()
    }
}
