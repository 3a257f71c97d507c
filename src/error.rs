use std::fmt;

use crate::qname::QName;

/// Errors that can occur in the policy crate.
#[derive(Debug)]
pub enum Error {
    /// A policy could not be built, selected or satisfied
    Policy(PolicyError),
    /// A schema document or collection is invalid
    Schema(SchemaError),
    /// Input text is not well-formed XML
    Xml(XmlError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Policy(e) => write!(f, "Policy error: {}", e),
            Error::Schema(e) => write!(f, "Schema error: {}", e),
            Error::Xml(e) => write!(f, "XML error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Policy(e) => Some(e),
            Error::Schema(e) => Some(e),
            Error::Xml(e) => Some(e),
        }
    }
}

impl From<PolicyError> for Error {
    fn from(e: PolicyError) -> Self {
        Error::Policy(e)
    }
}

impl From<SchemaError> for Error {
    fn from(e: SchemaError) -> Self {
        Error::Schema(e)
    }
}

impl From<XmlError> for Error {
    fn from(e: XmlError) -> Self {
        Error::Xml(e)
    }
}

/// A policy failure with details about what went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyError {
    kind: PolicyErrorKind,
    message: String,
}

impl PolicyError {
    /// Creates a new policy error.
    pub fn new(kind: PolicyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> &PolicyErrorKind {
        &self.kind
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for PolicyError {}

/// The kind of policy failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyErrorKind {
    /// No assertion builder is registered for an element and unknown
    /// assertions are not tolerated
    UnknownAssertion {
        /// Name of the offending element
        name: QName,
    },
    /// None of the policy alternatives can be supported
    NoAlternative,
    /// No alternative of the effective policy has been satisfied
    Unsatisfied {
        /// Assertions that were required but not asserted
        names: Vec<QName>,
    },
    /// Normalization would produce more alternatives than allowed
    TooManyAlternatives {
        /// The configured bound
        limit: usize,
    },
    /// The policy expression is structurally invalid
    InvalidPolicy,
    /// The policy engine is disabled
    Disabled,
}

impl fmt::Display for PolicyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyErrorKind::UnknownAssertion { name } => write!(f, "Unknown assertion {}", name),
            PolicyErrorKind::NoAlternative => write!(f, "No supported alternative"),
            PolicyErrorKind::Unsatisfied { names } => {
                write!(f, "Unsatisfied assertions [")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", name)?;
                }
                write!(f, "]")
            }
            PolicyErrorKind::TooManyAlternatives { limit } => {
                write!(f, "More than {} alternatives", limit)
            }
            PolicyErrorKind::InvalidPolicy => write!(f, "Invalid policy"),
            PolicyErrorKind::Disabled => write!(f, "Policy engine disabled"),
        }
    }
}

/// Error returned when a schema document or collection is unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    kind: SchemaErrorKind,
    message: String,
}

impl SchemaError {
    /// Creates a new schema error.
    pub fn new(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> &SchemaErrorKind {
        &self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the unresolved references when validation failed.
    pub fn violations(&self) -> &[SchemaViolation] {
        match &self.kind {
            SchemaErrorKind::Invalid { violations } => violations,
            _ => &[],
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for SchemaError {}

/// Kind of schema error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// The document root is not `xsd:schema`
    NotASchema,
    /// A schema for this target namespace is already in the collection
    DuplicateNamespace {
        /// The target namespace registered twice
        namespace: String,
    },
    /// Strict validation found unresolved references
    Invalid {
        /// Every reference that failed to resolve
        violations: Vec<SchemaViolation>,
    },
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotASchema => write!(f, "not a schema"),
            Self::DuplicateNamespace { namespace } => {
                write!(f, "duplicate target namespace '{}'", namespace)
            }
            Self::Invalid { violations } => {
                write!(f, "{} unresolved reference(s)", violations.len())
            }
        }
    }
}

/// A single reference that strict validation could not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Target namespace of the referencing document
    pub schema: String,
    /// What kind of component was referenced
    pub reference: crate::schema::ReferenceKind,
    /// The raw attribute value as written in the document
    pub value: String,
    /// The resolved name, when the prefix could be resolved
    pub target: Option<QName>,
    /// Why the reference failed
    pub reason: ViolationReason,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "schema '{}': {} reference '{}' ({})",
            self.schema, self.reference, self.value, self.reason
        )
    }
}

/// Why a schema reference did not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationReason {
    /// The QName prefix is not bound in scope
    UnboundPrefix,
    /// The referenced namespace is foreign and not imported
    MissingImport,
    /// No schema for the referenced namespace is in the collection
    UnknownNamespace,
    /// The namespace is known but declares no such component
    MissingComponent,
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnboundPrefix => write!(f, "unbound prefix"),
            Self::MissingImport => write!(f, "namespace not imported"),
            Self::UnknownNamespace => write!(f, "namespace not in collection"),
            Self::MissingComponent => write!(f, "component not declared"),
        }
    }
}

/// Malformed XML input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlError {
    message: String,
    position: Option<(u32, u32)>,
}

impl XmlError {
    /// Creates a new XML error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    /// Attaches the 1-based `(row, column)` of the failure.
    pub fn at(mut self, row: u32, col: u32) -> Self {
        self.position = Some((row, col));
        self
    }

    /// Returns the parser message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the `(row, column)` of the failure, if known.
    pub fn position(&self) -> Option<(u32, u32)> {
        self.position
    }
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for XmlError {}

impl From<roxmltree::Error> for XmlError {
    fn from(e: roxmltree::Error) -> Self {
        let pos = e.pos();
        XmlError::new(e.to_string()).at(pos.row, pos.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsatisfied_lists_every_name() {
        let kind = PolicyErrorKind::Unsatisfied {
            names: vec![QName::new("urn:a", "x"), QName::local("y")],
        };
        assert_eq!(kind.to_string(), "Unsatisfied assertions [{urn:a}x, y]");
    }

    #[test]
    fn error_wraps_policy_error_with_source() {
        use std::error::Error as _;

        let err: Error = PolicyError::new(PolicyErrorKind::NoAlternative, "nothing fits").into();
        assert_eq!(
            err.to_string(),
            "Policy error: No supported alternative: nothing fits"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn violations_empty_for_non_validation_errors() {
        let err = SchemaError::new(SchemaErrorKind::NotASchema, "root is 'foo'");
        assert!(err.violations().is_empty());
    }

    #[test]
    fn parser_errors_keep_their_position() {
        let err = XmlError::from(roxmltree::Document::parse("<a>\n<b></a>").unwrap_err());
        let (row, _) = err.position().unwrap();
        assert_eq!(row, 2);
    }
}
