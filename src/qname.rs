use std::fmt;

/// WS-Policy 1.5 namespace.
pub const WSP_NAMESPACE: &str = "http://www.w3.org/ns/ws-policy";

/// WS-Policy 1.2 (submission) namespace.
pub const WSP_NAMESPACE_2004: &str = "http://schemas.xmlsoap.org/ws/2004/09/policy";

/// XML Schema namespace.
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// The namespace bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A qualified XML name: namespace URI plus local part.
///
/// An empty namespace means "no namespace". Two names are equal when both
/// parts are equal; prefixes never take part in identity.
///
/// # Examples
///
/// ```
/// use ws_policy_core::QName;
///
/// let name = QName::new("http://example.org/sp", "TransportBinding");
/// assert_eq!(name.local_part(), "TransportBinding");
/// assert_eq!(name.to_string(), "{http://example.org/sp}TransportBinding");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    namespace: String,
    local_part: String,
}

impl QName {
    /// Creates a qualified name.
    pub fn new(namespace: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_part: local_part.into(),
        }
    }

    /// Creates a name with no namespace.
    pub fn local(local_part: impl Into<String>) -> Self {
        Self::new(String::new(), local_part)
    }

    /// Returns the namespace URI (empty for no namespace).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the local part.
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    /// Returns true if this name lives in one of the WS-Policy namespaces.
    pub fn is_policy_namespace(&self) -> bool {
        self.namespace == WSP_NAMESPACE || self.namespace == WSP_NAMESPACE_2004
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local_part)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_part)
        }
    }
}
