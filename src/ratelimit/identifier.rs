//! Rate limit identifier construction.

use super::quota::QuotaClass;

/// A key that scopes one rate limit window.
///
/// The identifier is composed of the quota class and one or more subject
/// parts (client address, account email, operation name), so limits are
/// enforced per subject rather than globally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitIdentifier {
    /// The quota class this identifier belongs to
    pub class: QuotaClass,
    /// Subject parts, in order
    pub parts: Vec<String>,
}

impl RateLimitIdentifier {
    /// Start an identifier for a quota class.
    pub fn new(class: QuotaClass) -> Self {
        Self {
            class,
            parts: Vec::new(),
        }
    }

    /// Append a subject part.
    pub fn with(mut self, part: impl Into<String>) -> Self {
        self.parts.push(part.into());
        self
    }

    /// Convert the identifier to its string form (`class:part:part`).
    pub fn to_string_key(&self) -> String {
        let mut key = self.class.as_str().to_string();
        for part in &self.parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }
}

impl std::fmt::Display for RateLimitIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
