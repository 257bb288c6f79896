//! Service-level API-key credential (`i-api-key` header).

use subtle::ConstantTimeEq;

/// The shared key internal callers present on the task-submission boundary.
#[derive(Clone)]
pub struct ServiceApiKey(Vec<u8>);

impl ServiceApiKey {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self(key.as_ref().to_vec())
    }

    /// Constant-time comparison against a presented header value.
    pub fn matches(&self, presented: &str) -> bool {
        self.0.ct_eq(presented.as_bytes()).into()
    }
}

impl core::fmt::Debug for ServiceApiKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("ServiceApiKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_key_is_accepted() {
        let key = ServiceApiKey::new("secret");
        assert!(key.matches("secret"));
    }

    #[test]
    fn wrong_or_truncated_key_is_rejected() {
        let key = ServiceApiKey::new("secret");
        assert!(!key.matches("secre"));
        assert!(!key.matches("Secret"));
        assert!(!key.matches(""));
    }
}
