//! Execution secrets
//!
//! Every job gets a fresh, unique token naming its private sandbox directory.
//! The token is generated by a factory injected into the job driver and then
//! passed along as a value.

use std::fmt;
use uuid::Uuid;

const SHORT_ID_LEN: usize = 8;

/// Opaque per-job isolation token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionSecret(String);

impl ExecutionSecret {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters of the token, enough to tell jobs apart in logs
    /// without exposing the token itself
    pub fn short_id(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(SHORT_ID_LEN)
            .map_or(self.0.len(), |(index, _)| index);
        &self.0[..end]
    }
}

impl fmt::Display for ExecutionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of execution secrets
pub trait SecretFactory: Send + Sync {
    /// Returns a token never handed out before by this factory
    fn generate(&self) -> ExecutionSecret;
}

/// Secrets backed by random v4 UUIDs (32 hex characters, safe in paths and
/// shell commands without quoting)
#[derive(Debug, Default)]
pub struct UuidSecretFactory;

impl SecretFactory for UuidSecretFactory {
    fn generate(&self) -> ExecutionSecret {
        ExecutionSecret(Uuid::new_v4().simple().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uuid_secrets_are_unique_and_path_safe() {
        let factory = UuidSecretFactory;
        let secrets: HashSet<_> = (0..100).map(|_| factory.generate()).collect();
        assert_eq!(secrets.len(), 100);

        for secret in secrets {
            assert_eq!(secret.as_str().len(), 32);
            assert!(secret.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_short_id_is_a_prefix() {
        let secret = ExecutionSecret::new("0123456789abcdef0123456789abcdef");
        assert_eq!(secret.short_id(), "01234567");
        assert_eq!(ExecutionSecret::new("job-0").short_id(), "job-0");
    }
}
