use crate::parameter::{Parameter, ParameterError, ParameterSet};
use sha2::{Digest, Sha256};

/// A parameter that only ever stores the SHA-256 digest of what was typed,
/// as a hex string. An empty password clears it.
#[derive(Clone, Debug)]
pub struct PasswordParameter {
    param: Parameter,
}

impl PasswordParameter {
    pub fn new(set: &mut ParameterSet, key: &str) -> Self {
        Self {
            param: set.string(key, ""),
        }
    }

    pub fn parameter(&self) -> &Parameter {
        &self.param
    }

    pub fn is_set(&self) -> bool {
        !self.param.text().is_empty()
    }

    pub fn set_password(&self, password: &str) -> Result<bool, ParameterError> {
        if password.is_empty() {
            return self.param.set_text("");
        }
        self.param.set_text(&digest_hex(password.as_bytes()))
    }

    /// Compares the candidate's digest with the stored one. Digests of
    /// different lengths never match.
    pub fn matches(&self, candidate: &str) -> bool {
        let stored = self.param.text();
        if stored.is_empty() {
            return candidate.is_empty();
        }
        let Ok(stored) = hex::decode(stored) else {
            return false;
        };
        let candidate = Sha256::digest(candidate.as_bytes());
        digests_equal(&stored, &candidate)
    }
}

pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn digests_equal(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SettingsStore;
    use std::sync::Arc;

    #[test]
    fn stores_digest_not_plaintext() {
        let mut set = ParameterSet::new(Arc::new(SettingsStore::in_memory()));
        let password = PasswordParameter::new(&mut set, "Password");
        assert!(!password.is_set());
        assert!(password.set_password("hunter2").unwrap());
        assert!(password.is_set());
        let stored = password.parameter().text();
        assert_eq!(stored.len(), 64);
        assert!(!stored.contains("hunter2"));
        assert!(password.matches("hunter2"));
        assert!(!password.matches("hunter3"));
        assert!(!password.matches(""));
    }

    #[test]
    fn clearing_accepts_only_empty() {
        let mut set = ParameterSet::new(Arc::new(SettingsStore::in_memory()));
        let password = PasswordParameter::new(&mut set, "Password");
        password.set_password("x").unwrap();
        password.set_password("").unwrap();
        assert!(password.matches(""));
        assert!(!password.matches("x"));
    }

    #[test]
    fn mismatched_lengths_never_match() {
        assert!(!digests_equal(&[1, 2, 3], &[1, 2]));
        assert!(!digests_equal(&[], &[0]));
        assert!(digests_equal(&[7, 8], &[7, 8]));
    }

    #[test]
    fn truncated_stored_digest_is_rejected() {
        let mut set = ParameterSet::new(Arc::new(SettingsStore::in_memory()));
        let password = PasswordParameter::new(&mut set, "Password");
        let full = digest_hex(b"secret");
        password.parameter().set_text(&full[..32]).unwrap();
        assert!(!password.matches("secret"));
    }
}
