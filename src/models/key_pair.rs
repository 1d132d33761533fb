use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    Ed25519,
    Rsa,
    Ecdsa,
}

impl KeyAlgorithm {
    /// Argument form accepted by `ssh-keygen -t`.
    pub fn keygen_arg(&self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519 => "ed25519",
            KeyAlgorithm::Rsa => "rsa",
            KeyAlgorithm::Ecdsa => "ecdsa",
        }
    }

    /// Whether `ssh-keygen` takes a `-b` bit size for this algorithm.
    /// Ed25519 keys have a fixed size.
    pub fn accepts_bit_size(&self) -> bool {
        !matches!(self, KeyAlgorithm::Ed25519)
    }
}

impl From<&str> for KeyAlgorithm {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "rsa" | "ssh-rsa" => KeyAlgorithm::Rsa,
            "ecdsa" | "ecdsa-sha2-nistp256" | "ecdsa-sha2-nistp384" | "ecdsa-sha2-nistp521" => {
                KeyAlgorithm::Ecdsa
            }
            _ => KeyAlgorithm::Ed25519,
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keygen_arg())
    }
}

/// A usable local key pair. Immutable once produced; `public_key_material`
/// is always read fresh from `public_path` by the provider, never cached
/// across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub private_path: PathBuf,
    pub public_path: PathBuf,
    /// One OpenSSH-format line: `<algorithm> <base64> [comment]`, trimmed.
    pub public_key_material: String,
    /// SHA-256 fingerprint, e.g. `SHA256:abc...`. Identifies the pair for
    /// idempotence checks.
    pub fingerprint: String,
    pub algorithm: KeyAlgorithm,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_from_key_type_string() {
        assert_eq!(KeyAlgorithm::from("ssh-rsa"), KeyAlgorithm::Rsa);
        assert_eq!(
            KeyAlgorithm::from("ecdsa-sha2-nistp256"),
            KeyAlgorithm::Ecdsa
        );
        assert_eq!(KeyAlgorithm::from("ssh-ed25519"), KeyAlgorithm::Ed25519);
    }

    #[test]
    fn ed25519_has_fixed_size() {
        assert!(!KeyAlgorithm::Ed25519.accepts_bit_size());
        assert!(KeyAlgorithm::Rsa.accepts_bit_size());
    }
}
