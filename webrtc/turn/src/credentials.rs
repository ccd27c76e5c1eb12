//! Long-term credentials (RFC 5389 Section 10.2).

use md5::{Digest, Md5};

/// A configured TURN username and password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// MESSAGE-INTEGRITY key: MD5(username ":" realm ":" password).
    pub fn long_term_key(&self, realm: &str) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(self.username.as_bytes());
        hasher.update(b":");
        hasher.update(realm.as_bytes());
        hasher.update(b":");
        hasher.update(self.password.as_bytes());
        hasher.finalize().into()
    }
}

/// Realm and nonce learned from a 401 challenge.
#[derive(Debug, Clone)]
pub(crate) struct AuthContext {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub key: [u8; 16],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_term_key_is_md5_of_joined_fields() {
        let credentials = Credentials::new("user", "pass");
        assert_eq!(
            credentials.long_term_key("example.org"),
            [171, 202, 53, 53, 111, 75, 0, 251, 195, 62, 45, 140, 44, 67, 185, 214]
        );
        assert_ne!(
            credentials.long_term_key("a"),
            credentials.long_term_key("b")
        );
    }
}
