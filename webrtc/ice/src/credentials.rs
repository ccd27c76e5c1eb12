//! ICE username fragment and password.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of generated username fragments (RFC 8839 requires at least 4).
pub const UFRAG_LENGTH: usize = 4;
/// Length of generated passwords (RFC 8839 requires at least 22).
pub const PWD_LENGTH: usize = 24;

/// ICE credentials of one side of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCredentials {
    pub ufrag: String,
    pub pwd: String,
}

impl IceCredentials {
    pub fn new(ufrag: impl Into<String>, pwd: impl Into<String>) -> Self {
        Self {
            ufrag: ufrag.into(),
            pwd: pwd.into(),
        }
    }

    /// Generates random alphanumeric credentials.
    pub fn generate() -> Self {
        Self {
            ufrag: random_string(UFRAG_LENGTH),
            pwd: random_string(PWD_LENGTH),
        }
    }
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_lengths() {
        let creds = IceCredentials::generate();
        assert_eq!(creds.ufrag.len(), UFRAG_LENGTH);
        assert_eq!(creds.pwd.len(), PWD_LENGTH);
        assert!(creds.pwd.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_is_random() {
        assert_ne!(IceCredentials::generate().pwd, IceCredentials::generate().pwd);
    }
}
