//! Operator credential check
//!
//! Gates the advanced configuration surface behind a single shared secret.
//! The credential is injected by the embedding application instead of living
//! in a global; the one-operator threat model itself is unchanged.

/// The single operator login accepted by the configuration surface
#[derive(Debug, Clone)]
pub struct OperatorCredentials {
    username: String,
    password: String,
}

impl OperatorCredentials {
    /// Create the credential pair the embedding application accepts
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check a login attempt
    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}
