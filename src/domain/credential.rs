use serde::Serialize;
use std::fmt;

/// Opaque bearer token. Expiry is not tracked; a 401 is the only signal.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// The fixed service-account identity exchanged for a credential.
#[derive(Clone, Serialize)]
pub struct ServiceIdentity {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_hides_secrets() {
        let credential = Credential::new("abc.def");
        assert_eq!(format!("{:?}", credential), "Credential(..)");

        let identity = ServiceIdentity {
            username: "svc".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", identity);
        assert!(rendered.contains("svc"));
        assert!(!rendered.contains("hunter2"));
    }
}
