//! Credentials and environment selection

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{PRODUCTION_BASE_URL, SANDBOX_BASE_URL};
use crate::impl_wire_name;

/// Vendor environment the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl_wire_name!(Environment {
    Sandbox => "sandbox",
    Production => "production",
});

impl Environment {
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Sandbox => SANDBOX_BASE_URL,
            Self::Production => PRODUCTION_BASE_URL,
        }
    }
}

/// Client credentials, immutable for the lifetime of a client
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub environment: Environment,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            email: None,
            environment,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

// Secrets never reach logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("email", &self.email)
            .field("environment", &self.environment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("client-1", "hunter2", Environment::Production)
            .with_email("ops@shop.test");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("client-1"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_environment_base_urls() {
        assert_eq!(Environment::Sandbox.default_base_url(), SANDBOX_BASE_URL);
        assert_eq!(Environment::Production.default_base_url(), PRODUCTION_BASE_URL);
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
    }
}
