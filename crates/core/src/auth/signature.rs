//! Signed-header computation for read endpoints

use catalink_domain::{Credentials, Environment};
use sha2::{Digest, Sha256};

/// `Authorization` value for signed endpoints
///
/// Sandbox sends the secret as-is: `"<client id>, <client secret>"`.
/// Production sends `"<client id>, hex(sha256(client id + email + secret))"`;
/// a missing email hashes as the empty string.
pub fn signed_authorization(credentials: &Credentials) -> String {
    let key = match credentials.environment {
        Environment::Sandbox => credentials.client_secret.clone(),
        Environment::Production => {
            let mut hasher = Sha256::new();
            hasher.update(credentials.client_id.as_bytes());
            hasher.update(credentials.email.as_deref().unwrap_or_default().as_bytes());
            hasher.update(credentials.client_secret.as_bytes());
            hex::encode(hasher.finalize())
        }
    };
    format!("{}, {key}", credentials.client_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_header_is_plain() {
        let creds = Credentials::new("cid", "secret", Environment::Sandbox);
        assert_eq!(signed_authorization(&creds), "cid, secret");
    }

    #[test]
    fn test_production_header_is_hashed() {
        let creds = Credentials::new("cid", "secret", Environment::Production)
            .with_email("ops@shop.test");
        let expected = hex::encode(Sha256::digest(b"cidops@shop.testsecret"));

        let header = signed_authorization(&creds);
        assert_eq!(header, format!("cid, {expected}"));
        assert!(!header.contains("secret"));
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn test_production_without_email() {
        let creds = Credentials::new("cid", "secret", Environment::Production);
        let expected = hex::encode(Sha256::digest(b"cidsecret"));
        assert_eq!(signed_authorization(&creds), format!("cid, {expected}"));
    }
}
