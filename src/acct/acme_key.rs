use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use zeroize::Zeroizing;

use crate::error::{AcmeError, Result};

/// Private key an account signs its requests with.
///
/// Elliptic curve P-256: signed requests stay small and the public key is
/// derived from the private key.
#[derive(Clone, Debug)]
pub struct AcmeKey {
    signing_key: p256::ecdsa::SigningKey,
}

impl AcmeKey {
    /// Generate a fresh P-256 key.
    pub fn generate() -> AcmeKey {
        let csprng = &mut rand::thread_rng();
        Self::from_key(p256::ecdsa::SigningKey::from(p256::SecretKey::random(
            csprng,
        )))
    }

    pub fn from_pem(pem: &str) -> Result<AcmeKey> {
        let signing_key = p256::ecdsa::SigningKey::from_pkcs8_pem(pem)
            .map_err(|err| AcmeError::Key(format!("failed to read key PEM: {err}")))?;
        Ok(Self::from_key(signing_key))
    }

    fn from_key(signing_key: p256::ecdsa::SigningKey) -> AcmeKey {
        AcmeKey { signing_key }
    }

    pub fn to_pem(&self) -> Result<Zeroizing<String>> {
        self.signing_key
            .to_pkcs8_pem(pkcs8::LineEnding::LF)
            .map_err(|err| AcmeError::Key(format!("private key to PEM: {err}")))
    }

    pub(crate) fn signing_key(&self) -> &p256::ecdsa::SigningKey {
        &self.signing_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_round_trip() {
        let key = AcmeKey::generate();
        let pem = key.to_pem().unwrap();

        let restored = AcmeKey::from_pem(&pem).unwrap();
        assert_eq!(
            key.signing_key().verifying_key(),
            restored.signing_key().verifying_key()
        );
    }

    #[test]
    fn rejects_garbage_pem() {
        let err = AcmeKey::from_pem("not a pem").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Invalid);
    }
}
