//! WAMP-cryptosign authentication (Ed25519).
//!
//! The public key travels in the HELLO authextra; the server answers
//! with a hex-encoded binary challenge, and the client signs the raw
//! challenge bytes. The AUTHENTICATE signature is the 128-hex-char
//! Ed25519 signature with the original challenge hex appended, which is
//! the concatenation servers verify against.

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use serde_json::{json, Value};

use super::Authenticator;
use crate::error::{Result, WampError};
use crate::protocol::types::{Challenge, ChallengeResponse, Kwargs};

/// Ed25519 cryptosign authenticator.
#[derive(Clone)]
pub struct CryptosignAuth {
    authid: Option<String>,
    signing_key: SigningKey,
}

impl CryptosignAuth {
    /// Build from a 32-byte private key in hex.
    pub fn from_private_key_hex(authid: Option<&str>, private_key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(private_key_hex)?;
        let seed: [u8; SECRET_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| WampError::Config("Ed25519 private key must be 32 bytes".into()))?;
        Ok(Self {
            authid: authid.map(str::to_owned),
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Generate a fresh random keypair.
    pub fn generate(authid: Option<&str>) -> Self {
        Self {
            authid: authid.map(str::to_owned),
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Hex encoding of the public key announced in authextra.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Hex encoding of the private key, for persisting a generated key.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

#[async_trait]
impl Authenticator for CryptosignAuth {
    fn auth_method(&self) -> &'static str {
        "cryptosign"
    }

    fn auth_id(&self) -> Option<&str> {
        self.authid.as_deref()
    }

    fn auth_extra(&self) -> Option<Kwargs> {
        let mut extra = Kwargs::new();
        extra.insert("pubkey".into(), json!(self.public_key_hex()));
        Some(extra)
    }

    async fn on_challenge(&self, challenge: &Challenge) -> Result<ChallengeResponse> {
        let challenge_hex = challenge
            .extra
            .get("challenge")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                WampError::Authentication("cryptosign challenge missing the challenge hex".into())
            })?;
        let challenge_bytes = hex::decode(challenge_hex)
            .map_err(|err| WampError::Authentication(format!("invalid challenge hex: {err}")))?;

        let signature = self.signing_key.sign(&challenge_bytes);
        Ok(ChallengeResponse {
            signature: format!("{}{challenge_hex}", hex::encode(signature.to_bytes())),
            extra: Kwargs::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};
    use hex_literal::hex;

    const PRIVATE_KEY: &str = "61b297d1573d0a2a6ac58d7fd39369adbd365c5b3276bd69edf661c92b7ad9ff";
    const PUBLIC_KEY: &str = "ea971c008ee99021eaf48342791442dd742259a4bf14004fa3500d1fa6995211";
    const CHALLENGE: &str = "f9d17535fb925e9f674d648cbfc41399";
    const SIGNATURE: &str = "539707667d93bb9eb01e72be9ca5e00006bb6b1b786d697b3f189ebf5a0f60c7\
                             0b8054f3735e19b77df31dc990864fb21259cfe3021f9a7e8ec0427c2077840a";

    fn fixture_auth() -> CryptosignAuth {
        CryptosignAuth::from_private_key_hex(Some("device1"), PRIVATE_KEY).unwrap()
    }

    #[test]
    fn test_public_key_derivation() {
        assert_eq!(fixture_auth().public_key_hex(), PUBLIC_KEY);
        let expected = hex!("ea971c008ee99021eaf48342791442dd742259a4bf14004fa3500d1fa6995211");
        assert_eq!(
            fixture_auth().signing_key.verifying_key().as_bytes(),
            &expected
        );
    }

    #[test]
    fn test_authextra_carries_pubkey() {
        let extra = fixture_auth().auth_extra().unwrap();
        assert_eq!(extra.get("pubkey"), Some(&json!(PUBLIC_KEY)));
    }

    #[tokio::test]
    async fn test_signature_matches_reference() {
        let mut extra = Kwargs::new();
        extra.insert("challenge".into(), json!(CHALLENGE));
        let response = fixture_auth()
            .on_challenge(&Challenge {
                method: "cryptosign".into(),
                extra,
            })
            .await
            .unwrap();
        let expected: String = SIGNATURE.split_whitespace().collect();
        assert_eq!(response.signature, format!("{expected}{CHALLENGE}"));
    }

    #[tokio::test]
    async fn test_signature_verifies_against_pubkey() {
        let auth = fixture_auth();
        let mut extra = Kwargs::new();
        extra.insert("challenge".into(), json!(CHALLENGE));
        let response = auth
            .on_challenge(&Challenge {
                method: "cryptosign".into(),
                extra,
            })
            .await
            .unwrap();

        let sig_hex = &response.signature[..128];
        let signature = Signature::from_slice(&hex::decode(sig_hex).unwrap()).unwrap();
        let verifying = auth.signing_key.verifying_key();
        verifying
            .verify(&hex::decode(CHALLENGE).unwrap(), &signature)
            .unwrap();
    }

    #[test]
    fn test_generated_key_round_trips_through_hex() {
        let auth = CryptosignAuth::generate(None);
        let restored =
            CryptosignAuth::from_private_key_hex(None, &auth.private_key_hex()).unwrap();
        assert_eq!(restored.public_key_hex(), auth.public_key_hex());
    }

    #[test]
    fn test_bad_key_length_is_rejected() {
        assert!(CryptosignAuth::from_private_key_hex(None, "deadbeef").is_err());
    }
}
