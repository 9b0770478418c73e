//! WAMP-CRA challenge-response authentication.
//!
//! Plain mode signs the server's challenge string with
//! HMAC-SHA256(secret). Salted mode first derives the signing key with
//! PBKDF2-HMAC-SHA256 from the `salt`, `iterations` and `keylen`
//! parameters in the challenge extra, base64-encodes the derived key
//! and signs with that encoding's bytes, matching what servers derive
//! on their side.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use super::Authenticator;
use crate::error::{Result, WampError};
use crate::protocol::types::{Challenge, ChallengeResponse, Kwargs};

type HmacSha256 = Hmac<Sha256>;

/// WAMP-CRA authenticator holding a shared secret.
#[derive(Debug, Clone)]
pub struct CraAuth {
    authid: String,
    secret: String,
}

impl CraAuth {
    /// CRA auth for `authid` with the given shared secret.
    pub fn new(authid: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            authid: authid.into(),
            secret: secret.into(),
        }
    }

    fn signing_key(&self, extra: &Kwargs) -> Result<Vec<u8>> {
        let Some(salt) = extra.get("salt").and_then(Value::as_str) else {
            return Ok(self.secret.clone().into_bytes());
        };
        let iterations = extra
            .get("iterations")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                WampError::Authentication("salted challenge without iterations".into())
            })?;
        let keylen = extra
            .get("keylen")
            .and_then(Value::as_u64)
            .ok_or_else(|| WampError::Authentication("salted challenge without keylen".into()))?;

        let mut derived = vec![0u8; keylen as usize];
        pbkdf2::pbkdf2::<HmacSha256>(
            self.secret.as_bytes(),
            salt.as_bytes(),
            u32::try_from(iterations)
                .map_err(|_| WampError::Authentication("iteration count too large".into()))?,
            &mut derived,
        )
        .map_err(|err| WampError::Authentication(format!("key derivation failed: {err}")))?;
        Ok(BASE64.encode(derived).into_bytes())
    }
}

#[async_trait]
impl Authenticator for CraAuth {
    fn auth_method(&self) -> &'static str {
        "wampcra"
    }

    fn auth_id(&self) -> Option<&str> {
        Some(&self.authid)
    }

    async fn on_challenge(&self, challenge: &Challenge) -> Result<ChallengeResponse> {
        let challenge_str = challenge
            .extra
            .get("challenge")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                WampError::Authentication("CRA challenge missing the challenge string".into())
            })?;

        let key = self.signing_key(&challenge.extra)?;
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|err| WampError::Authentication(format!("invalid HMAC key: {err}")))?;
        mac.update(challenge_str.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        Ok(ChallengeResponse {
            signature,
            extra: Kwargs::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn challenge_with(extra: Kwargs) -> Challenge {
        Challenge {
            method: "wampcra".into(),
            extra,
        }
    }

    #[tokio::test]
    async fn test_plain_signature_matches_reference() {
        let auth = CraAuth::new("joe", "secret");
        let mut extra = Kwargs::new();
        extra.insert("challenge".into(), json!("abc123"));
        let response = auth.on_challenge(&challenge_with(extra)).await.unwrap();
        assert_eq!(
            response.signature,
            "WuWsgCoaXJT7aD4b+hIfn3AKJplSE/8vwcUD60PsccY="
        );
    }

    #[tokio::test]
    async fn test_salted_signature_matches_reference() {
        let auth = CraAuth::new("joe", "secret");
        let mut extra = Kwargs::new();
        extra.insert("challenge".into(), json!("abc123"));
        extra.insert("salt".into(), json!("salt123"));
        extra.insert("iterations".into(), json!(100));
        extra.insert("keylen".into(), json!(32));
        let response = auth.on_challenge(&challenge_with(extra)).await.unwrap();
        assert_eq!(
            response.signature,
            "S+ybul/dBfSFPiSaMAE7dIAlzrfkGeItmcrxcy3JBx0="
        );
    }

    #[tokio::test]
    async fn test_missing_challenge_string_fails() {
        let auth = CraAuth::new("joe", "secret");
        let err = auth
            .on_challenge(&challenge_with(Kwargs::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, WampError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_salted_without_iterations_fails() {
        let auth = CraAuth::new("joe", "secret");
        let mut extra = Kwargs::new();
        extra.insert("challenge".into(), json!("abc123"));
        extra.insert("salt".into(), json!("salt123"));
        let err = auth.on_challenge(&challenge_with(extra)).await.unwrap_err();
        assert!(matches!(err, WampError::Authentication(_)));
    }
}
