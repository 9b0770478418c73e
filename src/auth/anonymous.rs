//! Anonymous authentication.

use async_trait::async_trait;

use super::Authenticator;
use crate::error::{Result, WampError};
use crate::protocol::types::{Challenge, ChallengeResponse};

/// Joins without credentials. The server must never challenge this
/// method; a CHALLENGE for it fails the connect attempt.
#[derive(Debug, Clone, Default)]
pub struct AnonymousAuth {
    authid: Option<String>,
}

impl AnonymousAuth {
    /// Anonymous with no authid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Anonymous but announcing an authid (some realms key quotas on it).
    pub fn with_authid(authid: impl Into<String>) -> Self {
        Self {
            authid: Some(authid.into()),
        }
    }
}

#[async_trait]
impl Authenticator for AnonymousAuth {
    fn auth_method(&self) -> &'static str {
        "anonymous"
    }

    fn auth_id(&self) -> Option<&str> {
        self.authid.as_deref()
    }

    async fn on_challenge(&self, _challenge: &Challenge) -> Result<ChallengeResponse> {
        Err(WampError::Authentication(
            "anonymous authentication cannot be challenged".into(),
        ))
    }
}
