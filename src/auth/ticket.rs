//! Ticket authentication.

use async_trait::async_trait;

use super::Authenticator;
use crate::error::Result;
use crate::protocol::types::{Challenge, ChallengeResponse, Kwargs};

/// Answers the server's challenge with a static ticket (API token,
/// one-time password). The ticket travels in the clear inside the
/// AUTHENTICATE signature field; use it only over TLS.
#[derive(Debug, Clone)]
pub struct TicketAuth {
    authid: String,
    ticket: String,
}

impl TicketAuth {
    /// Ticket auth for `authid` with the given ticket.
    pub fn new(authid: impl Into<String>, ticket: impl Into<String>) -> Self {
        Self {
            authid: authid.into(),
            ticket: ticket.into(),
        }
    }
}

#[async_trait]
impl Authenticator for TicketAuth {
    fn auth_method(&self) -> &'static str {
        "ticket"
    }

    fn auth_id(&self) -> Option<&str> {
        Some(&self.authid)
    }

    async fn on_challenge(&self, _challenge: &Challenge) -> Result<ChallengeResponse> {
        Ok(ChallengeResponse {
            signature: self.ticket.clone(),
            extra: Kwargs::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ticket_is_returned_verbatim() {
        let auth = TicketAuth::new("joe", "secret-token-123");
        let challenge = Challenge {
            method: "ticket".into(),
            extra: Kwargs::new(),
        };
        let response = auth.on_challenge(&challenge).await.unwrap();
        assert_eq!(response.signature, "secret-token-123");
        assert!(response.extra.is_empty());
    }
}
