//! Exchange of device credentials for a cycle-scoped bearer token.

use serde::{Deserialize, Serialize};
use std::{fmt, time::Instant};

use crate::platform::{Transport, TransportError};

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token of the current cycle.
///
/// Only [`CredentialManager::authenticate`] creates tokens, so holding
/// one implies a successful authentication. Tokens are dropped with the
/// cycle context before the node sleeps.
pub struct AuthToken {
    value: String,
    acquired_at: Instant,
}

impl AuthToken {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

#[derive(Debug)]
pub enum AuthError {
    /// No response from the authentication endpoint
    Transport(TransportError),
    /// The endpoint answered with a non-success status
    Rejected { status: u16, message: String },
    /// Success status without a usable token
    MalformedResponse(String),
    Json(serde_json::Error),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Transport(e) => write!(f, "Transport error: {}", e),
            AuthError::Rejected { status, message } => {
                write!(f, "Authentication rejected ({}): {}", status, message)
            }
            AuthError::MalformedResponse(msg) => write!(f, "Malformed response: {}", msg),
            AuthError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Transport(e) => Some(e),
            AuthError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for AuthError {
    fn from(e: TransportError) -> Self {
        AuthError::Transport(e)
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Json(e)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

pub struct CredentialManager<'a> {
    transport: &'a dyn Transport,
    auth_url: &'a str,
}

impl<'a> CredentialManager<'a> {
    pub fn new(transport: &'a dyn Transport, auth_url: &'a str) -> Self {
        Self {
            transport,
            auth_url,
        }
    }

    /// Authenticate from scratch. Tokens are never refreshed or reused
    /// across cycles.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken, AuthError> {
        log::info!("Authenticating as {}", credentials.username);
        let body = serde_json::to_string(&LoginRequest {
            username: &credentials.username,
            password: &credentials.password,
        })?;
        let response = self.transport.post_json(self.auth_url, &body, None).await?;
        if !response.is_success() {
            return Err(AuthError::Rejected {
                status: response.status,
                message: truncated(&response.body),
            });
        }
        let token = response
            .json::<LoginResponse>()
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::MalformedResponse("missing token field".to_owned()))?;
        log::info!("Authenticated");
        Ok(AuthToken {
            value: token,
            acquired_at: Instant::now(),
        })
    }
}

fn truncated(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::Collector;
    use futures::executor::block_on;

    const AUTH_URL: &str = "https://collector.test/auth/login";

    fn authenticate(collector: &Collector) -> Result<AuthToken, AuthError> {
        let credentials = Credentials::new("node-7", "s3cret");
        block_on(CredentialManager::new(collector, AUTH_URL).authenticate(&credentials))
    }

    #[test]
    fn obtain_token() {
        let collector = Collector::default();
        collector.respond_status(AUTH_URL, 200, r#"{"token":"eyJhbGciOi"}"#);
        let token = authenticate(&collector).unwrap();
        assert_eq!("eyJhbGciOi", token.value());

        let requests = collector.requests();
        assert_eq!(1, requests.len());
        assert_eq!(None, requests[0].bearer);
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(
            serde_json::json!({ "username": "node-7", "password": "s3cret" }),
            body
        );
    }

    #[test]
    fn rejected_credentials() {
        let collector = Collector::default();
        collector.respond_status(AUTH_URL, 401, r#"{"error":"invalid credentials"}"#);
        assert!(matches!(
            authenticate(&collector),
            Err(AuthError::Rejected { status: 401, .. })
        ));
    }

    #[test]
    fn missing_or_empty_token() {
        let collector = Collector::default();
        collector
            .respond_status(AUTH_URL, 200, r#"{"user":"node-7"}"#)
            .respond_status(AUTH_URL, 200, r#"{"token":""}"#)
            .respond_status(AUTH_URL, 200, "OK");
        for _ in 0..3 {
            assert!(matches!(
                authenticate(&collector),
                Err(AuthError::MalformedResponse(_))
            ));
        }
    }

    #[test]
    fn unreachable_endpoint() {
        let collector = Collector::default();
        assert!(matches!(
            authenticate(&collector),
            Err(AuthError::Transport(TransportError::ConnectionFailed(_)))
        ));
    }

    #[test]
    fn token_debug_is_redacted() {
        let collector = Collector::default();
        collector.respond_status(AUTH_URL, 200, r#"{"token":"top-secret"}"#);
        let token = authenticate(&collector).unwrap();
        assert!(!format!("{:?}", token).contains("top-secret"));
        assert!(!format!("{:?}", Credentials::new("a", "pw-123")).contains("pw-123"));
    }
}
