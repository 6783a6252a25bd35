//! Bearer credentials attached to every workflow API request.
//!
//! Session management (login, refresh) lives outside this crate. The
//! client only asks a [`CredentialSource`] for the current token right
//! before each request, so a refreshed token is picked up without
//! rebuilding the client.

/// Supplies the bearer token for outgoing requests.
pub trait CredentialSource: Send + Sync {
    /// The current token, or `None` when no session is available. Requests
    /// are then sent unauthenticated and fail server-side.
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token, e.g. from `WORKFLOW_API_TOKEN`.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// No credentials at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}
