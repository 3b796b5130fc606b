use std::time::{Duration, SystemTime};

use futures_util::future::BoxFuture;

use crate::error::Error;

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: SystemTime,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn expires_within(&self, margin: Duration, now: SystemTime) -> bool {
        now.checked_add(margin)
            .is_none_or(|deadline| deadline >= self.expires_at)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub trait TokenSource: Send + Sync {
    fn get_token(&self, scopes: &[String]) -> Result<AccessToken, Error>;

    fn get_token_async<'a>(
        &'a self,
        scopes: &'a [String],
    ) -> BoxFuture<'a, Result<AccessToken, Error>> {
        Box::pin(async move { self.get_token(scopes) })
    }
}

#[derive(Clone, Debug)]
pub struct StaticTokenSource {
    token: AccessToken,
}

impl StaticTokenSource {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

impl TokenSource for StaticTokenSource {
    fn get_token(&self, _scopes: &[String]) -> Result<AccessToken, Error> {
        Ok(self.token.clone())
    }
}
