use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::credential::{AccessToken, TokenSource};
use crate::error::Error;
use crate::policy::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use crate::util::{AUTHORIZATION, lock_unpoisoned, redact_url_for_logs};

pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(120);

pub struct BearerTokenPolicy {
    source: Arc<dyn TokenSource>,
    scopes: Vec<String>,
    allow_http: bool,
    refresh_margin: Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl BearerTokenPolicy {
    pub fn new<I, S>(source: Arc<dyn TokenSource>, scopes: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        if scopes.is_empty() {
            return Err(Error::MissingCredentialScope);
        }
        Ok(Self {
            source,
            scopes,
            allow_http: false,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            cached: Mutex::new(None),
        })
    }

    pub fn allow_http(mut self, allow_http: bool) -> Self {
        self.allow_http = allow_http;
        self
    }

    pub fn refresh_margin(mut self, refresh_margin: Duration) -> Self {
        self.refresh_margin = refresh_margin;
        self
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn check_scheme(&self, request: &Request) -> Result<(), Error> {
        if self.allow_http || request.url().scheme() == "https" {
            return Ok(());
        }
        Err(Error::InsecureCredentialTransport {
            url: redact_url_for_logs(request.url()),
        })
    }

    fn cached_token(&self) -> Option<AccessToken> {
        lock_unpoisoned(&self.cached)
            .as_ref()
            .filter(|token| !token.expires_within(self.refresh_margin, SystemTime::now()))
            .cloned()
    }

    fn store(&self, token: &AccessToken) {
        debug!(scopes = ?self.scopes, "refreshed bearer token");
        *lock_unpoisoned(&self.cached) = Some(token.clone());
    }

    fn authorize(request: &mut Request, token: &AccessToken) {
        request
            .headers_mut()
            .set(AUTHORIZATION, format!("Bearer {}", token.token));
    }
}

impl std::fmt::Debug for BearerTokenPolicy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BearerTokenPolicy")
            .field("scopes", &self.scopes)
            .field("allow_http", &self.allow_http)
            .field("refresh_margin", &self.refresh_margin)
            .finish_non_exhaustive()
    }
}

impl Policy for BearerTokenPolicy {
    fn process(&self, mut request: Request, next: Next<'_>) -> Result<Response, Error> {
        self.check_scheme(&request)?;
        let token = match self.cached_token() {
            Some(token) => token,
            None => {
                let token = self.source.get_token(&self.scopes)?;
                self.store(&token);
                token
            }
        };
        Self::authorize(&mut request, &token);
        next.run(request)
    }

    fn process_async<'a>(
        &'a self,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            self.check_scheme(&request)?;
            let token = match self.cached_token() {
                Some(token) => token,
                None => {
                    let token = self.source.get_token_async(&self.scopes).await?;
                    self.store(&token);
                    token
                }
            };
            Self::authorize(&mut request, &token);
            next.run_async(request).await
        })
    }
}
