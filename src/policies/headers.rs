use futures_util::future::BoxFuture;
use rand::Rng;

use crate::error::Error;
use crate::headers::HeaderCollection;
use crate::policy::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use crate::util::USER_AGENT;

pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-client-request-id";

#[derive(Clone, Debug, Default)]
pub struct HeadersPolicy {
    headers: HeaderCollection,
}

impl HeadersPolicy {
    pub fn new(headers: HeaderCollection) -> Self {
        Self { headers }
    }

    fn apply(&self, request: &mut Request) {
        for entry in &self.headers {
            if !request.headers().contains(entry.name()) {
                request
                    .headers_mut()
                    .set_values(entry.name(), entry.values().iter().cloned());
            }
        }
    }
}

impl Policy for HeadersPolicy {
    fn process(&self, mut request: Request, next: Next<'_>) -> Result<Response, Error> {
        self.apply(&mut request);
        next.run(request)
    }

    fn process_async<'a>(
        &'a self,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        self.apply(&mut request);
        next.run_async(request)
    }
}

#[derive(Clone, Debug)]
pub struct UserAgentPolicy {
    user_agent: String,
}

impl UserAgentPolicy {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn apply(&self, request: &mut Request) {
        if !request.headers().contains(USER_AGENT) {
            request.headers_mut().set(USER_AGENT, self.user_agent.as_str());
        }
    }
}

impl Default for UserAgentPolicy {
    fn default() -> Self {
        Self::new(concat!("reqpipe/", env!("CARGO_PKG_VERSION")))
    }
}

impl Policy for UserAgentPolicy {
    fn process(&self, mut request: Request, next: Next<'_>) -> Result<Response, Error> {
        self.apply(&mut request);
        next.run(request)
    }

    fn process_async<'a>(
        &'a self,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        self.apply(&mut request);
        next.run_async(request)
    }
}

#[derive(Clone, Debug)]
pub struct RequestIdPolicy {
    header_name: String,
}

impl RequestIdPolicy {
    pub fn new() -> Self {
        Self::with_header_name(DEFAULT_REQUEST_ID_HEADER)
    }

    pub fn with_header_name(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    fn apply(&self, request: &mut Request) {
        if !request.headers().contains(&self.header_name) {
            let request_id = format!("{:032x}", rand::rng().random::<u128>());
            request
                .headers_mut()
                .set(self.header_name.as_str(), request_id);
        }
    }
}

impl Default for RequestIdPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for RequestIdPolicy {
    fn process(&self, mut request: Request, next: Next<'_>) -> Result<Response, Error> {
        self.apply(&mut request);
        next.run(request)
    }

    fn process_async<'a>(
        &'a self,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        self.apply(&mut request);
        next.run_async(request)
    }
}
