use futures_util::future::BoxFuture;
use tracing::debug;

use crate::error::Error;
use crate::method::HttpMethod;
use crate::policy::{Next, Policy};
use crate::request::{Request, RequestBody, RequestHead};
use crate::response::Response;
use crate::util::{
    LOCATION, is_redirect_status, redact_url_for_logs, redirect_method, resolve_redirect_url,
    same_origin, sanitize_headers_for_redirect,
};

pub const DEFAULT_MAX_REDIRECTS: usize = 5;

struct Hop {
    head: RequestHead,
    body: Option<Option<RequestBody>>,
}

impl Hop {
    fn capture(request: &Request) -> Self {
        Self {
            head: request.head(),
            body: request.body().map(RequestBody::try_clone),
        }
    }
}

enum Redirect {
    Done(Response),
    Follow(Request),
}

#[derive(Clone, Debug)]
pub struct RedirectPolicy {
    max_redirects: usize,
}

impl RedirectPolicy {
    pub fn new(max_redirects: usize) -> Self {
        Self { max_redirects }
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    fn follow(&self, response: Response, hop: Hop, redirects: usize) -> Result<Redirect, Error> {
        let status = response.status();
        if !is_redirect_status(status) {
            return Ok(Redirect::Done(response));
        }

        let Hop { head, body } = hop;
        let redacted_url = redact_url_for_logs(&head.url);
        if redirects >= self.max_redirects {
            response.close();
            return Err(Error::RedirectLimitExceeded {
                max_redirects: self.max_redirects,
                method: head.method,
                url: redacted_url,
            });
        }
        let Some(location) = response.headers().get(LOCATION).map(|value| value.into_owned())
        else {
            response.close();
            return Err(Error::MissingRedirectLocation {
                status,
                method: head.method,
                url: redacted_url,
            });
        };
        response.close();

        let next_url = resolve_redirect_url(&head.url, &location).ok_or_else(|| {
            Error::InvalidRedirectLocation {
                location: location.clone(),
                method: head.method,
                url: redacted_url.clone(),
            }
        })?;
        let next_method = redirect_method(head.method, status);
        let switched_to_get = next_method == HttpMethod::Get && head.method != HttpMethod::Get;
        let next_body = match body {
            _ if switched_to_get => None,
            None => None,
            Some(Some(body)) => Some(body),
            Some(None) => {
                return Err(Error::RedirectBodyNotReplayable {
                    method: head.method,
                    url: redacted_url,
                });
            }
        };

        let mut headers = head.headers;
        sanitize_headers_for_redirect(
            &mut headers,
            switched_to_get,
            same_origin(&head.url, &next_url),
        );
        debug!(
            status_code = status,
            redirect_url = %redact_url_for_logs(&next_url),
            redirects = redirects + 1,
            "following redirect"
        );

        let mut request = Request::new(next_method, next_url)?;
        *request.headers_mut() = headers;
        request.set_body(next_body);
        Ok(Redirect::Follow(request))
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REDIRECTS)
    }
}

impl Policy for RedirectPolicy {
    fn process(&self, mut request: Request, next: Next<'_>) -> Result<Response, Error> {
        let mut redirects = 0;
        loop {
            let hop = Hop::capture(&request);
            let response = next.fork().run(request)?;
            match self.follow(response, hop, redirects)? {
                Redirect::Done(response) => return Ok(response),
                Redirect::Follow(next_request) => request = next_request,
            }
            redirects += 1;
        }
    }

    fn process_async<'a>(
        &'a self,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let mut redirects = 0;
            loop {
                let hop = Hop::capture(&request);
                let response = next.fork().run_async(request).await?;
                match self.follow(response, hop, redirects)? {
                    Redirect::Done(response) => return Ok(response),
                    Redirect::Follow(next_request) => request = next_request,
                }
                redirects += 1;
            }
        })
    }
}
