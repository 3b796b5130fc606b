use std::future::Future;

use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::adapter::http::{from_http_response, to_http_request};
use crate::context::CallContext;
use crate::error::{BoxError, Error, TransportErrorKind};
use crate::request::Request;
use crate::response::Response;
use crate::util::redact_url_for_logs;

#[cfg(feature = "_async")]
mod async_hyper;
#[cfg(feature = "_blocking")]
mod blocking_ureq;

#[cfg(feature = "_async")]
pub use async_hyper::{HyperTransport, HyperTransportBuilder};
#[cfg(feature = "_blocking")]
pub use blocking_ureq::{UreqTransport, UreqTransportBuilder};

pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    fn send(&self, request: Request, context: &CallContext) -> Result<Response, Error>;

    fn send_async<'a>(
        &'a self,
        request: Request,
        context: &'a CallContext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move { self.send(request, context) })
    }
}

pub struct FnTransport<F> {
    handler: F,
}

impl<F> FnTransport<F>
where
    F: Fn(Request) -> Result<Response, Error> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> Transport for FnTransport<F>
where
    F: Fn(Request) -> Result<Response, Error> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "fn"
    }

    fn send(&self, request: Request, _context: &CallContext) -> Result<Response, Error> {
        (self.handler)(request)
    }
}

pub struct AsyncFnTransport<F> {
    handler: F,
}

impl<F, Fut> AsyncFnTransport<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Error>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F, Fut> Transport for AsyncFnTransport<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Error>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        "async_fn"
    }

    fn send(&self, _request: Request, _context: &CallContext) -> Result<Response, Error> {
        Err(Error::BlockingSendUnsupported {
            transport: self.name(),
        })
    }

    fn send_async<'a>(
        &'a self,
        request: Request,
        _context: &'a CallContext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin((self.handler)(request))
    }
}

pub struct HttpServiceTransport<F> {
    service: F,
}

impl<F> HttpServiceTransport<F>
where
    F: Fn(http::Request<Bytes>) -> Result<http::Response<Bytes>, BoxError> + Send + Sync,
{
    pub fn new(service: F) -> Self {
        Self { service }
    }
}

impl<F> Transport for HttpServiceTransport<F>
where
    F: Fn(http::Request<Bytes>) -> Result<http::Response<Bytes>, BoxError> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "http_service"
    }

    fn send(&self, request: Request, _context: &CallContext) -> Result<Response, Error> {
        let head = request.head();
        let http_request = to_http_request(request)?;
        let http_response = (self.service)(http_request).map_err(|source| Error::Transport {
            kind: TransportErrorKind::Other,
            method: head.method,
            url: redact_url_for_logs(&head.url),
            source,
        })?;
        Ok(from_http_response(http_response, head))
    }
}
