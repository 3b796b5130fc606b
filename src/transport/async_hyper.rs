use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use super::Transport;
use crate::adapter::http::{http_request_with_body, response_from_parts};
use crate::context::CallContext;
use crate::error::{Error, TransportErrorKind};
use crate::request::Request;
use crate::response::{Response, ResponseBody};
use crate::util::redact_url_for_logs;

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

fn classify_transport_error(error: &hyper_util::client::legacy::Error) -> TransportErrorKind {
    let text = error.to_string().to_ascii_lowercase();
    if error.is_connect() {
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }
    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
        || text.contains("connection closed")
    {
        return TransportErrorKind::Read;
    }
    TransportErrorKind::Other
}

#[derive(Clone, Debug)]
pub struct HyperTransportBuilder {
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    connect_timeout: Option<Duration>,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self {
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            connect_timeout: None,
        }
    }
}

impl HyperTransportBuilder {
    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn build(self) -> Result<HyperTransport, Error> {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_connect_timeout(self.connect_timeout);

        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|source| Error::TlsConfig {
                source: Box::new(source),
            })?
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .build(https);
        Ok(HyperTransport { client })
    }
}

#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
}

impl HyperTransport {
    pub fn new() -> Result<Self, Error> {
        Self::builder().build()
    }

    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    async fn execute(&self, request: Request) -> Result<Response, Error> {
        let (head, body) = request.into_parts();
        let (content_type, payload) = match body {
            Some(body) => (body.content_type().map(str::to_owned), body.into_bytes()?),
            None => (None, Bytes::new()),
        };
        let content_length = (!payload.is_empty()).then_some(payload.len() as u64);
        let http_request = http_request_with_body(
            &head,
            content_type.as_deref(),
            content_length,
            Full::new(payload),
        )?;

        let http_response = self
            .client
            .request(http_request)
            .await
            .map_err(|source| Error::Transport {
                kind: classify_transport_error(&source),
                method: head.method,
                url: redact_url_for_logs(&head.url),
                source: Box::new(source),
            })?;

        let (parts, incoming) = http_response.into_parts();
        let stream = incoming.into_data_stream().map(|chunk| {
            chunk.map_err(|source| Error::ReadBody {
                source: Box::new(source),
            })
        });
        Ok(response_from_parts(
            parts,
            ResponseBody::from_stream(stream),
            head,
        ))
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl Transport for HyperTransport {
    fn name(&self) -> &'static str {
        "hyper"
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
        Box::pin(self.execute(request))
    }
}
