use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;

use super::Transport;
use crate::adapter::http::{http_request_with_body, response_from_parts};
use crate::context::{CallContext, CallOptions};
use crate::error::{Error, TimeoutPhase, TransportErrorKind};
use crate::request::{Request, RequestHead};
use crate::response::{Response, ResponseBody};
use crate::util::{lock_unpoisoned, redact_url_for_logs};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

fn classify_ureq_transport_error(error: &ureq::Error) -> TransportErrorKind {
    match error {
        ureq::Error::HostNotFound => TransportErrorKind::Dns,
        ureq::Error::Tls(_) => TransportErrorKind::Tls,
        ureq::Error::Rustls(_) => TransportErrorKind::Tls,
        ureq::Error::ConnectProxyFailed(_) | ureq::Error::ConnectionFailed => {
            TransportErrorKind::Connect
        }
        ureq::Error::Io(source) => match source.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportErrorKind::Read
            }
            std::io::ErrorKind::NotFound => TransportErrorKind::Dns,
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::AddrNotAvailable => TransportErrorKind::Connect,
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => TransportErrorKind::Read,
            _ => TransportErrorKind::Other,
        },
        _ => TransportErrorKind::Other,
    }
}

struct LengthCheckedReader<R> {
    inner: R,
    declared: u64,
    read: u64,
    mismatch: Arc<Mutex<Option<u64>>>,
}

impl<R: Read> Read for LengthCheckedReader<R> {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buffer)?;
        self.read += read as u64;
        if self.read > self.declared || (read == 0 && self.read != self.declared) {
            *lock_unpoisoned(&self.mismatch) = Some(self.read);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request body length does not match declared content-length",
            ));
        }
        Ok(read)
    }
}

#[derive(Clone, Debug)]
pub struct UreqTransportBuilder {
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
}

impl Default for UreqTransportBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }
}

impl UreqTransportBuilder {
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    pub fn build(self) -> UreqTransport {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .timeout_connect(Some(self.connect_timeout))
            .max_idle_age(self.pool_idle_timeout)
            .max_idle_connections_per_host(self.pool_max_idle_per_host)
            .build()
            .new_agent();
        UreqTransport { agent }
    }
}

#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> UreqTransportBuilder {
        UreqTransportBuilder::default()
    }

    fn execute(&self, request: Request, options: &CallOptions) -> Result<Response, Error> {
        let (head, body) = request.into_parts();
        let content_type = body
            .as_ref()
            .and_then(|body| body.content_type().map(str::to_owned));
        let content_length = body.as_ref().and_then(|body| body.content_length());

        let http_response = match (body, content_length) {
            (Some(body), Some(declared)) if !body.is_replayable() => {
                let mismatch = Arc::new(Mutex::new(None));
                let reader = LengthCheckedReader {
                    inner: body.into_reader(),
                    declared,
                    read: 0,
                    mismatch: Arc::clone(&mismatch),
                };
                let http_request = http_request_with_body(
                    &head,
                    content_type.as_deref(),
                    content_length,
                    ureq::SendBody::from_owned_reader(reader),
                )?;
                self.run(http_request, options, &head).map_err(|error| {
                    match lock_unpoisoned(&mismatch).take() {
                        Some(actual) => Error::BodyLengthMismatch { declared, actual },
                        None => error,
                    }
                })?
            }
            (Some(body), None) if !body.is_replayable() => {
                let http_request = http_request_with_body(
                    &head,
                    content_type.as_deref(),
                    None,
                    ureq::SendBody::from_owned_reader(body.into_reader()),
                )?;
                self.run(http_request, options, &head)?
            }
            (Some(body), _) => {
                let payload = body.into_bytes()?;
                let http_request = http_request_with_body(
                    &head,
                    content_type.as_deref(),
                    content_length.filter(|length| *length > 0),
                    payload.to_vec(),
                )?;
                self.run(http_request, options, &head)?
            }
            (None, _) => {
                let http_request = http_request_with_body(&head, None, None, Vec::new())?;
                self.run(http_request, options, &head)?
            }
        };

        let (parts, body) = http_response.into_parts();
        Ok(response_from_parts(
            parts,
            ResponseBody::from_reader(body.into_reader()),
            head,
        ))
    }

    fn run<S: ureq::AsSendBody>(
        &self,
        request: http::Request<S>,
        options: &CallOptions,
        head: &RequestHead,
    ) -> Result<http::Response<ureq::Body>, Error> {
        let timeout_value = options.timeout_value();
        let configured_request = self
            .agent
            .configure_request(request)
            .timeout_global(timeout_value)
            .timeout_recv_response(timeout_value)
            .build();

        self.agent
            .run(configured_request)
            .map_err(|source| map_ureq_error(source, timeout_value, head))
    }
}

fn map_ureq_error(source: ureq::Error, timeout_value: Option<Duration>, head: &RequestHead) -> Error {
    let method = head.method;
    match source {
        ureq::Error::Timeout(_) => Error::Timeout {
            phase: TimeoutPhase::Transport,
            timeout_ms: timeout_value.unwrap_or_default().as_millis(),
            method,
            url: redact_url_for_logs(&head.url),
        },
        other => Error::Transport {
            kind: classify_ureq_transport_error(&other),
            method,
            url: redact_url_for_logs(&head.url),
            source: Box::new(other),
        },
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl Transport for UreqTransport {
    fn name(&self) -> &'static str {
        "ureq"
    }

    fn send(&self, request: Request, context: &CallContext) -> Result<Response, Error> {
        self.execute(request, context.options())
    }

    fn send_async<'a>(
        &'a self,
        request: Request,
        context: &'a CallContext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        let transport = self.clone();
        let options = context.options().clone();
        Box::pin(async move {
            let method = request.method();
            let url = redact_url_for_logs(request.url());
            tokio::task::spawn_blocking(move || transport.execute(request, &options))
                .await
                .map_err(|source| Error::Transport {
                    kind: TransportErrorKind::Other,
                    method,
                    url,
                    source: Box::new(source),
                })?
        })
    }
}
