use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use tracing::{info, warn};

use crate::context::CallContext;
use crate::error::{Error, ErrorKind};
use crate::headers::HeaderCollection;
use crate::method::HttpMethod;
use crate::policy::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use crate::util::{
    CONTENT_LENGTH, CONTENT_TYPE, LOCATION, RETRY_AFTER, USER_AGENT, is_redirect_status,
    redact_url_for_logs, truncate_body,
};

const REDACTED: &str = "REDACTED";

const DEFAULT_LOGGED_HEADERS: &[&str] = &[
    "accept",
    CONTENT_LENGTH,
    CONTENT_TYPE,
    "date",
    "etag",
    LOCATION,
    RETRY_AFTER,
    USER_AGENT,
    "x-client-request-id",
    "x-ms-client-request-id",
    "x-request-id",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpLogDetailLevel {
    #[default]
    None,
    Basic,
    Headers,
    BodyAndHeaders,
}

impl HttpLogDetailLevel {
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::None)
    }

    pub const fn includes_headers(self) -> bool {
        matches!(self, Self::Headers | Self::BodyAndHeaders)
    }

    pub const fn includes_body(self) -> bool {
        matches!(self, Self::BodyAndHeaders)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HttpLogRecord {
    Request {
        method: HttpMethod,
        url: String,
        try_count: usize,
        headers: Vec<(String, String)>,
        content_length: Option<u64>,
        body: Option<String>,
    },
    Response {
        method: HttpMethod,
        url: String,
        try_count: usize,
        status_code: u16,
        duration_ms: u64,
        redirect_url: Option<String>,
        headers: Vec<(String, String)>,
        content_length: Option<u64>,
        body: Option<String>,
    },
    Failure {
        method: HttpMethod,
        url: String,
        try_count: usize,
        duration_ms: u64,
        kind: ErrorKind,
        error: String,
    },
}

pub trait HttpLogSink: Send + Sync {
    fn record(&self, record: &HttpLogRecord);
}

impl<F> HttpLogSink for F
where
    F: Fn(&HttpLogRecord) + Send + Sync,
{
    fn record(&self, record: &HttpLogRecord) {
        self(record)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogSink;

impl HttpLogSink for TracingLogSink {
    fn record(&self, record: &HttpLogRecord) {
        match record {
            HttpLogRecord::Request {
                method,
                url,
                try_count,
                headers,
                content_length,
                body,
            } => info!(
                method = %method,
                url = %url,
                try_count,
                content_length,
                headers = ?headers,
                body = body.as_deref(),
                "http request"
            ),
            HttpLogRecord::Response {
                method,
                url,
                try_count,
                status_code,
                duration_ms,
                redirect_url,
                headers,
                content_length,
                body,
            } => info!(
                method = %method,
                url = %url,
                try_count,
                status_code,
                duration_ms,
                redirect_url = redirect_url.as_deref(),
                content_length,
                headers = ?headers,
                body = body.as_deref(),
                "http response"
            ),
            HttpLogRecord::Failure {
                method,
                url,
                try_count,
                duration_ms,
                kind,
                error,
            } => warn!(
                method = %method,
                url = %url,
                try_count,
                duration_ms,
                kind = kind.as_str(),
                error = %error,
                "http request failed"
            ),
        }
    }
}

pub struct LoggingPolicy {
    sink: Arc<dyn HttpLogSink>,
    detail_level: HttpLogDetailLevel,
    allowed_headers: BTreeSet<String>,
}

impl LoggingPolicy {
    pub fn new(sink: Arc<dyn HttpLogSink>) -> Self {
        Self {
            sink,
            detail_level: HttpLogDetailLevel::Basic,
            allowed_headers: DEFAULT_LOGGED_HEADERS
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
        }
    }

    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingLogSink))
    }

    pub fn detail_level(mut self, detail_level: HttpLogDetailLevel) -> Self {
        self.detail_level = detail_level;
        self
    }

    pub fn allow_header(mut self, name: impl AsRef<str>) -> Self {
        self.allowed_headers
            .insert(name.as_ref().to_ascii_lowercase());
        self
    }

    pub fn detail_level_value(&self) -> HttpLogDetailLevel {
        self.detail_level
    }

    fn headers_for_log(&self, headers: &HeaderCollection) -> Vec<(String, String)> {
        if !self.detail_level.includes_headers() {
            return Vec::new();
        }
        headers
            .iter()
            .map(|entry| {
                let name = entry.name().to_owned();
                let value = if self.allowed_headers.contains(&name.to_ascii_lowercase()) {
                    entry.value().into_owned()
                } else {
                    REDACTED.to_owned()
                };
                (name, value)
            })
            .collect()
    }

    fn log_request(&self, request: &Request, context: &CallContext) {
        if !self.detail_level.is_enabled() {
            return;
        }
        let body = request.body();
        self.sink.record(&HttpLogRecord::Request {
            method: request.method(),
            url: redact_url_for_logs(request.url()),
            try_count: context.try_count().max(1),
            headers: self.headers_for_log(request.headers()),
            content_length: body.and_then(|body| body.content_length()),
            body: body
                .and_then(|body| body.as_bytes())
                .filter(|_| self.detail_level.includes_body())
                .map(|bytes| truncate_body(bytes)),
        });
    }

    fn log_result(
        &self,
        method: HttpMethod,
        url: &str,
        context: &CallContext,
        started_at: Instant,
        result: &Result<Response, Error>,
    ) {
        if !self.detail_level.is_enabled() {
            return;
        }
        let try_count = context.try_count().max(1);
        let duration_ms = started_at.elapsed().as_millis() as u64;
        let record = match result {
            Ok(response) => {
                let status_code = response.status();
                let headers = response.headers();
                let redirect_url = headers
                    .get(LOCATION)
                    .filter(|_| is_redirect_status(status_code))
                    .map(|location| location.into_owned());
                HttpLogRecord::Response {
                    method,
                    url: url.to_owned(),
                    try_count,
                    status_code,
                    duration_ms,
                    redirect_url,
                    headers: self.headers_for_log(headers),
                    content_length: headers
                        .get(CONTENT_LENGTH)
                        .and_then(|value| value.trim().parse().ok()),
                    body: response
                        .body()
                        .as_bytes()
                        .filter(|_| self.detail_level.includes_body())
                        .map(|bytes| truncate_body(bytes)),
                }
            }
            Err(error) => HttpLogRecord::Failure {
                method,
                url: url.to_owned(),
                try_count,
                duration_ms,
                kind: error.kind(),
                error: error.to_string(),
            },
        };
        self.sink.record(&record);
    }
}

impl Default for LoggingPolicy {
    fn default() -> Self {
        Self::tracing()
    }
}

impl std::fmt::Debug for LoggingPolicy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LoggingPolicy")
            .field("detail_level", &self.detail_level)
            .field("allowed_headers", &self.allowed_headers)
            .finish_non_exhaustive()
    }
}

impl Policy for LoggingPolicy {
    fn process(&self, request: Request, next: Next<'_>) -> Result<Response, Error> {
        let context = next.context();
        let method = request.method();
        let url = redact_url_for_logs(request.url());
        self.log_request(&request, context);
        let started_at = Instant::now();
        let result = next.run(request);
        self.log_result(method, &url, context, started_at, &result);
        result
    }

    fn process_async<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let context = next.context();
            let method = request.method();
            let url = redact_url_for_logs(request.url());
            self.log_request(&request, context);
            let started_at = Instant::now();
            let result = next.run_async(request).await;
            self.log_result(method, &url, context, started_at, &result);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpLogDetailLevel, LoggingPolicy};
    use crate::headers::HeaderCollection;

    #[test]
    fn headers_outside_allow_list_are_redacted() {
        let policy = LoggingPolicy::tracing()
        .detail_level(HttpLogDetailLevel::Headers)
        .allow_header("X-Tenant");

        let mut headers = HeaderCollection::new();
        headers.set("Authorization", "Bearer secret");
        headers.set("x-tenant", "blue");
        headers.set("content-type", "application/json");

        let logged = policy.headers_for_log(&headers);
        assert_eq!(
            logged,
            vec![
                ("Authorization".to_owned(), "REDACTED".to_owned()),
                ("x-tenant".to_owned(), "blue".to_owned()),
                ("content-type".to_owned(), "application/json".to_owned()),
            ]
        );
    }

    #[test]
    fn basic_level_omits_headers() {
        let policy = LoggingPolicy::tracing();
        let mut headers = HeaderCollection::new();
        headers.set("content-type", "text/plain");

        assert!(policy.headers_for_log(&headers).is_empty());
        assert_eq!(policy.detail_level_value(), HttpLogDetailLevel::Basic);
    }

    #[test]
    fn detail_level_deserializes_snake_case() {
        let level: HttpLogDetailLevel =
            serde_json::from_str("\"body_and_headers\"").expect("level should deserialize");
        assert_eq!(level, HttpLogDetailLevel::BodyAndHeaders);
        assert!(level.includes_body());
        assert!(!HttpLogDetailLevel::None.is_enabled());
    }
}
