use thiserror::Error;

use crate::method::HttpMethod;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeoutPhase {
    Transport,
    ResponseBody,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Transport => "transport",
            Self::ResponseBody => "response_body",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    Transport,
    Timeout,
    Configuration,
    Protocol,
    ChainMisuse,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Configuration => "configuration",
            Self::Protocol => "protocol",
            Self::ChainMisuse => "chain_misuse",
        }
    }

    pub const fn is_transport(self) -> bool {
        matches!(self, Self::Transport | Self::Timeout)
    }

    pub const fn is_recoverable(self) -> bool {
        !matches!(self, Self::Configuration | Self::ChainMisuse)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUrl,
    InvalidBaseUrl,
    UnsupportedMethod,
    InvalidHeaderName,
    InvalidHeaderValue,
    MissingCredentialScope,
    InsecureCredentialTransport,
    MissingTransport,
    BodyLengthMismatch,
    BlockingReadOfAsyncBody,
    BlockingSendUnsupported,
    TlsConfig,
    RequestBuild,
    Transport,
    Timeout,
    ReadBody,
    Credential,
    HttpStatus,
    Deserialize,
    MissingRedirectLocation,
    InvalidRedirectLocation,
    RedirectLimitExceeded,
    RedirectBodyNotReplayable,
    ChainMisuse,
    RetriesExhausted,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::InvalidBaseUrl => "invalid_base_url",
            Self::UnsupportedMethod => "unsupported_method",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::MissingCredentialScope => "missing_credential_scope",
            Self::InsecureCredentialTransport => "insecure_credential_transport",
            Self::MissingTransport => "missing_transport",
            Self::BodyLengthMismatch => "body_length_mismatch",
            Self::BlockingReadOfAsyncBody => "blocking_read_of_async_body",
            Self::BlockingSendUnsupported => "blocking_send_unsupported",
            Self::TlsConfig => "tls_config",
            Self::RequestBuild => "request_build",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::ReadBody => "read_body",
            Self::Credential => "credential",
            Self::HttpStatus => "http_status",
            Self::Deserialize => "deserialize",
            Self::MissingRedirectLocation => "missing_redirect_location",
            Self::InvalidRedirectLocation => "invalid_redirect_location",
            Self::RedirectLimitExceeded => "redirect_limit_exceeded",
            Self::RedirectBodyNotReplayable => "redirect_body_not_replayable",
            Self::ChainMisuse => "chain_misuse",
            Self::RetriesExhausted => "retries_exhausted",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request url: {url}")]
    InvalidUrl { url: String },
    #[error("invalid base url: {base_url}")]
    InvalidBaseUrl { base_url: String },
    #[error("unsupported http method: {method}")]
    UnsupportedMethod { method: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("credential policy requires at least one scope")]
    MissingCredentialScope,
    #[error("refusing to send bearer credentials over non-https url {url}")]
    InsecureCredentialTransport { url: String },
    #[error("pipeline has no terminal transport")]
    MissingTransport,
    #[error("request body declared {declared} bytes but produced {actual}")]
    BodyLengthMismatch { declared: u64, actual: u64 },
    #[error("async response body cannot be read in blocking mode")]
    BlockingReadOfAsyncBody,
    #[error("transport {transport} does not support blocking send")]
    BlockingSendUnsupported { transport: &'static str },
    #[error("failed to configure tls: {source}")]
    TlsConfig {
        #[source]
        source: BoxError,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("http transport error ({kind}) for {method} {url}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: HttpMethod,
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("http request timed out in {phase} after {timeout_ms}ms for {method} {url}")]
    Timeout {
        phase: TimeoutPhase,
        timeout_ms: u128,
        method: HttpMethod,
        url: String,
    },
    #[error("failed to read response body: {source}")]
    ReadBody {
        #[source]
        source: BoxError,
    },
    #[error("failed to acquire access token: {source}")]
    Credential {
        #[source]
        source: BoxError,
    },
    #[error("http status error {status} for {method} {url}: {body}")]
    HttpStatus {
        status: u16,
        method: HttpMethod,
        url: String,
        body: String,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("redirect response {status} missing location header for {method} {url}")]
    MissingRedirectLocation {
        status: u16,
        method: HttpMethod,
        url: String,
    },
    #[error("invalid redirect location {location} for {method} {url}")]
    InvalidRedirectLocation {
        location: String,
        method: HttpMethod,
        url: String,
    },
    #[error("redirect limit exceeded ({max_redirects}) for {method} {url}")]
    RedirectLimitExceeded {
        max_redirects: usize,
        method: HttpMethod,
        url: String,
    },
    #[error("cannot follow redirect for non-replayable request body: {method} {url}")]
    RedirectBodyNotReplayable { method: HttpMethod, url: String },
    #[error("policy chain misuse at position {position}: {message}")]
    ChainMisuse {
        position: usize,
        message: &'static str,
    },
    #[error("request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            Self::InvalidBaseUrl { .. } => ErrorCode::InvalidBaseUrl,
            Self::UnsupportedMethod { .. } => ErrorCode::UnsupportedMethod,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::MissingCredentialScope => ErrorCode::MissingCredentialScope,
            Self::InsecureCredentialTransport { .. } => ErrorCode::InsecureCredentialTransport,
            Self::MissingTransport => ErrorCode::MissingTransport,
            Self::BodyLengthMismatch { .. } => ErrorCode::BodyLengthMismatch,
            Self::BlockingReadOfAsyncBody => ErrorCode::BlockingReadOfAsyncBody,
            Self::BlockingSendUnsupported { .. } => ErrorCode::BlockingSendUnsupported,
            Self::TlsConfig { .. } => ErrorCode::TlsConfig,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::Credential { .. } => ErrorCode::Credential,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::MissingRedirectLocation { .. } => ErrorCode::MissingRedirectLocation,
            Self::InvalidRedirectLocation { .. } => ErrorCode::InvalidRedirectLocation,
            Self::RedirectLimitExceeded { .. } => ErrorCode::RedirectLimitExceeded,
            Self::RedirectBodyNotReplayable { .. } => ErrorCode::RedirectBodyNotReplayable,
            Self::ChainMisuse { .. } => ErrorCode::ChainMisuse,
            Self::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl { .. }
            | Self::InvalidBaseUrl { .. }
            | Self::UnsupportedMethod { .. }
            | Self::InvalidHeaderName { .. }
            | Self::InvalidHeaderValue { .. }
            | Self::MissingCredentialScope
            | Self::InsecureCredentialTransport { .. }
            | Self::MissingTransport
            | Self::BodyLengthMismatch { .. }
            | Self::BlockingReadOfAsyncBody
            | Self::BlockingSendUnsupported { .. }
            | Self::TlsConfig { .. }
            | Self::RequestBuild { .. } => ErrorKind::Configuration,
            Self::Transport { .. } | Self::ReadBody { .. } | Self::Credential { .. } => {
                ErrorKind::Transport
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::HttpStatus { .. }
            | Self::Deserialize { .. }
            | Self::MissingRedirectLocation { .. }
            | Self::InvalidRedirectLocation { .. }
            | Self::RedirectLimitExceeded { .. }
            | Self::RedirectBodyNotReplayable { .. } => ErrorKind::Protocol,
            Self::ChainMisuse { .. } => ErrorKind::ChainMisuse,
            Self::RetriesExhausted { source, .. } => source.kind(),
        }
    }

    pub fn last_attempt_error(&self) -> &Error {
        match self {
            Self::RetriesExhausted { source, .. } => source.last_attempt_error(),
            other => other,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self.last_attempt_error() {
            Self::HttpStatus { status, .. } | Self::MissingRedirectLocation { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn transport_error_kind(&self) -> Option<TransportErrorKind> {
        match self.last_attempt_error() {
            Self::Transport { kind, .. } => Some(*kind),
            Self::ReadBody { .. } => Some(TransportErrorKind::Read),
            _ => None,
        }
    }

    pub fn timeout_phase(&self) -> Option<TimeoutPhase> {
        match self.last_attempt_error() {
            Self::Timeout { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    pub(crate) fn misuse(position: usize, message: &'static str) -> Self {
        Self::ChainMisuse { position, message }
    }
}
