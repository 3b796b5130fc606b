mod auth;
mod fault;
mod headers;
mod logging;
mod redirect;

pub use auth::{BearerTokenPolicy, DEFAULT_REFRESH_MARGIN};
pub use fault::{FaultInjectionPolicy, InjectedFault};
pub use headers::{DEFAULT_REQUEST_ID_HEADER, HeadersPolicy, RequestIdPolicy, UserAgentPolicy};
pub use logging::{
    HttpLogDetailLevel, HttpLogRecord, HttpLogSink, LoggingPolicy, TracingLogSink,
};
pub use redirect::{DEFAULT_MAX_REDIRECTS, RedirectPolicy};
