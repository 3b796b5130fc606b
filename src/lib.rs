//! `reqpipe` is a composable HTTP policy pipeline for API SDKs.
//!
//! A [`Pipeline`] is an ordered list of [`Policy`] values in front of one
//! terminal [`Transport`]. Every call runs the request through the policies in
//! order and the response back through them in reverse, in blocking
//! ([`Pipeline::send`]) or async ([`Pipeline::send_async`]) mode.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use reqpipe::prelude::{ClientOptions, PipelineBuilder, Request, RetryPolicy, UreqTransport};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ClientOptions::new()
//!         .timeout(Duration::from_secs(3))
//!         .retry(
//!             RetryPolicy::standard()
//!                 .max_attempts(3)
//!                 .base_backoff(Duration::from_millis(100))
//!                 .max_backoff(Duration::from_millis(800)),
//!         );
//!     let pipeline = PipelineBuilder::from_options(options)
//!         .transport(UreqTransport::new())
//!         .build()?;
//!
//!     let response = pipeline.send(Request::get("https://api.example.com/v1/items")?)?;
//!     let items: serde_json::Value = response.error_for_status_blocking()?.json_blocking()?;
//!     println!("items={items}");
//!     Ok(())
//! }
//! ```
//!
//! # Recommended Defaults
//!
//! - Use `RetryPolicy::standard()` for SDK traffic.
//! - Set a per-call timeout; async calls are bounded by it at the transport.
//! - For `POST` retries, set an `idempotency-key` header.

pub mod adapter;
mod config;
mod context;
mod credential;
mod error;
mod headers;
mod method;
mod pipeline;
pub mod policies;
mod policy;
mod query;
mod request;
mod response;
mod retry;
pub mod transport;
mod util;

pub use crate::config::{ClientOptions, ClientProfile, PipelineSettings};
pub use crate::context::{CallContext, CallOptions, ExecutionMode};
pub use crate::credential::{AccessToken, StaticTokenSource, TokenSource};
pub use crate::error::{BoxError, Error, ErrorCode, ErrorKind, TimeoutPhase, TransportErrorKind};
pub use crate::headers::{HeaderCollection, HeaderEntry, HeaderNames};
pub use crate::method::HttpMethod;
pub use crate::pipeline::{Pipeline, PipelineBuilder};
pub use crate::policy::{HttpInterceptor, InterceptorPolicy, Next, Policy};
pub use crate::query::QueryParams;
pub use crate::request::{Request, RequestBody, RequestHead};
pub use crate::response::{Response, ResponseBody};
pub use crate::retry::{
    IDEMPOTENCY_KEY_HEADER, NeverRetry, PermissiveRetryEligibility, RetryClassifier,
    RetryDecision, RetryEligibility, RetryObserver, RetryPolicy, RetryState,
    StandardRetryClassifier, StrictRetryEligibility,
};
pub use crate::transport::Transport;

pub type PipeResult<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::policies::{
        BearerTokenPolicy, HeadersPolicy, HttpLogDetailLevel, LoggingPolicy, RedirectPolicy,
        RequestIdPolicy, UserAgentPolicy,
    };
    #[cfg(feature = "_async")]
    pub use crate::transport::HyperTransport;
    #[cfg(feature = "_blocking")]
    pub use crate::transport::UreqTransport;
    pub use crate::{
        CallOptions, ClientOptions, ClientProfile, Error, ErrorCode, ErrorKind, HeaderCollection,
        HttpMethod, Next, PipeResult, Pipeline, PipelineBuilder, Policy, QueryParams, Request,
        RequestBody, Response, RetryClassifier, RetryDecision, RetryPolicy, TimeoutPhase,
        Transport, TransportErrorKind,
    };
}

#[cfg(test)]
mod tests;
