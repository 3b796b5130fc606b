use std::sync::Arc;

use tracing::{Instrument, debug, info_span};

use crate::config::ClientOptions;
use crate::context::{CallContext, CallOptions, ExecutionMode};
use crate::error::Error;
use crate::policies::{
    HeadersPolicy, LoggingPolicy, RedirectPolicy, RequestIdPolicy, UserAgentPolicy,
};
use crate::policy::{Chain, HttpInterceptor, InterceptorPolicy, Policy};
use crate::request::Request;
use crate::response::Response;
use crate::transport::Transport;
use crate::util::redact_url_for_logs;

struct PipelineInner {
    policies: Vec<Arc<dyn Policy>>,
    transport: Arc<dyn Transport>,
    default_options: CallOptions,
}

#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.inner.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.policies.is_empty()
    }

    pub fn policy_names(&self) -> Vec<&str> {
        self.inner
            .policies
            .iter()
            .map(|policy| policy.name())
            .collect()
    }

    pub fn transport_name(&self) -> &'static str {
        self.inner.transport.name()
    }

    pub fn default_options(&self) -> &CallOptions {
        &self.inner.default_options
    }

    pub fn send(&self, request: Request) -> Result<Response, Error> {
        self.send_with_options(request, self.inner.default_options.clone())
    }

    pub fn send_with_options(
        &self,
        request: Request,
        options: CallOptions,
    ) -> Result<Response, Error> {
        let context = CallContext::new(options, ExecutionMode::Blocking);
        let span = call_span(&request, &context);
        let _enter = span.enter();

        let chain = Chain::new(
            &self.inner.policies,
            self.inner.transport.as_ref(),
            &context,
        );
        let result = chain.head().run(request);
        log_outcome(&result, &context);
        result
    }

    pub async fn send_async(&self, request: Request) -> Result<Response, Error> {
        self.send_async_with_options(request, self.inner.default_options.clone())
            .await
    }

    pub async fn send_async_with_options(
        &self,
        request: Request,
        options: CallOptions,
    ) -> Result<Response, Error> {
        let context = CallContext::new(options, ExecutionMode::Async);
        let span = call_span(&request, &context);

        async {
            let chain = Chain::new(
                &self.inner.policies,
                self.inner.transport.as_ref(),
                &context,
            );
            let result = chain.head().run_async(request).await;
            log_outcome(&result, &context);
            result
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Pipeline")
            .field("policies", &self.policy_names())
            .field("transport", &self.transport_name())
            .field("default_options", &self.inner.default_options)
            .finish()
    }
}

fn call_span(request: &Request, context: &CallContext) -> tracing::Span {
    info_span!(
        "reqpipe.send",
        method = %request.method(),
        url = %redact_url_for_logs(request.url()),
        mode = context.mode().as_str()
    )
}

fn log_outcome(result: &Result<Response, Error>, context: &CallContext) {
    let duration_ms = context.elapsed().as_millis() as u64;
    match result {
        Ok(response) => debug!(
            status_code = response.status(),
            try_count = context.try_count(),
            duration_ms,
            "pipeline call completed"
        ),
        Err(error) => debug!(
            error = %error,
            kind = error.kind().as_str(),
            try_count = context.try_count(),
            duration_ms,
            "pipeline call failed"
        ),
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    policies: Vec<Arc<dyn Policy>>,
    trailing: Vec<Arc<dyn Policy>>,
    transport: Option<Arc<dyn Transport>>,
    default_options: CallOptions,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: ClientOptions) -> Self {
        let mut builder = Self::new();
        if let Some(timeout) = options.timeout {
            builder = builder.default_options(CallOptions::new().timeout(timeout));
        }
        if let Some(header_name) = options.request_id_header {
            builder = builder.policy(RequestIdPolicy::with_header_name(header_name));
        }
        if let Some(user_agent) = options.user_agent {
            builder = builder.policy(UserAgentPolicy::new(user_agent));
        }
        if !options.default_headers.is_empty() {
            builder = builder.policy(HeadersPolicy::new(options.default_headers));
        }
        if options.follow_redirects {
            builder = builder.policy(RedirectPolicy::new(options.max_redirects));
        }
        builder = builder.policy(options.retry);
        if options.log_level.is_enabled() {
            let mut logging = LoggingPolicy::new(options.log_sink).detail_level(options.log_level);
            for header_name in options.logged_headers {
                logging = logging.allow_header(header_name);
            }
            builder.trailing.push(Arc::new(logging));
        }
        builder
    }

    pub fn policy<P>(mut self, policy: P) -> Self
    where
        P: Policy + 'static,
    {
        self.policies.push(Arc::new(policy));
        self
    }

    pub fn policy_arc(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn interceptor<I>(self, interceptor: I) -> Self
    where
        I: HttpInterceptor + 'static,
    {
        self.policy(InterceptorPolicy::new(interceptor))
    }

    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn default_options(mut self, options: CallOptions) -> Self {
        self.default_options = options;
        self
    }

    pub fn build(self) -> Result<Pipeline, Error> {
        let transport = self.transport.ok_or(Error::MissingTransport)?;
        let mut policies = self.policies;
        policies.extend(self.trailing);
        Ok(Pipeline {
            inner: Arc::new(PipelineInner {
                policies,
                transport,
                default_options: self.default_options,
            }),
        })
    }
}
