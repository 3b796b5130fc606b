use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, join};

use crate::config::ClientOptions;
use crate::context::{CallContext, CallOptions, ExecutionMode};
use crate::error::{Error, ErrorCode, ErrorKind, TimeoutPhase};
use crate::headers::HeaderCollection;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::policy::{HttpInterceptor, Next, Policy};
use crate::request::Request;
use crate::response::{Response, ResponseBody};
use crate::retry::RetryPolicy;
use crate::transport::{AsyncFnTransport, FnTransport};

type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.lock()
        .expect("log lock should not be poisoned")
        .push(entry.into());
}

fn entries(log: &Log) -> Vec<String> {
    log.lock()
        .expect("log lock should not be poisoned")
        .clone()
}

fn empty_response(request: &Request, status: u16) -> Response {
    Response::new(
        status,
        HeaderCollection::new(),
        ResponseBody::empty(),
        request.head(),
    )
}

struct MarkerPolicy {
    marker: &'static str,
    log: Log,
}

impl Policy for MarkerPolicy {
    fn process(&self, request: Request, next: Next<'_>) -> Result<Response, Error> {
        push(&self.log, format!("before:{}", self.marker));
        let response = next.run(request)?;
        push(&self.log, format!("after:{}", self.marker));
        Ok(response)
    }

    fn process_async<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            push(&self.log, format!("before:{}", self.marker));
            let response = next.run_async(request).await?;
            push(&self.log, format!("after:{}", self.marker));
            Ok(response)
        })
    }
}

fn marker_pipeline(log: &Log) -> Pipeline {
    let transport_log = Arc::clone(log);
    let mut builder = PipelineBuilder::new();
    for marker in ["p1", "p2", "p3"] {
        builder = builder.policy(MarkerPolicy {
            marker,
            log: Arc::clone(log),
        });
    }
    builder
        .transport(FnTransport::new(move |request: Request| {
            push(&transport_log, "transport");
            Ok(empty_response(&request, 200))
        }))
        .build()
        .expect("pipeline with transport should build")
}

const EXPECTED_ORDER: [&str; 7] = [
    "before:p1",
    "before:p2",
    "before:p3",
    "transport",
    "after:p3",
    "after:p2",
    "after:p1",
];

#[test]
fn blocking_send_runs_policies_in_onion_order() {
    let log = Log::default();
    let pipeline = marker_pipeline(&log);

    let response = pipeline
        .send(Request::get("https://api.example.com/marker").expect("valid url"))
        .expect("marker request should succeed");

    assert_eq!(response.status(), 200);
    assert_eq!(entries(&log), EXPECTED_ORDER);
}

#[tokio::test]
async fn async_send_runs_policies_in_onion_order() {
    let log = Log::default();
    let pipeline = marker_pipeline(&log);

    let response = pipeline
        .send_async(Request::get("https://api.example.com/marker").expect("valid url"))
        .await
        .expect("marker request should succeed");

    assert_eq!(response.status(), 200);
    assert_eq!(entries(&log), EXPECTED_ORDER);
}

struct CachedAnswer;

impl Policy for CachedAnswer {
    fn process(&self, request: Request, _next: Next<'_>) -> Result<Response, Error> {
        Ok(empty_response(&request, 304))
    }

    fn process_async<'a>(
        &'a self,
        request: Request,
        _next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move { Ok(empty_response(&request, 304)) })
    }
}

#[test]
fn policy_can_answer_without_calling_next() {
    let calls = Arc::new(AtomicUsize::new(0));
    let transport_calls = Arc::clone(&calls);
    let pipeline = Pipeline::builder()
        .policy(CachedAnswer)
        .transport(FnTransport::new(move |request: Request| {
            transport_calls.fetch_add(1, Ordering::SeqCst);
            Ok(empty_response(&request, 200))
        }))
        .build()
        .expect("pipeline should build");

    let response = pipeline
        .send(Request::get("https://api.example.com/cached").expect("valid url"))
        .expect("short-circuit should succeed");

    assert_eq!(response.status(), 304);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

struct OverlappingForks;

impl Policy for OverlappingForks {
    fn process(&self, request: Request, next: Next<'_>) -> Result<Response, Error> {
        next.run(request)
    }

    fn process_async<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let copy = request
                .try_clone()
                .expect("empty body request should clone");
            let (first, second) = join(next.fork().run_async(request), next.run_async(copy)).await;
            first.and(second)
        })
    }
}

#[tokio::test]
async fn overlapping_continuations_are_reported_as_chain_misuse() {
    let pipeline = Pipeline::builder()
        .policy(OverlappingForks)
        .transport(AsyncFnTransport::new(|request: Request| async move {
            tokio::task::yield_now().await;
            Ok(empty_response(&request, 200))
        }))
        .build()
        .expect("pipeline should build");

    let error = pipeline
        .send_async(Request::get("https://api.example.com/twice").expect("valid url"))
        .await
        .expect_err("overlapping continuation should fail");

    assert_eq!(error.kind(), ErrorKind::ChainMisuse);
    match error {
        Error::ChainMisuse { position, .. } => assert_eq!(position, 1),
        other => panic!("unexpected error variant: {other}"),
    }
}

struct SequentialForks;

impl Policy for SequentialForks {
    fn process(&self, request: Request, next: Next<'_>) -> Result<Response, Error> {
        let copy = request
            .try_clone()
            .expect("empty body request should clone");
        next.fork().run(copy)?.close();
        next.run(request)
    }

    fn process_async<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let copy = request
                .try_clone()
                .expect("empty body request should clone");
            next.fork().run_async(copy).await?.close();
            next.run_async(request).await
        })
    }
}

#[test]
fn sequential_forks_are_allowed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let transport_calls = Arc::clone(&calls);
    let pipeline = Pipeline::builder()
        .policy(SequentialForks)
        .transport(FnTransport::new(move |request: Request| {
            transport_calls.fetch_add(1, Ordering::SeqCst);
            Ok(empty_response(&request, 200))
        }))
        .build()
        .expect("pipeline should build");

    pipeline
        .send(Request::get("https://api.example.com/twice").expect("valid url"))
        .expect("sequential forks should succeed");

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

struct RecordingInterceptor {
    log: Log,
}

impl HttpInterceptor for RecordingInterceptor {
    fn on_request(&self, context: &CallContext, request: &mut Request) -> Result<(), Error> {
        push(&self.log, format!("request:{}", context.mode().as_str()));
        request.headers_mut().set("x-intercepted", "1");
        Ok(())
    }

    fn on_response(&self, _context: &CallContext, response: &mut Response) -> Result<(), Error> {
        push(&self.log, format!("response:{}", response.status()));
        Ok(())
    }

    fn on_error(&self, _context: &CallContext, error: &Error) {
        push(&self.log, format!("error:{}", error.code().as_str()));
    }
}

#[test]
fn interceptor_sees_request_response_and_error() {
    let log = Log::default();
    let pipeline = Pipeline::builder()
        .interceptor(RecordingInterceptor {
            log: Arc::clone(&log),
        })
        .transport(FnTransport::new(|request: Request| {
            if request.url().path() == "/fail" {
                return Err(Error::MissingTransport);
            }
            assert_eq!(request.headers().get("x-intercepted").as_deref(), Some("1"));
            Ok(empty_response(&request, 204))
        }))
        .build()
        .expect("pipeline should build");

    pipeline
        .send(Request::get("https://api.example.com/ok").expect("valid url"))
        .expect("request should succeed");
    pipeline
        .send(Request::get("https://api.example.com/fail").expect("valid url"))
        .expect_err("request should fail");

    assert_eq!(
        entries(&log),
        [
            "request:blocking",
            "response:204",
            "request:blocking",
            "error:missing_transport",
        ]
    );
}

#[tokio::test]
async fn async_transport_is_bounded_by_call_timeout() {
    let pipeline = Pipeline::builder()
        .transport(AsyncFnTransport::new(|request: Request| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(empty_response(&request, 200))
        }))
        .build()
        .expect("pipeline should build");

    let error = pipeline
        .send_async_with_options(
            Request::get("https://api.example.com/slow?token=secret").expect("valid url"),
            CallOptions::new().timeout(Duration::from_millis(20)),
        )
        .await
        .expect_err("slow transport should time out");

    assert_eq!(error.code(), ErrorCode::Timeout);
    assert_eq!(error.kind(), ErrorKind::Timeout);
    assert!(error.kind().is_transport());
    assert_eq!(error.timeout_phase(), Some(TimeoutPhase::Transport));
    match error {
        Error::Timeout { timeout_ms, url, .. } => {
            assert_eq!(timeout_ms, 20);
            assert_eq!(url, "https://api.example.com/slow");
        }
        other => panic!("unexpected error variant: {other}"),
    }
}

#[test]
fn async_only_transport_refuses_blocking_send() {
    let pipeline = Pipeline::builder()
        .transport(AsyncFnTransport::new(|request: Request| async move {
            Ok(empty_response(&request, 200))
        }))
        .build()
        .expect("pipeline should build");

    let error = pipeline
        .send(Request::get("https://api.example.com/").expect("valid url"))
        .expect_err("blocking send should be refused");
    assert_eq!(error.code(), ErrorCode::BlockingSendUnsupported);
    assert_eq!(error.kind(), ErrorKind::Configuration);
}

#[test]
fn build_without_transport_fails() {
    let error = Pipeline::builder()
        .build()
        .expect_err("pipeline without transport should fail");
    assert_eq!(error.code(), ErrorCode::MissingTransport);
}

#[test]
fn standard_options_assemble_policies_in_order() {
    let pipeline = PipelineBuilder::from_options(
        ClientOptions::new()
            .default_header("x-api-version", "2024-01-01")
            .retry(RetryPolicy::never()),
    )
    .policy(CachedAnswer)
    .transport(FnTransport::new(|request: Request| {
        Ok(empty_response(&request, 200))
    }))
    .build()
    .expect("pipeline should build");

    let names: Vec<String> = pipeline
        .policy_names()
        .into_iter()
        .map(|name| name.rsplit("::").next().unwrap_or(name).to_owned())
        .collect();
    assert_eq!(
        names,
        [
            "RequestIdPolicy",
            "UserAgentPolicy",
            "HeadersPolicy",
            "RedirectPolicy",
            "RetryPolicy",
            "CachedAnswer",
            "LoggingPolicy",
        ]
    );
    assert_eq!(pipeline.transport_name(), "fn");
    assert_eq!(
        pipeline.default_options().timeout_value(),
        Some(Duration::from_secs(10))
    );
}

#[test]
fn pipeline_serves_concurrent_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let transport_calls = Arc::clone(&calls);
    let pipeline = Pipeline::builder()
        .policy(RetryPolicy::standard())
        .transport(FnTransport::new(move |request: Request| {
            transport_calls.fetch_add(1, Ordering::SeqCst);
            Ok(empty_response(&request, 200))
        }))
        .build()
        .expect("pipeline should build");

    std::thread::scope(|scope| {
        for index in 0..8 {
            let pipeline = pipeline.clone();
            scope.spawn(move || {
                let url = format!("https://api.example.com/items/{index}");
                let response = pipeline
                    .send(Request::get(&url).expect("valid url"))
                    .expect("concurrent request should succeed");
                assert_eq!(response.status(), 200);
            });
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 8);
}

#[test]
fn call_context_counts_tries() {
    let context = CallContext::new(CallOptions::new(), ExecutionMode::Blocking);
    assert_eq!(context.try_count(), 0);
    assert_eq!(context.begin_try(), 1);
    assert_eq!(context.begin_try(), 2);
    assert_eq!(context.try_count(), 2);
    assert_eq!(
        CallOptions::new()
            .timeout(Duration::ZERO)
            .timeout_value(),
        Some(Duration::from_millis(1))
    );
}
