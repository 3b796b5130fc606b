use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::future::BoxFuture;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, TimeoutPhase, TransportErrorKind};
use crate::headers::HeaderCollection;
use crate::method::HttpMethod;
use crate::policy::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use crate::util::{parse_retry_after, redact_url_for_logs};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct RetryDecision {
    pub attempt: usize,
    pub max_attempts: usize,
    pub method: HttpMethod,
    pub url: String,
    pub status: Option<u16>,
    pub error_kind: Option<ErrorKind>,
    pub transport_error_kind: Option<TransportErrorKind>,
    pub timeout_phase: Option<TimeoutPhase>,
    pub response_body_read_error: bool,
}

impl RetryDecision {
    fn for_response(target: &AttemptTarget, attempt: usize, max_attempts: usize, status: u16) -> Self {
        Self {
            status: Some(status),
            ..target.decision(attempt, max_attempts)
        }
    }

    fn for_error(target: &AttemptTarget, attempt: usize, max_attempts: usize, error: &Error) -> Self {
        let mut decision = target.decision(attempt, max_attempts);
        decision.error_kind = Some(error.kind());
        match error.last_attempt_error() {
            Error::ReadBody { .. } => decision.response_body_read_error = true,
            Error::Transport { kind, .. } => decision.transport_error_kind = Some(*kind),
            Error::Timeout { phase, .. } => decision.timeout_phase = Some(*phase),
            other => decision.status = other.status(),
        }
        decision
    }
}

struct AttemptTarget {
    method: HttpMethod,
    url: String,
}

impl AttemptTarget {
    fn of(request: &Request) -> Self {
        Self {
            method: request.method(),
            url: redact_url_for_logs(request.url()),
        }
    }

    fn decision(&self, attempt: usize, max_attempts: usize) -> RetryDecision {
        RetryDecision {
            attempt,
            max_attempts,
            method: self.method,
            url: self.url.clone(),
            status: None,
            error_kind: None,
            transport_error_kind: None,
            timeout_phase: None,
            response_body_read_error: false,
        }
    }
}

pub trait RetryClassifier: Send + Sync {
    fn should_retry(&self, decision: &RetryDecision) -> bool;
}

impl<F> RetryClassifier for F
where
    F: Fn(&RetryDecision) -> bool + Send + Sync,
{
    fn should_retry(&self, decision: &RetryDecision) -> bool {
        self(decision)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NeverRetry;

impl RetryClassifier for NeverRetry {
    fn should_retry(&self, _decision: &RetryDecision) -> bool {
        false
    }
}

#[derive(Clone, Debug)]
pub struct StandardRetryClassifier {
    retryable_status_codes: BTreeSet<u16>,
    retryable_transport_error_kinds: BTreeSet<TransportErrorKind>,
    retryable_timeout_phases: BTreeSet<TimeoutPhase>,
    retry_on_response_body_read_error: bool,
    status_retry_windows: BTreeMap<u16, usize>,
    transport_retry_windows: BTreeMap<TransportErrorKind, usize>,
    timeout_retry_windows: BTreeMap<TimeoutPhase, usize>,
}

impl Default for StandardRetryClassifier {
    fn default() -> Self {
        Self {
            retryable_status_codes: [429_u16, 500, 502, 503, 504].into_iter().collect(),
            retryable_transport_error_kinds: [
                TransportErrorKind::Dns,
                TransportErrorKind::Connect,
                TransportErrorKind::Read,
            ]
            .into_iter()
            .collect(),
            retryable_timeout_phases: [TimeoutPhase::Transport, TimeoutPhase::ResponseBody]
                .into_iter()
                .collect(),
            retry_on_response_body_read_error: true,
            status_retry_windows: BTreeMap::new(),
            transport_retry_windows: BTreeMap::new(),
            timeout_retry_windows: BTreeMap::new(),
        }
    }
}

impl StandardRetryClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn retryable_transport_error_kinds(
        mut self,
        kinds: impl IntoIterator<Item = TransportErrorKind>,
    ) -> Self {
        self.retryable_transport_error_kinds = kinds.into_iter().collect();
        self
    }

    pub fn retryable_timeout_phases(
        mut self,
        phases: impl IntoIterator<Item = TimeoutPhase>,
    ) -> Self {
        self.retryable_timeout_phases = phases.into_iter().collect();
        self
    }

    pub fn retry_on_response_body_read_error(mut self, retry: bool) -> Self {
        self.retry_on_response_body_read_error = retry;
        self
    }

    pub fn status_retry_window(mut self, status: u16, max_attempts: usize) -> Self {
        self.status_retry_windows.insert(status, max_attempts.max(1));
        self
    }

    pub fn transport_retry_window(mut self, kind: TransportErrorKind, max_attempts: usize) -> Self {
        self.transport_retry_windows
            .insert(kind, max_attempts.max(1));
        self
    }

    pub fn timeout_retry_window(mut self, phase: TimeoutPhase, max_attempts: usize) -> Self {
        self.timeout_retry_windows.insert(phase, max_attempts.max(1));
        self
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    fn is_within_retry_window(limit: Option<usize>, attempt: usize) -> bool {
        limit.is_none_or(|limit| attempt < limit.max(1))
    }
}

impl RetryClassifier for StandardRetryClassifier {
    fn should_retry(&self, decision: &RetryDecision) -> bool {
        if let Some(status) = decision.status {
            let window = self.status_retry_windows.get(&status).copied();
            return self.is_retryable_status(status)
                && Self::is_within_retry_window(window, decision.attempt);
        }
        if let Some(kind) = decision.transport_error_kind {
            let window = self.transport_retry_windows.get(&kind).copied();
            return self.retryable_transport_error_kinds.contains(&kind)
                && Self::is_within_retry_window(window, decision.attempt);
        }
        if let Some(phase) = decision.timeout_phase {
            let window = self.timeout_retry_windows.get(&phase).copied();
            return self.retryable_timeout_phases.contains(&phase)
                && Self::is_within_retry_window(window, decision.attempt);
        }
        decision.response_body_read_error && self.retry_on_response_body_read_error
    }
}

pub trait RetryEligibility: Send + Sync {
    fn supports_retry(&self, method: HttpMethod, headers: &HeaderCollection) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StrictRetryEligibility;

impl RetryEligibility for StrictRetryEligibility {
    fn supports_retry(&self, method: HttpMethod, headers: &HeaderCollection) -> bool {
        method.is_idempotent() || headers.contains(IDEMPOTENCY_KEY_HEADER)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveRetryEligibility;

impl RetryEligibility for PermissiveRetryEligibility {
    fn supports_retry(&self, _method: HttpMethod, _headers: &HeaderCollection) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryState {
    NotStarted,
    Attempting { attempt: usize },
    Succeeded { attempts: usize },
    ExhaustedFailed { attempts: usize },
}

impl RetryState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::ExhaustedFailed { .. })
    }
}

pub trait RetryObserver: Send + Sync {
    fn on_state(&self, state: RetryState);
}

impl<F> RetryObserver for F
where
    F: Fn(RetryState) + Send + Sync,
{
    fn on_state(&self, state: RetryState) {
        self(state)
    }
}

enum Step {
    Finish(Result<Response, Error>),
    Retry(Duration),
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_backoff: Duration,
    max_backoff: Duration,
    jitter_ratio: f64,
    max_retry_after: Duration,
    classifier: Arc<dyn RetryClassifier>,
    eligibility: Arc<dyn RetryEligibility>,
    observer: Option<Arc<dyn RetryObserver>>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_backoff", &self.base_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("jitter_ratio", &self.jitter_ratio)
            .field("max_retry_after", &self.max_retry_after)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new<C>(max_attempts: usize, classifier: C) -> Self
    where
        C: RetryClassifier + 'static,
    {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            jitter_ratio: 0.2,
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
            classifier: Arc::new(classifier),
            eligibility: Arc::new(PermissiveRetryEligibility),
            observer: None,
        }
    }

    pub fn standard() -> Self {
        Self::new(3, StandardRetryClassifier::default()).eligibility(StrictRetryEligibility)
    }

    pub fn never() -> Self {
        Self::new(1, NeverRetry).jitter_ratio(0.0)
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff.max(Duration::from_millis(1));
        if self.max_backoff < self.base_backoff {
            self.max_backoff = self.base_backoff;
        }
        self
    }

    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff.max(self.base_backoff);
        self
    }

    pub fn jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    pub fn max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }

    pub fn classifier<C>(mut self, classifier: C) -> Self
    where
        C: RetryClassifier + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn eligibility<E>(mut self, eligibility: E) -> Self
    where
        E: RetryEligibility + 'static,
    {
        self.eligibility = Arc::new(eligibility);
        self
    }

    pub fn observer<O>(mut self, observer: O) -> Self
    where
        O: RetryObserver + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn max_attempts_value(&self) -> usize {
        self.max_attempts
    }

    fn attempt_budget(&self, request: &Request) -> usize {
        if request.is_replayable()
            && self
                .eligibility
                .supports_retry(request.method(), request.headers())
        {
            self.max_attempts
        } else {
            1
        }
    }

    fn observe(&self, state: RetryState) {
        if let Some(observer) = &self.observer {
            observer.on_state(state);
        }
    }

    pub(crate) fn backoff_for_retry(&self, retry_index: usize) -> Duration {
        let capped_exponent = retry_index.saturating_sub(1).min(31) as u32;
        let multiplier = 1_u128 << capped_exponent;
        let base_ms = self.base_backoff.as_millis().max(1);
        let max_ms = self.max_backoff.as_millis().max(base_ms);
        let delay_ms = base_ms
            .saturating_mul(multiplier)
            .min(max_ms)
            .min(u64::MAX as u128) as u64;
        self.apply_jitter(Duration::from_millis(delay_ms))
    }

    fn apply_jitter(&self, backoff: Duration) -> Duration {
        if self.jitter_ratio <= f64::EPSILON {
            return backoff;
        }
        let backoff_ms = backoff.as_millis().min(u64::MAX as u128) as u64;
        if backoff_ms <= 1 {
            return backoff;
        }
        let max_backoff_ms = self.max_backoff.as_millis().min(u64::MAX as u128) as u64;

        let jitter_span = ((backoff_ms as f64) * self.jitter_ratio).round().max(1.0) as u64;
        let low = backoff_ms.saturating_sub(jitter_span);
        let high = backoff_ms.saturating_add(jitter_span).max(low);
        let sampled_ms = rand::rng()
            .random_range(low..=high)
            .min(max_backoff_ms.max(1));
        Duration::from_millis(sampled_ms)
    }

    fn evaluate(
        &self,
        outcome: Result<Response, Error>,
        target: &AttemptTarget,
        attempt: usize,
        budget: usize,
    ) -> Step {
        if attempt >= budget {
            return Step::Finish(self.conclude(outcome, attempt));
        }
        match outcome {
            Ok(response) => {
                let decision =
                    RetryDecision::for_response(target, attempt, budget, response.status());
                if !self.classifier.should_retry(&decision) {
                    self.observe(RetryState::Succeeded { attempts: attempt });
                    return Step::Finish(Ok(response));
                }
                let delay = parse_retry_after(response.headers(), SystemTime::now())
                    .map(|delay| delay.min(self.max_retry_after))
                    .unwrap_or_else(|| self.backoff_for_retry(attempt));
                warn!(
                    attempt,
                    max_attempts = budget,
                    status_code = response.status(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying request after retryable status"
                );
                response.close();
                Step::Retry(delay)
            }
            Err(error) if self.is_retryable_error(&error, target, attempt, budget) => {
                let delay = self.backoff_for_retry(attempt);
                warn!(
                    attempt,
                    max_attempts = budget,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying request after error"
                );
                Step::Retry(delay)
            }
            Err(error) => {
                debug!(error = %error, kind = error.kind().as_str(), "error is not retryable");
                Step::Finish(self.conclude(Err(error), attempt))
            }
        }
    }

    fn conclude(
        &self,
        outcome: Result<Response, Error>,
        attempt: usize,
    ) -> Result<Response, Error> {
        match outcome {
            Ok(response) => {
                self.observe(RetryState::Succeeded { attempts: attempt });
                Ok(response)
            }
            Err(error) => {
                self.observe(RetryState::ExhaustedFailed { attempts: attempt });
                // attempt n > 1 is only reached after attempt n - 1 was retried
                if attempt > 1 && error.kind().is_recoverable() {
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(error),
                    });
                }
                Err(error)
            }
        }
    }

    fn is_retryable_error(
        &self,
        error: &Error,
        target: &AttemptTarget,
        attempt: usize,
        budget: usize,
    ) -> bool {
        error.kind().is_recoverable()
            && self
                .classifier
                .should_retry(&RetryDecision::for_error(target, attempt, budget, error))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl Policy for RetryPolicy {
    fn process(&self, request: Request, next: Next<'_>) -> Result<Response, Error> {
        let context = next.context();
        let target = AttemptTarget::of(&request);
        let budget = self.attempt_budget(&request);
        self.observe(RetryState::NotStarted);

        if budget == 1 {
            context.begin_try();
            self.observe(RetryState::Attempting { attempt: 1 });
            return self.conclude(next.run(request), 1);
        }

        let mut attempt = 1;
        loop {
            context.begin_try();
            self.observe(RetryState::Attempting { attempt });
            let outcome = match request.try_clone() {
                Some(attempt_request) => next.fork().run(attempt_request),
                None => return self.conclude(next.run(request), attempt),
            };
            match self.evaluate(outcome, &target, attempt, budget) {
                Step::Finish(result) => return result,
                Step::Retry(delay) => {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
            attempt += 1;
        }
    }

    fn process_async<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let context = next.context();
            let target = AttemptTarget::of(&request);
            let budget = self.attempt_budget(&request);
            self.observe(RetryState::NotStarted);

            if budget == 1 {
                context.begin_try();
                self.observe(RetryState::Attempting { attempt: 1 });
                let outcome = next.run_async(request).await;
                return self.conclude(outcome, 1);
            }

            let mut attempt = 1;
            loop {
                context.begin_try();
                self.observe(RetryState::Attempting { attempt });
                let outcome = match request.try_clone() {
                    Some(attempt_request) => next.fork().run_async(attempt_request).await,
                    None => {
                        let outcome = next.run_async(request).await;
                        return self.conclude(outcome, attempt);
                    }
                };
                match self.evaluate(outcome, &target, attempt, budget) {
                    Step::Finish(result) => return result,
                    Step::Retry(delay) => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                attempt += 1;
            }
        })
    }
}
