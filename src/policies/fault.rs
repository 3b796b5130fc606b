use std::collections::HashMap;
use std::sync::Mutex;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::context::CallContext;
use crate::error::{Error, TimeoutPhase, TransportErrorKind};
use crate::policy::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use crate::util::{lock_unpoisoned, redact_url_for_logs};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InjectedFault {
    Transport(TransportErrorKind),
    Timeout,
}

#[derive(Debug)]
pub struct FaultInjectionPolicy {
    failures_per_url: usize,
    fault: InjectedFault,
    injected: Mutex<HashMap<String, usize>>,
}

impl FaultInjectionPolicy {
    pub fn new(failures_per_url: usize, fault: InjectedFault) -> Self {
        Self {
            failures_per_url,
            fault,
            injected: Mutex::new(HashMap::new()),
        }
    }

    pub fn injected_count(&self, url: &str) -> usize {
        lock_unpoisoned(&self.injected)
            .get(url)
            .copied()
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        lock_unpoisoned(&self.injected).clear();
    }

    fn intercept(&self, request: &Request, context: &CallContext) -> Result<(), Error> {
        {
            let mut injected = lock_unpoisoned(&self.injected);
            let count = injected.entry(request.url().to_string()).or_default();
            if *count >= self.failures_per_url {
                return Ok(());
            }
            *count += 1;
        }

        let method = request.method();
        let url = redact_url_for_logs(request.url());
        debug!(method = %method, url = %url, fault = ?self.fault, "injecting fault");
        Err(match self.fault {
            InjectedFault::Transport(kind) => Error::Transport {
                kind,
                method,
                url,
                source: "injected fault".into(),
            },
            InjectedFault::Timeout => Error::Timeout {
                phase: TimeoutPhase::Transport,
                timeout_ms: context
                    .options()
                    .timeout_value()
                    .unwrap_or_default()
                    .as_millis(),
                method,
                url,
            },
        })
    }
}

impl Policy for FaultInjectionPolicy {
    fn process(&self, request: Request, next: Next<'_>) -> Result<Response, Error> {
        self.intercept(&request, next.context())?;
        next.run(request)
    }

    fn process_async<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        match self.intercept(&request, next.context()) {
            Ok(()) => next.run_async(request),
            Err(error) => Box::pin(async move { Err::<Response, Error>(error) }),
        }
    }
}
