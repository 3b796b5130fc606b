use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;

use crate::context::CallContext;
use crate::error::{Error, TimeoutPhase};
use crate::request::Request;
use crate::response::Response;
use crate::transport::Transport;
use crate::util::redact_url_for_logs;

pub trait Policy: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn process(&self, request: Request, next: Next<'_>) -> Result<Response, Error>;

    fn process_async<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>>;
}

pub(crate) struct Chain<'a> {
    policies: &'a [Arc<dyn Policy>],
    transport: &'a dyn Transport,
    context: &'a CallContext,
    in_flight: Box<[AtomicBool]>,
}

impl<'a> Chain<'a> {
    pub(crate) fn new(
        policies: &'a [Arc<dyn Policy>],
        transport: &'a dyn Transport,
        context: &'a CallContext,
    ) -> Self {
        let in_flight = (0..=policies.len())
            .map(|_| AtomicBool::new(false))
            .collect();
        Self {
            policies,
            transport,
            context,
            in_flight,
        }
    }

    pub(crate) fn head(&'a self) -> Next<'a> {
        Next {
            chain: self,
            position: 0,
        }
    }
}

struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct Next<'a> {
    chain: &'a Chain<'a>,
    position: usize,
}

impl<'a> Next<'a> {
    pub fn context(&self) -> &'a CallContext {
        self.chain.context
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_transport(&self) -> bool {
        self.position >= self.chain.policies.len()
    }

    pub fn fork(&self) -> Next<'a> {
        Next {
            chain: self.chain,
            position: self.position,
        }
    }

    // forks share one flag per position; overlapping runs are misuse
    fn enter(&self) -> Result<InFlightGuard<'a>, Error> {
        let flag = &self.chain.in_flight[self.position];
        if flag.swap(true, Ordering::AcqRel) {
            return Err(Error::misuse(
                self.position,
                "continuation invoked while a previous invocation is still in flight",
            ));
        }
        Ok(InFlightGuard { flag })
    }

    fn successor(&self) -> Next<'a> {
        Next {
            chain: self.chain,
            position: self.position + 1,
        }
    }

    pub fn run(self, request: Request) -> Result<Response, Error> {
        let _guard = self.enter()?;
        match self.chain.policies.get(self.position) {
            Some(policy) => policy.process(request, self.successor()),
            None => self.chain.transport.send(request, self.chain.context),
        }
    }

    pub fn run_async(self, request: Request) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let _guard = self.enter()?;
            match self.chain.policies.get(self.position) {
                Some(policy) => policy.process_async(request, self.successor()).await,
                None => self.send_transport_async(request).await,
            }
        })
    }

    async fn send_transport_async(&self, request: Request) -> Result<Response, Error> {
        let context = self.chain.context;
        let Some(limit) = context.options().timeout_value() else {
            return self.chain.transport.send_async(request, context).await;
        };
        let method = request.method();
        let url = redact_url_for_logs(request.url());
        match tokio::time::timeout(limit, self.chain.transport.send_async(request, context)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                phase: TimeoutPhase::Transport,
                timeout_ms: limit.as_millis(),
                method,
                url,
            }),
        }
    }
}

pub trait HttpInterceptor: Send + Sync {
    fn on_request(&self, _context: &CallContext, _request: &mut Request) -> Result<(), Error> {
        Ok(())
    }

    fn on_response(&self, _context: &CallContext, _response: &mut Response) -> Result<(), Error> {
        Ok(())
    }

    fn on_error(&self, _context: &CallContext, _error: &Error) {}
}

pub struct InterceptorPolicy<I> {
    interceptor: I,
}

impl<I> InterceptorPolicy<I> {
    pub fn new(interceptor: I) -> Self {
        Self { interceptor }
    }

    pub fn interceptor(&self) -> &I {
        &self.interceptor
    }

    fn finish(&self, context: &CallContext, result: Result<Response, Error>) -> Result<Response, Error>
    where
        I: HttpInterceptor,
    {
        match result {
            Ok(mut response) => {
                self.interceptor.on_response(context, &mut response)?;
                Ok(response)
            }
            Err(error) => {
                self.interceptor.on_error(context, &error);
                Err(error)
            }
        }
    }
}

impl<I> Policy for InterceptorPolicy<I>
where
    I: HttpInterceptor,
{
    fn name(&self) -> &str {
        std::any::type_name::<I>()
    }

    fn process(&self, mut request: Request, next: Next<'_>) -> Result<Response, Error> {
        let context = next.context();
        self.interceptor.on_request(context, &mut request)?;
        let result = next.run(request);
        self.finish(context, result)
    }

    fn process_async<'a>(
        &'a self,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let context = next.context();
            self.interceptor.on_request(context, &mut request)?;
            let result = next.run_async(request).await;
            self.finish(context, result)
        })
    }
}
