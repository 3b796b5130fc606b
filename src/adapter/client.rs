use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::context::{CallContext, CallOptions};
use crate::error::Error;
use crate::headers::HeaderCollection;
use crate::method::HttpMethod;
use crate::pipeline::Pipeline;
use crate::query::QueryParams;
use crate::request::{Request, RequestBody, RequestHead};
use crate::response::{Response, ResponseBody};
use crate::transport::Transport;
use crate::util::CONTENT_TYPE;

use super::url::build_url;

pub type HeaderList = Vec<(String, Vec<String>)>;

pub enum BodySource {
    Bytes(Bytes),
    Reader(Box<dyn Read + Send + Sync>),
}

impl std::fmt::Debug for BodySource {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(data) => formatter.debug_tuple("Bytes").field(&data.len()).finish(),
            Self::Reader(_) => formatter.write_str("Reader"),
        }
    }
}

#[derive(Debug)]
pub struct BodyDescriptor {
    pub source: BodySource,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

impl BodyDescriptor {
    pub fn bytes(data: impl Into<Bytes>, content_type: Option<String>) -> Self {
        let data = data.into();
        Self {
            content_length: Some(data.len() as u64),
            source: BodySource::Bytes(data),
            content_type,
        }
    }

    pub fn materialize(self) -> Result<Bytes, Error> {
        match self.source {
            BodySource::Bytes(data) => Ok(data),
            BodySource::Reader(reader) => {
                RequestBody::from_reader(reader, self.content_length).into_bytes()
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RequestInfo {
    pub method: String,
    pub base_url: String,
    pub path_segments: Vec<String>,
    pub query: QueryParams,
    pub headers: HeaderList,
    pub body: Option<BodyDescriptor>,
    pub timeout: Option<Duration>,
}

#[derive(Debug)]
pub struct ClientResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: ResponseBody,
}

pub fn headers_to_list(headers: &HeaderCollection) -> HeaderList {
    headers
        .iter()
        .map(|entry| (entry.name().to_owned(), entry.values().to_vec()))
        .collect()
}

pub fn headers_from_list(list: HeaderList) -> HeaderCollection {
    let mut headers = HeaderCollection::new();
    for (name, values) in list {
        for value in values {
            headers.add(name.clone(), value);
        }
    }
    headers
}

fn inject_content_type(headers: &mut HeaderCollection, content_type: Option<&str>) {
    if let Some(content_type) = content_type
        && !headers.contains(CONTENT_TYPE)
    {
        headers.set(CONTENT_TYPE, content_type);
    }
}

pub fn to_pipeline_request(info: RequestInfo) -> Result<Request, Error> {
    let method: HttpMethod = info.method.parse()?;
    let url = build_url(&info.base_url, &info.path_segments, &info.query)?;
    let mut request = Request::new(method, url)?;

    let mut headers = headers_from_list(info.headers);
    if let Some(descriptor) = info.body {
        inject_content_type(&mut headers, descriptor.content_type.as_deref());
        let content_type = descriptor.content_type.clone();
        let mut body = RequestBody::from_bytes(descriptor.materialize()?);
        if let Some(content_type) = content_type {
            body = body.with_content_type(content_type);
        }
        request.set_body(Some(body));
    }
    *request.headers_mut() = headers;
    Ok(request)
}

pub fn to_request_info(request: Request) -> Result<RequestInfo, Error> {
    let (head, body) = request.into_parts();
    let RequestHead {
        method,
        mut url,
        mut headers,
    } = head;

    let query = url.query().map(QueryParams::parse).unwrap_or_default();
    url.set_query(None);
    url.set_fragment(None);

    let body = match body {
        Some(body) => {
            inject_content_type(&mut headers, body.content_type());
            let content_type = body.content_type().map(str::to_owned);
            Some(BodyDescriptor::bytes(body.into_bytes()?, content_type))
        }
        None => None,
    };

    Ok(RequestInfo {
        method: method.as_str().to_owned(),
        base_url: url.to_string(),
        path_segments: Vec::new(),
        query,
        headers: headers_to_list(&headers),
        body,
        timeout: None,
    })
}

pub fn to_client_response(response: Response) -> ClientResponse {
    let (status, headers, body, _) = response.into_parts();
    ClientResponse {
        status,
        headers: headers_to_list(&headers),
        body,
    }
}

pub fn to_pipeline_response(
    response: ClientResponse,
    request: impl Into<Arc<RequestHead>>,
) -> Response {
    Response::new(
        response.status,
        headers_from_list(response.headers),
        response.body,
        request,
    )
}

pub trait ClientExecutor: Send + Sync {
    fn execute(&self, request: RequestInfo) -> Result<ClientResponse, Error>;

    fn execute_async<'a>(
        &'a self,
        request: RequestInfo,
    ) -> BoxFuture<'a, Result<ClientResponse, Error>> {
        Box::pin(async move { self.execute(request) })
    }
}

#[derive(Clone, Debug)]
pub struct PolicyDecoratingClient {
    pipeline: Pipeline,
    options: Option<CallOptions>,
}

impl PolicyDecoratingClient {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            options: None,
        }
    }

    pub fn call_options(mut self, options: CallOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn options(&self, timeout: Option<Duration>) -> CallOptions {
        let options = self
            .options
            .clone()
            .unwrap_or_else(|| self.pipeline.default_options().clone());
        match timeout {
            Some(timeout) => options.timeout(timeout),
            None => options,
        }
    }
}

impl ClientExecutor for PolicyDecoratingClient {
    fn execute(&self, request: RequestInfo) -> Result<ClientResponse, Error> {
        let options = self.options(request.timeout);
        let request = to_pipeline_request(request)?;
        let response = self.pipeline.send_with_options(request, options)?;
        Ok(to_client_response(response))
    }

    fn execute_async<'a>(
        &'a self,
        request: RequestInfo,
    ) -> BoxFuture<'a, Result<ClientResponse, Error>> {
        Box::pin(async move {
            let options = self.options(request.timeout);
            let request = to_pipeline_request(request)?;
            let response = self
                .pipeline
                .send_async_with_options(request, options)
                .await?;
            Ok(to_client_response(response))
        })
    }
}

fn executor_request(request: Request, context: &CallContext) -> Result<RequestInfo, Error> {
    let mut info = to_request_info(request)?;
    info.timeout = context.options().timeout_value();
    Ok(info)
}

pub struct ExecutorTransport<E> {
    executor: E,
}

impl<E> ExecutorTransport<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

impl<E> Transport for ExecutorTransport<E>
where
    E: ClientExecutor,
{
    fn name(&self) -> &'static str {
        "client_executor"
    }

    fn send(&self, request: Request, context: &CallContext) -> Result<Response, Error> {
        let head = request.head();
        let response = self.executor.execute(executor_request(request, context)?)?;
        Ok(to_pipeline_response(response, head))
    }

    fn send_async<'a>(
        &'a self,
        request: Request,
        context: &'a CallContext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let head = request.head();
            let response = self
                .executor
                .execute_async(executor_request(request, context)?)
                .await?;
            Ok(to_pipeline_response(response, head))
        })
    }
}
