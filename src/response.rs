use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::headers::HeaderCollection;
use crate::request::RequestHead;
use crate::util::truncate_body;

const READ_CHUNK_LEN: usize = 8192;

enum BodyInner {
    Buffered(Bytes),
    Reader(Box<dyn Read + Send>),
    Stream(BoxStream<'static, Result<Bytes, Error>>),
}

pub struct ResponseBody {
    inner: BodyInner,
}

fn read_body_error(source: std::io::Error) -> Error {
    Error::ReadBody {
        source: Box::new(source),
    }
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            inner: BodyInner::Buffered(data.into()),
        }
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            inner: BodyInner::Reader(Box::new(reader)),
        }
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, Error>> + Send + 'static,
    {
        Self {
            inner: BodyInner::Stream(stream.boxed()),
        }
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self.inner, BodyInner::Buffered(_))
    }

    pub fn is_async(&self) -> bool {
        matches!(self.inner, BodyInner::Stream(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.inner {
            BodyInner::Buffered(data) => Some(data),
            _ => None,
        }
    }

    pub async fn bytes(self) -> Result<Bytes, Error> {
        match self.inner {
            BodyInner::Buffered(data) => Ok(data),
            BodyInner::Reader(reader) => read_all(reader),
            BodyInner::Stream(mut stream) => {
                let mut collected = Vec::new();
                while let Some(chunk) = stream.next().await {
                    collected.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(collected))
            }
        }
    }

    pub fn bytes_blocking(self) -> Result<Bytes, Error> {
        match self.inner {
            BodyInner::Buffered(data) => Ok(data),
            BodyInner::Reader(reader) => read_all(reader),
            BodyInner::Stream(_) => Err(Error::BlockingReadOfAsyncBody),
        }
    }

    pub fn into_reader(self) -> Result<Box<dyn Read + Send>, Error> {
        match self.inner {
            BodyInner::Buffered(data) => Ok(Box::new(std::io::Cursor::new(data))),
            BodyInner::Reader(reader) => Ok(reader),
            BodyInner::Stream(_) => Err(Error::BlockingReadOfAsyncBody),
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes, Error>> {
        match self.inner {
            BodyInner::Buffered(data) => stream::once(async move { Ok(data) }).boxed(),
            BodyInner::Reader(reader) => stream::unfold(Some(reader), |state| async move {
                let mut reader = state?;
                let mut chunk = vec![0_u8; READ_CHUNK_LEN];
                match reader.read(&mut chunk) {
                    Ok(0) => None,
                    Ok(read) => {
                        chunk.truncate(read);
                        Some((Ok(Bytes::from(chunk)), Some(reader)))
                    }
                    Err(source) => Some((Err(read_body_error(source)), None)),
                }
            })
            .boxed(),
            BodyInner::Stream(stream) => stream,
        }
    }

    pub fn close(self) {
        drop(self);
    }
}

fn read_all(mut reader: Box<dyn Read + Send>) -> Result<Bytes, Error> {
    let mut collected = Vec::new();
    reader
        .read_to_end(&mut collected)
        .map_err(read_body_error)?;
    Ok(Bytes::from(collected))
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            BodyInner::Buffered(_) => "buffered",
            BodyInner::Reader(_) => "reader",
            BodyInner::Stream(_) => "stream",
        };
        formatter
            .debug_struct("ResponseBody")
            .field("kind", &kind)
            .finish()
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: HeaderCollection,
    body: ResponseBody,
    request: Arc<RequestHead>,
}

impl Response {
    pub fn new(
        status: u16,
        headers: HeaderCollection,
        body: ResponseBody,
        request: impl Into<Arc<RequestHead>>,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            request: request.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderCollection {
        &mut self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn request(&self) -> &RequestHead {
        &self.request
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    pub fn into_parts(self) -> (u16, HeaderCollection, ResponseBody, Arc<RequestHead>) {
        (self.status, self.headers, self.body, self.request)
    }

    pub async fn bytes(self) -> Result<Bytes, Error> {
        self.body.bytes().await
    }

    pub fn bytes_blocking(self) -> Result<Bytes, Error> {
        self.body.bytes_blocking()
    }

    pub async fn text_lossy(self) -> Result<String, Error> {
        let body = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    pub async fn json<T>(self) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let body = self.bytes().await?;
        decode_json(&body)
    }

    pub fn json_blocking<T>(self) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let body = self.bytes_blocking()?;
        decode_json(&body)
    }

    pub async fn error_for_status(self) -> Result<Self, Error> {
        if self.is_success() {
            return Ok(self);
        }
        let request = Arc::clone(&self.request);
        let status = self.status;
        let body = self.bytes().await.unwrap_or_default();
        Err(status_error(status, &request, &body))
    }

    pub fn error_for_status_blocking(self) -> Result<Self, Error> {
        if self.is_success() {
            return Ok(self);
        }
        let request = Arc::clone(&self.request);
        let status = self.status;
        let body = self.bytes_blocking().unwrap_or_default();
        Err(status_error(status, &request, &body))
    }

    pub fn close(self) {
        self.body.close();
    }
}

fn decode_json<T>(body: &[u8]) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(body).map_err(|source| Error::Deserialize {
        source,
        body: truncate_body(body),
    })
}

fn status_error(status: u16, request: &RequestHead, body: &[u8]) -> Error {
    Error::HttpStatus {
        status,
        method: request.method,
        url: crate::util::redact_url_for_logs(&request.url),
        body: truncate_body(body),
    }
}
