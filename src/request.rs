use std::io::Read;

use bytes::Bytes;
use url::Url;

use crate::error::Error;
use crate::headers::HeaderCollection;
use crate::method::HttpMethod;
use crate::util::parse_absolute_url;

enum BodyContent {
    Buffered(Bytes),
    Reader {
        reader: Box<dyn Read + Send + Sync>,
        declared_length: Option<u64>,
    },
}

pub struct RequestBody {
    content: BodyContent,
    content_type: Option<String>,
}

impl RequestBody {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            content: BodyContent::Buffered(data.into()),
            content_type: None,
        }
    }

    pub fn from_reader<R>(reader: R, declared_length: Option<u64>) -> Self
    where
        R: Read + Send + Sync + 'static,
    {
        Self {
            content: BodyContent::Reader {
                reader: Box::new(reader),
                declared_length,
            },
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        match &self.content {
            BodyContent::Buffered(data) => Some(data.len() as u64),
            BodyContent::Reader {
                declared_length, ..
            } => *declared_length,
        }
    }

    pub fn is_replayable(&self) -> bool {
        matches!(self.content, BodyContent::Buffered(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.content {
            BodyContent::Buffered(data) => Some(data),
            BodyContent::Reader { .. } => None,
        }
    }

    pub fn try_clone(&self) -> Option<Self> {
        match &self.content {
            BodyContent::Buffered(data) => Some(Self {
                content: BodyContent::Buffered(data.clone()),
                content_type: self.content_type.clone(),
            }),
            BodyContent::Reader { .. } => None,
        }
    }

    pub fn buffer(&mut self) -> Result<&Bytes, Error> {
        if let BodyContent::Reader {
            reader,
            declared_length,
        } = &mut self.content
        {
            let mut collected = Vec::new();
            reader
                .read_to_end(&mut collected)
                .map_err(|source| Error::ReadBody {
                    source: Box::new(source),
                })?;
            let actual = collected.len() as u64;
            if let Some(declared) = *declared_length
                && declared != actual
            {
                return Err(Error::BodyLengthMismatch { declared, actual });
            }
            self.content = BodyContent::Buffered(Bytes::from(collected));
        }
        match &self.content {
            BodyContent::Buffered(data) => Ok(data),
            BodyContent::Reader { .. } => unreachable!("reader bodies are buffered above"),
        }
    }

    pub fn into_bytes(mut self) -> Result<Bytes, Error> {
        self.buffer().cloned()
    }

    pub(crate) fn into_reader(self) -> Box<dyn Read + Send + Sync> {
        match self.content {
            BodyContent::Buffered(data) => Box::new(std::io::Cursor::new(data)),
            BodyContent::Reader { reader, .. } => reader,
        }
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.content {
            BodyContent::Buffered(_) => "buffered",
            BodyContent::Reader { .. } => "reader",
        };
        formatter
            .debug_struct("RequestBody")
            .field("kind", &kind)
            .field("content_length", &self.content_length())
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl From<Bytes> for RequestBody {
    fn from(data: Bytes) -> Self {
        Self::from_bytes(data)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

impl From<&'static str> for RequestBody {
    fn from(data: &'static str) -> Self {
        Self::from_bytes(data)
    }
}

impl From<String> for RequestBody {
    fn from(data: String) -> Self {
        Self::from_bytes(data)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestHead {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderCollection,
}

#[derive(Debug)]
pub struct Request {
    method: HttpMethod,
    url: Url,
    headers: HeaderCollection,
    body: Option<RequestBody>,
}

impl Request {
    pub fn new(method: HttpMethod, url: Url) -> Result<Self, Error> {
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(Error::InvalidUrl {
                url: url.to_string(),
            });
        }
        Ok(Self {
            method,
            url,
            headers: HeaderCollection::new(),
            body: None,
        })
    }

    pub fn parse(method: HttpMethod, url: &str) -> Result<Self, Error> {
        Self::new(method, parse_absolute_url(url)?)
    }

    pub fn get(url: &str) -> Result<Self, Error> {
        Self::parse(HttpMethod::Get, url)
    }

    pub fn post(url: &str) -> Result<Self, Error> {
        Self::parse(HttpMethod::Post, url)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn set_method(&mut self, method: HttpMethod) {
        self.method = method;
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn set_url(&mut self, url: Url) -> Result<(), Error> {
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(Error::InvalidUrl {
                url: url.to_string(),
            });
        }
        self.url = url;
        Ok(())
    }

    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderCollection {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> Option<&mut RequestBody> {
        self.body.as_mut()
    }

    pub fn set_body(&mut self, body: Option<RequestBody>) {
        self.body = body;
    }

    pub fn take_body(&mut self) -> Option<RequestBody> {
        self.body.take()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_replayable(&self) -> bool {
        self.body.as_ref().is_none_or(RequestBody::is_replayable)
    }

    pub fn try_clone(&self) -> Option<Self> {
        let body = match &self.body {
            Some(body) => Some(body.try_clone()?),
            None => None,
        };
        Some(Self {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
        })
    }

    pub fn head(&self) -> RequestHead {
        RequestHead {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
        }
    }

    pub fn into_parts(self) -> (RequestHead, Option<RequestBody>) {
        (
            RequestHead {
                method: self.method,
                url: self.url,
                headers: self.headers,
            },
            self.body,
        )
    }
}
