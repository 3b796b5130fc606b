use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};

use crate::error::Error;
use crate::headers::HeaderCollection;
use crate::method::HttpMethod;
use crate::request::{Request, RequestBody, RequestHead};
use crate::response::{Response, ResponseBody};
use crate::util::{self, parse_header_value};

pub(crate) fn http_request_with_body<B>(
    head: &RequestHead,
    content_type: Option<&str>,
    content_length: Option<u64>,
    body: B,
) -> Result<http::Request<B>, Error> {
    let mut headers = head.headers.to_header_map()?;
    if let Some(content_type) = content_type
        && !headers.contains_key(CONTENT_TYPE)
    {
        headers.insert(
            CONTENT_TYPE,
            parse_header_value(util::CONTENT_TYPE, content_type)?,
        );
    }
    if let Some(content_length) = content_length
        && !headers.contains_key(CONTENT_LENGTH)
    {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
    }

    let uri = head
        .url
        .as_str()
        .parse::<http::Uri>()
        .map_err(|_| Error::InvalidUrl {
            url: head.url.to_string(),
        })?;

    let mut http_request = http::Request::new(body);
    *http_request.method_mut() = head.method.to_http();
    *http_request.uri_mut() = uri;
    *http_request.headers_mut() = headers;
    Ok(http_request)
}

pub fn to_http_request(request: Request) -> Result<http::Request<Bytes>, Error> {
    let (head, body) = request.into_parts();
    let (content_type, body) = match body {
        Some(body) => (body.content_type().map(str::to_owned), body.into_bytes()?),
        None => (None, Bytes::new()),
    };
    let content_length = (!body.is_empty()).then_some(body.len() as u64);
    http_request_with_body(&head, content_type.as_deref(), content_length, body)
}

pub fn from_http_request(http_request: http::Request<Bytes>) -> Result<Request, Error> {
    let (parts, body) = http_request.into_parts();
    let method = HttpMethod::try_from(&parts.method)?;
    let mut request = Request::parse(method, &parts.uri.to_string())?;
    *request.headers_mut() = HeaderCollection::from_header_map(&parts.headers);
    if !body.is_empty() {
        let mut request_body = RequestBody::from_bytes(body);
        if let Some(content_type) = request.headers().get(util::CONTENT_TYPE) {
            request_body = request_body.with_content_type(content_type.into_owned());
        }
        request.set_body(Some(request_body));
    }
    Ok(request)
}

pub fn from_http_response(
    http_response: http::Response<Bytes>,
    request: impl Into<Arc<RequestHead>>,
) -> Response {
    let (parts, body) = http_response.into_parts();
    response_from_parts(parts, ResponseBody::from_bytes(body), request)
}

pub(crate) fn response_from_parts(
    parts: http::response::Parts,
    body: ResponseBody,
    request: impl Into<Arc<RequestHead>>,
) -> Response {
    Response::new(
        parts.status.as_u16(),
        HeaderCollection::from_header_map(&parts.headers),
        body,
        request,
    )
}

pub fn to_http_response(response: Response) -> Result<http::Response<ResponseBody>, Error> {
    let (status, headers, body, _) = response.into_parts();
    let status = http::StatusCode::from_u16(status).map_err(|source| Error::RequestBuild {
        source: source.into(),
    })?;
    let mut http_response = http::Response::new(body);
    *http_response.status_mut() = status;
    *http_response.headers_mut() = headers.to_header_map()?;
    Ok(http_response)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{from_http_request, from_http_response, to_http_request};
    use crate::error::ErrorCode;
    use crate::request::{Request, RequestBody};

    #[test]
    fn body_content_type_fills_missing_header() {
        let request = Request::post("https://api.example.com/v1/items")
            .expect("valid url")
            .with_body(RequestBody::from_bytes("{}").with_content_type("application/json"));

        let http_request = to_http_request(request).expect("request converts");

        assert_eq!(
            http_request.headers()["content-type"],
            "application/json"
        );
        assert_eq!(http_request.headers()["content-length"], "2");
        assert_eq!(http_request.body(), &Bytes::from_static(b"{}"));
    }

    #[test]
    fn explicit_content_type_header_wins_over_body_descriptor() {
        let request = Request::post("https://api.example.com/v1/items")
            .expect("valid url")
            .with_header("Content-Type", "text/plain")
            .with_body(RequestBody::from_bytes("x").with_content_type("application/json"));

        let http_request = to_http_request(request).expect("request converts");

        let values: Vec<_> = http_request
            .headers()
            .get_all("content-type")
            .iter()
            .collect();
        assert_eq!(values, ["text/plain"]);
    }

    #[test]
    fn extension_methods_are_configuration_errors() {
        let http_request = http::Request::builder()
            .method("PURGE")
            .uri("https://cdn.example.com/asset")
            .body(Bytes::new())
            .expect("request builds");

        let error = from_http_request(http_request).expect_err("PURGE is not supported");
        assert_eq!(error.code(), ErrorCode::UnsupportedMethod);
    }

    #[test]
    fn response_status_and_headers_are_copied() {
        let request = Request::get("https://api.example.com/v1/items").expect("valid url");
        let http_response = http::Response::builder()
            .status(202)
            .header("x-request-id", "abc")
            .body(Bytes::from_static(b"accepted"))
            .expect("response builds");

        let response = from_http_response(http_response, request.head());

        assert_eq!(response.status(), 202);
        assert_eq!(response.headers().get("X-Request-Id").as_deref(), Some("abc"));
        assert_eq!(
            response.body().as_bytes(),
            Some(&Bytes::from_static(b"accepted"))
        );
    }
}
