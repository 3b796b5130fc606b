use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use http::header::{HeaderName, HeaderValue};
use url::Url;

use crate::error::Error;
use crate::headers::HeaderCollection;
use crate::method::HttpMethod;

const MAX_ERROR_BODY_LEN: usize = 2048;

pub(crate) const AUTHORIZATION: &str = "authorization";
pub(crate) const CONTENT_LENGTH: &str = "content-length";
pub(crate) const CONTENT_TYPE: &str = "content-type";
pub(crate) const COOKIE: &str = "cookie";
pub(crate) const LOCATION: &str = "location";
pub(crate) const RETRY_AFTER: &str = "retry-after";
pub(crate) const USER_AGENT: &str = "user-agent";

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName, Error> {
    name.parse().map_err(|source| Error::InvalidHeaderName {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    value.parse().map_err(|source| Error::InvalidHeaderValue {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn parse_absolute_url(url_text: &str) -> Result<Url, Error> {
    let parsed = Url::parse(url_text).map_err(|_| Error::InvalidUrl {
        url: url_text.to_owned(),
    })?;
    if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
        return Err(Error::InvalidUrl {
            url: url_text.to_owned(),
        });
    }
    Ok(parsed)
}

fn invalid_base_url_error(base_url: &str) -> Error {
    Error::InvalidBaseUrl {
        base_url: base_url.to_owned(),
    }
}

pub(crate) fn validate_base_url(base_url: &str) -> Result<Url, Error> {
    let normalized = base_url.trim();
    if normalized.len() != base_url.len() || normalized.is_empty() {
        return Err(invalid_base_url_error(base_url));
    }

    let parsed = Url::parse(normalized).map_err(|_| invalid_base_url_error(base_url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid_base_url_error(base_url));
    }
    if parsed.host_str().is_none() {
        return Err(invalid_base_url_error(base_url));
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(invalid_base_url_error(base_url));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid_base_url_error(base_url));
    }
    Ok(parsed)
}

pub(crate) fn join_base_path(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let relative = path.trim_start_matches('/');
    match (base.is_empty(), relative.is_empty()) {
        (true, true) => String::new(),
        (true, false) => relative.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{base}/{relative}"),
    }
}

pub(crate) fn redact_url_for_logs(url: &Url) -> String {
    let mut redacted = url.clone();
    let _ = redacted.set_username("");
    let _ = redacted.set_password(None);
    redacted.set_query(None);
    redacted.set_fragment(None);
    redacted.to_string()
}

pub(crate) fn parse_retry_after(headers: &HeaderCollection, now: SystemTime) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?;
    let raw_value = value.trim();
    if let Ok(seconds) = raw_value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(raw_value).ok()?;
    match date.duration_since(now) {
        Ok(duration) => Some(duration),
        Err(_) => Some(Duration::ZERO),
    }
}

pub(crate) fn is_redirect_status(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

pub(crate) fn redirect_method(method: HttpMethod, status: u16) -> HttpMethod {
    match status {
        303 if method != HttpMethod::Head => HttpMethod::Get,
        301 | 302 if method == HttpMethod::Post => HttpMethod::Get,
        _ => method,
    }
}

pub(crate) fn same_origin(left: &Url, right: &Url) -> bool {
    left.scheme().eq_ignore_ascii_case(right.scheme())
        && left.host_str().map(str::to_ascii_lowercase)
            == right.host_str().map(str::to_ascii_lowercase)
        && left.port_or_known_default() == right.port_or_known_default()
}

pub(crate) fn resolve_redirect_url(current: &Url, location: &str) -> Option<Url> {
    let joined = current.join(location).ok()?;
    if matches!(joined.scheme(), "http" | "https") {
        Some(joined)
    } else {
        None
    }
}

pub(crate) fn sanitize_headers_for_redirect(
    headers: &mut HeaderCollection,
    method_changed_to_get: bool,
    same_origin_redirect: bool,
) {
    if method_changed_to_get {
        headers.remove(CONTENT_LENGTH);
        headers.remove(CONTENT_TYPE);
    }
    if !same_origin_redirect {
        headers.remove(AUTHORIZATION);
        headers.remove(COOKIE);
    }
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }

    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{truncated}...(truncated)")
}
