use url::Url;

use crate::error::Error;
use crate::query::QueryParams;
use crate::util::{join_base_path, validate_base_url};

pub fn build_url<S>(base_url: &str, segments: &[S], query: &QueryParams) -> Result<Url, Error>
where
    S: AsRef<str>,
{
    validate_base_url(base_url)?;

    let mut url_text = base_url.to_owned();
    for segment in segments {
        url_text = join_base_path(&url_text, segment.as_ref());
    }
    let query_text = query.to_query_string();
    if !query_text.is_empty() {
        url_text.push('?');
        url_text.push_str(&query_text);
    }

    Url::parse(&url_text).map_err(|_| Error::InvalidBaseUrl {
        base_url: base_url.to_owned(),
    })
}
