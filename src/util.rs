use std::time::UNIX_EPOCH;

use http::header::{DATE, HeaderName, HeaderValue};
use http::HeaderMap;
use url::Url;

use crate::error::Error;

const MAX_ERROR_BODY_LEN: usize = 2048;

pub(crate) fn parse_header_name(name: &str) -> crate::Result<HeaderName> {
    name.parse().map_err(|source| Error::InvalidHeaderName {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn parse_header_value(name: &str, value: &str) -> crate::Result<HeaderValue> {
    value.parse().map_err(|source| Error::InvalidHeaderValue {
        name: name.to_owned(),
        source,
    })
}

/// Applies the ordered query pairs to a copy of the bare target URL.
pub(crate) fn append_query_to_url(url: &Url, query_pairs: &[(String, String)]) -> Url {
    let mut with_query = url.clone();
    if query_pairs.is_empty() {
        with_query.set_query(None);
        return with_query;
    }

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in query_pairs {
        serializer.append_pair(name, value);
    }
    with_query.set_query(Some(&serializer.finish()));
    with_query
}

/// Milliseconds since the Unix epoch carried by the response's `Date` header.
pub(crate) fn response_date_millis(headers: &HeaderMap) -> Option<u128> {
    let value = headers.get(DATE)?.to_str().ok()?;
    let date = httpdate::parse_http_date(value.trim()).ok()?;
    date.duration_since(UNIX_EPOCH)
        .ok()
        .map(|since_epoch| since_epoch.as_millis())
}

pub(crate) fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }

    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{truncated}...(truncated)")
}
